use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use tunnelsync_types::{
    Feature, Fingerprint, Module, Profile, ProfileAttributes, ProfileHeader, SharingFlag,
};

fn sample_profile() -> Profile {
    Profile::new("Home")
        .with_active_module(Module::new("openvpn"))
        .with_attributes(ProfileAttributes {
            fingerprint: Some(Fingerprint::new()),
            last_update: None,
            available_for_tv: false,
        })
}

// ── Profile ──────────────────────────────────────────────────────

#[test]
fn new_profile_has_unique_id() {
    let a = Profile::new("a");
    let b = Profile::new("b");
    assert_ne!(a.id, b.id);
}

#[test]
fn with_active_module_marks_active() {
    let module = Module::new("wireguard");
    let module_id = module.id;
    let profile = Profile::new("p").with_active_module(module);

    assert_eq!(profile.modules.len(), 1);
    assert!(profile.active_modules.contains(&module_id));
    assert_eq!(profile.active_modules().count(), 1);
}

#[test]
fn structural_equality_includes_attributes() {
    let profile = sample_profile();
    let mut other = profile.clone();
    assert_eq!(profile, other);

    other.attributes.fingerprint = Some(Fingerprint::new());
    assert_ne!(profile, other);
}

#[test]
fn duplicated_profile_gets_new_identity() {
    let profile = sample_profile();
    let copy = profile.duplicated();

    assert_ne!(copy.id, profile.id);
    assert_eq!(copy.name, profile.name);
    assert_eq!(copy.modules, profile.modules);
    assert!(copy.attributes.fingerprint.is_none());
}

#[test]
fn serde_roundtrip() {
    let profile = sample_profile();
    let json = serde_json::to_string(&profile).unwrap();
    let decoded: Profile = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, profile);
}

#[test]
fn deserializes_with_missing_optional_fields() {
    let json = format!(
        r#"{{"id":"{}","name":"bare"}}"#,
        Profile::new("x").id
    );
    let decoded: Profile = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded.name, "bare");
    assert!(decoded.modules.is_empty());
    assert!(decoded.attributes.fingerprint.is_none());
}

// ── Fingerprint ──────────────────────────────────────────────────

#[test]
fn fingerprints_are_random() {
    assert_ne!(Fingerprint::new(), Fingerprint::new());
}

// ── ProfileHeader ────────────────────────────────────────────────

#[test]
fn header_projects_profile_fields() {
    let profile = sample_profile();
    let header = ProfileHeader::new(
        &profile,
        vec![SharingFlag::Shared],
        BTreeSet::from([Feature::Sharing]),
    );

    assert_eq!(header.id, profile.id);
    assert_eq!(header.name, profile.name);
    assert_eq!(header.sharing_flags, vec![SharingFlag::Shared]);
    assert!(header.required_features.contains(&Feature::Sharing));
}
