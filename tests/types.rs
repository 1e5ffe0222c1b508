// ABOUTME: Integration tests for type-safe identifiers and validated types.
// ABOUTME: Tests parsing, validation, and type safety properties.

use proptest::prelude::*;
use stagehand::types::*;

mod image_ref_tests {
    use super::*;

    #[test]
    fn bare_name_has_no_implied_tag() {
        let img = ImageRef::parse("redis").unwrap();
        assert_eq!(img.name(), "redis");
        assert!(img.tag().is_none());
        assert!(img.registry().is_none());
        assert!(!img.is_pinned());
    }

    #[test]
    fn parse_with_registry_and_org() {
        let img = ImageRef::parse("ghcr.io/acme/api:v1.2.3").unwrap();
        assert_eq!(img.registry(), Some("ghcr.io"));
        assert_eq!(img.name(), "acme/api");
        assert_eq!(img.tag(), Some("v1.2.3"));
        assert!(img.is_pinned());
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        let img = ImageRef::parse("localhost:5000/api").unwrap();
        assert_eq!(img.registry(), Some("localhost:5000"));
        assert_eq!(img.name(), "api");
        assert!(img.tag().is_none());
    }

    #[test]
    fn digest_pins_the_reference() {
        let img = ImageRef::parse("nginx@sha256:abc123").unwrap();
        assert_eq!(img.digest(), Some("sha256:abc123"));
        assert!(img.is_pinned());
    }

    #[test]
    fn with_tag_replaces_tag_and_drops_digest() {
        let img = ImageRef::parse("ghcr.io/acme/api:old@sha256:abc").unwrap();
        let version = Version::new("v2").unwrap();
        assert_eq!(img.with_tag(&version).to_string(), "ghcr.io/acme/api:v2");
    }

    #[test]
    fn invalid_references_are_rejected() {
        assert!(matches!(
            ImageRef::parse("  "),
            Err(ParseImageRefError::Empty)
        ));
        assert!(ImageRef::parse("acme/api with space").is_err());
        assert!(ImageRef::parse("ghcr.io/").is_err());
    }
}

mod version_tests {
    use super::*;

    #[test]
    fn typical_release_tags_are_accepted() {
        for tag in ["v1.2.3", "2024.10.01", "release_7", "1.0.0-rc.1"] {
            assert_eq!(Version::new(tag).unwrap().as_str(), tag);
        }
    }

    #[test]
    fn leading_separator_is_rejected() {
        assert_eq!(Version::new(".v1"), Err(VersionError::InvalidStart('.')));
        assert_eq!(Version::new("-v1"), Err(VersionError::InvalidStart('-')));
    }

    #[test]
    fn parses_via_from_str() {
        let version: Version = "v3".parse().unwrap();
        assert_eq!(version.to_string(), "v3");
    }
}

mod service_name_tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(ServiceName::new("api").is_ok());
        assert!(ServiceName::new("shop-api-2").is_ok());
        assert!(ServiceName::new(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(ServiceName::new("").is_err());
        assert!(ServiceName::new("Api").is_err());
        assert!(ServiceName::new("-api").is_err());
        assert!(ServiceName::new("api-").is_err());
        assert!(ServiceName::new("my_api").is_err());
        assert!(ServiceName::new(&"a".repeat(64)).is_err());
    }

    #[test]
    fn service_name_is_a_valid_alias() {
        let name = ServiceName::new("grafana").unwrap();
        assert_eq!(name.as_alias().as_str(), "grafana");
    }
}

mod network_alias_tests {
    use super::*;

    #[test]
    fn alias_is_trimmed() {
        assert_eq!(NetworkAlias::new("  redis ").unwrap().as_str(), "redis");
    }

    #[test]
    fn alias_rejects_slashes() {
        assert!(matches!(
            NetworkAlias::new("a/b"),
            Err(NetworkAliasError::InvalidChar('/'))
        ));
        assert!(matches!(
            NetworkAlias::new(""),
            Err(NetworkAliasError::Empty)
        ));
    }
}

mod id_tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_compare_by_value() {
        let a = ContainerId::new("shop-api-1");
        let b = ContainerId::new(String::from("shop-api-1"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "shop-api-1");

        let set: HashSet<_> = [a, b, ContainerId::new("shop-api-2")].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = NetworkId::new("shop-net");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"shop-net\"");
        let back: NetworkId = serde_json::from_str("\"shop-net\"").unwrap();
        assert_eq!(back, id);
    }
}

proptest! {
    #[test]
    fn any_well_formed_version_is_accepted(tag in "[a-zA-Z0-9][a-zA-Z0-9._-]{0,127}") {
        let version = Version::new(&tag).unwrap();
        prop_assert_eq!(version.as_str(), tag.as_str());
    }

    #[test]
    fn versions_with_slashes_are_rejected(prefix in "[a-z0-9]{1,8}", suffix in "[a-z0-9]{1,8}") {
        let tag = format!("{prefix}/{suffix}");
        prop_assert!(Version::new(&tag).is_err());
    }

    #[test]
    fn any_rfc1123_label_is_a_service_name(name in "[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?") {
        prop_assert!(ServiceName::new(&name).is_ok());
    }

    #[test]
    fn tagged_references_display_as_parsed(
        name in "[a-z][a-z0-9]{0,10}(/[a-z][a-z0-9]{0,10})?",
        tag in "[a-zA-Z0-9][a-zA-Z0-9._-]{0,20}",
    ) {
        let input = format!("{name}:{tag}");
        let img = ImageRef::parse(&input).unwrap();
        prop_assert_eq!(img.tag(), Some(tag.as_str()));
        prop_assert_eq!(img.to_string(), input);
    }
}
