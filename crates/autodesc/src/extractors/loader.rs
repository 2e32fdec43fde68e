// ABOUTME: Loader for site profile registries from embedded or user-supplied JSON.
// ABOUTME: Provides load_builtin_registry() to initialize the default ProfileRegistry.

//! Site profile registry loader.
//!
//! The built-in profiles ship as JSON embedded in the binary. Additional
//! profiles in the same format can be merged in with [`extend_registry`].

use crate::extractors::compiled::precompile_selectors;
use crate::extractors::profile::{Locator, ProfileRegistry, SiteProfile};

/// Embedded JSON with the built-in dealer profiles.
const BUILTIN_PROFILES_JSON: &str = include_str!("../../data/site_profiles.json");

/// Parses a JSON array of site profiles.
pub fn parse_profiles(json: &str) -> Result<Vec<SiteProfile>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Registers every profile from `json` into `registry`, replacing same-domain entries.
pub fn extend_registry(registry: &mut ProfileRegistry, json: &str) -> Result<usize, serde_json::Error> {
    let profiles = parse_profiles(json)?;
    let count = profiles.len();
    for profile in profiles {
        warm_selectors(&profile);
        registry.register(profile);
    }
    Ok(count)
}

fn warm_selectors(profile: &SiteProfile) {
    let css = profile
        .search_paths
        .iter()
        .filter_map(|path| match &path.locator {
            Locator::Css(css) => Some(css.as_str()),
            Locator::Chain(_) => None,
        })
        .chain(profile.clean.iter().map(String::as_str));
    precompile_selectors(css);
}

/// Loads the builtin profile registry from embedded JSON.
///
/// # Panics
///
/// Panics if the embedded JSON is malformed or cannot be deserialized.
pub fn load_builtin_registry() -> ProfileRegistry {
    let mut registry = ProfileRegistry::new();
    extend_registry(&mut registry, BUILTIN_PROFILES_JSON)
        .expect("failed to parse builtin site profiles");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::profile::PathStep;
    use pretty_assertions::assert_eq;

    #[test]
    fn load_builtin_registry_succeeds() {
        let registry = load_builtin_registry();
        assert_eq!(
            registry.domains(),
            vec!["bergeronchryslerjeep.com", "greghublerford.com", "sftoyota.com"]
        );
    }

    #[test]
    fn builtin_registry_contains_sftoyota_chain() {
        let registry = load_builtin_registry();
        let profile = registry.lookup("https://www.sftoyota.com/inventory/vehicle456").unwrap();
        assert_eq!(profile.domain, "sftoyota.com");
        assert_eq!(
            profile.search_paths[0].locator,
            Locator::Chain(vec![
                PathStep::new("div").with_class("dealer-comments dealer-comments--square"),
                PathStep::new("div")
                    .with_id("dealer-comments")
                    .with_class("dealer-comments__text"),
            ])
        );
        assert!(profile.last_verified.is_some());
    }

    #[test]
    fn builtin_greghubler_strips_promise_paragraph() {
        let registry = load_builtin_registry();
        let profile = registry.lookup("greghublerford.com").unwrap();
        let patterns = profile.strip_patterns();
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].is_match("introducing the all new greg hubler promise: more"));
    }

    #[test]
    fn extend_registry_overrides_builtin() {
        let mut registry = load_builtin_registry();
        let added = extend_registry(
            &mut registry,
            r#"[{"domain": "www.sftoyota.com", "search_paths": [{"locator": "section.notes"}]},
                {"domain": "newdealer.com", "supported_domains": ["newdealer.net"]}]"#,
        )
        .unwrap();
        assert_eq!(added, 2);
        let profile = registry.lookup("sftoyota.com").unwrap();
        assert_eq!(profile.search_paths[0].locator, Locator::Css("section.notes".to_string()));
        assert_eq!(profile.search_paths[0].confidence, 0.9);
        assert!(registry.lookup("newdealer.net").is_some());
    }

    #[test]
    fn extend_registry_rejects_bad_json() {
        let mut registry = ProfileRegistry::new();
        assert!(extend_registry(&mut registry, "{not json").is_err());
        assert!(registry.is_empty());
    }
}
