//! Tests for chat routing.

use super::*;

fn mapping(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(repo, chat)| (repo.to_string(), chat.to_string()))
        .collect()
}

#[test]
fn test_exact_repository_entry_wins() {
    let mapping = mapping(&[("octo/api", "oc_api"), ("default", "oc_mapped_default")]);

    assert_eq!(resolve_chat_id("octo/api", &mapping, "oc_fallback"), "oc_api");
}

#[test]
fn test_default_entry_used_for_unmapped_repository() {
    let mapping = mapping(&[("octo/api", "oc_api"), ("default", "oc_mapped_default")]);

    assert_eq!(
        resolve_chat_id("octo/web", &mapping, "oc_fallback"),
        "oc_mapped_default"
    );
}

#[test]
fn test_fallback_used_without_matching_or_default_entry() {
    let mapping = mapping(&[("octo/api", "oc_api")]);

    assert_eq!(
        resolve_chat_id("octo/web", &mapping, "oc_fallback"),
        "oc_fallback"
    );
}

#[test]
fn test_empty_mapping_uses_fallback() {
    assert_eq!(
        resolve_chat_id("octo/web", &BTreeMap::new(), "oc_fallback"),
        "oc_fallback"
    );
}

/// Verify blank entries do not shadow later candidates.
#[test]
fn test_empty_values_are_skipped() {
    let mapping = mapping(&[("octo/api", ""), ("default", "oc_mapped_default")]);

    assert_eq!(
        resolve_chat_id("octo/api", &mapping, "oc_fallback"),
        "oc_mapped_default"
    );
}

/// Repository names are matched exactly, including case.
#[test]
fn test_lookup_is_case_sensitive() {
    let mapping = mapping(&[("Octo/API", "oc_api")]);

    assert_eq!(
        resolve_chat_id("octo/api", &mapping, "oc_fallback"),
        "oc_fallback"
    );
}
