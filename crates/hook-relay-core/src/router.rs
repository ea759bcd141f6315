//! Repository to chat routing.

use std::collections::BTreeMap;

/// Mapping key whose value applies to every repository without its own entry.
pub const DEFAULT_MAPPING_KEY: &str = "default";

/// Pick the chat that should receive notifications for `repo_full_name`.
///
/// Selection order: the repository's own mapping entry, then the mapping's
/// `"default"` entry, then `fallback`. Empty mapping values are skipped.
pub fn resolve_chat_id(
    repo_full_name: &str,
    mapping: &BTreeMap<String, String>,
    fallback: &str,
) -> String {
    let lookup = |key: &str| mapping.get(key).filter(|chat| !chat.is_empty());

    lookup(repo_full_name)
        .or_else(|| lookup(DEFAULT_MAPPING_KEY))
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
