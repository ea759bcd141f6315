//! GitHub webhook payload types.
//!
//! Only the fields the relay reads are modelled. Every field is optional or
//! defaulted so partially populated payloads (branch deletions, test
//! deliveries) still deserialize.

use serde::{Deserialize, Deserializer, Serialize};

/// Header carrying the GitHub event name.
pub const EVENT_HEADER: &str = "x-github-event";

/// Event name of a push.
pub const PUSH_EVENT: &str = "push";

/// Event name GitHub sends when a webhook is first configured.
pub const PING_EVENT: &str = "ping";

const UNKNOWN_REPOSITORY: &str = "unknown repository";
const UNKNOWN_BRANCH: &str = "unknown branch";
const UNKNOWN_PUSHER: &str = "unknown pusher";

/// Push event payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Full git ref, e.g. `refs/heads/main`
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,

    #[serde(default)]
    pub repository: Option<PushRepository>,

    #[serde(default)]
    pub pusher: Option<Pusher>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub commits: Vec<CommitEvent>,

    #[serde(default)]
    pub head_commit: Option<CommitEvent>,

    /// Compare view covering every commit in the push
    #[serde(default)]
    pub compare: Option<String>,

    #[serde(default)]
    pub created: bool,

    #[serde(default)]
    pub deleted: bool,
}

impl PushEvent {
    /// Repository full name (`owner/name`), or a placeholder.
    pub fn repository_name(&self) -> &str {
        self.repository
            .as_ref()
            .and_then(|r| r.full_name.as_deref())
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_REPOSITORY)
    }

    /// Branch or tag name derived from the ref.
    ///
    /// `refs/heads/feature/x` becomes `feature/x`; other refs keep their last
    /// path segment. A ref with nothing after the prefix is unknown.
    pub fn branch_name(&self) -> String {
        let Some(git_ref) = self.git_ref.as_deref().filter(|r| !r.is_empty()) else {
            return UNKNOWN_BRANCH.to_string();
        };

        let name = git_ref
            .strip_prefix("refs/heads/")
            .or_else(|| git_ref.strip_prefix("refs/tags/"))
            .or_else(|| git_ref.rsplit('/').next())
            .unwrap_or(git_ref);

        if name.is_empty() {
            UNKNOWN_BRANCH.to_string()
        } else {
            name.to_string()
        }
    }

    pub fn pusher_name(&self) -> &str {
        self.pusher
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_PUSHER)
    }

    /// Compare URL if GitHub supplied one.
    pub fn compare_url(&self) -> Option<&str> {
        self.compare.as_deref().filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushRepository {
    #[serde(default)]
    pub full_name: Option<String>,

    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pusher {
    #[serde(default)]
    pub name: Option<String>,
}

/// Single commit from a push.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitEvent {
    /// Commit sha
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,

    #[serde(default)]
    pub author: Option<CommitAuthor>,

    #[serde(default)]
    pub url: Option<String>,
}

impl CommitEvent {
    pub fn new(message: impl Into<String>, author_name: Option<&str>, url: Option<&str>) -> Self {
        Self {
            id: None,
            message: message.into(),
            author: author_name.map(|name| CommitAuthor {
                name: Some(name.to_string()),
                username: None,
            }),
            url: url.map(str::to_string),
        }
    }

    /// Builder-style setter for the commit sha.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Author display name, if present and non-empty.
    pub fn author_name(&self) -> Option<&str> {
        self.author
            .as_ref()
            .and_then(|a| a.name.as_deref())
            .filter(|name| !name.trim().is_empty())
    }

    /// First line of the commit message, trimmed.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }

    /// Seven character abbreviation of the sha.
    pub fn short_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(|id| id.get(..7).unwrap_or(id))
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitAuthor {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub username: Option<String>,
}

/// Treat an explicit JSON `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[path = "github_tests.rs"]
mod tests;
