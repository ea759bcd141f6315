//! # Notification Formatting
//!
//! Turns a GitHub push into a Feishu interactive card.
//!
//! Commit intent is derived from the conventional-commit prefix of the first
//! message line using a static, ordered classification table. The card keeps
//! a fixed header and always ends with a reminder to pull.

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::github::{CommitEvent, PushEvent};

/// Fixed card title.
pub const CARD_TITLE: &str = "GitHub Repository Update";

/// Fixed card header color template.
pub const CARD_TEMPLATE: &str = "blue";

/// Maximum number of commits listed on a multi-commit card.
pub const MAX_LISTED_COMMITS: usize = 10;

/// Placeholder for commits without an author name.
pub const UNKNOWN_AUTHOR: &str = "unknown author";

/// Static trailer appended to every card.
pub const PULL_REMINDER: &str = "💾 Remember to pull the latest changes: `git pull`";

const NO_CHANGES_MESSAGE: &str = "No code changes (branch created or deleted)";
const NO_COMMIT_MESSAGE: &str = "(no commit message)";

// ============================================================================
// Commit classification
// ============================================================================

/// Icon and label describing the intent of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitKind {
    pub icon: &'static str,
    pub label: &'static str,
}

/// Kind assigned to merge commits.
pub const MERGE_KIND: CommitKind = CommitKind {
    icon: "🔀",
    label: "Merge",
};

/// Kind assigned to anything without a recognised prefix.
pub const GENERIC_KIND: CommitKind = CommitKind {
    icon: "📝",
    label: "Update",
};

/// Conventional commit types, checked in order.
const COMMIT_TYPES: [(&str, CommitKind); 11] = [
    ("feat", CommitKind { icon: "✨", label: "Feature" }),
    ("fix", CommitKind { icon: "🐛", label: "Bug Fix" }),
    ("docs", CommitKind { icon: "📚", label: "Documentation" }),
    ("style", CommitKind { icon: "💄", label: "Style" }),
    ("refactor", CommitKind { icon: "♻️", label: "Refactor" }),
    ("test", CommitKind { icon: "✅", label: "Tests" }),
    ("chore", CommitKind { icon: "🔧", label: "Chore" }),
    ("perf", CommitKind { icon: "⚡", label: "Performance" }),
    ("ci", CommitKind { icon: "👷", label: "CI" }),
    ("build", CommitKind { icon: "📦", label: "Build" }),
    ("revert", CommitKind { icon: "⏪", label: "Revert" }),
];

/// `type(scope)!: ` at the start of a line, case-insensitive.
fn conventional_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(\w+)(?:\([^)]*\))?!?:\s")
            .expect("conventional commit pattern is a valid regex")
    })
}

/// Classify a commit by the first line of its message.
pub fn classify_commit(raw_message: &str) -> CommitKind {
    let first_line = raw_message.lines().next().unwrap_or("").trim_start();

    if first_line.to_lowercase().starts_with("merge") {
        return MERGE_KIND;
    }

    let Some(captures) = conventional_prefix().captures(first_line) else {
        return GENERIC_KIND;
    };

    let commit_type = captures[1].to_lowercase();
    COMMIT_TYPES
        .iter()
        .find(|(prefix, _)| *prefix == commit_type)
        .map(|(_, kind)| *kind)
        .unwrap_or(GENERIC_KIND)
}

/// Render a single commit.
///
/// Returns the display line (icon, label, subject and a linked short sha
/// when known) and the author display, which is the bold at-mention style
/// name or [`UNKNOWN_AUTHOR`].
pub fn format_commit(commit: &CommitEvent) -> (String, String) {
    let kind = classify_commit(&commit.message);
    let subject = match commit.subject() {
        "" => NO_COMMIT_MESSAGE,
        subject => subject,
    };

    let mut line = format!("{} **{}** {}", kind.icon, kind.label, subject);
    if let (Some(short_id), Some(url)) = (commit.short_id(), commit.url()) {
        line.push_str(&format!(" ([{}]({}))", short_id, url));
    }

    (line, author_display(commit.author_name()))
}

fn author_display(name: Option<&str>) -> String {
    match name {
        Some(name) => format!("**@{}**", name.trim()),
        None => UNKNOWN_AUTHOR.to_string(),
    }
}

// ============================================================================
// Card model
// ============================================================================

/// Feishu interactive card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationCard {
    pub config: CardConfig,
    pub header: CardHeader,
    pub elements: Vec<CardElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardConfig {
    pub wide_screen_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardHeader {
    pub title: CardText,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardText {
    pub tag: TextTag,
    pub content: String,
}

impl CardText {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            tag: TextTag::PlainText,
            content: content.into(),
        }
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            tag: TextTag::LarkMd,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextTag {
    PlainText,
    LarkMd,
}

/// One block of card content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum CardElement {
    Div { text: CardText },
    Action { actions: Vec<CardButton> },
    Hr,
}

impl CardElement {
    pub fn markdown(content: impl Into<String>) -> Self {
        Self::Div {
            text: CardText::markdown(content),
        }
    }

    pub fn link_button(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Action {
            actions: vec![CardButton {
                text: CardText::plain(label),
                kind: ButtonKind::Default,
                url: url.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tag", rename = "button")]
pub struct CardButton {
    pub text: CardText,
    #[serde(rename = "type")]
    pub kind: ButtonKind,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonKind {
    Default,
}

impl NotificationCard {
    /// Empty card with the fixed relay header.
    pub fn new() -> Self {
        Self {
            config: CardConfig {
                wide_screen_mode: true,
            },
            header: CardHeader {
                title: CardText::plain(CARD_TITLE),
                template: CARD_TEMPLATE.to_string(),
            },
            elements: Vec::new(),
        }
    }

    /// Markdown contents of every text block, in order.
    pub fn markdown_blocks(&self) -> Vec<&str> {
        self.elements
            .iter()
            .filter_map(|element| match element {
                CardElement::Div { text } => Some(text.content.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All buttons on the card, in order.
    pub fn buttons(&self) -> Vec<&CardButton> {
        self.elements
            .iter()
            .filter_map(|element| match element {
                CardElement::Action { actions } => Some(actions.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Card serialized the way the send endpoint expects in `content`.
    pub fn to_content_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn push_markdown(&mut self, content: impl Into<String>) {
        self.elements.push(CardElement::markdown(content));
    }

    fn push_button(&mut self, label: &str, url: Option<&str>) {
        if let Some(url) = url {
            self.elements.push(CardElement::link_button(label, url));
        }
    }
}

impl Default for NotificationCard {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Card assembly
// ============================================================================

/// Build the notification card for a push.
///
/// - no commits: a synthetic entry from `head_commit`, or a branch
///   create/delete notice attributed to the pusher
/// - one commit: the commit line, its author and a "view commit" button
/// - several commits: up to [`MAX_LISTED_COMMITS`] lines, the distinct commit
///   authors and a "view all changes" button to the compare view
pub fn build_card(push: &PushEvent) -> NotificationCard {
    let mut card = NotificationCard::new();

    card.push_markdown(format!("📦 **Repository**: {}", push.repository_name()));
    card.push_markdown(format!("🌿 **Branch**: {}", push.branch_name()));

    match push.commits.as_slice() {
        [] => {
            let synthetic = synthetic_commit(push);
            let (line, author) = format_commit(&synthetic);
            card.push_markdown(line);
            card.push_markdown(format!("👤 **Author**: {}", author));
            card.push_button("🔗 View details", synthetic.url());
        }
        [commit] => {
            let (line, author) = format_commit(commit);
            card.push_markdown(line);
            card.push_markdown(format!("👤 **Author**: {}", author));
            card.push_button("🔗 View commit", commit.url());
        }
        commits => {
            card.push_markdown(format!("✨ **Commits**: {}", commits.len()));

            let mut lines: Vec<String> = commits
                .iter()
                .take(MAX_LISTED_COMMITS)
                .map(|commit| {
                    let (line, author) = format_commit(commit);
                    format!("{} · {}", line, author)
                })
                .collect();
            if commits.len() > MAX_LISTED_COMMITS {
                lines.push(format!(
                    "...and {} more commits",
                    commits.len() - MAX_LISTED_COMMITS
                ));
            }
            card.push_markdown(lines.join("\n"));

            card.push_markdown(format!("👥 **Authors**: {}", distinct_authors(commits)));
            card.push_markdown(format!("🚀 **Pushed by**: {}", push.pusher_name()));
            card.push_button("🔍 View all changes", push.compare_url());
        }
    }

    card.elements.push(CardElement::Hr);
    card.push_markdown(PULL_REMINDER);
    card
}

/// Comma-joined author displays in first-appearance order.
fn distinct_authors(commits: &[CommitEvent]) -> String {
    let mut seen = HashSet::new();
    commits
        .iter()
        .map(|commit| author_display(commit.author_name()))
        .filter(|display| seen.insert(display.clone()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Stand-in commit for pushes that carry no commits.
fn synthetic_commit(push: &PushEvent) -> CommitEvent {
    let pusher = push.pusher_name();

    match &push.head_commit {
        Some(head) => {
            let message = if head.message.trim().is_empty() {
                NO_CHANGES_MESSAGE.to_string()
            } else {
                head.message.clone()
            };
            let mut commit = CommitEvent::new(
                message,
                Some(head.author_name().unwrap_or(pusher)),
                head.url().or(push.compare_url()),
            );
            commit.id = head.id.clone();
            commit
        }
        None => {
            let message = if push.deleted {
                format!("Branch {} deleted", push.branch_name())
            } else if push.created {
                format!("Branch {} created", push.branch_name())
            } else {
                NO_CHANGES_MESSAGE.to_string()
            };
            CommitEvent::new(message, Some(pusher), push.compare_url())
        }
    }
}

#[cfg(test)]
#[path = "formatter_tests.rs"]
mod tests;
