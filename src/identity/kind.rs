use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// numeric id, long hex id, uuid, or `<digits>:<uuid>`
static OPAQUE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:\d+|[0-9a-fA-F]{24,}|[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}|\d+:[0-9a-fA-F-]{36})$",
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    CanonicalKey,
    Email,
    DisplayName,
    Handle,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            IdentifierKind::CanonicalKey => "canonical key",
            IdentifierKind::Email => "email",
            IdentifierKind::DisplayName => "display name",
            IdentifierKind::Handle => "handle",
        };
        f.write_str(value)
    }
}

pub fn detect_kind(identifier: &str) -> IdentifierKind {
    let identifier = identifier.trim();
    if OPAQUE_KEY.is_match(identifier) {
        IdentifierKind::CanonicalKey
    } else if identifier.contains('@') && identifier.contains('.') {
        IdentifierKind::Email
    } else if identifier.chars().any(char::is_whitespace) {
        IdentifierKind::DisplayName
    } else {
        IdentifierKind::Handle
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Pick from the identifier kind
    #[default]
    Auto,
    KeyFirst,
    HandleFirst,
    Email,
    DisplayName,
}

impl Strategy {
    /// The concrete strategy to run for an identifier of `kind`
    pub fn for_kind(self, kind: IdentifierKind) -> Strategy {
        match self {
            Strategy::Auto => match kind {
                IdentifierKind::CanonicalKey => Strategy::KeyFirst,
                IdentifierKind::Email => Strategy::Email,
                IdentifierKind::DisplayName => Strategy::DisplayName,
                IdentifierKind::Handle => Strategy::HandleFirst,
            },
            explicit => explicit,
        }
    }
}
