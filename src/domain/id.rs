//! Typed identifiers for categories, ads, tags and users
//!
//! ID Format:
//! - Category IDs: `c-{7-char-hash}` (e.g., `c-7f2b4c1`)
//! - Ad IDs: `ad-{7-char-hash}` (e.g., `ad-9d3e5f2`)
//! - Tag IDs: `t-{7-char-hash}` (e.g., `t-04be11a`)
//!
//! Hash is derived from the entity's name or title, the creation timestamp
//! and a process-local sequence, so two records created in the same instant
//! still get distinct IDs.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid {kind} ID: expected '{prefix}-{{7-char-hash}}', got '{value}'")]
    InvalidFormat {
        kind: &'static str,
        prefix: &'static str,
        value: String,
    },

    #[error("User ID cannot be empty")]
    EmptyUser,
}

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generates a 7-character hash from a seed and timestamp
fn generate_hash(seed: &str, timestamp: DateTime<Utc>) -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let input = format!(
        "{}{}{}",
        seed,
        timestamp.timestamp_nanos_opt().unwrap_or(0),
        seq
    );
    let hash = blake3::hash(input.as_bytes());
    hash.to_hex()[..7].to_string()
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name {
            hash: String,
        }

        impl $name {
            /// Prefix used in the textual form
            pub const PREFIX: &'static str = $prefix;

            /// Generates a fresh ID from a seed (name or title) and timestamp
            pub fn generate(seed: &str, timestamp: DateTime<Utc>) -> Self {
                Self {
                    hash: generate_hash(seed, timestamp),
                }
            }

            /// Returns the hash portion of the ID
            pub fn hash(&self) -> &str {
                &self.hash
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.hash)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                let invalid = || IdError::InvalidFormat {
                    kind: $kind,
                    prefix: $prefix,
                    value: s.to_string(),
                };

                let hash = s
                    .strip_prefix($prefix)
                    .and_then(|rest| rest.strip_prefix('-'))
                    .ok_or_else(invalid)?;

                if hash.len() != 7 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(invalid());
                }

                Ok(Self {
                    hash: hash.to_ascii_lowercase(),
                })
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_string()
            }
        }
    };
}

entity_id!(
    /// Category ID in the format `c-{7-char-hash}`
    CategoryId,
    "category",
    "c"
);

entity_id!(
    /// Advertisement ID in the format `ad-{7-char-hash}`
    AdId,
    "ad",
    "ad"
);

entity_id!(
    /// Tag ID in the format `t-{7-char-hash}`
    TagId,
    "tag",
    "t"
);

/// Identity of the acting user
///
/// Users are managed outside this crate; the ID is threaded explicitly
/// into every create/update call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(name: impl AsRef<str>) -> Result<Self, IdError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(IdError::EmptyUser);
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}
