//! Chat identities
//!
//! An [`Identity`] is the username a client registers with the broker.
//! It is never empty and carries no surrounding whitespace.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

const ADJECTIVES: &[&str] = &[
    "amber", "azure", "coral", "crimson", "emerald", "golden", "indigo", "jade",
    "silver", "violet", "bold", "brave", "bright", "calm", "clever", "eager",
    "gentle", "keen", "lively", "noble", "quick", "serene", "swift", "wise",
];

const NOUNS: &[&str] = &[
    "falcon", "heron", "otter", "lynx", "panda", "raven", "wolf", "fox",
    "comet", "nova", "orbit", "aurora", "harbor", "meadow", "river", "summit",
    "beacon", "signal", "spark", "relay", "ember", "frost", "tide", "breeze",
];

/// Registered username
///
/// Deserializing goes through [`Identity::parse`], so a decoded identity
/// is trimmed and non-empty like one typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate a username as typed by the user
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyUsername);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Identity {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identity {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl TryFrom<&str> for Identity {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Identity {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

/// Generate a memorable username like "swift-otter-42"
pub fn generate_username() -> Identity {
    let mut rng = rand::thread_rng();
    let num: u8 = rng.gen_range(1..100);

    let adjective = ADJECTIVES.choose(&mut rng).unwrap_or(&"swift");
    let noun = NOUNS.choose(&mut rng).unwrap_or(&"guest");

    Identity(format!("{adjective}-{noun}-{num}"))
}
