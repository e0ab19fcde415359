//! Shared identifier wrappers for Logforge.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error returned when parsing a validated identifier fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

/// Defines a newtype wrapping a `String`, validated at construction time by
/// the given predicate. Used for names that come from config files rather
/// than being generated (action names, ruleset names, forwarder target
/// ids) -- there is no UUID generation here, only validation.
macro_rules! define_name_id {
    ($name:ident, $label:expr, $valid:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(value: impl Into<String>) -> Result<Self, IdParseError> {
                let value = value.into();
                let validator: fn(&str) -> bool = $valid;
                if value.is_empty() {
                    return Err(IdParseError::new(format!("{} must not be empty", $label)));
                }
                if !validator(&value) {
                    return Err(IdParseError::new(format!(
                        "invalid {}: {:?}",
                        $label, value
                    )));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

fn is_printable_no_whitespace(s: &str) -> bool {
    s.chars().all(|c| !c.is_whitespace() && !c.is_control())
}

fn is_lower_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

// Name of a ruleset (§2, §4.3: "a named collection of actions").
define_name_id!(RulesetName, "ruleset name", is_printable_no_whitespace);

// Name of an action bound to a ruleset (§3 Action).
define_name_id!(ActionName, "action name", is_printable_no_whitespace);

// Name of one forwarder target within an omfwd pool (§3 Forwarder target).
define_name_id!(TargetId, "forwarder target id", is_printable_no_whitespace);

// Name of an input source (imdocker, imudp, ...).
define_name_id!(InputName, "input name", is_printable_no_whitespace);

/// A container id as reported by the Docker API: a 64-hex digit string,
/// truncated to its first 12 characters ("short id") for display/metadata
/// per spec.md §4.6.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn parse(value: impl Into<String>) -> Result<Self, IdParseError> {
        let value = value.into();
        if value.len() != 64 || !is_lower_hex(&value) {
            return Err(IdParseError::new(format!(
                "invalid container id (expected 64 hex chars): {:?}",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn full(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, the conventional "short id".
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ruleset_name_rejects_whitespace() {
        assert!(RulesetName::parse("my ruleset").is_err());
        assert!(RulesetName::parse("my-ruleset").is_ok());
    }

    #[test]
    fn ruleset_name_rejects_empty() {
        assert!(RulesetName::parse("").is_err());
    }

    #[test]
    fn container_id_requires_64_hex_chars() {
        let full = "a".repeat(64);
        let id = ContainerId::parse(full.clone()).unwrap();
        assert_eq!(id.full(), full);
        assert_eq!(id.short(), "a".repeat(12));
        assert_eq!(id.to_string(), "a".repeat(12));

        assert!(ContainerId::parse("abc").is_err());
        assert!(ContainerId::parse("g".repeat(64)).is_err());
    }
}
