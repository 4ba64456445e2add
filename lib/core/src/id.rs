//! Strongly-typed ID types for domain entities.
//!
//! IDs are ULIDs rendered with a short type prefix (`usr_01H...`). Parsing
//! accepts either the prefixed or the bare form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid_str = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a local user record.
    ///
    /// Distinct from the OIDC subject, which is owned by the identity provider.
    UserId,
    "usr"
);

define_id!(
    /// Unique identifier of an issued bearer credential (the JWT `jti` claim).
    TokenId,
    "tok"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_display_format() {
        let id = UserId::new();
        assert!(id.to_string().starts_with("usr_"));
    }

    #[test]
    fn token_id_display_format() {
        let id = TokenId::new();
        assert!(id.to_string().starts_with("tok_"));
    }

    #[test]
    fn parse_with_prefix() {
        let id = UserId::new();
        let parsed: UserId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_without_prefix() {
        let ulid = Ulid::new();
        let id: UserId = ulid.to_string().parse().expect("should parse");
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn parse_invalid_ulid() {
        let result: Result<UserId, _> = "usr_not-a-ulid".parse();
        let err = result.expect_err("should fail");
        assert_eq!(err.id_type, "UserId");
    }

    #[test]
    fn other_prefix_is_rejected() {
        let token = TokenId::new();
        let result: Result<UserId, _> = token.to_string().parse();
        assert!(result.is_err());
    }

    #[test]
    fn id_serializes_as_bare_ulid() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.as_ulid()));
        let parsed: UserId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
