//! Strongly-typed identifiers for domain entities.
//!
//! These prevent mixing up IDs from different contexts (e.g. passing a
//! `UserId` where an `ExternalOrderId` is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from a string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generate a new unique identifier using UUID v4.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Get the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(
    ExternalOrderId,
    "The aggregator's order ID; the external, cross-process identity of an Order."
);
define_id!(UserId, "Identifier for a platform user (the JWT subject).");
define_id!(QuoteId, "Opaque, short-TTL identifier for an aggregator quote.");
define_id!(DcaPlanId, "Unique identifier for a recurring DCA plan.");
define_id!(LimitOrderId, "Unique identifier for a price-armed limit order.");
define_id!(ConversationId, "Unique identifier for a chat conversation.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_order_id_new_and_display() {
        let id = ExternalOrderId::new("ssx-123");
        assert_eq!(id.as_str(), "ssx-123");
        assert_eq!(format!("{id}"), "ssx-123");
    }

    #[test]
    fn generate_is_unique() {
        let a = ExternalOrderId::generate();
        let b = ExternalOrderId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn equality_and_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(UserId::new("u-1"));
        set.insert(UserId::new("u-2"));
        set.insert(UserId::new("u-1"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn from_string_and_str() {
        let id: DcaPlanId = "plan-1".into();
        assert_eq!(id.as_str(), "plan-1");

        let id2: DcaPlanId = String::from("plan-2").into();
        assert_eq!(id2.as_str(), "plan-2");
    }

    #[test]
    fn into_inner_consumes() {
        let id = LimitOrderId::new("lim-1");
        assert_eq!(id.into_inner(), "lim-1");
    }

    #[test]
    fn serde_roundtrip() {
        let id = QuoteId::new("quote-abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"quote-abc\"");
        let parsed: QuoteId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
