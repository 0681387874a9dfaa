//! Asset and network value objects for swap endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::shared::DomainError;

/// A token ticker (e.g. "ETH", "USDC", "MATIC").
///
/// Always normalized to uppercase so `"usdc"` and `"USDC"` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetSymbol(String);

impl AssetSymbol {
    /// Create a new `AssetSymbol`, normalized to uppercase.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().to_uppercase())
    }

    /// Get the asset ticker string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Validate the asset symbol for use in a swap intent.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is empty, too long, or contains
    /// anything other than ASCII alphanumerics.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.0.is_empty() {
            return Err(DomainError::InvalidValue {
                field: "asset".to_string(),
                message: "asset symbol cannot be empty".to_string(),
            });
        }
        if self.0.len() > 20 {
            return Err(DomainError::InvalidValue {
                field: "asset".to_string(),
                message: "asset symbol exceeds maximum length".to_string(),
            });
        }
        if !self.0.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::InvalidValue {
                field: "asset".to_string(),
                message: "asset symbol contains invalid characters".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for AssetSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AssetSymbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for AssetSymbol {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for AssetSymbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A chain/network identifier (e.g. "ethereum", "polygon", "arbitrum").
///
/// Normalized to lowercase; networks are conventionally lowercase slugs in
/// the aggregator's API, unlike asset tickers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Network(String);

impl Network {
    /// Create a new `Network`, normalized to lowercase.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().to_lowercase())
    }

    /// Get the network slug string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Validate the network identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is empty or contains characters
    /// other than lowercase ASCII letters, digits, and hyphens.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.0.is_empty() {
            return Err(DomainError::InvalidValue {
                field: "network".to_string(),
                message: "network identifier cannot be empty".to_string(),
            });
        }
        if !self
            .0
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(DomainError::InvalidValue {
                field: "network".to_string(),
                message: "network identifier contains invalid characters".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Network {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Network {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Network {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_symbol_normalizes_case() {
        assert_eq!(AssetSymbol::new("usdc").as_str(), "USDC");
    }

    #[test]
    fn asset_symbol_display() {
        assert_eq!(format!("{}", AssetSymbol::new("eth")), "ETH");
    }

    #[test]
    fn asset_symbol_validate_empty() {
        assert!(AssetSymbol::new("").validate().is_err());
    }

    #[test]
    fn asset_symbol_validate_too_long() {
        assert!(AssetSymbol::new("A".repeat(25)).validate().is_err());
    }

    #[test]
    fn asset_symbol_validate_invalid_chars() {
        assert!(AssetSymbol::new("US-DC").validate().is_err());
    }

    #[test]
    fn asset_symbol_validate_valid() {
        assert!(AssetSymbol::new("USDC").validate().is_ok());
        assert!(AssetSymbol::new("WETH").validate().is_ok());
    }

    #[test]
    fn asset_symbol_hash_and_eq_case_insensitive() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(AssetSymbol::new("USDC"));
        set.insert(AssetSymbol::new("usdc"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn asset_symbol_serde_roundtrip() {
        let s = AssetSymbol::new("ETH");
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "\"ETH\"");
        assert_eq!(serde_json::from_str::<AssetSymbol>(&json).unwrap(), s);
    }

    #[test]
    fn network_normalizes_case() {
        assert_eq!(Network::new("ETHEREUM").as_str(), "ethereum");
    }

    #[test]
    fn network_validate_rejects_spaces() {
        assert!(Network::new("polygon pos").validate().is_err());
    }

    #[test]
    fn network_validate_accepts_hyphenated() {
        assert!(Network::new("arbitrum-one").validate().is_ok());
    }

    #[test]
    fn network_validate_rejects_empty() {
        assert!(Network::new("").validate().is_err());
    }

    #[test]
    fn network_from_conversions() {
        let n: Network = "Polygon".into();
        assert_eq!(n.as_str(), "polygon");
    }
}
