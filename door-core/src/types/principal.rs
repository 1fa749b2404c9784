//! Principals and signing identities
//!
//! A [`Principal`] is a 20-byte account address rendered as `0x` + 40 hex
//! characters. It is stored in canonical lowercase form so equality and
//! hashing are case-insensitive. A [`SigningKey`] is 32 bytes rendered as
//! `0x` + 64 hex characters. Both are validated at construction, so any
//! value of these types has already passed the boundary checks.

use serde::{Deserialize, Serialize};

use crate::constants::{ADDRESS_LEN, HEX_PREFIX, SIGNING_KEY_LEN};
use crate::error::{DoorError, DoorResult};

fn check_hex_field(input: &str, expected_len: usize, what: &str) -> DoorResult<()> {
    if input.is_empty() {
        return Err(DoorError::MalformedInput(format!("{} is empty", what)));
    }
    if input.len() != expected_len {
        return Err(DoorError::MalformedInput(format!(
            "{} must be {} characters, got {}",
            what,
            expected_len,
            input.len()
        )));
    }
    if !input.starts_with(HEX_PREFIX) {
        return Err(DoorError::MalformedInput(format!(
            "{} must start with {}",
            what, HEX_PREFIX
        )));
    }
    if !input[HEX_PREFIX.len()..]
        .chars()
        .all(|c| c.is_ascii_hexdigit())
    {
        return Err(DoorError::MalformedInput(format!(
            "{} contains non-hex characters",
            what
        )));
    }
    Ok(())
}

/// Account address identifying an actor requesting access
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    /// Parse and canonicalize an address
    pub fn parse(input: &str) -> DoorResult<Self> {
        let trimmed = input.trim();
        check_hex_field(trimmed, ADDRESS_LEN, "address")?;
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Check whether a string would parse as an address
    pub fn is_well_formed(input: &str) -> bool {
        check_hex_field(input.trim(), ADDRESS_LEN, "address").is_ok()
    }

    /// The zero address
    pub fn zero() -> Self {
        Self(format!("{}{}", HEX_PREFIX, "0".repeat(ADDRESS_LEN - 2)))
    }

    /// Build an address from a 20-byte value
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        Self(format!("{}{}", HEX_PREFIX, hex))
    }

    /// Canonical lowercase rendering
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short label used when showing an address in the scene (`0xab...`)
    pub fn short_label(&self) -> String {
        format!("{}...", &self.0[..4])
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Principal {
    type Err = DoorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Principal {
    type Error = DoorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Principal> for String {
    fn from(p: Principal) -> Self {
        p.0
    }
}

/// Private signing key material
///
/// `Debug` and `Display` never reveal the key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SigningKey(String);

impl SigningKey {
    /// Parse a `0x`-prefixed 64 hex character key
    pub fn parse(input: &str) -> DoorResult<Self> {
        let trimmed = input.trim();
        check_hex_field(trimmed, SIGNING_KEY_LEN, "signing key")?;
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Access the raw key for handing to a signing library
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(0x****)")
    }
}

impl std::fmt::Display for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x****")
    }
}

impl TryFrom<String> for SigningKey {
    type Error = DoorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SigningKey> for String {
    fn from(k: SigningKey) -> Self {
        k.0
    }
}

/// Signing identity handed to the ledger client for state-changing calls
///
/// Address derivation from the key belongs to the external signing library,
/// so both halves are supplied together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    /// Key material
    key: SigningKey,
    /// Account the key controls
    address: Principal,
}

impl Signer {
    /// Create a signer from an already validated key/address pair
    pub fn new(key: SigningKey, address: Principal) -> Self {
        Self { key, address }
    }

    /// Validate and pair raw key and address strings
    pub fn from_parts(key: &str, address: &str) -> DoorResult<Self> {
        Ok(Self {
            key: SigningKey::parse(key)?,
            address: Principal::parse(address)?,
        })
    }

    /// Sending account
    pub fn address(&self) -> &Principal {
        &self.address
    }

    /// Key material
    pub fn key(&self) -> &SigningKey {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0xAAAA000000000000000000000000000000000001";

    #[test]
    fn test_principal_parse_canonicalizes() {
        let p = Principal::parse(ADDR).unwrap();
        assert_eq!(p.as_str(), "0xaaaa000000000000000000000000000000000001");
        assert_eq!(p, Principal::parse(&ADDR.to_lowercase()).unwrap());
    }

    #[test]
    fn test_principal_rejects_bad_input() {
        assert!(matches!(Principal::parse(""), Err(DoorError::MalformedInput(_))));
        assert!(Principal::parse("0x1234").is_err());
        assert!(Principal::parse("AAAA0000000000000000000000000000000000000001").is_err());
        assert!(Principal::parse("0xZZZZ000000000000000000000000000000000001").is_err());
        assert!(!Principal::is_well_formed("0x"));
        assert!(Principal::is_well_formed(ADDR));
    }

    #[test]
    fn test_principal_short_label() {
        let p = Principal::parse(ADDR).unwrap();
        assert_eq!(p.short_label(), "0xaa...");
    }

    #[test]
    fn test_principal_from_bytes() {
        let mut bytes = [0u8; 20];
        bytes[19] = 0x2a;
        let p = Principal::from_bytes(bytes);
        assert_eq!(p.as_str(), "0x000000000000000000000000000000000000002a");
    }

    #[test]
    fn test_principal_serde_roundtrip_validates() {
        let json = format!("\"{}\"", ADDR);
        let p: Principal = serde_json::from_str(&json).unwrap();
        assert_eq!(p, Principal::parse(ADDR).unwrap());
        assert!(serde_json::from_str::<Principal>("\"0xnope\"").is_err());
    }

    #[test]
    fn test_signing_key_is_redacted() {
        let raw = format!("0x{}", "ab".repeat(32));
        let key = SigningKey::parse(&raw).unwrap();
        assert_eq!(format!("{:?}", key), "SigningKey(0x****)");
        assert_eq!(key.expose_secret(), raw);
        assert!(SigningKey::parse("0xab").is_err());
    }
}
