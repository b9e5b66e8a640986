use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Shortest and longest base58 rendering of a 32-byte key.
pub const MIN_ADDRESS_LEN: usize = 32;
pub const MAX_ADDRESS_LEN: usize = 44;

/// Wallet address on the settlement chain: a 32-byte public key, base58 encoded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress([u8; 32]);

impl WalletAddress {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Parse a base58 address, checking the alphabet, the rendered length and
    /// that it decodes to exactly 32 bytes.
    pub fn parse(address: &str) -> Result<Self> {
        let trimmed = address.trim();
        if trimmed.len() < MIN_ADDRESS_LEN || trimmed.len() > MAX_ADDRESS_LEN {
            return Err(TypesError::InvalidAddress(format!(
                "length {} outside {}..={}",
                trimmed.len(),
                MIN_ADDRESS_LEN,
                MAX_ADDRESS_LEN
            )));
        }

        let decoded = bs58::decode(trimmed)
            .into_vec()
            .map_err(|e| TypesError::InvalidAddress(e.to_string()))?;

        let bytes: [u8; 32] = decoded.as_slice().try_into().map_err(|_| {
            TypesError::InvalidAddress(format!("decodes to {} bytes, expected 32", decoded.len()))
        })?;

        Ok(Self(bytes))
    }

    pub fn is_valid(address: &str) -> bool {
        Self::parse(address).is_ok()
    }

    /// Short hex prefix for log fields.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl FromStr for WalletAddress {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(address: WalletAddress) -> Self {
        address.to_base58()
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl fmt::Debug for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletAddress({})", self.to_base58())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base58_roundtrip() {
        let address = WalletAddress::from_bytes([7u8; 32]);
        let encoded = address.to_base58();
        assert!(encoded.len() >= MIN_ADDRESS_LEN && encoded.len() <= MAX_ADDRESS_LEN);
        assert_eq!(WalletAddress::parse(&encoded).unwrap(), address);
    }

    #[test]
    fn test_rejects_bad_alphabet_and_length() {
        // '0', 'O', 'I' and 'l' are outside the base58 alphabet
        assert!(!WalletAddress::is_valid("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl"));
        assert!(!WalletAddress::is_valid("short"));
        assert!(!WalletAddress::is_valid(&"1".repeat(45)));
    }

    #[test]
    fn test_rejects_wrong_byte_length() {
        let sixteen = bs58::encode([9u8; 24]).into_string();
        assert!(WalletAddress::parse(&sixteen).is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let address = WalletAddress::from_bytes([3u8; 32]);
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{}\"", address.to_base58()));
        let back: WalletAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }
}
