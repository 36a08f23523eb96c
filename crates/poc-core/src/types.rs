//! Core type definitions for Proof of Contribution
//!
//! Amounts are fixed-point integers with 18 decimals, the same layout as wei
//! and as ERC-20 balances, so a single `u128` alias covers both.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Course identifier (matches the `uint256 courseId` keys, small in practice)
pub type CourseId = u64;

/// Module identifier within a course, 1-based
pub type ModuleId = u32;

/// Chain identifier (EIP-155)
pub type ChainId = u64;

/// Native currency amount in wei
pub type Wei = u128;

/// Token balance in the smallest unit
pub type Balance = u128;

/// Decimal places shared by ETH and DataCoin
pub const DECIMALS: u8 = 18;

/// One whole unit (1 ETH / 1 DATA) in the smallest unit
pub const ONE_UNIT: u128 = 1_000_000_000_000_000_000; // 10^18

/// Address - 20-byte account identifier
///
/// Always rendered in lower-case `0x` hex so that addresses coming from
/// different wallets compare equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// The zero address
    pub const ZERO: Self = Self([0u8; 20]);

    /// Create from raw bytes
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Address with every byte set to `byte` (handy for fixtures)
    pub const fn repeat_byte(byte: u8) -> Self {
        Self([byte; 20])
    }

    /// Derive a deterministic address from arbitrary content
    pub fn derive(content: &[u8]) -> Self {
        let hash = blake3::hash(content);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash.as_bytes()[12..]);
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Is this the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Lower-case `0x` hex form
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex, with or without the `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.len() != 40 {
            return Err(CoreError::InvalidAddress(s.to_string()));
        }

        let bytes = hex::decode(digits).map_err(|_| CoreError::InvalidAddress(s.to_string()))?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Address({}…{})", &hex[..6], &hex[38..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Format a fixed-point amount as a decimal string, trimming trailing zeros
///
/// `format_units(100_000_000_000_000, 18) == "0.0001"`
pub fn format_units(amount: u128, decimals: u8) -> String {
    let base = 10u128.pow(decimals as u32);
    let whole = amount / base;
    let frac = amount % base;

    if frac == 0 {
        return whole.to_string();
    }

    let frac_str = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac_str.trim_end_matches('0'))
}

/// Parse a decimal string into a fixed-point amount
///
/// `parse_units("0.0001", 18) == Ok(100_000_000_000_000)`
pub fn parse_units(value: &str, decimals: u8) -> Result<u128> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CoreError::InvalidAmount(value.to_string()));
    }

    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };

    if frac.len() > decimals as usize {
        return Err(CoreError::TooManyDecimals {
            given: frac.len(),
            max: decimals,
        });
    }

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) || (whole.is_empty() && frac.is_empty()) {
        return Err(CoreError::InvalidAmount(value.to_string()));
    }

    let base = 10u128.pow(decimals as u32);
    let whole_units: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| CoreError::Overflow)?
    };

    let frac_units: u128 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        padded.parse().map_err(|_| CoreError::Overflow)?
    };

    whole_units
        .checked_mul(base)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or(CoreError::Overflow)
}

/// Derive a `0x`-prefixed 32-byte transaction hash from its parts
pub fn derive_tx_hash(parts: &[&[u8]]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    format!("0x{}", hasher.finalize().to_hex())
}

/// Serde adapter writing `u128` amounts as decimal strings
///
/// JSON clients cannot hold 18-decimal amounts in a double, so amounts cross
/// the wire as strings. Numbers are still accepted on input.
pub mod serde_amount {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an unsigned integer or a decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(v as u128)
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom("negative amount"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            v.trim().parse().map_err(E::custom)
        }
    }

    /// Same adapter for optional amounts
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<u128>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_str(&v.to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u128>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] u128);

            let wrapped: Option<Wrapper> = Option::deserialize(deserializer)?;
            Ok(wrapped.map(|Wrapper(v)| v))
        }
    }
}
