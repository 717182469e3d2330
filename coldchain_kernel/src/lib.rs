//! Shared type substrate for the cold-chain escrow workspace.
//!
//! Identifier, role and amount types used by the audit ledger
//! (`coldchain-evidence`), the inference crate (`coldchain-decision`) and the
//! escrow engine itself.
//!
//! All identifiers are `Copy`, `Send + Sync`, and serialize transparently.
//! 128-bit identifiers are hex-encoded on the wire so they survive JSON
//! consumers that only understand 53-bit integers.

#![forbid(unsafe_code)]
#![no_std]

extern crate alloc;

use alloc::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Principal: caller identity
// ---------------------------------------------------------------------------

/// 128-bit identity of an account that can call into the engine.
///
/// The engine never authenticates principals itself; it trusts the
/// surrounding substrate to hand it the identity of the caller, the way a
/// ledger hands a contract its sender.
///
/// ```
/// use coldchain_kernel::Principal;
///
/// let sensor = Principal::from_raw(0xABCD);
/// let hex = sensor.to_string();
/// let parsed: Principal = hex.parse().unwrap();
/// assert_eq!(sensor, parsed);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(#[serde(with = "hex_u128")] u128);

impl Principal {
    /// Create a `Principal` from a raw 128-bit value.
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Return the raw 128-bit value.
    pub const fn as_u128(self) -> u128 {
        self.0
    }

    /// Return the bytes in big-endian order.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Construct from big-endian bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({:032x})", self.0)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for Principal {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = u128::from_str_radix(s, 16).map_err(|_| ParseIdError {
            kind: "Principal",
            input_len: s.len(),
        })?;
        Ok(Self(val))
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Capability a principal may hold.
///
/// There is no carrier role: the carrier of a shipment is the principal
/// named at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May grant and revoke roles.
    Admin,
    /// May configure priors and conditional probability tables.
    Operator,
    /// May submit evidence readings.
    Sensor,
    /// May open shipments and escrow funds.
    Sender,
}

impl Role {
    /// Every grantable role, in declaration order.
    pub const ALL: [Self; 4] = [Self::Admin, Self::Operator, Self::Sensor, Self::Sender];

    /// Lowercase role name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Operator => "operator",
            Self::Sensor => "sensor",
            Self::Sender => "sender",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .ok_or(ParseIdError {
                kind: "Role",
                input_len: s.len(),
            })
    }
}

// ---------------------------------------------------------------------------
// ShipmentId: sequential shipment identifier
// ---------------------------------------------------------------------------

/// Sequential identifier of an escrowed shipment.
///
/// Ids are handed out in strictly increasing order by the registry and are
/// never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentId(u64);

impl ShipmentId {
    /// The first id handed out by a fresh registry.
    pub const FIRST: Self = Self(1);

    /// Wrap a raw sequence number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw sequence number.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The id following this one, or `None` once the sequence is exhausted.
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }
}

impl fmt::Debug for ShipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShipmentId({})", self.0)
    }
}

impl fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for ShipmentId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('#').unwrap_or(s);
        let val = digits.parse::<u64>().map_err(|_| ParseIdError {
            kind: "ShipmentId",
            input_len: s.len(),
        })?;
        Ok(Self(val))
    }
}

// ---------------------------------------------------------------------------
// DecisionId: settlement decision identifier
// ---------------------------------------------------------------------------

/// 128-bit identifier linking a settlement decision to its audit record.
///
/// The high 64 bits hold the shipment id, the low 64 bits the ledger
/// sequence number at which the decision was taken, so ids sort by shipment
/// first and by time second.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(#[serde(with = "hex_u128")] u128);

impl DecisionId {
    /// Create from raw 128-bit value.
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Create from a shipment and the ledger sequence number of the attempt.
    pub const fn from_parts(shipment: ShipmentId, seq: u64) -> Self {
        Self(((shipment.0 as u128) << 64) | seq as u128)
    }

    /// Shipment this decision was taken for.
    pub const fn shipment(self) -> ShipmentId {
        ShipmentId((self.0 >> 64) as u64)
    }

    /// Ledger sequence number of the attempt.
    pub const fn seq(self) -> u64 {
        self.0 as u64
    }

    /// Return the raw 128-bit value.
    pub const fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Debug for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecisionId({:032x})", self.0)
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for DecisionId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = u128::from_str_radix(s, 16).map_err(|_| ParseIdError {
            kind: "DecisionId",
            input_len: s.len(),
        })?;
        Ok(Self(val))
    }
}

// ---------------------------------------------------------------------------
// Amount: smallest transferable unit
// ---------------------------------------------------------------------------

/// Non-negative monetary amount in the smallest transferable unit.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Zero units.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw unit count.
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    /// Raw unit count.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this amount is zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition; `None` on overflow.
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction; `None` if `other` exceeds `self`.
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SchemaVersion: semantic version with compatibility checking
// ---------------------------------------------------------------------------

/// Semantic version (major.minor.patch) of a persisted format.
///
/// Two versions are compatible iff their major versions match.
///
/// ```
/// use coldchain_kernel::SchemaVersion;
///
/// let written = SchemaVersion::new(1, 0, 0);
/// assert!(written.is_compatible(&SchemaVersion::new(1, 4, 2)));
/// assert!(!written.is_compatible(&SchemaVersion::new(2, 0, 0)));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version: breaking changes.
    pub major: u32,
    /// Minor version: backwards-compatible additions.
    pub minor: u32,
    /// Patch version: backwards-compatible fixes.
    pub patch: u32,
}

impl SchemaVersion {
    /// Create a new schema version.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns `true` if `other` is compatible (same major version).
    pub const fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SchemaVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut next = || -> Result<u32, ParseVersionError> {
            parts
                .next()
                .ok_or(ParseVersionError)?
                .parse()
                .map_err(|_| ParseVersionError)
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(ParseVersionError);
        }
        Ok(version)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Error returned when parsing an identifier or role fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseIdError {
    /// Which type was being parsed.
    pub kind: &'static str,
    /// Length of the input string.
    pub input_len: usize,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} string (length {})",
            self.kind, self.input_len
        )
    }
}

impl core::error::Error for ParseIdError {}

/// Error returned when parsing a semantic version string fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseVersionError;

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid schema version (expected major.minor.patch)")
    }
}

impl core::error::Error for ParseVersionError {}

// ---------------------------------------------------------------------------
// Serde helper: serialize u128 as hex string
// ---------------------------------------------------------------------------

mod hex_u128 {
    use alloc::format;
    use alloc::string::String;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{value:032x}"))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        u128::from_str_radix(&s, 16)
            .map_err(|_| serde::de::Error::custom(format!("invalid hex u128: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
