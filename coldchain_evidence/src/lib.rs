//! Append-only audit ledger for cold-chain escrow events.
//!
//! Every state change the engine commits (role grants, model updates,
//! shipment creation, evidence submission, settlement decisions) is recorded
//! as an [`AuditRecord`] carrying its position in the global total order.
//! Anyone holding the ledger and the model can re-derive every settlement.
//!
//! # Modules
//!
//! - [`export`]: JSONL exporter with schema header and size rotation.
//! - [`render`]: one-line and paragraph summaries for terminals.
//!
//! # Example
//!
//! ```
//! use coldchain_evidence::{AuditEvent, AuditLedger};
//! use coldchain_kernel::{Amount, Principal, ShipmentId};
//!
//! let mut ledger = AuditLedger::new();
//! let sender = Principal::from_raw(2);
//! let record = ledger.append(
//!     sender,
//!     AuditEvent::ShipmentCreated {
//!         shipment: ShipmentId::FIRST,
//!         carrier: Principal::from_raw(3),
//!         amount: Amount::new(1_000),
//!     },
//! );
//! assert_eq!(record.seq, 1);
//! assert!(record.is_valid());
//! ```

#![forbid(unsafe_code)]

pub mod export;
pub mod render;

use std::fmt;
use std::io;

use coldchain_kernel::{Amount, DecisionId, Principal, Role, SchemaVersion, ShipmentId};
use serde::{Deserialize, Serialize};

/// Version of the [`AuditRecord`] wire format.
pub const AUDIT_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// Number of evidence nodes an event may reference (ids `1..=5`).
const NODE_COUNT: u8 = 5;

// ---------------------------------------------------------------------------
// AuditEvent
// ---------------------------------------------------------------------------

/// A committed state change.
///
/// Probabilities are integer percentages in `[0, 100]`; node ids are in
/// `1..=5`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A role was granted.
    RoleGranted {
        /// Granted role.
        role: Role,
        /// Principal receiving the role.
        principal: Principal,
    },
    /// A role was revoked.
    RoleRevoked {
        /// Revoked role.
        role: Role,
        /// Principal losing the role.
        principal: Principal,
    },
    /// The global prior pair was overwritten.
    PriorsSet {
        /// P(F1 = true).
        f1: u8,
        /// P(F2 = true).
        f2: u8,
    },
    /// A conditional probability table was overwritten.
    CptSet {
        /// Evidence node id.
        node: u8,
        /// `[p_ff, p_ft, p_tf, p_tt]`.
        table: [u8; 4],
    },
    /// A shipment was opened and its funds escrowed.
    ShipmentCreated {
        /// New shipment id.
        shipment: ShipmentId,
        /// Carrier entitled to the payout.
        carrier: Principal,
        /// Escrowed amount.
        amount: Amount,
    },
    /// A sensor reading was recorded.
    EvidenceSubmitted {
        /// Target shipment.
        shipment: ShipmentId,
        /// Evidence node id.
        node: u8,
        /// Observed value.
        value: bool,
        /// Whether an earlier reading for the same node was replaced.
        overwrote: bool,
    },
    /// Settlement ran inference and the posteriors missed the threshold.
    SettlementRejected {
        /// Target shipment.
        shipment: ShipmentId,
        /// Decision identifier.
        decision: DecisionId,
        /// `[posterior_f1, posterior_f2]`.
        posteriors: [u8; 2],
        /// Threshold both posteriors had to reach.
        threshold: u8,
    },
    /// Settlement succeeded and the escrow was paid to the carrier.
    ShipmentSettled {
        /// Settled shipment.
        shipment: ShipmentId,
        /// Decision identifier.
        decision: DecisionId,
        /// Carrier that received the funds.
        carrier: Principal,
        /// Amount paid out.
        amount: Amount,
        /// `[posterior_f1, posterior_f2]`.
        posteriors: [u8; 2],
    },
}

impl AuditEvent {
    /// Stable snake_case event name (matches the serialized `type` tag).
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RoleGranted { .. } => "role_granted",
            Self::RoleRevoked { .. } => "role_revoked",
            Self::PriorsSet { .. } => "priors_set",
            Self::CptSet { .. } => "cpt_set",
            Self::ShipmentCreated { .. } => "shipment_created",
            Self::EvidenceSubmitted { .. } => "evidence_submitted",
            Self::SettlementRejected { .. } => "settlement_rejected",
            Self::ShipmentSettled { .. } => "shipment_settled",
        }
    }

    /// Shipment the event concerns, if any.
    pub const fn shipment(&self) -> Option<ShipmentId> {
        match self {
            Self::ShipmentCreated { shipment, .. }
            | Self::EvidenceSubmitted { shipment, .. }
            | Self::SettlementRejected { shipment, .. }
            | Self::ShipmentSettled { shipment, .. } => Some(*shipment),
            Self::RoleGranted { .. }
            | Self::RoleRevoked { .. }
            | Self::PriorsSet { .. }
            | Self::CptSet { .. } => None,
        }
    }

    /// Check value ranges.
    pub fn is_valid(&self) -> bool {
        let pct = |v: u8| v <= 100;
        let node_ok = |n: u8| (1..=NODE_COUNT).contains(&n);
        match self {
            Self::RoleGranted { .. } | Self::RoleRevoked { .. } => true,
            Self::PriorsSet { f1, f2 } => pct(*f1) && pct(*f2),
            Self::CptSet { node, table } => node_ok(*node) && table.iter().all(|&v| pct(v)),
            Self::ShipmentCreated { amount, .. } | Self::ShipmentSettled { amount, .. }
                if amount.is_zero() =>
            {
                false
            }
            Self::ShipmentCreated { .. } => true,
            Self::EvidenceSubmitted { node, .. } => node_ok(*node),
            Self::SettlementRejected {
                posteriors,
                threshold,
                ..
            } => posteriors.iter().all(|&v| pct(v)) && pct(*threshold),
            Self::ShipmentSettled { posteriors, .. } => posteriors.iter().all(|&v| pct(v)),
        }
    }
}

// ---------------------------------------------------------------------------
// AuditRecord
// ---------------------------------------------------------------------------

/// One entry of the audit ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Position in the global total order, starting at 1.
    pub seq: u64,
    /// Principal whose call produced the event.
    pub actor: Principal,
    /// What happened.
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditRecord {
    /// Whether the sequence number and event payload are in range.
    pub fn is_valid(&self) -> bool {
        self.seq > 0 && self.event.is_valid()
    }
}

// ---------------------------------------------------------------------------
// AuditLedger
// ---------------------------------------------------------------------------

/// Errors raised when rebuilding a ledger from persisted records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerError {
    /// Sequence numbers are not exactly `1, 2, 3, ...`.
    SequenceGap {
        /// Expected sequence number.
        expected: u64,
        /// Sequence number found.
        got: u64,
    },
    /// A record failed [`AuditRecord::is_valid`].
    InvalidRecord {
        /// Sequence number of the offending record.
        seq: u64,
    },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SequenceGap { expected, got } => {
                write!(f, "audit sequence gap: expected {expected}, got {got}")
            }
            Self::InvalidRecord { seq } => write!(f, "audit record {seq} is out of range"),
        }
    }
}

impl std::error::Error for LedgerError {}

/// In-memory append-only audit ledger.
///
/// Records are never modified or removed once appended.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLedger {
    records: Vec<AuditRecord>,
}

impl AuditLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted records, checking their order.
    pub fn from_records(records: Vec<AuditRecord>) -> Result<Self, LedgerError> {
        for (expected, record) in (1_u64..).zip(&records) {
            if record.seq != expected {
                return Err(LedgerError::SequenceGap {
                    expected,
                    got: record.seq,
                });
            }
            if !record.is_valid() {
                return Err(LedgerError::InvalidRecord { seq: record.seq });
            }
        }
        Ok(Self { records })
    }

    /// Sequence number the next appended record will receive.
    pub fn next_seq(&self) -> u64 {
        self.records.len() as u64 + 1
    }

    /// Append an event and return the stored record.
    pub fn append(&mut self, actor: Principal, event: AuditEvent) -> &AuditRecord {
        let seq = self.next_seq();
        self.records.push(AuditRecord { seq, actor, event });
        &self.records[self.records.len() - 1]
    }

    /// All records in order.
    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    /// Most recent record.
    pub fn last(&self) -> Option<&AuditRecord> {
        self.records.last()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record has been appended.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records concerning one shipment, in order.
    pub fn for_shipment(&self, shipment: ShipmentId) -> impl Iterator<Item = &AuditRecord> {
        self.records
            .iter()
            .filter(move |r| r.event.shipment() == Some(shipment))
    }
}

// ---------------------------------------------------------------------------
// AuditSink
// ---------------------------------------------------------------------------

/// Destination that mirrors ledger records as they are committed.
///
/// A failing sink never rolls back the committed state change; the caller
/// decides how to surface the I/O error.
pub trait AuditSink {
    /// Receive one committed record.
    fn record(&mut self, record: &AuditRecord) -> io::Result<()>;

    /// Flush any buffered output.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AuditSink for Vec<AuditRecord> {
    fn record(&mut self, record: &AuditRecord) -> io::Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
