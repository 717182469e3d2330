//! Error types for the escrow engine.
//!
//! Every failure maps onto one of five [`ErrorKind`]s. Only
//! [`ErrorKind::IncompleteData`] is worth retrying, and only after the
//! missing evidence arrives; the engine itself never retries.

use coldchain_decision::{EvidenceVector, InferenceError, NodeId, Posteriors, ValidationError};
use coldchain_kernel::{Amount, DecisionId, Principal, Role, SchemaVersion, ShipmentId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller lacks the required role or is not the shipment's carrier.
    Authorization,
    /// Bad input or an operation not allowed in the current state.
    Validation,
    /// Evidence is missing; retryable once it arrives.
    IncompleteData,
    /// Posteriors fell below the compliance threshold.
    ComplianceRejection,
    /// An arithmetic invariant failed.
    InternalInvariant,
}

impl ErrorKind {
    /// Stable snake_case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::Validation => "validation",
            Self::IncompleteData => "incomplete_data",
            Self::ComplianceRejection => "compliance_rejection",
            Self::InternalInvariant => "internal_invariant",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`EscrowEngine`](crate::EscrowEngine) operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller does not hold `role`.
    #[error("{caller} lacks the {role} role")]
    MissingRole {
        /// Calling principal.
        caller: Principal,
        /// Required role.
        role: Role,
    },

    /// Only the carrier named at creation may settle.
    #[error("{caller} is not the carrier of shipment {shipment}")]
    NotCarrier {
        /// Calling principal.
        caller: Principal,
        /// Target shipment.
        shipment: ShipmentId,
    },

    /// An admin tried to drop its own admin role.
    #[error("admin {caller} cannot revoke its own admin role")]
    SelfRevoke {
        /// Calling admin.
        caller: Principal,
    },

    /// Out-of-range probability, unknown node, or malformed evidence.
    #[error(transparent)]
    InvalidValue(#[from] ValidationError),

    /// No shipment with this id.
    #[error("shipment {0} does not exist")]
    UnknownShipment(ShipmentId),

    /// The shipment already paid out.
    #[error("shipment {0} is already settled")]
    AlreadySettled(ShipmentId),

    /// Evidence cannot change after a compliance rejection.
    #[error("evidence for shipment {shipment} is sealed by rejected decision {decision}")]
    EvidenceSealed {
        /// Target shipment.
        shipment: ShipmentId,
        /// Rejected decision that sealed it.
        decision: DecisionId,
    },

    /// Escrow amounts must be positive.
    #[error("escrow amount must be positive")]
    ZeroAmount,

    /// The sender cannot cover the escrow.
    #[error("{principal} holds {available}, escrow requires {required}")]
    InsufficientFunds {
        /// Sender.
        principal: Principal,
        /// Current balance.
        available: Amount,
        /// Requested escrow.
        required: Amount,
    },

    /// Some CPTs have never been configured.
    #[error("probability model incomplete: no CPT for {}", node_list(.missing))]
    ModelIncomplete {
        /// Unconfigured nodes.
        missing: Vec<NodeId>,
    },

    /// Not all five evidence slots are filled.
    #[error("evidence incomplete for shipment {shipment}: missing {}", node_list(.missing))]
    EvidenceIncomplete {
        /// Target shipment.
        shipment: ShipmentId,
        /// Empty slots.
        missing: Vec<NodeId>,
    },

    /// Posteriors below threshold; the shipment stays open.
    #[error(
        "compliance requirements not met for shipment {shipment}: {posteriors} (threshold {threshold}%)"
    )]
    ComplianceRejected {
        /// Target shipment.
        shipment: ShipmentId,
        /// Audited decision.
        decision: DecisionId,
        /// Computed posteriors.
        posteriors: Posteriors,
        /// Threshold both had to reach.
        threshold: u8,
    },

    /// Every hypothesis got zero weight.
    #[error(
        "zero normalization for evidence {evidence}: model assigns no weight to any hypothesis"
    )]
    ZeroNormalization {
        /// Evidence that produced it.
        evidence: EvidenceVector,
    },

    /// Checked arithmetic overflowed.
    #[error("arithmetic overflow while {context}")]
    Overflow {
        /// Operation in progress.
        context: &'static str,
    },

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A snapshot was written by an incompatible version.
    #[error("snapshot version {found} is incompatible with {expected}")]
    IncompatibleSnapshot {
        /// Version found in the snapshot.
        found: SchemaVersion,
        /// Version this build writes.
        expected: SchemaVersion,
    },

    /// A snapshot failed to parse or violates an invariant.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),
}

fn node_list(nodes: &[NodeId]) -> String {
    nodes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingRole { .. } | Self::NotCarrier { .. } => ErrorKind::Authorization,
            Self::SelfRevoke { .. }
            | Self::InvalidValue(_)
            | Self::UnknownShipment(_)
            | Self::AlreadySettled(_)
            | Self::EvidenceSealed { .. }
            | Self::ZeroAmount
            | Self::InsufficientFunds { .. }
            | Self::ModelIncomplete { .. }
            | Self::Config(_)
            | Self::IncompatibleSnapshot { .. }
            | Self::MalformedSnapshot(_) => ErrorKind::Validation,
            Self::EvidenceIncomplete { .. } => ErrorKind::IncompleteData,
            Self::ComplianceRejected { .. } => ErrorKind::ComplianceRejection,
            Self::ZeroNormalization { .. } | Self::Overflow { .. } => ErrorKind::InternalInvariant,
        }
    }

    /// Whether the same call can succeed later without a model change.
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::IncompleteData)
    }
}

impl From<InferenceError> for Error {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::ModelIncomplete { missing } => Self::ModelIncomplete { missing },
            InferenceError::ZeroNormalization { evidence } => Self::ZeroNormalization { evidence },
        }
    }
}
