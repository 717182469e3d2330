//! Coldchain: a deterministic escrow engine for cold-chain shipments.
//!
//! # Overview
//!
//! A sender escrows funds for a shipment. Sensors report five binary
//! evidence readings. When the carrier asks to be paid, the engine runs
//! exact integer Bayesian inference over two hidden failure factors and
//! releases the escrow only if the posterior probability that each factor
//! did **not** fail reaches the compliance threshold (95% by default).
//!
//! Every number is an integer and the rounding rule is fixed, so two
//! independent nodes fed the same model and evidence reach the same
//! verdict.
//!
//! # Core Guarantees
//!
//! - **All-or-nothing calls**: a failed operation leaves no trace, except a
//!   compliance rejection, which is recorded in the audit ledger
//! - **Single payout**: a shipment settles at most once, even under
//!   concurrent callers ([`SharedEngine`])
//! - **Conservation**: balances plus open escrow only change by external
//!   credits
//! - **Replayable decisions**: each settlement produces a
//!   [`DecisionAuditEntry`] with the joint table and a model fingerprint
//!
//! # Module Structure
//!
//! - [`engine`]: [`EscrowEngine`] and [`SharedEngine`]
//! - [`access`]: role grants
//! - [`model`]: the global probability model and its fingerprint
//! - [`registry`]: shipments and their evidence
//! - [`settlement`]: per-shipment inference and verdict
//! - [`funds`]: balances outside escrow
//! - [`config`]: [`EngineConfig`] and loaders
//! - [`scenario`]: declarative scenario runner
//! - [`error`](mod@error): [`Error`] and [`ErrorKind`]
//!
//! Inference itself lives in [`coldchain_decision`]; identifiers in
//! [`coldchain_kernel`]; audit records in [`coldchain_evidence`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod access;
pub mod config;
pub mod engine;
pub mod error;
pub mod funds;
pub mod model;
pub mod registry;
pub mod scenario;
pub mod settlement;

mod tracing_compat;

pub use access::AccessControl;
pub use config::{ConfigError, ConfigLoader, EngineConfig, ModelPolicy};
pub use engine::{
    EngineSnapshot, EngineStats, EscrowEngine, SNAPSHOT_SCHEMA_VERSION, SharedEngine, StatsSnapshot,
};
pub use error::{Error, ErrorKind, Result};
pub use funds::{FundsLedger, InMemoryFunds};
pub use model::{ModelStore, fingerprint};
pub use registry::{Shipment, ShipmentStatus};
pub use scenario::{
    Action, Expected, Scenario, ScenarioError, ScenarioReport, ScenarioRunner, Step, StepOutcome,
    StepReport, principal_for,
};

pub use coldchain_decision::{
    ComplianceThreshold, Cpt, DEFAULT_THRESHOLD, DecisionAuditEntry, EvidenceVector, Hypothesis,
    JointTable, NodeId, Percent, Posteriors, Priors, ProbabilityModel, Verdict, infer, infer_model,
};
pub use coldchain_evidence::{AuditEvent, AuditLedger, AuditRecord, AuditSink};
pub use coldchain_kernel::{Amount, DecisionId, Principal, Role, SchemaVersion, ShipmentId};

pub use coldchain_decision;
pub use coldchain_evidence;
pub use coldchain_kernel;
