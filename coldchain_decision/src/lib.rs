//! Integer-only Bayesian compliance inference for cold-chain escrow.
//!
//! The third leg of the workspace alongside `coldchain_kernel` (types) and
//! `coldchain_evidence` (audit ledger). Settlement asks this crate one
//! question: given the configured network and a shipment's five readings,
//! how likely is it that the cold chain and the packaging both held?
//!
//! # Core abstractions
//!
//! - [`Percent`], [`Priors`], [`Cpt`]: probability values scaled by 100.
//! - [`ProbabilityModel`]: two priors and five CPTs, some possibly unset.
//! - [`EvidenceVector`]: the five observed booleans.
//! - [`JointTable`]: exact joint weights for the four hidden hypotheses.
//!   Every weight is a product of seven factors of at most 100, so it fits a
//!   `u64` without rescaling.
//! - [`ComplianceThreshold`]: both posteriors must reach it to pay.
//! - [`DecisionAuditEntry`]: the re-derivable record of one settlement
//!   attempt, convertible into an [`AuditEvent`].
//!
//! # Example
//!
//! ```
//! use coldchain_decision::{Cpt, EvidenceVector, Priors, infer};
//!
//! let priors = Priors::new(90, 90).unwrap();
//! let cpts = [
//!     Cpt::new(5, 5, 98, 98).unwrap(),
//!     Cpt::new(1, 99, 1, 99).unwrap(),
//!     Cpt::new(70, 10, 70, 10).unwrap(),
//!     Cpt::new(95, 2, 95, 2).unwrap(),
//!     Cpt::new(20, 80, 80, 99).unwrap(),
//! ];
//! let evidence = EvidenceVector::new([true, true, false, false, true]);
//! let posteriors = infer(priors, &cpts, evidence).unwrap();
//! assert_eq!((posteriors.f1, posteriors.f2), (100, 100));
//! ```

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use coldchain_evidence::AuditEvent;
use coldchain_kernel::{Amount, DecisionId, Principal, ShipmentId};
use serde::{Deserialize, Serialize};

/// Number of evidence nodes in the network.
pub const NODE_COUNT: usize = 5;

/// Threshold used when none is configured.
pub const DEFAULT_THRESHOLD: u8 = 95;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Validation errors for model and evidence values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// A probability is above 100.
    PercentOutOfRange {
        /// Which field.
        field: &'static str,
        /// The invalid value.
        value: u8,
    },
    /// Node id outside `1..=5`.
    UnknownNode {
        /// The invalid id.
        node: u8,
    },
    /// Evidence string is not five `T`/`F` characters.
    MalformedEvidence {
        /// Length of the rejected input.
        input_len: usize,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PercentOutOfRange { field, value } => {
                write!(f, "{field} = {value} is outside [0, 100]")
            }
            Self::UnknownNode { node } => write!(f, "unknown evidence node {node}"),
            Self::MalformedEvidence { input_len } => write!(
                f,
                "evidence must be 5 characters of T/F, got {input_len} characters"
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors raised while computing posteriors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InferenceError {
    /// One or more CPTs have never been configured.
    ModelIncomplete {
        /// Nodes without a CPT, ascending.
        missing: Vec<NodeId>,
    },
    /// Every hypothesis received zero weight, so the normaliser is zero.
    ZeroNormalization {
        /// Evidence that produced the degenerate table.
        evidence: EvidenceVector,
    },
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelIncomplete { missing } => {
                write!(f, "probability model incomplete: no CPT for")?;
                for node in missing {
                    write!(f, " {node}")?;
                }
                Ok(())
            }
            Self::ZeroNormalization { evidence } => {
                write!(f, "all hypotheses have zero weight for evidence {evidence}")
            }
        }
    }
}

impl std::error::Error for InferenceError {}

// ---------------------------------------------------------------------------
// Percent
// ---------------------------------------------------------------------------

/// Integer probability in `[0, 100]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Percent(u8);

impl Percent {
    /// 0%.
    pub const ZERO: Self = Self(0);
    /// 100%.
    pub const HUNDRED: Self = Self(100);

    /// Returns `None` above 100.
    pub const fn new(value: u8) -> Option<Self> {
        if value <= 100 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Validate `value`, naming `field` in the error.
    pub fn checked(value: u8, field: &'static str) -> Result<Self, ValidationError> {
        Self::new(value).ok_or(ValidationError::PercentOutOfRange { field, value })
    }

    /// Raw value.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// `100 - self`.
    pub const fn complement(self) -> Self {
        Self(100 - self.0)
    }

    /// `self` if `holds`, otherwise the complement, widened for products.
    const fn term(self, holds: bool) -> u64 {
        if holds {
            self.0 as u64
        } else {
            self.complement().0 as u64
        }
    }
}

impl TryFrom<u8> for Percent {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::checked(value, "percent")
    }
}

impl From<Percent> for u8 {
    fn from(value: Percent) -> Self {
        value.0
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

// ---------------------------------------------------------------------------
// Hypothesis
// ---------------------------------------------------------------------------

/// One assignment of the two hidden factors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Hypothesis {
    /// Temperature-chain integrity.
    pub f1: bool,
    /// Packaging integrity.
    pub f2: bool,
}

impl Hypothesis {
    /// F1 = false, F2 = false.
    pub const FF: Self = Self {
        f1: false,
        f2: false,
    };
    /// F1 = false, F2 = true.
    pub const FT: Self = Self {
        f1: false,
        f2: true,
    };
    /// F1 = true, F2 = false.
    pub const TF: Self = Self {
        f1: true,
        f2: false,
    };
    /// F1 = true, F2 = true.
    pub const TT: Self = Self { f1: true, f2: true };

    /// All hypotheses in table order.
    pub const ALL: [Self; 4] = [Self::FF, Self::FT, Self::TF, Self::TT];

    /// Position in [`Self::ALL`] and in every CPT.
    pub const fn index(self) -> usize {
        (self.f1 as usize) * 2 + self.f2 as usize
    }
}

impl fmt::Display for Hypothesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = |b: bool| if b { 'T' } else { 'F' };
        write!(f, "({},{})", c(self.f1), c(self.f2))
    }
}

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Evidence node id in `1..=5`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct NodeId(u8);

impl NodeId {
    /// All nodes, ascending.
    pub const ALL: [Self; NODE_COUNT] = [Self(1), Self(2), Self(3), Self(4), Self(5)];

    /// Validate a raw node id.
    pub fn new(raw: u8) -> Result<Self, ValidationError> {
        if (1..=NODE_COUNT as u8).contains(&raw) {
            Ok(Self(raw))
        } else {
            Err(ValidationError::UnknownNode { node: raw })
        }
    }

    /// Raw id.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Zero-based slot index.
    pub const fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl TryFrom<u8> for NodeId {
    type Error = ValidationError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<NodeId> for u8 {
    fn from(node: NodeId) -> Self {
        node.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Priors and CPTs
// ---------------------------------------------------------------------------

/// Prior probabilities that each hidden factor is true.
///
/// Defaults to `(0, 0)`, the value of never-configured storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Priors {
    /// P(F1 = true).
    pub f1: Percent,
    /// P(F2 = true).
    pub f2: Percent,
}

impl Priors {
    /// Validate both priors.
    pub fn new(f1: u8, f2: u8) -> Result<Self, ValidationError> {
        Ok(Self {
            f1: Percent::checked(f1, "prior_f1")?,
            f2: Percent::checked(f2, "prior_f2")?,
        })
    }

    /// `prior(h)`: product of the two prior terms, in `[0, 10^4]`.
    pub const fn weight(self, h: Hypothesis) -> u64 {
        self.f1.term(h.f1) * self.f2.term(h.f2)
    }
}

/// Conditional probability table: P(node = true | F1, F2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cpt {
    /// F1 = false, F2 = false.
    pub ff: Percent,
    /// F1 = false, F2 = true.
    pub ft: Percent,
    /// F1 = true, F2 = false.
    pub tf: Percent,
    /// F1 = true, F2 = true.
    pub tt: Percent,
}

impl Cpt {
    /// Validate the four entries.
    pub fn new(ff: u8, ft: u8, tf: u8, tt: u8) -> Result<Self, ValidationError> {
        Ok(Self {
            ff: Percent::checked(ff, "p_ff")?,
            ft: Percent::checked(ft, "p_ft")?,
            tf: Percent::checked(tf, "p_tf")?,
            tt: Percent::checked(tt, "p_tt")?,
        })
    }

    /// Build from `[p_ff, p_ft, p_tf, p_tt]`.
    pub fn from_table(table: [u8; 4]) -> Result<Self, ValidationError> {
        let [ff, ft, tf, tt] = table;
        Self::new(ff, ft, tf, tt)
    }

    /// `[p_ff, p_ft, p_tf, p_tt]`.
    pub const fn table(self) -> [u8; 4] {
        [self.ff.0, self.ft.0, self.tf.0, self.tt.0]
    }

    /// P(node = true | h).
    pub const fn given(self, h: Hypothesis) -> Percent {
        match (h.f1, h.f2) {
            (false, false) => self.ff,
            (false, true) => self.ft,
            (true, false) => self.tf,
            (true, true) => self.tt,
        }
    }

    /// P(node = observed | h), in `[0, 100]`.
    pub const fn likelihood(self, h: Hypothesis, observed: bool) -> u64 {
        self.given(h).term(observed)
    }
}

// ---------------------------------------------------------------------------
// ProbabilityModel
// ---------------------------------------------------------------------------

/// The configured network: global priors plus one CPT per evidence node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbabilityModel {
    priors: Priors,
    cpts: [Option<Cpt>; NODE_COUNT],
}

impl ProbabilityModel {
    /// Empty model: priors `(0, 0)`, no CPTs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current priors.
    pub const fn priors(&self) -> Priors {
        self.priors
    }

    /// Replace the priors, returning the previous pair.
    pub fn set_priors(&mut self, priors: Priors) -> Priors {
        std::mem::replace(&mut self.priors, priors)
    }

    /// CPT for `node`, if configured.
    pub const fn cpt(&self, node: NodeId) -> Option<Cpt> {
        self.cpts[node.index()]
    }

    /// Replace the CPT for `node`, returning the previous table.
    pub fn set_cpt(&mut self, node: NodeId, cpt: Cpt) -> Option<Cpt> {
        self.cpts[node.index()].replace(cpt)
    }

    /// Nodes without a CPT, ascending.
    pub fn missing(&self) -> Vec<NodeId> {
        NodeId::ALL
            .into_iter()
            .filter(|node| self.cpts[node.index()].is_none())
            .collect()
    }

    /// Whether all five CPTs are configured.
    pub fn is_complete(&self) -> bool {
        self.cpts.iter().all(Option::is_some)
    }

    /// All five CPTs, or the list of missing nodes.
    pub fn complete_cpts(&self) -> Result<[Cpt; NODE_COUNT], InferenceError> {
        let mut out = [Cpt::default(); NODE_COUNT];
        for (slot, cpt) in out.iter_mut().zip(&self.cpts) {
            match cpt {
                Some(cpt) => *slot = *cpt,
                None => {
                    return Err(InferenceError::ModelIncomplete {
                        missing: self.missing(),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Canonical byte encoding used for fingerprints.
    ///
    /// Layout: `f1, f2`, then per node a presence byte followed by the four
    /// table entries (zeros when absent).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + NODE_COUNT * 5);
        bytes.push(self.priors.f1.get());
        bytes.push(self.priors.f2.get());
        for cpt in &self.cpts {
            match cpt {
                Some(cpt) => {
                    bytes.push(1);
                    bytes.extend_from_slice(&cpt.table());
                }
                None => bytes.extend_from_slice(&[0; 5]),
            }
        }
        bytes
    }
}

impl Default for Cpt {
    fn default() -> Self {
        Self {
            ff: Percent::ZERO,
            ft: Percent::ZERO,
            tf: Percent::ZERO,
            tt: Percent::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// EvidenceVector
// ---------------------------------------------------------------------------

/// Observed values of E1..E5.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceVector([bool; NODE_COUNT]);

impl EvidenceVector {
    /// Wrap five readings, E1 first.
    pub const fn new(values: [bool; NODE_COUNT]) -> Self {
        Self(values)
    }

    /// Bit `i` holds node `i + 1`; bits above the fifth are ignored.
    pub const fn from_bits(bits: u8) -> Self {
        let mut values = [false; NODE_COUNT];
        let mut i = 0;
        while i < NODE_COUNT {
            values[i] = bits & (1 << i) != 0;
            i += 1;
        }
        Self(values)
    }

    /// Inverse of [`Self::from_bits`].
    pub fn bits(self) -> u8 {
        self.0
            .iter()
            .enumerate()
            .fold(0, |acc, (i, &v)| acc | (u8::from(v) << i))
    }

    /// All 32 evidence vectors in bit order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..1_u8 << NODE_COUNT).map(Self::from_bits)
    }

    /// Reading for `node`.
    pub const fn get(self, node: NodeId) -> bool {
        self.0[node.index()]
    }

    /// Overwrite the reading for `node`.
    pub fn set(&mut self, node: NodeId, value: bool) {
        self.0[node.index()] = value;
    }

    /// The five readings, E1 first.
    pub const fn values(self) -> [bool; NODE_COUNT] {
        self.0
    }
}

impl fmt::Display for EvidenceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &v in &self.0 {
            f.write_str(if v { "T" } else { "F" })?;
        }
        Ok(())
    }
}

impl FromStr for EvidenceVector {
    type Err = ValidationError;

    /// Parses five characters of `T`/`F` (or `1`/`0`), E1 first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ValidationError::MalformedEvidence { input_len: s.len() };
        if s.len() != NODE_COUNT {
            return Err(err());
        }
        let mut values = [false; NODE_COUNT];
        for (slot, c) in values.iter_mut().zip(s.chars()) {
            *slot = match c {
                'T' | 't' | '1' => true,
                'F' | 'f' | '0' => false,
                _ => return Err(err()),
            };
        }
        Ok(Self(values))
    }
}

// ---------------------------------------------------------------------------
// JointTable and inference
// ---------------------------------------------------------------------------

/// Exact joint weights `prior(h) * Π likelihood_i(h)` and their sum `Z`.
///
/// Each weight is at most `100^7 = 10^14`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointTable {
    joints: [u64; 4],
    z: u64,
}

impl JointTable {
    /// Enumerate the four hypotheses.
    pub fn compute(priors: Priors, cpts: &[Cpt; NODE_COUNT], evidence: EvidenceVector) -> Self {
        let mut joints = [0_u64; 4];
        for h in Hypothesis::ALL {
            joints[h.index()] = cpts
                .iter()
                .zip(evidence.values())
                .fold(priors.weight(h), |acc, (cpt, observed)| {
                    acc * cpt.likelihood(h, observed)
                });
        }
        let z = joints.iter().sum();
        Self { joints, z }
    }

    /// Compute from a model, failing if any CPT is unset.
    pub fn from_model(
        model: &ProbabilityModel,
        evidence: EvidenceVector,
    ) -> Result<Self, InferenceError> {
        let cpts = model.complete_cpts()?;
        Ok(Self::compute(model.priors(), &cpts, evidence))
    }

    /// Weight of one hypothesis.
    pub const fn joint(&self, h: Hypothesis) -> u64 {
        self.joints[h.index()]
    }

    /// Weights in [`Hypothesis::ALL`] order.
    pub const fn joints(&self) -> [u64; 4] {
        self.joints
    }

    /// Normaliser.
    pub const fn z(&self) -> u64 {
        self.z
    }

    /// Marginal posteriors of F1 and F2, rounded half up.
    pub fn posteriors(&self, evidence: EvidenceVector) -> Result<Posteriors, InferenceError> {
        if self.z == 0 {
            return Err(InferenceError::ZeroNormalization { evidence });
        }
        let f1 = self.joint(Hypothesis::TF) + self.joint(Hypothesis::TT);
        let f2 = self.joint(Hypothesis::FT) + self.joint(Hypothesis::TT);
        Ok(Posteriors {
            f1: round_half_up(f1, self.z),
            f2: round_half_up(f2, self.z),
        })
    }
}

/// `(2 * numerator * 100 + z) / (2 * z)` with integer truncation.
///
/// `numerator <= z`, so the result is at most 100.
#[allow(clippy::cast_possible_truncation)]
fn round_half_up(numerator: u64, z: u64) -> u8 {
    let scaled = (2 * numerator * 100 + z) / (2 * z);
    scaled.min(100) as u8
}

/// Posterior percentages of the two hidden factors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Posteriors {
    /// P(F1 = true | evidence).
    pub f1: u8,
    /// P(F2 = true | evidence).
    pub f2: u8,
}

impl Posteriors {
    /// `[f1, f2]`.
    pub const fn as_array(self) -> [u8; 2] {
        [self.f1, self.f2]
    }
}

impl fmt::Display for Posteriors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F1={}% F2={}%", self.f1, self.f2)
    }
}

/// Posteriors from explicit priors and CPTs.
pub fn infer(
    priors: Priors,
    cpts: &[Cpt; NODE_COUNT],
    evidence: EvidenceVector,
) -> Result<Posteriors, InferenceError> {
    JointTable::compute(priors, cpts, evidence).posteriors(evidence)
}

/// Posteriors from a model, failing with [`InferenceError::ModelIncomplete`]
/// if any CPT is unset.
pub fn infer_model(
    model: &ProbabilityModel,
    evidence: EvidenceVector,
) -> Result<Posteriors, InferenceError> {
    JointTable::from_model(model, evidence)?.posteriors(evidence)
}

// ---------------------------------------------------------------------------
// ComplianceThreshold
// ---------------------------------------------------------------------------

/// Minimum posterior both factors must reach for payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComplianceThreshold(Percent);

impl ComplianceThreshold {
    /// Validate a threshold.
    pub fn new(value: u8) -> Result<Self, ValidationError> {
        Percent::checked(value, "compliance_threshold").map(Self)
    }

    /// Raw value.
    pub const fn get(self) -> u8 {
        self.0.get()
    }

    /// Pay only if both posteriors reach the threshold.
    pub const fn check(self, posteriors: Posteriors) -> Verdict {
        if posteriors.f1 >= self.0.get() && posteriors.f2 >= self.0.get() {
            Verdict::Pay
        } else {
            Verdict::Reject
        }
    }
}

impl Default for ComplianceThreshold {
    fn default() -> Self {
        Self(Percent(DEFAULT_THRESHOLD))
    }
}

/// Outcome of a compliance check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Release the escrow to the carrier.
    Pay,
    /// Keep the escrow; the shipment stays open.
    Reject,
}

impl Verdict {
    /// Whether funds are released.
    pub const fn is_pay(self) -> bool {
        matches!(self, Self::Pay)
    }
}

// ---------------------------------------------------------------------------
// DecisionAuditEntry
// ---------------------------------------------------------------------------

/// Everything needed to re-derive one settlement decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionAuditEntry {
    /// Unique identifier for this decision.
    pub decision_id: DecisionId,
    /// Shipment being settled.
    pub shipment: ShipmentId,
    /// SHA-256 of [`ProbabilityModel::canonical_bytes`] at decision time.
    pub model_fingerprint: [u8; 32],
    /// Evidence the decision used.
    pub evidence: EvidenceVector,
    /// Joint weights and normaliser.
    pub joints: JointTable,
    /// Rounded posteriors.
    pub posteriors: Posteriors,
    /// Threshold applied.
    pub threshold: u8,
    /// Outcome.
    pub verdict: Verdict,
}

impl DecisionAuditEntry {
    /// Joint table behind the posteriors.
    pub const fn explain(&self) -> &JointTable {
        &self.joints
    }

    /// Lowercase hex of the model fingerprint.
    pub fn fingerprint_hex(&self) -> String {
        use fmt::Write as _;
        self.model_fingerprint
            .iter()
            .fold(String::with_capacity(64), |mut out, b| {
                let _ = write!(out, "{b:02x}");
                out
            })
    }

    /// Convert to the ledger event for this outcome.
    pub fn to_audit_event(&self, carrier: Principal, amount: Amount) -> AuditEvent {
        match self.verdict {
            Verdict::Pay => AuditEvent::ShipmentSettled {
                shipment: self.shipment,
                decision: self.decision_id,
                carrier,
                amount,
                posteriors: self.posteriors.as_array(),
            },
            Verdict::Reject => AuditEvent::SettlementRejected {
                shipment: self.shipment,
                decision: self.decision_id,
                posteriors: self.posteriors.as_array(),
                threshold: self.threshold,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluate
// ---------------------------------------------------------------------------

/// Runtime context for one settlement evaluation.
#[derive(Clone, Copy, Debug)]
pub struct EvalContext {
    /// Identifier assigned to this decision.
    pub decision_id: DecisionId,
    /// Shipment being settled.
    pub shipment: ShipmentId,
    /// Threshold to apply.
    pub threshold: ComplianceThreshold,
    /// Fingerprint of the model in use.
    pub model_fingerprint: [u8; 32],
}

/// Result of [`evaluate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionOutcome {
    /// Pay or reject.
    pub verdict: Verdict,
    /// Computed posteriors.
    pub posteriors: Posteriors,
    /// Full audit entry.
    pub audit_entry: DecisionAuditEntry,
}

/// Run inference and the threshold check, producing an auditable outcome.
pub fn evaluate(
    model: &ProbabilityModel,
    evidence: EvidenceVector,
    ctx: &EvalContext,
) -> Result<DecisionOutcome, InferenceError> {
    let joints = JointTable::from_model(model, evidence)?;
    let posteriors = joints.posteriors(evidence)?;
    let verdict = ctx.threshold.check(posteriors);

    let audit_entry = DecisionAuditEntry {
        decision_id: ctx.decision_id,
        shipment: ctx.shipment,
        model_fingerprint: ctx.model_fingerprint,
        evidence,
        joints,
        posteriors,
        threshold: ctx.threshold.get(),
        verdict,
    };

    Ok(DecisionOutcome {
        verdict,
        posteriors,
        audit_entry,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Property-based tests (proptest)
// ---------------------------------------------------------------------------
