//! Declarative scenarios driven against a fresh engine.
//!
//! A scenario names its principals, funds them, grants roles, loads a
//! model, then runs a list of steps, each with an expected outcome:
//!
//! ```yaml
//! id: happy_path
//! principals: [admin, sender, carrier, sensor]
//! admin: admin
//! funding: { sender: 1000 }
//! grants:
//!   - { role: sender, principal: sender }
//!   - { role: sensor, principal: sensor }
//! model:
//!   priors: [90, 90]
//!   cpts:
//!     1: [5, 5, 98, 98]
//! steps:
//!   - { action: create, caller: sender, carrier: carrier, amount: 1000 }
//!   - { action: settle, caller: carrier, shipment: 1, expect: incomplete_data }
//! ```
//!
//! Principal names map to ids by hashing, so the same scenario always
//! produces the same ledger.

use std::collections::{BTreeMap, BTreeSet};

use coldchain_evidence::AuditSink;
use coldchain_kernel::{Amount, Principal, Role, ShipmentId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::EngineConfig;
use crate::engine::EscrowEngine;
use crate::error::{Error, ErrorKind};
use crate::tracing_compat::{debug, info, warn};

/// Deterministic principal for a scenario name: the first 16 bytes of
/// SHA-256 over the UTF-8 name.
pub fn principal_for(name: &str) -> Principal {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Principal::from_bytes(bytes)
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// A complete scenario.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario identifier.
    pub id: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Engine configuration.
    #[serde(default)]
    pub config: EngineConfig,
    /// Every principal name the scenario may reference.
    pub principals: Vec<String>,
    /// Principal that bootstraps the engine.
    pub admin: String,
    /// Opening balances by name.
    #[serde(default)]
    pub funding: BTreeMap<String, u64>,
    /// Role grants issued by the admin before the first step.
    #[serde(default)]
    pub grants: Vec<Grant>,
    /// Model loaded by the admin before the first step.
    #[serde(default)]
    pub model: Option<ScenarioModel>,
    /// Steps, run in order.
    pub steps: Vec<Step>,
}

/// One role grant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Role to grant.
    pub role: Role,
    /// Receiving principal name.
    pub principal: String,
}

/// Initial model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioModel {
    /// `[P(F1), P(F2)]` in percent.
    pub priors: [u8; 2],
    /// CPT rows by node id.
    #[serde(default)]
    pub cpts: BTreeMap<u8, [u8; 4]>,
}

/// One step plus its expected outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// What to do.
    #[serde(flatten)]
    pub action: Action,
    /// Expected outcome; success when absent.
    #[serde(default)]
    pub expect: Expected,
    /// Posteriors a settle step must produce, whether it pays or not.
    #[serde(default)]
    pub posteriors: Option<[u8; 2]>,
}

/// Engine call made by a step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// `create_shipment`.
    Create {
        /// Sender name.
        caller: String,
        /// Carrier name.
        carrier: String,
        /// Escrow.
        amount: u64,
    },
    /// `submit_evidence`.
    Submit {
        /// Sensor name.
        caller: String,
        /// Shipment id.
        shipment: u64,
        /// Node id, 1 to 5.
        node: u8,
        /// Reading.
        value: bool,
    },
    /// `validate_and_pay`.
    Settle {
        /// Carrier name.
        caller: String,
        /// Shipment id.
        shipment: u64,
    },
    /// `set_priors`.
    SetPriors {
        /// Operator name.
        caller: String,
        /// P(F1).
        f1: u8,
        /// P(F2).
        f2: u8,
    },
    /// `set_cpt`.
    SetCpt {
        /// Operator name.
        caller: String,
        /// Node id.
        node: u8,
        /// `[p_ff, p_ft, p_tf, p_tt]`.
        table: [u8; 4],
    },
    /// `grant_role`.
    Grant {
        /// Admin name.
        caller: String,
        /// Role.
        role: Role,
        /// Receiving principal name.
        principal: String,
    },
    /// `revoke_role`.
    Revoke {
        /// Admin name.
        caller: String,
        /// Role.
        role: Role,
        /// Principal name.
        principal: String,
    },
}

impl Action {
    /// Stable action name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Submit { .. } => "submit",
            Self::Settle { .. } => "settle",
            Self::SetPriors { .. } => "set_priors",
            Self::SetCpt { .. } => "set_cpt",
            Self::Grant { .. } => "grant",
            Self::Revoke { .. } => "revoke",
        }
    }

    fn names(&self) -> Vec<&str> {
        match self {
            Self::Create {
                caller, carrier, ..
            } => vec![caller.as_str(), carrier.as_str()],
            Self::Grant {
                caller, principal, ..
            }
            | Self::Revoke {
                caller, principal, ..
            } => vec![caller.as_str(), principal.as_str()],
            Self::Submit { caller, .. }
            | Self::Settle { caller, .. }
            | Self::SetPriors { caller, .. }
            | Self::SetCpt { caller, .. } => vec![caller.as_str()],
        }
    }
}

/// Expected step outcome.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expected {
    /// The call succeeds.
    #[default]
    Ok,
    /// The call fails with this kind.
    #[serde(untagged)]
    Error(ErrorKind),
}

impl Expected {
    fn matches(self, outcome: &StepOutcome) -> bool {
        match (self, outcome) {
            (Self::Ok, StepOutcome::Ok) => true,
            (Self::Error(kind), StepOutcome::Error { kind: actual, .. }) => kind == *actual,
            _ => false,
        }
    }
}

impl Scenario {
    /// Structural problems, empty when the scenario can run.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.id.trim().is_empty() {
            errors.push("id must not be empty".to_string());
        }
        let mut declared = BTreeSet::new();
        for name in &self.principals {
            if !declared.insert(name.as_str()) {
                errors.push(format!("principal '{name}' declared twice"));
            }
        }
        let mut check = |context: String, name: &str| {
            if !declared.contains(name) {
                errors.push(format!("{context}: unknown principal '{name}'"));
            }
        };
        check("admin".to_string(), &self.admin);
        for name in self.funding.keys() {
            check("funding".to_string(), name);
        }
        for grant in &self.grants {
            check("grants".to_string(), &grant.principal);
        }
        for (index, step) in self.steps.iter().enumerate() {
            for name in step.action.names() {
                check(format!("step {}", index + 1), name);
            }
        }
        if let Err(err) = self.config.validate() {
            errors.push(format!("config: {err}"));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.posteriors.is_some() && !matches!(step.action, Action::Settle { .. }) {
                errors.push(format!(
                    "step {}: posteriors only apply to settle steps",
                    index + 1
                ));
            }
        }
        errors
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What a step actually did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Success.
    Ok,
    /// Failure.
    Error {
        /// Error category.
        kind: ErrorKind,
        /// Rendered error.
        message: String,
    },
}

/// One executed step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    /// 1-based step index.
    pub index: usize,
    /// Action name.
    pub action: String,
    /// Actual outcome.
    pub outcome: StepOutcome,
    /// Expected outcome.
    pub expected: Expected,
    /// Shipment created by a create step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment: Option<u64>,
    /// Posteriors computed by a settle step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posteriors: Option<[u8; 2]>,
    /// Whether outcome and posteriors met expectations.
    pub passed: bool,
}

/// Result of a full run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario identifier.
    pub scenario_id: String,
    /// Per-step results.
    pub steps: Vec<StepReport>,
    /// Final balances by name, zero balances included.
    pub balances: BTreeMap<String, u64>,
    /// Funds still in escrow.
    pub total_escrowed: u64,
    /// Audit records written.
    pub audit_len: usize,
    /// Hex SHA-256 of the audit ledger's JSON.
    pub audit_digest: String,
}

impl ScenarioReport {
    /// Whether every step met its expectation.
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|step| step.passed)
    }

    /// Steps that missed their expectation.
    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|step| !step.passed)
    }
}

/// Why a scenario could not run.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// The scenario is malformed.
    #[error("scenario validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    /// Setup (funding, grants, model) failed.
    #[error("scenario setup failed: {0}")]
    Setup(#[source] Error),
    /// Two runs of the same scenario disagreed.
    #[error("replay divergence: audit digest {first} != {second}")]
    ReplayDivergence {
        /// Digest of the first run.
        first: String,
        /// Digest of the second run.
        second: String,
    },
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Executes scenarios.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScenarioRunner;

impl ScenarioRunner {
    /// Run `scenario` against a fresh engine.
    pub fn run(scenario: &Scenario) -> Result<ScenarioReport, ScenarioError> {
        Self::run_with_sink(scenario, None)
    }

    /// Run `scenario`, mirroring every audit record into `sink`.
    pub fn run_with_sink(
        scenario: &Scenario,
        sink: Option<Box<dyn AuditSink + Send>>,
    ) -> Result<ScenarioReport, ScenarioError> {
        let errors = scenario.validate();
        if !errors.is_empty() {
            return Err(ScenarioError::Validation(errors));
        }
        let names: BTreeMap<&str, Principal> = scenario
            .principals
            .iter()
            .map(|name| (name.as_str(), principal_for(name)))
            .collect();
        let lookup = |name: &str| {
            names
                .get(name)
                .copied()
                .unwrap_or_else(|| principal_for(name))
        };

        let admin = lookup(&scenario.admin);
        let mut engine = EscrowEngine::with_config(admin, scenario.config.clone())
            .map_err(ScenarioError::Setup)?;
        for (name, amount) in &scenario.funding {
            engine
                .credit(lookup(name), Amount::new(*amount))
                .map_err(ScenarioError::Setup)?;
        }
        for grant in &scenario.grants {
            engine
                .grant_role(admin, grant.role, lookup(&grant.principal))
                .map_err(ScenarioError::Setup)?;
        }
        if let Some(model) = &scenario.model {
            engine
                .set_priors(admin, model.priors[0], model.priors[1])
                .map_err(ScenarioError::Setup)?;
            for (node, table) in &model.cpts {
                engine
                    .set_cpt(admin, *node, *table)
                    .map_err(ScenarioError::Setup)?;
            }
        }
        if let Some(sink) = sink {
            engine.set_audit_sink(sink);
        }
        info!(scenario = %scenario.id, steps = scenario.steps.len(), "scenario started");

        let steps = scenario
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| run_step(&mut engine, &lookup, index + 1, step))
            .collect();

        if let Err(err) = engine.flush_audit_sink() {
            warn!(scenario = %scenario.id, error = %err, "audit sink flush failed");
        }

        let balances = scenario
            .principals
            .iter()
            .map(|name| (name.clone(), engine.balance(lookup(name)).get()))
            .collect();
        let audit_json = serde_json::to_vec(engine.audit())
            .map_err(|e| ScenarioError::Setup(Error::MalformedSnapshot(e.to_string())))?;
        let audit_digest = Sha256::digest(&audit_json)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();

        let report = ScenarioReport {
            scenario_id: scenario.id.clone(),
            steps,
            balances,
            total_escrowed: engine.total_escrowed().get(),
            audit_len: engine.audit().len(),
            audit_digest,
        };
        info!(scenario = %scenario.id, passed = report.passed(), "scenario finished");
        Ok(report)
    }

    /// Run twice and require identical reports.
    pub fn replay(scenario: &Scenario) -> Result<ScenarioReport, ScenarioError> {
        let first = Self::run(scenario)?;
        let second = Self::run(scenario)?;
        if first != second {
            return Err(ScenarioError::ReplayDivergence {
                first: first.audit_digest,
                second: second.audit_digest,
            });
        }
        Ok(first)
    }

    /// Parse a YAML scenario.
    #[cfg(feature = "cli")]
    pub fn parse_yaml(text: &str) -> Result<Scenario, ScenarioError> {
        serde_yaml::from_str(text).map_err(|e| ScenarioError::Validation(vec![e.to_string()]))
    }
}

fn run_step(
    engine: &mut EscrowEngine,
    lookup: &impl Fn(&str) -> Principal,
    index: usize,
    step: &Step,
) -> StepReport {
    let mut shipment = None;
    let mut posteriors = None;
    let result = match &step.action {
        Action::Create {
            caller,
            carrier,
            amount,
        } => engine
            .create_shipment(lookup(caller), lookup(carrier), Amount::new(*amount))
            .map(|id| shipment = Some(id.get())),
        Action::Submit {
            caller,
            shipment: id,
            node,
            value,
        } => engine.submit_evidence(lookup(caller), ShipmentId::new(*id), *node, *value),
        Action::Settle {
            caller,
            shipment: id,
        } => match engine.validate_and_pay(lookup(caller), ShipmentId::new(*id)) {
            Ok(entry) => {
                posteriors = Some(entry.posteriors.as_array());
                Ok(())
            }
            Err(err) => {
                if let Error::ComplianceRejected {
                    posteriors: rejected,
                    ..
                } = &err
                {
                    posteriors = Some(rejected.as_array());
                }
                Err(err)
            }
        },
        Action::SetPriors { caller, f1, f2 } => engine.set_priors(lookup(caller), *f1, *f2),
        Action::SetCpt {
            caller,
            node,
            table,
        } => engine.set_cpt(lookup(caller), *node, *table),
        Action::Grant {
            caller,
            role,
            principal,
        } => engine.grant_role(lookup(caller), *role, lookup(principal)),
        Action::Revoke {
            caller,
            role,
            principal,
        } => engine.revoke_role(lookup(caller), *role, lookup(principal)),
    };

    let outcome = match result {
        Ok(()) => StepOutcome::Ok,
        Err(err) => StepOutcome::Error {
            kind: err.kind(),
            message: err.to_string(),
        },
    };
    let posteriors_ok = step.posteriors.is_none_or(|want| posteriors == Some(want));
    let passed = step.expect.matches(&outcome) && posteriors_ok;
    debug!(step = index, action = step.action.name(), passed, "scenario step");

    StepReport {
        index,
        action: step.action.name().to_string(),
        outcome,
        expected: step.expect,
        shipment,
        posteriors,
        passed,
    }
}
