//! The escrow engine: every externally callable operation.
//!
//! [`EscrowEngine`] owns the durable state (roles, model, shipments,
//! balances, audit ledger) and takes the calling principal explicitly on
//! every mutating call. Each call validates everything first and commits
//! only if nothing failed, so an `Err` leaves the state untouched. The one
//! exception is a compliance rejection, which appends its audit record and
//! seals the shipment's evidence.
//!
//! [`SharedEngine`] serialises access through a mutex so concurrent
//! callers observe a single total order.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use coldchain_decision::{
    ComplianceThreshold, DecisionAuditEntry, NodeId, Posteriors, ProbabilityModel, Verdict,
};
use coldchain_evidence::{AuditEvent, AuditLedger, AuditRecord, AuditSink};
use coldchain_kernel::{Amount, DecisionId, Principal, Role, SchemaVersion, ShipmentId};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::access::AccessControl;
use crate::config::{EngineConfig, ModelPolicy};
use crate::error::{Error, Result};
use crate::funds::{FundsLedger, InMemoryFunds};
use crate::model::ModelStore;
use crate::registry::{NewShipment, Shipment, ShipmentRegistry};
use crate::settlement;
use crate::tracing_compat::{debug, info, warn};

/// Version of the [`EngineSnapshot`] format.
pub const SNAPSHOT_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 0, 0);

// ---------------------------------------------------------------------------
// EngineStats
// ---------------------------------------------------------------------------

/// Operation counters. Not part of the durable state.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Shipments opened.
    pub shipments_created: AtomicU64,
    /// Evidence readings accepted, overwrites included.
    pub evidence_submitted: AtomicU64,
    /// Settlements that paid out.
    pub settlements_paid: AtomicU64,
    /// Settlements rejected on compliance.
    pub settlements_rejected: AtomicU64,
    /// Calls refused for a missing role or wrong carrier.
    pub authorization_denials: AtomicU64,
}

impl EngineStats {
    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            shipments_created: self.shipments_created.load(Ordering::Relaxed),
            evidence_submitted: self.evidence_submitted.load(Ordering::Relaxed),
            settlements_paid: self.settlements_paid.load(Ordering::Relaxed),
            settlements_rejected: self.settlements_rejected.load(Ordering::Relaxed),
            authorization_denials: self.authorization_denials.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn from_ledger(ledger: &AuditLedger) -> Self {
        let stats = Self::default();
        for record in ledger.records() {
            match record.event {
                AuditEvent::ShipmentCreated { .. } => Self::bump(&stats.shipments_created),
                AuditEvent::EvidenceSubmitted { .. } => Self::bump(&stats.evidence_submitted),
                AuditEvent::ShipmentSettled { .. } => Self::bump(&stats.settlements_paid),
                AuditEvent::SettlementRejected { .. } => Self::bump(&stats.settlements_rejected),
                _ => {}
            }
        }
        stats
    }
}

/// Plain copy of [`EngineStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Shipments opened.
    pub shipments_created: u64,
    /// Evidence readings accepted.
    pub evidence_submitted: u64,
    /// Settlements that paid out.
    pub settlements_paid: u64,
    /// Settlements rejected on compliance.
    pub settlements_rejected: u64,
    /// Refused calls.
    pub authorization_denials: u64,
}

// ---------------------------------------------------------------------------
// EscrowEngine
// ---------------------------------------------------------------------------

/// Durable state plus the operations that change it.
pub struct EscrowEngine<F = InMemoryFunds> {
    config: EngineConfig,
    threshold: ComplianceThreshold,
    access: AccessControl,
    model: ModelStore,
    registry: ShipmentRegistry,
    funds: F,
    total_escrowed: Amount,
    ledger: AuditLedger,
    sink: Option<Box<dyn AuditSink + Send>>,
    stats: Arc<EngineStats>,
}

impl<F: fmt::Debug> fmt::Debug for EscrowEngine<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscrowEngine")
            .field("config", &self.config)
            .field("shipments", &self.registry.len())
            .field("total_escrowed", &self.total_escrowed)
            .field("audit_len", &self.ledger.len())
            .field("funds", &self.funds)
            .finish_non_exhaustive()
    }
}

impl EscrowEngine<InMemoryFunds> {
    /// Engine with default configuration and empty balances.
    pub fn new(admin: Principal) -> Self {
        Self::build(
            admin,
            EngineConfig::default(),
            ComplianceThreshold::default(),
            InMemoryFunds::new(),
        )
    }

    /// Engine with explicit configuration and empty balances.
    pub fn with_config(admin: Principal, config: EngineConfig) -> Result<Self> {
        Self::with_funds(admin, config, InMemoryFunds::new())
    }

    /// Fund an account from outside the system. Returns the new balance.
    pub fn credit(&mut self, principal: Principal, amount: Amount) -> Result<Amount> {
        let balance = self.funds.credit(principal, amount)?;
        debug!(principal = %principal, amount = %amount, balance = %balance, "account credited");
        Ok(balance)
    }
}

impl<F: FundsLedger> EscrowEngine<F> {
    /// Engine over a caller-supplied funds ledger.
    pub fn with_funds(admin: Principal, config: EngineConfig, funds: F) -> Result<Self> {
        config.validate()?;
        let threshold = config.threshold()?;
        Ok(Self::build(admin, config, threshold, funds))
    }

    fn build(
        admin: Principal,
        config: EngineConfig,
        threshold: ComplianceThreshold,
        funds: F,
    ) -> Self {
        let mut ledger = AuditLedger::new();
        for role in [Role::Admin, Role::Operator] {
            ledger.append(
                admin,
                AuditEvent::RoleGranted {
                    role,
                    principal: admin,
                },
            );
        }
        info!(admin = %admin, threshold = threshold.get(), "escrow engine initialised");
        Self {
            registry: ShipmentRegistry::new(config.first_shipment()),
            config,
            threshold,
            access: AccessControl::new(admin),
            model: ModelStore::new(),
            funds,
            total_escrowed: Amount::ZERO,
            ledger,
            sink: None,
            stats: Arc::new(EngineStats::default()),
        }
    }

    // -- Audit plumbing --

    /// Mirror every record, past and future, into `sink`.
    ///
    /// Sink failures are logged and never undo a committed operation.
    pub fn set_audit_sink(&mut self, mut sink: Box<dyn AuditSink + Send>) {
        for record in self.ledger.records() {
            if let Err(err) = sink.record(record) {
                warn!(seq = record.seq, error = %err, "audit sink rejected replayed record");
            }
        }
        self.sink = Some(sink);
    }

    /// Flush the audit sink, if any.
    pub fn flush_audit_sink(&mut self) -> io::Result<()> {
        self.sink.as_mut().map_or(Ok(()), |sink| sink.flush())
    }

    fn commit(&mut self, actor: Principal, event: AuditEvent) {
        let record = self.ledger.append(actor, event);
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = sink.record(record) {
                warn!(seq = record.seq, error = %err, "audit sink write failed");
            }
        }
    }

    fn authorize(&self, caller: Principal, role: Role) -> Result<()> {
        self.access.require(caller, role).inspect_err(|_| {
            EngineStats::bump(&self.stats.authorization_denials);
            warn!(caller = %caller, role = %role, "authorization denied");
        })
    }

    // -- Access control --

    /// Grant `role` to `principal`. Admin only.
    pub fn grant_role(
        &mut self,
        caller: Principal,
        role: Role,
        principal: Principal,
    ) -> Result<()> {
        self.authorize(caller, Role::Admin)?;
        if self.access.insert(principal, role) {
            info!(role = %role, principal = %principal, "role granted");
            self.commit(caller, AuditEvent::RoleGranted { role, principal });
        }
        Ok(())
    }

    /// Revoke `role` from `principal`. Admin only; revoking a role that is
    /// not held is a silent no-op.
    pub fn revoke_role(
        &mut self,
        caller: Principal,
        role: Role,
        principal: Principal,
    ) -> Result<()> {
        self.authorize(caller, Role::Admin)?;
        AccessControl::check_revoke(caller, role, principal)?;
        if self.access.remove(principal, role) {
            info!(role = %role, principal = %principal, "role revoked");
            self.commit(caller, AuditEvent::RoleRevoked { role, principal });
        }
        Ok(())
    }

    /// Whether `principal` holds `role`.
    pub fn has_role(&self, principal: Principal, role: Role) -> bool {
        self.access.has_role(principal, role)
    }

    /// Principals holding `role`, ascending.
    pub fn members(&self, role: Role) -> Vec<Principal> {
        self.access.members(role)
    }

    // -- Probability model --

    /// Overwrite the global priors. Operator only.
    pub fn set_priors(&mut self, caller: Principal, f1: u8, f2: u8) -> Result<()> {
        self.authorize(caller, Role::Operator)?;
        let priors = self.model.set_priors(f1, f2)?;
        info!(f1 = priors.f1.get(), f2 = priors.f2.get(), "priors updated");
        self.commit(caller, AuditEvent::PriorsSet { f1, f2 });
        Ok(())
    }

    /// Overwrite the CPT of `node` with `[p_ff, p_ft, p_tf, p_tt]`.
    /// Operator only.
    pub fn set_cpt(&mut self, caller: Principal, node: u8, table: [u8; 4]) -> Result<()> {
        self.authorize(caller, Role::Operator)?;
        let (node, previous) = self.model.set_cpt(node, table)?;
        info!(node = %node, table = ?table, replaced = previous.is_some(), "CPT updated");
        self.commit(
            caller,
            AuditEvent::CptSet {
                node: node.get(),
                table,
            },
        );
        Ok(())
    }

    /// The global model.
    pub const fn model(&self) -> &ProbabilityModel {
        self.model.model()
    }

    // -- Shipments --

    /// Open a shipment, escrowing `amount` from the caller. Sender only.
    pub fn create_shipment(
        &mut self,
        caller: Principal,
        carrier: Principal,
        amount: Amount,
    ) -> Result<ShipmentId> {
        self.authorize(caller, Role::Sender)?;
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }
        let model = match self.config.model_policy {
            ModelPolicy::Shared => None,
            ModelPolicy::SnapshotOnCreate => Some(self.model.complete_snapshot()?),
        };
        let total = self
            .total_escrowed
            .checked_add(amount)
            .ok_or(Error::Overflow {
                context: "escrowing funds",
            })?;

        self.funds.withdraw(caller, amount)?;
        let id = match self.registry.insert(NewShipment {
            sender: caller,
            carrier,
            amount,
            model,
        }) {
            Ok(id) => id,
            Err(err) => {
                // Refund: the escrow never left the sender.
                self.funds.deposit(caller, amount)?;
                return Err(err);
            }
        };
        self.total_escrowed = total;

        EngineStats::bump(&self.stats.shipments_created);
        info!(
            shipment = %id,
            sender = %caller,
            carrier = %carrier,
            amount = %amount,
            "shipment created"
        );
        self.commit(
            caller,
            AuditEvent::ShipmentCreated {
                shipment: id,
                carrier,
                amount,
            },
        );
        Ok(id)
    }

    /// Record a sensor reading, replacing any earlier one for the node.
    /// Sensor only.
    pub fn submit_evidence(
        &mut self,
        caller: Principal,
        shipment: ShipmentId,
        node: u8,
        value: bool,
    ) -> Result<()> {
        self.authorize(caller, Role::Sensor)?;
        self.registry.get_writable(shipment)?;
        let node = NodeId::new(node)?;
        let overwrote = self.registry.record_evidence(shipment, node, value)?;

        EngineStats::bump(&self.stats.evidence_submitted);
        debug!(
            shipment = %shipment,
            node = %node,
            value,
            overwrote,
            sensor = %caller,
            "evidence submitted"
        );
        self.commit(
            caller,
            AuditEvent::EvidenceSubmitted {
                shipment,
                node: node.get(),
                value,
                overwrote,
            },
        );
        Ok(())
    }

    /// Settle a shipment: infer, check the threshold, and pay the carrier.
    ///
    /// Checks in order: the shipment exists and is open, the caller is its
    /// carrier, all evidence is present, the model is complete, both
    /// posteriors reach the threshold. A rejection is audited and leaves
    /// the shipment open.
    pub fn validate_and_pay(
        &mut self,
        caller: Principal,
        shipment: ShipmentId,
    ) -> Result<DecisionAuditEntry> {
        let record = self.registry.get_open(shipment)?;
        if record.carrier() != caller {
            EngineStats::bump(&self.stats.authorization_denials);
            warn!(caller = %caller, shipment = %shipment, "settlement attempted by non-carrier");
            return Err(Error::NotCarrier { caller, shipment });
        }
        let decision_id = DecisionId::from_parts(shipment, self.ledger.next_seq());
        let outcome = settlement::assess(record, self.model.model(), self.threshold, decision_id)?;
        let (carrier, amount) = (record.carrier(), record.amount());
        let entry = outcome.audit_entry;
        debug!(
            shipment = %shipment,
            joints = ?entry.joints.joints(),
            z = entry.joints.z(),
            posteriors = %entry.posteriors,
            "inference complete"
        );

        if entry.verdict == Verdict::Reject {
            EngineStats::bump(&self.stats.settlements_rejected);
            warn!(
                shipment = %shipment,
                posteriors = %entry.posteriors,
                threshold = entry.threshold,
                "compliance requirements not met"
            );
            self.registry.mark_rejected(shipment, decision_id)?;
            self.commit(caller, entry.to_audit_event(carrier, amount));
            return Err(Error::ComplianceRejected {
                shipment,
                decision: decision_id,
                posteriors: entry.posteriors,
                threshold: entry.threshold,
            });
        }

        let total = self
            .total_escrowed
            .checked_sub(amount)
            .ok_or(Error::Overflow {
                context: "releasing escrow",
            })?;
        self.funds.deposit(carrier, amount)?;
        if let Err(err) = self.registry.mark_settled(shipment, decision_id) {
            self.funds.withdraw(carrier, amount)?;
            return Err(err);
        }
        self.total_escrowed = total;

        EngineStats::bump(&self.stats.settlements_paid);
        info!(
            shipment = %shipment,
            carrier = %carrier,
            amount = %amount,
            posteriors = %entry.posteriors,
            "shipment settled"
        );
        self.commit(caller, entry.to_audit_event(carrier, amount));
        Ok(entry)
    }

    /// Posteriors the shipment would settle with now. Never mutates state.
    pub fn preview_posteriors(&self, shipment: ShipmentId) -> Result<Posteriors> {
        settlement::preview(self.registry.get(shipment)?, self.model.model())
    }

    /// Look up a shipment.
    pub fn shipment(&self, id: ShipmentId) -> Result<&Shipment> {
        self.registry.get(id)
    }

    /// Ids where `principal` is sender or carrier.
    pub fn shipments_by(&self, principal: Principal) -> Vec<ShipmentId> {
        self.registry.shipments_by(principal)
    }

    /// All shipments, ascending by id.
    pub fn shipments(&self) -> impl Iterator<Item = &Shipment> {
        self.registry.iter()
    }

    // -- Funds and introspection --

    /// Balance outside escrow.
    pub fn balance(&self, principal: Principal) -> Amount {
        self.funds.balance(principal)
    }

    /// Funds held for open shipments.
    pub const fn total_escrowed(&self) -> Amount {
        self.total_escrowed
    }

    /// The funds ledger.
    pub const fn funds(&self) -> &F {
        &self.funds
    }

    /// The audit ledger.
    pub const fn audit(&self) -> &AuditLedger {
        &self.ledger
    }

    /// Most recent audit record.
    pub fn last_record(&self) -> Option<&AuditRecord> {
        self.ledger.last()
    }

    /// Configuration in force.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Serialisable durable state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot<F> {
    /// Format version.
    pub version: SchemaVersion,
    /// Configuration.
    pub config: EngineConfig,
    /// Role grants.
    pub access: AccessControl,
    /// Global model.
    pub model: ModelStore,
    /// Shipments and next id.
    pub registry: ShipmentRegistry,
    /// Balances outside escrow.
    pub funds: F,
    /// Funds held for open shipments.
    pub total_escrowed: Amount,
    /// Audit ledger.
    pub audit: AuditLedger,
}

impl<F: FundsLedger + Clone + Serialize + DeserializeOwned> EscrowEngine<F> {
    /// Copy of the durable state.
    pub fn snapshot(&self) -> EngineSnapshot<F> {
        EngineSnapshot {
            version: SNAPSHOT_SCHEMA_VERSION,
            config: self.config.clone(),
            access: self.access.clone(),
            model: self.model.clone(),
            registry: self.registry.clone(),
            funds: self.funds.clone(),
            total_escrowed: self.total_escrowed,
            audit: self.ledger.clone(),
        }
    }

    /// Durable state as JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.snapshot()).map_err(|e| Error::MalformedSnapshot(e.to_string()))
    }

    /// Rebuild an engine, checking version and internal consistency.
    ///
    /// Counters are recomputed from the audit ledger; authorization denials
    /// are not audited and restart at zero.
    pub fn restore(snapshot: EngineSnapshot<F>) -> Result<Self> {
        if !SNAPSHOT_SCHEMA_VERSION.is_compatible(&snapshot.version) {
            return Err(Error::IncompatibleSnapshot {
                found: snapshot.version,
                expected: SNAPSHOT_SCHEMA_VERSION,
            });
        }
        snapshot.config.validate()?;
        let threshold = snapshot.config.threshold()?;
        let ledger = AuditLedger::from_records(snapshot.audit.records().to_vec())
            .map_err(|e| Error::MalformedSnapshot(e.to_string()))?;

        let open = snapshot.registry.open_escrow()?;
        if open != snapshot.total_escrowed {
            return Err(Error::MalformedSnapshot(format!(
                "escrow total {} does not match open shipments {open}",
                snapshot.total_escrowed
            )));
        }
        let next_id = snapshot.registry.next_id();
        if snapshot.registry.iter().any(|s| s.id() >= next_id) {
            return Err(Error::MalformedSnapshot(format!(
                "shipment ids must stay below next id {next_id}"
            )));
        }

        info!(
            shipments = snapshot.registry.len(),
            audit_len = ledger.len(),
            "engine restored from snapshot"
        );
        Ok(Self {
            stats: Arc::new(EngineStats::from_ledger(&ledger)),
            config: snapshot.config,
            threshold,
            access: snapshot.access,
            model: snapshot.model,
            registry: snapshot.registry,
            funds: snapshot.funds,
            total_escrowed: snapshot.total_escrowed,
            ledger,
            sink: None,
        })
    }

    /// Parse and restore a JSON snapshot.
    pub fn from_json(text: &str) -> Result<Self> {
        let snapshot: EngineSnapshot<F> =
            serde_json::from_str(text).map_err(|e| Error::MalformedSnapshot(e.to_string()))?;
        Self::restore(snapshot)
    }
}

// ---------------------------------------------------------------------------
// SharedEngine
// ---------------------------------------------------------------------------

/// Thread-safe handle; every call runs under one lock.
pub struct SharedEngine<F = InMemoryFunds> {
    inner: Arc<Mutex<EscrowEngine<F>>>,
    stats: Arc<EngineStats>,
}

impl<F> Clone for SharedEngine<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<F: FundsLedger> SharedEngine<F> {
    /// Wrap an engine.
    pub fn new(engine: EscrowEngine<F>) -> Self {
        let stats = engine.stats();
        Self {
            inner: Arc::new(Mutex::new(engine)),
            stats,
        }
    }

    /// Run `f` with exclusive access.
    pub fn with<R>(&self, f: impl FnOnce(&mut EscrowEngine<F>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// See [`EscrowEngine::create_shipment`].
    pub fn create_shipment(
        &self,
        caller: Principal,
        carrier: Principal,
        amount: Amount,
    ) -> Result<ShipmentId> {
        self.inner.lock().create_shipment(caller, carrier, amount)
    }

    /// See [`EscrowEngine::submit_evidence`].
    pub fn submit_evidence(
        &self,
        caller: Principal,
        shipment: ShipmentId,
        node: u8,
        value: bool,
    ) -> Result<()> {
        self.inner
            .lock()
            .submit_evidence(caller, shipment, node, value)
    }

    /// See [`EscrowEngine::validate_and_pay`].
    pub fn validate_and_pay(
        &self,
        caller: Principal,
        shipment: ShipmentId,
    ) -> Result<DecisionAuditEntry> {
        self.inner.lock().validate_and_pay(caller, shipment)
    }

    /// See [`EscrowEngine::preview_posteriors`].
    pub fn preview_posteriors(&self, shipment: ShipmentId) -> Result<Posteriors> {
        self.inner.lock().preview_posteriors(shipment)
    }

    /// See [`EscrowEngine::balance`].
    pub fn balance(&self, principal: Principal) -> Amount {
        self.inner.lock().balance(principal)
    }

    /// Counters, readable without the lock.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }
}
