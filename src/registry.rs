//! Shipment registry: escrow records keyed by sequential id.
//!
//! A shipment starts `Open` with five empty evidence slots and moves to
//! `Settled` exactly once. Settled shipments are never modified again.

use std::collections::BTreeMap;

use coldchain_decision::{EvidenceVector, NODE_COUNT, NodeId, ProbabilityModel};
use coldchain_kernel::{Amount, DecisionId, Principal, ShipmentId};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle state of a shipment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    /// Accepting evidence; escrow held.
    Open,
    /// Paid out. Terminal.
    Settled,
}

/// One escrowed shipment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    id: ShipmentId,
    sender: Principal,
    carrier: Principal,
    amount: Amount,
    status: ShipmentStatus,
    evidence: [Option<bool>; NODE_COUNT],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<ProbabilityModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    settled_decision: Option<DecisionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rejected_decision: Option<DecisionId>,
}

impl Shipment {
    /// Identifier.
    pub const fn id(&self) -> ShipmentId {
        self.id
    }

    /// Principal that escrowed the funds.
    pub const fn sender(&self) -> Principal {
        self.sender
    }

    /// Principal entitled to the payout.
    pub const fn carrier(&self) -> Principal {
        self.carrier
    }

    /// Escrowed amount, fixed at creation.
    pub const fn amount(&self) -> Amount {
        self.amount
    }

    /// Current status.
    pub const fn status(&self) -> ShipmentStatus {
        self.status
    }

    /// Whether the shipment still accepts evidence.
    pub fn is_open(&self) -> bool {
        self.status == ShipmentStatus::Open
    }

    /// Reading for `node`, if submitted.
    pub const fn reading(&self, node: NodeId) -> Option<bool> {
        self.evidence[node.index()]
    }

    /// Number of filled slots.
    pub fn evidence_count(&self) -> usize {
        self.evidence.iter().filter(|slot| slot.is_some()).count()
    }

    /// Empty slots, ascending.
    pub fn missing_nodes(&self) -> Vec<NodeId> {
        NodeId::ALL
            .into_iter()
            .filter(|node| self.evidence[node.index()].is_none())
            .collect()
    }

    /// The five readings, only once every slot is filled.
    pub fn evidence_vector(&self) -> Option<EvidenceVector> {
        let mut values = [false; NODE_COUNT];
        for (value, slot) in values.iter_mut().zip(&self.evidence) {
            *value = (*slot)?;
        }
        Some(EvidenceVector::new(values))
    }

    /// Model frozen at creation under the snapshot policy.
    pub const fn model_snapshot(&self) -> Option<&ProbabilityModel> {
        self.model.as_ref()
    }

    /// Decision that paid this shipment out.
    pub const fn settled_decision(&self) -> Option<DecisionId> {
        self.settled_decision
    }

    /// First compliance rejection; once set, evidence is sealed.
    pub const fn rejected_decision(&self) -> Option<DecisionId> {
        self.rejected_decision
    }
}

/// Parameters of a new shipment.
#[derive(Clone, Debug)]
pub struct NewShipment {
    /// Paying principal.
    pub sender: Principal,
    /// Receiving principal.
    pub carrier: Principal,
    /// Escrow.
    pub amount: Amount,
    /// Frozen model, if any.
    pub model: Option<ProbabilityModel>,
}

/// All shipments plus the next id to assign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRegistry {
    shipments: BTreeMap<ShipmentId, Shipment>,
    next_id: ShipmentId,
}

impl ShipmentRegistry {
    /// Empty registry whose first shipment gets `first`.
    pub fn new(first: ShipmentId) -> Self {
        Self {
            shipments: BTreeMap::new(),
            next_id: first,
        }
    }

    /// Id the next [`insert`](Self::insert) will assign.
    pub const fn next_id(&self) -> ShipmentId {
        self.next_id
    }

    /// Look up a shipment.
    pub fn get(&self, id: ShipmentId) -> Result<&Shipment> {
        self.shipments.get(&id).ok_or(Error::UnknownShipment(id))
    }

    /// Look up a shipment that is still open.
    pub fn get_open(&self, id: ShipmentId) -> Result<&Shipment> {
        let shipment = self.get(id)?;
        if shipment.is_open() {
            Ok(shipment)
        } else {
            Err(Error::AlreadySettled(id))
        }
    }

    /// Create an open shipment under the next id.
    pub fn insert(&mut self, new: NewShipment) -> Result<ShipmentId> {
        if new.amount.is_zero() {
            return Err(Error::ZeroAmount);
        }
        let id = self.next_id;
        let following = id.next().ok_or(Error::Overflow {
            context: "assigning a shipment id",
        })?;
        self.shipments.insert(
            id,
            Shipment {
                id,
                sender: new.sender,
                carrier: new.carrier,
                amount: new.amount,
                status: ShipmentStatus::Open,
                evidence: [None; NODE_COUNT],
                model: new.model,
                settled_decision: None,
                rejected_decision: None,
            },
        );
        self.next_id = following;
        Ok(id)
    }

    /// Look up a shipment whose evidence may still change.
    pub fn get_writable(&self, id: ShipmentId) -> Result<&Shipment> {
        let shipment = self.get_open(id)?;
        match shipment.rejected_decision {
            Some(decision) => Err(Error::EvidenceSealed {
                shipment: id,
                decision,
            }),
            None => Ok(shipment),
        }
    }

    /// Record a reading, overwriting any earlier one. Returns whether a
    /// reading was replaced.
    pub fn record_evidence(&mut self, id: ShipmentId, node: NodeId, value: bool) -> Result<bool> {
        self.get_writable(id)?;
        let shipment = self
            .shipments
            .get_mut(&id)
            .ok_or(Error::UnknownShipment(id))?;
        Ok(shipment.evidence[node.index()].replace(value).is_some())
    }

    /// Seal the evidence of an open shipment after a compliance rejection.
    /// Later rejections keep the first decision.
    pub fn mark_rejected(&mut self, id: ShipmentId, decision: DecisionId) -> Result<()> {
        self.get_open(id)?;
        let shipment = self
            .shipments
            .get_mut(&id)
            .ok_or(Error::UnknownShipment(id))?;
        shipment.rejected_decision.get_or_insert(decision);
        Ok(())
    }

    /// Move an open shipment to `Settled`.
    pub fn mark_settled(&mut self, id: ShipmentId, decision: DecisionId) -> Result<()> {
        self.get_open(id)?;
        let shipment = self
            .shipments
            .get_mut(&id)
            .ok_or(Error::UnknownShipment(id))?;
        shipment.status = ShipmentStatus::Settled;
        shipment.settled_decision = Some(decision);
        Ok(())
    }

    /// Ids where `principal` is sender or carrier, ascending.
    pub fn shipments_by(&self, principal: Principal) -> Vec<ShipmentId> {
        self.shipments
            .values()
            .filter(|s| s.sender == principal || s.carrier == principal)
            .map(|s| s.id)
            .collect()
    }

    /// All shipments, ascending by id.
    pub fn iter(&self) -> impl Iterator<Item = &Shipment> {
        self.shipments.values()
    }

    /// Number of shipments.
    pub fn len(&self) -> usize {
        self.shipments.len()
    }

    /// Whether no shipment exists.
    pub fn is_empty(&self) -> bool {
        self.shipments.is_empty()
    }

    /// Sum of open escrows.
    pub fn open_escrow(&self) -> Result<Amount> {
        self.shipments
            .values()
            .filter(|s| s.is_open())
            .try_fold(Amount::ZERO, |acc, s| acc.checked_add(s.amount))
            .ok_or(Error::Overflow {
                context: "summing open escrow",
            })
    }
}
