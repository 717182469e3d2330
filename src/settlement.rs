//! Settlement decisions.
//!
//! [`assess`] evaluates one shipment without touching state: evidence
//! completeness, then inference and the threshold check. The engine checks
//! existence and the carrier first and applies the payout after.

use coldchain_decision::{
    ComplianceThreshold, DecisionOutcome, EvalContext, Posteriors, ProbabilityModel, evaluate,
    infer_model,
};
use coldchain_kernel::DecisionId;

use crate::error::{Error, Result};
use crate::model::fingerprint;
use crate::registry::Shipment;

/// Model settlement uses: the shipment's frozen copy if it has one.
pub fn model_for<'a>(shipment: &'a Shipment, global: &'a ProbabilityModel) -> &'a ProbabilityModel {
    shipment.model_snapshot().unwrap_or(global)
}

/// Evaluate a shipment. A below-threshold result is an `Ok` outcome with a
/// `Reject` verdict; only missing data and model defects are errors.
pub fn assess(
    shipment: &Shipment,
    global: &ProbabilityModel,
    threshold: ComplianceThreshold,
    decision_id: DecisionId,
) -> Result<DecisionOutcome> {
    let evidence = shipment
        .evidence_vector()
        .ok_or_else(|| Error::EvidenceIncomplete {
            shipment: shipment.id(),
            missing: shipment.missing_nodes(),
        })?;
    let model = model_for(shipment, global);
    let ctx = EvalContext {
        decision_id,
        shipment: shipment.id(),
        threshold,
        model_fingerprint: fingerprint(model),
    };
    Ok(evaluate(model, evidence, &ctx)?)
}

/// Posteriors the shipment would settle with right now.
pub fn preview(shipment: &Shipment, global: &ProbabilityModel) -> Result<Posteriors> {
    let evidence = shipment
        .evidence_vector()
        .ok_or_else(|| Error::EvidenceIncomplete {
            shipment: shipment.id(),
            missing: shipment.missing_nodes(),
        })?;
    Ok(infer_model(model_for(shipment, global), evidence)?)
}
