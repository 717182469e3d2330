#![allow(missing_docs)]
//! End-to-end settlement scenarios against the reference cold-chain model.

#[macro_use]
mod common;

use coldchain::{
    Amount, AuditEvent, EngineConfig, Error, ErrorKind, EscrowEngine, Hypothesis, Posteriors,
    ShipmentId, ShipmentStatus,
};
use common::{
    ADMIN, CARRIER, OUTSIDER, SENDER, SENSOR, bare_engine, readings, reference_engine, submit_all,
};

const ESCROW: u64 = 1_000;

fn open_shipment(engine: &mut EscrowEngine) -> ShipmentId {
    engine
        .create_shipment(SENDER, CARRIER, Amount::new(ESCROW))
        .expect("create shipment")
}

#[test]
fn scenario_a_compliant_evidence_pays_carrier() {
    common::init_test_logging();
    test_phase!("scenario_a_compliant_evidence_pays_carrier");
    let mut engine = reference_engine(5_000);
    let id = open_shipment(&mut engine);
    submit_all(&mut engine, id, readings("TTFFT"));

    test_section!("settle");
    let entry = engine
        .validate_and_pay(CARRIER, id)
        .expect("settlement pays");
    assert_with_log!(
        entry.posteriors == Posteriors { f1: 100, f2: 100 },
        "posteriors",
        Posteriors { f1: 100, f2: 100 },
        entry.posteriors
    );
    let table = entry.explain();
    assert_eq!(
        table.joints(),
        [
            1_500_000,
            314_344_800_000,
            1_058_400_000,
            68_619_898_116_000
        ]
    );
    assert_eq!(table.z(), 68_935_302_816_000);

    test_section!("balances");
    assert_with_log!(
        engine.balance(CARRIER) == Amount::new(ESCROW),
        "carrier paid",
        ESCROW,
        engine.balance(CARRIER)
    );
    assert_eq!(engine.balance(SENDER), Amount::new(4_000));
    assert_eq!(engine.total_escrowed(), Amount::ZERO);
    assert_eq!(
        engine.shipment(id).unwrap().status(),
        ShipmentStatus::Settled
    );
    test_complete!("scenario_a_compliant_evidence_pays_carrier", shipment = id);
}

#[test]
fn scenario_b_exact_arithmetic_clears_threshold() {
    common::init_test_logging();
    test_phase!("scenario_b_exact_arithmetic_clears_threshold");
    let mut engine = reference_engine(ESCROW);
    let id = open_shipment(&mut engine);
    submit_all(&mut engine, id, readings("TTFTT"));

    assert_eq!(
        engine.preview_posteriors(id).unwrap(),
        Posteriors { f1: 100, f2: 99 }
    );
    let entry = engine
        .validate_and_pay(CARRIER, id)
        .expect("(100, 99) pays");
    let table = entry.explain();
    assert_eq!(
        table.joints(),
        [28_500_000, 6_415_200_000, 20_109_600_000, 1_400_406_084_000]
    );
    assert_eq!(table.z(), 1_426_959_384_000);
    assert_eq!(table.joint(Hypothesis::TT), 1_400_406_084_000);
    assert_eq!(engine.balance(CARRIER), Amount::new(ESCROW));
    test_complete!("scenario_b_exact_arithmetic_clears_threshold");
}

#[test]
fn scenario_b_failing_temperature_signal_is_rejected() {
    common::init_test_logging();
    test_phase!("scenario_b_failing_temperature_signal_is_rejected");
    let mut engine = reference_engine(ESCROW);
    let id = open_shipment(&mut engine);
    submit_all(&mut engine, id, readings("FTFFT"));
    let audit_before = engine.audit().len();

    let err = engine.validate_and_pay(CARRIER, id).unwrap_err();
    assert_with_log!(
        err.kind() == ErrorKind::ComplianceRejection,
        "kind",
        ErrorKind::ComplianceRejection,
        err.kind()
    );
    let message = err.to_string();
    assert!(message.starts_with("compliance requirements not met"));
    match err {
        Error::ComplianceRejected {
            posteriors,
            threshold,
            ..
        } => {
            assert_eq!(posteriors, Posteriors { f1: 19, f2: 100 });
            assert_eq!(threshold, 95);
        }
        other => panic!("unexpected error {other:?}"),
    }

    test_section!("escrow untouched");
    assert_eq!(engine.total_escrowed(), Amount::new(ESCROW));
    assert_eq!(engine.balance(CARRIER), Amount::ZERO);
    assert_eq!(engine.balance(SENDER), Amount::ZERO);
    let shipment = engine.shipment(id).unwrap();
    assert!(shipment.is_open());
    assert!(shipment.rejected_decision().is_some());

    test_section!("exactly one audit record");
    assert_eq!(engine.audit().len(), audit_before + 1);
    assert!(matches!(
        engine.last_record().unwrap().event,
        AuditEvent::SettlementRejected {
            posteriors: [19, 100],
            threshold: 95,
            ..
        }
    ));
    test_complete!("scenario_b_failing_temperature_signal_is_rejected");
}

#[test]
fn scenario_b_failing_packaging_signal_is_rejected() {
    common::init_test_logging();
    let mut engine = reference_engine(ESCROW);
    let id = open_shipment(&mut engine);
    submit_all(&mut engine, id, readings("TFFTT"));

    let err = engine.validate_and_pay(CARRIER, id).unwrap_err();
    assert!(matches!(
        err,
        Error::ComplianceRejected {
            posteriors: Posteriors { f1: 100, f2: 1 },
            ..
        }
    ));
    test_complete!("scenario_b_failing_packaging_signal_is_rejected");
}

#[test]
fn rejected_shipment_cannot_be_amended() {
    common::init_test_logging();
    let mut engine = reference_engine(ESCROW);
    let id = open_shipment(&mut engine);
    submit_all(&mut engine, id, readings("FTFFT"));
    engine.validate_and_pay(CARRIER, id).unwrap_err();

    let err = engine.submit_evidence(SENSOR, id, 1, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(
        engine
            .shipment(id)
            .unwrap()
            .reading(coldchain::NodeId::ALL[0]),
        Some(false)
    );

    test_section!("retry re-evaluates the same evidence");
    let err = engine.validate_and_pay(CARRIER, id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ComplianceRejection);
    assert_eq!(engine.stats().snapshot().settlements_rejected, 2);
    test_complete!("rejected_shipment_cannot_be_amended");
}

#[test]
fn scenario_c_incomplete_evidence_regardless_of_values() {
    common::init_test_logging();
    test_phase!("scenario_c_incomplete_evidence_regardless_of_values");
    for missing in 1..=5u8 {
        for value in [false, true] {
            let mut engine = reference_engine(ESCROW);
            let id = open_shipment(&mut engine);
            for node in (1..=5).filter(|n| *n != missing) {
                engine.submit_evidence(SENSOR, id, node, value).unwrap();
            }
            let audit_len = engine.audit().len();

            let err = engine.validate_and_pay(CARRIER, id).unwrap_err();
            assert_with_log!(
                err.kind() == ErrorKind::IncompleteData,
                "missing node",
                missing,
                err
            );
            assert!(err.is_retryable());
            assert!(err.to_string().ends_with(&format!("missing E{missing}")));
            assert_eq!(engine.audit().len(), audit_len);
            assert!(engine.shipment(id).unwrap().is_open());
        }
    }

    test_section!("retry succeeds once complete");
    let mut engine = reference_engine(ESCROW);
    let id = open_shipment(&mut engine);
    for (node, value) in [(1, true), (2, true), (3, false), (5, true)] {
        engine.submit_evidence(SENSOR, id, node, value).unwrap();
    }
    assert!(engine.validate_and_pay(CARRIER, id).is_err());
    engine.submit_evidence(SENSOR, id, 4, false).unwrap();
    assert!(engine.validate_and_pay(CARRIER, id).is_ok());
    test_complete!("scenario_c_incomplete_evidence_regardless_of_values");
}

#[test]
fn scenario_d_non_sensor_cannot_submit() {
    common::init_test_logging();
    test_phase!("scenario_d_non_sensor_cannot_submit");
    let mut engine = reference_engine(ESCROW);
    let id = open_shipment(&mut engine);
    engine.submit_evidence(SENSOR, id, 2, true).unwrap();
    let audit_len = engine.audit().len();

    for caller in [OUTSIDER, SENDER, CARRIER, ADMIN] {
        let err = engine.submit_evidence(caller, id, 2, false).unwrap_err();
        assert_with_log!(
            err.kind() == ErrorKind::Authorization,
            "kind",
            ErrorKind::Authorization,
            err.kind()
        );
    }
    let shipment = engine.shipment(id).unwrap();
    assert_eq!(shipment.reading(coldchain::NodeId::ALL[1]), Some(true));
    assert_eq!(shipment.evidence_count(), 1);
    assert_eq!(engine.audit().len(), audit_len);
    assert_eq!(engine.stats().snapshot().authorization_denials, 4);
    test_complete!("scenario_d_non_sensor_cannot_submit");
}

#[test]
fn scenario_e_second_settlement_never_repays() {
    common::init_test_logging();
    test_phase!("scenario_e_second_settlement_never_repays");
    let mut engine = reference_engine(ESCROW);
    let id = open_shipment(&mut engine);
    submit_all(&mut engine, id, readings("TTFFT"));
    engine.validate_and_pay(CARRIER, id).unwrap();
    let audit_len = engine.audit().len();

    for _ in 0..3 {
        let err = engine.validate_and_pay(CARRIER, id).unwrap_err();
        assert!(matches!(err, Error::AlreadySettled(s) if s == id));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert_eq!(engine.balance(CARRIER), Amount::new(ESCROW));
    assert_eq!(engine.audit().len(), audit_len);

    test_section!("settled evidence is frozen");
    let err = engine.submit_evidence(SENSOR, id, 1, false).unwrap_err();
    assert!(matches!(err, Error::AlreadySettled(_)));
    test_complete!("scenario_e_second_settlement_never_repays");
}

#[test]
fn evidence_order_does_not_change_the_decision() {
    common::init_test_logging();
    let values = readings("TTFTF");
    let orders: [[u8; 5]; 3] = [[1, 2, 3, 4, 5], [5, 4, 3, 2, 1], [3, 1, 5, 2, 4]];
    let mut seen = Vec::new();
    for order in orders {
        let mut engine = reference_engine(ESCROW);
        let id = open_shipment(&mut engine);
        // A stale reading first, then the final one.
        engine
            .submit_evidence(SENSOR, id, order[0], !values[usize::from(order[0]) - 1])
            .unwrap();
        for node in order {
            engine
                .submit_evidence(SENSOR, id, node, values[usize::from(node) - 1])
                .unwrap();
        }
        seen.push(engine.preview_posteriors(id).unwrap());
    }
    assert!(seen.iter().all(|p| *p == Posteriors { f1: 92, f2: 75 }));
}

#[test]
fn overwrites_are_audited_per_submission() {
    common::init_test_logging();
    let mut engine = reference_engine(ESCROW);
    let id = open_shipment(&mut engine);
    engine.submit_evidence(SENSOR, id, 3, true).unwrap();
    engine.submit_evidence(SENSOR, id, 3, false).unwrap();

    let flags: Vec<bool> = engine
        .audit()
        .for_shipment(id)
        .filter_map(|r| match r.event {
            AuditEvent::EvidenceSubmitted { overwrote, .. } => Some(overwrote),
            _ => None,
        })
        .collect();
    assert_eq!(flags, vec![false, true]);
}

#[test]
fn model_changes_apply_to_open_shipments() {
    common::init_test_logging();
    let mut engine = reference_engine(ESCROW);
    let id = open_shipment(&mut engine);
    submit_all(&mut engine, id, readings("TTFFT"));
    engine.set_priors(ADMIN, 50, 50).unwrap();
    let entry = engine.validate_and_pay(CARRIER, id).unwrap();
    assert_eq!(entry.posteriors, Posteriors { f1: 96, f2: 100 });
}

#[test]
fn zero_priors_reject_everything() {
    common::init_test_logging();
    let mut engine = bare_engine(EngineConfig::default(), ESCROW);
    for (node, table) in (1..=5).zip(common::REFERENCE_CPTS) {
        engine.set_cpt(ADMIN, node, table).unwrap();
    }
    let id = open_shipment(&mut engine);
    submit_all(&mut engine, id, readings("TTFFT"));
    let err = engine.validate_and_pay(CARRIER, id).unwrap_err();
    assert!(matches!(
        err,
        Error::ComplianceRejected {
            posteriors: Posteriors { f1: 0, f2: 0 },
            ..
        }
    ));
}

#[test]
fn missing_cpt_is_a_validation_error() {
    common::init_test_logging();
    let mut engine = bare_engine(EngineConfig::default(), ESCROW);
    engine.set_priors(ADMIN, 90, 90).unwrap();
    for (node, table) in (1..=4).zip(common::REFERENCE_CPTS) {
        engine.set_cpt(ADMIN, node, table).unwrap();
    }
    let id = open_shipment(&mut engine);
    submit_all(&mut engine, id, readings("TTFFT"));
    let audit_len = engine.audit().len();

    let err = engine.validate_and_pay(CARRIER, id).unwrap_err();
    assert!(matches!(
        err,
        Error::ModelIncomplete { ref missing } if missing.len() == 1
    ));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(engine.audit().len(), audit_len);
}

#[test]
fn zero_normalization_is_an_internal_invariant_error() {
    common::init_test_logging();
    test_phase!("zero_normalization_is_an_internal_invariant_error");
    let mut engine = reference_engine(ESCROW);
    engine.set_priors(ADMIN, 100, 100).unwrap();
    engine.set_cpt(ADMIN, 1, [5, 5, 98, 0]).unwrap();
    let id = open_shipment(&mut engine);
    submit_all(&mut engine, id, readings("TTFFT"));
    let audit_len = engine.audit().len();

    let err = engine.validate_and_pay(CARRIER, id).unwrap_err();
    assert_with_log!(
        err.kind() == ErrorKind::InternalInvariant,
        "kind",
        ErrorKind::InternalInvariant,
        err.kind()
    );
    assert!(matches!(err, Error::ZeroNormalization { .. }));
    assert!(!err.is_retryable());
    assert_eq!(engine.audit().len(), audit_len);
    assert_eq!(engine.total_escrowed(), Amount::new(ESCROW));
    test_complete!("zero_normalization_is_an_internal_invariant_error");
}

#[test]
fn carrier_check_precedes_completeness() {
    common::init_test_logging();
    let mut engine = reference_engine(ESCROW);
    let id = open_shipment(&mut engine);
    let err = engine.validate_and_pay(OUTSIDER, id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    let err = engine.validate_and_pay(CARRIER, id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompleteData);
    let err = engine
        .validate_and_pay(CARRIER, ShipmentId::new(99))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownShipment(_)));
}

#[test]
fn sender_can_also_be_carrier() {
    common::init_test_logging();
    let mut engine = reference_engine(ESCROW);
    let id = engine
        .create_shipment(SENDER, SENDER, Amount::new(ESCROW))
        .unwrap();
    submit_all(&mut engine, id, readings("TTFFT"));
    engine.validate_and_pay(SENDER, id).unwrap();
    assert_eq!(engine.balance(SENDER), Amount::new(ESCROW));
}

#[test]
fn conservation_across_a_mixed_run() {
    common::init_test_logging();
    let funding = 10_000;
    let mut engine = reference_engine(funding);
    let evidence = ["TTFFT", "FTFFT", "TTFTT", "TFFTT"];
    for (i, text) in evidence.iter().enumerate() {
        let id = engine
            .create_shipment(SENDER, CARRIER, Amount::new(100 * (i as u64 + 1)))
            .unwrap();
        submit_all(&mut engine, id, readings(text));
        let _ = engine.validate_and_pay(CARRIER, id);
        let held = engine.balance(SENDER).get()
            + engine.balance(CARRIER).get()
            + engine.total_escrowed().get();
        assert_eq!(held, funding);
    }
    // Shipments 1 and 3 paid; 2 and 4 were rejected.
    assert_eq!(engine.balance(CARRIER), Amount::new(100 + 300));
    assert_eq!(engine.total_escrowed(), Amount::new(200 + 400));
    assert_eq!(engine.shipments_by(CARRIER).len(), 4);
}
