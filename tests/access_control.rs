#![allow(missing_docs)]
//! Role gating of every engine operation.

#[macro_use]
mod common;

use coldchain::{Amount, AuditEvent, EngineConfig, Error, ErrorKind, EscrowEngine, Role};
use common::{ADMIN, CARRIER, OUTSIDER, SENDER, SENSOR, bare_engine, reference_engine};

#[test]
fn only_admin_grants_and_revokes() {
    common::init_test_logging();
    test_phase!("only_admin_grants_and_revokes");
    let mut engine = EscrowEngine::new(ADMIN);

    let err = engine
        .grant_role(OUTSIDER, Role::Sensor, OUTSIDER)
        .unwrap_err();
    assert_with_log!(
        err.kind() == ErrorKind::Authorization,
        "self-grant refused",
        ErrorKind::Authorization,
        err.kind()
    );
    assert!(!engine.has_role(OUTSIDER, Role::Sensor));

    engine.grant_role(ADMIN, Role::Sensor, SENSOR).unwrap();
    let err = engine
        .revoke_role(SENSOR, Role::Sensor, SENSOR)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(engine.has_role(SENSOR, Role::Sensor));

    engine.revoke_role(ADMIN, Role::Sensor, SENSOR).unwrap();
    assert!(!engine.has_role(SENSOR, Role::Sensor));
    test_complete!("only_admin_grants_and_revokes");
}

#[test]
fn grants_are_audited_once() {
    common::init_test_logging();
    let mut engine = EscrowEngine::new(ADMIN);
    let base = engine.audit().len();

    engine.grant_role(ADMIN, Role::Sender, SENDER).unwrap();
    engine.grant_role(ADMIN, Role::Sender, SENDER).unwrap();
    engine.revoke_role(ADMIN, Role::Sensor, SENDER).unwrap();
    assert_eq!(engine.audit().len(), base + 1);
    assert!(matches!(
        engine.last_record().unwrap().event,
        AuditEvent::RoleGranted {
            role: Role::Sender,
            principal
        } if principal == SENDER
    ));
    assert_eq!(engine.last_record().unwrap().actor, ADMIN);
}

#[test]
fn admin_cannot_lock_itself_out() {
    common::init_test_logging();
    let mut engine = EscrowEngine::new(ADMIN);
    let err = engine.revoke_role(ADMIN, Role::Admin, ADMIN).unwrap_err();
    assert!(matches!(err, Error::SelfRevoke { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);

    test_section!("a second admin may revoke the first");
    engine.grant_role(ADMIN, Role::Admin, OUTSIDER).unwrap();
    engine.revoke_role(OUTSIDER, Role::Admin, ADMIN).unwrap();
    assert_eq!(engine.members(Role::Admin), vec![OUTSIDER]);
    assert!(engine.grant_role(ADMIN, Role::Sensor, SENSOR).is_err());
}

#[test]
fn model_updates_need_operator() {
    common::init_test_logging();
    test_phase!("model_updates_need_operator");
    let mut engine = reference_engine(0);
    let before = engine.model().clone();

    for caller in [SENDER, SENSOR, CARRIER, OUTSIDER] {
        assert_eq!(
            engine.set_priors(caller, 10, 10).unwrap_err().kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            engine.set_cpt(caller, 1, [1, 1, 1, 1]).unwrap_err().kind(),
            ErrorKind::Authorization
        );
    }
    assert_eq!(engine.model(), &before);

    test_section!("delegated operator");
    engine.grant_role(ADMIN, Role::Operator, OUTSIDER).unwrap();
    engine.set_priors(OUTSIDER, 10, 10).unwrap();
    assert_eq!(engine.model().priors().f1.get(), 10);
    test_complete!("model_updates_need_operator");
}

#[test]
fn authorization_is_checked_before_values() {
    common::init_test_logging();
    let mut engine = EscrowEngine::new(ADMIN);
    let err = engine.set_priors(OUTSIDER, 200, 200).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    let err = engine.set_priors(ADMIN, 200, 50).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = engine.set_cpt(ADMIN, 0, [1, 1, 1, 1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn only_senders_create_shipments() {
    common::init_test_logging();
    let mut engine = bare_engine(EngineConfig::default(), 1_000);
    engine.credit(OUTSIDER, Amount::new(1_000)).unwrap();

    let err = engine
        .create_shipment(OUTSIDER, CARRIER, Amount::new(10))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::MissingRole {
            role: Role::Sender,
            ..
        }
    ));
    assert_eq!(engine.balance(OUTSIDER), Amount::new(1_000));
    assert!(engine.shipments().next().is_none());

    test_section!("revoked sender");
    engine
        .create_shipment(SENDER, CARRIER, Amount::new(10))
        .unwrap();
    engine.revoke_role(ADMIN, Role::Sender, SENDER).unwrap();
    assert!(
        engine
            .create_shipment(SENDER, CARRIER, Amount::new(10))
            .is_err()
    );
    assert_eq!(engine.shipments().count(), 1);
}

#[test]
fn carrier_is_per_shipment_not_a_role() {
    common::init_test_logging();
    let mut engine = reference_engine(1_000);
    let a = engine
        .create_shipment(SENDER, CARRIER, Amount::new(10))
        .unwrap();
    let b = engine
        .create_shipment(SENDER, OUTSIDER, Amount::new(10))
        .unwrap();
    common::submit_all(&mut engine, a, common::readings("TTFFT"));
    common::submit_all(&mut engine, b, common::readings("TTFFT"));

    assert!(matches!(
        engine.validate_and_pay(CARRIER, b),
        Err(Error::NotCarrier { .. })
    ));
    assert!(matches!(
        engine.validate_and_pay(ADMIN, a),
        Err(Error::NotCarrier { .. })
    ));
    engine.validate_and_pay(CARRIER, a).unwrap();
    engine.validate_and_pay(OUTSIDER, b).unwrap();
    assert_eq!(engine.stats().snapshot().authorization_denials, 2);
}

#[test]
fn preview_is_open_to_anyone_and_read_only() {
    common::init_test_logging();
    let mut engine = reference_engine(1_000);
    let id = engine
        .create_shipment(SENDER, CARRIER, Amount::new(10))
        .unwrap();
    common::submit_all(&mut engine, id, common::readings("TTFTT"));
    let audit_len = engine.audit().len();

    let posteriors = engine.preview_posteriors(id).unwrap();
    assert_eq!(posteriors.as_array(), [100, 99]);
    assert_eq!(engine.audit().len(), audit_len);
    assert!(engine.shipment(id).unwrap().is_open());
}

#[test]
fn role_changes_check_the_admin_once() {
    common::init_test_logging();
    let mut engine = EscrowEngine::new(ADMIN);
    let base = engine.audit().len();

    engine
        .grant_role(OUTSIDER, Role::Sensor, SENSOR)
        .unwrap_err();
    engine
        .revoke_role(OUTSIDER, Role::Admin, ADMIN)
        .unwrap_err();
    assert_with_log!(
        engine.stats().snapshot().authorization_denials == 2,
        "one denial per refused call",
        2,
        engine.stats().snapshot().authorization_denials
    );

    test_section!("self-revoke is a validation failure, not a denial");
    let err = engine.revoke_role(ADMIN, Role::Admin, ADMIN).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(engine.stats().snapshot().authorization_denials, 2);
    assert_eq!(engine.audit().len(), base);

    engine.grant_role(ADMIN, Role::Sensor, SENSOR).unwrap();
    engine.revoke_role(ADMIN, Role::Sensor, SENSOR).unwrap();
    assert!(!engine.has_role(SENSOR, Role::Sensor));
    assert_eq!(engine.audit().len(), base + 2);
}
