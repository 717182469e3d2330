//! Shared helpers for integration tests.
//!
//! Each test binary includes this module with `#[macro_use] mod common;`,
//! so not every helper is used everywhere.

#![allow(dead_code)]
#![allow(unused_macros)]

use std::sync::Once;

use coldchain::{Amount, EngineConfig, EscrowEngine, Principal, Role, ShipmentId};

static INIT_LOGGING: Once = Once::new();

/// Install a test-writer tracing subscriber once per binary.
///
/// `RUST_LOG` overrides the default `coldchain=debug` filter.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("coldchain=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Log the start of a named test.
macro_rules! test_phase {
    ($name:expr) => {
        ::tracing::info!(test = $name, "=== phase: {} ===", $name);
    };
}

/// Log a section inside a test.
macro_rules! test_section {
    ($msg:expr) => {
        ::tracing::debug!("--- {} ---", $msg);
    };
}

/// Assert with the expected and actual values logged first.
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {{
        let ok = $cond;
        ::tracing::debug!(
            check = $msg,
            expected = ?$expected,
            actual = ?$actual,
            ok,
            "assertion"
        );
        assert!(
            ok,
            "{}: expected {:?}, actual {:?}",
            $msg, $expected, $actual
        );
    }};
}

/// Log successful completion, with optional key/value context.
macro_rules! test_complete {
    ($name:expr) => {
        ::tracing::info!(test = $name, "test complete");
    };
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        ::tracing::info!(test = $name, $($key = ?$value),+, "test complete");
    };
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const ADMIN: Principal = Principal::from_raw(0xad);
pub const SENDER: Principal = Principal::from_raw(0x5e);
pub const CARRIER: Principal = Principal::from_raw(0xca);
pub const SENSOR: Principal = Principal::from_raw(0x55);
pub const OUTSIDER: Principal = Principal::from_raw(0xee);

/// CPT rows E1..E5 of the reference cold-chain model.
pub const REFERENCE_CPTS: [[u8; 4]; 5] = [
    [5, 5, 98, 98],
    [1, 99, 1, 99],
    [70, 10, 70, 10],
    [95, 2, 95, 2],
    [20, 80, 80, 99],
];

/// Engine with sender/sensor roles granted and the sender funded.
pub fn bare_engine(config: EngineConfig, funding: u64) -> EscrowEngine {
    let mut engine = EscrowEngine::with_config(ADMIN, config).expect("valid config");
    engine
        .grant_role(ADMIN, Role::Sender, SENDER)
        .expect("grant sender");
    engine
        .grant_role(ADMIN, Role::Sensor, SENSOR)
        .expect("grant sensor");
    engine
        .credit(SENDER, Amount::new(funding))
        .expect("credit sender");
    engine
}

/// [`bare_engine`] plus the reference model with priors (90, 90).
pub fn reference_engine(funding: u64) -> EscrowEngine {
    let mut engine = bare_engine(EngineConfig::default(), funding);
    load_reference_model(&mut engine);
    engine
}

pub fn load_reference_model(engine: &mut EscrowEngine) {
    engine.set_priors(ADMIN, 90, 90).expect("priors");
    for (node, table) in (1..=5).zip(REFERENCE_CPTS) {
        engine.set_cpt(ADMIN, node, table).expect("cpt");
    }
}

/// Submit E1..E5 in order.
pub fn submit_all(engine: &mut EscrowEngine, shipment: ShipmentId, values: [bool; 5]) {
    for (node, value) in (1..=5).zip(values) {
        engine
            .submit_evidence(SENSOR, shipment, node, value)
            .expect("submit evidence");
    }
}

/// Parse `"TTFFT"` into readings.
pub fn readings(text: &str) -> [bool; 5] {
    text.parse::<coldchain::EvidenceVector>()
        .expect("evidence literal")
        .values()
}

pub fn fixture_path(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}
