//! Terminal renderer for [`AuditRecord`] entries.
//!
//! Two levels of detail:
//!
//! - **Level 0** (one-liner): fits in a single 120-char terminal line.
//! - **Level 1** (paragraph): multi-line block, with or without ANSI colors.
//!
//! Rendering is stateless and deterministic.
//!
//! ```
//! use coldchain_evidence::{AuditRecord, AuditEvent, render};
//! use coldchain_kernel::Principal;
//!
//! let record = AuditRecord {
//!     seq: 1,
//!     actor: Principal::from_raw(1),
//!     event: AuditEvent::PriorsSet { f1: 90, f2: 85 },
//! };
//! let line = render::level0(&record);
//! assert!(line.len() <= 120);
//! assert!(line.contains("priors"));
//! ```

use crate::{AuditEvent, AuditRecord};
use coldchain_kernel::Principal;
use std::fmt::Write;

// ANSI escape codes.
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const CYAN: &str = "\x1b[36m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";

const MAX_LINE: usize = 120;

/// Last eight hex digits of a principal, enough to tell actors apart on screen.
fn short(principal: Principal) -> String {
    let full = principal.to_string();
    format!("…{}", &full[full.len() - 8..])
}

fn yes_no(value: bool) -> &'static str {
    if value { "T" } else { "F" }
}

/// Plain one-phrase description of an event.
fn summary(event: &AuditEvent) -> String {
    match event {
        AuditEvent::RoleGranted { role, principal } => {
            format!("granted {role} to {}", short(*principal))
        }
        AuditEvent::RoleRevoked { role, principal } => {
            format!("revoked {role} from {}", short(*principal))
        }
        AuditEvent::PriorsSet { f1, f2 } => format!("set priors F1={f1}% F2={f2}%"),
        AuditEvent::CptSet { node, table } => format!(
            "set CPT E{node} [ff={} ft={} tf={} tt={}]",
            table[0], table[1], table[2], table[3]
        ),
        AuditEvent::ShipmentCreated {
            shipment,
            carrier,
            amount,
        } => format!(
            "opened shipment {shipment} for {} escrowing {amount}",
            short(*carrier)
        ),
        AuditEvent::EvidenceSubmitted {
            shipment,
            node,
            value,
            overwrote,
        } => {
            let over = if *overwrote { " (overwrite)" } else { "" };
            format!("E{node}={} on {shipment}{over}", yes_no(*value))
        }
        AuditEvent::SettlementRejected {
            shipment,
            posteriors,
            threshold,
            ..
        } => format!(
            "rejected {shipment}: F1={}% F2={}% < {threshold}%",
            posteriors[0], posteriors[1]
        ),
        AuditEvent::ShipmentSettled {
            shipment,
            carrier,
            amount,
            posteriors,
            ..
        } => format!(
            "settled {shipment}: paid {amount} to carrier {} (F1={}% F2={}%)",
            short(*carrier),
            posteriors[0],
            posteriors[1]
        ),
    }
}

/// Render a Level 0 one-liner (no ANSI, max 120 chars).
///
/// Format: `[{seq}] {actor} {summary}`.
pub fn level0(record: &AuditRecord) -> String {
    let line = format!(
        "[{}] {} {}",
        record.seq,
        short(record.actor),
        summary(&record.event)
    );
    if line.chars().count() > MAX_LINE {
        let mut truncated: String = line.chars().take(MAX_LINE - 3).collect();
        truncated.push_str("...");
        truncated
    } else {
        line
    }
}

/// Render a Level 0 one-liner with ANSI colors.
pub fn level0_ansi(record: &AuditRecord) -> String {
    let color = event_color(&record.event);
    format!(
        "{DIM}[{}]{RESET} {CYAN}{}{RESET} {color}{}{RESET}",
        record.seq,
        short(record.actor),
        summary(&record.event)
    )
}

/// Render a Level 1 paragraph with ANSI colors.
pub fn level1(record: &AuditRecord) -> String {
    paragraph(record, true)
}

/// Render a Level 1 paragraph without ANSI colors.
pub fn level1_plain(record: &AuditRecord) -> String {
    paragraph(record, false)
}

fn paragraph(record: &AuditRecord, ansi: bool) -> String {
    let paint = |code: &'static str| if ansi { code } else { "" };
    let (bold, dim, reset) = (paint(BOLD), paint(DIM), paint(RESET));
    let mut out = String::with_capacity(256);

    let _ = writeln!(
        out,
        "{bold}{}{}{reset} {dim}#{}{reset}",
        paint(CYAN),
        record.event.name(),
        record.seq
    );
    let _ = writeln!(out, "  actor: {}", record.actor);
    if let Some(shipment) = record.event.shipment() {
        let _ = writeln!(out, "  shipment: {shipment}");
    }

    match &record.event {
        AuditEvent::SettlementRejected {
            decision,
            posteriors,
            threshold,
            ..
        } => {
            let _ = writeln!(out, "  decision: {decision}");
            for (label, pct) in [("F1", posteriors[0]), ("F2", posteriors[1])] {
                let color = paint(posterior_color(pct, *threshold));
                let _ = writeln!(
                    out,
                    "  {label}: {color}{pct:>3}%{reset} (need {threshold}%)"
                );
            }
            let _ = writeln!(
                out,
                "  {}{bold}compliance requirements not met{reset}",
                paint(RED)
            );
        }
        AuditEvent::ShipmentSettled {
            decision,
            carrier,
            amount,
            posteriors,
            ..
        } => {
            let _ = writeln!(out, "  decision: {decision}");
            let _ = writeln!(out, "  F1: {}%  F2: {}%", posteriors[0], posteriors[1]);
            let _ = writeln!(
                out,
                "  {}{bold}paid {amount} to {carrier}{reset}",
                paint(GREEN)
            );
        }
        other => {
            let _ = writeln!(out, "  {}", summary(other));
        }
    }

    out
}

/// Color for a posterior relative to the compliance threshold.
fn posterior_color(pct: u8, threshold: u8) -> &'static str {
    if pct >= threshold {
        GREEN
    } else if pct.saturating_add(10) >= threshold {
        YELLOW
    } else {
        RED
    }
}

fn event_color(event: &AuditEvent) -> &'static str {
    match event {
        AuditEvent::ShipmentSettled { .. } => GREEN,
        AuditEvent::SettlementRejected { .. } => RED,
        AuditEvent::RoleRevoked { .. } => YELLOW,
        _ => "",
    }
}
