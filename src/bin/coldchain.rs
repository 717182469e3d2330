//! coldchain: run escrow scenarios and ad-hoc inference from the shell.
//!
//! ```bash
//! coldchain run tests/fixtures/scenario_a.yaml
//! coldchain replay tests/fixtures/scenario_a.yaml --json
//! coldchain infer --priors 90,90 --evidence TTFFT \
//!     --cpt 5,5,98,98 --cpt 1,99,1,99 --cpt 70,10,70,10 --cpt 95,2,95,2 --cpt 20,80,80,99
//! coldchain audit /tmp/audit.jsonl --verbose
//! ```

use clap::{ArgAction, Args, Parser, Subcommand};
use coldchain::coldchain_decision::{Cpt, JointTable, NODE_COUNT, Priors};
use coldchain::coldchain_evidence::export::{JsonlExporter, read_jsonl};
use coldchain::coldchain_evidence::render;
use coldchain::{
    AuditSink, ComplianceThreshold, EvidenceVector, Hypothesis, Scenario, ScenarioReport,
    ScenarioRunner,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "coldchain",
    version,
    about = "Deterministic escrow settlement for cold-chain shipments",
    long_about = "coldchain runs escrow scenarios against a fresh engine, replays them\n\
        to check determinism, and evaluates the compliance model for a single\n\
        evidence vector."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario YAML file
    Run(RunArgs),

    /// Validate a scenario YAML file without executing it
    Validate(ScenarioArgs),

    /// Run a scenario twice and verify identical reports
    Replay(ScenarioArgs),

    /// Evaluate posteriors for one evidence vector
    Infer(InferArgs),

    /// Summarise an audit JSONL file
    Audit(AuditArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the scenario YAML file
    scenario: PathBuf,

    /// Also write the audit ledger to this JSONL file
    #[arg(long)]
    audit_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ScenarioArgs {
    /// Path to the scenario YAML file
    scenario: PathBuf,
}

#[derive(Args, Debug)]
struct InferArgs {
    /// Prior pair `f1,f2` in percent
    #[arg(long, value_parser = parse_priors)]
    priors: Priors,

    /// CPT row `p_ff,p_ft,p_tf,p_tt`, once per node in order E1..E5
    #[arg(long = "cpt", value_parser = parse_cpt, num_args = 1)]
    cpts: Vec<Cpt>,

    /// Evidence as five T/F characters, E1 first
    #[arg(long)]
    evidence: EvidenceVector,

    /// Compliance threshold in percent
    #[arg(long, default_value_t = coldchain::DEFAULT_THRESHOLD)]
    threshold: u8,
}

#[derive(Args, Debug)]
struct AuditArgs {
    /// Path to the JSONL file
    file: PathBuf,

    /// One paragraph per record instead of one line
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn parse_percents<const N: usize>(text: &str) -> Result<[u8; N], String> {
    let values = text
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u8>()
                .map_err(|e| format!("'{part}': {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    <[u8; N]>::try_from(values).map_err(|v| format!("expected {N} values, got {}", v.len()))
}

fn parse_priors(text: &str) -> Result<Priors, String> {
    let [f1, f2] = parse_percents::<2>(text)?;
    Priors::new(f1, f2).map_err(|e| e.to_string())
}

fn parse_cpt(text: &str) -> Result<Cpt, String> {
    Cpt::from_table(parse_percents::<4>(text)?).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Scenario loading
// ---------------------------------------------------------------------------

fn load_scenario(path: &Path) -> Result<Scenario, String> {
    let yaml =
        fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    ScenarioRunner::parse_yaml(&yaml).map_err(|e| {
        format!(
            "Failed to parse {}: {e}. Hint: check indentation and field names",
            path.display()
        )
    })
}

fn format_report(report: &ScenarioReport, json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
    }
    let status = if report.passed() { "PASS" } else { "FAIL" };
    let mut lines = vec![
        format!("Scenario: {} [{status}]", report.scenario_id),
        format!(
            "Steps: {}/{} as expected",
            report.steps.len() - report.failures().count(),
            report.steps.len()
        ),
    ];
    for step in report.failures() {
        lines.push(format!(
            "  step {} ({}): expected {:?}, got {:?}",
            step.index, step.action, step.expected, step.outcome
        ));
    }
    let balances: Vec<String> = report
        .balances
        .iter()
        .map(|(name, amount)| format!("{name}={amount}"))
        .collect();
    lines.push(format!("Balances: {}", balances.join(", ")));
    lines.push(format!("Escrowed: {}", report.total_escrowed));
    lines.push(format!(
        "Audit: {} records, digest {}",
        report.audit_len, report.audit_digest
    ));
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_run(args: RunArgs, json: bool) -> Result<(), String> {
    let scenario = load_scenario(&args.scenario)?;
    let sink: Option<Box<dyn AuditSink + Send>> = match args.audit_out {
        Some(path) => {
            let exporter = JsonlExporter::open(path.clone())
                .map_err(|e| format!("Failed to open {}: {e}", path.display()))?;
            Some(Box::new(exporter))
        }
        None => None,
    };
    let report = ScenarioRunner::run_with_sink(&scenario, sink).map_err(|e| e.to_string())?;
    println!("{}", format_report(&report, json));

    if report.passed() {
        Ok(())
    } else {
        Err("Scenario expectations failed".to_string())
    }
}

fn cmd_validate(args: ScenarioArgs, json: bool) -> Result<(), String> {
    let scenario = load_scenario(&args.scenario)?;
    let errors = scenario.validate();

    if json {
        let report = serde_json::json!({
            "scenario": args.scenario.display().to_string(),
            "scenario_id": scenario.id,
            "valid": errors.is_empty(),
            "errors": errors,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_default()
        );
    } else if errors.is_empty() {
        println!("Scenario '{}' is valid", scenario.id);
    } else {
        println!("Scenario '{}' has errors:", scenario.id);
        for err in &errors {
            println!("  - {err}");
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err("Scenario validation failed".to_string())
    }
}

fn cmd_replay(args: ScenarioArgs, json: bool) -> Result<(), String> {
    let scenario = load_scenario(&args.scenario)?;
    let report = ScenarioRunner::replay(&scenario).map_err(|e| e.to_string())?;

    if json {
        let out = serde_json::json!({
            "scenario": args.scenario.display().to_string(),
            "scenario_id": report.scenario_id,
            "deterministic": true,
            "audit_len": report.audit_len,
            "audit_digest": report.audit_digest,
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
    } else {
        println!(
            "Replay verified: {} (audit_len={}, digest={})",
            report.scenario_id, report.audit_len, report.audit_digest
        );
    }
    Ok(())
}

fn cmd_infer(args: InferArgs, json: bool) -> Result<(), String> {
    let cpts: [Cpt; NODE_COUNT] = args
        .cpts
        .try_into()
        .map_err(|v: Vec<Cpt>| format!("expected {NODE_COUNT} --cpt rows, got {}", v.len()))?;
    let threshold = ComplianceThreshold::new(args.threshold).map_err(|e| e.to_string())?;
    let table = JointTable::compute(args.priors, &cpts, args.evidence);
    let posteriors = table.posteriors(args.evidence).map_err(|e| e.to_string())?;
    let verdict = threshold.check(posteriors);

    if json {
        let out = serde_json::json!({
            "evidence": args.evidence.to_string(),
            "joints": table.joints(),
            "z": table.z(),
            "posteriors": posteriors.as_array(),
            "threshold": threshold.get(),
            "verdict": verdict,
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
    } else {
        println!("Evidence: {}", args.evidence);
        for h in Hypothesis::ALL {
            println!("  joint[{h}] = {}", table.joint(h));
        }
        println!("  Z = {}", table.z());
        println!("Posteriors: {posteriors}");
        println!("Verdict: {verdict:?} (threshold {}%)", threshold.get());
    }
    Ok(())
}

fn cmd_audit(args: AuditArgs, json: bool) -> Result<(), String> {
    let records = read_jsonl(&args.file)
        .map_err(|e| format!("Failed to read {}: {e}", args.file.display()))?;
    for record in &records {
        if json {
            println!("{}", serde_json::to_string(record).unwrap_or_default());
        } else if args.verbose {
            println!("{}\n", render::level1_plain(record));
        } else {
            println!("{}", render::level0(record));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => cmd_run(args, cli.json),
        Command::Validate(args) => cmd_validate(args, cli.json),
        Command::Replay(args) => cmd_replay(args, cli.json),
        Command::Infer(args) => cmd_infer(args, cli.json),
        Command::Audit(args) => cmd_audit(args, cli.json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("Error: {msg}");
            ExitCode::FAILURE
        }
    }
}
