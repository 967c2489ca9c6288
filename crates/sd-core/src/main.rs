//! System Doctor - diagnostic and remediation CLI.
//!
//! Drives the engine pipeline against the live machine:
//! - `sd run "<intent>"` - full diagnosis, fixes proposed (and executed
//!   only under explicit confirmation flags)
//! - `sd triage "<intent>"` - show the inspection plan without running it
//! - `sd rules` - list the registered rules
//! - `sd classify <command>` - show normalization and risk tier

use clap::{Args, Parser, Subcommand};
use sd_common::SessionMeta;
use sd_config::DoctorConfig;
use sd_core::collect::normalizer::{classify_risk, normalize_command};
use sd_core::diagnose::candidates_for_playbook;
use sd_core::engine::{ExecuteOptions, SystemDoctorEngine};
use sd_core::exec::ShellExecutor;
use sd_core::exit_codes::ExitCode;
use sd_core::logging::{init_logging, LogFormat, LogLevel};
use sd_core::recommend::fix_templates_for;
use sd_core::report::ActionTaken;
use sd_core::rules::RuleRegistry;
use sd_core::transcript::ExportFormat;
use sd_core::verify::default_checks_for;
use std::path::PathBuf;

/// System Doctor - evidence-backed diagnosis and risk-gated fixes
#[derive(Parser)]
#[command(name = "sd")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to a TOML config file (allowlist, timeouts)
    #[arg(long, global = true, env = "SD_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error|off)
    #[arg(long, global = true, default_value_t = LogLevel::default())]
    log_level: LogLevel,

    /// Log format (human|jsonl)
    #[arg(long, global = true, default_value_t = LogFormat::default())]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Diagnose a symptom and propose (optionally execute) fixes
    Run(RunArgs),

    /// Show the triage result and inspection plan for an intent
    Triage(TriageArgs),

    /// List the registered diagnostic rules
    Rules,

    /// Normalize a command and show its risk tier
    Classify(ClassifyArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Symptom description, e.g. "laptop running hot"
    intent: String,

    /// Execute this fix option id (from a previous proposal)
    #[arg(long)]
    fix: Option<String>,

    /// Confirm execution of mutating steps
    #[arg(long)]
    yes: bool,

    /// Confirmation text for high-impact steps (must be exactly YES)
    #[arg(long)]
    confirm: Option<String>,

    /// Transcript export format (json|text)
    #[arg(long, default_value = "text")]
    format: ExportFormat,

    /// Write the transcript export to this path
    #[arg(long)]
    export: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TriageArgs {
    /// Symptom description
    intent: String,

    /// Emit the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// Command string to classify
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    command: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.log_level, cli.global.log_format);

    let exit = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from_error(&e)
        }
    };
    std::process::exit(exit.code());
}

fn run(cli: Cli) -> sd_common::Result<ExitCode> {
    let config = match &cli.global.config {
        Some(path) => DoctorConfig::load_toml(path)?,
        None => DoctorConfig::default(),
    };

    match cli.command {
        Commands::Run(args) => cmd_run(config, args),
        Commands::Triage(args) => cmd_triage(args),
        Commands::Rules => cmd_rules(),
        Commands::Classify(args) => cmd_classify(args),
    }
}

fn cmd_run(config: DoctorConfig, args: RunArgs) -> sd_common::Result<ExitCode> {
    let session = SessionMeta::generate();
    let mut engine = SystemDoctorEngine::new(config, session, ShellExecutor::new());

    engine.intake(&args.intent);

    let triaged = engine.triage(&args.intent);
    println!(
        "Symptoms: {}",
        if triaged.symptom_keywords.is_empty() {
            "none recognized (general check)".to_string()
        } else {
            triaged.symptom_keywords.join(", ")
        }
    );

    let plan = engine.build_inspect_plan(&args.intent, None);
    println!("Inspecting ({} steps)...", plan.steps.len());

    let evidence = engine.collect_evidence(&plan.steps, None);
    let findings = engine.interpret(&evidence);
    for finding in &findings {
        println!("  [{}] {}", finding.severity, finding.title);
    }

    let candidates = candidates_for_playbook(&plan.playbook_id);
    let diagnosis = engine.diagnose(&findings, &candidates);
    println!(
        "\nDiagnosis: {} (score {:.2})",
        diagnosis.primary.label, diagnosis.primary.score
    );
    if !diagnosis.notes.is_empty() {
        println!("  {}", diagnosis.notes);
    }
    for d in &diagnosis.differential {
        println!("  differential: {} (score {:.2})", d.label, d.score);
    }

    let templates = fix_templates_for(&diagnosis.primary.cause_id, &evidence);
    let options = engine.recommend(&diagnosis, &templates);

    if options.is_empty() {
        println!("\nNo automated fixes available for this diagnosis.");
    } else {
        println!("\nFix options (least invasive first):");
        for option in &options {
            println!("  {} [{}] {} - {}", option.id, option.risk, option.label, option.why);
        }
    }

    let mut exit = if options.is_empty() {
        ExitCode::Clean
    } else {
        ExitCode::FixesProposed
    };

    if let Some(fix_id) = &args.fix {
        let Some(option) = options.iter().find(|o| &o.id == fix_id) else {
            eprintln!("error: no fix option with id {}", fix_id);
            return Ok(ExitCode::ArgsError);
        };

        let exec_options = ExecuteOptions {
            confirmed: args.yes,
            confirmation_text: args.confirm.clone(),
        };
        let results = engine.execute_fix(&option.plan, &exec_options, None)?;
        println!("\nExecuted {} step(s).", results.len());

        let after = engine.collect_evidence(&plan.steps, None);
        let checks = default_checks_for(&diagnosis.primary.cause_id);
        let verification = engine.verify(&evidence, &after, &checks);

        let actions = vec![ActionTaken {
            label: option.label.clone(),
            risk: option.risk,
        }];
        let outcome = engine.report(&diagnosis, &verification, &actions);

        println!("\nOutcome: {:?} (confidence {:.2})", outcome.status, outcome.confidence);
        for result in &outcome.results {
            println!("  {}", result);
        }
        for tip in &outcome.prevention_tips {
            println!("  tip: {}", tip);
        }

        exit = if verification.ok {
            ExitCode::Clean
        } else {
            ExitCode::FixUnverified
        };
    }

    if let Some(path) = &args.export {
        std::fs::write(path, engine.export_transcript(args.format))?;
        println!("\nTranscript written to {}", path.display());
    } else if args.format == ExportFormat::Json {
        println!("\n{}", engine.export_transcript(ExportFormat::Json));
    }

    Ok(exit)
}

fn cmd_triage(args: TriageArgs) -> sd_common::Result<ExitCode> {
    let result = sd_core::triage::triage(&args.intent);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Playbook: {}", result.matched_playbook);
        println!(
            "Symptoms: {}",
            if result.symptom_keywords.is_empty() {
                "(none)".to_string()
            } else {
                result.symptom_keywords.join(", ")
            }
        );
        println!("Plan:");
        for step in &result.suggested_steps {
            println!("  [{}] {} - {}", step.risk, step.command, step.description);
        }
    }

    Ok(ExitCode::Clean)
}

fn cmd_rules() -> sd_common::Result<ExitCode> {
    let registry = RuleRegistry::with_defaults();
    for rule in registry.all_rules() {
        println!(
            "{:<24} [{}] {}",
            rule.id, rule.emit.severity, rule.emit.title
        );
    }
    Ok(ExitCode::Clean)
}

fn cmd_classify(args: ClassifyArgs) -> sd_common::Result<ExitCode> {
    let command = args.command.join(" ");
    if command.trim().is_empty() {
        eprintln!("error: empty command");
        return Ok(ExitCode::ArgsError);
    }

    let normalized = normalize_command(&command);
    println!("normalized: {}", normalized.normalized);
    println!("risk: {}", classify_risk(&command));
    Ok(ExitCode::Clean)
}
