use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use veriguardx::config::VeriGuardConfig;
use veriguardx::persistence::{SessionSnapshot, SnapshotStore};
use veriguardx::risk::{AgentResult, RiskScorecard};
use veriguardx::routing::Verdict;
use veriguardx::verification::{Stage, VerificationStore};
use veriguardx::{config, init_config, init_telemetry, PipelineRunner, ScanAttempt, ScriptedScans};

#[derive(Parser)]
#[command(name = "veriguard")]
#[command(about = "Supply-chain counterfeit detection pipeline")]
#[command(long_about = "VeriGuardX walks a scanned part through the Scan, Identity, Courier, \
                       Provenance, Anomaly, Risk and Council agents, tracking progress and \
                       confirmed checkpoints along the way.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a part through the verification pipeline
    Run {
        /// Identifier of the scanned part
        #[arg(long, help = "Part identifier, e.g. PART-001")]
        product: String,
        /// Verdict returned by the scan
        #[arg(long, default_value = "AUTHENTIC", help = "Scan verdict: AUTHENTIC, COUNTERFEIT, SUSPICIOUS, NEEDS_REVIEW, ...")]
        verdict: String,
        /// Agent results reported with the scan
        #[arg(long, help = "Path to a JSON array of agent results scored during the scan")]
        results: Option<PathBuf>,
        /// Save the final session snapshot
        #[arg(long, help = "Write the session snapshot to this path")]
        save: Option<PathBuf>,
        /// Skip simulated processing delays
        #[arg(long, help = "Run without simulated latency")]
        fast: bool,
    },
    /// Print the stage transition table
    Stages,
    /// Score agent results read from a JSON file
    Risk {
        /// JSON array of agent results
        #[arg(long, help = "Path to a JSON array of agent results")]
        input: PathBuf,
        /// Score as a visual-only audit (expects [visual, courier])
        #[arg(long, help = "Treat input as a visual-only audit")]
        visual_only: bool,
    },
    /// Show a saved session snapshot
    Show {
        /// Snapshot path (defaults to the configured location)
        #[arg(long, help = "Path to a session snapshot")]
        snapshot: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config()?;
    init_telemetry(&config.observability)?;
    init_config()?;

    match cli.command {
        Commands::Run { product, verdict, results, save, fast } => {
            tokio::runtime::Runtime::new()?.block_on(async {
                run_command(config, &product, &verdict, results.as_deref(), save, fast).await
            })
        }
        Commands::Stages => stages_command(),
        Commands::Risk { input, visual_only } => risk_command(config, &input, visual_only),
        Commands::Show { snapshot } => {
            tokio::runtime::Runtime::new()?.block_on(async {
                show_command(config, snapshot).await
            })
        }
    }
}

async fn run_command(
    config: &VeriGuardConfig,
    product: &str,
    verdict: &str,
    results: Option<&Path>,
    save: Option<PathBuf>,
    fast: bool,
) -> Result<()> {
    let verdict = Verdict::parse_lenient(verdict);
    let results = match results {
        Some(path) => read_agent_results(path)?,
        None => Vec::new(),
    };
    let runner = if fast {
        PipelineRunner::immediate()
    } else {
        PipelineRunner::new(config.pipeline.clone())
    }
    .with_scorecard(RiskScorecard::from_config(&config.risk)?);

    let mut store = VerificationStore::new();
    println!("🔍 Verifying {} (scan verdict: {})", product, verdict);
    let mut scans = ScriptedScans::new(vec![ScanAttempt::new(verdict, results)]);
    let outcome = runner.run_with(&mut store, product, &mut scans).await?;

    if outcome.rescans > 0 {
        println!("🔁 Rescanned {} time(s) for a borderline risk score", outcome.rescans);
    }
    match outcome.route {
        Some(route) => println!("✅ Route: {:?}, {} stages", route, outcome.stages_run.len()),
        None => println!("⏸️  Held for manual review after scan"),
    }
    println!();
    println!("{}", store.summary());
    if let Some(risk) = &outcome.risk {
        println!();
        println!("{}", risk.report());
    }

    if let Some(path) = save {
        let snapshot = SessionSnapshot::capture(&store, outcome.correlation_id);
        SnapshotStore::new(&path).save(&snapshot).await?;
        println!();
        println!("💾 Snapshot saved to {}", path.display());
    }
    Ok(())
}

fn stages_command() -> Result<()> {
    println!("Stage transitions:");
    for stage in Stage::ALL {
        let next: Vec<&str> = stage.successors().iter().map(|s| s.as_str()).collect();
        let next = if next.is_empty() { "(terminal)".to_string() } else { next.join(", ") };
        println!("  {:<11} -> {}", stage.as_str(), next);
    }
    Ok(())
}

fn risk_command(config: &VeriGuardConfig, input: &Path, visual_only: bool) -> Result<()> {
    let results = read_agent_results(input)?;
    let scorecard = RiskScorecard::from_config(&config.risk)?;
    let score = if visual_only {
        match results.as_slice() {
            [visual, courier] => scorecard.calculate_visual_only(visual, courier)?,
            _ => bail!("Visual-only audit expects exactly two results: [visual, courier]"),
        }
    } else {
        scorecard.calculate(&results)?
    };

    println!("{}", score.report());
    Ok(())
}

fn read_agent_results(path: &Path) -> Result<Vec<AgentResult>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse agent results in {}", path.display()))
}

async fn show_command(config: &VeriGuardConfig, snapshot: Option<PathBuf>) -> Result<()> {
    let path = snapshot.unwrap_or_else(|| PathBuf::from(&config.pipeline.snapshot_path));
    let snapshot = SnapshotStore::new(&path)
        .load()
        .await
        .with_context(|| format!("Failed to load snapshot {}", path.display()))?;

    println!("Session {} saved at {}", snapshot.session_id, snapshot.saved_at);
    for record in &snapshot.history {
        println!("  {} -> {} at {}", record.from, record.to, record.timestamp);
    }
    println!();
    let store = snapshot
        .restore()
        .with_context(|| format!("Snapshot {} is not a valid session", path.display()))?;
    println!("{}", store.summary());
    Ok(())
}
