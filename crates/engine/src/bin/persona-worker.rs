//! persona-worker: hosts the personalization engine over a user directory.
//!
//! Subcommands:
//! - `run`: enable, follow filesystem and registry changes until Ctrl-C, then tear down
//! - `reconcile`: one pass, print what changed, leave artifacts in place
//! - `report <key_phrase>`: list report over the loaded rule sets

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use persona_core::config::{load_dotenv, Config};
use persona_core::PathMapper;
use persona_engine::registry::{FsRegistry, LoadStatus};
use persona_engine::report::ListReport;
use persona_engine::watch::{ManualBackend, NotifyBackend};
use persona_engine::{Controller, ReconcileReport};

// ── CLI ─────────────────────────────────────────────────────────────

/// Personalization worker: overlays CSV directives onto voice-command rule sets.
#[derive(Parser, Debug)]
#[command(name = "persona-worker", version, about)]
struct Cli {
    /// Root of the user's rule sets.
    #[arg(long, env = "PERSONA_USER_ROOT", global = true)]
    user_root: Option<PathBuf>,

    /// Directory holding the control and data files.
    #[arg(long, env = "PERSONA_CONFIG_DIR", global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep artifacts in sync with directives until interrupted.
    Run,
    /// Run a single reconciliation pass and exit.
    Reconcile,
    /// Report lists whose name contains a key phrase.
    Report {
        key_phrase: String,
        /// Write the report to a file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

/// Work items for the event loop.
#[derive(Debug)]
enum HostEvent {
    /// A rule or list file under the user root changed.
    Registry(PathBuf),
    /// A path the controller subscribed to changed.
    Watch(PathBuf),
}

// ── helpers ─────────────────────────────────────────────────────────

fn resolve_config(cli: &Cli) -> Config {
    let mut config = Config::from_env();
    if let Some(root) = &cli.user_root {
        config = config.with_user_root(root);
    }
    if let Some(dir) = &cli.config_dir {
        config = config.with_config_dir(dir);
    }
    config
}

fn load_registry(config: &Config) -> anyhow::Result<FsRegistry> {
    let registry = FsRegistry::new(PathMapper::from_config(config)).excluding(config.paths.output_root());
    let results = registry
        .load_all()
        .with_context(|| format!("scanning {}", config.paths.user_root.display()))?;

    let loaded = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Loaded { .. }))
        .count();
    for result in &results {
        if let LoadStatus::Failed { error } = &result.status {
            warn!(path = %result.path.display(), error = %error, "rule file not loaded");
        }
    }
    info!(loaded, scanned = results.len(), "base registry loaded");
    Ok(registry)
}

fn log_report(report: &ReconcileReport) {
    if report.is_empty() {
        return;
    }
    info!(
        written = report.written.len(),
        removed = report.removed.len(),
        unchanged = report.unchanged.len(),
        failures = report.failures.len(),
        "reconciled"
    );
    for e in &report.errors {
        error!(error = %e, "reconciliation error");
    }
}

fn write_output(output: Option<&Path>, text: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => print!("{}", text),
    }
    Ok(())
}

// ── subcommands ─────────────────────────────────────────────────────

async fn run(config: Config) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<HostEvent>();

    let mut registry = load_registry(&config)?;
    let registry_tx = tx.clone();
    registry
        .watch(move |path| {
            let _ = registry_tx.send(HostEvent::Registry(path));
        })
        .context("watching user root")?;
    let registry = Arc::new(registry);

    let watch_tx = tx;
    let backend = NotifyBackend::new(move |path| {
        let _ = watch_tx.send(HostEvent::Watch(path));
    })
    .context("starting watch backend")?;

    let controller = Controller::new(&config, registry.clone(), Box::new(backend))?;
    let report = controller.enable();
    log_report(&report);
    for failure in &report.failures {
        warn!(
            control = %failure.control_file.display(),
            line = failure.line,
            error = %failure.error,
            "directive skipped"
        );
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("persona-worker running");
    loop {
        tokio::select! {
            Some(event) = rx.recv() => match event {
                HostEvent::Registry(path) => {
                    for change in registry.refresh_path(&path) {
                        log_report(&controller.handle_registry_event(&change));
                    }
                }
                HostEvent::Watch(path) => log_report(&controller.handle_fs_event(&path)),
            },
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for Ctrl-C");
                }
                info!("shutdown requested");
                break;
            }
        }
    }

    log_report(&controller.disable());
    info!("persona-worker exited cleanly");
    Ok(())
}

fn reconcile(config: Config) -> anyhow::Result<()> {
    let registry = Arc::new(load_registry(&config)?);
    let controller = Controller::new(&config, registry, Box::new(ManualBackend::new()))?;
    let report = controller.enable();
    print!("{}", report);
    if !report.is_clean() {
        warn!(
            failures = report.failures.len(),
            errors = report.errors.len(),
            "reconciliation finished with problems"
        );
    }
    Ok(())
}

fn report(config: Config, key_phrase: &str, output: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let registry = load_registry(&config)?;
    let report = ListReport::discover(&registry, key_phrase);
    if report.is_empty() {
        warn!(key_phrase = %key_phrase, "no lists found");
    }

    let text = if json {
        serde_json::to_string_pretty(&report).context("serializing report")? + "\n"
    } else {
        report.render(&PathMapper::from_config(&config))
    };
    write_output(output, &text)
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli);
    config.log_summary();

    match cli.command {
        Command::Run => run(config).await,
        Command::Reconcile => reconcile(config),
        Command::Report {
            ref key_phrase,
            ref output,
            json,
        } => report(config, key_phrase, output.as_deref(), json),
    }
}
