use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tandem::{EventKind, PgCatalog, ProgressEvent};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod settings;

use settings::{ConfigError, Overrides, Resolved, Target};

/// Compare the structure of a Postgres schema across two databases.
#[derive(Parser, Debug)]
#[command(name = "tandem", version)]
struct Cli {
    /// Configuration file (default: `.config/tandem.toml` in this or a parent directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Schema to compare (overrides the configured one)
    #[arg(long, global = true)]
    schema: Option<String>,

    /// Connection URL for the left database
    #[arg(long, global = true)]
    left_url: Option<String>,

    /// Connection URL for the right database
    #[arg(long, global = true)]
    right_url: Option<String>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare the two databases and print the differences
    Compare {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Exit with status 2 when differences are found
        #[arg(long)]
        exit_code: bool,
    },
    /// Connect to both databases and report whether each succeeded
    Check,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compare(#[from] tandem::CompareError),

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

/// Exit status when `--exit-code` is given and the schemas differ.
const DIFFERENCES_FOUND: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if verbose {
        if let Ok(directive) = "tandem=debug".parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let (settings, path) = settings::load(cli.config.as_deref())?;
    match &path {
        Some(path) => tracing::debug!(path = %path.display(), "loaded configuration"),
        None => tracing::debug!("no configuration file found"),
    }

    let resolved = settings.resolve(Overrides {
        schema: cli.schema,
        left_url: cli.left_url,
        right_url: cli.right_url,
    })?;

    match cli.command {
        Commands::Compare { json, exit_code } => compare(&resolved, json, exit_code).await,
        Commands::Check => Ok(check(&resolved).await),
    }
}

async fn compare(resolved: &Resolved, json: bool, exit_code: bool) -> Result<ExitCode, CliError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_progress(rx));

    let result = tandem::compare_databases(
        &resolved.left.params,
        &resolved.right.params,
        &resolved.schema,
        &resolved.left.label,
        &resolved.right.label,
        &tx,
    )
    .await;

    // Let the printer finish what was already sent before the report goes out.
    drop(tx);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "progress printer failed");
    }

    let report = result?;

    let mut stdout = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, &report)?;
        writeln!(stdout)?;
    } else {
        write!(
            stdout,
            "{}",
            report.render(&resolved.left.label, &resolved.right.label)
        )?;
    }

    if exit_code && !report.is_empty() {
        Ok(ExitCode::from(DIFFERENCES_FOUND))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        if !should_print(&event) {
            continue;
        }
        let label = event.label().bold().to_string();
        match event.kind() {
            EventKind::Status => eprintln!("{} {}", label, event.message().dimmed()),
            EventKind::Progress => eprintln!("{} {}", label, event.message()),
            EventKind::Error => eprintln!("{} {}", label, event.message().red()),
        }
    }
}

/// Progress is printed at roughly every tenth of the way and at completion;
/// status and error events always are.
fn should_print(event: &ProgressEvent) -> bool {
    match event {
        ProgressEvent::Progress { current, total, .. } => {
            let step = (total / 10).max(1);
            current == total || current % step == 0
        }
        _ => true,
    }
}

/// Open both connections, run a trivial query on each, and report per side.
async fn check(resolved: &Resolved) -> ExitCode {
    let (left, right) = tokio::join!(ping(&resolved.left), ping(&resolved.right));

    let mut ok = true;
    for (target, result) in [(&resolved.left, left), (&resolved.right, right)] {
        match result {
            Ok(()) => println!("{} {} ({})", "ok".green(), target.label.bold(), target.params),
            Err(e) => {
                ok = false;
                println!(
                    "{} {} ({}): {}",
                    "failed".red(),
                    target.label.bold(),
                    target.params,
                    e
                );
            }
        }
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn ping(target: &Target) -> Result<(), tokio_postgres::Error> {
    let catalog = PgCatalog::connect(&target.params).await?;
    catalog.client().simple_query("SELECT 1").await?;
    Ok(())
}
