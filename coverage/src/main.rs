use backend::prelude::*;
use clap::{Parser, Subcommand};
use coverage::report::{self, ReportFormat};
use coverage::{AppConfig, CoverageChecker};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coverage")]
#[command(about = "Checks whether a requirement is covered by passing tests in active test plans")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// TOML config file with [backend] and [coverage] sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Personal access token for the project collection
    #[arg(long, global = true, env = "AZURE_DEVOPS_PAT", hide_env_values = true)]
    token: Option<String>,
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Roll up test outcomes for a requirement into a coverage verdict
    Check {
        /// Project collection url (e.g. 'http://tfsserver.local:8080/tfs/DefaultCollection')
        #[arg(long, visible_alias = "tpc")]
        collection: String,
        /// Project name within the collection
        #[arg(short, long)]
        project: String,
        /// Work item id of the requirement
        #[arg(long, visible_alias = "wi", allow_negative_numbers = true)]
        work_item: i64,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
        /// Evaluate against an exported JSON snapshot instead of the live collection
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Check that a project collection is reachable
    Probe {
        /// Project collection url
        #[arg(long, visible_alias = "tpc")]
        collection: String,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AppConfig::resolve(cli.config.as_deref(), cli.token)?;

    match cli.command {
        Commands::Check {
            collection,
            project,
            work_item,
            format,
            snapshot,
        } => {
            let connector: Box<dyn BackendConnector> = match snapshot {
                Some(path) => {
                    info!("Reading snapshot {}", path.display());
                    let snapshot = BackendSnapshot::from_json_file(&path)?;
                    Box::new(InMemoryConnector::new(InMemoryBackend::from_snapshot(
                        snapshot,
                    )))
                }
                None => Box::new(AzureDevOpsConnector::new(config.backend.clone())),
            };

            check(connector, config, &collection, &project, work_item, format).await
        }
        Commands::Probe { collection } => probe(config, &collection).await,
    }
}

async fn check(
    connector: Box<dyn BackendConnector>,
    config: AppConfig,
    collection: &str,
    project: &str,
    work_item: i64,
    format: ReportFormat,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let checker = CoverageChecker::new(connector, config.coverage)?;

    match checker.check_coverage(collection, project, work_item).await {
        Ok(coverage_report) => {
            println!("{}", report::render(&coverage_report, format)?);
            let code = report::exit_code(coverage_report.requirement_verdict);
            Ok(ExitCode::from(code))
        }
        Err(e) => {
            error!("Coverage check failed: {}", e);
            eprintln!("Something went wrong: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn probe(
    config: AppConfig,
    collection: &str,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    println!("Probing {}...", collection);

    let connector = AzureDevOpsConnector::new(config.backend);
    match connector.connect(collection).await {
        Ok(backend) => {
            println!("✓ Project collection is reachable ({}).", backend.backend_name());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("✗ Probe failed: {}", e);
            error!("Probe failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
