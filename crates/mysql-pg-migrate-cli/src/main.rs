//! mysql-pg-migrate CLI - table-by-table MySQL to PostgreSQL migration.

use clap::{Parser, Subcommand};
use mysql_pg_migrate::scaffold::{parse_table_arg, render_yaml, scaffold};
use mysql_pg_migrate::{
    Config, MigrateError, MysqlReader, Orchestrator, PgPool, SourceReader, TargetWriter,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mysql-pg-migrate")]
#[command(about = "Table-by-table MySQL to PostgreSQL data migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Load MYSQL_* / PG_* overrides from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration
    Run {
        /// Only migrate these source tables (repeatable, declared order is kept)
        #[arg(long = "table")]
        tables: Vec<String>,

        /// Override target schema
        #[arg(long)]
        target_schema: Option<String>,
    },

    /// Validate the configuration and print the insert plan without connecting
    Plan,

    /// Draft table specs by comparing source and destination columns
    Scaffold {
        /// Table pair as SOURCE[:DESTINATION] (repeatable)
        #[arg(long = "table", required = true)]
        tables: Vec<String>,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(MigrateError::Config)?;

    load_env_file(cli.env_file.as_deref())?;
    let mut config = Config::load_with_env(&cli.config, |key| std::env::var(key).ok())?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            tables,
            target_schema,
        } => {
            if let Some(schema) = target_schema {
                config.target.schema = schema;
            }

            let orchestrator = Orchestrator::new(config)?.with_tables(&tables)?;
            let cancel_token = setup_signal_handler();
            let result = orchestrator.run(cancel_token).await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nMigration {}", result.status.as_str());
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                for table in &result.tables {
                    println!(
                        "  {:<30} {:<10} success: {:>8}  errors: {:>8}",
                        table.table,
                        format!("{:?}", table.phase).to_lowercase(),
                        table.success_count,
                        table.error_count
                    );
                    if let Some(err) = &table.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "  Tables: {}/{} done, {} failed",
                    result.tables_done, result.tables_total, result.tables_failed
                );
                println!(
                    "  Rows: {} migrated, {} failed",
                    result.rows_succeeded, result.rows_failed
                );
            }

            if let Some(err) = result.failure() {
                return Err(err);
            }
        }

        Commands::Plan => {
            let orchestrator = Orchestrator::new(config)?;
            let plan = orchestrator.plan()?;
            if plan.is_empty() {
                return Err(MigrateError::Config(
                    "migration.tables must list at least one table".into(),
                ));
            }

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                for (i, table) in plan.iter().enumerate() {
                    println!("{}. {} -> {}", i + 1, table.source_table, table.target);
                    println!("   {}", table.insert_sql);
                    for fk in &table.resolves {
                        println!("   resolves {}", fk);
                    }
                    if let Some(remap) = &table.records {
                        println!("   records {}", remap);
                    }
                }
            }
        }

        Commands::Scaffold { tables } => {
            let pairs = tables
                .iter()
                .map(|t| parse_table_arg(t))
                .collect::<Result<Vec<_>, _>>()?;

            let source = MysqlReader::new(&config.source).await?;
            let target = match PgPool::new(&config.target).await {
                Ok(target) => target,
                Err(e) => {
                    source.close().await;
                    return Err(e);
                }
            };

            let specs = scaffold(&source, &target, &config.target.schema, &pairs).await;
            source.close().await;
            target.close().await;

            print!("{}", render_yaml(&specs?)?);
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config)?;
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (MySQL): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    "health check",
                    "one or more databases are unreachable",
                ));
            }
        }
    }

    Ok(())
}

/// Load environment overrides. A missing `./.env` is fine; a missing
/// explicit `--env-file` is not.
fn load_env_file(path: Option<&Path>) -> Result<(), MigrateError> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| {
                MigrateError::Config(format!("cannot load env file {:?}: {}", path, e))
            })?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    let result = if format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    result.map_err(|e| e.to_string())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current row...", name);
                    token.cancel();
                });
            }
            Err(e) => warn!("Cannot install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\nReceived Ctrl-C. Stopping after the current row...");
                token.cancel();
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
    });

    cancel_token
}
