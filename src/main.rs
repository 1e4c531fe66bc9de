use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use serde::Serialize;
use supplyscan::{
    config::Config,
    scanner::{ScanOptions, Scanner},
    server,
    source::default_sources,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "supplyscan")]
#[command(
    author,
    version,
    about = "Scan JavaScript lockfiles for supply chain compromises and known vulnerabilities"
)]
struct Cli {
    /// Run as an MCP server on stdio
    #[arg(long)]
    mcp: bool,

    /// Emit compact JSON instead of pretty-printed
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show scanner version and IOC database info
    Status,

    /// Scan a project directory for compromises and vulnerabilities
    Scan {
        /// Project directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Scan subdirectories for lockfiles
        #[arg(short, long)]
        recursive: bool,

        /// Exclude dev dependencies from the scan
        #[arg(long)]
        no_dev: bool,
    },

    /// Check a single package@version
    Check {
        /// Package name (e.g. lodash, @ctrl/tinycolor)
        package: String,

        /// Exact version to check
        version: String,
    },

    /// Update the IOC database from upstream sources
    Refresh {
        /// Refresh even if the cache is fresh
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.mcp);

    let config = Config::load()?;
    let scanner = build_scanner(&config)?;

    if cli.mcp {
        server::serve(Arc::new(scanner)).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        // No subcommand and no --mcp: print usage, fail.
        Cli::command().print_help()?;
        return Ok(ExitCode::FAILURE);
    };

    match command {
        Commands::Status => {
            let status = supplyscan::model::StatusResponse::new(
                env!("CARGO_PKG_VERSION"),
                scanner.status().await,
            );
            print_json(&status, cli.json)?;
        }
        Commands::Scan {
            path,
            recursive,
            no_dev,
        } => {
            let opts = ScanOptions {
                recursive,
                include_dev: !no_dev,
            };
            let result = scanner.scan(&path, &opts).await?;
            print_json(&result, cli.json)?;
        }
        Commands::Check { package, version } => {
            let result = scanner.check_package(&package, &version).await;
            print_json(&result, cli.json)?;
        }
        Commands::Refresh { force } => {
            let result = scanner.refresh(force).await?;
            print_json(&result, cli.json)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn build_scanner(config: &Config) -> Result<Scanner> {
    let sources = default_sources(config);
    let scanner = match cache_dir_override(config) {
        Some(dir) => {
            let detector = supplyscan::Detector::with_cache_dir(sources, dir)?;
            Scanner::with_parts(detector, supplyscan::audit::AuditClient::new())
        }
        None => Scanner::new(sources)?,
    };
    Ok(scanner)
}

/// Only the config-file override matters here; the environment variable and
/// container path are resolved inside the cache itself.
fn cache_dir_override(config: &Config) -> Option<PathBuf> {
    if std::env::var(supplyscan::cache::CACHE_DIR_ENV).is_ok() {
        return None;
    }
    config.cache_dir.clone()
}

/// Logs go to stderr: stdout carries result documents (and, in server mode,
/// the JSON-RPC stream).
fn init_logging(server_mode: bool) {
    let default_level = if server_mode { "warn" } else { "error" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let output = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn scan_defaults_to_current_directory() {
        let cli = Cli::parse_from(["supplyscan", "scan"]);
        match cli.command {
            Some(Commands::Scan {
                path,
                recursive,
                no_dev,
            }) => {
                assert_eq!(path, PathBuf::from("."));
                assert!(!recursive);
                assert!(!no_dev);
            }
            _ => panic!("expected scan command"),
        }
    }

    #[test]
    fn scan_flags_parse() {
        let cli = Cli::parse_from(["supplyscan", "scan", "/app", "-r", "--no-dev"]);
        match cli.command {
            Some(Commands::Scan {
                path,
                recursive,
                no_dev,
            }) => {
                assert_eq!(path, PathBuf::from("/app"));
                assert!(recursive);
                assert!(no_dev);
            }
            _ => panic!("expected scan command"),
        }
    }

    #[test]
    fn check_requires_package_and_version() {
        assert!(Cli::try_parse_from(["supplyscan", "check", "lodash"]).is_err());
        let cli = Cli::parse_from(["supplyscan", "check", "lodash", "4.17.21"]);
        assert!(matches!(cli.command, Some(Commands::Check { .. })));
    }

    #[test]
    fn refresh_force_flag() {
        let cli = Cli::parse_from(["supplyscan", "refresh", "--force"]);
        match cli.command {
            Some(Commands::Refresh { force }) => assert!(force),
            _ => panic!("expected refresh command"),
        }
    }

    #[test]
    fn mcp_flag_toggles_server_mode() {
        let cli = Cli::parse_from(["supplyscan", "--mcp"]);
        assert!(cli.mcp);
        assert!(cli.command.is_none());
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["supplyscan", "explode"]).is_err());
    }
}
