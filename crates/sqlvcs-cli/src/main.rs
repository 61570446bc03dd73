//! sqlvcs - Database-as-Code synchronization for SQL Server
//!
//! ## Commands
//!
//! - `init-repo`: seed an empty repository from one database
//! - `db-to-repo`: fold live database drift into the overlay subtree
//! - `repo-to-db`: apply a commit across a fleet of databases

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use sqlvcs_core::{
    init_tracing, IgnoreRules, RepoChange, SyncConfig, SyncEngine, SyncStatus, SyncSummary,
    IGNORE_FILE_NAME,
};
use sqlvcs_git::GitRepositoryStore;
use sqlvcs_mssql::{MssqlConfig, MssqlService};

#[derive(Parser)]
#[command(name = "sqlvcs")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Database-as-Code synchronization for SQL Server", long_about = None)]
struct Cli {
    /// Path to the local git repository
    #[arg(long, env = "SQLVCS_REPO", default_value = ".")]
    repo: PathBuf,

    /// Branch receiving sync commits
    #[arg(long, env = "SQLVCS_BRANCH", default_value = "main")]
    branch: String,

    /// First path segment of the per-database overlay subtree
    #[arg(long, env = "SQLVCS_DIFF_PREFIX", default_value = "diff")]
    diff_prefix: String,

    /// Schema whose prefix the normalizer folds away
    #[arg(long, env = "SQLVCS_DEFAULT_SCHEMA", default_value = "dbo")]
    default_schema: String,

    /// SQL Server host name
    #[arg(long, env = "SQLVCS_SERVER", default_value = "localhost")]
    server: String,

    /// SQL Server TCP port
    #[arg(long, env = "SQLVCS_PORT", default_value_t = 1433)]
    port: u16,

    /// SQL login
    #[arg(long, env = "SQLVCS_USER", default_value = "sa")]
    user: String,

    /// SQL login password
    #[arg(long, env = "SQLVCS_PASSWORD", hide_env_values = true, default_value = "")]
    password: String,

    /// Accept the server certificate without validation
    #[arg(long, env = "SQLVCS_TRUST_CERT")]
    trust_cert: bool,

    /// Maximum concurrently synced target databases
    #[arg(long, env = "SQLVCS_MAX_PARALLEL", default_value_t = 8)]
    max_parallel: usize,

    /// Per-target time limit in seconds (0 = unlimited)
    #[arg(long, env = "SQLVCS_TARGET_TIMEOUT", default_value_t = 0)]
    target_timeout: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted output and log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize an empty repository with the full base tree of one database
    InitRepo {
        /// Source database name
        db: String,
    },

    /// Fold live database drift into the per-database overlay
    DbToRepo {
        /// Source database name
        db: String,

        /// Compute and print the overlay delta without committing
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply a commit across target databases and move their tags
    RepoToDb {
        /// Commit, tag, or branch to apply
        #[arg(default_value = "HEAD")]
        commitish: String,

        /// Target database (repeatable)
        #[arg(long = "db", required = true)]
        dbs: Vec<String>,

        /// Translate and print the changes without executing DDL
        #[arg(long)]
        dry_run: bool,

        /// Apply even when the target has drifted from its overlay
        #[arg(long)]
        force: bool,
    },
}

fn build_engine(cli: &Cli) -> Result<SyncEngine> {
    let sync_config = SyncConfig {
        default_schema: cli.default_schema.clone(),
        diff_prefix: cli.diff_prefix.clone(),
        default_branch: cli.branch.clone(),
        max_parallel_targets: cli.max_parallel,
        target_timeout_secs: cli.target_timeout,
    };

    let store = GitRepositoryStore::open_or_init(&cli.repo, &cli.branch)
        .with_context(|| format!("opening repository at {}", cli.repo.display()))?;

    let db = MssqlService::new(
        MssqlConfig {
            host: cli.server.clone(),
            port: cli.port,
            user: cli.user.clone(),
            password: cli.password.clone(),
            trust_cert: cli.trust_cert,
        },
        sync_config.clone(),
    );

    let ignore = IgnoreRules::load(&cli.repo.join(IGNORE_FILE_NAME));

    Ok(SyncEngine::new(
        Arc::new(store),
        Arc::new(db),
        sync_config,
        ignore,
    ))
}

fn print_changes(changes: &[RepoChange], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(changes)?);
        return Ok(());
    }
    if changes.is_empty() {
        println!("no changes");
        return Ok(());
    }
    for change in changes {
        let kind = match &change.content {
            None => "delete",
            Some(content) if content.is_empty() => "tombstone",
            Some(_) => "write",
        };
        println!("{kind:<9} {}", change.path);
    }
    println!("{} change(s)", changes.len());
    Ok(())
}

fn print_summary(summary: &SyncSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&summary.reports)?);
    } else {
        for report in &summary.reports {
            println!("{:<24} {:<22} {}", report.db_name, report.status, report.message);
        }
        println!(
            "synced: {}, dry-run: {}, skipped: {}, failed: {}",
            summary.count(SyncStatus::Synced),
            summary.count(SyncStatus::SuccessDryRun),
            summary.count(SyncStatus::SkippedNotOnboarded)
                + summary.count(SyncStatus::SkippedOutOfSync),
            summary.count(SyncStatus::Failed),
        );
    }
    if !summary.all_ok() {
        bail!("{} target(s) failed", summary.count(SyncStatus::Failed));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    let engine = build_engine(&cli)?;

    match &cli.command {
        Commands::InitRepo { db } => {
            let description = engine.init_repo(db).await?;
            println!("{description}");
        }
        Commands::DbToRepo { db, dry_run } => {
            let changes = engine.sync_db_to_repo(db, *dry_run).await?;
            print_changes(&changes, cli.json)?;
        }
        Commands::RepoToDb {
            commitish,
            dbs,
            dry_run,
            force,
        } => {
            let summary = engine
                .sync_repo_to_db(commitish, dbs, *dry_run, *force)
                .await?;
            print_summary(&summary, cli.json)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn repo_to_db_accepts_repeated_targets() {
        let cli = Cli::parse_from([
            "sqlvcs",
            "repo-to-db",
            "v1.4",
            "--db",
            "sales",
            "--db",
            "inventory",
            "--dry-run",
        ]);
        match cli.command {
            Commands::RepoToDb {
                commitish,
                dbs,
                dry_run,
                force,
            } => {
                assert_eq!(commitish, "v1.4");
                assert_eq!(dbs, vec!["sales".to_string(), "inventory".to_string()]);
                assert!(dry_run);
                assert!(!force);
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
