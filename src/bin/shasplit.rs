// Shasplit backup engine.

//! Command-line entry point: a thin wrapper mapping argument vectors onto
//! [shasplit::Repository] operations. No invariant lives here; this binary
//! owns only argument parsing, logging setup, and process exit codes, the
//! way conserve's own `src/bin/conserve` binary is a thin shell over the
//! `conserve` library crate.

use std::io::{self, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use shasplit::clock::SystemClock;
use shasplit::lvm::LvmSnapshotter;
use shasplit::{Config, Repository};

#[derive(Debug, Parser)]
#[command(name = "shasplit", about = "A content-addressed backup engine.", version)]
struct Cli {
    /// Repository directory. Defaults to ~/.shasplit.
    #[arg(long, global = true)]
    directory: Option<std::path::PathBuf>,

    /// Hash algorithm, fixed for the lifetime of a repository.
    #[arg(long, global = true, default_value = "sha1")]
    algorithm: String,

    /// Bytes read per part.
    #[arg(long, global = true, default_value_t = shasplit::config::DEFAULT_PARTSIZE)]
    partsize: u64,

    /// Maximum parts per instance.
    #[arg(long, global = true, default_value_t = shasplit::config::DEFAULT_MAXPARTS)]
    maxparts: u64,

    /// Size requested for an LVM snapshot device, in bytes.
    #[arg(long, global = true, default_value_t = shasplit::config::DEFAULT_SNAPSHOTSIZE)]
    snapshotsize: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest a new backup. Reads bytes from stdin unless a volume group is
    /// also given, in which case an LVM snapshot of the volume is taken and
    /// ingested instead.
    ///
    /// `add <name> <maxbackups>` reads stdin.
    /// `add <volumegroup> <name> <maxbackups>` snapshots and ingests a volume.
    Add {
        /// Either `<name> <maxbackups>` or `<volumegroup> <name> <maxbackups>`.
        #[arg(required = true, num_args = 2..=3)]
        args: Vec<String>,
    },
    /// Show every name and instance in the repository.
    Status,
    /// Recover a backup to stdout.
    Recover {
        name: String,
        /// Specific instance; defaults to the newest completed one.
        timestamp: Option<String>,
    },
    /// Full structural validation pass over the repository.
    Check,
}

fn init_logging() {
    let debug = std::env::var("SHASPLIT_DEBUG").map(|v| !v.is_empty() && v != "0").unwrap_or(false);
    let level = if debug { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => return exit_code_for_clap_error(e),
    };
    let directory = cli.directory.unwrap_or_else(Config::default_directory);
    let algorithm = match cli.algorithm.parse() {
        Ok(a) => a,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(1);
        }
    };
    let config = match Config::new(
        algorithm,
        cli.partsize,
        cli.maxparts,
        directory,
        shasplit::config::DEFAULT_SNAPSHOT_SUFFIX.to_string(),
        cli.snapshotsize,
    ) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(1);
        }
    };
    let repo = Repository::new(config);

    let result = match cli.command {
        Command::Add { args } => run_add(&repo, args),
        Command::Status => run_status(&repo),
        Command::Recover { name, timestamp } => run_recover(&repo, &name, timestamp.as_deref()),
        Command::Check => run_check(&repo),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(2)
        }
    }
}

/// Print `err` the way clap's own `Error::exit` would, but return exit code
/// `1` for a genuine usage error instead of clap's default `2`, so usage
/// errors and operational failures (§6: `1` vs non-zero) are
/// distinguishable. `--help`/`--version` are not usage errors: clap reports
/// them through the same `Err` path, and they still exit `0`.
fn exit_code_for_clap_error(err: clap::Error) -> ExitCode {
    use clap::error::ErrorKind;
    let _ = err.print();
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
        _ => ExitCode::from(1),
    }
}

fn run_add(repo: &Repository, args: Vec<String>) -> shasplit::Result<()> {
    let clock = SystemClock;
    match args.as_slice() {
        [name, maxbackups] => {
            let maxbackups = parse_maxbackups(maxbackups)?;
            let stdin = io::stdin();
            let report = repo.add(&clock, name, maxbackups, stdin.lock())?;
            tracing::info!(name = %report.name, timestamp = %report.timestamp, size = report.size, parts = report.parts, "ingested");
            Ok(())
        }
        [volumegroup, name, maxbackups] => {
            let maxbackups = parse_maxbackups(maxbackups)?;
            let snapshotter = LvmSnapshotter;
            let report = repo.add_from_snapshot(&clock, &snapshotter, volumegroup, name, maxbackups)?;
            tracing::info!(name = %report.name, timestamp = %report.timestamp, size = report.size, parts = report.parts, "ingested from snapshot");
            Ok(())
        }
        _ => unreachable!("clap enforces 2 or 3 args"),
    }
}

fn parse_maxbackups(s: &str) -> shasplit::Result<u64> {
    s.parse().map_err(|_| shasplit::Error::Validation {
        field: "maxbackups",
        message: format!("not a positive integer: {s:?}"),
    })
}

fn run_status(repo: &Repository) -> shasplit::Result<()> {
    let mut current_name: Option<String> = None;
    for line in repo.status()? {
        if current_name.as_deref() != Some(line.name.as_str()) {
            println!("{}", line.name);
            current_name = Some(line.name.clone());
        }
        println!("{line}");
    }
    Ok(())
}

fn run_recover(repo: &Repository, name: &str, timestamp: Option<&str>) -> shasplit::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match timestamp {
        Some(ts) => repo.recover(name, ts, &mut out)?,
        None => repo.recover_latest(name, &mut out)?,
    }
    out.flush()
        .map_err(|e| shasplit::Error::Io { path: "<stdout>".into(), source: e })
}

fn run_check(repo: &Repository) -> shasplit::Result<()> {
    let problems = repo.check()?;
    for problem in &problems {
        println!("{problem}");
    }
    if problems.is_empty() {
        println!("no problems found");
    }
    Ok(())
}
