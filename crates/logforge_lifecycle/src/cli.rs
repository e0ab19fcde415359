//! Command-line interface (spec.md §6 "CLI").

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "logforged", about = "Multi-protocol log ingestion and delivery daemon")]
pub struct Args {
    /// Configuration file path.
    #[arg(short = 'f', long = "config", default_value = "/etc/logforged.conf")]
    pub config_file: PathBuf,

    /// PID file path, or the literal string "NONE" to disable pidfile
    /// handling entirely.
    #[arg(short = 'i', long = "pidfile")]
    pub pid_file: Option<String>,

    /// Run in the foreground instead of daemonizing.
    #[arg(short = 'n', long = "no-fork")]
    pub no_fork: bool,

    /// Parse and validate the configuration, then exit. A numeric
    /// level > 0 additionally prints the resolved ruleset/action graph.
    #[arg(short = 'N', long = "check-config", value_name = "LEVEL")]
    pub check_config: Option<u8>,

    /// Enable debug-level logging.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Parser-level debug logging (message construction, filter
    /// evaluation) in addition to `-d`.
    #[arg(short = 'D', long = "parser-debug")]
    pub parser_debug: bool,

    /// Do not chdir to `/` during startup.
    #[arg(short = 'C', long = "no-chdir")]
    pub no_chdir: bool,

    /// Chroot into this directory after startup, before dropping
    /// privileges.
    #[arg(short = 'T', long = "chroot")]
    pub chroot: Option<PathBuf>,

    /// Additional module search path (repeatable).
    #[arg(short = 'M', long = "module-path")]
    pub module_path: Vec<PathBuf>,

    /// Emit the fully-expanded configuration to this path (or "-" for
    /// stdout) and exit without starting the daemon.
    #[arg(short = 'o', long = "dump-config", value_name = "PATH")]
    pub dump_config: Option<String>,

    /// Print the version and exit.
    #[arg(short = 'v', long = "version")]
    pub version: bool,
}

/// Process exit codes (spec.md §6): `0` clean exit or a successful
/// `-N`/`-o` validation run, `1` a fatal startup failure (pidfile
/// conflict, config error, cannot bind), `2` a CLI usage error (clap
/// itself exits with this code on a parse failure; this variant also
/// covers "config is unclean" under `abort-on-unclean`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    Failure = 1,
    UsageError = 2,
}
