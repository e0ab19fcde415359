//! `logforged`: multi-protocol log-message ingestion and delivery daemon
//! (spec.md §1). This binary only parses the CLI, loads and validates
//! configuration, and drives startup/shutdown; the pipeline itself lives
//! in `logforge_core`/`logforge_forward`/`logforge_docker`.

use clap::Parser;
use logforge_lifecycle::cli::{Args, ExitCode};
use logforge_lifecycle::{capabilities, config, daemonize, signals, Daemon, PidFile};
use logforge_logging::{init_logging, LogConfig};
use logforge_protocol::config::SystemConfig;
use std::collections::HashSet;

fn main() {
    let code = run();
    std::process::exit(code as i32);
}

fn run() -> ExitCode {
    let args = Args::parse();

    if args.version {
        println!("logforged {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::Ok;
    }

    let system_config = match config::load(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("logforged: {e:#}");
            return ExitCode::Failure;
        }
    };

    if let Some(level) = args.check_config {
        return check_config(&system_config, level);
    }

    if let Some(dest) = &args.dump_config {
        return dump_config(&system_config, dest);
    }

    let foreground = args.no_fork || system_config.foreground;

    let ready = if foreground {
        None
    } else {
        match daemonize::daemonize(args.no_chdir) {
            Ok(pipe) => Some(pipe),
            Err(e) => {
                eprintln!("logforged: failed to daemonize: {e}");
                return ExitCode::Failure;
            }
        }
    };

    // Only reached in the child process (foreground run, or the
    // backgrounded child past `daemonize`); the parent of a backgrounded
    // run already exited inside `daemonize` once it saw a ready/error
    // byte.
    if !foreground {
        let mut keep: Vec<std::os::fd::RawFd> = vec![0, 1, 2];
        if let Some(pipe) = &ready {
            keep.push(pipe.raw_fd());
        }
        keep.extend(daemonize::systemd_listen_fds());
        daemonize::close_inherited_fds(&keep);
    }

    start(system_config, &args, foreground, ready)
}

fn start(
    system_config: SystemConfig,
    args: &Args,
    foreground: bool,
    ready: Option<daemonize::ReadyPipe>,
) -> ExitCode {
    let logging = match init_logging(LogConfig {
        app_name: "logforged",
        verbose: system_config.debug || args.debug,
        foreground,
        stderr_error_cap: system_config.max_stderr_error_lines,
    }) {
        Ok(handle) => handle,
        Err(e) => return fail_startup(ready, format!("initializing logging: {e:#}")),
    };

    let pidfile = match &system_config.pid_file {
        Some(path) => match PidFile::create(path) {
            Ok(pidfile) => Some(pidfile),
            Err(e) => return fail_startup(ready, e.to_string()),
        },
        None => None,
    };

    if system_config.drop_capabilities {
        if let Err(e) = capabilities::drop_to_whitelist() {
            return fail_startup(ready, e.to_string());
        }
    }

    let (signal_rx, _signal_listener) = match signals::spawn_signal_listener() {
        Ok(pair) => pair,
        Err(e) => return fail_startup(ready, format!("installing signal handlers: {e}")),
    };

    let daemon = match Daemon::bootstrap(system_config, logging) {
        Ok(daemon) => daemon,
        Err(e) => return fail_startup(ready, e.to_string()),
    };

    if let Some(ready) = ready {
        ready.report_ready();
    }
    tracing::info!("logforged started");

    daemon.run(signal_rx);

    tracing::info!("logforged shutting down");
    daemon.shutdown();
    drop(pidfile);

    ExitCode::Ok
}

fn fail_startup(ready: Option<daemonize::ReadyPipe>, message: String) -> ExitCode {
    match ready {
        Some(ready) => ready.report_failure(&message),
        None => eprintln!("logforged: {message}"),
    }
    ExitCode::Failure
}

fn check_config(config: &SystemConfig, level: u8) -> ExitCode {
    let rulesets: HashSet<&str> = config.actions.iter().map(|a| a.ruleset.as_str()).collect();
    println!(
        "configuration OK: {} action(s) across {} ruleset(s)",
        config.actions.len(),
        rulesets.len()
    );
    if level > 0 {
        for action in &config.actions {
            println!("  ruleset {:?} -> action {:?} ({:?})", action.ruleset, action.name, action.kind);
        }
    }
    ExitCode::Ok
}

fn dump_config(config: &SystemConfig, dest: &str) -> ExitCode {
    let text = match toml::to_string_pretty(config) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("logforged: failed to serialize configuration: {e}");
            return ExitCode::Failure;
        }
    };
    if dest == "-" {
        print!("{text}");
        return ExitCode::Ok;
    }
    match std::fs::write(dest, text) {
        Ok(()) => ExitCode::Ok,
        Err(e) => {
            eprintln!("logforged: failed to write {dest}: {e}");
            ExitCode::Failure
        }
    }
}
