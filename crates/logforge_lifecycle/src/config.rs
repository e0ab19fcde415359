//! Loads a `SystemConfig` from a TOML file and layers CLI overrides on
//! top (spec.md §1: "the core never parses BSD rsyslog.conf syntax,
//! only these structs" -- this module is the one place that touches the
//! file on disk).

use crate::cli::Args;
use anyhow::{bail, Context, Result};
use logforge_protocol::config::SystemConfig;
use std::path::PathBuf;

/// Read and parse the config file, then apply every CLI flag that maps
/// onto a `SystemConfig` field. CLI flags always win over the file,
/// matching the legacy precedence (command line overrides configuration
/// directives).
pub fn load(args: &Args) -> Result<SystemConfig> {
    let text = std::fs::read_to_string(&args.config_file)
        .with_context(|| format!("reading config file {}", args.config_file.display()))?;
    let mut config: SystemConfig = toml::from_str(&text)
        .with_context(|| format!("parsing config file {}", args.config_file.display()))?;

    apply_overrides(&mut config, args)?;
    validate(&config)?;
    Ok(config)
}

fn apply_overrides(config: &mut SystemConfig, args: &Args) -> Result<()> {
    if let Some(pid_file) = &args.pid_file {
        config.pid_file = parse_pidfile_arg(pid_file);
    }
    if args.no_fork {
        config.foreground = true;
    }
    if args.debug {
        config.debug = true;
    }
    if args.no_chdir {
        // "do not chdir to /" only matters pre-daemonize; tracked on
        // the config so `daemonize` can read it uniformly.
        config.no_chdir = true;
    }
    if let Some(chroot) = &args.chroot {
        config.chroot = Some(chroot.clone());
    }
    if !args.module_path.is_empty() {
        config.module_path = args.module_path.clone();
    }
    Ok(())
}

/// `-i NONE` disables the pidfile; any other value overrides the path.
fn parse_pidfile_arg(raw: &str) -> Option<PathBuf> {
    if raw.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(PathBuf::from(raw))
    }
}

fn validate(config: &SystemConfig) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for action in &config.actions {
        if !seen.insert(action.name.as_str()) {
            bail!("duplicate action name in config: {}", action.name);
        }
    }
    if config.max_line == 0 {
        bail!("max_line must be nonzero");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_with_config(path: PathBuf) -> Args {
        Args {
            config_file: path,
            pid_file: None,
            no_fork: false,
            check_config: None,
            debug: false,
            parser_debug: false,
            no_chdir: false,
            chroot: None,
            module_path: Vec::new(),
            dump_config: None,
            version: false,
        }
    }

    #[test]
    fn loads_minimal_config_and_applies_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logforged.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"max_line = 4096"#).unwrap();

        let mut args = args_with_config(path);
        args.debug = true;
        args.pid_file = Some("NONE".into());

        let config = load(&args).unwrap();
        assert_eq!(config.max_line, 4096);
        assert!(config.debug);
        assert!(config.pid_file.is_none());
    }

    #[test]
    fn rejects_duplicate_action_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logforged.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
            [[actions]]
            name = "dup"
            ruleset = "RSYSLOG_DefaultRuleset"
            kind = "Discard"

            [[actions]]
            name = "dup"
            ruleset = "RSYSLOG_DefaultRuleset"
            kind = "Discard"
            "#
        )
        .unwrap();

        let args = args_with_config(path);
        assert!(load(&args).is_err());
    }
}
