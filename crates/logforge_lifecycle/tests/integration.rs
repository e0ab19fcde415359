//! End-to-end tests driving the full `logforged` orchestration: config
//! loading, `Daemon::bootstrap`, the pipeline, an action, HUP, and
//! shutdown draining (spec.md §2 "Data flow", §4.7).

use logforge_lifecycle::cli::Args;
use logforge_lifecycle::signals::SignalEvent;
use logforge_lifecycle::{config, Daemon};
use logforge_logging::{init_logging, LogConfig, LoggingHandle};
use logforge_protocol::types::{Facility, Message, Pri, Severity};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Once, OnceLock};
use std::time::Duration;

static LOGGING_INIT: Once = Once::new();
static LOGGING_HANDLE: OnceLock<LoggingHandle> = OnceLock::new();

/// `tracing_subscriber::registry().init()` may only run once per test
/// binary; every test that needs a `Daemon` shares this one handle.
fn test_logging_handle() -> LoggingHandle {
    LOGGING_INIT.call_once(|| {
        let dir = tempfile::tempdir().expect("tempdir for test log home");
        std::env::set_var("LOGFORGE_HOME", dir.path());
        std::mem::forget(dir); // kept alive for the process lifetime
        let handle = init_logging(LogConfig {
            app_name: "logforged-test",
            verbose: false,
            foreground: true,
            stderr_error_cap: None,
        })
        .expect("initializing test logging");
        LOGGING_HANDLE.set(handle).ok();
    });
    LOGGING_HANDLE.get().expect("logging initialized").clone()
}

fn args_for(config_file: PathBuf) -> Args {
    Args {
        config_file,
        pid_file: Some("NONE".into()),
        no_fork: true,
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

fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("logforged.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    path
}

#[test]
fn daemon_delivers_a_message_through_a_file_action_and_flushes_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("out.log");
    let conf_path = write_config(
        &dir,
        &format!(
            r#"
            max_line = 8192

            [[actions]]
            name = "to-file"
            ruleset = "RSYSLOG_DefaultRuleset"
            kind = {{ File = {{ path = "{}" }} }}
            "#,
            out_path.display()
        ),
    );

    let system_config = config::load(&args_for(conf_path)).unwrap();
    let daemon = Daemon::bootstrap(system_config, test_logging_handle()).unwrap();

    let msg = Message::construct("test-input", Pri::new(Facility::User, Severity::Info), "hello from the test suite");
    daemon.pipeline().submit(msg).unwrap();

    wait_until(Duration::from_secs(2), || {
        std::fs::read_to_string(&out_path).map(|s| s.contains("hello from the test suite")).unwrap_or(false)
    });

    daemon.shutdown();

    let contents = std::fs::read_to_string(&out_path).unwrap();
    assert!(contents.contains("hello from the test suite"));
}

#[test]
fn hup_reopens_the_file_action_after_an_external_rename() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("out.log");
    let conf_path = write_config(
        &dir,
        &format!(
            r#"
            max_line = 8192

            [[actions]]
            name = "to-file"
            ruleset = "RSYSLOG_DefaultRuleset"
            kind = {{ File = {{ path = "{}" }} }}
            "#,
            out_path.display()
        ),
    );

    let system_config = config::load(&args_for(conf_path)).unwrap();
    let daemon = Daemon::bootstrap(system_config, test_logging_handle()).unwrap();

    daemon
        .pipeline()
        .submit(Message::construct("t", Pri::new(Facility::User, Severity::Info), "before rotate"))
        .unwrap();
    wait_until(Duration::from_secs(2), || out_path.exists());

    // Simulate logrotate moving the file out from under the action.
    std::fs::rename(&out_path, dir.path().join("out.log.1")).unwrap();
    daemon.hup();

    daemon
        .pipeline()
        .submit(Message::construct("t", Pri::new(Facility::User, Severity::Info), "after rotate"))
        .unwrap();
    wait_until(Duration::from_secs(2), || {
        std::fs::read_to_string(&out_path).map(|s| s.contains("after rotate")).unwrap_or(false)
    });

    daemon.shutdown();
    let contents = std::fs::read_to_string(&out_path).unwrap();
    assert!(contents.contains("after rotate"));
    assert!(!contents.contains("before rotate"));
}

#[test]
fn daemon_run_exits_promptly_on_a_shutdown_signal_event() {
    let dir = tempfile::tempdir().unwrap();
    let conf_path = write_config(
        &dir,
        r#"
        max_line = 8192

        [[actions]]
        name = "discard"
        ruleset = "RSYSLOG_DefaultRuleset"
        kind = "Discard"
        "#,
    );

    let system_config = config::load(&args_for(conf_path)).unwrap();
    let daemon = Daemon::bootstrap(system_config, test_logging_handle()).unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        tx.send(SignalEvent::Shutdown).unwrap();
    });

    let started = std::time::Instant::now();
    daemon.run(rx);
    assert!(started.elapsed() < Duration::from_secs(2), "run() should return promptly after a Shutdown event");

    daemon.shutdown();
}

#[test]
fn rejects_a_config_that_uses_an_out_of_scope_action_kind() {
    let dir = tempfile::tempdir().unwrap();
    let conf_path = write_config(
        &dir,
        r#"
        max_line = 8192

        [[actions]]
        name = "wall"
        ruleset = "RSYSLOG_DefaultRuleset"
        kind = "UsersWall"
        "#,
    );

    let system_config = config::load(&args_for(conf_path)).unwrap();
    assert!(Daemon::bootstrap(system_config, test_logging_handle()).is_err());
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(condition(), "condition not met within {timeout:?}");
}
