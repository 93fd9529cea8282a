//! Daemon process supervision
//!
//! Manages the daemon from the CLI: PID records, liveness probes,
//! backgrounding, and the stop escalation (SIGTERM, then SIGKILL).
//!
//! The PID record is JSON so `stop` can verify it is about to signal a
//! taptype process and not an unrelated one that reused the PID. Bare
//! integer PID files from older installs are still accepted.

use crate::config::{Config, HotkeyConfig};
use crate::daemon::Daemon;
use crate::error::{HotkeyError, Result, SupervisorError, TaptypeError};
use crate::hotkey::{self, HotkeyCallback, HotkeyCallbacks, HotkeyListener};
use crate::output;
use crate::transcribe;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Substring of the daemon's command line used to verify PID identity
pub const IDENTITY_TOKEN: &str = "taptype";

/// SIGTERM grace period: 50 polls at 100ms
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STOP_POLL_ATTEMPTS: u32 = 50;
/// SIGKILL takes effect almost immediately; a short re-poll confirms it
const KILL_POLL_ATTEMPTS: u32 = 10;

/// On-disk PID record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidRecord {
    pub pid: i32,
    /// Command line of the daemon process, for identity checks
    #[serde(default)]
    pub command: Option<String>,
    /// Unix timestamp (fractional seconds) when the record was written
    #[serde(default)]
    pub created_at: Option<f64>,
    /// Config directory the daemon was started with
    #[serde(default)]
    pub config_dir: Option<String>,
}

/// Path of the PID record inside the config directory
pub fn pid_file_path() -> std::result::Result<PathBuf, SupervisorError> {
    Config::config_dir()
        .map(|dir| dir.join("daemon.pid"))
        .ok_or_else(|| SupervisorError::PidFile("Cannot determine config directory".to_string()))
}

/// Read the PID record, tolerating the legacy bare-integer format.
/// An unreadable or unparsable file is removed and treated as absent.
fn read_record(path: &Path) -> Option<PidRecord> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("Cannot read PID file {:?}: {}", path, e);
            return None;
        }
    };

    if let Ok(record) = serde_json::from_str::<PidRecord>(&contents) {
        return Some(record);
    }

    // Legacy format: the file holds just the PID
    if let Ok(pid) = contents.trim().parse::<i32>() {
        return Some(PidRecord {
            pid,
            command: None,
            created_at: None,
            config_dir: None,
        });
    }

    tracing::warn!("Removing unparsable PID file {:?}", path);
    remove_record(path);
    None
}

/// Write this process's PID record atomically (temp file + rename)
fn write_record(path: &Path) -> std::result::Result<(), SupervisorError> {
    let parent = path
        .parent()
        .ok_or_else(|| SupervisorError::PidFile(format!("No parent directory for {:?}", path)))?;

    std::fs::create_dir_all(parent)
        .map_err(|e| SupervisorError::PidFile(format!("Cannot create {:?}: {}", parent, e)))?;

    let record = PidRecord {
        pid: std::process::id() as i32,
        command: process_command(std::process::id() as i32),
        created_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs_f64()),
        config_dir: Some(parent.display().to_string()),
    };

    let json = serde_json::to_string_pretty(&record)
        .map_err(|e| SupervisorError::PidFile(e.to_string()))?;

    // Atomic on the same filesystem: write a temp file, then rename over
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| SupervisorError::PidFile(e.to_string()))?;
    tmp.write_all(json.as_bytes())
        .map_err(|e| SupervisorError::PidFile(e.to_string()))?;
    tmp.persist(path)
        .map_err(|e| SupervisorError::PidFile(e.to_string()))?;

    tracing::debug!("Wrote PID record to {:?}", path);
    Ok(())
}

fn remove_record(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!("Failed to remove PID file {:?}: {}", path, e);
        }
    }
}

/// Command line of a process, from /proc with a `ps` fallback
fn process_command(pid: i32) -> Option<String> {
    if let Ok(raw) = std::fs::read(format!("/proc/{}/cmdline", pid)) {
        let cmdline = raw
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        if !cmdline.is_empty() {
            return Some(cmdline);
        }
    }

    let output = std::process::Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "command="])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let cmdline = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if cmdline.is_empty() {
        None
    } else {
        Some(cmdline)
    }
}

/// Outcome of a signal-0 liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    Alive,
    Dead,
    /// The process exists but belongs to another user
    Denied,
}

#[cfg(unix)]
fn probe_process(pid: i32) -> Liveness {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), None) {
        Ok(()) => Liveness::Alive,
        Err(Errno::EPERM) => Liveness::Denied,
        Err(_) => Liveness::Dead,
    }
}

#[cfg(not(unix))]
fn probe_process(_pid: i32) -> Liveness {
    Liveness::Dead
}

/// Poll until the process is gone, for at most `attempts` probes
/// spaced [`STOP_POLL_INTERVAL`] apart
fn wait_until_dead(pid: i32, attempts: u32) -> bool {
    for attempt in 0..attempts {
        if probe_process(pid) == Liveness::Dead {
            return true;
        }
        if attempt + 1 < attempts {
            std::thread::sleep(STOP_POLL_INTERVAL);
        }
    }
    false
}

/// Is a daemon recorded in `path` actually running?
///
/// Stale records (dead PID, or a PID reused by an unrelated process)
/// are removed as a side effect. A process we cannot signal (EPERM) is
/// conservatively treated as running: it exists, it just isn't ours.
fn is_daemon_running_at(path: &Path, identity: &str) -> bool {
    let Some(record) = read_record(path) else {
        return false;
    };

    if record.pid <= 0 {
        tracing::debug!("PID record holds invalid PID {}, removing", record.pid);
        remove_record(path);
        return false;
    }

    match probe_process(record.pid) {
        Liveness::Dead => {
            tracing::debug!("Recorded daemon PID {} is gone, removing record", record.pid);
            remove_record(path);
            false
        }
        Liveness::Denied => true,
        Liveness::Alive => {
            // PID reuse check: the live process must look like ours
            match process_command(record.pid) {
                Some(cmd) if cmd.contains(identity) => true,
                Some(cmd) => {
                    tracing::debug!(
                        "PID {} now belongs to {:?}, removing stale record",
                        record.pid,
                        cmd
                    );
                    remove_record(path);
                    false
                }
                // Cannot inspect the command line; trust the liveness probe
                None => true,
            }
        }
    }
}

/// Is the taptype daemon running?
pub fn is_daemon_running() -> bool {
    match pid_file_path() {
        Ok(path) => is_daemon_running_at(&path, IDENTITY_TOKEN),
        Err(_) => false,
    }
}

/// Removes the PID record when the daemon exits
struct PidGuard {
    path: PathBuf,
}

impl PidGuard {
    fn acquire(path: PathBuf) -> std::result::Result<Self, SupervisorError> {
        if is_daemon_running_at(&path, IDENTITY_TOKEN) {
            let pid = read_record(&path).map(|r| r.pid).unwrap_or(0);
            return Err(SupervisorError::AlreadyRunning(pid));
        }
        write_record(&path)?;
        Ok(Self { path })
    }
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        remove_record(&self.path);
    }
}

/// Run the daemon in the foreground, holding the PID record for the
/// process lifetime.
pub fn run_foreground(config: &Config) -> Result<()> {
    Config::ensure_directories()?;

    // First run: leave a commented config template behind
    if let Some(path) = Config::default_path() {
        if !path.exists() {
            crate::config::write_default_config(&path)?;
            tracing::info!("Wrote default config to {:?}", path);
        }
    }

    let _guard = PidGuard::acquire(pid_file_path()?)?;

    let mut daemon = Daemon::new(config.clone());
    daemon.run()
}

/// `start` command: foreground by default, detached child with
/// `--background`.
pub fn start(config: &Config, config_path: Option<&Path>, background: bool) -> Result<()> {
    if is_daemon_running() {
        let pid = pid_file_path()
            .ok()
            .and_then(|p| read_record(&p))
            .map(|r| r.pid)
            .unwrap_or(0);
        tracing::info!("Daemon already running (PID {})", pid);
        return Ok(());
    }

    if background {
        match spawn_detached(config_path) {
            Ok(pid) => {
                tracing::info!("Daemon started in background (PID {})", pid);
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("Background start failed ({}), running in foreground", e);
            }
        }
    }

    run_foreground(config)
}

/// Spawn `taptype run` as a detached child in its own process group
#[cfg(unix)]
fn spawn_detached(config_path: Option<&Path>) -> std::result::Result<u32, SupervisorError> {
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};

    let exe =
        std::env::current_exe().map_err(|e| SupervisorError::SpawnFailed(e.to_string()))?;

    let mut cmd = Command::new(exe);
    // Global flags come before the subcommand
    if let Some(path) = config_path {
        cmd.arg("--config").arg(path);
    }
    cmd.arg("run");
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0);

    let child = cmd
        .spawn()
        .map_err(|e| SupervisorError::SpawnFailed(e.to_string()))?;

    Ok(child.id())
}

#[cfg(not(unix))]
fn spawn_detached(_config_path: Option<&Path>) -> std::result::Result<u32, SupervisorError> {
    Err(SupervisorError::Unsupported)
}

/// `stop` command: SIGTERM, wait up to 5s, then SIGKILL
pub fn stop() -> Result<()> {
    let path = pid_file_path()?;
    stop_at(&path, IDENTITY_TOKEN)
}

#[cfg(unix)]
fn stop_at(path: &Path, identity: &str) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(record) = read_record(path) else {
        tracing::info!("Daemon is not running");
        return Ok(());
    };

    if record.pid <= 0 {
        remove_record(path);
        tracing::info!("Daemon is not running");
        return Ok(());
    }

    // Refuse to signal a PID that no longer looks like our daemon
    if let Some(cmd) = process_command(record.pid) {
        if !cmd.contains(identity) {
            tracing::warn!(
                "PID {} belongs to {:?}, not stopping it (removing stale record)",
                record.pid,
                cmd
            );
            remove_record(path);
            return Ok(());
        }
    }

    let pid = Pid::from_raw(record.pid);

    match kill(pid, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => {
            tracing::info!("Daemon already exited");
            remove_record(path);
            return Ok(());
        }
        Err(Errno::EPERM) => {
            // Leave the record: the daemon is alive, we just can't touch it
            return Err(TaptypeError::Supervisor(SupervisorError::PermissionDenied(
                record.pid,
            )));
        }
        Err(e) => {
            return Err(TaptypeError::Supervisor(SupervisorError::PidFile(format!(
                "Failed to signal PID {}: {}",
                record.pid, e
            ))));
        }
    }

    tracing::info!("Sent SIGTERM to daemon (PID {})", record.pid);

    if wait_until_dead(record.pid, STOP_POLL_ATTEMPTS) {
        tracing::info!("Daemon stopped");
        remove_record(path);
        return Ok(());
    }

    tracing::warn!(
        "Daemon did not exit within {:.0?}, sending SIGKILL",
        STOP_POLL_INTERVAL * STOP_POLL_ATTEMPTS
    );
    match kill(pid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {
            // Only drop the record once the process is confirmed gone
            if wait_until_dead(record.pid, KILL_POLL_ATTEMPTS) {
                remove_record(path);
            } else {
                tracing::warn!(
                    "PID {} still present after SIGKILL, keeping its record",
                    record.pid
                );
            }
            Ok(())
        }
        Err(Errno::EPERM) => Err(TaptypeError::Supervisor(SupervisorError::PermissionDenied(
            record.pid,
        ))),
        Err(e) => Err(TaptypeError::Supervisor(SupervisorError::PidFile(format!(
            "Failed to kill PID {}: {}",
            record.pid, e
        )))),
    }
}

#[cfg(not(unix))]
fn stop_at(_path: &Path, _identity: &str) -> Result<()> {
    Err(TaptypeError::Supervisor(SupervisorError::Unsupported))
}

/// Run a listener through one start/stop cycle with no-op callbacks.
/// Opening the devices alone can succeed while the listener thread
/// still fails to spawn, so the cycle checks both.
fn cycle_listener(listener: &mut dyn HotkeyListener) -> std::result::Result<(), HotkeyError> {
    let noop: HotkeyCallback = Arc::new(|| {});
    listener.start(HotkeyCallbacks {
        on_activate: Arc::clone(&noop),
        on_deactivate: Arc::clone(&noop),
        on_toggle: noop,
    })?;
    listener.stop();
    Ok(())
}

fn check_hotkey_readiness(config: &HotkeyConfig) -> std::result::Result<(), HotkeyError> {
    let mut listener = hotkey::create_listener(config)?;
    cycle_listener(listener.as_mut())
}

/// `status` command: report daemon, config, and dependency state
pub fn status(config: &Config, config_path: Option<&Path>) -> Result<()> {
    println!("taptype v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let running = is_daemon_running();
    match (running, pid_file_path().ok().and_then(|p| read_record(&p))) {
        (true, Some(record)) => println!("Daemon:   running (PID {})", record.pid),
        (true, None) => println!("Daemon:   running"),
        (false, _) => println!("Daemon:   not running"),
    }

    let resolved_config = config_path
        .map(PathBuf::from)
        .or_else(Config::default_path);
    match resolved_config {
        Some(path) if path.exists() => println!("Config:   {}", path.display()),
        Some(path) => println!("Config:   {} (defaults; file missing)", path.display()),
        None => println!("Config:   built-in defaults"),
    }

    println!(
        "Hotkey:   {} ({:?} mode)",
        config.hotkey.key, config.hotkey.mode
    );

    match transcribe::create_engine(&config.engine) {
        Ok(engine) => {
            let ready = if engine.is_available() {
                "ready"
            } else {
                "model missing"
            };
            println!("Engine:   {} / {} ({})", engine.name(), config.engine.model, ready);
        }
        Err(e) => println!("Engine:   unavailable ({})", e),
    }

    println!("Output:   {}", output::resolved_mode(&config.output));

    // Probing input devices would race with a running daemon's listener
    if running {
        println!("Hotkeys:  managed by the running daemon");
    } else {
        match check_hotkey_readiness(&config.hotkey) {
            Ok(()) => println!("Hotkeys:  input devices accessible"),
            Err(e) => println!("Hotkeys:  {}", e),
        }
    }

    println!("Models:   {}", Config::models_dir().display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn own_pid() -> i32 {
        std::process::id() as i32
    }

    #[test]
    fn test_record_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.pid");

        write_record(&path).unwrap();
        let record = read_record(&path).unwrap();

        assert_eq!(record.pid, own_pid());
        assert!(record.created_at.unwrap() > 0.0);
        assert_eq!(
            record.config_dir.as_deref(),
            Some(dir.path().display().to_string().as_str())
        );
    }

    #[test]
    fn test_legacy_bare_pid_accepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        std::fs::write(&path, format!("{}\n", own_pid())).unwrap();

        let record = read_record(&path).unwrap();
        assert_eq!(record.pid, own_pid());
        assert!(record.command.is_none());
        assert!(record.created_at.is_none());
    }

    #[test]
    fn test_garbage_record_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        std::fs::write(&path, "not a pid at all").unwrap();

        assert!(read_record(&path).is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_record_means_not_running() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        assert!(!is_daemon_running_at(&path, IDENTITY_TOKEN));
    }

    #[test]
    fn test_invalid_pid_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        std::fs::write(&path, "-1").unwrap();

        assert!(!is_daemon_running_at(&path, IDENTITY_TOKEN));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_dead_pid_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        // Far above any realistic pid_max
        std::fs::write(&path, i32::MAX.to_string()).unwrap();

        assert!(!is_daemon_running_at(&path, IDENTITY_TOKEN));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_live_pid_with_matching_identity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        std::fs::write(&path, own_pid().to_string()).unwrap();

        // Use our own live process with its real command line as identity
        let own_cmd = process_command(own_pid()).expect("own command line");
        assert!(is_daemon_running_at(&path, &own_cmd));
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_live_pid_with_wrong_identity_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        std::fs::write(&path, own_pid().to_string()).unwrap();

        // Our own PID is alive, but its command line won't contain this
        assert!(!is_daemon_running_at(&path, "definitely-not-this-binary-zzz"));
        assert!(!path.exists());
    }

    #[derive(Default)]
    struct CountingListener {
        starts: usize,
        stops: usize,
        fail_start: bool,
    }

    impl HotkeyListener for CountingListener {
        fn start(&mut self, _callbacks: HotkeyCallbacks) -> std::result::Result<(), HotkeyError> {
            if self.fail_start {
                return Err(HotkeyError::NotSupported("no input devices".to_string()));
            }
            self.starts += 1;
            Ok(())
        }

        fn stop(&mut self) {
            self.stops += 1;
        }
    }

    #[test]
    fn test_listener_cycle_starts_and_stops_once() {
        let mut listener = CountingListener::default();
        cycle_listener(&mut listener).unwrap();
        assert_eq!(listener.starts, 1);
        assert_eq!(listener.stops, 1);
    }

    #[test]
    fn test_listener_cycle_skips_stop_when_start_fails() {
        let mut listener = CountingListener {
            fail_start: true,
            ..Default::default()
        };
        assert!(cycle_listener(&mut listener).is_err());
        assert_eq!(listener.stops, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_wait_until_dead_detects_dead_pid() {
        assert!(wait_until_dead(i32::MAX, 1));
    }

    #[cfg(unix)]
    #[test]
    fn test_wait_until_dead_times_out_on_live_pid() {
        assert!(!wait_until_dead(own_pid(), 1));
    }

    #[test]
    fn test_stop_without_record_is_ok() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        assert!(stop_at(&path, IDENTITY_TOKEN).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_refuses_identity_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        std::fs::write(&path, own_pid().to_string()).unwrap();

        // Must not signal us; just clean up the stale record
        assert!(stop_at(&path, "definitely-not-this-binary-zzz").is_ok());
        assert!(!path.exists());
    }

    #[test]
    fn test_pid_guard_removes_record_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.pid");

        {
            let _guard = PidGuard::acquire(path.clone()).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_pid_guard_rejects_second_acquire() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.pid");

        // The test binary's own command line contains the identity token,
        // so the guard sees this process as a live daemon.
        let _guard = PidGuard::acquire(path.clone()).unwrap();
        let second = PidGuard::acquire(path.clone());
        assert!(matches!(second, Err(SupervisorError::AlreadyRunning(_))));
    }
}
