//! Browser process launching.
//!
//! The auth service only needs "open a window for this profile, or a guest
//! window"; [`BrowserLauncher`] is that seam. [`ChromeLauncher`] spawns a
//! detached Chrome/Chromium process, [`NoopLauncher`] does nothing (tests,
//! `--no-launch`).

pub mod profiles;

pub use profiles::{discover_chrome_profiles, ChromeProfile};

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

/// Last resort when no candidate is found on disk or in `PATH`.
const FALLBACK_EXECUTABLE: &str = "google-chrome-stable";

/// Opens browser windows on behalf of the auth service.
pub trait BrowserLauncher: Send + Sync {
    /// `Some(profile)` opens that profile directory, `None` opens a guest
    /// window. Failures are logged by the implementation, never returned.
    fn launch(&self, profile: Option<&str>);
}

/// Launcher that never starts anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLauncher;

impl BrowserLauncher for NoopLauncher {
    fn launch(&self, profile: Option<&str>) {
        tracing::debug!(profile = ?profile, "Browser launch skipped (launcher disabled)");
    }
}

/// Spawns Chrome in a new window. Existing browser instances are left alone
/// so several profiles can be open at once.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    executable: PathBuf,
}

impl ChromeLauncher {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Use `configured` if set, otherwise detect an installed browser.
    pub fn detect(configured: Option<&Path>) -> Self {
        let executable = configured
            .map(Path::to_path_buf)
            .unwrap_or_else(find_chrome_executable);
        Self { executable }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn args(profile: Option<&str>) -> Vec<String> {
        match profile {
            Some(dir) => vec![
                format!("--profile-directory={dir}"),
                "--new-window".to_string(),
            ],
            None => vec!["--guest".to_string(), "--new-window".to_string()],
        }
    }
}

impl BrowserLauncher for ChromeLauncher {
    fn launch(&self, profile: Option<&str>) {
        match profile {
            Some(p) => tracing::info!(profile = p, "Launching Chrome with profile"),
            None => tracing::info!("Launching Chrome in Guest mode"),
        }

        let spawned = Command::new(&self.executable)
            .args(Self::args(profile))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(child) => {
                tracing::debug!(pid = child.id(), "Chrome process started");
                reap_in_background(child);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => tracing::warn!(
                executable = %self.executable.display(),
                "Chrome executable not found. Please ensure it's in your PATH."
            ),
            Err(e) => tracing::warn!(
                executable = %self.executable.display(),
                "Error launching Chrome: {e}"
            ),
        }
    }
}

/// Wait for `child` on a detached thread so it never lingers as a zombie.
/// Chrome hands off to a running instance and exits almost immediately.
fn reap_in_background(mut child: Child) {
    let pid = child.id();
    let spawned = std::thread::Builder::new()
        .name(format!("reap-{pid}"))
        .spawn(move || match child.wait() {
            Ok(status) => tracing::debug!(pid, %status, "Chrome process exited"),
            Err(e) => tracing::debug!(pid, "Failed to wait for Chrome process: {e}"),
        });
    if let Err(e) = spawned {
        tracing::warn!(pid, "Failed to spawn reaper thread: {e}");
    }
}

/// Executable candidates for the current platform, in preference order.
fn chrome_candidates() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &["chrome.exe", "google-chrome.exe", "chromium.exe"]
    } else {
        &[
            "google-chrome",
            "google-chrome-stable",
            "chrome",
            "chromium",
            "chromium-browser",
        ]
    }
}

/// Absolute candidates that exist win first, then the first name found in `PATH`.
pub fn find_chrome_executable() -> PathBuf {
    let candidates = chrome_candidates();

    for candidate in candidates {
        let path = Path::new(candidate);
        if path.is_absolute() && path.is_file() {
            return path.to_path_buf();
        }
    }

    for candidate in candidates {
        if Path::new(candidate).is_absolute() {
            continue;
        }
        if let Ok(found) = which::which(candidate) {
            return found;
        }
    }

    PathBuf::from(FALLBACK_EXECUTABLE)
}
