//! Discovery of Chrome profiles installed for the current user.
//!
//! Looks for `Default`, `Guest Profile` and every `Profile *` directory under
//! the browser's user data dir and pulls the signed-in account email out of
//! each profile's `Preferences` file.

use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""email"\s*:\s*"([^"]+)""#).unwrap());

/// A profile directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChromeProfile {
    /// Directory name, e.g. `Default` or `Profile 3`.
    pub name: String,
    pub path: PathBuf,
    /// Signed-in account, if the profile has one.
    pub email: Option<String>,
}

/// Default user data dir (`~/.config/google-chrome`), if a home dir exists.
pub fn default_user_data_dir() -> Option<PathBuf> {
    directories::UserDirs::new().map(|u| u.home_dir().join(".config").join("google-chrome"))
}

/// Profiles under `user_data_dir`: `Default`, `Guest Profile`, then
/// `Profile *` in name order. A missing directory yields an empty list.
pub fn discover_chrome_profiles(user_data_dir: &Path) -> Vec<ChromeProfile> {
    if !user_data_dir.is_dir() {
        return Vec::new();
    }

    let mut dirs: Vec<(String, PathBuf)> = Vec::new();
    for fixed in ["Default", "Guest Profile"] {
        let path = user_data_dir.join(fixed);
        if path.is_dir() {
            dirs.push((fixed.to_string(), path));
        }
    }

    let pattern = format!(
        "{}/Profile *",
        glob::Pattern::escape(&user_data_dir.to_string_lossy())
    );
    match glob::glob(&pattern) {
        Ok(paths) => {
            let mut numbered: Vec<(String, PathBuf)> = paths
                .filter_map(Result::ok)
                .filter(|p| p.is_dir())
                .filter_map(|p| {
                    let name = p.file_name()?.to_string_lossy().into_owned();
                    Some((name, p))
                })
                .collect();
            numbered.sort_by(|a, b| a.0.cmp(&b.0));
            dirs.extend(numbered);
        }
        Err(e) => tracing::warn!("Invalid profile glob pattern {pattern}: {e}"),
    }

    dirs.into_iter()
        .map(|(name, path)| {
            let email = read_profile_email(&path);
            ChromeProfile { name, path, email }
        })
        .collect()
}

fn read_profile_email(profile_dir: &Path) -> Option<String> {
    let preferences = profile_dir.join("Preferences");
    let contents = match std::fs::read(&preferences) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(
                "Error extracting email for {}: {e}",
                profile_dir.display()
            );
            return None;
        }
    };
    extract_email(&String::from_utf8_lossy(&contents))
}

fn extract_email(preferences: &str) -> Option<String> {
    EMAIL_PATTERN
        .captures(preferences)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
