//! Settings storage for routerlog
//!
//! Settings live in `~/.config/routerlog/` as JSON. They may hold the router
//! admin password, so files written here are private to the user.
//!
//! Call [`init`] at application startup to bootstrap the config directory.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the directory used under the platform config dir
const APP_DIR: &str = "routerlog";

/// Create `~/.config/routerlog/` if needed and return it
pub fn init() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR))
}

/// Path of `filename` inside the routerlog config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Path under the user's home directory (default output folder lives there)
pub fn home_path(relative: &str) -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(relative))
}

/// Load `filename` from the config directory, `None` if it doesn't exist
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<Option<T>> {
    match config_path(filename) {
        Some(path) if path.exists() => load_json_file(&path).map(Some),
        _ => Ok(None),
    }
}

pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))
}

/// Write `value` as pretty JSON to `path`
///
/// The content goes to a sibling temp file first and is renamed into place,
/// so a reader never sees a half-written file. On Unix the file is `0600`.
pub fn save_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let tmp = path.with_extension("json.tmp");
    {
        let mut file = private_file(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(content.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to write settings file: {}", path.display()))
}

#[cfg(unix)]
fn private_file(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn private_file(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}

/// Write `value` to `filename` in the config directory
pub fn save_json<T: Serialize>(filename: &str, value: &T) -> Result<PathBuf> {
    let path = init()?.join(filename);
    save_json_file(&path, value)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        user: String,
        pages: u32,
    }

    fn sample(user: &str, pages: u32) -> Sample {
        Sample {
            user: user.to_string(),
            pages,
        }
    }

    #[test]
    fn test_config_path() {
        let path = config_path("settings.json").unwrap();
        assert!(path.ends_with("routerlog/settings.json"));
    }

    #[test]
    fn test_home_path() {
        assert!(home_path("asusdata").unwrap().ends_with("asusdata"));
    }

    #[test]
    fn test_load_json_file_missing() {
        let result: Result<serde_json::Value> =
            load_json_file(Path::new("/definitely/not/here/settings.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let value = sample("admin", 3);

        save_json_file(&path, &value).unwrap();
        let loaded: Sample = load_json_file(&path).unwrap();
        assert_eq!(loaded, value);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        save_json_file(&path, &sample("a", 1)).unwrap();
        save_json_file(&path, &sample("b", 2)).unwrap();

        let loaded: Sample = load_json_file(&path).unwrap();
        assert_eq!(loaded.user, "b");
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        save_json_file(&path, &sample("a", 1)).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
