//! Root folder resolution for the proctoring services
//!
//! All binaries share one root folder holding the SQLite database, the
//! blob store, and scratch space for media downloads. Resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `PROCTOR_ROOT` environment variable
//! 3. `root_folder` key in the platform config file
//! 4. OS-dependent compiled default (fallback)

use crate::Result;
use std::path::{Path, PathBuf};

/// Environment variable consulted when no CLI argument is given
pub const ROOT_ENV_VAR: &str = "PROCTOR_ROOT";

/// Resolve the shared root folder
pub fn resolve_root_folder(cli_arg: Option<&str>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: Platform config file
    if let Some(config_path) = platform_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Create the root folder and its standard subdirectories if missing
pub fn ensure_root_layout(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root)?;
    std::fs::create_dir_all(root.join("blobs"))?;
    std::fs::create_dir_all(root.join("scratch"))?;
    Ok(())
}

/// Path of the shared database inside the root folder
pub fn database_path(root: &Path) -> PathBuf {
    root.join("proctor.db")
}

/// Path of the optional service config file inside the root folder
pub fn config_file_path(root: &Path) -> PathBuf {
    root.join("proctor.toml")
}

/// Platform config file consulted for the `root_folder` key
fn platform_config_file() -> Option<PathBuf> {
    if cfg!(target_os = "linux") {
        // ~/.config/proctor/config.toml first, then /etc/proctor/config.toml
        if let Some(path) = dirs::config_dir().map(|d| d.join("proctor").join("config.toml")) {
            if path.exists() {
                return Some(path);
            }
        }
        let system_config = PathBuf::from("/etc/proctor/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
        None
    } else {
        dirs::config_dir()
            .map(|d| d.join("proctor").join("config.toml"))
            .filter(|p| p.exists())
    }
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("proctor"))
        .unwrap_or_else(|| PathBuf::from("./proctor_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_argument_wins() {
        let root = resolve_root_folder(Some("/tmp/proctor-test"));
        assert_eq!(root, PathBuf::from("/tmp/proctor-test"));
    }

    #[test]
    fn ensure_layout_creates_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        ensure_root_layout(&root).unwrap();
        assert!(root.join("blobs").is_dir());
        assert!(root.join("scratch").is_dir());
    }

    #[test]
    fn database_path_is_inside_root() {
        let path = database_path(Path::new("/data/proctor"));
        assert_eq!(path, PathBuf::from("/data/proctor/proctor.db"));
    }
}
