//! Workspace log file discovery

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Result-set cap for a single discovery pass
pub const MAX_DISCOVERED_FILES: usize = 100;

/// Dependency directories excluded from discovery
const EXCLUDED_DIRS: [&str; 3] = ["node_modules", "target", ".git"];

/// Discover `*.log` and `*.txt` files under `root`, capped at
/// [`MAX_DISCOVERED_FILES`], skipping dependency directories.
///
/// Returns files in glob's deterministic (alphabetically sorted) order so
/// repeated discovery passes over an unchanged tree yield identical lists.
pub fn discover_log_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for extension in ["log", "txt"] {
        let pattern = root.join(format!("**/*.{extension}"));
        let pattern = pattern
            .to_str()
            .with_context(|| format!("workspace root is not valid UTF-8: {}", root.display()))?;

        let paths = glob::glob(pattern)
            .with_context(|| format!("invalid discovery pattern: {pattern}"))?;

        for path in paths {
            match path {
                Ok(path) => {
                    if is_excluded(&path) {
                        continue;
                    }
                    files.push(path);
                    if files.len() >= MAX_DISCOVERED_FILES {
                        tracing::warn!(
                            cap = MAX_DISCOVERED_FILES,
                            "discovery cap reached, ignoring remaining files"
                        );
                        return Ok(files);
                    }
                }
                Err(err) => {
                    tracing::warn!("skipping unreadable path during discovery: {err}");
                }
            }
        }
    }

    Ok(files)
}

fn is_excluded(path: &Path) -> bool {
    path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_finds_log_and_txt() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Auth_2024-01-01_10-00-00.log"), "a").unwrap();
        fs::write(dir.path().join("summary.txt"), "b").unwrap();
        fs::write(dir.path().join("readme.md"), "c").unwrap();

        let files = discover_log_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_discover_skips_dependency_dirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/noise.log"), "x").unwrap();
        fs::write(dir.path().join("App.log"), "y").unwrap();

        let files = discover_log_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("App.log"));
    }

    #[test]
    fn test_discover_respects_cap() {
        let dir = TempDir::new().unwrap();
        for i in 0..(MAX_DISCOVERED_FILES + 20) {
            fs::write(dir.path().join(format!("Svc_{i:03}.log")), "x").unwrap();
        }

        let files = discover_log_files(dir.path()).unwrap();
        assert_eq!(files.len(), MAX_DISCOVERED_FILES);
    }
}
