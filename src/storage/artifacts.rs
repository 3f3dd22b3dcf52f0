//! # Artifact Store
//!
//! File-backed object store rooted at a directory. Every path handed in is
//! relative to the root and is normalised lexically before use; absolute
//! paths and `..` components that would leave the root are rejected. The
//! deepest existing part of the joined path is then canonicalised, so a
//! symlink under the root cannot point reads or writes outside it. The same
//! type serves the read-only protein library.

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Absolute artifact path not allowed: {path}")]
    AbsolutePath { path: String },

    #[error("Artifact path escapes the store root: {path}")]
    PathEscape { path: String },

    #[error("Artifact I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ArtifactError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type ArtifactResult<T> = Result<T, ArtifactError>;

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a store-relative path to a filesystem path under the root,
    /// without touching the filesystem
    pub fn join(&self, relative: &str) -> ArtifactResult<PathBuf> {
        let normalized = normalize_relative(relative)?;
        Ok(self.root.join(normalized))
    }

    /// Like [`join`](Self::join), but also rejects paths whose existing
    /// prefix resolves (through symlinks) to somewhere outside the root
    pub async fn resolve(&self, relative: &str) -> ArtifactResult<PathBuf> {
        let path = self.join(relative)?;
        self.check_contained(relative, &path).await?;
        Ok(path)
    }

    async fn check_contained(&self, relative: &str, path: &Path) -> ArtifactResult<()> {
        let root = match fs::canonicalize(&self.root).await {
            Ok(root) => root,
            // Nothing exists under a missing root, so nothing can be linked
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(ArtifactError::io(&self.root, e)),
        };

        let escape = || ArtifactError::PathEscape {
            path: relative.to_string(),
        };
        for ancestor in path.ancestors() {
            if fs::symlink_metadata(ancestor).await.is_err() {
                continue;
            }
            // A dangling link cannot be resolved, and writing through it
            // would create its target
            let real = fs::canonicalize(ancestor).await.map_err(|_| escape())?;
            return if real.starts_with(&root) {
                Ok(())
            } else {
                Err(escape())
            };
        }
        Ok(())
    }

    pub async fn exists(&self, relative: &str) -> ArtifactResult<bool> {
        let path = self.resolve(relative).await?;
        Ok(fs::try_exists(&path).await.unwrap_or(false) && path.is_file())
    }

    /// Write a text artifact, creating parent directories as needed
    pub async fn write_text(&self, relative: &str, contents: &str) -> ArtifactResult<PathBuf> {
        let path = self.resolve(relative).await?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ArtifactError::io(parent, e))?;
        }
        fs::write(&path, contents)
            .await
            .map_err(|e| ArtifactError::io(&path, e))?;
        Ok(path)
    }

    pub async fn read_text(&self, relative: &str) -> ArtifactResult<String> {
        let path = self.resolve(relative).await?;
        fs::read_to_string(&path)
            .await
            .map_err(|e| ArtifactError::io(&path, e))
    }

    /// Create a directory (and parents) inside the store
    pub async fn ensure_dir(&self, relative: &str) -> ArtifactResult<PathBuf> {
        let path = self.resolve(relative).await?;
        fs::create_dir_all(&path)
            .await
            .map_err(|e| ArtifactError::io(&path, e))?;
        Ok(path)
    }

    /// Express a filesystem path under the root as a store-relative path
    pub fn relativize(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.root)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }
}

/// Lexically normalise `relative`, refusing anything that is absolute or
/// climbs above its starting point
fn normalize_relative(relative: &str) -> ArtifactResult<PathBuf> {
    let path = Path::new(relative);
    let mut normalized = PathBuf::new();
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                return Err(ArtifactError::AbsolutePath {
                    path: relative.to_string(),
                })
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(ArtifactError::PathEscape {
                        path: relative.to_string(),
                    });
                }
                normalized.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                normalized.push(part);
                depth += 1;
            }
        }
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_are_normalized() {
        let store = ArtifactStore::new("/data/objects");
        assert_eq!(
            store.join("ligands/./abc/../abc/conf_0.pdb").unwrap(),
            PathBuf::from("/data/objects/ligands/abc/conf_0.pdb")
        );
    }

    #[test]
    fn test_escapes_are_rejected() {
        let store = ArtifactStore::new("/data/objects");
        assert!(matches!(
            store.join("../etc/passwd"),
            Err(ArtifactError::PathEscape { .. })
        ));
        assert!(matches!(
            store.join("logs/../../secret"),
            Err(ArtifactError::PathEscape { .. })
        ));
        assert!(matches!(
            store.join("/etc/passwd"),
            Err(ArtifactError::AbsolutePath { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let written = store.write_text("logs/t1.txt", "line one\n").await.unwrap();
        assert!(written.starts_with(dir.path()));
        assert!(store.exists("logs/t1.txt").await.unwrap());
        assert!(!store.exists("logs/t2.txt").await.unwrap());
        assert_eq!(store.read_text("logs/t1.txt").await.unwrap(), "line one\n");
        assert_eq!(store.relativize(&written).as_deref(), Some("logs/t1.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_root_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), "TOP SECRET").unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();
        let store = ArtifactStore::new(root.path());

        assert!(matches!(
            store.read_text("link/secret").await,
            Err(ArtifactError::PathEscape { .. })
        ));
        assert!(matches!(
            store.write_text("link/planted", "x").await,
            Err(ArtifactError::PathEscape { .. })
        ));
        assert!(!outside.path().join("planted").exists());

        // Dangling links are refused as well
        std::os::unix::fs::symlink(outside.path().join("missing"), root.path().join("dangling"))
            .unwrap();
        assert!(matches!(
            store.write_text("dangling", "x").await,
            Err(ArtifactError::PathEscape { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_inside_root_is_allowed() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("real")).unwrap();
        std::fs::write(root.path().join("real/data.txt"), "ok").unwrap();
        std::os::unix::fs::symlink(root.path().join("real"), root.path().join("alias")).unwrap();
        let store = ArtifactStore::new(root.path());

        assert_eq!(store.read_text("alias/data.txt").await.unwrap(), "ok");
    }
}
