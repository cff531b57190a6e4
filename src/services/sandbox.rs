//! Confines every filesystem path beneath a single storage root.
//!
//! Callers hand in sandbox-relative paths; nothing touches the disk without
//! going through [`PathSandbox::resolve`] first.

use crate::services::error::{StoreError, StoreResult};
use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};

#[derive(Clone, Debug)]
pub struct PathSandbox {
    /// Canonical storage root.
    root: PathBuf,
}

impl PathSandbox {
    /// Create the root if needed and pin it in canonical form.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `relative` against the root.
    ///
    /// Absolute paths and any `..` segment fail with `PathEscape`, however
    /// the segments are mixed. The nearest existing ancestor is canonicalized
    /// and must still sit under the root, which stops symlinks pointing out.
    /// The empty path resolves to the root itself.
    pub fn resolve(&self, relative: &str) -> StoreResult<PathBuf> {
        if relative.contains('\0') {
            return Err(StoreError::invalid_path(relative, "contains NUL byte"));
        }
        if relative.starts_with('/') || relative.starts_with('\\') {
            return Err(StoreError::PathEscape(relative.to_string()));
        }

        let mut cleaned = PathBuf::new();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => cleaned.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StoreError::PathEscape(relative.to_string()));
                }
            }
        }
        // Windows-style separators never reach `components()` on unix.
        if relative.split(['/', '\\']).any(|segment| segment == "..") {
            return Err(StoreError::PathEscape(relative.to_string()));
        }

        let joined = self.root.join(&cleaned);
        self.verify_within_root(relative, &joined)?;
        Ok(joined)
    }

    /// Canonicalize the deepest existing ancestor of `joined` (itself
    /// included) and check it stays under the root.
    fn verify_within_root(&self, relative: &str, joined: &Path) -> StoreResult<()> {
        let mut probe = Some(joined);
        while let Some(candidate) = probe {
            match fs::symlink_metadata(candidate) {
                Ok(meta) => {
                    let canonical = match candidate.canonicalize() {
                        Ok(canonical) => canonical,
                        // Dangling symlink: its target is unknowable, refuse it.
                        Err(_) if meta.file_type().is_symlink() => {
                            return Err(StoreError::PathEscape(relative.to_string()));
                        }
                        Err(err) => return Err(StoreError::Io(err)),
                    };
                    if !canonical.starts_with(&self.root) {
                        return Err(StoreError::PathEscape(relative.to_string()));
                    }
                    return Ok(());
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    probe = candidate.parent();
                }
                Err(err) => return Err(StoreError::Io(err)),
            }
        }
        Err(StoreError::PathEscape(relative.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_nested_paths_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = PathSandbox::new(dir.path()).unwrap();

        let resolved = sandbox.resolve("a/./b/file.txt").unwrap();
        assert_eq!(resolved, sandbox.root().join("a/b/file.txt"));
        assert_eq!(sandbox.resolve("").unwrap(), sandbox.root());
    }

    #[test]
    fn rejects_parent_segments_and_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = PathSandbox::new(dir.path()).unwrap();

        for attempt in [
            "../../etc/passwd",
            "..",
            "a/../b",
            "a/b/../../..",
            "./../x",
            "a/./../../.",
            "/etc/passwd",
            "/",
            "\\windows\\system32",
            "a\\..\\..\\b",
        ] {
            assert!(
                matches!(sandbox.resolve(attempt), Err(StoreError::PathEscape(_))),
                "expected escape for {attempt}"
            );
        }
    }

    #[test]
    fn rejects_nul_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = PathSandbox::new(dir.path()).unwrap();
        assert!(matches!(
            sandbox.resolve("a\0b"),
            Err(StoreError::InvalidPath { .. })
        ));
    }

    #[test]
    #[cfg(unix)]
    fn rejects_symlink_pointing_outside() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let sandbox = PathSandbox::new(dir.path()).unwrap();
        symlink(outside.path(), sandbox.root().join("link")).unwrap();

        assert!(matches!(
            sandbox.resolve("link/secret.txt"),
            Err(StoreError::PathEscape(_))
        ));
        assert!(matches!(
            sandbox.resolve("link/new/deeper.txt"),
            Err(StoreError::PathEscape(_))
        ));
    }
}
