//! Host to sandbox path translation.

use std::path::{Path, PathBuf};

/// Maps host paths into the directory the sandbox mounts the workspace at.
///
/// Relative paths are workspace-relative on both sides: [`PathMapper::to_host`]
/// places them under the host root and [`PathMapper::to_container`] under the
/// mount point. Absolute paths under the host root keep their relative
/// suffix; anything outside the root is passed through unchanged.
#[derive(Debug, Clone)]
pub struct PathMapper {
    host_root: PathBuf,
    container_root: PathBuf,
}

impl PathMapper {
    pub fn new(host_root: impl Into<PathBuf>, container_root: impl Into<PathBuf>) -> Self {
        Self {
            host_root: resolve(&host_root.into()),
            container_root: container_root.into(),
        }
    }

    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    pub fn container_root(&self) -> &Path {
        &self.container_root
    }

    /// Host location of a workspace-relative path.
    pub fn to_host(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            self.host_root.join(path)
        } else {
            path.to_path_buf()
        }
    }

    /// Whether the sandbox can see `path` through the workspace mount.
    pub fn contains(&self, path: &Path) -> bool {
        path.is_relative() || resolve(path).starts_with(&self.host_root)
    }

    pub fn to_container(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            return self.container_root.join(path);
        }
        let resolved = resolve(path);
        match resolved.strip_prefix(&self.host_root) {
            Ok(relative) => self.container_root.join(relative),
            Err(_) => path.to_path_buf(),
        }
    }

    pub fn to_container_string(&self, path: &Path) -> String {
        self.to_container(path).to_string_lossy().into_owned()
    }
}

/// Follow symlinks so prefixes compare on real locations. Files that do not
/// exist yet (build outputs) resolve through their parent directory.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(real) = path.canonicalize() {
        return real;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(real_parent) => real_parent.join(name),
            Err(_) => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}
