//! Access to the kernel's pseudo-filesystems (`/sys`, `/proc`) under a configurable root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, TopologyError};

/// Environment variable overriding the directory `/sys` and `/proc` are resolved under.
pub const ROOT_ENV: &str = "EFIDISK_ROOT";

/// Root directory that absolute pseudo-filesystem paths are resolved against.
///
/// On a live system this is `/`. Tests point it at a synthetic tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsRoot {
    root: PathBuf,
}

impl SysfsRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The running system's own `/sys` and `/proc`.
    pub fn host() -> Self {
        Self::new("/")
    }

    /// Reads [`ROOT_ENV`], falling back to [`SysfsRoot::host`] when it is unset or empty.
    pub fn from_env() -> Self {
        match std::env::var_os(ROOT_ENV) {
            Some(root) if !root.is_empty() => Self::new(root),
            _ => Self::host(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an absolute kernel path such as `/sys/class/block` onto this root.
    pub fn path(&self, abs: &str) -> PathBuf {
        self.root.join(abs.trim_start_matches('/'))
    }

    /// Literal target text of a symlink, not the resolved filesystem path.
    pub fn read_link(&self, abs: &str) -> Result<String> {
        let target = fs::read_link(self.path(abs))
            .map_err(|e| TopologyError::io(format!("readlink {abs}"), e))?;
        target
            .into_os_string()
            .into_string()
            .map_err(|_| TopologyError::malformed(abs, "link target is not valid UTF-8"))
    }

    /// Contents of a small text attribute.
    pub fn read_attr(&self, abs: &str) -> io::Result<String> {
        fs::read_to_string(self.path(abs))
    }

    /// Entry names of a directory in sorted order. Non UTF-8 names are converted lossily.
    pub fn read_dir_names(&self, abs: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.path(abs))? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

impl Default for SysfsRoot {
    fn default() -> Self {
        Self::host()
    }
}
