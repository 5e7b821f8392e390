//! Disposable working directories for engine runs.
//!
//! [`materialize`] extracts an [`AssetBundle`] into a freshly created,
//! uniquely named directory. The returned [`Sandbox`] owns that directory and
//! removes it when dropped, so callers clean up on every exit path simply by
//! letting it go out of scope.

use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs::Permissions;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use uuid::Uuid;

use crate::assets::{AssetBundle, AssetKind};

/// Mode applied to the sandbox root and every bundled directory.
pub const DIR_MODE: u32 = 0o700;
/// Mode applied to scripts, engine binaries, and platform binaries.
pub const EXECUTABLE_MODE: u32 = 0o755;
/// Mode applied to every other bundled file.
pub const FILE_MODE: u32 = 0o644;

/// Directory names that hold platform-specific provider binaries.
const PLATFORM_BINARY_DIRS: &[&str] = &[
    "linux_amd64",
    "linux_arm64",
    "darwin_amd64",
    "darwin_arm64",
    "windows_amd64",
];

/// Raised when a bundle cannot be materialised.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("failed to extract {path}: {message}")]
pub struct ExtractionError {
    /// Path that could not be created or written.
    pub path: Utf8PathBuf,
    /// Operating system error string.
    pub message: String,
}

impl ExtractionError {
    fn new(path: impl Into<Utf8PathBuf>, err: &std::io::Error) -> Self {
        Self {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Exclusive working directory removed on drop.
#[derive(Debug)]
pub struct Sandbox {
    parent: Utf8PathBuf,
    name: String,
    root: Utf8PathBuf,
    engine_root: Utf8PathBuf,
}

impl Sandbox {
    /// Directory the engine should run in.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.engine_root
    }

    /// Top-level sandbox directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Opens a capability handle on the engine directory.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError`] when the directory cannot be opened.
    pub fn open(&self) -> Result<Dir, ExtractionError> {
        Dir::open_ambient_dir(&self.engine_root, ambient_authority())
            .map_err(|err| ExtractionError::new(&self.engine_root, &err))
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        let removed = Dir::open_ambient_dir(&self.parent, ambient_authority())
            .and_then(|parent| parent.remove_dir_all(&self.name));
        match removed {
            Ok(()) => tracing::debug!(path = %self.root, "removed sandbox"),
            Err(err) => tracing::warn!(path = %self.root, error = %err, "failed to remove sandbox"),
        }
    }
}

/// Extracts `bundle` into a new sandbox below `temp_root`.
///
/// Materialisation is all-or-nothing: on failure the partially written
/// sandbox is removed before the error is returned.
///
/// # Errors
///
/// Returns [`ExtractionError`] when any directory or file cannot be created.
pub fn materialize(bundle: &AssetBundle, temp_root: &Utf8Path) -> Result<Sandbox, ExtractionError> {
    let name = format!("{}-{}", bundle.name(), Uuid::new_v4().simple());
    let root = temp_root.join(&name);
    let parent = Dir::open_ambient_dir(temp_root, ambient_authority())
        .map_err(|err| ExtractionError::new(temp_root, &err))?;

    // `create_dir` fails if the name exists, so the sandbox is never shared.
    parent
        .create_dir(&name)
        .map_err(|err| ExtractionError::new(&root, &err))?;
    let engine_root = bundle
        .engine_root()
        .map_or_else(|| root.clone(), |sub| root.join(sub));
    let sandbox = Sandbox {
        parent: temp_root.to_path_buf(),
        name,
        root,
        engine_root,
    };

    set_mode(&parent, &sandbox.name, &sandbox.root, DIR_MODE)?;
    let dir = parent
        .open_dir(&sandbox.name)
        .map_err(|err| ExtractionError::new(&sandbox.root, &err))?;

    for entry in bundle.entries() {
        let target = sandbox.root.join(entry.path);
        match entry.kind {
            AssetKind::Dir => {
                dir.create_dir_all(entry.path)
                    .map_err(|err| ExtractionError::new(&target, &err))?;
                set_mode(&dir, entry.path, &target, DIR_MODE)?;
            }
            AssetKind::File(contents) => {
                dir.write(entry.path, contents)
                    .map_err(|err| ExtractionError::new(&target, &err))?;
                let mode = file_mode(entry.path, bundle.engine_binary());
                set_mode(&dir, entry.path, &target, mode)?;
            }
        }
    }

    tracing::debug!(
        bundle = bundle.name(),
        path = %sandbox.root,
        entries = bundle.entries().len(),
        "materialised sandbox"
    );
    Ok(sandbox)
}

/// Chooses the permission bits for a bundled file.
#[must_use]
pub fn file_mode(path: &str, engine_binary: Option<&str>) -> u32 {
    let candidate = Utf8Path::new(path);
    let is_script = candidate.extension() == Some("sh");
    let is_engine = engine_binary.is_some_and(|binary| candidate.file_name() == Some(binary));
    let in_platform_dir = candidate
        .parent()
        .and_then(Utf8Path::file_name)
        .is_some_and(|parent| PLATFORM_BINARY_DIRS.contains(&parent));

    if is_script || is_engine || in_platform_dir {
        EXECUTABLE_MODE
    } else {
        FILE_MODE
    }
}

/// Writes `contents` into `dir` and applies `mode`.
pub(crate) fn write_with_mode(
    dir: &Dir,
    name: &str,
    display: &Utf8Path,
    contents: &[u8],
    mode: u32,
) -> Result<(), ExtractionError> {
    dir.write(name, contents)
        .map_err(|err| ExtractionError::new(display, &err))?;
    set_mode(dir, name, display, mode)
}

fn set_mode(dir: &Dir, name: &str, display: &Utf8Path, mode: u32) -> Result<(), ExtractionError> {
    let permissions = Permissions::from_std(std::fs::Permissions::from_mode(mode));
    dir.set_permissions(name, permissions)
        .map_err(|err| ExtractionError::new(display, &err))
}
