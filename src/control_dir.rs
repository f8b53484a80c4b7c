//! Control-channel directory preparation.
//!
//! The tunnel's control socket lives in a directory shared with the SSH
//! client by convention. Before any billable resource is created the
//! directory must exist and be readable by the owner only, since the socket
//! grants control over the authenticated channel.

use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs::MetadataExt;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Owner-only mode required on the control directory.
const OWNER_ONLY_MODE: u32 = 0o700;

/// Errors raised while preparing the control directory.
#[derive(Debug, Error)]
pub enum ControlDirError {
    /// Raised when the directory cannot be created.
    #[error("failed to create control directory {path}: {message}")]
    Create {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the directory cannot be inspected.
    #[error("failed to inspect control directory {path}: {message}")]
    Inspect {
        /// Directory that could not be inspected.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the path exists but is not a directory.
    #[error("control directory path {path} is not a directory")]
    NotADirectory {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// Raised when owner-only permissions cannot be applied.
    #[error("failed to restrict permissions on {path}: {message}")]
    Restrict {
        /// Directory whose permissions could not be changed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the path has no parent to anchor directory handles.
    #[error("control directory path {path} has no parent directory")]
    NoParent {
        /// Offending path.
        path: Utf8PathBuf,
    },
}

/// Ensures `path` exists as a directory with mode 0700.
///
/// Creates the directory (and any missing parents) when absent and tightens
/// permissions when the existing mode grants group or other access.
///
/// # Errors
///
/// Returns [`ControlDirError`] when the directory cannot be created,
/// inspected, or restricted to owner-only access.
pub fn prepare(path: &Utf8Path) -> Result<(), ControlDirError> {
    let (parent, name) = split(path)?;
    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| {
        ControlDirError::Create {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    })?;

    let handle =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| {
            ControlDirError::Inspect {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        })?;

    match handle.metadata(name) {
        Ok(metadata) if metadata.is_dir() => {
            if metadata.mode() & 0o777 != OWNER_ONLY_MODE {
                restrict(&handle, name, path)?;
            }
            Ok(())
        }
        Ok(_) => Err(ControlDirError::NotADirectory {
            path: path.to_path_buf(),
        }),
        Err(_) => {
            handle.create_dir(name).map_err(|err| ControlDirError::Create {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
            restrict(&handle, name, path)
        }
    }
}

fn restrict(handle: &Dir, name: &str, path: &Utf8Path) -> Result<(), ControlDirError> {
    let permissions =
        cap_std::fs::Permissions::from_std(std::fs::Permissions::from_mode(OWNER_ONLY_MODE));
    handle
        .set_permissions(name, permissions)
        .map_err(|err| ControlDirError::Restrict {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

fn split(path: &Utf8Path) -> Result<(&Utf8Path, &str), ControlDirError> {
    let parent = path.parent().ok_or_else(|| ControlDirError::NoParent {
        path: path.to_path_buf(),
    })?;
    let name = path.file_name().ok_or_else(|| ControlDirError::NoParent {
        path: path.to_path_buf(),
    })?;
    Ok((parent, name))
}
