//! Use cases: installing a runner, preparing its environment and supervising
//! it once started.
//!
//! Services are generic over the traits in [`crate::application::ports`];
//! the concrete adapters live in `crate::infra` and are chosen by
//! `crate::commands`.

pub mod env_prepare;
pub mod install;
pub mod runtime;

use std::path::Path;

/// Whether `path` is itself a symlink; the check `domain::archive::reject_linked` runs per component.
pub(crate) fn is_link(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}
