//! Moving downloaded resources to their destination

use std::io;
use std::path::Path;

use crate::{Error, Result};

/// Moves a transport-provided temporary file to its final destination
pub trait FileRelocator: Send + Sync {
    /// Atomically replace whatever is at `to` with the file at `from`.
    ///
    /// Failures are reported as [`Error::Relocation`].
    fn relocate(&self, from: &Path, to: &Path) -> Result<()>;
}

/// Filesystem relocator.
///
/// Renames in place when `from` and `to` share a filesystem; otherwise the
/// file is copied into a temporary sibling of `to` and persisted over it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsRelocator;

impl FileRelocator for FsRelocator {
    fn relocate(&self, from: &Path, to: &Path) -> Result<()> {
        let relocation_error = |source: io::Error| Error::Relocation {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        };

        let parent = match to.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(relocation_error)?;

        match std::fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(rename_error) => {
                tracing::debug!(
                    "Rename {:?} -> {:?} failed ({}), copying instead",
                    from,
                    to,
                    rename_error
                );
                if std::fs::metadata(from).is_err() {
                    return Err(relocation_error(rename_error));
                }
                let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(relocation_error)?;
                let mut source = std::fs::File::open(from).map_err(relocation_error)?;
                io::copy(&mut source, staged.as_file_mut()).map_err(relocation_error)?;
                staged
                    .persist(to)
                    .map_err(|persist_error| relocation_error(persist_error.error))?;
                Ok(())
            }
        }
    }
}
