mod header;
mod pack;
mod unpack;
mod verify;

use std::path::Path;

use anyhow::Result;
use injectkit_core::ArchiveCodec;

pub use pack::pack_archive;
pub use unpack::unpack_archive;
pub use verify::{verify_archive, ArchiveSummary};

/// Electron ASAR archives: a pickle-framed JSON header followed by file data.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsarCodec;

impl ArchiveCodec for AsarCodec {
    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        unpack_archive(archive_path, dest_dir)
    }

    fn pack(&self, src_dir: &Path, archive_path: &Path) -> Result<()> {
        pack_archive(src_dir, archive_path).map(|_| ())
    }
}

pub(crate) fn unpacked_sidecar_dir(archive_path: &Path) -> std::path::PathBuf {
    let mut name = archive_path
        .file_name()
        .map(|value| value.to_os_string())
        .unwrap_or_default();
    name.push(".unpacked");
    archive_path.with_file_name(name)
}

#[cfg(test)]
mod tests;
