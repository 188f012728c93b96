use std::path::Path;

use anyhow::Result;

/// Opaque pack/unpack capability for the client's application archive.
pub trait ArchiveCodec {
    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> Result<()>;

    /// Replaces `archive_path` with an archive built from `src_dir`.
    fn pack(&self, src_dir: &Path, archive_path: &Path) -> Result<()>;
}
