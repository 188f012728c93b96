use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::header::{read_header, validate_entry_name, validate_link_target, FileEntry, HeaderNode};
use crate::unpacked_sidecar_dir;

/// Extracts every entry under `dest_dir`, overwriting files already there.
pub fn unpack_archive(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open archive: {}", archive_path.display()))?;
    let mut reader = BufReader::new(file);
    let header = read_header(&mut reader)
        .with_context(|| format!("failed to read archive header: {}", archive_path.display()))?;

    fs::create_dir_all(dest_dir)
        .with_context(|| format!("failed to create {}", dest_dir.display()))?;

    let mut extractor = Extractor {
        reader,
        data_offset: header.data_offset,
        dest_root: dest_dir.to_path_buf(),
        sidecar_root: unpacked_sidecar_dir(archive_path),
        extracted_files: 0,
    };
    extractor.extract_dir(&header.files, Path::new(""))?;
    debug!(
        archive = %archive_path.display(),
        dest = %dest_dir.display(),
        files = extractor.extracted_files,
        "unpacked archive"
    );
    Ok(())
}

struct Extractor<R> {
    reader: R,
    data_offset: u64,
    dest_root: PathBuf,
    sidecar_root: PathBuf,
    extracted_files: usize,
}

impl<R: Read + Seek> Extractor<R> {
    fn extract_dir(&mut self, files: &BTreeMap<String, HeaderNode>, rel_dir: &Path) -> Result<()> {
        for (name, node) in files {
            validate_entry_name(name)?;
            let rel_path = rel_dir.join(name);
            let out_path = self.dest_root.join(&rel_path);

            match node {
                HeaderNode::Directory { files } => {
                    fs::create_dir_all(&out_path)
                        .with_context(|| format!("failed to create {}", out_path.display()))?;
                    self.extract_dir(files, &rel_path)?;
                }
                HeaderNode::Link { link } => {
                    validate_link_target(link)?;
                    create_link(&self.dest_root.join(link), &out_path)?;
                }
                HeaderNode::File(entry) => {
                    self.extract_file(entry, &rel_path, &out_path)?;
                    self.extracted_files += 1;
                }
            }
        }
        Ok(())
    }

    fn extract_file(&mut self, entry: &FileEntry, rel_path: &Path, out_path: &Path) -> Result<()> {
        if entry.unpacked {
            let sidecar_path = self.sidecar_root.join(rel_path);
            fs::copy(&sidecar_path, out_path).with_context(|| {
                format!(
                    "failed to copy unpacked entry {} to {}",
                    sidecar_path.display(),
                    out_path.display()
                )
            })?;
        } else {
            let entry_name = rel_path.display().to_string();
            let start = self
                .data_offset
                .checked_add(entry.data_offset(&entry_name)?)
                .ok_or_else(|| anyhow!("archive entry '{entry_name}' offset overflows"))?;
            self.reader
                .seek(SeekFrom::Start(start))
                .with_context(|| format!("failed to seek to archive entry '{entry_name}'"))?;

            let mut out = File::create(out_path)
                .with_context(|| format!("failed to create {}", out_path.display()))?;
            let copied = io::copy(&mut (&mut self.reader).take(entry.size), &mut out)
                .with_context(|| format!("failed to write {}", out_path.display()))?;
            if copied != entry.size {
                return Err(anyhow!(
                    "archive entry '{entry_name}' is truncated: expected {} bytes, got {copied}",
                    entry.size
                ));
            }
        }

        if entry.executable {
            mark_executable(out_path)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)
        .with_context(|| format!("failed to read metadata: {}", path.display()))?
        .permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    fs::set_permissions(path, permissions)
        .with_context(|| format!("failed to set permissions: {}", path.display()))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_link(target: &Path, link_path: &Path) -> Result<()> {
    if fs::symlink_metadata(link_path).is_ok() {
        fs::remove_file(link_path)
            .with_context(|| format!("failed to replace existing link: {}", link_path.display()))?;
    }
    std::os::unix::fs::symlink(target, link_path).with_context(|| {
        format!("failed to create symlink {} -> {}", link_path.display(), target.display())
    })
}

#[cfg(not(unix))]
fn create_link(target: &Path, link_path: &Path) -> Result<()> {
    tracing::warn!(
        link = %link_path.display(),
        target = %target.display(),
        "skipping archive symlink on this platform"
    );
    Ok(())
}
