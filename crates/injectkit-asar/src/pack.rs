use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use injectkit_security::{sha256_hex, sha256_hex_reader};
use tracing::debug;

use crate::header::{
    encode_header, FileEntry, FileIntegrity, HeaderNode, INTEGRITY_ALGORITHM,
    INTEGRITY_BLOCK_SIZE,
};
use crate::verify::{verify_archive, ArchiveSummary};

/// Builds an archive from `src_dir` next to `archive_path`, verifies it, and
/// only then moves it over the existing archive.
pub fn pack_archive(src_dir: &Path, archive_path: &Path) -> Result<ArchiveSummary> {
    let mut planner = PackPlanner {
        src_root: fs::canonicalize(src_dir)
            .with_context(|| format!("failed to resolve {}", src_dir.display()))?,
        data_files: Vec::new(),
        next_offset: 0,
    };
    let files = planner.plan_dir(src_dir)?;
    let header = encode_header(&files)?;

    let part_path = part_path_for(archive_path);
    if let Err(err) = write_archive(&part_path, &header, &planner.data_files) {
        let _ = fs::remove_file(&part_path);
        return Err(err);
    }

    let summary = match verify_archive(&part_path) {
        Ok(summary) => summary,
        Err(err) => {
            let _ = fs::remove_file(&part_path);
            return Err(err).with_context(|| {
                format!("packed archive failed verification: {}", part_path.display())
            });
        }
    };

    fs::rename(&part_path, archive_path).with_context(|| {
        format!("failed to move packed archive into place: {}", archive_path.display())
    })?;
    debug!(
        archive = %archive_path.display(),
        files = summary.file_count,
        data_bytes = summary.data_bytes,
        "packed archive"
    );
    Ok(summary)
}

fn part_path_for(archive_path: &Path) -> PathBuf {
    archive_path.with_file_name(format!(
        "{}.part",
        archive_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("archive")
    ))
}

struct PackPlanner {
    src_root: PathBuf,
    data_files: Vec<PathBuf>,
    next_offset: u64,
}

impl PackPlanner {
    fn plan_dir(&mut self, dir: &Path) -> Result<BTreeMap<String, HeaderNode>> {
        let mut entries = fs::read_dir(dir)
            .with_context(|| format!("failed to read directory: {}", dir.display()))?
            .collect::<io::Result<Vec<_>>>()
            .with_context(|| format!("failed to list directory: {}", dir.display()))?;
        entries.sort_by_key(|entry| entry.file_name());

        let mut files = BTreeMap::new();
        for entry in entries {
            let path = entry.path();
            let name = entry.file_name().into_string().map_err(|raw| {
                anyhow!("file name is not valid UTF-8: {}", Path::new(&raw).display())
            })?;
            let metadata = fs::symlink_metadata(&path)
                .with_context(|| format!("failed to read metadata: {}", path.display()))?;

            let node = if metadata.file_type().is_symlink() {
                HeaderNode::Link {
                    link: self.link_target(&path)?,
                }
            } else if metadata.is_dir() {
                HeaderNode::Directory {
                    files: self.plan_dir(&path)?,
                }
            } else {
                HeaderNode::File(self.plan_file(&path, &metadata)?)
            };
            files.insert(name, node);
        }
        Ok(files)
    }

    fn plan_file(&mut self, path: &Path, metadata: &fs::Metadata) -> Result<FileEntry> {
        let size = metadata.len();
        let entry = FileEntry {
            size,
            offset: Some(self.next_offset.to_string()),
            unpacked: false,
            executable: is_executable(metadata),
            integrity: Some(file_integrity(path)?),
        };
        self.next_offset += size;
        self.data_files.push(path.to_path_buf());
        Ok(entry)
    }

    fn link_target(&self, path: &Path) -> Result<String> {
        let resolved = fs::canonicalize(path)
            .with_context(|| format!("failed to resolve symlink: {}", path.display()))?;
        let relative = resolved.strip_prefix(&self.src_root).map_err(|_| {
            anyhow!("symlink {} points outside the packed directory", path.display())
        })?;
        relative
            .to_str()
            .map(|value| value.replace('\\', "/"))
            .ok_or_else(|| anyhow!("symlink target is not valid UTF-8: {}", path.display()))
    }
}

fn file_integrity(path: &Path) -> Result<FileIntegrity> {
    let open = || File::open(path).with_context(|| format!("failed to open {}", path.display()));

    let hash = sha256_hex_reader(&mut open()?)
        .with_context(|| format!("failed hashing {}", path.display()))?;

    let mut blocks = Vec::new();
    let mut reader = open()?;
    let mut block = Vec::with_capacity(INTEGRITY_BLOCK_SIZE as usize);
    loop {
        block.clear();
        (&mut reader)
            .take(INTEGRITY_BLOCK_SIZE)
            .read_to_end(&mut block)
            .with_context(|| format!("failed reading {}", path.display()))?;
        if block.is_empty() {
            break;
        }
        blocks.push(sha256_hex(&block));
    }

    Ok(FileIntegrity {
        algorithm: INTEGRITY_ALGORITHM.to_string(),
        hash,
        block_size: INTEGRITY_BLOCK_SIZE,
        blocks,
    })
}

fn write_archive(part_path: &Path, header: &[u8], data_files: &[PathBuf]) -> Result<()> {
    let file = File::create(part_path)
        .with_context(|| format!("failed to create {}", part_path.display()))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(header)
        .with_context(|| format!("failed writing archive header: {}", part_path.display()))?;
    for data_file in data_files {
        let mut source = File::open(data_file)
            .with_context(|| format!("failed to open {}", data_file.display()))?;
        io::copy(&mut source, &mut writer).with_context(|| {
            format!("failed copying {} into {}", data_file.display(), part_path.display())
        })?;
    }
    writer
        .flush()
        .with_context(|| format!("failed flushing {}", part_path.display()))?;
    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o100 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}
