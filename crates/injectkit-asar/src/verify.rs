use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use injectkit_security::verify_sha256_reader;

use crate::header::{read_header, HeaderNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub file_count: usize,
    pub data_bytes: u64,
}

/// Re-reads an archive and checks that every stored entry lies inside the
/// file and, when recorded, matches its integrity hash.
pub fn verify_archive(archive_path: &Path) -> Result<ArchiveSummary> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open archive: {}", archive_path.display()))?;
    let archive_len = file
        .metadata()
        .with_context(|| format!("failed to read metadata: {}", archive_path.display()))?
        .len();
    let mut reader = BufReader::new(file);
    let header = read_header(&mut reader)
        .with_context(|| format!("failed to read archive header: {}", archive_path.display()))?;

    let mut summary = ArchiveSummary {
        file_count: 0,
        data_bytes: 0,
    };
    verify_dir(
        &mut reader,
        header.data_offset,
        archive_len,
        &header.files,
        "",
        &mut summary,
    )?;
    Ok(summary)
}

fn verify_dir<R: Read + Seek>(
    reader: &mut R,
    data_offset: u64,
    archive_len: u64,
    files: &BTreeMap<String, HeaderNode>,
    prefix: &str,
    summary: &mut ArchiveSummary,
) -> Result<()> {
    for (name, node) in files {
        let entry_path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };

        match node {
            HeaderNode::Directory { files } => {
                verify_dir(reader, data_offset, archive_len, files, &entry_path, summary)?;
            }
            HeaderNode::Link { .. } => {}
            HeaderNode::File(entry) => {
                summary.file_count += 1;
                if entry.unpacked {
                    continue;
                }

                let start = data_offset
                    .checked_add(entry.data_offset(&entry_path)?)
                    .ok_or_else(|| anyhow!("archive entry '{entry_path}' offset overflows"))?;
                let end = start
                    .checked_add(entry.size)
                    .ok_or_else(|| anyhow!("archive entry '{entry_path}' size overflows"))?;
                if end > archive_len {
                    return Err(anyhow!(
                        "archive entry '{entry_path}' extends past end of archive ({end} > {archive_len})"
                    ));
                }
                summary.data_bytes += entry.size;

                let Some(integrity) = &entry.integrity else {
                    continue;
                };
                reader
                    .seek(SeekFrom::Start(start))
                    .with_context(|| format!("failed to seek to archive entry '{entry_path}'"))?;
                let mut entry_reader = (&mut *reader).take(entry.size);
                let matches = verify_sha256_reader(&mut entry_reader, &integrity.hash)
                    .with_context(|| format!("failed hashing archive entry '{entry_path}'"))?;
                if !matches {
                    return Err(anyhow!(
                        "archive entry '{entry_path}' does not match its integrity hash"
                    ));
                }
            }
        }
    }
    Ok(())
}
