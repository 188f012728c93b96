use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

pub(crate) const INTEGRITY_ALGORITHM: &str = "SHA256";
pub(crate) const INTEGRITY_BLOCK_SIZE: u64 = 4 * 1024 * 1024;
const SIZE_PICKLE_PAYLOAD: u32 = 4;
const MAX_HEADER_BYTES: u32 = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum HeaderNode {
    Directory { files: BTreeMap<String, HeaderNode> },
    Link { link: String },
    File(FileEntry),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct FileEntry {
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unpacked: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub executable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<FileIntegrity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileIntegrity {
    pub algorithm: String,
    pub hash: String,
    pub block_size: u64,
    pub blocks: Vec<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl FileEntry {
    pub(crate) fn data_offset(&self, entry_path: &str) -> Result<u64> {
        let raw = self
            .offset
            .as_deref()
            .ok_or_else(|| anyhow!("archive entry '{entry_path}' has no data offset"))?;
        raw.parse::<u64>()
            .with_context(|| format!("archive entry '{entry_path}' has invalid offset '{raw}'"))
    }
}

#[derive(Debug)]
pub(crate) struct ArchiveHeader {
    pub files: BTreeMap<String, HeaderNode>,
    /// Absolute file position where entry offsets start counting.
    pub data_offset: u64,
}

pub(crate) fn read_header<R: Read>(reader: &mut R) -> Result<ArchiveHeader> {
    let mut size_pickle = [0_u8; 8];
    reader
        .read_exact(&mut size_pickle)
        .context("archive is too short to contain a header")?;
    let size_payload = read_u32(&size_pickle, 0);
    if size_payload != SIZE_PICKLE_PAYLOAD {
        return Err(anyhow!("archive header size pickle is malformed (payload={size_payload})"));
    }
    let header_size = read_u32(&size_pickle, 4);
    if !(8..=MAX_HEADER_BYTES).contains(&header_size) {
        return Err(anyhow!("archive header size {header_size} is out of range"));
    }

    let mut header_pickle = vec![0_u8; header_size as usize];
    reader
        .read_exact(&mut header_pickle)
        .context("archive header is truncated")?;
    let json_len = read_u32(&header_pickle, 4) as usize;
    let json_end = 8_usize
        .checked_add(json_len)
        .filter(|end| *end <= header_pickle.len())
        .ok_or_else(|| anyhow!("archive header string length {json_len} exceeds header"))?;
    let json = std::str::from_utf8(&header_pickle[8..json_end])
        .context("archive header is not UTF-8")?;

    let root: HeaderNode = serde_json::from_str(json).context("failed parsing archive header")?;
    let HeaderNode::Directory { files } = root else {
        return Err(anyhow!("archive header root is not a directory"));
    };

    Ok(ArchiveHeader {
        files,
        data_offset: 8 + u64::from(header_size),
    })
}

pub(crate) fn encode_header(files: &BTreeMap<String, HeaderNode>) -> Result<Vec<u8>> {
    let root = HeaderNode::Directory {
        files: files.clone(),
    };
    let json = serde_json::to_string(&root).context("failed serializing archive header")?;
    let json_len = u32::try_from(json.len()).context("archive header is too large")?;
    let padded_len = (json.len() + 3) & !3;
    let header_payload = 4 + padded_len as u32;
    let header_size = 4 + header_payload;

    let mut encoded = Vec::with_capacity(8 + header_size as usize);
    encoded.extend_from_slice(&SIZE_PICKLE_PAYLOAD.to_le_bytes());
    encoded.extend_from_slice(&header_size.to_le_bytes());
    encoded.extend_from_slice(&header_payload.to_le_bytes());
    encoded.extend_from_slice(&json_len.to_le_bytes());
    encoded.extend_from_slice(json.as_bytes());
    encoded.resize(8 + header_size as usize, 0);
    Ok(encoded)
}

pub(crate) fn validate_entry_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none();
    if !single_normal || name.contains('/') || name.contains('\\') {
        return Err(anyhow!("archive entry name '{name}' is not a plain file name"));
    }
    Ok(())
}

pub(crate) fn validate_link_target(link: &str) -> Result<()> {
    let escapes = link.is_empty()
        || Path::new(link)
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
    if escapes {
        return Err(anyhow!("archive link '{link}' points outside the archive"));
    }
    Ok(())
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
