use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use injectkit_core::ArchiveCodec;
use injectkit_security::sha256_hex;

use super::*;
use crate::header::{encode_header, read_header, FileEntry, HeaderNode};

#[test]
fn pack_then_unpack_restores_tree() {
    let root = test_root();
    let src = seed_client_tree(&root);
    let archive = root.join("core.asar");
    let out = root.join("out");

    let summary = pack_archive(&src, &archive).expect("must pack");
    assert_eq!(summary.file_count, 4);
    unpack_archive(&archive, &out).expect("must unpack");

    assert_eq!(
        fs::read_to_string(out.join("app").join("mainScreen.js")).expect("must read target"),
        "let mainWindow = null;\n"
    );
    assert_eq!(
        fs::read(out.join("app").join("images").join("icon.bin")).expect("must read binary"),
        vec![0_u8, 159, 146, 150, 255]
    );
    assert_eq!(
        fs::read_to_string(out.join("package.json")).expect("must read manifest"),
        "{\"name\":\"core\"}"
    );
    assert!(fs::read(out.join("empty.txt")).expect("must read empty").is_empty());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn pack_records_string_offsets_and_integrity() {
    let root = test_root();
    let src = seed_client_tree(&root);
    let archive = root.join("core.asar");
    pack_archive(&src, &archive).expect("must pack");

    let mut reader = fs::File::open(&archive).expect("must open archive");
    let header = read_header(&mut reader).expect("must read header");
    let Some(HeaderNode::Directory { files: app }) = header.files.get("app") else {
        panic!("app must be a directory");
    };
    let Some(HeaderNode::File(main_screen)) = app.get("mainScreen.js") else {
        panic!("mainScreen.js must be a file");
    };

    assert_eq!(main_screen.size, 23);
    assert!(main_screen.offset.is_some());
    let integrity = main_screen
        .integrity
        .as_ref()
        .expect("must record integrity");
    assert_eq!(integrity.algorithm, "SHA256");
    assert_eq!(integrity.hash, sha256_hex(b"let mainWindow = null;\n"));
    assert_eq!(integrity.blocks, vec![integrity.hash.clone()]);

    let raw = fs::read(&archive).expect("must read archive bytes");
    let header_json = String::from_utf8_lossy(&raw[16..]);
    assert!(header_json.contains("\"offset\":\""));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn pack_replaces_existing_archive_and_removes_part_file() {
    let root = test_root();
    let src = seed_client_tree(&root);
    let archive = root.join("core.asar");
    fs::write(&archive, b"stale archive bytes").expect("must seed stale archive");

    pack_archive(&src, &archive).expect("must pack");

    verify_archive(&archive).expect("replaced archive must verify");
    assert!(!root.join("core.asar.part").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn pack_failure_leaves_original_archive_untouched() {
    let root = test_root();
    let archive = root.join("core.asar");
    fs::create_dir_all(&root).expect("must create root");
    fs::write(&archive, b"original").expect("must seed archive");

    let err = pack_archive(&root.join("missing-dir"), &archive).expect_err("must fail");
    assert!(err.to_string().contains("missing-dir"));
    assert_eq!(fs::read(&archive).expect("must read archive"), b"original");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn verify_detects_corrupted_entry_data() {
    let root = test_root();
    let src = seed_client_tree(&root);
    let archive = root.join("core.asar");
    pack_archive(&src, &archive).expect("must pack");

    let mut raw = fs::read(&archive).expect("must read archive");
    let last = raw.len() - 1;
    raw[last] ^= 0xff;
    fs::write(&archive, &raw).expect("must corrupt archive");

    let err = verify_archive(&archive).expect_err("must detect corruption");
    assert!(
        err.to_string().contains("integrity hash"),
        "unexpected error: {err}"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn verify_detects_truncated_archive() {
    let root = test_root();
    let src = seed_client_tree(&root);
    let archive = root.join("core.asar");
    pack_archive(&src, &archive).expect("must pack");

    let raw = fs::read(&archive).expect("must read archive");
    fs::write(&archive, &raw[..raw.len() - 3]).expect("must truncate archive");

    let err = verify_archive(&archive).expect_err("must detect truncation");
    assert!(
        err.to_string().contains("extends past end"),
        "unexpected error: {err}"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn read_header_rejects_non_archive_input() {
    let err = read_header(&mut b"definitely not an archive".as_slice())
        .expect_err("must reject garbage");
    assert!(err.to_string().contains("malformed") || err.to_string().contains("out of range"));

    let err = read_header(&mut b"\x04\x00".as_slice()).expect_err("must reject short input");
    assert!(err.to_string().contains("too short"));
}

#[test]
fn unpack_rejects_entry_names_that_escape_destination() {
    let root = test_root();
    fs::create_dir_all(&root).expect("must create root");
    let archive = root.join("evil.asar");

    let mut files = BTreeMap::new();
    files.insert("..".to_string(), HeaderNode::File(stored_entry(4, 0)));
    write_raw_archive(&archive, &files, b"evil");

    let err = unpack_archive(&archive, &root.join("out")).expect_err("must reject traversal");
    assert!(
        format!("{err:#}").contains("not a plain file name"),
        "unexpected error: {err:#}"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn entry_offset_past_u64_range_is_an_error() {
    let root = test_root();
    fs::create_dir_all(&root).expect("must create root");
    let archive = root.join("huge.asar");

    let mut files = BTreeMap::new();
    files.insert("a.js".to_string(), HeaderNode::File(stored_entry(1, u64::MAX)));
    write_raw_archive(&archive, &files, b"x");

    let err = unpack_archive(&archive, &root.join("out")).expect_err("must reject offset");
    assert!(
        format!("{err:#}").contains("offset overflows"),
        "unexpected error: {err:#}"
    );
    let err = verify_archive(&archive).expect_err("must reject offset");
    assert!(
        format!("{err:#}").contains("offset overflows"),
        "unexpected error: {err:#}"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn unpack_copies_entries_stored_beside_the_archive() {
    let root = test_root();
    let sidecar = root.join("core.asar.unpacked").join("native");
    fs::create_dir_all(&sidecar).expect("must create sidecar");
    fs::write(sidecar.join("addon.node"), b"native-bytes").expect("must seed sidecar");

    let mut native = BTreeMap::new();
    native.insert(
        "addon.node".to_string(),
        HeaderNode::File(FileEntry {
            size: 12,
            offset: None,
            unpacked: true,
            executable: false,
            integrity: None,
        }),
    );
    let mut files = BTreeMap::new();
    files.insert("native".to_string(), HeaderNode::Directory { files: native });
    files.insert("index.js".to_string(), HeaderNode::File(stored_entry(5, 0)));
    let archive = root.join("core.asar");
    write_raw_archive(&archive, &files, b"boot;");

    let out = root.join("out");
    unpack_archive(&archive, &out).expect("must unpack");
    assert_eq!(
        fs::read(out.join("native").join("addon.node")).expect("must read sidecar copy"),
        b"native-bytes"
    );
    assert_eq!(
        fs::read_to_string(out.join("index.js")).expect("must read stored entry"),
        "boot;"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn unpack_overwrites_previously_extracted_files() {
    let root = test_root();
    let src = seed_client_tree(&root);
    let archive = root.join("core.asar");
    AsarCodec.pack(&src, &archive).expect("must pack");

    let out = root.join("out");
    fs::create_dir_all(out.join("app")).expect("must create stale dir");
    fs::write(
        out.join("app").join("mainScreen.js"),
        "stale content that is much longer than the archived file\n",
    )
    .expect("must seed stale file");

    AsarCodec.unpack(&archive, &out).expect("must unpack");
    assert_eq!(
        fs::read_to_string(out.join("app").join("mainScreen.js")).expect("must read target"),
        "let mainWindow = null;\n"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn unpacked_sidecar_dir_appends_suffix() {
    assert_eq!(
        unpacked_sidecar_dir(Path::new("/opt/app/core.asar")),
        Path::new("/opt/app/core.asar.unpacked")
    );
}

#[cfg(unix)]
#[test]
fn executable_bit_and_symlinks_survive_pack_and_unpack() {
    use std::os::unix::fs::PermissionsExt;

    let root = test_root();
    let src = seed_client_tree(&root);
    let tool = src.join("tool.sh");
    fs::write(&tool, "#!/bin/sh\n").expect("must write tool");
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).expect("must chmod");
    std::os::unix::fs::symlink(src.join("package.json"), src.join("manifest.json"))
        .expect("must create symlink");

    let archive = root.join("core.asar");
    pack_archive(&src, &archive).expect("must pack");
    let out = root.join("out");
    unpack_archive(&archive, &out).expect("must unpack");

    let mode = fs::metadata(out.join("tool.sh"))
        .expect("must stat tool")
        .permissions()
        .mode();
    assert_ne!(mode & 0o100, 0);
    assert!(fs::symlink_metadata(out.join("manifest.json"))
        .expect("must stat link")
        .file_type()
        .is_symlink());
    assert_eq!(
        fs::read_to_string(out.join("manifest.json")).expect("must follow link"),
        "{\"name\":\"core\"}"
    );

    let _ = fs::remove_dir_all(&root);
}

fn stored_entry(size: u64, offset: u64) -> FileEntry {
    FileEntry {
        size,
        offset: Some(offset.to_string()),
        unpacked: false,
        executable: false,
        integrity: None,
    }
}

fn write_raw_archive(path: &Path, files: &BTreeMap<String, HeaderNode>, data: &[u8]) {
    let mut raw = encode_header(files).expect("must encode header");
    raw.extend_from_slice(data);
    fs::write(path, raw).expect("must write archive");
}

fn seed_client_tree(root: &Path) -> PathBuf {
    let src = root.join("src");
    fs::create_dir_all(src.join("app").join("images")).expect("must create tree");
    fs::write(
        src.join("app").join("mainScreen.js"),
        "let mainWindow = null;\n",
    )
    .expect("must write target");
    fs::write(
        src.join("app").join("images").join("icon.bin"),
        [0_u8, 159, 146, 150, 255],
    )
    .expect("must write binary");
    fs::write(src.join("package.json"), "{\"name\":\"core\"}").expect("must write manifest");
    fs::write(src.join("empty.txt"), "").expect("must write empty file");
    src
}

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let counter = TEST_ROOT_COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "injectkit-asar-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        counter
    ))
}
