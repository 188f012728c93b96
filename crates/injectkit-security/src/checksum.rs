use std::io::Read;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn sha256_hex_reader<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 64 * 1024];
    loop {
        let read = reader
            .read(&mut buffer)
            .context("failed reading input for sha256")?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn verify_sha256_reader<R: Read>(reader: &mut R, expected_hex: &str) -> Result<bool> {
    let actual = sha256_hex_reader(reader)?;
    Ok(actual.eq_ignore_ascii_case(expected_hex.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn sha256_hex_of_empty_input() {
        assert_eq!(sha256_hex(b""), EMPTY_SHA256);
    }

    #[test]
    fn sha256_reader_matches_slice_digest() {
        let data = vec![7_u8; 200_000];
        let from_reader =
            sha256_hex_reader(&mut data.as_slice()).expect("hashing must complete");
        assert_eq!(from_reader, sha256_hex(&data));
    }

    #[test]
    fn verify_sha256_reader_accepts_uppercase_expected() {
        let verified = verify_sha256_reader(&mut b"".as_slice(), &EMPTY_SHA256.to_uppercase())
            .expect("verification must complete");
        assert!(verified);
    }

    #[test]
    fn verify_sha256_reader_rejects_mismatch() {
        let verified = verify_sha256_reader(&mut b"tampered".as_slice(), EMPTY_SHA256)
            .expect("verification must complete");
        assert!(!verified);
    }
}
