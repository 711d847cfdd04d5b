//! Layer archive scanning.

use crate::error::RegistryError;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::io::{self, Read};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A regular file pulled out of a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Archive path with any leading `./` or `/` removed.
    pub name: String,
    pub contents: Vec<u8>,
}

/// Checks a `sha256:<hex>` digest. Other algorithms are not verified.
pub fn verify_digest(expected: &str, blob: &[u8]) -> Result<(), RegistryError> {
    let Some(expected_hex) = expected.strip_prefix("sha256:") else {
        return Ok(());
    };
    let actual = hex::encode(Sha256::digest(blob));
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(RegistryError::DigestMismatch {
            expected: expected.to_string(),
            actual: format!("sha256:{actual}"),
        })
    }
}

fn open(blob: &[u8]) -> Box<dyn Read + '_> {
    if blob.starts_with(&GZIP_MAGIC) {
        Box::new(GzDecoder::new(blob))
    } else {
        Box::new(blob)
    }
}

pub(crate) fn entry_name(raw: &str) -> &str {
    let mut name = raw;
    loop {
        let trimmed = name.trim_start_matches("./").trim_start_matches('/');
        if trimmed.len() == name.len() {
            return name;
        }
        name = trimmed;
    }
}

/// Returns the first regular file whose name is one of `candidates`.
///
/// `Ok(None)` means a readable archive without a match. An `Err` means the
/// blob is not a (gzipped) tar archive.
pub fn find_file(blob: &[u8], candidates: &[String]) -> io::Result<Option<ExtractedFile>> {
    let mut archive = tar::Archive::new(open(blob));
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = {
            let path = entry.path()?;
            entry_name(&path.to_string_lossy()).to_string()
        };
        if !candidates.iter().any(|c| *c == name) {
            continue;
        }
        // The header size is untrusted; never pre-allocate from it.
        let declared = entry.size();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        if contents.len() as u64 != declared {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "entry {name} declares {declared} bytes but holds {}",
                    contents.len()
                ),
            ));
        }
        return Ok(Some(ExtractedFile { name, contents }));
    }
    Ok(None)
}
