use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Content address of a source image: SHA-256 over (identifier, version
/// stamp, byte size), rendered as 64 lowercase hex characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash an identifier, a modification stamp and a byte size.
    pub fn new(source: &str, modified: &str, byte_size: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update([0u8]);
        hasher.update(modified.as_bytes());
        hasher.update([0u8]);
        hasher.update(byte_size.to_le_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Fingerprint a file on disk from its path, mtime and size.
    ///
    /// A rewritten file gets a new fingerprint, so stale entries are never
    /// looked up again.
    pub fn for_file(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let modified = meta.modified()?;
        let stamp = match modified.duration_since(UNIX_EPOCH) {
            Ok(d) => format!("{}.{:09}", d.as_secs(), d.subsec_nanos()),
            Err(e) => format!("-{}", e.duration().as_nanos()),
        };
        Ok(Self::new(&path.to_string_lossy(), &stamp, meta.len()))
    }

    /// Fingerprint an in-memory image; the content digest stands in for the
    /// modification time.
    pub fn for_bytes(reference: &str, data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self::new(reference, &format!("sha256:{digest:x}"), data.len() as u64)
    }

    /// Parse a stored fingerprint. Only 64-char lowercase hex is accepted,
    /// which also makes the value safe to use as a file name.
    pub fn parse(s: &str) -> Option<Self> {
        let ok = s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        ok.then(|| Self(s.to_owned()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
