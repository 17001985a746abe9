//! Content fingerprints for dedup and upload verification

use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Computes an opaque content fingerprint for a local file
pub trait Fingerprinter: Send + Sync {
    /// `None` when the file cannot be fingerprinted (missing, unreadable or empty)
    fn fingerprint(&self, path: &Path) -> Option<String>;
}

/// Hash a file using Blake3, streaming so large videos never sit in memory
pub fn hash_file_streaming(path: &Path) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let metadata = file.metadata()?;

    if metadata.len() == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "file is empty",
        ));
    }

    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();

    std::io::copy(&mut reader, &mut hasher)?;

    Ok(hasher.finalize().to_hex().to_string())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Fingerprinter;

impl Fingerprinter for Blake3Fingerprinter {
    fn fingerprint(&self, path: &Path) -> Option<String> {
        match hash_file_streaming(path) {
            Ok(hash) => Some(hash),
            Err(e) => {
                debug!("no fingerprint for {:?}: {}", path, e);
                None
            }
        }
    }
}
