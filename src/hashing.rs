//! Content hashing for dedup.
//!
//! Raw datasets are deduplicated by the SHA-256 of their payload bytes
//! (little-endian f64, row-major), model files by a streaming SHA-256 of the
//! file contents.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use ndarray::ArrayD;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// SHA-256 of an array's raw sample bytes, as lowercase hex.
///
/// Equal arrays always hash equal regardless of in-memory layout: elements
/// are consumed in logical (row-major) order.
pub fn array_content_hash(data: &ArrayD<f64>) -> String {
    let mut hasher = Sha256::new();
    for &v in data.iter() {
        hasher.update(v.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Streaming SHA-256 of a file, as lowercase hex.
pub fn file_content_hash<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
