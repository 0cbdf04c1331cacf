//! On-disk array payloads, one file per record.
//!
//! Payloads are `{shape, data}` MessagePack documents compressed with LZ4
//! and named `<record-id>.arr`. The catalog row and the payload file
//! together form one record; the store owns both.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{EegError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct ArrayPayload {
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// Directory of payload files addressed by record id.
#[derive(Debug)]
pub struct PayloadStore {
    dir: PathBuf,
}

impl PayloadStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.arr"))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.path_for(id).exists()
    }

    pub fn write(&self, id: &str, data: &ArrayD<f64>) -> Result<()> {
        let payload = ArrayPayload {
            shape: data.shape().to_vec(),
            data: data.iter().copied().collect(),
        };
        let encoded = rmp_serde::to_vec_named(&payload)?;
        let compressed = lz4_flex::compress_prepend_size(&encoded);
        fs::write(self.path_for(id), compressed)?;
        Ok(())
    }

    /// Load a payload; `Ok(None)` when no file exists for the id.
    pub fn read(&self, id: &str) -> Result<Option<ArrayD<f64>>> {
        let path = self.path_for(id);
        let compressed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let encoded = lz4_flex::decompress_size_prepended(&compressed).map_err(|e| {
            EegError::StorageIntegrity(format!("corrupt payload file {}: {e}", path.display()))
        })?;
        let payload: ArrayPayload = rmp_serde::from_slice(&encoded)?;

        let expected: usize = payload.shape.iter().product();
        if expected != payload.data.len() {
            return Err(EegError::StorageIntegrity(format!(
                "payload {} declares shape {:?} but holds {} values",
                path.display(),
                payload.shape,
                payload.data.len()
            )));
        }
        let array = ArrayD::from_shape_vec(IxDyn(&payload.shape), payload.data)
            .map_err(|e| EegError::StorageIntegrity(format!("payload {}: {e}", path.display())))?;
        Ok(Some(array))
    }

    /// Remove a payload file; returns whether a file was present.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn write_read_round_trip_2d() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PayloadStore::new(dir.path()).unwrap();
        let data = Array2::from_shape_fn((4, 100), |(c, t)| c as f64 * 0.5 - t as f64).into_dyn();

        store.write("rec-1", &data).unwrap();
        let loaded = store.read("rec-1").unwrap().expect("payload present");
        assert_eq!(loaded, data);
    }

    #[test]
    fn write_read_round_trip_3d() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PayloadStore::new(dir.path()).unwrap();
        let data = Array3::from_shape_fn((2, 5, 32), |(c, e, t)| (c + e + t) as f64).into_dyn();

        store.write("rec-2", &data).unwrap();
        let loaded = store.read("rec-2").unwrap().expect("payload present");
        assert_eq!(loaded.shape(), &[2, 5, 32]);
        assert_eq!(loaded, data);
    }

    #[test]
    fn missing_payload_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PayloadStore::new(dir.path()).unwrap();
        assert!(store.read("nope").unwrap().is_none());
    }

    #[test]
    fn remove_reports_presence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PayloadStore::new(dir.path()).unwrap();
        let data = Array2::<f64>::zeros((1, 8)).into_dyn();
        store.write("rec-3", &data).unwrap();

        assert!(store.remove("rec-3").unwrap());
        assert!(!store.remove("rec-3").unwrap());
        assert!(store.read("rec-3").unwrap().is_none());
    }

    #[test]
    fn truncated_file_is_an_integrity_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PayloadStore::new(dir.path()).unwrap();
        std::fs::write(store.path_for("bad"), b"\xff\xff\xff").expect("write junk");
        assert!(matches!(
            store.read("bad"),
            Err(EegError::StorageIntegrity(_))
        ));
    }
}
