//! JSON sidecar manifest: per-tensor SHA-256 digests plus whole-file metadata,
//! written next to the `.qmf` file as `<name>.manifest.json`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorDigest {
    pub name: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub container_sha256: String,
    pub tensors: Vec<TensorDigest>,
    pub metadata: serde_json::Value,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

impl Manifest {
    pub fn write_to_path(&self, path: &std::path::Path) -> EngineResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read_from_path(path: &std::path::Path) -> EngineResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            EngineError::ContainerCorrupt(format!("missing sidecar manifest: {e}"))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Verify `container_bytes` hashes to `self.container_sha256`.
    pub fn verify_container(&self, container_bytes: &[u8]) -> EngineResult<()> {
        let actual = sha256_hex(container_bytes);
        if actual != self.container_sha256 {
            return Err(EngineError::ContainerCorrupt(format!(
                "manifest container hash mismatch: expected {}, got {actual}",
                self.container_sha256
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_stable_and_deterministic() {
        let a = sha256_hex(b"hello world");
        let b = sha256_hex(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn verify_container_rejects_tampered_bytes() {
        let digest = sha256_hex(b"original");
        let manifest = Manifest {
            container_sha256: digest,
            tensors: vec![],
            metadata: serde_json::json!({}),
        };
        assert!(manifest.verify_container(b"original").is_ok());
        assert!(manifest.verify_container(b"tampered").is_err());
    }
}
