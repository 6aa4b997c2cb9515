// BLOB version prefix helpers. [version: u8][payload].

use crate::error::{PanelError, Result};
use crate::models::BackupManifest;

pub(super) const MANIFEST_VERSION: u8 = 1;

fn with_version_prefix(version: u8, payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(version);
    out.extend_from_slice(&payload);
    out
}

pub(super) fn encode_manifest(manifest: &BackupManifest) -> Result<Vec<u8>> {
    let payload = wincode::serialize(manifest)
        .map_err(|e| PanelError::Internal(anyhow::anyhow!("wincode manifest: {}", e)))?;
    Ok(with_version_prefix(MANIFEST_VERSION, payload))
}

pub(super) fn decode_manifest(bytes: &[u8]) -> Result<BackupManifest> {
    match bytes.split_first() {
        Some((&MANIFEST_VERSION, payload)) => wincode::deserialize(payload).map_err(|e| {
            PanelError::Internal(anyhow::anyhow!("wincode deserialize manifest: {}", e))
        }),
        Some((version, _)) => Err(PanelError::Internal(anyhow::anyhow!(
            "unsupported manifest blob version {}",
            version
        ))),
        None => Ok(BackupManifest::default()),
    }
}
