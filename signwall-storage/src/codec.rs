//! Blob encoding for values kept in the key-value store.
//!
//! Everything is JSON. Artifact bytes travel as base64 inside the envelope so
//! content type and generation time survive alongside the image.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use signwall_core::{Artifact, CodecError, Timestamp};

pub fn encode<T: Serialize>(what: &str, value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|e| CodecError::Encode {
        what: what.to_string(),
        reason: e.to_string(),
    })
}

pub fn decode<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
        what: what.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Serialize, Deserialize)]
struct StoredArtifact {
    content_type: String,
    generated_at: Timestamp,
    image: String,
}

pub fn encode_artifact(artifact: &Artifact) -> Result<Vec<u8>, CodecError> {
    encode(
        "artifact",
        &StoredArtifact {
            content_type: artifact.content_type.clone(),
            generated_at: artifact.generated_at,
            image: STANDARD.encode(&artifact.bytes),
        },
    )
}

pub fn decode_artifact(bytes: &[u8]) -> Result<Artifact, CodecError> {
    let stored: StoredArtifact = decode("artifact", bytes)?;
    let image = STANDARD
        .decode(stored.image.as_bytes())
        .map_err(|e| CodecError::Decode {
            what: "artifact".to_string(),
            reason: e.to_string(),
        })?;
    Ok(Artifact {
        bytes: image,
        content_type: stored.content_type,
        generated_at: stored.generated_at,
    })
}
