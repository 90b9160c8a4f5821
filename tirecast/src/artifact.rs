//! Versioned, checksummed, compressed envelope for persisted artifacts.
//!
//! Every file the engine writes (session segments, per-car models, the
//! pattern snapshot, synthesized training samples) uses the same layout:
//!
//! ```text
//! ┌───────┬──────┬─────────┬─────────────┬──────────────┬──────────────────────┐
//! │ magic │ kind │ version │ payload len │ SHA-256      │ gzip(bincode(value)) │
//! │ 4 B   │ 1 B  │ u16 LE  │ u64 LE      │ 32 B         │ payload len bytes    │
//! └───────┴──────┴─────────┴─────────────┴──────────────┴──────────────────────┘
//! ```
//!
//! Writes go to a temporary sibling and are renamed into place, so a reader
//! never sees a half-written artifact. Loads verify the header and checksum
//! before decoding; callers treat any [`ArtifactError::is_corrupt`] error as
//! "skip and log", never as fatal.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// File magic for all artifacts.
pub const MAGIC: [u8; 4] = *b"TCAF";

/// Current envelope format version.
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 1 + 2 + 8 + 32;

/// What an artifact contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    SessionSegment,
    CarModel,
    Patterns,
    SyntheticSamples,
}

impl ArtifactKind {
    fn to_byte(self) -> u8 {
        match self {
            ArtifactKind::SessionSegment => 1,
            ArtifactKind::CarModel => 2,
            ArtifactKind::Patterns => 3,
            ArtifactKind::SyntheticSamples => 4,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(ArtifactKind::SessionSegment),
            2 => Some(ArtifactKind::CarModel),
            3 => Some(ArtifactKind::Patterns),
            4 => Some(ArtifactKind::SyntheticSamples),
            _ => None,
        }
    }

    /// File extension used for this kind.
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::SessionSegment => "tsr",
            ArtifactKind::CarModel => "tpm",
            ArtifactKind::Patterns => "tpa",
            ArtifactKind::SyntheticSamples => "tsy",
        }
    }
}

/// Errors reading or writing an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt artifact {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("checksum mismatch in {path}")]
    ChecksumMismatch { path: PathBuf },

    #[error("unsupported artifact version {found} in {path} (expected {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        found: u16,
        expected: u16,
    },

    #[error("expected {expected:?} artifact in {path}, found {found:?}")]
    WrongKind {
        path: PathBuf,
        expected: ArtifactKind,
        found: ArtifactKind,
    },

    #[error("failed to encode artifact: {0}")]
    Encode(String),
}

impl ArtifactError {
    /// Whether the file itself is unusable (as opposed to an I/O failure).
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            ArtifactError::Corrupt { .. }
                | ArtifactError::ChecksumMismatch { .. }
                | ArtifactError::UnsupportedVersion { .. }
                | ArtifactError::WrongKind { .. }
        )
    }

    fn io(path: &Path, source: io::Error) -> Self {
        ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        ArtifactError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Encode a value into a complete artifact byte buffer.
pub fn encode<T: Serialize>(kind: ArtifactKind, value: &T) -> Result<Vec<u8>, ArtifactError> {
    let raw = bincode::serialize(value).map_err(|e| ArtifactError::Encode(e.to_string()))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&raw)
        .map_err(|e| ArtifactError::Encode(e.to_string()))?;
    let payload = encoder
        .finish()
        .map_err(|e| ArtifactError::Encode(e.to_string()))?;

    let checksum = Sha256::digest(&payload);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC);
    out.push(kind.to_byte());
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&checksum);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Verify and decode an artifact buffer read from `path`.
pub fn decode<T: DeserializeOwned>(
    expected: ArtifactKind,
    bytes: &[u8],
    path: &Path,
) -> Result<T, ArtifactError> {
    if bytes.len() < HEADER_LEN {
        return Err(ArtifactError::corrupt(path, "truncated header"));
    }
    if bytes[0..4] != MAGIC {
        return Err(ArtifactError::corrupt(path, "bad magic"));
    }

    let found = ArtifactKind::from_byte(bytes[4])
        .ok_or_else(|| ArtifactError::corrupt(path, format!("unknown kind {}", bytes[4])))?;
    if found != expected {
        return Err(ArtifactError::WrongKind {
            path: path.to_path_buf(),
            expected,
            found,
        });
    }

    let version = u16::from_le_bytes([bytes[5], bytes[6]]);
    if version != FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: version,
            expected: FORMAT_VERSION,
        });
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[7..15]);
    let payload_len = u64::from_le_bytes(len_bytes);
    let payload = &bytes[HEADER_LEN..];
    if payload.len() as u64 != payload_len {
        return Err(ArtifactError::corrupt(
            path,
            format!(
                "payload length {} does not match header {}",
                payload.len(),
                payload_len
            ),
        ));
    }

    if Sha256::digest(payload).as_slice() != &bytes[15..HEADER_LEN] {
        return Err(ArtifactError::ChecksumMismatch {
            path: path.to_path_buf(),
        });
    }

    let mut raw = Vec::new();
    GzDecoder::new(payload)
        .read_to_end(&mut raw)
        .map_err(|e| ArtifactError::corrupt(path, format!("decompression failed: {}", e)))?;

    bincode::deserialize(&raw)
        .map_err(|e| ArtifactError::corrupt(path, format!("decode failed: {}", e)))
}

/// Write an artifact atomically. Returns the number of bytes written.
pub fn write_artifact<T: Serialize>(
    path: &Path,
    kind: ArtifactKind,
    value: &T,
) -> Result<u64, ArtifactError> {
    let bytes = encode(kind, value)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
    }

    // Write to temp file first, then rename for atomicity
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, &bytes).map_err(|e| ArtifactError::io(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| ArtifactError::io(path, e))?;

    Ok(bytes.len() as u64)
}

/// Read and verify an artifact.
pub fn read_artifact<T: DeserializeOwned>(
    path: &Path,
    kind: ArtifactKind,
) -> Result<T, ArtifactError> {
    let bytes = fs::read(path).map_err(|e| ArtifactError::io(path, e))?;
    decode(kind, &bytes, path)
}
