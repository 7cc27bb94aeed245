pub mod embed;
pub mod extract;
pub mod hook;

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use thiserror::Error;

use crate::config::{ConfigError, StegoConfig};
use crate::crypto::CryptoError;
use crate::integrity;
use crate::packet::{FieldKind, PacketError};
use crate::secret::{SecretImage, SecretImageError};
use extract::IntegrityStatus;
use hook::PipelineHook;

/// Failures of the embedding and extraction engines.
#[derive(Error, Debug)]
pub enum StegoError {
    #[error(
        "carrier exhausted after {frames} frame(s): embedded {embedded_bits} of {total_bits} payload bits"
    )]
    InsufficientCapacity {
        embedded_bits: usize,
        total_bits: usize,
        frames: u64,
    },
    #[error("stream ended after {frames} frame(s) while reading {field:?}: need {need} bits, have {have}")]
    TruncatedStream {
        field: Option<FieldKind>,
        need: usize,
        have: usize,
        frames: u64,
    },
    #[error("authentication failed: wrong key or corrupted payload")]
    AuthenticationFailed,
    #[error("SHA3-256 of the decrypted image does not match the embedded hash")]
    IntegrityMismatch,
    #[error("embedded ephemeral public key is not a valid P-256 point")]
    InvalidPoint,
    #[error("header declares an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },
    #[error("header declares {width}x{height} ({expected} pixels) but carries {got} bytes")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected: usize,
        got: usize,
    },
    #[error("frame size {got:?} differs from the first frame {expected:?}")]
    FrameSizeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("engine already finished")]
    EngineFinished,
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Crypto(CryptoError),
    #[error(transparent)]
    Image(SecretImageError),
    #[error("frame I/O: {0}")]
    Io(#[from] io::Error),
}

impl From<CryptoError> for StegoError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthenticationFailed => StegoError::AuthenticationFailed,
            CryptoError::InvalidPoint => StegoError::InvalidPoint,
            other => StegoError::Crypto(other),
        }
    }
}

impl From<SecretImageError> for StegoError {
    fn from(err: SecretImageError) -> Self {
        match err {
            SecretImageError::DimensionMismatch {
                width,
                height,
                expected,
                got,
            } => StegoError::DimensionMismatch {
                width,
                height,
                expected,
                got,
            },
            other => StegoError::Image(other),
        }
    }
}

/// Result of a full embed → hook → extract roundtrip.
pub struct RoundtripResult {
    /// SHA3-256 hex digest of the secret image pixels.
    pub original_hash: String,
    /// SHA3-256 hex digest of the recovered image pixels.
    pub recovered_hash: String,
    /// Outcome of the embedded-hash check during extraction.
    pub integrity: IntegrityStatus,
    pub matched: bool,
}

/// Run a full embed → hook → extract roundtrip.
///
/// Steps:
/// 1. Hashes the luminance pixels of `secret`.
/// 2. Embeds `secret` into `carrier` → `stego_path` for the holder of `private_key`.
/// 3. Calls `hook.after_embed(stego_path)`.
/// 4. Extracts from the path returned by the hook → `output`.
/// 5. Hashes the recovered pixels and compares with the original.
///
/// # Example
///
/// ```rust,no_run
/// use std::path::Path;
/// use qimsteg::{roundtrip, NoopHook, StegoConfig};
///
/// let result = roundtrip(
///     Path::new("carrier.mp4"),
///     Path::new("secret.png"),
///     Path::new("stego.mkv"),
///     Path::new("recovered.png"),
///     Path::new("bob_public_key.pem"),
///     Path::new("bob_private_key.pem"),
///     &StegoConfig::default(),
///     &NoopHook,
/// ).unwrap();
///
/// assert!(result.matched, "{} != {}", result.original_hash, result.recovered_hash);
/// ```
#[allow(clippy::too_many_arguments)]
pub fn roundtrip<H: PipelineHook>(
    carrier: &Path,
    secret: &Path,
    stego_path: &Path,
    output: &Path,
    public_key: &Path,
    private_key: &Path,
    cfg: &StegoConfig,
    hook: &H,
) -> Result<RoundtripResult> {
    let original = SecretImage::load(secret).context("failed to load secret image")?;
    let original_hash = integrity::to_hex(&integrity::sha3_256(original.pixels()));

    embed::embed_file(carrier, secret, stego_path, public_key, cfg)?;

    let extract_from = hook.after_embed(stego_path)?;
    let extracted = extract::extract_file(&extract_from, output, private_key, cfg)?;

    let recovered_hash = integrity::to_hex(&integrity::sha3_256(extracted.image.pixels()));
    let matched = original_hash == recovered_hash;
    info!(
        "roundtrip {}: {} vs {}",
        if matched { "matched" } else { "MISMATCH" },
        original_hash,
        recovered_hash
    );

    Ok(RoundtripResult {
        original_hash,
        recovered_hash,
        integrity: extracted.integrity,
        matched,
    })
}
