use thiserror::Error;

// QIM parameters
pub const BLOCK_SIZE: usize = 8;
pub const COEFFS_PER_BLOCK: usize = BLOCK_SIZE * BLOCK_SIZE;
/// Index 0 of a flattened block is DC and never carries payload.
pub const MAX_AC_COEFFS: usize = COEFFS_PER_BLOCK - 1;
pub const DEFAULT_DELTA: f64 = 20.0;
pub const DEFAULT_AC_COEFFS: usize = 10;
/// Smallest accepted quantization step. Rounding 64 pixels to integers moves
/// any orthonormal DCT coefficient by at most `sqrt(64 * 0.5^2) = 4`, which
/// stays strictly inside `delta / 2` only when `delta > 8`.
pub const MIN_DELTA: f64 = 8.0;

// Video parameters
pub const DEFAULT_FPS: f64 = 24.0;

// Payload field widths, in bits
pub const DIMENSION_BITS: usize = 16;
pub const SHORT_LEN_BITS: usize = 8;
pub const CIPHERTEXT_LEN_BITS: usize = 32;

// Cryptographic field sizes, in bytes
pub const COMPRESSED_POINT_SIZE: usize = 33;
pub const SALT_SIZE: usize = 16;
pub const HASH_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;
pub const AES_KEY_SIZE: usize = 32;

/// HKDF info string. Part of the wire protocol: senders and receivers must agree byte for byte.
pub const HKDF_INFO: &[u8] = b"kunci aes untuk steganografi video";

/// Header bits preceding the ciphertext when every field has its standard length.
pub const STANDARD_HEADER_BITS: usize = 2 * DIMENSION_BITS
    + 5 * SHORT_LEN_BITS
    + (COMPRESSED_POINT_SIZE + SALT_SIZE + HASH_SIZE + NONCE_SIZE + TAG_SIZE) * 8
    + CIPHERTEXT_LEN_BITS;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("quantization step must be positive and finite, got {0}")]
    InvalidDelta(f64),
    #[error("quantization step {delta} must exceed {min} to survive pixel rounding")]
    DeltaTooSmall { delta: f64, min: f64 },
    #[error("AC coefficients per block must be in 1..={max}, got {got}")]
    InvalidCoefficientCount { got: usize, max: usize },
    #[error("frame {width}x{height} is not a multiple of {block} in both dimensions")]
    FrameNotAligned { width: usize, height: usize, block: usize },
    #[error("frame has no complete {0}x{0} block")]
    EmptyFrame(usize),
    #[error("expected {expected} pixels, got {got}")]
    PixelCountMismatch { expected: usize, got: usize },
}

/// Validated QIM parameters. A value of this type always has
/// `delta > MIN_DELTA` and `1 <= ac_coeffs_per_block <= 63`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QimParameters {
    delta: f64,
    ac_coeffs_per_block: usize,
}

impl QimParameters {
    pub fn new(delta: f64, ac_coeffs_per_block: usize) -> Result<Self, ConfigError> {
        if !(delta.is_finite() && delta > 0.0) {
            return Err(ConfigError::InvalidDelta(delta));
        }
        if delta <= MIN_DELTA {
            return Err(ConfigError::DeltaTooSmall {
                delta,
                min: MIN_DELTA,
            });
        }
        if ac_coeffs_per_block == 0 || ac_coeffs_per_block > MAX_AC_COEFFS {
            return Err(ConfigError::InvalidCoefficientCount {
                got: ac_coeffs_per_block,
                max: MAX_AC_COEFFS,
            });
        }
        Ok(Self {
            delta,
            ac_coeffs_per_block,
        })
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn ac_coeffs_per_block(&self) -> usize {
        self.ac_coeffs_per_block
    }
}

impl Default for QimParameters {
    fn default() -> Self {
        Self {
            delta: DEFAULT_DELTA,
            ac_coeffs_per_block: DEFAULT_AC_COEFFS,
        }
    }
}

/// What the extraction engine does when the SHA3-256 of the decrypted image
/// differs from the hash carried in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrityPolicy {
    /// Log a warning and return the plaintext with its status flagged.
    #[default]
    Warn,
    /// Fail the extraction with `IntegrityMismatch`.
    Reject,
}

/// Compute the number of 8x8 blocks in a frame.
pub fn blocks_per_frame(width: usize, height: usize) -> usize {
    (width / BLOCK_SIZE) * (height / BLOCK_SIZE)
}

/// Compute how many payload bits a single frame can carry.
pub fn frame_capacity_bits(width: usize, height: usize, params: &QimParameters) -> usize {
    blocks_per_frame(width, height) * params.ac_coeffs_per_block()
}

/// Number of frames needed to carry `payload_bits` at the given per-frame capacity.
pub fn frames_required(payload_bits: usize, capacity_bits: usize) -> usize {
    if capacity_bits == 0 {
        return usize::MAX;
    }
    payload_bits.div_ceil(capacity_bits)
}

/// Runtime configuration for an embed/extract operation.
#[derive(Debug, Clone)]
pub struct StegoConfig {
    pub qim: QimParameters,
    pub integrity_policy: IntegrityPolicy,
    /// Frame rate used for the output when the carrier's rate cannot be probed.
    pub fps_fallback: f64,
}

impl Default for StegoConfig {
    fn default() -> Self {
        Self {
            qim: QimParameters::default(),
            integrity_policy: IntegrityPolicy::default(),
            fps_fallback: DEFAULT_FPS,
        }
    }
}
