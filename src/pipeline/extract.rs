use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use p256::SecretKey;

use crate::config::{IntegrityPolicy, QimParameters, StegoConfig};
use crate::crypto::{self, keys};
use crate::integrity;
use crate::packet::HeaderParser;
use crate::pipeline::StegoError;
use crate::secret::SecretImage;
use crate::video::decoder::{self, FfmpegFrameSource};
use crate::video::frame::Frame;
use crate::video::qim::QimCodec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractState {
    /// Header fields through the ciphertext length are still incomplete.
    Accumulating,
    /// The header completed on the most recent frame.
    HeaderParsed,
    /// Waiting for the rest of the ciphertext.
    CollectingCiphertext,
    Verifying,
    Done,
}

/// Result of comparing the decrypted image against the hash in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityStatus {
    Verified,
    Mismatch,
}

#[derive(Debug, Clone)]
pub struct ExtractedImage {
    pub image: SecretImage,
    pub integrity: IntegrityStatus,
    pub frames_read: u64,
}

/// Reassembles the payload from extracted frame bits and verifies it.
pub struct ExtractEngine {
    codec: QimCodec,
    parser: HeaderParser,
    bits: Vec<bool>,
    state: ExtractState,
    frames_read: u64,
}

impl ExtractEngine {
    pub fn new(params: QimParameters) -> Self {
        Self {
            codec: QimCodec::new(params),
            parser: HeaderParser::new(),
            bits: Vec::new(),
            state: ExtractState::Accumulating,
            frames_read: 0,
        }
    }

    pub fn state(&self) -> ExtractState {
        self.state
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Bits accumulated so far.
    pub fn accumulated_bits(&self) -> usize {
        self.bits.len()
    }

    /// Whether another frame is required before the payload is complete.
    pub fn needs_more_frames(&self) -> bool {
        !self.parser.is_complete()
    }

    /// Extract every bit of `frame`, append it and parse whatever fields became available.
    pub fn push_frame(&mut self, frame: &Frame) -> Result<(), StegoError> {
        if self.state == ExtractState::Done || !self.needs_more_frames() {
            return Err(StegoError::EngineFinished);
        }
        let extracted = self.codec.extract_frame(frame);
        self.frames_read += 1;
        self.bits.extend_from_slice(&extracted);

        let parsed = self.parser.parse_available(&self.bits)?;
        debug!(
            "frame {}: +{} bits ({} total), {} field(s) parsed, cursor {}",
            self.frames_read,
            extracted.len(),
            self.bits.len(),
            parsed,
            self.parser.cursor()
        );

        self.state = match (self.parser.header_complete(), self.state) {
            (false, _) => ExtractState::Accumulating,
            (true, ExtractState::Accumulating) => {
                self.check_header()?;
                ExtractState::HeaderParsed
            }
            (true, _) => ExtractState::CollectingCiphertext,
        };
        Ok(())
    }

    /// Reject a header whose dimensions cannot describe the declared
    /// ciphertext, before any more frames are pulled for it.
    fn check_header(&self) -> Result<(), StegoError> {
        let env = self.parser.envelope();
        let (width, height) = (env.width, env.height);
        let declared = self.parser.declared_ciphertext_len().unwrap_or(0);
        info!(
            "header parsed after {} frame(s): {}x{} image, {} ciphertext bytes",
            self.frames_read, width, height, declared
        );
        if width == 0 || height == 0 {
            return Err(StegoError::EmptyImage { width, height });
        }
        let expected = width as usize * height as usize;
        if declared != expected {
            return Err(StegoError::DimensionMismatch {
                width,
                height,
                expected,
                got: declared,
            });
        }
        Ok(())
    }

    /// Signal that no more frames will be pushed, decrypt and verify.
    pub fn finish(
        &mut self,
        private: &SecretKey,
        policy: IntegrityPolicy,
    ) -> Result<ExtractedImage, StegoError> {
        if self.state == ExtractState::Done {
            return Err(StegoError::EngineFinished);
        }
        if self.needs_more_frames() {
            return Err(self.truncated());
        }
        self.state = ExtractState::Verifying;
        let frames_read = self.frames_read;
        let env = std::mem::take(&mut self.parser)
            .finish()
            .ok_or(StegoError::EngineFinished)?;
        self.bits.clear();
        self.state = ExtractState::Done;

        let plaintext = crypto::open(
            private,
            &env.ephemeral_pubkey,
            &env.salt,
            &env.nonce,
            &env.tag,
            &env.ciphertext,
        )?;

        let integrity = if integrity::verify_sha3(&plaintext, &env.image_hash) {
            IntegrityStatus::Verified
        } else {
            match policy {
                IntegrityPolicy::Reject => return Err(StegoError::IntegrityMismatch),
                IntegrityPolicy::Warn => {
                    warn!(
                        "SHA3-256 mismatch: payload {}, decrypted {}",
                        integrity::to_hex(&env.image_hash),
                        integrity::to_hex(&integrity::sha3_256(&plaintext))
                    );
                    IntegrityStatus::Mismatch
                }
            }
        };

        let image = SecretImage::new(env.width, env.height, plaintext)?;
        info!(
            "extraction complete: {}x{} image from {} frame(s)",
            image.width(),
            image.height(),
            frames_read
        );

        Ok(ExtractedImage {
            image,
            integrity,
            frames_read,
        })
    }

    /// Pull frames only while the payload is incomplete, then verify.
    pub fn run<I>(
        mut self,
        frames: I,
        private: &SecretKey,
        policy: IntegrityPolicy,
    ) -> Result<ExtractedImage, StegoError>
    where
        I: IntoIterator<Item = io::Result<Frame>>,
    {
        let mut frames = frames.into_iter();
        while self.needs_more_frames() {
            match frames.next() {
                Some(frame) => self.push_frame(&frame?)?,
                None => break,
            }
        }
        self.finish(private, policy)
    }

    fn truncated(&self) -> StegoError {
        let (field, need, have) = match self.parser.pending(&self.bits) {
            Some((kind, need, have)) => (Some(kind), need, have),
            None => (None, 0, 0),
        };
        StegoError::TruncatedStream {
            field,
            need,
            have,
            frames: self.frames_read,
        }
    }
}

/// Extract and verify the hidden image from `frames` with the receiver's private key.
pub fn extract_image<I>(
    private: &SecretKey,
    params: QimParameters,
    policy: IntegrityPolicy,
    frames: I,
) -> Result<ExtractedImage, StegoError>
where
    I: IntoIterator<Item = io::Result<Frame>>,
{
    ExtractEngine::new(params).run(frames, private, policy)
}

/// Full extract pipeline: stego video + receiver private key -> recovered image file.
pub fn extract_file(
    stego_path: &Path,
    output_path: &Path,
    private_key_path: &Path,
    cfg: &StegoConfig,
) -> Result<ExtractedImage> {
    let private = keys::load_private_key(private_key_path)
        .with_context(|| format!("failed to load private key {}", private_key_path.display()))?;

    let info = decoder::probe(stego_path)?;
    let source = FfmpegFrameSource::open(stego_path, &info)?;

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner().template("[{elapsed_precise}] {spinner} {pos} frames read")?,
    );

    let frames = source.inspect(|_| progress.inc(1));
    let extracted = extract_image(&private, cfg.qim, cfg.integrity_policy, frames)?;
    progress.finish_and_clear();

    extracted
        .image
        .save(output_path)
        .context("failed to write recovered image")?;

    info!("extract complete! output: {}", output_path.display());
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;
    use crate::pipeline::embed::EmbedEngine;
    use crate::pipeline::embed::build_payload;

    fn carrier(width: usize, height: usize, seed: usize) -> Frame {
        let pixels = (0..width * height)
            .map(|i| (100 + (i * 29 + seed * 11 + i / width * 3) % 56) as u8)
            .collect();
        Frame::new(width, height, pixels).unwrap()
    }

    fn secret() -> SecretImage {
        SecretImage::new(4, 4, (0..16).map(|i| i * 16).collect()).unwrap()
    }

    /// Embed `image` into `count` 64x64 carrier frames (640 bits each at 10 coefficients).
    fn stego_frames(image: &SecretImage, public: &p256::PublicKey, count: usize) -> Vec<Frame> {
        let params = QimParameters::default();
        let payload = build_payload(image, public).unwrap();
        let mut engine = EmbedEngine::new(params, payload);
        (0..count)
            .map(|i| engine.push_frame(carrier(64, 64, i)).unwrap())
            .collect()
    }

    #[test]
    fn test_extract_across_frames() {
        let (private, public) = crypto::generate_keypair();
        let image = secret();
        // 976 header bits + 128 ciphertext bits span two frames.
        let frames = stego_frames(&image, &public, 3);

        let mut engine = ExtractEngine::new(QimParameters::default());
        engine.push_frame(&frames[0]).unwrap();
        assert_eq!(engine.state(), ExtractState::Accumulating);
        engine.push_frame(&frames[1]).unwrap();
        assert_eq!(engine.state(), ExtractState::HeaderParsed);
        assert!(!engine.needs_more_frames());
        assert!(matches!(
            engine.push_frame(&frames[2]),
            Err(StegoError::EngineFinished)
        ));

        let out = engine.finish(&private, IntegrityPolicy::Warn).unwrap();
        assert_eq!(out.image, image);
        assert_eq!(out.integrity, IntegrityStatus::Verified);
        assert_eq!(out.frames_read, 2);
        assert_eq!(engine.state(), ExtractState::Done);
    }

    #[test]
    fn test_run_stops_pulling_when_complete() {
        let (private, public) = crypto::generate_keypair();
        let image = secret();
        let frames = stego_frames(&image, &public, 5);

        let mut pulled = 0;
        let source = frames.into_iter().map(|f| {
            pulled += 1;
            Ok(f)
        });
        let out = extract_image(
            &private,
            QimParameters::default(),
            IntegrityPolicy::Reject,
            source,
        )
        .unwrap();
        assert_eq!(out.image, image);
        assert_eq!(pulled, 2);
    }

    #[test]
    fn test_truncated_stream() {
        let (private, public) = crypto::generate_keypair();
        let frames = stego_frames(&secret(), &public, 1);

        let err = extract_image(
            &private,
            QimParameters::default(),
            IntegrityPolicy::Warn,
            frames.into_iter().map(Ok),
        )
        .unwrap_err();
        match err {
            StegoError::TruncatedStream {
                field, have, need, frames,
            } => {
                assert_eq!(frames, 1);
                assert!(field.is_some());
                assert!(have < need);
            }
            other => panic!("expected TruncatedStream, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_source_is_truncated() {
        let (private, _) = crypto::generate_keypair();
        let err = extract_image(
            &private,
            QimParameters::default(),
            IntegrityPolicy::Warn,
            std::iter::empty(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StegoError::TruncatedStream {
                field: Some(crate::packet::FieldKind::SecretWidth),
                have: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let (_, public) = crypto::generate_keypair();
        let (other_private, _) = crypto::generate_keypair();
        let frames = stego_frames(&secret(), &public, 2);

        let err = extract_image(
            &other_private,
            QimParameters::default(),
            IntegrityPolicy::Warn,
            frames.into_iter().map(Ok),
        )
        .unwrap_err();
        assert!(matches!(err, StegoError::AuthenticationFailed));
    }

    #[test]
    fn test_io_error_propagates() {
        let (private, _) = crypto::generate_keypair();
        let source = vec![Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read"))];
        let err = extract_image(
            &private,
            QimParameters::default(),
            IntegrityPolicy::Warn,
            source,
        )
        .unwrap_err();
        assert!(matches!(err, StegoError::Io(_)));
    }
}
