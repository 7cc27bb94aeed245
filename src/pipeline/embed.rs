use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use p256::PublicKey;

use crate::config::{QimParameters, StegoConfig};
use crate::crypto::{self, keys};
use crate::integrity;
use crate::packet::{self, Envelope};
use crate::pipeline::StegoError;
use crate::secret::SecretImage;
use crate::video::decoder::{self, FfmpegFrameSource};
use crate::video::encoder::FfmpegFrameSink;
use crate::video::frame::Frame;
use crate::video::qim::QimCodec;
use crate::video::FrameSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedState {
    AwaitingFrame,
    Embedding,
    Draining,
    Done,
}

/// Outcome of a completed embedding.
#[derive(Debug, Clone)]
pub struct EmbedReport {
    pub payload_bits: usize,
    pub frames_total: u64,
    pub frames_with_payload: u64,
    /// Payload blocks saturated on write-back; non-zero means extraction may fail.
    pub clipped_blocks: u64,
    /// First carrier frame before and after embedding, for external quality metrics.
    pub first_original: Option<Frame>,
    pub first_stego: Option<Frame>,
}

/// Spreads a payload bit string across a sequence of frames.
///
/// Frames are pushed one at a time. While payload bits remain, each frame is
/// embedded starting at the cursor; afterwards frames pass through verbatim.
pub struct EmbedEngine {
    codec: QimCodec,
    payload: Vec<bool>,
    cursor: usize,
    state: EmbedState,
    dimensions: Option<(usize, usize)>,
    frames_total: u64,
    frames_with_payload: u64,
    clipped_blocks: u64,
    first_pair: Option<(Frame, Frame)>,
}

impl EmbedEngine {
    pub fn new(params: QimParameters, payload: Vec<bool>) -> Self {
        Self {
            codec: QimCodec::new(params),
            payload,
            cursor: 0,
            state: EmbedState::AwaitingFrame,
            dimensions: None,
            frames_total: 0,
            frames_with_payload: 0,
            clipped_blocks: 0,
            first_pair: None,
        }
    }

    pub fn state(&self) -> EmbedState {
        self.state
    }

    /// Payload bits embedded so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn remaining_bits(&self) -> usize {
        self.payload.len() - self.cursor
    }

    /// Process one input frame and return the frame to write out.
    pub fn push_frame(&mut self, frame: Frame) -> Result<Frame, StegoError> {
        if self.state == EmbedState::Done {
            return Err(StegoError::EngineFinished);
        }
        let dims = (frame.width(), frame.height());
        match self.dimensions {
            None => self.dimensions = Some(dims),
            Some(expected) if expected != dims => {
                return Err(StegoError::FrameSizeMismatch {
                    expected,
                    got: dims,
                })
            }
            Some(_) => {}
        }
        self.frames_total += 1;

        if self.cursor >= self.payload.len() {
            self.state = EmbedState::Draining;
            return Ok(frame);
        }

        let out = self.codec.embed_frame(&frame, &self.payload[self.cursor..]);
        let (stego, embedded) = (out.frame, out.embedded);
        self.cursor += embedded;
        self.frames_with_payload += 1;
        if out.clipped_blocks > 0 {
            self.clipped_blocks += out.clipped_blocks as u64;
            warn!(
                "frame {}: {} payload block(s) saturated at 0/255, extraction may fail",
                self.frames_total, out.clipped_blocks
            );
        }
        debug!(
            "frame {}: embedded {} bits ({}/{})",
            self.frames_total,
            embedded,
            self.cursor,
            self.payload.len()
        );

        if self.first_pair.is_none() {
            self.first_pair = Some((frame, stego.clone()));
        }

        self.state = if self.cursor >= self.payload.len() {
            info!(
                "payload fully embedded after {} frame(s), passing remaining frames through",
                self.frames_with_payload
            );
            EmbedState::Draining
        } else {
            EmbedState::Embedding
        };
        Ok(stego)
    }

    /// Signal that the frame source is exhausted.
    pub fn finish(mut self) -> Result<EmbedReport, StegoError> {
        if self.cursor < self.payload.len() {
            return Err(StegoError::InsufficientCapacity {
                embedded_bits: self.cursor,
                total_bits: self.payload.len(),
                frames: self.frames_total,
            });
        }
        self.state = EmbedState::Done;
        let (first_original, first_stego) = match self.first_pair.take() {
            Some((o, s)) => (Some(o), Some(s)),
            None => (None, None),
        };
        Ok(EmbedReport {
            payload_bits: self.payload.len(),
            frames_total: self.frames_total,
            frames_with_payload: self.frames_with_payload,
            clipped_blocks: self.clipped_blocks,
            first_original,
            first_stego,
        })
    }

    /// Drive the engine over a whole frame source, writing every output frame to `sink`.
    pub fn run<I, S>(mut self, frames: I, sink: &mut S) -> Result<EmbedReport, StegoError>
    where
        I: IntoIterator<Item = io::Result<Frame>>,
        S: FrameSink + ?Sized,
    {
        for frame in frames {
            let out = self.push_frame(frame?)?;
            sink.write_frame(&out)?;
        }
        self.finish()
    }
}

/// Hash, encrypt and frame `image` for `receiver`, producing the payload bit string.
pub fn build_payload(image: &SecretImage, receiver: &PublicKey) -> Result<Vec<bool>, StegoError> {
    let image_hash = integrity::sha3_256(image.pixels());
    let sealed = crypto::seal(image.pixels(), receiver)?;

    let env = Envelope {
        width: image.width(),
        height: image.height(),
        ephemeral_pubkey: sealed.ephemeral_pubkey.to_vec(),
        salt: sealed.salt.to_vec(),
        image_hash: image_hash.to_vec(),
        nonce: sealed.sealed.nonce.to_vec(),
        tag: sealed.sealed.tag.to_vec(),
        ciphertext: sealed.sealed.ciphertext,
    };
    let bits = packet::serialize(&env)?;
    debug!(
        "payload: {} bits ({} ciphertext bytes, sha3 {})",
        bits.len(),
        env.ciphertext.len(),
        integrity::to_hex(&image_hash)
    );
    Ok(bits)
}

/// Embed `image` for `receiver` into the frames of `frames`, writing every frame to `sink`.
pub fn embed_image<I, S>(
    image: &SecretImage,
    receiver: &PublicKey,
    params: QimParameters,
    frames: I,
    sink: &mut S,
) -> Result<EmbedReport, StegoError>
where
    I: IntoIterator<Item = io::Result<Frame>>,
    S: FrameSink + ?Sized,
{
    let payload = build_payload(image, receiver)?;
    EmbedEngine::new(params, payload).run(frames, sink)
}

/// Full embed pipeline: image file + carrier video + receiver public key -> FFV1 stego video.
pub fn embed_file(
    carrier_path: &Path,
    secret_path: &Path,
    output_path: &Path,
    public_key_path: &Path,
    cfg: &StegoConfig,
) -> Result<EmbedReport> {
    let receiver = keys::load_public_key(public_key_path)
        .with_context(|| format!("failed to load public key {}", public_key_path.display()))?;
    let image = SecretImage::load(secret_path).context("failed to load secret image")?;

    let payload = build_payload(&image, &receiver)?;

    let info = decoder::probe(carrier_path)?;
    let source = FfmpegFrameSource::open(carrier_path, &info)?;
    let capacity = QimCodec::new(cfg.qim).frame_capacity(source.width(), source.height());
    let needed = crate::config::frames_required(payload.len(), capacity);
    info!(
        "embedding {} payload bits, {} bits/frame capacity, {} frame(s) needed",
        payload.len(),
        capacity,
        needed
    );
    if let Some(available) = info.frame_count {
        if (needed as u64) > available {
            anyhow::bail!(StegoError::InsufficientCapacity {
                embedded_bits: 0,
                total_bits: payload.len(),
                frames: available,
            });
        }
    }

    let fps = info.fps.unwrap_or(cfg.fps_fallback);
    let mut sink = FfmpegFrameSink::create(output_path, source.width(), source.height(), fps)?;

    let progress = match info.frame_count {
        Some(n) => ProgressBar::new(n),
        None => ProgressBar::new_spinner(),
    };
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta})")?
            .progress_chars("##-"),
    );

    let frames = source.inspect(|_| progress.inc(1));
    let report = EmbedEngine::new(cfg.qim, payload).run(frames, &mut sink)?;
    progress.finish_with_message("embedding complete");
    sink.finish()?;

    info!(
        "embed complete! {} of {} frames carry payload, output: {}",
        report.frames_with_payload,
        report.frames_total,
        output_path.display()
    );
    Ok(report)
}
