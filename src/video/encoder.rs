use std::io::{self, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};

use anyhow::{Context, Result};
use log::info;

use crate::video::frame::Frame;
use crate::video::FrameSink;

/// Writes luminance frames to a lossless FFV1 video through the ffmpeg CLI.
pub struct FfmpegFrameSink {
    child: Child,
    stdin: Option<ChildStdin>,
    width: usize,
    height: usize,
    frames_written: u64,
}

impl FfmpegFrameSink {
    pub fn create(output_path: &Path, width: usize, height: usize, fps: f64) -> Result<Self> {
        info!(
            "encoding FFV1 video: {} ({}x{} @ {} fps)",
            output_path.display(),
            width,
            height,
            fps
        );

        let ffv1_slices = rayon::current_num_threads().min(16).to_string();

        let mut child = Command::new("ffmpeg")
            .args([
                "-y",
                "-f",
                "rawvideo",
                "-pixel_format",
                "gray",
                "-video_size",
                &format!("{}x{}", width, height),
                "-framerate",
                &fps.to_string(),
                "-i",
                "pipe:0",
                "-c:v",
                "ffv1",
                "-level",
                "3",
                "-slices",
                &ffv1_slices,
                "-slicecrc",
                "1",
                "-pix_fmt",
                "gray",
            ])
            .arg(output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to spawn ffmpeg process — is ffmpeg installed?")?;

        let stdin = child.stdin.take().context("ffmpeg stdin was not captured")?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            width,
            height,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Close the pipe and wait for ffmpeg to finish writing the container.
    pub fn finish(mut self) -> Result<()> {
        drop(self.stdin.take());
        let status = self.child.wait().context("ffmpeg process failed")?;
        if !status.success() {
            anyhow::bail!("ffmpeg exited with status: {}", status);
        }
        info!("video encoding complete: {} frames", self.frames_written);
        Ok(())
    }
}

impl FrameSink for FfmpegFrameSink {
    fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "frame {}x{} does not match output {}x{}",
                    frame.width(),
                    frame.height(),
                    self.width,
                    self.height
                ),
            ));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "ffmpeg stdin closed"))?;
        stdin.write_all(frame.pixels())?;
        self.frames_written += 1;
        Ok(())
    }
}

impl Drop for FfmpegFrameSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.wait();
    }
}
