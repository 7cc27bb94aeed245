use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::video::frame::{aligned_dimensions, Frame};

/// Stream properties reported by ffprobe.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub width: usize,
    pub height: usize,
    pub fps: Option<f64>,
    pub frame_count: Option<u64>,
}

/// Probe the first video stream of `path`.
pub fn probe(path: &Path) -> Result<VideoInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_frames",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .context("failed to run ffprobe — is ffmpeg installed?")?;

    if !output.status.success() {
        anyhow::bail!("ffprobe exited with status: {}", output.status);
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let info = parse_probe_output(&text)
        .with_context(|| format!("unexpected ffprobe output for {}", path.display()))?;
    debug!("probed {}: {:?}", path.display(), info);
    Ok(info)
}

fn parse_probe_output(text: &str) -> Result<VideoInfo> {
    let mut width = None;
    let mut height = None;
    let mut fps = None;
    let mut frame_count = None;

    for line in text.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "width" => width = value.parse().ok(),
            "height" => height = value.parse().ok(),
            "r_frame_rate" => fps = parse_rational(value),
            "nb_frames" => frame_count = value.parse().ok(),
            _ => {}
        }
    }

    Ok(VideoInfo {
        width: width.context("missing width")?,
        height: height.context("missing height")?,
        fps,
        frame_count,
    })
}

fn parse_rational(value: &str) -> Option<f64> {
    let (num, den) = value.split_once('/').unwrap_or((value, "1"));
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    (den != 0.0 && num > 0.0).then(|| num / den)
}

/// Pull-based source of luminance frames decoded by ffmpeg.
///
/// Frames are cropped to the top-left block-aligned region by ffmpeg's `crop`
/// filter before they reach us.
pub struct FfmpegFrameSource {
    child: Child,
    stdout: ChildStdout,
    width: usize,
    height: usize,
    frames_read: u64,
    done: bool,
}

impl FfmpegFrameSource {
    pub fn open(path: &Path, info: &VideoInfo) -> Result<Self> {
        let (width, height) = aligned_dimensions(info.width, info.height);
        if width == 0 || height == 0 {
            anyhow::bail!(
                "video {}x{} is smaller than one 8x8 block",
                info.width,
                info.height
            );
        }
        info!(
            "decoding video: {} ({}x{} cropped to {}x{})",
            path.display(),
            info.width,
            info.height,
            width,
            height
        );

        let mut child = Command::new("ffmpeg")
            .arg("-i")
            .arg(path)
            .args([
                "-vf",
                &format!("crop={}:{}:0:0", width, height),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "gray",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to spawn ffmpeg for decoding")?;

        let stdout = child
            .stdout
            .take()
            .context("ffmpeg stdout was not captured")?;

        Ok(Self {
            child,
            stdout,
            width,
            height,
            frames_read: 0,
            done: false,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn read_frame(&mut self) -> io::Result<Option<Frame>> {
        let mut buf = vec![0u8; self.width * self.height];
        if !read_exact_or_eof(&mut self.stdout, &mut buf)? {
            let status = self.child.wait()?;
            if !status.success() {
                return Err(io::Error::other(format!(
                    "ffmpeg decode exited with status: {}",
                    status
                )));
            }
            return Ok(None);
        }
        self.frames_read += 1;
        Frame::new(self.width, self.height, buf)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl Iterator for FfmpegFrameSource {
    type Item = io::Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if !self.done {
            // Extraction may stop pulling before the end of the stream.
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// Read exactly `buf.len()` bytes, returning Ok(false) on clean EOF.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(false);
                } else {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "partial frame read",
                    ));
                }
            }
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let text = "width=642\nheight=480\nr_frame_rate=30000/1001\nnb_frames=120\n";
        let info = parse_probe_output(text).unwrap();
        assert_eq!(info.width, 642);
        assert_eq!(info.height, 480);
        assert!((info.fps.unwrap() - 29.97).abs() < 0.01);
        assert_eq!(info.frame_count, Some(120));
    }

    #[test]
    fn test_parse_probe_missing_fields() {
        let info = parse_probe_output("width=320\nheight=240\nr_frame_rate=0/0\nnb_frames=N/A\n")
            .unwrap();
        assert_eq!(info.fps, None);
        assert_eq!(info.frame_count, None);
        assert!(parse_probe_output("codec=ffv1\n").is_err());
    }

    #[test]
    fn test_read_exact_or_eof() {
        let data = vec![1u8; 10];
        let mut reader = &data[..];
        let mut buf = [0u8; 5];
        assert!(read_exact_or_eof(&mut reader, &mut buf).unwrap());
        assert!(read_exact_or_eof(&mut reader, &mut buf).unwrap());
        assert!(!read_exact_or_eof(&mut reader, &mut buf).unwrap());

        let short = vec![1u8; 3];
        let mut reader = &short[..];
        assert!(read_exact_or_eof(&mut reader, &mut buf).is_err());
    }
}
