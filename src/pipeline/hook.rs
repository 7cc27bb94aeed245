use std::path::{Path, PathBuf};

use anyhow::Result;

/// A hook invoked between embedding and extraction in a [`roundtrip`](super::roundtrip).
///
/// Use it to push the stego video through a channel before extraction, e.g.
/// copying it to another host or re-muxing it, and return where the copy lives.
///
/// # Example
///
/// ```rust
/// use std::path::{Path, PathBuf};
/// use anyhow::Result;
/// use qimsteg::PipelineHook;
///
/// struct CopyHook(PathBuf);
///
/// impl PipelineHook for CopyHook {
///     fn after_embed(&self, stego_path: &Path) -> Result<PathBuf> {
///         std::fs::copy(stego_path, &self.0)?;
///         Ok(self.0.clone())
///     }
/// }
/// ```
pub trait PipelineHook {
    /// Called once the stego video at `stego_path` has been fully written.
    /// Returns the path extraction should read from.
    fn after_embed(&self, stego_path: &Path) -> Result<PathBuf>;
}

/// Passes the stego path through unchanged.
pub struct NoopHook;

impl PipelineHook for NoopHook {
    fn after_embed(&self, stego_path: &Path) -> Result<PathBuf> {
        Ok(stego_path.to_path_buf())
    }
}
