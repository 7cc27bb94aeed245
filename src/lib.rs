pub mod bits;
pub mod config;
pub mod crypto;
pub mod integrity;
pub mod packet;
pub mod pipeline;
pub mod secret;
pub mod video;

pub use config::{IntegrityPolicy, QimParameters, StegoConfig};
pub use pipeline::embed::{embed_file, embed_image, EmbedEngine, EmbedReport};
pub use pipeline::extract::{extract_file, extract_image, ExtractEngine, ExtractedImage, IntegrityStatus};
pub use pipeline::hook::{NoopHook, PipelineHook};
pub use pipeline::{roundtrip, RoundtripResult, StegoError};
pub use secret::SecretImage;
pub use video::frame::Frame;
pub use video::FrameSink;
