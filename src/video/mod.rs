pub mod dct;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod qim;

use std::io;

use frame::Frame;

/// Push-based consumer of output frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> io::Result<()>;
}

/// Collects frames in memory.
impl FrameSink for Vec<Frame> {
    fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        self.push(frame.clone());
        Ok(())
    }
}
