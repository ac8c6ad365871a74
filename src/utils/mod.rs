//! Byte sources, channel panels and small helpers

pub mod channel_panel;
pub mod misc;
pub mod source;

// Re-export commonly used utilities for convenience
pub use channel_panel::ChannelPanel;
pub use misc::*;
pub use source::{ContainerSource, ReaderSource, read_binary_file_mmap};
