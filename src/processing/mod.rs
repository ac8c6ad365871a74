pub mod intensity;

pub use intensity::{IntensityRange, channel_ranges, plane_range};
