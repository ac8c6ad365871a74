use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::image_stack::{ImageStack, Sample};

/// Smallest and largest finite value of a plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityRange {
    pub min: f64,
    pub max: f64,
}

/// Range of the finite values of one plane. `None` when it has none.
pub fn plane_range<T: Sample>(plane: ArrayView2<'_, T>) -> Option<IntensityRange> {
    plane
        .iter()
        .map(|v| v.to_f64())
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some(IntensityRange { min: v, max: v }),
            Some(r) => Some(IntensityRange {
                min: r.min.min(v),
                max: r.max.max(v),
            }),
        })
}

/// Intensity range of every channel, in channel order. Planes are scanned in parallel.
pub fn channel_ranges<T: Sample>(stack: &ImageStack<T>) -> Vec<Option<IntensityRange>> {
    stack
        .view()
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(plane_range)
        .collect()
}
