//! Decoded `[channel, row, column]` image stacks.

use std::fmt::Debug;
use std::str::FromStr;

use ndarray::{Array3, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

/// Element precision of a decoded stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    F32,
    F64,
}

/// Floating point element type a stack can be decoded into.
///
/// `from_f32` is exact for both implementations; `from_f64` narrows for `f32` and
/// callers must gate it behind an explicit opt-in.
pub trait Sample:
    Copy + Default + PartialOrd + Debug + FromStr + Send + Sync + 'static
{
    const PRECISION: Precision;

    fn from_f32(value: f32) -> Self;
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
}

impl Sample for f32 {
    const PRECISION: Precision = Precision::F32;

    fn from_f32(value: f32) -> Self {
        value
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Sample for f64 {
    const PRECISION: Precision = Precision::F64;

    fn from_f32(value: f32) -> Self {
        f64::from(value)
    }

    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

/// An immutable image stack. The channel axis is in metadata ordinal order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageStack<T> {
    data: Array3<T>,
}

impl<T: Sample> ImageStack<T> {
    pub fn new(data: Array3<T>) -> Self {
        Self { data }
    }

    pub fn shape(&self) -> StackShape {
        let (channels, height, width) = self.data.dim();
        StackShape {
            channels,
            height,
            width,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn view(&self) -> ArrayView3<'_, T> {
        self.data.view()
    }

    /// Borrowed 2-D plane of one channel, `None` when out of range.
    pub fn plane(&self, index: usize) -> Option<ArrayView2<'_, T>> {
        (index < self.channel_count()).then(|| self.data.index_axis(Axis(0), index))
    }

    pub fn planes(&self) -> impl Iterator<Item = ArrayView2<'_, T>> {
        self.data.axis_iter(Axis(0))
    }

    pub fn into_inner(self) -> Array3<T> {
        self.data
    }
}
