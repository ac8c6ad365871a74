//! Format-independent access to one decoded acquisition.
//!
//! Every input format produces a type implementing [`AcquisitionAccess`]. Consumers
//! only ever see ordered channel metadata, the stack shape and borrowed planes.

pub mod mcd;
pub mod ome_tiff;
pub mod text;

use std::path::Path;

use ndarray::{ArrayView2, ArrayView3};

use crate::error::{ChannelError, ChannelQuery};
use crate::processing::intensity::{IntensityRange, channel_ranges};
use crate::types::image_stack::{ImageStack, Sample, StackShape};
use crate::utils::channel_panel::ChannelPanel;

pub use mcd::McdAcquisition;
pub use ome_tiff::OmeTiffAcquisition;
pub use text::TextAcquisition;

/// Read-only view of one acquisition's channels and pixels.
///
/// Implementors provide the panel and the stack. Every provided accessor first runs
/// [`AcquisitionAccess::validate_channels`].
pub trait AcquisitionAccess {
    type Value: Sample;

    fn panel(&self) -> &ChannelPanel;

    /// The stack without the channel metadata check.
    fn image_stack(&self) -> &ImageStack<Self::Value>;

    fn labels(&self) -> &[String] {
        self.panel().labels()
    }

    fn metals(&self) -> &[String] {
        self.panel().metals()
    }

    fn masses(&self) -> &[Option<f64>] {
        self.panel().masses()
    }

    /// Labels, metals and masses must each have one entry per plane.
    fn validate_channels(&self) -> Result<(), ChannelError> {
        self.panel().validate(self.image_stack().channel_count())
    }

    fn shape(&self) -> Result<StackShape, ChannelError> {
        self.validate_channels()?;
        Ok(self.image_stack().shape())
    }

    fn stack(&self) -> Result<ArrayView3<'_, Self::Value>, ChannelError> {
        self.validate_channels()?;
        Ok(self.image_stack().view())
    }

    fn plane(&self, index: usize) -> Result<ArrayView2<'_, Self::Value>, ChannelError> {
        self.validate_channels()?;
        let index = self.panel().check_index(index)?;
        self.image_stack()
            .plane(index)
            .ok_or(ChannelError::NotFound(ChannelQuery::Index(index)))
    }

    fn plane_by_label(&self, label: &str) -> Result<ArrayView2<'_, Self::Value>, ChannelError> {
        self.validate_channels()?;
        self.plane(self.panel().index_of_label(label)?)
    }

    fn plane_by_metal(&self, metal: &str) -> Result<ArrayView2<'_, Self::Value>, ChannelError> {
        self.validate_channels()?;
        self.plane(self.panel().index_of_metal(metal)?)
    }

    /// Finite intensity range of every channel.
    fn intensity_ranges(&self) -> Result<Vec<Option<IntensityRange>>, ChannelError> {
        self.validate_channels()?;
        Ok(channel_ranges(self.image_stack()))
    }
}

/// Acquisition id encoded as the last `_` separated part of an export file name,
/// e.g. `sample_s0_a3` or `sample_3`. A leading `a` is dropped.
pub(crate) fn acquisition_id_from_path(path: &Path, suffix: &str) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(suffix).unwrap_or(name);
    let last = stem.rsplit('_').next()?;
    let id = last.strip_prefix('a').unwrap_or(last);
    (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then(|| id.to_string())
}
