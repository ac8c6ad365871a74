use ndarray::s;

use crate::access::AcquisitionAccess;
use crate::error::ChannelError;
use crate::types::entities::{Acquisition, Channel, leading_coordinate_channels};
use crate::types::image_stack::{ImageStack, Sample};
use crate::types::layout::{AcquisitionLayout, AcquisitionStatus};
use crate::utils::channel_panel::ChannelPanel;

/// A decoded acquisition of an MCD container.
///
/// Owns its stack; nothing refers back to the container once it is built.
#[derive(Debug, Clone, PartialEq)]
pub struct McdAcquisition<T> {
    id: String,
    description: Option<String>,
    status: AcquisitionStatus,
    panel: ChannelPanel,
    stack: ImageStack<T>,
}

impl<T: Sample> McdAcquisition<T> {
    /// `channels` must be in ordinal order, matching the stack's channel axis.
    ///
    /// Leading `X`, `Y`, `Z` coordinate channels are removed from both the panel
    /// and the stack, so only measured channels remain.
    pub fn new(
        acquisition: &Acquisition,
        channels: &[&Channel],
        layout: &AcquisitionLayout,
        stack: ImageStack<T>,
    ) -> Result<Self, ChannelError> {
        ChannelPanel::from_channels(channels.iter().copied()).validate(stack.channel_count())?;
        let skip = leading_coordinate_channels(channels);
        let stack = match skip {
            0 => stack,
            _ => ImageStack::new(stack.into_inner().slice_move(s![skip.., .., ..])),
        };
        let acq = Self {
            id: acquisition.id.clone(),
            description: acquisition.description.clone(),
            status: layout.status,
            panel: ChannelPanel::from_channels(channels[skip..].iter().copied()),
            stack,
        };
        acq.validate_channels()?;
        Ok(acq)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> AcquisitionStatus {
        self.status
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.status, AcquisitionStatus::Partial(_))
    }

    pub fn into_stack(self) -> ImageStack<T> {
        self.stack
    }
}

impl<T: Sample> AcquisitionAccess for McdAcquisition<T> {
    type Value = T;

    fn panel(&self) -> &ChannelPanel {
        &self.panel
    }

    fn image_stack(&self) -> &ImageStack<T> {
        &self.stack
    }
}
