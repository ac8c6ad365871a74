//! Typed entities of the embedded MCD metadata document.
//!
//! Every entity keeps the complete field table of its source element next to the
//! typed attributes, so values this crate does not interpret stay reachable.
//! Relations are plain identifiers; they are resolved through
//! [`MetadataGraph`](crate::types::graph::MetadataGraph).

use std::fmt;
use std::str::FromStr;

use bon::Builder;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::utils::misc::mass_from_metal;

/// Element and field names used by the instrument schema.
pub mod field {
    pub const ID: &str = "ID";
    pub const UID: &str = "UID";
    pub const DESCRIPTION: &str = "Description";
    pub const FILENAME: &str = "Filename";
    pub const WIDTH_UM: &str = "WidthUm";
    pub const HEIGHT_UM: &str = "HeightUm";
    pub const IMAGE_START_OFFSET: &str = "ImageStartOffset";
    pub const IMAGE_END_OFFSET: &str = "ImageEndOffset";
    pub const IMAGE_FORMAT: &str = "ImageFormat";
    pub const SLIDE_ID: &str = "SlideID";
    pub const PANORAMA_ID: &str = "PanoramaID";
    pub const PIXEL_WIDTH: &str = "PixelWidth";
    pub const PIXEL_HEIGHT: &str = "PixelHeight";
    pub const ACQUISITION_ROI_ID: &str = "AcquisitionROIID";
    pub const ROI_TYPE: &str = "ROIType";
    pub const ORDER_NUMBER: &str = "OrderNumber";
    pub const SLIDE_X_POS_UM: &str = "SlideXPosUm";
    pub const SLIDE_Y_POS_UM: &str = "SlideYPosUm";
    pub const PANORAMA_PIXEL_X_POS: &str = "PanoramaPixelXPos";
    pub const PANORAMA_PIXEL_Y_POS: &str = "PanoramaPixelYPos";
    pub const DATA_START_OFFSET: &str = "DataStartOffset";
    pub const DATA_END_OFFSET: &str = "DataEndOffset";
    pub const VALUE_BYTES: &str = "ValueBytes";
    pub const MAX_X: &str = "MaxX";
    pub const MAX_Y: &str = "MaxY";
    pub const SIGNAL_TYPE: &str = "SignalType";
    pub const SEGMENT_DATA_FORMAT: &str = "SegmentDataFormat";
    pub const BEFORE_ABLATION_IMAGE_START_OFFSET: &str = "BeforeAblationImageStartOffset";
    pub const BEFORE_ABLATION_IMAGE_END_OFFSET: &str = "BeforeAblationImageEndOffset";
    pub const AFTER_ABLATION_IMAGE_START_OFFSET: &str = "AfterAblationImageStartOffset";
    pub const AFTER_ABLATION_IMAGE_END_OFFSET: &str = "AfterAblationImageEndOffset";
    pub const ACQUISITION_ID: &str = "AcquisitionID";
    pub const CHANNEL_NAME: &str = "ChannelName";
    pub const CHANNEL_LABEL: &str = "ChannelLabel";
}

/// The entity kinds recognised in the metadata document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Slide,
    Panorama,
    Acquisition,
    AcquisitionRoi,
    RoiPoint,
    Channel,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Slide,
        EntityKind::Panorama,
        EntityKind::Acquisition,
        EntityKind::AcquisitionRoi,
        EntityKind::RoiPoint,
        EntityKind::Channel,
    ];

    /// Local element name of this kind in the schema.
    pub fn element_name(self) -> &'static str {
        match self {
            Self::Slide => "Slide",
            Self::Panorama => "Panorama",
            Self::Acquisition => "Acquisition",
            Self::AcquisitionRoi => "AcquisitionROI",
            Self::RoiPoint => "ROIPoint",
            Self::Channel => "AcquisitionChannel",
        }
    }

    /// Element name dispatch. Unknown element names yield `None`.
    pub fn from_element_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.element_name() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Slide => "Slide",
            Self::Panorama => "Panorama",
            Self::Acquisition => "Acquisition",
            Self::AcquisitionRoi => "AcquisitionRoi",
            Self::RoiPoint => "RoiPoint",
            Self::Channel => "Channel",
        };
        f.write_str(name)
    }
}

pub type FieldTable = IndexMap<String, String>;

/// Access to the untyped field table every entity carries.
pub trait RawFields {
    fn fields(&self) -> &FieldTable;

    fn field(&self, key: &str) -> Option<&str> {
        self.fields().get(key).map(String::as_str)
    }

    /// Parse a field, treating unparseable text the same as an absent field.
    fn field_as<T: FromStr>(&self, key: &str) -> Option<T> {
        parse_field(self.fields(), key)
    }
}

fn parse_field<T: FromStr>(fields: &FieldTable, key: &str) -> Option<T> {
    fields.get(key)?.trim().parse().ok()
}

fn text_field(fields: &FieldTable, key: &str) -> Option<String> {
    fields
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

macro_rules! impl_raw_fields {
    ($($ty:ty),+) => {
        $(impl RawFields for $ty {
            fn fields(&self) -> &FieldTable {
                &self.fields
            }
        })+
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Slide {
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub description: Option<String>,
    #[builder(into)]
    pub uid: Option<String>,
    #[builder(into)]
    pub filename: Option<String>,
    pub width_um: Option<f64>,
    pub height_um: Option<f64>,
    #[builder(default)]
    pub fields: FieldTable,
}

impl Slide {
    pub fn from_fields(fields: FieldTable) -> Option<Self> {
        Some(
            Slide::builder()
                .id(text_field(&fields, field::ID)?)
                .maybe_description(text_field(&fields, field::DESCRIPTION))
                .maybe_uid(text_field(&fields, field::UID))
                .maybe_filename(text_field(&fields, field::FILENAME))
                .maybe_width_um(parse_field(&fields, field::WIDTH_UM))
                .maybe_height_um(parse_field(&fields, field::HEIGHT_UM))
                .fields(fields)
                .build(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Panorama {
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub slide_id: Option<String>,
    #[builder(into)]
    pub description: Option<String>,
    pub pixel_width: Option<u32>,
    pub pixel_height: Option<u32>,
    #[builder(into)]
    pub image_format: Option<String>,
    #[builder(default)]
    pub fields: FieldTable,
}

impl Panorama {
    pub fn from_fields(fields: FieldTable) -> Option<Self> {
        Some(
            Panorama::builder()
                .id(text_field(&fields, field::ID)?)
                .maybe_slide_id(text_field(&fields, field::SLIDE_ID))
                .maybe_description(text_field(&fields, field::DESCRIPTION))
                .maybe_pixel_width(parse_field(&fields, field::PIXEL_WIDTH))
                .maybe_pixel_height(parse_field(&fields, field::PIXEL_HEIGHT))
                .maybe_image_format(text_field(&fields, field::IMAGE_FORMAT))
                .fields(fields)
                .build(),
        )
    }

    /// Pixel bounds as `(width, height)` when both are declared.
    pub fn pixel_bounds(&self) -> Option<(u32, u32)> {
        Some((self.pixel_width?, self.pixel_height?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct AcquisitionRoi {
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub panorama_id: Option<String>,
    #[builder(into)]
    pub roi_type: Option<String>,
    #[builder(default)]
    pub fields: FieldTable,
}

impl AcquisitionRoi {
    pub fn from_fields(fields: FieldTable) -> Option<Self> {
        Some(
            AcquisitionRoi::builder()
                .id(text_field(&fields, field::ID)?)
                .maybe_panorama_id(text_field(&fields, field::PANORAMA_ID))
                .maybe_roi_type(text_field(&fields, field::ROI_TYPE))
                .fields(fields)
                .build(),
        )
    }
}

/// One polygon vertex of an [`AcquisitionRoi`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct RoiPoint {
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub roi_id: Option<String>,
    pub order_number: Option<u32>,
    pub slide_x_um: Option<f64>,
    pub slide_y_um: Option<f64>,
    pub panorama_pixel_x: Option<f64>,
    pub panorama_pixel_y: Option<f64>,
    #[builder(default)]
    pub fields: FieldTable,
}

impl RoiPoint {
    pub fn from_fields(fields: FieldTable) -> Option<Self> {
        Some(
            RoiPoint::builder()
                .id(text_field(&fields, field::ID)?)
                .maybe_roi_id(text_field(&fields, field::ACQUISITION_ROI_ID))
                .maybe_order_number(parse_field(&fields, field::ORDER_NUMBER))
                .maybe_slide_x_um(parse_field(&fields, field::SLIDE_X_POS_UM))
                .maybe_slide_y_um(parse_field(&fields, field::SLIDE_Y_POS_UM))
                .maybe_panorama_pixel_x(parse_field(&fields, field::PANORAMA_PIXEL_X_POS))
                .maybe_panorama_pixel_y(parse_field(&fields, field::PANORAMA_PIXEL_Y_POS))
                .fields(fields)
                .build(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Acquisition {
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub description: Option<String>,
    #[builder(into)]
    pub roi_id: Option<String>,
    pub order_number: Option<u32>,
    pub data_offset_start: Option<u64>,
    pub data_offset_end: Option<u64>,
    /// Bytes per stored value (`ValueBytes`).
    pub value_bytes: Option<u64>,
    /// Declared scan width in pixels.
    pub max_x: Option<u32>,
    /// Declared scan height in pixels.
    pub max_y: Option<u32>,
    #[builder(into)]
    pub signal_type: Option<String>,
    #[builder(into)]
    pub segment_data_format: Option<String>,
    #[builder(default)]
    pub fields: FieldTable,
}

impl Acquisition {
    pub fn from_fields(fields: FieldTable) -> Option<Self> {
        Some(
            Acquisition::builder()
                .id(text_field(&fields, field::ID)?)
                .maybe_description(text_field(&fields, field::DESCRIPTION))
                .maybe_roi_id(text_field(&fields, field::ACQUISITION_ROI_ID))
                .maybe_order_number(parse_field(&fields, field::ORDER_NUMBER))
                .maybe_data_offset_start(parse_field(&fields, field::DATA_START_OFFSET))
                .maybe_data_offset_end(parse_field(&fields, field::DATA_END_OFFSET))
                .maybe_value_bytes(parse_field(&fields, field::VALUE_BYTES))
                .maybe_max_x(parse_field(&fields, field::MAX_X))
                .maybe_max_y(parse_field(&fields, field::MAX_Y))
                .maybe_signal_type(text_field(&fields, field::SIGNAL_TYPE))
                .maybe_segment_data_format(text_field(&fields, field::SEGMENT_DATA_FORMAT))
                .fields(fields)
                .build(),
        )
    }
}

/// One detector channel. `id` is only unique within the parent acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Channel {
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub acquisition_id: Option<String>,
    /// Position of the channel in each raw row (`OrderNumber`).
    pub ordinal: Option<u32>,
    /// Metal tag, e.g. `Y(89)` (`ChannelName`).
    #[builder(into)]
    pub metal: Option<String>,
    #[builder(into)]
    pub label: Option<String>,
    #[builder(default)]
    pub fields: FieldTable,
}

impl Channel {
    pub fn from_fields(fields: FieldTable) -> Option<Self> {
        Some(
            Channel::builder()
                .id(text_field(&fields, field::ID)?)
                .maybe_acquisition_id(text_field(&fields, field::ACQUISITION_ID))
                .maybe_ordinal(parse_field(&fields, field::ORDER_NUMBER))
                .maybe_metal(text_field(&fields, field::CHANNEL_NAME))
                .maybe_label(text_field(&fields, field::CHANNEL_LABEL))
                .fields(fields)
                .build(),
        )
    }

    /// Mass encoded in the metal tag.
    pub fn mass(&self) -> Option<f64> {
        self.metal.as_deref().and_then(mass_from_metal)
    }
}

/// Metal tags of the scan coordinate channels that open every raw row.
pub const COORDINATE_CHANNELS: [&str; 3] = ["X", "Y", "Z"];

/// Number of leading channels (in ordinal order) that hold the `X`, `Y`, `Z`
/// scan coordinates rather than measured intensities.
pub fn leading_coordinate_channels(channels: &[&Channel]) -> usize {
    channels
        .iter()
        .zip(COORDINATE_CHANNELS)
        .take_while(|(channel, tag)| channel.metal.as_deref() == Some(*tag))
        .count()
}

impl_raw_fields!(Slide, Panorama, AcquisitionRoi, RoiPoint, Acquisition, Channel);
