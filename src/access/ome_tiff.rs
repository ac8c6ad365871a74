//! OME-TIFF exports: one TIFF page per channel, channel metadata in the OME-XML
//! `ImageDescription` of the first page.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use log::debug;
use ndarray::Array3;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

use crate::access::{AcquisitionAccess, acquisition_id_from_path};
use crate::error::{AdapterError, MetadataParseError};
use crate::parser::metadata_parser::parse_metadata;
use crate::types::graph::MetadataGraph;
use crate::types::image_stack::{ImageStack, Precision, Sample};
use crate::utils::channel_panel::ChannelPanel;

/// Channel and provenance information of an OME-XML document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OmeMetadata {
    pub image_name: Option<String>,
    /// `Name` attribute per channel, in channel index order.
    pub labels: Vec<String>,
    /// `Fluor` attribute per channel, in channel index order.
    pub metals: Vec<String>,
    /// MCD schema carried in the `OriginalMetadata` annotation.
    pub original_metadata: Option<String>,
}

fn xml_error(e: impl std::fmt::Display) -> AdapterError {
    AdapterError::OmeXml(e.to_string())
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, AdapterError> {
    for attr in e.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value().map_err(xml_error)?.into_owned()));
        }
    }
    Ok(None)
}

/// Parse the subset of OME-XML describing channels.
///
/// Channel order comes from the index in `Channel:<image>:<index>` identifiers,
/// which must cover `0..n` exactly once.
pub fn parse_ome_xml(xml: &str) -> Result<OmeMetadata, AdapterError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut meta = OmeMetadata::default();
    let mut channels: Vec<(usize, String, String)> = Vec::new();
    let mut path: Vec<String> = Vec::new();

    loop {
        let event = reader.read_event().map_err(xml_error)?;
        let (start, is_empty) = match &event {
            Event::Start(e) => (Some(e), false),
            Event::Empty(e) => (Some(e), true),
            _ => (None, false),
        };
        if let Some(e) = start {
            let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
            match name.as_str() {
                "Image" if meta.image_name.is_none() => {
                    meta.image_name = attribute(e, b"Name")?;
                }
                "Channel" => {
                    let id = attribute(e, b"ID")?
                        .ok_or_else(|| xml_error("Channel without ID"))?;
                    let index = id
                        .rsplit(':')
                        .next()
                        .and_then(|i| i.parse::<usize>().ok())
                        .ok_or_else(|| xml_error(format!("unexpected channel ID {id:?}")))?;
                    channels.push((
                        index,
                        attribute(e, b"Name")?.unwrap_or_default(),
                        attribute(e, b"Fluor")?.unwrap_or_default(),
                    ));
                }
                _ => {}
            }
            if !is_empty {
                path.push(name);
            }
            continue;
        }
        match event {
            Event::Text(t) => {
                let in_original = path.len() >= 2
                    && path[path.len() - 2] == "OriginalMetadata"
                    && path[path.len() - 1] == "Value";
                if in_original && meta.original_metadata.is_none() {
                    meta.original_metadata = Some(t.unescape().map_err(xml_error)?.into_owned());
                }
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    channels.sort_by_key(|(index, _, _)| *index);
    if let Some((position, (index, _, _))) = channels
        .iter()
        .enumerate()
        .find(|(position, (index, _, _))| position != index)
    {
        return Err(xml_error(format!(
            "channel index {index} found where {position} was expected"
        )));
    }
    (meta.labels, meta.metals) = channels
        .into_iter()
        .map(|(_, label, metal)| (label, metal))
        .unzip();
    Ok(meta)
}

fn plane_values<T: Sample>(
    image: DecodingResult,
    allow_narrowing: bool,
) -> Result<Vec<T>, AdapterError> {
    let widen = |v: f32| T::from_f32(v);
    Ok(match image {
        DecodingResult::F32(v) => v.into_iter().map(T::from_f32).collect(),
        DecodingResult::F64(v) => {
            if T::PRECISION == Precision::F32 && !allow_narrowing {
                return Err(AdapterError::ImplicitNarrowing);
            }
            v.into_iter().map(T::from_f64).collect()
        }
        DecodingResult::U8(v) => v.into_iter().map(|x| widen(f32::from(x))).collect(),
        DecodingResult::U16(v) => v.into_iter().map(|x| widen(f32::from(x))).collect(),
        DecodingResult::I8(v) => v.into_iter().map(|x| widen(f32::from(x))).collect(),
        DecodingResult::I16(v) => v.into_iter().map(|x| widen(f32::from(x))).collect(),
        _ => {
            return Err(AdapterError::UnsupportedSampleFormat(
                "integer samples wider than 16 bits".to_string(),
            ));
        }
    })
}

/// An acquisition read from an OME-TIFF export.
#[derive(Debug, Clone, PartialEq)]
pub struct OmeTiffAcquisition<T> {
    id: Option<String>,
    metadata: OmeMetadata,
    panel: ChannelPanel,
    stack: ImageStack<T>,
}

impl<T: Sample> OmeTiffAcquisition<T> {
    pub fn open(path: impl AsRef<Path>, allow_narrowing: bool) -> Result<Self, AdapterError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut acq = Self::from_reader(BufReader::new(file), allow_narrowing)?;
        acq.id = acquisition_id_from_path(path, ".ome.tiff")
            .or_else(|| acquisition_id_from_path(path, ".ome.tif"));
        Ok(acq)
    }

    pub fn from_reader<R: Read + Seek>(reader: R, allow_narrowing: bool) -> Result<Self, AdapterError> {
        let mut decoder = Decoder::new(reader)?;
        let description = decoder.get_tag_ascii_string(Tag::ImageDescription)?;
        let metadata = parse_ome_xml(&description)?;

        let expected = decoder.dimensions()?;
        let (width, height) = expected;
        let mut values: Vec<T> = Vec::new();
        let mut pages = 0usize;
        loop {
            let found = decoder.dimensions()?;
            if found != expected {
                return Err(AdapterError::InconsistentPages {
                    page: pages,
                    expected,
                    found,
                });
            }
            let plane = plane_values::<T>(decoder.read_image()?, allow_narrowing)?;
            if plane.len() != width as usize * height as usize {
                return Err(AdapterError::UnsupportedSampleFormat(format!(
                    "page {pages} has more than one sample per pixel"
                )));
            }
            values.extend(plane);
            pages += 1;
            if !decoder.more_images() {
                break;
            }
            decoder.next_image()?;
        }
        debug!("Read {pages} OME-TIFF pages of {width}x{height}");

        let data = Array3::from_shape_vec((pages, height as usize, width as usize), values)
            .map_err(|e| AdapterError::UnsupportedSampleFormat(e.to_string()))?;
        let panel =
            ChannelPanel::from_labels_and_metals(metadata.labels.clone(), metadata.metals.clone());
        let acq = Self {
            id: None,
            metadata,
            panel,
            stack: ImageStack::new(data),
        };
        acq.validate_channels()?;
        Ok(acq)
    }

    /// Acquisition id taken from the export file name.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn image_name(&self) -> Option<&str> {
        self.metadata.image_name.as_deref()
    }

    pub fn original_metadata(&self) -> Option<&str> {
        self.metadata.original_metadata.as_deref()
    }

    /// Graph of the MCD schema embedded in the export, if any.
    pub fn metadata_graph(&self) -> Option<Result<MetadataGraph, MetadataParseError>> {
        self.original_metadata().map(parse_metadata)
    }
}

impl<T: Sample> AcquisitionAccess for OmeTiffAcquisition<T> {
    type Value = T;

    fn panel(&self) -> &ChannelPanel {
        &self.panel
    }

    fn image_stack(&self) -> &ImageStack<T> {
        &self.stack
    }
}
