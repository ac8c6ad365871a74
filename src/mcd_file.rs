use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use log::{debug, info};
use memmap2::Mmap;
use polars::prelude::DataFrame;
use rayon::prelude::*;

use crate::access::{AcquisitionAccess, McdAcquisition};
use crate::config::{LocatorConfig, McdConfig, TextEncoding};
use crate::error::{AcquisitionError, McdError, Result};
use crate::parser::{
    MetadataSpan, decode_acquisition, decode_document, locate_metadata, parse_metadata,
    read_acquisition_buffer, read_document, resolve_all,
};
use crate::types::entities::{EntityKind, RawFields, field, leading_coordinate_channels};
use crate::types::graph::{AcquisitionFilter, MetadataGraph};
use crate::types::image_stack::Sample;
use crate::types::layout::AcquisitionLayout;
use crate::utils::channel_panel::ChannelPanel;
use crate::utils::source::{ContainerSource, read_binary_file_mmap};

/// Embedded image offsets point this many bytes before the image data.
pub const IMAGE_OFFSET_FIX: u64 = 161;

/// Optical images recorded around an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AblationImage {
    Before,
    After,
}

/// An opened MCD container.
///
/// Opening locates and parses the metadata and resolves every acquisition range.
/// Pixel data is only read when an acquisition is requested.
pub struct McdFile<S = Mmap> {
    source: S,
    span: Option<MetadataSpan>,
    graph: MetadataGraph,
    layouts: IndexMap<String, std::result::Result<AcquisitionLayout, AcquisitionError>>,
    config: McdConfig,
}

impl McdFile<Mmap> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, McdConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: McdConfig) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening MCD container {}", path.display());
        Self::from_source(read_binary_file_mmap(path)?, config)
    }

    /// Open a container whose own schema is unusable, with the metadata taken from
    /// a separate UTF-8 schema file.
    pub fn open_with_schema(
        path: impl AsRef<Path>,
        schema_path: impl AsRef<Path>,
        config: McdConfig,
    ) -> Result<Self> {
        let schema = fs::read(schema_path)?;
        Self::from_source_with_schema(read_binary_file_mmap(path)?, &schema, config)
    }
}

impl<S: ContainerSource> McdFile<S> {
    pub fn from_source(source: S, config: McdConfig) -> Result<Self> {
        let span = locate_metadata(&source, &config.locator)?;
        let bytes = read_document(&source, span)?;
        let xml = decode_document(&bytes, config.locator.encoding)?;
        let graph = parse_metadata(&xml)?;
        Ok(Self::assemble(source, Some(span), graph, config))
    }

    /// Use `schema` (UTF-8 bytes holding the metadata document) instead of the
    /// document embedded in `source`.
    pub fn from_source_with_schema(source: S, schema: &[u8], config: McdConfig) -> Result<Self> {
        let locator = LocatorConfig {
            encoding: TextEncoding::Utf8,
            ..config.locator.clone()
        };
        let span = locate_metadata(schema, &locator)?;
        let xml = decode_document(&schema[span.start as usize..span.end as usize], TextEncoding::Utf8)?;
        let graph = parse_metadata(&xml)?;
        Ok(Self::assemble(source, None, graph, config))
    }

    fn assemble(
        source: S,
        span: Option<MetadataSpan>,
        graph: MetadataGraph,
        config: McdConfig,
    ) -> Self {
        let layouts = resolve_all(&graph, source.len(), &config.resolver);
        let usable = layouts.values().filter(|l| l.is_ok()).count();
        debug!("{usable} of {} acquisitions have usable data ranges", layouts.len());
        Self {
            source,
            span,
            graph,
            layouts,
            config,
        }
    }

    pub fn graph(&self) -> &MetadataGraph {
        &self.graph
    }

    pub fn config(&self) -> &McdConfig {
        &self.config
    }

    /// Where the metadata was found. `None` when an external schema was used.
    pub fn metadata_span(&self) -> Option<MetadataSpan> {
        self.span
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn len(&self) -> u64 {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn acquisition_ids(&self) -> impl Iterator<Item = &str> {
        self.layouts.keys().map(String::as_str)
    }

    /// Resolution outcome of every acquisition, in document order.
    pub fn layouts(
        &self,
    ) -> &IndexMap<String, std::result::Result<AcquisitionLayout, AcquisitionError>> {
        &self.layouts
    }

    pub fn layout(&self, id: &str) -> std::result::Result<&AcquisitionLayout, AcquisitionError> {
        match self.layouts.get(id) {
            Some(Ok(layout)) => Ok(layout),
            Some(Err(err)) => Err(err.clone()),
            None => Err(AcquisitionError::Unknown(id.to_string())),
        }
    }

    /// Raw row bytes of an acquisition, exactly as stored.
    pub fn acquisition_buffer(&self, id: &str) -> std::result::Result<Vec<u8>, AcquisitionError> {
        read_acquisition_buffer(&self.source, self.layout(id)?)
    }

    /// Decode one acquisition. Failures concern only this acquisition.
    pub fn read_acquisition<T: Sample>(
        &self,
        id: &str,
    ) -> std::result::Result<McdAcquisition<T>, AcquisitionError> {
        let layout = self.layout(id)?;
        let acquisition = self
            .graph
            .acquisition(id)
            .ok_or_else(|| AcquisitionError::Unknown(id.to_string()))?;
        let stack = decode_acquisition::<T, _>(&self.source, layout, self.config.allow_narrowing)?;
        let channels = self.graph.channels(id);
        let acq = McdAcquisition::new(acquisition, &channels, layout, stack)?;
        debug!("Decoded acquisition {id}: {}", describe(&acq));
        Ok(acq)
    }

    /// Decode every acquisition in parallel, in document order.
    pub fn read_all_acquisitions<T: Sample>(
        &self,
    ) -> Vec<(String, std::result::Result<McdAcquisition<T>, AcquisitionError>)> {
        let ids: Vec<&str> = self.acquisition_ids().collect();
        ids.par_iter()
            .map(|id| (id.to_string(), self.read_acquisition::<T>(id)))
            .collect()
    }

    fn measured_channels(&self, id: &str) -> usize {
        let channels = self.graph.channels(id);
        channels.len() - leading_coordinate_channels(&channels)
    }

    /// Measured channels of an acquisition in stack order, as a table.
    pub fn channel_table(&self, id: &str) -> Result<DataFrame> {
        if self.graph.acquisition(id).is_none() {
            return Err(McdError::UnknownEntity {
                kind: EntityKind::Acquisition,
                id: id.to_string(),
            });
        }
        let channels = self.graph.channels(id);
        let skip = leading_coordinate_channels(&channels);
        Ok(ChannelPanel::from_channels(channels[skip..].iter().copied()).to_dataframe()?)
    }

    fn embedded_image<E: RawFields>(
        &self,
        kind: EntityKind,
        id: &str,
        entity: &E,
        start: &str,
        end: &str,
    ) -> Result<Option<Vec<u8>>> {
        let offset = |key: &str| {
            entity
                .field_as::<u64>(key)
                .unwrap_or(0)
                .checked_add(IMAGE_OFFSET_FIX)
                .ok_or_else(|| McdError::ImageOffsetOverflow {
                    kind,
                    id: id.to_string(),
                })
        };
        let (start, end) = (offset(start)?, offset(end)?);
        if start == end {
            return Ok(None);
        }
        Ok(Some(self.source.read_range(start..end)?))
    }

    /// Encoded bytes of the slide overview image, `None` when there is none.
    pub fn slide_image(&self, slide_id: &str) -> Result<Option<Vec<u8>>> {
        let slide = self.graph.slide(slide_id).ok_or_else(|| McdError::UnknownEntity {
            kind: EntityKind::Slide,
            id: slide_id.to_string(),
        })?;
        self.embedded_image(
            EntityKind::Slide,
            slide_id,
            slide,
            field::IMAGE_START_OFFSET,
            field::IMAGE_END_OFFSET,
        )
    }

    /// Encoded bytes of a panorama image, `None` when there is none.
    pub fn panorama_image(&self, panorama_id: &str) -> Result<Option<Vec<u8>>> {
        let panorama = self
            .graph
            .panorama(panorama_id)
            .ok_or_else(|| McdError::UnknownEntity {
                kind: EntityKind::Panorama,
                id: panorama_id.to_string(),
            })?;
        self.embedded_image(
            EntityKind::Panorama,
            panorama_id,
            panorama,
            field::IMAGE_START_OFFSET,
            field::IMAGE_END_OFFSET,
        )
    }

    /// Encoded bytes of the optical image taken before or after ablation.
    pub fn ablation_image(&self, acquisition_id: &str, which: AblationImage) -> Result<Option<Vec<u8>>> {
        let acquisition = self
            .graph
            .acquisition(acquisition_id)
            .ok_or_else(|| McdError::UnknownEntity {
                kind: EntityKind::Acquisition,
                id: acquisition_id.to_string(),
            })?;
        let (start, end) = match which {
            AblationImage::Before => (
                field::BEFORE_ABLATION_IMAGE_START_OFFSET,
                field::BEFORE_ABLATION_IMAGE_END_OFFSET,
            ),
            AblationImage::After => (
                field::AFTER_ABLATION_IMAGE_START_OFFSET,
                field::AFTER_ABLATION_IMAGE_END_OFFSET,
            ),
        };
        self.embedded_image(EntityKind::Acquisition, acquisition_id, acquisition, start, end)
    }

    /// Human readable overview of the container contents.
    pub fn summary(&self) -> String {
        let mut result = String::new();

        result.push_str("MCD container:\n");
        result.push_str(&format!("  Size: {} bytes\n", self.len()));
        match self.span {
            Some(span) => result.push_str(&format!(
                "  Metadata: bytes {}..{}\n",
                span.start, span.end
            )),
            None => result.push_str("  Metadata: external schema\n"),
        }

        for slide in self.graph.slides() {
            result.push_str(&format!(
                "\nSlide {}: {}\n",
                slide.id,
                slide.description.as_deref().unwrap_or("-")
            ));
            for panorama in self.graph.panoramas(Some(&slide.id)) {
                result.push_str(&format!(
                    "  Panorama {}: {}\n",
                    panorama.id,
                    panorama.description.as_deref().unwrap_or("-")
                ));
            }
        }

        result.push_str("\nAcquisitions:\n");
        for acq in self.graph.acquisitions(AcquisitionFilter::All) {
            let state = match self.layouts.get(&acq.id) {
                Some(Ok(layout)) if layout.is_partial() => {
                    format!("partial, {} of {} rows", layout.nrows, layout.declared_rows)
                }
                Some(Ok(layout)) => format!("{} rows", layout.nrows),
                Some(Err(err)) => format!("unreadable: {err}"),
                None => "unresolved".to_string(),
            };
            result.push_str(&format!(
                "  {} ({}): {} channels, {}\n",
                acq.id,
                acq.description.as_deref().unwrap_or("-"),
                self.measured_channels(&acq.id),
                state
            ));
        }

        let unresolved = self.graph.reference_errors().len();
        if unresolved > 0 {
            result.push_str(&format!("\n{unresolved} unresolved references\n"));
        }
        result
    }
}

/// Shape and channel order of a decoded acquisition, for logging.
pub(crate) fn describe<A: AcquisitionAccess>(acq: &A) -> String {
    match acq.shape() {
        Ok(shape) => format!(
            "{}x{}x{} [{}]",
            shape.channels,
            shape.height,
            shape.width,
            acq.metals().join(", ")
        ),
        Err(err) => err.to_string(),
    }
}
