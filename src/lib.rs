//! Reader for imaging mass cytometry MCD containers.
//!
//! An MCD file has no fixed header: raw acquisition rows sit at offsets declared by
//! an XML schema stored near the end of the same file. [`McdFile`] locates and
//! parses the schema, validates every acquisition range, and decodes acquisitions
//! on request into `[channel, height, width]` stacks in channel ordinal order.
//! OME-TIFF and text exports are read into the same [`AcquisitionAccess`] contract.

pub mod access;
pub mod config;
pub mod error;
pub mod mcd_file;
pub mod parser;
pub mod processing;
pub mod types;
pub mod utils;

pub use access::{AcquisitionAccess, McdAcquisition, OmeTiffAcquisition, TextAcquisition};
pub use config::{LocatorConfig, McdConfig, ResolverConfig, TextEncoding};
pub use error::{
    AcquisitionError, AdapterError, ChannelError, ContainerFormatError, CorruptReason, McdError,
    MetadataParseError, ReferenceError, Result,
};
pub use mcd_file::{AblationImage, McdFile};
pub use types::{
    AcquisitionFilter, AcquisitionLayout, AcquisitionStatus, EntityKind, ImageStack,
    MetadataGraph, Sample, StackShape,
};
pub use utils::{ChannelPanel, ContainerSource, ReaderSource};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    use crate::utils::misc::encode_utf16le;

    fn container() -> Vec<u8> {
        let mut bytes = b"MCD-container-prefix".to_vec();
        let start = bytes.len();
        for row in 0..6u32 {
            for channel in 0..2u32 {
                bytes.extend_from_slice(&((row * 10 + channel) as f32).to_le_bytes());
            }
        }
        let end = bytes.len();
        let xml = format!(
            "<MCDSchema xmlns=\"http://www.fluidigm.com/IMC/MCDSchema_V2_0.xsd\">\
             <Acquisition><ID>1</ID><Description>ROI 1</Description>\
             <DataStartOffset>{start}</DataStartOffset><DataEndOffset>{end}</DataEndOffset>\
             <ValueBytes>4</ValueBytes><MaxX>3</MaxX><MaxY>2</MaxY></Acquisition>\
             <AcquisitionChannel><ID>7</ID><AcquisitionID>1</AcquisitionID><OrderNumber>1</OrderNumber>\
             <ChannelName>Ir(193)</ChannelName><ChannelLabel>DNA2</ChannelLabel></AcquisitionChannel>\
             <AcquisitionChannel><ID>6</ID><AcquisitionID>1</AcquisitionID><OrderNumber>0</OrderNumber>\
             <ChannelName>Ir(191)</ChannelName><ChannelLabel>DNA1</ChannelLabel></AcquisitionChannel>\
             </MCDSchema>"
        );
        bytes.extend_from_slice(&encode_utf16le(&xml));
        bytes
    }

    #[test]
    fn open_container_from_disk() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(&container())?;
        file.flush()?;

        let mcd = McdFile::open(file.path())?;
        assert_eq!(mcd.acquisition_ids().collect::<Vec<_>>(), ["1"]);

        let acq = mcd.read_acquisition::<f64>("1")?;
        assert_eq!(acq.description(), Some("ROI 1"));
        assert_eq!(acq.labels(), ["DNA1", "DNA2"]);
        assert_eq!(acq.masses(), [Some(191.0), Some(193.0)]);
        let shape = acq.shape()?;
        assert_eq!((shape.channels, shape.height, shape.width), (2, 2, 3));
        // Row 4 is pixel (y=1, x=1).
        assert_eq!(acq.plane_by_metal("Ir(193)")?[[1, 1]], 41.0);
        Ok(())
    }

    #[test]
    fn seekable_reader_matches_memory_map() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let bytes = container();
        let from_reader = McdFile::from_source(ReaderSource::new(Cursor::new(bytes.clone()))?, McdConfig::default())?;
        let from_bytes = McdFile::from_source(bytes, McdConfig::default())?;
        assert_eq!(
            from_reader.read_acquisition::<f32>("1")?,
            from_bytes.read_acquisition::<f32>("1")?
        );
        Ok(())
    }
}
