//! Type definitions for the MCD container

pub mod entities;
pub mod graph;
pub mod image_stack;
pub mod layout;
pub mod provenance;

pub use entities::{
    Acquisition, AcquisitionRoi, Channel, EntityKind, FieldTable, Panorama, RawFields, RoiPoint,
    Slide,
};
pub use graph::{AcquisitionFilter, EntityKey, EntityRef, MetadataGraph};
pub use image_stack::{ImageStack, Precision, Sample, StackShape};
pub use layout::{AcquisitionLayout, AcquisitionStatus, TruncatedAcquisition, ValueWidth};
pub use provenance::ProvenanceTable;
