//! Identifier-keyed arena of metadata entities.
//!
//! The graph is assembled once by the metadata parser and is read-only afterwards.
//! Entities never point at each other: every relation is an identifier that is looked
//! up on demand, so the order of elements in the source document is irrelevant.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use indexmap::IndexMap;
use indexmap::map::Entry;
use log::{debug, warn};

use crate::error::ReferenceError;
use crate::types::entities::{
    Acquisition, AcquisitionRoi, Channel, EntityKind, FieldTable, Panorama, RawFields, RoiPoint,
    Slide, field,
};
use crate::types::provenance::ProvenanceTable;

/// Lookup key of an entity. Channels are scoped by their acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKey<'a> {
    Slide(&'a str),
    Panorama(&'a str),
    Acquisition(&'a str),
    AcquisitionRoi(&'a str),
    RoiPoint(&'a str),
    Channel { acquisition: &'a str, channel: &'a str },
}

impl EntityKey<'_> {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Slide(_) => EntityKind::Slide,
            Self::Panorama(_) => EntityKind::Panorama,
            Self::Acquisition(_) => EntityKind::Acquisition,
            Self::AcquisitionRoi(_) => EntityKind::AcquisitionRoi,
            Self::RoiPoint(_) => EntityKind::RoiPoint,
            Self::Channel { .. } => EntityKind::Channel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityRef<'a> {
    Slide(&'a Slide),
    Panorama(&'a Panorama),
    Acquisition(&'a Acquisition),
    AcquisitionRoi(&'a AcquisitionRoi),
    RoiPoint(&'a RoiPoint),
    Channel(&'a Channel),
}

impl<'a> EntityRef<'a> {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Slide(_) => EntityKind::Slide,
            Self::Panorama(_) => EntityKind::Panorama,
            Self::Acquisition(_) => EntityKind::Acquisition,
            Self::AcquisitionRoi(_) => EntityKind::AcquisitionRoi,
            Self::RoiPoint(_) => EntityKind::RoiPoint,
            Self::Channel(_) => EntityKind::Channel,
        }
    }

    pub fn fields(&self) -> &'a FieldTable {
        match self {
            Self::Slide(e) => e.fields(),
            Self::Panorama(e) => e.fields(),
            Self::Acquisition(e) => e.fields(),
            Self::AcquisitionRoi(e) => e.fields(),
            Self::RoiPoint(e) => e.fields(),
            Self::Channel(e) => e.fields(),
        }
    }
}

/// Restricts [`MetadataGraph::acquisitions`] to one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionFilter<'a> {
    #[default]
    All,
    Panorama(&'a str),
    Slide(&'a str),
}

type ChannelKey = (String, String);

#[derive(Debug, Clone, Default)]
pub struct MetadataGraph {
    slides: IndexMap<String, Slide>,
    panoramas: IndexMap<String, Panorama>,
    rois: IndexMap<String, AcquisitionRoi>,
    roi_points: IndexMap<String, RoiPoint>,
    acquisitions: IndexMap<String, Acquisition>,
    channels: IndexMap<ChannelKey, Channel>,
    provenance: ProvenanceTable,
    reference_errors: Vec<ReferenceError>,
    namespace: Option<String>,
    schema_xml: String,
}

fn lookup<'a, V>(
    map: &'a IndexMap<String, V>,
    from: EntityKind,
    from_id: &str,
    target: EntityKind,
    target_id: Option<&str>,
) -> Result<&'a V, ReferenceError> {
    target_id.and_then(|id| map.get(id)).ok_or_else(|| ReferenceError {
        from,
        from_id: from_id.to_string(),
        target,
        target_id: target_id.map(str::to_string),
    })
}

impl MetadataGraph {
    pub fn slides(&self) -> impl Iterator<Item = &Slide> {
        self.slides.values()
    }

    pub fn slide(&self, id: &str) -> Option<&Slide> {
        self.slides.get(id)
    }

    /// Panoramas in document order, optionally only those of one slide.
    pub fn panoramas<'a>(&'a self, slide_id: Option<&'a str>) -> impl Iterator<Item = &'a Panorama> {
        self.panoramas
            .values()
            .filter(move |p| slide_id.is_none() || p.slide_id.as_deref() == slide_id)
    }

    pub fn panorama(&self, id: &str) -> Option<&Panorama> {
        self.panoramas.get(id)
    }

    pub fn acquisition_rois(&self) -> impl Iterator<Item = &AcquisitionRoi> {
        self.rois.values()
    }

    pub fn acquisition_roi(&self, id: &str) -> Option<&AcquisitionRoi> {
        self.rois.get(id)
    }

    pub fn acquisition(&self, id: &str) -> Option<&Acquisition> {
        self.acquisitions.get(id)
    }

    pub fn acquisition_ids(&self) -> impl Iterator<Item = &str> {
        self.acquisitions.keys().map(String::as_str)
    }

    /// Acquisitions in document order. Acquisitions whose parent chain does not
    /// resolve are only returned by [`AcquisitionFilter::All`].
    pub fn acquisitions(&self, filter: AcquisitionFilter<'_>) -> Vec<&Acquisition> {
        self.acquisitions
            .values()
            .filter(|acq| match filter {
                AcquisitionFilter::All => true,
                AcquisitionFilter::Panorama(id) => self
                    .panorama_of_acquisition(acq)
                    .is_ok_and(|p| p.id == id),
                AcquisitionFilter::Slide(id) => {
                    self.slide_of_acquisition(acq).is_ok_and(|s| s.id == id)
                }
            })
            .collect()
    }

    /// Channels of an acquisition in ordinal order.
    ///
    /// Channels without an ordinal sort last, in document order.
    pub fn channels(&self, acquisition_id: &str) -> Vec<&Channel> {
        let mut channels: Vec<&Channel> = self
            .channels
            .iter()
            .filter(|((acq, _), _)| acq == acquisition_id)
            .map(|(_, channel)| channel)
            .collect();
        channels.sort_by_key(|c| (c.ordinal.is_none(), c.ordinal));
        channels
    }

    pub fn channel(&self, acquisition_id: &str, channel_id: &str) -> Option<&Channel> {
        self.channels
            .get(&(acquisition_id.to_string(), channel_id.to_string()))
    }

    /// Polygon vertices of an ROI in insertion order.
    pub fn roi_points(&self, roi_id: &str) -> Vec<&RoiPoint> {
        self.roi_points
            .values()
            .filter(|p| p.roi_id.as_deref() == Some(roi_id))
            .collect()
    }

    pub fn roi_of_acquisition(&self, acq: &Acquisition) -> Result<&AcquisitionRoi, ReferenceError> {
        lookup(
            &self.rois,
            EntityKind::Acquisition,
            &acq.id,
            EntityKind::AcquisitionRoi,
            acq.roi_id.as_deref(),
        )
    }

    pub fn panorama_of_roi(&self, roi: &AcquisitionRoi) -> Result<&Panorama, ReferenceError> {
        lookup(
            &self.panoramas,
            EntityKind::AcquisitionRoi,
            &roi.id,
            EntityKind::Panorama,
            roi.panorama_id.as_deref(),
        )
    }

    pub fn slide_of_panorama(&self, panorama: &Panorama) -> Result<&Slide, ReferenceError> {
        lookup(
            &self.slides,
            EntityKind::Panorama,
            &panorama.id,
            EntityKind::Slide,
            panorama.slide_id.as_deref(),
        )
    }

    pub fn panorama_of_acquisition(&self, acq: &Acquisition) -> Result<&Panorama, ReferenceError> {
        self.panorama_of_roi(self.roi_of_acquisition(acq)?)
    }

    pub fn slide_of_acquisition(&self, acq: &Acquisition) -> Result<&Slide, ReferenceError> {
        self.slide_of_panorama(self.panorama_of_acquisition(acq)?)
    }

    pub fn acquisition_of_channel(&self, channel: &Channel) -> Result<&Acquisition, ReferenceError> {
        lookup(
            &self.acquisitions,
            EntityKind::Channel,
            &channel.id,
            EntityKind::Acquisition,
            channel.acquisition_id.as_deref(),
        )
    }

    pub fn resolve(&self, key: EntityKey<'_>) -> Option<EntityRef<'_>> {
        match key {
            EntityKey::Slide(id) => self.slides.get(id).map(EntityRef::Slide),
            EntityKey::Panorama(id) => self.panoramas.get(id).map(EntityRef::Panorama),
            EntityKey::Acquisition(id) => self.acquisitions.get(id).map(EntityRef::Acquisition),
            EntityKey::AcquisitionRoi(id) => self.rois.get(id).map(EntityRef::AcquisitionRoi),
            EntityKey::RoiPoint(id) => self.roi_points.get(id).map(EntityRef::RoiPoint),
            EntityKey::Channel {
                acquisition,
                channel,
            } => self.channel(acquisition, channel).map(EntityRef::Channel),
        }
    }

    /// Every entity of one kind, in document order.
    pub fn entities(&self, kind: EntityKind) -> Vec<EntityRef<'_>> {
        match kind {
            EntityKind::Slide => self.slides.values().map(EntityRef::Slide).collect(),
            EntityKind::Panorama => self.panoramas.values().map(EntityRef::Panorama).collect(),
            EntityKind::Acquisition => self
                .acquisitions
                .values()
                .map(EntityRef::Acquisition)
                .collect(),
            EntityKind::AcquisitionRoi => self.rois.values().map(EntityRef::AcquisitionRoi).collect(),
            EntityKind::RoiPoint => self.roi_points.values().map(EntityRef::RoiPoint).collect(),
            EntityKind::Channel => self.channels.values().map(EntityRef::Channel).collect(),
        }
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Slide => self.slides.len(),
            EntityKind::Panorama => self.panoramas.len(),
            EntityKind::Acquisition => self.acquisitions.len(),
            EntityKind::AcquisitionRoi => self.rois.len(),
            EntityKind::RoiPoint => self.roi_points.len(),
            EntityKind::Channel => self.channels.len(),
        }
    }

    pub fn provenance(&self) -> &ProvenanceTable {
        &self.provenance
    }

    /// Unresolved references found while the graph was built.
    pub fn reference_errors(&self) -> &[ReferenceError] {
        &self.reference_errors
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The decoded metadata document exactly as located in the container.
    pub fn schema_xml(&self) -> &str {
        &self.schema_xml
    }
}

fn insert_unique<K: Hash + Eq + Debug, V>(
    map: &mut IndexMap<K, V>,
    kind: EntityKind,
    key: K,
    value: V,
) {
    match map.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(value);
        }
        Entry::Occupied(existing) => {
            warn!("Duplicate {kind} {:?} ignored, keeping the first", existing.key());
        }
    }
}

/// Accumulates parsed element records into a [`MetadataGraph`].
#[derive(Debug, Default)]
pub(crate) struct GraphBuilder {
    graph: MetadataGraph,
    unnamed: HashMap<String, usize>,
}

impl GraphBuilder {
    pub(crate) fn set_namespace(&mut self, namespace: Option<String>) {
        self.graph.namespace = namespace;
    }

    /// Add one top-level record element and its leaf fields.
    pub(crate) fn push_record(&mut self, element: &str, fields: FieldTable) {
        let kind = EntityKind::from_element_name(element);
        self.record_provenance(element, kind, &fields);

        let Some(kind) = kind else {
            debug!("Ignoring unrecognised metadata element {element}");
            return;
        };
        let graph = &mut self.graph;
        let inserted = match kind {
            EntityKind::Slide => Slide::from_fields(fields)
                .map(|e| insert_unique(&mut graph.slides, kind, e.id.clone(), e)),
            EntityKind::Panorama => Panorama::from_fields(fields)
                .map(|e| insert_unique(&mut graph.panoramas, kind, e.id.clone(), e)),
            EntityKind::AcquisitionRoi => AcquisitionRoi::from_fields(fields)
                .map(|e| insert_unique(&mut graph.rois, kind, e.id.clone(), e)),
            EntityKind::RoiPoint => RoiPoint::from_fields(fields)
                .map(|e| insert_unique(&mut graph.roi_points, kind, e.id.clone(), e)),
            EntityKind::Acquisition => Acquisition::from_fields(fields)
                .map(|e| insert_unique(&mut graph.acquisitions, kind, e.id.clone(), e)),
            EntityKind::Channel => Channel::from_fields(fields).map(|e| {
                let key = (e.acquisition_id.clone().unwrap_or_default(), e.id.clone());
                insert_unique(&mut graph.channels, kind, key, e)
            }),
        };
        if inserted.is_none() {
            warn!("{kind} element without an {} skipped", field::ID);
        }
    }

    fn record_provenance(&mut self, element: &str, kind: Option<EntityKind>, fields: &FieldTable) {
        let id = fields
            .get(field::ID)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty());
        let qualifier = match (kind, id) {
            (Some(EntityKind::Channel), Some(id)) => {
                let acq = fields
                    .get(field::ACQUISITION_ID)
                    .map(|v| v.trim())
                    .unwrap_or_default();
                format!("{acq}/{id}")
            }
            (_, Some(id)) => id.to_string(),
            (_, None) => {
                let counter = self.unnamed.entry(element.to_string()).or_default();
                *counter += 1;
                format!("#{}", *counter - 1)
            }
        };
        for (name, value) in fields {
            self.graph
                .provenance
                .insert_first(format!("{element}[{qualifier}].{name}"), value.clone());
        }
    }

    pub(crate) fn finish(self, schema_xml: String) -> MetadataGraph {
        let mut graph = self.graph;
        graph.schema_xml = schema_xml;

        let mut errors = Vec::new();
        for p in graph.panoramas.values() {
            errors.extend(graph.slide_of_panorama(p).err());
        }
        for roi in graph.rois.values() {
            errors.extend(graph.panorama_of_roi(roi).err());
        }
        for point in graph.roi_points.values() {
            errors.extend(
                lookup(
                    &graph.rois,
                    EntityKind::RoiPoint,
                    &point.id,
                    EntityKind::AcquisitionRoi,
                    point.roi_id.as_deref(),
                )
                .err(),
            );
        }
        for acq in graph.acquisitions.values() {
            errors.extend(graph.roi_of_acquisition(acq).err());
        }
        for channel in graph.channels.values() {
            errors.extend(graph.acquisition_of_channel(channel).err());
        }
        for err in &errors {
            warn!("Unresolved metadata reference: {err}");
        }
        graph.reference_errors = errors;
        graph
    }
}
