use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, ChannelQuery};
use crate::types::entities::Channel;
use crate::utils::misc::mass_from_metal;

/// Ordered channel metadata of one image stack.
///
/// Position `i` of every list describes plane `i` of the stack.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelPanel {
    labels: Vec<String>,
    metals: Vec<String>,
    masses: Vec<Option<f64>>,
}

impl ChannelPanel {
    pub fn new(labels: Vec<String>, metals: Vec<String>, masses: Vec<Option<f64>>) -> Self {
        Self {
            labels,
            metals,
            masses,
        }
    }

    /// Masses are derived from the metal tags.
    pub fn from_labels_and_metals(labels: Vec<String>, metals: Vec<String>) -> Self {
        let masses = metals.iter().map(|m| mass_from_metal(m)).collect();
        Self::new(labels, metals, masses)
    }

    /// Panel of channels already in ordinal order. Missing text becomes empty.
    pub fn from_channels<'a>(channels: impl IntoIterator<Item = &'a Channel>) -> Self {
        let (labels, metals): (Vec<_>, Vec<_>) = channels
            .into_iter()
            .map(|c| {
                (
                    c.label.clone().unwrap_or_default(),
                    c.metal.clone().unwrap_or_default(),
                )
            })
            .unzip();
        Self::from_labels_and_metals(labels, metals)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn metals(&self) -> &[String] {
        &self.metals
    }

    pub fn masses(&self) -> &[Option<f64>] {
        &self.masses
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// All lists must have one entry per plane.
    pub fn validate(&self, planes: usize) -> Result<(), ChannelError> {
        let (labels, metals, masses) = (self.labels.len(), self.metals.len(), self.masses.len());
        if labels == planes && metals == planes && masses == planes {
            Ok(())
        } else {
            Err(ChannelError::MetadataMismatch {
                labels,
                masses,
                metals,
                planes,
            })
        }
    }

    pub fn check_index(&self, index: usize) -> Result<usize, ChannelError> {
        if index < self.len() {
            Ok(index)
        } else {
            Err(ChannelError::NotFound(ChannelQuery::Index(index)))
        }
    }

    pub fn index_of_label(&self, label: &str) -> Result<usize, ChannelError> {
        exact_index(&self.labels, label, || ChannelQuery::Label(label.to_string()))
    }

    pub fn index_of_metal(&self, metal: &str) -> Result<usize, ChannelError> {
        exact_index(&self.metals, metal, || ChannelQuery::Metal(metal.to_string()))
    }

    /// Panel as a table with `ordinal`, `label`, `metal` and `mass` columns.
    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        let ordinals: Vec<u32> = (0..self.len() as u32).collect();
        DataFrame::new(vec![
            Series::new("ordinal".into(), &ordinals).into(),
            Series::new("label".into(), &self.labels).into(),
            Series::new("metal".into(), &self.metals).into(),
            Series::new("mass".into(), &self.masses).into(),
        ])
    }
}

fn exact_index(
    values: &[String],
    wanted: &str,
    query: impl FnOnce() -> ChannelQuery,
) -> Result<usize, ChannelError> {
    let indices: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.as_str() == wanted)
        .map(|(i, _)| i)
        .collect();
    match indices.as_slice() {
        [] => Err(ChannelError::NotFound(query())),
        [index] => Ok(*index),
        _ => Err(ChannelError::Ambiguous {
            query: query(),
            indices,
        }),
    }
}
