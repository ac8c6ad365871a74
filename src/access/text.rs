//! Tab-separated text exports: one row per pixel, one column per channel.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use log::debug;
use ndarray::Array3;
use regex::Regex;

use crate::access::{AcquisitionAccess, acquisition_id_from_path};
use crate::error::AdapterError;
use crate::types::image_stack::{ImageStack, Sample};
use crate::utils::channel_panel::ChannelPanel;

/// Leading columns of every export; channels follow.
pub const LEADING_COLUMNS: [&str; 6] = ["Start_push", "End_push", "Pushes_duration", "X", "Y", "Z"];

static LAST_PARENTHESISED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*\((.*?)\)[^(]*$").expect("static regex is valid"));

/// Metal tag of a channel column, e.g. `CD3(Er170Di)` is `Er(170)` and
/// `80ArAr(ArAr80Di)` is `ArAr(80)`.
pub fn metal_from_column(column: &str) -> String {
    let column = column.trim();
    let tag = LAST_PARENTHESISED
        .captures(column)
        .and_then(|c| c.get(1))
        .map_or(column, |m| m.as_str());
    let tag = tag.trim_end_matches(['d', 'i']).trim_end_matches(['D', 'i']);
    let element: String = tag.chars().filter(|c| !c.is_ascii_digit()).collect();
    let mass: String = tag.chars().filter(char::is_ascii_digit).collect();
    if mass.is_empty() {
        element
    } else {
        format!("{element}({mass})")
    }
}

fn coordinate(value: Option<&str>, axis: &str, line: usize) -> Result<usize, AdapterError> {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| *v >= 0.0 && v.fract() == 0.0 && *v <= f64::from(u32::MAX))
        .map(|v| v as usize)
        .ok_or_else(|| AdapterError::InvalidText(format!("line {line}: invalid {axis} coordinate")))
}

/// An acquisition read from a text export.
#[derive(Debug, Clone, PartialEq)]
pub struct TextAcquisition<T> {
    id: Option<String>,
    panel: ChannelPanel,
    stack: ImageStack<T>,
}

impl<T: Sample> TextAcquisition<T> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let path = path.as_ref();
        let mut acq = Self::from_reader(File::open(path)?)?;
        acq.id = acquisition_id_from_path(path, ".txt");
        Ok(acq)
    }

    /// Image width and height are the largest `X` and `Y` plus one. When the rows
    /// cannot fill that rectangle the last scan line is incomplete and dropped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AdapterError> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let columns: Vec<&str> = headers.iter().collect();
        if columns.len() <= LEADING_COLUMNS.len() || columns[..LEADING_COLUMNS.len()] != LEADING_COLUMNS
        {
            return Err(AdapterError::InvalidText(format!(
                "expected the first columns to be {LEADING_COLUMNS:?} followed by channels"
            )));
        }
        let labels: Vec<String> = columns[LEADING_COLUMNS.len()..]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let metals = labels.iter().map(|l| metal_from_column(l)).collect();

        let mut pixels: Vec<(usize, usize, Vec<T>)> = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            // Header is line 1.
            let line = row + 2;
            let x = coordinate(record.get(3), "X", line)?;
            let y = coordinate(record.get(4), "Y", line)?;
            let values = record
                .iter()
                .skip(LEADING_COLUMNS.len())
                .map(|v| {
                    v.parse::<T>().map_err(|_| {
                        AdapterError::InvalidText(format!("line {line}: {v:?} is not a number"))
                    })
                })
                .collect::<Result<Vec<T>, _>>()?;
            pixels.push((x, y, values));
        }
        if pixels.is_empty() {
            return Err(AdapterError::InvalidText("no pixel rows".to_string()));
        }

        let extent = |axis: fn(&(usize, usize, Vec<T>)) -> usize| {
            pixels.iter().map(axis).max().and_then(|m| m.checked_add(1)).unwrap_or(0)
        };
        let width = extent(|p| p.0);
        let mut height = extent(|p| p.1);
        let fits = |height: usize| width.checked_mul(height).is_some_and(|n| n <= pixels.len());
        if !fits(height) {
            height -= 1;
        }
        if height == 0 || !fits(height) {
            return Err(AdapterError::InvalidText(format!(
                "X/Y coordinates do not fit the {} rows read",
                pixels.len()
            )));
        }
        debug!(
            "Text export with {} channels, {width}x{height} pixels from {} rows",
            labels.len(),
            pixels.len()
        );

        let mut data = Array3::from_elem((labels.len(), height, width), T::default());
        for (x, y, values) in pixels {
            if y < height {
                for (c, value) in values.into_iter().enumerate() {
                    data[[c, y, x]] = value;
                }
            }
        }

        let acq = Self {
            id: None,
            panel: ChannelPanel::from_labels_and_metals(labels, metals),
            stack: ImageStack::new(data),
        };
        acq.validate_channels()?;
        Ok(acq)
    }

    /// Acquisition id taken from the export file name.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl<T: Sample> AcquisitionAccess for TextAcquisition<T> {
    type Value = T;

    fn panel(&self) -> &ChannelPanel {
        &self.panel
    }

    fn image_stack(&self) -> &ImageStack<T> {
        &self.stack
    }
}
