//! Synthetic MCD containers for integration tests.
#![allow(dead_code)]

use mcd::utils::encode_utf16le;

pub const PREFIX_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub id: String,
    pub ordinal: u32,
    pub metal: String,
    pub label: String,
}

/// One acquisition. `rows` hold one value per channel in ordinal order.
#[derive(Debug, Clone)]
pub struct AcquisitionSpec {
    pub id: String,
    pub channels: Vec<ChannelSpec>,
    pub rows: Vec<Vec<f32>>,
    pub width: Option<u32>,
    /// Added to the declared `DataEndOffset`.
    pub end_adjust: i64,
}

impl AcquisitionSpec {
    /// Channels `0..channels` with metal `M(100 + i)` and label `L<i>`; row `r`
    /// channel `c` holds `r * 100 + c`.
    pub fn grid(id: &str, channels: usize, nrows: usize, width: Option<u32>) -> Self {
        Self {
            id: id.to_string(),
            channels: (0..channels)
                .map(|i| ChannelSpec {
                    id: (i + 1).to_string(),
                    ordinal: i as u32,
                    metal: format!("M({})", 100 + i),
                    label: format!("L{i}"),
                })
                .collect(),
            rows: (0..nrows)
                .map(|r| (0..channels).map(|c| (r * 100 + c) as f32).collect())
                .collect(),
            width,
            end_adjust: 0,
        }
    }
}

/// Where the schema goes relative to the acquisition data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaPlacement {
    /// The instrument layout: data first, schema at the end.
    AfterData,
    /// Schema first, so truncating the file cuts into the last acquisition.
    BeforeData,
}

#[derive(Debug, Clone)]
pub struct Built {
    pub bytes: Vec<u8>,
    /// Declared `[start, end)` of every acquisition, before `end_adjust`.
    pub ranges: Vec<(u64, u64)>,
    pub xml: String,
}

#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    acquisitions: Vec<AcquisitionSpec>,
    stale_schema: Option<String>,
    element_keys: Vec<u32>,
    placement: SchemaPlacement,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            acquisitions: Vec::new(),
            stale_schema: None,
            element_keys: Vec::new(),
            placement: SchemaPlacement::AfterData,
        }
    }

    pub fn acquisition(mut self, spec: AcquisitionSpec) -> Self {
        self.acquisitions.push(spec);
        self
    }

    /// An outdated schema copy written before the authoritative one.
    pub fn stale_schema(mut self, xml: &str) -> Self {
        self.stale_schema = Some(xml.to_string());
        self
    }

    /// Reorder schema elements by sorting on these keys (cycled over elements).
    pub fn element_order(mut self, keys: Vec<u32>) -> Self {
        self.element_keys = keys;
        self
    }

    pub fn placement(mut self, placement: SchemaPlacement) -> Self {
        self.placement = placement;
        self
    }

    fn elements(&self, ranges: &[(u64, u64)]) -> Vec<String> {
        let mut elements = vec![
            "<Slide><ID>0</ID><Description>synthetic</Description></Slide>".to_string(),
            "<Panorama><ID>1</ID><SlideID>0</SlideID><PixelWidth>100</PixelWidth><PixelHeight>100</PixelHeight></Panorama>"
                .to_string(),
            "<AcquisitionROI><ID>2</ID><PanoramaID>1</PanoramaID></AcquisitionROI>".to_string(),
        ];
        for (spec, (start, end)) in self.acquisitions.iter().zip(ranges) {
            let end = (*end as i64 + spec.end_adjust).max(0);
            let width = spec
                .width
                .map(|w| format!("<MaxX>{w}</MaxX>"))
                .unwrap_or_default();
            elements.push(format!(
                "<Acquisition><ID>{}</ID><Description>ROI {}</Description><AcquisitionROIID>2</AcquisitionROIID>\
                 <DataStartOffset>{start:012}</DataStartOffset><DataEndOffset>{end:012}</DataEndOffset>\
                 <ValueBytes>4</ValueBytes>{width}</Acquisition>",
                spec.id, spec.id
            ));
            for channel in &spec.channels {
                elements.push(format!(
                    "<AcquisitionChannel><ID>{}</ID><AcquisitionID>{}</AcquisitionID><OrderNumber>{}</OrderNumber>\
                     <ChannelName>{}</ChannelName><ChannelLabel>{}</ChannelLabel></AcquisitionChannel>",
                    channel.id, spec.id, channel.ordinal, channel.metal, channel.label
                ));
            }
        }
        if !self.element_keys.is_empty() {
            let keys = &self.element_keys;
            let mut keyed: Vec<(u32, String)> = elements
                .into_iter()
                .enumerate()
                .map(|(i, e)| (keys[i % keys.len()], e))
                .collect();
            keyed.sort_by_key(|(k, _)| *k);
            elements = keyed.into_iter().map(|(_, e)| e).collect();
        }
        elements
    }

    fn schema(&self, ranges: &[(u64, u64)]) -> String {
        format!(
            "<MCDSchema xmlns=\"http://www.fluidigm.com/IMC/MCDSchema_V2_0.xsd\">{}</MCDSchema>",
            self.elements(ranges).concat()
        )
    }

    fn data_len(spec: &AcquisitionSpec) -> u64 {
        spec.rows.iter().map(|r| r.len() as u64 * 4).sum()
    }

    fn ranges(&self, data_start: u64) -> Vec<(u64, u64)> {
        let mut offset = data_start;
        self.acquisitions
            .iter()
            .map(|spec| {
                let start = offset;
                offset += Self::data_len(spec);
                (start, offset)
            })
            .collect()
    }

    pub fn build(&self) -> Built {
        let mut bytes = vec![0x5Au8; PREFIX_LEN];
        let stale = self
            .stale_schema
            .as_deref()
            .map(encode_utf16le)
            .unwrap_or_default();

        let data_start = match self.placement {
            SchemaPlacement::AfterData => PREFIX_LEN as u64,
            SchemaPlacement::BeforeData => {
                // Offsets are fixed width, so the schema length does not depend on them.
                let schema_len = encode_utf16le(&self.schema(&self.ranges(0))).len();
                (PREFIX_LEN + stale.len() + schema_len) as u64
            }
        };
        let ranges = self.ranges(data_start);
        let xml = self.schema(&ranges);
        let schema = encode_utf16le(&xml);

        let write_data = |bytes: &mut Vec<u8>| {
            for spec in &self.acquisitions {
                for row in &spec.rows {
                    for value in row {
                        bytes.extend_from_slice(&value.to_le_bytes());
                    }
                }
            }
        };
        match self.placement {
            SchemaPlacement::AfterData => {
                write_data(&mut bytes);
                bytes.extend_from_slice(&stale);
                bytes.extend_from_slice(&schema);
            }
            SchemaPlacement::BeforeData => {
                bytes.extend_from_slice(&stale);
                bytes.extend_from_slice(&schema);
                write_data(&mut bytes);
            }
        }
        Built { bytes, ranges, xml }
    }
}
