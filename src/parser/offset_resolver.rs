//! Validation of acquisition data ranges against the container.

use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, warn};

use crate::config::ResolverConfig;
use crate::error::{AcquisitionError, CorruptReason};
use crate::types::entities::{Acquisition, field, leading_coordinate_channels};
use crate::types::graph::MetadataGraph;
use crate::types::layout::{
    AcquisitionLayout, AcquisitionStatus, TruncatedAcquisition, ValueWidth,
};

/// Resolve the byte layout of one acquisition.
///
/// The declared span must be a whole number of rows. A span that runs past the end
/// of the container is clamped to the complete rows available and marked partial.
pub fn resolve_acquisition(
    graph: &MetadataGraph,
    acquisition: &Acquisition,
    container_len: u64,
    config: &ResolverConfig,
) -> Result<AcquisitionLayout, AcquisitionError> {
    let id = acquisition.id.as_str();
    let corrupt = |reason| AcquisitionError::corrupt(id, reason);

    let start = acquisition
        .data_offset_start
        .ok_or_else(|| corrupt(CorruptReason::MissingField(field::DATA_START_OFFSET)))?;
    let declared_end = acquisition
        .data_offset_end
        .ok_or_else(|| corrupt(CorruptReason::MissingField(field::DATA_END_OFFSET)))?;
    let end = if config.end_offset_inclusive {
        declared_end.saturating_add(1)
    } else {
        declared_end
    };
    if end < start {
        return Err(corrupt(CorruptReason::InvertedRange {
            start,
            end: declared_end,
        }));
    }
    let span = end - start;
    if span == 0 {
        return Err(AcquisitionError::Empty { id: id.to_string() });
    }

    let channels = graph.channels(id);
    if channels.len() == leading_coordinate_channels(&channels) {
        return Err(AcquisitionError::Empty { id: id.to_string() });
    }
    if let Some(channel) = channels.iter().find(|c| c.ordinal.is_none()) {
        return Err(corrupt(CorruptReason::ChannelOrdinals(format!(
            "channel {} has no {}",
            channel.id,
            field::ORDER_NUMBER
        ))));
    }
    if let Some(ordinal) = channels.iter().filter_map(|c| c.ordinal).duplicates().next() {
        return Err(corrupt(CorruptReason::ChannelOrdinals(format!(
            "{} {ordinal} is used by more than one channel",
            field::ORDER_NUMBER
        ))));
    }

    let value_bytes = acquisition
        .value_bytes
        .unwrap_or(config.default_value_bytes);
    let value_width = ValueWidth::from_value_bytes(value_bytes)
        .ok_or_else(|| corrupt(CorruptReason::UnsupportedValueBytes(value_bytes)))?;

    let row_size = channels.len() as u64 * value_width.bytes();
    if span % row_size != 0 {
        return Err(corrupt(CorruptReason::RowSizeMismatch { span, row_size }));
    }
    let declared_rows = span / row_size;

    let (nrows, status) = if end > container_len {
        let available_rows = container_len.saturating_sub(start) / row_size;
        warn!(
            "Acquisition {id} declares {declared_rows} rows but the container only holds {available_rows}"
        );
        (
            available_rows,
            AcquisitionStatus::Partial(TruncatedAcquisition {
                declared_rows,
                available_rows,
            }),
        )
    } else {
        (declared_rows, AcquisitionStatus::Complete)
    };

    let layout = AcquisitionLayout::builder()
        .acquisition_id(id)
        .data_offset_start(start)
        .data_offset_end(end)
        .value_width(value_width)
        .channel_count(channels.len())
        .row_size(row_size)
        .declared_rows(declared_rows)
        .nrows(nrows)
        .maybe_scan_width(acquisition.max_x)
        .maybe_scan_height(acquisition.max_y)
        .status(status)
        .build();
    debug!(
        "Acquisition {id}: {nrows} rows of {row_size} bytes at {:?}",
        layout.byte_range()
    );
    Ok(layout)
}

/// Resolve every acquisition of the graph, in document order.
///
/// Acquisitions whose ranges overlap another acquisition are both rejected.
pub fn resolve_all(
    graph: &MetadataGraph,
    container_len: u64,
    config: &ResolverConfig,
) -> IndexMap<String, Result<AcquisitionLayout, AcquisitionError>> {
    let mut layouts: IndexMap<_, _> = graph
        .acquisitions(Default::default())
        .into_iter()
        .map(|acq| {
            (
                acq.id.clone(),
                resolve_acquisition(graph, acq, container_len, config),
            )
        })
        .collect();

    let overlapping: Vec<(String, String)> = layouts
        .values()
        .filter_map(|result| result.as_ref().ok())
        .tuple_combinations()
        .filter(|(a, b)| a.overlaps(b))
        .map(|(a, b)| (a.acquisition_id.clone(), b.acquisition_id.clone()))
        .collect();

    for (a, b) in overlapping {
        warn!("Acquisitions {a} and {b} claim overlapping data ranges");
        for (id, other) in [(&a, &b), (&b, &a)] {
            if let Some(slot) = layouts.get_mut(id) {
                if slot.is_ok() {
                    *slot = Err(AcquisitionError::corrupt(
                        id,
                        CorruptReason::Overlap {
                            other: other.clone(),
                        },
                    ));
                }
            }
        }
    }
    layouts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::metadata_parser::parse_metadata;

    fn channels_xml(acq: &str, ordinals: &[&str]) -> String {
        ordinals
            .iter()
            .enumerate()
            .map(|(i, ord)| {
                format!(
                    "<AcquisitionChannel><ID>{acq}{i}</ID><AcquisitionID>{acq}</AcquisitionID>\
                     <OrderNumber>{ord}</OrderNumber><ChannelName>M({i})</ChannelName></AcquisitionChannel>"
                )
            })
            .collect()
    }

    fn graph(acquisitions: &[(&str, &str)], channels: &str) -> MetadataGraph {
        let acqs: String = acquisitions
            .iter()
            .map(|(id, extra)| format!("<Acquisition><ID>{id}</ID>{extra}</Acquisition>"))
            .collect();
        parse_metadata(&format!("<MCDSchema>{acqs}{channels}</MCDSchema>")).unwrap()
    }

    fn range(start: u64, end: u64) -> String {
        format!(
            "<DataStartOffset>{start}</DataStartOffset><DataEndOffset>{end}</DataEndOffset><ValueBytes>4</ValueBytes>"
        )
    }

    fn resolve(graph: &MetadataGraph, id: &str, len: u64) -> Result<AcquisitionLayout, AcquisitionError> {
        resolve_acquisition(graph, graph.acquisition(id).unwrap(), len, &ResolverConfig::default())
    }

    #[test]
    fn complete_acquisition() {
        let g = graph(&[("1", &range(16, 64))], &channels_xml("1", &["0", "1", "2"]));
        let layout = resolve(&g, "1", 1000).unwrap();
        assert_eq!(layout.row_size, 12);
        assert_eq!(layout.nrows, 4);
        assert_eq!(layout.status, AcquisitionStatus::Complete);
        assert_eq!(
            layout.data_offset_end - layout.data_offset_start,
            layout.nrows * layout.row_size
        );
    }

    #[test]
    fn non_dividing_span_is_corrupt() {
        let g = graph(&[("1", &range(16, 66))], &channels_xml("1", &["0", "1", "2"]));
        let err = resolve(&g, "1", 1000).unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::Corrupt {
                reason: CorruptReason::RowSizeMismatch { span: 50, row_size: 12 },
                ..
            }
        ));
    }

    #[test]
    fn truncated_acquisition_is_clamped() {
        let g = graph(&[("1", &range(16, 64))], &channels_xml("1", &["0", "1", "2"]));
        let layout = resolve(&g, "1", 16 + 12 * 2 + 5).unwrap();
        assert_eq!(layout.nrows, 2);
        assert_eq!(
            layout.status,
            AcquisitionStatus::Partial(TruncatedAcquisition {
                declared_rows: 4,
                available_rows: 2
            })
        );
        assert_eq!(layout.byte_range(), 16..40);
    }

    #[test]
    fn coordinates_alone_are_empty() {
        let channels: String = ["X", "Y", "Z"]
            .iter()
            .enumerate()
            .map(|(i, tag)| {
                format!(
                    "<AcquisitionChannel><ID>{i}</ID><AcquisitionID>1</AcquisitionID>\
                     <OrderNumber>{i}</OrderNumber><ChannelName>{tag}</ChannelName></AcquisitionChannel>"
                )
            })
            .collect();
        let g = graph(&[("1", &range(16, 64))], &channels);
        assert!(matches!(resolve(&g, "1", 100), Err(AcquisitionError::Empty { .. })));
    }

    #[test]
    fn empty_and_unusable_acquisitions() {
        let g = graph(
            &[
                ("1", &range(16, 16)),
                ("2", &range(16, 64)),
                ("3", &range(64, 16)),
                ("4", "<DataStartOffset>16</DataStartOffset>"),
            ],
            &channels_xml("1", &["0"]),
        );
        assert!(matches!(resolve(&g, "1", 100), Err(AcquisitionError::Empty { .. })));
        assert!(matches!(resolve(&g, "2", 100), Err(AcquisitionError::Empty { .. })));
        assert!(resolve(&g, "3", 100).unwrap_err().is_corrupt());
        assert!(matches!(
            resolve(&g, "4", 100),
            Err(AcquisitionError::Corrupt {
                reason: CorruptReason::MissingField("DataEndOffset"),
                ..
            })
        ));
    }

    #[test]
    fn ordinals_must_be_unique_and_present() {
        let dup = graph(&[("1", &range(0, 24))], &channels_xml("1", &["0", "0"]));
        assert!(resolve(&dup, "1", 100).unwrap_err().is_corrupt());
        let missing = graph(&[("1", &range(0, 24))], &channels_xml("1", &["0", ""]));
        assert!(resolve(&missing, "1", 100).unwrap_err().is_corrupt());
    }

    #[test]
    fn value_bytes_default_and_inclusive_end() {
        let extra = "<DataStartOffset>0</DataStartOffset><DataEndOffset>15</DataEndOffset>";
        let g = graph(&[("1", extra)], &channels_xml("1", &["0"]));
        let config = ResolverConfig::builder().end_offset_inclusive(true).build();
        let layout =
            resolve_acquisition(&g, g.acquisition("1").unwrap(), 100, &config).unwrap();
        assert_eq!(layout.value_width, ValueWidth::F64);
        assert_eq!(layout.nrows, 2);
        assert!(resolve(&g, "1", 100).unwrap_err().is_corrupt());
    }

    #[test]
    fn overlapping_ranges_reject_both() {
        let mut channels = channels_xml("1", &["0"]);
        channels.push_str(&channels_xml("2", &["0"]));
        channels.push_str(&channels_xml("3", &["0"]));
        let g = graph(
            &[("1", &range(0, 40)), ("2", &range(36, 44)), ("3", &range(44, 48))],
            &channels,
        );
        let layouts = resolve_all(&g, 100, &ResolverConfig::default());
        let keys: Vec<_> = layouts.keys().map(String::as_str).collect();
        assert_eq!(keys, ["1", "2", "3"]);
        assert!(matches!(
            &layouts["1"],
            Err(AcquisitionError::Corrupt { reason: CorruptReason::Overlap { other }, .. }) if other == "2"
        ));
        assert!(layouts["2"].as_ref().unwrap_err().is_corrupt());
        assert!(layouts["3"].is_ok());
    }
}
