mod common;

use common::{AcquisitionSpec, ContainerBuilder, SchemaPlacement};
use mcd::error::ChannelQuery;
use mcd::{AcquisitionAccess, AcquisitionError, ChannelError, McdConfig, McdFile};
use ndarray::s;
use proptest::prelude::*;

/// (channels, rows, scan width) per acquisition.
fn acquisition_shapes() -> impl Strategy<Value = Vec<(usize, usize, Option<u32>)>> {
    prop::collection::vec((1usize..5, 1usize..20, prop::option::of(1u32..6)), 1..4)
}

fn builder(shapes: &[(usize, usize, Option<u32>)]) -> ContainerBuilder {
    shapes
        .iter()
        .enumerate()
        .fold(ContainerBuilder::new(), |b, (i, (channels, rows, width))| {
            b.acquisition(AcquisitionSpec::grid(&(i + 1).to_string(), *channels, *rows, *width))
        })
}

fn open(bytes: Vec<u8>) -> McdFile<Vec<u8>> {
    McdFile::from_source(bytes, McdConfig::default()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn resolved_ranges_are_whole_rows(shapes in acquisition_shapes()) {
        let built = builder(&shapes).build();
        let mcd = open(built.bytes);

        for ((id, layout), ((channels, rows, _), (start, end))) in
            mcd.layouts().iter().zip(shapes.iter().zip(&built.ranges))
        {
            let layout = layout.as_ref().unwrap();
            prop_assert_eq!(&layout.acquisition_id, id);
            prop_assert_eq!(layout.data_offset_start, *start);
            prop_assert_eq!(layout.data_offset_end, *end);
            prop_assert_eq!(layout.row_size, *channels as u64 * 4);
            prop_assert_eq!(layout.nrows, *rows as u64);
            prop_assert_eq!(layout.byte_len(), end - start);
        }
    }

    #[test]
    fn decoding_is_repeatable(shapes in acquisition_shapes()) {
        let mcd = open(builder(&shapes).build().bytes);
        let ids: Vec<String> = mcd.acquisition_ids().map(str::to_string).collect();
        for id in ids {
            let first = mcd.read_acquisition::<f32>(&id);
            let second = mcd.read_acquisition::<f32>(&id);
            match (first, second) {
                (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
                // Fewer rows than one scan line.
                (Err(AcquisitionError::Empty { .. }), Err(AcquisitionError::Empty { .. })) => {}
                (a, b) => prop_assert!(false, "{:?} vs {:?}", a, b),
            }
        }
    }

    #[test]
    fn element_order_does_not_matter(
        shapes in acquisition_shapes(),
        keys in prop::collection::vec(0u32..100, 1..30),
    ) {
        let plain = open(builder(&shapes).build().bytes);
        let shuffled = open(builder(&shapes).element_order(keys).build().bytes);

        let mut plain_ids: Vec<&str> = plain.acquisition_ids().collect();
        let mut shuffled_ids: Vec<&str> = shuffled.acquisition_ids().collect();
        plain_ids.sort_unstable();
        shuffled_ids.sort_unstable();
        prop_assert_eq!(&plain_ids, &shuffled_ids);

        for id in plain_ids {
            let a = plain.read_acquisition::<f32>(id).ok();
            let b = shuffled.read_acquisition::<f32>(id).ok();
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn truncation_only_shortens_the_last_acquisition(
        shapes in acquisition_shapes(),
        cut_fraction in 0.0f64..1.0,
    ) {
        let built = builder(&shapes).placement(SchemaPlacement::BeforeData).build();
        let full = open(built.bytes.clone());

        let (last_start, last_end) = *built.ranges.last().unwrap();
        let cut = ((last_end - last_start) as f64 * cut_fraction) as usize;
        let mut bytes = built.bytes;
        bytes.truncate(bytes.len() - cut);
        let truncated = open(bytes);

        let last_id = shapes.len().to_string();
        for id in full.acquisition_ids().filter(|id| *id != last_id) {
            prop_assert_eq!(
                full.read_acquisition::<f32>(id).ok(),
                truncated.read_acquisition::<f32>(id).ok()
            );
        }

        let layout = truncated.layout(&last_id).unwrap();
        let available = (last_end - last_start - cut as u64) / layout.row_size;
        prop_assert_eq!(layout.nrows, available);
        prop_assert_eq!(layout.is_partial(), cut > 0);

        if let Ok(partial) = truncated.read_acquisition::<f32>(&last_id) {
            let complete = full.read_acquisition::<f32>(&last_id).unwrap();
            let height = partial.shape().unwrap().height;
            prop_assert_eq!(partial.shape().unwrap().width, complete.shape().unwrap().width);
            let complete_stack = complete.stack().unwrap();
            prop_assert_eq!(
                partial.stack().unwrap(),
                complete_stack.slice(s![.., ..height, ..])
            );
        }
    }

    #[test]
    fn lookups_agree_with_indices(channels in 1usize..6, rows in 1usize..10) {
        let built = ContainerBuilder::new()
            .acquisition(AcquisitionSpec::grid("1", channels, rows, None))
            .build();
        let acq = open(built.bytes).read_acquisition::<f64>("1").unwrap();

        for i in 0..channels {
            let plane = acq.plane(i).unwrap();
            prop_assert_eq!(acq.plane_by_label(&acq.labels()[i]).unwrap(), plane);
            prop_assert_eq!(acq.plane_by_metal(&acq.metals()[i]).unwrap(), plane);
        }
        prop_assert_eq!(
            acq.plane(channels).unwrap_err(),
            ChannelError::NotFound(ChannelQuery::Index(channels))
        );
    }
}
