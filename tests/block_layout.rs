use mesh_exchange::mesh_error::MeshError;
use mesh_exchange::topology::block_layout::{BlockLayout, BlockLayoutMethod};
use proptest::prelude::*;

fn method() -> impl Strategy<Value = BlockLayoutMethod> {
    prop_oneof![
        Just(BlockLayoutMethod::ColumnMajor),
        Just(BlockLayoutMethod::ColumnMajorZigZag),
        Just(BlockLayoutMethod::ColumnMajorReverse),
    ]
}

proptest! {
    #[test]
    fn address_coordinate_bijection(
        extents in [1usize..7, 1usize..7, 1usize..7],
        method in method(),
    ) {
        let layout = BlockLayout::new(extents, method).unwrap();
        let mut seen = vec![false; layout.num_blocks()];
        for coord in layout.iter_coordinates() {
            let coord = coord.unwrap();
            let a = layout.get_address(coord).unwrap();
            prop_assert!(!seen[a]);
            seen[a] = true;
            prop_assert_eq!(layout.get_coordinates(a).unwrap(), coord);
        }
        prop_assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn decomposition_partitions_addresses(
        extents in [1usize..6, 1usize..6, 1usize..6],
        size in 1usize..9,
    ) {
        let layout = BlockLayout::new(extents, BlockLayoutMethod::ColumnMajor).unwrap();
        let mut next = 0;
        for rank in 0..size {
            let range = layout.blocks_for_rank(rank, size).unwrap();
            prop_assert_eq!(range.start, next);
            for a in range.clone() {
                prop_assert_eq!(layout.owner_of(a, size).unwrap(), rank);
            }
            next = range.end;
        }
        prop_assert_eq!(next, layout.num_blocks());
    }
}

#[test]
fn documented_examples() {
    let l = BlockLayout::new([2, 3, 1], BlockLayoutMethod::ColumnMajor).unwrap();
    assert_eq!(l.get_address([1, 2, 0]), Ok(5));

    let z = BlockLayout::new([3, 2, 1], BlockLayoutMethod::ColumnMajorZigZag).unwrap();
    let row0: Vec<_> = (0..3).map(|x| z.get_address([x, 0, 0]).unwrap()).collect();
    let row1: Vec<_> = (0..3).map(|x| z.get_address([x, 1, 0]).unwrap()).collect();
    assert_eq!(row0, vec![0, 1, 2]);
    assert_eq!(row1, vec![5, 4, 3]);
}

#[test]
fn hilbert_fails_fast() {
    let h = BlockLayout::new([4, 4, 4], BlockLayoutMethod::Hilbert).unwrap();
    assert_eq!(h.get_address([0, 0, 0]), Err(MeshError::NotImplemented("Hilbert block layout")));
}
