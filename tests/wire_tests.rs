use mesh_exchange::algs::communicator::CommTag;
use mesh_exchange::algs::wire::{KIND_MOVE, WireCount, WireHdr, expect_exact_len, frame, unframe};
use mesh_exchange::mesh_error::MeshError;

#[test]
fn commtag_offset_wrap() {
    let t = CommTag::new(u16::MAX).offset(1);
    assert_eq!(t.as_u16(), 0);
}

#[test]
fn header_is_little_endian() {
    let raw = frame(KIND_MOVE, &[WireCount::new(0x0102)]).unwrap();
    assert_eq!(&raw[..WireHdr::SIZE], &[1, 0, 3, 0, 1, 0, 0, 0]);
    assert_eq!(&raw[WireHdr::SIZE..WireHdr::SIZE + 2], &[0x02, 0x01]);
}

#[test]
fn empty_frame() {
    let raw = frame::<u32>(KIND_MOVE, &[]).unwrap();
    assert_eq!(raw.len(), WireHdr::SIZE);
    assert!(unframe::<u32>(0, KIND_MOVE, &raw).unwrap().is_empty());
    assert!(matches!(
        unframe::<u32>(0, KIND_MOVE, &raw[..4]),
        Err(MeshError::BufferSizeMismatch { .. })
    ));
}

#[test]
fn expect_exact_len_err() {
    assert!(expect_exact_len(0, 3, 4).is_err());
    assert!(expect_exact_len(0, 4, 4).is_ok());
}
