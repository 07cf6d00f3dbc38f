//! Fixed, versioned, little-endian wire types for exchange paths.

use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

use crate::mesh_error::MeshError;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Decode a received byte buffer into owned values.
///
/// Received buffers carry no alignment guarantee, so this always copies.
pub fn decode_vec<T: Pod>(neighbor: usize, raw: &[u8]) -> Result<Vec<T>, MeshError> {
    if raw.len() % size_of::<T>() != 0 {
        return Err(MeshError::BufferSizeMismatch {
            neighbor,
            expected: raw.len() - raw.len() % size_of::<T>(),
            got: raw.len(),
        });
    }
    let mut out = vec![T::zeroed(); raw.len() / size_of::<T>()];
    cast_slice_mut(&mut out).copy_from_slice(raw);
    Ok(out)
}

pub fn expect_exact_len(neighbor: usize, actual: usize, expected: usize) -> Result<(), MeshError> {
    if actual == expected {
        Ok(())
    } else {
        Err(MeshError::BufferSizeMismatch {
            neighbor,
            expected,
            got: actual,
        })
    }
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Message kinds carried in [`WireHdr::kind`].
pub const KIND_TOKEN_DATA: u16 = 2;
pub const KIND_MOVE: u16 = 3;

/// All multi-byte integers in these structs are **little-endian** on the wire.
/// We store them pre-LE with `.to_le()` and decode with `.from_le()`.

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable, Debug)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub count_le: u32, // number of following records
}

impl WireHdr {
    pub const SIZE: usize = 8;

    /// # Errors
    /// `CountMismatch` if `count` does not fit the 32-bit record count.
    pub fn new(kind: u16, count: usize) -> Result<Self, MeshError> {
        let count = u32::try_from(count).map_err(|_| MeshError::CountMismatch {
            what: "wire frame records",
            expected: u32::MAX as usize,
            got: count,
        })?;
        Ok(Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            count_le: count.to_le(),
        })
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn count(&self) -> usize {
        u32::from_le(self.count_le) as usize
    }

    /// Split a framed message into its header and body, checking version and kind.
    pub fn split(neighbor: usize, kind: u16, raw: &[u8]) -> Result<(WireHdr, &[u8]), MeshError> {
        if raw.len() < Self::SIZE {
            return Err(MeshError::BufferSizeMismatch {
                neighbor,
                expected: Self::SIZE,
                got: raw.len(),
            });
        }
        let hdr: WireHdr = bytemuck::pod_read_unaligned(&raw[..Self::SIZE]);
        if hdr.version() != WIRE_VERSION || hdr.kind() != kind {
            return Err(MeshError::CommError {
                neighbor,
                message: format!(
                    "unexpected wire header (version {}, kind {}), wanted (version {WIRE_VERSION}, kind {kind})",
                    hdr.version(),
                    hdr.kind()
                ),
            });
        }
        Ok((hdr, &raw[Self::SIZE..]))
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable, Debug)]
pub struct WireCount {
    pub n_le: u64,
}
impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

/// A cell offset (u64) carried on the wire.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable, Debug)]
pub struct WireIndex {
    pub idx_le: u64,
}
impl WireIndex {
    pub fn of(idx: usize) -> Self {
        Self {
            idx_le: (idx as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.idx_le) as usize
    }
}

/// Frame `records` behind a header of the given kind.
pub fn frame<T: Pod>(kind: u16, records: &[T]) -> Result<Vec<u8>, MeshError> {
    let hdr = WireHdr::new(kind, records.len())?;
    let mut out = Vec::with_capacity(WireHdr::SIZE + std::mem::size_of_val(records));
    out.extend_from_slice(bytemuck::bytes_of(&hdr));
    out.extend_from_slice(cast_slice(records));
    Ok(out)
}

/// Inverse of [`frame`]: validate header and record count, decode the body.
pub fn unframe<T: Pod>(neighbor: usize, kind: u16, raw: &[u8]) -> Result<Vec<T>, MeshError> {
    let (hdr, body) = WireHdr::split(neighbor, kind, raw)?;
    expect_exact_len(neighbor, body.len(), hdr.count() * size_of::<T>())?;
    decode_vec(neighbor, body)
}

// ===== Compile-time sanity checks =========================================

const _: () = {
    assert!(size_of::<WireHdr>() == WireHdr::SIZE);
    assert!(size_of::<WireCount>() == 8);
    assert!(size_of::<WireIndex>() == 8);
    assert!(align_of::<WireIndex>() == 8);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip_indices() {
        let v = vec![WireIndex::of(3), WireIndex::of(9)];
        let raw = frame(KIND_MOVE, &v).unwrap();
        assert_eq!(raw.len(), WireHdr::SIZE + 16);
        let out: Vec<WireIndex> = unframe(1, KIND_MOVE, &raw).unwrap();
        assert_eq!(out[0].get(), 3);
        assert_eq!(out[1].get(), 9);
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let raw = frame(KIND_MOVE, &[WireCount::new(1)]).unwrap();
        let err = unframe::<WireCount>(2, KIND_TOKEN_DATA, &raw).unwrap_err();
        assert!(matches!(err, MeshError::CommError { neighbor: 2, .. }));
    }

    #[test]
    fn truncated_body_is_rejected() {
        let mut raw = frame(KIND_TOKEN_DATA, &[1.0f64, 2.0]).unwrap();
        raw.truncate(raw.len() - 3);
        let err = unframe::<f64>(0, KIND_TOKEN_DATA, &raw).unwrap_err();
        assert!(matches!(err, MeshError::BufferSizeMismatch { .. }));
    }

    #[test]
    fn version_guard() {
        let hdr = WireHdr::new(KIND_MOVE, 4).unwrap();
        assert_eq!(hdr.version(), WIRE_VERSION);
        assert_eq!(hdr.count(), 4);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn record_count_must_fit_header() {
        let too_many = u32::MAX as usize + 1;
        assert!(matches!(
            WireHdr::new(KIND_MOVE, too_many),
            Err(MeshError::CountMismatch { got, .. }) if got == too_many
        ));
        assert_eq!(WireHdr::new(KIND_MOVE, u32::MAX as usize).unwrap().count(), u32::MAX as usize);
    }

    #[test]
    fn decode_copies_from_unaligned_bytes() {
        let raw = frame(KIND_TOKEN_DATA, &[7u64, 9]).unwrap();
        // body starts one byte into the allocation
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&raw[WireHdr::SIZE..]);
        let out: Vec<u64> = decode_vec(0, &shifted[1..]).unwrap();
        assert_eq!(out, vec![7, 9]);
        assert!(matches!(
            decode_vec::<u64>(3, &shifted[1..12]),
            Err(MeshError::BufferSizeMismatch { neighbor: 3, expected: 8, got: 11 })
        ));
    }

    static_assertions::assert_eq_size!(WireHdr, u64);
}
