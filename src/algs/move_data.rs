//! One-shot variable-length exchange ("move").
//!
//! Each rank declares, per destination rank, a `(start, len)` region of its
//! send buffer, and per source rank a `(start, len)` region of its receive
//! buffer. After the call every receive region holds exactly what the
//! matching sender declared for this rank.
//!
//! Every pair of ranks exchanges one framed message, empty or not, so a
//! sender/receiver disagreement on a region length surfaces as
//! [`MeshError::BufferSizeMismatch`] instead of a hang.

use bytemuck::Pod;

use crate::algs::communicator::{Communicator, exchange_bytes};
use crate::algs::wire::{KIND_MOVE, frame, unframe};
use crate::context::Context;
use crate::mesh_error::MeshError;

/// A 1-based index as presented by Fortran-indexed callers.
///
/// Stores the 0-based value; apply it to all four region arrays of a move at
/// the boundary and nowhere else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FortranLocalIndex(usize);

impl FortranLocalIndex {
    /// Wrap a 1-based index. Zero and negative values are rejected.
    pub fn new(one_based: i64) -> Result<Self, MeshError> {
        if one_based < 1 {
            return Err(MeshError::InvalidFortranIndex(one_based));
        }
        Ok(Self((one_based - 1) as usize))
    }

    /// The 0-based index.
    #[inline]
    pub const fn get(self) -> usize {
        self.0
    }

    /// The 1-based index as the caller sees it.
    #[inline]
    pub const fn one_based(self) -> i64 {
        self.0 as i64 + 1
    }
}

/// Contiguous `[start, start + len)` range of a buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Region {
    pub start: usize,
    pub len: usize,
}

impl Region {
    pub const fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// Region whose start arrives 1-based from the boundary.
    pub fn from_fortran(start: i64, len: usize) -> Result<Self, MeshError> {
        Ok(Self::new(FortranLocalIndex::new(start)?.get(), len))
    }

    pub const fn end(&self) -> usize {
        self.start + self.len
    }

    /// Lay out `lens` back to back starting at 0.
    pub fn packed(lens: &[usize]) -> Vec<Region> {
        let mut start = 0;
        lens.iter()
            .map(|&len| {
                let r = Region::new(start, len);
                start += len;
                r
            })
            .collect()
    }

    fn check(&self, buffer_len: usize) -> Result<(), MeshError> {
        match self.start.checked_add(self.len) {
            Some(end) if end <= buffer_len => Ok(()),
            _ => Err(MeshError::RegionOutOfBounds {
                start: self.start,
                len: self.len,
                buffer_len,
            }),
        }
    }
}

/// Redistribute `send` into `recv` according to the per-rank regions.
///
/// Collective over `comm`. A rank whose own arguments are invalid still takes
/// part in the exchange: it sends an empty, headerless message to every peer,
/// which then fails with [`MeshError::BufferSizeMismatch`], and returns its
/// own error.
pub fn move_data<T, C>(
    comm: &C,
    ctx: &Context,
    send: &[T],
    send_regions: &[Region],
    recv: &mut [T],
    recv_regions: &[Region],
) -> Result<(), MeshError>
where
    T: Pod,
    C: Communicator + ?Sized,
{
    let _timer = ctx.section("move");
    let n = comm.size();
    let me = comm.rank();
    let peers: Vec<usize> = (0..n).filter(|&p| p != me).collect();
    let tag = ctx.tags().move_data;

    if let Err(e) = check_move::<T>(me, n, send.len(), send_regions, recv.len(), recv_regions) {
        log::error!("[rank {me}] move refused: {e}");
        let empty: Vec<(usize, &[u8])> = peers.iter().map(|&p| (p, &[][..])).collect();
        let _ = exchange_bytes(comm, tag, &empty, &peers);
        return Err(e);
    }

    let own_send = send_regions[me];
    let own_recv = recv_regions[me];
    recv[own_recv.start..own_recv.end()].copy_from_slice(&send[own_send.start..own_send.end()]);

    let framed: Vec<Vec<u8>> = peers
        .iter()
        .map(|&p| {
            let r = send_regions[p];
            frame(KIND_MOVE, &send[r.start..r.end()])
        })
        .collect::<Result<_, _>>()?;
    let outgoing: Vec<(usize, &[u8])> = peers
        .iter()
        .zip(&framed)
        .map(|(&p, buf)| (p, buf.as_slice()))
        .collect();

    log::trace!(
        "[rank {me}] move: sending {} / receiving {} elements",
        send_regions.iter().map(|r| r.len).sum::<usize>(),
        recv_regions.iter().map(|r| r.len).sum::<usize>()
    );

    let incoming = exchange_bytes(comm, tag, &outgoing, &peers)?;
    let mut maybe_err = None;
    for (&p, raw) in peers.iter().zip(incoming) {
        let r = recv_regions[p];
        let res = unframe::<T>(p, KIND_MOVE, &raw).and_then(|values| {
            if values.len() != r.len {
                return Err(MeshError::BufferSizeMismatch {
                    neighbor: p,
                    expected: r.len * size_of::<T>(),
                    got: values.len() * size_of::<T>(),
                });
            }
            recv[r.start..r.end()].copy_from_slice(&values);
            Ok(())
        });
        if let Err(e) = res {
            maybe_err.get_or_insert(e);
        }
    }
    match maybe_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Local argument checks; nothing is sent.
fn check_move<T>(
    me: usize,
    n: usize,
    send_len: usize,
    send_regions: &[Region],
    recv_len: usize,
    recv_regions: &[Region],
) -> Result<(), MeshError> {
    for regions in [send_regions, recv_regions] {
        if regions.len() != n {
            return Err(MeshError::ProcessCountMismatch {
                expected: regions.len(),
                got: n,
            });
        }
    }
    for r in send_regions {
        r.check(send_len)?;
    }
    for r in recv_regions {
        r.check(recv_len)?;
    }
    let (own_send, own_recv) = (send_regions[me], recv_regions[me]);
    if own_send.len != own_recv.len {
        return Err(MeshError::BufferSizeMismatch {
            neighbor: me,
            expected: own_recv.len * size_of::<T>(),
            got: own_send.len * size_of::<T>(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, ThreadComm};

    #[test]
    fn fortran_index_is_shifted_once() {
        let i = FortranLocalIndex::new(1).unwrap();
        assert_eq!(i.get(), 0);
        assert_eq!(i.one_based(), 1);
        assert!(matches!(
            FortranLocalIndex::new(0),
            Err(MeshError::InvalidFortranIndex(0))
        ));
        assert_eq!(Region::from_fortran(3, 2).unwrap(), Region::new(2, 2));
    }

    #[test]
    fn packed_regions_are_contiguous() {
        let r = Region::packed(&[2, 0, 3]);
        assert_eq!(r, vec![Region::new(0, 2), Region::new(2, 0), Region::new(2, 3)]);
    }

    #[test]
    fn serial_move_copies_own_region() {
        let ctx = Context::default();
        let send = [1u32, 2, 3, 4];
        let mut recv = [0u32; 5];
        move_data(&NoComm, &ctx, &send, &[Region::new(1, 3)], &mut recv, &[Region::new(2, 3)])
            .unwrap();
        assert_eq!(recv, [0, 0, 2, 3, 4]);
    }

    #[test]
    fn region_out_of_bounds() {
        let ctx = Context::default();
        let send = [1u32, 2];
        let mut recv = [0u32; 2];
        let err = move_data(&NoComm, &ctx, &send, &[Region::new(1, 2)], &mut recv, &[Region::new(0, 2)])
            .unwrap_err();
        assert!(matches!(err, MeshError::RegionOutOfBounds { .. }));
    }

    #[test]
    fn mismatched_lengths_are_reported() {
        let comms = ThreadComm::group(2);
        let ctx = Context::default();
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .iter()
                .map(|comm| {
                    let ctx = &ctx;
                    s.spawn(move || {
                        let me = comm.rank();
                        let send = vec![me as u64; 3];
                        // both send 1 to rank 0 and 2 to rank 1; rank 1 expects 3 from rank 0
                        let send_regions = [Region::new(0, 1), Region::new(1, 2)];
                        let recv_regions = if me == 1 {
                            [Region::new(0, 3), Region::new(3, 2)]
                        } else {
                            [Region::new(0, 1), Region::new(1, 1)]
                        };
                        let mut recv = vec![0u64; 5];
                        move_data(comm, ctx, &send, &send_regions, &mut recv, &recv_regions)
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert!(matches!(
                results[1],
                Err(MeshError::BufferSizeMismatch { neighbor: 0, .. })
            ));
        });
    }

    #[test]
    fn invalid_own_region_fails_every_rank() {
        let comms = ThreadComm::group(2);
        let ctx = Context::default();
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .iter()
                .map(|comm| {
                    let ctx = &ctx;
                    s.spawn(move || {
                        let me = comm.rank();
                        let send = vec![1u64; 2];
                        let mut recv = vec![0u64; 3];
                        // rank 0 sends 1 element to itself but expects 2
                        let (send_regions, recv_regions) = if me == 0 {
                            ([Region::new(0, 1), Region::new(1, 1)], [Region::new(0, 2), Region::new(2, 1)])
                        } else {
                            ([Region::new(0, 1), Region::new(1, 1)], [Region::new(0, 1), Region::new(1, 1)])
                        };
                        move_data(comm, ctx, &send, &send_regions, &mut recv, &recv_regions)
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert_eq!(
                results[0],
                Err(MeshError::BufferSizeMismatch { neighbor: 0, expected: 16, got: 8 })
            );
            assert_eq!(
                results[1],
                Err(MeshError::BufferSizeMismatch { neighbor: 0, expected: 8, got: 0 })
            );
        });
    }
}
