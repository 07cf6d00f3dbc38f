//! Reusable communication plans ("tokens").
//!
//! A [`CommTokenBuilder`] accumulates correspondences between *slots* (entries
//! of a caller-owned slot buffer, e.g. a ghosted or replicated array) and
//! *home cells* (entries of the local cell array of the owning rank). Building
//! resolves every global correspondence to its owner once; the resulting
//! [`Token`] is immutable and drives any number of exchanges:
//!
//! - `get*`: gather home values into slots,
//! - `put*`: scatter slot values back onto their home cells,
//!
//! each combining with a [`TokenOperation`]. When several contributions land
//! on one destination they are applied in ascending source-rank order, with
//! this rank's own links taking its place in that order.

use bytemuck::Pod;

use crate::algs::communicator::{Communicator, exchange_bytes};
use crate::algs::move_data::{Region, move_data};
use crate::algs::wire::{KIND_TOKEN_DATA, WireCount, WireIndex, cast_slice, cast_slice_mut, frame, unframe};
use crate::context::Context;
use crate::data::cells::Cells;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshError;

/// How an incoming value is combined with the value already in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TokenOperation {
    /// `dest = incoming`
    Copy,
    /// `dest = dest + incoming`
    Add,
    /// `dest = dest - incoming`
    Sub,
    /// `dest = max(dest, incoming)`
    Max,
    /// `dest = min(dest, incoming)`
    Min,
}

/// Element types a token can move.
pub trait TokenValue: Pod + num_traits::Num + PartialOrd {}

impl<T> TokenValue for T where T: Pod + num_traits::Num + PartialOrd {}

impl TokenOperation {
    #[inline]
    pub fn combine<T: TokenValue>(self, dest: T, incoming: T) -> T {
        match self {
            TokenOperation::Copy => incoming,
            TokenOperation::Add => dest + incoming,
            TokenOperation::Sub => dest - incoming,
            TokenOperation::Max => {
                if incoming > dest {
                    incoming
                } else {
                    dest
                }
            }
            TokenOperation::Min => {
                if incoming < dest {
                    incoming
                } else {
                    dest
                }
            }
        }
    }
}

/// Memory order of a vector-valued buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Packing {
    /// `[slot][comp]`: the components of one slot are contiguous.
    SlotMajor,
    /// `[comp][slot]`: one component of every slot is contiguous.
    ComponentMajor,
}

/// Strided view of `len` slots of `width` components each.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotView {
    len: usize,
    width: usize,
    slot_stride: usize,
    comp_stride: usize,
}

impl SlotView {
    pub fn new(len: usize, width: usize, packing: Packing) -> Self {
        let (slot_stride, comp_stride) = match packing {
            Packing::SlotMajor => (width, 1),
            Packing::ComponentMajor => (1, len),
        };
        Self {
            len,
            width,
            slot_stride,
            comp_stride,
        }
    }

    pub fn scalar(len: usize) -> Self {
        Self::new(len, 1, Packing::SlotMajor)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of elements a buffer under this view must hold.
    pub fn required_len(&self) -> usize {
        self.len * self.width
    }

    #[inline]
    pub fn index(&self, slot: usize, comp: usize) -> usize {
        slot * self.slot_stride + comp * self.comp_stride
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    /// home -> slots
    Gather,
    /// slots -> home
    Scatter,
}

/// Accumulates slot/home correspondences; consumed into a [`Token`].
#[derive(Clone, Debug, Default)]
pub struct CommTokenBuilder {
    num_cells: usize,
    num_home: Option<usize>,
    /// `(slot, home)` pairs resolved on this rank.
    local: Vec<(usize, usize)>,
    /// Next home cell handed out when `build_local` gets no explicit indices.
    next_home: usize,
}

impl CommTokenBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots the token addresses (slot buffer length, in slots).
    pub fn set_num_cells(&mut self, n: usize) -> &mut Self {
        self.num_cells = n;
        self
    }

    /// Length of the home buffer, in cells.
    ///
    /// `build_global` takes it from [`Cells`]; a local-only token without it
    /// covers exactly the home cells its links reference.
    pub fn set_num_home_cells(&mut self, n: usize) -> &mut Self {
        self.num_home = Some(n);
        self
    }

    /// Record correspondences resolved on this rank.
    ///
    /// Slot `local_indices[i]` is linked to the next `counts[i]` home cells,
    /// read from `home_indices` when given and otherwise numbered on from the
    /// last home cell handed out (starting at 0).
    pub fn build_local(
        &mut self,
        local_indices: &[usize],
        counts: &[usize],
        home_indices: Option<&[usize]>,
    ) -> Result<&mut Self, MeshError> {
        if counts.len() != local_indices.len() {
            return Err(MeshError::CountMismatch {
                what: "build_local counts",
                expected: local_indices.len(),
                got: counts.len(),
            });
        }
        let total: usize = counts.iter().sum();
        if let Some(home) = home_indices {
            if home.len() != total {
                return Err(MeshError::CountMismatch {
                    what: "build_local home indices",
                    expected: total,
                    got: home.len(),
                });
            }
        }

        let mut cursor = 0;
        for (&slot, &count) in local_indices.iter().zip(counts) {
            for k in 0..count {
                let home = match home_indices {
                    Some(h) => h[cursor + k],
                    None => self.next_home + cursor + k,
                };
                self.local.push((slot, home));
            }
            cursor += count;
        }
        if home_indices.is_none() {
            self.next_home += total;
        }
        Ok(self)
    }

    /// Finish a token that only has local correspondences. Not collective.
    pub fn build<C>(self, comm: &C) -> Result<Token, MeshError>
    where
        C: Communicator + ?Sized,
    {
        let n = comm.size();
        let num_home = match self.num_home {
            Some(h) => h,
            None => self.local.iter().map(|&(_, h)| h + 1).max().unwrap_or(0),
        };
        self.finish(comm.rank(), n, num_home, vec![Vec::new(); n], vec![Vec::new(); n])
    }

    /// Record correspondences to global cells and finish the token.
    ///
    /// Slot `local_indices[i]` is linked to global cell `global_indices[i]`,
    /// or to global cell `local_indices[i]` when no global indices are given
    /// (a slot buffer replicating the whole global array). Owners are found
    /// through `cells`; the home buffer is this rank's `num_local_cells`.
    ///
    /// Collective over `comm`.
    pub fn build_global<C>(
        mut self,
        comm: &C,
        ctx: &Context,
        local_indices: &[usize],
        global_indices: Option<&[usize]>,
        cells: &Cells,
    ) -> Result<Token, MeshError>
    where
        C: Communicator + ?Sized,
    {
        let _timer = ctx.section("token_build");
        let n = comm.size();
        let me = comm.rank();
        if cells.global_base_address().is_empty() {
            return Err(MeshError::GlobalBaseNotReady);
        }
        if cells.num_ranks() != n {
            return Err(MeshError::ProcessCountMismatch {
                expected: cells.num_ranks(),
                got: n,
            });
        }
        let num_home = cells.num_local_cells();
        if let Some(set) = self.num_home {
            if set != num_home {
                return Err(MeshError::HomeCountMismatch {
                    expected: num_home,
                    got: set,
                });
            }
        }
        if let Some(g) = global_indices {
            if g.len() != local_indices.len() {
                return Err(MeshError::CountMismatch {
                    what: "build_global global indices",
                    expected: local_indices.len(),
                    got: g.len(),
                });
            }
        }

        // route every link to its owner: want[r] holds our slots, requests[r]
        // the owner-local offsets we ask rank r for, in the same order
        let mut want: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut requests: Vec<Vec<WireIndex>> = vec![Vec::new(); n];
        for (i, &slot) in local_indices.iter().enumerate() {
            if slot >= self.num_cells {
                return Err(MeshError::LocalIndexOutOfRange {
                    index: slot,
                    len: self.num_cells,
                });
            }
            let global = global_indices.map_or(slot, |g| g[i]);
            let owner = cells.owner_of(global)?;
            let offset = global - cells.global_base_address()[owner];
            if owner == me {
                self.local.push((slot, offset));
            } else {
                want[owner].push(slot);
                requests[owner].push(WireIndex::of(offset));
            }
        }

        let send_counts: Vec<WireCount> = requests.iter().map(|r| WireCount::new(r.len())).collect();
        let mut recv_counts = vec![WireCount::new(0); n];
        comm.alltoall(cast_slice(&send_counts), cast_slice_mut(&mut recv_counts))?;
        let recv_counts: Vec<usize> = recv_counts.iter().map(WireCount::get).collect();

        let send_lens: Vec<usize> = requests.iter().map(Vec::len).collect();
        let send: Vec<WireIndex> = requests.into_iter().flatten().collect();
        let mut recv = vec![WireIndex::of(0); recv_counts.iter().sum()];
        move_data(
            comm,
            ctx,
            &send,
            &Region::packed(&send_lens),
            &mut recv,
            &Region::packed(&recv_counts),
        )?;

        let mut serve: Vec<Vec<usize>> = Vec::with_capacity(n);
        let mut rest = recv.as_slice();
        for &count in &recv_counts {
            let (head, tail) = rest.split_at(count);
            serve.push(head.iter().map(WireIndex::get).collect());
            rest = tail;
        }

        self.finish(me, n, num_home, serve, want)
    }

    fn finish(
        self,
        rank: usize,
        nranks: usize,
        num_home: usize,
        serve: Vec<Vec<usize>>,
        want: Vec<Vec<usize>>,
    ) -> Result<Token, MeshError> {
        let token = Token {
            num_cells: self.num_cells,
            num_home,
            nranks,
            rank,
            local: self.local,
            serve,
            want,
        };
        token.validate_invariants()?;
        log::debug!(
            "[rank {rank}] token built: {} slots, {} home cells, {} local links, neighbors {:?}",
            token.num_cells,
            token.num_home,
            token.local.len(),
            token.neighbor_ranks()
        );
        Ok(token)
    }
}

/// Immutable exchange schedule produced by [`CommTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Token {
    num_cells: usize,
    num_home: usize,
    nranks: usize,
    rank: usize,
    /// `(slot, home)` links resolved on this rank.
    local: Vec<(usize, usize)>,
    /// Per requesting rank: home offsets served to it, in request order.
    serve: Vec<Vec<usize>>,
    /// Per owning rank: slots filled from it, in request order.
    want: Vec<Vec<usize>>,
}

impl Token {
    /// Slots addressed by the token.
    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// Home cells addressed by the token.
    pub fn num_home_cells(&self) -> usize {
        self.num_home
    }

    /// Slot links recorded on this rank, local and remote.
    pub fn num_links(&self) -> usize {
        self.local.len() + self.want.iter().map(Vec::len).sum::<usize>()
    }

    /// Ranks this token exchanges data with, ascending.
    pub fn neighbor_ranks(&self) -> Vec<usize> {
        (0..self.nranks)
            .filter(|&r| !self.serve[r].is_empty() || !self.want[r].is_empty())
            .collect()
    }

    /// Gather home values into slots.
    pub fn get<T, C>(
        &self,
        comm: &C,
        ctx: &Context,
        op: TokenOperation,
        home: &[T],
        slots: &mut [T],
    ) -> Result<(), MeshError>
    where
        T: TokenValue,
        C: Communicator + ?Sized,
    {
        let _timer = ctx.section("token_get");
        self.gather(comm, ctx, op, 1, Packing::SlotMajor, home, slots)
    }

    /// Scatter slot values onto their home cells.
    pub fn put<T, C>(
        &self,
        comm: &C,
        ctx: &Context,
        op: TokenOperation,
        slots: &[T],
        home: &mut [T],
    ) -> Result<(), MeshError>
    where
        T: TokenValue,
        C: Communicator + ?Sized,
    {
        let _timer = ctx.section("token_put");
        self.scatter(comm, ctx, op, 1, Packing::SlotMajor, slots, home)
    }

    /// [`get`](Self::get) for `width` components per slot, `[slot][comp]` packed.
    pub fn get_v<T, C>(
        &self,
        comm: &C,
        ctx: &Context,
        op: TokenOperation,
        width: usize,
        home: &[T],
        slots: &mut [T],
    ) -> Result<(), MeshError>
    where
        T: TokenValue,
        C: Communicator + ?Sized,
    {
        let _timer = ctx.section("token_get_v");
        self.gather(comm, ctx, op, width, Packing::SlotMajor, home, slots)
    }

    /// [`put`](Self::put) for `width` components per slot, `[slot][comp]` packed.
    pub fn put_v<T, C>(
        &self,
        comm: &C,
        ctx: &Context,
        op: TokenOperation,
        width: usize,
        slots: &[T],
        home: &mut [T],
    ) -> Result<(), MeshError>
    where
        T: TokenValue,
        C: Communicator + ?Sized,
    {
        let _timer = ctx.section("token_put_v");
        self.scatter(comm, ctx, op, width, Packing::SlotMajor, slots, home)
    }

    /// [`get_v`](Self::get_v) with both buffers `[comp][slot]` packed.
    pub fn get_v_inv<T, C>(
        &self,
        comm: &C,
        ctx: &Context,
        op: TokenOperation,
        width: usize,
        home: &[T],
        slots: &mut [T],
    ) -> Result<(), MeshError>
    where
        T: TokenValue,
        C: Communicator + ?Sized,
    {
        let _timer = ctx.section("token_get_v_inv");
        self.gather(comm, ctx, op, width, Packing::ComponentMajor, home, slots)
    }

    /// [`put_v`](Self::put_v) with both buffers `[comp][slot]` packed.
    pub fn put_v_inv<T, C>(
        &self,
        comm: &C,
        ctx: &Context,
        op: TokenOperation,
        width: usize,
        slots: &[T],
        home: &mut [T],
    ) -> Result<(), MeshError>
    where
        T: TokenValue,
        C: Communicator + ?Sized,
    {
        let _timer = ctx.section("token_put_v_inv");
        self.scatter(comm, ctx, op, width, Packing::ComponentMajor, slots, home)
    }

    #[allow(clippy::too_many_arguments)]
    fn gather<T, C>(
        &self,
        comm: &C,
        ctx: &Context,
        op: TokenOperation,
        width: usize,
        packing: Packing,
        home: &[T],
        slots: &mut [T],
    ) -> Result<(), MeshError>
    where
        T: TokenValue,
        C: Communicator + ?Sized,
    {
        let home_view = SlotView::new(self.num_home, width, packing);
        let slot_view = SlotView::new(self.num_cells, width, packing);
        self.check_lengths(comm, home_view, home.len(), slot_view, slots.len())?;
        self.exchange(comm, ctx, Direction::Gather, op, home, home_view, slots, slot_view)
    }

    #[allow(clippy::too_many_arguments)]
    fn scatter<T, C>(
        &self,
        comm: &C,
        ctx: &Context,
        op: TokenOperation,
        width: usize,
        packing: Packing,
        slots: &[T],
        home: &mut [T],
    ) -> Result<(), MeshError>
    where
        T: TokenValue,
        C: Communicator + ?Sized,
    {
        let home_view = SlotView::new(self.num_home, width, packing);
        let slot_view = SlotView::new(self.num_cells, width, packing);
        self.check_lengths(comm, home_view, home.len(), slot_view, slots.len())?;
        self.exchange(comm, ctx, Direction::Scatter, op, slots, slot_view, home, home_view)
    }

    fn check_lengths<C>(
        &self,
        comm: &C,
        home_view: SlotView,
        home_len: usize,
        slot_view: SlotView,
        slot_len: usize,
    ) -> Result<(), MeshError>
    where
        C: Communicator + ?Sized,
    {
        if comm.size() != self.nranks {
            return Err(MeshError::ProcessCountMismatch {
                expected: self.nranks,
                got: comm.size(),
            });
        }
        if comm.rank() != self.rank {
            return Err(MeshError::RankMismatch {
                expected: self.rank,
                got: comm.rank(),
            });
        }
        if slot_len != slot_view.required_len() {
            return Err(MeshError::SlotCountMismatch {
                expected: slot_view.required_len(),
                got: slot_len,
            });
        }
        if home_len != home_view.required_len() {
            return Err(MeshError::HomeCountMismatch {
                expected: home_view.required_len(),
                got: home_len,
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn exchange<T, C>(
        &self,
        comm: &C,
        ctx: &Context,
        dir: Direction,
        op: TokenOperation,
        src: &[T],
        src_view: SlotView,
        dst: &mut [T],
        dst_view: SlotView,
    ) -> Result<(), MeshError>
    where
        T: TokenValue,
        C: Communicator + ?Sized,
    {
        let n = self.nranks;
        let width = src_view.width();
        let (outbound, inbound) = match dir {
            Direction::Gather => (&self.serve, &self.want),
            Direction::Scatter => (&self.want, &self.serve),
        };

        let targets: Vec<usize> = (0..n).filter(|&r| !outbound[r].is_empty()).collect();
        let framed: Vec<Vec<u8>> = targets
            .iter()
            .map(|&r| {
                let mut values = Vec::with_capacity(outbound[r].len() * width);
                for &i in &outbound[r] {
                    values.extend((0..width).map(|c| src[src_view.index(i, c)]));
                }
                frame(KIND_TOKEN_DATA, &values)
            })
            .collect::<Result<_, _>>()?;
        let outgoing: Vec<(usize, &[u8])> = targets
            .iter()
            .zip(&framed)
            .map(|(&r, buf)| (r, buf.as_slice()))
            .collect();
        let sources: Vec<usize> = (0..n).filter(|&r| !inbound[r].is_empty()).collect();

        let incoming = exchange_bytes(comm, ctx.tags().token, &outgoing, &sources)?;
        let mut received: Vec<Vec<T>> = vec![Vec::new(); n];
        for (&r, raw) in sources.iter().zip(incoming) {
            let values: Vec<T> = unframe(r, KIND_TOKEN_DATA, &raw)?;
            let expected = inbound[r].len() * width;
            if values.len() != expected {
                return Err(MeshError::BufferSizeMismatch {
                    neighbor: r,
                    expected: expected * size_of::<T>(),
                    got: values.len() * size_of::<T>(),
                });
            }
            received[r] = values;
        }

        for r in 0..n {
            if r == self.rank {
                for &(slot, home) in &self.local {
                    let (s, d) = match dir {
                        Direction::Gather => (home, slot),
                        Direction::Scatter => (slot, home),
                    };
                    for c in 0..width {
                        let di = dst_view.index(d, c);
                        dst[di] = op.combine(dst[di], src[src_view.index(s, c)]);
                    }
                }
            } else {
                for (k, &d) in inbound[r].iter().enumerate() {
                    for c in 0..width {
                        let di = dst_view.index(d, c);
                        dst[di] = op.combine(dst[di], received[r][k * width + c]);
                    }
                }
            }
        }
        Ok(())
    }
}

impl DebugInvariants for Token {
    fn validate_invariants(&self) -> Result<(), MeshError> {
        for table in [&self.serve, &self.want] {
            if table.len() != self.nranks {
                return Err(MeshError::ProcessCountMismatch {
                    expected: self.nranks,
                    got: table.len(),
                });
            }
        }
        let check = |index: usize, len: usize| {
            if index < len {
                Ok(())
            } else {
                Err(MeshError::LocalIndexOutOfRange { index, len })
            }
        };
        for &(slot, home) in &self.local {
            check(slot, self.num_cells)?;
            check(home, self.num_home)?;
        }
        for (r, (served, wanted)) in self.serve.iter().zip(&self.want).enumerate() {
            if r == self.rank && !(served.is_empty() && wanted.is_empty()) {
                return Err(MeshError::CountMismatch {
                    what: "remote links to own rank",
                    expected: 0,
                    got: served.len() + wanted.len(),
                });
            }
            for &h in served {
                check(h, self.num_home)?;
            }
            for &s in wanted {
                check(s, self.num_cells)?;
            }
        }
        Ok(())
    }
}
