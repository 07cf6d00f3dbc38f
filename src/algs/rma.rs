//! Fixed-size all-to-all over a one-sided epoch.
//!
//! Every rank exposes its receive buffer as a window and writes its block for
//! rank `r` straight into `r`'s window at displacement `my_rank * count`. The
//! closing fence of the epoch is the only synchronization.
//!
//! [`DynRmaAllToAll`] is the type-erased entry point: the element kind is a
//! runtime tag, buffers travel as tagged unions, and kinds without a compiled
//! instantiation are rejected rather than converted.

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::algs::communicator::{OneSided, RmaPut};
use crate::algs::wire::{cast_slice, cast_slice_mut};
use crate::context::Context;
use crate::mesh_error::MeshError;

/// All-to-all of exactly `count` elements of `T` per rank pair.
#[derive(Clone, Copy, Debug)]
pub struct RmaAllToAll<T> {
    count: usize,
    _elem: PhantomData<T>,
}

impl<T: Pod> RmaAllToAll<T> {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            _elem: PhantomData,
        }
    }

    /// Elements exchanged with each rank.
    pub fn count(&self) -> usize {
        self.count
    }

    /// `send` holds `count` elements per destination rank, `recv` receives
    /// `count` elements per source rank, both in rank order. Collective.
    ///
    /// A rank with wrongly sized buffers still enters the epoch, exposing an
    /// empty window, so its peers' puts fail instead of waiting on the fence.
    pub fn invoke<C>(&self, comm: &C, ctx: &Context, send: &[T], recv: &mut [T]) -> Result<(), MeshError>
    where
        C: OneSided + ?Sized,
    {
        let _timer = ctx.section("rma_all_to_all");
        let n = comm.size();
        let me = comm.rank();
        let total = self.count * n;
        for len in [send.len(), recv.len()] {
            if len != total {
                return refuse_epoch(
                    comm,
                    MeshError::BufferSizeMismatch {
                        neighbor: me,
                        expected: total * size_of::<T>(),
                        got: len * size_of::<T>(),
                    },
                );
            }
        }

        let block_bytes = self.count * size_of::<T>();
        let puts: Vec<RmaPut<'_>> = (0..n)
            .map(|target| RmaPut {
                target,
                displacement: me * block_bytes,
                data: cast_slice(&send[target * self.count..(target + 1) * self.count]),
            })
            .collect();

        let mut window = vec![0u8; total * size_of::<T>()];
        comm.put_epoch(&mut window, &puts)?;
        cast_slice_mut(recv).copy_from_slice(&window);
        Ok(())
    }
}

/// Element datatypes a caller may request at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ElementKind {
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    Char,
}

impl ElementKind {
    /// Decode a boundary datatype code.
    pub fn from_raw(code: i32) -> Result<Self, MeshError> {
        Ok(match code {
            0 => ElementKind::Int32,
            1 => ElementKind::Int64,
            2 => ElementKind::Float32,
            3 => ElementKind::Float64,
            4 => ElementKind::Bool,
            5 => ElementKind::Char,
            other => {
                return Err(MeshError::UnsupportedElementKind(format!(
                    "datatype code {other}"
                )));
            }
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Int32 => "i32",
            ElementKind::Int64 => "i64",
            ElementKind::Float32 => "f32",
            ElementKind::Float64 => "f64",
            ElementKind::Bool => "bool",
            ElementKind::Char => "char",
        }
    }
}

/// Borrowed send buffer of one of the instantiated element types.
#[derive(Clone, Copy, Debug)]
pub enum ElementSlice<'a> {
    Int32(&'a [i32]),
    Int64(&'a [i64]),
    Float32(&'a [f32]),
    Float64(&'a [f64]),
}

/// Borrowed receive buffer of one of the instantiated element types.
#[derive(Debug)]
pub enum ElementSliceMut<'a> {
    Int32(&'a mut [i32]),
    Int64(&'a mut [i64]),
    Float32(&'a mut [f32]),
    Float64(&'a mut [f64]),
}

macro_rules! element_from {
    ($($t:ty => $variant:ident),*) => {$(
        impl<'a> From<&'a [$t]> for ElementSlice<'a> {
            fn from(v: &'a [$t]) -> Self {
                ElementSlice::$variant(v)
            }
        }
        impl<'a> From<&'a mut [$t]> for ElementSliceMut<'a> {
            fn from(v: &'a mut [$t]) -> Self {
                ElementSliceMut::$variant(v)
            }
        }
    )*};
}

element_from!(i32 => Int32, i64 => Int64, f32 => Float32, f64 => Float64);

/// Type-erased all-to-all dispatching on an [`ElementKind`] at runtime.
#[derive(Clone, Copy, Debug)]
pub struct DynRmaAllToAll {
    kind: ElementKind,
    count: usize,
}

impl DynRmaAllToAll {
    pub fn new(kind: ElementKind, count: usize) -> Self {
        Self { kind, count }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Dispatch to the typed instantiation for `self.kind`.
    ///
    /// Kinds with no instantiation, or buffers that do not match the kind,
    /// yield [`MeshError::UnsupportedElementKind`]; the boundary is expected
    /// to abort the group on it.
    pub fn invoke<C>(
        &self,
        comm: &C,
        ctx: &Context,
        send: ElementSlice<'_>,
        recv: ElementSliceMut<'_>,
    ) -> Result<(), MeshError>
    where
        C: OneSided + ?Sized,
    {
        use ElementKind as K;
        use ElementSlice as S;
        use ElementSliceMut as R;
        match (self.kind, send, recv) {
            (K::Int32, S::Int32(s), R::Int32(r)) => RmaAllToAll::new(self.count).invoke(comm, ctx, s, r),
            (K::Int64, S::Int64(s), R::Int64(r)) => RmaAllToAll::new(self.count).invoke(comm, ctx, s, r),
            (K::Float32, S::Float32(s), R::Float32(r)) => {
                RmaAllToAll::new(self.count).invoke(comm, ctx, s, r)
            }
            (K::Float64, S::Float64(s), R::Float64(r)) => {
                RmaAllToAll::new(self.count).invoke(comm, ctx, s, r)
            }
            (K::Bool | K::Char, ..) => refuse_epoch(
                comm,
                MeshError::UnsupportedElementKind(self.kind.name().to_string()),
            ),
            (kind, ..) => refuse_epoch(
                comm,
                MeshError::UnsupportedElementKind(format!("{} with mismatched buffers", kind.name())),
            ),
        }
    }
}

/// Take part in the epoch with no window and no puts, then report `err`.
fn refuse_epoch<C>(comm: &C, err: MeshError) -> Result<(), MeshError>
where
    C: OneSided + ?Sized,
{
    log::error!("[rank {}] all-to-all refused: {err}", comm.rank());
    let _ = comm.put_epoch(&mut [], &[]);
    Err(err)
}
