//! Thin façade over intra-process (thread group) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Point-to-point handles are **waitable**; collectives built on top of them
//! always post every send before waiting on any receive, and drain every
//! handle before returning, even on error.
//!
//! Every collective here must be called by all ranks of the group, the same
//! number of times and in the same order. Messages between one pair of ranks
//! with one tag are delivered in FIFO order, which is what lets a fixed tag be
//! reused by consecutive collectives.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::mesh_error::MeshError;

/// Typed wrapper around a message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CommTag(pub u16);

impl CommTag {
    /// Tag reserved for the default `allgather`.
    pub const ALLGATHER: CommTag = CommTag(0xFF01);
    /// Tag reserved for the default `alltoall`.
    pub const ALLTOALL: CommTag = CommTag(0xFF02);
    /// Tag reserved for the default `barrier`.
    pub const BARRIER: CommTag = CommTag(0xFF03);

    pub const fn new(tag: u16) -> Self {
        CommTag(tag)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Derive the `k`-th sub-tag of this base tag.
    pub const fn offset(self, k: u16) -> Self {
        CommTag(self.0.wrapping_add(k))
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Process-group interface used by every collective in the crate.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Post a send of `buf` to `peer`. The buffer is copied before returning.
    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of the next message from `peer` with `tag`.
    ///
    /// Backends may complete the receive eagerly; callers must have posted
    /// their own sends for the same exchange first.
    fn irecv(&self, peer: usize, tag: u16) -> Self::RecvHandle;

    /// This process's rank in `[0, size)`.
    fn rank(&self) -> usize;
    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Abort every process in the group.
    fn abort(&self, code: i32) -> !;

    /// Block until every rank has entered the barrier.
    fn barrier(&self) {
        let mut sink = vec![0u8; 0];
        if let Err(e) = exchange_uniform(self, CommTag::BARRIER, &[], &mut sink, false) {
            crate::mesh_error::abort_group(self, &e);
        }
    }

    /// Gather `send` from every rank into `recv` (rank-ordered, `size * send.len()` bytes).
    fn allgather(&self, send: &[u8], recv: &mut [u8]) -> Result<(), MeshError> {
        exchange_uniform(self, CommTag::ALLGATHER, send, recv, false)
    }

    /// Personalised exchange: chunk `r` of `send` goes to rank `r`; chunk `r` of
    /// `recv` comes from rank `r`. Both buffers hold `size` equal chunks.
    fn alltoall(&self, send: &[u8], recv: &mut [u8]) -> Result<(), MeshError> {
        exchange_uniform(self, CommTag::ALLTOALL, send, recv, true)
    }

    /// Is this the serial no-op communicator?
    fn is_no_comm(&self) -> bool {
        false
    }
}

/// A single remote write inside a one-sided epoch.
#[derive(Clone, Copy, Debug)]
pub struct RmaPut<'a> {
    pub target: usize,
    /// Byte displacement inside the target's window.
    pub displacement: usize,
    pub data: &'a [u8],
}

/// One-sided (remote memory access) extension of a process group.
pub trait OneSided: Communicator {
    /// Expose `window` for one fence-delimited access epoch.
    ///
    /// Between the opening and closing fence this rank writes every `puts`
    /// payload directly into the target's window; when the call returns,
    /// `window` holds everything other ranks put into it. Collective.
    fn put_epoch(&self, window: &mut [u8], puts: &[RmaPut<'_>]) -> Result<(), MeshError>;
}

/// Post sends to every `(peer, payload)` and receive one message from every
/// peer in `from`, returning them in the order of `from`.
///
/// Sends are posted first; all handles are drained before returning. The first
/// failure (missing message) is reported after draining.
pub fn exchange_bytes<C>(
    comm: &C,
    tag: CommTag,
    outgoing: &[(usize, &[u8])],
    from: &[usize],
) -> Result<Vec<Vec<u8>>, MeshError>
where
    C: Communicator + ?Sized,
{
    let pending_sends: Vec<_> = outgoing
        .iter()
        .map(|&(peer, buf)| comm.isend(peer, tag.as_u16(), buf))
        .collect();
    let pending_recvs: Vec<_> = from
        .iter()
        .map(|&peer| (peer, comm.irecv(peer, tag.as_u16())))
        .collect();

    let mut received = Vec::with_capacity(from.len());
    let mut maybe_err = None;
    for (peer, h) in pending_recvs {
        match h.wait() {
            Some(data) => received.push(data),
            None => {
                if maybe_err.is_none() {
                    maybe_err = Some(MeshError::CommError {
                        neighbor: peer,
                        message: format!("no message received from rank {peer}"),
                    });
                }
                received.push(Vec::new());
            }
        }
    }

    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(received),
    }
}

/// Shared body of the default `allgather`/`alltoall`.
fn exchange_uniform<C>(
    comm: &C,
    tag: CommTag,
    send: &[u8],
    recv: &mut [u8],
    personalised: bool,
) -> Result<(), MeshError>
where
    C: Communicator + ?Sized,
{
    let n = comm.size();
    let me = comm.rank();
    let chunk = if personalised {
        if send.len() % n.max(1) != 0 {
            return Err(MeshError::CountMismatch {
                what: "alltoall send chunks",
                expected: n,
                got: send.len(),
            });
        }
        send.len() / n.max(1)
    } else {
        send.len()
    };
    if recv.len() != chunk * n {
        return Err(MeshError::BufferSizeMismatch {
            neighbor: me,
            expected: chunk * n,
            got: recv.len(),
        });
    }

    let own = if personalised {
        &send[me * chunk..(me + 1) * chunk]
    } else {
        send
    };
    recv[me * chunk..(me + 1) * chunk].copy_from_slice(own);

    let peers: Vec<usize> = (0..n).filter(|&p| p != me).collect();
    let outgoing: Vec<(usize, &[u8])> = peers
        .iter()
        .map(|&p| {
            let payload = if personalised {
                &send[p * chunk..(p + 1) * chunk]
            } else {
                send
            };
            (p, payload)
        })
        .collect();

    let incoming = exchange_bytes(comm, tag, &outgoing, &peers)?;
    for (&p, data) in peers.iter().zip(incoming) {
        if data.len() != chunk {
            return Err(MeshError::BufferSizeMismatch {
                neighbor: p,
                expected: chunk,
                got: data.len(),
            });
        }
        recv[p * chunk..(p + 1) * chunk].copy_from_slice(&data);
    }
    Ok(())
}

/// Compile-time no-op comm for pure serial use: a group of exactly one rank.
///
/// Collectives reduce to local copies; point-to-point traffic has no peer.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn abort(&self, code: i32) -> ! {
        log::error!("serial group aborted with code {code}");
        std::process::abort()
    }

    fn barrier(&self) {}

    fn is_no_comm(&self) -> bool {
        true
    }
}

impl OneSided for NoComm {
    fn put_epoch(&self, window: &mut [u8], puts: &[RmaPut<'_>]) -> Result<(), MeshError> {
        for put in puts {
            if put.target != 0 {
                return Err(MeshError::CommError {
                    neighbor: put.target,
                    message: "serial group has only rank 0".into(),
                });
            }
            let dst = region_mut(window, put.displacement, put.data.len())?;
            dst.copy_from_slice(put.data);
        }
        Ok(())
    }
}

fn region_mut(buf: &mut [u8], start: usize, len: usize) -> Result<&mut [u8], MeshError> {
    let buffer_len = buf.len();
    start
        .checked_add(len)
        .filter(|&end| end <= buffer_len)
        .map(move |end| &mut buf[start..end])
        .ok_or(MeshError::RegionOutOfBounds {
            start,
            len,
            buffer_len,
        })
}

// --- ThreadComm: in-process group, one thread per rank ---

type Key = (usize, usize, u16); // (src, dst, tag)
type Window = Arc<Mutex<Vec<u8>>>;

const POLL: Duration = Duration::from_millis(20);

/// State shared by all ranks of one in-process group.
///
/// Created by [`ThreadComm::group`]; dropped with the last communicator.
#[derive(Debug)]
struct GroupState {
    size: usize,
    mailbox: Mutex<HashMap<Key, VecDeque<Bytes>>>,
    arrived: Condvar,
    windows: Mutex<HashMap<(u64, usize), Window>>,
    aborted: AtomicBool,
}

impl GroupState {
    fn check_aborted(&self) {
        if self.aborted.load(Ordering::SeqCst) {
            panic!("process group aborted by a peer rank");
        }
    }
}

/// Receive handle for [`ThreadComm`]; the mailbox is read on `wait`.
pub struct LocalHandle {
    state: Arc<GroupState>,
    key: Key,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let mut mailbox = self.state.mailbox.lock();
        loop {
            if let Some(bytes) = mailbox.get_mut(&self.key).and_then(|q| q.pop_front()) {
                return Some(bytes.to_vec());
            }
            self.state.check_aborted();
            self.state.arrived.wait_for(&mut mailbox, POLL);
        }
    }
}

/// In-process process group: each rank is driven by its own thread.
#[derive(Debug)]
pub struct ThreadComm {
    rank: usize,
    state: Arc<GroupState>,
    epoch: AtomicU64,
}

impl ThreadComm {
    /// Create a group of `size` communicators sharing one explicit state.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "a process group needs at least one rank");
        let state = Arc::new(GroupState {
            size,
            mailbox: Mutex::new(HashMap::new()),
            arrived: Condvar::new(),
            windows: Mutex::new(HashMap::new()),
            aborted: AtomicBool::new(false),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                state: Arc::clone(&state),
                epoch: AtomicU64::new(0),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        self.state
            .mailbox
            .lock()
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        self.state.arrived.notify_all();
    }

    fn irecv(&self, peer: usize, tag: u16) -> LocalHandle {
        LocalHandle {
            state: Arc::clone(&self.state),
            key: (peer, self.rank, tag),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.state.size
    }

    fn abort(&self, code: i32) -> ! {
        self.state.aborted.store(true, Ordering::SeqCst);
        self.state.arrived.notify_all();
        panic!("rank {} aborted the process group with code {code}", self.rank);
    }
}

impl OneSided for ThreadComm {
    fn put_epoch(&self, window: &mut [u8], puts: &[RmaPut<'_>]) -> Result<(), MeshError> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst);
        let mine: Window = Arc::new(Mutex::new(window.to_vec()));
        self.state
            .windows
            .lock()
            .insert((epoch, self.rank), Arc::clone(&mine));

        // opening fence: every window of this epoch is registered
        self.barrier();

        let mut maybe_err = None;
        for put in puts {
            let target = self.state.windows.lock().get(&(epoch, put.target)).cloned();
            let res = match target {
                Some(win) => {
                    let mut guard = win.lock();
                    region_mut(&mut guard, put.displacement, put.data.len())
                        .map(|dst| dst.copy_from_slice(put.data))
                }
                None => Err(MeshError::CommError {
                    neighbor: put.target,
                    message: format!("rank {} exposed no window in epoch {epoch}", put.target),
                }),
            };
            if let Err(e) = res {
                maybe_err.get_or_insert(e);
            }
        }

        // closing fence: all puts into our window are complete
        self.barrier();

        window.copy_from_slice(&mine.lock());
        self.state.windows.lock().remove(&(epoch, self.rank));
        match maybe_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::ffi;
    use mpi::raw::AsRaw;
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// MPI process group over `MPI_COMM_WORLD`.
    pub struct MpiComm {
        pub world: SimpleCommunicator,
        pub rank: usize,
        size: usize,
        _universe: Universe,
    }

    // The crate drives MPI from a single thread of control per process; the
    // handle is moved between threads at most, never used concurrently.
    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        pub fn new() -> Result<Self, MeshError> {
            let universe = mpi::initialize().ok_or_else(|| MeshError::CommError {
                neighbor: 0,
                message: "MPI already initialized or unavailable".into(),
            })?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world,
                rank,
                size,
                _universe: universe,
            })
        }
    }

    /// Send handle owning the in-flight copy of the payload.
    pub struct MpiSendHandle {
        req: Request<'static, [u8], StaticScope>,
        payload: *mut [u8],
    }

    impl Wait for MpiSendHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.req.wait();
            // SAFETY: `payload` was leaked in `isend` and the request is complete.
            drop(unsafe { Box::from_raw(self.payload) });
            None
        }
    }

    /// Receive handle; the message was received when the handle was created.
    pub struct MpiRecvHandle(Vec<u8>);

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            Some(self.0)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let payload: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr: *mut [u8] = payload;
            // SAFETY: the leaked buffer outlives the request; freed in `wait`.
            let data: &'static [u8] = unsafe { &*ptr };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, data, tag as i32);
            MpiSendHandle { req, payload: ptr }
        }

        fn irecv(&self, peer: usize, tag: u16) -> MpiRecvHandle {
            let (data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(tag as i32);
            MpiRecvHandle(data)
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn abort(&self, code: i32) -> ! {
            self.world.abort(code)
        }

        fn barrier(&self) {
            self.world.barrier();
        }

        fn allgather(&self, send: &[u8], recv: &mut [u8]) -> Result<(), MeshError> {
            if recv.len() != send.len() * self.size {
                return Err(MeshError::BufferSizeMismatch {
                    neighbor: self.rank,
                    expected: send.len() * self.size,
                    got: recv.len(),
                });
            }
            self.world.all_gather_into(send, recv);
            Ok(())
        }

        fn alltoall(&self, send: &[u8], recv: &mut [u8]) -> Result<(), MeshError> {
            if send.len() != recv.len() || send.len() % self.size != 0 {
                return Err(MeshError::BufferSizeMismatch {
                    neighbor: self.rank,
                    expected: send.len(),
                    got: recv.len(),
                });
            }
            self.world.all_to_all_into(send, recv);
            Ok(())
        }
    }

    impl OneSided for MpiComm {
        fn put_epoch(&self, window: &mut [u8], puts: &[RmaPut<'_>]) -> Result<(), MeshError> {
            // every rank learns every window length before any put is issued
            let mine = [crate::algs::wire::WireCount::new(window.len())];
            let mut lens = vec![crate::algs::wire::WireCount::new(0); self.size];
            self.allgather(
                crate::algs::wire::cast_slice(&mine),
                crate::algs::wire::cast_slice_mut(&mut lens),
            )?;

            let mut maybe_err = None;
            let valid: Vec<&RmaPut<'_>> = puts
                .iter()
                .filter(|put| match check_put(put, &lens) {
                    Ok(()) => true,
                    Err(e) => {
                        maybe_err.get_or_insert(e);
                        false
                    }
                })
                .collect();

            // SAFETY: `window` stays borrowed for the whole epoch and the
            // window object is freed before returning; every put was checked
            // against its target's window length above.
            unsafe {
                let mut win = std::mem::MaybeUninit::<ffi::MPI_Win>::uninit();
                mpi_ok(
                    self.rank,
                    "MPI_Win_create",
                    ffi::MPI_Win_create(
                        window.as_mut_ptr().cast(),
                        window.len() as ffi::MPI_Aint,
                        1,
                        ffi::RSMPI_INFO_NULL,
                        self.world.as_raw(),
                        win.as_mut_ptr(),
                    ),
                )?;
                let mut win = win.assume_init();
                let mut record = |res: Result<(), MeshError>| {
                    if let Err(e) = res {
                        maybe_err.get_or_insert(e);
                    }
                };
                record(mpi_ok(self.rank, "MPI_Win_fence", ffi::MPI_Win_fence(0, win)));
                for put in valid {
                    let len = i32::try_from(put.data.len()).map_err(|_| MeshError::CountMismatch {
                        what: "one-sided put bytes",
                        expected: i32::MAX as usize,
                        got: put.data.len(),
                    });
                    let res = len.and_then(|len| {
                        mpi_ok(
                            put.target,
                            "MPI_Put",
                            ffi::MPI_Put(
                                put.data.as_ptr().cast(),
                                len,
                                ffi::RSMPI_UINT8_T,
                                put.target as i32,
                                put.displacement as ffi::MPI_Aint,
                                len,
                                ffi::RSMPI_UINT8_T,
                                win,
                            ),
                        )
                    });
                    record(res);
                }
                record(mpi_ok(self.rank, "MPI_Win_fence", ffi::MPI_Win_fence(0, win)));
                record(mpi_ok(self.rank, "MPI_Win_free", ffi::MPI_Win_free(&mut win)));
            }
            match maybe_err {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    fn check_put(put: &RmaPut<'_>, lens: &[crate::algs::wire::WireCount]) -> Result<(), MeshError> {
        let target_len = lens.get(put.target).map(|c| c.get()).ok_or_else(|| MeshError::CommError {
            neighbor: put.target,
            message: format!("no rank {} in a group of {}", put.target, lens.len()),
        })?;
        match put.displacement.checked_add(put.data.len()) {
            Some(end) if end <= target_len => Ok(()),
            _ => Err(MeshError::RegionOutOfBounds {
                start: put.displacement,
                len: put.data.len(),
                buffer_len: target_len,
            }),
        }
    }

    fn mpi_ok(neighbor: usize, call: &str, code: std::os::raw::c_int) -> Result<(), MeshError> {
        if code == ffi::MPI_SUCCESS as std::os::raw::c_int {
            Ok(())
        } else {
            Err(MeshError::CommError {
                neighbor,
                message: format!("{call} failed with code {code}"),
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::algs::wire::WireCount;

        #[test]
        fn puts_are_checked_against_target_window() {
            let lens = [WireCount::new(16), WireCount::new(4)];
            let data = [0u8; 8];
            let put = |target, displacement| RmaPut { target, displacement, data: &data };
            assert!(check_put(&put(0, 8), &lens).is_ok());
            assert_eq!(
                check_put(&put(1, 0), &lens),
                Err(MeshError::RegionOutOfBounds { start: 0, len: 8, buffer_len: 4 })
            );
            assert!(matches!(
                check_put(&put(2, 0), &lens),
                Err(MeshError::CommError { neighbor: 2, .. })
            ));
            assert!(check_put(&put(0, usize::MAX), &lens).is_err());
        }

        #[test]
        fn nonzero_return_codes_become_errors() {
            assert!(mpi_ok(0, "MPI_Win_fence", ffi::MPI_SUCCESS as std::os::raw::c_int).is_ok());
            assert!(matches!(
                mpi_ok(3, "MPI_Put", 12),
                Err(MeshError::CommError { neighbor: 3, .. })
            ));
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_roundtrip_two_ranks() {
        let comms = ThreadComm::group(2);
        let tag = CommTag::new(7);

        comms[0].isend(1, tag.as_u16(), &[1, 2, 3, 4]).wait();
        let data = comms[1]
            .irecv(0, tag.as_u16())
            .wait()
            .expect("Expected to receive data from rank 0");
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn fifo_per_tag() {
        let comms = ThreadComm::group(2);
        for i in 0..10u8 {
            comms[0].isend(1, 3, &[i]);
        }
        let got: Vec<u8> = (0..10)
            .map(|_| comms[1].irecv(0, 3).wait().unwrap()[0])
            .collect();
        assert_eq!(got, (0u8..10).collect::<Vec<_>>());
    }

    #[test]
    fn allgather_and_alltoall_over_threads() {
        let comms = ThreadComm::group(3);
        std::thread::scope(|s| {
            for comm in &comms {
                s.spawn(move || {
                    let me = comm.rank() as u8;
                    let mut all = vec![0u8; 3];
                    comm.allgather(&[me * 10], &mut all).unwrap();
                    assert_eq!(all, vec![0, 10, 20]);

                    let send: Vec<u8> = (0..3).map(|dst| me * 3 + dst).collect();
                    let mut recv = vec![0u8; 3];
                    comm.alltoall(&send, &mut recv).unwrap();
                    let want: Vec<u8> = (0..3).map(|src| src * 3 + me).collect();
                    assert_eq!(recv, want);
                    comm.barrier();
                });
            }
        });
    }

    #[test]
    fn put_epoch_writes_remote_windows() {
        let comms = ThreadComm::group(2);
        std::thread::scope(|s| {
            for comm in &comms {
                s.spawn(move || {
                    let me = comm.rank();
                    let mut window = vec![0u8; 2];
                    let payload = [me as u8 + 1];
                    let puts = [
                        RmaPut { target: 0, displacement: me, data: &payload },
                        RmaPut { target: 1, displacement: me, data: &payload },
                    ];
                    comm.put_epoch(&mut window, &puts).unwrap();
                    assert_eq!(window, vec![1, 2]);
                });
            }
        });
    }

    #[test]
    fn no_comm_is_single_rank() {
        let comm = NoComm;
        assert!(comm.is_no_comm());
        let mut all = [0u8; 2];
        comm.allgather(&[5, 6], &mut all).unwrap();
        assert_eq!(all, [5, 6]);
        let mut window = [0u8; 3];
        comm.put_epoch(&mut window, &[RmaPut { target: 0, displacement: 1, data: &[9, 9] }])
            .unwrap();
        assert_eq!(window, [0, 9, 9]);
    }

    #[test]
    fn allgather_rejects_bad_recv_len() {
        let comm = NoComm;
        let mut all = [0u8; 3];
        let err = comm.allgather(&[1, 2], &mut all).unwrap_err();
        assert!(matches!(err, MeshError::BufferSizeMismatch { .. }));
    }

    #[test]
    fn commtag_roundtrip() {
        let t = CommTag::new(0xABCD);
        assert_eq!(t.as_u16(), 0xABCD);
        assert_eq!(t.offset(2), CommTag(0xABCF));
    }
}
