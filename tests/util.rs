use mesh_exchange::algs::communicator::ThreadComm;

/// Run `f` once per rank of an in-process group of `size` ranks and collect
/// the per-rank results in rank order.
pub fn run_group<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(&ThreadComm) -> R + Sync,
{
    let comms = ThreadComm::group(size);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = comms.iter().map(|comm| s.spawn(move || f(comm))).collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

