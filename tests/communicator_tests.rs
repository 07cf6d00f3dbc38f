use mesh_exchange::algs::communicator::{CommTag, Communicator, ThreadComm, Wait};
use serial_test::serial;

mod util;

#[test]
fn thread_round_trip() {
    let tag = CommTag(0x1000);
    let comms = ThreadComm::group(2);

    let msg = b"hello";
    comms[0].isend(1, tag.as_u16(), msg).wait();
    let got = comms[1].irecv(0, tag.as_u16()).wait().unwrap();
    assert_eq!(&got, msg);
}

#[test]
fn tags_do_not_mix() {
    let comms = ThreadComm::group(2);
    comms[0].isend(1, 1, &[1]);
    comms[0].isend(1, 2, &[2]);
    assert_eq!(comms[1].irecv(0, 2).wait().unwrap(), vec![2]);
    assert_eq!(comms[1].irecv(0, 1).wait().unwrap(), vec![1]);
}

#[test]
#[serial]
fn repeated_collectives_stay_in_step() {
    let out = util::run_group(4, |comm| {
        let me = comm.rank() as u8;
        let mut sums = Vec::new();
        for round in 0..5u8 {
            let mut all = vec![0u8; 4];
            comm.allgather(&[me + round], &mut all).unwrap();
            sums.push(all.iter().map(|&v| v as u32).sum::<u32>());
        }
        comm.barrier();
        sums
    });
    for sums in out {
        assert_eq!(sums, vec![6, 10, 14, 18, 22]);
    }
}

#[test]
#[should_panic]
fn abort_unblocks_waiting_ranks() {
    util::run_group(2, |comm| {
        if comm.rank() == 0 {
            comm.abort(3);
        }
        // rank 1 waits for a message that never comes
        comm.irecv(0, 9).wait()
    });
}
