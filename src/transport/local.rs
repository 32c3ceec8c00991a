// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Communicator, TransportError};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::{Arc, Barrier, Condvar, Mutex};

/// In-process communicator backed by channels.
///
/// [`LocalComm::cluster`] wires up one handle per rank; each handle is meant
/// to be moved into its own thread, which then plays the role of one process
/// of the cluster. Every ordered rank pair gets a dedicated unbounded
/// channel, which gives the per-pair FIFO ordering the protocol relies on.
pub struct LocalComm {
    rank: usize,

    /// Senders towards every rank, indexed by destination.
    outgoing: Vec<Sender<Vec<u8>>>,

    /// Receiving ends, indexed by source rank.
    incoming: Vec<Receiver<Vec<u8>>>,

    shared: Arc<Shared>,
}

struct Shared {
    barrier: Barrier,
    split: Mutex<SplitState>,
    split_signal: Condvar,
}

/// Rendezvous state of one collective split call.
struct SplitState {
    colors: Vec<Option<Option<u32>>>,
    submitted: usize,
    ready: bool,
    results: Vec<Option<LocalComm>>,
    taken: usize,
}

impl Shared {
    fn new(size: usize) -> Self {
        Self {
            barrier: Barrier::new(size),
            split: Mutex::new(SplitState {
                colors: vec![None; size],
                submitted: 0,
                ready: false,
                results: (0..size).map(|_| None).collect(),
                taken: 0,
            }),
            split_signal: Condvar::new(),
        }
    }
}

impl LocalComm {
    /// Builds a fully connected cluster of `size` ranks.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    #[must_use]
    pub fn cluster(size: usize) -> Vec<Self> {
        assert!(size > 0, "a cluster needs at least one rank");
        Self::build(size)
    }

    #[allow(clippy::indexing_slicing)]
    fn build(size: usize) -> Vec<Self> {
        let shared = Arc::new(Shared::new(size));

        let mut outgoing: Vec<Vec<Sender<Vec<u8>>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut incoming: Vec<Vec<Receiver<Vec<u8>>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();

        for src in 0..size {
            for dst in 0..size {
                let (tx, rx) = crossbeam_channel::unbounded();
                outgoing[src].push(tx);
                incoming[dst].push(rx);
            }
        }

        outgoing
            .into_iter()
            .zip(incoming)
            .enumerate()
            .map(|(rank, (outgoing, incoming))| Self {
                rank,
                outgoing,
                incoming,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outgoing.len()
    }

    fn send(&self, dest: usize, payload: &[u8]) -> Result<(), TransportError> {
        let link = self.outgoing.get(dest).ok_or(TransportError::UnknownRank {
            rank: dest,
            size: self.size(),
        })?;

        link.send(payload.to_vec())
            .map_err(|_| TransportError::Disconnected { peer: dest })
    }

    fn recv(&self, src: usize) -> Result<Vec<u8>, TransportError> {
        let link = self.incoming.get(src).ok_or(TransportError::UnknownRank {
            rank: src,
            size: self.size(),
        })?;

        link.recv()
            .map_err(|_| TransportError::Disconnected { peer: src })
    }

    fn barrier(&self) -> Result<(), TransportError> {
        self.shared.barrier.wait();
        Ok(())
    }

    #[allow(clippy::expect_used, clippy::indexing_slicing)]
    fn split(&self, color: Option<u32>) -> Result<Option<Self>, TransportError> {
        let size = self.size();

        let mut state = self.shared.split.lock().expect("split lock is poisoned");

        // wait out a previous split that has not fully drained yet
        while state.ready {
            state = self
                .shared
                .split_signal
                .wait(state)
                .expect("split lock is poisoned");
        }

        state.colors[self.rank] = Some(color);
        state.submitted += 1;

        if state.submitted == size {
            // the last submitter wires up the sub-clusters
            let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();

            for (rank, submitted) in state.colors.iter().enumerate() {
                if let Some(Some(color)) = submitted {
                    groups.entry(*color).or_default().push(rank);
                }
            }

            for members in groups.values() {
                let handles = Self::build(members.len());

                for (member, handle) in members.iter().zip(handles) {
                    state.results[*member] = Some(handle);
                }
            }

            state.ready = true;
            self.shared.split_signal.notify_all();
        } else {
            while !state.ready {
                state = self
                    .shared
                    .split_signal
                    .wait(state)
                    .expect("split lock is poisoned");
            }
        }

        let handle = state.results[self.rank].take();

        state.taken += 1;

        if state.taken == size {
            // reset, so the communicator can be split again
            state.colors.iter_mut().for_each(|color| *color = None);
            state.submitted = 0;
            state.taken = 0;
            state.ready = false;
            self.shared.split_signal.notify_all();
        }

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn messages_between_pairs_are_fifo() {
        let mut cluster = LocalComm::cluster(2).into_iter();
        let a = cluster.next().expect("rank 0 exists");
        let b = cluster.next().expect("rank 1 exists");

        a.send(1, b"first").expect("peer is alive");
        a.send(1, b"second").expect("peer is alive");

        assert_eq!(b"first".as_slice(), &*b.recv(0).expect("message in flight"));
        assert_eq!(b"second".as_slice(), &*b.recv(0).expect("message in flight"));
    }

    #[test]
    fn send_to_self_is_buffered() {
        let cluster = LocalComm::cluster(1);
        let only = cluster.first().expect("rank 0 exists");

        only.send(0, b"loopback").expect("own endpoint is alive");
        assert_eq!(
            b"loopback".as_slice(),
            &*only.recv(0).expect("message in flight"),
        );
    }

    #[test]
    fn unknown_ranks_are_rejected() {
        let cluster = LocalComm::cluster(2);
        let a = cluster.first().expect("rank 0 exists");

        assert!(matches!(
            a.send(7, b"nope"),
            Err(TransportError::UnknownRank { rank: 7, size: 2 }),
        ));
        assert!(matches!(
            a.recv(2),
            Err(TransportError::UnknownRank { rank: 2, size: 2 }),
        ));
    }

    #[test]
    fn split_renumbers_survivors_contiguously() {
        let cluster = LocalComm::cluster(4);

        let handles: Vec<_> = std::thread::scope(|scope| {
            // spawn everything first: split is a collective call
            let threads: Vec<_> = cluster
                .into_iter()
                .enumerate()
                .map(|(rank, comm)| {
                    scope.spawn(move || {
                        // odd ranks opt out
                        let color = (rank % 2 == 0).then_some(0);
                        comm.split(color).expect("collective completes")
                    })
                })
                .collect();

            threads
                .into_iter()
                .map(|handle| handle.join().expect("no panic"))
                .collect()
        });

        let survivors: Vec<_> = handles.into_iter().flatten().collect();

        assert_eq!(2, survivors.len());

        for (expected_rank, comm) in survivors.iter().enumerate() {
            assert_eq!(expected_rank, comm.rank());
            assert_eq!(2, comm.size());
        }

        // the sub-communicator is fully usable
        let a = survivors.first().expect("two survivors");
        let b = survivors.get(1).expect("two survivors");

        a.send(1, b"ping").expect("peer is alive");
        assert_eq!(b"ping".as_slice(), &*b.recv(0).expect("message in flight"));
    }
}
