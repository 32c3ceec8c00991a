// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, Encode};
use crate::transport::Communicator;
use crate::util::prev_power_of_two;
use crate::{Error, QDigest};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Folds the per-rank digests of a communicator into one global digest.
///
/// The reduction runs in three stages:
///
/// 1. **Trim**: with `P` ranks and `P2` the largest power of two `<= P`, the
///    first `P - P2` odd ranks ship their digest to the even rank right
///    before them and leave.
/// 2. **Compaction**: the survivors split off a sub-communicator in which
///    they are numbered contiguously.
/// 3. **Tree**: `log2(P2)` rounds of pairwise exchanges; in round `k`, rank
///    `r` sends to `r - 2^k` if `r` is an odd multiple of `2^k`, otherwise
///    it receives from `r + 2^k` and merges.
///
/// Consumes the local digest. After `⌈log₂ P⌉` rounds of messages, rank 0 of
/// the compact communicator gets `Some` global digest back; every other rank
/// gets `None`, its contribution having been folded into a peer.
///
/// Messages are framed as a big-endian 64-bit byte count followed by exactly
/// that many payload bytes.
///
/// # Examples
///
/// ```
/// use q_digest::{tree_reduce, LocalComm, QDigest};
///
/// let outcomes: Vec<_> = std::thread::scope(|scope| {
///     let threads: Vec<_> = LocalComm::cluster(2)
///         .into_iter()
///         .enumerate()
///         .map(|(rank, comm)| {
///             scope.spawn(move || {
///                 let mut digest = QDigest::new(5, 1);
///                 digest.insert(rank as u64, 1, true);
///
///                 tree_reduce(digest, &comm)
///             })
///         })
///         .collect();
///
///     threads
///         .into_iter()
///         .map(|handle| handle.join().unwrap())
///         .collect()
/// });
///
/// let global = outcomes
///     .into_iter()
///     .flat_map(Result::unwrap)
///     .next()
///     .unwrap();
///
/// assert_eq!(2, global.len());
/// assert_eq!(1, global.percentile(1.0));
/// ```
///
/// # Errors
///
/// Any transport failure, malformed peer message, or truncated frame is
/// fatal; the distributed algorithm cannot recover a lost contribution.
pub fn tree_reduce<C: Communicator>(digest: QDigest, comm: &C) -> crate::Result<Option<QDigest>> {
    let size = comm.size();
    let rank = comm.rank();

    let p2 = prev_power_of_two(size);
    let orphans = size - p2;

    let mut digest = digest;

    // Stage 1: fold the overhang into the even ranks ahead of it
    if orphans > 0 && rank < 2 * orphans {
        if rank % 2 == 1 {
            log::debug!("rank {rank}: orphan, folding into rank {}", rank - 1);

            send_digest(comm, rank - 1, &digest)?;
            drop(digest);

            // still part of the collective split, but opted out
            let excluded = comm.split(None)?;
            debug_assert!(excluded.is_none());

            return Ok(None);
        }

        let received = recv_digest(comm, rank + 1)?;
        digest.merge(&received);
    }

    // Stage 2: survivors get contiguous ranks
    let Some(tree_comm) = comm.split(Some(0))? else {
        return Ok(None);
    };

    // Stage 3: binary tree over the power-of-two population
    let tree_rank = tree_comm.rank();
    let rounds = tree_comm.size().trailing_zeros();

    for round in 0..rounds {
        let step = 1usize << round;

        if tree_rank % (2 * step) != 0 {
            let receiver = tree_rank - step;

            log::debug!("round {round}: rank {tree_rank} sends to rank {receiver}");

            send_digest(&tree_comm, receiver, &digest)?;

            // a sender participates in exactly one round
            return Ok(None);
        }

        let sender = tree_rank + step;

        log::debug!("round {round}: rank {tree_rank} receives from rank {sender}");

        let received = recv_digest(&tree_comm, sender)?;
        digest.merge(&received);
    }

    log::debug!(
        "reduction done: {} elements in {} nodes",
        digest.len(),
        digest.node_count(),
    );

    Ok(Some(digest))
}

fn send_digest<C: Communicator>(comm: &C, dest: usize, digest: &QDigest) -> crate::Result<()> {
    let payload = digest.encode_into_vec();
    debug_assert_eq!(digest.serialized_size(), payload.len());

    let mut frame = Vec::with_capacity(8);
    frame
        .write_u64::<BigEndian>(payload.len() as u64)
        .expect("cannot fail");

    comm.send(dest, &frame)?;
    comm.send(dest, &payload)?;

    log::debug!("sent {} bytes to rank {dest}", payload.len());

    Ok(())
}

fn recv_digest<C: Communicator>(comm: &C, src: usize) -> crate::Result<QDigest> {
    let frame = comm.recv(src)?;

    if frame.len() != 8 {
        return Err(Error::TruncatedMessage {
            expected: 8,
            got: frame.len() as u64,
        });
    }

    let expected = frame
        .as_slice()
        .read_u64::<BigEndian>()
        .expect("frame is 8 bytes");

    let payload = comm.recv(src)?;

    if payload.len() as u64 != expected {
        return Err(Error::TruncatedMessage {
            expected,
            got: payload.len() as u64,
        });
    }

    log::debug!("received {expected} bytes from rank {src}");

    let mut reader = payload.as_slice();

    QDigest::decode_from(&mut reader).map_err(Error::Decode)
}
