// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Messaging seam of the reduction protocol.
//!
//! The digest itself is strictly single-threaded; everything that crosses a
//! process boundary goes through a [`Communicator`]. The trait is a thin
//! binding of a message-passing substrate: blocking point-to-point sends and
//! receives with per-pair FIFO ordering, a barrier, and a collective
//! split/partition primitive.
//!
//! [`LocalComm`] ships as the in-process implementation, wiring the ranks of
//! a simulated cluster together with channels.

mod local;

pub use local::LocalComm;

/// Errors surfaced by a communicator.
///
/// The reduction protocol treats every one of these as fatal; there are no
/// retry semantics.
#[derive(Debug)]
pub enum TransportError {
    /// The peer endpoint is gone, so the message can never be delivered
    /// (or received)
    Disconnected {
        /// Rank of the peer
        peer: usize,
    },

    /// The addressed rank does not exist in this communicator
    UnknownRank {
        /// The addressed rank
        rank: usize,

        /// Size of the communicator
        size: usize,
    },
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransportError({self:?})")
    }
}

impl std::error::Error for TransportError {}

/// Blocking message passing between the `size()` ranks of a communicator.
///
/// Semantics every implementation must provide:
///
/// - messages between a fixed pair of ranks arrive in send order (FIFO),
/// - payload bytes are copied on send, so both ends own their buffers,
/// - all operations block until they can complete; failures are final.
pub trait Communicator: Sized {
    /// Rank of the calling process, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of participating ranks.
    fn size(&self) -> usize;

    /// Sends `payload` to rank `dest`.
    ///
    /// # Errors
    ///
    /// Fails if `dest` does not exist or its endpoint is gone.
    fn send(&self, dest: usize, payload: &[u8]) -> Result<(), TransportError>;

    /// Receives the next message sent by rank `src`.
    ///
    /// # Errors
    ///
    /// Fails if `src` does not exist, or hung up with no message in flight.
    fn recv(&self, src: usize) -> Result<Vec<u8>, TransportError>;

    /// Blocks until every rank of the communicator has entered the barrier.
    ///
    /// # Errors
    ///
    /// Fails if the substrate cannot complete the collective.
    fn barrier(&self) -> Result<(), TransportError>;

    /// Collectively partitions the communicator by `color`.
    ///
    /// Every rank must make this call. Ranks passing the same color form a
    /// new communicator in which they are renumbered contiguously in their
    /// old rank order; passing `None` opts out and yields no handle.
    ///
    /// # Errors
    ///
    /// Fails if the substrate cannot complete the collective.
    fn split(&self, color: Option<u32>) -> Result<Option<Self>, TransportError>;
}
