// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A K.I.S.S. implementation of the Q-Digest approximate quantile sketch.
//!
//! ##### About
//!
//! A [`QDigest`] summarizes an integer multiset over a power-of-two universe
//! `[0, N)` in bounded memory, trading accuracy against space through a
//! compression parameter `K`: rank queries are answered within an additive
//! error of `len / K`.
//!
//! Two digests can be merged without weakening the compression guarantee of
//! either input, which makes the sketch an associative reduction unit: the
//! [`tree_reduce`] protocol folds the per-rank digests of an arbitrary-sized
//! communicator into a single global digest in `⌈log₂ P⌉` rounds, using any
//! [`Communicator`](transport::Communicator) as the messaging substrate.
//!
//! # Example usage
//!
//! ```
//! use q_digest::QDigest;
//!
//! // A digest over an integer universe; a large K keeps full accuracy
//! let mut digest = QDigest::new(1_000, 1);
//!
//! for key in 0u64..1_000 {
//!     digest.insert(key, 1, true);
//! }
//!
//! // The universe grows on demand to the next power of two
//! assert_eq!(1_023, digest.universe_hi());
//! assert_eq!(1_000, digest.len());
//!
//! // Quantile queries return an upper bound for the requested rank
//! assert_eq!(499, digest.percentile(0.5));
//! assert_eq!(999, digest.percentile(1.0));
//! ```
//!
//! Digests travel between processes in a self-describing byte format:
//!
//! ```
//! use q_digest::{Decode, Encode, QDigest};
//!
//! let mut digest = QDigest::new(10, 1);
//! digest.insert(4, 3, true);
//!
//! let bytes = digest.encode_into_vec();
//! assert_eq!(bytes.len(), digest.serialized_size());
//!
//! let copy = QDigest::decode_from(&mut bytes.as_slice())?;
//! assert_eq!(digest.len(), copy.len());
//! #
//! # Ok::<(), q_digest::DecodeError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

mod coding;
mod digest;
mod error;
mod reduce;

pub mod transport;

mod util;

pub use {
    coding::{Decode, DecodeError, Encode, EncodeError},
    digest::{Bucket, QDigest, COMPRESSION_SLACK},
    error::{Error, Result},
    reduce::tree_reduce,
    transport::{Communicator, LocalComm, TransportError},
};
