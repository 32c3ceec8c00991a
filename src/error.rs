// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{DecodeError, EncodeError},
    transport::TransportError,
};

/// Represents errors that can occur in the digest or the reduction protocol
#[derive(Debug)]
pub enum Error {
    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// The messaging substrate failed
    Transport(TransportError),

    /// A framed message carried fewer payload bytes than its length prefix announced
    TruncatedMessage {
        /// Byte count announced by the length prefix
        expected: u64,

        /// Byte count actually received
        got: u64,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "QDigestError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<TransportError> for Error {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

/// Crate result
pub type Result<T> = std::result::Result<T, Error>;
