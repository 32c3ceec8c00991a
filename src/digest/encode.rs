// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Wire format of a digest:
//!
//! ```text
//! <len> <k> <root.lo> <root.hi>\n
//! <lo> <hi> <count>\n
//! ...
//! \0
//! ```
//!
//! One line per non-zero-count bucket, in pre-order; decimal ASCII with
//! single-space separators; a single null byte terminates the buffer so its
//! length is self-describing.

use super::QDigest;
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::util::decimal_width;
use std::io::{Read, Write};

impl QDigest {
    /// Exact number of bytes [`Encode::encode_into`] will emit, including
    /// the terminating null byte.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        // header: three spaces, one newline
        let mut size = decimal_width(self.len())
            + decimal_width(self.k())
            + decimal_width(0)
            + decimal_width(self.universe_hi())
            + 4;

        for bucket in self.buckets() {
            size += decimal_width(bucket.lo)
                + decimal_width(bucket.hi)
                + decimal_width(bucket.count)
                + 3;
        }

        // terminator
        size + 1
    }
}

impl Encode for QDigest {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writeln!(
            writer,
            "{} {} {} {}",
            self.len(),
            self.k(),
            0,
            self.universe_hi(),
        )?;

        for bucket in self.buckets() {
            writeln!(writer, "{} {} {}", bucket.lo, bucket.hi, bucket.count)?;
        }

        writer.write_all(&[0])?;

        Ok(())
    }
}

impl Decode for QDigest {
    /// Strict parse: any malformed header or bucket line, a missing
    /// terminator, or a total that disagrees with the header is an error.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;

        let end = buf
            .iter()
            .position(|&byte| byte == 0)
            .ok_or(DecodeError::MissingTerminator)?;

        let (content, _) = buf.split_at(end);
        let text = std::str::from_utf8(content)?;

        let mut lines = text.lines();

        let header = lines
            .next()
            .ok_or(DecodeError::InvalidHeader("missing header line"))?;

        let [expected_len, k, root_lo, root_hi] = parse_row::<4>(header)
            .ok_or(DecodeError::InvalidHeader("expected four integer fields"))?;

        if root_lo != 0 {
            return Err(DecodeError::InvalidHeader("root interval must start at 0"));
        }
        if k == 0 {
            return Err(DecodeError::InvalidHeader(
                "compression parameter must be positive",
            ));
        }
        if !root_hi
            .checked_add(1)
            .is_some_and(u64::is_power_of_two)
        {
            return Err(DecodeError::InvalidHeader(
                "universe size must be a power of two",
            ));
        }

        let mut digest = Self::new(k, root_hi);

        for line in lines {
            let [lo, hi, count] = parse_row::<3>(line)
                .ok_or(DecodeError::InvalidBucket("expected three integer fields"))?;

            if count == 0 {
                return Err(DecodeError::InvalidBucket("zero-count bucket"));
            }
            if !digest.is_valid_interval(lo, hi) {
                return Err(DecodeError::InvalidBucket(
                    "not a sub-interval of the universe",
                ));
            }

            digest.insert_node(lo, hi, count);
        }

        if digest.len() != expected_len {
            return Err(DecodeError::CountMismatch((expected_len, digest.len())));
        }

        Ok(digest)
    }
}

/// Parses a line of exactly `N` space-separated decimal integers.
fn parse_row<const N: usize>(line: &str) -> Option<[u64; N]> {
    let mut fields = line.split(' ');
    let mut row = [0u64; N];

    for slot in &mut row {
        *slot = fields.next()?.parse().ok()?;
    }

    fields.next().is_none().then_some(row)
}
