// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Computes ⌈log₂(n)⌉, mapping both 0 and 1 to 0.
pub fn log2_ceil(n: u64) -> u32 {
    match n {
        0 | 1 => 0,
        _ => u64::BITS - (n - 1).leading_zeros(),
    }
}

/// Returns the largest power of two that is `<= n`.
pub fn prev_power_of_two(n: usize) -> usize {
    match n {
        0 => 0,
        _ => 1 << (usize::BITS - 1 - n.leading_zeros()),
    }
}

/// Number of decimal ASCII digits needed to print `n`.
pub fn decimal_width(n: u64) -> usize {
    match n {
        0 => 1,
        _ => n.ilog10() as usize + 1,
    }
}
