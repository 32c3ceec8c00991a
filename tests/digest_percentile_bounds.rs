use q_digest::QDigest;
use rand::prelude::*;
use test_log::test;

/// Smallest value whose rank covers `⌊p * n⌋`, or `None` for a zero target
/// rank (where the digest answers 0 by convention).
fn exact_quantile(sorted: &[u64], p: f64) -> Option<u64> {
    let req = (p * sorted.len() as f64).floor() as usize;

    match req {
        0 => None,
        _ => sorted.get(req - 1).copied(),
    }
}

/// Without compression every key keeps its own leaf, so quantile queries
/// have nothing to approximate: they must equal the empirical quantiles.
#[test]
fn uncompressed_digest_answers_exact_quantiles() {
    let mut rng = StdRng::seed_from_u64(5);

    for _ in 0..20 {
        let values: Vec<u64> = (0..rng.random_range(1..400usize))
            .map(|_| rng.random_range(0..8_192u64))
            .collect();

        let mut digest = QDigest::new(1_000_000, 1);

        for &value in &values {
            digest.insert(value, 1, true);
        }

        let mut sorted = values;
        sorted.sort_unstable();

        for i in 0..=100u32 {
            let p = f64::from(i) / 100.0;

            if let Some(exact) = exact_quantile(&sorted, p) {
                assert_eq!(exact, digest.percentile(p), "p={p}");
            }
        }
    }
}

/// Compression may only push answers upwards: the digest attributes counts
/// to wider intervals, never to smaller values. The returned value is
/// always an upper bound for the requested rank.
#[test]
fn compressed_digest_never_under_reports() {
    let mut rng = StdRng::seed_from_u64(6);

    for _ in 0..20 {
        let k = *[1u64, 2, 3, 5, 8, 13]
            .choose(&mut rng)
            .expect("candidates are non-empty");

        let values: Vec<u64> = (0..rng.random_range(1..3_000usize))
            .map(|_| rng.random_range(0..16_384u64))
            .collect();

        let mut digest = QDigest::new(k, 1);

        for &value in &values {
            digest.insert(value, 1, true);
        }

        let mut sorted = values;
        sorted.sort_unstable();

        for i in 0..=100u32 {
            let p = f64::from(i) / 100.0;

            if let Some(exact) = exact_quantile(&sorted, p) {
                assert!(
                    digest.percentile(p) >= exact,
                    "p={p}: {} under-reports the exact quantile {exact}",
                    digest.percentile(p),
                );
            }
        }
    }
}

/// A zero target rank short-circuits before any count is accumulated.
#[test]
fn zero_rank_answers_zero() {
    let mut digest = QDigest::new(5, 1);

    digest.insert(100, 1, true);
    digest.insert(120, 3, true);

    assert_eq!(0, digest.percentile(0.0));
}
