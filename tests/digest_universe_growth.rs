use q_digest::QDigest;
use test_log::test;

#[test]
fn single_key_grows_empty_universe() {
    let mut digest = QDigest::new(5, 0);

    digest.insert(7, 1, true);

    assert_eq!(1, digest.len());
    assert_eq!(7, digest.universe_hi());
    assert_eq!(7, digest.percentile(1.0));
}

#[test]
fn universe_always_spans_a_power_of_two() {
    let mut digest = QDigest::new(5, 1);

    for key in [1u64, 2, 5, 17, 200, 1_000] {
        digest.insert(key, 1, true);
        assert!((digest.universe_hi() + 1).is_power_of_two());
        assert!(digest.universe_hi() >= key);
    }

    assert_eq!(1_023, digest.universe_hi());
}

#[test]
fn growth_preserves_earlier_insertions() {
    let mut digest = QDigest::new(1_000, 1);

    for key in 0..100u64 {
        digest.insert(key, 1, true);
    }

    // each expansion grafts the previous tree unmodified
    digest.insert(5_000, 1, true);

    assert_eq!(101, digest.len());
    assert_eq!(8_191, digest.universe_hi());

    assert_eq!(48, digest.percentile(0.49));
    assert_eq!(5_000, digest.percentile(1.0));
}

#[test]
fn insert_within_universe_never_expands() {
    let mut digest = QDigest::new(5, 255);

    digest.insert(255, 9, true);
    digest.insert(0, 2, true);

    assert_eq!(255, digest.universe_hi());
    assert_eq!(11, digest.len());
}
