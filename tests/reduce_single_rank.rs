use q_digest::{tree_reduce, Encode, LocalComm, QDigest};
use test_log::test;

/// With a single rank there is nothing to exchange: the digest comes back
/// bit-identical.
#[test]
fn single_rank_reduction_is_the_identity() {
    let mut digest = QDigest::new(5, 1);

    for key in [3u64, 1, 4, 1, 5, 9, 2, 6] {
        digest.insert(key, 1, true);
    }

    let before = digest.encode_into_vec();

    let cluster = LocalComm::cluster(1);
    let comm = cluster.first().expect("rank 0 exists");

    let global = tree_reduce(digest, comm)
        .expect("reduction completes")
        .expect("the only rank holds the aggregate");

    assert_eq!(before, global.encode_into_vec());
}

/// An empty digest survives the protocol, too.
#[test]
fn single_empty_rank_reduces_to_an_empty_digest() {
    let cluster = LocalComm::cluster(1);
    let comm = cluster.first().expect("rank 0 exists");

    let global = tree_reduce(QDigest::new(9, 63), comm)
        .expect("reduction completes")
        .expect("the only rank holds the aggregate");

    assert!(global.is_empty());
    assert_eq!(9, global.k());
    assert_eq!(63, global.universe_hi());
}
