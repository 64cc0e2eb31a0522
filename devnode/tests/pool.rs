mod common;

use bytes::Bytes;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use common::{pool, txn, txn_with};
use devnode::{
    block::Block,
    common::gwei_to_wei,
    txpool::{AddOutcome, PoolError, TxPool},
};

fn yielded(pool: &TxPool, base_fee_gwei: Option<u64>) -> Vec<(u8, u64)> {
    let senders: Vec<_> = (1..=5).map(common::addr).collect();
    pool.txs_by_price_and_nonce(base_fee_gwei.map(|fee| gwei_to_wei(fee.into())), None)
        .map(|entry| {
            let signer = senders.iter().position(|s| *s == entry.sender()).unwrap() as u8 + 1;
            (signer, entry.tx.nonce())
        })
        .collect()
}

#[test]
fn one_sender_is_yielded_in_nonce_order() {
    let mut pool = pool();
    // Tips of 3, 1 and 2 gwei for nonces 0, 1 and 2.
    for (nonce, tip) in [(0, 3), (1, 1), (2, 2)] {
        pool.add(txn(1, nonce, tip)).unwrap();
    }

    assert_eq!(yielded(&pool, None), vec![(1, 0), (1, 1), (1, 2)]);
}

#[test]
fn nonce_order_holds_whatever_the_arrival_order() {
    let mut pool = pool();
    for (nonce, tip) in [(2, 9), (0, 1), (1, 5)] {
        pool.add(txn(1, nonce, tip)).unwrap();
    }
    pool.add(txn(2, 0, 4)).unwrap();

    assert_eq!(yielded(&pool, None), vec![(2, 0), (1, 0), (1, 1), (1, 2)]);
}

#[test]
fn random_arrival_never_breaks_nonce_order() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let mut txs: Vec<_> = (1..=3u8)
            .flat_map(|signer| (0..4).map(move |nonce| (signer, nonce)))
            .map(|(signer, nonce)| txn(signer, nonce, rng.gen_range(1..50)))
            .collect();
        txs.shuffle(&mut rng);

        let mut pool = pool();
        for tx in txs {
            pool.add(tx).unwrap();
        }

        let order = yielded(&pool, None);
        assert_eq!(order.len(), 12);
        for signer in 1..=3u8 {
            let nonces: Vec<_> = order
                .iter()
                .filter(|(s, _)| *s == signer)
                .map(|(_, nonce)| *nonce)
                .collect();
            assert_eq!(nonces, vec![0, 1, 2, 3]);
        }
    }
}

#[test]
fn higher_tip_first_and_ties_by_arrival() {
    let mut pool = pool();
    pool.add(txn(1, 0, 5)).unwrap();
    pool.add(txn(2, 0, 5)).unwrap();
    pool.add(txn(3, 0, 7)).unwrap();

    assert_eq!(yielded(&pool, None), vec![(3, 0), (1, 0), (2, 0)]);
}

#[test]
fn effective_tip_accounts_for_the_base_fee() {
    let mut pool = pool();
    // 10 gwei tip but only 1 gwei of headroom above a 20 gwei base fee.
    pool.add(txn_with(1, 0, 10, 21, Bytes::new())).unwrap();
    pool.add(txn_with(2, 0, 3, 100, Bytes::new())).unwrap();
    // Cannot pay the base fee at all.
    pool.add(txn_with(3, 0, 1, 19, Bytes::new())).unwrap();

    assert_eq!(yielded(&pool, Some(20)), vec![(2, 0), (1, 0)]);
    assert_eq!(yielded(&pool, None), vec![(1, 0), (2, 0), (3, 0)]);
}

#[test]
fn underpriced_replacement_keeps_the_original() {
    let mut pool = pool();
    let original = txn_with(1, 0, 10, 100, Bytes::new());
    pool.add(original.clone()).unwrap();

    for (tip, max_fee) in [(20, 109), (10, 120), (11, 109)] {
        let incoming = txn_with(1, 0, tip, max_fee, Bytes::new());
        assert!(matches!(
            pool.add(incoming.clone()),
            Err(PoolError::ReplacementUnderpriced { .. })
        ));
        assert!(pool.get_by_hash(&incoming.hash()).is_none());
        assert!(pool.get_by_hash(&original.hash()).is_some());
        assert_eq!(pool.len(), 1);
    }

    let bumped = txn_with(1, 0, 11, 110, Bytes::new());
    assert_eq!(
        pool.add(bumped.clone()).unwrap(),
        AddOutcome::Replaced {
            previous: original.hash()
        }
    );
    assert!(pool.get_by_hash(&original.hash()).is_none());
    assert_eq!(pool.get_by_sender_address(&common::addr(1))[0].hash(), bumped.hash());
}

#[test]
fn empty_reorganization_is_a_no_op() {
    let mut pool = pool();
    let tx = txn(1, 0, 1);
    pool.add(tx.clone()).unwrap();

    pool.on_chain_reorganization(&[], &[]);

    assert_eq!(pool.len(), 1);
    assert_eq!(pool.pending_transactions()[0].hash(), tx.hash());
}

#[test]
fn reorganization_does_not_duplicate_pooled_transactions() {
    let mut pool = pool();
    let pooled = txn(1, 0, 1);
    let dropped = txn(2, 0, 1);
    let reincluded = txn(3, 0, 1);
    pool.add(pooled.clone()).unwrap();

    let removed = Block {
        transactions: vec![pooled.clone(), dropped.clone(), reincluded.clone()],
        ..Default::default()
    };
    let added = Block {
        transactions: vec![reincluded.clone()],
        ..Default::default()
    };
    pool.on_chain_reorganization(&[removed.clone()], &[added.clone()]);
    pool.on_chain_reorganization(&[removed], &[added]);

    assert_eq!(pool.len(), 2);
    assert!(pool.get_by_hash(&pooled.hash()).is_some());
    assert!(pool.get_by_hash(&dropped.hash()).is_some());
    assert!(pool.get_by_hash(&reincluded.hash()).is_none());
}
