use pool_chain::blockchain::{Blockchain, meets_difficulty};
use pool_chain::config::ChainConfig;
use pool_chain::wallet::{Signer, Wallet};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn mine_pay_and_settle_at_default_difficulty() {
    let mut chain = Blockchain::with_config(ChainConfig::default());
    let miner = Wallet::generate();
    let alice = Wallet::generate();

    for expected_index in 1..=3 {
        let block = chain.mine_block(&miner.address());
        assert_eq!(block.index, expected_index);
        assert!(meets_difficulty(&block.hash, 4));
    }
    assert!(close(chain.get_balance(&miner.address()), 150.0));

    let tx = chain
        .create_transaction(&miner, &alice.address(), 25.0, 0.5)
        .expect("miner can afford the payment");
    assert_eq!(tx.inputs.len(), 1);
    assert_eq!(chain.mempool().len(), 1);

    let block = chain.mine_block(&miner.address());
    assert_eq!(block.transactions.len(), 2);
    assert!(close(block.transactions[0].outputs[0].amount, 50.5));
    assert!(chain.mempool().is_empty());

    assert!(close(chain.get_balance(&alice.address()), 25.0));
    assert!(close(chain.get_balance(&miner.address()), 175.0));
    assert_eq!(chain.height(), 5);
    assert!(chain.validate_chain());
}

#[test]
fn overspend_is_refused_without_touching_the_mempool() {
    let mut chain = Blockchain::with_config(ChainConfig::with_difficulty(2));
    let miner = Wallet::generate();
    chain.mine_block(&miner.address());

    assert!(chain.create_transaction(&miner, "bob", 60.0, 0.0).is_none());
    assert!(chain.create_transaction(&miner, "bob", 49.9, 0.2).is_none());
    assert!(chain.mempool().is_empty());
    assert!(close(chain.get_balance(&miner.address()), 50.0));
}

#[test]
fn tampering_with_a_mined_block_is_detected() {
    let mut chain = Blockchain::with_config(ChainConfig::with_difficulty(2));
    let miner = Wallet::generate();
    chain.mine_block(&miner.address());
    chain.mine_block(&miner.address());
    assert!(chain.validate_chain());

    chain.chain[1].transactions[0].outputs[0].amount = 1_000.0;
    assert!(!chain.validate_chain());
}

#[test]
fn relinked_block_still_fails_proof_of_work() {
    let mut chain = Blockchain::with_config(ChainConfig::with_difficulty(3));
    let miner = Wallet::generate();
    chain.mine_block(&miner.address());
    chain.mine_block(&miner.address());

    chain.chain[1].timestamp += 1;
    chain.chain[1].hash = chain.chain[1].compute_hash();
    chain.chain[2].previous_hash = chain.chain[1].hash.clone();
    chain.chain[2].hash = chain.chain[2].compute_hash();

    // Odds of both rehashes still meeting difficulty 3 are negligible.
    assert!(!chain.validate_chain());
}
