use thiserror::Error;

/// Why a transaction or block was refused. Always recoverable: callers log it
/// and keep their current state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("coinbase transactions cannot be submitted directly")]
    CoinbaseNotAllowed,

    #[error("transaction hash {0} does not match its contents")]
    BadTxHash(String),

    #[error("transaction has no inputs")]
    NoInputs,

    #[error("transaction has no outputs")]
    NoOutputs,

    #[error("output amount must be > 0")]
    NonPositiveOutput,

    #[error("referenced UTXO not found: {tx_hash}:{output_index}")]
    UnknownInput { tx_hash: String, output_index: u32 },

    #[error("duplicate input outpoint in transaction: {tx_hash}:{output_index}")]
    DuplicateInput { tx_hash: String, output_index: u32 },

    #[error("input {tx_hash}:{output_index} already spent by a pending transaction")]
    DoubleSpend { tx_hash: String, output_index: u32 },

    #[error("outputs ({output:.8}) exceed inputs ({input:.8})")]
    OutputExceedsInput { input: f64, output: f64 },

    #[error("public key does not own referenced UTXO")]
    OwnerMismatch,

    #[error("invalid signature on input {0}")]
    BadSignature(usize),

    #[error("block index {actual} does not follow height {expected}")]
    WrongIndex { expected: u64, actual: u64 },

    #[error("block #{0} previous_hash does not link to the tip")]
    BrokenLink(u64),

    #[error("block #{0} merkle root does not match its transactions")]
    BadMerkleRoot(u64),

    #[error("block #{0} hash is stale or misses its difficulty target")]
    BadProofOfWork(u64),

    #[error("block #{index} difficulty {difficulty} is below the minimum")]
    DifficultyTooLow { index: u64, difficulty: u32 },

    #[error("block #{0} has an invalid coinbase")]
    BadCoinbase(u64),
}

/// Rejection of a whole candidate chain during fork resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("candidate chain ({candidate}) is not longer than local chain ({local})")]
    NotLonger { local: usize, candidate: usize },

    #[error("candidate chain has a different genesis block")]
    GenesisMismatch,

    #[error("candidate chain invalid at block #{index}: {source}")]
    InvalidBlock {
        index: usize,
        #[source]
        source: ValidationError,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    #[error("peer {0} is no longer accepting messages")]
    PeerClosed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    #[error("Not registered. POST /register first.")]
    NotRegistered,

    #[error("Miner not found")]
    MinerNotFound,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsensusError {
    #[error("stake too low: {amount:.2} < {minimum:.2} minimum")]
    StakeTooLow { amount: f64, minimum: f64 },

    #[error("{0} is not a validator")]
    UnknownValidator(String),

    #[error("no validators are staked")]
    NoValidators,
}
