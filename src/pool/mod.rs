pub mod coordinator;
pub mod reward;
pub mod worker;

pub use coordinator::{
    ChainSummary, HealthReport, MinerInfo, MinerStats, MinerSummary, PoolCoordinator, PoolStats,
    RegisterResponse, ShareSubmission, SubmitOutcome, WorkAssignment, WorkUnit, pool_difficulty,
};
pub use reward::{PayoutRecord, PayoutScheme, RewardDistributor, RewardStats, Share};
pub use worker::{MinerWorker, WorkerStats};
