mod health;
pub mod models;
mod pool;
mod stats;

use actix_web::web::ServiceConfig;

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(health::health_check)
        .service(pool::register)
        .service(pool::get_work)
        .service(pool::submit_share)
        .service(pool::miner_stats)
        .service(stats::get_stats)
        .service(stats::get_blockchain);
}
