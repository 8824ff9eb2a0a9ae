use actix_web::{App, HttpServer, web};
use log::info;
use std::sync::atomic::Ordering;

use pool_chain::api::{self, AppState};
use pool_chain::config::ServerConfig;
use pool_chain::pool::MinerWorker;
use pool_chain::wallet::{Signer, Wallet};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = ServerConfig::from_env();
    env_logger::init();

    let host = config.host.clone();
    let port = config.port;
    let state = AppState::new(config.pool.clone());

    info!("⛏️ Starting {} at http://{host}:{port}", config.pool.name);
    info!("Pool address: {}", state.coordinator.pool_address());

    let mut workers = Vec::with_capacity(config.local_workers);
    let mut cancels = Vec::with_capacity(config.local_workers);
    for i in 0..config.local_workers {
        let payout = Wallet::generate();
        let worker = MinerWorker::new(
            state.coordinator.clone(),
            payout.address(),
            format!("local-{}", i + 1),
        );
        cancels.push(worker.cancel_handle());
        workers.push(worker.spawn(usize::MAX));
    }
    if !workers.is_empty() {
        info!("Spawned {} local mining workers", workers.len());
    }

    let data = web::Data::new(state);
    let result = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(api::init_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await;

    for cancel in &cancels {
        cancel.store(true, Ordering::Relaxed);
    }
    for handle in workers {
        match handle.join() {
            Ok(Ok(stats)) => info!(
                "{} stopped: {} shares, {} blocks",
                stats.worker, stats.shares_accepted, stats.blocks_found
            ),
            Ok(Err(e)) => info!("worker stopped: {e}"),
            Err(_) => info!("worker thread panicked"),
        }
    }
    result
}
