use actix_web::{HttpResponse, Responder, get, post, web};
use log::debug;

use super::models::{AppState, ErrorResponse, RegisterRequest, WorkQuery};
use crate::error::PoolError;
use crate::pool::ShareSubmission;

fn pool_error(err: PoolError) -> HttpResponse {
    match err {
        PoolError::NotRegistered => HttpResponse::BadRequest().json(ErrorResponse::new(err)),
        PoolError::MinerNotFound => HttpResponse::NotFound().json(ErrorResponse::new(err)),
    }
}

/// Register a payout address + worker name with the pool.
#[post("/register")]
pub async fn register(state: web::Data<AppState>, body: web::Json<RegisterRequest>) -> impl Responder {
    let address = body.address.trim();
    if address.is_empty() {
        return HttpResponse::BadRequest().json(ErrorResponse::new("address required"));
    }
    HttpResponse::Ok().json(state.coordinator.register(address, &body.worker_name))
}

/// Hand out a nonce range over the current candidate block.
#[get("/work")]
pub async fn get_work(state: web::Data<AppState>, query: web::Query<WorkQuery>) -> impl Responder {
    match state.coordinator.get_work(&query.miner_address, &query.worker_name) {
        Ok(work) => {
            debug!(
                "GET /work - {} gets #{} [{}, {})",
                query.worker_name, work.work.block_index, work.nonce_start, work.nonce_end
            );
            HttpResponse::Ok().json(work)
        }
        Err(e) => pool_error(e),
    }
}

#[post("/submit")]
pub async fn submit_share(
    state: web::Data<AppState>,
    body: web::Json<ShareSubmission>,
) -> impl Responder {
    match state.coordinator.submit_share(&body) {
        Ok(outcome) => HttpResponse::Ok().json(outcome),
        Err(e) => pool_error(e),
    }
}

#[get("/miners/{address}")]
pub async fn miner_stats(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let address = path.into_inner().0;
    match state.coordinator.miner_stats(&address) {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => pool_error(e),
    }
}
