use actix_web::{HttpResponse, Responder, get, web};

use super::models::AppState;

#[get("/stats")]
pub async fn get_stats(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.coordinator.stats())
}

/// Height, difficulty and the last few blocks.
#[get("/blockchain")]
pub async fn get_blockchain(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.coordinator.blockchain_summary())
}
