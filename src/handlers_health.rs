use serde_json::json;
use std::convert::Infallible;
use warp::{Filter, Reply};

use crate::cover_orchestrator::CoverOrchestrator;
use crate::warp_helpers::with_orchestrator;

pub async fn health_check() -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

pub async fn ready_check(orchestrator: CoverOrchestrator) -> Result<impl Reply, Infallible> {
    let composer = orchestrator.composer();

    Ok(warp::reply::json(&json!({
        "status": "ready",
        "imageCache": composer.loader().cache().stats(),
        "canvasPool": composer.pool().stats(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

pub fn build_health_routes(
    orchestrator: CoverOrchestrator,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let health = warp::path("health").and(warp::get()).and_then(health_check);

    let ready = warp::path("ready")
        .and(warp::get())
        .and(with_orchestrator(orchestrator))
        .and_then(ready_check);

    health.or(ready)
}
