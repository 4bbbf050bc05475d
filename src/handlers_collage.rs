use log::info;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use warp::reply::Response;
use warp::{reject, Filter, Rejection, Reply};

use crate::collage_types::ImageRef;
use crate::cover_orchestrator::{CoverOrchestrator, RegenerationMode};
use crate::warp_helpers::{
    cover_rejection, with_credential, with_orchestrator, InternalError, ValidationError,
};

#[derive(Debug, Deserialize)]
pub struct ComposeRequest {
    pub urls: Vec<ImageRef>,
}

#[derive(Debug, Deserialize)]
pub struct CoverQuery {
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub wishlist_ids: Vec<String>,
}

/// Only plain web URLs may be fetched on a caller's behalf.
fn is_fetchable_url(url: &str) -> bool {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .is_some_and(|rest| !rest.is_empty())
}

/// Compose a collage from explicit URLs and return the image itself
pub async fn compose_collage(
    request: ComposeRequest,
    _credential: String,
    orchestrator: CoverOrchestrator,
) -> Result<Response, Rejection> {
    if let Some(url) = request.urls.iter().find(|url| !is_fetchable_url(url)) {
        return Err(reject::custom(ValidationError {
            message: format!("Unsupported image URL: {}", url),
        }));
    }

    match orchestrator.composer().compose(&request.urls).await {
        Ok(Some(collage)) => {
            let content_type = collage.content_type();
            let reply = warp::reply::with_header(collage.bytes, "content-type", content_type);
            let reply = warp::reply::with_header(reply, "cache-control", "no-store");
            Ok(reply.into_response())
        }
        Ok(None) => Ok(warp::reply::with_status(
            warp::reply(),
            warp::http::StatusCode::NO_CONTENT,
        )
        .into_response()),
        Err(e) => {
            log::error!("Failed to compose collage: {}", e);
            Err(reject::custom(InternalError {
                message: format!("Failed to compose collage: {}", e),
            }))
        }
    }
}

/// Regenerate a wishlist's cover from its current images
pub async fn regenerate_cover(
    wishlist_id: String,
    query: CoverQuery,
    credential: String,
    orchestrator: CoverOrchestrator,
) -> Result<Response, Rejection> {
    let mode = match query.mode.as_deref() {
        None => RegenerationMode::default(),
        Some(mode) => mode.parse::<RegenerationMode>().map_err(|_| {
            reject::custom(ValidationError {
                message: format!("Unknown mode: {}", mode),
            })
        })?,
    };

    info!("Regenerating cover for wishlist {} ({:?})", wishlist_id, mode);

    match mode {
        RegenerationMode::Immediate => {
            let cover_url = orchestrator
                .regenerate_cover(&wishlist_id, &credential)
                .await
                .map_err(|e| {
                    log::error!("Failed to regenerate cover for {}: {}", wishlist_id, e);
                    cover_rejection(e)
                })?;

            Ok(warp::reply::json(&serde_json::json!({ "coverUrl": cover_url })).into_response())
        }
        RegenerationMode::Queued => {
            orchestrator.regenerate_cover_queued(&wishlist_id, &credential);

            Ok(warp::reply::with_status(
                warp::reply::json(&serde_json::json!({ "status": "queued" })),
                warp::http::StatusCode::ACCEPTED,
            )
            .into_response())
        }
        RegenerationMode::Idle => {
            let cover_url = orchestrator
                .regenerate_cover_low_priority(&wishlist_id, &credential)
                .await;

            Ok(warp::reply::json(&serde_json::json!({ "coverUrl": cover_url })).into_response())
        }
    }
}

/// Regenerate covers for several wishlists, one after another
pub async fn regenerate_covers_batch(
    request: BatchRequest,
    credential: String,
    orchestrator: CoverOrchestrator,
) -> Result<impl Reply, Rejection> {
    if request.wishlist_ids.is_empty() {
        return Err(reject::custom(ValidationError {
            message: "wishlistIds must not be empty".to_string(),
        }));
    }

    info!(
        "Batch cover regeneration for {} wishlists",
        request.wishlist_ids.len()
    );

    let outcomes = orchestrator
        .regenerate_covers_batch(&request.wishlist_ids, &credential)
        .await;

    Ok(warp::reply::json(&outcomes))
}

/// Warm the image cache for a wishlist in the background
pub async fn preload_wishlist(
    wishlist_id: String,
    credential: String,
    orchestrator: CoverOrchestrator,
) -> Result<impl Reply, Rejection> {
    tokio::spawn(async move {
        let cached = orchestrator
            .preload_wishlist_images(&wishlist_id, &credential)
            .await;
        log::debug!("Preloaded {} images for wishlist {}", cached, wishlist_id);
    });

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "status": "preloading" })),
        warp::http::StatusCode::ACCEPTED,
    ))
}

pub async fn clear_image_cache(orchestrator: CoverOrchestrator) -> Result<impl Reply, Rejection> {
    let before = orchestrator.composer().loader().cache().stats();
    orchestrator.clear_cache();
    info!("Image cache cleared ({} images)", before.entries);

    Ok(warp::reply::json(&serde_json::json!({
        "success": true,
        "cleared": before.entries
    })))
}

/// Resolves an upload key below `root`, refusing anything that escapes it.
fn upload_path(root: &Path, key: &str) -> Option<PathBuf> {
    let relative = Path::new(key);
    let is_plain = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));

    if key.is_empty() || !is_plain {
        return None;
    }
    Some(root.join(relative))
}

fn content_type_from_path(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// Serve a locally stored upload
pub async fn get_upload(tail: warp::path::Tail, root: PathBuf) -> Result<impl Reply, Rejection> {
    let Some(file_path) = upload_path(&root, tail.as_str()) else {
        return Err(reject::not_found());
    };

    let contents = match tokio::fs::read(&file_path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(reject::not_found()),
        Err(e) => {
            log::error!("Failed to read upload {:?}: {}", file_path, e);
            return Err(reject::custom(InternalError {
                message: format!("Failed to read upload: {}", e),
            }));
        }
    };

    let reply =
        warp::reply::with_header(contents, "content-type", content_type_from_path(&file_path));
    let reply = warp::reply::with_header(reply, "cache-control", "public, max-age=31536000");

    Ok(reply)
}

/// Build collage and cover routes
pub fn build_collage_routes(
    orchestrator: CoverOrchestrator,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let compose = warp::path!("api" / "collages")
        .and(warp::post())
        .and(warp::body::content_length_limit(64 * 1024))
        .and(warp::body::json::<ComposeRequest>())
        .and(with_credential())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(compose_collage);

    let clear_cache = warp::path!("api" / "collages" / "cache")
        .and(warp::delete())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(clear_image_cache);

    let batch = warp::path!("api" / "wishlists" / "covers" / "batch")
        .and(warp::post())
        .and(warp::body::content_length_limit(64 * 1024))
        .and(warp::body::json::<BatchRequest>())
        .and(with_credential())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(regenerate_covers_batch);

    let regenerate = warp::path!("api" / "wishlists" / String / "cover")
        .and(warp::post())
        .and(warp::query::<CoverQuery>())
        .and(with_credential())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(regenerate_cover);

    let preload = warp::path!("api" / "wishlists" / String / "preload")
        .and(warp::post())
        .and(with_credential())
        .and(with_orchestrator(orchestrator))
        .and_then(preload_wishlist);

    compose.or(clear_cache).or(batch).or(regenerate).or(preload)
}

/// Serve files written by the local blob uploader
pub fn build_upload_routes(
    root: PathBuf,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path("uploads")
        .and(warp::path::tail())
        .and(warp::get())
        .and(warp::any().map(move || root.clone()))
        .and_then(get_upload)
}
