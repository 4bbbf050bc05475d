use anyhow::{anyhow, Context};
use log::{error, info};
use std::net::{IpAddr, TcpListener};
use std::sync::Arc;
use warp::Filter;

use wish_cover::blob_uploader::{BlobUploader, HttpBlobUploader, LocalBlobUploader};
use wish_cover::collage_composer::CollageComposer;
use wish_cover::config::{Config, UploadMode};
use wish_cover::cover_orchestrator::{CoverOrchestrator, OrchestratorSettings};
use wish_cover::handlers_collage::{build_collage_routes, build_upload_routes};
use wish_cover::handlers_health::build_health_routes;
use wish_cover::image_cache::ImageCache;
use wish_cover::image_loader::{HttpImageFetcher, ImageLoader};
use wish_cover::image_store::HttpImageStore;
use wish_cover::scheduler::CacheScheduler;
use wish_cover::warp_helpers::{cors, handle_rejection};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Config::from_env().map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    let port = config.port;
    let host: IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid host address {}", config.host))?;

    info!("Starting wish-cover on {}:{}", config.host, port);
    info!("Image store: {}", config.image_store_url);
    info!(
        "Canvas: {}x{} {} (quality {})",
        config.canvas_width, config.canvas_height, config.output_format, config.jpeg_quality
    );
    info!("Uploads: {} -> {}", config.upload.mode, config.upload.public_base_url);

    if !is_port_available(host, port) {
        error!("Port {} is already in use", port);
        return Err(anyhow!("Port {} is already in use", port));
    }

    let image_cache = ImageCache::new(
        config.cache.image_cache_size,
        config.cache.image_cache_max_size_mb,
    );
    let orchestrator = initialize_services(&config, image_cache.clone())?;
    info!("Collage services initialized");

    let _cache_scheduler = CacheScheduler::new(image_cache, config.cache.clear_interval_hours).start();

    let routes = build_health_routes(orchestrator.clone())
        .or(build_collage_routes(orchestrator))
        .or(build_upload_routes(config.uploads_path()))
        .with(cors())
        .with(warp::log("wish_cover"))
        .recover(handle_rejection);

    info!(
        "Server started successfully, listening on http://{}:{}",
        host, port
    );

    warp::serve(routes).run((host, port)).await;

    Ok(())
}

fn is_port_available(host: IpAddr, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}

fn initialize_services(config: &Config, image_cache: ImageCache) -> anyhow::Result<CoverOrchestrator> {
    let loader_settings = config.loader_settings();
    let fetcher = HttpImageFetcher::new(loader_settings.timeout, config.max_image_bytes);
    let loader = ImageLoader::new(Arc::new(fetcher), image_cache, loader_settings);
    let composer = CollageComposer::new(loader, config.collage_settings())
        .context("Failed to set up collage composer")?;

    let store = HttpImageStore::new(&config.image_store_url, config.upstream_timeout());

    let uploader: Arc<dyn BlobUploader> = match config.upload.mode {
        UploadMode::Local => {
            let root = config.uploads_path();
            std::fs::create_dir_all(&root)
                .with_context(|| format!("Failed to create upload directory {:?}", root))?;
            Arc::new(LocalBlobUploader::new(root, &config.upload.public_base_url))
        }
        UploadMode::Http => {
            let endpoint = config
                .upload
                .endpoint
                .as_deref()
                .context("WISH_COVER_UPLOAD_ENDPOINT is required when WISH_COVER_UPLOAD_MODE=http")?;
            Arc::new(HttpBlobUploader::new(
                endpoint,
                &config.upload.public_base_url,
                config.upstream_timeout(),
            ))
        }
    };

    Ok(CoverOrchestrator::new(
        Arc::new(store),
        uploader,
        composer,
        OrchestratorSettings::default(),
    ))
}
