use image::Rgb;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::collage_composer::CollageSettings;
use crate::collage_types::CollageFormat;
use crate::image_loader::LoaderSettings;
use crate::layout_selector::{MIN_CANVAS_HEIGHT, MIN_CANVAS_WIDTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Local,
    Http,
}

impl FromStr for UploadMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(UploadMode::Local),
            "http" => Ok(UploadMode::Http),
            _ => Err(()),
        }
    }
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadMode::Local => write!(f, "local"),
            UploadMode::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub image_cache_size: usize,
    pub image_cache_max_size_mb: usize,
    /// 0 disables the periodic clear.
    pub clear_interval_hours: u32,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub mode: UploadMode,
    pub endpoint: Option<String>,
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub data_path: String,
    pub image_store_url: String,
    pub upload: UploadConfig,
    pub cache: CacheConfig,

    pub canvas_width: u32,
    pub canvas_height: u32,
    pub output_format: CollageFormat,
    pub jpeg_quality: u8,
    pub canvas_pool_size: usize,

    pub load_timeout_secs: u64,
    pub load_batch_size: usize,
    pub load_batch_pause_ms: u64,
    pub max_image_bytes: u64,
    pub upstream_timeout_secs: u64,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let port: u16 = var_or("WISH_COVER_PORT", "18474").parse()?;
        let data_path = var_or("WISH_COVER_DATA_PATH", "./data");

        let upload_mode = var_or("WISH_COVER_UPLOAD_MODE", "local");
        let upload_mode = upload_mode
            .parse::<UploadMode>()
            .map_err(|_| format!("Invalid WISH_COVER_UPLOAD_MODE: {}", upload_mode))?;

        let output_format = var_or("WISH_COVER_OUTPUT_FORMAT", "jpeg");
        let output_format = output_format
            .parse::<CollageFormat>()
            .map_err(|_| format!("Invalid WISH_COVER_OUTPUT_FORMAT: {}", output_format))?;

        let canvas_width: u32 = var_or("WISH_COVER_CANVAS_WIDTH", "720").parse()?;
        let canvas_height: u32 = var_or("WISH_COVER_CANVAS_HEIGHT", "892").parse()?;
        if canvas_width < MIN_CANVAS_WIDTH || canvas_height < MIN_CANVAS_HEIGHT {
            return Err(format!(
                "Canvas {}x{} is too small for a six image layout",
                canvas_width, canvas_height
            )
            .into());
        }

        let jpeg_quality: u8 = var_or("WISH_COVER_JPEG_QUALITY", "85").parse()?;
        if !(1..=100).contains(&jpeg_quality) {
            return Err(format!("WISH_COVER_JPEG_QUALITY out of range: {}", jpeg_quality).into());
        }

        Ok(Config {
            port,
            host: var_or("WISH_COVER_HOST", "0.0.0.0"),
            data_path,
            image_store_url: var_or("WISH_COVER_IMAGE_STORE_URL", "https://api.qalauym.kz"),
            upload: UploadConfig {
                mode: upload_mode,
                endpoint: env::var("WISH_COVER_UPLOAD_ENDPOINT").ok(),
                public_base_url: env::var("WISH_COVER_PUBLIC_BASE_URL")
                    .unwrap_or_else(|_| format!("http://localhost:{}/uploads", port)),
            },
            cache: CacheConfig {
                image_cache_size: var_or("WISH_COVER_IMAGE_CACHE_SIZE", "128").parse()?,
                image_cache_max_size_mb: var_or("WISH_COVER_IMAGE_CACHE_MAX_SIZE_MB", "256")
                    .parse()?,
                clear_interval_hours: var_or("WISH_COVER_CACHE_CLEAR_INTERVAL_HOURS", "0")
                    .parse()?,
            },
            canvas_width,
            canvas_height,
            output_format,
            jpeg_quality,
            canvas_pool_size: var_or("WISH_COVER_CANVAS_POOL_SIZE", "4").parse()?,
            load_timeout_secs: var_or("WISH_COVER_LOAD_TIMEOUT_SECS", "10").parse()?,
            load_batch_size: var_or("WISH_COVER_LOAD_BATCH_SIZE", "2").parse()?,
            load_batch_pause_ms: var_or("WISH_COVER_LOAD_BATCH_PAUSE_MS", "100").parse()?,
            max_image_bytes: var_or("WISH_COVER_MAX_IMAGE_BYTES", "20971520").parse()?,
            upstream_timeout_secs: var_or("WISH_COVER_UPSTREAM_TIMEOUT_SECS", "30").parse()?,
        })
    }

    pub fn uploads_path(&self) -> PathBuf {
        PathBuf::from(&self.data_path).join("uploads")
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn loader_settings(&self) -> LoaderSettings {
        LoaderSettings {
            timeout: Duration::from_secs(self.load_timeout_secs),
            batch_size: self.load_batch_size.max(1),
            batch_pause: Duration::from_millis(self.load_batch_pause_ms),
        }
    }

    pub fn collage_settings(&self) -> CollageSettings {
        CollageSettings {
            width: self.canvas_width,
            height: self.canvas_height,
            format: self.output_format,
            jpeg_quality: self.jpeg_quality,
            background: Rgb([255, 255, 255]),
            pool_size: self.canvas_pool_size,
        }
    }
}
