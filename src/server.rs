use std::{
    collections::BTreeMap,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::{
    Json, Router,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use image::RgbaImage;
use tower_http::services::ServeDir;

use crate::{
    cache::{VideoCache, cache_file_name},
    config::Config,
    error::{WitsError, WitsResult},
    geo::{self, Location},
    overlay, video,
};

/// The one client-visible failure message. Internal causes are logged, never
/// differentiated to the caller.
pub const ERROR_BODY: &str = "Please try again later.";

/// Seam between orchestration and media work, so tests can count calls and
/// force failures without touching ffmpeg or fonts.
pub trait MediaPipeline: Send + Sync + 'static {
    fn resolve(&self, ip: &str) -> Location;
    fn render(&self, ip_text: &str, location_text: &str) -> WitsResult<RgbaImage>;
    fn assemble(&self, frame: &RgbaImage, out_path: &Path) -> WitsResult<()>;
}

/// Production pipeline: GeoLite2 lookup, overlay renderer, ffmpeg assembler.
pub struct WitsPipeline {
    config: Arc<Config>,
}

impl WitsPipeline {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl MediaPipeline for WitsPipeline {
    fn resolve(&self, ip: &str) -> Location {
        geo::resolve(&self.config.assets.geoip_db, ip)
    }

    fn render(&self, ip_text: &str, location_text: &str) -> WitsResult<RgbaImage> {
        overlay::render(
            &self.config.style,
            &self.config.assets.font,
            &self.config.assets.base_image,
            ip_text,
            location_text,
        )
    }

    fn assemble(&self, frame: &RgbaImage, out_path: &Path) -> WitsResult<()> {
        video::assemble(&self.config.assets, frame, out_path)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<VideoCache>,
    pub pipeline: Arc<dyn MediaPipeline>,
}

/// Terminal success states of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Served {
    /// The file already existed; nothing was regenerated.
    Cached(PathBuf),
    /// Freshly resolved, rendered and encoded on this request.
    Generated(PathBuf),
}

impl Served {
    pub fn path(&self) -> &Path {
        match self {
            Served::Cached(p) | Served::Generated(p) => p,
        }
    }
}

/// CacheHit -> serve, else Generate under the per-key guard, else the caller
/// maps the error to the fixed 500 response.
#[tracing::instrument(skip_all, fields(ip = %ip))]
pub async fn serve_or_generate(
    cache: &VideoCache,
    pipeline: Arc<dyn MediaPipeline>,
    ip: &str,
) -> WitsResult<Served> {
    if let Some(path) = cache.lookup(ip) {
        return Ok(Served::Cached(path));
    }

    let key = cache_file_name(ip);
    let _guard = cache.lock_key(&key).await;

    // A concurrent request may have finished the same key while this one
    // waited on the guard.
    if let Some(path) = cache.lookup(ip) {
        return Ok(Served::Cached(path));
    }

    let out_path = cache.path_for(ip);
    let task = {
        let pipeline = Arc::clone(&pipeline);
        let ip = ip.to_owned();
        let out_path = out_path.clone();
        tokio::task::spawn_blocking(move || -> WitsResult<()> {
            let location = pipeline.resolve(&ip);
            let frame = pipeline.render(&ip, &location.to_string())?;
            pipeline.assemble(&frame, &out_path)
        })
    };
    task.await
        .map_err(|e| WitsError::from(anyhow::anyhow!("generation task failed: {e}")))??;

    Ok(Served::Generated(out_path))
}

async fn wits_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let Some(ip) = state.config.identity.client_ip(&headers, peer) else {
        tracing::warn!(%peer, "request without a resolvable client address");
        return (StatusCode::BAD_REQUEST, "missing client address").into_response();
    };

    match serve_or_generate(&state.cache, Arc::clone(&state.pipeline), &ip).await {
        Ok(served) => {
            tracing::info!(
                cached = matches!(served, Served::Cached(_)),
                path = %served.path().display(),
                "serving video"
            );
            stream_video(served.path()).await
        }
        Err(e) => {
            tracing::error!(error = %e, "video generation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, ERROR_BODY).into_response()
        }
    }
}

async fn stream_video(path: &Path) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "video/mp4")], bytes).into_response(),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read generated video");
            (StatusCode::INTERNAL_SERVER_ERROR, ERROR_BODY).into_response()
        }
    }
}

async fn headers_handler(headers: HeaderMap) -> Json<BTreeMap<String, String>> {
    Json(
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect(),
    )
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404")
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/wits.mp4", get(wits_handler).post(wits_handler))
        .nest_service("/generated", ServeDir::new(state.cache.dir().to_path_buf()));

    if state.config.debug_endpoints {
        router = router.route("/headers", get(headers_handler));
    }

    router.fallback(not_found).with_state(state)
}

/// Validate config, build the production state and serve until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    config.prepare()?;

    let config = Arc::new(config);
    let cache = Arc::new(VideoCache::new(&config.output_dir));
    let pipeline: Arc<dyn MediaPipeline> = Arc::new(WitsPipeline::new(Arc::clone(&config)));
    let state = AppState {
        config: Arc::clone(&config),
        cache,
        pipeline,
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
