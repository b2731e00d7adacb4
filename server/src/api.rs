use crate::cache::{CacheStore, RefreshOutcome};
use crate::chat::{ChatClient, ChatError, ChatGateway, ChatTurn, MapAction, Usage};
use crate::cms::CmsClient;
use crate::config::Config;
use crate::normalize::HotelRecord;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Instrument};

pub struct AppState {
    pub config: Config,
    pub cache: Arc<CacheStore>,
    pub chat: ChatGateway,
}

impl AppState {
    pub fn from_config(config: Config) -> anyhow::Result<Arc<Self>> {
        let cms = match (&config.webflow_token, &config.webflow_site_id) {
            (Some(token), Some(site_id)) => {
                Some(CmsClient::new(&config.webflow_api_base, site_id, token)?)
            }
            _ => None,
        };
        let chat_client = match &config.anthropic_key {
            Some(key) => Some(ChatClient::new(
                &config.anthropic_api_base,
                &config.claude_model,
                key,
            )?),
            None => None,
        };

        let cache = Arc::new(CacheStore::new(cms));
        let chat = ChatGateway::new(Arc::clone(&cache), chat_client);
        Ok(Arc::new(Self {
            config,
            cache,
            chat,
        }))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let static_files =
        ServeDir::new(state.config.static_dir.clone()).append_index_html_on_directories(true);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/config", get(public_config))
        .route("/api/hotels", get(list_hotels))
        .route("/api/hotels/markers", get(hotel_markers))
        .route("/api/hotels/:slug", get(get_hotel))
        .route("/api/cms/stats", get(cms_stats))
        .route("/api/cms/refresh", post(cms_refresh))
        .route("/api/chat", post(chat))
        .with_state(state)
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Misconfigured(String),
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },
    #[error("{0}")]
    BadGateway(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Misconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upstream { status, .. } => *status,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::NotConfigured => {
                ApiError::Misconfigured(ChatError::NotConfigured.to_string())
            }
            ChatError::Upstream { status, message } => ApiError::Upstream { status, message },
            ChatError::Network(err) => {
                ApiError::BadGateway(format!("Chat service unreachable: {err}"))
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    cms_loaded: bool,
    hotel_count: usize,
    last_cache_update: Option<DateTime<Utc>>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.cache.snapshot();
    Json(HealthResponse {
        status: "ok",
        cms_loaded: snapshot.last_fetch.is_some(),
        hotel_count: snapshot.visible.len(),
        last_cache_update: snapshot.last_fetch,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    mapbox_token: String,
    has_webflow: bool,
    has_claude: bool,
    hotel_count: usize,
}

async fn public_config(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        mapbox_token: state.config.mapbox_token.clone(),
        has_webflow: state.config.has_webflow(),
        has_claude: state.config.has_claude(),
        hotel_count: state.cache.snapshot().visible.len(),
    })
}

async fn list_hotels(State(state): State<Arc<AppState>>) -> Json<Vec<HotelRecord>> {
    Json(state.cache.snapshot().visible.clone())
}

async fn get_hotel(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<HotelRecord>, ApiError> {
    state
        .cache
        .snapshot()
        .find_hotel(&slug)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Hotel not found".to_string()))
}

#[derive(Serialize)]
struct Marker {
    name: String,
    slug: String,
    region: String,
    lat: f64,
    lng: f64,
    image: Option<String>,
}

async fn hotel_markers(State(state): State<Arc<AppState>>) -> Json<Vec<Marker>> {
    let markers = state
        .cache
        .snapshot()
        .visible
        .iter()
        .filter_map(|hotel| {
            let (lat, lng) = (hotel.latitude?, hotel.longitude?);
            Some(Marker {
                name: hotel.name.clone(),
                slug: hotel.slug.clone(),
                region: hotel.region.clone(),
                lat,
                lng,
                image: hotel.image_url.clone(),
            })
        })
        .collect();
    Json(markers)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    hotel_count: usize,
    visible_hotel_count: usize,
    region_count: usize,
    last_cache_update: Option<DateTime<Utc>>,
    is_stale: bool,
}

async fn cms_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let snapshot = state.cache.snapshot();
    Json(StatsResponse {
        hotel_count: snapshot.hotels.len(),
        visible_hotel_count: snapshot.visible.len(),
        region_count: snapshot.regions.len(),
        last_cache_update: snapshot.last_fetch,
        is_stale: snapshot.is_stale_at(Utc::now()),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    success: bool,
    hotel_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn cms_refresh(State(state): State<Arc<AppState>>) -> Json<RefreshResponse> {
    let (success, error) = match state.cache.refresh().await {
        Ok(RefreshOutcome::Refreshed { .. } | RefreshOutcome::Coalesced) => (true, None),
        Ok(RefreshOutcome::Skipped) => (false, Some("CMS credentials not configured".to_string())),
        Err(err) => (false, Some(err.to_string())),
    };
    Json(RefreshResponse {
        success,
        hotel_count: state.cache.snapshot().visible.len(),
        error,
    })
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: Option<String>,
    history: Option<Vec<ChatTurn>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    message: String,
    hotels: Vec<HotelRecord>,
    map_action: Option<MapAction>,
    usage: Usage,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(target: "chat", error = %rejection, msg = "rejected chat body");
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    })?;
    let message = request
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Message is required".to_string()))?;

    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("chat", %request_id);
    let history = request.history.unwrap_or_default();

    async move {
        info!(
            target: "chat",
            chars = message.chars().count(),
            history = history.len(),
            msg = "chat request received"
        );
        match state.chat.chat(message, history).await {
            Ok(outcome) => Ok(Json(ChatResponse {
                message: outcome.reply.message,
                hotels: outcome.hotels,
                map_action: outcome.reply.map_action,
                usage: outcome.usage,
            })),
            Err(err) => {
                error!(target: "chat", error = %err, msg = "chat request failed");
                Err(ApiError::from(err))
            }
        }
    }
    .instrument(span)
    .await
}
