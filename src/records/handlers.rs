use axum::{
    extract::{
        multipart::MultipartRejection, rejection::QueryRejection, DefaultBodyLimit, Multipart,
        Path, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::model::NutritionRecord;
use super::normalize::normalize;
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub const DEFAULT_RECENT_LIMIT: usize = 5;

/// Room for multipart boundaries and part headers on top of the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn record_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/food-analyses",
            get(list_analyses).delete(clear_analyses),
        )
        .route("/food-analyses/recent", get(recent_analyses))
        .route(
            "/food-analyses/:id",
            get(get_analysis).delete(delete_analysis),
        )
}

pub fn upload_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/analyze-food", post(analyze_food))
        .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<String>,
}

impl RecentQuery {
    /// Absent, non-numeric and non-positive limits fall back to the default.
    pub fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_RECENT_LIMIT)
    }
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

struct UploadedImage {
    body: Bytes,
    content_type: String,
}

/// POST /api/analyze-food (multipart, field `image`)
#[instrument(skip_all, fields(uid = %caller.uid()))]
pub async fn analyze_food(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<NutritionRecord>> {
    let multipart = multipart.map_err(|e| {
        warn!(error = %e, "upload is not multipart/form-data");
        ApiError::BadRequest("No image file provided".into())
    })?;
    let image = read_image(multipart, state.config.max_upload_bytes).await?;
    info!(bytes = image.body.len(), content_type = %image.content_type, "analyzing upload");

    let analysis = state
        .analyzer
        .analyze(&image.body, &image.content_type)
        .await
        .map_err(|e| {
            error!(error = %e, "food analysis failed");
            ApiError::from(e)
        })?;
    let record = normalize(analysis, &image.body, &image.content_type).map_err(|e| {
        error!(error = %e, "food analysis rejected");
        ApiError::from(e)
    })?;

    let stored = state
        .records
        .create(&caller.owner(), record)
        .await
        .map_err(storage_failed)?;
    Ok(Json(stored))
}

/// Pulls the single `image` field out of the form, enforcing type and size
/// before anything is sent for analysis.
async fn read_image(mut multipart: Multipart, max_bytes: usize) -> ApiResult<UploadedImage> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "unreadable multipart body");
                return Err(ApiError::BadRequest(format!("Invalid upload: {}", e.body_text())));
            }
        };
        if field.name() != Some("image") {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        if !content_type.starts_with("image/") {
            return Err(ApiError::BadRequest("Uploaded file must be an image".into()));
        }

        let body = field.bytes().await.map_err(|e| {
            warn!(error = %e, "failed to read image field");
            ApiError::BadRequest(format!("Invalid upload: {}", e.body_text()))
        })?;
        if body.is_empty() {
            return Err(ApiError::BadRequest("No image file provided".into()));
        }
        if body.len() > max_bytes {
            return Err(ApiError::BadRequest(format!(
                "Image exceeds the {} byte limit",
                max_bytes
            )));
        }
        return Ok(UploadedImage { body, content_type });
    }
    Err(ApiError::BadRequest("No image file provided".into()))
}

/// GET /api/food-analyses
#[instrument(skip_all, fields(uid = %caller.uid()))]
pub async fn list_analyses(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> ApiResult<Json<Vec<NutritionRecord>>> {
    let records = state
        .records
        .list_all(&caller.owner())
        .await
        .map_err(storage_failed)?;
    Ok(Json(records))
}

/// GET /api/food-analyses/recent?limit=N
#[instrument(skip_all, fields(uid = %caller.uid()))]
pub async fn recent_analyses(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    query: Result<Query<RecentQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<NutritionRecord>>> {
    // An unparsable query string is treated like an unusable limit.
    let limit = query.map_or(DEFAULT_RECENT_LIMIT, |Query(q)| q.limit());
    let records = state
        .records
        .list_recent(&caller.owner(), limit)
        .await
        .map_err(storage_failed)?;
    Ok(Json(records))
}

/// GET /api/food-analyses/:id
#[instrument(skip_all, fields(uid = %caller.uid(), %id))]
pub async fn get_analysis(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<NutritionRecord>> {
    state
        .records
        .get(&caller.owner(), &id)
        .await
        .map_err(storage_failed)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// DELETE /api/food-analyses/:id
#[instrument(skip_all, fields(uid = %caller.uid(), %id))]
pub async fn delete_analysis(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    let removed = state
        .records
        .delete(&caller.owner(), &id)
        .await
        .map_err(storage_failed)?;
    if !removed {
        return Err(ApiError::NotFound);
    }
    info!("record deleted");
    Ok(Json(SuccessResponse { success: true }))
}

/// DELETE /api/food-analyses
#[instrument(skip_all, fields(uid = %caller.uid()))]
pub async fn clear_analyses(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> ApiResult<Json<SuccessResponse>> {
    state
        .records
        .clear_all(&caller.owner())
        .await
        .map_err(storage_failed)?;
    Ok(Json(SuccessResponse { success: true }))
}

fn storage_failed(e: super::repo::StoreError) -> ApiError {
    error!(error = %e, "record store failed");
    ApiError::from(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(limit: Option<&str>) -> RecentQuery {
        RecentQuery {
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn recent_limit_defaults_sensibly() {
        assert_eq!(query(None).limit(), DEFAULT_RECENT_LIMIT);
        assert_eq!(query(Some("abc")).limit(), DEFAULT_RECENT_LIMIT);
        assert_eq!(query(Some("0")).limit(), DEFAULT_RECENT_LIMIT);
        assert_eq!(query(Some("-3")).limit(), DEFAULT_RECENT_LIMIT);
        assert_eq!(query(Some("12")).limit(), 12);
    }
}
