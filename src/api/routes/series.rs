//! Aggregated series endpoint

use axum::{Json, extract::State};
use tracing::instrument;

use crate::api::error::ApiResult;
use crate::api::state::ApiState;
use crate::series::AggregatedSeries;

/// GET /api/v1/series
///
/// Serves the cached series. A store failure during recomputation is
/// answered with 500 and `{"error": ...}`.
#[instrument(skip(state))]
pub async fn get_series(State(state): State<ApiState>) -> ApiResult<Json<AggregatedSeries>> {
    let series = state.cache.get_series().await?;
    Ok(Json(series))
}
