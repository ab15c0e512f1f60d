//! `GET /api/metrics`: counters, latency, cache stats, process vitals.

use aspree_api::error::{ApiError, Success};
use aspree_core::metrics::MetricsSnapshot;
use axum::extract::State;

use crate::{extract::MerchantPrincipal, state::SharedState};

pub async fn snapshot(
    State(state): State<SharedState>,
    _principal: MerchantPrincipal,
) -> Result<Success<MetricsSnapshot>, ApiError> {
    Ok(Success(state.metrics.snapshot(&state.cache)))
}
