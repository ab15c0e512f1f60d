//! Business settings and logo lifecycle handlers.

use aspree_api::{
    error::{ApiError, Success},
    models::BusinessSettingsPatch,
};
use axum::extract::{Multipart, State};
use serde_json::json;

use crate::{
    extract::{ApiJson, MerchantPrincipal},
    state::SharedState,
};

pub async fn get_settings(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
) -> Result<Success<serde_json::Value>, ApiError> {
    let settings = state.profiles.get_settings(&principal.0.id).await?;
    Ok(Success(json!({ "settings": settings })))
}

pub async fn update_settings(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    ApiJson(patch): ApiJson<BusinessSettingsPatch>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let settings =
        state.profiles.update_settings(&principal.0, &patch).await?;
    state
        .cache
        .invalidate_prefix(&format!("{}:", principal.0.id));
    Ok(Success(json!({ "settings": settings })))
}

/// Replace the business logo: upload the new blob, then queue deletion of
/// the previous one.
pub async fn upload_logo(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    mut multipart: Multipart,
) -> Result<Success<serde_json::Value>, ApiError> {
    let mut file: Option<(Vec<u8>, Option<String>)> = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::validation(format!("Bad multipart body: {e}"))
    })? {
        if field.name() == Some("logo") || field.name() == Some("file") {
            let filename = field.file_name().map(str::to_owned);
            let bytes = field.bytes().await.map_err(|e| {
                ApiError::validation(format!("Bad multipart body: {e}"))
            })?;
            file = Some((bytes.to_vec(), filename));
        }
    }
    let (bytes, filename) =
        file.ok_or_else(|| ApiError::validation("Missing logo file"))?;

    if bytes.is_empty() {
        return Err(ApiError::validation("Logo file is empty"));
    }

    let old_id = state
        .profiles
        .get_settings(&principal.0.id)
        .await?
        .logo_public_id;
    let upload = state
        .blobs
        .upload(&bytes, "business-logos", old_id.as_deref())
        .await
        .map_err(|e| {
            ApiError::upstream(format!("Logo upload failed: {e:#}"))
        })?;

    let settings = state
        .profiles
        .set_logo(&principal.0, upload, filename)
        .await?;
    Ok(Success(json!({ "settings": settings })))
}

pub async fn remove_logo(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
) -> Result<Success<serde_json::Value>, ApiError> {
    let settings = state.profiles.remove_logo(&principal.0.id).await?;
    Ok(Success(json!({ "settings": settings })))
}
