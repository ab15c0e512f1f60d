//! `/api/auth/*` handlers.

use aspree_api::{
    error::{ApiError, Success},
    models::{
        ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
        LoginResponse, RegisterRequest, RegisterResponse,
        ResendVerificationRequest, ResetPasswordRequest,
        UpdateProfileRequest, VerifyEmailRequest,
    },
};
use aspree_core::auth::profile_of;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use http::header::SET_COOKIE;
use serde_json::json;
use tracing::debug;

use crate::{
    extract::{ApiJson, ClientMeta, MerchantPrincipal, SESSION_COOKIE},
    state::SharedState,
};

pub async fn register(
    State(state): State<SharedState>,
    ClientMeta(meta): ClientMeta,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<Success<RegisterResponse>, ApiError> {
    let merchant = state.auth.register(&req, &meta).await?;
    // Delivery of the verification mail is a mailer concern; dev builds
    // surface the token in debug logs.
    debug!(
        target: "mail",
        merchant = %merchant.id,
        token = merchant.email_verification_token.as_deref(),
        "verification mail requested"
    );
    Ok(Success(RegisterResponse {
        merchant_id: merchant.id,
        message: "Registered; please verify your email".to_owned(),
    }))
}

pub async fn login(
    State(state): State<SharedState>,
    ClientMeta(meta): ClientMeta,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Response, ApiError> {
    let (token, merchant) = state.auth.login(&req, &meta).await?;

    let max_age_secs: i64 = if req.remember_me {
        30 * 24 * 60 * 60
    } else {
        7 * 24 * 60 * 60
    };
    let secure = if state.config.deploy_env.is_prod() {
        "; Secure"
    } else {
        ""
    };
    let cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; \
         Max-Age={max_age_secs}{secure}"
    );

    let mut response = Success(LoginResponse {
        token,
        merchant: profile_of(&merchant),
    })
    .into_response();
    response.headers_mut().append(
        SET_COOKIE,
        cookie.parse().map_err(|_| {
            ApiError::internal("Could not build session cookie")
        })?,
    );
    Ok(response)
}

pub async fn logout(State(state): State<SharedState>) -> Response {
    let secure = if state.config.deploy_env.is_prod() {
        "; Secure"
    } else {
        ""
    };
    let cookie = format!(
        "{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{secure}"
    );
    let mut response = Success::empty().into_response();
    if let Ok(value) = cookie.parse() {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

/// Echo the authenticated principal with its profile.
pub async fn verify(
    principal: MerchantPrincipal,
) -> Success<serde_json::Value> {
    Success(json!({ "merchant": profile_of(&principal.0) }))
}

pub async fn verify_email(
    State(state): State<SharedState>,
    ClientMeta(meta): ClientMeta,
    ApiJson(req): ApiJson<VerifyEmailRequest>,
) -> Result<Success<serde_json::Value>, ApiError> {
    state.auth.verify_email(&req.token, &meta).await?;
    Ok(Success(json!({ "message": "Email verified" })))
}

pub async fn resend_verification(
    State(state): State<SharedState>,
    ClientMeta(meta): ClientMeta,
    ApiJson(req): ApiJson<ResendVerificationRequest>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let token = state.auth.resend_verification(&req.email, &meta).await?;
    debug!(
        target: "mail",
        token = token.as_deref(),
        "verification mail re-requested"
    );
    Ok(Success(json!({
        "message": "If that account needs verification, a mail was sent"
    })))
}

/// Uniform response regardless of account existence.
pub async fn forgot_password(
    State(state): State<SharedState>,
    ClientMeta(meta): ClientMeta,
    ApiJson(req): ApiJson<ForgotPasswordRequest>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let token = state
        .auth
        .request_password_reset(&req.email, &meta)
        .await?;
    debug!(target: "mail", token = token.as_deref(), "reset mail requested");
    Ok(Success(json!({
        "message": "If that email exists, a reset link has been sent"
    })))
}

pub async fn reset_password(
    State(state): State<SharedState>,
    ClientMeta(meta): ClientMeta,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> Result<Success<serde_json::Value>, ApiError> {
    state
        .auth
        .reset_password(&req.token, &req.new_password, &meta)
        .await?;
    Ok(Success(json!({ "message": "Password updated" })))
}

pub async fn change_password(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    ClientMeta(meta): ClientMeta,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<Success<serde_json::Value>, ApiError> {
    state
        .auth
        .change_password(&principal.0.id, &req, &meta)
        .await?;
    Ok(Success(json!({ "message": "Password updated" })))
}

pub async fn get_profile(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
) -> Result<Success<serde_json::Value>, ApiError> {
    let profile = state.auth.get_profile(&principal.0.id).await?;
    Ok(Success(json!({ "merchant": profile })))
}

pub async fn update_profile(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    ClientMeta(meta): ClientMeta,
    ApiJson(patch): ApiJson<UpdateProfileRequest>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let profile = state
        .auth
        .update_profile(&principal.0.id, &patch, &meta)
        .await?;
    Ok(Success(json!({ "merchant": profile })))
}
