//! Request extractors.
//!
//! [`MerchantPrincipal`] resolves the authenticated merchant from the
//! `Authorization: Bearer` header, falling back to the session cookie.
//! Handlers receive the already-loaded merchant row and never trust
//! merchant ids found in request bodies.

use aspree_api::{entities::Merchant, error::ApiError};
use aspree_core::auth::RequestMeta;
use axum::extract::{FromRequest, FromRequestParts, Request};
use http::{header, request::Parts};
use serde::de::DeserializeOwned;

use crate::state::SharedState;

/// Name of the session cookie set on login.
pub const SESSION_COOKIE: &str = "aspree_token";

/// The authenticated merchant.
pub struct MerchantPrincipal(pub Merchant);

impl FromRequestParts<SharedState> for MerchantPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_or_cookie_token(parts) else {
            return Err(ApiError::unauthorized("Authentication required"));
        };

        let claims = state.auth.verify_token(&token)?;
        let merchant_id = claims
            .sub
            .parse()
            .map_err(|_| ApiError::unauthorized("Malformed token subject"))?;
        let merchant = state
            .store
            .get_merchant_by_id(&merchant_id)
            .await
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::unauthorized("Unknown merchant"))?;

        if merchant.status
            != aspree_api::types::status::MerchantStatus::Active
        {
            return Err(ApiError::unauthorized("Account is inactive"));
        }

        Ok(Self(merchant))
    }
}

/// A principal that may be absent. Absence of credentials yields `None`;
/// *invalid* credentials still reject, so a caller with a bad token is told
/// so instead of being silently treated as anonymous.
pub struct OptionalPrincipal(pub Option<Merchant>);

impl FromRequestParts<SharedState> for OptionalPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        if bearer_or_cookie_token(parts).is_none() {
            return Ok(Self(None));
        }
        MerchantPrincipal::from_request_parts(parts, state)
            .await
            .map(|MerchantPrincipal(merchant)| Self(Some(merchant)))
    }
}

fn bearer_or_cookie_token(parts: &Parts) -> Option<String> {
    // Bearer header first.
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned);
    if bearer.is_some() {
        return bearer;
    }

    // Then the session cookie.
    parts
        .headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|cookie| {
                let (name, value) = cookie.trim().split_once('=')?;
                (name == SESSION_COOKIE).then(|| value.to_owned())
            })
        })
}

/// Client ip + user agent, threaded into audit events and access logs.
/// The ip honors `X-Forwarded-For` (first hop) for reverse-proxy setups.
#[derive(Clone, Debug, Default)]
pub struct ClientMeta(pub RequestMeta);

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(client_meta_of(parts)))
    }
}

pub fn client_meta_of(parts: &Parts) -> RequestMeta {
    let ip = forwarded_ip(&parts.headers)
        .or_else(|| {
            parts
                .extensions
                .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_owned());
    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    RequestMeta { ip, user_agent }
}

pub fn forwarded_ip(headers: &http::HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_owned())
        .filter(|ip| !ip.is_empty())
}

/// JSON body extractor whose rejection is the standard error envelope
/// instead of axum's plain-text body.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(
        req: Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        axum::Json::<T>::from_request(req, state)
            .await
            .map(|axum::Json(value)| Self(value))
            .map_err(|rejection| {
                ApiError::validation(format!("Bad JSON body: {rejection}"))
            })
    }
}
