//! Customer handlers. The search path attaches derived order aggregates.

use aspree_api::{
    error::{ApiError, Success},
    models::{CustomerListQuery, UpdateCustomerRequest},
    types::ids::CustomerId,
};
use aspree_common::time::TimestampMs;
use axum::extract::{Path, Query, State};
use serde_json::json;

use crate::{
    extract::{ApiJson, MerchantPrincipal},
    state::SharedState,
};

pub async fn list(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Query(query): Query<CustomerListQuery>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let limit = query.limit.unwrap_or(100);
    let offset = query.offset.unwrap_or(0);

    match query.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    {
        Some(term) => {
            let customers = state
                .store
                .search_customers(&principal.0.id, term, limit, offset)
                .await?;
            Ok(Success(json!({ "customers": customers })))
        }
        None => {
            let customers = state
                .store
                .list_customers(&principal.0.id, limit, offset)
                .await?;
            Ok(Success(json!({ "customers": customers })))
        }
    }
}

pub async fn get(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(customer_id): Path<CustomerId>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let customer = state
        .store
        .get_customer(&principal.0.id, &customer_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Unknown customer"))?;
    Ok(Success(json!({ "customer": customer })))
}

pub async fn update(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(customer_id): Path<CustomerId>,
    ApiJson(req): ApiJson<UpdateCustomerRequest>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let mut customer = state
        .store
        .get_customer(&principal.0.id, &customer_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Unknown customer"))?;

    if let Some(name) = req.name {
        if name.trim().is_empty() {
            return Err(ApiError::validation(
                "Customer name cannot be empty",
            ));
        }
        customer.name = name.trim().to_owned();
    }
    if let Some(email) = req.email {
        customer.email = Some(email.to_lowercase());
    }
    if let Some(phone) = req.phone {
        customer.phone = Some(phone);
    }
    if let Some(address) = req.address {
        customer.address = Some(address);
    }
    customer.updated_at = TimestampMs::now();

    state.store.update_customer(&customer).await?;
    Ok(Success(json!({ "customer": customer })))
}

pub async fn delete(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(customer_id): Path<CustomerId>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let deleted = state
        .store
        .delete_customer(&principal.0.id, &customer_id)
        .await?;
    if !deleted {
        return Err(ApiError::not_found("Unknown customer"));
    }
    Ok(Success(json!({ "deleted": true })))
}
