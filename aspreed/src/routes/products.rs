//! Product catalog handlers.

use aspree_api::{
    entities::Product,
    error::{ApiError, Success},
    models::{CreateProductRequest, ProductListQuery, UpdateProductRequest},
    types::ids::ProductId,
};
use aspree_common::time::TimestampMs;
use aspree_core::{cache, cache::Cache, store::ProductFilter};
use axum::extract::{Path, Query, State};
use serde_json::json;

use crate::{
    extract::{ApiJson, MerchantPrincipal},
    state::SharedState,
};

/// Catalog reads are cached per merchant; every write below invalidates
/// the merchant's whole cache prefix.
pub async fn list(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Query(query): Query<ProductListQuery>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let filter = ProductFilter {
        active_only: query.active_only.unwrap_or(false),
        category: query.category,
        limit: query.limit,
        offset: query.offset,
    };

    let cache_key = Cache::merchant_key(
        &principal.0.id,
        &format!(
            "products:{}:{}:{}:{}",
            filter.active_only,
            filter.category.as_deref().unwrap_or(""),
            filter.limit.unwrap_or(100),
            filter.offset.unwrap_or(0),
        ),
    );
    if let Some(cached) = state.cache.get(&cache_key) {
        return Ok(Success(json!({ "products": cached })));
    }

    let products =
        state.store.list_products(&principal.0.id, &filter).await?;
    let products_json = serde_json::to_value(&products)
        .map_err(|e| ApiError::internal(format!("{e}")))?;
    state
        .cache
        .insert(cache_key, products_json.clone(), cache::DEFAULT_TTL);
    Ok(Success(json!({ "products": products_json })))
}

pub async fn create(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    ApiJson(req): ApiJson<CreateProductRequest>,
) -> Result<Success<serde_json::Value>, ApiError> {
    if req.sku.trim().is_empty() {
        return Err(ApiError::validation("SKU is required"));
    }
    if req.name.trim().is_empty() {
        return Err(ApiError::validation("Product name is required"));
    }

    let now = TimestampMs::now();
    let product = Product {
        id: ProductId::generate(),
        merchant_id: principal.0.id.clone(),
        sku: req.sku.trim().to_owned(),
        name: req.name.trim().to_owned(),
        category: req.category,
        unit_price: req.unit_price,
        cost_price: req.cost_price,
        stock_quantity: req.stock_quantity.unwrap_or(0),
        min_stock_level: req.min_stock_level.unwrap_or(0),
        is_active: true,
        tax_rate: req.tax_rate,
        dimensions: req.dimensions,
        weight: req.weight,
        image_url: req.image_url,
        created_at: now,
        updated_at: now,
    };
    state.store.create_product(&product).await?;
    state
        .cache
        .invalidate_prefix(&format!("{}:", principal.0.id));
    Ok(Success(json!({ "product": product })))
}

pub async fn get(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(product_id): Path<ProductId>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let product = state
        .store
        .get_product(&principal.0.id, &product_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Unknown product"))?;
    Ok(Success(json!({ "product": product })))
}

pub async fn update(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(product_id): Path<ProductId>,
    ApiJson(req): ApiJson<UpdateProductRequest>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let mut product = state
        .store
        .get_product(&principal.0.id, &product_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Unknown product"))?;

    if let Some(name) = req.name {
        product.name = name;
    }
    if let Some(category) = req.category {
        product.category = Some(category);
    }
    if let Some(unit_price) = req.unit_price {
        product.unit_price = unit_price;
    }
    if let Some(cost_price) = req.cost_price {
        product.cost_price = Some(cost_price);
    }
    if let Some(stock_quantity) = req.stock_quantity {
        product.stock_quantity = stock_quantity;
    }
    if let Some(min_stock_level) = req.min_stock_level {
        product.min_stock_level = min_stock_level;
    }
    if let Some(is_active) = req.is_active {
        product.is_active = is_active;
    }
    if let Some(tax_rate) = req.tax_rate {
        product.tax_rate = Some(tax_rate);
    }
    if let Some(dimensions) = req.dimensions {
        product.dimensions = Some(dimensions);
    }
    if let Some(weight) = req.weight {
        product.weight = Some(weight);
    }
    if let Some(image_url) = req.image_url {
        product.image_url = Some(image_url);
    }
    product.updated_at = TimestampMs::now();

    state.store.update_product(&product).await?;
    state
        .cache
        .invalidate_prefix(&format!("{}:", principal.0.id));
    Ok(Success(json!({ "product": product })))
}

pub async fn delete(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(product_id): Path<ProductId>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let deleted = state
        .store
        .delete_product(&principal.0.id, &product_id)
        .await?;
    if !deleted {
        return Err(ApiError::not_found("Unknown product"));
    }
    state
        .cache
        .invalidate_prefix(&format!("{}:", principal.0.id));
    Ok(Success(json!({ "deleted": true })))
}
