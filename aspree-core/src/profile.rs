//! Business settings lifecycle: tax config, terms, the business code, the
//! logo, and premium branding assembly.

use aspree_api::{
    entities::{BusinessSettings, Merchant},
    error::ApiError,
    models::{BusinessDisplay, BusinessSettingsPatch},
    types::ids::MerchantId,
};
use aspree_common::time::TimestampMs;
use rust_decimal::Decimal;
use tracing::info;

use crate::{
    queue::{SideEffect, SideEffectQueue},
    store::Store,
    traits::BlobUpload,
};

#[derive(Clone)]
pub struct ProfileService {
    store: Store,
    queue: SideEffectQueue,
}

impl ProfileService {
    pub fn new(store: Store, queue: SideEffectQueue) -> Self {
        Self { store, queue }
    }

    /// The merchant's settings, or pristine defaults when nothing has been
    /// written yet. Defaults are not persisted by a read.
    pub async fn get_settings(
        &self,
        merchant_id: &MerchantId,
    ) -> Result<BusinessSettings, ApiError> {
        match self.store.get_business_settings(merchant_id).await? {
            Some(settings) => Ok(settings),
            None => Ok(default_settings(merchant_id)),
        }
    }

    /// Apply a patch; on first write, derives the business code from the
    /// merchant's business name.
    pub async fn update_settings(
        &self,
        merchant: &Merchant,
        patch: &BusinessSettingsPatch,
    ) -> Result<BusinessSettings, ApiError> {
        let mut settings = self.get_settings(&merchant.id).await?;

        if let Some(tax_enabled) = patch.tax_enabled {
            settings.tax_enabled = tax_enabled;
        }
        if let Some(tax_rate) = patch.tax_rate {
            if tax_rate < Decimal::ZERO {
                return Err(ApiError::validation(
                    "Tax rate cannot be negative",
                ));
            }
            settings.tax_rate = tax_rate;
        }
        if let Some(tax_name) = &patch.tax_name {
            settings.tax_name = Some(tax_name.clone());
        }
        if let Some(tax_description) = &patch.tax_description {
            settings.tax_description = Some(tax_description.clone());
        }
        if let Some(custom_header_text) = &patch.custom_header_text {
            settings.custom_header_text = Some(custom_header_text.clone());
        }
        if let Some(color) = &patch.custom_header_bg_color {
            settings.custom_header_bg_color = Some(color.clone());
        }
        if let Some(color) = &patch.custom_footer_bg_color {
            settings.custom_footer_bg_color = Some(color.clone());
        }
        if let Some(hide) = patch.hide_aspree_branding {
            settings.hide_aspree_branding = hide;
        }
        if let Some(premium) = patch.premium_active {
            settings.premium_active = premium;
        }
        if let Some(terms) = &patch.terms_text {
            settings.terms_text = Some(terms.clone());
        }

        if settings.business_code.is_none() {
            settings.business_code =
                Some(derive_business_code(&merchant.business_name));
        }

        settings.updated_at = TimestampMs::now();
        self.store.upsert_business_settings(&settings).await?;
        Ok(settings)
    }

    /// Install a freshly uploaded logo; the previous blob is deleted off
    /// the request path.
    pub async fn set_logo(
        &self,
        merchant: &Merchant,
        upload: BlobUpload,
        filename: Option<String>,
    ) -> Result<BusinessSettings, ApiError> {
        let mut settings = self.get_settings(&merchant.id).await?;

        if let Some(old_id) = settings.logo_public_id.take() {
            self.queue.push(SideEffect::DeleteBlob { public_id: old_id });
        }

        settings.logo_url = Some(upload.url);
        settings.logo_public_id = Some(upload.public_id);
        settings.logo_filename = filename;
        if settings.business_code.is_none() {
            settings.business_code =
                Some(derive_business_code(&merchant.business_name));
        }
        settings.updated_at = TimestampMs::now();
        self.store.upsert_business_settings(&settings).await?;

        info!(merchant = %merchant.id, "business logo replaced");
        Ok(settings)
    }

    pub async fn remove_logo(
        &self,
        merchant_id: &MerchantId,
    ) -> Result<BusinessSettings, ApiError> {
        let Some(mut settings) =
            self.store.get_business_settings(merchant_id).await?
        else {
            return Err(ApiError::not_found("No business settings"));
        };

        if let Some(old_id) = settings.logo_public_id.take() {
            self.queue.push(SideEffect::DeleteBlob { public_id: old_id });
        }
        settings.logo_url = None;
        settings.logo_filename = None;
        settings.updated_at = TimestampMs::now();
        self.store.upsert_business_settings(&settings).await?;
        Ok(settings)
    }

    /// The display-only business block attached to invoice views. The
    /// custom-branding fields pass through only while premium is active.
    pub fn display_for(
        &self,
        merchant_name: &str,
        settings: &BusinessSettings,
    ) -> BusinessDisplay {
        let premium = settings.premium_active;
        BusinessDisplay {
            business_name: merchant_name.to_owned(),
            logo_url: settings.logo_url.clone(),
            terms_text: settings.terms_text.clone(),
            business_code: settings.business_code.clone(),
            custom_header_text: premium
                .then(|| settings.custom_header_text.clone())
                .flatten(),
            custom_header_bg_color: premium
                .then(|| settings.custom_header_bg_color.clone())
                .flatten(),
            custom_footer_bg_color: premium
                .then(|| settings.custom_footer_bg_color.clone())
                .flatten(),
            custom_header_logo_url: premium
                .then(|| settings.custom_header_logo_url.clone())
                .flatten(),
            custom_footer_logo_url: premium
                .then(|| settings.custom_footer_logo_url.clone())
                .flatten(),
            hide_aspree_branding: premium && settings.hide_aspree_branding,
        }
    }
}

fn default_settings(merchant_id: &MerchantId) -> BusinessSettings {
    let now = TimestampMs::now();
    BusinessSettings {
        merchant_id: merchant_id.clone(),
        tax_enabled: false,
        tax_rate: Decimal::ZERO,
        tax_name: None,
        tax_description: None,
        logo_url: None,
        logo_public_id: None,
        logo_filename: None,
        custom_header_text: None,
        custom_header_bg_color: None,
        custom_footer_bg_color: None,
        custom_header_logo_url: None,
        custom_header_logo_public_id: None,
        custom_footer_logo_url: None,
        custom_footer_logo_public_id: None,
        hide_aspree_branding: false,
        premium_active: false,
        terms_text: None,
        business_code: None,
        created_at: now,
        updated_at: now,
    }
}

/// Single word: first three characters, uppercased. Multiple words: the
/// initials of the first three words.
pub fn derive_business_code(business_name: &str) -> String {
    let words: Vec<&str> = business_name.split_whitespace().collect();
    match words.as_slice() {
        [] => String::new(),
        [single] => single.chars().take(3).collect::<String>().to_uppercase(),
        many => many
            .iter()
            .take(3)
            .filter_map(|word| word.chars().next())
            .collect::<String>()
            .to_uppercase(),
    }
}
