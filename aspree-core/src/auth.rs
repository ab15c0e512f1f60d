//! Registration, login, bearer tokens, and the password lifecycle.
//!
//! Tokens are HS256 JWTs carrying `{sub: merchant id, email, iat, exp}`.
//! Account lockout is deliberately disabled: repeated failures emit audit
//! events and bump `login_attempts`, but `locked_until` is never set. Brute
//! force is handled per-IP by the HTTP rate limiter, which blocks the
//! attacker's address instead of denying service to the targeted account.
//! Deployments that need per-account lockout can flip
//! [`AuthConfig::lockout_enabled`] at init; it is a policy toggle, not a
//! rewrite.
//!
//! Every mutating operation emits a structured event under the `audit`
//! target with the event kind, merchant id (when known), ip, user agent,
//! and success flag.

use std::time::Duration;

use aspree_api::{
    entities::Merchant,
    error::ApiError,
    models::{
        ChangePasswordRequest, LoginRequest, MerchantProfile,
        RegisterRequest, UpdateProfileRequest,
    },
    types::{ids::MerchantId, status::MerchantStatus},
};
use aspree_common::{rng::SysRng, time::TimestampMs};
use aspree_crypto::token;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::{Store, StoreError};

const TOKEN_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const TOKEN_LIFETIME_REMEMBERED: Duration =
    Duration::from_secs(30 * 24 * 60 * 60);
const RESET_TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Documented password policy: at least 8 characters, with at least one
/// ASCII letter and one digit.
const MIN_PASSWORD_LEN: usize = 8;

/// Request metadata threaded through for audit events.
#[derive(Clone, Debug, Default)]
pub struct RequestMeta {
    pub ip: String,
    pub user_agent: Option<String>,
}

/// The signed token claims.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The merchant id.
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Per-account lockout; intentionally off by default (see module docs).
    pub lockout_enabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            lockout_enabled: false,
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    store: Store,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(store: Store, jwt_secret: &[u8], config: AuthConfig) -> Self {
        Self {
            store,
            encoding_key: EncodingKey::from_secret(jwt_secret),
            decoding_key: DecodingKey::from_secret(jwt_secret),
            config,
        }
    }

    pub async fn register(
        &self,
        req: &RegisterRequest,
        meta: &RequestMeta,
    ) -> Result<Merchant, ApiError> {
        if !req.agree_terms {
            return Err(ApiError::validation(
                "You must agree to the terms of service",
            ));
        }
        validate_email(&req.email)?;
        validate_password(&req.password)?;
        if req.business_name.trim().is_empty() {
            return Err(ApiError::validation("Business name is required"));
        }
        if req.full_name.trim().is_empty() {
            return Err(ApiError::validation("Full name is required"));
        }

        let password_hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)
            .map_err(|e| {
                ApiError::internal(format!("Failed to hash password: {e}"))
            })?;

        let mut rng = SysRng::new();
        let now = TimestampMs::now();
        let merchant = Merchant {
            id: MerchantId::generate(),
            email: req.email.to_lowercase(),
            password_hash,
            business_name: req.business_name.trim().to_owned(),
            full_name: req.full_name.trim().to_owned(),
            phone: None,
            address: None,
            status: MerchantStatus::Active,
            email_verified: false,
            email_verification_token: Some(token::random_token(&mut rng, 24)),
            reset_token: None,
            reset_token_expires: None,
            last_login: None,
            login_attempts: 0,
            locked_until: None,
            subscription_plan: "free".to_owned(),
            created_at: now,
            updated_at: now,
        };

        match self.store.create_merchant(&merchant).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                audit("register", None, meta, false);
                return Err(ApiError::conflict("Email is already registered"));
            }
            Err(e) => return Err(e.into()),
        }

        audit("register", Some(&merchant.id), meta, true);
        Ok(merchant)
    }

    pub async fn login(
        &self,
        req: &LoginRequest,
        meta: &RequestMeta,
    ) -> Result<(String, Merchant), ApiError> {
        let invalid =
            || ApiError::unauthorized("Invalid email or password");

        let Some(mut merchant) =
            self.store.get_merchant_by_email(&req.email).await?
        else {
            audit("login", None, meta, false);
            return Err(invalid());
        };

        if merchant.status != MerchantStatus::Active {
            audit("login", Some(&merchant.id), meta, false);
            return Err(invalid());
        }

        if self.config.lockout_enabled {
            if let Some(locked_until) = merchant.locked_until {
                if locked_until > TimestampMs::now() {
                    audit("login", Some(&merchant.id), meta, false);
                    return Err(ApiError::unauthorized(
                        "Account temporarily locked",
                    ));
                }
            }
        }

        // bcrypt verification is constant-time for a given cost factor.
        let password_ok = bcrypt::verify(&req.password, &merchant.password_hash)
            .unwrap_or(false);
        if !password_ok {
            merchant.login_attempts += 1;
            // Lockout intentionally NOT set here unless the policy toggle is
            // on; see module docs.
            if self.config.lockout_enabled && merchant.login_attempts >= 10 {
                merchant.locked_until = Some(
                    TimestampMs::now()
                        .saturating_add(Duration::from_secs(15 * 60)),
                );
            }
            merchant.updated_at = TimestampMs::now();
            self.store.update_merchant(&merchant).await?;
            audit("login", Some(&merchant.id), meta, false);
            return Err(invalid());
        }

        let now = TimestampMs::now();
        merchant.last_login = Some(now);
        merchant.login_attempts = 0;
        merchant.locked_until = None;
        merchant.updated_at = now;
        self.store.update_merchant(&merchant).await?;

        let lifetime = if req.remember_me {
            TOKEN_LIFETIME_REMEMBERED
        } else {
            TOKEN_LIFETIME
        };
        let token = self.issue_token(&merchant, lifetime)?;

        audit("login", Some(&merchant.id), meta, true);
        Ok((token, merchant))
    }

    fn issue_token(
        &self,
        merchant: &Merchant,
        lifetime: Duration,
    ) -> Result<String, ApiError> {
        let now = TimestampMs::now();
        let claims = Claims {
            sub: merchant.id.to_string(),
            email: merchant.email.clone(),
            iat: now.as_i64() / 1000,
            exp: now.saturating_add(lifetime).as_i64() / 1000,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| {
                ApiError::internal(format!("Failed to sign token: {e}"))
            })
    }

    /// Validate signature and expiry; returns the claims.
    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        let validation = Validation::default();
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| ApiError::unauthorized("Invalid or expired token"))
    }

    pub async fn verify_email(
        &self,
        token: &str,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        let Some(mut merchant) = self
            .store
            .get_merchant_by_verification_token(token)
            .await?
        else {
            audit("verify_email", None, meta, false);
            return Err(ApiError::not_found("Unknown verification token"));
        };

        merchant.email_verified = true;
        merchant.email_verification_token = None;
        merchant.updated_at = TimestampMs::now();
        self.store.update_merchant(&merchant).await?;
        audit("verify_email", Some(&merchant.id), meta, true);
        Ok(())
    }

    /// Re-issues a verification token when the account exists and is not
    /// yet verified. Always returns success to avoid user enumeration.
    pub async fn resend_verification(
        &self,
        email: &str,
        meta: &RequestMeta,
    ) -> Result<Option<String>, ApiError> {
        let Some(mut merchant) =
            self.store.get_merchant_by_email(email).await?
        else {
            return Ok(None);
        };
        if merchant.email_verified {
            return Ok(None);
        }

        let mut rng = SysRng::new();
        let fresh = token::random_token(&mut rng, 24);
        merchant.email_verification_token = Some(fresh.clone());
        merchant.updated_at = TimestampMs::now();
        self.store.update_merchant(&merchant).await?;
        audit("resend_verification", Some(&merchant.id), meta, true);
        Ok(Some(fresh))
    }

    /// Always succeeds with the same shape whether or not the email exists;
    /// when it does, a reset token valid for one hour is stored.
    pub async fn request_password_reset(
        &self,
        email: &str,
        meta: &RequestMeta,
    ) -> Result<Option<String>, ApiError> {
        let Some(mut merchant) =
            self.store.get_merchant_by_email(email).await?
        else {
            // Deliberately indistinguishable from the success path.
            audit("request_password_reset", None, meta, true);
            return Ok(None);
        };

        let mut rng = SysRng::new();
        let reset_token = token::random_token(&mut rng, 24);
        merchant.reset_token = Some(reset_token.clone());
        merchant.reset_token_expires = Some(
            TimestampMs::now().saturating_add(RESET_TOKEN_LIFETIME),
        );
        merchant.updated_at = TimestampMs::now();
        self.store.update_merchant(&merchant).await?;
        audit("request_password_reset", Some(&merchant.id), meta, true);
        Ok(Some(reset_token))
    }

    pub async fn reset_password(
        &self,
        reset_token: &str,
        new_password: &str,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        validate_password(new_password)?;

        let Some(mut merchant) =
            self.store.get_merchant_by_reset_token(reset_token).await?
        else {
            audit("reset_password", None, meta, false);
            return Err(ApiError::not_found("Unknown or expired reset token"));
        };

        let expired = merchant
            .reset_token_expires
            .is_none_or(|expires| expires < TimestampMs::now());
        if expired {
            audit("reset_password", Some(&merchant.id), meta, false);
            return Err(ApiError::not_found("Unknown or expired reset token"));
        }

        merchant.password_hash =
            bcrypt::hash(new_password, bcrypt::DEFAULT_COST).map_err(|e| {
                ApiError::internal(format!("Failed to hash password: {e}"))
            })?;
        merchant.reset_token = None;
        merchant.reset_token_expires = None;
        merchant.login_attempts = 0;
        merchant.updated_at = TimestampMs::now();
        self.store.update_merchant(&merchant).await?;
        audit("reset_password", Some(&merchant.id), meta, true);
        Ok(())
    }

    pub async fn change_password(
        &self,
        merchant_id: &MerchantId,
        req: &ChangePasswordRequest,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        validate_password(&req.new_password)?;

        let Some(mut merchant) =
            self.store.get_merchant_by_id(merchant_id).await?
        else {
            return Err(ApiError::not_found("Unknown merchant"));
        };

        let current_ok =
            bcrypt::verify(&req.current_password, &merchant.password_hash)
                .unwrap_or(false);
        if !current_ok {
            audit("change_password", Some(merchant_id), meta, false);
            return Err(ApiError::unauthorized(
                "Current password is incorrect",
            ));
        }

        merchant.password_hash =
            bcrypt::hash(&req.new_password, bcrypt::DEFAULT_COST).map_err(
                |e| ApiError::internal(format!("Failed to hash password: {e}")),
            )?;
        merchant.updated_at = TimestampMs::now();
        self.store.update_merchant(&merchant).await?;
        audit("change_password", Some(merchant_id), meta, true);
        Ok(())
    }

    pub async fn get_profile(
        &self,
        merchant_id: &MerchantId,
    ) -> Result<MerchantProfile, ApiError> {
        let merchant = self
            .store
            .get_merchant_by_id(merchant_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Unknown merchant"))?;
        Ok(profile_of(&merchant))
    }

    pub async fn update_profile(
        &self,
        merchant_id: &MerchantId,
        patch: &UpdateProfileRequest,
        meta: &RequestMeta,
    ) -> Result<MerchantProfile, ApiError> {
        let Some(mut merchant) =
            self.store.get_merchant_by_id(merchant_id).await?
        else {
            return Err(ApiError::not_found("Unknown merchant"));
        };

        if let Some(business_name) = &patch.business_name {
            if business_name.trim().is_empty() {
                return Err(ApiError::validation(
                    "Business name cannot be empty",
                ));
            }
            merchant.business_name = business_name.trim().to_owned();
        }
        if let Some(full_name) = &patch.full_name {
            merchant.full_name = full_name.trim().to_owned();
        }
        if let Some(phone) = &patch.phone {
            merchant.phone = Some(phone.clone());
        }
        if let Some(address) = &patch.address {
            merchant.address = Some(address.clone());
        }
        merchant.updated_at = TimestampMs::now();
        self.store.update_merchant(&merchant).await?;
        audit("update_profile", Some(merchant_id), meta, true);
        Ok(profile_of(&merchant))
    }
}

pub fn profile_of(merchant: &Merchant) -> MerchantProfile {
    MerchantProfile {
        id: merchant.id.clone(),
        email: merchant.email.clone(),
        business_name: merchant.business_name.clone(),
        full_name: merchant.full_name.clone(),
        phone: merchant.phone.clone(),
        address: merchant.address.clone(),
        email_verified: merchant.email_verified,
        subscription_plan: merchant.subscription_plan.clone(),
        last_login: merchant.last_login,
        created_at: merchant.created_at,
    }
}

fn audit(
    event: &str,
    merchant_id: Option<&MerchantId>,
    meta: &RequestMeta,
    success: bool,
) {
    let merchant = merchant_id.map(MerchantId::to_string);
    if success {
        info!(
            target: "audit",
            event,
            merchant = merchant.as_deref(),
            ip = %meta.ip,
            user_agent = meta.user_agent.as_deref(),
            success,
        );
    } else {
        warn!(
            target: "audit",
            event,
            merchant = merchant.as_deref(),
            ip = %meta.ip,
            user_agent = meta.user_agent.as_deref(),
            success,
        );
    }
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.is_empty()
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !email.contains(char::is_whitespace)
    });
    if valid {
        Ok(())
    } else {
        Err(ApiError::validation("Invalid email address"))
    }
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(
            "Password must be at least 8 characters",
        ));
    }
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(ApiError::validation(
            "Password must contain at least one letter and one digit",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use aspree_api::error::ErrorKind;

    use super::*;

    fn register_req(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_owned(),
            password: password.to_owned(),
            business_name: "Toko Maju".to_owned(),
            full_name: "Budi Santoso".to_owned(),
            agree_terms: true,
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_owned(),
            password: password.to_owned(),
            remember_me: false,
        }
    }

    async fn test_auth() -> AuthService {
        let store = Store::open_in_memory().await.unwrap();
        AuthService::new(store, b"test-jwt-secret", AuthConfig::default())
    }

    #[test]
    fn password_policy() {
        assert!(validate_password("password1A!").is_ok());
        assert!(validate_password("abcd1234").is_ok());
        // Too short.
        assert!(validate_password("abc1234").is_err());
        // No digit.
        assert!(validate_password("abcdefgh").is_err());
        // No letter.
        assert!(validate_password("12345678").is_err());
    }

    #[test]
    fn email_validation() {
        assert!(validate_email("a@x.com").is_ok());
        assert!(validate_email("a.b+c@sub.x.co.id").is_ok());
        for bad in ["", "a", "a@", "@x.com", "a@x", "a b@x.com", "a@.com"] {
            assert!(validate_email(bad).is_err(), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn register_login_verify_roundtrip() {
        let auth = test_auth().await;
        let meta = RequestMeta::default();

        let merchant = auth
            .register(&register_req("a@x.com", "password1A!"), &meta)
            .await
            .unwrap();
        assert!(!merchant.email_verified);
        assert!(merchant.email_verification_token.is_some());

        let (token, logged_in) = auth
            .login(&login_req("A@X.com", "password1A!"), &meta)
            .await
            .unwrap();
        assert_eq!(logged_in.id, merchant.id);
        assert!(logged_in.last_login.is_some());

        let claims = auth.verify_token(&token).unwrap();
        assert_eq!(claims.sub, merchant.id.to_string());
        assert_eq!(claims.email, "a@x.com");
        // ~7 days of lifetime.
        assert!(claims.exp - claims.iat >= 7 * 24 * 3600 - 60);

        assert!(auth.verify_token("not-a-token").is_err());
        assert!(auth.verify_token(&format!("{token}x")).is_err());
    }

    #[tokio::test]
    async fn register_requires_terms_and_unique_email() {
        let auth = test_auth().await;
        let meta = RequestMeta::default();

        let mut req = register_req("a@x.com", "password1A!");
        req.agree_terms = false;
        let err = auth.register(&req, &meta).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        auth.register(&register_req("a@x.com", "password1A!"), &meta)
            .await
            .unwrap();
        let err = auth
            .register(&register_req("A@x.com", "password1B!"), &meta)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn failed_login_counts_attempts_but_never_locks() {
        let auth = test_auth().await;
        let meta = RequestMeta::default();
        let merchant = auth
            .register(&register_req("a@x.com", "password1A!"), &meta)
            .await
            .unwrap();

        for _ in 0..12 {
            let err = auth
                .login(&login_req("a@x.com", "wrong-pass1"), &meta)
                .await
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::Unauthorized);
        }

        let row = auth
            .store
            .get_merchant_by_id(&merchant.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.login_attempts, 12);
        assert_eq!(row.locked_until, None);

        // Correct password still works and clears the counter.
        auth.login(&login_req("a@x.com", "password1A!"), &meta)
            .await
            .unwrap();
        let row = auth
            .store
            .get_merchant_by_id(&merchant.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.login_attempts, 0);
    }

    #[tokio::test]
    async fn remember_me_extends_expiry() {
        let auth = test_auth().await;
        let meta = RequestMeta::default();
        auth.register(&register_req("a@x.com", "password1A!"), &meta)
            .await
            .unwrap();

        let mut req = login_req("a@x.com", "password1A!");
        req.remember_me = true;
        let (token, _) = auth.login(&req, &meta).await.unwrap();
        let claims = auth.verify_token(&token).unwrap();
        assert!(claims.exp - claims.iat >= 30 * 24 * 3600 - 60);
    }

    #[tokio::test]
    async fn email_verification_flow() {
        let auth = test_auth().await;
        let meta = RequestMeta::default();
        let merchant = auth
            .register(&register_req("a@x.com", "password1A!"), &meta)
            .await
            .unwrap();
        let token = merchant.email_verification_token.clone().unwrap();

        auth.verify_email(&token, &meta).await.unwrap();
        let row = auth
            .store
            .get_merchant_by_id(&merchant.id)
            .await
            .unwrap()
            .unwrap();
        assert!(row.email_verified);
        assert_eq!(row.email_verification_token, None);

        // Token is single-use.
        assert!(auth.verify_email(&token, &meta).await.is_err());

        // Resend on a verified account is a no-op.
        let resent =
            auth.resend_verification("a@x.com", &meta).await.unwrap();
        assert!(resent.is_none());
    }

    #[tokio::test]
    async fn password_reset_flow() {
        let auth = test_auth().await;
        let meta = RequestMeta::default();
        auth.register(&register_req("a@x.com", "password1A!"), &meta)
            .await
            .unwrap();

        // Unknown email: same success shape, no token.
        let none = auth
            .request_password_reset("nobody@x.com", &meta)
            .await
            .unwrap();
        assert!(none.is_none());

        let reset_token = auth
            .request_password_reset("a@x.com", &meta)
            .await
            .unwrap()
            .unwrap();

        // Weak replacement is rejected before the token is consumed.
        assert!(auth
            .reset_password(&reset_token, "short", &meta)
            .await
            .is_err());

        auth.reset_password(&reset_token, "newpassword2", &meta)
            .await
            .unwrap();

        // Token invalidated; old password gone.
        assert!(auth
            .reset_password(&reset_token, "another3pw", &meta)
            .await
            .is_err());
        assert!(auth
            .login(&login_req("a@x.com", "password1A!"), &meta)
            .await
            .is_err());
        auth.login(&login_req("a@x.com", "newpassword2"), &meta)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn change_password_requires_current() {
        let auth = test_auth().await;
        let meta = RequestMeta::default();
        let merchant = auth
            .register(&register_req("a@x.com", "password1A!"), &meta)
            .await
            .unwrap();

        let err = auth
            .change_password(
                &merchant.id,
                &ChangePasswordRequest {
                    current_password: "wrong-pass1".to_owned(),
                    new_password: "newpassword2".to_owned(),
                },
                &meta,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);

        auth.change_password(
            &merchant.id,
            &ChangePasswordRequest {
                current_password: "password1A!".to_owned(),
                new_password: "newpassword2".to_owned(),
            },
            &meta,
        )
        .await
        .unwrap();
        auth.login(&login_req("a@x.com", "newpassword2"), &meta)
            .await
            .unwrap();
    }
}
