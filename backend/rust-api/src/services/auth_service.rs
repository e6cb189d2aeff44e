use anyhow::{anyhow, Context};
use base64::{engine::general_purpose, Engine as _};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use lazy_static::lazy_static;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use mongodb::{Collection, Database};
use rand::Rng;
use redis::aio::ConnectionManager;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::metrics::{track_db_operation, PASSWORD_RESET_EMAILS_TOTAL};
use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::settings::AppSettings;
use crate::models::user::{
    LoginRequest, RegisterRequest, ResetPasswordRequest, User, UserRole, VerifyResetCodeRequest,
    VerifyResetCodeResponse,
};
use crate::services::email_service::{reset_code_email, Mailer};
use crate::services::error::{is_duplicate_key, required_text};
use crate::services::{ServiceError, ServiceResult, USERS};

const MAX_FAILED_LOGINS: u32 = 5;
const FAILED_LOGIN_WINDOW_SECONDS: i64 = 900;
const RESET_CODE_TTL_MINUTES: i64 = 15;
const RESET_TOKEN_TTL_MINUTES: i64 = 5;

pub const FORGOT_PASSWORD_MESSAGE: &str = "If the email exists, a reset code has been sent";

lazy_static! {
    static ref RESET_CODE_RE: Regex = Regex::new(r"^\d{6}$").expect("valid reset code regex");
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// SHA-256 hex digest used for reset codes and reset tokens at rest.
pub fn hash_secret(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn generate_reset_code() -> String {
    rand::rng().random_range(100_000..1_000_000).to_string()
}

fn generate_reset_token() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
}

pub struct AuthService {
    users: Collection<User>,
    redis: ConnectionManager,
    jwt_service: JwtService,
    token_ttl_seconds: i64,
}

impl AuthService {
    pub fn new(
        mongo: &Database,
        redis: ConnectionManager,
        jwt_service: JwtService,
        token_ttl_seconds: i64,
    ) -> Self {
        Self {
            users: mongo.collection(USERS),
            redis,
            jwt_service,
            token_ttl_seconds,
        }
    }

    pub fn hash_password(password: &str) -> anyhow::Result<String> {
        hash(password, DEFAULT_COST).context("Failed to hash password")
    }

    fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
        verify(password, hash).context("Failed to verify password")
    }

    pub async fn register(
        &self,
        req: RegisterRequest,
        settings: &AppSettings,
    ) -> ServiceResult<User> {
        if !settings.registration_open {
            return Err(ServiceError::forbidden("Registration is currently closed"));
        }

        let role = req.role.unwrap_or_default();
        if role == UserRole::Admin {
            return Err(ServiceError::forbidden(
                "Administrator accounts cannot be self-registered",
            ));
        }

        let email = normalize_email(&req.email);
        let existing = self
            .users
            .find_one(doc! { "email": &email })
            .await
            .context("Failed to check existing user")?;
        if existing.is_some() {
            return Err(ServiceError::conflict("User with this email already exists"));
        }

        let now = Utc::now();
        let mut user = User {
            id: None,
            email,
            password_hash: Self::hash_password(&req.password)?,
            name: required_text(&req.name, "Name is required")?,
            role,
            phone: crate::models::non_blank(req.phone),
            province: crate::models::non_blank(req.province),
            city: crate::models::non_blank(req.city),
            address: None,
            profile_image: None,
            is_active: true,
            reset_token: None,
            reset_token_expiry: None,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };

        let inserted = match self.users.insert_one(&user).await {
            Ok(result) => result,
            Err(e) if is_duplicate_key(&e) => {
                return Err(ServiceError::conflict("User with this email already exists"))
            }
            Err(e) => return Err(anyhow!(e).context("Failed to insert user").into()),
        };
        user.id = inserted.inserted_id.as_object_id();

        tracing::info!(user_id = %crate::models::id_hex(&user.id), role = %user.role, "User registered");
        Ok(user)
    }

    /// Verifies credentials and returns a signed token with the user.
    pub async fn login(&self, req: LoginRequest) -> ServiceResult<(String, User)> {
        let email = normalize_email(&req.email);

        if self.check_failed_attempts(&email).await.unwrap_or(false) {
            tracing::warn!(email = %email, "Login blocked: too many failed attempts");
            return Err(ServiceError::TooManyRequests(
                "Too many failed login attempts. Please try again later.".into(),
            ));
        }

        let user = track_db_operation("find_one", USERS, async {
            self.users.find_one(doc! { "email": &email }).await
        })
        .await
        .context("Failed to query user")?;

        let user = match user {
            Some(user) if Self::verify_password(&req.password, &user.password_hash)? => user,
            _ => {
                let count = self.increment_failed_attempts(&email).await.unwrap_or(0);
                tracing::warn!(email = %email, attempts = count, "Failed login attempt");
                return Err(ServiceError::Unauthorized("Invalid email or password".into()));
            }
        };

        if !user.is_active {
            return Err(ServiceError::forbidden("Account is deactivated"));
        }

        let user_id = user.id.ok_or_else(|| anyhow!("User ID not found"))?;
        let now = Utc::now();
        self.users
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "last_login_at": BsonDateTime::from_millis(now.timestamp_millis()) } },
            )
            .await
            .context("Failed to update last login timestamp")?;

        if let Err(e) = self.clear_failed_attempts(&email).await {
            tracing::warn!(error = %e, "Failed to clear login attempt counter");
        }

        let token = self.issue_token(&user_id, &user)?;
        tracing::info!(user_id = %user_id.to_hex(), "Successful login");

        let mut user = user;
        user.last_login_at = Some(now);
        Ok((token, user))
    }

    fn issue_token(&self, user_id: &ObjectId, user: &User) -> ServiceResult<String> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user_id.to_hex(),
            email: user.email.clone(),
            role: user.role,
            exp: (now + Duration::seconds(self.token_ttl_seconds)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        self.jwt_service
            .generate_token(&claims)
            .map_err(|e| anyhow!("Failed to generate token: {}", e).into())
    }

    pub async fn get_user(&self, user_id: &ObjectId) -> ServiceResult<User> {
        self.users
            .find_one(doc! { "_id": user_id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| ServiceError::not_found("User not found"))
    }

    /// Stores a hashed six digit code and mails it. Unknown addresses are silently ignored.
    pub async fn forgot_password(&self, email: &str, mailer: &dyn Mailer) -> ServiceResult<()> {
        let email = normalize_email(email);
        let user = self
            .users
            .find_one(doc! { "email": &email, "is_active": true })
            .await
            .context("Failed to query user")?;

        let Some(user) = user else {
            tracing::info!("Password reset requested for unknown or inactive email");
            return Ok(());
        };

        let code = generate_reset_code();
        let expiry = Utc::now() + Duration::minutes(RESET_CODE_TTL_MINUTES);
        self.users
            .update_one(
                doc! { "_id": user.id },
                doc! { "$set": {
                    "reset_token": hash_secret(&code),
                    "reset_token_expiry": BsonDateTime::from_millis(expiry.timestamp_millis()),
                } },
            )
            .await
            .context("Failed to store reset code")?;

        match mailer.send(reset_code_email(&user.email, &user.name, &code)).await {
            Ok(()) => PASSWORD_RESET_EMAILS_TOTAL.with_label_values(&["sent"]).inc(),
            Err(e) => {
                PASSWORD_RESET_EMAILS_TOTAL.with_label_values(&["failed"]).inc();
                return Err(e.context("Failed to send reset code email").into());
            }
        }
        Ok(())
    }

    /// Exchanges a valid code for a short-lived reset token.
    pub async fn verify_reset_code(
        &self,
        req: VerifyResetCodeRequest,
    ) -> ServiceResult<VerifyResetCodeResponse> {
        let email = normalize_email(&req.email);
        let code = req.code.trim();
        if email.is_empty() || code.is_empty() {
            return Err(ServiceError::bad_request("Email and reset code are required"));
        }
        if !RESET_CODE_RE.is_match(code) {
            return Err(ServiceError::bad_request("Reset code must be 6 digits"));
        }

        let user = self
            .users
            .find_one(doc! { "email": &email, "reset_token": hash_secret(code) })
            .await
            .context("Failed to query reset code")?
            .ok_or_else(|| ServiceError::bad_request("Invalid reset code or email"))?;

        let now = Utc::now();
        if user.reset_token_expiry.map(|expiry| now > expiry).unwrap_or(true) {
            self.clear_reset_fields(&user).await?;
            return Err(ServiceError::bad_request(
                "Reset code has expired. Please request a new one",
            ));
        }

        let token = generate_reset_token();
        let expires_at = now + Duration::minutes(RESET_TOKEN_TTL_MINUTES);
        self.users
            .update_one(
                doc! { "_id": user.id },
                doc! { "$set": {
                    "reset_token": hash_secret(&token),
                    "reset_token_expiry": BsonDateTime::from_millis(expires_at.timestamp_millis()),
                } },
            )
            .await
            .context("Failed to store reset token")?;

        Ok(VerifyResetCodeResponse {
            message: "Reset code verified successfully".to_string(),
            reset_token: token,
            expires_at,
        })
    }

    pub async fn reset_password(&self, req: ResetPasswordRequest) -> ServiceResult<()> {
        let token = req.token.trim();
        if token.is_empty() || req.password.is_empty() || req.confirm_password.is_empty() {
            return Err(ServiceError::bad_request("All fields are required"));
        }
        if req.password != req.confirm_password {
            return Err(ServiceError::bad_request("Passwords do not match"));
        }
        if req.password.chars().count() < 6 {
            return Err(ServiceError::bad_request(
                "Password must be at least 6 characters long",
            ));
        }

        let mut filter = doc! { "reset_token": hash_secret(token) };
        if let Some(email) = req.email.as_deref().filter(|e| !e.trim().is_empty()) {
            filter.insert("email", normalize_email(email));
        }

        let user = self
            .users
            .find_one(filter)
            .await
            .context("Failed to query reset token")?
            .ok_or_else(|| ServiceError::bad_request("Invalid or expired reset token"))?;

        if user.reset_token_expiry.map(|expiry| Utc::now() > expiry).unwrap_or(true) {
            self.clear_reset_fields(&user).await?;
            return Err(ServiceError::bad_request(
                "Reset session has expired. Please start over",
            ));
        }

        let password_hash = Self::hash_password(&req.password)?;
        self.users
            .update_one(
                doc! { "_id": user.id },
                doc! {
                    "$set": {
                        "password_hash": password_hash,
                        "updated_at": BsonDateTime::now(),
                    },
                    "$unset": { "reset_token": "", "reset_token_expiry": "" },
                },
            )
            .await
            .context("Failed to update password")?;

        if let Err(e) = self.clear_failed_attempts(&user.email).await {
            tracing::warn!(error = %e, "Failed to clear login attempt counter");
        }
        tracing::info!(user_id = %crate::models::id_hex(&user.id), "Password reset completed");
        Ok(())
    }

    async fn clear_reset_fields(&self, user: &User) -> ServiceResult<()> {
        self.users
            .update_one(
                doc! { "_id": user.id },
                doc! { "$unset": { "reset_token": "", "reset_token_expiry": "" } },
            )
            .await
            .context("Failed to clear reset fields")?;
        Ok(())
    }

    /// True when the account is locked after repeated failures.
    pub async fn check_failed_attempts(&self, email: &str) -> anyhow::Result<bool> {
        let key = format!("failed_login:{}", email);
        let mut conn = self.redis.clone();
        let count: Option<u32> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .context("Failed to read failed login counter")?;
        Ok(count.unwrap_or(0) >= MAX_FAILED_LOGINS)
    }

    pub async fn increment_failed_attempts(&self, email: &str) -> anyhow::Result<u32> {
        let key = format!("failed_login:{}", email);
        let mut conn = self.redis.clone();
        let count: u32 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .context("Failed to increment failed login counter")?;
        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(FAILED_LOGIN_WINDOW_SECONDS)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to set failed login counter expiry")?;
        }
        Ok(count)
    }

    pub async fn clear_failed_attempts(&self, email: &str) -> anyhow::Result<()> {
        let key = format!("failed_login:{}", email);
        let mut conn = self.redis.clone();
        redis::cmd("DEL")
            .arg(&key)
            .query_async::<()>(&mut conn)
            .await
            .context("Failed to clear failed login counter")?;
        Ok(())
    }
}
