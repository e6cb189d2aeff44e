use axum_extra::extract::cookie::SameSite;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app_env: String,
    pub bind_addr: String,
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub jwt_ttl_seconds: i64,
    pub cookie: CookieSettings,
    pub mail: MailSettings,
    pub youtube_api_key: Option<String>,
    pub admin_seed: Option<AdminSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieSettings {
    pub secure: bool,
    pub same_site: String,
}

impl CookieSettings {
    pub fn parse_same_site(&self) -> SameSite {
        match self.same_site.to_ascii_lowercase().as_str() {
            "strict" => SameSite::Strict,
            "none" => SameSite::None,
            _ => SameSite::Lax,
        }
    }
}

/// SMTP credentials for outgoing mail (password reset codes).
#[derive(Debug, Clone, Deserialize)]
pub struct MailSettings {
    pub server: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub use_tls: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub name: String,
}

const DEV_JWT_SECRET: &str = "dev-secret-only-for-local-testing";

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first (two levels up), then the crate-local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env || dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml + APP_ env overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let lookup = |key: &str, env_key: &str| -> Option<String> {
            settings
                .get_string(key)
                .ok()
                .or_else(|| env::var(env_key).ok())
                .filter(|value| !value.trim().is_empty())
        };

        let mongo_uri = lookup("database.mongo_uri", "MONGO_URI")
            .unwrap_or_else(|| "mongodb://localhost:27017".to_string());

        let mongo_database =
            lookup("database.mongo_database", "MONGO_DATABASE").unwrap_or_else(|| "sicegah".to_string());

        let redis_uri =
            lookup("redis.uri", "REDIS_URI").unwrap_or_else(|| "redis://127.0.0.1:6379/0".to_string());

        let jwt_secret = match lookup("auth.jwt_secret", "JWT_SECRET") {
            Some(secret) => secret,
            None if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            None => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                DEV_JWT_SECRET.to_string()
            }
        };

        let jwt_ttl_seconds = lookup("auth.jwt_ttl_seconds", "JWT_TTL_SECONDS")
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(7 * 24 * 3600);

        let cookie = CookieSettings {
            secure: lookup("cookie.secure", "COOKIE_SECURE")
                .map(|value| parse_bool(&value))
                .unwrap_or(app_env == "prod"),
            same_site: lookup("cookie.same_site", "COOKIE_SAME_SITE")
                .unwrap_or_else(|| "lax".to_string()),
        };

        let mail = MailSettings {
            server: lookup("mail.server", "SMTP_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: lookup("mail.port", "SMTP_PORT")
                .and_then(|value| value.parse::<u16>().ok())
                .unwrap_or(587),
            login: lookup("mail.login", "SMTP_USERNAME").unwrap_or_default(),
            password: lookup("mail.password", "SMTP_PASSWORD").unwrap_or_default(),
            from_email: lookup("mail.from_email", "SMTP_FROM_EMAIL")
                .unwrap_or_else(|| "no-reply@sicegah.id".to_string()),
            from_name: lookup("mail.from_name", "SMTP_FROM_NAME")
                .unwrap_or_else(|| "Si Cegah".to_string()),
            use_tls: lookup("mail.use_tls", "SMTP_USE_TLS")
                .map(|value| parse_bool(&value))
                .unwrap_or(true),
        };

        let youtube_api_key = lookup("youtube.api_key", "YOUTUBE_API_KEY");

        let admin_seed = match (
            lookup("admin.email", "ADMIN_EMAIL"),
            lookup("admin.password", "ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(AdminSeed {
                email,
                password,
                name: lookup("admin.name", "ADMIN_NAME")
                    .unwrap_or_else(|| "Administrator".to_string()),
            }),
            _ => None,
        };

        let bind_addr = lookup("server.bind_addr", "BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8081".to_string());

        Ok(Config {
            app_env,
            bind_addr,
            mongo_uri,
            redis_uri,
            mongo_database,
            jwt_secret,
            jwt_ttl_seconds,
            cookie,
            mail,
            youtube_api_key,
            admin_seed,
        })
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
