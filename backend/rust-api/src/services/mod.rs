use crate::config::Config;
use anyhow::Context;
use mongodb::{
    bson::{doc, Document},
    options::IndexOptions,
    Client as MongoClient, Database, IndexModel,
};
use redis::aio::ConnectionManager;

pub mod achievement_service;
pub mod aggregation;
pub mod attempt_service;
pub mod auth_service;
pub mod category_service;
pub mod child_service;
pub mod dashboard_service;
pub mod email_service;
pub mod error;
pub mod insights;
pub mod notification_service;
pub mod question_service;
pub mod scoring;
pub mod seed;
pub mod settings_service;
pub mod statistics_service;
pub mod test_service;
pub mod user_service;
pub mod video_progress_service;
pub mod video_service;
pub mod youtube_service;

pub use error::{ServiceError, ServiceResult};

pub const USERS: &str = "users";
pub const CHILDREN: &str = "children";
pub const VIDEOS: &str = "videos";
pub const VIDEO_CATEGORIES: &str = "video_categories";
pub const VIDEO_PROGRESS: &str = "video_progress";
pub const TESTS: &str = "tests";
pub const QUESTIONS: &str = "questions";
pub const TEST_ATTEMPTS: &str = "test_attempts";
pub const USER_ANSWERS: &str = "user_answers";
pub const ACHIEVEMENTS: &str = "achievements";
pub const USER_ACHIEVEMENTS: &str = "user_achievements";
pub const NOTIFICATIONS: &str = "notifications";
pub const APP_SETTINGS: &str = "app_settings";

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub redis: ConnectionManager,
    pub http: reqwest::Client,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            config,
            mongo,
            redis,
            http,
        })
    }
}

/// Creates the unique indexes the data model relies on. Safe to run on every start.
pub async fn ensure_indexes(mongo: &Database) -> anyhow::Result<()> {
    let unique: [(&str, Document); 8] = [
        (USERS, doc! { "email": 1 }),
        (TESTS, doc! { "video_id": 1 }),
        (USER_ANSWERS, doc! { "test_attempt_id": 1, "question_id": 1 }),
        (USER_ACHIEVEMENTS, doc! { "user_id": 1, "achievement_id": 1 }),
        (VIDEO_PROGRESS, doc! { "user_id": 1, "video_id": 1 }),
        (ACHIEVEMENTS, doc! { "name": 1 }),
        (APP_SETTINGS, doc! { "key": 1 }),
        (VIDEO_CATEGORIES, doc! { "name": 1 }),
    ];

    for (collection, keys) in unique {
        let model = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build();
        mongo
            .collection::<Document>(collection)
            .create_index(model)
            .await
            .with_context(|| format!("Failed to create unique index on {}", collection))?;
    }

    let lookups: [(&str, Document); 4] = [
        (TEST_ATTEMPTS, doc! { "user_id": 1, "test_id": 1, "is_completed": 1 }),
        (TEST_ATTEMPTS, doc! { "started_at": -1 }),
        (CHILDREN, doc! { "parent_id": 1 }),
        (NOTIFICATIONS, doc! { "user_id": 1, "created_at": -1 }),
    ];

    for (collection, keys) in lookups {
        let model = IndexModel::builder().keys(keys).build();
        mongo
            .collection::<Document>(collection)
            .create_index(model)
            .await
            .with_context(|| format!("Failed to create index on {}", collection))?;
    }

    tracing::info!("MongoDB indexes ensured");
    Ok(())
}
