use anyhow::Context;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    Collection, Database,
};

use crate::models::settings::{setting_description, AppSetting, AppSettings, UpdateSettingsRequest};
use crate::services::{ServiceError, ServiceResult, APP_SETTINGS};

pub struct SettingsService {
    collection: Collection<AppSetting>,
}

impl SettingsService {
    pub fn new(mongo: &Database) -> Self {
        Self {
            collection: mongo.collection(APP_SETTINGS),
        }
    }

    /// Stored rows merged over the defaults.
    pub async fn current(&self) -> ServiceResult<AppSettings> {
        let rows: Vec<AppSetting> = self
            .collection
            .find(doc! {})
            .await
            .context("Failed to query settings")?
            .try_collect()
            .await
            .context("Failed to read settings")?;
        Ok(AppSettings::merge_rows(&rows))
    }

    pub async fn update(&self, req: UpdateSettingsRequest) -> ServiceResult<AppSettings> {
        req.validate_ranges().map_err(ServiceError::BadRequest)?;

        let now = BsonDateTime::from_millis(Utc::now().timestamp_millis());
        for (key, value) in req.into_rows() {
            self.collection
                .update_one(
                    doc! { "key": key },
                    doc! {
                        "$set": { "value": value, "updated_at": now },
                        "$setOnInsert": { "description": setting_description(key) },
                    },
                )
                .upsert(true)
                .await
                .with_context(|| format!("Failed to upsert setting {}", key))?;
            tracing::info!(setting = key, "Setting updated");
        }

        self.current().await
    }
}
