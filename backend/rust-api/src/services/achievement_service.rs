use anyhow::{anyhow, Context};
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::{Collection, Database};

use crate::metrics::ACHIEVEMENTS_UNLOCKED_TOTAL;
use crate::models::achievement::{qualifying_achievements, Achievement, UserAchievement};
use crate::services::error::is_duplicate_key;
use crate::services::{ServiceResult, ACHIEVEMENTS, TEST_ATTEMPTS, USER_ACHIEVEMENTS};
use crate::utils::time::bson_now;

pub struct AchievementService {
    achievements: Collection<Achievement>,
    user_achievements: Collection<UserAchievement>,
    attempts: Collection<mongodb::bson::Document>,
}

impl AchievementService {
    pub fn new(mongo: &Database) -> Self {
        Self {
            achievements: mongo.collection(ACHIEVEMENTS),
            user_achievements: mongo.collection(USER_ACHIEVEMENTS),
            attempts: mongo.collection(TEST_ATTEMPTS),
        }
    }

    /// Checks the thresholds after a completed attempt and returns newly earned names.
    pub async fn check_after_completion(
        &self,
        user_id: &ObjectId,
        score: i32,
    ) -> ServiceResult<Vec<String>> {
        let completed_tests = self
            .attempts
            .count_documents(doc! { "user_id": user_id, "is_completed": true })
            .await
            .context("Failed to count completed attempts")?;

        let mut unlocked = Vec::new();
        for name in qualifying_achievements(completed_tests, score) {
            if self.unlock(user_id, name).await? {
                unlocked.push(name.to_string());
            }
        }
        Ok(unlocked)
    }

    /// Idempotent per (user, achievement). Returns true only on the first unlock.
    pub async fn unlock(&self, user_id: &ObjectId, name: &str) -> ServiceResult<bool> {
        let Some(achievement) = self
            .achievements
            .find_one(doc! { "name": name })
            .await
            .context("Failed to query achievement")?
        else {
            tracing::warn!(achievement = %name, "Achievement missing from catalogue");
            return Ok(false);
        };
        let achievement_id = achievement
            .id
            .ok_or_else(|| anyhow!("Achievement ID not found"))?;

        let result = self
            .user_achievements
            .update_one(
                doc! { "user_id": user_id, "achievement_id": achievement_id },
                doc! { "$setOnInsert": {
                    "progress": achievement.requirement,
                    "is_completed": true,
                    "earned_at": bson_now(),
                } },
            )
            .upsert(true)
            .await;

        let newly_unlocked = match result {
            Ok(update) => update.upserted_id.is_some(),
            // A concurrent completion inserted the same row first
            Err(e) if is_duplicate_key(&e) => false,
            Err(e) => return Err(anyhow!(e).context("Failed to unlock achievement").into()),
        };

        if newly_unlocked {
            ACHIEVEMENTS_UNLOCKED_TOTAL.with_label_values(&[name]).inc();
            tracing::info!(user_id = %user_id.to_hex(), achievement = %name, "Achievement unlocked");
        }
        Ok(newly_unlocked)
    }
}
