use std::collections::HashMap;

use anyhow::Context;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::{Collection, Database};

use crate::metrics::track_db_operation;
use crate::models::attempt::TestAttempt;
use crate::models::dashboard::{activity_action, percentage_of, DashboardStats, RecentActivity, RoleCount};
use crate::models::test::Test;
use crate::models::user::{User, UserRole};
use crate::models::video::Video;
use crate::services::aggregation::number_field;
use crate::services::{ServiceResult, TESTS, TEST_ATTEMPTS, USERS, VIDEOS};
use crate::utils::time::time_ago;

const RECENT_ACTIVITY_LIMIT: i64 = 4;

pub struct DashboardService {
    users: Collection<User>,
    videos: Collection<Video>,
    tests: Collection<Test>,
    attempts: Collection<TestAttempt>,
}

impl DashboardService {
    pub fn new(mongo: &Database) -> Self {
        Self {
            users: mongo.collection(USERS),
            videos: mongo.collection(VIDEOS),
            tests: mongo.collection(TESTS),
            attempts: mongo.collection(TEST_ATTEMPTS),
        }
    }

    pub async fn stats(&self) -> ServiceResult<DashboardStats> {
        let (total_users, total_videos, total_tests, completed_tests, users_by_role, recent) = tokio::try_join!(
            async { self.users.count_documents(doc! { "is_active": true }).await },
            async { self.videos.count_documents(doc! { "is_active": true }).await },
            async { self.tests.count_documents(doc! { "is_active": true }).await },
            async {
                self.attempts
                    .count_documents(doc! { "is_completed": true, "is_passed": true })
                    .await
            },
            self.role_counts(),
            self.recent_attempts(),
        )
        .context("Failed to load dashboard stats")?;

        let recent_activities = self.describe(recent).await?;

        Ok(DashboardStats {
            total_users,
            total_videos,
            total_tests,
            completed_tests,
            users_by_role,
            recent_activities,
        })
    }

    async fn role_counts(&self) -> Result<Vec<RoleCount>, mongodb::error::Error> {
        let pipeline = vec![
            doc! { "$match": { "is_active": true } },
            doc! { "$group": { "_id": "$role", "count": { "$sum": 1 } } },
        ];
        let rows: Vec<Document> = track_db_operation("aggregate", USERS, async {
            let cursor = self.users.aggregate(pipeline).await?;
            cursor.try_collect::<Vec<Document>>().await
        })
        .await?;

        let counts: HashMap<UserRole, u64> = rows
            .iter()
            .filter_map(|row| {
                let role = row.get_str("_id").ok()?.parse::<UserRole>().ok()?;
                Some((role, number_field(row, "count").max(0) as u64))
            })
            .collect();
        let total: u64 = counts.values().sum();

        Ok(UserRole::ALL
            .into_iter()
            .filter_map(|role| {
                let count = *counts.get(&role)?;
                Some(RoleCount {
                    role,
                    count,
                    percentage: percentage_of(count, total),
                })
            })
            .collect())
    }

    async fn recent_attempts(&self) -> Result<Vec<TestAttempt>, mongodb::error::Error> {
        track_db_operation("find", TEST_ATTEMPTS, async {
            let cursor = self
                .attempts
                .find(doc! { "is_completed": true, "completed_at": { "$ne": null } })
                .sort(doc! { "completed_at": -1 })
                .limit(RECENT_ACTIVITY_LIMIT)
                .await?;
            cursor.try_collect::<Vec<TestAttempt>>().await
        })
        .await
    }

    /// Resolves user names and video titles for the activity feed.
    async fn describe(&self, attempts: Vec<TestAttempt>) -> ServiceResult<Vec<RecentActivity>> {
        let user_ids: Vec<ObjectId> = attempts.iter().map(|a| a.user_id).collect();
        let test_ids: Vec<ObjectId> = attempts.iter().map(|a| a.test_id).collect();

        let (users, tests) = tokio::try_join!(
            async {
                self.users
                    .find(doc! { "_id": { "$in": &user_ids } })
                    .await?
                    .try_collect::<Vec<User>>()
                    .await
            },
            async {
                self.tests
                    .find(doc! { "_id": { "$in": &test_ids } })
                    .await?
                    .try_collect::<Vec<Test>>()
                    .await
            },
        )
        .context("Failed to load activity details")?;

        let video_ids: Vec<ObjectId> = tests.iter().map(|t| t.video_id).collect();
        let videos: Vec<Video> = self
            .videos
            .find(doc! { "_id": { "$in": video_ids } })
            .await
            .context("Failed to query videos")?
            .try_collect()
            .await
            .context("Failed to read videos")?;

        let names: HashMap<ObjectId, String> = users
            .into_iter()
            .filter_map(|u| u.id.map(|id| (id, u.name)))
            .collect();
        let video_titles: HashMap<ObjectId, String> = videos
            .into_iter()
            .filter_map(|v| v.id.map(|id| (id, v.title)))
            .collect();
        let test_videos: HashMap<ObjectId, ObjectId> = tests
            .into_iter()
            .filter_map(|t| t.id.map(|id| (id, t.video_id)))
            .collect();

        let now = Utc::now();
        Ok(attempts
            .into_iter()
            .map(|attempt| {
                let title = test_videos
                    .get(&attempt.test_id)
                    .and_then(|video_id| video_titles.get(video_id))
                    .map(String::as_str)
                    .unwrap_or("Unknown");
                RecentActivity {
                    user: names
                        .get(&attempt.user_id)
                        .cloned()
                        .unwrap_or_else(|| "Unknown".to_string()),
                    action: activity_action(attempt.is_passed, title),
                    time: time_ago(attempt.completed_at.unwrap_or(attempt.started_at), now),
                }
            })
            .collect())
    }
}
