use std::collections::HashMap;

use anyhow::Context;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document, Regex};
use mongodb::{Collection, Database};

use crate::metrics::track_db_operation;
use crate::models::achievement::{
    Achievement, AchievementResponse, AchievementStats, EarnedAchievement, UserAchievement,
    UserAchievementsResponse,
};
use crate::models::child::{Child, ChildResponse};
use crate::models::non_blank;
use crate::models::user::{
    ListUsersQuery, ProfileResponse, UpdateProfileRequest, UpdateUserRequest, User,
    UserCounts, UserDetailResponse, UserListItem, UserResponse, UserRole,
};
use crate::services::aggregation::number_field;
use crate::services::auth_service::normalize_email;
use crate::services::error::{is_duplicate_key, required_text};
use crate::services::test_service::count_by;
use crate::services::{
    ServiceError, ServiceResult, ACHIEVEMENTS, CHILDREN, TEST_ATTEMPTS, USERS, USER_ACHIEVEMENTS,
    VIDEO_PROGRESS,
};
use crate::utils::time::bson_now;

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 100;

pub struct UserService {
    mongo: Database,
    users: Collection<User>,
}

impl UserService {
    pub fn new(mongo: &Database) -> Self {
        Self {
            mongo: mongo.clone(),
            users: mongo.collection(USERS),
        }
    }

    async fn find_user(&self, user_id: &ObjectId) -> ServiceResult<User> {
        self.users
            .find_one(doc! { "_id": user_id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| ServiceError::not_found("User not found"))
    }

    async fn counts(&self, user_id: &ObjectId) -> ServiceResult<UserCounts> {
        let children = self.mongo.collection::<Document>(CHILDREN);
        let attempts = self.mongo.collection::<Document>(TEST_ATTEMPTS);
        let progress = self.mongo.collection::<Document>(VIDEO_PROGRESS);

        let (children, test_attempts, video_progresses) = tokio::try_join!(
            async { children.count_documents(doc! { "parent_id": user_id }).await },
            async { attempts.count_documents(doc! { "user_id": user_id }).await },
            async { progress.count_documents(doc! { "user_id": user_id }).await },
        )
        .context("Failed to count user data")?;

        Ok(UserCounts {
            children,
            test_attempts,
            video_progresses,
        })
    }

    async fn children_of(&self, user_id: &ObjectId) -> ServiceResult<Vec<ChildResponse>> {
        let children: Vec<Child> = self
            .mongo
            .collection::<Child>(CHILDREN)
            .find(doc! { "parent_id": user_id })
            .sort(doc! { "created_at": -1 })
            .await
            .context("Failed to query children")?
            .try_collect()
            .await
            .context("Failed to read children")?;
        Ok(children.into_iter().map(ChildResponse::from).collect())
    }

    pub async fn list(&self, query: ListUsersQuery) -> ServiceResult<Vec<UserListItem>> {
        let mut filter = doc! {};

        if let Some(role) = query.role.as_deref().filter(|r| !r.eq_ignore_ascii_case("ALL")) {
            let role: UserRole = role.parse().map_err(ServiceError::BadRequest)?;
            filter.insert("role", role.as_str());
        }

        if let Some(is_active) = query.is_active {
            filter.insert("is_active", is_active);
        }

        if let Some(search) = non_blank(query.search) {
            let pattern = Regex {
                pattern: regex::escape(&search),
                options: "i".to_string(),
            };
            filter.insert(
                "$or",
                vec![doc! { "email": &pattern }, doc! { "name": &pattern }],
            );
        }

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE) as i64;
        let offset = query.offset.unwrap_or(0) as u64;

        let users: Vec<User> = track_db_operation("find", USERS, async {
            let cursor = self
                .users
                .find(filter)
                .sort(doc! { "created_at": -1 })
                .skip(offset)
                .limit(limit)
                .await?;
            cursor.try_collect::<Vec<User>>().await
        })
        .await
        .context("Failed to load users")?;

        let ids: Vec<ObjectId> = users.iter().filter_map(|u| u.id).collect();
        let children = self.mongo.collection::<Document>(CHILDREN);
        let attempts = self.mongo.collection::<Document>(TEST_ATTEMPTS);
        let progress = self.mongo.collection::<Document>(VIDEO_PROGRESS);
        let (children, attempts, progress) = tokio::try_join!(
            count_by(&children, "parent_id", &ids),
            count_by(&attempts, "user_id", &ids),
            count_by(&progress, "user_id", &ids),
        )?;

        Ok(users
            .into_iter()
            .map(|user| {
                let counts = match &user.id {
                    Some(id) => UserCounts {
                        children: children.get(id).copied().unwrap_or(0),
                        test_attempts: attempts.get(id).copied().unwrap_or(0),
                        video_progresses: progress.get(id).copied().unwrap_or(0),
                    },
                    None => UserCounts::default(),
                };
                UserListItem {
                    user: UserResponse::from(user),
                    counts,
                }
            })
            .collect())
    }

    pub async fn get(&self, user_id: &ObjectId) -> ServiceResult<UserDetailResponse> {
        let user = self.find_user(user_id).await?;
        let (counts, children) = tokio::try_join!(self.counts(user_id), self.children_of(user_id))?;

        Ok(UserDetailResponse {
            user: UserResponse::from(user),
            counts,
            children,
        })
    }

    pub async fn update(
        &self,
        user_id: &ObjectId,
        req: UpdateUserRequest,
    ) -> ServiceResult<UserResponse> {
        let existing = self.find_user(user_id).await?;
        let mut set = doc! { "updated_at": bson_now() };

        if let Some(email) = req.email.as_deref().map(normalize_email) {
            if email != existing.email {
                let taken = self
                    .users
                    .find_one(doc! { "email": &email, "_id": { "$ne": user_id } })
                    .await
                    .context("Failed to check email uniqueness")?;
                if taken.is_some() {
                    return Err(ServiceError::conflict("Email already in use"));
                }
            }
            set.insert("email", email);
        }
        if let Some(name) = req.name {
            set.insert("name", required_text(&name, "Name must not be empty")?);
        }
        if let Some(role) = req.role {
            set.insert("role", role.as_str());
        }
        if let Some(is_active) = req.is_active {
            set.insert("is_active", is_active);
        }
        for (field, value) in [
            ("phone", req.phone),
            ("province", req.province),
            ("city", req.city),
            ("address", req.address),
        ] {
            if let Some(value) = value {
                set.insert(field, value.trim());
            }
        }

        match self
            .users
            .update_one(doc! { "_id": user_id }, doc! { "$set": set })
            .await
        {
            Ok(_) => {}
            Err(e) if is_duplicate_key(&e) => {
                return Err(ServiceError::conflict("Email already in use"))
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to update user").into()),
        }

        tracing::info!(user_id = %user_id.to_hex(), "User updated");
        Ok(UserResponse::from(self.find_user(user_id).await?))
    }

    pub async fn delete(&self, user_id: &ObjectId) -> ServiceResult<()> {
        self.find_user(user_id).await?;

        let counts = self.counts(user_id).await?;
        if counts.children > 0 || counts.test_attempts > 0 {
            return Err(ServiceError::bad_request(
                "Cannot delete user with existing data. Deactivate instead.",
            ));
        }

        self.users
            .delete_one(doc! { "_id": user_id })
            .await
            .context("Failed to delete user")?;
        tracing::info!(user_id = %user_id.to_hex(), "User deleted");
        Ok(())
    }

    pub async fn profile(&self, user_id: &ObjectId) -> ServiceResult<ProfileResponse> {
        let user = self.find_user(user_id).await?;
        let children = self.children_of(user_id).await?;
        Ok(ProfileResponse {
            user: UserResponse::from(user),
            children,
        })
    }

    pub async fn update_profile(
        &self,
        user_id: &ObjectId,
        req: UpdateProfileRequest,
    ) -> ServiceResult<ProfileResponse> {
        self.find_user(user_id).await?;

        let mut set = doc! { "updated_at": bson_now() };
        if let Some(name) = req.name {
            set.insert("name", required_text(&name, "Name must not be empty")?);
        }
        for (field, value) in [
            ("phone", req.phone),
            ("province", req.province),
            ("city", req.city),
            ("address", req.address),
            ("profile_image", req.profile_image),
        ] {
            if let Some(value) = value {
                set.insert(field, value.trim());
            }
        }

        self.users
            .update_one(doc! { "_id": user_id }, doc! { "$set": set })
            .await
            .context("Failed to update profile")?;

        self.profile(user_id).await
    }

    /// Earned achievements, newest first, with completion stats.
    pub async fn achievements(&self, user_id: &ObjectId) -> ServiceResult<UserAchievementsResponse> {
        self.find_user(user_id).await?;

        let earned: Vec<UserAchievement> = self
            .mongo
            .collection::<UserAchievement>(USER_ACHIEVEMENTS)
            .find(doc! { "user_id": user_id })
            .sort(doc! { "earned_at": -1 })
            .await
            .context("Failed to query user achievements")?
            .try_collect()
            .await
            .context("Failed to read user achievements")?;

        let ids: Vec<ObjectId> = earned.iter().map(|ua| ua.achievement_id).collect();
        let mut catalogue: HashMap<ObjectId, Achievement> = self
            .mongo
            .collection::<Achievement>(ACHIEVEMENTS)
            .find(doc! { "_id": { "$in": ids } })
            .await
            .context("Failed to query achievements")?
            .try_collect::<Vec<Achievement>>()
            .await
            .context("Failed to read achievements")?
            .into_iter()
            .filter_map(|a| a.id.map(|id| (id, a)))
            .collect();

        let achievements = earned
            .into_iter()
            .map(|ua| EarnedAchievement {
                id: crate::models::id_hex(&ua.id),
                progress: ua.progress,
                is_completed: ua.is_completed,
                earned_at: ua.earned_at,
                achievement: catalogue.remove(&ua.achievement_id).map(AchievementResponse::from),
            })
            .collect();

        Ok(UserAchievementsResponse {
            achievements,
            stats: self.attempt_stats(user_id).await?,
        })
    }

    async fn attempt_stats(&self, user_id: &ObjectId) -> ServiceResult<AchievementStats> {
        let attempts = self.mongo.collection::<Document>(TEST_ATTEMPTS);
        let pipeline = vec![
            doc! { "$match": { "user_id": user_id, "is_completed": true } },
            doc! { "$group": {
                "_id": null,
                "completed": { "$sum": 1 },
                "perfect": { "$sum": { "$cond": [{ "$eq": ["$score", 100] }, 1, 0] } },
                "stars": { "$sum": "$star_rating" },
            } },
        ];

        let mut cursor = attempts
            .aggregate(pipeline)
            .await
            .context("Failed to aggregate attempt stats")?;

        let Some(row) = cursor
            .try_next()
            .await
            .context("Failed to read attempt stats")?
        else {
            return Ok(AchievementStats::default());
        };

        Ok(AchievementStats {
            completed_tests: number_field(&row, "completed") as u64,
            perfect_scores: number_field(&row, "perfect") as u64,
            total_stars: number_field(&row, "stars"),
        })
    }
}
