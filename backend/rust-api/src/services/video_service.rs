use std::collections::HashMap;

use anyhow::{anyhow, Context};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::{Collection, Database};

use crate::metrics::track_db_operation;
use crate::models::non_blank;
use crate::models::test::Test;
use crate::models::video::{
    is_valid_youtube_id, thumbnail_url, CategorySummary, CreateVideoRequest, ListVideosQuery,
    ProgressCounts, UpdateVideoRequest, Video, VideoCategory, VideoDetailResponse, VideoResponse,
    VideoStats, VideoTestSummary,
};
use crate::services::aggregation::number_field;
use crate::services::error::{parse_object_id, required_text};
use crate::services::youtube_service::YoutubeService;
use crate::services::{ServiceError, ServiceResult, TESTS, VIDEOS, VIDEO_CATEGORIES, VIDEO_PROGRESS};
use crate::utils::time::bson_now;

fn checked_youtube_id(value: &str) -> ServiceResult<String> {
    let value = value.trim();
    if !is_valid_youtube_id(value) {
        return Err(ServiceError::bad_request(
            "YouTube ID must be 11 characters of letters, digits, '-' or '_'",
        ));
    }
    Ok(value.to_string())
}

fn checked_age_range(min_age: Option<i32>, max_age: Option<i32>) -> ServiceResult<()> {
    if let (Some(min), Some(max)) = (min_age, max_age) {
        if min > max {
            return Err(ServiceError::bad_request(
                "Minimum age must not exceed maximum age",
            ));
        }
    }
    Ok(())
}

pub struct VideoService {
    mongo: Database,
    videos: Collection<Video>,
    categories: Collection<VideoCategory>,
    tests: Collection<Test>,
}

impl VideoService {
    pub fn new(mongo: &Database) -> Self {
        Self {
            mongo: mongo.clone(),
            videos: mongo.collection(VIDEOS),
            categories: mongo.collection(VIDEO_CATEGORIES),
            tests: mongo.collection(TESTS),
        }
    }

    async fn find(&self, id: &ObjectId) -> ServiceResult<Video> {
        self.videos
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query video")?
            .ok_or_else(|| ServiceError::not_found("Video not found"))
    }

    /// Resolves a body `categoryId`, which must name an existing category.
    async fn existing_category(&self, raw: &str) -> ServiceResult<ObjectId> {
        let id = parse_object_id(raw, "categoryId")?;
        let exists = self
            .categories
            .count_documents(doc! { "_id": id })
            .await
            .context("Failed to query category")?;
        if exists == 0 {
            return Err(ServiceError::bad_request("Category not found"));
        }
        Ok(id)
    }

    async fn category_summaries(
        &self,
        ids: Vec<ObjectId>,
    ) -> ServiceResult<HashMap<ObjectId, CategorySummary>> {
        let categories: Vec<VideoCategory> = self
            .categories
            .find(doc! { "_id": { "$in": ids } })
            .await
            .context("Failed to query categories")?
            .try_collect()
            .await
            .context("Failed to read categories")?;
        Ok(categories
            .iter()
            .filter_map(|c| c.id.map(|id| (id, CategorySummary::from(c))))
            .collect())
    }

    async fn test_summaries(
        &self,
        video_ids: Vec<ObjectId>,
    ) -> ServiceResult<HashMap<ObjectId, VideoTestSummary>> {
        let tests: Vec<Test> = self
            .tests
            .find(doc! { "video_id": { "$in": video_ids } })
            .await
            .context("Failed to query tests")?
            .try_collect()
            .await
            .context("Failed to read tests")?;
        Ok(tests
            .into_iter()
            .filter_map(|t| {
                let id = t.id?;
                Some((
                    t.video_id,
                    VideoTestSummary {
                        id: id.to_hex(),
                        title: t.title,
                        description: t.description,
                    },
                ))
            })
            .collect())
    }

    async fn to_response(&self, video: Video) -> ServiceResult<VideoResponse> {
        let video_id = video.id.ok_or_else(|| anyhow!("Video ID not found"))?;
        let mut categories = self
            .category_summaries(video.category_id.into_iter().collect())
            .await?;
        let mut tests = self.test_summaries(vec![video_id]).await?;
        let category = video.category_id.and_then(|id| categories.remove(&id));
        Ok(VideoResponse::new(video, category, tests.remove(&video_id)))
    }

    pub async fn list(&self, query: ListVideosQuery) -> ServiceResult<Vec<VideoResponse>> {
        let mut filter = doc! {};
        if let Some(category_id) = non_blank(query.category_id) {
            filter.insert("category_id", parse_object_id(&category_id, "categoryId")?);
        }
        if let Some(is_active) = query.is_active {
            filter.insert("is_active", is_active);
        }

        let videos: Vec<Video> = track_db_operation("find", VIDEOS, async {
            let cursor = self
                .videos
                .find(filter)
                .sort(doc! { "order": 1, "created_at": -1 })
                .await?;
            cursor.try_collect::<Vec<Video>>().await
        })
        .await
        .context("Failed to load videos")?;

        let category_ids: Vec<ObjectId> = videos.iter().filter_map(|v| v.category_id).collect();
        let video_ids: Vec<ObjectId> = videos.iter().filter_map(|v| v.id).collect();
        let (categories, mut tests) = tokio::try_join!(
            self.category_summaries(category_ids),
            self.test_summaries(video_ids),
        )?;

        Ok(videos
            .into_iter()
            .map(|video| {
                let category = video.category_id.and_then(|id| categories.get(&id).cloned());
                let test = video.id.and_then(|id| tests.remove(&id));
                VideoResponse::new(video, category, test)
            })
            .collect())
    }

    pub async fn get(&self, id: &ObjectId) -> ServiceResult<VideoDetailResponse> {
        let video = self.find(id).await?;

        let progress = self.mongo.collection::<Document>(VIDEO_PROGRESS);
        let (total, completed) = tokio::try_join!(
            async { progress.count_documents(doc! { "video_id": id }).await },
            async {
                progress
                    .count_documents(doc! { "video_id": id, "is_completed": true })
                    .await
            },
        )
        .context("Failed to count video progress")?;

        Ok(VideoDetailResponse {
            video: self.to_response(video).await?,
            progress: ProgressCounts { total, completed },
        })
    }

    pub async fn create(
        &self,
        req: CreateVideoRequest,
        youtube: &YoutubeService<'_>,
    ) -> ServiceResult<VideoResponse> {
        let title = required_text(&req.title, "Title is required")?;
        let youtube_id = checked_youtube_id(&req.youtube_id)?;
        checked_age_range(req.min_age, req.max_age)?;
        let category_id = match non_blank(req.category_id) {
            Some(raw) => Some(self.existing_category(&raw).await?),
            None => None,
        };

        let now = Utc::now();
        let mut video = Video {
            id: None,
            title,
            description: non_blank(req.description),
            thumbnail_url: thumbnail_url(&youtube_id),
            duration: youtube.duration_seconds(&youtube_id).await,
            youtube_id,
            category_id,
            min_age: req.min_age,
            max_age: req.max_age,
            target_role: req.target_role.unwrap_or_default(),
            order: req.order.unwrap_or(0),
            is_active: req.is_active.unwrap_or(true),
            view_count: 0,
            created_at: now,
            updated_at: now,
        };

        let inserted = self
            .videos
            .insert_one(&video)
            .await
            .context("Failed to insert video")?;
        video.id = inserted.inserted_id.as_object_id();

        tracing::info!(video_id = %crate::models::id_hex(&video.id), youtube_id = %video.youtube_id, "Video created");
        self.to_response(video).await
    }

    pub async fn update(
        &self,
        id: &ObjectId,
        req: UpdateVideoRequest,
        youtube: &YoutubeService<'_>,
    ) -> ServiceResult<VideoResponse> {
        let existing = self.find(id).await?;
        checked_age_range(
            req.min_age.or(existing.min_age),
            req.max_age.or(existing.max_age),
        )?;

        let mut set = doc! { "updated_at": bson_now() };
        if let Some(title) = req.title {
            set.insert("title", required_text(&title, "Title must not be empty")?);
        }
        if let Some(description) = req.description {
            set.insert("description", description);
        }
        if let Some(raw) = req.youtube_id {
            let youtube_id = checked_youtube_id(&raw)?;
            if youtube_id != existing.youtube_id {
                set.insert("thumbnail_url", thumbnail_url(&youtube_id));
                let duration = youtube.duration_seconds(&youtube_id).await;
                set.insert("duration", duration.map(Bson::Int64).unwrap_or(Bson::Null));
            }
            set.insert("youtube_id", youtube_id);
        }
        if let Some(raw) = req.category_id {
            match non_blank(Some(raw)) {
                Some(raw) => set.insert("category_id", self.existing_category(&raw).await?),
                None => set.insert("category_id", Bson::Null),
            };
        }
        for (field, value) in [
            ("min_age", req.min_age),
            ("max_age", req.max_age),
            ("order", req.order),
        ] {
            if let Some(value) = value {
                set.insert(field, value);
            }
        }
        if let Some(target_role) = req.target_role {
            let roles: Vec<&str> = target_role.iter().map(|r| r.as_str()).collect();
            set.insert("target_role", roles);
        }
        if let Some(is_active) = req.is_active {
            set.insert("is_active", is_active);
        }

        self.videos
            .update_one(doc! { "_id": id }, doc! { "$set": set })
            .await
            .context("Failed to update video")?;

        let video = self.find(id).await?;
        self.to_response(video).await
    }

    pub async fn delete(&self, id: &ObjectId) -> ServiceResult<()> {
        self.find(id).await?;

        let attached = self
            .tests
            .count_documents(doc! { "video_id": id })
            .await
            .context("Failed to query video tests")?;
        if attached > 0 {
            return Err(ServiceError::bad_request(
                "Cannot delete video with an attached test. Delete the test first.",
            ));
        }

        self.videos
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete video")?;
        tracing::info!(video_id = %id.to_hex(), "Video deleted");
        Ok(())
    }

    pub async fn stats(&self) -> ServiceResult<VideoStats> {
        let views_pipeline = vec![doc! { "$group": {
            "_id": null,
            "total_views": { "$sum": "$view_count" },
        } }];
        let raw_videos = self.videos.clone_with_type::<Document>();

        let (total_videos, active_videos, videos_with_tests, mut cursor) = tokio::try_join!(
            async { self.videos.count_documents(doc! {}).await },
            async { self.videos.count_documents(doc! { "is_active": true }).await },
            async { self.tests.count_documents(doc! {}).await },
            async { raw_videos.aggregate(views_pipeline).await },
        )
        .context("Failed to compute video stats")?;

        let total_views = cursor
            .try_next()
            .await
            .context("Failed to read video views")?
            .map(|row| number_field(&row, "total_views"))
            .unwrap_or(0);

        Ok(VideoStats {
            total_videos,
            active_videos,
            total_views,
            videos_with_tests,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_ids_are_trimmed_and_checked() {
        assert_eq!(checked_youtube_id(" dQw4w9WgXcQ ").unwrap(), "dQw4w9WgXcQ");
        assert!(checked_youtube_id("https://youtu.be/x").is_err());
    }

    #[test]
    fn age_range_must_be_ordered() {
        assert!(checked_age_range(Some(0), Some(24)).is_ok());
        assert!(checked_age_range(Some(12), None).is_ok());
        assert!(checked_age_range(Some(24), Some(6)).is_err());
    }
}
