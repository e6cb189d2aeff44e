use anyhow::{anyhow, Context};
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};

use crate::models::video::{RecordProgressRequest, Video, VideoProgress, VideoProgressResponse};
use crate::services::error::{is_duplicate_key, parse_object_id};
use crate::services::{ServiceError, ServiceResult, VIDEOS, VIDEO_PROGRESS};
use crate::utils::time::bson_now;

pub struct VideoProgressService {
    videos: Collection<Video>,
    progress: Collection<VideoProgress>,
}

impl VideoProgressService {
    pub fn new(mongo: &Database) -> Self {
        Self {
            videos: mongo.collection(VIDEOS),
            progress: mongo.collection(VIDEO_PROGRESS),
        }
    }

    /// Upserts the caller's progress. The first record for a video counts as a view.
    pub async fn record(
        &self,
        user_id: &ObjectId,
        req: RecordProgressRequest,
    ) -> ServiceResult<VideoProgressResponse> {
        if req.video_id.trim().is_empty() {
            return Err(ServiceError::bad_request("Video ID is required"));
        }
        let video_id = parse_object_id(&req.video_id, "videoId")?;
        if req.watched_duration.is_some_and(|d| d < 0) {
            return Err(ServiceError::bad_request("Watched duration must not be negative"));
        }

        let exists = self
            .videos
            .count_documents(doc! { "_id": video_id })
            .await
            .context("Failed to query video")?;
        if exists == 0 {
            return Err(ServiceError::not_found("Video not found"));
        }

        let now = bson_now();
        let mut set = doc! { "updated_at": now };
        let mut set_on_insert = doc! { "created_at": now };
        match req.watched_duration {
            Some(duration) => set.insert("watched_duration", duration),
            None => set_on_insert.insert("watched_duration", 0_i64),
        };
        match req.is_completed {
            Some(completed) => set.insert("is_completed", completed),
            None => set_on_insert.insert("is_completed", false),
        };

        let filter = doc! { "user_id": user_id, "video_id": video_id };
        let first_view = match self
            .progress
            .find_one_and_update(
                filter.clone(),
                doc! { "$set": set.clone(), "$setOnInsert": set_on_insert },
            )
            .upsert(true)
            .return_document(ReturnDocument::Before)
            .await
        {
            Ok(before) => before.is_none(),
            // Another first record won the unique (user, video) index and counted the view
            Err(e) if is_duplicate_key(&e) => {
                self.progress
                    .update_one(filter, doc! { "$set": set })
                    .await
                    .context("Failed to update video progress")?;
                false
            }
            Err(e) => return Err(anyhow!(e).context("Failed to upsert video progress").into()),
        };

        if first_view {
            self.videos
                .update_one(doc! { "_id": video_id }, doc! { "$inc": { "view_count": 1 } })
                .await
                .context("Failed to increment view count")?;
            tracing::debug!(video_id = %video_id.to_hex(), "First view recorded");
        }

        let progress = self
            .progress
            .find_one(doc! { "user_id": user_id, "video_id": video_id })
            .await
            .context("Failed to read video progress")?
            .ok_or_else(|| anyhow!("Video progress missing after upsert"))?;

        Ok(progress.into())
    }
}
