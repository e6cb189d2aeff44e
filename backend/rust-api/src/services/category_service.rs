use anyhow::{anyhow, Context};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::{Collection, Database};

use crate::models::non_blank;
use crate::models::video::{
    CategoryRequest, CategoryResponse, CategoryStatsResponse, Video, VideoCategory,
};
use crate::services::aggregation::number_field;
use crate::services::error::is_duplicate_key;
use crate::services::{ServiceError, ServiceResult, VIDEOS, VIDEO_CATEGORIES};
use crate::utils::time::bson_now;

pub struct CategoryService {
    categories: Collection<VideoCategory>,
    videos: Collection<Video>,
}

impl CategoryService {
    pub fn new(mongo: &Database) -> Self {
        Self {
            categories: mongo.collection(VIDEO_CATEGORIES),
            videos: mongo.collection(VIDEOS),
        }
    }

    async fn find(&self, id: &ObjectId) -> ServiceResult<VideoCategory> {
        self.categories
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query category")?
            .ok_or_else(|| ServiceError::not_found("Category not found"))
    }

    async fn active(&self) -> ServiceResult<Vec<VideoCategory>> {
        let categories = self
            .categories
            .find(doc! { "is_active": true })
            .sort(doc! { "order": 1 })
            .await
            .context("Failed to query categories")?
            .try_collect()
            .await
            .context("Failed to read categories")?;
        Ok(categories)
    }

    pub async fn list(&self) -> ServiceResult<Vec<CategoryResponse>> {
        Ok(self.active().await?.into_iter().map(CategoryResponse::from).collect())
    }

    pub async fn get(&self, id: &ObjectId) -> ServiceResult<CategoryResponse> {
        Ok(self.find(id).await?.into())
    }

    pub async fn create(&self, req: CategoryRequest) -> ServiceResult<CategoryResponse> {
        let name = non_blank(req.name)
            .ok_or_else(|| ServiceError::bad_request("Category name is required"))?;

        let now = Utc::now();
        let mut category = VideoCategory {
            id: None,
            name,
            description: non_blank(req.description),
            icon: non_blank(req.icon),
            color: non_blank(req.color),
            order: req.order.unwrap_or(0),
            is_active: req.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };

        let inserted = match self.categories.insert_one(&category).await {
            Ok(result) => result,
            Err(e) if is_duplicate_key(&e) => {
                return Err(ServiceError::conflict("Category name already exists"))
            }
            Err(e) => return Err(anyhow!(e).context("Failed to insert category").into()),
        };
        category.id = inserted.inserted_id.as_object_id();

        tracing::info!(category = %category.name, "Video category created");
        Ok(category.into())
    }

    pub async fn update(&self, id: &ObjectId, req: CategoryRequest) -> ServiceResult<CategoryResponse> {
        self.find(id).await?;

        let mut set = doc! { "updated_at": bson_now() };
        if let Some(name) = req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ServiceError::bad_request("Category name must not be empty"));
            }
            set.insert("name", name);
        }
        for (field, value) in [
            ("description", req.description),
            ("icon", req.icon),
            ("color", req.color),
        ] {
            if let Some(value) = value {
                set.insert(field, value);
            }
        }
        if let Some(order) = req.order {
            set.insert("order", order);
        }
        if let Some(is_active) = req.is_active {
            set.insert("is_active", is_active);
        }

        match self
            .categories
            .update_one(doc! { "_id": id }, doc! { "$set": set })
            .await
        {
            Ok(_) => {}
            Err(e) if is_duplicate_key(&e) => {
                return Err(ServiceError::conflict("Category name already exists"))
            }
            Err(e) => return Err(anyhow!(e).context("Failed to update category").into()),
        }

        self.get(id).await
    }

    pub async fn delete(&self, id: &ObjectId) -> ServiceResult<()> {
        self.find(id).await?;

        let video_count = self
            .videos
            .count_documents(doc! { "category_id": id })
            .await
            .context("Failed to count category videos")?;
        if video_count > 0 {
            return Err(ServiceError::bad_request(format!(
                "Cannot delete category. It has {} video(s) associated with it.",
                video_count
            )));
        }

        self.categories
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete category")?;
        tracing::info!(category_id = %id.to_hex(), "Video category deleted");
        Ok(())
    }

    /// Active categories with their active video count and total views.
    pub async fn stats(&self) -> ServiceResult<Vec<CategoryStatsResponse>> {
        let categories = self.active().await?;

        let pipeline = vec![
            doc! { "$match": { "is_active": true, "category_id": { "$ne": null } } },
            doc! { "$group": {
                "_id": "$category_id",
                "video_count": { "$sum": 1 },
                "total_views": { "$sum": "$view_count" },
            } },
        ];
        let mut cursor = self
            .videos
            .clone_with_type::<Document>()
            .aggregate(pipeline)
            .await
            .context("Failed to aggregate category stats")?;

        let mut totals = std::collections::HashMap::new();
        while let Some(row) = cursor
            .try_next()
            .await
            .context("Failed to read category stats")?
        {
            if let Ok(id) = row.get_object_id("_id") {
                let count = number_field(&row, "video_count");
                let views = number_field(&row, "total_views");
                totals.insert(id, (count as u64, views));
            }
        }

        Ok(categories
            .into_iter()
            .map(|category| {
                let (video_count, total_views) = category
                    .id
                    .and_then(|id| totals.get(&id).copied())
                    .unwrap_or((0, 0));
                CategoryStatsResponse {
                    category: category.into(),
                    video_count,
                    total_views,
                }
            })
            .collect())
    }
}
