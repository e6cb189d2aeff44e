use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::user::UserRole;
use super::{bson_datetime_as_chrono, id_hex};

/// Educational video stored in "videos"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub youtube_id: String,
    pub thumbnail_url: String,
    /// Length in seconds when known
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub category_id: Option<ObjectId>,
    #[serde(default)]
    pub min_age: Option<i32>,
    #[serde(default)]
    pub max_age: Option<i32>,
    #[serde(default)]
    pub target_role: Vec<UserRole>,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub view_count: i64,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoCategory {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

/// Per-user watch progress, one document per (user, video)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoProgress {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub video_id: ObjectId,
    #[serde(default)]
    pub watched_duration: i64,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

pub fn thumbnail_url(youtube_id: &str) -> String {
    format!("https://img.youtube.com/vi/{}/mqdefault.jpg", youtube_id)
}

pub fn is_valid_youtube_id(value: &str) -> bool {
    value.len() == 11
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
}

impl From<&VideoCategory> for CategorySummary {
    fn from(category: &VideoCategory) -> Self {
        CategorySummary {
            id: id_hex(&category.id),
            name: category.name.clone(),
            color: category.color.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTestSummary {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub youtube_id: String,
    pub thumbnail_url: String,
    pub duration: Option<i64>,
    pub category_id: Option<String>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub target_role: Vec<UserRole>,
    pub order: i32,
    pub is_active: bool,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category: Option<CategorySummary>,
    pub test: Option<VideoTestSummary>,
}

impl VideoResponse {
    pub fn new(
        video: Video,
        category: Option<CategorySummary>,
        test: Option<VideoTestSummary>,
    ) -> Self {
        VideoResponse {
            id: id_hex(&video.id),
            title: video.title,
            description: video.description,
            youtube_id: video.youtube_id,
            thumbnail_url: video.thumbnail_url,
            duration: video.duration,
            category_id: video.category_id.map(|id| id.to_hex()),
            min_age: video.min_age,
            max_age: video.max_age,
            target_role: video.target_role,
            order: video.order,
            is_active: video.is_active,
            view_count: video.view_count,
            created_at: video.created_at,
            updated_at: video.updated_at,
            category,
            test,
        }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressCounts {
    pub total: u64,
    pub completed: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetailResponse {
    #[serde(flatten)]
    pub video: VideoResponse,
    pub progress: ProgressCounts,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateVideoRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub youtube_id: String,
    pub category_id: Option<String>,
    #[validate(range(min = 0, message = "Age must not be negative"))]
    pub min_age: Option<i32>,
    #[validate(range(min = 0, message = "Age must not be negative"))]
    pub max_age: Option<i32>,
    pub target_role: Option<Vec<UserRole>>,
    pub order: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVideoRequest {
    #[validate(length(min = 1, max = 200, message = "Title must not be empty"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub youtube_id: Option<String>,
    pub category_id: Option<String>,
    #[validate(range(min = 0, message = "Age must not be negative"))]
    pub min_age: Option<i32>,
    #[validate(range(min = 0, message = "Age must not be negative"))]
    pub max_age: Option<i32>,
    pub target_role: Option<Vec<UserRole>>,
    pub order: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListVideosQuery {
    pub category_id: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStats {
    pub total_videos: u64,
    pub active_videos: u64,
    pub total_views: i64,
    pub videos_with_tests: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<VideoCategory> for CategoryResponse {
    fn from(category: VideoCategory) -> Self {
        CategoryResponse {
            id: id_hex(&category.id),
            name: category.name,
            description: category.description,
            icon: category.icon,
            color: category.color,
            order: category.order,
            is_active: category.is_active,
            created_at: category.created_at,
            updated_at: category.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStatsResponse {
    #[serde(flatten)]
    pub category: CategoryResponse,
    pub video_count: u64,
    pub total_views: i64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub order: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordProgressRequest {
    #[serde(default)]
    pub video_id: String,
    pub watched_duration: Option<i64>,
    pub is_completed: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProgressResponse {
    pub id: String,
    pub user_id: String,
    pub video_id: String,
    pub watched_duration: i64,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<VideoProgress> for VideoProgressResponse {
    fn from(progress: VideoProgress) -> Self {
        VideoProgressResponse {
            id: id_hex(&progress.id),
            user_id: progress.user_id.to_hex(),
            video_id: progress.video_id.to_hex(),
            watched_duration: progress.watched_duration,
            is_completed: progress.is_completed,
            created_at: progress.created_at,
            updated_at: progress.updated_at,
        }
    }
}
