use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::{bson_datetime_as_chrono, id_hex};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    TestResult,
    Achievement,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Result notice sent when an attempt is completed.
    pub fn test_result(
        user_id: ObjectId,
        attempt_id: &ObjectId,
        score: i32,
        star_rating: i32,
        is_passed: bool,
    ) -> Self {
        let (title, verb) = if is_passed {
            ("Test Passed!", "passed")
        } else {
            ("Test Completed", "completed")
        };
        Notification {
            id: None,
            user_id,
            title: title.to_string(),
            message: format!(
                "You {} the test with score {}% ({} ⭐)",
                verb, score, star_rating
            ),
            notification_type: NotificationType::TestResult,
            action_url: Some(format!("/test-results/{}", attempt_id.to_hex())),
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationResponse {
    fn from(notification: Notification) -> Self {
        NotificationResponse {
            id: id_hex(&notification.id),
            title: notification.title,
            message: notification.message,
            notification_type: notification.notification_type,
            action_url: notification.action_url,
            is_read: notification.is_read,
            created_at: notification.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsQuery {
    pub unread_only: Option<bool>,
}
