use anyhow::Context;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::{Collection, Database};

use crate::models::notification::{ListNotificationsQuery, Notification, NotificationResponse};
use crate::services::{ServiceError, ServiceResult, NOTIFICATIONS};

pub struct NotificationService {
    collection: Collection<Notification>,
}

impl NotificationService {
    pub fn new(mongo: &Database) -> Self {
        Self {
            collection: mongo.collection(NOTIFICATIONS),
        }
    }

    pub async fn create(&self, notification: &Notification) -> ServiceResult<()> {
        self.collection
            .insert_one(notification)
            .await
            .context("Failed to insert notification")?;
        Ok(())
    }

    pub async fn list(
        &self,
        user_id: &ObjectId,
        query: ListNotificationsQuery,
    ) -> ServiceResult<Vec<NotificationResponse>> {
        let mut filter = doc! { "user_id": user_id };
        if query.unread_only.unwrap_or(false) {
            filter.insert("is_read", false);
        }

        let notifications: Vec<Notification> = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": -1 })
            .await
            .context("Failed to query notifications")?
            .try_collect()
            .await
            .context("Failed to read notifications")?;

        Ok(notifications.into_iter().map(NotificationResponse::from).collect())
    }

    pub async fn mark_read(&self, user_id: &ObjectId, id: &ObjectId) -> ServiceResult<NotificationResponse> {
        let filter = doc! { "_id": id, "user_id": user_id };
        let result = self
            .collection
            .update_one(filter.clone(), doc! { "$set": { "is_read": true } })
            .await
            .context("Failed to mark notification read")?;
        if result.matched_count == 0 {
            return Err(ServiceError::not_found("Notification not found"));
        }

        self.collection
            .find_one(filter)
            .await
            .context("Failed to query notification")?
            .map(NotificationResponse::from)
            .ok_or_else(|| ServiceError::not_found("Notification not found"))
    }
}
