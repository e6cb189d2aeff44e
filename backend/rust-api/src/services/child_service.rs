use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::{Collection, Database};

use crate::models::child::{parse_birth_date, Child, ChildRequest, ChildResponse, Gender};
use crate::models::non_blank;
use crate::services::{ServiceError, ServiceResult, CHILDREN};
use crate::utils::time::{bson_now, chrono_to_bson};

fn parse_gender(value: &str) -> ServiceResult<Gender> {
    Gender::parse(value.trim())
        .ok_or_else(|| ServiceError::bad_request("Gender must be MALE or FEMALE"))
}

fn parse_date_of_birth(value: &str, now: DateTime<Utc>) -> ServiceResult<DateTime<Utc>> {
    let date = parse_birth_date(value)
        .ok_or_else(|| ServiceError::bad_request("Invalid date of birth"))?;
    if date > now {
        return Err(ServiceError::bad_request("Date of birth cannot be in the future"));
    }
    Ok(date)
}

/// Children are only ever visible to the parent that created them.
pub struct ChildService {
    collection: Collection<Child>,
}

impl ChildService {
    pub fn new(mongo: &Database) -> Self {
        Self {
            collection: mongo.collection(CHILDREN),
        }
    }

    async fn find_owned(&self, parent_id: &ObjectId, child_id: &ObjectId) -> ServiceResult<Child> {
        self.collection
            .find_one(doc! { "_id": child_id, "parent_id": parent_id })
            .await
            .context("Failed to query child")?
            .ok_or_else(|| ServiceError::not_found("Child not found"))
    }

    pub async fn list(&self, parent_id: &ObjectId) -> ServiceResult<Vec<ChildResponse>> {
        let children: Vec<Child> = self
            .collection
            .find(doc! { "parent_id": parent_id })
            .sort(doc! { "created_at": -1 })
            .await
            .context("Failed to query children")?
            .try_collect()
            .await
            .context("Failed to read children")?;
        Ok(children.into_iter().map(ChildResponse::from).collect())
    }

    pub async fn get(&self, parent_id: &ObjectId, child_id: &ObjectId) -> ServiceResult<ChildResponse> {
        Ok(self.find_owned(parent_id, child_id).await?.into())
    }

    pub async fn create(&self, parent_id: &ObjectId, req: ChildRequest) -> ServiceResult<ChildResponse> {
        let (Some(name), Some(date_of_birth), Some(gender)) = (
            non_blank(req.name),
            non_blank(req.date_of_birth),
            non_blank(req.gender),
        ) else {
            return Err(ServiceError::bad_request(
                "Name, date of birth, and gender are required",
            ));
        };

        let now = Utc::now();
        let mut child = Child {
            id: None,
            parent_id: *parent_id,
            name,
            full_name: non_blank(req.full_name),
            date_of_birth: parse_date_of_birth(&date_of_birth, now)?,
            gender: parse_gender(&gender)?,
            is_premature: req.is_premature.unwrap_or(false),
            birth_weight: req.birth_weight,
            current_weight: req.current_weight,
            current_height: req.current_height,
            blood_type: non_blank(req.blood_type),
            allergies: req.allergies.unwrap_or_default(),
            medical_notes: non_blank(req.medical_notes),
            created_at: now,
            updated_at: now,
        };

        let inserted = self
            .collection
            .insert_one(&child)
            .await
            .context("Failed to insert child")?;
        child.id = Some(
            inserted
                .inserted_id
                .as_object_id()
                .ok_or_else(|| anyhow!("Failed to get inserted child ID"))?,
        );

        tracing::info!(parent_id = %parent_id.to_hex(), child_id = %crate::models::id_hex(&child.id), "Child created");
        Ok(child.into())
    }

    pub async fn update(
        &self,
        parent_id: &ObjectId,
        child_id: &ObjectId,
        req: ChildRequest,
    ) -> ServiceResult<ChildResponse> {
        self.find_owned(parent_id, child_id).await?;

        let mut set = Document::new();
        if let Some(name) = req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ServiceError::bad_request("Name must not be empty"));
            }
            set.insert("name", name);
        }
        if let Some(date_of_birth) = req.date_of_birth {
            let date = parse_date_of_birth(&date_of_birth, Utc::now())?;
            set.insert("date_of_birth", chrono_to_bson(date));
        }
        if let Some(gender) = req.gender {
            set.insert("gender", parse_gender(&gender)?.as_str());
        }
        if let Some(full_name) = req.full_name {
            set.insert("full_name", full_name.trim());
        }
        if let Some(is_premature) = req.is_premature {
            set.insert("is_premature", is_premature);
        }
        for (field, value) in [
            ("birth_weight", req.birth_weight),
            ("current_weight", req.current_weight),
            ("current_height", req.current_height),
        ] {
            if let Some(value) = value {
                set.insert(field, value);
            }
        }
        if let Some(blood_type) = req.blood_type {
            set.insert("blood_type", blood_type.trim());
        }
        if let Some(allergies) = req.allergies {
            set.insert("allergies", allergies);
        }
        if let Some(medical_notes) = req.medical_notes {
            set.insert("medical_notes", medical_notes);
        }
        set.insert("updated_at", bson_now());

        self.collection
            .update_one(doc! { "_id": child_id, "parent_id": parent_id }, doc! { "$set": set })
            .await
            .context("Failed to update child")?;

        self.get(parent_id, child_id).await
    }

    pub async fn delete(&self, parent_id: &ObjectId, child_id: &ObjectId) -> ServiceResult<()> {
        let result = self
            .collection
            .delete_one(doc! { "_id": child_id, "parent_id": parent_id })
            .await
            .context("Failed to delete child")?;
        if result.deleted_count == 0 {
            return Err(ServiceError::not_found("Child not found"));
        }
        tracing::info!(child_id = %child_id.to_hex(), "Child deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn future_birth_dates_are_rejected() {
        let now = Utc::now();
        let tomorrow = (now + Duration::days(1)).format("%Y-%m-%d").to_string();
        assert!(matches!(
            parse_date_of_birth(&tomorrow, now),
            Err(ServiceError::BadRequest(_))
        ));
        assert!(parse_date_of_birth("2023-06-15", now).is_ok());
        assert!(parse_date_of_birth("15/06/2023", now).is_err());
    }

    #[test]
    fn gender_must_be_uppercase_literal() {
        assert_eq!(parse_gender(" FEMALE ").unwrap(), Gender::Female);
        assert!(parse_gender("perempuan").is_err());
    }
}
