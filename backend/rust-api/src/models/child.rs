use chrono::{DateTime, NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::{bson_datetime_as_chrono, id_hex};

/// Average month length used for age bucketing.
pub const DAYS_PER_MONTH: f64 = 30.44;

/// Child profile stored in "children", owned by one parent user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Child {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub parent_id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub date_of_birth: DateTime<Utc>,
    pub gender: Gender,
    #[serde(default)]
    pub is_premature: bool,
    #[serde(default)]
    pub birth_weight: Option<f64>,
    #[serde(default)]
    pub current_weight: Option<f64>,
    #[serde(default)]
    pub current_height: Option<f64>,
    #[serde(default)]
    pub blood_type: Option<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub medical_notes: Option<String>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn parse(value: &str) -> Option<Gender> {
        match value {
            "MALE" => Some(Gender::Male),
            "FEMALE" => Some(Gender::Female),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "MALE",
            Gender::Female => "FEMALE",
        }
    }
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates.
pub fn parse_birth_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Whole months between birth and `now`.
pub fn age_in_months(date_of_birth: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let days = (now - date_of_birth).num_milliseconds() as f64 / 86_400_000.0;
    (days / DAYS_PER_MONTH).floor() as i64
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildResponse {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub full_name: Option<String>,
    pub date_of_birth: DateTime<Utc>,
    pub age_in_months: i64,
    pub gender: Gender,
    pub is_premature: bool,
    pub birth_weight: Option<f64>,
    pub current_weight: Option<f64>,
    pub current_height: Option<f64>,
    pub blood_type: Option<String>,
    pub allergies: Vec<String>,
    pub medical_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Child> for ChildResponse {
    fn from(child: Child) -> Self {
        ChildResponse {
            id: id_hex(&child.id),
            parent_id: child.parent_id.to_hex(),
            age_in_months: age_in_months(child.date_of_birth, Utc::now()),
            name: child.name,
            full_name: child.full_name,
            date_of_birth: child.date_of_birth,
            gender: child.gender,
            is_premature: child.is_premature,
            birth_weight: child.birth_weight,
            current_weight: child.current_weight,
            current_height: child.current_height,
            blood_type: child.blood_type,
            allergies: child.allergies,
            medical_notes: child.medical_notes,
            created_at: child.created_at,
            updated_at: child.updated_at,
        }
    }
}

/// Body for both create and update. Create requires name, dateOfBirth and gender.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRequest {
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub is_premature: Option<bool>,
    pub birth_weight: Option<f64>,
    pub current_weight: Option<f64>,
    pub current_height: Option<f64>,
    pub blood_type: Option<String>,
    pub allergies: Option<Vec<String>>,
    pub medical_notes: Option<String>,
}
