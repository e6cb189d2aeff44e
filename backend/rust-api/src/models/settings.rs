use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, Bson};
use serde::{Deserialize, Serialize};

use super::bson_datetime_as_chrono;

pub const SITE_NAME: &str = "siteName";
pub const SITE_DESCRIPTION: &str = "siteDescription";
pub const MAX_TEST_ATTEMPTS: &str = "maxTestAttempts";
pub const DEFAULT_PASSING_SCORE: &str = "defaultPassingScore";
pub const EMAIL_NOTIFICATIONS: &str = "emailNotifications";
pub const SYSTEM_MAINTENANCE: &str = "systemMaintenance";
pub const REGISTRATION_OPEN: &str = "registrationOpen";

/// Key/value row in "app_settings"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSetting {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub key: String,
    pub value: Bson,
    #[serde(default)]
    pub description: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

pub fn setting_description(key: &str) -> &'static str {
    match key {
        SITE_NAME => "The name of the application",
        SITE_DESCRIPTION => "A brief description of the application",
        MAX_TEST_ATTEMPTS => "Maximum number of test attempts allowed per user",
        DEFAULT_PASSING_SCORE => "Default minimum score required to pass tests",
        EMAIL_NOTIFICATIONS => "Enable or disable email notifications",
        SYSTEM_MAINTENANCE => "Enable maintenance mode to restrict user access",
        REGISTRATION_OPEN => "Allow or restrict new user registrations",
        _ => "",
    }
}

/// Effective settings: stored rows merged over the defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub site_name: String,
    pub site_description: String,
    pub max_test_attempts: i32,
    pub default_passing_score: i32,
    pub email_notifications: bool,
    pub system_maintenance: bool,
    pub registration_open: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            site_name: "Si Cegah App".to_string(),
            site_description: "Platform edukasi kesehatan untuk orang tua dan kader".to_string(),
            max_test_attempts: 3,
            default_passing_score: 60,
            email_notifications: true,
            system_maintenance: false,
            registration_open: true,
        }
    }
}

impl AppSettings {
    /// Overlays stored rows. Unknown keys and values of the wrong type are ignored.
    pub fn merge_rows(rows: &[AppSetting]) -> Self {
        let mut settings = AppSettings::default();
        for row in rows {
            match row.key.as_str() {
                SITE_NAME => {
                    if let Some(v) = row.value.as_str() {
                        settings.site_name = v.to_string();
                    }
                }
                SITE_DESCRIPTION => {
                    if let Some(v) = row.value.as_str() {
                        settings.site_description = v.to_string();
                    }
                }
                MAX_TEST_ATTEMPTS => {
                    if let Some(v) = bson_int(&row.value) {
                        settings.max_test_attempts = v;
                    }
                }
                DEFAULT_PASSING_SCORE => {
                    if let Some(v) = bson_int(&row.value) {
                        settings.default_passing_score = v;
                    }
                }
                EMAIL_NOTIFICATIONS => {
                    if let Some(v) = row.value.as_bool() {
                        settings.email_notifications = v;
                    }
                }
                SYSTEM_MAINTENANCE => {
                    if let Some(v) = row.value.as_bool() {
                        settings.system_maintenance = v;
                    }
                }
                REGISTRATION_OPEN => {
                    if let Some(v) = row.value.as_bool() {
                        settings.registration_open = v;
                    }
                }
                _ => {}
            }
        }
        settings
    }
}

fn bson_int(value: &Bson) -> Option<i32> {
    match value {
        Bson::Int32(v) => Some(*v),
        Bson::Int64(v) => i32::try_from(*v).ok(),
        Bson::Double(v) if v.fract() == 0.0 => Some(*v as i32),
        _ => None,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub site_name: Option<String>,
    pub site_description: Option<String>,
    pub max_test_attempts: Option<i32>,
    pub default_passing_score: Option<i32>,
    pub email_notifications: Option<bool>,
    pub system_maintenance: Option<bool>,
    pub registration_open: Option<bool>,
}

impl UpdateSettingsRequest {
    pub fn validate_ranges(&self) -> Result<(), String> {
        if let Some(v) = self.max_test_attempts {
            if !(1..=10).contains(&v) {
                return Err("Max test attempts must be between 1 and 10".to_string());
            }
        }
        if let Some(v) = self.default_passing_score {
            if !(1..=100).contains(&v) {
                return Err("Default passing score must be between 1 and 100".to_string());
            }
        }
        Ok(())
    }

    /// Provided keys with their stored values.
    pub fn into_rows(self) -> Vec<(&'static str, Bson)> {
        let mut rows = Vec::new();
        if let Some(v) = self.site_name {
            rows.push((SITE_NAME, Bson::String(v)));
        }
        if let Some(v) = self.site_description {
            rows.push((SITE_DESCRIPTION, Bson::String(v)));
        }
        if let Some(v) = self.max_test_attempts {
            rows.push((MAX_TEST_ATTEMPTS, Bson::Int32(v)));
        }
        if let Some(v) = self.default_passing_score {
            rows.push((DEFAULT_PASSING_SCORE, Bson::Int32(v)));
        }
        if let Some(v) = self.email_notifications {
            rows.push((EMAIL_NOTIFICATIONS, Bson::Boolean(v)));
        }
        if let Some(v) = self.system_maintenance {
            rows.push((SYSTEM_MAINTENANCE, Bson::Boolean(v)));
        }
        if let Some(v) = self.registration_open {
            rows.push((REGISTRATION_OPEN, Bson::Boolean(v)));
        }
        rows
    }
}
