use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::{bson_datetime_as_chrono, id_hex};

pub const FIRST_TEST_COMPLETED: &str = "First Test Completed";
pub const LEARNING_CHAMPION: &str = "Learning Champion";
pub const DEDICATED_LEARNER: &str = "Dedicated Learner";
pub const PERFECT_SCORE: &str = "Perfect Score";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Achievement {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
    /// Completed-test count or score needed to unlock
    #[serde(default)]
    pub requirement: i32,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAchievement {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub achievement_id: ObjectId,
    #[serde(default)]
    pub progress: i32,
    #[serde(default = "default_completed")]
    pub is_completed: bool,
    #[serde(with = "bson_datetime_as_chrono")]
    pub earned_at: DateTime<Utc>,
}

fn default_completed() -> bool {
    true
}

/// Catalogue row seeded at startup: (name, description, icon, requirement).
pub struct AchievementDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub requirement: i32,
}

pub const CATALOGUE: [AchievementDefinition; 4] = [
    AchievementDefinition {
        name: FIRST_TEST_COMPLETED,
        description: "Menyelesaikan tes pertama",
        icon: "🎯",
        requirement: 1,
    },
    AchievementDefinition {
        name: LEARNING_CHAMPION,
        description: "Menyelesaikan 5 tes",
        icon: "🏆",
        requirement: 5,
    },
    AchievementDefinition {
        name: DEDICATED_LEARNER,
        description: "Menyelesaikan 10 tes",
        icon: "📚",
        requirement: 10,
    },
    AchievementDefinition {
        name: PERFECT_SCORE,
        description: "Mendapatkan nilai sempurna 100",
        icon: "⭐",
        requirement: 100,
    },
];

/// Achievement names a completion qualifies for.
pub fn qualifying_achievements(completed_tests: u64, score: i32) -> Vec<&'static str> {
    let mut names = Vec::new();
    if completed_tests >= 1 {
        names.push(FIRST_TEST_COMPLETED);
    }
    if completed_tests >= 5 {
        names.push(LEARNING_CHAMPION);
    }
    if completed_tests >= 10 {
        names.push(DEDICATED_LEARNER);
    }
    if score == 100 {
        names.push(PERFECT_SCORE);
    }
    names
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: Option<String>,
    pub requirement: i32,
}

impl From<Achievement> for AchievementResponse {
    fn from(achievement: Achievement) -> Self {
        AchievementResponse {
            id: id_hex(&achievement.id),
            name: achievement.name,
            description: achievement.description,
            icon: achievement.icon,
            requirement: achievement.requirement,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnedAchievement {
    pub id: String,
    pub progress: i32,
    pub is_completed: bool,
    pub earned_at: DateTime<Utc>,
    pub achievement: Option<AchievementResponse>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementStats {
    pub completed_tests: u64,
    pub perfect_scores: u64,
    pub total_stars: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievementsResponse {
    pub achievements: Vec<EarnedAchievement>,
    pub stats: AchievementStats,
}
