use serde::Serialize;

use super::user::UserRole;

#[derive(Debug, Clone, Serialize)]
pub struct RoleCount {
    pub role: UserRole,
    pub count: u64,
    /// Whole percent of active users
    pub percentage: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentActivity {
    pub user: String,
    pub action: String,
    pub time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_videos: u64,
    pub total_tests: u64,
    pub completed_tests: u64,
    pub users_by_role: Vec<RoleCount>,
    pub recent_activities: Vec<RecentActivity>,
}

/// Share of `count` in `total`, rounded to a whole percent.
pub fn percentage_of(count: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (count as f64 / total as f64 * 100.0).round() as u64
}

pub fn activity_action(is_passed: bool, video_title: &str) -> String {
    if is_passed {
        format!("completed test \"{}\"", video_title)
    } else {
        format!("attempted test \"{}\"", video_title)
    }
}
