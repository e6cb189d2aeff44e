use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::user::UserRole;

/// Reporting window selected with `?period=`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatsPeriod {
    SevenDays,
    #[default]
    ThirtyDays,
    NinetyDays,
    OneYear,
}

impl FromStr for StatsPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(StatsPeriod::SevenDays),
            "30d" => Ok(StatsPeriod::ThirtyDays),
            "90d" => Ok(StatsPeriod::NinetyDays),
            "1y" => Ok(StatsPeriod::OneYear),
            other => Err(format!("Unknown period: {}", other)),
        }
    }
}

impl StatsPeriod {
    /// Start of the window ending at `now`.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            StatsPeriod::SevenDays => now - Duration::days(7),
            StatsPeriod::ThirtyDays => now - Duration::days(30),
            StatsPeriod::NinetyDays => now - Duration::days(90),
            StatsPeriod::OneYear => now
                .checked_sub_months(chrono::Months::new(12))
                .unwrap_or(now - Duration::days(365)),
        }
    }

    pub fn window(&self, now: DateTime<Utc>) -> StatsWindow {
        let start = self.start(now);
        StatsWindow {
            start,
            end: now,
            previous_start: start - (now - start),
        }
    }
}

/// Current window `[start, end)` and the equal-length window before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub previous_start: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    pub period: Option<String>,
    pub role: Option<String>,
}

impl StatisticsQuery {
    /// Unknown periods fall back to 30 days. `ALL` or no role disables the filter.
    pub fn parse(&self) -> Result<(StatsPeriod, Option<UserRole>), String> {
        let period = self
            .period
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or_default();
        let role = match self.role.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(r) if r.eq_ignore_ascii_case("ALL") => None,
            Some(r) => Some(r.parse::<UserRole>()?),
        };
        Ok((period, role))
    }
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trends {
    pub participants: f64,
    pub score: f64,
    pub completion: f64,
    pub pass: f64,
    pub time_spent: f64,
    pub retention: f64,
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetrics {
    pub total_participants: u64,
    pub average_score: f64,
    pub completion_rate: f64,
    pub pass_rate: f64,
    pub total_test_attempts: u64,
    pub total_video_views: u64,
    /// Minutes
    pub average_time_spent: f64,
    pub retention_rate: f64,
    pub trends: Trends,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPerformance {
    pub category: String,
    pub avg_score: f64,
    pub attempts: u64,
    pub pass_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePerformance {
    pub role: UserRole,
    pub users: u64,
    pub total_attempts: u64,
    pub completed_attempts: u64,
    pub avg_score: f64,
    pub completion_rate: f64,
    pub pass_rate: f64,
    /// Minutes
    pub avg_time_spent: f64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    #[serde(rename = "Very Hard")]
    VeryHard,
}

impl Difficulty {
    /// Buckets a question by the share of correct answers. Unanswered questions are Medium.
    pub fn from_counts(correct: u64, total: u64) -> Self {
        if total == 0 {
            return Difficulty::Medium;
        }
        let success_rate = correct as f64 / total as f64 * 100.0;
        if success_rate >= 80.0 {
            Difficulty::Easy
        } else if success_rate >= 50.0 {
            Difficulty::Medium
        } else if success_rate >= 30.0 {
            Difficulty::Hard
        } else {
            Difficulty::VeryHard
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WrongAnswerCount {
    pub answer: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnalysis {
    pub id: String,
    pub question_text: String,
    pub correct_answers: u64,
    pub incorrect_answers: u64,
    pub difficulty: Difficulty,
    pub test_title: String,
    pub category: String,
    /// Seconds
    pub avg_response_time: f64,
    pub common_wrong_answers: Vec<WrongAnswerCount>,
    pub total_attempts: u64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Impact {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub title: String,
    pub description: String,
    pub impact: Impact,
    pub category: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    pub priority: Impact,
    pub target_audience: String,
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub enhanced_findings: Vec<Finding>,
    pub enhanced_recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeographicStats {
    pub province: String,
    pub users: u64,
    pub avg_score: f64,
    pub completion_rate: f64,
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicBucket {
    pub count: u64,
    pub avg_parent_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeGroupStats {
    pub age_range: String,
    pub count: u64,
    pub avg_parent_score: f64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct GenderDistribution {
    pub male: DemographicBucket,
    pub female: DemographicBucket,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct PrematureAnalysis {
    pub premature: DemographicBucket,
    pub normal: DemographicBucket,
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildDemographics {
    pub age_groups: Vec<AgeGroupStats>,
    pub gender_distribution: GenderDistribution,
    pub premature_analysis: PrematureAnalysis,
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicAnalysis {
    pub role_distribution: Vec<RolePerformance>,
    pub geographic_distribution: Vec<GeographicStats>,
    pub child_demographics: ChildDemographics,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTestCorrelation {
    pub category: String,
    pub video_completion_rate: f64,
    pub test_pass_rate: f64,
    pub correlation: f64,
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPatterns {
    pub video_to_test_correlation: Vec<VideoTestCorrelation>,
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsResponse {
    pub key_metrics: KeyMetrics,
    pub test_performance: Vec<CategoryPerformance>,
    pub role_performance: Vec<RolePerformance>,
    pub question_analysis: Vec<QuestionAnalysis>,
    pub insights: Insights,
    pub demographic_analysis: DemographicAnalysis,
    pub learning_patterns: LearningPatterns,
}
