use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option, id_hex};

/// One run of a user through a test. Created on start, completed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestAttempt {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub test_id: ObjectId,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub total_questions: i32,
    #[serde(default)]
    pub correct_answers: i32,
    #[serde(default)]
    pub star_rating: i32,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub is_passed: bool,
    /// Seconds between start and completion
    #[serde(default)]
    pub time_spent: Option<i64>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub started_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Answer to one question inside one attempt, unique per (attempt, question)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAnswer {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub test_attempt_id: ObjectId,
    pub question_id: ObjectId,
    pub answer: String,
    pub is_correct: bool,
    pub points: i32,
    #[serde(with = "bson_datetime_as_chrono")]
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResponse {
    pub id: String,
    pub user_id: String,
    pub test_id: String,
    pub score: i32,
    pub total_questions: i32,
    pub correct_answers: i32,
    pub star_rating: i32,
    pub is_completed: bool,
    pub is_passed: bool,
    pub time_spent: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<TestAttempt> for AttemptResponse {
    fn from(attempt: TestAttempt) -> Self {
        AttemptResponse {
            id: id_hex(&attempt.id),
            user_id: attempt.user_id.to_hex(),
            test_id: attempt.test_id.to_hex(),
            score: attempt.score,
            total_questions: attempt.total_questions,
            correct_answers: attempt.correct_answers,
            star_rating: attempt.star_rating,
            is_completed: attempt.is_completed,
            is_passed: attempt.is_passed,
            time_spent: attempt.time_spent,
            started_at: attempt.started_at,
            completed_at: attempt.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptTestSummary {
    pub video_id: String,
    pub title: String,
}

/// Attempt listing row with the test it belongs to
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptWithTest {
    #[serde(flatten)]
    pub attempt: AttemptResponse,
    pub test: Option<AttemptTestSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAttemptRequest {
    #[serde(default)]
    pub test_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAttemptResponse {
    pub attempt: AttemptResponse,
    pub message: String,
    /// True when an unfinished attempt was resumed
    pub resumed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAttemptsQuery {
    pub user_id: Option<String>,
    pub video_id: Option<String>,
    pub latest: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    #[serde(default)]
    pub test_attempt_id: String,
    #[serde(default)]
    pub question_id: String,
    pub answer: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerResponse {
    pub id: String,
    pub test_attempt_id: String,
    pub question_id: String,
    pub answer: String,
    pub is_correct: bool,
    pub points: i32,
    pub answered_at: DateTime<Utc>,
    /// Only present for wrong answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    pub score: i32,
    pub star_rating: i32,
    pub is_passed: bool,
    pub total_questions: i32,
    pub correct_answers: i32,
    pub total_points_earned: i32,
    pub total_max_points: i32,
    pub time_spent: i64,
    pub passing_score: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteAttemptResponse {
    pub attempt: AttemptResponse,
    pub summary: CompletionSummary,
    pub achievements_unlocked: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_id: String,
    pub question_text: String,
    pub options: Option<Vec<String>>,
    pub user_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub points: i32,
    pub max_points: i32,
    pub explanation: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsTestSummary {
    pub id: String,
    pub title: String,
    pub video_title: String,
    pub passing_score: i32,
    pub total_questions: i32,
    pub total_points_earned: i32,
    pub total_max_points: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResultsResponse {
    pub attempt: AttemptResponse,
    pub test: ResultsTestSummary,
    pub detailed_results: Vec<QuestionResult>,
}
