use std::collections::HashMap;

use anyhow::{anyhow, Context};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};

use crate::metrics::{
    track_db_operation, ANSWERS_SUBMITTED_TOTAL, TEST_ATTEMPTS_COMPLETED_TOTAL, TEST_ATTEMPTS_STARTED_TOTAL,
};
use crate::middlewares::auth::JwtClaims;
use crate::models::attempt::{
    AttemptResponse, AttemptResultsResponse, AttemptTestSummary, AttemptWithTest,
    CompleteAttemptResponse, CompletionSummary, ListAttemptsQuery, QuestionResult,
    ResultsTestSummary, StartAttemptRequest, StartAttemptResponse, SubmitAnswerRequest,
    SubmitAnswerResponse, TestAttempt, UserAnswer,
};
use crate::models::non_blank;
use crate::models::notification::Notification;
use crate::models::test::{Question, Test};
use crate::models::video::Video;
use crate::services::achievement_service::AchievementService;
use crate::services::error::{is_duplicate_key, parse_object_id};
use crate::services::notification_service::NotificationService;
use crate::services::scoring::grade_attempt;
use crate::services::{
    ServiceError, ServiceResult, QUESTIONS, TESTS, TEST_ATTEMPTS, USER_ANSWERS, VIDEOS,
};
use crate::utils::time::chrono_to_bson;

const ALREADY_COMPLETED: &str = "Test attempt already completed";

fn max_attempts_reached(max_attempts: i32) -> ServiceError {
    ServiceError::bad_request(format!(
        "Maximum attempts ({}) reached for this test",
        max_attempts
    ))
}

/// Test-taking flow: start, answer, complete, review.
pub struct AttemptService {
    mongo: Database,
    attempts: Collection<TestAttempt>,
    answers: Collection<UserAnswer>,
    tests: Collection<Test>,
    questions: Collection<Question>,
    videos: Collection<Video>,
}

impl AttemptService {
    pub fn new(mongo: &Database) -> Self {
        Self {
            mongo: mongo.clone(),
            attempts: mongo.collection(TEST_ATTEMPTS),
            answers: mongo.collection(USER_ANSWERS),
            tests: mongo.collection(TESTS),
            questions: mongo.collection(QUESTIONS),
            videos: mongo.collection(VIDEOS),
        }
    }

    async fn find_attempt(&self, id: &ObjectId) -> ServiceResult<TestAttempt> {
        track_db_operation("find_one", TEST_ATTEMPTS, async {
            self.attempts.find_one(doc! { "_id": id }).await
        })
        .await
        .context("Failed to query test attempt")?
            .ok_or_else(|| ServiceError::not_found("Test attempt not found"))
    }

    async fn find_test(&self, id: &ObjectId) -> ServiceResult<Test> {
        track_db_operation("find_one", TESTS, async {
            self.tests.find_one(doc! { "_id": id }).await
        })
        .await
        .context("Failed to query test")?
            .ok_or_else(|| ServiceError::not_found("Test not found"))
    }

    async fn completed_count(&self, user_id: &ObjectId, test_id: &ObjectId) -> ServiceResult<u64> {
        let filter = doc! { "user_id": user_id, "test_id": test_id, "is_completed": true };
        Ok(track_db_operation("count", TEST_ATTEMPTS, async {
            self.attempts.count_documents(filter).await
        })
        .await
        .context("Failed to count completed attempts")?)
    }

    async fn questions_of(&self, test_id: &ObjectId) -> ServiceResult<Vec<Question>> {
        Ok(track_db_operation("find", QUESTIONS, async {
            let cursor = self
                .questions
                .find(doc! { "test_id": test_id })
                .sort(doc! { "created_at": 1 })
                .await?;
            cursor.try_collect::<Vec<_>>().await
        })
        .await
        .context("Failed to load questions")?)
    }

    async fn answers_of(&self, attempt_id: &ObjectId) -> ServiceResult<Vec<UserAnswer>> {
        Ok(track_db_operation("find", USER_ANSWERS, async {
            let cursor = self.answers.find(doc! { "test_attempt_id": attempt_id }).await?;
            cursor.try_collect::<Vec<_>>().await
        })
        .await
        .context("Failed to load answers")?)
    }

    /// Starts a new attempt or resumes the unfinished one. The flag is true for a new attempt.
    pub async fn start(
        &self,
        user_id: &ObjectId,
        req: StartAttemptRequest,
    ) -> ServiceResult<(StartAttemptResponse, bool)> {
        if req.test_id.trim().is_empty() {
            return Err(ServiceError::bad_request("Test ID is required"));
        }
        let test_id = parse_object_id(&req.test_id, "testId")?;

        let test = self
            .tests
            .find_one(doc! { "_id": test_id, "is_active": true })
            .await
            .context("Failed to query test")?
            .ok_or_else(|| ServiceError::not_found("Test not found or inactive"))?;

        if self.completed_count(user_id, &test_id).await? >= test.max_attempts as u64 {
            return Err(max_attempts_reached(test.max_attempts));
        }

        let ongoing = self
            .attempts
            .find_one(doc! { "user_id": user_id, "test_id": test_id, "is_completed": false })
            .sort(doc! { "started_at": -1 })
            .await
            .context("Failed to query ongoing attempt")?;
        if let Some(attempt) = ongoing {
            return Ok((
                StartAttemptResponse {
                    attempt: attempt.into(),
                    message: "Continuing existing attempt".to_string(),
                    resumed: true,
                },
                false,
            ));
        }

        let total_questions = self
            .questions
            .count_documents(doc! { "test_id": test_id })
            .await
            .context("Failed to count questions")?;

        let mut attempt = TestAttempt {
            id: None,
            user_id: *user_id,
            test_id,
            score: 0,
            total_questions: total_questions as i32,
            correct_answers: 0,
            star_rating: 0,
            is_completed: false,
            is_passed: false,
            time_spent: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        let inserted = self
            .attempts
            .insert_one(&attempt)
            .await
            .context("Failed to insert test attempt")?;
        attempt.id = inserted.inserted_id.as_object_id();

        TEST_ATTEMPTS_STARTED_TOTAL.inc();
        tracing::info!(
            user_id = %user_id.to_hex(),
            test_id = %test_id.to_hex(),
            attempt_id = %crate::models::id_hex(&attempt.id),
            "Test attempt started"
        );

        Ok((
            StartAttemptResponse {
                attempt: attempt.into(),
                message: "Test attempt started".to_string(),
                resumed: false,
            },
            true,
        ))
    }

    /// Completed attempts, newest first. Other users' attempts need an admin caller.
    pub async fn list(
        &self,
        claims: &JwtClaims,
        query: ListAttemptsQuery,
    ) -> ServiceResult<Vec<AttemptWithTest>> {
        let caller = parse_object_id(&claims.sub, "userId")?;
        let user_id = match non_blank(query.user_id) {
            Some(raw) => parse_object_id(&raw, "userId")?,
            None => caller,
        };
        if user_id != caller && !claims.is_admin() {
            return Err(ServiceError::forbidden(
                "You can only view your own test attempts",
            ));
        }

        let mut filter = doc! { "user_id": user_id, "is_completed": true };
        if let Some(raw) = non_blank(query.video_id) {
            let video_id = parse_object_id(&raw, "videoId")?;
            let test_ids: Vec<ObjectId> = self
                .tests
                .find(doc! { "video_id": video_id })
                .await
                .context("Failed to query tests")?
                .try_collect::<Vec<Test>>()
                .await
                .context("Failed to read tests")?
                .into_iter()
                .filter_map(|t| t.id)
                .collect();
            filter.insert("test_id", doc! { "$in": test_ids });
        }

        let limit = if query.latest.unwrap_or(false) { 1 } else { 0 };
        let attempts: Vec<TestAttempt> = self
            .attempts
            .find(filter)
            .sort(doc! { "completed_at": -1 })
            .limit(limit)
            .await
            .context("Failed to query test attempts")?
            .try_collect()
            .await
            .context("Failed to read test attempts")?;

        let test_ids: Vec<ObjectId> = attempts.iter().map(|a| a.test_id).collect();
        let summaries: HashMap<ObjectId, AttemptTestSummary> = self
            .tests
            .find(doc! { "_id": { "$in": test_ids } })
            .await
            .context("Failed to query tests")?
            .try_collect::<Vec<Test>>()
            .await
            .context("Failed to read tests")?
            .into_iter()
            .filter_map(|t| {
                let id = t.id?;
                Some((
                    id,
                    AttemptTestSummary {
                        video_id: t.video_id.to_hex(),
                        title: t.title,
                    },
                ))
            })
            .collect();

        Ok(attempts
            .into_iter()
            .map(|attempt| {
                let test = summaries.get(&attempt.test_id).cloned();
                AttemptWithTest {
                    attempt: attempt.into(),
                    test,
                }
            })
            .collect())
    }

    /// Records or replaces the answer to one question of an open attempt.
    pub async fn submit_answer(
        &self,
        user_id: &ObjectId,
        req: SubmitAnswerRequest,
    ) -> ServiceResult<SubmitAnswerResponse> {
        let answer = non_blank(req.answer);
        let (false, false, Some(answer)) = (
            req.test_attempt_id.trim().is_empty(),
            req.question_id.trim().is_empty(),
            answer,
        ) else {
            return Err(ServiceError::bad_request(
                "Test attempt ID, question ID, and answer are required",
            ));
        };
        let attempt_id = parse_object_id(&req.test_attempt_id, "testAttemptId")?;
        let question_id = parse_object_id(&req.question_id, "questionId")?;

        let attempt = self.find_attempt(&attempt_id).await?;
        if attempt.user_id != *user_id {
            return Err(ServiceError::forbidden(
                "You can only answer your own test attempts",
            ));
        }
        if attempt.is_completed {
            return Err(ServiceError::bad_request(ALREADY_COMPLETED));
        }

        let question = self
            .questions
            .find_one(doc! { "_id": question_id, "test_id": attempt.test_id })
            .await
            .context("Failed to query question")?
            .ok_or_else(|| ServiceError::not_found("Question not found in this test"))?;

        let is_correct = question.is_correct(&answer);
        let points = if is_correct { question.points } else { 0 };
        let answered_at = Utc::now();

        let filter = doc! { "test_attempt_id": attempt_id, "question_id": question_id };
        let update = doc! { "$set": {
            "answer": answer.as_str(),
            "is_correct": is_correct,
            "points": points,
            "answered_at": chrono_to_bson(answered_at),
        } };

        let stored = match self
            .answers
            .find_one_and_update(filter.clone(), update.clone())
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
        {
            Ok(stored) => stored,
            // Two submissions raced on the unique (attempt, question) index
            Err(e) if is_duplicate_key(&e) => self
                .answers
                .find_one_and_update(filter, update)
                .return_document(ReturnDocument::After)
                .await
                .context("Failed to update answer")?,
            Err(e) => return Err(anyhow!(e).context("Failed to upsert answer").into()),
        }
        .ok_or_else(|| anyhow!("Answer missing after upsert"))?;

        let correct_answers = self
            .answers
            .count_documents(doc! { "test_attempt_id": attempt_id, "is_correct": true })
            .await
            .context("Failed to count correct answers")?;
        self.attempts
            .update_one(
                doc! { "_id": attempt_id, "is_completed": false },
                doc! { "$set": { "correct_answers": correct_answers as i32 } },
            )
            .await
            .context("Failed to update correct answer count")?;

        ANSWERS_SUBMITTED_TOTAL
            .with_label_values(&[if is_correct { "true" } else { "false" }])
            .inc();

        Ok(SubmitAnswerResponse {
            id: crate::models::id_hex(&stored.id),
            test_attempt_id: attempt_id.to_hex(),
            question_id: question_id.to_hex(),
            answer: stored.answer,
            is_correct: stored.is_correct,
            points: stored.points,
            answered_at: stored.answered_at,
            explanation: if is_correct { None } else { question.explanation },
        })
    }

    /// Grades the attempt and marks it completed exactly once.
    pub async fn complete(
        &self,
        user_id: &ObjectId,
        attempt_id: &ObjectId,
    ) -> ServiceResult<CompleteAttemptResponse> {
        let attempt = self.find_attempt(attempt_id).await?;
        if attempt.user_id != *user_id {
            return Err(ServiceError::forbidden(
                "You can only complete your own test attempts",
            ));
        }
        if attempt.is_completed {
            return Err(ServiceError::bad_request(ALREADY_COMPLETED));
        }

        let test = self.find_test(&attempt.test_id).await?;
        if self.completed_count(user_id, &attempt.test_id).await? >= test.max_attempts as u64 {
            return Err(max_attempts_reached(test.max_attempts));
        }

        let (questions, answers) = tokio::try_join!(
            self.questions_of(&attempt.test_id),
            self.answers_of(attempt_id),
        )?;
        let question_points: Vec<i32> = questions.iter().map(|q| q.points).collect();
        let answer_rows: Vec<(i32, bool)> = answers.iter().map(|a| (a.points, a.is_correct)).collect();
        let graded = grade_attempt(&answer_rows, &question_points, test.passing_score);

        let completed_at = Utc::now();
        let time_spent = (completed_at - attempt.started_at).num_seconds().max(0);

        let completion = doc! { "$set": {
            "score": graded.score,
            "correct_answers": graded.correct_answers,
            "star_rating": graded.star_rating,
            "is_passed": graded.is_passed,
            "is_completed": true,
            "completed_at": chrono_to_bson(completed_at),
            "time_spent": time_spent,
        } };
        let completed = track_db_operation("find_one_and_update", TEST_ATTEMPTS, async {
            self.attempts
                .find_one_and_update(doc! { "_id": attempt_id, "is_completed": false }, completion)
                .return_document(ReturnDocument::After)
                .await
        })
        .await
        .context("Failed to complete test attempt")?
            .ok_or_else(|| ServiceError::bad_request(ALREADY_COMPLETED))?;

        TEST_ATTEMPTS_COMPLETED_TOTAL
            .with_label_values(&[if graded.is_passed { "passed" } else { "failed" }])
            .inc();
        tracing::info!(
            attempt_id = %attempt_id.to_hex(),
            score = graded.score,
            stars = graded.star_rating,
            passed = graded.is_passed,
            "Test attempt completed"
        );

        let achievements_unlocked = AchievementService::new(&self.mongo)
            .check_after_completion(user_id, graded.score)
            .await?;

        NotificationService::new(&self.mongo)
            .create(&Notification::test_result(
                *user_id,
                attempt_id,
                graded.score,
                graded.star_rating,
                graded.is_passed,
            ))
            .await?;

        let total_questions = completed.total_questions;
        Ok(CompleteAttemptResponse {
            attempt: completed.into(),
            summary: CompletionSummary {
                score: graded.score,
                star_rating: graded.star_rating,
                is_passed: graded.is_passed,
                total_questions,
                correct_answers: graded.correct_answers,
                total_points_earned: graded.total_points_earned,
                total_max_points: graded.total_max_points,
                time_spent,
                passing_score: test.passing_score,
            },
            achievements_unlocked,
        })
    }

    /// Per-question review of a completed attempt, for its owner or an admin.
    pub async fn results(
        &self,
        claims: &JwtClaims,
        attempt_id: &ObjectId,
    ) -> ServiceResult<AttemptResultsResponse> {
        let attempt = self.find_attempt(attempt_id).await?;
        if attempt.user_id.to_hex() != claims.sub && !claims.is_admin() {
            return Err(ServiceError::forbidden(
                "You can only view your own test results",
            ));
        }
        if !attempt.is_completed {
            return Err(ServiceError::bad_request("Test attempt not completed yet"));
        }

        let test = self.find_test(&attempt.test_id).await?;
        let (questions, answers, video) = tokio::try_join!(
            self.questions_of(&attempt.test_id),
            self.answers_of(attempt_id),
            async {
                self.videos
                    .find_one(doc! { "_id": test.video_id })
                    .await
                    .context("Failed to query video")
                    .map_err(ServiceError::from)
            },
        )?;

        let mut by_question: HashMap<ObjectId, UserAnswer> =
            answers.into_iter().map(|a| (a.question_id, a)).collect();

        let mut total_points_earned = 0;
        let mut total_max_points = 0;
        let detailed_results: Vec<QuestionResult> = questions
            .into_iter()
            .map(|question| {
                let answer = question.id.and_then(|id| by_question.remove(&id));
                let points = answer.as_ref().map(|a| a.points).unwrap_or(0);
                total_points_earned += points;
                total_max_points += question.points;
                QuestionResult {
                    question_id: crate::models::id_hex(&question.id),
                    question_text: question.question_text,
                    options: question.options,
                    user_answer: answer.as_ref().map(|a| a.answer.clone()).unwrap_or_default(),
                    correct_answer: question.correct_answer,
                    is_correct: answer.as_ref().map(|a| a.is_correct).unwrap_or(false),
                    points,
                    max_points: question.points,
                    explanation: question.explanation.unwrap_or_default(),
                }
            })
            .collect();

        let test_id = test.id.ok_or_else(|| anyhow!("Test ID not found"))?;
        Ok(AttemptResultsResponse {
            test: ResultsTestSummary {
                id: test_id.to_hex(),
                title: test.title,
                video_title: video
                    .map(|v| v.title)
                    .unwrap_or_else(|| "Unknown Video".to_string()),
                passing_score: test.passing_score,
                total_questions: detailed_results.len() as i32,
                total_points_earned,
                total_max_points,
            },
            attempt: AttemptResponse::from(attempt),
            detailed_results,
        })
    }
}
