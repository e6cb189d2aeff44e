use std::collections::HashMap;

use anyhow::{anyhow, Context};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::{Collection, Database};

use crate::metrics::track_db_operation;
use crate::models::non_blank;
use crate::models::settings::AppSettings;
use crate::models::test::{
    CreateTestRequest, PublicQuestion, Question, Test, TestResponse, TestWithQuestions,
    UpdateTestRequest,
};
use crate::models::video::Video;
use crate::services::aggregation::number_field;
use crate::services::error::{is_duplicate_key, parse_object_id, required_text};
use crate::services::{
    ServiceError, ServiceResult, QUESTIONS, TESTS, TEST_ATTEMPTS, VIDEOS,
};
use crate::utils::time::bson_now;

const DUPLICATE_TEST: &str = "A test already exists for this video";

/// Number of documents per `field` value, restricted to `ids`.
pub(crate) async fn count_by(
    collection: &Collection<Document>,
    field: &str,
    ids: &[ObjectId],
) -> ServiceResult<HashMap<ObjectId, u64>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let pipeline = vec![
        doc! { "$match": { field: { "$in": ids } } },
        doc! { "$group": { "_id": format!("${}", field), "count": { "$sum": 1 } } },
    ];
    let rows: Vec<Document> = track_db_operation("aggregate", collection.name(), async {
        let cursor = collection.aggregate(pipeline).await?;
        cursor.try_collect::<Vec<Document>>().await
    })
    .await
    .with_context(|| format!("Failed to count {} by {}", collection.name(), field))?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let id = row.get_object_id("_id").ok()?;
            Some((id, number_field(row, "count") as u64))
        })
        .collect())
}

pub struct TestService {
    tests: Collection<Test>,
    videos: Collection<Video>,
    questions: Collection<Question>,
    attempts: Collection<Document>,
}

impl TestService {
    pub fn new(mongo: &Database) -> Self {
        Self {
            tests: mongo.collection(TESTS),
            videos: mongo.collection(VIDEOS),
            questions: mongo.collection(QUESTIONS),
            attempts: mongo.collection(TEST_ATTEMPTS),
        }
    }

    async fn find(&self, id: &ObjectId) -> ServiceResult<Test> {
        self.tests
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query test")?
            .ok_or_else(|| ServiceError::not_found("Test not found"))
    }

    async fn video_titles(&self, ids: Vec<ObjectId>) -> ServiceResult<HashMap<ObjectId, String>> {
        let videos: Vec<Video> = self
            .videos
            .find(doc! { "_id": { "$in": ids } })
            .await
            .context("Failed to query videos")?
            .try_collect()
            .await
            .context("Failed to read videos")?;
        Ok(videos
            .into_iter()
            .filter_map(|v| v.id.map(|id| (id, v.title)))
            .collect())
    }

    async fn respond(&self, test: Test) -> ServiceResult<TestResponse> {
        let test_id = test.id.ok_or_else(|| anyhow!("Test ID not found"))?;
        let questions = self.questions.clone_with_type::<Document>();
        let (mut titles, question_count, attempt_count) = tokio::try_join!(
            self.video_titles(vec![test.video_id]),
            async {
                questions
                    .count_documents(doc! { "test_id": test_id })
                    .await
                    .context("Failed to count questions")
                    .map_err(ServiceError::from)
            },
            async {
                self.attempts
                    .count_documents(doc! { "test_id": test_id })
                    .await
                    .context("Failed to count attempts")
                    .map_err(ServiceError::from)
            },
        )?;
        let video_title = titles.remove(&test.video_id);
        Ok(TestResponse::new(test, video_title, question_count, attempt_count))
    }

    pub async fn list(&self) -> ServiceResult<Vec<TestResponse>> {
        let tests: Vec<Test> = self
            .tests
            .find(doc! {})
            .sort(doc! { "created_at": -1 })
            .await
            .context("Failed to query tests")?
            .try_collect()
            .await
            .context("Failed to read tests")?;

        let ids: Vec<ObjectId> = tests.iter().filter_map(|t| t.id).collect();
        let video_ids: Vec<ObjectId> = tests.iter().map(|t| t.video_id).collect();
        let questions = self.questions.clone_with_type::<Document>();
        let (titles, question_counts, attempt_counts) = tokio::try_join!(
            self.video_titles(video_ids),
            count_by(&questions, "test_id", &ids),
            count_by(&self.attempts, "test_id", &ids),
        )?;

        Ok(tests
            .into_iter()
            .map(|test| {
                let video_title = titles.get(&test.video_id).cloned();
                let count = |counts: &HashMap<ObjectId, u64>| {
                    test.id.and_then(|id| counts.get(&id).copied()).unwrap_or(0)
                };
                let questions = count(&question_counts);
                let attempts = count(&attempt_counts);
                TestResponse::new(test, video_title, questions, attempts)
            })
            .collect())
    }

    pub async fn get(&self, id: &ObjectId) -> ServiceResult<TestResponse> {
        let test = self.find(id).await?;
        self.respond(test).await
    }

    /// Passing score and attempt limit fall back to the current settings.
    pub async fn create(
        &self,
        req: CreateTestRequest,
        settings: &AppSettings,
    ) -> ServiceResult<TestResponse> {
        if req.video_id.trim().is_empty() {
            return Err(ServiceError::bad_request("Title and video ID are required"));
        }
        let title = required_text(&req.title, "Title and video ID are required")?;
        let video_id = parse_object_id(&req.video_id, "videoId")?;

        let video_exists = self
            .videos
            .count_documents(doc! { "_id": video_id })
            .await
            .context("Failed to query video")?;
        if video_exists == 0 {
            return Err(ServiceError::bad_request("Video not found"));
        }

        let existing = self
            .tests
            .count_documents(doc! { "video_id": video_id })
            .await
            .context("Failed to query existing test")?;
        if existing > 0 {
            return Err(ServiceError::conflict(DUPLICATE_TEST));
        }

        let now = Utc::now();
        let mut test = Test {
            id: None,
            title,
            description: non_blank(req.description),
            video_id,
            time_limit: req.time_limit,
            passing_score: req.passing_score.unwrap_or(settings.default_passing_score),
            max_attempts: req.max_attempts.unwrap_or(settings.max_test_attempts),
            is_active: req.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };

        let inserted = match self.tests.insert_one(&test).await {
            Ok(result) => result,
            Err(e) if is_duplicate_key(&e) => return Err(ServiceError::conflict(DUPLICATE_TEST)),
            Err(e) => return Err(anyhow!(e).context("Failed to insert test").into()),
        };
        test.id = inserted.inserted_id.as_object_id();

        tracing::info!(test_id = %crate::models::id_hex(&test.id), video_id = %video_id.to_hex(), "Test created");
        self.respond(test).await
    }

    pub async fn update(&self, id: &ObjectId, req: UpdateTestRequest) -> ServiceResult<TestResponse> {
        self.find(id).await?;

        let mut set = doc! { "updated_at": bson_now() };
        if let Some(title) = req.title {
            set.insert("title", required_text(&title, "Title must not be empty")?);
        }
        if let Some(description) = req.description {
            set.insert("description", description);
        }
        for (field, value) in [
            ("time_limit", req.time_limit),
            ("passing_score", req.passing_score),
            ("max_attempts", req.max_attempts),
        ] {
            if let Some(value) = value {
                set.insert(field, value);
            }
        }
        if let Some(is_active) = req.is_active {
            set.insert("is_active", is_active);
        }

        self.tests
            .update_one(doc! { "_id": id }, doc! { "$set": set })
            .await
            .context("Failed to update test")?;

        self.get(id).await
    }

    pub async fn delete(&self, id: &ObjectId) -> ServiceResult<()> {
        self.find(id).await?;

        let question_count = self
            .questions
            .count_documents(doc! { "test_id": id })
            .await
            .context("Failed to count questions")?;
        if question_count > 0 {
            return Err(ServiceError::bad_request(format!(
                "Cannot delete test with {} question(s). Delete the questions first.",
                question_count
            )));
        }

        self.tests
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete test")?;
        tracing::info!(test_id = %id.to_hex(), "Test deleted");
        Ok(())
    }

    /// The active test of a video as shown to learners, without answer keys.
    pub async fn by_video(&self, video_id: &ObjectId) -> ServiceResult<TestWithQuestions> {
        let test = self
            .tests
            .find_one(doc! { "video_id": video_id, "is_active": true })
            .await
            .context("Failed to query test")?
            .ok_or_else(|| ServiceError::not_found("No test found for this video"))?;
        let test_id = test.id.ok_or_else(|| anyhow!("Test ID not found"))?;

        let questions: Vec<Question> = self
            .questions
            .find(doc! { "test_id": test_id })
            .sort(doc! { "order": 1, "created_at": 1 })
            .await
            .context("Failed to query questions")?
            .try_collect()
            .await
            .context("Failed to read questions")?;

        Ok(TestWithQuestions {
            id: test_id.to_hex(),
            title: test.title,
            description: test.description,
            video_id: test.video_id.to_hex(),
            time_limit: test.time_limit,
            passing_score: test.passing_score,
            max_attempts: test.max_attempts,
            questions: questions.into_iter().map(PublicQuestion::from).collect(),
        })
    }
}
