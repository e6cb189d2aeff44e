use std::collections::HashMap;

use anyhow::{anyhow, Context};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson};
use mongodb::{Collection, Database};

use crate::models::non_blank;
use crate::models::test::{
    validate_answer_key, CreateQuestionRequest, ListQuestionsQuery, Question, QuestionResponse,
    QuestionType, Test, UpdateQuestionRequest,
};
use crate::models::video::Video;
use crate::services::error::{parse_object_id, required_text};
use crate::services::{ServiceError, ServiceResult, QUESTIONS, TESTS, VIDEOS};
use crate::utils::time::bson_now;

pub struct QuestionService {
    questions: Collection<Question>,
    tests: Collection<Test>,
    videos: Collection<Video>,
}

impl QuestionService {
    pub fn new(mongo: &Database) -> Self {
        Self {
            questions: mongo.collection(QUESTIONS),
            tests: mongo.collection(TESTS),
            videos: mongo.collection(VIDEOS),
        }
    }

    async fn find(&self, id: &ObjectId) -> ServiceResult<Question> {
        self.questions
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query question")?
            .ok_or_else(|| ServiceError::not_found("Question not found"))
    }

    /// (test title, video title) per test id.
    async fn titles(
        &self,
        test_ids: Vec<ObjectId>,
    ) -> ServiceResult<HashMap<ObjectId, (String, Option<String>)>> {
        let tests: Vec<Test> = self
            .tests
            .find(doc! { "_id": { "$in": test_ids } })
            .await
            .context("Failed to query tests")?
            .try_collect()
            .await
            .context("Failed to read tests")?;

        let video_ids: Vec<ObjectId> = tests.iter().map(|t| t.video_id).collect();
        let videos: HashMap<ObjectId, String> = self
            .videos
            .find(doc! { "_id": { "$in": video_ids } })
            .await
            .context("Failed to query videos")?
            .try_collect::<Vec<Video>>()
            .await
            .context("Failed to read videos")?
            .into_iter()
            .filter_map(|v| v.id.map(|id| (id, v.title)))
            .collect();

        Ok(tests
            .into_iter()
            .filter_map(|t| {
                let id = t.id?;
                Some((id, (t.title, videos.get(&t.video_id).cloned())))
            })
            .collect())
    }

    async fn respond(&self, question: Question) -> ServiceResult<QuestionResponse> {
        let mut titles = self.titles(vec![question.test_id]).await?;
        let (test_title, video_title) = titles
            .remove(&question.test_id)
            .map(|(t, v)| (Some(t), v))
            .unwrap_or((None, None));
        Ok(QuestionResponse::new(question, test_title, video_title))
    }

    pub async fn list(&self, query: ListQuestionsQuery) -> ServiceResult<Vec<QuestionResponse>> {
        let mut filter = doc! {};
        if let Some(test_id) = non_blank(query.test_id) {
            filter.insert("test_id", parse_object_id(&test_id, "testId")?);
        }

        let questions: Vec<Question> = self
            .questions
            .find(filter)
            .sort(doc! { "test_id": 1, "order": 1 })
            .await
            .context("Failed to query questions")?
            .try_collect()
            .await
            .context("Failed to read questions")?;

        let mut test_ids: Vec<ObjectId> = questions.iter().map(|q| q.test_id).collect();
        test_ids.sort();
        test_ids.dedup();
        let titles = self.titles(test_ids).await?;

        Ok(questions
            .into_iter()
            .map(|question| {
                let (test_title, video_title) = titles
                    .get(&question.test_id)
                    .map(|(t, v)| (Some(t.clone()), v.clone()))
                    .unwrap_or((None, None));
                QuestionResponse::new(question, test_title, video_title)
            })
            .collect())
    }

    pub async fn get(&self, id: &ObjectId) -> ServiceResult<QuestionResponse> {
        let question = self.find(id).await?;
        self.respond(question).await
    }

    pub async fn create(&self, req: CreateQuestionRequest) -> ServiceResult<QuestionResponse> {
        let question_type = req.question_type.ok_or_else(|| {
            ServiceError::bad_request(
                "Question text, type, correct answer, and test ID are required",
            )
        })?;
        if req.test_id.trim().is_empty() {
            return Err(ServiceError::bad_request(
                "Question text, type, correct answer, and test ID are required",
            ));
        }
        let test_id = parse_object_id(&req.test_id, "testId")?;
        let question_text = required_text(&req.question_text, "Question text is required")?;

        let options = normalize_options(question_type, req.options);
        validate_answer_key(question_type, options.as_deref(), &req.correct_answer)
            .map_err(ServiceError::BadRequest)?;

        let test_exists = self
            .tests
            .count_documents(doc! { "_id": test_id })
            .await
            .context("Failed to query test")?;
        if test_exists == 0 {
            return Err(ServiceError::bad_request("Test not found"));
        }

        let now = Utc::now();
        let mut question = Question {
            id: None,
            test_id,
            question_text,
            question_type,
            options,
            correct_answer: req.correct_answer.trim().to_string(),
            explanation: non_blank(req.explanation),
            points: req.points.unwrap_or(1),
            order: req.order.unwrap_or(0),
            image_url: non_blank(req.image_url),
            created_at: now,
            updated_at: now,
        };

        let inserted = self
            .questions
            .insert_one(&question)
            .await
            .context("Failed to insert question")?;
        question.id = Some(
            inserted
                .inserted_id
                .as_object_id()
                .ok_or_else(|| anyhow!("Failed to get inserted question ID"))?,
        );

        tracing::info!(question_id = %crate::models::id_hex(&question.id), test_id = %test_id.to_hex(), "Question created");
        self.respond(question).await
    }

    /// Partial update. The merged question must still have a consistent answer key.
    pub async fn update(
        &self,
        id: &ObjectId,
        req: UpdateQuestionRequest,
    ) -> ServiceResult<QuestionResponse> {
        let existing = self.find(id).await?;

        let question_type = req.question_type.unwrap_or(existing.question_type);
        let options = normalize_options(question_type, req.options.or(existing.options));
        let correct_answer = req.correct_answer.unwrap_or(existing.correct_answer);
        validate_answer_key(question_type, options.as_deref(), &correct_answer)
            .map_err(ServiceError::BadRequest)?;

        let mut set = doc! {
            "updated_at": bson_now(),
            "type": mongodb::bson::to_bson(&question_type).context("Failed to encode question type")?,
            "options": options.map(Bson::from).unwrap_or(Bson::Null),
            "correct_answer": correct_answer.trim(),
        };
        if let Some(text) = req.question_text {
            set.insert("question_text", required_text(&text, "Question text must not be empty")?);
        }
        if let Some(explanation) = req.explanation {
            set.insert("explanation", explanation);
        }
        if let Some(points) = req.points {
            set.insert("points", points);
        }
        if let Some(order) = req.order {
            set.insert("order", order);
        }
        if let Some(image_url) = req.image_url {
            set.insert("image_url", image_url);
        }

        self.questions
            .update_one(doc! { "_id": id }, doc! { "$set": set })
            .await
            .context("Failed to update question")?;

        self.get(id).await
    }

    pub async fn delete(&self, id: &ObjectId) -> ServiceResult<()> {
        let result = self
            .questions
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete question")?;
        if result.deleted_count == 0 {
            return Err(ServiceError::not_found("Question not found"));
        }
        tracing::info!(question_id = %id.to_hex(), "Question deleted");
        Ok(())
    }
}

/// Trims options and drops blanks. Only multiple choice questions keep them.
fn normalize_options(question_type: QuestionType, options: Option<Vec<String>>) -> Option<Vec<String>> {
    if question_type != QuestionType::MultipleChoice {
        return None;
    }
    options.map(|opts| {
        opts.into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect()
    })
}
