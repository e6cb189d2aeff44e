use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::{Collection, Database};

use crate::metrics::track_db_operation;
use crate::models::attempt::{TestAttempt, UserAnswer};
use crate::models::child::Child;
use crate::models::statistics::{
    DemographicAnalysis, LearningPatterns, StatisticsQuery, StatisticsResponse,
};
use crate::models::test::{Question, Test};
use crate::models::user::{User, UserRole};
use crate::models::video::{Video, VideoCategory, VideoProgress};
use crate::services::aggregation::{
    self, AttemptTally, QuestionContext, WindowSummary, MAX_ANALYZED_QUESTIONS, UNCATEGORIZED,
};
use crate::services::{
    insights, ServiceError, ServiceResult, CHILDREN, QUESTIONS, TESTS, TEST_ATTEMPTS, USERS,
    USER_ANSWERS, VIDEOS, VIDEO_CATEGORIES, VIDEO_PROGRESS,
};
use crate::utils::time::chrono_to_bson;

const RETENTION_WEEK_DAYS: i64 = 7;

/// User ids admitted by the role filter. `None` admits everyone.
#[derive(Debug, Clone, Default)]
struct RoleScope(Option<Vec<ObjectId>>);

impl RoleScope {
    fn apply(&self, filter: &mut Document, field: &str) {
        if let Some(ids) = &self.0 {
            filter.insert(field, doc! { "$in": ids });
        }
    }
}

/// Category names and test titles keyed by id.
#[derive(Debug, Default)]
struct Catalogue {
    category_of_video: HashMap<ObjectId, String>,
    category_of_test: HashMap<ObjectId, String>,
    test_titles: HashMap<ObjectId, String>,
}

fn started_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Document {
    doc! { "started_at": { "$gte": chrono_to_bson(from), "$lt": chrono_to_bson(to) } }
}

pub struct StatisticsService {
    users: Collection<User>,
    children: Collection<Child>,
    videos: Collection<Video>,
    categories: Collection<VideoCategory>,
    progress: Collection<VideoProgress>,
    tests: Collection<Test>,
    questions: Collection<Question>,
    attempts: Collection<TestAttempt>,
    answers: Collection<UserAnswer>,
}

impl StatisticsService {
    pub fn new(mongo: &Database) -> Self {
        Self {
            users: mongo.collection(USERS),
            children: mongo.collection(CHILDREN),
            videos: mongo.collection(VIDEOS),
            categories: mongo.collection(VIDEO_CATEGORIES),
            progress: mongo.collection(VIDEO_PROGRESS),
            tests: mongo.collection(TESTS),
            questions: mongo.collection(QUESTIONS),
            attempts: mongo.collection(TEST_ATTEMPTS),
            answers: mongo.collection(USER_ANSWERS),
        }
    }

    pub async fn overview(&self, query: StatisticsQuery) -> ServiceResult<StatisticsResponse> {
        let (period, role) = query.parse().map_err(ServiceError::BadRequest)?;
        let now = Utc::now();
        let window = period.window(now);
        let scope = self.role_scope(role).await?;

        let (current, previous, progress, catalogue, retention, previous_retention) = tokio::try_join!(
            self.attempts_between(&scope, window.start, window.end),
            self.attempts_between(&scope, window.previous_start, window.start),
            self.progress_between(&scope, window.start, window.end),
            self.catalogue(),
            self.retention(&scope, now - Duration::days(RETENTION_WEEK_DAYS), now),
            self.retention(&scope, window.previous_start, window.start),
        )?;

        let participants = aggregation::distinct_users(&current);
        let test_ids = {
            let mut ids: Vec<ObjectId> = current.iter().map(|a| a.test_id).collect();
            ids.sort();
            ids.dedup();
            ids
        };

        let (users, children, questions) = tokio::try_join!(
            self.users_by_id(&participants),
            self.children_of(&participants),
            self.questions_for(&test_ids),
        )?;
        let answers = self.answers_for(&current, &questions).await?;

        let current_summary = WindowSummary {
            tally: AttemptTally::from_attempts(&current),
            participants: participants.len() as u64,
            retention_rate: retention,
        };
        let previous_summary = WindowSummary {
            tally: AttemptTally::from_attempts(&previous),
            participants: aggregation::distinct_users(&previous).len() as u64,
            retention_rate: previous_retention,
        };
        let key_metrics =
            aggregation::key_metrics(&current_summary, &previous_summary, progress.len() as u64);

        let tallies = aggregation::tally_by_category(&current, &catalogue.category_of_test);
        let test_performance = aggregation::category_performance(&tallies);
        let role_performance = aggregation::role_performance(&current, &users);
        let correlations = aggregation::video_to_test_correlation(
            &tallies,
            &progress,
            &catalogue.category_of_video,
        );

        let attempt_started: HashMap<ObjectId, DateTime<Utc>> = current
            .iter()
            .filter_map(|a| a.id.map(|id| (id, a.started_at)))
            .collect();
        let mut answers_by_question: HashMap<ObjectId, Vec<&UserAnswer>> = HashMap::new();
        for answer in &answers {
            answers_by_question
                .entry(answer.question_id)
                .or_default()
                .push(answer);
        }
        let question_analysis = questions
            .iter()
            .map(|question| {
                let rows = question
                    .id
                    .and_then(|id| answers_by_question.get(&id))
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                aggregation::analyze_question(
                    question,
                    rows,
                    &attempt_started,
                    QuestionContext {
                        test_title: catalogue
                            .test_titles
                            .get(&question.test_id)
                            .map(String::as_str)
                            .unwrap_or_default(),
                        category: catalogue
                            .category_of_test
                            .get(&question.test_id)
                            .map(String::as_str)
                            .unwrap_or(UNCATEGORIZED),
                    },
                )
            })
            .collect::<Vec<_>>();

        let insights = insights::generate(
            &test_performance,
            &role_performance,
            &question_analysis,
            &correlations,
        );

        let parent_scores = aggregation::parent_scores(&current);
        let demographic_analysis = DemographicAnalysis {
            role_distribution: role_performance.clone(),
            geographic_distribution: aggregation::geographic_distribution(&current, &users),
            child_demographics: aggregation::child_demographics(&children, &parent_scores, now),
        };

        tracing::debug!(
            period = ?period,
            role = ?role,
            attempts = current.len(),
            participants = participants.len(),
            "Statistics computed"
        );

        Ok(StatisticsResponse {
            key_metrics,
            test_performance,
            role_performance,
            question_analysis,
            insights,
            demographic_analysis,
            learning_patterns: LearningPatterns {
                video_to_test_correlation: correlations,
            },
        })
    }

    async fn role_scope(&self, role: Option<UserRole>) -> ServiceResult<RoleScope> {
        let Some(role) = role else {
            return Ok(RoleScope::default());
        };
        let ids = track_db_operation("distinct", USERS, async {
            self.users.distinct("_id", doc! { "role": role.as_str() }).await
        })
        .await
        .context("Failed to resolve users for role filter")?;

        Ok(RoleScope(Some(
            ids.into_iter().filter_map(|id| id.as_object_id()).collect(),
        )))
    }

    async fn attempts_between(
        &self,
        scope: &RoleScope,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ServiceResult<Vec<TestAttempt>> {
        let mut filter = started_between(from, to);
        scope.apply(&mut filter, "user_id");

        let attempts = track_db_operation("find", TEST_ATTEMPTS, async {
            let cursor = self.attempts.find(filter).await?;
            cursor.try_collect::<Vec<_>>().await
        })
        .await
        .context("Failed to load test attempts")?;
        Ok(attempts)
    }

    async fn progress_between(
        &self,
        scope: &RoleScope,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ServiceResult<Vec<VideoProgress>> {
        let mut filter =
            doc! { "created_at": { "$gte": chrono_to_bson(from), "$lt": chrono_to_bson(to) } };
        scope.apply(&mut filter, "user_id");

        let progress = track_db_operation("find", VIDEO_PROGRESS, async {
            let cursor = self.progress.find(filter).await?;
            cursor.try_collect::<Vec<_>>().await
        })
        .await
        .context("Failed to load video progress")?;
        Ok(progress)
    }

    /// Users active in the week before `pivot` who came back between `pivot` and `end`.
    async fn retention(
        &self,
        scope: &RoleScope,
        pivot: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ServiceResult<f64> {
        let mut earlier = started_between(pivot - Duration::days(RETENTION_WEEK_DAYS), pivot);
        scope.apply(&mut earlier, "user_id");
        let mut later = started_between(pivot, end);
        scope.apply(&mut later, "user_id");

        let (initial, returned) = tokio::try_join!(
            track_db_operation("distinct", TEST_ATTEMPTS, async {
                self.attempts.distinct("user_id", earlier).await
            }),
            track_db_operation("distinct", TEST_ATTEMPTS, async {
                self.attempts.distinct("user_id", later).await
            }),
        )
        .context("Failed to compute retention")?;

        let initial: Vec<ObjectId> = initial.into_iter().filter_map(|id| id.as_object_id()).collect();
        let returned: Vec<ObjectId> =
            returned.into_iter().filter_map(|id| id.as_object_id()).collect();
        Ok(aggregation::retention_rate(&initial, &returned))
    }

    async fn catalogue(&self) -> ServiceResult<Catalogue> {
        let (categories, videos, tests) = tokio::try_join!(
            track_db_operation("find", VIDEO_CATEGORIES, async {
                let cursor = self.categories.find(doc! {}).await?;
                cursor.try_collect::<Vec<_>>().await
            }),
            track_db_operation("find", VIDEOS, async {
                let cursor = self.videos.find(doc! {}).await?;
                cursor.try_collect::<Vec<_>>().await
            }),
            track_db_operation("find", TESTS, async {
                let cursor = self.tests.find(doc! {}).await?;
                cursor.try_collect::<Vec<_>>().await
            }),
        )
        .context("Failed to load content catalogue")?;

        let category_names: HashMap<ObjectId, String> = categories
            .into_iter()
            .filter_map(|c| c.id.map(|id| (id, c.name)))
            .collect();

        let category_of_video: HashMap<ObjectId, String> = videos
            .into_iter()
            .filter_map(|video| {
                let id = video.id?;
                let name = category_names.get(&video.category_id?)?;
                Some((id, name.clone()))
            })
            .collect();

        let mut catalogue = Catalogue {
            category_of_video,
            ..Catalogue::default()
        };
        for test in tests {
            let Some(id) = test.id else { continue };
            if let Some(category) = catalogue.category_of_video.get(&test.video_id) {
                catalogue.category_of_test.insert(id, category.clone());
            }
            catalogue.test_titles.insert(id, test.title);
        }
        Ok(catalogue)
    }

    async fn users_by_id(&self, ids: &[ObjectId]) -> ServiceResult<HashMap<ObjectId, User>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let users = track_db_operation("find", USERS, async {
            let cursor = self.users.find(doc! { "_id": { "$in": ids } }).await?;
            cursor.try_collect::<Vec<_>>().await
        })
        .await
        .context("Failed to load participants")?;

        Ok(users
            .into_iter()
            .filter_map(|u| u.id.map(|id| (id, u)))
            .collect())
    }

    async fn children_of(&self, parent_ids: &[ObjectId]) -> ServiceResult<Vec<Child>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let children = track_db_operation("find", CHILDREN, async {
            let cursor = self
                .children
                .find(doc! { "parent_id": { "$in": parent_ids } })
                .await?;
            cursor.try_collect::<Vec<_>>().await
        })
        .await
        .context("Failed to load children")?;
        Ok(children)
    }

    async fn questions_for(&self, test_ids: &[ObjectId]) -> ServiceResult<Vec<Question>> {
        if test_ids.is_empty() {
            return Ok(Vec::new());
        }
        let questions = track_db_operation("find", QUESTIONS, async {
            let cursor = self
                .questions
                .find(doc! { "test_id": { "$in": test_ids } })
                .sort(doc! { "test_id": 1, "order": 1 })
                .limit(MAX_ANALYZED_QUESTIONS as i64)
                .await?;
            cursor.try_collect::<Vec<_>>().await
        })
        .await
        .context("Failed to load questions")?;
        Ok(questions)
    }

    async fn answers_for(
        &self,
        attempts: &[TestAttempt],
        questions: &[Question],
    ) -> ServiceResult<Vec<UserAnswer>> {
        let attempt_ids: Vec<ObjectId> = attempts.iter().filter_map(|a| a.id).collect();
        let question_ids: Vec<ObjectId> = questions.iter().filter_map(|q| q.id).collect();
        if attempt_ids.is_empty() || question_ids.is_empty() {
            return Ok(Vec::new());
        }

        let answers = track_db_operation("find", USER_ANSWERS, async {
            let cursor = self
                .answers
                .find(doc! {
                    "test_attempt_id": { "$in": attempt_ids },
                    "question_id": { "$in": question_ids },
                })
                .await?;
            cursor.try_collect::<Vec<_>>().await
        })
        .await
        .context("Failed to load answers")?;
        Ok(answers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_scope_only_filters_when_set() {
        let mut filter = doc! {};
        RoleScope::default().apply(&mut filter, "user_id");
        assert!(filter.is_empty());

        let id = ObjectId::new();
        RoleScope(Some(vec![id])).apply(&mut filter, "user_id");
        assert_eq!(filter, doc! { "user_id": { "$in": [id] } });
    }

    #[test]
    fn windows_are_half_open() {
        let from = Utc::now() - Duration::days(7);
        let to = Utc::now();
        let filter = started_between(from, to);
        let range = filter.get_document("started_at").unwrap();
        assert!(range.contains_key("$gte"));
        assert!(range.contains_key("$lt"));
    }
}
