//! Pure statistics helpers. Everything here works on already loaded rows so the
//! numbers can be checked without a database.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, Bson, Document};

use crate::models::attempt::{TestAttempt, UserAnswer};
use crate::models::child::{age_in_months, Child, Gender};
use crate::models::statistics::{
    AgeGroupStats, CategoryPerformance, ChildDemographics, DemographicBucket, Difficulty,
    GenderDistribution, GeographicStats, KeyMetrics, PrematureAnalysis, QuestionAnalysis,
    RolePerformance, Trends, VideoTestCorrelation, WrongAnswerCount,
};
use crate::models::test::Question;
use crate::models::user::{User, UserRole};
use crate::models::video::VideoProgress;

pub const UNCATEGORIZED: &str = "Uncategorized";
pub const MAX_ANALYZED_QUESTIONS: usize = 50;
const MIN_RESPONSE_SECONDS: f64 = 1.0;
const MAX_RESPONSE_SECONDS: f64 = 300.0;
const CORRELATION_MIN_SAMPLES: u64 = 5;

/// Reads a numeric field from an aggregation row regardless of its BSON width.
pub fn number_field(row: &Document, key: &str) -> i64 {
    match row.get(key) {
        Some(Bson::Int32(v)) => *v as i64,
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Percentage of `part` in `whole`, 0 for an empty whole.
pub fn rate(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Relative change against the previous window, 0 when there is no baseline.
pub fn pct_change(current: f64, previous: f64) -> f64 {
    if previous <= 0.0 {
        return 0.0;
    }
    round1((current - previous) / previous * 100.0)
}

/// Display heuristic, not a statistical correlation coefficient.
pub fn correlation_heuristic(
    progress_rows: u64,
    completed_attempts: u64,
    video_completion_rate: f64,
    test_pass_rate: f64,
) -> f64 {
    if progress_rows <= CORRELATION_MIN_SAMPLES || completed_attempts <= CORRELATION_MIN_SAMPLES {
        return 0.5;
    }
    let raw = 0.3
        + video_completion_rate * test_pass_rate / 10_000.0
        + video_completion_rate.min(test_pass_rate) / 200.0;
    raw.clamp(0.1, 0.95)
}

/// Seconds from attempt start to the answer, capped to 1..=300.
pub fn response_time_seconds(started_at: DateTime<Utc>, answered_at: DateTime<Utc>) -> f64 {
    let seconds = (answered_at - started_at).num_milliseconds() as f64 / 1000.0;
    seconds.clamp(MIN_RESPONSE_SECONDS, MAX_RESPONSE_SECONDS)
}

pub fn age_group(months: i64) -> &'static str {
    match months {
        m if m < 6 => "0-6 months",
        m if m < 12 => "6-12 months",
        m if m < 24 => "1-2 years",
        m if m < 36 => "2-3 years",
        _ => "3+ years",
    }
}

const AGE_GROUP_ORDER: [&str; 5] = [
    "0-6 months",
    "6-12 months",
    "1-2 years",
    "2-3 years",
    "3+ years",
];

/// Running counts over a set of attempts. Scores and time only count completed attempts.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AttemptTally {
    pub attempts: u64,
    pub completed: u64,
    pub passed: u64,
    score_sum: i64,
    time_sum: i64,
}

impl AttemptTally {
    pub fn add(&mut self, attempt: &TestAttempt) {
        self.attempts += 1;
        if attempt.is_completed {
            self.completed += 1;
            self.score_sum += attempt.score as i64;
            self.time_sum += attempt.time_spent.unwrap_or(0);
            if attempt.is_passed {
                self.passed += 1;
            }
        }
    }

    pub fn from_attempts<'a>(attempts: impl IntoIterator<Item = &'a TestAttempt>) -> Self {
        let mut tally = AttemptTally::default();
        for attempt in attempts {
            tally.add(attempt);
        }
        tally
    }

    pub fn average_score(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.score_sum as f64 / self.completed as f64
        }
    }

    pub fn completion_rate(&self) -> f64 {
        rate(self.completed, self.attempts)
    }

    pub fn pass_rate(&self) -> f64 {
        rate(self.passed, self.completed)
    }

    /// Average minutes spent on a completed attempt.
    pub fn average_minutes(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.time_sum as f64 / self.completed as f64 / 60.0
        }
    }
}

/// One reporting window worth of headline numbers.
#[derive(Debug, Default, Clone)]
pub struct WindowSummary {
    pub tally: AttemptTally,
    pub participants: u64,
    pub retention_rate: f64,
}

pub fn key_metrics(current: &WindowSummary, previous: &WindowSummary, video_views: u64) -> KeyMetrics {
    let cur = &current.tally;
    let prev = &previous.tally;

    KeyMetrics {
        total_participants: current.participants,
        average_score: round1(cur.average_score()),
        completion_rate: round1(cur.completion_rate()),
        pass_rate: round1(cur.pass_rate()),
        total_test_attempts: cur.attempts,
        total_video_views: video_views,
        average_time_spent: round1(cur.average_minutes()),
        retention_rate: round1(current.retention_rate),
        trends: Trends {
            participants: pct_change(current.participants as f64, previous.participants as f64),
            score: pct_change(cur.average_score(), prev.average_score()),
            completion: pct_change(cur.completion_rate(), prev.completion_rate()),
            pass: pct_change(cur.pass_rate(), prev.pass_rate()),
            time_spent: pct_change(cur.average_minutes(), prev.average_minutes()),
            retention: pct_change(current.retention_rate, previous.retention_rate),
        },
    }
}

pub fn distinct_users<'a>(attempts: impl IntoIterator<Item = &'a TestAttempt>) -> Vec<ObjectId> {
    let mut ids: Vec<ObjectId> = attempts.into_iter().map(|a| a.user_id).collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Share of users active in the earlier week who came back in the later week.
pub fn retention_rate(initial: &[ObjectId], returned: &[ObjectId]) -> f64 {
    if initial.is_empty() {
        return 0.0;
    }
    let came_back = initial.iter().filter(|id| returned.contains(id)).count() as u64;
    rate(came_back, initial.len() as u64)
}

/// Attempts grouped by the category name of their test's video, sorted by name.
pub fn tally_by_category(
    attempts: &[TestAttempt],
    category_of_test: &HashMap<ObjectId, String>,
) -> BTreeMap<String, AttemptTally> {
    let mut tallies: BTreeMap<String, AttemptTally> = BTreeMap::new();
    for attempt in attempts {
        let category = category_of_test
            .get(&attempt.test_id)
            .cloned()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        tallies.entry(category).or_default().add(attempt);
    }
    tallies
}

/// Per-category score and pass rate over completed attempts.
pub fn category_performance(tallies: &BTreeMap<String, AttemptTally>) -> Vec<CategoryPerformance> {
    tallies
        .iter()
        .map(|(category, tally)| CategoryPerformance {
            category: category.clone(),
            avg_score: round1(tally.average_score()),
            attempts: tally.completed,
            pass_rate: round1(tally.pass_rate()),
        })
        .collect()
}

pub fn role_performance(
    attempts: &[TestAttempt],
    users: &HashMap<ObjectId, User>,
) -> Vec<RolePerformance> {
    let mut by_role: HashMap<UserRole, (AttemptTally, Vec<ObjectId>)> = HashMap::new();
    for attempt in attempts {
        let Some(user) = users.get(&attempt.user_id) else {
            continue;
        };
        let entry = by_role.entry(user.role).or_default();
        entry.0.add(attempt);
        if !entry.1.contains(&attempt.user_id) {
            entry.1.push(attempt.user_id);
        }
    }

    UserRole::ALL
        .into_iter()
        .filter_map(|role| {
            let (tally, members) = by_role.remove(&role)?;
            Some(RolePerformance {
                role,
                users: members.len() as u64,
                total_attempts: tally.attempts,
                completed_attempts: tally.completed,
                avg_score: round1(tally.average_score()),
                completion_rate: round1(tally.completion_rate()),
                pass_rate: round1(tally.pass_rate()),
                avg_time_spent: round1(tally.average_minutes()),
            })
        })
        .collect()
}

/// Participants grouped by province. Users without a province are left out.
pub fn geographic_distribution(
    attempts: &[TestAttempt],
    users: &HashMap<ObjectId, User>,
) -> Vec<GeographicStats> {
    let mut by_province: BTreeMap<String, (AttemptTally, Vec<ObjectId>)> = BTreeMap::new();
    for attempt in attempts {
        let Some(province) = users
            .get(&attempt.user_id)
            .and_then(|u| u.province.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
        else {
            continue;
        };
        let entry = by_province.entry(province.to_string()).or_default();
        entry.0.add(attempt);
        if !entry.1.contains(&attempt.user_id) {
            entry.1.push(attempt.user_id);
        }
    }

    by_province
        .into_iter()
        .map(|(province, (tally, members))| GeographicStats {
            province,
            users: members.len() as u64,
            avg_score: round1(tally.average_score()),
            completion_rate: round1(tally.completion_rate()),
        })
        .collect()
}

pub fn video_to_test_correlation(
    tallies: &BTreeMap<String, AttemptTally>,
    progress: &[VideoProgress],
    category_of_video: &HashMap<ObjectId, String>,
) -> Vec<VideoTestCorrelation> {
    let mut watched: HashMap<&str, (u64, u64)> = HashMap::new();
    for row in progress {
        let category = category_of_video
            .get(&row.video_id)
            .map(String::as_str)
            .unwrap_or(UNCATEGORIZED);
        let entry = watched.entry(category).or_default();
        entry.0 += 1;
        if row.is_completed {
            entry.1 += 1;
        }
    }

    tallies
        .iter()
        .map(|(category, tally)| {
            let (rows, completed) = watched.get(category.as_str()).copied().unwrap_or_default();
            let video_completion_rate = rate(completed, rows);
            let test_pass_rate = tally.pass_rate();
            VideoTestCorrelation {
                category: category.clone(),
                video_completion_rate: round1(video_completion_rate),
                test_pass_rate: round1(test_pass_rate),
                correlation: round2(correlation_heuristic(
                    rows,
                    tally.completed,
                    video_completion_rate,
                    test_pass_rate,
                )),
            }
        })
        .collect()
}

/// Test title and category name for the test a question belongs to.
pub struct QuestionContext<'a> {
    pub test_title: &'a str,
    pub category: &'a str,
}

pub fn analyze_question(
    question: &Question,
    answers: &[&UserAnswer],
    attempt_started: &HashMap<ObjectId, DateTime<Utc>>,
    context: QuestionContext<'_>,
) -> QuestionAnalysis {
    let correct = answers.iter().filter(|a| a.is_correct).count() as u64;
    let total = answers.len() as u64;

    let response_times: Vec<f64> = answers
        .iter()
        .filter_map(|a| {
            attempt_started
                .get(&a.test_attempt_id)
                .map(|started| response_time_seconds(*started, a.answered_at))
        })
        .collect();
    let avg_response_time = if response_times.is_empty() {
        0.0
    } else {
        response_times.iter().sum::<f64>() / response_times.len() as f64
    };

    QuestionAnalysis {
        id: crate::models::id_hex(&question.id),
        question_text: question.question_text.clone(),
        correct_answers: correct,
        incorrect_answers: total - correct,
        difficulty: Difficulty::from_counts(correct, total),
        test_title: context.test_title.to_string(),
        category: context.category.to_string(),
        avg_response_time: round1(avg_response_time),
        common_wrong_answers: common_wrong_answers(answers),
        total_attempts: total,
    }
}

/// Three most frequent wrong answers, ties broken alphabetically.
fn common_wrong_answers(answers: &[&UserAnswer]) -> Vec<WrongAnswerCount> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for answer in answers.iter().filter(|a| !a.is_correct) {
        *counts.entry(answer.answer.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<(&str, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(3)
        .map(|(answer, count)| WrongAnswerCount {
            answer: answer.to_string(),
            count,
        })
        .collect()
}

#[derive(Default)]
struct ParentScoreBucket {
    count: u64,
    score_total: f64,
    scored: u64,
}

impl ParentScoreBucket {
    fn add(&mut self, parent_score: Option<f64>) {
        self.count += 1;
        if let Some(score) = parent_score {
            self.score_total += score;
            self.scored += 1;
        }
    }

    fn average(&self) -> f64 {
        if self.scored == 0 {
            0.0
        } else {
            round1(self.score_total / self.scored as f64)
        }
    }

    fn into_bucket(self) -> DemographicBucket {
        DemographicBucket {
            count: self.count,
            avg_parent_score: self.average(),
        }
    }
}

/// Mean score of each parent's completed attempts.
pub fn parent_scores(attempts: &[TestAttempt]) -> HashMap<ObjectId, f64> {
    let mut by_parent: HashMap<ObjectId, AttemptTally> = HashMap::new();
    for attempt in attempts.iter().filter(|a| a.is_completed) {
        by_parent.entry(attempt.user_id).or_default().add(attempt);
    }
    by_parent
        .into_iter()
        .map(|(id, tally)| (id, tally.average_score()))
        .collect()
}

/// Children bucketed by age, gender and prematurity with their parent's average score.
/// Only age groups that contain at least one child are returned.
pub fn child_demographics(
    children: &[Child],
    parent_scores: &HashMap<ObjectId, f64>,
    now: DateTime<Utc>,
) -> ChildDemographics {
    let mut ages: HashMap<&'static str, ParentScoreBucket> = HashMap::new();
    let mut male = ParentScoreBucket::default();
    let mut female = ParentScoreBucket::default();
    let mut premature = ParentScoreBucket::default();
    let mut normal = ParentScoreBucket::default();

    for child in children {
        let score = parent_scores.get(&child.parent_id).copied();
        let group = age_group(age_in_months(child.date_of_birth, now));
        ages.entry(group).or_default().add(score);
        match child.gender {
            Gender::Male => male.add(score),
            Gender::Female => female.add(score),
        }
        if child.is_premature {
            premature.add(score);
        } else {
            normal.add(score);
        }
    }

    let age_groups = AGE_GROUP_ORDER
        .into_iter()
        .filter_map(|range| {
            let bucket = ages.remove(range)?;
            Some(AgeGroupStats {
                age_range: range.to_string(),
                count: bucket.count,
                avg_parent_score: bucket.average(),
            })
        })
        .collect();

    ChildDemographics {
        age_groups,
        gender_distribution: GenderDistribution {
            male: male.into_bucket(),
            female: female.into_bucket(),
        },
        premature_analysis: PrematureAnalysis {
            premature: premature.into_bucket(),
            normal: normal.into_bucket(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use mongodb::bson::doc;

    fn attempt(user_id: ObjectId, test_id: ObjectId, completed: bool, passed: bool, score: i32) -> TestAttempt {
        TestAttempt {
            id: Some(ObjectId::new()),
            user_id,
            test_id,
            score,
            total_questions: 4,
            correct_answers: 0,
            star_rating: 0,
            is_completed: completed,
            is_passed: passed,
            time_spent: completed.then_some(120),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    fn user(role: UserRole, province: Option<&str>) -> User {
        let now = Utc::now();
        User {
            id: Some(ObjectId::new()),
            email: "user@example.com".into(),
            password_hash: String::new(),
            name: "User".into(),
            role,
            phone: None,
            province: province.map(str::to_string),
            city: None,
            address: None,
            profile_image: None,
            is_active: true,
            reset_token: None,
            reset_token_expiry: None,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    fn child(parent_id: ObjectId, born: DateTime<Utc>, gender: Gender, premature: bool) -> Child {
        Child {
            id: Some(ObjectId::new()),
            parent_id,
            name: "Anak".into(),
            full_name: None,
            date_of_birth: born,
            gender,
            is_premature: premature,
            birth_weight: None,
            current_weight: None,
            current_height: None,
            blood_type: None,
            allergies: Vec::new(),
            medical_notes: None,
            created_at: born,
            updated_at: born,
        }
    }

    #[test]
    fn number_field_accepts_any_numeric_width() {
        let row = doc! { "a": 3_i32, "b": 4_i64, "c": 2.9_f64, "d": "x" };
        assert_eq!(number_field(&row, "a"), 3);
        assert_eq!(number_field(&row, "b"), 4);
        assert_eq!(number_field(&row, "c"), 2);
        assert_eq!(number_field(&row, "d"), 0);
        assert_eq!(number_field(&row, "missing"), 0);
    }

    #[test]
    fn change_is_zero_without_baseline() {
        assert_eq!(pct_change(50.0, 0.0), 0.0);
        assert_eq!(pct_change(60.0, 50.0), 20.0);
        assert_eq!(pct_change(1.0, 3.0), -66.7);
    }

    #[test]
    fn correlation_needs_enough_samples() {
        assert_eq!(correlation_heuristic(5, 100, 90.0, 90.0), 0.5);
        assert_eq!(correlation_heuristic(100, 5, 90.0, 90.0), 0.5);
        // 0.3 + 0.25 + 0.25
        let value = correlation_heuristic(6, 6, 50.0, 50.0);
        assert!((value - 0.8).abs() < 1e-9);
        assert_eq!(correlation_heuristic(10, 10, 100.0, 100.0), 0.95);
        assert_eq!(correlation_heuristic(10, 10, 0.0, 0.0), 0.3);
    }

    #[test]
    fn response_time_is_capped() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        assert_eq!(response_time_seconds(start, start), 1.0);
        assert_eq!(response_time_seconds(start, start + Duration::seconds(42)), 42.0);
        assert_eq!(response_time_seconds(start, start + Duration::hours(2)), 300.0);
    }

    #[test]
    fn age_groups_use_month_boundaries() {
        assert_eq!(age_group(0), "0-6 months");
        assert_eq!(age_group(6), "6-12 months");
        assert_eq!(age_group(12), "1-2 years");
        assert_eq!(age_group(35), "2-3 years");
        assert_eq!(age_group(36), "3+ years");
    }

    #[test]
    fn tally_only_scores_completed_attempts() {
        let u = ObjectId::new();
        let t = ObjectId::new();
        let attempts = vec![
            attempt(u, t, true, true, 80),
            attempt(u, t, true, false, 40),
            attempt(u, t, false, false, 0),
            attempt(u, t, false, false, 0),
        ];
        let tally = AttemptTally::from_attempts(&attempts);
        assert_eq!(tally.attempts, 4);
        assert_eq!(tally.average_score(), 60.0);
        assert_eq!(tally.completion_rate(), 50.0);
        assert_eq!(tally.pass_rate(), 50.0);
        assert_eq!(tally.average_minutes(), 2.0);
    }

    #[test]
    fn retention_counts_returning_users() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let c = ObjectId::new();
        assert_eq!(retention_rate(&[a, b], &[b, c]), 50.0);
        assert_eq!(retention_rate(&[], &[a]), 0.0);
    }

    #[test]
    fn key_metrics_compare_against_previous_window() {
        let u = ObjectId::new();
        let t = ObjectId::new();
        let current = WindowSummary {
            tally: AttemptTally::from_attempts(&[attempt(u, t, true, true, 90), attempt(u, t, true, true, 70)]),
            participants: 3,
            retention_rate: 40.0,
        };
        let previous = WindowSummary {
            tally: AttemptTally::from_attempts(&[attempt(u, t, true, false, 40), attempt(u, t, true, true, 60)]),
            participants: 2,
            retention_rate: 0.0,
        };
        let metrics = key_metrics(&current, &previous, 7);
        assert_eq!(metrics.average_score, 80.0);
        assert_eq!(metrics.pass_rate, 100.0);
        assert_eq!(metrics.total_video_views, 7);
        assert_eq!(metrics.trends.participants, 50.0);
        assert_eq!(metrics.trends.score, 60.0);
        assert_eq!(metrics.trends.pass, 100.0);
        assert_eq!(metrics.trends.retention, 0.0);
    }

    #[test]
    fn categories_default_to_uncategorized() {
        let u = ObjectId::new();
        let known = ObjectId::new();
        let unknown = ObjectId::new();
        let categories = HashMap::from([(known, "Gizi".to_string())]);
        let attempts = vec![
            attempt(u, known, true, true, 100),
            attempt(u, known, false, false, 0),
            attempt(u, unknown, true, false, 20),
        ];
        let performance = category_performance(&tally_by_category(&attempts, &categories));
        assert_eq!(performance.len(), 2);
        assert_eq!(performance[0].category, "Gizi");
        assert_eq!(performance[0].attempts, 1);
        assert_eq!(performance[1].category, UNCATEGORIZED);
        assert_eq!(performance[1].pass_rate, 0.0);
    }

    #[test]
    fn roles_and_provinces_group_participants() {
        let ibu = user(UserRole::Ibu, Some("Jawa Barat"));
        let bidan = user(UserRole::Bidan, None);
        let ibu_id = ibu.id.unwrap();
        let bidan_id = bidan.id.unwrap();
        let users = HashMap::from([(ibu_id, ibu), (bidan_id, bidan)]);
        let t = ObjectId::new();
        let attempts = vec![
            attempt(ibu_id, t, true, true, 80),
            attempt(ibu_id, t, false, false, 0),
            attempt(bidan_id, t, true, true, 100),
        ];

        let roles = role_performance(&attempts, &users);
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].role, UserRole::Bidan);
        assert_eq!(roles[1].role, UserRole::Ibu);
        assert_eq!(roles[1].users, 1);
        assert_eq!(roles[1].completion_rate, 50.0);

        let geo = geographic_distribution(&attempts, &users);
        assert_eq!(geo.len(), 1);
        assert_eq!(geo[0].province, "Jawa Barat");
        assert_eq!(geo[0].avg_score, 80.0);
    }

    #[test]
    fn question_analysis_ranks_wrong_answers() {
        let now = Utc::now();
        let attempt_id = ObjectId::new();
        let question = Question {
            id: Some(ObjectId::new()),
            test_id: ObjectId::new(),
            question_text: "Usia MPASI?".into(),
            question_type: crate::models::test::QuestionType::MultipleChoice,
            options: None,
            correct_answer: "6 bulan".into(),
            explanation: None,
            points: 1,
            order: 0,
            image_url: None,
            created_at: now,
            updated_at: now,
        };
        let answer = |text: &str, correct: bool| UserAnswer {
            id: None,
            test_attempt_id: attempt_id,
            question_id: question.id.unwrap(),
            answer: text.to_string(),
            is_correct: correct,
            points: 0,
            answered_at: now + Duration::seconds(30),
        };
        let rows = [
            answer("6 bulan", true),
            answer("4 bulan", false),
            answer("4 bulan", false),
            answer("2 bulan", false),
            answer("1 tahun", false),
            answer("3 bulan", false),
        ];
        let refs: Vec<&UserAnswer> = rows.iter().collect();
        let started = HashMap::from([(attempt_id, now)]);

        let analysis = analyze_question(
            &question,
            &refs,
            &started,
            QuestionContext {
                test_title: "Tes MPASI",
                category: "Gizi",
            },
        );
        assert_eq!(analysis.total_attempts, 6);
        assert_eq!(analysis.incorrect_answers, 5);
        assert_eq!(analysis.difficulty, Difficulty::VeryHard);
        assert_eq!(analysis.avg_response_time, 30.0);
        assert_eq!(analysis.common_wrong_answers.len(), 3);
        assert_eq!(analysis.common_wrong_answers[0].answer, "4 bulan");
        assert_eq!(analysis.common_wrong_answers[0].count, 2);
    }

    #[test]
    fn child_demographics_only_lists_present_age_groups() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let parent = ObjectId::new();
        let other = ObjectId::new();
        let children = vec![
            child(parent, now - Duration::days(60), Gender::Female, true),
            child(other, now - Duration::days(800), Gender::Male, false),
        ];
        let scores = HashMap::from([(parent, 75.0)]);

        let demographics = child_demographics(&children, &scores, now);
        let ranges: Vec<&str> = demographics
            .age_groups
            .iter()
            .map(|g| g.age_range.as_str())
            .collect();
        assert_eq!(ranges, vec!["0-6 months", "2-3 years"]);
        assert_eq!(demographics.age_groups[0].avg_parent_score, 75.0);
        assert_eq!(demographics.age_groups[1].avg_parent_score, 0.0);
        assert_eq!(demographics.gender_distribution.female.count, 1);
        assert_eq!(demographics.premature_analysis.premature.avg_parent_score, 75.0);
        assert_eq!(demographics.premature_analysis.normal.count, 1);
    }
}
