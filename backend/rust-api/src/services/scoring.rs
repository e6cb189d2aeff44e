//! Pure scoring rules for completed attempts.

/// Outcome of grading one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptScore {
    pub score: i32,
    pub star_rating: i32,
    pub is_passed: bool,
    pub total_points_earned: i32,
    pub total_max_points: i32,
    pub correct_answers: i32,
}

/// `round(numerator / denominator * scale)` with halves rounded up, integers only.
fn round_ratio(numerator: i64, denominator: i64, scale: i64) -> i64 {
    if denominator <= 0 {
        return 0;
    }
    (2 * numerator * scale + denominator) / (2 * denominator)
}

/// Percentage of points earned, clamped to 0..=100.
pub fn percentage_score(earned: i32, max: i32) -> i32 {
    let earned = i64::from(earned.max(0));
    round_ratio(earned, i64::from(max), 100).clamp(0, 100) as i32
}

/// Stars out of five for the share of correct answers.
pub fn star_rating(correct: i32, question_count: i32) -> i32 {
    let correct = i64::from(correct.clamp(0, question_count.max(0)));
    round_ratio(correct, i64::from(question_count), 5).clamp(0, 5) as i32
}

/// Grades an attempt from its answer rows and the test's questions.
///
/// `answers` carries `(points, is_correct)` per submitted answer,
/// `question_points` the points of every question in the test.
pub fn grade_attempt(
    answers: &[(i32, bool)],
    question_points: &[i32],
    passing_score: i32,
) -> AttemptScore {
    let total_points_earned: i32 = answers.iter().map(|(points, _)| *points).sum();
    let total_max_points: i32 = question_points.iter().sum();
    let correct_answers = answers.iter().filter(|(_, correct)| *correct).count() as i32;
    let question_count = question_points.len() as i32;

    let score = percentage_score(total_points_earned, total_max_points);

    AttemptScore {
        score,
        star_rating: star_rating(correct_answers, question_count),
        is_passed: score >= passing_score,
        total_points_earned,
        total_max_points,
        correct_answers,
    }
}
