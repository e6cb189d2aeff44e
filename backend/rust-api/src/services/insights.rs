//! Rule based findings and recommendations derived from the statistics sections.

use crate::models::statistics::{
    CategoryPerformance, Difficulty, Finding, Impact, Insights, QuestionAnalysis, Recommendation,
    RolePerformance, VideoTestCorrelation,
};

const CONTENT_CREATORS: &str = "Content Creators";

#[derive(Default)]
struct InsightBuilder {
    findings: Vec<Finding>,
    recommendations: Vec<Recommendation>,
}

impl InsightBuilder {
    fn finding(&mut self, title: &str, description: String, impact: Impact, category: &str) {
        self.findings.push(Finding {
            title: title.to_string(),
            description,
            impact,
            category: category.to_string(),
        });
    }

    fn recommend(&mut self, title: &str, description: String, priority: Impact, audience: &str) {
        self.recommendations.push(Recommendation {
            title: title.to_string(),
            description,
            priority,
            target_audience: audience.to_string(),
        });
    }

    fn build(self) -> Insights {
        Insights {
            key_findings: self.findings.iter().map(|f| f.description.clone()).collect(),
            recommendations: self
                .recommendations
                .iter()
                .map(|r| r.description.clone())
                .collect(),
            enhanced_findings: self.findings,
            enhanced_recommendations: self.recommendations,
        }
    }
}

/// Highest and lowest item by `key`. Later items win ties.
fn extremes<T>(items: &[T], key: impl Fn(&T) -> f64) -> Option<(&T, &T)> {
    let first = items.first()?;
    Some(items.iter().skip(1).fold((first, first), |(best, worst), item| {
        let best = if key(best) > key(item) { best } else { item };
        let worst = if key(worst) < key(item) { worst } else { item };
        (best, worst)
    }))
}

pub fn generate(
    test_performance: &[CategoryPerformance],
    role_performance: &[RolePerformance],
    question_analysis: &[QuestionAnalysis],
    correlations: &[VideoTestCorrelation],
) -> Insights {
    let mut insights = InsightBuilder::default();

    role_gap(&mut insights, role_performance);
    learning_correlation(&mut insights, correlations);
    question_difficulty(&mut insights, question_analysis);
    category_disparity(&mut insights, test_performance);
    completion(&mut insights, role_performance);

    insights.build()
}

fn role_gap(insights: &mut InsightBuilder, roles: &[RolePerformance]) {
    if roles.len() < 2 {
        return;
    }
    let Some((best, worst)) = extremes(roles, |r| r.avg_score) else {
        return;
    };
    let gap = best.avg_score - worst.avg_score;
    if gap <= 5.0 {
        return;
    }

    insights.finding(
        "Role Performance Gap",
        format!(
            "{} role shows highest average score ({:.1}%), {:.1}% higher than lowest performing role",
            best.role.label(),
            best.avg_score,
            gap
        ),
        if gap > 15.0 { Impact::High } else { Impact::Medium },
        "Demographics",
    );

    if gap > 10.0 {
        let worst_label = worst.role.label();
        insights.recommend(
            "Role-based Training Program",
            format!(
                "Provide additional training resources and personalized learning paths for {} users",
                worst_label
            ),
            Impact::High,
            &worst_label,
        );
    }
}

fn learning_correlation(insights: &mut InsightBuilder, correlations: &[VideoTestCorrelation]) {
    if correlations.is_empty() {
        return;
    }
    let average =
        correlations.iter().map(|c| c.correlation).sum::<f64>() / correlations.len() as f64;
    let strength = if average > 0.6 {
        "strong"
    } else if average > 0.4 {
        "moderate"
    } else {
        "weak"
    };

    insights.finding(
        "Video-Test Learning Correlation",
        format!(
            "Average correlation of {:.2} between video completion and test performance indicates {} content effectiveness",
            average, strength
        ),
        if average > 0.6 { Impact::High } else { Impact::Medium },
        "Learning Effectiveness",
    );

    if let Some((_, weakest)) = extremes(correlations, |c| c.correlation) {
        if weakest.correlation < 0.5 {
            insights.recommend(
                "Content Review Required",
                format!(
                    "Review and improve {} content to strengthen video-test alignment (current correlation: {})",
                    weakest.category, weakest.correlation
                ),
                Impact::Medium,
                CONTENT_CREATORS,
            );
        }
    }
}

fn question_difficulty(insights: &mut InsightBuilder, questions: &[QuestionAnalysis]) {
    if questions.is_empty() {
        return;
    }
    let total = questions.len() as f64;
    let hard = questions
        .iter()
        .filter(|q| matches!(q.difficulty, Difficulty::Hard | Difficulty::VeryHard))
        .count() as f64;
    let easy = questions
        .iter()
        .filter(|q| q.difficulty == Difficulty::Easy)
        .count() as f64;
    let slow = questions.iter().filter(|q| q.avg_response_time > 60.0).count() as f64;

    let hard_pct = hard / total * 100.0;
    let easy_pct = easy / total * 100.0;

    if hard_pct > 40.0 {
        let level = if hard_pct > 50.0 { Impact::High } else { Impact::Medium };
        insights.finding(
            "High Question Difficulty",
            format!(
                "{:.1}% of questions are categorized as hard or very hard, which may impact user engagement",
                hard_pct
            ),
            level,
            "Content Quality",
        );
        insights.recommend(
            "Question Difficulty Balance",
            "Consider adding more explanatory content or adjusting question difficulty distribution to improve learning outcomes".to_string(),
            level,
            CONTENT_CREATORS,
        );
    }

    if easy_pct > 60.0 {
        insights.finding(
            "Low Question Challenge",
            format!(
                "{:.1}% of questions are categorized as easy, which may not provide sufficient learning challenge",
                easy_pct
            ),
            Impact::Medium,
            "Content Quality",
        );
        insights.recommend(
            "Increase Question Challenge",
            "Consider adding more challenging questions to enhance critical thinking and knowledge retention".to_string(),
            Impact::Medium,
            CONTENT_CREATORS,
        );
    }

    if slow > total * 0.3 {
        insights.finding(
            "Question Complexity Issues",
            format!(
                "{}% of questions have average response time over 1 minute, indicating potential clarity issues",
                (slow / total * 100.0).round()
            ),
            Impact::Medium,
            "User Experience",
        );
        insights.recommend(
            "Question Clarity Review",
            "Review questions with high response times for clarity and consider adding visual aids or simplifying language".to_string(),
            Impact::Medium,
            CONTENT_CREATORS,
        );
    }
}

fn category_disparity(insights: &mut InsightBuilder, categories: &[CategoryPerformance]) {
    if categories.len() < 2 {
        return;
    }
    let Some((best, worst)) = extremes(categories, |c| c.avg_score) else {
        return;
    };
    if best.avg_score - worst.avg_score <= 10.0 {
        return;
    }

    insights.finding(
        "Category Performance Disparity",
        format!(
            "{} shows highest performance ({:.1}%), while {} needs improvement ({:.1}%)",
            best.category, best.avg_score, worst.category, worst.avg_score
        ),
        Impact::Medium,
        "Content Performance",
    );
    insights.recommend(
        "Category-Specific Improvement",
        format!(
            "Focus on enhancing {} content quality and delivery methods based on successful patterns from {}",
            worst.category, best.category
        ),
        Impact::Medium,
        "Content Team",
    );
}

fn completion(insights: &mut InsightBuilder, roles: &[RolePerformance]) {
    if roles.is_empty() {
        return;
    }
    let average = roles.iter().map(|r| r.completion_rate).sum::<f64>() / roles.len() as f64;
    if average >= 70.0 {
        return;
    }

    insights.finding(
        "Low Completion Rate",
        format!(
            "Average completion rate of {:.1}% indicates potential engagement issues",
            average
        ),
        Impact::High,
        "User Engagement",
    );
    insights.recommend(
        "Engagement Strategy Review",
        "Implement gamification, progress tracking, or content restructuring to improve completion rates".to_string(),
        Impact::High,
        "Product Team",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;

    fn role(role: UserRole, avg_score: f64, completion_rate: f64) -> RolePerformance {
        RolePerformance {
            role,
            users: 1,
            total_attempts: 1,
            completed_attempts: 1,
            avg_score,
            completion_rate,
            pass_rate: 0.0,
            avg_time_spent: 0.0,
        }
    }

    fn question(difficulty: Difficulty, avg_response_time: f64) -> QuestionAnalysis {
        QuestionAnalysis {
            id: "q".into(),
            question_text: "?".into(),
            correct_answers: 0,
            incorrect_answers: 0,
            difficulty,
            test_title: "t".into(),
            category: "c".into(),
            avg_response_time,
            common_wrong_answers: Vec::new(),
            total_attempts: 0,
        }
    }

    fn category(name: &str, avg_score: f64) -> CategoryPerformance {
        CategoryPerformance {
            category: name.into(),
            avg_score,
            attempts: 1,
            pass_rate: 0.0,
        }
    }

    #[test]
    fn empty_inputs_produce_no_insights() {
        let insights = generate(&[], &[], &[], &[]);
        assert!(insights.key_findings.is_empty());
        assert!(insights.enhanced_recommendations.is_empty());
    }

    #[test]
    fn large_role_gap_is_high_impact_with_training_recommendation() {
        let roles = [
            role(UserRole::TenagaKesehatan, 90.0, 100.0),
            role(UserRole::Ibu, 70.0, 100.0),
        ];
        let insights = generate(&[], &roles, &[], &[]);

        assert_eq!(insights.enhanced_findings.len(), 1);
        let finding = &insights.enhanced_findings[0];
        assert_eq!(finding.title, "Role Performance Gap");
        assert_eq!(finding.impact, Impact::High);
        assert_eq!(
            finding.description,
            "TENAGA KESEHATAN role shows highest average score (90.0%), 20.0% higher than lowest performing role"
        );
        assert_eq!(insights.enhanced_recommendations[0].target_audience, "IBU");
        assert_eq!(insights.key_findings[0], finding.description);
    }

    #[test]
    fn small_role_gap_has_no_recommendation() {
        let roles = [role(UserRole::Bidan, 80.0, 90.0), role(UserRole::Ayah, 72.0, 90.0)];
        let insights = generate(&[], &roles, &[], &[]);
        assert_eq!(insights.enhanced_findings[0].impact, Impact::Medium);
        assert!(insights.recommendations.is_empty());
    }

    #[test]
    fn weak_correlation_asks_for_content_review() {
        let correlations = [
            VideoTestCorrelation {
                category: "Gizi".into(),
                video_completion_rate: 10.0,
                test_pass_rate: 10.0,
                correlation: 0.35,
            },
            VideoTestCorrelation {
                category: "Imunisasi".into(),
                video_completion_rate: 80.0,
                test_pass_rate: 80.0,
                correlation: 0.55,
            },
        ];
        let insights = generate(&[], &[], &[], &correlations);
        assert!(insights.key_findings[0].contains("0.45"));
        assert!(insights.key_findings[0].contains("moderate"));
        assert_eq!(
            insights.recommendations[0],
            "Review and improve Gizi content to strengthen video-test alignment (current correlation: 0.35)"
        );
    }

    #[test]
    fn difficulty_and_response_time_rules() {
        let questions = [
            question(Difficulty::VeryHard, 90.0),
            question(Difficulty::Hard, 10.0),
            question(Difficulty::Hard, 70.0),
            question(Difficulty::Easy, 5.0),
        ];
        let insights = generate(&[], &[], &questions, &[]);
        let titles: Vec<&str> = insights
            .enhanced_findings
            .iter()
            .map(|f| f.title.as_str())
            .collect();
        assert_eq!(titles, vec!["High Question Difficulty", "Question Complexity Issues"]);
        assert_eq!(insights.enhanced_findings[0].impact, Impact::High);
        assert!(insights.key_findings[1].starts_with("50%"));
    }

    #[test]
    fn category_disparity_and_low_completion() {
        let categories = [category("Gizi", 85.0), category("Tumbuh Kembang", 60.0)];
        let roles = [role(UserRole::Kader, 70.0, 40.0)];
        let insights = generate(&categories, &roles, &[], &[]);
        let titles: Vec<&str> = insights
            .enhanced_recommendations
            .iter()
            .map(|r| r.title.as_str())
            .collect();
        assert_eq!(
            titles,
            vec!["Category-Specific Improvement", "Engagement Strategy Review"]
        );
        assert_eq!(
            insights.key_findings[0],
            "Gizi shows highest performance (85.0%), while Tumbuh Kembang needs improvement (60.0%)"
        );
    }
}
