use axum::http::StatusCode;
use serde_json::json;
use serial_test::serial;

mod common;

use common::{admin_token, create_test_fixture, send, spawn_app, user_token};

#[tokio::test]
#[serial]
async fn test_full_attempt_flow() {
    let app = spawn_app().await;
    let admin = admin_token(&app).await;
    let router = &app.router;
    let (video_id, test_id, questions) = create_test_fixture(router, &admin).await;
    let (learner, learner_id) = user_token(router, "IBU").await;

    // Learner view hides the answer key
    let (status, test) = send(
        router,
        "GET",
        &format!("/api/tests/by-video/{}", video_id),
        Some(&learner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(test["questions"].as_array().unwrap().len(), 2);
    assert!(test["questions"][0].get("correctAnswer").is_none());
    assert!(test["questions"][0].get("explanation").is_none());

    let (status, started) = send(
        router,
        "POST",
        "/api/test-attempts",
        Some(&learner),
        Some(json!({ "testId": test_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", started);
    assert_eq!(started["attempt"]["totalQuestions"], 2);
    let attempt_id = started["attempt"]["id"].as_str().unwrap().to_string();

    // A second start resumes the open attempt
    let (status, resumed) = send(
        router,
        "POST",
        "/api/test-attempts",
        Some(&learner),
        Some(json!({ "testId": test_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["message"], "Continuing existing attempt");
    assert_eq!(resumed["attempt"]["id"], attempt_id);

    let answer = |question: &str, value: &str| {
        json!({ "testAttemptId": attempt_id, "questionId": question, "answer": value })
    };

    let (status, first) = send(router, "POST", "/api/user-answers", Some(&learner), Some(answer(&questions[0], " A "))).await;
    assert_eq!(status, StatusCode::OK, "{}", first);
    assert_eq!(first["isCorrect"], true);
    assert_eq!(first["points"], 10);
    assert!(first.get("explanation").is_none());

    let (_, wrong) = send(router, "POST", "/api/user-answers", Some(&learner), Some(answer(&questions[1], "B"))).await;
    assert_eq!(wrong["isCorrect"], false);
    assert_eq!(wrong["points"], 0);
    assert_eq!(wrong["explanation"], "Jawaban yang benar adalah A");

    // Answering again replaces the earlier row
    let (_, fixed) = send(router, "POST", "/api/user-answers", Some(&learner), Some(answer(&questions[1], "A"))).await;
    assert_eq!(fixed["isCorrect"], true);

    // Results are only available after completion
    let results_uri = format!("/api/test-attempts/{}/results", attempt_id);
    let (status, _) = send(router, "GET", &results_uri, Some(&learner), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let complete_uri = format!("/api/test-attempts/{}/complete", attempt_id);
    let (status, completed) = send(router, "PUT", &complete_uri, Some(&learner), None).await;
    assert_eq!(status, StatusCode::OK, "{}", completed);
    assert_eq!(completed["summary"]["score"], 100);
    assert_eq!(completed["summary"]["starRating"], 5);
    assert_eq!(completed["summary"]["isPassed"], true);
    assert_eq!(completed["summary"]["totalPointsEarned"], 40);
    assert_eq!(completed["summary"]["totalMaxPoints"], 40);
    let unlocked: Vec<&str> = completed["achievementsUnlocked"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(unlocked.contains(&"First Test Completed"));
    assert!(unlocked.contains(&"Perfect Score"));

    // Completion happens once; late answers are refused
    let (status, _) = send(router, "PUT", &complete_uri, Some(&learner), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(router, "POST", "/api/user-answers", Some(&learner), Some(answer(&questions[0], "C"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, results) = send(router, "GET", &results_uri, Some(&learner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["detailedResults"].as_array().unwrap().len(), 2);
    assert_eq!(results["detailedResults"][0]["correctAnswer"], "A");

    let (stranger, _) = user_token(router, "KADER").await;
    let (status, _) = send(router, "GET", &results_uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(router, "GET", &results_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    // Listing
    let (status, latest) = send(
        router,
        "GET",
        &format!("/api/test-attempts?videoId={}&latest=true", video_id),
        Some(&learner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["id"], attempt_id);
    assert_eq!(latest["test"]["videoId"], video_id);

    let (status, _) = send(
        router,
        "GET",
        &format!("/api/test-attempts?userId={}", learner_id),
        Some(&stranger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Achievements and notifications
    let (status, achievements) = send(
        router,
        "GET",
        &format!("/api/users/{}/achievements", learner_id),
        Some(&learner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(achievements["stats"]["completedTests"], 1);
    assert_eq!(achievements["stats"]["perfectScores"], 1);

    let (status, notifications) = send(router, "GET", "/api/notifications?unreadOnly=true", Some(&learner), None).await;
    assert_eq!(status, StatusCode::OK);
    let notification = &notifications[0];
    assert_eq!(notification["title"], "Test Passed!");
    assert_eq!(notification["type"], "TEST_RESULT");
    assert_eq!(
        notification["actionUrl"],
        format!("/test-results/{}", attempt_id)
    );

    let read_uri = format!("/api/notifications/{}/read", notification["id"].as_str().unwrap());
    let (status, _) = send(router, "PUT", &read_uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, read) = send(router, "PUT", &read_uri, Some(&learner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["isRead"], true);

    // Attempt cap
    let (status, _) = send(
        router,
        "PUT",
        &format!("/api/tests/{}", test_id),
        Some(&admin),
        Some(json!({ "maxAttempts": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        router,
        "POST",
        "/api/test-attempts",
        Some(&learner),
        Some(json!({ "testId": test_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[serial]
async fn test_answers_are_checked_against_the_attempt() {
    let app = spawn_app().await;
    let admin = admin_token(&app).await;
    let router = &app.router;
    let (_, test_id, _) = create_test_fixture(router, &admin).await;
    let (_, _, other_questions) = create_test_fixture(router, &admin).await;
    let (learner, _) = user_token(router, "BIDAN").await;
    let (intruder, _) = user_token(router, "BIDAN").await;

    let (status, _) = send(router, "POST", "/api/test-attempts", Some(&learner), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, started) = send(
        router,
        "POST",
        "/api/test-attempts",
        Some(&learner),
        Some(json!({ "testId": test_id })),
    )
    .await;
    let attempt_id = started["attempt"]["id"].as_str().unwrap().to_string();

    // Question from a different test
    let (status, _) = send(
        router,
        "POST",
        "/api/user-answers",
        Some(&learner),
        Some(json!({ "testAttemptId": attempt_id, "questionId": other_questions[0], "answer": "A" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Someone else's attempt
    let (status, _) = send(
        router,
        "POST",
        "/api/user-answers",
        Some(&intruder),
        Some(json!({ "testAttemptId": attempt_id, "questionId": other_questions[0], "answer": "A" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        router,
        "POST",
        "/api/user-answers",
        Some(&learner),
        Some(json!({ "testAttemptId": attempt_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unanswered completion scores zero and is not passed
    let (status, completed) = send(
        router,
        "PUT",
        &format!("/api/test-attempts/{}/complete", attempt_id),
        Some(&learner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["summary"]["score"], 0);
    assert_eq!(completed["summary"]["isPassed"], false);
}

#[tokio::test]
#[serial]
async fn test_by_video_only_allows_get() {
    let app = spawn_app().await;
    let (learner, _) = user_token(&app.router, "IBU").await;

    let (status, body) = send(
        &app.router,
        "DELETE",
        "/api/tests/by-video/65f1c2a9e4b0a1b2c3d4e5f6",
        Some(&learner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["status"], 405);

    let (status, _) = send(
        &app.router,
        "GET",
        "/api/tests/by-video/65f1c2a9e4b0a1b2c3d4e5f6",
        Some(&learner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[serial]
async fn test_completion_respects_lowered_attempt_cap() {
    let app = spawn_app().await;
    let admin = admin_token(&app).await;
    let router = &app.router;
    let (_, test_id, _) = create_test_fixture(router, &admin).await;
    let (learner, _) = user_token(router, "IBU").await;

    let start = || send(router, "POST", "/api/test-attempts", Some(&learner), Some(json!({ "testId": test_id })));

    let (status, first) = start().await;
    assert_eq!(status, StatusCode::CREATED, "{}", first);
    let first_id = first["attempt"]["id"].as_str().unwrap().to_string();
    let (status, _) = send(router, "PUT", &format!("/api/test-attempts/{}/complete", first_id), Some(&learner), None).await;
    assert_eq!(status, StatusCode::OK);

    // A second attempt is open while the admin lowers the cap to the completed count
    let (status, second) = start().await;
    assert_eq!(status, StatusCode::CREATED, "{}", second);
    let second_id = second["attempt"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        router,
        "PUT",
        &format!("/api/tests/{}", test_id),
        Some(&admin),
        Some(json!({ "maxAttempts": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let complete_uri = format!("/api/test-attempts/{}/complete", second_id);
    let (status, body) = send(router, "PUT", &complete_uri, Some(&learner), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["message"], "Maximum attempts (1) reached for this test");

    // Raising the cap again lets the open attempt finish
    send(router, "PUT", &format!("/api/tests/{}", test_id), Some(&admin), Some(json!({ "maxAttempts": 2 }))).await;
    let (status, _) = send(router, "PUT", &complete_uri, Some(&learner), None).await;
    assert_eq!(status, StatusCode::OK);
}
