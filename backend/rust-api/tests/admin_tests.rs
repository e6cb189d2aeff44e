use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::json;
use serial_test::serial;
use tower::ServiceExt;

mod common;

use common::{admin_token, create_test_fixture, register, send, spawn_app, unique_email, user_token, youtube_id};

#[tokio::test]
#[serial]
async fn test_admin_routes_reject_other_roles() {
    let app = spawn_app().await;
    let (learner, _) = user_token(&app.router, "KADER").await;

    for (method, uri) in [
        ("GET", "/api/users"),
        ("GET", "/api/statistics"),
        ("GET", "/api/dashboard/stats"),
        ("GET", "/api/settings"),
        ("GET", "/api/tests"),
        ("POST", "/api/videos"),
    ] {
        let body = (method == "POST").then(|| json!({}));
        let (status, response) = send(&app.router, method, uri, Some(&learner), body).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{} {}", method, uri);
        assert_eq!(response["message"], "Admin access required");
    }

    // Learner reads of the same collections still work
    let (status, _) = send(&app.router, "GET", "/api/videos", Some(&learner), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[serial]
async fn test_user_management() {
    let app = spawn_app().await;
    let admin = admin_token(&app).await;
    let (_, user_id) = user_token(&app.router, "KADER").await;
    let taken = unique_email("taken");
    register(&app.router, &taken, "IBU").await;

    let user_uri = format!("/api/users/{}", user_id);
    let (status, user) = send(&app.router, "GET", &user_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["role"], "KADER");

    let (status, users) = send(&app.router, "GET", "/api/users?role=KADER&limit=500", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let users = users.as_array().unwrap();
    assert!(users.len() <= 100);
    assert!(users.iter().all(|u| u["role"] == "KADER"));

    let (status, _) = send(&app.router, "PUT", &user_uri, Some(&admin), Some(json!({ "email": taken }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, updated) = send(
        &app.router,
        "PUT",
        &user_uri,
        Some(&admin),
        Some(json!({ "city": "Bandung", "isActive": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["city"], "Bandung");
    assert_eq!(updated["isActive"], false);

    let (status, _) = send(&app.router, "DELETE", &user_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app.router, "GET", &user_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[serial]
async fn test_user_with_data_cannot_be_deleted() {
    let app = spawn_app().await;
    let admin = admin_token(&app).await;
    let (parent, parent_id) = user_token(&app.router, "IBU").await;

    send(
        &app.router,
        "POST",
        "/api/children",
        Some(&parent),
        Some(json!({ "name": "Sinta", "dateOfBirth": "2023-06-01", "gender": "FEMALE" })),
    )
    .await;

    let (status, body) = send(&app.router, "DELETE", &format!("/api/users/{}", parent_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot delete user with existing data. Deactivate instead.");
}

#[tokio::test]
#[serial]
async fn test_video_and_category_rules() {
    let app = spawn_app().await;
    let admin = admin_token(&app).await;
    let router = &app.router;

    let name = format!("Imunisasi {}", uuid::Uuid::new_v4().simple());
    let (status, category) = send(router, "POST", "/api/video-categories", Some(&admin), Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(router, "POST", "/api/video-categories", Some(&admin), Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        router,
        "POST",
        "/api/videos",
        Some(&admin),
        Some(json!({ "title": "Bad id", "youtubeId": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let yt = youtube_id();
    let (status, video) = send(
        router,
        "POST",
        "/api/videos",
        Some(&admin),
        Some(json!({ "title": "Jadwal imunisasi", "youtubeId": yt, "categoryId": category["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        video["thumbnailUrl"],
        format!("https://img.youtube.com/vi/{}/mqdefault.jpg", yt)
    );

    // A category with videos cannot be deleted
    let category_uri = format!("/api/video-categories/{}", category["id"].as_str().unwrap());
    let (status, _) = send(router, "DELETE", &category_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (learner, _) = user_token(router, "IBU").await;
    let (status, progress) = send(
        router,
        "POST",
        "/api/video-progress",
        Some(&learner),
        Some(json!({ "videoId": video["id"], "watchedDuration": 120, "isCompleted": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", progress);
    // Re-recording progress does not count another view
    send(
        router,
        "POST",
        "/api/video-progress",
        Some(&learner),
        Some(json!({ "videoId": video["id"], "watchedDuration": 130, "isCompleted": true })),
    )
    .await;

    let video_uri = format!("/api/videos/{}", video["id"].as_str().unwrap());
    let (status, detail) = send(router, "GET", &video_uri, Some(&learner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["viewCount"], 1);

    let (status, stats) = send(router, "GET", "/api/videos/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(stats["totalVideos"].as_u64().unwrap() >= 1);

    let (status, _) = send(router, "DELETE", &video_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(router, "DELETE", &category_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[serial]
async fn test_test_and_question_rules() {
    let app = spawn_app().await;
    let admin = admin_token(&app).await;
    let router = &app.router;
    let (video_id, test_id, questions) = create_test_fixture(router, &admin).await;

    // One test per video
    let (status, _) = send(router, "POST", "/api/tests", Some(&admin), Some(json!({ "title": "Again", "videoId": video_id }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        router,
        "PUT",
        &format!("/api/tests/{}", test_id),
        Some(&admin),
        Some(json!({ "passingScore": 101 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        router,
        "POST",
        "/api/questions",
        Some(&admin),
        Some(json!({
            "testId": test_id,
            "questionText": "Pilih satu",
            "type": "MULTIPLE_CHOICE",
            "options": ["A", "B"],
            "correctAnswer": "Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        router,
        "POST",
        "/api/questions",
        Some(&admin),
        Some(json!({
            "testId": test_id,
            "questionText": "Benar atau salah",
            "type": "TRUE_FALSE",
            "correctAnswer": "ya",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, listed) = send(router, "GET", &format!("/api/questions?testId={}", test_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 2);
    assert_eq!(listed[0]["correctAnswer"], "A");

    // Tests with questions are kept
    let (status, _) = send(router, "DELETE", &format!("/api/tests/{}", test_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    for id in &questions {
        let (status, _) = send(router, "DELETE", &format!("/api/questions/{}", id), Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = send(router, "DELETE", &format!("/api/tests/{}", test_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[serial]
async fn test_statistics_and_dashboard() {
    let app = spawn_app().await;
    let admin = admin_token(&app).await;
    let router = &app.router;

    let (status, body) = send(router, "GET", "/api/statistics?role=DOKTER", Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let (status, stats) = send(router, "GET", "/api/statistics?period=7d&role=ALL", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    for key in [
        "keyMetrics",
        "testPerformance",
        "rolePerformance",
        "questionAnalysis",
        "insights",
        "demographicAnalysis",
        "learningPatterns",
    ] {
        assert!(stats.get(key).is_some(), "missing {}", key);
    }
    assert!(stats["questionAnalysis"].as_array().unwrap().len() <= 50);
    assert!(stats["keyMetrics"]["trends"].is_object());

    let (status, dashboard) = send(router, "GET", "/api/dashboard/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(dashboard["totalUsers"].as_u64().unwrap() >= 1);
    assert!(dashboard["recentActivities"].as_array().unwrap().len() <= 4);
}

#[tokio::test]
#[serial]
async fn test_settings_validation_and_registration_switch() {
    let app = spawn_app().await;
    let admin = admin_token(&app).await;
    let router = &app.router;

    let (status, settings) = send(router, "GET", "/api/settings", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(settings["siteName"].is_string());

    for body in [json!({ "maxTestAttempts": 11 }), json!({ "defaultPassingScore": 0 })] {
        let (status, _) = send(router, "PUT", "/api/settings", Some(&admin), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, updated) = send(
        router,
        "PUT",
        "/api/settings",
        Some(&admin),
        Some(json!({ "registrationOpen": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["settings"]["registrationOpen"], false);

    let (status, _) = register(router, &unique_email("closed"), "IBU").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        router,
        "PUT",
        "/api/settings",
        Some(&admin),
        Some(json!({ "registrationOpen": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = register(router, &unique_email("open"), "IBU").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
#[serial]
async fn test_health_and_metrics_endpoints() {
    let app = common::create_test_app().await;

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-trace-id"));
    assert!(response
        .headers()
        .contains_key(header::CONTENT_SECURITY_POLICY));

    let response = app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, "GET", "/api/does-not-exist", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
#[serial]
async fn test_concurrent_first_progress_counts_one_view() {
    let app = spawn_app().await;
    let admin = admin_token(&app).await;
    let router = &app.router;
    let (video_id, _, _) = create_test_fixture(router, &admin).await;
    let (learner, _) = user_token(router, "AYAH").await;

    let body = json!({ "videoId": video_id, "watchedDuration": 30 });
    let (first, second) = tokio::join!(
        send(router, "POST", "/api/video-progress", Some(&learner), Some(body.clone())),
        send(router, "POST", "/api/video-progress", Some(&learner), Some(body.clone())),
    );
    assert_eq!(first.0, StatusCode::OK, "{}", first.1);
    assert_eq!(second.0, StatusCode::OK, "{}", second.1);
    assert_eq!(first.1["watchedDuration"], 30);
    assert_eq!(second.1["watchedDuration"], 30);

    let (status, detail) = send(router, "GET", &format!("/api/videos/{}", video_id), Some(&learner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["viewCount"], 1);
}

#[tokio::test]
#[serial]
async fn test_blank_titles_are_rejected() {
    let app = spawn_app().await;
    let admin = admin_token(&app).await;
    let router = &app.router;
    let (video_id, test_id, questions) = create_test_fixture(router, &admin).await;

    let (status, body) = send(
        router,
        "POST",
        "/api/videos",
        Some(&admin),
        Some(json!({ "title": "   ", "youtubeId": youtube_id() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Title is required");

    let cases = [
        ("PUT", format!("/api/videos/{}", video_id), json!({ "title": " " })),
        ("PUT", format!("/api/tests/{}", test_id), json!({ "title": "\t" })),
        ("PUT", format!("/api/questions/{}", questions[0]), json!({ "questionText": "  " })),
    ];
    for (method, uri, body) in cases {
        let (status, response) = send(router, method, &uri, Some(&admin), Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} {} -> {}", uri, body, response);
    }

    let (status, test) = send(router, "GET", &format!("/api/tests/{}", test_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(test["title"], "Kuis MPASI");

    let (status, _) = send(
        router,
        "POST",
        "/api/questions",
        Some(&admin),
        Some(json!({
            "testId": test_id,
            "questionText": "   ",
            "type": "TRUE_FALSE",
            "correctAnswer": "true",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (learner, _) = user_token(router, "IBU").await;
    let (status, _) = send(router, "PUT", "/api/users/profile", Some(&learner), Some(json!({ "name": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[serial]
async fn test_db_operations_are_counted() {
    use sicegah_api::metrics::DB_OPERATIONS_TOTAL;

    let app = spawn_app().await;
    let admin = admin_token(&app).await;
    let router = &app.router;
    let (kader, kader_id) = user_token(router, "KADER").await;
    let (status, _) = send(
        router,
        "POST",
        "/api/children",
        Some(&kader),
        Some(json!({ "name": "Sinta", "dateOfBirth": "2023-06-01", "gender": "FEMALE" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let counter = |operation: &str, collection: &str| {
        DB_OPERATIONS_TOTAL
            .with_label_values(&[operation, collection, "success"])
            .get()
    };
    let logins = counter("find_one", "users");
    let listings = counter("find", "users");
    let grouped = counter("aggregate", "children");

    common::login(router, &unique_email("nobody"), "whatever").await;
    let (status, users) = send(router, "GET", "/api/users?role=KADER&limit=100", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let row = users
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["id"] == kader_id.as_str())
        .expect("listed user");
    assert_eq!(row["counts"]["children"], 1);
    assert_eq!(row["counts"]["testAttempts"], 0);
    assert_eq!(row["counts"]["videoProgresses"], 0);

    assert!(counter("find_one", "users") > logins);
    assert!(counter("find", "users") > listings);
    assert!(counter("aggregate", "children") > grouped);
}
