// tests/api_tests.rs

use chrono::Utc;
use exam_bank::{
    config::{Config, StoreBackend},
    models::{
        ids::UserId,
        user::{ROLE_ADMIN, User},
    },
    routes,
    state::AppState,
    store::Store,
    utils::hash::hash_password,
};
use serde_json::{Value, json};

const ADMIN_USERNAME: &str = "admin_tester";
const ADMIN_PASSWORD: &str = "admin_password";

struct TestApp {
    address: String,
    store: Store,
    client: reqwest::Client,
}

/// Spawns the app on a random port backed by the in-memory store.
/// An admin account is seeded directly into the store.
async fn spawn_app() -> TestApp {
    let store = Store::in_memory();

    let config = Config {
        store_backend: StoreBackend::Memory,
        database_url: None,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        cors_origins: vec!["http://localhost:3000".to_string()],
        admin_username: None,
        admin_password: None,
    };

    store
        .users
        .create_user(&User {
            id: UserId::new(),
            username: ADMIN_USERNAME.to_string(),
            password: hash_password(ADMIN_PASSWORD).unwrap(),
            role: ROLE_ADMIN.to_string(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let app = routes::create_router(AppState::new(store.clone(), config));

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        store,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let body: Value = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Login failed")
            .json()
            .await
            .expect("Failed to parse login json");
        body["data"]["token"]
            .as_str()
            .expect("Token not found")
            .to_string()
    }

    /// Registers a fresh user and returns its bearer token.
    async fn user_token(&self) -> String {
        let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
        let resp = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({ "username": username, "password": "password123" }))
            .send()
            .await
            .expect("Register failed");
        assert_eq!(resp.status().as_u16(), 201);
        self.login(&username, "password123").await
    }

    async fn admin_token(&self) -> String {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }

    /// Imports `count` questions into one chapter, tagged with a title and an exam.
    /// Every correct key is "A".
    async fn import(&self, token: &str, count: usize) -> Value {
        let questions: Vec<Value> = (1..=count)
            .map(|n| {
                json!({
                    "subjectName": "Geography",
                    "unitName": "Rajasthan",
                    "chapterName": "Rivers",
                    "questionTextHi": format!("प्रश्न {n}"),
                    "questionTextEn": format!("Question {n}"),
                    "questionNumber": n,
                    "options": [
                        { "key": "A", "textHi": "क", "textEn": "Right" },
                        { "key": "B", "textHi": "ख", "textEn": "Wrong" },
                        { "key": "C", "textHi": "ग", "textEn": "Wrong" },
                        { "key": "D", "textHi": "घ", "textEn": "Wrong" }
                    ],
                    "correctOptionKey": "A"
                })
            })
            .collect();

        let resp = self
            .client
            .post(self.url("/api/admin/questions/bulk"))
            .bearer_auth(token)
            .json(&json!({
                "title": "Rajasthan GK 500",
                "exam": "RAS 2025 Mains",
                "questions": questions
            }))
            .send()
            .await
            .expect("Bulk import failed");
        assert_eq!(resp.status().as_u16(), 201);
        resp.json().await.unwrap()
    }

    async fn get_data(&self, path: &str) -> Value {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 200, "GET {path}");
        let body: Value = resp.json().await.unwrap();
        body["data"].clone()
    }

    /// The exam set created by [`TestApp::import`].
    async fn exam_set(&self) -> Value {
        let body: Value = self
            .client
            .get(self.url("/api/sets?quizType=exam"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let sets = body["data"].as_array().expect("sets array");
        assert_eq!(sets.len(), 1);
        sets[0].clone()
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let app = spawn_app().await;

    let resp = app.client.get(app.url("/health")).send().await.unwrap();

    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "OK");
}

#[tokio::test]
async fn unknown_path_is_404() {
    let app = spawn_app().await;

    let resp = app
        .client
        .get(app.url("/random_path_that_does_not_exist"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn register_fails_validation() {
    let app = spawn_app().await;

    // Username too short
    let resp = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({ "username": "yo", "password": "password123" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let app = spawn_app().await;
    let payload = json!({ "username": "repeat_user", "password": "password123" });

    let first = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 201);

    let second = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 409);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = spawn_app().await;

    let resp = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": ADMIN_USERNAME, "password": "nope" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn attempts_require_a_token() {
    let app = spawn_app().await;

    let resp = app
        .client
        .get(app.url(&format!(
            "/api/attempts/progress?questionSetId={}",
            uuid::Uuid::new_v4()
        )))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn admin_routes_reject_regular_users() {
    let app = spawn_app().await;
    let token = app.user_token().await;

    let resp = app
        .client
        .post(app.url("/api/admin/sets/chapters"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn bulk_import_packs_and_lists_sets() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let report = app.import(&admin, 3).await;
    assert_eq!(report["data"]["created"], 3);
    assert_eq!(report["data"]["chaptersCreated"], 1);
    assert!(report["data"]["errors"].as_array().unwrap().is_empty());

    // Exam sets are published immediately.
    let exam_set = app.exam_set().await;
    assert_eq!(exam_set["totalQuestions"], 3);

    // Chapter sets stay unpublished until full, but the paginated chapter view shows them.
    let chapters = app.store.taxonomy.list_chapters(None).await.unwrap();
    assert_eq!(chapters.len(), 1);
    let page: Value = app
        .client
        .get(app.url(&format!("/api/chapters/{}/sets?limit=5", chapters[0].id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["data"]["pagination"]["totalSets"], 1);
    assert_eq!(page["data"]["sets"][0]["isActive"], false);

    // Re-importing the same rows only reports duplicates.
    let again = app.import(&admin, 3).await;
    assert_eq!(again["data"]["created"], 0);
    assert_eq!(again["data"]["errors"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn answer_flow_scores_resumes_and_resets() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    app.import(&admin, 3).await;

    let set_id = app.exam_set().await["id"].as_str().unwrap().to_string();
    let set: Value = app
        .client
        .get(app.url(&format!("/api/sets/{}", set_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let questions = set["data"]["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 3);
    assert!(questions[0].get("correctOptionKey").is_none());

    let token = app.user_token().await;
    let answer = |question: &Value, key: &str| {
        json!({
            "questionSetId": set_id,
            "questionId": question["id"],
            "answerKey": key,
            "questionTime": 5,
            "totalTime": 5
        })
    };

    // Correct, then wrong: 1 - 0.33.
    for (q, key) in [(&questions[0], "A"), (&questions[1], "B")] {
        let resp = app
            .client
            .post(app.url("/api/attempts/progress"))
            .bearer_auth(&token)
            .json(&answer(q, key))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
    }

    let progress: Value = app
        .client
        .get(app.url(&format!("/api/attempts/progress?questionSetId={}", set_id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let score = progress["data"]["score"].as_f64().unwrap();
    assert!((score - 0.67).abs() < 1e-9);
    assert_eq!(progress["data"]["attemptedQuestions"].as_array().unwrap().len(), 2);

    // Another user sees nothing.
    let stranger = app.user_token().await;
    let other: Value = app
        .client
        .get(app.url(&format!("/api/attempts/progress?questionSetId={}", set_id)))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(other["data"].is_null());

    let reset: Value = app
        .client
        .post(app.url("/api/attempts/reset"))
        .bearer_auth(&token)
        .json(&json!({ "questionSetId": set_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reset["data"]["success"], true);
    assert_eq!(reset["data"]["reset"], 1);

    let after: Value = app
        .client
        .get(app.url(&format!("/api/attempts/progress?questionSetId={}", set_id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(after["data"].is_null());
}

#[tokio::test]
async fn answering_an_unknown_set_is_404() {
    let app = spawn_app().await;
    let token = app.user_token().await;

    let resp = app
        .client
        .post(app.url("/api/attempts/progress"))
        .bearer_auth(&token)
        .json(&json!({
            "questionSetId": uuid::Uuid::new_v4(),
            "questionId": uuid::Uuid::new_v4(),
            "answerKey": "A"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn taxonomy_can_be_browsed_down_to_chapters() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    app.import(&admin, 2).await;

    let titles = app.get_data("/api/titles").await;
    assert_eq!(titles[0]["name"]["en"], "Rajasthan GK 500");
    let title_id = titles[0]["id"].as_str().unwrap().to_string();

    let exams = app.get_data("/api/exams").await;
    assert_eq!(exams.as_array().unwrap().len(), 1);
    assert_eq!(exams[0]["name"]["en"], "RAS 2025 Mains");

    let subjects = app.get_data("/api/subjects").await;
    assert_eq!(subjects.as_array().unwrap().len(), 1);
    let subject_id = subjects[0]["id"].as_str().unwrap().to_string();

    let for_title = app.get_data(&format!("/api/subjects?titleId={title_id}")).await;
    assert_eq!(for_title[0]["id"], subject_id.as_str());
    let other_title = app
        .get_data(&format!("/api/subjects?titleId={}", uuid::Uuid::new_v4()))
        .await;
    assert!(other_title.as_array().unwrap().is_empty());

    let units = app.get_data(&format!("/api/subjects/{subject_id}/units")).await;
    assert_eq!(units[0]["name"]["en"], "Rajasthan");
    let unit_id = units[0]["id"].as_str().unwrap().to_string();

    let unit = app.get_data(&format!("/api/units/{unit_id}")).await;
    assert_eq!(unit["chapters"][0]["name"]["en"], "Rivers");

    let token = app.user_token().await;
    let annotated: Value = app
        .client
        .get(app.url(&format!("/api/units/{unit_id}/sets")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(annotated["data"][0]["chapter"]["name"]["en"], "Rivers");
    let sets = annotated["data"][0]["sets"].as_array().unwrap();
    assert!(!sets.is_empty());
    assert!(sets.iter().all(|s| s["status"] == "not_started"));

    let missing = app
        .client
        .get(app.url(&format!("/api/units/{}", uuid::Uuid::new_v4())))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 404);
}
