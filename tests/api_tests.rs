// tests/api_tests.rs

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use quizlock_backend::config::Config;
use quizlock_backend::error::AppError;
use quizlock_backend::gateway::PaymentGateway;
use quizlock_backend::routes;
use quizlock_backend::session::SessionRegistry;
use quizlock_backend::state::AppState;
use quizlock_backend::store::{GameStore, MemGameStore};

/// Gateway double: returns canned references and counts calls.
#[derive(Default)]
struct TestGateway {
    locks: AtomicUsize,
    payouts: AtomicUsize,
    recipients: Mutex<Vec<String>>,
}

#[async_trait]
impl PaymentGateway for TestGateway {
    async fn lock_funds(&self, _amount: i64) -> Result<String, AppError> {
        let n = self.locks.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("lock_tx_{}", n))
    }

    async fn pay_winner(
        &self,
        _lock_ref: &str,
        _amount: i64,
        recipient: &str,
    ) -> Result<String, AppError> {
        let n = self.payouts.fetch_add(1, Ordering::SeqCst) + 1;
        self.recipients.lock().unwrap().push(recipient.to_string());
        Ok(format!("payout_tx_{}", n))
    }
}

struct TestApp {
    address: String,
    store: Arc<MemGameStore>,
    gateway: Arc<TestGateway>,
}

/// Spawns the app on a random port against the in-memory store.
/// Reveal pacing is shrunk so streaming tests finish quickly.
async fn spawn_app() -> TestApp {
    let store = Arc::new(MemGameStore::new());
    let gateway = Arc::new(TestGateway::default());

    let config = Config {
        database_url: "postgres://unused-in-tests".to_string(),
        gateway_url: "http://127.0.0.1:0".to_string(),
        gateway_api_key: None,
        rust_log: "error".to_string(),
        reveal_step: Duration::from_millis(10),
        payout_delay: Duration::from_millis(10),
    };

    let state = AppState {
        store: store.clone(),
        gateway: gateway.clone(),
        sessions: SessionRegistry::new(),
        config,
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        store,
        gateway,
    }
}

fn unique_owner() -> String {
    format!("addr_test1q{}", &uuid::Uuid::new_v4().to_string()[..8])
}

async fn create_game(
    client: &reqwest::Client,
    app: &TestApp,
    owner: &str,
    question_count: i32,
    duration_minutes: i32,
) -> serde_json::Value {
    let response = client
        .post(&format!("{}/api/games", app.address))
        .json(&serde_json::json!({
            "owner": owner,
            "title": "Block Trivia Night",
            "reward_amount": 25,
            "question_count": question_count,
            "duration_minutes": duration_minutes,
        }))
        .send()
        .await
        .expect("Failed to create game");

    assert_eq!(response.status().as_u16(), 201);
    response.json().await.expect("Failed to parse game json")
}

async fn seed_questions(
    client: &reqwest::Client,
    app: &TestApp,
    passcode: i64,
    question_count: i32,
) {
    for idx in 1..=question_count {
        let response = client
            .put(&format!(
                "{}/api/host/{}/questions/{}",
                app.address, passcode, idx
            ))
            .json(&serde_json::json!({
                "content": format!("Question {}", idx),
                "options": ["One", "Two", "Three", "Four"],
                "correct_option": "A",
                "points": 100,
            }))
            .send()
            .await
            .expect("Failed to save question");
        assert_eq!(response.status().as_u16(), 200);
    }
}

async fn activate(client: &reqwest::Client, app: &TestApp, passcode: i64) {
    let response = client
        .post(&format!("{}/api/host/{}/activate", app.address, passcode))
        .send()
        .await
        .expect("Failed to activate game");
    assert_eq!(response.status().as_u16(), 200);
}

async fn join(
    client: &reqwest::Client,
    app: &TestApp,
    passcode: i64,
    address: &str,
    nickname: &str,
) -> reqwest::Response {
    client
        .post(&format!("{}/api/play/{}/join", app.address, passcode))
        .json(&serde_json::json!({ "address": address, "nickname": nickname }))
        .send()
        .await
        .expect("Failed to send join request")
}

#[tokio::test]
async fn health_check_404() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(&format!("{}/random_path_that_does_not_exist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn create_game_assigns_a_four_digit_passcode() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let game = create_game(&client, &app, &unique_owner(), 10, 2).await;

    let passcode = game["passcode"].as_i64().unwrap();
    assert!((1000..=9999).contains(&passcode));
    assert_eq!(game["state"], "draft");
    assert_eq!(game["max_participants"], 5);
    assert_eq!(game["current_participants"], 0);
}

#[tokio::test]
async fn create_game_rejects_unsupported_question_count() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/api/games", app.address))
        .json(&serde_json::json!({
            "owner": unique_owner(),
            "title": "Bad size",
            "reward_amount": 25,
            "question_count": 12,
            "duration_minutes": 2,
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn listing_games_by_owner_returns_only_theirs() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let owner = unique_owner();

    create_game(&client, &app, &owner, 10, 2).await;
    create_game(&client, &app, &owner, 15, 3).await;
    create_game(&client, &app, &unique_owner(), 10, 2).await;

    let games: Vec<serde_json::Value> = client
        .get(&format!("{}/api/games?owner={}", app.address, owner))
        .send()
        .await
        .expect("Failed to list games")
        .json()
        .await
        .unwrap();

    assert_eq!(games.len(), 2);
    assert!(games.iter().all(|g| g["owner"] == owner.as_str()));
}

#[tokio::test]
async fn full_quiz_flow_scores_and_reveals() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let owner = unique_owner();

    // Host sets up a 10-question game, 2 minutes total.
    let game = create_game(&client, &app, &owner, 10, 2).await;
    let passcode = game["passcode"].as_i64().unwrap();
    let game_id = game["id"].as_i64().unwrap();

    seed_questions(&client, &app, passcode, 10).await;
    activate(&client, &app, passcode).await;

    assert_eq!(app.gateway.locks.load(Ordering::SeqCst), 1);
    let stored = app.store.game_by_id(game_id).await.unwrap().unwrap();
    assert_eq!(stored.lock_tx.as_deref(), Some("lock_tx_1"));

    // Two players join; only alice plays.
    assert_eq!(
        join(&client, &app, passcode, "addr_test1qalice", "alice")
            .await
            .status()
            .as_u16(),
        200
    );
    assert_eq!(
        join(&client, &app, passcode, "addr_test1qbob", "bob")
            .await
            .status()
            .as_u16(),
        200
    );

    let player = serde_json::json!({ "address": "addr_test1qalice", "nickname": "alice" });

    let start = client
        .post(&format!("{}/api/play/{}/start", app.address, passcode))
        .json(&player)
        .send()
        .await
        .expect("Failed to start session");
    assert_eq!(start.status().as_u16(), 200);
    let start_body: serde_json::Value = start.json().await.unwrap();
    // 2 minutes over 10 questions -> 12 seconds each.
    assert_eq!(start_body["seconds_per_question"], 12.0);

    let confirm = client
        .post(&format!("{}/api/play/{}/confirm", app.address, passcode))
        .json(&player)
        .send()
        .await
        .expect("Failed to confirm session");
    assert_eq!(confirm.status().as_u16(), 200);

    // First five answers right, last five wrong.
    for idx in 1..=10 {
        let option = if idx <= 5 { "A" } else { "B" };
        let response = client
            .post(&format!("{}/api/play/{}/answer", app.address, passcode))
            .json(&serde_json::json!({
                "address": "addr_test1qalice",
                "nickname": "alice",
                "index": idx,
                "option": option,
            }))
            .send()
            .await
            .expect("Failed to submit answer");
        assert_eq!(response.status().as_u16(), 200);
    }

    // The session settles the submissions asynchronously.
    let mut result = serde_json::Value::Null;
    for _ in 0..50 {
        let response = client
            .get(&format!(
                "{}/api/play/{}/result?address=addr_test1qalice&nickname=alice",
                app.address, passcode
            ))
            .send()
            .await
            .expect("Failed to fetch result");
        result = response.json().await.unwrap();
        if result["completed"] == true {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(result["completed"], true, "session never completed");
    assert_eq!(result["points"], 500);
    assert_eq!(result["max_points"], 1000);

    // Host ends the game and runs the reveal.
    let end = client
        .post(&format!("{}/api/host/{}/end", app.address, passcode))
        .send()
        .await
        .expect("Failed to end game");
    assert_eq!(end.status().as_u16(), 200);

    let leaderboard: Vec<serde_json::Value> = client
        .get(&format!("{}/api/host/{}/leaderboard", app.address, passcode))
        .send()
        .await
        .expect("Failed to fetch leaderboard")
        .json()
        .await
        .unwrap();
    assert_eq!(leaderboard[0]["nickname"], "alice");
    assert_eq!(leaderboard[0]["points"], 500);
    assert_eq!(leaderboard[1]["nickname"], "bob");

    let body = read_sse(&client, &app, passcode).await;
    assert!(body.contains("\"type\":\"row\""));
    assert!(body.contains("\"type\":\"payout\""));
    assert!(body.contains("\"type\":\"complete\""));

    assert_eq!(app.gateway.payouts.load(Ordering::SeqCst), 1);
    assert_eq!(
        *app.gateway.recipients.lock().unwrap(),
        vec!["addr_test1qalice".to_string()]
    );

    let settled = app.store.game_by_id(game_id).await.unwrap().unwrap();
    assert!(settled.reward_paid);
    assert_eq!(settled.reward_tx.as_deref(), Some("payout_tx_1"));

    // A reloaded leaderboard shows the stored reference, no second payout.
    let body = read_sse(&client, &app, passcode).await;
    assert!(body.contains("\"already_paid\":true"));
    assert_eq!(app.gateway.payouts.load(Ordering::SeqCst), 1);
}

/// Reads the reveal stream to its end and returns the raw body.
async fn read_sse(client: &reqwest::Client, app: &TestApp, passcode: i64) -> String {
    let mut response = client
        .get(&format!("{}/api/host/{}/reveal", app.address, passcode))
        .send()
        .await
        .expect("Failed to open reveal stream");
    assert_eq!(response.status().as_u16(), 200);

    let mut body = String::new();
    while let Some(chunk) = response.chunk().await.expect("Stream error") {
        body.push_str(&String::from_utf8_lossy(&chunk));
    }
    body
}

#[tokio::test]
async fn sixth_join_is_rejected_and_leaves_no_trace() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let game = create_game(&client, &app, &unique_owner(), 10, 2).await;
    let passcode = game["passcode"].as_i64().unwrap();
    let game_id = game["id"].as_i64().unwrap();

    seed_questions(&client, &app, passcode, 10).await;
    activate(&client, &app, passcode).await;

    for i in 0..5 {
        let response = join(
            &client,
            &app,
            passcode,
            &format!("addr_test1qp{}", i),
            &format!("player{}", i),
        )
        .await;
        assert_eq!(response.status().as_u16(), 200);
    }

    let response = join(&client, &app, passcode, "addr_test1qlate", "late").await;
    assert_eq!(response.status().as_u16(), 409);

    let stored = app.store.game_by_id(game_id).await.unwrap().unwrap();
    assert_eq!(stored.current_participants, 5);

    let players: Vec<serde_json::Value> = client
        .get(&format!("{}/api/host/{}/players", app.address, passcode))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(players.len(), 5);
    assert!(players.iter().all(|p| p["nickname"] != "late"));
}

#[tokio::test]
async fn joining_a_draft_game_is_rejected() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let game = create_game(&client, &app, &unique_owner(), 10, 2).await;
    let passcode = game["passcode"].as_i64().unwrap();

    let response = join(&client, &app, passcode, "addr_test1qeager", "eager").await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn duplicate_join_is_rejected() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let game = create_game(&client, &app, &unique_owner(), 10, 2).await;
    let passcode = game["passcode"].as_i64().unwrap();
    let game_id = game["id"].as_i64().unwrap();

    seed_questions(&client, &app, passcode, 10).await;
    activate(&client, &app, passcode).await;

    assert_eq!(
        join(&client, &app, passcode, "addr_test1qsam", "sam")
            .await
            .status()
            .as_u16(),
        200
    );
    assert_eq!(
        join(&client, &app, passcode, "addr_test1qsam", "sam")
            .await
            .status()
            .as_u16(),
        409
    );

    let stored = app.store.game_by_id(game_id).await.unwrap().unwrap();
    assert_eq!(stored.current_participants, 1);
}

#[tokio::test]
async fn leaving_twice_is_a_no_op() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let game = create_game(&client, &app, &unique_owner(), 10, 2).await;
    let passcode = game["passcode"].as_i64().unwrap();
    let game_id = game["id"].as_i64().unwrap();

    seed_questions(&client, &app, passcode, 10).await;
    activate(&client, &app, passcode).await;

    join(&client, &app, passcode, "addr_test1qtess", "tess").await;

    for _ in 0..2 {
        let response = client
            .post(&format!("{}/api/play/{}/leave", app.address, passcode))
            .json(&serde_json::json!({ "address": "addr_test1qtess", "nickname": "tess" }))
            .send()
            .await
            .expect("Failed to leave");
        assert_eq!(response.status().as_u16(), 200);
    }

    let stored = app.store.game_by_id(game_id).await.unwrap().unwrap();
    assert_eq!(stored.current_participants, 0);
}

#[tokio::test]
async fn reactivation_wipes_the_previous_run() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let game = create_game(&client, &app, &unique_owner(), 10, 2).await;
    let passcode = game["passcode"].as_i64().unwrap();
    let game_id = game["id"].as_i64().unwrap();

    seed_questions(&client, &app, passcode, 10).await;
    activate(&client, &app, passcode).await;
    join(&client, &app, passcode, "addr_test1qfirst", "first").await;

    client
        .post(&format!("{}/api/host/{}/end", app.address, passcode))
        .send()
        .await
        .expect("Failed to end game");

    // Settle the reward so the flag is set before the second run.
    read_sse(&client, &app, passcode).await;
    let stored = app.store.game_by_id(game_id).await.unwrap().unwrap();
    assert!(stored.reward_paid);

    activate(&client, &app, passcode).await;

    let stored = app.store.game_by_id(game_id).await.unwrap().unwrap();
    assert_eq!(stored.current_participants, 0);
    assert!(!stored.reward_paid);
    assert!(stored.reward_tx.is_none());
    assert_eq!(stored.state, quizlock_backend::models::game::GameState::Active);

    let players: Vec<serde_json::Value> = client
        .get(&format!("{}/api/host/{}/players", app.address, passcode))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(players.is_empty());

    // Both activations locked a fresh reward.
    assert_eq!(app.gateway.locks.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn questions_are_immutable_while_active() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let game = create_game(&client, &app, &unique_owner(), 10, 2).await;
    let passcode = game["passcode"].as_i64().unwrap();

    seed_questions(&client, &app, passcode, 10).await;
    activate(&client, &app, passcode).await;

    let response = client
        .put(&format!("{}/api/host/{}/questions/1", app.address, passcode))
        .json(&serde_json::json!({
            "content": "Rewritten mid-game",
            "options": ["One", "Two", "Three", "Four"],
            "correct_option": "B",
            "points": 100,
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn starting_without_joining_is_rejected() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let game = create_game(&client, &app, &unique_owner(), 10, 2).await;
    let passcode = game["passcode"].as_i64().unwrap();

    seed_questions(&client, &app, passcode, 10).await;
    activate(&client, &app, passcode).await;

    let response = client
        .post(&format!("{}/api/play/{}/start", app.address, passcode))
        .json(&serde_json::json!({ "address": "addr_test1qghost", "nickname": "ghost" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn updating_a_game_is_blocked_while_active() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let game = create_game(&client, &app, &unique_owner(), 10, 2).await;
    let passcode = game["passcode"].as_i64().unwrap();
    let game_id = game["id"].as_i64().unwrap();

    // Draft games are editable.
    let response = client
        .put(&format!("{}/api/games/{}", app.address, game_id))
        .json(&serde_json::json!({ "title": "Renamed", "duration_minutes": 3 }))
        .send()
        .await
        .expect("Failed to update game");
    assert_eq!(response.status().as_u16(), 200);
    let updated: serde_json::Value = response.json().await.unwrap();
    assert_eq!(updated["title"], "Renamed");
    assert_eq!(updated["duration_minutes"], 3);

    seed_questions(&client, &app, passcode, 10).await;
    activate(&client, &app, passcode).await;

    let response = client
        .put(&format!("{}/api/games/{}", app.address, game_id))
        .json(&serde_json::json!({ "title": "Mid-game rename" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn deleting_a_game_removes_it_and_its_passcode() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let game = create_game(&client, &app, &unique_owner(), 10, 2).await;
    let passcode = game["passcode"].as_i64().unwrap();
    let game_id = game["id"].as_i64().unwrap();

    let response = client
        .delete(&format!("{}/api/games/{}", app.address, game_id))
        .send()
        .await
        .expect("Failed to delete game");
    assert_eq!(response.status().as_u16(), 204);

    let response = client
        .get(&format!("{}/api/play/{}", app.address, passcode))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 404);

    // Deleting again is a 404, not a silent success.
    let response = client
        .delete(&format!("{}/api/games/{}", app.address, game_id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn unknown_passcode_is_not_found() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/api/play/1234", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}
