//! HTTP transport integration tests.
//!
//! Starts an axum server and exercises it with reqwest.

use std::sync::Arc;

use arcade_index::http::{self, AppState};
use arcade_index::{InMemoryStore, IndexConfig, SharedStore};
use serde_json::{json, Value};

const SECRET: &str = "test-secret";

fn test_state(secret: Option<&str>) -> (SharedStore, AppState) {
    let store: SharedStore = Arc::new(InMemoryStore::new());
    let config = IndexConfig {
        write_secret: secret.map(str::to_string),
        max_page_size: 3,
        default_leaderboard_limit: 2,
        default_scores_limit: 2,
        ..IndexConfig::default()
    };
    (store.clone(), AppState::new(config, store))
}

/// Bind to port 0 and return the actual address.
async fn start_server(state: AppState) -> String {
    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn post(client: &reqwest::Client, url: String, body: Value) -> (u16, Value) {
    let resp = client.post(url).bearer_auth(SECRET).json(&body).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn get(client: &reqwest::Client, url: String) -> (u16, Value) {
    let resp = client.get(url).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn seeded() -> (String, reqwest::Client) {
    let (_, state) = test_state(Some(SECRET));
    let base = start_server(state).await;
    let client = reqwest::Client::new();
    for (identity, name) in [("alice", "alice"), ("bob", "bobby"), ("carol", "carol")] {
        let (status, _) = post(
            &client,
            format!("{base}/register"),
            json!({ "identity": identity, "displayName": name }),
        )
        .await;
        assert_eq!(status, 200);
    }
    for (identity, raw, xp) in [("bob", 40, 500), ("alice", 25, 300), ("alice", 10, 50)] {
        let (status, _) = post(
            &client,
            format!("{base}/submit-score"),
            json!({ "identity": identity, "gameType": "MATH_BLITZ", "rawScore": raw, "xpEarned": xp }),
        )
        .await;
        assert_eq!(status, 200);
    }
    (base, client)
}

#[tokio::test]
async fn health_reports_backend() {
    let (_, state) = test_state(None);
    let base = start_server(state).await;
    let (status, body) = get(&reqwest::Client::new(), format!("{base}/health")).await;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], true);
    assert_eq!(body["data"]["backend"], "memory");
}

#[tokio::test]
async fn games_lists_catalogue() {
    let (_, state) = test_state(None);
    let base = start_server(state).await;
    let (_, body) = get(&reqwest::Client::new(), format!("{base}/games")).await;
    let games = body["data"].as_array().unwrap();
    assert_eq!(games.len(), 5);
    assert_eq!(games[0]["gameType"], "SPEED_CLICKER");
    assert_eq!(games[0]["id"], 1);
}

#[tokio::test]
async fn register_and_submit() {
    let (_, state) = test_state(Some(SECRET));
    let base = start_server(state).await;
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        format!("{base}/register"),
        json!({ "identity": "0xAlice", "displayName": "alice", "shardRef": "chain-1" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], true);
    assert_eq!(body["data"]["identityKey"], "0xalice");
    assert_eq!(body["data"]["level"], 1);

    let (status, body) = post(
        &client,
        format!("{base}/submit-score"),
        json!({
            "identity": "0xALICE",
            "gameType": "SPEED_CLICKER",
            "rawScore": 20,
            "xpEarned": 200,
            "bonusData": 3
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["rawScore"], 20);
    assert_eq!(body["data"]["bonusData"], 3);
    assert_eq!(body["data"]["replayed"], false);
    assert_eq!(body["data"]["player"]["totalXp"], 200);
    assert_eq!(body["data"]["player"]["level"], 2);
    assert_eq!(body["data"]["player"]["gamesPlayed"], 1);

    let (_, body) = get(&client, format!("{base}/stats")).await;
    assert_eq!(
        body["data"],
        json!({
            "totalPlayers": 1,
            "totalGamesPlayed": 1,
            "totalXpEarned": 200,
            "topXp": 200,
            "highestLevel": 2
        })
    );
}

#[tokio::test]
async fn writes_without_credential_are_unauthorized_and_change_nothing() {
    let (store, state) = test_state(Some(SECRET));
    let base = start_server(state).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/register"))
        .json(&json!({ "identity": "alice", "displayName": "alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["kind"], "Unauthorized");

    let resp = client
        .post(format!("{base}/register"))
        .header(http::SECRET_HEADER, "wrong")
        .json(&json!({ "identity": "alice", "displayName": "alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    assert!(store.list_players().unwrap().is_empty());
    assert_eq!(store.stats().unwrap().total_players, 0);
}

#[tokio::test]
async fn secret_header_is_accepted() {
    let (_, state) = test_state(Some(SECRET));
    let base = start_server(state).await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/register"))
        .header(http::SECRET_HEADER, SECRET)
        .json(&json!({ "identity": "alice", "displayName": "alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn invalid_input_maps_to_400() {
    let (_, state) = test_state(Some(SECRET));
    let base = start_server(state).await;
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        format!("{base}/register"),
        json!({ "identity": "alice", "displayName": "a!" }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["kind"], "InvalidInput");

    let (status, body) = post(&client, format!("{base}/register"), json!({ "identity": 5 })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["kind"], "InvalidInput");

    post(
        &client,
        format!("{base}/register"),
        json!({ "identity": "alice", "displayName": "alice" }),
    )
    .await;
    for bad in [
        json!({ "identity": "alice", "gameType": "PONG", "rawScore": 1, "xpEarned": 1 }),
        json!({ "identity": "alice", "gameType": "MATH_BLITZ", "rawScore": -1, "xpEarned": 1 }),
        json!({ "identity": "alice", "gameType": "MATH_BLITZ", "rawScore": 1, "xpEarned": -9 }),
    ] {
        let (status, body) = post(&client, format!("{base}/submit-score"), bad).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["kind"], "InvalidInput");
    }

    let (status, _) = get(&client, format!("{base}/scores/game/PONG")).await;
    assert_eq!(status, 400);
    let (status, _) = get(&client, format!("{base}/leaderboard?limit=many")).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn unknown_player_is_404_or_null() {
    let (_, state) = test_state(Some(SECRET));
    let base = start_server(state).await;
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        format!("{base}/submit-score"),
        json!({ "identity": "ghost", "gameType": "MATH_BLITZ", "rawScore": 1, "xpEarned": 1 }),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["kind"], "NotFound");

    let (status, _) = get(&client, format!("{base}/player/ghost")).await;
    assert_eq!(status, 404);

    let (status, body) = get(&client, format!("{base}/player-rank/ghost")).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], Value::Null);
}

#[tokio::test]
async fn read_views() {
    let (base, client) = seeded().await;

    let (_, body) = get(&client, format!("{base}/leaderboard")).await;
    let board = body["data"].as_array().unwrap();
    // default page is 2
    assert_eq!(board.len(), 2);
    assert_eq!(board[0]["identityKey"], "bob");
    assert_eq!(board[0]["rank"], 1);
    assert_eq!(board[1]["identityKey"], "alice");
    assert_eq!(board[1]["totalXp"], 350);

    // clamped to the max page of 3
    let (_, body) = get(&client, format!("{base}/leaderboard?limit=500")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (_, body) = get(&client, format!("{base}/player-rank/CAROL")).await;
    assert_eq!(body["data"], 3);

    let (_, body) = get(&client, format!("{base}/players")).await;
    let players: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["identityKey"].as_str().unwrap())
        .collect();
    assert_eq!(players, vec!["bob", "alice", "carol"]);

    let (_, body) = get(&client, format!("{base}/player/alice")).await;
    assert_eq!(body["data"]["gamesPlayed"], 2);

    let (_, body) = get(&client, format!("{base}/scores/recent?limit=1")).await;
    let recent = body["data"].as_array().unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0]["rawScore"], 10);

    let (_, body) = get(&client, format!("{base}/scores/game/math_blitz?limit=3")).await;
    let raws: Vec<u64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["rawScore"].as_u64().unwrap())
        .collect();
    assert_eq!(raws, vec![40, 25, 10]);

    let (_, body) = get(&client, format!("{base}/scores/highscores/MATH_BLITZ?limit=3")).await;
    let highs = body["data"].as_array().unwrap();
    assert_eq!(highs.len(), 2);
    assert_eq!(highs[0]["identityKey"], "bob");
    assert_eq!(highs[1]["identityKey"], "alice");
    assert_eq!(highs[1]["rawScore"], 25);
    assert_eq!(highs[1]["displayName"], "alice");
    assert_eq!(highs[1]["rank"], 2);
}

#[tokio::test]
async fn delete_player_requires_credential_and_cascades() {
    let (base, client) = seeded().await;

    let resp = client.delete(format!("{base}/player/alice")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .delete(format!("{base}/player/alice"))
        .bearer_auth(SECRET)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["removed"], "alice");

    let (status, _) = get(&client, format!("{base}/player/alice")).await;
    assert_eq!(status, 404);
    let (_, body) = get(&client, format!("{base}/scores/highscores/MATH_BLITZ")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (_, body) = get(&client, format!("{base}/stats")).await;
    assert_eq!(body["data"]["totalPlayers"], 3);
    assert_eq!(body["data"]["totalGamesPlayed"], 3);
}

#[tokio::test]
async fn replayed_submission_is_reported() {
    let (_, state) = test_state(Some(SECRET));
    let base = start_server(state).await;
    let client = reqwest::Client::new();
    post(
        &client,
        format!("{base}/register"),
        json!({ "identity": "alice", "displayName": "alice" }),
    )
    .await;

    let body = json!({
        "identity": "alice",
        "gameType": "SNAKE_SPRINT",
        "rawScore": 9,
        "xpEarned": 90,
        "submissionId": "run-1"
    });
    let (_, first) = post(&client, format!("{base}/submit-score"), body.clone()).await;
    let (status, second) = post(&client, format!("{base}/submit-score"), body).await;
    assert_eq!(status, 200);
    assert_eq!(second["data"]["replayed"], true);
    assert_eq!(second["data"]["id"], first["data"]["id"]);
    assert_eq!(second["data"]["player"]["totalXp"], 90);

    let (status, body) = post(
        &client,
        format!("{base}/submit-score"),
        json!({
            "identity": "alice",
            "gameType": "SNAKE_SPRINT",
            "rawScore": 10,
            "xpEarned": 90,
            "submissionId": "run-1"
        }),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["kind"], "Conflict");
}
