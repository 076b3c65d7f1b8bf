use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use tradesense::application::handlers::{router, AppState};
use tradesense::application::services::ledger_service::LedgerService;
use tradesense::auth::ApiKeys;
use tradesense::config::LedgerConfig;
use tradesense::domain::repositories::market_data::StaticQuotes;
use tradesense::persistence::init_database;
use tradesense::persistence::repository::SqliteLedgerStore;
use tradesense::rate_limit::{create_rate_limiter, RateLimiterConfig};

const API_KEY: &str = "e2e-api-key-0123456789abcdef012345";

async fn app() -> Router {
    let pool = init_database("sqlite::memory:", 1).await.unwrap();
    let quotes = StaticQuotes::new().with_price("SOL-USD", 160.0);
    let service = LedgerService::new(Arc::new(SqliteLedgerStore::new(pool)), &LedgerConfig::default())
        .with_market_data(Arc::new(quotes));

    router(
        AppState {
            service: Arc::new(service),
        },
        ApiKeys::parse(API_KEY).unwrap(),
        create_rate_limiter(&RateLimiterConfig {
            requests_per_minute: 10_000,
        }),
    )
}

async fn call(app: &Router, method: &str, uri: &str, user: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", API_KEY))
        .header("x-user-id", user);
    if user == "ops" {
        builder = builder.header("x-user-role", "admin");
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn create_challenge(app: &Router, user: &str, plan: &str) -> String {
    let (status, body) = call(app, "POST", "/challenges", user, Some(json!({"plan_type": plan}))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn open_trade(app: &Router, user: &str, challenge_id: &str, side: &str, quantity: f64, entry: f64) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/trades",
        user,
        Some(json!({
            "challenge_id": challenge_id,
            "symbol": "BTC-USD",
            "side": side,
            "quantity": quantity,
            "entry_price": entry
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "open failed: {}", body);
    body["trade"]["id"].as_str().unwrap().to_string()
}

async fn close_trade(app: &Router, user: &str, trade_id: &str, exit: f64) -> (StatusCode, Value) {
    call(
        app,
        "POST",
        &format!("/trades/{}/close", trade_id),
        user,
        Some(json!({"exit_price": exit})),
    )
    .await
}

#[tokio::test]
async fn test_profitable_buy_updates_challenge() {
    let app = app().await;
    let challenge_id = create_challenge(&app, "trader", "starter").await;

    let trade_id = open_trade(&app, "trader", &challenge_id, "buy", 1.0, 100.0).await;
    let (status, settled) = close_trade(&app, "trader", &trade_id, 120.0).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(settled["trade"]["pnl"], 20.0);
    assert_eq!(settled["trade"]["pnl_pct"], 20.0);
    assert_eq!(settled["trade"]["status"], "closed");
    assert_eq!(settled["challenge"]["current_balance"], 5020.0);
    assert_eq!(settled["challenge"]["status"], "active");
    let total_pct = settled["challenge"]["total_pnl_pct"].as_f64().unwrap();
    assert!((total_pct - 0.4).abs() < 1e-9);

    // The stored row matches what the close returned.
    let (_, stored) = call(&app, "GET", &format!("/challenges/{}", challenge_id), "trader", None).await;
    assert_eq!(stored["current_balance"], 5020.0);
    assert_eq!(stored["total_trades"], 1);
    assert_eq!(stored["winning_trades"], 1);
}

#[tokio::test]
async fn test_exact_total_loss_over_three_days_fails_challenge() {
    let app = app().await;
    let challenge_id = create_challenge(&app, "trader", "starter").await;

    // Two -200 days (-4% each, under the 5% daily limit).
    for _ in 0..2 {
        let trade_id = open_trade(&app, "trader", &challenge_id, "buy", 10.0, 100.0).await;
        let (status, settled) = close_trade(&app, "trader", &trade_id, 80.0).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(settled["challenge"]["status"], "active");

        let (status, _) = call(&app, "POST", "/admin/rollover", "ops", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    // A -100 third day lands exactly on -10% total.
    let trade_id = open_trade(&app, "trader", &challenge_id, "buy", 10.0, 100.0).await;
    let (status, settled) = close_trade(&app, "trader", &trade_id, 90.0).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settled["challenge"]["current_balance"], 4500.0);
    assert_eq!(settled["challenge"]["total_pnl_pct"], -10.0);
    assert_eq!(settled["challenge"]["status"], "failed");
    assert_eq!(settled["challenge"]["failure_reason"], "Total loss limit exceeded");
    assert_eq!(settled["outcome"]["newly_terminal"], true);

    // Terminal challenges accept no new trades.
    let (status, body) = call(
        &app,
        "POST",
        "/trades",
        "trader",
        Some(json!({
            "challenge_id": challenge_id,
            "symbol": "BTC-USD",
            "side": "buy",
            "quantity": 1.0,
            "entry_price": 100.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "challenge_not_active");
}

#[tokio::test]
async fn test_closing_twice_leaves_state_unchanged() {
    let app = app().await;
    let challenge_id = create_challenge(&app, "trader", "pro").await;
    let trade_id = open_trade(&app, "trader", &challenge_id, "sell", 2.0, 500.0).await;

    let (status, settled) = close_trade(&app, "trader", &trade_id, 450.0).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settled["trade"]["pnl"], 100.0);

    let (status, body) = close_trade(&app, "trader", &trade_id, 300.0).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "trade_already_closed");

    let (_, stored) = call(&app, "GET", &format!("/challenges/{}", challenge_id), "trader", None).await;
    assert_eq!(stored["current_balance"], 10100.0);
    assert_eq!(stored["winning_trades"], 1);
}

#[tokio::test]
async fn test_close_at_market_price() {
    let app = app().await;
    let challenge_id = create_challenge(&app, "trader", "starter").await;
    let (_, opened) = call(
        &app,
        "POST",
        "/trades",
        "trader",
        Some(json!({
            "challenge_id": challenge_id,
            "symbol": "sol-usd",
            "side": "buy",
            "quantity": 5.0,
            "entry_price": 150.0
        })),
    )
    .await;
    let trade_id = opened["trade"]["id"].as_str().unwrap();

    let (status, settled) = call(&app, "POST", &format!("/trades/{}/close", trade_id), "trader", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settled["trade"]["exit_price"], 160.0);
    assert_eq!(settled["trade"]["pnl"], 50.0);
}

#[tokio::test]
async fn test_delete_removes_trades_and_leaderboard_ranks_passed() {
    let app = app().await;
    let doomed = create_challenge(&app, "trader", "starter").await;
    open_trade(&app, "trader", &doomed, "buy", 1.0, 100.0).await;

    let (status, _) = call(&app, "DELETE", &format!("/challenges/{}", doomed), "trader", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "GET", &format!("/challenges/{}/trades", doomed), "trader", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Two passed challenges for different users, ranked by total P&L %.
    for (user, exit) in [("alpha", 160.0), ("beta", 170.0)] {
        let challenge_id = create_challenge(&app, user, "starter").await;
        let trade_id = open_trade(&app, user, &challenge_id, "buy", 10.0, 100.0).await;
        let (_, settled) = close_trade(&app, user, &trade_id, exit).await;
        assert_eq!(settled["challenge"]["status"], "passed");
    }

    let response = app
        .clone()
        .oneshot(Request::get("/leaderboard").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let board: Value = serde_json::from_slice(&bytes).unwrap();
    let board = board.as_array().unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0]["display_name"], "beta");
    assert_eq!(board[1]["display_name"], "alpha");
}
