use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{ApiError, ApiResult, AppState};
use crate::application::services::ledger_service::OpenTradeCommand;
use crate::auth::RequestContext;
use crate::domain::entities::trade::Trade;
use crate::domain::services::ledger::{OpenedTrade, Settlement};

/// Body of `POST /trades/:id/close`
#[derive(Debug, Default, Deserialize)]
pub struct CloseTradeRequest {
    /// Market price is used when omitted
    #[serde(default)]
    pub exit_price: Option<f64>,
}

pub async fn list_trades(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(challenge_id): Path<String>,
) -> ApiResult<Vec<Trade>> {
    Ok(Json(state.service.list_trades(&ctx, &challenge_id).await?))
}

pub async fn open_trade(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<OpenTradeCommand>, JsonRejection>,
) -> Result<(StatusCode, Json<OpenedTrade>), ApiError> {
    let Json(command) = payload?;
    let opened = state.service.open_trade(&ctx, command).await?;
    Ok((StatusCode::CREATED, Json(opened)))
}

/// Settle a trade; an empty body closes at the market price
pub async fn close_trade(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(trade_id): Path<String>,
    payload: Result<Json<CloseTradeRequest>, JsonRejection>,
) -> ApiResult<Settlement> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => CloseTradeRequest::default(),
        Err(rejection) => return Err(rejection.into()),
    };

    let settlement = state
        .service
        .close_trade(&ctx, &trade_id, request.exit_price)
        .await?;
    Ok(Json(settlement))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{app, send};
    use axum::http::StatusCode;
    use axum::Router;
    use serde_json::{json, Value};

    async fn starter(app: &Router) -> String {
        let (_, created) = send(
            app,
            "POST",
            "/challenges",
            Some(("u-1", false)),
            Some(json!({"plan_type": "starter"})),
        )
        .await;
        created["id"].as_str().unwrap().to_string()
    }

    async fn open(app: &Router, challenge_id: &str, body: Value) -> (StatusCode, Value) {
        let mut body = body;
        body["challenge_id"] = json!(challenge_id);
        send(app, "POST", "/trades", Some(("u-1", false)), Some(body)).await
    }

    #[tokio::test]
    async fn test_open_then_close_trade() {
        let app = app();
        let challenge_id = starter(&app).await;

        let (status, opened) = open(
            &app,
            &challenge_id,
            json!({"symbol": "btc-usd", "side": "buy", "quantity": 1.0, "entry_price": 100.0}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(opened["trade"]["symbol"], "BTC-USD");
        assert_eq!(opened["trade"]["status"], "open");
        let trade_id = opened["trade"]["id"].as_str().unwrap().to_string();

        let (status, settled) = send(
            &app,
            "POST",
            &format!("/trades/{}/close", trade_id),
            Some(("u-1", false)),
            Some(json!({"exit_price": 120.0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(settled["trade"]["pnl"], 20.0);
        assert_eq!(settled["challenge"]["current_balance"], 5020.0);
        assert_eq!(settled["outcome"]["status"], "active");

        let (status, again) = send(
            &app,
            "POST",
            &format!("/trades/{}/close", trade_id),
            Some(("u-1", false)),
            Some(json!({"exit_price": 200.0})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(again["kind"], "trade_already_closed");

        let (status, trades) = send(
            &app,
            "GET",
            &format!("/challenges/{}/trades", challenge_id),
            Some(("u-1", false)),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(trades.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_trade_rejections() {
        let app = app();
        let challenge_id = starter(&app).await;

        let (status, body) = open(
            &app,
            &challenge_id,
            json!({"symbol": "BTC-USD", "side": "buy", "quantity": 100.0, "entry_price": 100.0}),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "insufficient_balance");

        let (status, body) = open(
            &app,
            &challenge_id,
            json!({"symbol": "BTC-USD", "side": "buy", "quantity": -1.0, "entry_price": 100.0}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");

        let (status, _) = open(
            &app,
            &challenge_id,
            json!({"symbol": "BTC-USD", "side": "hold", "quantity": 1.0, "entry_price": 100.0}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = open(
            &app,
            "missing",
            json!({"symbol": "BTC-USD", "side": "buy", "quantity": 1.0, "entry_price": 100.0}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_close_without_price_needs_market_data() {
        let app = app();
        let challenge_id = starter(&app).await;
        let (_, opened) = open(
            &app,
            &challenge_id,
            json!({"symbol": "ETH-USD", "side": "sell", "quantity": 1.0, "entry_price": 2000.0}),
        )
        .await;
        let trade_id = opened["trade"]["id"].as_str().unwrap();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/trades/{}/close", trade_id),
            Some(("u-1", false)),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["kind"], "market_data_unavailable");
    }

    #[tokio::test]
    async fn test_close_unknown_trade() {
        let (status, body) = send(
            &app(),
            "POST",
            "/trades/nope/close",
            Some(("u-1", false)),
            Some(json!({"exit_price": 1.0})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Trade not found: nope");
    }
}
