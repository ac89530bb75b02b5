use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::{self, CallerIdentity};
use crate::config::AuthConfig;
use crate::economy::Economy;
use crate::models::{canonical_key, Account, ErrorCode};
use crate::storage::QueryError;

pub fn router(economy: Arc<Economy>, auth_config: Arc<AuthConfig>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/accounts", post(create_account))
        .route(
            "/accounts/:username",
            get(fetch_account).delete(delete_account),
        )
        .route("/accounts/:username/balance", post(mutate_balance))
        .route("/transfer", post(transfer))
        .route("/top", get(top_accounts))
        .layer(middleware::from_fn(auth::auth_middleware))
        .layer(Extension(auth_config))
        .with_state(economy)
}

#[derive(Serialize)]
struct ApiError {
    success: bool,
    error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Serialize)]
struct AckResponse {
    success: bool,
}

#[derive(Serialize)]
struct AccountResponse {
    success: bool,
    username: String,
    balance: u64,
    formatted: String,
}

#[derive(Serialize)]
struct TopResponse {
    success: bool,
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
struct CreateAccountRequest {
    username: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MutateOp {
    Add,
    Subtract,
    Set,
}

#[derive(Deserialize)]
struct MutateRequest {
    op: MutateOp,
    amount: u64,
}

#[derive(Deserialize)]
struct TransferRequest {
    from: String,
    to: String,
    amount: u64,
}

#[derive(Deserialize)]
struct TopParams {
    limit: Option<u32>,
    offset: Option<u32>,
}

fn reject(status: StatusCode, error: &str) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            success: false,
            error: error.to_string(),
        }),
    )
}

/// Domain rejections keep their wire tag; storage failures surface as an
/// opaque 500 and land in the log instead.
fn error_response(err: QueryError) -> (StatusCode, Json<ApiError>) {
    match err {
        QueryError::Domain(code) => {
            let status = match code {
                ErrorCode::AccountNotFound => StatusCode::NOT_FOUND,
                _ => StatusCode::CONFLICT,
            };
            reject(status, code.as_str())
        }
        QueryError::Storage(e) => {
            tracing::error!(error = %e, "storage failure");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "storage_failure")
        }
    }
}

fn require_admin(caller: &CallerIdentity) -> Result<(), (StatusCode, Json<ApiError>)> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(reject(StatusCode::FORBIDDEN, "admin key required"))
    }
}

fn require_username(username: &str) -> Result<(), (StatusCode, Json<ApiError>)> {
    if username.trim().is_empty() {
        Err(reject(StatusCode::BAD_REQUEST, "username must not be empty"))
    } else {
        Ok(())
    }
}

async fn health() -> Json<AckResponse> {
    Json(AckResponse { success: true })
}

async fn create_account(
    State(economy): State<Arc<Economy>>,
    Extension(caller): Extension<CallerIdentity>,
    Json(body): Json<CreateAccountRequest>,
) -> ApiResult<AckResponse> {
    require_admin(&caller)?;
    require_username(&body.username)?;
    match economy.create(&body.username) {
        Ok(()) => Ok(Json(AckResponse { success: true })),
        // The creation query reports AccountNotFound when the row already existed.
        Err(QueryError::Domain(ErrorCode::AccountNotFound)) => Err(reject(
            StatusCode::CONFLICT,
            ErrorCode::AccountNotFound.as_str(),
        )),
        Err(e) => Err(error_response(e)),
    }
}

async fn fetch_account(
    State(economy): State<Arc<Economy>>,
    Path(username): Path<String>,
) -> ApiResult<AccountResponse> {
    let balance = economy.balance(&username).map_err(error_response)?;
    Ok(Json(AccountResponse {
        success: true,
        username: canonical_key(&username),
        balance,
        formatted: economy.format(balance),
    }))
}

async fn delete_account(
    State(economy): State<Arc<Economy>>,
    Extension(caller): Extension<CallerIdentity>,
    Path(username): Path<String>,
) -> ApiResult<AckResponse> {
    require_admin(&caller)?;
    economy.delete(&username).map_err(error_response)?;
    Ok(Json(AckResponse { success: true }))
}

async fn mutate_balance(
    State(economy): State<Arc<Economy>>,
    Extension(caller): Extension<CallerIdentity>,
    Path(username): Path<String>,
    Json(body): Json<MutateRequest>,
) -> ApiResult<AccountResponse> {
    require_admin(&caller)?;
    match body.op {
        MutateOp::Add => economy.add(&username, body.amount),
        MutateOp::Subtract => economy.subtract(&username, body.amount),
        MutateOp::Set => economy.set(&username, body.amount),
    }
    .map_err(error_response)?;

    let balance = economy.balance(&username).map_err(error_response)?;
    Ok(Json(AccountResponse {
        success: true,
        username: canonical_key(&username),
        balance,
        formatted: economy.format(balance),
    }))
}

async fn transfer(
    State(economy): State<Arc<Economy>>,
    Extension(caller): Extension<CallerIdentity>,
    Json(body): Json<TransferRequest>,
) -> ApiResult<AckResponse> {
    require_admin(&caller)?;
    require_username(&body.from)?;
    require_username(&body.to)?;
    if canonical_key(&body.from) == canonical_key(&body.to) {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "transfer requires two distinct accounts",
        ));
    }
    economy
        .transfer(&body.from, &body.to, body.amount)
        .map_err(error_response)?;
    Ok(Json(AckResponse { success: true }))
}

async fn top_accounts(
    State(economy): State<Arc<Economy>>,
    Query(params): Query<TopParams>,
) -> ApiResult<TopResponse> {
    let limit = params.limit.unwrap_or(10).min(100);
    let offset = params.offset.unwrap_or(0);
    let accounts = economy.top(limit, offset).map_err(error_response)?;
    Ok(Json(TopResponse {
        success: true,
        accounts,
    }))
}
