//! HTTP API
//!
//! JSON in and out with camelCase fields. Every failure is rendered as
//! `{ "error": string, "code": number }` with a non-2xx status taken from
//! `ServiceError::status`.

use crate::config::NodeConfig;
use crate::metrics::Metrics;
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, FromRequest, FromRequestParts, Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use poc_core::{Address, ChainId, CourseId, ModuleId, ONE_UNIT};
use poc_economics::constants::{DECIMALS, MAX_SUPPLY, NAME, SYMBOL};
use poc_economics::{DataSource, RewardKind};
use poc_services::completion::CompletionTarget;
use poc_services::courses::CourseUpdate;
use poc_services::networks::{ContractsInput, NetworkInput};
use poc_services::repository::{CommitReview, NewCommit, NewRepository, RepositoryStatus};
use poc_services::stakes::StakeRequest;
use poc_services::transactions::NewTransaction;
use poc_services::{NewCourse, ServiceError, Services};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub metrics: Arc<Metrics>,
    pub config: Arc<NodeConfig>,
    pub started: Instant,
}

impl AppState {
    pub fn new(services: Services, metrics: Arc<Metrics>, config: Arc<NodeConfig>) -> Self {
        Self {
            services,
            metrics,
            config,
            started: Instant::now(),
        }
    }

    fn record_escrow(&self) {
        self.metrics
            .set_escrow_balance(self.services.ledgers.staking.contract_balance());
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error rendered as a JSON response
#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Service(e) => StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> u32 {
        match self {
            Self::Service(e) => e.code(),
            Self::BadRequest(_) => 2001,
            Self::NotFound(_) => 2002,
            Self::Internal(_) => 9999,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self::Service(e)
    }
}

impl From<poc_economics::StakingError> for ApiError {
    fn from(e: poc_economics::StakingError) -> Self {
        Self::Service(e.into())
    }
}

impl From<poc_economics::ReputationError> for ApiError {
    fn from(e: poc_economics::ReputationError) -> Self {
        Self::Service(e.into())
    }
}

impl From<poc_economics::TokenError> for ApiError {
    fn from(e: poc_economics::TokenError) -> Self {
        Self::Service(e.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match self {
            Self::Service(e) => e.to_string(),
            Self::BadRequest(m) | Self::NotFound(m) | Self::Internal(m) => m,
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), code, "{}", message);
        } else {
            tracing::debug!(status = status.as_u16(), code, "{}", message);
        }
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

/// JSON body whose rejections render as `ApiError`
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string whose rejections render as `ApiError`
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

// ============================================================================
// Router
// ============================================================================

/// Build the full router
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let cors_enabled = state.config.server.cors_enabled;

    let app = Router::new()
        // Health & Info
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/metrics", get(metrics))
        // Courses
        .route("/api/courses", get(list_courses).post(register_course))
        .route("/api/courses/:id", get(get_course).put(update_course))
        // Verifiers
        .route("/api/verifiers", post(add_verifier))
        .route("/api/verifiers/:address", delete(remove_verifier))
        // Staking
        .route("/api/stake", post(stake))
        .route("/api/stake/:user/:course", get(stake_view))
        .route("/api/staking-records", get(staking_records))
        .route("/api/complete-course", post(complete_course))
        .route("/api/complete-course/batch", post(batch_complete))
        .route("/api/emergency-withdraw", post(emergency_withdraw))
        // Progress & rewards
        .route("/api/progress", get(get_progress).post(update_progress))
        .route("/api/assignments", post(submit_assignment))
        .route("/api/assignments/verify", post(verify_assignment))
        .route("/api/datacoin/minters", post(add_minter))
        .route("/api/datacoin/:address", get(datacoin_balance))
        .route("/api/reputation", get(reputation).post(record_contribution))
        // Repositories
        .route("/api/repositories", get(list_repositories).post(submit_repository))
        .route("/api/repositories/stats", get(repository_stats))
        .route("/api/repositories/:id", get(get_repository).put(repository_action))
        // Consumer data
        .route("/api/consumer-data", get(list_consumer_data).post(submit_consumer_data))
        // Networks & contracts
        .route("/api/networks", get(list_networks).post(upsert_network))
        .route("/api/networks/:chain_id", get(get_network))
        .route("/api/networks/:chain_id/rpc", get(best_rpc))
        .route("/api/admin/init-networks", post(init_networks))
        .route("/api/contracts", get(list_contracts))
        .route("/api/contracts/:chain_id", get(get_contracts).put(upsert_contracts))
        // History & certificates
        .route("/api/transactions", get(list_transactions).post(record_transaction))
        .route("/api/certificates", get(list_certificates))
        .route("/api/certificates/transfer", post(transfer_certificate))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors_enabled {
        app.layer(cors)
    } else {
        app
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let response = next.run(request).await;
    state
        .metrics
        .observe_response(method.as_str(), response.status().as_u16());
    response
}

// ============================================================================
// Health & Info
// ============================================================================

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn status(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let ledgers = &state.services.ledgers;
    let courses = state.services.courses.list(true).await?;
    let networks = &state.config.networks;

    Ok(Json(json!({
        "name": "poc-node",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.started.elapsed().as_secs(),
        "network": networks.stake_network,
        "chainId": networks.stake_chain_id,
        "owner": ledgers.staking.owner(),
        "stakingManager": ledgers.staking.address(),
        "escrowBalance": ledgers.staking.contract_balance().to_string(),
        "activeCourses": courses.len(),
        "token": {
            "name": NAME,
            "symbol": SYMBOL,
            "decimals": DECIMALS,
            "totalSupply": ledgers.token.total_supply().to_string(),
            "remainingSupply": ledgers.token.remaining_supply().to_string(),
        },
    })))
}

async fn metrics(State(state): State<AppState>) -> ApiResult<Response> {
    if !state.config.metrics.enabled {
        return Err(ApiError::not_found("Metrics are disabled"));
    }
    let body = state
        .metrics
        .render()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response())
}

// ============================================================================
// Courses
// ============================================================================

#[derive(Deserialize)]
struct CourseListQuery {
    #[serde(default)]
    all: bool,
}

async fn list_courses(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CourseListQuery>,
) -> ApiResult<Json<Value>> {
    let courses = state.services.courses.list(!query.all).await?;
    Ok(Json(json!({ "courses": courses })))
}

#[derive(Deserialize)]
struct RegisterCourseBody {
    caller: Address,
    #[serde(flatten)]
    course: NewCourse,
}

async fn register_course(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterCourseBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let course = state.services.courses.register(body.caller, body.course).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "course": course }))))
}

async fn get_course(State(state): State<AppState>, Path(id): Path<CourseId>) -> ApiResult<Json<Value>> {
    let course = state
        .services
        .courses
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course not found"))?;
    Ok(Json(json!({ "course": course })))
}

#[derive(Deserialize)]
struct UpdateCourseBody {
    caller: Address,
    #[serde(flatten)]
    update: CourseUpdate,
}

async fn update_course(
    State(state): State<AppState>,
    Path(id): Path<CourseId>,
    ApiJson(body): ApiJson<UpdateCourseBody>,
) -> ApiResult<Json<Value>> {
    let course = state.services.courses.update(body.caller, id, body.update).await?;
    Ok(Json(json!({ "success": true, "course": course })))
}

// ============================================================================
// Verifiers
// ============================================================================

#[derive(Deserialize)]
struct AddVerifierBody {
    caller: Address,
    verifier: Address,
}

async fn add_verifier(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AddVerifierBody>,
) -> ApiResult<Json<Value>> {
    state.services.ledgers.staking.add_verifier(body.caller, body.verifier)?;
    Ok(Json(json!({ "success": true, "verifier": body.verifier })))
}

#[derive(Deserialize)]
struct CallerQuery {
    caller: Address,
}

async fn remove_verifier(
    State(state): State<AppState>,
    Path(address): Path<Address>,
    ApiQuery(query): ApiQuery<CallerQuery>,
) -> ApiResult<Json<Value>> {
    state.services.ledgers.staking.remove_verifier(query.caller, address)?;
    Ok(Json(json!({ "success": true, "verifier": address })))
}

// ============================================================================
// Staking
// ============================================================================

async fn stake(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<StakeRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let enrollment = state.services.enrollment.stake(request).await?;
    state.metrics.stakes_total.inc();
    state.record_escrow();
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "enrollment": enrollment }))))
}

async fn stake_view(
    State(state): State<AppState>,
    Path((user, course)): Path<(Address, CourseId)>,
) -> Json<Value> {
    Json(json!(state.services.enrollment.stake_view(user, course)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_address: Address,
}

async fn staking_records(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> ApiResult<Json<Value>> {
    let records = state
        .services
        .enrollment
        .records()
        .list_for_user(&query.user_address)
        .await?;
    Ok(Json(json!({ "records": records })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteCourseBody {
    verifier: Address,
    user_address: Address,
    course_id: CourseId,
}

async fn complete_course(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CompleteCourseBody>,
) -> ApiResult<Json<Value>> {
    let receipt = state
        .services
        .completion
        .complete_course(body.verifier, body.user_address, body.course_id)
        .await?;
    state.metrics.course_completions_total.inc();
    state.record_escrow();
    Ok(Json(json!({ "success": true, "completion": receipt })))
}

#[derive(Deserialize)]
struct BatchCompleteBody {
    verifier: Address,
    targets: Vec<CompletionTarget>,
}

async fn batch_complete(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<BatchCompleteBody>,
) -> ApiResult<Json<Value>> {
    if body.targets.is_empty() {
        return Err(ApiError::bad_request("No completion targets given"));
    }
    let report = state
        .services
        .completion
        .batch_complete(body.verifier, &body.targets)
        .await?;
    state
        .metrics
        .course_completions_total
        .inc_by(report.completed.len() as u64);
    state.record_escrow();
    Ok(Json(json!({ "success": true, "report": report })))
}

#[derive(Deserialize)]
struct CallerBody {
    caller: Address,
}

async fn emergency_withdraw(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CallerBody>,
) -> ApiResult<Json<Value>> {
    let amount = state.services.ledgers.staking.emergency_withdraw(body.caller)?;
    tracing::warn!(caller = %body.caller, amount = %amount, "Escrow swept");
    state.record_escrow();
    Ok(Json(json!({ "success": true, "amount": amount.to_string() })))
}

// ============================================================================
// Progress & rewards
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressQuery {
    user_address: Address,
    #[serde(default)]
    course_id: Option<CourseId>,
    #[serde(default)]
    total_modules: Option<u32>,
}

async fn get_progress(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProgressQuery>,
) -> ApiResult<Json<Value>> {
    let progress = &state.services.progress;
    match query.course_id {
        Some(course_id) => {
            let entry = progress
                .get_or_init(query.user_address, course_id, query.total_modules)
                .await?;
            Ok(Json(json!({ "progress": entry })))
        }
        None => {
            let all = progress.list_for_user(&query.user_address).await?;
            Ok(Json(json!({ "progress": all })))
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressBody {
    student_address: Address,
    #[serde(default)]
    reward_type: Option<String>,
    #[serde(default)]
    course_id: Option<CourseId>,
    #[serde(default)]
    module_id: Option<ModuleId>,
    #[serde(default)]
    total_modules: Option<u32>,
}

async fn update_progress(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ProgressBody>,
) -> ApiResult<Json<Value>> {
    let progress = &state.services.progress;

    if let Some(module_id) = body.module_id {
        let course_id = body
            .course_id
            .ok_or_else(|| ApiError::bad_request("courseId is required with moduleId"))?;
        let completion = progress
            .complete_module(body.student_address, course_id, module_id, body.total_modules)
            .await?;
        state.metrics.module_completions_total.inc();
        if let Some(reward) = &completion.reward {
            state.metrics.add_minted(reward.amount);
        }
        return Ok(Json(json!({ "success": true, "completion": completion })));
    }

    let kind: RewardKind = body
        .reward_type
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("Missing required fields"))?
        .parse()
        .map_err(ApiError::BadRequest)?;
    let receipt = progress.award(body.student_address, kind, body.course_id).await?;
    state.metrics.add_minted(receipt.amount);
    Ok(Json(json!({ "success": true, "reward": receipt })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentBody {
    user_address: Address,
    course_id: CourseId,
    assignment_id: String,
    #[serde(default)]
    submission_data: Value,
}

async fn submit_assignment(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AssignmentBody>,
) -> ApiResult<Json<Value>> {
    let progress = state
        .services
        .progress
        .submit_assignment(body.user_address, body.course_id, &body.assignment_id, body.submission_data)
        .await?;
    Ok(Json(json!({ "success": true, "progress": progress })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyAssignmentBody {
    verifier: Address,
    user_address: Address,
    course_id: CourseId,
    assignment_id: String,
    #[serde(default)]
    feedback: Option<String>,
}

async fn verify_assignment(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<VerifyAssignmentBody>,
) -> ApiResult<Json<Value>> {
    let progress = state
        .services
        .progress
        .verify_assignment(
            body.verifier,
            body.user_address,
            body.course_id,
            &body.assignment_id,
            body.feedback,
        )
        .await?;
    Ok(Json(json!({ "success": true, "progress": progress })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalance {
    address: Address,
    #[serde(with = "poc_core::serde_amount")]
    balance: u128,
    balance_formatted: String,
    #[serde(with = "poc_core::serde_amount")]
    total_supply: u128,
    #[serde(with = "poc_core::serde_amount")]
    remaining_supply: u128,
    #[serde(with = "poc_core::serde_amount")]
    max_supply: u128,
    symbol: &'static str,
    decimals: u8,
    is_minter: bool,
}

async fn datacoin_balance(State(state): State<AppState>, Path(address): Path<Address>) -> Json<TokenBalance> {
    let token = &state.services.ledgers.token;
    let balance = token.balance_of(&address);
    Json(TokenBalance {
        address,
        balance,
        balance_formatted: poc_core::format_units(balance, DECIMALS),
        total_supply: token.total_supply(),
        remaining_supply: token.remaining_supply(),
        max_supply: MAX_SUPPLY,
        symbol: SYMBOL,
        decimals: DECIMALS,
        is_minter: token.is_minter(&address),
    })
}

#[derive(Deserialize)]
struct AddMinterBody {
    caller: Address,
    minter: Address,
}

async fn add_minter(State(state): State<AppState>, ApiJson(body): ApiJson<AddMinterBody>) -> ApiResult<Json<Value>> {
    state.services.ledgers.token.add_minter(body.caller, body.minter)?;
    Ok(Json(json!({ "success": true, "minter": body.minter })))
}

const DEFAULT_LEADERBOARD: usize = 10;
const MAX_LEADERBOARD: usize = 100;

#[derive(Deserialize)]
struct ReputationQuery {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    address: Option<Address>,
}

async fn reputation(State(state): State<AppState>, ApiQuery(query): ApiQuery<ReputationQuery>) -> Json<Value> {
    let ledger = &state.services.ledgers.reputation;
    if let Some(address) = query.address {
        return Json(json!({ "address": address, "score": ledger.score_of(&address) }));
    }
    let limit = query.limit.unwrap_or(DEFAULT_LEADERBOARD).min(MAX_LEADERBOARD);
    Json(json!({ "contributors": ledger.top_contributors(limit) }))
}

#[derive(Deserialize)]
struct RecordContributionBody {
    caller: Address,
    contributor: Address,
    score: u64,
}

async fn record_contribution(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RecordContributionBody>,
) -> ApiResult<Json<Value>> {
    let total = state
        .services
        .ledgers
        .reputation
        .record_contribution(body.caller, body.contributor, body.score)?;
    Ok(Json(json!({ "success": true, "contributor": body.contributor, "score": total })))
}

// ============================================================================
// Repositories
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryQuery {
    #[serde(default)]
    user_address: Option<Address>,
}

async fn list_repositories(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<RepositoryQuery>,
) -> ApiResult<Json<Value>> {
    let repos = match query.user_address {
        Some(user) => state.services.repositories.list_for_user(&user).await?,
        None => state.services.repositories.list_all().await?,
    };
    Ok(Json(json!({ "repositories": repos })))
}

async fn submit_repository(
    State(state): State<AppState>,
    ApiJson(submission): ApiJson<NewRepository>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let repo = state.services.repositories.submit(submission).await?;
    state.metrics.repositories_submitted_total.inc();
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "repository": repo }))))
}

async fn repository_stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let stats = state.services.repositories.stats().await?;
    Ok(Json(json!({ "stats": stats })))
}

async fn get_repository(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let repo = state.services.repositories.get(&id).await?;
    Ok(Json(json!({ "repository": repo })))
}

/// Admin actions on one repository
#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum RepositoryAction {
    UpdateStatus {
        status: RepositoryStatus,
        reviewed_by: Address,
        #[serde(default)]
        data_coins: Option<u64>,
    },
    AddCommits {
        commits: Vec<NewCommit>,
    },
    VerifyCommit(CommitReview),
}

async fn repository_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(action): ApiJson<RepositoryAction>,
) -> ApiResult<Json<Value>> {
    let repositories = &state.services.repositories;
    let repo = match action {
        RepositoryAction::UpdateStatus {
            status,
            reviewed_by,
            data_coins,
        } => repositories.update_status(&id, status, reviewed_by, data_coins).await?,
        RepositoryAction::AddCommits { commits } => repositories.add_commits(&id, commits).await?,
        RepositoryAction::VerifyCommit(review) => repositories.verify_commit(&id, review).await?,
    };
    Ok(Json(json!({ "success": true, "repository": repo })))
}

// ============================================================================
// Consumer data
// ============================================================================

async fn list_consumer_data(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> ApiResult<Json<Value>> {
    let summary = state.services.consumer_data.list(&query.user_address).await?;
    Ok(Json(json!(summary)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsumerDataBody {
    user_address: Address,
    data_source: DataSource,
    /// Claims as a JSON string or an object
    proof_data: Value,
    #[serde(default)]
    zk_proof: Option<Value>,
}

async fn submit_consumer_data(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ConsumerDataBody>,
) -> ApiResult<Json<Value>> {
    let proof_data = match body.proof_data {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let receipt = state
        .services
        .consumer_data
        .submit(body.user_address, body.data_source, &proof_data, body.zk_proof)
        .await?;
    state.metrics.consumer_proofs_total.inc();
    state
        .metrics
        .add_minted(u128::from(receipt.data_coins_earned) * ONE_UNIT);
    Ok(Json(json!({ "success": true, "receipt": receipt })))
}

// ============================================================================
// Networks & contracts
// ============================================================================

const API_CREATOR: &str = "api";

async fn list_networks(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let networks = state.services.networks.list_networks().await?;
    Ok(Json(json!({ "networks": networks })))
}

async fn get_network(State(state): State<AppState>, Path(chain_id): Path<ChainId>) -> ApiResult<Json<Value>> {
    let network = state
        .services
        .networks
        .get_network(chain_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Network not found"))?;
    Ok(Json(json!({ "network": network })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertNetworkBody {
    #[serde(flatten)]
    network: NetworkInput,
    #[serde(default)]
    created_by: Option<String>,
}

async fn upsert_network(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<UpsertNetworkBody>,
) -> ApiResult<Json<Value>> {
    let created_by = body.created_by.as_deref().unwrap_or(API_CREATOR);
    let network = state.services.networks.upsert_network(body.network, created_by).await?;
    Ok(Json(json!({ "success": true, "network": network })))
}

async fn best_rpc(State(state): State<AppState>, Path(chain_id): Path<ChainId>) -> ApiResult<Json<Value>> {
    let url = state
        .services
        .networks
        .best_rpc_url(chain_id)
        .await?
        .ok_or_else(|| ApiError::not_found("No RPC endpoint for chain"))?;
    Ok(Json(json!({ "chainId": chain_id, "rpcUrl": url })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitNetworksQuery {
    #[serde(default)]
    created_by: Option<String>,
}

async fn init_networks(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<InitNetworksQuery>,
) -> ApiResult<Json<Value>> {
    let created_by = query.created_by.as_deref().unwrap_or("system");
    let initialized = state.services.networks.initialize_defaults(created_by).await?;
    Ok(Json(json!({ "success": true, "initialized": initialized })))
}

async fn list_contracts(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let contracts = state.services.networks.list_contracts().await?;
    Ok(Json(json!({ "contracts": contracts })))
}

async fn get_contracts(State(state): State<AppState>, Path(chain_id): Path<ChainId>) -> ApiResult<Json<Value>> {
    let contracts = state
        .services
        .networks
        .get_contracts(chain_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Contract addresses not found for chain"))?;
    Ok(Json(json!({ "contracts": contracts })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertContractsBody {
    #[serde(flatten)]
    contracts: ContractsInput,
    #[serde(default)]
    created_by: Option<String>,
}

async fn upsert_contracts(
    State(state): State<AppState>,
    Path(chain_id): Path<ChainId>,
    ApiJson(body): ApiJson<UpsertContractsBody>,
) -> ApiResult<Json<Value>> {
    let created_by = body.created_by.as_deref().unwrap_or(API_CREATOR);
    let contracts = state
        .services
        .networks
        .upsert_contracts(chain_id, body.contracts, created_by)
        .await?;
    Ok(Json(json!({ "success": true, "contracts": contracts })))
}

// ============================================================================
// History & certificates
// ============================================================================

async fn list_transactions(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> ApiResult<Json<Value>> {
    let transactions = state
        .services
        .transactions
        .list_or_backfill(&query.user_address)
        .await?;
    Ok(Json(json!({ "transactions": transactions })))
}

async fn record_transaction(
    State(state): State<AppState>,
    ApiJson(tx): ApiJson<NewTransaction>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let record = state.services.transactions.record(tx).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "transaction": record }))))
}

#[derive(Deserialize)]
struct OwnerQuery {
    owner: Address,
}

async fn list_certificates(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<OwnerQuery>,
) -> ApiResult<Json<Value>> {
    let certificates = state.services.certificates.list_for_owner(&query.owner).await?;
    Ok(Json(json!({ "certificates": certificates })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferBody {
    from: Address,
    to: Address,
    token_id: u64,
}

async fn transfer_certificate(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<TransferBody>,
) -> ApiResult<Json<Value>> {
    state.services.certificates.transfer(body.from, body.to, body.token_id)?;
    Ok(Json(json!({ "success": true })))
}
