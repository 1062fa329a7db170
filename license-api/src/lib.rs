//! HTTP API the authentication layer and the activation screen call.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use werkstatt_license::{
    ErrorKind, LicenseCheck, LicenseContext, LicenseError, LicenseRefusal, LicenseResult,
    LicenseStateMachine, MacScan, MachineFacts, RemoteValidator, SessionLicenseInfo,
};

/// Shared state: one validator (and HTTP client) for all requests.
#[derive(Debug, Clone)]
pub struct AppState {
    validator: RemoteValidator,
}

impl AppState {
    pub fn new(ctx: LicenseContext) -> LicenseResult<Self> {
        Ok(Self {
            validator: RemoteValidator::new(ctx)?,
        })
    }

    pub fn context(&self) -> &LicenseContext {
        self.validator.context()
    }

    fn machine(&self) -> LicenseStateMachine {
        LicenseStateMachine::with_validator(self.validator.clone())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HardwareIdResponse {
    pub hardware_id: String,
    pub mac_scan: MacScan,
    pub facts: MachineFacts,
}

impl HardwareIdResponse {
    pub fn from_context(ctx: &LicenseContext) -> Self {
        Self {
            hardware_id: ctx.fingerprint().id().to_string(),
            mac_scan: ctx.config().mac_scan,
            facts: ctx.machine_facts(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ActivateRequest {
    pub license_key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DeactivateResponse {
    pub removed: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: &LicenseError) -> ApiError {
    let status = match err {
        LicenseError::MissingLicenseKey => StatusCode::BAD_REQUEST,
        _ => match err.kind() {
            ErrorKind::AuthorityRejected => StatusCode::FORBIDDEN,
            ErrorKind::NetworkUnreachable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::MalformedResponse => StatusCode::BAD_GATEWAY,
            ErrorKind::NotActivated => StatusCode::NOT_FOUND,
            ErrorKind::LocalStore | ErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
        },
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind(),
        }),
    )
}

fn admission(
    decision: Result<SessionLicenseInfo, LicenseRefusal>,
) -> Result<Json<SessionLicenseInfo>, (StatusCode, Json<LicenseRefusal>)> {
    decision
        .map(Json)
        .map_err(|refusal| (StatusCode::FORBIDDEN, Json(refusal)))
}

async fn hardware_id_handler(State(state): State<Arc<AppState>>) -> Json<HardwareIdResponse> {
    Json(HardwareIdResponse::from_context(state.context()))
}

async fn activate_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ActivateRequest>,
) -> Result<Json<LicenseCheck>, ApiError> {
    state
        .machine()
        .activate(&request.license_key)
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<LicenseCheck> {
    Json(state.machine().check_license_status().await)
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionLicenseInfo>, (StatusCode, Json<LicenseRefusal>)> {
    admission(state.machine().validate_license_on_login().await)
}

async fn session_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionLicenseInfo>, (StatusCode, Json<LicenseRefusal>)> {
    admission(state.machine().validate_license_for_session().await)
}

async fn deactivate_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DeactivateResponse>, ApiError> {
    state
        .machine()
        .deactivate()
        .map(|removed| Json(DeactivateResponse { removed }))
        .map_err(|e| api_error(&e))
}

/// Build the HTTP API router with the given state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/license/hardware-id", get(hardware_id_handler))
        .route("/api/license/activate", post(activate_handler))
        .route("/api/license/status", get(status_handler))
        .route("/api/license/login", post(login_handler))
        .route("/api/license/session", post(session_handler))
        .route("/api/license", delete(deactivate_handler))
        .with_state(state)
}
