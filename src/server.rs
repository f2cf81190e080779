use axum::{
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{EngineError, ServiceError};
use crate::stage_commands::{
    self, BuildBracketRequest, CreateStageRequest, PredictionRequest, ResultRequest, SeedSlotRequest,
};
use crate::types::*;

pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Engine(EngineError::MatchNotFound(_)) | ServiceError::StageNotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Engine(EngineError::InvalidWinner { .. })
        | ServiceError::Engine(EngineError::InvalidScore { .. })
        | ServiceError::Engine(EngineError::InvalidConfiguration(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Engine(_) | ServiceError::StageExists(_) | ServiceError::WrongFormat { .. } => {
            StatusCode::CONFLICT
        }
        ServiceError::Poisoned(_) | ServiceError::Io(_) | ServiceError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ServiceError>;

pub fn stage_router(store: SharedStageStore) -> Router {
    Router::new()
        .route("/stages", get(list_stages).post(create_stage))
        .route("/stages/:stage_id", get(get_stage))
        .route("/stages/:stage_id/bracket", post(build_bracket))
        .route(
            "/stages/:stage_id/matches/:match_id/result",
            post(apply_result).delete(reset_result),
        )
        .route("/stages/:stage_id/matches/:match_id/seed", post(seed_slot))
        .route(
            "/stages/:stage_id/matches/:match_id/predictions",
            get(match_predictions).post(submit_prediction),
        )
        .route("/stages/:stage_id/swiss/rounds", post(next_swiss_round))
        .route("/stages/:stage_id/standings", get(standings))
        .route("/stages/:stage_id/leaderboard", get(leaderboard))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

pub async fn start_stage_server(store: SharedStageStore, addr: &str) -> Result<(), ServiceError> {
    let app = stage_router(store);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Stage server failed to bind {addr}: {e}");
            return Err(e.into());
        }
    };
    info!("Stage server listening at http://{addr}/");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn list_stages(AxumState(store): AxumState<SharedStageStore>) -> ApiResult<Vec<StageConfig>> {
    stage_commands::list_stages(&store).map(Json)
}

async fn create_stage(
    AxumState(store): AxumState<SharedStageStore>,
    Json(request): Json<CreateStageRequest>,
) -> Result<(StatusCode, Json<Stage>), ServiceError> {
    let stage = stage_commands::create_stage(&store, request)?;
    Ok((StatusCode::CREATED, Json(stage)))
}

async fn get_stage(AxumState(store): AxumState<SharedStageStore>, Path(stage_id): Path<String>) -> ApiResult<Stage> {
    stage_commands::get_stage(&store, &stage_id).map(Json)
}

async fn build_bracket(
    AxumState(store): AxumState<SharedStageStore>,
    Path(stage_id): Path<String>,
    request: Option<Json<BuildBracketRequest>>,
) -> ApiResult<Vec<Match>> {
    let request = request
        .map(|Json(request)| request)
        .unwrap_or(BuildBracketRequest { seeded: true });
    stage_commands::build_bracket(&store, &stage_id, request).map(Json)
}

async fn apply_result(
    AxumState(store): AxumState<SharedStageStore>,
    Path((stage_id, match_id)): Path<(String, MatchId)>,
    Json(request): Json<ResultRequest>,
) -> ApiResult<stage_commands::ProgressionResponse> {
    stage_commands::apply_result(&store, &stage_id, match_id, request).map(Json)
}

async fn reset_result(
    AxumState(store): AxumState<SharedStageStore>,
    Path((stage_id, match_id)): Path<(String, MatchId)>,
) -> ApiResult<stage_commands::ProgressionResponse> {
    stage_commands::reset_result(&store, &stage_id, match_id).map(Json)
}

async fn seed_slot(
    AxumState(store): AxumState<SharedStageStore>,
    Path((stage_id, match_id)): Path<(String, MatchId)>,
    Json(request): Json<SeedSlotRequest>,
) -> ApiResult<stage_commands::ProgressionResponse> {
    stage_commands::seed_slot(&store, &stage_id, match_id, request).map(Json)
}

async fn submit_prediction(
    AxumState(store): AxumState<SharedStageStore>,
    Path((stage_id, match_id)): Path<(String, MatchId)>,
    Json(request): Json<PredictionRequest>,
) -> ApiResult<crate::predictions::Prediction> {
    stage_commands::submit_prediction(&store, &stage_id, match_id, request).map(Json)
}

async fn match_predictions(
    AxumState(store): AxumState<SharedStageStore>,
    Path((stage_id, match_id)): Path<(String, MatchId)>,
) -> ApiResult<Vec<crate::predictions::Prediction>> {
    stage_commands::match_predictions(&store, &stage_id, match_id).map(Json)
}

async fn next_swiss_round(
    AxumState(store): AxumState<SharedStageStore>,
    Path(stage_id): Path<String>,
) -> ApiResult<stage_commands::SwissRoundResponse> {
    stage_commands::next_swiss_round(&store, &stage_id).map(Json)
}

async fn standings(
    AxumState(store): AxumState<SharedStageStore>,
    Path(stage_id): Path<String>,
) -> ApiResult<Vec<SwissStanding>> {
    stage_commands::standings(&store, &stage_id).map(Json)
}

async fn leaderboard(
    AxumState(store): AxumState<SharedStageStore>,
    Path(stage_id): Path<String>,
) -> ApiResult<Vec<crate::predictions::LeaderboardEntry>> {
    stage_commands::leaderboard(&store, &stage_id).map(Json)
}
