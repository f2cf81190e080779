use crate::types::MatchId;
use thiserror::Error;

/// Failures reported by the bracket, progression, Swiss and standings engines.
/// None of them are transient; callers surface them and do not retry.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("match {match_id}: {winner} is not a participant")]
    InvalidWinner { match_id: MatchId, winner: String },
    #[error("match {match_id}: score {score:?} is not valid for {format} with {winner} winning")]
    InvalidScore {
        match_id: MatchId,
        score: String,
        format: String,
        winner: String,
    },
    #[error("match {0} not found")]
    MatchNotFound(MatchId),
    #[error("match {0} still has undetermined participants")]
    StaleTopology(MatchId),
    #[error("match {0} is a bye and resolves automatically")]
    ByeMatch(MatchId),
    #[error("match {0} is locked for predictions")]
    PredictionLocked(MatchId),
    #[error("pairing exhausted: {0} rematch(es) required")]
    PairingExhausted(usize),
}

/// Failures of the stage service wrapping the engine.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("stage {0} not found")]
    StageNotFound(String),
    #[error("stage {0} already exists")]
    StageExists(String),
    #[error("stage {stage}: {message}")]
    WrongFormat { stage: String, message: String },
    #[error("stage state is unavailable: {0}")]
    Poisoned(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
