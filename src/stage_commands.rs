use crate::bracket::{self, validate_teams};
use crate::config::now;
use crate::error::{EngineError, ServiceError};
use crate::predictions::{LeaderboardEntry, Prediction};
use crate::progression::{self, Progression};
use crate::standings::{self, OpponentHistory};
use crate::store::save_stage;
use crate::swiss;
use crate::types::*;
use serde::{Deserialize, Serialize};
use tracing::info;

// ── Requests / responses ────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStageRequest {
    #[serde(flatten)]
    pub config: StageConfig,
    pub teams: Vec<Team>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildBracketRequest {
    /// Seed the bracket in team order; otherwise every slot starts as TBD.
    #[serde(default = "default_seeded")]
    pub seeded: bool,
}

fn default_seeded() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRequest {
    pub winner: String,
    pub score: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSlotRequest {
    pub side: SlotSide,
    pub team: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    pub user: String,
    pub winner: String,
    pub score: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionResponse {
    #[serde(flatten)]
    pub progression: Progression,
    pub discarded_predictions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwissRoundResponse {
    pub round: u32,
    pub pairings: Vec<Pairing>,
    pub rematches: usize,
    pub matches: Vec<Match>,
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn lock_stage(store: &SharedStageStore, stage_id: &str) -> Result<(SharedStage, Option<std::path::PathBuf>), ServiceError> {
    let guard = store.lock().map_err(|e| ServiceError::Poisoned(e.to_string()))?;
    Ok((guard.get(stage_id)?, guard.data_dir.clone()))
}

/// Lock the stage, then call `f` with a read-only view.
fn with_stage<F, R>(store: &SharedStageStore, stage_id: &str, f: F) -> Result<R, ServiceError>
where
    F: FnOnce(&Stage) -> Result<R, ServiceError>,
{
    let (shared, _) = lock_stage(store, stage_id)?;
    let guard = shared.lock().map_err(|e| ServiceError::Poisoned(e.to_string()))?;
    f(&guard)
}

/// Lock the stage and run `f` on a draft copy. The draft replaces the stage
/// only after `f` succeeded and the snapshot was written, so a failed call
/// leaves no partial change behind.
fn with_stage_mut<F, R>(store: &SharedStageStore, stage_id: &str, f: F) -> Result<R, ServiceError>
where
    F: FnOnce(&mut Stage) -> Result<R, ServiceError>,
{
    let (shared, data_dir) = lock_stage(store, stage_id)?;
    let mut guard = shared.lock().map_err(|e| ServiceError::Poisoned(e.to_string()))?;
    let mut draft = guard.clone();
    let out = f(&mut draft)?;
    draft.updated_at = now();
    if let Some(dir) = data_dir.as_deref() {
        save_stage(dir, &draft)?;
    }
    *guard = draft;
    Ok(out)
}

fn require_elimination(stage: &Stage) -> Result<EliminationMode, ServiceError> {
    stage.config.format.elimination_mode().ok_or_else(|| ServiceError::WrongFormat {
        stage: stage.config.id.clone(),
        message: "not an elimination stage".to_string(),
    })
}

fn require_swiss(stage: &Stage) -> Result<(), ServiceError> {
    if stage.config.format != StageFormat::Swiss {
        return Err(ServiceError::WrongFormat {
            stage: stage.config.id.clone(),
            message: "not a Swiss stage".to_string(),
        });
    }
    Ok(())
}

/// Commit a progression and drop the predictions it made stale.
fn commit(stage: &mut Stage, progression: Progression) -> ProgressionResponse {
    progression.apply_to(&mut stage.matches);
    let discarded_predictions = stage.predictions.discard(&progression.invalidated);
    ProgressionResponse {
        progression,
        discarded_predictions,
    }
}

// ── Commands ────────────────────────────────────────────────────────────

pub fn list_stages(store: &SharedStageStore) -> Result<Vec<StageConfig>, ServiceError> {
    let shared = {
        let guard = store.lock().map_err(|e| ServiceError::Poisoned(e.to_string()))?;
        guard
            .ids()
            .into_iter()
            .map(|id| guard.get(&id))
            .collect::<Result<Vec<_>, _>>()?
    };
    shared
        .iter()
        .map(|stage| {
            let guard = stage.lock().map_err(|e| ServiceError::Poisoned(e.to_string()))?;
            Ok(guard.config.clone())
        })
        .collect()
}

pub fn create_stage(store: &SharedStageStore, request: CreateStageRequest) -> Result<Stage, ServiceError> {
    let CreateStageRequest { mut config, teams } = request;
    let names = teams.iter().map(|team| team.name.clone()).collect::<Vec<_>>();
    validate_teams(names.len(), &names)?;
    config.current_round = 0;

    let stage = Stage {
        config,
        teams,
        matches: Vec::new(),
        predictions: Default::default(),
        updated_at: now(),
    };
    let mut guard = store.lock().map_err(|e| ServiceError::Poisoned(e.to_string()))?;
    guard.insert(stage.clone())?;
    info!(
        "Created stage {} ({:?}, {} teams)",
        stage.config.id,
        stage.config.format,
        stage.teams.len()
    );
    Ok(stage)
}

pub fn get_stage(store: &SharedStageStore, stage_id: &str) -> Result<Stage, ServiceError> {
    with_stage(store, stage_id, |stage| Ok(stage.clone()))
}

/// Generate the bracket for an elimination stage. Rebuilding is allowed until
/// the first real result is in; predictions on the old matches are dropped.
pub fn build_bracket(
    store: &SharedStageStore,
    stage_id: &str,
    request: BuildBracketRequest,
) -> Result<Vec<Match>, ServiceError> {
    with_stage_mut(store, stage_id, |stage| {
        let mode = require_elimination(stage)?;
        if stage.matches.iter().any(|m| !m.is_bye && m.result.is_some()) {
            return Err(ServiceError::WrongFormat {
                stage: stage.config.id.clone(),
                message: "results are already recorded; the bracket can no longer be rebuilt".to_string(),
            });
        }
        let names = stage.team_names();
        let seeded: &[String] = if request.seeded { &names } else { &[] };
        let matches = bracket::build(names.len(), mode, seeded, stage.config.match_format)?;

        let old_ids = stage.matches.iter().map(|m| m.id).collect::<Vec<_>>();
        stage.predictions.discard(&old_ids);
        stage.matches = matches.clone();
        info!("Stage {}: bracket built with {} matches", stage.config.id, matches.len());
        Ok(matches)
    })
}

pub fn apply_result(
    store: &SharedStageStore,
    stage_id: &str,
    match_id: MatchId,
    request: ResultRequest,
) -> Result<ProgressionResponse, ServiceError> {
    with_stage_mut(store, stage_id, |stage| {
        let progression = progression::apply_result(&stage.matches, match_id, &request.winner, &request.score)?;
        if !progression.is_empty() {
            info!(
                "Stage {}: match {match_id} won by {} ({}), {} match(es) updated",
                stage.config.id,
                request.winner,
                request.score,
                progression.updated.len()
            );
        }
        Ok(commit(stage, progression))
    })
}

pub fn reset_result(
    store: &SharedStageStore,
    stage_id: &str,
    match_id: MatchId,
) -> Result<ProgressionResponse, ServiceError> {
    with_stage_mut(store, stage_id, |stage| {
        let progression = progression::reset_result(&stage.matches, match_id)?;
        info!("Stage {}: match {match_id} reset", stage.config.id);
        Ok(commit(stage, progression))
    })
}

pub fn seed_slot(
    store: &SharedStageStore,
    stage_id: &str,
    match_id: MatchId,
    request: SeedSlotRequest,
) -> Result<ProgressionResponse, ServiceError> {
    with_stage_mut(store, stage_id, |stage| {
        require_elimination(stage)?;
        if !stage.teams.iter().any(|team| team.name == request.team.trim()) {
            return Err(ServiceError::WrongFormat {
                stage: stage.config.id.clone(),
                message: format!("{} is not entered in this stage", request.team),
            });
        }
        let progression = progression::seed_slot(&stage.matches, match_id, request.side, &request.team)?;
        Ok(commit(stage, progression))
    })
}

/// Pair and schedule the next Swiss round from the current standings.
/// Every match of the current round must be decided first; qualified and
/// eliminated teams sit out.
pub fn next_swiss_round(store: &SharedStageStore, stage_id: &str) -> Result<SwissRoundResponse, ServiceError> {
    with_stage_mut(store, stage_id, |stage| {
        require_swiss(stage)?;
        let current = stage.config.current_round;
        let pending = stage
            .matches
            .iter()
            .filter(|m| m.round == current && !m.is_decided())
            .count();
        if pending > 0 {
            return Err(ServiceError::WrongFormat {
                stage: stage.config.id.clone(),
                message: format!("round {current} still has {pending} undecided match(es)"),
            });
        }

        let history = OpponentHistory::from_matches(&stage.matches);
        let table = standings::compute(
            &stage.team_names(),
            &stage.matches,
            &history,
            Some(stage.config.thresholds),
        );
        let active = table
            .into_iter()
            .filter(|standing| standing.status == StandingStatus::Active)
            .collect::<Vec<_>>();
        if active.len() < 2 {
            return Err(ServiceError::WrongFormat {
                stage: stage.config.id.clone(),
                message: format!("{} active team(s) left; nothing to pair", active.len()),
            });
        }

        let mut round = swiss::pair(&active, &history, &swiss::byes_received(&stage.matches));
        if !stage.config.allow_rematches {
            round = round.require_no_rematch()?;
        }
        let next_round = current + 1;
        let matches = swiss::schedule_round(
            next_round,
            &round.pairings,
            swiss::next_free_id(&stage.matches),
            stage.config.match_format,
        );
        stage.matches.extend(matches.iter().cloned());
        stage.config.current_round = next_round;
        info!(
            "Stage {}: round {next_round} paired ({} pairings, {} rematch(es))",
            stage.config.id,
            round.pairings.len(),
            round.rematches
        );
        Ok(SwissRoundResponse {
            round: next_round,
            pairings: round.pairings,
            rematches: round.rematches,
            matches,
        })
    })
}

pub fn standings(store: &SharedStageStore, stage_id: &str) -> Result<Vec<SwissStanding>, ServiceError> {
    with_stage(store, stage_id, |stage| {
        require_swiss(stage)?;
        let history = OpponentHistory::from_matches(&stage.matches);
        Ok(standings::compute(
            &stage.team_names(),
            &stage.matches,
            &history,
            Some(stage.config.thresholds),
        ))
    })
}

pub fn submit_prediction(
    store: &SharedStageStore,
    stage_id: &str,
    match_id: MatchId,
    request: PredictionRequest,
) -> Result<Prediction, ServiceError> {
    with_stage_mut(store, stage_id, |stage| {
        let Stage {
            matches, predictions, ..
        } = stage;
        let prediction = predictions.submit(matches, &request.user, match_id, &request.winner, &request.score, now())?;
        Ok(prediction)
    })
}

pub fn match_predictions(
    store: &SharedStageStore,
    stage_id: &str,
    match_id: MatchId,
) -> Result<Vec<Prediction>, ServiceError> {
    with_stage(store, stage_id, |stage| {
        if !stage.matches.iter().any(|m| m.id == match_id) {
            return Err(EngineError::MatchNotFound(match_id).into());
        }
        Ok(stage.predictions.for_match(match_id).into_iter().cloned().collect())
    })
}

pub fn leaderboard(store: &SharedStageStore, stage_id: &str) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    with_stage(store, stage_id, |stage| {
        Ok(stage.predictions.leaderboard(&stage.matches, stage.config.scoring))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn make_store() -> SharedStageStore {
        Arc::new(Mutex::new(StageStore::new(None)))
    }

    fn make_request(id: &str, format: StageFormat, teams: &[&str]) -> CreateStageRequest {
        CreateStageRequest {
            config: StageConfig {
                id: id.to_string(),
                name: id.to_string(),
                format,
                match_format: MatchFormat::Bo1,
                current_round: 0,
                thresholds: Thresholds::default(),
                allow_rematches: true,
                scoring: ScoringRules::default(),
            },
            teams: teams
                .iter()
                .map(|name| Team { name: name.to_string(), logo: None })
                .collect(),
        }
    }

    fn result(winner: &str, score: &str) -> ResultRequest {
        ResultRequest {
            winner: winner.to_string(),
            score: score.to_string(),
        }
    }

    fn play_round(store: &SharedStageStore, stage_id: &str, round: &SwissRoundResponse) {
        for m in round.matches.iter().filter(|m| !m.is_bye) {
            let winner = m.team_a.to_string();
            apply_result(store, stage_id, m.id, result(&winner, "1-0")).unwrap();
        }
    }

    #[test]
    fn test_create_stage_rejects_bad_teams() {
        let store = make_store();
        assert!(create_stage(&store, make_request("solo", StageFormat::Swiss, &["A"])).is_err());
        assert!(create_stage(&store, make_request("dupes", StageFormat::Swiss, &["A", "A"])).is_err());
        assert!(create_stage(&store, make_request("tbd", StageFormat::Swiss, &["A", "TBD"])).is_err());
        create_stage(&store, make_request("ok", StageFormat::Swiss, &["A", "B"])).unwrap();
        assert!(matches!(
            create_stage(&store, make_request("ok", StageFormat::Swiss, &["A", "B"])),
            Err(ServiceError::StageExists(_))
        ));
        assert_eq!(list_stages(&store).unwrap().len(), 1);
    }

    #[test]
    fn test_correction_discards_stale_predictions() {
        let store = make_store();
        // seed order A, C, D, B puts A-B and C-D in round one
        create_stage(&store, make_request("cup", StageFormat::SingleElimination, &["A", "C", "D", "B"])).unwrap();
        let matches = build_bracket(&store, "cup", BuildBracketRequest { seeded: true }).unwrap();
        assert_eq!(matches.len(), 3);

        apply_result(&store, "cup", 1, result("A", "1-0")).unwrap();
        apply_result(&store, "cup", 2, result("C", "1-0")).unwrap();
        let pick = PredictionRequest {
            user: "ana".to_string(),
            winner: "A".to_string(),
            score: "1-0".to_string(),
        };
        submit_prediction(&store, "cup", 3, pick).unwrap();
        let picks = match_predictions(&store, "cup", 3).unwrap();
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].user, "ana");

        let response = apply_result(&store, "cup", 1, result("B", "0-1")).unwrap();
        assert_eq!(response.discarded_predictions, 1);
        assert_eq!(response.progression.invalidated, vec![3]);
        assert!(match_predictions(&store, "cup", 3).unwrap().is_empty());
        assert!(matches!(
            match_predictions(&store, "cup", 99),
            Err(ServiceError::Engine(EngineError::MatchNotFound(99)))
        ));

        let stage = get_stage(&store, "cup").unwrap();
        let final_match = stage.matches.iter().find(|m| m.id == 3).unwrap();
        assert_eq!(final_match.team_a, Slot::Team("B".to_string()));
        assert!(stage.predictions.is_empty());
        assert!(matches!(
            build_bracket(&store, "cup", BuildBracketRequest { seeded: true }),
            Err(ServiceError::WrongFormat { .. })
        ));
    }

    #[test]
    fn test_failed_call_leaves_stage_untouched() {
        let store = make_store();
        create_stage(&store, make_request("cup", StageFormat::SingleElimination, &["A", "B", "C", "D"])).unwrap();
        build_bracket(&store, "cup", BuildBracketRequest { seeded: true }).unwrap();
        let before = get_stage(&store, "cup").unwrap();

        let err = apply_result(&store, "cup", 3, result("A", "1-0")).unwrap_err();
        assert!(matches!(err, ServiceError::Engine(EngineError::StaleTopology(3))));
        let after = get_stage(&store, "cup").unwrap();
        assert_eq!(before.matches, after.matches);
        assert_eq!(before.updated_at, after.updated_at);
    }

    #[test]
    fn test_manual_seeding_over_service() {
        let store = make_store();
        create_stage(&store, make_request("cup", StageFormat::DoubleElimination, &["A", "B", "C"])).unwrap();
        let matches = build_bracket(&store, "cup", BuildBracketRequest { seeded: false }).unwrap();
        let open = matches
            .iter()
            .find(|m| m.round == 1 && !m.is_bye && m.bracket_side == Some(BracketSide::Winners))
            .unwrap();
        let seed = |team: &str| SeedSlotRequest {
            side: SlotSide::A,
            team: team.to_string(),
        };
        assert!(matches!(
            seed_slot(&store, "cup", open.id, seed("Z")),
            Err(ServiceError::WrongFormat { .. })
        ));
        seed_slot(&store, "cup", open.id, seed("B")).unwrap();
        let stage = get_stage(&store, "cup").unwrap();
        assert!(stage.matches.iter().any(|m| m.id == open.id && m.has_team("B")));
    }

    #[test]
    fn test_swiss_rounds_until_rematches_are_forced() {
        let store = make_store();
        let mut request = make_request("groups", StageFormat::Swiss, &["A", "B", "C", "D"]);
        request.config.allow_rematches = false;
        create_stage(&store, request).unwrap();
        assert!(matches!(
            build_bracket(&store, "groups", BuildBracketRequest { seeded: true }),
            Err(ServiceError::WrongFormat { .. })
        ));

        let first = next_swiss_round(&store, "groups").unwrap();
        assert_eq!(first.round, 1);
        assert_eq!(first.pairings.len(), 2);
        assert!(matches!(
            next_swiss_round(&store, "groups"),
            Err(ServiceError::WrongFormat { .. })
        ));
        play_round(&store, "groups", &first);

        let second = next_swiss_round(&store, "groups").unwrap();
        let pairs = second
            .pairings
            .iter()
            .map(|p| (p.team_a.as_str(), p.team_b.as_deref()))
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec![("A", Some("C")), ("B", Some("D"))]);
        play_round(&store, "groups", &second);

        let third = next_swiss_round(&store, "groups").unwrap();
        assert_eq!(third.rematches, 0);
        play_round(&store, "groups", &third);

        let err = next_swiss_round(&store, "groups").unwrap_err();
        assert!(matches!(err, ServiceError::Engine(EngineError::PairingExhausted(_))));
        let stage = get_stage(&store, "groups").unwrap();
        assert_eq!(stage.config.current_round, 3);

        let table = standings(&store, "groups").unwrap();
        assert_eq!(table[0].team, "A");
        assert_eq!(table[0].wins, 3);
    }

    #[test]
    fn test_qualified_teams_sit_out() {
        let store = make_store();
        let mut request = make_request("groups", StageFormat::Swiss, &["A", "B", "C", "D"]);
        request.config.thresholds = Thresholds {
            qualify_at: Some(1),
            eliminate_at: None,
        };
        create_stage(&store, request).unwrap();
        let first = next_swiss_round(&store, "groups").unwrap();
        play_round(&store, "groups", &first);

        let second = next_swiss_round(&store, "groups").unwrap();
        let paired = second
            .pairings
            .iter()
            .flat_map(|p| std::iter::once(p.team_a.clone()).chain(p.team_b.clone()))
            .collect::<Vec<_>>();
        assert_eq!(paired, vec!["B".to_string(), "D".to_string()]);
        let table = standings(&store, "groups").unwrap();
        assert_eq!(table.iter().filter(|s| s.status == StandingStatus::Qualified).count(), 2);
    }

    #[test]
    fn test_leaderboard_follows_results() {
        let store = make_store();
        create_stage(&store, make_request("cup", StageFormat::SingleElimination, &["A", "B"])).unwrap();
        build_bracket(&store, "cup", BuildBracketRequest { seeded: true }).unwrap();
        for (user, winner, score) in [("ana", "A", "1-0"), ("bo", "B", "0-1")] {
            let pick = PredictionRequest {
                user: user.to_string(),
                winner: winner.to_string(),
                score: score.to_string(),
            };
            submit_prediction(&store, "cup", 1, pick).unwrap();
        }
        apply_result(&store, "cup", 1, result("A", "1-0")).unwrap();

        let board = leaderboard(&store, "cup").unwrap();
        assert_eq!(board[0].user, "ana");
        assert_eq!(board[0].points, ScoringRules::default().exact_score);
        assert_eq!(board[1].points, 0);
    }

    #[test]
    fn test_persisted_mutations_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store: SharedStageStore = Arc::new(Mutex::new(StageStore::new(Some(dir.path().to_path_buf()))));
        create_stage(&store, make_request("cup", StageFormat::SingleElimination, &["A", "B"])).unwrap();
        build_bracket(&store, "cup", BuildBracketRequest { seeded: true }).unwrap();
        apply_result(&store, "cup", 1, result("B", "0-1")).unwrap();

        let reloaded = StageStore::bootstrap(Some(dir.path().to_path_buf())).unwrap();
        let stage = reloaded.get("cup").unwrap();
        let guard = stage.lock().unwrap();
        assert_eq!(guard.matches[0].result.as_ref().map(|r| r.winner.as_str()), Some("B"));
    }
}
