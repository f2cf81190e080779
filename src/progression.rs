use crate::error::EngineError;
use crate::graph::MatchGraph;
use crate::score::{normalize_score, validate_result};
use crate::types::{BracketSide, Match, MatchId, MatchResult, Slot, SlotSide, BYE, TBD};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// What one engine call changed. `updated` holds the new state of every match
/// that differs from the input snapshot and is meant to be committed as one
/// unit; `invalidated` lists matches whose participants changed, so
/// predictions made against them are stale.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progression {
  pub updated: Vec<Match>,
  pub cleared: Vec<MatchId>,
  pub invalidated: Vec<MatchId>,
}

impl Progression {
  pub fn is_empty(&self) -> bool {
    self.updated.is_empty()
  }

  pub fn apply_to(&self, matches: &mut Vec<Match>) {
    let index = matches
      .iter()
      .enumerate()
      .map(|(idx, m)| (m.id, idx))
      .collect::<HashMap<_, _>>();
    for updated in &self.updated {
      match index.get(&updated.id) {
        Some(idx) => matches[*idx] = updated.clone(),
        None => matches.push(updated.clone()),
      }
    }
  }
}

/// Record `winner`/`score` on `match_id` and resolve everything downstream.
///
/// Reapplying the recorded result is a no-op. A different winner first takes
/// back the old winner and loser from their destinations, clearing any
/// downstream result that depended on them, then advances the new ones.
pub fn apply_result(
  matches: &[Match],
  match_id: MatchId,
  winner: &str,
  score: &str,
) -> Result<Progression, EngineError> {
  let mut graph = MatchGraph::new(matches.to_vec())?;
  let target = graph.get(match_id)?;
  validate_result(target, winner, score)?;

  let result = MatchResult {
    winner: winner.to_string(),
    score: normalize_score(score),
  };
  let previous = target.result.clone();
  if previous.as_ref() == Some(&result) {
    debug!("match {match_id}: result unchanged");
    return Ok(Progression::default());
  }

  let winner_changed = match &previous {
    Some(old) if old.winner != result.winner => {
      info!(
        "match {match_id}: correcting winner {} -> {}",
        old.winner, result.winner
      );
      let mut visited = HashSet::new();
      graph.retract_outputs(match_id, &mut visited)?;
      true
    }
    Some(_) => false,
    None => true,
  };

  graph.get_mut(match_id)?.result = Some(result);
  if winner_changed {
    graph.propagate(match_id)?;
  }
  Ok(diff(matches, graph))
}

pub fn reset_result(matches: &[Match], match_id: MatchId) -> Result<Progression, EngineError> {
  let mut graph = MatchGraph::new(matches.to_vec())?;
  let target = graph.get(match_id)?;
  if target.is_bye {
    return Err(EngineError::ByeMatch(match_id));
  }
  if target.result.is_none() {
    return Ok(Progression::default());
  }
  info!("match {match_id}: resetting result and dependents");
  let mut visited = HashSet::new();
  graph.retract_outputs(match_id, &mut visited)?;
  graph.get_mut(match_id)?.result = None;
  Ok(diff(matches, graph))
}

/// Fill an open round-one slot of a manually seeded bracket. A slot facing a
/// bye resolves at once and the team advances.
pub fn seed_slot(
  matches: &[Match],
  match_id: MatchId,
  side: SlotSide,
  team: &str,
) -> Result<Progression, EngineError> {
  let team = team.trim();
  if team.is_empty() || team == TBD || team == BYE {
    return Err(EngineError::InvalidConfiguration(format!(
      "{team:?} is not a usable team name"
    )));
  }
  let mut graph = MatchGraph::new(matches.to_vec())?;
  let target = graph.get(match_id)?;
  if target.round != 1 || target.bracket_side != Some(BracketSide::Winners) {
    return Err(EngineError::InvalidConfiguration(format!(
      "match {match_id} is not a round-one winners match"
    )));
  }
  match target.slot(side) {
    Slot::Tbd => {}
    Slot::Bye => {
      return Err(EngineError::InvalidConfiguration(format!(
        "match {match_id} slot {side:?} is a bye"
      )))
    }
    Slot::Team(existing) => {
      return Err(EngineError::InvalidConfiguration(format!(
        "match {match_id} slot {side:?} already holds {existing}"
      )))
    }
  }
  let already_seeded = matches
    .iter()
    .filter(|m| m.round == 1 && m.bracket_side == Some(BracketSide::Winners))
    .any(|m| m.has_team(team));
  if already_seeded {
    return Err(EngineError::InvalidConfiguration(format!(
      "{team} is already seeded in round one"
    )));
  }

  graph.place(match_id, Some(side), Slot::Team(team.to_string()))?;
  Ok(diff(matches, graph))
}

fn diff(before: &[Match], graph: MatchGraph) -> Progression {
  let touched = graph.touched().clone();
  let before = before
    .iter()
    .map(|m| (m.id, m))
    .collect::<HashMap<_, _>>();
  let mut progression = Progression::default();
  for after in graph.into_matches() {
    if !touched.contains(&after.id) {
      continue;
    }
    let Some(old) = before.get(&after.id) else {
      continue;
    };
    if **old == after {
      continue;
    }
    if old.result.is_some() && after.result.is_none() {
      progression.cleared.push(after.id);
    }
    if old.team_a != after.team_a || old.team_b != after.team_b {
      progression.invalidated.push(after.id);
    }
    progression.updated.push(after);
  }
  if !progression.cleared.is_empty() {
    debug!("cascade cleared matches {:?}", progression.cleared);
  }
  progression
}
