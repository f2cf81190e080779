use crate::error::EngineError;
use crate::standings::OpponentHistory;
use crate::types::{Match, MatchFormat, MatchId, MatchResult, Pairing, Slot, SwissStanding, BYE_SCORE};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwissRound {
  pub pairings: Vec<Pairing>,
  pub rematches: usize,
}

impl SwissRound {
  pub fn require_no_rematch(self) -> Result<Self, EngineError> {
    if self.rematches > 0 {
      return Err(EngineError::PairingExhausted(self.rematches));
    }
    Ok(self)
  }
}

/// Pair the next round from `standings`.
///
/// Teams are ranked by points then Buchholz, keeping the incoming order on
/// ties. With an odd count the lowest-ranked team that has not had a bye sits
/// out. Each remaining top team meets the highest-ranked team it has not
/// played; when only rematches are left it takes the next-best one and the
/// pairing is flagged.
pub fn pair(standings: &[SwissStanding], history: &OpponentHistory, already_byed: &HashSet<String>) -> SwissRound {
  let mut pool = standings.iter().collect::<Vec<_>>();
  pool.sort_by_key(|s| (Reverse(s.points), Reverse(s.buchholz)));

  let mut round = SwissRound::default();
  let mut bye = None;
  if pool.len() % 2 == 1 {
    let idx = pool
      .iter()
      .rposition(|s| !already_byed.contains(&s.team))
      .unwrap_or(pool.len() - 1);
    let team = pool.remove(idx);
    debug!("swiss: bye to {}", team.team);
    bye = Some(team.team.clone());
  }

  while !pool.is_empty() {
    let top = pool.remove(0);
    let (idx, is_rematch) = match pool
      .iter()
      .position(|candidate| !history.has_played(&top.team, &candidate.team))
    {
      Some(idx) => (idx, false),
      None => (0, true),
    };
    let opponent = pool.remove(idx);
    if is_rematch {
      warn!("swiss: forced rematch {} vs {}", top.team, opponent.team);
      round.rematches += 1;
    }
    round.pairings.push(Pairing {
      team_a: top.team.clone(),
      team_b: Some(opponent.team.clone()),
      is_bye: false,
      is_rematch,
    });
  }

  if let Some(team) = bye {
    round.pairings.push(Pairing {
      team_a: team,
      team_b: None,
      is_bye: true,
      is_rematch: false,
    });
  }
  round
}

pub fn schedule_round(round: u32, pairings: &[Pairing], first_id: MatchId, format: MatchFormat) -> Vec<Match> {
  pairings
    .iter()
    .enumerate()
    .map(|(position, pairing)| {
      let (team_b, result) = match &pairing.team_b {
        Some(opponent) => (Slot::Team(opponent.clone()), None),
        None => (
          Slot::Bye,
          Some(MatchResult {
            winner: pairing.team_a.clone(),
            score: BYE_SCORE.to_string(),
          }),
        ),
      };
      Match {
        id: first_id + position as MatchId,
        team_a: Slot::Team(pairing.team_a.clone()),
        team_b,
        round,
        bracket_side: None,
        bracket_position: position as u32,
        next_match_id: None,
        next_match_slot: None,
        next_loser_match_id: None,
        next_loser_match_slot: None,
        is_bye: pairing.is_bye,
        result,
        match_format: format,
      }
    })
    .collect()
}

pub fn byes_received(matches: &[Match]) -> HashSet<String> {
  matches
    .iter()
    .filter(|m| m.is_bye)
    .filter_map(|m| m.result.as_ref().map(|result| result.winner.clone()))
    .collect()
}

pub fn next_free_id(matches: &[Match]) -> MatchId {
  matches.iter().map(|m| m.id).max().map_or(1, |id| id + 1)
}
