use crate::error::EngineError;
use crate::types::{Match, MatchFormat, BYE_SCORE};
use std::fmt;

impl MatchFormat {
  pub fn best_of(self) -> u8 {
    match self {
      MatchFormat::Bo1 => 1,
      MatchFormat::Bo3 => 3,
      MatchFormat::Bo5 => 5,
      MatchFormat::Bo7 => 7,
    }
  }

  pub fn games_to_win(self) -> u8 {
    (self.best_of() / 2) + 1
  }

  /// Every legal score for a match won by `team_a` (`winner_is_a`) or `team_b`,
  /// written as `team_a wins - team_b wins`.
  pub fn valid_scores(self, winner_is_a: bool) -> Vec<String> {
    let needed = self.games_to_win();
    (0..needed)
      .map(|loser_wins| {
        if winner_is_a {
          format!("{needed}-{loser_wins}")
        } else {
          format!("{loser_wins}-{needed}")
        }
      })
      .collect()
  }

  pub fn is_valid_score(self, score: &str, winner_is_a: bool) -> bool {
    let Some((a, b)) = parse_score(score) else {
      return false;
    };
    self.valid_scores(winner_is_a).contains(&format!("{a}-{b}"))
  }
}

impl fmt::Display for MatchFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "BO{}", self.best_of())
  }
}

pub fn parse_score(raw: &str) -> Option<(u8, u8)> {
  let (a, b) = raw.trim().split_once('-')?;
  let a = a.trim().parse::<u8>().ok()?;
  let b = b.trim().parse::<u8>().ok()?;
  Some((a, b))
}

/// Check `winner` and `score` against the participants and format of `m`.
/// Both participants must already be real teams.
pub fn validate_result(m: &Match, winner: &str, score: &str) -> Result<(), EngineError> {
  if m.is_bye {
    return Err(EngineError::ByeMatch(m.id));
  }
  let (Some(team_a), Some(team_b)) = (m.team_a.team(), m.team_b.team()) else {
    return Err(EngineError::StaleTopology(m.id));
  };
  let winner_is_a = if team_a == winner {
    true
  } else if team_b == winner {
    false
  } else {
    return Err(EngineError::InvalidWinner {
      match_id: m.id,
      winner: winner.to_string(),
    });
  };
  if score.trim() == BYE_SCORE || !m.match_format.is_valid_score(score, winner_is_a) {
    return Err(EngineError::InvalidScore {
      match_id: m.id,
      score: score.to_string(),
      format: m.match_format.to_string(),
      winner: winner.to_string(),
    });
  }
  Ok(())
}

/// Scores are stored in the canonical `a-b` form regardless of input spacing.
pub fn normalize_score(score: &str) -> String {
  match parse_score(score) {
    Some((a, b)) => format!("{a}-{b}"),
    None => score.trim().to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::Slot;

  fn make_match(format: MatchFormat) -> Match {
    Match {
      id: 7,
      team_a: Slot::Team("A".to_string()),
      team_b: Slot::Team("B".to_string()),
      round: 1,
      bracket_side: None,
      bracket_position: 0,
      next_match_id: None,
      next_match_slot: None,
      next_loser_match_id: None,
      next_loser_match_slot: None,
      is_bye: false,
      result: None,
      match_format: format,
    }
  }

  #[test]
  fn test_bo3_scores_for_team_a() {
    assert_eq!(MatchFormat::Bo3.valid_scores(true), vec!["2-0", "2-1"]);
    let m = make_match(MatchFormat::Bo3);
    assert!(validate_result(&m, "A", "2-0").is_ok());
    assert!(validate_result(&m, "A", "2-1").is_ok());
    assert!(matches!(
      validate_result(&m, "A", "2-2"),
      Err(EngineError::InvalidScore { .. })
    ));
    assert!(matches!(
      validate_result(&m, "A", "1-2"),
      Err(EngineError::InvalidScore { .. })
    ));
  }

  #[test]
  fn test_team_b_winner_reads_from_team_a_side() {
    let m = make_match(MatchFormat::Bo5);
    assert!(validate_result(&m, "B", "1-3").is_ok());
    assert!(validate_result(&m, "B", "3-1").is_err());
    assert_eq!(MatchFormat::Bo5.valid_scores(false), vec!["0-3", "1-3", "2-3"]);
  }

  #[test]
  fn test_rejects_unknown_winner_and_garbage() {
    let m = make_match(MatchFormat::Bo1);
    assert!(matches!(
      validate_result(&m, "C", "1-0"),
      Err(EngineError::InvalidWinner { .. })
    ));
    assert!(validate_result(&m, "A", "one-zero").is_err());
    assert!(validate_result(&m, "A", "BYE").is_err());
    assert!(validate_result(&m, "A", " 1 - 0 ").is_ok());
    assert_eq!(normalize_score(" 1 - 0 "), "1-0");
  }

  #[test]
  fn test_tbd_participant_is_stale() {
    let mut m = make_match(MatchFormat::Bo1);
    m.team_b = Slot::Tbd;
    assert_eq!(validate_result(&m, "A", "1-0"), Err(EngineError::StaleTopology(7)));
  }

  #[test]
  fn test_bo7_needs_four() {
    assert_eq!(MatchFormat::Bo7.games_to_win(), 4);
    assert!(MatchFormat::Bo7.is_valid_score("4-3", true));
    assert!(!MatchFormat::Bo7.is_valid_score("5-3", true));
  }
}
