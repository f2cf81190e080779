use crate::types::{Match, StandingStatus, SwissStanding, Thresholds};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

/// Who has met whom, kept symmetric: if `a` lists `b`, `b` lists `a`.
/// Opponents are listed in the order they were first met.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpponentHistory {
  opponents: BTreeMap<String, Vec<String>>,
}

impl OpponentHistory {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every team-vs-team pairing counts as a meeting once it is scheduled,
  /// played or not. Byes record nothing.
  pub fn from_matches(matches: &[Match]) -> Self {
    let mut ordered = matches.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|m| (m.round, m.bracket_position, m.id));
    let mut history = Self::new();
    for m in ordered {
      if let (Some(a), Some(b)) = (m.team_a.team(), m.team_b.team()) {
        history.record(a, b);
      }
    }
    history
  }

  pub fn record(&mut self, a: &str, b: &str) {
    if a == b {
      return;
    }
    self.push_one(a, b);
    self.push_one(b, a);
  }

  /// Record the meetings of a freshly scheduled round.
  pub fn record_round(&mut self, matches: &[Match]) {
    for m in matches {
      if let (Some(a), Some(b)) = (m.team_a.team(), m.team_b.team()) {
        self.record(a, b);
      }
    }
  }

  fn push_one(&mut self, team: &str, opponent: &str) {
    let list = self.opponents.entry(team.to_string()).or_default();
    if !list.iter().any(|name| name == opponent) {
      list.push(opponent.to_string());
    }
  }

  pub fn opponents(&self, team: &str) -> &[String] {
    self.opponents.get(team).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn has_played(&self, a: &str, b: &str) -> bool {
    self.opponents(a).iter().any(|name| name == b)
  }
}

#[derive(Default)]
struct Record {
  wins: u32,
  losses: u32,
  bye_wins: u32,
}

/// Rank `teams` by their record in `matches`.
///
/// A bye is a win with no opponent. Buchholz is the sum of the current points
/// of every distinct opponent in `history`, less any bye wins those opponents
/// hold. Status is only derived for the thresholds that are set. Ties fall
/// back to Buchholz, then name.
pub fn compute(
  teams: &[String],
  matches: &[Match],
  history: &OpponentHistory,
  thresholds: Option<Thresholds>,
) -> Vec<SwissStanding> {
  let mut records = teams
    .iter()
    .map(|team| (team.as_str(), Record::default()))
    .collect::<HashMap<_, _>>();

  for m in matches {
    let Some(result) = m.result.as_ref() else {
      continue;
    };
    if let Some(record) = records.get_mut(result.winner.as_str()) {
      record.wins += 1;
      if m.is_bye {
        record.bye_wins += 1;
      }
    }
    if let Some(record) = m.loser().and_then(|loser| records.get_mut(loser)) {
      record.losses += 1;
    }
  }

  // What a team is worth to its opponents' Buchholz.
  let contribution = records
    .iter()
    .map(|(team, record)| (*team, record.wins - record.bye_wins))
    .collect::<HashMap<_, _>>();

  let mut standings = teams
    .iter()
    .map(|team| {
      let (wins, losses) = records
        .get(team.as_str())
        .map(|record| (record.wins, record.losses))
        .unwrap_or_default();
      let opponent_history = history.opponents(team).to_vec();
      let buchholz = opponent_history
        .iter()
        .map(|opponent| contribution.get(opponent.as_str()).copied().unwrap_or(0))
        .sum();
      SwissStanding {
        team: team.clone(),
        wins,
        losses,
        points: wins,
        buchholz,
        opponent_history,
        status: status_for(wins, losses, thresholds),
      }
    })
    .collect::<Vec<_>>();

  standings.sort_by(|a, b| {
    (Reverse(a.points), Reverse(a.buchholz), &a.team).cmp(&(Reverse(b.points), Reverse(b.buchholz), &b.team))
  });
  standings
}

fn status_for(wins: u32, losses: u32, thresholds: Option<Thresholds>) -> StandingStatus {
  let Some(thresholds) = thresholds else {
    return StandingStatus::Active;
  };
  if thresholds.qualify_at.is_some_and(|at| wins >= at) {
    StandingStatus::Qualified
  } else if thresholds.eliminate_at.is_some_and(|at| losses >= at) {
    StandingStatus::Eliminated
  } else {
    StandingStatus::Active
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{MatchFormat, MatchResult, Slot, BYE_SCORE};

  fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|name| name.to_string()).collect()
  }

  fn make_game(id: u64, round: u32, a: &str, b: &str, winner: &str) -> Match {
    Match {
      id,
      team_a: Slot::Team(a.to_string()),
      team_b: Slot::Team(b.to_string()),
      round,
      bracket_side: None,
      bracket_position: id as u32,
      next_match_id: None,
      next_match_slot: None,
      next_loser_match_id: None,
      next_loser_match_slot: None,
      is_bye: false,
      result: Some(MatchResult {
        winner: winner.to_string(),
        score: "1-0".to_string(),
      }),
      match_format: MatchFormat::Bo1,
    }
  }

  fn make_bye(id: u64, round: u32, team: &str) -> Match {
    Match {
      team_b: Slot::Bye,
      is_bye: true,
      result: Some(MatchResult {
        winner: team.to_string(),
        score: BYE_SCORE.to_string(),
      }),
      ..make_game(id, round, team, team, team)
    }
  }

  fn find<'a>(standings: &'a [SwissStanding], team: &str) -> &'a SwissStanding {
    standings.iter().find(|s| s.team == team).unwrap()
  }

  #[test]
  fn test_bye_counts_as_win_but_not_for_buchholz() {
    let matches = vec![make_game(1, 1, "A", "B", "A"), make_bye(2, 1, "C")];
    let history = OpponentHistory::from_matches(&matches);
    let standings = compute(&names(&["A", "B", "C"]), &matches, &history, None);

    let c = find(&standings, "C");
    assert_eq!((c.wins, c.losses, c.points), (1, 0, 1));
    assert_eq!(c.buchholz, 0);
    assert!(c.opponent_history.is_empty());
    assert_eq!(find(&standings, "A").buchholz, 0);
    assert_eq!(find(&standings, "B").buchholz, 1);
    assert!(!history.has_played("C", "C"));
  }

  #[test]
  fn test_opponent_bye_does_not_feed_buchholz() {
    let matches = vec![
      make_game(1, 1, "A", "B", "A"),
      make_bye(2, 1, "C"),
      make_game(3, 2, "C", "A", "C"),
    ];
    let history = OpponentHistory::from_matches(&matches);
    let standings = compute(&names(&["A", "B", "C"]), &matches, &history, None);

    let c = find(&standings, "C");
    assert_eq!((c.points, c.buchholz), (2, 1));
    // A: B 0 + C 1 (C's bye is not counted)
    let a = find(&standings, "A");
    assert_eq!((a.points, a.buchholz), (1, 1));
    assert_eq!(find(&standings, "B").buchholz, 1);
    let order = standings.iter().map(|s| s.team.as_str()).collect::<Vec<_>>();
    assert_eq!(order, vec!["C", "A", "B"]);
  }

  #[test]
  fn test_buchholz_uses_current_points() {
    let matches = vec![
      make_game(1, 1, "A", "B", "A"),
      make_game(2, 1, "C", "D", "C"),
      make_game(3, 2, "A", "C", "A"),
      make_game(4, 2, "B", "D", "B"),
    ];
    let history = OpponentHistory::from_matches(&matches);
    let standings = compute(&names(&["A", "B", "C", "D"]), &matches, &history, None);

    // A: B 1 + C 1, B: A 2 + D 0, C: D 0 + A 2, D: C 1 + B 1
    assert_eq!(find(&standings, "A").buchholz, 2);
    assert_eq!(find(&standings, "C").buchholz, 2);
    assert_eq!(find(&standings, "B").buchholz, 2);
    assert_eq!(find(&standings, "D").buchholz, 2);
    let order = standings.iter().map(|s| s.team.as_str()).collect::<Vec<_>>();
    assert_eq!(order, vec!["A", "B", "C", "D"]);
  }

  #[test]
  fn test_ties_resolve_alphabetically() {
    let teams = names(&["Zeta", "alpha", "Alpha", "Mu"]);
    let history = OpponentHistory::new();
    let first = compute(&teams, &[], &history, None);
    let again = compute(&teams, &[], &history, None);
    let order = first.iter().map(|s| s.team.as_str()).collect::<Vec<_>>();
    assert_eq!(order, vec!["Alpha", "Mu", "Zeta", "alpha"]);
    assert_eq!(first, again);
  }

  #[test]
  fn test_status_thresholds() {
    let matches = vec![
      make_game(1, 1, "A", "B", "A"),
      make_game(2, 2, "A", "C", "A"),
      make_game(3, 2, "B", "D", "D"),
    ];
    let history = OpponentHistory::from_matches(&matches);
    let thresholds = Thresholds {
      qualify_at: Some(2),
      eliminate_at: Some(2),
    };
    let standings = compute(&names(&["A", "B", "C", "D"]), &matches, &history, Some(thresholds));
    assert_eq!(find(&standings, "A").status, StandingStatus::Qualified);
    assert_eq!(find(&standings, "B").status, StandingStatus::Eliminated);
    assert_eq!(find(&standings, "C").status, StandingStatus::Active);

    let untracked = compute(&names(&["A", "B"]), &matches, &history, None);
    assert!(untracked.iter().all(|s| s.status == StandingStatus::Active));

    let qualify_only = Thresholds {
      qualify_at: Some(5),
      eliminate_at: None,
    };
    let standings = compute(&names(&["B"]), &matches, &history, Some(qualify_only));
    assert_eq!(standings[0].status, StandingStatus::Active);
  }

  #[test]
  fn test_history_is_symmetric_and_distinct() {
    let mut history = OpponentHistory::new();
    history.record("A", "B");
    history.record("B", "A");
    history.record("A", "C");
    assert_eq!(history.opponents("A"), ["B".to_string(), "C".to_string()]);
    assert_eq!(history.opponents("B"), ["A".to_string()]);
    assert!(history.has_played("C", "A"));
    assert!(!history.has_played("B", "C"));
    assert!(history.opponents("nobody").is_empty());
  }

  #[test]
  fn test_record_round_matches_rebuild() {
    let round_one = vec![make_game(1, 1, "A", "B", "A"), make_bye(2, 1, "C")];
    let round_two = vec![make_game(3, 2, "A", "C", "C")];
    let mut history = OpponentHistory::from_matches(&round_one);
    history.record_round(&round_two);

    let all = round_one.iter().chain(&round_two).cloned().collect::<Vec<_>>();
    assert_eq!(history, OpponentHistory::from_matches(&all));
    assert_eq!(history.opponents("C"), ["A".to_string()]);
  }
}
