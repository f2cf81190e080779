use crate::error::EngineError;
use crate::graph::MatchGraph;
use crate::types::{
  BracketSide, EliminationMode, Match, MatchFormat, MatchId, Slot, SlotSide, BYE, MAX_TEAM_COUNT, TBD,
};
use std::collections::{HashMap, HashSet};
use tracing::info;

#[derive(Clone, Copy, Debug)]
enum SlotSource {
  Seed(u32),
  Winner(MatchId),
  Loser(MatchId),
}

struct BracketBuilder<'a> {
  seeded: &'a [String],
  team_count: usize,
  format: MatchFormat,
  matches: Vec<Match>,
  sources: Vec<(MatchId, [SlotSource; 2])>,
  next_id: MatchId,
}

/// Build the full match graph of an elimination bracket.
///
/// `seeded` is either empty (every real slot starts as `TBD` for manual
/// seeding) or exactly `team_count` names in seed order. Seeds are laid out
/// with standard bracket positions, so byes go to the top seeds and never
/// meet each other. Bye matches come back already resolved with their winner
/// placed downstream.
pub fn build(
  team_count: usize,
  mode: EliminationMode,
  seeded: &[String],
  format: MatchFormat,
) -> Result<Vec<Match>, EngineError> {
  validate_teams(team_count, seeded)?;

  let bracket_size = next_power_of_two(team_count);
  let rounds = bracket_size.trailing_zeros() as usize;
  let mut builder = BracketBuilder {
    seeded,
    team_count,
    format,
    matches: Vec::new(),
    sources: Vec::new(),
    next_id: 1,
  };

  let winners_rounds = builder.push_winners_rounds(bracket_size, rounds);
  if mode == EliminationMode::Double {
    let losers_rounds = builder.push_losers_rounds(&winners_rounds, rounds)?;
    builder.push_grand_final(&winners_rounds, &losers_rounds)?;
  }

  let matches = builder.finish()?;
  info!(
    "built {:?} elimination bracket: {} teams, {} byes, {} matches",
    mode,
    team_count,
    bracket_size - team_count,
    matches.len()
  );
  Ok(matches)
}

pub(crate) fn validate_teams(team_count: usize, seeded: &[String]) -> Result<(), EngineError> {
  if team_count < 2 {
    return Err(EngineError::InvalidConfiguration(format!(
      "a bracket needs at least two teams, got {team_count}"
    )));
  }
  if team_count > MAX_TEAM_COUNT {
    return Err(EngineError::InvalidConfiguration(format!(
      "a bracket supports at most {MAX_TEAM_COUNT} teams, got {team_count}"
    )));
  }
  if seeded.is_empty() {
    return Ok(());
  }
  if seeded.len() != team_count {
    return Err(EngineError::InvalidConfiguration(format!(
      "{} seeded names for {team_count} teams",
      seeded.len()
    )));
  }
  let mut seen = HashSet::new();
  for name in seeded {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == TBD || trimmed == BYE {
      return Err(EngineError::InvalidConfiguration(format!(
        "{name:?} is not a usable team name"
      )));
    }
    if !seen.insert(trimmed) {
      return Err(EngineError::InvalidConfiguration(format!(
        "{trimmed} is seeded more than once"
      )));
    }
  }
  Ok(())
}

impl BracketBuilder<'_> {
  fn push_winners_rounds(&mut self, bracket_size: usize, rounds: usize) -> Vec<Vec<MatchId>> {
    let seeds = seed_positions(bracket_size as u32);
    let mut winners_rounds: Vec<Vec<MatchId>> = Vec::with_capacity(rounds);

    let mut w1_ids = Vec::with_capacity(bracket_size / 2);
    for i in 0..(bracket_size / 2) {
      let id = self.push_match(
        BracketSide::Winners,
        1,
        i as u32,
        SlotSource::Seed(seeds[i * 2]),
        SlotSource::Seed(seeds[i * 2 + 1]),
      );
      w1_ids.push(id);
    }
    winners_rounds.push(w1_ids);

    for round in 2..=rounds {
      let prev = winners_rounds[round - 2].clone();
      let mut ids = Vec::with_capacity(prev.len() / 2);
      for i in 0..(prev.len() / 2) {
        let slot_a = SlotSource::Winner(prev[i * 2]);
        let slot_b = SlotSource::Winner(prev[i * 2 + 1]);
        ids.push(self.push_match(BracketSide::Winners, round as u32, i as u32, slot_a, slot_b));
      }
      winners_rounds.push(ids);
    }
    winners_rounds
  }

  fn push_losers_rounds(
    &mut self,
    winners_rounds: &[Vec<MatchId>],
    rounds: usize,
  ) -> Result<Vec<Vec<MatchId>>, EngineError> {
    let mut losers_rounds: Vec<Vec<MatchId>> = Vec::new();
    for i in 1..rounds {
      let count = winners_rounds[i].len();
      let odd_round = (i * 2 - 1) as u32;
      let mut odd_ids = Vec::with_capacity(count);
      for j in 0..count {
        let (slot_a, slot_b) = if i == 1 {
          let w1 = &winners_rounds[0];
          (SlotSource::Loser(w1[j * 2]), SlotSource::Loser(w1[j * 2 + 1]))
        } else {
          let prev_even = losers_rounds
            .last()
            .ok_or_else(|| EngineError::InvalidConfiguration("missing losers round".to_string()))?;
          (SlotSource::Winner(prev_even[j * 2]), SlotSource::Winner(prev_even[j * 2 + 1]))
        };
        odd_ids.push(self.push_match(BracketSide::Losers, odd_round, j as u32, slot_a, slot_b));
      }
      losers_rounds.push(odd_ids);

      let l_odd = losers_rounds
        .last()
        .cloned()
        .ok_or_else(|| EngineError::InvalidConfiguration("missing losers round".to_string()))?;
      let mut even_ids = Vec::with_capacity(count);
      for (j, odd_id) in l_odd.iter().enumerate() {
        let dropped = winners_rounds[i][drop_in_index(i, j, count)];
        even_ids.push(self.push_match(
          BracketSide::Losers,
          (i * 2) as u32,
          j as u32,
          SlotSource::Winner(*odd_id),
          SlotSource::Loser(dropped),
        ));
      }
      losers_rounds.push(even_ids);
    }
    Ok(losers_rounds)
  }

  fn push_grand_final(
    &mut self,
    winners_rounds: &[Vec<MatchId>],
    losers_rounds: &[Vec<MatchId>],
  ) -> Result<MatchId, EngineError> {
    let winners_final = *winners_rounds
      .last()
      .and_then(|round| round.first())
      .ok_or_else(|| EngineError::InvalidConfiguration("missing winners final".to_string()))?;
    // with two teams there is no losers bracket and the final's loser goes straight through
    let losers_final_source = match losers_rounds.last() {
      Some(last_round) => {
        let id = *last_round
          .first()
          .ok_or_else(|| EngineError::InvalidConfiguration("missing losers final".to_string()))?;
        SlotSource::Winner(id)
      }
      None => SlotSource::Loser(winners_final),
    };
    Ok(self.push_match(
      BracketSide::GrandFinal,
      1,
      0,
      SlotSource::Winner(winners_final),
      losers_final_source,
    ))
  }

  fn push_match(
    &mut self,
    side: BracketSide,
    round: u32,
    position: u32,
    slot_a: SlotSource,
    slot_b: SlotSource,
  ) -> MatchId {
    let id = self.next_id;
    self.next_id += 1;
    let team_a = self.initial_slot(slot_a);
    let team_b = self.initial_slot(slot_b);
    self.matches.push(Match {
      id,
      team_a,
      team_b,
      round,
      bracket_side: Some(side),
      bracket_position: position,
      next_match_id: None,
      next_match_slot: None,
      next_loser_match_id: None,
      next_loser_match_slot: None,
      is_bye: false,
      result: None,
      match_format: self.format,
    });
    self.sources.push((id, [slot_a, slot_b]));
    id
  }

  fn initial_slot(&self, source: SlotSource) -> Slot {
    match source {
      SlotSource::Seed(seed) if seed as usize > self.team_count => Slot::Bye,
      SlotSource::Seed(seed) => self
        .seeded
        .get(seed as usize - 1)
        .map(|name| Slot::Team(name.trim().to_string()))
        .unwrap_or(Slot::Tbd),
      SlotSource::Winner(_) | SlotSource::Loser(_) => Slot::Tbd,
    }
  }

  fn finish(self) -> Result<Vec<Match>, EngineError> {
    let index = self
      .matches
      .iter()
      .enumerate()
      .map(|(idx, m)| (m.id, idx))
      .collect::<HashMap<_, _>>();
    let mut matches = self.matches;
    for (id, slots) in &self.sources {
      for (source, side) in slots.iter().zip([SlotSide::A, SlotSide::B]) {
        let (src, is_loser) = match source {
          SlotSource::Winner(src) => (*src, false),
          SlotSource::Loser(src) => (*src, true),
          SlotSource::Seed(_) => continue,
        };
        let src_idx = *index
          .get(&src)
          .ok_or(EngineError::MatchNotFound(src))?;
        let feeder = &mut matches[src_idx];
        if is_loser {
          feeder.next_loser_match_id = Some(*id);
          feeder.next_loser_match_slot = Some(side);
        } else {
          feeder.next_match_id = Some(*id);
          feeder.next_match_slot = Some(side);
        }
      }
    }

    let mut graph = MatchGraph::new(matches)?;
    for id in graph.ids() {
      graph.settle(id)?;
    }
    Ok(graph.into_matches())
  }
}

/// Which winners-round match drops its loser into losers position `j`.
/// Odd drop rounds are reversed and even ones swap halves, so a dropped team
/// lands away from the part of the losers bracket fed by its own earlier
/// opponents.
fn drop_in_index(drop_round: usize, j: usize, count: usize) -> usize {
  if drop_round % 2 == 1 {
    count - 1 - j
  } else {
    (j + count / 2) % count
  }
}

pub fn seed_positions(size: u32) -> Vec<u32> {
  let mut seeds = vec![1u32];
  while seeds.len() < size as usize {
    let n = seeds.len() as u32;
    let mut next = Vec::with_capacity(seeds.len() * 2);
    for seed in seeds.iter().copied() {
      next.push(seed);
      next.push((n * 2 + 1).saturating_sub(seed));
    }
    seeds = next;
  }
  seeds
}

pub fn next_power_of_two(n: usize) -> usize {
  n.max(1).next_power_of_two()
}
