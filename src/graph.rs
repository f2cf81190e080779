use crate::error::EngineError;
use crate::types::{Match, MatchId, MatchResult, Slot, SlotSide, BYE_SCORE};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

enum ByeShape {
  Walkover(String),
  Empty,
  Waiting,
}

pub struct MatchGraph {
  matches: Vec<Match>,
  index: HashMap<MatchId, usize>,
  touched: BTreeSet<MatchId>,
}

impl MatchGraph {
  pub fn new(matches: Vec<Match>) -> Result<Self, EngineError> {
    let mut index = HashMap::with_capacity(matches.len());
    for (idx, m) in matches.iter().enumerate() {
      if index.insert(m.id, idx).is_some() {
        return Err(EngineError::InvalidConfiguration(format!(
          "match id {} appears more than once",
          m.id
        )));
      }
    }
    Ok(MatchGraph {
      matches,
      index,
      touched: BTreeSet::new(),
    })
  }

  pub fn get(&self, id: MatchId) -> Result<&Match, EngineError> {
    self
      .index
      .get(&id)
      .and_then(|idx| self.matches.get(*idx))
      .ok_or(EngineError::MatchNotFound(id))
  }

  pub fn get_mut(&mut self, id: MatchId) -> Result<&mut Match, EngineError> {
    let idx = *self.index.get(&id).ok_or(EngineError::MatchNotFound(id))?;
    self.touched.insert(id);
    Ok(&mut self.matches[idx])
  }

  pub fn ids(&self) -> Vec<MatchId> {
    self.matches.iter().map(|m| m.id).collect()
  }

  pub fn touched(&self) -> &BTreeSet<MatchId> {
    &self.touched
  }

  pub fn into_matches(self) -> Vec<Match> {
    self.matches
  }

  pub fn place(&mut self, dest: MatchId, side: Option<SlotSide>, slot: Slot) -> Result<(), EngineError> {
    let target = self.get_mut(dest)?;
    let side = match side {
      Some(side) => side,
      None => {
        if target.team_a == Slot::Tbd {
          SlotSide::A
        } else if target.team_b == Slot::Tbd {
          SlotSide::B
        } else {
          return Err(EngineError::InvalidConfiguration(format!(
            "match {dest} has no open slot"
          )));
        }
      }
    };
    *target.slot_mut(side) = slot;
    self.settle(dest)
  }

  pub fn settle(&mut self, id: MatchId) -> Result<(), EngineError> {
    let m = self.get(id)?;
    if m.result.is_some() {
      return Ok(());
    }
    let shape = match (&m.team_a, &m.team_b) {
      (Slot::Team(team), Slot::Bye) | (Slot::Bye, Slot::Team(team)) => ByeShape::Walkover(team.clone()),
      (Slot::Bye, Slot::Bye) => ByeShape::Empty,
      (Slot::Tbd, Slot::Bye) | (Slot::Bye, Slot::Tbd) => ByeShape::Waiting,
      _ => return Ok(()),
    };
    let (next, next_slot, next_loser, next_loser_slot) =
      (m.next_match_id, m.next_match_slot, m.next_loser_match_id, m.next_loser_match_slot);

    match shape {
      ByeShape::Walkover(winner) => {
        debug!("match {id}: {winner} advances on a bye");
        let m = self.get_mut(id)?;
        m.is_bye = true;
        m.result = Some(MatchResult {
          winner,
          score: BYE_SCORE.to_string(),
        });
        self.propagate(id)
      }
      ByeShape::Empty => {
        self.get_mut(id)?.is_bye = true;
        if let Some(next) = next {
          self.place_if_changed(next, next_slot, Slot::Bye)?;
        }
        if let Some(next_loser) = next_loser {
          self.place_if_changed(next_loser, next_loser_slot, Slot::Bye)?;
        }
        Ok(())
      }
      // a bye never produces a loser
      ByeShape::Waiting => {
        self.get_mut(id)?.is_bye = true;
        if let Some(next_loser) = next_loser {
          self.place_if_changed(next_loser, next_loser_slot, Slot::Bye)?;
        }
        Ok(())
      }
    }
  }

  fn place_if_changed(&mut self, dest: MatchId, side: Option<SlotSide>, slot: Slot) -> Result<(), EngineError> {
    if let Some(side) = side {
      if *self.get(dest)?.slot(side) == slot {
        return Ok(());
      }
    }
    self.place(dest, side, slot)
  }

  pub fn propagate(&mut self, id: MatchId) -> Result<(), EngineError> {
    let m = self.get(id)?;
    let Some(result) = m.result.as_ref() else {
      return Ok(());
    };
    let winner = Slot::Team(result.winner.clone());
    let loser = m
      .loser()
      .map(|name| Slot::Team(name.to_string()))
      .unwrap_or(Slot::Bye);
    let (next, next_slot, next_loser, next_loser_slot) =
      (m.next_match_id, m.next_match_slot, m.next_loser_match_id, m.next_loser_match_slot);
    if let Some(next) = next {
      self.place(next, next_slot, winner)?;
    }
    if let Some(next_loser) = next_loser {
      self.place(next_loser, next_loser_slot, loser)?;
    }
    Ok(())
  }

  /// Take back everything `id`'s current result wrote downstream. Destinations
  /// that were already decided lose their result and retract in turn.
  pub fn retract_outputs(&mut self, id: MatchId, visited: &mut HashSet<MatchId>) -> Result<(), EngineError> {
    if !visited.insert(id) {
      return Ok(());
    }
    let m = self.get(id)?;
    let Some(result) = m.result.as_ref() else {
      return Ok(());
    };
    let winner = result.winner.clone();
    let loser = m.loser().map(str::to_string);
    let (next, next_slot, next_loser, next_loser_slot) =
      (m.next_match_id, m.next_match_slot, m.next_loser_match_id, m.next_loser_match_slot);
    if let Some(next) = next {
      self.vacate(next, next_slot, &winner, visited)?;
    }
    if let (Some(next_loser), Some(loser)) = (next_loser, loser) {
      self.vacate(next_loser, next_loser_slot, &loser, visited)?;
    }
    Ok(())
  }

  fn vacate(
    &mut self,
    dest: MatchId,
    side: Option<SlotSide>,
    team: &str,
    visited: &mut HashSet<MatchId>,
  ) -> Result<(), EngineError> {
    let target = self.get(dest)?;
    let side = match side {
      Some(side) if target.slot(side).team().is_some() => side,
      Some(_) => return Ok(()),
      None => {
        if target.team_a.is_team(team) {
          SlotSide::A
        } else if target.team_b.is_team(team) {
          SlotSide::B
        } else {
          return Ok(());
        }
      }
    };
    if target.result.is_some() {
      debug!("match {dest}: clearing result that depended on {team}");
      self.retract_outputs(dest, visited)?;
      self.get_mut(dest)?.result = None;
    }
    *self.get_mut(dest)?.slot_mut(side) = Slot::Tbd;
    Ok(())
  }
}
