use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::EngineError;
use crate::score::{normalize_score, validate_result};
use crate::types::{Match, MatchId, ScoringRules};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub user: String,
    pub match_id: MatchId,
    pub winner: String,
    pub score: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user: String,
    pub points: u32,
    pub correct_winners: u32,
    pub exact_scores: u32,
    pub scored_predictions: u32,
}

/// PredictionBook holds each user's latest prediction per match.
/// A match stops taking predictions once it has a result or is a bye.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionBook {
    /// match id -> user -> prediction
    by_match: BTreeMap<MatchId, BTreeMap<String, Prediction>>,
}

impl PredictionBook {
    pub fn new() -> Self {
        PredictionBook::default()
    }

    /// Store `user`'s pick for `match_id`, replacing any earlier pick.
    /// The pick is validated like a result against the current participants.
    pub fn submit(
        &mut self,
        matches: &[Match],
        user: &str,
        match_id: MatchId,
        winner: &str,
        score: &str,
        now: DateTime<Utc>,
    ) -> Result<Prediction, EngineError> {
        let user = user.trim();
        if user.is_empty() {
            return Err(EngineError::InvalidConfiguration("prediction needs a user".to_string()));
        }
        let m = matches
            .iter()
            .find(|m| m.id == match_id)
            .ok_or(EngineError::MatchNotFound(match_id))?;
        if m.is_bye || m.result.is_some() {
            return Err(EngineError::PredictionLocked(match_id));
        }
        validate_result(m, winner, score)?;

        let prediction = Prediction {
            user: user.to_string(),
            match_id,
            winner: winner.to_string(),
            score: normalize_score(score),
            submitted_at: now,
        };
        self.by_match
            .entry(match_id)
            .or_default()
            .insert(prediction.user.clone(), prediction.clone());
        Ok(prediction)
    }

    pub fn for_match(&self, match_id: MatchId) -> Vec<&Prediction> {
        self.by_match
            .get(&match_id)
            .map(|by_user| by_user.values().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_match.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every prediction made against the given matches. Returns how many
    /// were removed.
    pub fn discard(&mut self, match_ids: &[MatchId]) -> usize {
        let mut removed = 0;
        for id in match_ids {
            if let Some(by_user) = self.by_match.remove(id) {
                removed += by_user.len();
            }
        }
        if removed > 0 {
            info!("Discarded {} stale prediction(s) for matches {:?}", removed, match_ids);
        }
        removed
    }

    /// Score every prediction against decided matches. An exact score earns
    /// `exact_score`, a right winner with a wrong score earns `correct_winner`.
    /// Sorted by points, then user name.
    pub fn leaderboard(&self, matches: &[Match], rules: ScoringRules) -> Vec<LeaderboardEntry> {
        let results = matches
            .iter()
            .filter(|m| !m.is_bye)
            .filter_map(|m| m.result.as_ref().map(|result| (m.id, result)))
            .collect::<HashMap<_, _>>();

        let mut entries: BTreeMap<&str, LeaderboardEntry> = BTreeMap::new();
        for (match_id, by_user) in &self.by_match {
            for prediction in by_user.values() {
                let entry = entries.entry(prediction.user.as_str()).or_insert_with(|| LeaderboardEntry {
                    user: prediction.user.clone(),
                    points: 0,
                    correct_winners: 0,
                    exact_scores: 0,
                    scored_predictions: 0,
                });
                let Some(result) = results.get(match_id) else {
                    continue;
                };
                entry.scored_predictions += 1;
                if result.winner != prediction.winner {
                    continue;
                }
                entry.correct_winners += 1;
                if result.score == prediction.score {
                    entry.exact_scores += 1;
                    entry.points += rules.exact_score;
                } else {
                    entry.points += rules.correct_winner;
                }
            }
        }

        let mut board = entries.into_values().collect::<Vec<_>>();
        board.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.user.cmp(&b.user)));
        board
    }
}
