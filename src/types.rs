use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use crate::predictions::PredictionBook;

// ── Constants ──────────────────────────────────────────────────────────

pub const TBD: &str = "TBD";
pub const BYE: &str = "BYE";
pub const BYE_SCORE: &str = "BYE";
pub const MAX_TEAM_COUNT: usize = 1024;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:17890";

// ── Shared state type aliases ──────────────────────────────────────────

pub type MatchId = u64;
pub type SharedStage = Arc<Mutex<Stage>>;
pub type SharedStageStore = Arc<Mutex<StageStore>>;

// ── Bracket domain types ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

/// One participant position of a match. Serialized as the team name or one of
/// the `"TBD"` / `"BYE"` sentinels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Slot {
    Team(String),
    Tbd,
    Bye,
}

impl Slot {
    pub fn team(&self) -> Option<&str> {
        match self {
            Slot::Team(name) => Some(name),
            Slot::Tbd | Slot::Bye => None,
        }
    }

    pub fn is_team(&self, name: &str) -> bool {
        self.team() == Some(name)
    }
}

impl From<String> for Slot {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            TBD => Slot::Tbd,
            BYE => Slot::Bye,
            _ => Slot::Team(raw),
        }
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        match slot {
            Slot::Team(name) => name,
            Slot::Tbd => TBD.to_string(),
            Slot::Bye => BYE.to_string(),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Team(name) => write!(f, "{name}"),
            Slot::Tbd => write!(f, "{TBD}"),
            Slot::Bye => write!(f, "{BYE}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotSide {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketSide {
    Winners,
    Losers,
    GrandFinal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EliminationMode {
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchFormat {
    #[default]
    #[serde(rename = "BO1")]
    Bo1,
    #[serde(rename = "BO3")]
    Bo3,
    #[serde(rename = "BO5")]
    Bo5,
    #[serde(rename = "BO7")]
    Bo7,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub winner: String,
    pub score: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub team_a: Slot,
    pub team_b: Slot,
    pub round: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bracket_side: Option<BracketSide>,
    pub bracket_position: u32,
    #[serde(default)]
    pub next_match_id: Option<MatchId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_match_slot: Option<SlotSide>,
    #[serde(default)]
    pub next_loser_match_id: Option<MatchId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_loser_match_slot: Option<SlotSide>,
    #[serde(default)]
    pub is_bye: bool,
    #[serde(default)]
    pub result: Option<MatchResult>,
    #[serde(default)]
    pub match_format: MatchFormat,
}

impl Match {
    pub fn slot(&self, side: SlotSide) -> &Slot {
        match side {
            SlotSide::A => &self.team_a,
            SlotSide::B => &self.team_b,
        }
    }

    pub fn slot_mut(&mut self, side: SlotSide) -> &mut Slot {
        match side {
            SlotSide::A => &mut self.team_a,
            SlotSide::B => &mut self.team_b,
        }
    }

    pub fn has_team(&self, name: &str) -> bool {
        self.team_a.is_team(name) || self.team_b.is_team(name)
    }

    /// Whether the match needs nothing more. A bye-vs-bye match never gets a
    /// result (there is no winner to record) but counts as decided.
    pub fn is_decided(&self) -> bool {
        self.result.is_some() || (self.team_a == Slot::Bye && self.team_b == Slot::Bye)
    }

    /// The participant that did not win, if the match was played between two teams.
    pub fn loser(&self) -> Option<&str> {
        let result = self.result.as_ref()?;
        match (self.team_a.team(), self.team_b.team()) {
            (Some(a), Some(b)) if a == result.winner => Some(b),
            (Some(a), Some(b)) if b == result.winner => Some(a),
            _ => None,
        }
    }
}

// ── Swiss domain types ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StandingStatus {
    #[default]
    Active,
    Qualified,
    Eliminated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub qualify_at: Option<u32>,
    pub eliminate_at: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwissStanding {
    pub team: String,
    pub wins: u32,
    pub losses: u32,
    pub points: u32,
    pub buchholz: u32,
    pub opponent_history: Vec<String>,
    pub status: StandingStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pairing {
    pub team_a: String,
    pub team_b: Option<String>,
    pub is_bye: bool,
    pub is_rematch: bool,
}

// ── Stage configuration ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageFormat {
    SingleElimination,
    DoubleElimination,
    Swiss,
}

impl StageFormat {
    pub fn elimination_mode(self) -> Option<EliminationMode> {
        match self {
            StageFormat::SingleElimination => Some(EliminationMode::Single),
            StageFormat::DoubleElimination => Some(EliminationMode::Double),
            StageFormat::Swiss => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringRules {
    pub correct_winner: u32,
    pub exact_score: u32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        ScoringRules {
            correct_winner: 1,
            exact_score: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    pub id: String,
    pub name: String,
    pub format: StageFormat,
    #[serde(default)]
    pub match_format: MatchFormat,
    #[serde(default)]
    pub current_round: u32,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default = "default_allow_rematches")]
    pub allow_rematches: bool,
    #[serde(default)]
    pub scoring: ScoringRules,
}

fn default_allow_rematches() -> bool {
    true
}

// ── Stage state ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub config: StageConfig,
    pub teams: Vec<Team>,
    #[serde(default)]
    pub matches: Vec<Match>,
    #[serde(default)]
    pub predictions: PredictionBook,
    pub updated_at: DateTime<Utc>,
}

impl Stage {
    pub fn team_names(&self) -> Vec<String> {
        self.teams.iter().map(|team| team.name.clone()).collect()
    }
}

#[derive(Default)]
pub struct StageStore {
    pub stages: HashMap<String, SharedStage>,
    pub data_dir: Option<PathBuf>,
}

// ── Config types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub data_dir: String,
    pub log_dir: String,
    pub persist_stages: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            data_dir: "data/stages".to_string(),
            log_dir: "logs".to_string(),
            persist_stages: true,
        }
    }
}
