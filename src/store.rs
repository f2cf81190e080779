use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use tracing::{info, warn};

use crate::error::ServiceError;
use crate::types::*;

pub fn validate_stage_id(id: &str) -> Result<(), ServiceError> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ServiceError::WrongFormat {
            stage: id.to_string(),
            message: "stage ids use letters, digits, '-' and '_' only".to_string(),
        });
    }
    Ok(())
}

pub fn stage_file(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}.json"))
}

/// Write the stage snapshot through a temp file and rename, so a reader never
/// sees a half-written stage.
pub fn save_stage(dir: &Path, stage: &Stage) -> Result<(), ServiceError> {
    fs::create_dir_all(dir)?;
    let path = stage_file(dir, &stage.config.id);
    let tmp = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(stage)?;
    fs::write(&tmp, payload)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

/// Read every `*.json` stage snapshot in `dir`. Unreadable files are skipped
/// with a warning.
pub fn load_stages(dir: &Path) -> Result<Vec<Stage>, ServiceError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut stages = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let parsed = fs::read_to_string(&path)
            .map_err(ServiceError::from)
            .and_then(|data| serde_json::from_str::<Stage>(&data).map_err(ServiceError::from));
        match parsed {
            Ok(stage) => stages.push(stage),
            Err(e) => warn!("Skipping stage file {}: {e}", path.display()),
        }
    }
    stages.sort_by(|a, b| a.config.id.cmp(&b.config.id));
    Ok(stages)
}

impl StageStore {
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        StageStore {
            stages: Default::default(),
            data_dir,
        }
    }

    /// Build the store from the snapshots already on disk.
    pub fn bootstrap(data_dir: Option<PathBuf>) -> Result<Self, ServiceError> {
        let mut store = StageStore::new(data_dir.clone());
        if let Some(dir) = data_dir.as_deref() {
            for stage in load_stages(dir)? {
                info!("Loaded stage {} ({} matches)", stage.config.id, stage.matches.len());
                store
                    .stages
                    .insert(stage.config.id.clone(), Arc::new(Mutex::new(stage)));
            }
        }
        Ok(store)
    }

    pub fn get(&self, id: &str) -> Result<SharedStage, ServiceError> {
        self.stages
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::StageNotFound(id.to_string()))
    }

    pub fn insert(&mut self, stage: Stage) -> Result<SharedStage, ServiceError> {
        let id = stage.config.id.clone();
        validate_stage_id(&id)?;
        if self.stages.contains_key(&id) {
            return Err(ServiceError::StageExists(id));
        }
        if let Some(dir) = self.data_dir.as_deref() {
            save_stage(dir, &stage)?;
        }
        let shared: SharedStage = Arc::new(Mutex::new(stage));
        self.stages.insert(id, shared.clone());
        Ok(shared)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids = self.stages.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_stage(id: &str) -> Stage {
        Stage {
            config: StageConfig {
                id: id.to_string(),
                name: format!("Stage {id}"),
                format: StageFormat::Swiss,
                match_format: MatchFormat::Bo3,
                current_round: 0,
                thresholds: Thresholds::default(),
                allow_rematches: true,
                scoring: ScoringRules::default(),
            },
            teams: vec![
                Team { name: "A".to_string(), logo: None },
                Team { name: "B".to_string(), logo: None },
            ],
            matches: Vec::new(),
            predictions: Default::default(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_stage_ids_are_checked() {
        assert!(validate_stage_id("groups-2026_a").is_ok());
        assert!(validate_stage_id("").is_err());
        assert!(validate_stage_id("../etc").is_err());
        assert!(validate_stage_id("has space").is_err());
    }

    #[test]
    fn test_in_memory_store_insert_and_get() {
        let mut store = StageStore::new(None);
        store.insert(make_stage("groups")).unwrap();
        assert!(matches!(
            store.insert(make_stage("groups")),
            Err(ServiceError::StageExists(_))
        ));
        assert!(matches!(store.get("playoffs"), Err(ServiceError::StageNotFound(_))));
        let shared = store.get("groups").unwrap();
        assert_eq!(shared.lock().unwrap().teams.len(), 2);
        assert_eq!(store.ids(), vec!["groups".to_string()]);
    }

    #[test]
    fn test_stages_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = StageStore::new(Some(dir.path().to_path_buf()));
            store.insert(make_stage("groups")).unwrap();
            store.insert(make_stage("playoffs")).unwrap();
        }
        assert!(stage_file(dir.path(), "groups").is_file());
        assert!(!dir.path().join("groups.json.tmp").exists());
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = StageStore::bootstrap(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(store.ids(), vec!["groups".to_string(), "playoffs".to_string()]);
        let groups = store.get("groups").unwrap();
        assert_eq!(groups.lock().unwrap().config.match_format, MatchFormat::Bo3);
    }

    #[test]
    fn test_missing_directory_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let stages = load_stages(&dir.path().join("absent")).unwrap();
        assert!(stages.is_empty());
    }
}
