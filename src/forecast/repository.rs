//! Model artifact persistence
//!
//! A trained model is saved so the daemon can regenerate forecasts after a
//! restart without retraining. Callers only see opaque [`ModelHandle`]s.

use crate::core::{Error, Result};
use crate::forecast::model::BaselineModel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Opaque reference to a saved model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelHandle(String);

impl ModelHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for trained models
pub trait ModelRepository {
    /// Persist a model, replacing any earlier model of the same appliance
    fn save(&self, model: &BaselineModel) -> Result<ModelHandle>;

    /// Load a previously saved model
    fn load(&self, handle: &ModelHandle) -> Result<BaselineModel>;

    /// Handle of the stored model for an appliance, if any
    fn latest(&self, appliance_id: &str) -> Result<Option<ModelHandle>>;
}

/// Artifact name for an appliance
fn artifact_name(appliance_id: &str) -> String {
    let safe: String = appliance_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("baseline_model_{}.json", safe)
}

/// JSON files in a directory, one per appliance
#[derive(Debug, Clone)]
pub struct FileModelRepository {
    dir: PathBuf,
}

impl FileModelRepository {
    /// Repository rooted at `dir`, created if missing
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, handle: &ModelHandle) -> PathBuf {
        self.dir.join(handle.as_str())
    }
}

impl ModelRepository for FileModelRepository {
    fn save(&self, model: &BaselineModel) -> Result<ModelHandle> {
        let handle = ModelHandle(artifact_name(model.appliance_id()));
        let path = self.path_for(&handle);
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_vec(model)?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;

        log::info!("Saved baseline model to {}", path.display());
        Ok(handle)
    }

    fn load(&self, handle: &ModelHandle) -> Result<BaselineModel> {
        let path = self.path_for(handle);
        if !path.exists() {
            return Err(Error::ModelNotFound(path.display().to_string()));
        }

        let content = fs::read(&path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    fn latest(&self, appliance_id: &str) -> Result<Option<ModelHandle>> {
        let handle = ModelHandle(artifact_name(appliance_id));
        Ok(self.path_for(&handle).exists().then_some(handle))
    }
}

/// Process-local repository (demo runs and tests)
#[derive(Debug, Default)]
pub struct MemoryModelRepository {
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryModelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn artifacts(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.artifacts
            .lock()
            .map_err(|_| Error::Serialization("model repository lock poisoned".to_string()))
    }
}

impl ModelRepository for MemoryModelRepository {
    fn save(&self, model: &BaselineModel) -> Result<ModelHandle> {
        let name = artifact_name(model.appliance_id());
        let content = serde_json::to_vec(model)?;
        self.artifacts()?.insert(name.clone(), content);
        Ok(ModelHandle(name))
    }

    fn load(&self, handle: &ModelHandle) -> Result<BaselineModel> {
        let artifacts = self.artifacts()?;
        let content = artifacts
            .get(handle.as_str())
            .ok_or_else(|| Error::ModelNotFound(handle.to_string()))?;
        Ok(serde_json::from_slice(content)?)
    }

    fn latest(&self, appliance_id: &str) -> Result<Option<ModelHandle>> {
        let name = artifact_name(appliance_id);
        Ok(self.artifacts()?.contains_key(&name).then_some(ModelHandle(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::baseline::BaselineSample;
    use crate::forecast::features::features;
    use crate::core::MinuteBucket;
    use chrono::{Duration, TimeZone, Utc};

    fn model(appliance_id: &str) -> BaselineModel {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let samples: Vec<BaselineSample> = (0..240)
            .map(|m| {
                let ts = start + Duration::minutes(m);
                BaselineSample {
                    minute_bucket: MinuteBucket::containing(ts),
                    features: features(&ts),
                    smoothed_power: 50.0,
                }
            })
            .collect();
        BaselineModel::fit(appliance_id, &samples, start).unwrap()
    }

    #[test]
    fn test_file_repository_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileModelRepository::new(dir.path()).unwrap();

        assert_eq!(repo.latest("laptop").unwrap(), None);

        let handle = repo.save(&model("laptop")).unwrap();
        assert_eq!(repo.latest("laptop").unwrap(), Some(handle.clone()));
        assert!(dir.path().join("baseline_model_laptop.json").exists());

        let loaded = repo.load(&handle).unwrap();
        assert_eq!(loaded.appliance_id(), "laptop");
        assert_eq!(loaded.sample_count(), 240);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileModelRepository::new(dir.path()).unwrap();

        let err = repo.load(&ModelHandle("nope.json".to_string())).unwrap_err();
        assert!(matches!(err, Error::ModelNotFound(_)));
    }

    #[test]
    fn test_appliance_ids_are_sanitized() {
        assert_eq!(artifact_name("../etc/passwd"), "baseline_model____etc_passwd.json");
        assert_eq!(artifact_name("washer-2"), "baseline_model_washer-2.json");
    }

    #[test]
    fn test_memory_repository_keeps_one_model_per_appliance() {
        let repo = MemoryModelRepository::new();
        let first = repo.save(&model("fridge")).unwrap();
        let second = repo.save(&model("fridge")).unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.latest("fridge").unwrap(), Some(second));
        assert_eq!(repo.latest("laptop").unwrap(), None);
    }
}
