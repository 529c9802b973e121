use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::Target;
use crate::error::{codes, AppError};

/// Lookup into the collaborator that owns targets.
pub trait TargetDirectory: Send + Sync {
    fn get_target(&self, target_id: &str) -> Result<Option<Target>, AppError>;
}

/// Lookup of display names for already-authenticated principals.
pub trait PrincipalDirectory: Send + Sync {
    fn display_name(&self, principal_id: &str) -> Result<Option<String>, AppError>;
}

fn read_json_file(path: &Path, what: &str) -> Result<String, AppError> {
    std::fs::read_to_string(path).map_err(|e| {
        AppError::new(codes::CONFIG_INVALID, format!("Failed to read {what} file"))
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTargetDirectory {
    targets: BTreeMap<String, Target>,
}

impl InMemoryTargetDirectory {
    pub fn new(targets: impl IntoIterator<Item = Target>) -> Self {
        Self {
            targets: targets.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    /// Parse a JSON array of `{"id", "name", "address"}` objects.
    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        let targets: Vec<Target> = serde_json::from_str(json).map_err(|e| {
            AppError::new(codes::CONFIG_INVALID, "Failed to parse target directory JSON")
                .with_details(e.to_string())
        })?;
        Ok(Self::new(targets))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        Self::from_json_str(&read_json_file(path, "target directory")?)
    }

    pub fn insert(&mut self, target: Target) {
        self.targets.insert(target.id.clone(), target);
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl TargetDirectory for InMemoryTargetDirectory {
    fn get_target(&self, target_id: &str) -> Result<Option<Target>, AppError> {
        Ok(self.targets.get(target_id).cloned())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPrincipalDirectory {
    names: BTreeMap<String, String>,
}

impl InMemoryPrincipalDirectory {
    pub fn new(names: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }

    /// Parse a JSON object mapping principal id to display name.
    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        let names: BTreeMap<String, String> = serde_json::from_str(json).map_err(|e| {
            AppError::new(codes::CONFIG_INVALID, "Failed to parse principal directory JSON")
                .with_details(e.to_string())
        })?;
        Ok(Self { names })
    }

    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        Self::from_json_str(&read_json_file(path, "principal directory")?)
    }
}

impl PrincipalDirectory for InMemoryPrincipalDirectory {
    fn display_name(&self, principal_id: &str) -> Result<Option<String>, AppError> {
        Ok(self.names.get(principal_id).cloned())
    }
}
