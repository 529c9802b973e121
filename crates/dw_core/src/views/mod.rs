use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::directory::PrincipalDirectory;
use crate::domain::Incident;

pub const UNKNOWN_PRINCIPAL: &str = "Unknown User";

/// An incident with principal ids resolved to display names for presentation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentView {
    #[serde(flatten)]
    pub incident: Incident,
    pub reported_by_name: String,
    pub resolved_by_name: Option<String>,
}

/// Read-through name cache that lives for a single `attach_names` call.
struct NameCache<'a> {
    directory: &'a dyn PrincipalDirectory,
    names: HashMap<String, String>,
    lookups: usize,
}

impl<'a> NameCache<'a> {
    fn new(directory: &'a dyn PrincipalDirectory) -> Self {
        Self {
            directory,
            names: HashMap::new(),
            lookups: 0,
        }
    }

    fn name_for(&mut self, principal_id: &str) -> String {
        if let Some(name) = self.names.get(principal_id) {
            return name.clone();
        }
        self.lookups += 1;
        let name = match self.directory.display_name(principal_id) {
            Ok(Some(name)) => name,
            Ok(None) => UNKNOWN_PRINCIPAL.to_string(),
            Err(e) => {
                tracing::debug!(principal_id, error = %e, "principal lookup failed");
                UNKNOWN_PRINCIPAL.to_string()
            }
        };
        self.names.insert(principal_id.to_string(), name.clone());
        name
    }
}

/// Resolve reporter and resolver names. Each distinct principal is looked up at most once.
pub fn attach_names(
    incidents: Vec<Incident>,
    directory: &dyn PrincipalDirectory,
) -> Vec<IncidentView> {
    attach_names_counted(incidents, directory).0
}

fn attach_names_counted(
    incidents: Vec<Incident>,
    directory: &dyn PrincipalDirectory,
) -> (Vec<IncidentView>, usize) {
    let mut cache = NameCache::new(directory);
    let views = incidents
        .into_iter()
        .map(|incident| {
            let reported_by_name = cache.name_for(&incident.reported_by);
            let resolved_by_name = incident.resolved_by.as_deref().map(|id| cache.name_for(id));
            IncidentView {
                incident,
                reported_by_name,
                resolved_by_name,
            }
        })
        .collect();
    (views, cache.lookups)
}
