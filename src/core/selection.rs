//! Step selection - which steps one run executes

use crate::core::{error::ConfigError, registry::StepRegistry, step::StepId};

/// Steps chosen for a single run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSelection {
    /// Every registered step
    All,
    /// Explicit ids, duplicates removed (first occurrence kept)
    Subset(Vec<StepId>),
}

impl StepSelection {
    pub fn subset<I: IntoIterator<Item = StepId>>(ids: I) -> Self {
        let mut unique: Vec<StepId> = Vec::new();
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        StepSelection::Subset(unique)
    }

    /// Parse step numbers or keys (e.g. `7`, `keys`) against the registry
    pub fn parse<S: AsRef<str>>(values: &[S], registry: &StepRegistry) -> Result<Self, ConfigError> {
        let ids = values
            .iter()
            .map(|v| {
                registry
                    .lookup(v.as_ref())
                    .ok_or_else(|| ConfigError::UnknownStep(v.as_ref().trim().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::subset(ids))
    }

    /// Execution order: ascending id regardless of the order requested
    pub fn resolve(&self, registry: &StepRegistry) -> Result<Vec<StepId>, ConfigError> {
        match self {
            StepSelection::All => Ok(registry.ids()),
            StepSelection::Subset(ids) => {
                if let Some(unknown) = ids.iter().find(|id| registry.get(**id).is_none()) {
                    return Err(ConfigError::UnknownStep(unknown.to_string()));
                }
                let mut ordered = ids.clone();
                ordered.sort();
                ordered.dedup();
                Ok(ordered)
            }
        }
    }
}
