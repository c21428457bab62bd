//! Baseline name → feature mask list.
//!
//! The cluster's EVC manager is read live on every call. The supported
//! baseline table is scanned in server order and the first entry whose key
//! equals the requested name wins. Keys are compared exactly; no case
//! folding or trimming.

use tracing::{debug, info};

use crate::error::{EvcError, Step};
use crate::protocol::{ClusterEvcManager, EvcMode, FeatureMask, NamedRef};
use crate::vim::PropertyCollector;

/// First entry of `table` whose key is exactly `baseline`.
pub fn select_baseline<'t>(table: &'t [EvcMode], baseline: &str) -> Option<&'t EvcMode> {
    table.iter().find(|mode| mode.key == baseline)
}

pub struct BaselineMaskResolver<'a, P: PropertyCollector + ?Sized> {
    collector: &'a P,
}

impl<'a, P: PropertyCollector + ?Sized> BaselineMaskResolver<'a, P> {
    pub fn new(collector: &'a P) -> Self {
        Self { collector }
    }

    /// Fetch the cluster's EVC manager and its full state.
    pub async fn evc_manager(&self, cluster: &NamedRef) -> Result<ClusterEvcManager, EvcError> {
        let manager = self
            .collector
            .evc_manager(&cluster.reference)
            .await
            .map_err(EvcError::remote(Step::LocateEvcManager))?
            .ok_or_else(|| EvcError::EvcUnavailable {
                cluster: cluster.name.clone(),
            })?;
        debug!(cluster = %cluster.name, manager = %manager, "located EVC manager");

        self.collector
            .retrieve_evc_manager(&manager)
            .await
            .map_err(EvcError::remote(Step::ReadEvcState))
    }

    /// Resolve `baseline` to its ordered feature masks on `cluster`.
    pub async fn resolve_masks(
        &self,
        cluster: &NamedRef,
        baseline: &str,
    ) -> Result<Vec<FeatureMask>, EvcError> {
        let manager = self.evc_manager(cluster).await?;
        let table = &manager.evc_state.supported_evc_mode;

        let Some(mode) = select_baseline(table, baseline) else {
            return Err(EvcError::UnsupportedBaseline {
                baseline: baseline.to_string(),
                cluster: cluster.name.clone(),
                available: table.iter().map(|m| m.key.clone()).collect(),
            });
        };
        if mode.feature_mask.is_empty() {
            return Err(EvcError::EmptyBaseline {
                baseline: baseline.to_string(),
                cluster: cluster.name.clone(),
            });
        }

        info!(
            cluster = %cluster.name,
            baseline,
            label = %mode.label,
            masks = mode.feature_mask.len(),
            "resolved EVC baseline"
        );
        Ok(mode.feature_mask.clone())
    }
}
