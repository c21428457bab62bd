//! Name → reference resolution for datacenters, VMs and clusters.
//!
//! Plain names are matched exactly against every entity of the wanted type
//! in scope. Names starting with `/` are absolute inventory paths. VM names
//! containing `/` are taken as paths below the datacenter's `vm` folder.

use tracing::debug;

use crate::error::{EvcError, Step};
use crate::protocol::{EntityKind, ManagedObjectRef, NamedRef};
use crate::vim::Inventory;

/// A resolved datacenter; VM lookups are confined to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatacenterScope {
    pub datacenter: NamedRef,
    /// Absolute inventory path of the datacenter.
    pub path: String,
}

pub struct InventoryResolver<'a, I: Inventory + ?Sized> {
    inventory: &'a I,
}

impl<'a, I: Inventory + ?Sized> InventoryResolver<'a, I> {
    pub fn new(inventory: &'a I) -> Self {
        Self { inventory }
    }

    pub async fn resolve_datacenter(&self, name: &str) -> Result<DatacenterScope, EvcError> {
        let step = Step::ResolveDatacenter;
        let kind = EntityKind::Datacenter;

        let datacenter = if name.starts_with('/') {
            self.by_path(step, kind, name).await?
        } else {
            let root = self.inventory.root_folder();
            self.by_name(step, kind, &root, name).await?
        };
        let path = if name.starts_with('/') {
            name.trim_end_matches('/').to_string()
        } else {
            format!("/{name}")
        };

        Ok(DatacenterScope { datacenter, path })
    }

    pub async fn resolve_vm(
        &self,
        scope: &DatacenterScope,
        name: &str,
    ) -> Result<NamedRef, EvcError> {
        let step = Step::ResolveVm;
        let kind = EntityKind::VirtualMachine;

        if name.contains('/') {
            let path = format!("{}/vm/{}", scope.path, name.trim_start_matches('/'));
            let mut vm = self.by_path(step, kind, &path).await?;
            vm.name = name.to_string();
            return Ok(vm);
        }
        self.by_name(step, kind, &scope.datacenter.reference, name)
            .await
    }

    /// Resolve a cluster anywhere in the inventory.
    ///
    /// An empty name selects the only cluster there is; with several it is
    /// [`EvcError::Ambiguous`], with none [`EvcError::NotFound`].
    pub async fn resolve_cluster(&self, name: &str) -> Result<NamedRef, EvcError> {
        let step = Step::ResolveCluster;
        let kind = EntityKind::Cluster;

        if name.starts_with('/') {
            return self.by_path(step, kind, name).await;
        }

        let root = self.inventory.root_folder();
        if name.is_empty() {
            let all = self.list(step, kind, &root).await?;
            return pick_one(step, kind, name, all);
        }
        self.by_name(step, kind, &root, name).await
    }

    async fn list(
        &self,
        step: Step,
        kind: EntityKind,
        scope: &ManagedObjectRef,
    ) -> Result<Vec<NamedRef>, EvcError> {
        self.inventory
            .list_named(scope, kind)
            .await
            .map_err(EvcError::remote(step))
    }

    async fn by_name(
        &self,
        step: Step,
        kind: EntityKind,
        scope: &ManagedObjectRef,
        name: &str,
    ) -> Result<NamedRef, EvcError> {
        if name.is_empty() {
            return Err(not_found(step, kind, name));
        }
        let matches = self
            .list(step, kind, scope)
            .await?
            .into_iter()
            .filter(|candidate| candidate.name == name)
            .collect();
        pick_one(step, kind, name, matches)
    }

    async fn by_path(
        &self,
        step: Step,
        kind: EntityKind,
        path: &str,
    ) -> Result<NamedRef, EvcError> {
        let found = self
            .inventory
            .find_by_path(path)
            .await
            .map_err(EvcError::remote(step))?;
        match found {
            Some(reference) if reference.is(kind) => {
                debug!(%path, reference = %reference, "resolved inventory path");
                Ok(NamedRef {
                    reference,
                    name: path.to_string(),
                })
            }
            _ => Err(not_found(step, kind, path)),
        }
    }
}

fn pick_one(
    step: Step,
    kind: EntityKind,
    name: &str,
    mut candidates: Vec<NamedRef>,
) -> Result<NamedRef, EvcError> {
    match candidates.len() {
        0 => Err(not_found(step, kind, name)),
        1 => {
            let found = candidates.remove(0);
            debug!(kind = %kind, name = %found.name, reference = %found.reference, "resolved");
            Ok(found)
        }
        count => Err(EvcError::Ambiguous {
            step,
            kind,
            name: name.to_string(),
            count,
        }),
    }
}

fn not_found(step: Step, kind: EntityKind, name: &str) -> EvcError {
    EvcError::NotFound {
        step,
        kind,
        name: name.to_string(),
    }
}
