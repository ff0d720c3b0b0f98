//! Record store abstraction for territory persistence.
//!
//! The hierarchy engine treats storage as an external collaborator with
//! get/list/field-write capability. [`MemoryStore`] is the reference
//! implementation; production deployments supply their own backend.

use crate::error::{Result, TerritoryError};
use crate::types::{BBox, Territory, TerritoryId};
use std::collections::BTreeMap;

/// Typed query filter for [`TerritoryStore::list`].
///
/// Covers the equality, negation, and prefix matching the inference
/// algorithm needs; no dynamic field access.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Exclude a specific territory (the query subject itself).
    IdNot(TerritoryId),
    /// `spatial_cell` starts with the given prefix. An empty prefix
    /// matches everything.
    CellPrefix(String),
    IsProject(bool),
    IsPhase(bool),
    /// Current parent is not the given territory.
    ParentNot(TerritoryId),
    NameEq(String),
}

impl Filter {
    /// Whether a territory satisfies this filter.
    pub fn matches(&self, territory: &Territory) -> bool {
        match self {
            Self::IdNot(id) => territory.id != *id,
            Self::CellPrefix(prefix) => territory.spatial_cell.starts_with(prefix.as_str()),
            Self::IsProject(flag) => territory.is_project == *flag,
            Self::IsPhase(flag) => territory.is_phase == *flag,
            Self::ParentNot(id) => territory.parent != Some(*id),
            Self::NameEq(name) => territory.name == *name,
        }
    }
}

/// Trait for territory record stores.
///
/// Implementations are expected to be eventually consistent within a
/// process; the engine serializes its own multi-record updates.
pub trait TerritoryStore: Send + Sync {
    /// Fetch a territory by id.
    fn get(&self, id: &TerritoryId) -> Result<Option<Territory>>;

    /// Insert a new territory record. Ids are unique; reinsertion fails.
    fn insert(&mut self, territory: Territory) -> Result<()>;

    /// List territories matching all filters.
    fn list(&self, filters: &[Filter]) -> Result<Vec<Territory>>;

    /// Overwrite the parent pointer.
    fn set_parent(&mut self, id: &TerritoryId, parent: Option<TerritoryId>) -> Result<()>;

    /// Flip the phase flag and set the parent in one write.
    fn set_phase(&mut self, id: &TerritoryId, parent: TerritoryId) -> Result<()>;

    /// Record the assigned spatial cell and resolution level.
    fn set_spatial_cell(&mut self, id: &TerritoryId, cell: &str, level: u8) -> Result<()>;

    /// Bounding boxes of every stored territory (index construction).
    fn all_bounds(&self) -> Result<Vec<BBox>>;

    /// Number of stored territories.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// In-memory territory store backed by a BTreeMap.
///
/// Iteration order is stable by id, which keeps inference deterministic in
/// tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<TerritoryId, Territory>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }
}

impl MemoryStore {
    fn get_mut(&mut self, id: &TerritoryId) -> Result<&mut Territory> {
        self.records
            .get_mut(id)
            .ok_or_else(|| TerritoryError::NotFound(id.to_string()))
    }
}

impl TerritoryStore for MemoryStore {
    fn get(&self, id: &TerritoryId) -> Result<Option<Territory>> {
        Ok(self.records.get(id).cloned())
    }

    fn insert(&mut self, territory: Territory) -> Result<()> {
        if self.records.contains_key(&territory.id) {
            return Err(TerritoryError::InvalidInput(format!(
                "territory {} already exists",
                territory.id
            )));
        }
        self.records.insert(territory.id, territory);
        Ok(())
    }

    fn list(&self, filters: &[Filter]) -> Result<Vec<Territory>> {
        Ok(self
            .records
            .values()
            .filter(|t| filters.iter().all(|f| f.matches(t)))
            .cloned()
            .collect())
    }

    fn set_parent(&mut self, id: &TerritoryId, parent: Option<TerritoryId>) -> Result<()> {
        self.get_mut(id)?.parent = parent;
        Ok(())
    }

    fn set_phase(&mut self, id: &TerritoryId, parent: TerritoryId) -> Result<()> {
        let record = self.get_mut(id)?;
        record.is_phase = true;
        record.parent = Some(parent);
        Ok(())
    }

    fn set_spatial_cell(&mut self, id: &TerritoryId, cell: &str, level: u8) -> Result<()> {
        let record = self.get_mut(id)?;
        record.spatial_cell = cell.to_string();
        record.quadtree_level = level;
        Ok(())
    }

    fn all_bounds(&self) -> Result<Vec<BBox>> {
        Ok(self.records.values().map(|t| t.bounds).collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }
}
