//! Containment-hierarchy inference engine.
//!
//! The engine ties the pieces together: a record store, a suggestion cache,
//! and a spatial index snapshot. Inference is neighborhood-local: candidates
//! come from a one-level-coarser quadtree prefix, are screened by bounding
//! box, and are scored with directional overlap percentages. Parent links
//! always point at the smallest containing candidate, and every link write
//! is preceded by an ancestor walk so a cycle is never committed.
//!
//! Projects get a second pass that stages near-total-overlap sibling
//! projects as phase suggestions; suggestions are advisory and only become
//! hierarchy writes through [`HierarchyEngine::convert_to_phases`].

use crate::cache::SuggestionCache;
use crate::error::{Result, TerritoryError};
use crate::geometry::Geometry;
use crate::osm::AddressLevel;
use crate::overlap::overlap_percentage;
use crate::spatial_index::SpatialIndex;
use crate::store::{Filter, TerritoryStore};
use crate::types::{EngineConfig, OverlapResult, PhaseSuggestion, Territory, TerritoryId};
use geo::Point;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// The territory hierarchy engine.
///
/// Generic over the record store and suggestion cache so deployments can
/// plug in their own backends; [`crate::store::MemoryStore`] and
/// [`crate::cache::MemoryCache`] serve as reference implementations.
///
/// # Examples
///
/// ```rust
/// use territoria::{
///     EngineConfig, Geometry, HierarchyEngine, MemoryCache, MemoryStore, Territory,
/// };
///
/// let engine = HierarchyEngine::new(
///     MemoryStore::new(),
///     MemoryCache::new(),
///     EngineConfig::default(),
/// ).unwrap();
///
/// let city = Territory::new("City", Geometry::rect_polygon(15.0, 25.0, 40.0, 50.0)).unwrap();
/// let district = Territory::new("District", Geometry::rect_polygon(18.0, 20.0, 44.0, 46.0)).unwrap();
///
/// let city_id = engine.insert_territory(city).unwrap();
/// let district_id = engine.insert_territory(district).unwrap();
///
/// let district = engine.get(&district_id).unwrap().unwrap();
/// assert_eq!(district.parent, Some(city_id));
/// ```
pub struct HierarchyEngine<S: TerritoryStore, C: SuggestionCache> {
    store: RwLock<S>,
    cache: Mutex<C>,
    index: SpatialIndex,
    config: EngineConfig,
    /// One lock per candidate-lookup prefix; serializes inference runs that
    /// touch the same spatial neighborhood.
    cell_locks: Mutex<FxHashMap<String, Arc<Mutex<()>>>>,
}

impl<S: TerritoryStore, C: SuggestionCache> HierarchyEngine<S, C> {
    /// Create an engine over a store and cache.
    ///
    /// The spatial index root is snapshotted here from the union of all
    /// stored bounds (plus the configured buffer) and is not recomputed per
    /// insert; an empty store falls back to the configured default region.
    pub fn new(store: S, cache: C, config: EngineConfig) -> Result<Self> {
        config.validate().map_err(TerritoryError::InvalidInput)?;
        let index = SpatialIndex::from_bounds(store.all_bounds()?, &config);
        info!("hierarchy engine initialized, root {:?}", index.root_bounds());

        Ok(Self {
            store: RwLock::new(store),
            cache: Mutex::new(cache),
            index,
            config,
            cell_locks: Mutex::new(FxHashMap::default()),
        })
    }

    /// The spatial index snapshot the engine was built with.
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch a territory by id.
    pub fn get(&self, id: &TerritoryId) -> Result<Option<Territory>> {
        self.store.read().get(id)
    }

    /// Number of stored territories.
    pub fn territory_count(&self) -> Result<usize> {
        self.store.read().len()
    }

    /// Insert a territory and wire it into the hierarchy.
    ///
    /// A phase must already carry a parent that exists and is a project;
    /// anything else is rejected before persistence. The territory gets a
    /// quadtree cell at a size-appropriate level, then (unless it is a
    /// phase, which keeps its explicit project parent) hierarchy inference
    /// runs for it. Top-level projects additionally get a phase detection
    /// pass.
    pub fn insert_territory(&self, territory: Territory) -> Result<TerritoryId> {
        if territory.is_phase {
            let parent_id = territory.parent.ok_or_else(|| {
                TerritoryError::InvalidHierarchy(format!(
                    "phase '{}' has no parent project",
                    territory.name
                ))
            })?;
            let parent = self.store.read().get(&parent_id)?.ok_or_else(|| {
                TerritoryError::InvalidHierarchy(format!(
                    "phase '{}' references unknown parent {}",
                    territory.name, parent_id
                ))
            })?;
            if !parent.is_project {
                return Err(TerritoryError::InvalidHierarchy(format!(
                    "phase '{}' cannot be parented to '{}', which is not a project",
                    territory.name, parent.name
                )));
            }
        }

        let (cell, level) = self.index.assign(&territory.bounds, self.config.max_cell_level);
        let id = territory.id;
        let is_phase = territory.is_phase;
        let is_project = territory.is_project;
        debug!(
            "inserting territory {} '{}' into cell {} (level {})",
            id, territory.name, cell, level
        );
        self.store.write().insert(territory)?;
        self.store.write().set_spatial_cell(&id, &cell, level)?;

        if !is_phase {
            self.infer(&id)?;
        }
        if is_project && !is_phase {
            self.detect_phase_candidates(&id)?;
        }

        Ok(id)
    }

    /// Run hierarchy inference for one territory.
    ///
    /// Candidates are territories sharing the one-level-coarser cell prefix
    /// whose bounding boxes intersect the subject's. A candidate covering
    /// the subject at the containment threshold is a potential parent; a
    /// candidate the subject covers at the threshold is a potential child.
    /// The smallest potential parent wins. Re-running for the same dataset
    /// is idempotent.
    pub fn infer(&self, id: &TerritoryId) -> Result<()> {
        let subject = self
            .store
            .read()
            .get(id)?
            .ok_or_else(|| TerritoryError::NotFound(id.to_string()))?;

        let prefix = SpatialIndex::candidate_prefix(&subject.spatial_cell);
        let lock = self.cell_lock(prefix);
        let _guard = lock.lock();

        let candidates = self.store.read().list(&[
            Filter::CellPrefix(prefix.to_string()),
            Filter::IdNot(*id),
        ])?;

        let mut potential_parents: Vec<OverlapResult> = Vec::new();
        let mut potential_children: Vec<(Territory, f64)> = Vec::new();

        for candidate in &candidates {
            if !subject.bounds.intersects(&candidate.bounds) {
                continue;
            }

            let subject_in_candidate = overlap_percentage(&subject.geometry, &candidate.geometry);
            let candidate_in_subject = overlap_percentage(&candidate.geometry, &subject.geometry);
            if subject_in_candidate.is_degraded() || candidate_in_subject.is_degraded() {
                debug!("excluding candidate {} (unusable geometry)", candidate.id);
                continue;
            }

            if subject_in_candidate.value() >= self.config.containment_threshold {
                // A project never becomes the parent of another top-level
                // project; that relationship goes through phase conversion.
                let project_under_project =
                    candidate.is_project && subject.is_project && !subject.is_phase;
                if !project_under_project {
                    potential_parents.push(OverlapResult {
                        other: candidate.id,
                        percentage: subject_in_candidate.value(),
                        area: candidate.geometry.area(),
                    });
                }
            }

            // Phases keep the project parent they were created with.
            if candidate_in_subject.value() >= self.config.containment_threshold
                && !candidate.is_phase
            {
                let area = candidate.geometry.area();
                potential_children.push((candidate.clone(), area));
            }
        }

        if let Some(parent) = potential_parents
            .iter()
            .min_by(|a, b| a.area.total_cmp(&b.area))
        {
            if self.would_create_cycle(id, &parent.other)? {
                warn!(
                    "skipping parent {} for {}: link would close a cycle",
                    parent.other, id
                );
            } else {
                debug!(
                    "{} -> parent {} ({:.1}% contained)",
                    id, parent.other, parent.percentage
                );
                self.store.write().set_parent(id, Some(parent.other))?;
            }
        }

        // Largest children first, so grandchildren re-resolved later attach
        // to the tightest container.
        potential_children.sort_by(|a, b| b.1.total_cmp(&a.1));
        let child_ids: BTreeSet<TerritoryId> =
            potential_children.iter().map(|(child, _)| child.id).collect();
        for (child, _) in &potential_children {
            if let Some(existing) = child.parent {
                // Its parent is itself one of the subject's children, a
                // tighter container; leave that link alone.
                if child_ids.contains(&existing) {
                    continue;
                }
            }
            if self.would_create_cycle(&child.id, id)? {
                warn!(
                    "skipping child {} for {}: link would close a cycle",
                    child.id, id
                );
                continue;
            }
            self.store.write().set_parent(&child.id, Some(*id))?;
        }

        Ok(())
    }

    /// Detect sibling projects that look like phases of `project_id`.
    ///
    /// Scans projects sharing the subject's full cell prefix that are not
    /// already phases or children of the subject; any with overlap at or
    /// above the phase threshold is staged as a [`PhaseSuggestion`] in the
    /// suggestion cache under the configured TTL. Suggestions never write
    /// to the hierarchy directly.
    pub fn detect_phase_candidates(&self, project_id: &TerritoryId) -> Result<Vec<PhaseSuggestion>> {
        let project = self
            .store
            .read()
            .get(project_id)?
            .ok_or_else(|| TerritoryError::NotFound(project_id.to_string()))?;
        if !project.is_project || project.is_phase {
            return Err(TerritoryError::InvalidInput(format!(
                "{} is not a top-level project",
                project.name
            )));
        }

        let candidates = self.store.read().list(&[
            Filter::CellPrefix(project.spatial_cell.clone()),
            Filter::IdNot(*project_id),
            Filter::IsProject(true),
            Filter::IsPhase(false),
            Filter::ParentNot(*project_id),
        ])?;

        let mut suggestions = Vec::new();
        for candidate in candidates {
            if !project.bounds.intersects(&candidate.bounds) {
                continue;
            }
            let contained = overlap_percentage(&candidate.geometry, &project.geometry);
            if !contained.is_degraded() && contained.value() >= self.config.phase_threshold {
                suggestions.push(PhaseSuggestion {
                    id: candidate.id.to_string(),
                    name: candidate.name,
                });
            }
        }

        debug!(
            "staged {} phase suggestion(s) for project {}",
            suggestions.len(),
            project_id
        );
        let json = serde_json::to_string(&suggestions)?;
        self.cache.lock().set(
            &Self::suggestion_key(project_id),
            &json,
            Duration::from_secs(self.config.suggestion_ttl_seconds),
        )?;

        Ok(suggestions)
    }

    /// Staged phase suggestions for a project, recomputing on cache miss.
    pub fn phase_suggestions(&self, project_id: &TerritoryId) -> Result<Vec<PhaseSuggestion>> {
        let cached = self.cache.lock().get(&Self::suggestion_key(project_id))?;
        match cached {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => self.detect_phase_candidates(project_id),
        }
    }

    /// Apply staged phase suggestions: each accepted territory is flagged as
    /// a phase and re-parented under the project in one write.
    ///
    /// `only` restricts conversion to the listed ids; `None` converts every
    /// staged suggestion. Ids in `only` that are not currently staged are
    /// ignored, so conversion can never reach beyond what detection found.
    /// Returns the number converted. The suggestion cache is refreshed
    /// afterwards so converted territories drop out of it.
    pub fn convert_to_phases(
        &self,
        project_id: &TerritoryId,
        only: Option<&[TerritoryId]>,
    ) -> Result<usize> {
        let suggestions = self.phase_suggestions(project_id)?;

        let mut converted = 0;
        for suggestion in suggestions {
            let id: TerritoryId = match suggestion.id.parse() {
                Ok(id) => id,
                Err(_) => {
                    warn!("ignoring staged suggestion with malformed id '{}'", suggestion.id);
                    continue;
                }
            };
            if let Some(only) = only {
                if !only.contains(&id) {
                    continue;
                }
            }
            if self.would_create_cycle(&id, project_id)? {
                warn!(
                    "skipping phase conversion of {}: link would close a cycle",
                    id
                );
                continue;
            }

            self.store.write().set_phase(&id, *project_id)?;
            info!("converted {} '{}' to a phase of {}", id, suggestion.name, project_id);
            converted += 1;
        }

        self.detect_phase_candidates(project_id)?;
        Ok(converted)
    }

    /// Create a new phase directly under a project.
    ///
    /// The parent must be a project and must topologically contain the
    /// phase geometry; phases skip hierarchy inference entirely.
    pub fn create_phase(
        &self,
        project_id: &TerritoryId,
        name: impl Into<String>,
        geometry: Geometry,
    ) -> Result<TerritoryId> {
        let project = self
            .store
            .read()
            .get(project_id)?
            .ok_or_else(|| TerritoryError::NotFound(project_id.to_string()))?;
        if !project.is_project {
            return Err(TerritoryError::InvalidHierarchy(format!(
                "'{}' is not a project; phases can only be created under projects",
                project.name
            )));
        }
        if !project.geometry.contains(&geometry) {
            return Err(TerritoryError::InvalidHierarchy(format!(
                "phase geometry is not contained within project '{}'",
                project.name
            )));
        }

        let mut phase = Territory::new(name, geometry)?;
        phase.is_phase = true;
        phase.parent = Some(*project_id);
        let (cell, level) = self.index.assign(&phase.bounds, self.config.max_cell_level);
        phase.spatial_cell = cell;
        phase.quadtree_level = level;

        let id = phase.id;
        self.store.write().insert(phase)?;
        Ok(id)
    }

    /// Seed a reverse-geocoded address chain, coarse to fine.
    ///
    /// Each level is matched to an existing territory by name; missing
    /// levels become custom point placeholders at the given coordinate.
    /// Parents are chained along the sequence, but an existing territory's
    /// parent is never overwritten. Returns the chain's ids, coarse first.
    pub fn seed_address_hierarchy(
        &self,
        lat: f64,
        lng: f64,
        levels: &[AddressLevel],
    ) -> Result<Vec<TerritoryId>> {
        let mut chain = Vec::with_capacity(levels.len());
        let mut previous: Option<TerritoryId> = None;

        for level in levels {
            let existing = self
                .store
                .read()
                .list(&[Filter::NameEq(level.name.clone())])?
                .into_iter()
                .next();

            let id = match existing {
                Some(territory) => {
                    if territory.parent.is_none() {
                        if let Some(parent) = previous {
                            if self.would_create_cycle(&territory.id, &parent)? {
                                warn!(
                                    "skipping address link {} -> {}: would close a cycle",
                                    territory.id, parent
                                );
                            } else {
                                self.store.write().set_parent(&territory.id, Some(parent))?;
                            }
                        }
                    }
                    territory.id
                }
                None => {
                    let mut placeholder =
                        Territory::new(level.name.clone(), Geometry::Point(Point::new(lng, lat)))?
                            .mark_custom();
                    placeholder.boundary_kind = level.kind.clone();
                    placeholder.parent = previous;
                    let (cell, cell_level) =
                        self.index.assign(&placeholder.bounds, self.config.max_cell_level);
                    placeholder.spatial_cell = cell;
                    placeholder.quadtree_level = cell_level;

                    let id = placeholder.id;
                    debug!("seeding address placeholder '{}' ({})", level.name, level.kind);
                    self.store.write().insert(placeholder)?;
                    id
                }
            };

            previous = Some(id);
            chain.push(id);
        }

        Ok(chain)
    }

    /// Whether setting `parent` as the parent of `child` would close a cycle.
    ///
    /// Walks `parent`'s ancestor chain looking for `child`. The walk is
    /// bounded by the store size; exceeding it means the chain already
    /// contains a cycle, which is treated the same as finding one.
    fn would_create_cycle(&self, child: &TerritoryId, parent: &TerritoryId) -> Result<bool> {
        if child == parent {
            return Ok(true);
        }

        let store = self.store.read();
        let limit = store.len()?;
        let mut current = Some(*parent);
        for _ in 0..=limit {
            let Some(id) = current else {
                return Ok(false);
            };
            if id == *child {
                return Ok(true);
            }
            current = store.get(&id)?.and_then(|t| t.parent);
        }
        Ok(true)
    }

    fn cell_lock(&self, prefix: &str) -> Arc<Mutex<()>> {
        let mut locks = self.cell_locks.lock();
        locks
            .entry(prefix.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn suggestion_key(project_id: &TerritoryId) -> String {
        format!("potential_phases_{}", project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::store::MemoryStore;

    fn engine() -> HierarchyEngine<MemoryStore, MemoryCache> {
        HierarchyEngine::new(MemoryStore::new(), MemoryCache::new(), EngineConfig::default())
            .unwrap()
    }

    fn city() -> Territory {
        Territory::new("City", Geometry::rect_polygon(15.0, 25.0, 40.0, 50.0)).unwrap()
    }

    fn district() -> Territory {
        Territory::new("District", Geometry::rect_polygon(18.0, 20.0, 44.0, 46.0)).unwrap()
    }

    #[test]
    fn test_child_inserted_after_parent_gets_linked() {
        let engine = engine();
        let city_id = engine.insert_territory(city()).unwrap();
        let district_id = engine.insert_territory(district()).unwrap();

        let district = engine.get(&district_id).unwrap().unwrap();
        assert_eq!(district.parent, Some(city_id));
        assert!(engine.get(&city_id).unwrap().unwrap().parent.is_none());
    }

    #[test]
    fn test_parent_inserted_after_child_claims_it() {
        let engine = engine();
        let district_id = engine.insert_territory(district()).unwrap();
        assert!(engine.get(&district_id).unwrap().unwrap().parent.is_none());

        let city_id = engine.insert_territory(city()).unwrap();
        let district = engine.get(&district_id).unwrap().unwrap();
        assert_eq!(district.parent, Some(city_id));
    }

    #[test]
    fn test_inference_is_idempotent() {
        let engine = engine();
        let city_id = engine.insert_territory(city()).unwrap();
        let district_id = engine.insert_territory(district()).unwrap();

        engine.infer(&district_id).unwrap();
        engine.infer(&city_id).unwrap();

        let district = engine.get(&district_id).unwrap().unwrap();
        assert_eq!(district.parent, Some(city_id));
        assert!(engine.get(&city_id).unwrap().unwrap().parent.is_none());
    }

    #[test]
    fn test_identical_geometries_never_form_a_cycle() {
        let engine = engine();
        let a = Territory::new("Twin A", Geometry::rect_polygon(18.0, 20.0, 44.0, 46.0)).unwrap();
        let b = Territory::new("Twin B", Geometry::rect_polygon(18.0, 20.0, 44.0, 46.0)).unwrap();

        let a_id = engine.insert_territory(a).unwrap();
        let b_id = engine.insert_territory(b).unwrap();

        // One direction may link; the reverse direction must be refused.
        let a_parent = engine.get(&a_id).unwrap().unwrap().parent;
        let b_parent = engine.get(&b_id).unwrap().unwrap().parent;
        assert!(!(a_parent == Some(b_id) && b_parent == Some(a_id)));

        engine.infer(&a_id).unwrap();
        engine.infer(&b_id).unwrap();
        let a_parent = engine.get(&a_id).unwrap().unwrap().parent;
        let b_parent = engine.get(&b_id).unwrap().unwrap().parent;
        assert!(!(a_parent == Some(b_id) && b_parent == Some(a_id)));
    }

    #[test]
    fn test_child_reassigned_to_tighter_late_container() {
        let engine = engine();
        let broad_id = engine.insert_territory(city()).unwrap();
        let corner =
            Territory::new("Corner", Geometry::rect_polygon(15.0, 16.0, 40.0, 41.0)).unwrap();
        let corner_id = engine.insert_territory(corner).unwrap();
        assert_eq!(engine.get(&corner_id).unwrap().unwrap().parent, Some(broad_id));

        // A mid-sized territory arrives later: it fully contains the corner
        // but covers only a sliver of the broad region, so the broad region
        // must not block the corner's reassignment.
        let mid = Territory::new("Mid", Geometry::rect_polygon(15.0, 19.0, 40.0, 44.0)).unwrap();
        let mid_id = engine.insert_territory(mid).unwrap();

        assert_eq!(engine.get(&mid_id).unwrap().unwrap().parent, Some(broad_id));
        assert_eq!(engine.get(&corner_id).unwrap().unwrap().parent, Some(mid_id));
    }

    #[test]
    fn test_insert_records_spatial_cell() {
        let engine = engine();
        let id = engine.insert_territory(city()).unwrap();

        let t = engine.get(&id).unwrap().unwrap();
        assert_eq!(t.quadtree_level, 2);
        assert!(!t.spatial_cell.is_empty());
    }

    #[test]
    fn test_phase_insert_requires_existing_project_parent() {
        let engine = engine();
        let plain_id = engine.insert_territory(city()).unwrap();

        let mut stray =
            Territory::new("Stray", Geometry::rect_polygon(16.0, 17.0, 41.0, 42.0)).unwrap();
        stray.is_phase = true;
        stray.parent = Some(plain_id);
        assert!(matches!(
            engine.insert_territory(stray),
            Err(TerritoryError::InvalidHierarchy(_))
        ));

        let mut orphan =
            Territory::new("Orphan", Geometry::rect_polygon(16.0, 17.0, 41.0, 42.0)).unwrap();
        orphan.is_phase = true;
        assert!(matches!(
            engine.insert_territory(orphan),
            Err(TerritoryError::InvalidHierarchy(_))
        ));

        let mut ghost =
            Territory::new("Ghost", Geometry::rect_polygon(16.0, 17.0, 41.0, 42.0)).unwrap();
        ghost.is_phase = true;
        ghost.parent = Some(TerritoryId::new());
        assert!(matches!(
            engine.insert_territory(ghost),
            Err(TerritoryError::InvalidHierarchy(_))
        ));

        // Nothing from the rejected inserts was persisted.
        assert_eq!(engine.territory_count().unwrap(), 1);

        // The same record under a real project is accepted.
        let project = Territory::new("Project", Geometry::rect_polygon(26.0, 28.0, 52.0, 54.0))
            .unwrap()
            .mark_project();
        let project_id = engine.insert_territory(project).unwrap();
        let mut phase =
            Territory::new("Phase", Geometry::rect_polygon(26.5, 27.0, 52.5, 53.0)).unwrap();
        phase.is_phase = true;
        phase.parent = Some(project_id);
        assert!(engine.insert_territory(phase).is_ok());
    }

    #[test]
    fn test_phase_flagged_project_skips_subproject_detection() {
        let engine = engine();
        let master_id = engine.insert_territory(city().mark_project()).unwrap();

        let mut sub = Territory::new("Sub", Geometry::rect_polygon(16.0, 17.0, 41.0, 42.0))
            .unwrap()
            .mark_project();
        sub.is_phase = true;
        sub.parent = Some(master_id);
        // Insertion succeeds because the detection pass is skipped for
        // phase-flagged projects entirely.
        let sub_id = engine.insert_territory(sub).unwrap();

        // Running detection against a phase subject is rejected outright.
        assert!(matches!(
            engine.detect_phase_candidates(&sub_id),
            Err(TerritoryError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_project_is_not_parented_under_project() {
        let engine = engine();
        let big = city().mark_project();
        let small = Territory::new(
            "Small Project",
            Geometry::rect_polygon(15.0, 16.0, 40.0, 41.0),
        )
        .unwrap()
        .mark_project();

        let big_id = engine.insert_territory(big).unwrap();
        let small_id = engine.insert_territory(small).unwrap();

        let small = engine.get(&small_id).unwrap().unwrap();
        assert_ne!(small.parent, Some(big_id));
        assert!(small.parent.is_none());
    }

    #[test]
    fn test_phase_detection_and_conversion() {
        let engine = engine();
        let big_id = engine.insert_territory(city().mark_project()).unwrap();
        let small = Territory::new(
            "Small Project",
            Geometry::rect_polygon(15.0, 16.0, 40.0, 41.0),
        )
        .unwrap()
        .mark_project();
        let small_id = engine.insert_territory(small).unwrap();

        let suggestions = engine.detect_phase_candidates(&big_id).unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].name, "Small Project");
        assert_eq!(suggestions[0].id, small_id.to_string());

        // Cache serves the same suggestions back.
        let cached = engine.phase_suggestions(&big_id).unwrap();
        assert_eq!(cached, suggestions);

        let converted = engine.convert_to_phases(&big_id, None).unwrap();
        assert_eq!(converted, 1);

        let small = engine.get(&small_id).unwrap().unwrap();
        assert!(small.is_phase);
        assert_eq!(small.parent, Some(big_id));

        // Converted territories drop out of the refreshed suggestions.
        assert!(engine.phase_suggestions(&big_id).unwrap().is_empty());
    }

    #[test]
    fn test_convert_to_phases_respects_selection() {
        let engine = engine();
        let big_id = engine.insert_territory(city().mark_project()).unwrap();
        let first = Territory::new("First", Geometry::rect_polygon(15.0, 16.0, 40.0, 41.0))
            .unwrap()
            .mark_project();
        let second = Territory::new("Second", Geometry::rect_polygon(24.0, 25.0, 49.0, 50.0))
            .unwrap()
            .mark_project();
        let first_id = engine.insert_territory(first).unwrap();
        let second_id = engine.insert_territory(second).unwrap();

        engine.detect_phase_candidates(&big_id).unwrap();
        let converted = engine
            .convert_to_phases(&big_id, Some(&[first_id]))
            .unwrap();
        assert_eq!(converted, 1);

        assert!(engine.get(&first_id).unwrap().unwrap().is_phase);
        assert!(!engine.get(&second_id).unwrap().unwrap().is_phase);

        // Ids that were never staged as suggestions are ignored.
        let stranger = TerritoryId::new();
        let converted = engine
            .convert_to_phases(&big_id, Some(&[stranger]))
            .unwrap();
        assert_eq!(converted, 0);
    }

    #[test]
    fn test_detect_phase_candidates_rejects_non_project() {
        let engine = engine();
        let id = engine.insert_territory(city()).unwrap();
        assert!(matches!(
            engine.detect_phase_candidates(&id),
            Err(TerritoryError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_create_phase() {
        let engine = engine();
        let project_id = engine.insert_territory(city().mark_project()).unwrap();

        let phase_id = engine
            .create_phase(
                &project_id,
                "Phase 1",
                Geometry::rect_polygon(16.0, 18.0, 42.0, 44.0),
            )
            .unwrap();

        let phase = engine.get(&phase_id).unwrap().unwrap();
        assert!(phase.is_phase);
        assert_eq!(phase.parent, Some(project_id));
        assert!(!phase.spatial_cell.is_empty());
    }

    #[test]
    fn test_create_phase_requires_project_parent() {
        let engine = engine();
        let plain_id = engine.insert_territory(city()).unwrap();

        let result = engine.create_phase(
            &plain_id,
            "Phase 1",
            Geometry::rect_polygon(16.0, 18.0, 42.0, 44.0),
        );
        assert!(matches!(result, Err(TerritoryError::InvalidHierarchy(_))));
    }

    #[test]
    fn test_create_phase_requires_containment() {
        let engine = engine();
        let project_id = engine.insert_territory(city().mark_project()).unwrap();

        // Pokes outside the project's eastern edge.
        let result = engine.create_phase(
            &project_id,
            "Phase 1",
            Geometry::rect_polygon(16.0, 18.0, 49.0, 52.0),
        );
        assert!(matches!(result, Err(TerritoryError::InvalidHierarchy(_))));
    }

    #[test]
    fn test_seed_address_hierarchy_creates_placeholder_chain() {
        let engine = engine();
        let levels = vec![
            AddressLevel {
                name: "United Arab Emirates".to_string(),
                kind: "Country".to_string(),
            },
            AddressLevel {
                name: "Dubai".to_string(),
                kind: "City".to_string(),
            },
            AddressLevel {
                name: "Marina".to_string(),
                kind: "Neighborhood".to_string(),
            },
        ];

        let chain = engine.seed_address_hierarchy(25.08, 55.14, &levels).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(engine.territory_count().unwrap(), 3);

        let country = engine.get(&chain[0]).unwrap().unwrap();
        let town = engine.get(&chain[1]).unwrap().unwrap();
        let hood = engine.get(&chain[2]).unwrap().unwrap();
        assert!(country.parent.is_none());
        assert_eq!(town.parent, Some(chain[0]));
        assert_eq!(hood.parent, Some(chain[1]));
        assert!(country.is_custom);
        assert_eq!(town.boundary_kind, "City");

        // Reseeding reuses records by name instead of duplicating them.
        let again = engine.seed_address_hierarchy(25.08, 55.14, &levels).unwrap();
        assert_eq!(again, chain);
        assert_eq!(engine.territory_count().unwrap(), 3);
    }

    #[test]
    fn test_seed_address_hierarchy_keeps_existing_parent() {
        let engine = engine();
        let city_id = engine.insert_territory(city()).unwrap();
        let district_id = engine.insert_territory(district()).unwrap();

        let levels = vec![
            AddressLevel {
                name: "Somewhere Else".to_string(),
                kind: "City".to_string(),
            },
            AddressLevel {
                name: "District".to_string(),
                kind: "Neighborhood".to_string(),
            },
        ];
        let chain = engine.seed_address_hierarchy(19.0, 45.0, &levels).unwrap();

        // The district already has an inferred parent; seeding must not
        // rewire it under the placeholder.
        assert_eq!(chain[1], district_id);
        let district = engine.get(&district_id).unwrap().unwrap();
        assert_eq!(district.parent, Some(city_id));
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let config = EngineConfig::default().with_containment_threshold(150.0);
        let result = HierarchyEngine::new(MemoryStore::new(), MemoryCache::new(), config);
        assert!(matches!(result, Err(TerritoryError::InvalidInput(_))));
    }
}
