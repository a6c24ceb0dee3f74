//! Staged observations
//!
//! Ingestion mutates the staged map from any thread. The worker never reads
//! the map directly; it takes an [`ObservationSet`] snapshot and iterates on
//! that until the next checkpoint.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::observation::{Observation, ObservationId};

/// Immutable working set, sorted by kind then id so every AOA follows every
/// non-AOA observation.
#[derive(Debug, Clone)]
pub struct ObservationSet {
    observations: Arc<[Observation]>,
    generation: u64,
}

impl ObservationSet {
    /// Builds a set from arbitrary observations, sorting them.
    pub fn new(mut observations: Vec<Observation>, generation: u64) -> Self {
        observations.sort_by_key(|o| (o.kind(), o.id));
        Self {
            observations: observations.into(),
            generation,
        }
    }

    /// Staging generation the snapshot was taken at.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ids(&self) -> Vec<ObservationId> {
        self.observations.iter().map(|o| o.id).collect()
    }
}

impl Deref for ObservationSet {
    type Target = [Observation];

    fn deref(&self) -> &[Observation] {
        &self.observations
    }
}

/// Concurrently updated observation container.
#[derive(Debug, Default)]
pub struct StagedObservations {
    observations: RwLock<BTreeMap<ObservationId, Observation>>,
    generation: AtomicU64,
}

impl StagedObservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an observation, returning the one it replaced.
    pub fn insert(&self, observation: Observation) -> Option<Observation> {
        let mut map = self.observations.write();
        let previous = map.insert(observation.id, observation);
        self.generation.fetch_add(1, Ordering::Release);
        previous
    }

    pub fn remove(&self, id: ObservationId) -> Option<Observation> {
        let mut map = self.observations.write();
        let removed = map.remove(&id);
        if removed.is_some() {
            self.generation.fetch_add(1, Ordering::Release);
        }
        removed
    }

    /// Swaps the whole staged set in one step.
    pub fn replace_all(&self, observations: impl IntoIterator<Item = Observation>) {
        let fresh: BTreeMap<_, _> = observations.into_iter().map(|o| (o.id, o)).collect();
        let mut map = self.observations.write();
        *map = fresh;
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub fn get(&self, id: ObservationId) -> Option<Observation> {
        self.observations.read().get(&id).cloned()
    }

    /// Applies `f` to the current map under the read lock.
    pub fn with_map<R>(&self, f: impl FnOnce(&BTreeMap<ObservationId, Observation>) -> R) -> R {
        f(&self.observations.read())
    }

    pub fn len(&self) -> usize {
        self.observations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.read().is_empty()
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Consistent sorted snapshot of the staged observations.
    pub fn snapshot(&self) -> ObservationSet {
        let map = self.observations.read();
        // Writers bump the generation while holding the write lock, so this
        // read cannot race a half-applied change.
        let generation = self.generation.load(Ordering::Acquire);
        ObservationSet::new(map.values().cloned().collect(), generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::observation::{ObservationGeometry, ObservationKind, Sensor};
    use crate::types::spaces::PlanarState;

    fn observation(id: ObservationId, kind: ObservationKind) -> Observation {
        let sensor = Sensor::new("a", PlanarState::planar(0.0, 0.0));
        let geometry = match kind {
            ObservationKind::Range => ObservationGeometry::Range { sensor },
            ObservationKind::Aoa => ObservationGeometry::Aoa { sensor },
            ObservationKind::Tdoa => ObservationGeometry::Tdoa {
                sensor,
                paired: Sensor::new("b", PlanarState::planar(10.0, 0.0)),
            },
        };
        Observation {
            id,
            geometry,
            value: 1.0,
            variance: 0.25,
            previous_value: None,
            display: None,
        }
    }

    #[test]
    fn test_snapshot_sorted_by_kind() {
        let staged = StagedObservations::new();
        staged.insert(observation(1, ObservationKind::Aoa));
        staged.insert(observation(2, ObservationKind::Range));
        staged.insert(observation(3, ObservationKind::Tdoa));
        staged.insert(observation(4, ObservationKind::Range));

        let set = staged.snapshot();
        let kinds: Vec<_> = set.iter().map(|o| o.kind()).collect();
        assert_eq!(
            kinds,
            vec![ObservationKind::Range, ObservationKind::Range, ObservationKind::Tdoa, ObservationKind::Aoa]
        );
        assert_eq!(set.ids(), vec![2, 4, 3, 1]);
    }

    #[test]
    fn test_generation_tracks_changes() {
        let staged = StagedObservations::new();
        assert_eq!(staged.generation(), 0);

        staged.insert(observation(1, ObservationKind::Range));
        assert!(staged.insert(observation(1, ObservationKind::Range)).is_some());
        assert_eq!(staged.generation(), 2);

        assert!(staged.remove(9).is_none());
        assert_eq!(staged.generation(), 2);
        assert!(staged.remove(1).is_some());
        assert_eq!(staged.generation(), 3);
        assert!(staged.is_empty());
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_changes() {
        let staged = StagedObservations::new();
        staged.insert(observation(1, ObservationKind::Range));
        let before = staged.snapshot();

        staged.replace_all(vec![observation(5, ObservationKind::Aoa), observation(6, ObservationKind::Aoa)]);

        assert_eq!(before.ids(), vec![1]);
        assert_eq!(staged.snapshot().ids(), vec![5, 6]);
        assert!(staged.snapshot().generation() > before.generation());
    }
}
