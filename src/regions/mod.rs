//! Region registry: z-ordered rectangles, each bound to one animation producer

use crate::animation::Producer;
use crate::error::{EngineError, EngineResult};
use crate::geometry::Placement;

/// A rotated rectangle of the shared canvas painted by one producer
#[derive(Debug, Clone)]
pub struct Region {
    id: String,
    placement: Placement,
    producer: Producer,
}

impl Region {
    pub fn new(id: impl Into<String>, placement: Placement, producer: Producer) -> Self {
        Self {
            id: id.into(),
            placement,
            producer,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }
}

/// Ordered region collection. Later entries paint later, i.e. on top.
///
/// The registry itself is not synchronized; the engine owns it behind its lock.
#[derive(Debug, Default)]
pub struct RegionRegistry {
    regions: Vec<Region>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    fn position(&self, id: &str) -> EngineResult<usize> {
        self.regions
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| EngineError::UnknownRegion(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    /// Append as the frontmost region
    pub fn add(&mut self, region: Region) -> EngineResult<()> {
        if self.get(&region.id).is_some() {
            return Err(EngineError::DuplicateRegion(region.id));
        }
        self.regions.push(region);
        Ok(())
    }

    /// Replace geometry in place, keeping z-order and producer
    pub fn update(&mut self, id: &str, placement: Placement) -> EngineResult<()> {
        let idx = self.position(id)?;
        self.regions[idx].placement = placement;
        Ok(())
    }

    /// Tear the producer down, then drop the entry
    pub fn remove(&mut self, id: &str) -> EngineResult<Region> {
        let idx = self.position(id)?;
        let region = self.regions.remove(idx);
        region.producer.teardown();
        Ok(region)
    }

    /// Tear down and drop every region
    pub fn clear(&mut self) {
        for region in self.regions.drain(..) {
            region.producer.teardown();
        }
    }

    pub fn bring_to_front(&mut self, id: &str) -> EngineResult<()> {
        let idx = self.position(id)?;
        let region = self.regions.remove(idx);
        self.regions.push(region);
        Ok(())
    }

    /// Copy of the current order; producers are shared handles
    pub fn snapshot(&self) -> Vec<Region> {
        self.regions.clone()
    }

    /// Back-to-front
    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    pub fn placements(&self) -> impl Iterator<Item = &Placement> {
        self.regions.iter().map(|r| &r.placement)
    }
}

impl<'a> IntoIterator for &'a RegionRegistry {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::Solid;
    use crate::display::Color;

    fn region(id: &str) -> Region {
        Region::new(
            id,
            Placement::new(0.0, 0.0, 10.0, 10.0),
            Producer::new(Solid::new(Color::WHITE)),
        )
    }

    fn ids(registry: &RegionRegistry) -> Vec<&str> {
        registry.iter().map(Region::id).collect()
    }

    #[test]
    fn add_appends_and_rejects_duplicates() {
        let mut registry = RegionRegistry::new();
        registry.add(region("a")).unwrap();
        registry.add(region("b")).unwrap();
        assert!(matches!(
            registry.add(region("a")),
            Err(EngineError::DuplicateRegion(id)) if id == "a"
        ));
        assert_eq!(ids(&registry), ["a", "b"]);
    }

    #[test]
    fn update_keeps_order() {
        let mut registry = RegionRegistry::new();
        registry.add(region("a")).unwrap();
        registry.add(region("b")).unwrap();
        let moved = Placement::new(5.0, 6.0, 7.0, 8.0).with_rotation(9.0);
        registry.update("a", moved).unwrap();
        assert_eq!(registry.get("a").unwrap().placement(), &moved);
        assert_eq!(ids(&registry), ["a", "b"]);
        assert!(registry.update("zzz", moved).is_err());
    }

    #[test]
    fn remove_tears_down() {
        let mut registry = RegionRegistry::new();
        registry.add(region("a")).unwrap();
        let removed = registry.remove("a").unwrap();
        assert!(removed.producer().is_torn_down());
        assert!(registry.is_empty());
        assert!(matches!(registry.remove("a"), Err(EngineError::UnknownRegion(_))));
    }

    #[test]
    fn bring_to_front_moves_to_end() {
        let mut registry = RegionRegistry::new();
        for id in ["a", "b", "c"] {
            registry.add(region(id)).unwrap();
        }
        registry.bring_to_front("a").unwrap();
        assert_eq!(ids(&registry), ["b", "c", "a"]);
        registry.bring_to_front("a").unwrap();
        assert_eq!(ids(&registry), ["b", "c", "a"]);
    }

    #[test]
    fn snapshot_is_detached_from_later_edits() {
        let mut registry = RegionRegistry::new();
        registry.add(region("a")).unwrap();
        let snapshot = registry.snapshot();
        registry.update("a", Placement::new(1.0, 1.0, 1.0, 1.0)).unwrap();
        registry.add(region("b")).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].placement(), &Placement::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn clear_tears_everything_down() {
        let mut registry = RegionRegistry::new();
        registry.add(region("a")).unwrap();
        registry.add(region("b")).unwrap();
        let snapshot = registry.snapshot();
        registry.clear();
        assert!(registry.is_empty());
        assert!(snapshot.iter().all(|r| r.producer().is_torn_down()));
    }
}
