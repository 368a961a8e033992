use std::fmt;

use ahash::{HashMap, HashMapExt};

use crate::error::IdentityError;

/// A stable, process-scoped handle to a piece of registered geometry.
///
/// `0` is reserved (it is what a cleared picking image reads back) and
/// [`EntityId::INVALID`] is the "nothing here" sentinel; neither is ever
/// issued by the allocator. Released ids are recycled, so holding an id
/// across an entity's lifetime is not a proof of identity — callers that
/// care must track liveness themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub(crate) u32);

impl EntityId {
    /// Sentinel returned by picking queries that hit nothing.
    pub const INVALID: EntityId = EntityId(u32::MAX);

    pub fn is_valid(self) -> bool {
        self.0 != 0 && self != Self::INVALID
    }

    pub(crate) fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Non-owning reference back to whatever domain object owns an entity.
///
/// The renderer never dereferences this; it is an index or handle into a
/// table the caller maintains. Ownership always flows from the allocator and
/// arenas towards entities, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerTag(pub u64);

/// Issues and recycles entity identities.
///
/// Identities are recycled through a free list; releasing the most recently
/// issued, never-recycled id simply rewinds the high-water mark instead of
/// growing the list.
pub struct EntityAllocator<T> {
    /// High-water mark: the largest id ever issued and still accounted for.
    last_id: u32,
    /// Released ids below the high-water mark, reused LIFO.
    free_ids: Vec<u32>,
    /// Owner log for every live id. Entries are removed on release, so a
    /// recycled-but-unreused id can never resolve to a stale owner.
    owners: HashMap<u32, T>,
}

impl<T> Default for EntityAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EntityAllocator<T> {
    pub fn new() -> Self {
        Self {
            last_id: 0,
            free_ids: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Issues an id for `owner`. Recycled ids are preferred over fresh ones;
    /// `0` is never returned.
    pub fn allocate(&mut self, owner: T) -> EntityId {
        let id = match self.free_ids.pop() {
            Some(recycled) => recycled,
            None => {
                self.last_id += 1;
                self.last_id
            }
        };
        self.owners.insert(id, owner);
        EntityId(id)
    }

    /// Returns the id the next [`allocate`](Self::allocate) call would issue,
    /// without mutating state. Used by callers that must label geometry
    /// before the owning object exists.
    pub fn peek_next(&self) -> EntityId {
        match self.free_ids.last() {
            Some(&recycled) => EntityId(recycled),
            None => EntityId(self.last_id + 1),
        }
    }

    /// Marks `id` reusable and returns its owner tag.
    ///
    /// Releasing an id that is not live (double release, never allocated, or
    /// a reserved value) is a caller bug; it is reported as
    /// [`IdentityError::NotLive`] and leaves the free list untouched.
    pub fn release(&mut self, id: EntityId) -> Result<T, IdentityError> {
        if !id.is_valid() {
            return Err(IdentityError::NotLive(id));
        }
        let owner = self.owners.remove(&id.0).ok_or(IdentityError::NotLive(id))?;

        if id.0 == self.last_id {
            // The newest slot was never recycled; rewind instead of growing
            // the free list.
            self.last_id -= 1;
        } else {
            self.free_ids.push(id.0);
        }
        Ok(owner)
    }

    /// Resolves a live id to its owner. Reserved values, never-allocated ids
    /// and released ids all resolve to `None`.
    pub fn lookup(&self, id: EntityId) -> Option<&T> {
        if !id.is_valid() {
            return None;
        }
        self.owners.get(&id.0)
    }

    pub fn is_live(&self, id: EntityId) -> bool {
        id.is_valid() && self.owners.contains_key(&id.0)
    }

    pub fn live_count(&self) -> usize {
        self.owners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_issues_zero_or_sentinel() {
        let mut allocator = EntityAllocator::new();
        for _ in 0..100 {
            let id = allocator.allocate("owner");
            assert!(id.is_valid());
        }
    }

    #[test]
    fn live_ids_are_unique() {
        let mut allocator = EntityAllocator::new();
        let mut live: Vec<EntityId> = (0..32).map(|i| allocator.allocate(i)).collect();

        // Release every other id, then allocate a fresh batch; no id may be
        // held by two simultaneously-live entities.
        let released: Vec<EntityId> = live.iter().copied().step_by(2).collect();
        for id in &released {
            allocator.release(*id).unwrap();
        }
        live.retain(|id| !released.contains(id));
        for i in 0..24 {
            live.push(allocator.allocate(i));
        }

        let mut seen = std::collections::HashSet::new();
        for id in &live {
            assert!(seen.insert(*id), "id {id} issued twice");
        }
    }

    #[test]
    fn recycles_before_extending_high_water_mark() {
        let mut allocator = EntityAllocator::new();
        let a = allocator.allocate("a");
        let b = allocator.allocate("b");
        let c = allocator.allocate("c");
        assert_eq!((a.raw(), b.raw(), c.raw()), (1, 2, 3));

        allocator.release(b).unwrap();
        assert_eq!(allocator.allocate("b2"), b);
        assert_eq!(allocator.allocate("d").raw(), 4);
    }

    #[test]
    fn releasing_newest_id_rewinds_instead_of_recycling() {
        let mut allocator = EntityAllocator::new();
        allocator.allocate("a");
        allocator.allocate("b");
        let c = allocator.allocate("c");

        allocator.release(c).unwrap();
        // The slot is handed out again as a fresh id, not via the free list.
        assert_eq!(allocator.peek_next(), c);
        assert_eq!(allocator.allocate("c2"), c);
    }

    #[test]
    fn out_of_order_release_keeps_allocator_consistent() {
        let mut allocator = EntityAllocator::new();
        let ids: Vec<EntityId> = (0..4).map(|i| allocator.allocate(i)).collect();

        allocator.release(ids[1]).unwrap();
        allocator.release(ids[3]).unwrap(); // newest: rewinds
        allocator.release(ids[0]).unwrap();

        assert_eq!(allocator.live_count(), 1);
        assert!(allocator.is_live(ids[2]));
        // Everything released must come back before a fresh id does.
        let mut reissued = vec![
            allocator.allocate(10),
            allocator.allocate(11),
            allocator.allocate(12),
        ];
        reissued.sort_by_key(|id| id.raw());
        assert_eq!(
            reissued.iter().map(|id| id.raw()).collect::<Vec<_>>(),
            vec![1, 2, 4]
        );
    }

    #[test]
    fn double_release_is_rejected() {
        let mut allocator = EntityAllocator::new();
        let id = allocator.allocate("a");
        allocator.release(id).unwrap();
        assert!(matches!(
            allocator.release(id),
            Err(IdentityError::NotLive(_))
        ));
        // The free list must not have been corrupted by the second call.
        let _ = allocator.allocate("b");
        assert_eq!(allocator.live_count(), 1);
    }

    #[test]
    fn lookup_misses_reserved_and_stale_ids() {
        let mut allocator = EntityAllocator::new();
        assert!(allocator.lookup(EntityId(0)).is_none());
        assert!(allocator.lookup(EntityId::INVALID).is_none());
        assert!(allocator.lookup(EntityId(42)).is_none());

        let id = allocator.allocate("a");
        assert_eq!(allocator.lookup(id), Some(&"a"));
        allocator.release(id).unwrap();
        assert!(allocator.lookup(id).is_none());
    }

    #[test]
    fn peek_next_does_not_mutate() {
        let mut allocator = EntityAllocator::new();
        allocator.allocate("a");
        let peeked = allocator.peek_next();
        assert_eq!(allocator.peek_next(), peeked);
        assert_eq!(allocator.allocate("b"), peeked);
    }
}
