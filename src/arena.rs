use std::ops::Range;

use ahash::{HashMap, HashMapExt};
use smallvec::SmallVec;

use crate::entity::EntityId;
use crate::error::GeometryError;

/// Buffers grow and shrink in whole increments of this many elements, so a
/// stream of small edits does not reallocate on every frame.
const BUFFER_INCREMENT: usize = 512;

/// Where an entity's geometry lives inside the arena's packed buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EntityRange {
    vertex_offset: u32,
    vertex_count: u32,
    index_offset: u32,
    index_count: u32,
}

/// Tracks which parts of a CPU-side buffer have diverged from the GPU copy.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DirtyState {
    Clean,
    /// Element ranges to re-upload. Kept small and unmerged; overlapping
    /// writes are harmless and rare.
    Ranges(SmallVec<[Range<usize>; 4]>),
    /// Everything must be re-uploaded (compaction moved element positions).
    All,
}

impl DirtyState {
    fn mark_range(&mut self, range: Range<usize>) {
        match self {
            DirtyState::Clean => *self = DirtyState::Ranges(smallvec::smallvec![range]),
            DirtyState::Ranges(ranges) => ranges.push(range),
            DirtyState::All => {}
        }
    }

    fn mark_all(&mut self) {
        *self = DirtyState::All;
    }

    fn take(&mut self) -> DirtyState {
        std::mem::replace(self, DirtyState::Clean)
    }
}

/// A packed, indexed geometry batch for one primitive kind.
///
/// All entities of a kind share one vertex buffer and one index buffer and
/// are drawn with a single indexed call. Indices are stored already offset to
/// their absolute position in the shared vertex buffer, so no per-entity
/// state is needed at draw time. Removal compacts both buffers immediately;
/// the directory keeps every surviving entity addressable afterwards.
pub struct GeometryArena<V: bytemuck::Pod> {
    label: &'static str,
    vertices: Vec<V>,
    indices: Vec<u32>,
    directory: HashMap<EntityId, EntityRange>,

    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    /// GPU capacities, in elements.
    vertex_capacity: usize,
    index_capacity: usize,
    vertex_dirty: DirtyState,
    index_dirty: DirtyState,
}

impl<V: bytemuck::Pod> GeometryArena<V> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            vertices: Vec::new(),
            indices: Vec::new(),
            directory: HashMap::new(),
            vertex_buffer: None,
            index_buffer: None,
            vertex_capacity: 0,
            index_capacity: 0,
            vertex_dirty: DirtyState::Clean,
            index_dirty: DirtyState::Clean,
        }
    }

    /// Appends `id`'s geometry to the batch.
    ///
    /// `indices` are local to `vertices` (an index of `0` is the first vertex
    /// passed here); they are rebased to absolute buffer positions on the way
    /// in. Every index must reference a vertex from this call.
    pub fn insert(
        &mut self,
        id: EntityId,
        vertices: &[V],
        indices: &[u32],
    ) -> Result<(), GeometryError> {
        if self.directory.contains_key(&id) {
            return Err(GeometryError::AlreadyRegistered(id));
        }
        let vertex_count = vertices.len() as u32;
        if indices.iter().any(|&i| i >= vertex_count) {
            return Err(GeometryError::IndexOutOfRange(id));
        }

        let vertex_offset = self.vertices.len();
        let index_offset = self.indices.len();
        self.vertices.extend_from_slice(vertices);
        self.indices
            .extend(indices.iter().map(|&i| i + vertex_offset as u32));

        self.directory.insert(
            id,
            EntityRange {
                vertex_offset: vertex_offset as u32,
                vertex_count,
                index_offset: index_offset as u32,
                index_count: indices.len() as u32,
            },
        );
        self.vertex_dirty
            .mark_range(vertex_offset..self.vertices.len());
        self.index_dirty.mark_range(index_offset..self.indices.len());
        Ok(())
    }

    /// Overwrites `id`'s vertices without moving anything.
    ///
    /// The vertex count must match the registered count exactly; topology
    /// changes go through remove + insert. This is the cheap per-frame path
    /// for dragging and recoloring, and only re-uploads the touched range.
    pub fn update_in_place(&mut self, id: EntityId, vertices: &[V]) -> Result<(), GeometryError> {
        let range = self
            .directory
            .get(&id)
            .copied()
            .ok_or(GeometryError::UnknownEntity(id))?;
        if vertices.len() as u32 != range.vertex_count {
            return Err(GeometryError::VertexCountMismatch {
                id,
                expected: range.vertex_count,
                provided: vertices.len() as u32,
            });
        }

        let start = range.vertex_offset as usize;
        self.vertices[start..start + vertices.len()].copy_from_slice(vertices);
        self.vertex_dirty.mark_range(start..start + vertices.len());
        Ok(())
    }

    /// Removes `id`'s geometry and compacts both buffers so no holes remain.
    ///
    /// Returns `false` (with a warning) when `id` has nothing registered
    /// here; removal is not an error worth unwinding a frame for.
    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some(range) = self.directory.remove(&id) else {
            log::warn!("remove: entity {id} has no geometry in arena '{}'", self.label);
            return false;
        };

        let v_start = range.vertex_offset as usize;
        let v_count = range.vertex_count as usize;
        let i_start = range.index_offset as usize;
        let i_count = range.index_count as usize;
        self.vertices.drain(v_start..v_start + v_count);
        self.indices.drain(i_start..i_start + i_count);

        // Everything after the removed run slid down; indices past the gap
        // referenced vertices past the gap, so they all shift by the same
        // amount.
        for index in &mut self.indices[i_start..] {
            *index -= v_count as u32;
        }
        for entry in self.directory.values_mut() {
            if entry.vertex_offset > range.vertex_offset {
                entry.vertex_offset -= range.vertex_count;
            }
            if entry.index_offset > range.index_offset {
                entry.index_offset -= range.index_count;
            }
        }

        self.vertex_dirty.mark_all();
        self.index_dirty.mark_all();
        true
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.directory.contains_key(&id)
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.directory.clear();
        self.vertex_dirty.mark_all();
        self.index_dirty.mark_all();
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn entity_count(&self) -> usize {
        self.directory.len()
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// The GPU buffers to bind for drawing, once [`sync`](Self::sync) has run
    /// this frame. `None` while the arena is empty.
    pub fn buffers(&self) -> Option<(&wgpu::Buffer, &wgpu::Buffer)> {
        match (&self.vertex_buffer, &self.index_buffer) {
            (Some(v), Some(i)) if !self.indices.is_empty() => Some((v, i)),
            _ => None,
        }
    }

    /// Reconciles the GPU buffers with the CPU copy.
    ///
    /// Grows and shrinks in [`BUFFER_INCREMENT`] steps. Shrinking waits until
    /// usage drops below four fifths of capacity so an add/remove cycle at an
    /// increment boundary does not reallocate every frame.
    pub fn sync(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let vertex_dirty = self.vertex_dirty.take();
        let index_dirty = self.index_dirty.take();

        let (buffer, capacity) = sync_buffer(
            device,
            queue,
            self.label,
            wgpu::BufferUsages::VERTEX,
            self.vertex_buffer.take(),
            self.vertex_capacity,
            &self.vertices,
            vertex_dirty,
        );
        self.vertex_buffer = buffer;
        self.vertex_capacity = capacity;

        let (buffer, capacity) = sync_buffer(
            device,
            queue,
            self.label,
            wgpu::BufferUsages::INDEX,
            self.index_buffer.take(),
            self.index_capacity,
            &self.indices,
            index_dirty,
        );
        self.index_buffer = buffer;
        self.index_capacity = capacity;
    }

    #[cfg(test)]
    fn range_of(&self, id: EntityId) -> Option<EntityRange> {
        self.directory.get(&id).copied()
    }
}

fn round_up_to_increment(len: usize) -> usize {
    len.div_ceil(BUFFER_INCREMENT) * BUFFER_INCREMENT
}

/// Shrink only once usage has fallen to four fifths of capacity or less, and
/// only when that actually frees at least one increment.
fn wants_shrink(len: usize, capacity: usize) -> bool {
    round_up_to_increment(len) < capacity && len * 5 <= capacity * 4
}

#[allow(clippy::too_many_arguments)]
fn sync_buffer<E: bytemuck::Pod>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    usage: wgpu::BufferUsages,
    buffer: Option<wgpu::Buffer>,
    capacity: usize,
    contents: &[E],
    dirty: DirtyState,
) -> (Option<wgpu::Buffer>, usize) {
    if contents.is_empty() {
        return (None, 0);
    }

    let target = round_up_to_increment(contents.len());
    let must_grow = target > capacity || buffer.is_none();

    if must_grow || wants_shrink(contents.len(), capacity) {
        let new_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (target * std::mem::size_of::<E>()) as wgpu::BufferAddress,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&new_buffer, 0, bytemuck::cast_slice(contents));
        return (Some(new_buffer), target);
    }

    let buffer = buffer.unwrap_or_else(|| unreachable!());
    match dirty {
        DirtyState::Clean => {}
        DirtyState::All => {
            queue.write_buffer(&buffer, 0, bytemuck::cast_slice(contents));
        }
        DirtyState::Ranges(ranges) => {
            let elem = std::mem::size_of::<E>();
            for range in ranges {
                queue.write_buffer(
                    &buffer,
                    (range.start * elem) as wgpu::BufferAddress,
                    bytemuck::cast_slice(&contents[range]),
                );
            }
        }
    }
    (Some(buffer), capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> GeometryArena<[f32; 2]> {
        GeometryArena::new("test")
    }

    fn vertices(n: usize, tag: f32) -> Vec<[f32; 2]> {
        (0..n).map(|i| [tag, i as f32]).collect()
    }

    #[test]
    fn insert_rebases_indices_to_absolute_positions() {
        let mut arena = arena();
        arena
            .insert(EntityId(1), &vertices(4, 1.0), &[0, 1, 2, 2, 3, 0])
            .unwrap();
        arena.insert(EntityId(2), &vertices(3, 2.0), &[0, 1, 2]).unwrap();

        assert_eq!(arena.indices, vec![0, 1, 2, 2, 3, 0, 4, 5, 6]);
        let second = arena.range_of(EntityId(2)).unwrap();
        assert_eq!(second.vertex_offset, 4);
        assert_eq!(second.index_offset, 6);
    }

    #[test]
    fn removal_compacts_and_rewrites_later_runs() {
        let mut arena = arena();
        arena
            .insert(EntityId(1), &vertices(4, 1.0), &[0, 1, 2, 2, 3, 0])
            .unwrap();
        arena.insert(EntityId(2), &vertices(3, 2.0), &[0, 1, 2]).unwrap();
        arena.insert(EntityId(3), &vertices(3, 3.0), &[2, 1, 0]).unwrap();

        assert!(arena.remove(EntityId(1)));

        // The second entity now starts the buffer and its indices follow it.
        let second = arena.range_of(EntityId(2)).unwrap();
        assert_eq!((second.vertex_offset, second.index_offset), (0, 0));
        assert_eq!(arena.indices, vec![0, 1, 2, 5, 4, 3]);
        assert_eq!(arena.vertices.len(), 6);
        assert_eq!(arena.vertices[0], [2.0, 0.0]);

        let third = arena.range_of(EntityId(3)).unwrap();
        assert_eq!((third.vertex_offset, third.index_offset), (3, 3));
    }

    #[test]
    fn removing_middle_entity_leaves_no_holes() {
        let mut arena = arena();
        arena.insert(EntityId(1), &vertices(2, 1.0), &[0, 1]).unwrap();
        arena.insert(EntityId(2), &vertices(2, 2.0), &[1, 0]).unwrap();
        arena.insert(EntityId(3), &vertices(2, 3.0), &[0, 1]).unwrap();

        assert!(arena.remove(EntityId(2)));

        assert_eq!(arena.vertices.len(), 4);
        assert_eq!(arena.indices, vec![0, 1, 2, 3]);
        assert!(!arena.contains(EntityId(2)));
        assert_eq!(arena.entity_count(), 2);
    }

    #[test]
    fn update_in_place_keeps_offsets_and_marks_partial_range() {
        let mut arena = arena();
        arena.insert(EntityId(1), &vertices(3, 1.0), &[0, 1, 2]).unwrap();
        arena.insert(EntityId(2), &vertices(3, 2.0), &[0, 1, 2]).unwrap();
        arena.vertex_dirty = DirtyState::Clean;
        arena.index_dirty = DirtyState::Clean;

        arena
            .update_in_place(EntityId(2), &vertices(3, 9.0))
            .unwrap();

        let range = arena.range_of(EntityId(2)).unwrap();
        assert_eq!(range.vertex_offset, 3);
        assert_eq!(arena.vertices[3], [9.0, 0.0]);
        assert_eq!(
            arena.vertex_dirty,
            DirtyState::Ranges(smallvec::smallvec![3..6])
        );
        assert_eq!(arena.index_dirty, DirtyState::Clean);
    }

    #[test]
    fn update_with_wrong_vertex_count_is_rejected() {
        let mut arena = arena();
        arena.insert(EntityId(1), &vertices(3, 1.0), &[0, 1, 2]).unwrap();

        let err = arena
            .update_in_place(EntityId(1), &vertices(4, 1.0))
            .unwrap_err();
        assert!(matches!(
            err,
            GeometryError::VertexCountMismatch {
                expected: 3,
                provided: 4,
                ..
            }
        ));
        // Rejection must not scribble on the buffer.
        assert_eq!(arena.vertices[0], [1.0, 0.0]);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut arena = arena();
        arena.insert(EntityId(1), &vertices(3, 1.0), &[0, 1, 2]).unwrap();
        let err = arena
            .insert(EntityId(1), &vertices(3, 1.0), &[0, 1, 2])
            .unwrap_err();
        assert!(matches!(err, GeometryError::AlreadyRegistered(_)));
        assert_eq!(arena.vertices.len(), 3);
    }

    #[test]
    fn out_of_range_local_index_is_rejected() {
        let mut arena = arena();
        let err = arena
            .insert(EntityId(1), &vertices(3, 1.0), &[0, 1, 3])
            .unwrap_err();
        assert!(matches!(err, GeometryError::IndexOutOfRange(_)));
        assert!(arena.is_empty());
        assert!(!arena.contains(EntityId(1)));
    }

    #[test]
    fn removing_unknown_entity_is_a_noop() {
        let mut arena = arena();
        arena.insert(EntityId(1), &vertices(2, 1.0), &[0, 1]).unwrap();
        assert!(!arena.remove(EntityId(7)));
        assert_eq!(arena.entity_count(), 1);
        assert_eq!(arena.indices, vec![0, 1]);
    }

    #[test]
    fn removal_marks_everything_dirty() {
        let mut arena = arena();
        arena.insert(EntityId(1), &vertices(2, 1.0), &[0, 1]).unwrap();
        arena.insert(EntityId(2), &vertices(2, 2.0), &[0, 1]).unwrap();
        arena.vertex_dirty = DirtyState::Clean;
        arena.index_dirty = DirtyState::Clean;

        arena.remove(EntityId(1));
        assert_eq!(arena.vertex_dirty, DirtyState::All);
        assert_eq!(arena.index_dirty, DirtyState::All);
    }

    #[test]
    fn shrink_waits_for_the_hysteresis_threshold() {
        let cap = BUFFER_INCREMENT * 4; // 2048
        // Just under capacity: no shrink.
        assert!(!wants_shrink(cap - 1, cap));
        // At exactly 4/5 of capacity the rounded target is still 2048, so
        // shrinking would free nothing.
        assert!(!wants_shrink(cap * 4 / 5 + 1, cap));
        // Well below: shrink frees whole increments.
        assert!(wants_shrink(BUFFER_INCREMENT, cap));
        assert!(wants_shrink(BUFFER_INCREMENT * 2, cap));
        // A buffer already at its rounded size never shrinks.
        assert!(!wants_shrink(BUFFER_INCREMENT, BUFFER_INCREMENT));
    }

    #[test]
    fn increment_rounding() {
        assert_eq!(round_up_to_increment(0), 0);
        assert_eq!(round_up_to_increment(1), BUFFER_INCREMENT);
        assert_eq!(round_up_to_increment(BUFFER_INCREMENT), BUFFER_INCREMENT);
        assert_eq!(
            round_up_to_increment(BUFFER_INCREMENT + 1),
            BUFFER_INCREMENT * 2
        );
    }
}
