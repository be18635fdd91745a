use std::{collections::BTreeMap, mem::size_of};

use strum::IntoStaticStr;

use crate::{
    frame::Frame,
    function::Closure,
    native::BoundMethod,
    resource::{ResourceError, ResourceTracker},
    types::{Dict, List, Struct},
    value::Value,
};

/// Allocations between automatic collections when the tracker does not set an interval.
pub(crate) const GC_INTERVAL: usize = 100_000;

/// Snapshot of heap state at a point in time.
///
/// The `objects_by_type` map uses `BTreeMap` for deterministic iteration order,
/// making snapshots suitable for display and comparison without sort overhead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Total number of live objects on the heap.
    pub live_objects: usize,
    /// Number of free (recycled) slots available for reuse.
    pub free_slots: usize,
    /// Total heap capacity (live + free).
    pub total_slots: usize,
    /// Breakdown of live objects by kind ("List", "Closure", "Frame", ...).
    pub objects_by_type: BTreeMap<&'static str, usize>,
    /// Number of strings in the module's interner.
    pub interned_strings: usize,
}

/// Unique identifier for values stored inside the heap arena.
///
/// Two values refer to the same object exactly when their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HeapId(usize);

impl HeapId {
    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Payload of a heap slot.
#[derive(Debug, IntoStaticStr)]
pub(crate) enum HeapData {
    /// A string built at runtime. Literals stay interned and never reach the heap.
    Str(String),
    List(List),
    Tuple(Vec<Value>),
    Dict(Dict),
    Struct(Struct),
    /// A function value: definition, evaluated defaults and captured frame.
    Closure(Closure),
    /// A type value bound to its receiver, e.g. `x.append`.
    BoundMethod(BoundMethod),
    /// Local bindings of one function call.
    Frame(Frame),
}

impl HeapData {
    /// Rough size in bytes, used for memory limits.
    fn estimate_size(&self) -> usize {
        let payload = match self {
            Self::Str(s) => s.len(),
            Self::List(list) => list.len() * size_of::<Value>(),
            Self::Tuple(items) => items.len() * size_of::<Value>(),
            Self::Dict(dict) => dict.len() * 3 * size_of::<Value>(),
            Self::Struct(s) => s.len() * 2 * size_of::<Value>(),
            Self::Closure(closure) => closure.defaults.len() * size_of::<Value>(),
            Self::BoundMethod(_) => 0,
            Self::Frame(frame) => frame.len() * 2 * size_of::<Value>(),
        };
        size_of::<Self>() + payload
    }

    /// Pushes every heap id this payload refers to.
    fn collect_child_ids(&self, work_list: &mut Vec<HeapId>) {
        let mut push = |value: Value| {
            if let Value::Ref(id) = value {
                work_list.push(id);
            }
        };
        match self {
            Self::Str(_) => {}
            Self::List(list) => list.items().iter().copied().for_each(&mut push),
            Self::Tuple(items) => items.iter().copied().for_each(&mut push),
            Self::Dict(dict) => {
                for (key, value) in dict.items() {
                    push(key);
                    push(value);
                }
            }
            Self::Struct(s) => s.fields().for_each(|(_, value)| push(value)),
            Self::Closure(closure) => {
                closure.defaults.iter().copied().for_each(&mut push);
                if let Some(frame) = closure.frame {
                    push(Value::Ref(frame));
                }
            }
            Self::BoundMethod(method) => push(method.receiver),
            Self::Frame(frame) => {
                frame.values().for_each(&mut push);
                if let Some(parent) = frame.parent() {
                    push(Value::Ref(parent));
                }
            }
        }
    }
}

/// Object-safe view of the heap.
///
/// Native functions are plain function pointers, so they cannot be generic over
/// the resource tracker. They (and the value helpers shared with them) reach the
/// heap through this trait instead.
pub(crate) trait HeapAccess {
    fn get(&self, id: HeapId) -> &HeapData;

    fn get_mut(&mut self, id: HeapId) -> &mut HeapData;

    fn allocate(&mut self, data: HeapData) -> Result<HeapId, ResourceError>;
}

/// Arena that backs all heap-only runtime values.
///
/// Call frames nothing captured are freed as soon as their call returns
/// ([`Heap::release_frame`]). Every other slot is reclaimed by
/// [`Heap::collect_garbage`], a mark-sweep pass over everything reachable from
/// the given roots. Freed slots go to a free list and are reused by later
/// allocations.
///
/// Generic over `T: ResourceTracker` to support different resource tracking strategies.
#[derive(Debug)]
pub(crate) struct Heap<T: ResourceTracker> {
    entries: Vec<Option<HeapData>>,
    /// IDs of freed slots available for reuse.
    free_list: Vec<HeapId>,
    /// Resource tracker for enforcing limits and scheduling GC.
    tracker: T,
    /// Number of allocations since the last GC.
    allocations_since_gc: usize,
}

impl<T: ResourceTracker> Heap<T> {
    pub fn new(tracker: T) -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            tracker,
            allocations_since_gc: 0,
        }
    }

    /// Allocates a new heap entry, reusing a freed slot when one is available.
    ///
    /// Returns `Err(ResourceError)` if allocation would exceed configured limits.
    pub fn allocate(&mut self, data: HeapData) -> Result<HeapId, ResourceError> {
        self.tracker.on_allocate(|| data.estimate_size())?;
        self.allocations_since_gc = self.allocations_since_gc.wrapping_add(1);

        let id = if let Some(id) = self.free_list.pop() {
            self.entries[id.index()] = Some(data);
            id
        } else {
            let id = HeapId(self.entries.len());
            self.entries.push(Some(data));
            id
        };
        Ok(id)
    }

    /// Returns the heap data stored at the given ID.
    ///
    /// # Panics
    /// Panics if the ID is invalid or the value has already been freed. Neither can
    /// happen for ids held by live values, since collection only frees unreachable slots.
    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        self.entries
            .get(id.index())
            .expect("Heap::get: slot missing")
            .as_ref()
            .expect("Heap::get: object already freed")
    }

    /// Returns a mutable reference to the heap data stored at the given ID.
    ///
    /// # Panics
    /// Same conditions as [`Heap::get`].
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.entries
            .get_mut(id.index())
            .expect("Heap::get_mut: slot missing")
            .as_mut()
            .expect("Heap::get_mut: object already freed")
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    /// Returns whether enough allocations happened since the last collection.
    #[inline]
    pub fn should_gc(&self) -> bool {
        self.allocations_since_gc >= self.tracker.gc_interval().unwrap_or(GC_INTERVAL)
    }

    /// Runs mark-sweep garbage collection.
    ///
    /// Marks all objects reachable from `roots`, then frees everything else.
    /// Must only run at a point where no value outside the roots is in use,
    /// i.e. between top-level executions.
    ///
    /// Returns the number of freed slots.
    pub fn collect_garbage(&mut self, roots: Vec<HeapId>) -> usize {
        let reachable = self.mark(roots);

        let mut freed = 0;
        for (index, slot) in self.entries.iter_mut().enumerate() {
            if reachable[index] {
                continue;
            }
            if let Some(data) = slot.take() {
                self.tracker.on_free(|| data.estimate_size());
                self.free_list.push(HeapId(index));
                freed += 1;
            }
        }

        self.allocations_since_gc = 0;
        freed
    }

    /// Frees the frame of a call that has returned, unless a closure captured it.
    ///
    /// Only a nested `def` or `lambda` can hold on to a frame (directly, or through
    /// the parent of a frame of its own), and creating one marks the frame
    /// captured. An uncaptured frame is therefore referenced by nothing once its
    /// call is over. Returns whether the slot was freed.
    pub fn release_frame(&mut self, id: HeapId) -> bool {
        let slot = &mut self.entries[id.index()];
        if !matches!(slot, Some(HeapData::Frame(frame)) if !frame.is_captured()) {
            return false;
        }
        if let Some(data) = slot.take() {
            self.tracker.on_free(|| data.estimate_size());
            self.free_list.push(id);
        }
        true
    }

    /// Freezes every list and dict reachable from `roots`.
    pub fn freeze_reachable(&mut self, roots: Vec<HeapId>) {
        let reachable = self.mark(roots);
        for (index, slot) in self.entries.iter_mut().enumerate() {
            if !reachable[index] {
                continue;
            }
            match slot {
                Some(HeapData::List(list)) => list.freeze(),
                Some(HeapData::Dict(dict)) => dict.freeze(),
                _ => {}
            }
        }
    }

    /// Mark phase shared by collection and freezing.
    ///
    /// Uses `Vec<bool>` instead of a hash set: slot indices are dense.
    fn mark(&self, roots: Vec<HeapId>) -> Vec<bool> {
        let mut reachable = vec![false; self.entries.len()];
        let mut work_list = roots;

        while let Some(id) = work_list.pop() {
            let index = id.index();
            if index >= reachable.len() || reachable[index] {
                continue;
            }
            reachable[index] = true;
            if let Some(Some(data)) = self.entries.get(index) {
                data.collect_child_ids(&mut work_list);
            }
        }
        reachable
    }

    /// Takes a snapshot of the heap.
    pub fn stats(&self, interned_strings: usize) -> HeapStats {
        let mut objects_by_type = BTreeMap::new();
        let mut live_objects = 0;
        for data in self.entries.iter().flatten() {
            live_objects += 1;
            *objects_by_type.entry(<&'static str>::from(data)).or_insert(0) += 1;
        }
        HeapStats {
            live_objects,
            free_slots: self.free_list.len(),
            total_slots: self.entries.len(),
            objects_by_type,
            interned_strings,
        }
    }
}

impl<T: ResourceTracker> HeapAccess for Heap<T> {
    #[inline]
    fn get(&self, id: HeapId) -> &HeapData {
        Self::get(self, id)
    }

    #[inline]
    fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        Self::get_mut(self, id)
    }

    #[inline]
    fn allocate(&mut self, data: HeapData) -> Result<HeapId, ResourceError> {
        Self::allocate(self, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        intern::Interns,
        resource::{LimitedTracker, NoLimitTracker, ResourceLimits},
    };

    #[test]
    fn collection_frees_unreachable_cycles() {
        let mut heap = Heap::new(NoLimitTracker::new());
        let kept = heap.allocate(HeapData::List(List::new(vec![Value::Int(1)]))).unwrap();

        // two frames referencing each other through a list, unreachable from the root
        let mut interns = Interns::new();
        let name = interns.intern("x");
        let outer = heap.allocate(HeapData::Frame(Frame::default())).unwrap();
        let inner = heap.allocate(HeapData::Frame(Frame::with_bindings(Some(outer), []))).unwrap();
        let cycle = heap.allocate(HeapData::List(List::new(vec![Value::Ref(inner)]))).unwrap();
        if let HeapData::Frame(frame) = heap.get_mut(outer) {
            frame.set(name, Value::Ref(cycle));
        }

        assert_eq!(heap.collect_garbage(vec![kept]), 3);
        let stats = heap.stats(interns.len());
        assert_eq!(stats.live_objects, 1);
        assert_eq!(stats.free_slots, 3);
        assert_eq!(stats.objects_by_type.get("List"), Some(&1));

        // freed slots are reused
        let reused = heap.allocate(HeapData::Str("s".to_owned())).unwrap();
        assert_ne!(reused, kept);
        assert_eq!(heap.stats(0).total_slots, 4);
    }

    #[test]
    fn returned_frames_are_freed_unless_captured() {
        let mut heap = Heap::new(LimitedTracker::new(ResourceLimits::new()));
        let plain = heap.allocate(HeapData::Frame(Frame::default())).unwrap();
        let captured = heap.allocate(HeapData::Frame(Frame::default())).unwrap();
        if let HeapData::Frame(frame) = heap.get_mut(captured) {
            frame.mark_captured();
        }
        let list = heap.allocate(HeapData::List(List::new(vec![]))).unwrap();
        let before = heap.tracker().current_memory();

        assert!(heap.release_frame(plain));
        assert!(!heap.release_frame(captured));
        assert!(!heap.release_frame(list));
        assert!(heap.tracker().current_memory() < before);

        let stats = heap.stats(0);
        assert_eq!(stats.objects_by_type.get("Frame"), Some(&1));
        assert_eq!(stats.free_slots, 1);
        // the slot is reused by the next call
        assert_eq!(heap.allocate(HeapData::Frame(Frame::default())).unwrap(), plain);
    }

    #[test]
    fn freezing_reaches_nested_containers() {
        let mut heap = Heap::new(NoLimitTracker::new());
        let inner = heap.allocate(HeapData::List(List::new(vec![]))).unwrap();
        let outer = heap.allocate(HeapData::Tuple(vec![Value::Ref(inner)])).unwrap();
        let loose = heap.allocate(HeapData::List(List::new(vec![]))).unwrap();
        heap.freeze_reachable(vec![outer]);
        assert!(matches!(heap.get(inner), HeapData::List(list) if list.is_frozen()));
        assert!(matches!(heap.get(loose), HeapData::List(list) if !list.is_frozen()));
    }

    #[test]
    fn allocation_limit_is_enforced() {
        let mut heap = Heap::new(LimitedTracker::new(ResourceLimits::new().max_allocations(1)));
        heap.allocate(HeapData::Str("a".to_owned())).unwrap();
        let err = heap.allocate(HeapData::Str("b".to_owned())).unwrap_err();
        assert!(matches!(err, ResourceError::Allocation { limit: 1, .. }));
    }

    #[test]
    fn gc_interval_comes_from_the_tracker() {
        let mut heap = Heap::new(LimitedTracker::new(ResourceLimits::new().gc_interval(2)));
        heap.allocate(HeapData::Str("a".to_owned())).unwrap();
        assert!(!heap.should_gc());
        heap.allocate(HeapData::Str("b".to_owned())).unwrap();
        assert!(heap.should_gc());
        heap.collect_garbage(vec![]);
        assert!(!heap.should_gc());
    }
}
