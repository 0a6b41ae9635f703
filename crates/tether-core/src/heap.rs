//! Managed heap
//!
//! Owns every object the dispatcher constructs. An object stays alive while
//! something besides the heap holds a strong reference to it (an owning
//! handle, a Rust caller); [`ManagedHeap::collect`] reclaims the rest, which
//! is what lets weak handles go stale.
//!
//! Objects live in `Arc` allocations, so an object's address never changes
//! for as long as it is reachable.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;

use crate::reflect::TypeDescriptor;

/// Strong reference to a managed object
pub type ObjectRef = Arc<ManagedObject>;

/// Mutable object state; the concrete type is known to the reflected bodies
pub type ObjectState = Box<dyn Any + Send>;

/// Unique object identity within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ObjectId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A managed-heap object: its runtime type plus its state.
pub struct ManagedObject {
    id: ObjectId,
    type_desc: Arc<TypeDescriptor>,
    state: Mutex<ObjectState>,
}

impl ManagedObject {
    /// Object identity
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Runtime type of the object
    pub fn type_desc(&self) -> &Arc<TypeDescriptor> {
        &self.type_desc
    }

    /// Runtime type name
    pub fn type_name(&self) -> &str {
        self.type_desc.name()
    }

    /// Lock the object state for a call
    pub fn lock(&self) -> MutexGuard<'_, ObjectState> {
        self.state.lock()
    }

    /// Run `f` against the state if it is a `T`
    pub fn with_state<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut state = self.state.lock();
        state.downcast_mut::<T>().map(f)
    }
}

impl std::fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedObject")
            .field("id", &self.id)
            .field("type", &self.type_desc.name())
            .finish()
    }
}

// ============================================================================
// Heap
// ============================================================================

/// Heap statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Objects currently owned by the heap
    pub live_objects: usize,
    /// Objects allocated since creation
    pub total_allocated: u64,
    /// Objects reclaimed since creation
    pub total_collected: u64,
    /// Collection cycles run
    pub collections: u64,
}

/// Result of one collection cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Objects reclaimed by this cycle
    pub collected: usize,
    /// Objects still alive after this cycle
    pub survivors: usize,
}

/// The managed heap.
///
/// Not internally synchronized; the owning `Bridge` wraps it in a lock.
pub struct ManagedHeap {
    objects: FxHashMap<ObjectId, ObjectRef>,
    gc_threshold: usize,
    allocations_since_gc: usize,
    stats: HeapStats,
}

impl ManagedHeap {
    /// Create a heap that collects every `gc_threshold` allocations
    /// (0 disables automatic collection)
    pub fn new(gc_threshold: usize) -> Self {
        Self {
            objects: FxHashMap::default(),
            gc_threshold,
            allocations_since_gc: 0,
            stats: HeapStats::default(),
        }
    }

    /// Allocate a new object, possibly running a collection first.
    pub fn allocate(&mut self, type_desc: Arc<TypeDescriptor>, state: ObjectState) -> ObjectRef {
        if self.gc_threshold > 0 && self.allocations_since_gc >= self.gc_threshold {
            self.collect();
        }

        let object = Arc::new(ManagedObject {
            id: ObjectId::next(),
            type_desc,
            state: Mutex::new(state),
        });

        self.objects.insert(object.id, Arc::clone(&object));
        self.allocations_since_gc += 1;
        self.stats.total_allocated += 1;
        object
    }

    /// Reclaim every object that only the heap still references.
    ///
    /// Reclaimed state is dropped here, so `Drop` impls act as finalizers.
    pub fn collect(&mut self) -> CollectStats {
        let before = self.objects.len();
        self.objects.retain(|_, obj| Arc::strong_count(obj) > 1);

        let collected = before - self.objects.len();
        self.allocations_since_gc = 0;
        self.stats.collections += 1;
        self.stats.total_collected += collected as u64;

        if collected > 0 {
            log::debug!(
                "[tether] GC reclaimed {} object(s), {} survive",
                collected,
                self.objects.len()
            );
        }

        CollectStats {
            collected,
            survivors: self.objects.len(),
        }
    }

    /// Whether the heap still owns `id`
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Number of objects the heap owns
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the heap is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Current statistics
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live_objects: self.objects.len(),
            ..self.stats
        }
    }
}

impl Default for ManagedHeap {
    fn default() -> Self {
        Self::new(0)
    }
}
