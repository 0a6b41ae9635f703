//! Object handle table
//!
//! Native code never sees an object address; it holds an [`ObjectHandle`],
//! an opaque non-zero token naming one slot of this table. Slots are
//! generational: releasing a handle bumps the slot's generation, so a stale
//! token can never resolve to whatever object reuses the slot later.
//!
//! One handle, one release. The table does no reference counting.

use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::heap::{ManagedObject, ObjectRef};

const INDEX_BITS: u32 = usize::BITS / 2;
const INDEX_MASK: usize = (1usize << INDEX_BITS) - 1;
const GENERATION_MASK: usize = INDEX_MASK;

/// Largest number of simultaneously live slots
pub const MAX_HANDLES: usize = INDEX_MASK - 1;

/// Errors resolving or releasing a handle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    /// Never issued, already released, or zero
    #[error("Invalid object handle {0:#x}")]
    Invalid(usize),

    /// Weak handle whose object has been reclaimed
    #[error("Object behind weak handle {0:#x} has been collected")]
    Collected(usize),

    /// No free slot left
    #[error("Handle table exhausted ({0} live handles)")]
    Exhausted(usize),
}

/// Reference strength of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleMode {
    /// Roots the object: it is never reclaimed, and its address never moves,
    /// until the handle is released
    Owning,
    /// Tracks the object without rooting it
    Weak,
}

/// Opaque token for a managed object. Zero is never a valid handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(NonZeroUsize);

impl ObjectHandle {
    fn new(index: usize, generation: usize) -> Self {
        let raw = ((generation & GENERATION_MASK) << INDEX_BITS) | (index + 1);
        // index + 1 is never zero
        ObjectHandle(NonZeroUsize::new(raw).unwrap_or(NonZeroUsize::MIN))
    }

    /// Reinterpret a native token; `None` for zero
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(ObjectHandle)
    }

    /// The native token
    pub fn into_raw(self) -> usize {
        self.0.get()
    }

    /// Slot index; `None` when the low half is zero, which no issued
    /// handle has
    fn index(self) -> Option<usize> {
        (self.0.get() & INDEX_MASK).checked_sub(1)
    }

    fn generation(self) -> usize {
        (self.0.get() >> INDEX_BITS) & GENERATION_MASK
    }
}

impl std::fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

enum Cell {
    Owning(ObjectRef),
    Weak(Weak<ManagedObject>),
}

struct Slot {
    generation: usize,
    cell: Option<Cell>,
}

#[derive(Default)]
struct Slots {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

/// Generational, internally synchronized handle table
pub struct HandleTable {
    inner: Mutex<Slots>,
}

impl HandleTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a table with room for `capacity` slots before reallocating
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Slots {
                slots: Vec::with_capacity(capacity),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    /// Issue a new handle for `object`
    pub fn register(&self, object: &ObjectRef, mode: HandleMode) -> Result<ObjectHandle, HandleError> {
        let cell = match mode {
            HandleMode::Owning => Cell::Owning(Arc::clone(object)),
            HandleMode::Weak => Cell::Weak(Arc::downgrade(object)),
        };

        let mut inner = self.inner.lock();
        let handle = match inner.free.pop() {
            Some(index) => {
                let slot = &mut inner.slots[index];
                debug_assert!(slot.cell.is_none(), "free list points at live slot");
                slot.cell = Some(cell);
                ObjectHandle::new(index, slot.generation)
            }
            None => {
                let index = inner.slots.len();
                if index >= MAX_HANDLES {
                    return Err(HandleError::Exhausted(inner.live));
                }
                inner.slots.push(Slot {
                    generation: 0,
                    cell: Some(cell),
                });
                ObjectHandle::new(index, 0)
            }
        };
        inner.live += 1;

        log::debug!(
            "[tether] Registered {:?} handle {} for {} #{}",
            mode,
            handle,
            object.type_name(),
            object.id().as_u64()
        );
        Ok(handle)
    }

    /// Resolve a handle to its object
    pub fn resolve(&self, handle: ObjectHandle) -> Result<ObjectRef, HandleError> {
        let inner = self.inner.lock();
        match Self::slot(&inner, handle).and_then(|slot| slot.cell.as_ref()) {
            Some(Cell::Owning(object)) => Ok(Arc::clone(object)),
            Some(Cell::Weak(weak)) => weak
                .upgrade()
                .ok_or(HandleError::Collected(handle.into_raw())),
            None => Err(HandleError::Invalid(handle.into_raw())),
        }
    }

    /// Invalidate a handle. Releasing twice fails the second time.
    pub fn release(&self, handle: ObjectHandle) -> Result<(), HandleError> {
        let released = {
            let mut inner = self.inner.lock();
            let Some(index) = handle.index() else {
                return Err(HandleError::Invalid(handle.into_raw()));
            };
            let cell = match inner.slots.get_mut(index) {
                Some(slot) if slot.generation == handle.generation() => slot.cell.take(),
                _ => None,
            };
            let Some(cell) = cell else {
                return Err(HandleError::Invalid(handle.into_raw()));
            };

            let slot = &mut inner.slots[index];
            slot.generation = (slot.generation + 1) & GENERATION_MASK;
            inner.free.push(index);
            inner.live -= 1;
            cell
        };

        log::debug!("[tether] Released handle {}", handle);
        // Dropped outside the lock: the last strong reference may run Drop
        drop(released);
        Ok(())
    }

    /// Reference mode of a live handle
    pub fn mode(&self, handle: ObjectHandle) -> Option<HandleMode> {
        let inner = self.inner.lock();
        match Self::slot(&inner, handle)?.cell.as_ref()? {
            Cell::Owning(_) => Some(HandleMode::Owning),
            Cell::Weak(_) => Some(HandleMode::Weak),
        }
    }

    /// Number of unreleased handles
    pub fn len(&self) -> usize {
        self.inner.lock().live
    }

    /// Check if no handles are live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(inner: &Slots, handle: ObjectHandle) -> Option<&Slot> {
        inner
            .slots
            .get(handle.index()?)
            .filter(|slot| slot.generation == handle.generation())
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleTable")
            .field("live", &self.len())
            .finish()
    }
}
