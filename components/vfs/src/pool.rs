//! Fixed-capacity object pool
//!
//! This module provides allocation-free creation of file, directory and
//! socket objects.
//!
//! ## Design
//!
//! A pool pre-constructs `capacity` instances of one concrete type and hands
//! out shared references to them. Acquiring scans linearly for a free slot;
//! releasing flips the slot's in-use flag back. Objects never move and are
//! never dropped while the pool is alive, so a released slot is handed out
//! again with the same storage.
//!
//! Payload state is not reset between uses; the object's open hook is
//! responsible for reinitializing it.
//!
//! Objects find their way back to the pool through a [`PoolLink`], which
//! holds a weak, type-erased reference to the owning pool.

use core::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Type-erased release interface of a pool
///
/// Objects are identified by the address of their storage, which stays
/// stable for the lifetime of the pool.
pub trait SlotOwner {
    /// Mark the slot holding the object at `addr` free
    ///
    /// # Returns
    /// `false` if `addr` is not storage of this pool or the slot is not held
    fn release_addr(&self, addr: *const ()) -> bool;
}

/// Back-reference from a pooled object to the pool that owns its storage
#[derive(Default)]
pub struct PoolLink {
    owner: Option<Weak<dyn SlotOwner>>,
}

impl PoolLink {
    /// Record the owning pool (done on every acquire)
    pub fn attach(&mut self, owner: Weak<dyn SlotOwner>) {
        self.owner = Some(owner);
    }

    /// Whether the object currently belongs to a pool slot
    pub fn is_attached(&self) -> bool {
        self.owner.is_some()
    }

    /// Detach from the owning pool and hand back the slot at `addr`
    ///
    /// Objects that were never pooled (devices) are left alone and `false`
    /// is returned.
    pub fn release(&mut self, addr: *const ()) -> bool {
        match self.owner.take().and_then(|owner| owner.upgrade()) {
            Some(pool) => pool.release_addr(addr),
            None => false,
        }
    }
}

/// Fixed-capacity pool of pre-constructed objects
pub struct ObjectPool<T> {
    /// Weak self-reference handed to objects as their owner
    this: Weak<ObjectPool<T>>,
    /// Pre-constructed objects, one per slot
    objects: Vec<Rc<RefCell<T>>>,
    /// In-use flag per slot
    in_use: Vec<Cell<bool>>,
}

impl<T: Default> ObjectPool<T> {
    /// Create a pool of `capacity` default-constructed objects
    pub fn new(capacity: usize) -> Rc<Self> {
        Self::with_factory(capacity, |_| T::default())
    }
}

impl<T> ObjectPool<T> {
    /// Create a pool, constructing slot `i` with `make(i)`
    ///
    /// Construction is the only point where the pool allocates.
    pub fn with_factory(capacity: usize, mut make: impl FnMut(usize) -> T) -> Rc<Self> {
        Rc::new_cyclic(|this| ObjectPool {
            this: this.clone(),
            objects: (0..capacity).map(|i| Rc::new(RefCell::new(make(i)))).collect(),
            in_use: (0..capacity).map(|_| Cell::new(false)).collect(),
        })
    }

    /// Acquire a free object
    ///
    /// # Returns
    /// - `Some(object)` with its slot marked in use
    /// - `None` if every slot is held (resource exhaustion)
    pub fn acquire(&self) -> Option<Rc<RefCell<T>>> {
        for (slot, flag) in self.in_use.iter().enumerate() {
            if !flag.get() {
                flag.set(true);
                return Some(self.objects[slot].clone());
            }
        }

        log::debug!("pool exhausted ({} slots)", self.capacity());
        None
    }

    /// Release an object previously acquired from this pool
    ///
    /// # Returns
    /// `false` if `object` is not a member of this pool or is not held
    pub fn release(&self, object: &Rc<RefCell<T>>) -> bool {
        self.release_slot(Rc::as_ptr(object) as *const ())
    }

    /// Object stored in slot `index`
    pub fn object(&self, index: usize) -> Option<Rc<RefCell<T>>> {
        self.objects.get(index).cloned()
    }

    /// Whether slot `index` is currently held
    pub fn is_in_use(&self, index: usize) -> bool {
        self.in_use.get(index).map_or(false, Cell::get)
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.objects.len()
    }

    /// Number of slots currently held
    pub fn in_use_count(&self) -> usize {
        self.in_use.iter().filter(|flag| flag.get()).count()
    }

    /// Number of slots available for acquisition
    pub fn available(&self) -> usize {
        self.capacity() - self.in_use_count()
    }

    fn slot_of(&self, addr: *const ()) -> Option<usize> {
        self.objects
            .iter()
            .position(|obj| Rc::as_ptr(obj) as *const () == addr)
    }

    fn release_slot(&self, addr: *const ()) -> bool {
        match self.slot_of(addr) {
            Some(slot) if self.in_use[slot].get() => {
                self.in_use[slot].set(false);
                true
            }
            Some(slot) => {
                log::warn!("pool slot {} released while free", slot);
                false
            }
            None => false,
        }
    }
}

impl<T: 'static> ObjectPool<T> {
    /// Type-erased owner reference for objects of this pool
    pub fn owner(&self) -> Weak<dyn SlotOwner> {
        self.this.clone()
    }
}

impl<T> SlotOwner for ObjectPool<T> {
    fn release_addr(&self, addr: *const ()) -> bool {
        self.release_slot(addr)
    }
}
