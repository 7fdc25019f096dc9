//! Generational handles and slot storage
//!
//! A [`Handle`] is a `{index, generation}` pair resolved through the
//! [`Storage`] that issued it. Every removal bumps the slot generation, so a
//! handle that outlived its resource resolves to `None` instead of aliasing
//! whatever was inserted into the recycled slot.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by mutating storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Out of memory while growing storage: {0}")]
    OutOfMemory(#[from] std::collections::TryReserveError),
    #[error("Storage index space exhausted")]
    IndexExhausted,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Typed generational reference into a [`Storage<T>`]
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Sentinel that never resolves
    pub const INVALID: Self = Self::new(u32::MAX, 0);

    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// False only for the [`Handle::INVALID`] sentinel. A valid-looking handle
    /// may still be stale; only its storage can tell.
    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::INVALID
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Handle({}v{})", self.index, self.generation)
        } else {
            write!(f, "Handle(INVALID)")
        }
    }
}

/// Resource held by a slot.
///
/// `Owned` resources are dropped when the slot is removed. `Shared`
/// resources are borrowed: the storage drops only its own reference and the
/// lifetime stays with whoever else holds the `Arc`.
pub enum SlotResource<T> {
    Owned(Box<T>),
    Shared(Arc<T>),
}

impl<T> SlotResource<T> {
    pub fn get(&self) -> &T {
        match self {
            SlotResource::Owned(b) => b,
            SlotResource::Shared(a) => a,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, SlotResource::Owned(_))
    }

    /// Unwraps an owned resource; shared resources are handed back unchanged.
    pub fn into_owned(self) -> Result<T, Arc<T>> {
        match self {
            SlotResource::Owned(b) => Ok(*b),
            SlotResource::Shared(a) => Err(a),
        }
    }
}

struct Slot<T> {
    resource: Option<SlotResource<T>>,
    generation: u32,
    ref_count: u32,
    name: Option<String>,
}

impl<T> Slot<T> {
    fn is_live(&self, generation: u32) -> bool {
        self.generation == generation && self.resource.is_some()
    }
}

/// Slot storage with LIFO free-list reuse, cooperative reference counts and
/// a name index.
pub struct Storage<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    names: HashMap<String, Handle<T>>,
    live: usize,
}

impl<T> Default for Storage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Storage<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            names: HashMap::new(),
            live: 0,
        }
    }

    /// Insert an owned resource. The returned handle starts with a reference
    /// count of one.
    pub fn insert(&mut self, resource: T, name: Option<&str>) -> StorageResult<Handle<T>> {
        self.insert_resource(SlotResource::Owned(Box::new(resource)), name)
    }

    /// Insert a borrowed resource whose lifetime is managed elsewhere.
    pub fn insert_shared(&mut self, resource: Arc<T>, name: Option<&str>) -> StorageResult<Handle<T>> {
        self.insert_resource(SlotResource::Shared(resource), name)
    }

    fn insert_resource(
        &mut self,
        resource: SlotResource<T>,
        name: Option<&str>,
    ) -> StorageResult<Handle<T>> {
        let name = name.map(str::to_owned);
        if name.is_some() {
            self.names.try_reserve(1)?;
        }

        let handle = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.resource = Some(resource);
            slot.ref_count = 1;
            slot.name = name.clone();
            Handle::new(index, slot.generation)
        } else {
            let index = u32::try_from(self.slots.len())
                .ok()
                .filter(|i| *i != u32::MAX)
                .ok_or(StorageError::IndexExhausted)?;
            self.slots.try_reserve(1)?;
            self.slots.push(Slot {
                resource: Some(resource),
                generation: 0,
                ref_count: 1,
                name: name.clone(),
            });
            Handle::new(index, 0)
        };

        if let Some(name) = name {
            // Rebinding a name leaves the previous holder alive but unnamed.
            if let Some(previous) = self.names.insert(name, handle) {
                if let Some(slot) = self.live_slot_mut(previous) {
                    slot.name = None;
                }
            }
        }

        self.live += 1;
        log::trace!("Storage insert {:?}", handle);
        Ok(handle)
    }

    fn live_slot(&self, handle: Handle<T>) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.is_live(handle.generation))
    }

    fn live_slot_mut(&mut self, handle: Handle<T>) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.is_live(handle.generation))
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.live_slot(handle)?.resource.as_ref().map(SlotResource::get)
    }

    /// Mutable access; borrowed slots are read-only and return `None`.
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        match self.live_slot_mut(handle)?.resource.as_mut()? {
            SlotResource::Owned(b) => Some(b.as_mut()),
            SlotResource::Shared(_) => None,
        }
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.live_slot(handle).is_some()
    }

    pub fn is_owned(&self, handle: Handle<T>) -> Option<bool> {
        self.live_slot(handle)?.resource.as_ref().map(SlotResource::is_owned)
    }

    pub fn add_ref(&mut self, handle: Handle<T>) -> bool {
        match self.live_slot_mut(handle) {
            Some(slot) => {
                slot.ref_count = slot.ref_count.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Decrement the reference count. Returns true exactly once, on the call
    /// that brings the count to zero; the caller is then expected to
    /// [`remove`](Self::remove) the resource.
    pub fn release(&mut self, handle: Handle<T>) -> bool {
        match self.live_slot_mut(handle) {
            Some(slot) if slot.ref_count > 0 => {
                slot.ref_count -= 1;
                slot.ref_count == 0
            }
            _ => false,
        }
    }

    pub fn ref_count(&self, handle: Handle<T>) -> Option<u32> {
        self.live_slot(handle).map(|slot| slot.ref_count)
    }

    /// Vacate the slot: bumps its generation, drops the name mapping and
    /// returns the index to the free list. Stale handles are ignored.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<SlotResource<T>> {
        let slot = self.live_slot_mut(handle)?;
        let resource = slot.resource.take();
        slot.generation = slot.generation.wrapping_add(1);
        slot.ref_count = 0;
        let name = slot.name.take();

        if let Some(name) = name {
            if self.names.get(&name) == Some(&handle) {
                self.names.remove(&name);
            }
        }
        self.free.push(handle.index);
        self.live -= 1;
        log::trace!("Storage remove {:?}", handle);
        resource
    }

    pub fn get_by_name(&self, name: &str) -> Option<Handle<T>> {
        self.names.get(name).copied().filter(|h| self.contains(*h))
    }

    pub fn name_of(&self, handle: Handle<T>) -> Option<&str> {
        self.live_slot(handle)?.name.as_deref()
    }

    /// Reverse lookup by resource identity. Linear scan; meant for
    /// diagnostics, not hot paths.
    pub fn find_handle(&self, resource: &T) -> Option<Handle<T>> {
        self.slots.iter().enumerate().find_map(|(index, slot)| {
            let held = slot.resource.as_ref()?.get();
            std::ptr::eq(held, resource).then(|| Handle::new(index as u32, slot.generation))
        })
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.resource
                .as_ref()
                .map(|r| (Handle::new(index as u32, slot.generation), r.get()))
        })
    }

    /// Remove every live resource. Outstanding handles all become stale.
    pub fn clear(&mut self) {
        let live: Vec<Handle<T>> = self.iter().map(|(h, _)| h).collect();
        for handle in live {
            self.remove(handle);
        }
    }
}

impl<T> fmt::Debug for Storage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .field("free", &self.free.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_after_reuse() {
        let mut storage = Storage::new();
        let first = storage.insert(10u32, None).unwrap();
        assert!(storage.release(first));
        assert!(storage.remove(first).is_some());

        let second = storage.insert(20u32, None).unwrap();
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());
        assert_eq!(storage.get(first), None);
        assert_eq!(storage.get(second), Some(&20));
    }

    #[test]
    fn release_reports_zero_once() {
        let mut storage = Storage::new();
        let h = storage.insert("mesh", None).unwrap();
        assert!(storage.add_ref(h));
        assert!(storage.add_ref(h));
        assert!(!storage.release(h));
        assert!(!storage.release(h));
        assert!(storage.release(h));
        assert!(!storage.release(h));
        // Release does not remove.
        assert!(storage.contains(h));
    }

    #[test]
    fn free_list_is_lifo() {
        let mut storage = Storage::new();
        let a = storage.insert(1, None).unwrap();
        let b = storage.insert(2, None).unwrap();
        storage.remove(a);
        storage.remove(b);
        let c = storage.insert(3, None).unwrap();
        assert_eq!(c.index(), b.index());
        let d = storage.insert(4, None).unwrap();
        assert_eq!(d.index(), a.index());
    }

    #[test]
    fn names_follow_insert_and_remove() {
        let mut storage = Storage::new();
        let h = storage.insert(1.5f32, Some("albedo")).unwrap();
        assert_eq!(storage.get_by_name("albedo"), Some(h));
        assert_eq!(storage.name_of(h), Some("albedo"));
        storage.remove(h);
        assert_eq!(storage.get_by_name("albedo"), None);

        let again = storage.insert(2.5f32, Some("albedo")).unwrap();
        assert_eq!(storage.get_by_name("albedo"), Some(again));
    }

    #[test]
    fn renaming_moves_the_name() {
        let mut storage = Storage::new();
        let old = storage.insert(1, Some("x")).unwrap();
        let new = storage.insert(2, Some("x")).unwrap();
        assert_eq!(storage.get_by_name("x"), Some(new));
        assert_eq!(storage.name_of(old), None);
        storage.remove(old);
        assert_eq!(storage.get_by_name("x"), Some(new));
    }

    #[test]
    fn shared_slots_do_not_own() {
        let shared = Arc::new(String::from("external"));
        let mut storage = Storage::new();
        let h = storage.insert_shared(shared.clone(), None).unwrap();
        assert_eq!(storage.is_owned(h), Some(false));
        assert!(storage.get_mut(h).is_none());
        assert_eq!(Arc::strong_count(&shared), 2);

        let removed = storage.remove(h).unwrap();
        drop(removed);
        assert_eq!(Arc::strong_count(&shared), 1);
        assert_eq!(shared.as_str(), "external");
    }

    #[test]
    fn find_handle_by_identity() {
        let mut storage = Storage::new();
        let _a = storage.insert(7, None).unwrap();
        let b = storage.insert(7, None).unwrap();
        // Same value, different resource: identity picks `b`.
        let resource = storage.get(b).unwrap();
        assert_eq!(storage.find_handle(resource), Some(b));
        assert_eq!(storage.find_handle(&7), None);
    }

    #[test]
    fn invalid_handle_never_resolves() {
        let mut storage = Storage::<u8>::new();
        storage.insert(1, None).unwrap();
        let invalid = Handle::<u8>::INVALID;
        assert!(!invalid.is_valid());
        assert_eq!(storage.get(invalid), None);
        assert!(!storage.add_ref(invalid));
        assert!(!storage.release(invalid));
        assert!(storage.remove(invalid).is_none());
    }

    #[test]
    fn clear_invalidates_everything() {
        let mut storage = Storage::new();
        let handles: Vec<_> = (0..5).map(|i| storage.insert(i, None).unwrap()).collect();
        storage.clear();
        assert!(storage.is_empty());
        assert!(handles.iter().all(|h| storage.get(*h).is_none()));
    }
}
