// Storage adapter: pair-and-metadata storage, with a mirror tail appended to
// the metadata region so every 16-byte group read is a single contiguous
// slice, never a wrap-handling branch.
//
// `Data` knows nothing about Empty/Deleted/Valid policy — that belongs to
// the engine (`crate::table`) — it only guarantees that reads and writes
// land where asked and that the mirror stays in sync. Keys and values live
// in `MaybeUninit` slots gated entirely by the meta byte the engine
// maintains in parallel, rather than paying for an `Option<(K, V)>` per
// slot.

use crate::meta::GROUP_SIZE;
use std::mem::MaybeUninit;

pub struct Data<K, V> {
    keys: Vec<MaybeUninit<K>>,
    values: Vec<MaybeUninit<V>>,
    meta: Vec<u8>,
}

impl<K, V> Data<K, V> {
    /// Allocate `data_size` pair slots and `meta_size` meta bytes, the
    /// latter initialized to `meta_init`. The engine always passes
    /// `meta_size = data_size + GROUP_SIZE`.
    pub fn new(data_size: usize, meta_size: usize, meta_init: u8) -> Self {
        let mut keys = Vec::with_capacity(data_size);
        let mut values = Vec::with_capacity(data_size);
        keys.resize_with(data_size, MaybeUninit::uninit);
        values.resize_with(data_size, MaybeUninit::uninit);
        Self {
            keys,
            values,
            meta: vec![meta_init; meta_size],
        }
    }

    #[inline]
    pub fn data_size(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn meta_size(&self) -> usize {
        self.meta.len()
    }

    /// Borrow the key at slot `i`.
    ///
    /// # Safety (caller contract, not `unsafe fn`)
    /// The caller (the engine) must only call this on a slot whose meta byte
    /// is currently Valid.
    #[inline]
    pub fn key(&self, i: usize) -> &K {
        unsafe { self.keys[i].assume_init_ref() }
    }

    /// Borrow the value at slot `i`. Same caller contract as [`Data::key`].
    #[inline]
    pub fn value(&self, i: usize) -> &V {
        unsafe { self.values[i].assume_init_ref() }
    }

    /// Mutably borrow the value at slot `i`. Same caller contract as
    /// [`Data::key`]; backs the assignable-reference accessor.
    #[inline]
    pub fn value_mut(&mut self, i: usize) -> &mut V {
        unsafe { self.values[i].assume_init_mut() }
    }

    /// Overwrite the pair at slot `i`, which must currently be free (Empty
    /// or Deleted from the engine's point of view) — no destructor runs for
    /// whatever bit pattern was there before.
    #[inline]
    pub fn set_data(&mut self, i: usize, key: K, value: V) {
        self.keys[i] = MaybeUninit::new(key);
        self.values[i] = MaybeUninit::new(value);
    }

    /// Overwrite the value at slot `i` only. The slot must currently be
    /// Valid: this runs `V`'s destructor on the old value via normal
    /// assignment.
    #[inline]
    pub fn set_value(&mut self, i: usize, value: V) {
        unsafe {
            *self.values[i].assume_init_mut() = value;
        }
    }

    /// Move the pair out of slot `i` without running destructors, leaving
    /// the slot's bit pattern meaningless until the engine overwrites the
    /// meta byte and, later, the data itself. Used by rehash to relocate a
    /// live entry to its new home.
    #[inline]
    pub fn take_pair(&mut self, i: usize) -> (K, V) {
        unsafe {
            let key = self.keys[i].assume_init_read();
            let value = self.values[i].assume_init_read();
            (key, value)
        }
    }

    /// Drop the pair at slot `i` in place. Used when an entry is truly
    /// erased (not relocated).
    #[inline]
    pub fn drop_pair(&mut self, i: usize) {
        unsafe {
            self.keys[i].assume_init_drop();
            self.values[i].assume_init_drop();
        }
    }

    /// Read-only view of `len` consecutive meta bytes starting at `i`. The
    /// engine uses `len == GROUP_SIZE` for group reads and `len == 1` for
    /// single-byte inspection.
    #[inline]
    pub fn meta_data(&self, i: usize, len: usize) -> &[u8] {
        &self.meta[i..i + len]
    }

    #[inline]
    pub fn set_meta_value(&mut self, i: usize, b: u8) {
        self.meta[i] = b;
    }

    #[inline]
    pub fn set_meta_data(&mut self, i: usize, bytes: &[u8]) {
        self.meta[i..i + bytes.len()].copy_from_slice(bytes);
    }

    /// Resize both arrays. New meta slots are initialized to `meta_init`.
    ///
    /// Shrinking is safe without engine cooperation: `MaybeUninit<T>`'s own
    /// `Drop` is a no-op, so truncating `keys`/`values` never leaks or
    /// double-frees regardless of what they held — it is the engine's job
    /// (via the rehash reinsert phase) to have already relocated or erased
    /// every slot the shrink is about to drop, and `Data` trusts that.
    pub fn resize(&mut self, data_size: usize, meta_size: usize, meta_init: u8) {
        self.keys.resize_with(data_size, MaybeUninit::uninit);
        self.values.resize_with(data_size, MaybeUninit::uninit);
        self.meta.resize(meta_size, meta_init);
    }
}

impl<K, V> Drop for Data<K, V> {
    fn drop(&mut self) {
        for i in 0..self.data_size() {
            if crate::meta::is_valid(self.meta[i]) {
                self.drop_pair(i);
            }
        }
    }
}
