// The hash engine: group probing, tombstone policy, load-factor driven
// grow/shrink, in-place rehash, and bidirectional iteration over the `Data`
// storage adapter. This is the part that actually decides what Empty,
// Deleted and Valid mean — `Data` just stores bytes where told.

use crate::data::Data;
use crate::error::{GroupHashError, Result};
use crate::meta::{h1, h2, is_free, is_valid, DELETED, EMPTY, GROUP_SIZE};
use crate::simd;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};

/// An opaque position in the table, returned by `find`/`begin`/`end` and
/// consumed by `erase`. Cheap to copy; stays valid only until the next
/// mutation that may rehash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor(usize);

/// Group-probed, SIMD-accelerated open-addressing hash table with
/// multi-valued keys: the same key may appear more than once, each
/// occurrence holding its own value.
///
/// Generic over the hasher the same way `std::collections::HashMap` is: `S`
/// defaults to `RandomState` (SipHash), but any `BuildHasher` works.
pub struct GroupHash<K, V, S = RandomState> {
    data: Data<K, V>,
    count: usize,
    hash_builder: S,
}

impl<K, V> GroupHash<K, V, RandomState> {
    /// Empty table, capacity 16.
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    /// Empty table sized to hold at least `capacity` entries without
    /// growing (rounded up to a power of two, minimum 16).
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }
}

impl<K, V> Default for GroupHash<K, V, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq, V> GroupHash<K, V, RandomState> {
    /// Bulk insert, preserving duplicates: a key appearing more than once in
    /// `pairs` produces that many entries, not an overwrite.
    pub fn from_pairs<I: IntoIterator<Item = (K, V)>>(pairs: I) -> Self {
        let mut table = Self::new();
        for (key, value) in pairs {
            table.insert(key, value);
        }
        table
    }
}

impl<K: Hash + Eq, V> FromIterator<(K, V)> for GroupHash<K, V, RandomState> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl<K, V, S: BuildHasher> GroupHash<K, V, S> {
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(GROUP_SIZE, hash_builder)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        let capacity = capacity.max(GROUP_SIZE).next_power_of_two();
        Self {
            data: Data::new(capacity, capacity + GROUP_SIZE, EMPTY),
            count: 0,
            hash_builder,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.data_size()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    fn max_count(&self) -> usize {
        self.capacity() * 15 / 16
    }

    #[inline]
    fn min_count(&self) -> usize {
        self.capacity() * 7 / 16
    }

    fn hash_of(&self, key: &K) -> u64
    where
        K: Hash,
    {
        let mut hasher = self.hash_builder.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }

    /// A 16-byte owned copy of the meta window starting at `index` (wrapping
    /// via the mirror tail is never needed here because `Data`'s mirror
    /// already makes every such window contiguous).
    #[inline]
    fn window(&self, index: usize) -> [u8; 16] {
        let mut window = [0u8; 16];
        window.copy_from_slice(self.data.meta_data(index, GROUP_SIZE));
        window
    }

    /// True iff the group starting at `index` holds no Empty byte — i.e. a
    /// probe chain passing through it cannot stop here.
    #[inline]
    fn group_is_full(&self, index: usize) -> bool {
        simd::match_byte(EMPTY, &self.window(index)).none()
    }

    #[inline]
    fn next_group_index(&self, index: usize) -> usize {
        (index + GROUP_SIZE) % self.capacity()
    }

    /// Write a meta byte, mirroring into the tail copy when `index` falls in
    /// the first group.
    fn set_meta_value(&mut self, index: usize, value: u8) {
        self.data.set_meta_value(index, value);
        if index < GROUP_SIZE {
            let mirror = self.data.data_size() + index;
            self.data.set_meta_value(mirror, value);
        }
    }

    /// Read the meta byte at `index`, mark it Empty, and return the value it
    /// held. Used when relocating a live entry during rehash.
    fn take_meta_value(&mut self, index: usize) -> u8 {
        let value = self.data.meta_data(index, 1)[0];
        self.set_meta_value(index, EMPTY);
        value
    }

    /// Walk the probe chain from `index` for fingerprint `fp`, calling
    /// `accept` on every slot whose meta byte matches. Stops at the first
    /// group containing an Empty byte.
    fn probe(&self, mut index: usize, fp: u8, mut accept: impl FnMut(usize) -> bool) -> bool {
        loop {
            let window = self.window(index);
            for bit in simd::match_byte(fp, &window) {
                let slot = (index + bit as usize) % self.capacity();
                if accept(slot) {
                    return true;
                }
            }
            if !self.group_is_full(index) {
                return false;
            }
            index = self.next_group_index(index);
        }
    }

    fn find_index_by(&self, index: usize, fp: u8, compare: impl Fn(usize) -> bool) -> usize {
        let mut found = self.capacity();
        self.probe(index, fp, |slot| {
            if compare(slot) {
                found = slot;
                true
            } else {
                false
            }
        });
        found
    }

    fn find_all_by(&self, index: usize, fp: u8, compare: impl Fn(usize) -> bool) -> Vec<usize> {
        let mut hits = Vec::new();
        self.probe(index, fp, |slot| {
            if compare(slot) {
                hits.push(slot);
            }
            false
        });
        hits
    }

    /// Slot selection for insert: the first Empty-or-Deleted slot on the
    /// probe chain from `index`. Always terminates because the grow policy
    /// guarantees an Empty byte exists somewhere.
    fn find_empty(&self, mut index: usize) -> usize {
        loop {
            let window = self.window(index);
            let free = simd::match_byte(EMPTY, &window).union(simd::match_byte(DELETED, &window));
            if let Some(bit) = free.lowest_set_bit() {
                return (index + bit as usize) % self.capacity();
            }
            index = self.next_group_index(index);
        }
    }

    fn find_index(&self, key: &K) -> usize
    where
        K: Eq,
    {
        let hash = self.hash_of(key);
        self.find_index_by(h1(hash, self.capacity()), h2(hash), |slot| {
            self.data.key(slot) == key
        })
    }

    fn find_index_kv(&self, key: &K, value: &V) -> usize
    where
        K: Eq,
        V: Eq,
    {
        let hash = self.hash_of(key);
        self.find_index_by(h1(hash, self.capacity()), h2(hash), |slot| {
            self.data.key(slot) == key && self.data.value(slot) == value
        })
    }

    fn find_all(&self, key: &K) -> Vec<usize>
    where
        K: Eq,
    {
        let hash = self.hash_of(key);
        self.find_all_by(h1(hash, self.capacity()), h2(hash), |slot| {
            self.data.key(slot) == key
        })
    }

    fn find_all_kv(&self, key: &K, value: &V) -> Vec<usize>
    where
        K: Eq,
        V: Eq,
    {
        let hash = self.hash_of(key);
        self.find_all_by(h1(hash, self.capacity()), h2(hash), |slot| {
            self.data.key(slot) == key && self.data.value(slot) == value
        })
    }

    /// A handle to any entry with key `key`, or an end-cursor if none.
    pub fn find(&self, key: &K) -> Cursor
    where
        K: Eq,
    {
        Cursor(self.find_index(key))
    }

    /// A handle to any entry with key `key` and value `value`.
    pub fn find_value(&self, key: &K, value: &V) -> Cursor
    where
        K: Eq,
        V: Eq,
    {
        Cursor(self.find_index_kv(key, value))
    }

    pub fn contains(&self, key: &K) -> bool
    where
        K: Eq,
    {
        self.find_index(key) != self.capacity()
    }

    pub fn contains_value(&self, key: &K, value: &V) -> bool
    where
        K: Eq,
        V: Eq,
    {
        self.find_index_kv(key, value) != self.capacity()
    }

    /// Number of entries with key `key`.
    pub fn count(&self, key: &K) -> usize
    where
        K: Eq,
    {
        self.find_all(key).len()
    }

    /// Number of entries with key `key` and value `value`.
    pub fn count_value(&self, key: &K, value: &V) -> usize
    where
        K: Eq,
        V: Eq,
    {
        self.find_all_kv(key, value).len()
    }

    /// Some value for `key`, or `default` if absent. Which value, when more
    /// than one exists, is unspecified.
    pub fn value(&self, key: &K, default: V) -> V
    where
        K: Eq,
        V: Clone,
    {
        let pos = self.find_index(key);
        if pos != self.capacity() {
            self.data.value(pos).clone()
        } else {
            default
        }
    }

    /// All values for `key`, order unspecified.
    pub fn values(&self, key: &K) -> Vec<V>
    where
        K: Eq,
        V: Clone,
    {
        self.find_all(key)
            .into_iter()
            .map(|pos| self.data.value(pos).clone())
            .collect()
    }

    /// Value for `key`, or `V::default()` if absent. The read-only half of
    /// the assignable-reference accessor.
    pub fn get_or_default(&self, key: &K) -> V
    where
        K: Eq,
        V: Clone + Default,
    {
        let pos = self.find_index(key);
        if pos != self.capacity() {
            self.data.value(pos).clone()
        } else {
            V::default()
        }
    }

    /// Overwrites the value of one slot whose key is `key`; no-op if
    /// absent.
    pub fn replace(&mut self, key: &K, new_value: V)
    where
        K: Eq,
    {
        let pos = self.find_index(key);
        if pos != self.capacity() {
            self.data.set_value(pos, new_value);
        }
    }

    /// Overwrites the value of one slot whose key is `key` and whose value
    /// is `old_value`; no-op if no such slot exists.
    pub fn replace_with_old(&mut self, key: &K, old_value: &V, new_value: V)
    where
        K: Eq,
        V: Eq,
    {
        let pos = self.find_index_kv(key, old_value);
        if pos != self.capacity() {
            self.data.set_value(pos, new_value);
        }
    }

    /// Always inserts a new entry, even if `key` is already present. Returns
    /// a cursor to the inserted slot. May trigger grow.
    pub fn insert(&mut self, key: K, value: V) -> Cursor
    where
        K: Eq,
    {
        // Checked against the count *before* this entry is added, so growth
        // fires once the table is about to reach capacity*15/16, not one
        // insert early.
        self.rehash_if_needed();
        let hash = self.hash_of(&key);
        let index = self.find_empty(h1(hash, self.capacity()));
        self.set_meta_value(index, h2(hash));
        self.data.set_data(index, key, value);
        self.count += 1;
        Cursor(index)
    }

    /// Value for `key`, inserting `(key, V::default())` first if absent.
    /// The mutable half of the assignable-reference accessor; may trigger
    /// grow.
    pub fn get_or_insert_with_default(&mut self, key: K) -> &mut V
    where
        K: Eq,
        V: Default,
    {
        let existing = self.find_index(&key);
        let pos = if existing != self.capacity() {
            existing
        } else {
            self.insert(key, V::default()).0
        };
        self.data.value_mut(pos)
    }

    /// Removes the entry at `cursor`, marking its slot Deleted or Empty per
    /// the erase rule, and returns the next valid cursor. Does not trigger
    /// shrink — the caller may be mid-iteration.
    pub fn erase(&mut self, cursor: Cursor) -> Cursor {
        self.erase_at(cursor.0);
        Cursor(self.find_next(Some(cursor.0)))
    }

    fn erase_at(&mut self, index: usize) {
        let meta = self.delete_meta_value(index);
        self.data.drop_pair(index);
        self.set_meta_value(index, meta);
        self.count -= 1;
    }

    /// Empty if the group starting at the erased slot still holds an Empty
    /// byte (so a probe chain through it can still stop); Deleted otherwise,
    /// so chains that would have continued past a still-live entry keep
    /// going.
    fn delete_meta_value(&self, index: usize) -> u8 {
        if simd::match_byte(EMPTY, &self.window(index)).any() {
            EMPTY
        } else {
            DELETED
        }
    }

    /// Removes all entries with key `key`. Triggers at most one rehash
    /// after the batch.
    pub fn remove(&mut self, key: &K) -> usize
    where
        K: Eq,
    {
        let positions = self.find_all(key);
        let removed = positions.len();
        for pos in positions {
            self.erase_at(pos);
        }
        if removed > 0 {
            self.rehash_if_needed();
        }
        removed
    }

    /// Removes all entries with key `key` and value `value`.
    pub fn remove_value(&mut self, key: &K, value: &V) -> usize
    where
        K: Eq,
        V: Eq,
    {
        let positions = self.find_all_kv(key, value);
        let removed = positions.len();
        for pos in positions {
            self.erase_at(pos);
        }
        if removed > 0 {
            self.rehash_if_needed();
        }
        removed
    }

    /// Resets to the initial empty state (capacity 16).
    pub fn clear(&mut self) {
        self.data = Data::new(GROUP_SIZE, GROUP_SIZE * 2, EMPTY);
        self.count = 0;
    }

    fn find_next(&self, from: Option<usize>) -> usize {
        let mut index = from.map_or(0, |i| i + 1);
        while index < self.capacity() {
            if is_valid(self.data.meta_data(index, 1)[0]) {
                return index;
            }
            index += 1;
        }
        self.capacity()
    }

    fn find_previous(&self, from: usize) -> usize {
        let mut index = from;
        while index > 0 {
            index -= 1;
            if is_valid(self.data.meta_data(index, 1)[0]) {
                return index;
            }
        }
        self.capacity()
    }

    /// First Valid slot, scanning from index 0.
    pub fn begin(&self) -> Cursor {
        Cursor(self.find_next(None))
    }

    /// One-past-the-last cursor; never a Valid slot.
    pub fn end(&self) -> Cursor {
        Cursor(self.capacity())
    }

    pub fn cbegin(&self) -> Cursor {
        self.begin()
    }

    pub fn cend(&self) -> Cursor {
        self.end()
    }

    /// Advances `cursor` to the next Valid slot.
    pub fn advance(&self, cursor: Cursor) -> Cursor {
        Cursor(self.find_next(Some(cursor.0)))
    }

    /// Retreats `cursor` to the previous Valid slot. Calling this on
    /// `begin()` is a contract violation, same as decrementing a C++
    /// begin-iterator; this implementation returns `end()` rather than
    /// wrapping.
    pub fn retreat(&self, cursor: Cursor) -> Cursor {
        Cursor(self.find_previous(cursor.0))
    }

    /// Borrow the key and value at `cursor`. `None` for `end()` or any
    /// cursor pointing at a non-Valid slot.
    pub fn get(&self, cursor: Cursor) -> Option<(&K, &V)> {
        if cursor.0 < self.capacity() && is_valid(self.data.meta_data(cursor.0, 1)[0]) {
            Some((self.data.key(cursor.0), self.data.value(cursor.0)))
        } else {
            None
        }
    }

    /// Bidirectional iteration over Valid slots in ascending slot-index
    /// order. Not stable across any mutation that may rehash.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        Iter {
            table: self,
            front: 0,
            back: self.capacity(),
        }
    }

    fn rehash_if_needed(&mut self) {
        if self.count >= self.max_count() {
            let old = self.capacity();
            let new_size = old * 2;
            tracing::trace!(old_capacity = old, new_capacity = new_size, "grouphash: growing");
            self.rehash_to(new_size);
        } else if self.count < self.min_count() {
            let old = self.capacity();
            let new_size = old / 2;
            tracing::trace!(old_capacity = old, new_capacity = new_size, "grouphash: shrinking");
            self.rehash_to(new_size);
        }
    }

    fn rehash_to(&mut self, new_size: usize)
    where
        K: Eq,
    {
        if new_size >= GROUP_SIZE {
            let old_size = self.capacity();
            self.rehash(old_size, new_size);
        }
    }

    fn rehash(&mut self, old_size: usize, new_size: usize)
    where
        K: Eq,
    {
        if new_size > old_size {
            self.resize_storage(new_size);
        }
        for index in 0..old_size {
            self.rehash_index(index, new_size);
        }
        if new_size < old_size {
            self.resize_storage(new_size);
        }
    }

    fn rehash_index(&mut self, index: usize, new_size: usize)
    where
        K: Eq,
    {
        let meta = self.data.meta_data(index, 1)[0];
        if meta == DELETED {
            self.set_meta_value(index, EMPTY);
        } else if is_valid(meta) {
            self.reinsert(index, new_size);
        }
    }

    /// If `index`'s entry already belongs at its new-size home, leaves it in
    /// place; otherwise relocates it via [`GroupHash::reinsert_to`]. Returns
    /// the entry's final index under `new_size`.
    fn reinsert(&mut self, index: usize, new_size: usize) -> usize
    where
        K: Eq,
    {
        let hash = self.hash_of(self.data.key(index));
        let new_pos = h1(hash, new_size);
        if new_pos == index {
            index
        } else {
            self.reinsert_to(index, new_pos, new_size)
        }
    }

    fn reinsert_to(&mut self, index: usize, new_index: usize, new_size: usize) -> usize
    where
        K: Eq,
    {
        let meta = self.take_meta_value(index);
        let (key, value) = self.data.take_pair(index);
        let dest = self.free_index(new_index, new_size);
        self.set_meta_value(dest, meta);
        self.data.set_data(dest, key, value);
        dest
    }

    /// Walks one slot at a time (not one group — rehash linear-probes,
    /// unlike the group-probed insert path) from `index` until it finds a
    /// free one, displacing occupants that don't already belong there under
    /// `new_size`.
    fn free_index(&mut self, mut index: usize, new_size: usize) -> usize
    where
        K: Eq,
    {
        loop {
            let meta = self.data.meta_data(index, 1)[0];
            if is_free(meta) {
                return index;
            }
            if self.reinsert(index, new_size) != index {
                return index;
            }
            index = (index + 1) % new_size;
        }
    }

    /// Grows or shrinks the backing storage to `new_size` and refreshes the
    /// mirror tail to match the (possibly just-rehashed) first group.
    fn resize_storage(&mut self, new_size: usize) {
        let old_size = self.data.data_size();
        if new_size > old_size {
            // `Data::resize` only initializes genuinely new meta slots; the
            // region about to become the new primary slots [old_size,
            // old_size+GROUP_SIZE) currently holds the *mirror* of the first
            // group, which is stale once it becomes primary storage. Clear
            // it to Empty before the underlying keys/values are reallocated,
            // so `rehash_index` never mistakes a phantom slot for Valid.
            let clear = [EMPTY; GROUP_SIZE];
            self.data.set_meta_data(old_size, &clear);
        }
        self.data.resize(new_size, new_size + GROUP_SIZE, EMPTY);
        let mut first_group = [0u8; GROUP_SIZE];
        first_group.copy_from_slice(self.data.meta_data(0, GROUP_SIZE));
        self.data.set_meta_data(new_size, &first_group);
    }

    /// Reserves capacity for at least `additional` more entries, panicking
    /// on overflow. Infallible counterpart of [`GroupHash::try_reserve`].
    pub fn reserve(&mut self, additional: usize)
    where
        K: Eq,
    {
        self.try_reserve(additional)
            .expect("grouphash: capacity overflow in reserve");
    }

    /// Checked variant of [`GroupHash::reserve`]: computes the smallest
    /// power-of-two capacity satisfying the load factor for `count +
    /// additional` entries, and rehashes up to it if larger than the
    /// current capacity.
    pub fn try_reserve(&mut self, additional: usize) -> Result<()>
    where
        K: Eq,
    {
        let required = self
            .count
            .checked_add(additional)
            .ok_or(GroupHashError::CapacityOverflow)?;
        let mut new_size = self.capacity().max(GROUP_SIZE);
        while required >= new_size * 15 / 16 {
            new_size = new_size
                .checked_mul(2)
                .ok_or(GroupHashError::CapacityOverflow)?;
        }
        if new_size > self.capacity() {
            let old = self.capacity();
            tracing::trace!(old_capacity = old, new_capacity = new_size, "grouphash: reserve triggered rehash");
            self.rehash(old, new_size);
        }
        Ok(())
    }
}

/// Bidirectional iterator over `(&K, &V)` pairs in ascending slot-index
/// order, yielded by [`GroupHash::iter`].
pub struct Iter<'a, K, V, S> {
    table: &'a GroupHash<K, V, S>,
    front: usize,
    back: usize,
}

impl<'a, K, V, S> Iterator for Iter<'a, K, V, S> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.front < self.back {
            let index = self.front;
            self.front += 1;
            if is_valid(self.table.data.meta_data(index, 1)[0]) {
                return Some((self.table.data.key(index), self.table.data.value(index)));
            }
        }
        None
    }
}

impl<'a, K, V, S> DoubleEndedIterator for Iter<'a, K, V, S> {
    fn next_back(&mut self) -> Option<Self::Item> {
        while self.back > self.front {
            self.back -= 1;
            let index = self.back;
            if is_valid(self.table.data.meta_data(index, 1)[0]) {
                return Some((self.table.data.key(index), self.table.data.value(index)));
            }
        }
        None
    }
}

impl<'a, K, V, S> IntoIterator for &'a GroupHash<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
