use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::failure::Failure;
use crate::failure::Result;

/// Capacity of a table created by [`FlatTable::new`].
pub const DEFAULT_CAPACITY: usize = 32;

/// Largest population accepted at `capacity` before the table doubles, a
/// load factor of 0.8.
#[inline(always)]
fn max_load(capacity: usize) -> usize {
    ((capacity as u128 * 4) / 5) as usize
}

/// Probe bound a freshly allocated slot array starts out with.
#[inline(always)]
fn initial_probe_limit(capacity: usize) -> u32 {
    (capacity / 4).min(u32::MAX as usize) as u32
}

/// A single storage slot. Key and value information exists only in the
/// `Full` variant, so the occupancy tag and the payload cannot disagree.
#[derive(Clone)]
enum Slot<V> {
    Empty,
    Full {
        /// Full hash of the stored entry, kept so growth can re-home the
        /// entry without re-invoking the caller's hasher.
        hash: u64,
        /// Number of slots past its ideal index this entry currently sits.
        distance: u32,
        value: V,
    },
}

/// Bookkeeping gathered while slots are written: the largest probe distance
/// produced and the occupied-index bounds touched.
struct PlacementStats {
    max_distance: u32,
    begin: usize,
    end: usize,
}

impl PlacementStats {
    fn new() -> Self {
        PlacementStats {
            max_distance: 0,
            begin: usize::MAX,
            end: 0,
        }
    }

    #[inline(always)]
    fn record(&mut self, index: usize, distance: u32) {
        self.max_distance = self.max_distance.max(distance);
        self.begin = self.begin.min(index);
        self.end = self.end.max(index + 1);
    }
}

/// Owner of the contiguous slot array. The array length is the table
/// capacity and is always a power of two, so the ideal index of a hash is
/// `hash & (len - 1)`.
#[derive(Clone)]
struct Storage<V> {
    slots: Box<[Slot<V>]>,
}

impl<V> Storage<V> {
    /// Allocates `capacity` slots, all empty. `capacity` must be a power of
    /// two.
    fn try_allocate(capacity: usize) -> Result<Self> {
        debug_assert!(capacity.is_power_of_two());
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| Failure::OutOfMemory)?;
        slots.resize_with(capacity, || Slot::Empty);
        Ok(Storage {
            slots: slots.into_boxed_slice(),
        })
    }

    #[inline(always)]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    /// Robin-Hood placement of an entry whose key is known to be absent.
    ///
    /// Walks forward from `index` carrying `(hash, value)` at `distance`,
    /// swapping with any incumbent that sits strictly closer to its own home
    /// than the carried entry, until an empty slot absorbs the final carried
    /// entry. Every written slot is recorded in `stats`. Returns the index
    /// the original entry landed at.
    ///
    /// Terminates because callers keep the load factor below 1.0, so an
    /// empty slot always exists ahead of the walk.
    fn place_from(
        &mut self,
        index: usize,
        distance: u32,
        hash: u64,
        value: V,
        stats: &mut PlacementStats,
    ) -> usize {
        let mask = self.mask();
        let mut index = index;
        let mut distance = distance;
        let mut hash = hash;
        let mut value = value;
        let mut landed = None;

        loop {
            match &mut self.slots[index] {
                slot @ Slot::Empty => {
                    *slot = Slot::Full {
                        hash,
                        distance,
                        value,
                    };
                    stats.record(index, distance);
                    return landed.unwrap_or(index);
                }
                Slot::Full {
                    hash: occupant_hash,
                    distance: occupant_distance,
                    value: occupant,
                } => {
                    // Ties keep the incumbent; only a strictly shorter
                    // occupant distance gives up the slot.
                    if *occupant_distance < distance {
                        core::mem::swap(occupant_hash, &mut hash);
                        core::mem::swap(occupant, &mut value);
                        let carried = core::mem::replace(occupant_distance, distance);
                        stats.record(index, distance);
                        distance = carried;
                        landed.get_or_insert(index);
                    }
                }
            }
            index = (index + 1) & mask;
            distance += 1;
        }
    }
}

/// Outcome of the read-only insert probe.
enum Probe {
    /// An equal entry already occupies this index.
    Existing(usize),
    /// First empty slot on the probe path.
    Vacant { index: usize, distance: u32 },
    /// The occupant here sits strictly closer to its home than the newcomer
    /// has traveled; the newcomer takes the slot and the occupant shifts on.
    Displace { index: usize, distance: u32 },
    /// The newcomer ran past the probe bound without resolution.
    Overflow,
}

/// A flat hash table using Robin Hood linear probing.
///
/// `FlatTable<V>` stores values of type `V` in one contiguous slot array and
/// leaves hashing and equality to the caller: every operation takes a
/// precomputed hash and an equality closure, and hands back raw slot
/// indices. Consistency between the hash and the equality closure across
/// calls is a caller obligation.
///
/// Collisions are resolved by scanning forward from the hash's ideal slot.
/// On the way in, an entry that has traveled farther from its ideal slot
/// than the incumbent takes the incumbent's place and the incumbent shifts
/// forward, which keeps probe-distance variance low across the table. A
/// probe that runs past the table's current probe-length bound forces the
/// capacity to double, as does an insert that would push the load factor
/// over 0.8.
///
/// Re-inserting an existing key is a no-op that reports the existing slot.
/// Deletion is not supported.
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use robin_flat::flat_table::FlatTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # fn hash_id(id: u64) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     id.hash(&mut hasher);
/// #     hasher.finish()
/// # }
/// #
/// let mut table: FlatTable<(u64, &str)> = FlatTable::new();
///
/// let (index, inserted) = table.insert(hash_id(7), |a, b| a.0 == b.0, (7, "seven"));
/// assert!(inserted);
/// assert_eq!(table.get(index), Some(&(7, "seven")));
///
/// // A second insert with the same key keeps the first value.
/// let (same, inserted) = table.insert(hash_id(7), |a, b| a.0 == b.0, (7, "VII"));
/// assert!(!inserted);
/// assert_eq!(same, index);
/// assert_eq!(table.get(index), Some(&(7, "seven")));
/// ```
#[derive(Clone)]
pub struct FlatTable<V> {
    storage: Storage<V>,
    len: usize,
    /// Current probe-length bound. Every full slot is reachable from its
    /// ideal index within this many steps; a probe running past it forces a
    /// resize.
    max_probe: u32,
    /// First occupied slot index, `usize::MAX` while the table is empty.
    begin: usize,
    /// One past the last occupied slot index, 0 while the table is empty.
    end: usize,
}

impl<V> Debug for FlatTable<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlatTable")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("max_probe", &self.max_probe)
            .field("occupied_range", &(self.begin..self.end))
            .finish()
    }
}

impl<V> FlatTable<V> {
    /// Creates an empty table with the default capacity of
    /// [`DEFAULT_CAPACITY`] slots.
    ///
    /// # Panics
    ///
    /// Panics if the slot array cannot be allocated. Use [`try_new`] to
    /// handle allocation failure instead.
    ///
    /// [`try_new`]: FlatTable::try_new
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Fallible version of [`new`](FlatTable::new).
    pub fn try_new() -> Result<Self> {
        Self::try_with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty table with at least `capacity` slots.
    ///
    /// The actual capacity is `capacity` rounded up to a power of two, so
    /// the ideal slot of a hash can be computed with a mask.
    ///
    /// # Panics
    ///
    /// Panics if the slot array cannot be allocated. Use
    /// [`try_with_capacity`] to handle allocation failure instead.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_flat::flat_table::FlatTable;
    /// #
    /// let table: FlatTable<u64> = FlatTable::with_capacity(100);
    /// assert_eq!(table.capacity(), 128);
    /// ```
    ///
    /// [`try_with_capacity`]: FlatTable::try_with_capacity
    pub fn with_capacity(capacity: usize) -> Self {
        match Self::try_with_capacity(capacity) {
            Ok(table) => table,
            Err(failure) => panic!("flat table allocation failed: {failure}"),
        }
    }

    /// Fallible version of [`with_capacity`](FlatTable::with_capacity).
    ///
    /// Returns [`Failure::CapacityOverflow`] if the rounded-up capacity
    /// cannot be represented and [`Failure::OutOfMemory`] if the allocator
    /// refuses the slot array.
    pub fn try_with_capacity(capacity: usize) -> Result<Self> {
        let capacity = capacity
            .max(1)
            .checked_next_power_of_two()
            .ok_or(Failure::CapacityOverflow)?;
        Ok(Self {
            storage: Storage::try_allocate(capacity)?,
            len: 0,
            max_probe: initial_probe_limit(capacity),
            begin: usize::MAX,
            end: 0,
        })
    }

    /// Returns the number of entries in the table.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of slots in the backing array.
    pub fn capacity(&self) -> usize {
        self.storage.slots.len()
    }

    #[inline(always)]
    fn mask(&self) -> usize {
        self.storage.mask()
    }

    /// Removes all entries, keeping the allocated capacity.
    pub fn clear(&mut self) {
        for slot in self.storage.slots.iter_mut() {
            *slot = Slot::Empty;
        }
        self.len = 0;
        self.max_probe = initial_probe_limit(self.capacity());
        self.begin = usize::MAX;
        self.end = 0;
    }

    /// Inserts `value` unless an equal entry is already present.
    ///
    /// `hash` must be the hash of `value`'s key and `eq` must report whether
    /// two stored values have equal keys; `eq` is called as
    /// `eq(&value, occupant)`.
    ///
    /// Returns the slot index the entry lives at and whether this call
    /// inserted it. If an equal entry already existed, nothing is mutated,
    /// the existing value stays in place, and the flag is `false`.
    ///
    /// # Panics
    ///
    /// Panics if growing the table fails. Use [`try_insert`] to handle
    /// allocation failure instead.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_flat::flat_table::FlatTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_id(id: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     id.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table: FlatTable<(u64, i32)> = FlatTable::new();
    /// let (index, inserted) = table.insert(hash_id(1), |a, b| a.0 == b.0, (1, 10));
    /// assert!(inserted);
    ///
    /// let (_, inserted) = table.insert(hash_id(1), |a, b| a.0 == b.0, (1, 99));
    /// assert!(!inserted);
    /// assert_eq!(table.get(index), Some(&(1, 10)));
    /// ```
    ///
    /// [`try_insert`]: FlatTable::try_insert
    pub fn insert(&mut self, hash: u64, eq: impl Fn(&V, &V) -> bool, value: V) -> (usize, bool) {
        match self.try_insert(hash, eq, value) {
            Ok(result) => result,
            Err(failure) => panic!("flat table growth failed: {failure}"),
        }
    }

    /// Fallible version of [`insert`](FlatTable::insert).
    ///
    /// Fails only if the table needed to grow and the new slot array could
    /// not be allocated; the table is left in its prior state in that case.
    pub fn try_insert(
        &mut self,
        hash: u64,
        eq: impl Fn(&V, &V) -> bool,
        value: V,
    ) -> Result<(usize, bool)> {
        // Pre-emptive growth: keeps the load factor at or below 0.8 after
        // the insert completes, independent of probe behavior.
        if self.len + 1 > max_load(self.capacity()) {
            self.grow_double()?;
        }

        let mut value = value;
        // Capacity doubles on every retry, so allocation failure surfaces
        // long before this budget runs out.
        for _ in 0..usize::BITS {
            match self.probe_insert(hash, &value, &eq) {
                Probe::Existing(index) => return Ok((index, false)),
                Probe::Vacant { index, distance } | Probe::Displace { index, distance } => {
                    let mut stats = PlacementStats::new();
                    let landed = self.storage.place_from(index, distance, hash, value, &mut stats);
                    debug_assert_eq!(landed, index);
                    self.len += 1;
                    self.begin = self.begin.min(stats.begin);
                    self.end = self.end.max(stats.end);
                    // A displacement chain may push an incumbent past the
                    // old bound; raise it so lookups still reach everything.
                    self.max_probe = self.max_probe.max(stats.max_distance);
                    return Ok((index, true));
                }
                Probe::Overflow => self.grow_double()?,
            }
        }
        unreachable!("insert retry budget exhausted");
    }

    /// Read-only probe deciding where an insert would act. Nothing is
    /// mutated, so an `Overflow` outcome can trigger a resize and a clean
    /// retry.
    fn probe_insert(&self, hash: u64, value: &V, eq: &impl Fn(&V, &V) -> bool) -> Probe {
        let mask = self.mask();
        let mut index = (hash as usize) & mask;
        let mut distance = 0u32;
        loop {
            if distance > self.max_probe {
                return Probe::Overflow;
            }
            match &self.storage.slots[index] {
                Slot::Empty => return Probe::Vacant { index, distance },
                Slot::Full {
                    hash: occupant_hash,
                    distance: occupant_distance,
                    value: occupant,
                } => {
                    if *occupant_hash == hash && eq(value, occupant) {
                        return Probe::Existing(index);
                    }
                    if *occupant_distance < distance {
                        return Probe::Displace { index, distance };
                    }
                }
            }
            index = (index + 1) & mask;
            distance += 1;
        }
    }

    /// Looks up the slot index of the entry matching `hash` and `eq`.
    ///
    /// Scans forward from the hash's ideal slot and gives up on the first
    /// empty slot or once the scan runs past the table's probe bound. Never
    /// mutates the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_flat::flat_table::FlatTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_id(id: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     id.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table: FlatTable<(u64, &str)> = FlatTable::new();
    /// table.insert(hash_id(3), |a, b| a.0 == b.0, (3, "three"));
    ///
    /// let index = table.find(hash_id(3), |v| v.0 == 3).unwrap();
    /// assert_eq!(table.get(index), Some(&(3, "three")));
    /// assert_eq!(table.find(hash_id(4), |v| v.0 == 4), None);
    /// ```
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        let mask = self.mask();
        let mut index = (hash as usize) & mask;
        for _ in 0..=self.max_probe {
            match &self.storage.slots[index] {
                Slot::Empty => return None,
                Slot::Full {
                    hash: occupant_hash,
                    value,
                    ..
                } => {
                    if *occupant_hash == hash && eq(value) {
                        return Some(index);
                    }
                }
            }
            index = (index + 1) & mask;
        }
        None
    }

    /// Returns a reference to the value at `index`, or `None` if the slot is
    /// empty.
    ///
    /// Indices come from [`insert`](FlatTable::insert) and
    /// [`find`](FlatTable::find); they are invalidated by any growth of the
    /// table.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below the capacity. Out-of-range indices are
    /// a caller bug, not a data condition.
    pub fn get(&self, index: usize) -> Option<&V> {
        match &self.storage.slots[index] {
            Slot::Full { value, .. } => Some(value),
            Slot::Empty => None,
        }
    }

    /// Mutable version of [`get`](FlatTable::get).
    pub fn get_mut(&mut self, index: usize) -> Option<&mut V> {
        match &mut self.storage.slots[index] {
            Slot::Full { value, .. } => Some(value),
            Slot::Empty => None,
        }
    }

    /// Looks up a reference to the value matching `hash` and `eq`.
    pub fn find_value(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        self.find(hash, eq).and_then(|index| self.get(index))
    }

    /// Looks up a mutable reference to the value matching `hash` and `eq`.
    pub fn find_value_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        let index = self.find(hash, eq)?;
        self.get_mut(index)
    }

    /// Returns a forward iterator over the occupied slots.
    ///
    /// The iterator walks the slot array in physical order within the
    /// occupied-index bounds and skips empty slots. The order has nothing to
    /// do with insertion order and is reshuffled by any growth of the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_flat::flat_table::FlatTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_id(id: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     id.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table: FlatTable<(u64, u64)> = FlatTable::new();
    /// for k in 0..10 {
    ///     table.insert(hash_id(k), |a, b| a.0 == b.0, (k, k * k));
    /// }
    /// assert_eq!(table.iter().count(), 10);
    /// ```
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            slots: &self.storage.slots,
            index: self.begin.min(self.end),
            end: self.end,
        }
    }

    /// Doubles the capacity, re-homing every live entry in the new array.
    fn grow_double(&mut self) -> Result<()> {
        let new_capacity = self
            .capacity()
            .checked_mul(2)
            .ok_or(Failure::CapacityOverflow)?;
        self.grow(new_capacity)
    }

    /// Moves every live entry into a freshly allocated array of
    /// `new_capacity` slots, visiting old slots once in physical order.
    ///
    /// The new array is fully allocated before any entry moves, so an
    /// allocation failure leaves the live table untouched.
    fn grow(&mut self, new_capacity: usize) -> Result<()> {
        debug_assert!(new_capacity.is_power_of_two());
        debug_assert!(new_capacity >= self.capacity());

        let mut next = Storage::try_allocate(new_capacity)?;
        let mut stats = PlacementStats::new();
        let mask = new_capacity - 1;
        for slot in self.storage.slots.iter_mut() {
            if let Slot::Full { hash, value, .. } = core::mem::replace(slot, Slot::Empty) {
                next.place_from((hash as usize) & mask, 0, hash, value, &mut stats);
            }
        }

        self.storage = next;
        self.max_probe = stats.max_distance.max(initial_probe_limit(new_capacity));
        if self.len == 0 {
            self.begin = usize::MAX;
            self.end = 0;
        } else {
            self.begin = stats.begin;
            self.end = stats.end;
        }
        Ok(())
    }

    /// Asserts every structural invariant of the table. Test-only.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let mask = self.mask();
        let mut full = 0;
        for (index, slot) in self.storage.slots.iter().enumerate() {
            if let Slot::Full { hash, distance, .. } = slot {
                full += 1;
                let home = (*hash as usize) & mask;
                let offset = (index.wrapping_sub(home) & mask) as u32;
                assert_eq!(offset, *distance, "stored distance disagrees with position");
                assert!(*distance <= self.max_probe, "entry beyond probe bound");
                assert!(self.begin <= index && index < self.end, "entry outside bounds");
            }
        }
        assert_eq!(full, self.len, "len disagrees with occupied slot count");
        assert!(
            self.len as u128 * 5 <= self.capacity() as u128 * 4,
            "load factor above 0.8"
        );
    }
}

impl<V> Default for FlatTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// A forward iterator over the occupied slots of a [`FlatTable`].
///
/// Created by [`FlatTable::iter`]; restart iteration by calling `iter`
/// again.
pub struct Iter<'a, V> {
    slots: &'a [Slot<V>],
    index: usize,
    end: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.end {
            let slot = &self.slots[self.index];
            self.index += 1;
            if let Slot::Full { value, .. } = slot {
                return Some(value);
            }
        }
        None
    }
}
