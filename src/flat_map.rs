use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::failure::Result;
use crate::flat_table::FlatTable;

/// A hash map implemented on top of the Robin Hood [`FlatTable`].
///
/// `FlatMap<K, V, S>` stores key-value pairs where keys implement
/// `Hash + Eq` and uses a configurable hasher builder `S` to hash keys. The
/// pairs live in the table's contiguous slot array; the map's job is only to
/// tie the hasher and the key comparison together.
///
/// Inserting a key that is already present is a no-op that keeps the first
/// value, and there is no way to remove an entry; both follow from the
/// underlying table. Values can still be changed in place through
/// [`get_mut`](FlatMap::get_mut).
///
/// # Example
///
/// ```rust
/// # #[cfg(feature = "foldhash")] {
/// use robin_flat::DefaultHashBuilder;
/// use robin_flat::FlatMap;
///
/// let mut map: FlatMap<&str, i32, DefaultHashBuilder> = FlatMap::new();
/// assert!(map.insert("a", 1));
/// assert!(!map.insert("a", 99));
/// assert_eq!(map.get(&"a"), Some(&1));
/// # }
/// ```
#[derive(Clone)]
pub struct FlatMap<K, V, S> {
    table: FlatTable<(K, V)>,
    hash_builder: S,
}

impl<K, V, S> Debug for FlatMap<K, V, S>
where
    K: Debug + Hash + Eq,
    V: Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.iter() {
            map.entry(k, v);
        }
        map.finish()
    }
}

impl<K, V, S> FlatMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a new map with the given hasher builder and the default
    /// capacity.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: FlatTable::new(),
            hash_builder,
        }
    }

    /// Creates a new map with at least `capacity` slots and the given hasher
    /// builder.
    ///
    /// The capacity is rounded up to a power of two by the underlying table.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: FlatTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of slots in the backing array.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes all entries, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Inserts a key-value pair unless the key is already present.
    ///
    /// Returns `true` if the pair was inserted. If the key already existed,
    /// returns `false` and the map is untouched: the first value stays in
    /// place and the given `key` and `value` are dropped.
    ///
    /// # Panics
    ///
    /// Panics if growing the underlying table fails. Use
    /// [`try_insert`](FlatMap::try_insert) to handle allocation failure
    /// instead.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(feature = "foldhash")] {
    /// # use robin_flat::DefaultHashBuilder;
    /// # use robin_flat::FlatMap;
    /// #
    /// let mut map: FlatMap<i32, &str, DefaultHashBuilder> = FlatMap::new();
    /// assert!(map.insert(37, "a"));
    /// assert!(!map.insert(37, "b"));
    /// assert_eq!(map.get(&37), Some(&"a"));
    /// # }
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let hash = self.hash_builder.hash_one(&key);
        let (_, inserted) = self.table.insert(hash, |a, b| a.0 == b.0, (key, value));
        inserted
    }

    /// Fallible version of [`insert`](FlatMap::insert).
    pub fn try_insert(&mut self, key: K, value: V) -> Result<bool> {
        let hash = self.hash_builder.hash_one(&key);
        let (_, inserted) = self.table.try_insert(hash, |a, b| a.0 == b.0, (key, value))?;
        Ok(inserted)
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(feature = "foldhash")] {
    /// # use robin_flat::DefaultHashBuilder;
    /// # use robin_flat::FlatMap;
    /// #
    /// let mut map: FlatMap<i32, &str, DefaultHashBuilder> = FlatMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.get(&1), Some(&"a"));
    /// assert_eq!(map.get(&2), None);
    /// # }
    /// ```
    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find_value(hash, |(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns a mutable reference to the value corresponding to the key.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find_value_mut(hash, |(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns `true` if the map contains a value for the given key.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns an iterator over the key-value pairs of the map.
    ///
    /// The iterator yields `(&K, &V)` pairs in slot order, which is
    /// arbitrary and reshuffled whenever the map grows.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the keys of the map.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values of the map.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }
}

impl<K, V, S> FlatMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates a new map using the default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a new map with at least `capacity` slots using the default
    /// hasher builder.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S> Default for FlatMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

/// An iterator over the key-value pairs of a [`FlatMap`].
pub struct Iter<'a, K, V> {
    inner: crate::flat_table::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k, v))
    }
}

/// An iterator over the keys of a [`FlatMap`].
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }
}

/// An iterator over the values of a [`FlatMap`].
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use core::hash::BuildHasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone)]
    struct SipHashBuilder {
        k1: u64,
        k2: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k1, self.k2)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k1: rng.try_next_u64().unwrap_or(0),
                k2: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    #[test]
    fn test_new_and_with_hasher() {
        let map: FlatMap<i32, String, SipHashBuilder> = FlatMap::new();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);

        let map2 = FlatMap::<i32, String, _>::with_hasher(SipHashBuilder::default());
        assert!(map2.is_empty());
        assert_eq!(map2.len(), 0);
    }

    #[test]
    fn test_with_capacity() {
        let map: FlatMap<i32, String, SipHashBuilder> = FlatMap::with_capacity(100);
        assert!(map.capacity() >= 100);
        assert!(map.is_empty());

        let map2 =
            FlatMap::<i32, String, _>::with_capacity_and_hasher(200, SipHashBuilder::default());
        assert!(map2.capacity() >= 200);
        assert!(map2.is_empty());
    }

    #[test]
    fn test_insert_and_get() {
        let mut map = FlatMap::with_hasher(SipHashBuilder::default());

        assert!(map.insert(1, "hello".to_string()));
        assert_eq!(map.len(), 1);
        assert!(!map.is_empty());

        assert_eq!(map.get(&1), Some(&"hello".to_string()));
        assert_eq!(map.get(&2), None);

        // Duplicate insert keeps the first value.
        assert!(!map.insert(1, "world".to_string()));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(&"hello".to_string()));
    }

    #[test]
    fn test_first_value_retained() {
        let mut map = FlatMap::with_hasher(SipHashBuilder::default());
        map.insert("a".to_string(), 1);
        map.insert("b".to_string(), 2);
        map.insert("a".to_string(), 99);

        assert_eq!(map.get(&"a".to_string()), Some(&1));
        assert_eq!(map.get(&"b".to_string()), Some(&2));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_get_mut() {
        let mut map = FlatMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "hello".to_string());

        if let Some(value) = map.get_mut(&1) {
            value.push_str(" world");
        }

        assert_eq!(map.get(&1), Some(&"hello world".to_string()));
        assert_eq!(map.get_mut(&2), None);
    }

    #[test]
    fn test_contains_key() {
        let mut map = FlatMap::with_hasher(SipHashBuilder::default());
        assert!(!map.contains_key(&1));

        map.insert(1, "value".to_string());
        assert!(map.contains_key(&1));
        assert!(!map.contains_key(&2));
    }

    #[test]
    fn test_try_insert() {
        let mut map = FlatMap::with_hasher(SipHashBuilder::default());
        assert_eq!(map.try_insert(1, "one".to_string()), Ok(true));
        assert_eq!(map.try_insert(1, "uno".to_string()), Ok(false));
        assert_eq!(map.get(&1), Some(&"one".to_string()));
    }

    #[test]
    fn test_clear() {
        let mut map = FlatMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "hello".to_string());
        map.insert(2, "world".to_string());

        assert_eq!(map.len(), 2);
        map.clear();
        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
        assert!(!map.contains_key(&1));
        assert!(!map.contains_key(&2));
    }

    #[test]
    fn test_iterators() {
        let mut map = FlatMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "one".to_string());
        map.insert(2, "two".to_string());
        map.insert(3, "three".to_string());

        let pairs: std::collections::HashMap<i32, String> =
            map.iter().map(|(k, v)| (*k, v.clone())).collect();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs.get(&1), Some(&"one".to_string()));
        assert_eq!(pairs.get(&2), Some(&"two".to_string()));
        assert_eq!(pairs.get(&3), Some(&"three".to_string()));

        let keys: std::collections::HashSet<i32> = map.keys().copied().collect();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&1));
        assert!(keys.contains(&2));
        assert!(keys.contains(&3));

        let values: std::collections::HashSet<String> = map.values().cloned().collect();
        assert_eq!(values.len(), 3);
        assert!(values.contains("one"));
        assert!(values.contains("two"));
        assert!(values.contains("three"));
    }

    #[test]
    fn test_multiple_insertions() {
        let mut map = FlatMap::with_hasher(SipHashBuilder::default());

        for i in 0..1000 {
            assert!(map.insert(i, i * 2));
        }

        assert_eq!(map.len(), 1000);

        for i in 0..1000 {
            assert_eq!(map.get(&i), Some(&(i * 2)));
        }
    }

    #[test]
    fn test_growth_scenario() {
        let mut map = FlatMap::<u64, u64, _>::with_capacity_and_hasher(
            16,
            SipHashBuilder::default(),
        );
        assert_eq!(map.capacity(), 16);

        for k in 0..100u64 {
            map.insert(k, k);
        }

        assert_eq!(map.len(), 100);
        assert!(map.capacity() >= 128);
        for k in 0..100u64 {
            assert_eq!(map.get(&k), Some(&k));
        }
    }

    #[test]
    fn test_string_keys() {
        let mut map = FlatMap::with_hasher(SipHashBuilder::default());

        map.insert("hello".to_string(), 1);
        map.insert("world".to_string(), 2);
        map.insert("rust".to_string(), 3);

        assert_eq!(map.get(&"hello".to_string()), Some(&1));
        assert_eq!(map.get(&"world".to_string()), Some(&2));
        assert_eq!(map.get(&"rust".to_string()), Some(&3));
        assert_eq!(map.get(&"missing".to_string()), None);
    }

    #[test]
    fn test_default_trait() {
        let map: FlatMap<i32, String, SipHashBuilder> = FlatMap::default();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_complex_values() {
        let mut map = FlatMap::with_hasher(SipHashBuilder::default());

        let vec1 = alloc::vec![1, 2, 3];
        let vec2 = alloc::vec![4, 5, 6];

        map.insert("first".to_string(), vec1.clone());
        map.insert("second".to_string(), vec2.clone());

        assert_eq!(map.get(&"first".to_string()), Some(&vec1));
        assert_eq!(map.get(&"second".to_string()), Some(&vec2));

        if let Some(v) = map.get_mut(&"first".to_string()) {
            v.push(4);
        }

        assert_eq!(map.get(&"first".to_string()), Some(&alloc::vec![1, 2, 3, 4]));
    }

    #[cfg(feature = "foldhash")]
    #[test]
    fn test_default_hash_builder() {
        let mut map: FlatMap<u32, u32, crate::DefaultHashBuilder> = FlatMap::new();
        for i in 0..100u32 {
            map.insert(i, i + 1);
        }
        assert_eq!(map.len(), 100);
        for i in 0..100u32 {
            assert_eq!(map.get(&i), Some(&(i + 1)));
        }
    }
}
