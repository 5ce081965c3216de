//! Type-erased, totally ordered keys.
//!
//! `assoc` instances are addressed by the user's key type, which is only
//! known to the typed builder. [`Key`] erases it while keeping `Eq`, `Ord`
//! and `Hash`, so instance paths can live in ordinary maps.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Object-safe view of an ordered, hashable key.
pub trait KeyObject: Any + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn eq_key(&self, other: &dyn KeyObject) -> bool;
    fn cmp_key(&self, other: &dyn KeyObject) -> Ordering;
    fn hash_key(&self, state: &mut dyn Hasher);
}

impl<K> KeyObject for K
where
    K: Ord + Hash + fmt::Debug + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_key(&self, other: &dyn KeyObject) -> bool {
        other.as_any().downcast_ref::<K>() == Some(self)
    }

    fn cmp_key(&self, other: &dyn KeyObject) -> Ordering {
        match other.as_any().downcast_ref::<K>() {
            Some(other) => self.cmp(other),
            // Keys of different types never collide; order them by type.
            None => TypeId::of::<K>().cmp(&other.as_any().type_id()),
        }
    }

    fn hash_key(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<K>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// A cheaply cloneable erased key.
#[derive(Clone)]
pub struct Key(Rc<dyn KeyObject>);

impl Key {
    pub fn new<K>(key: K) -> Self
    where
        K: Ord + Hash + fmt::Debug + 'static,
    {
        Key(Rc::new(key))
    }

    /// Returns the key as `K` if that is its concrete type.
    pub fn downcast_ref<K: 'static>(&self) -> Option<&K> {
        self.0.as_any().downcast_ref::<K>()
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_key(other.0.as_ref())
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp_key(other.0.as_ref())
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash_key(state);
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashSet};

    #[test]
    fn keys_compare_by_value() {
        assert_eq!(Key::new(3_i32), Key::new(3_i32));
        assert_ne!(Key::new(3_i32), Key::new(4_i32));
        assert!(Key::new(3_i32) < Key::new(4_i32));
    }

    #[test]
    fn keys_of_different_types_are_unequal() {
        assert_ne!(Key::new(1_i32), Key::new(1_i64));
        assert_ne!(Key::new(1_i32).cmp(&Key::new(1_i64)), Ordering::Equal);
    }

    #[test]
    fn keys_work_in_hash_and_tree_sets() {
        let hashed: HashSet<Key> = [Key::new("a"), Key::new("b"), Key::new("a")]
            .into_iter()
            .collect();
        assert_eq!(hashed.len(), 2);

        let ordered: BTreeSet<Key> = [Key::new(3), Key::new(1), Key::new(2)]
            .into_iter()
            .collect();
        let values: Vec<i32> = ordered
            .iter()
            .map(|k| *k.downcast_ref::<i32>().unwrap())
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn display_uses_debug_of_inner_key() {
        assert_eq!(Key::new("id-1").to_string(), "\"id-1\"");
        assert_eq!(Key::new(5_u8).to_string(), "5");
    }

    proptest::proptest! {
        #[test]
        fn key_order_matches_value_order(
            a in proptest::prelude::any::<i64>(),
            b in proptest::prelude::any::<i64>(),
        ) {
            proptest::prop_assert_eq!(Key::new(a).cmp(&Key::new(b)), a.cmp(&b));
            proptest::prop_assert_eq!(Key::new(a) == Key::new(b), a == b);
        }
    }
}
