//! Keyed replication.
//!
//! [`assoc`] instantiates one copy of a per-key computation for every entry
//! of a `BTreeMap` value. Each replica lives under its own path
//! (`<assoc>.1[key]`), so its state machines keep their own models:
//! injecting into the replica for one key never touches another, and
//! removing a key discards exactly that replica's state.
//!
//! The per-key function runs once, when the graph is built. It receives
//! placeholders for the key and the data, which the driver rebinds for every
//! entry.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use crate::computation::{
    AssocEntry, AssocNode, AssocSimplNode, BuildFn, Computation, ComputationKind, SimplFn, SplitFn,
};
use crate::error::CoreError;
use crate::id::VarId;
use crate::key::Key;
use crate::location::SourceLocation;
use crate::path::NodePath;
use crate::value::{downcast, equal_fn, Dyn, Value, ValueNode};

fn split_map<K, V>() -> SplitFn
where
    K: Ord + Hash + Debug + Clone + 'static,
    V: Clone + 'static,
{
    Rc::new(|map: &Dyn| {
        let map = downcast::<BTreeMap<K, V>>(map)?;
        Ok(map
            .iter()
            .map(|(k, v)| AssocEntry {
                key: Rc::new(k.clone()),
                model_key: Key::new(k.clone()),
                data: Rc::new(v.clone()),
            })
            .collect())
    })
}

fn build_map<K, R>() -> BuildFn
where
    K: Ord + Clone + 'static,
    R: Clone + 'static,
{
    Rc::new(|entries: Vec<(Dyn, Dyn)>| {
        let mut out = BTreeMap::new();
        for (key, result) in entries {
            out.insert(downcast::<K>(&key)?.clone(), downcast::<R>(&result)?.clone());
        }
        Ok(Rc::new(out) as Dyn)
    })
}

struct AssocParts {
    map: Rc<ValueNode>,
    split: SplitFn,
    build: BuildFn,
    keyed_by_model: bool,
}

fn make_assoc<K, V, R, Out>(
    here: SourceLocation,
    parts: AssocParts,
    f: impl FnOnce(Value<K>, Value<V>) -> Computation<R>,
) -> Computation<Out>
where
    K: PartialEq + 'static,
    V: PartialEq + 'static,
    R: 'static,
    Out: 'static,
{
    let key_id = VarId::fresh();
    let data_id = VarId::fresh();
    let by = f(
        Value::named(key_id, Some(here.clone())),
        Value::named(data_id, Some(here.clone())),
    );
    let node = Rc::new(AssocNode {
        map: parts.map,
        key_id,
        data_id,
        by: Rc::clone(by.node()),
        split: parts.split,
        build: parts.build,
        key_equal: equal_fn::<K>(),
        data_equal: equal_fn::<V>(),
    });
    let kind = if parts.keyed_by_model {
        ComputationKind::AssocOn(node)
    } else {
        ComputationKind::Assoc(node)
    };
    Computation::from_kind(kind, Some(here))
}

/// Runs `f` once per entry of `map`, with state isolated per key.
#[track_caller]
pub fn assoc<K, V, R>(
    map: &Value<BTreeMap<K, V>>,
    f: impl FnOnce(Value<K>, Value<V>) -> Computation<R>,
) -> Computation<BTreeMap<K, R>>
where
    K: Ord + Hash + Debug + Clone + 'static,
    V: Clone + PartialEq + 'static,
    R: Clone + 'static,
{
    let parts = AssocParts {
        map: Rc::clone(map.node()),
        split: split_map::<K, V>(),
        build: build_map::<K, R>(),
        keyed_by_model: false,
    };
    make_assoc(SourceLocation::caller(), parts, f)
}

/// Like [`assoc`], but replica state is keyed by `get_model_key(key, data)`
/// instead of by the key. Entries whose key changes while their model key
/// stays the same keep their state. Two entries mapping to the same model
/// key make the frame fail with [`CoreError::DuplicateModelKey`].
#[track_caller]
pub fn assoc_on<K, V, MK, R>(
    map: &Value<BTreeMap<K, V>>,
    get_model_key: impl Fn(&K, &V) -> MK + 'static,
    f: impl FnOnce(Value<K>, Value<V>) -> Computation<R>,
) -> Computation<BTreeMap<K, R>>
where
    K: Ord + Clone + 'static,
    V: Clone + PartialEq + 'static,
    MK: Ord + Hash + Debug + Clone + 'static,
    R: Clone + 'static,
{
    let here = SourceLocation::caller();
    let at = here.clone();
    let split: SplitFn = Rc::new(move |map: &Dyn| {
        let map = downcast::<BTreeMap<K, V>>(map)?;
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(map.len());
        for (k, v) in map {
            let model_key = get_model_key(k, v);
            if !seen.insert(model_key.clone()) {
                let err = CoreError::DuplicateModelKey {
                    key: format!("{:?}", model_key),
                    here: Some(at.clone()),
                };
                tracing::error!(%err, "assoc_on model keys must be unique");
                return Err(err);
            }
            entries.push(AssocEntry {
                key: Rc::new(k.clone()),
                model_key: Key::new(model_key),
                data: Rc::new(v.clone()),
            });
        }
        Ok(entries)
    });
    let parts = AssocParts {
        map: Rc::clone(map.node()),
        split,
        build: build_map::<K, R>(),
        keyed_by_model: true,
    };
    make_assoc(here, parts, f)
}

/// A stateless per-key mapping. `by` receives the replica's path, which is
/// stable for as long as the key is present.
#[track_caller]
pub fn assoc_simpl<K, V, R>(
    map: &Value<BTreeMap<K, V>>,
    by: impl Fn(&NodePath, &K, &V) -> R + 'static,
) -> Computation<BTreeMap<K, R>>
where
    K: Ord + Hash + Debug + Clone + 'static,
    V: Clone + PartialEq + 'static,
    R: Clone + 'static,
{
    let by: SimplFn = Rc::new(move |path: &NodePath, key: &Dyn, data: &Dyn| {
        Ok(Rc::new(by(path, downcast::<K>(key)?, downcast::<V>(data)?)) as Dyn)
    });
    Computation::from_kind(
        ComputationKind::AssocSimpl(Rc::new(AssocSimplNode {
            map: Rc::clone(map.node()),
            by,
            split: split_map::<K, V>(),
            build: build_map::<K, R>(),
            data_equal: equal_fn::<V>(),
        })),
        Some(SourceLocation::caller()),
    )
}

/// Runs `for_` with state scoped to the current value of `on`.
///
/// Every distinct key gets its own copy of the models below; switching to
/// a key seen before brings back the state it had, as long as that key's
/// state has not been discarded. Since only the current key is active,
/// models for other keys are discarded at the end of the frame, so in
/// practice changing the key resets the state.
#[track_caller]
pub fn scope_model<K, R>(on: &Value<K>, for_: impl FnOnce() -> Computation<R>) -> Computation<R>
where
    K: Ord + Hash + Debug + Clone + 'static,
    R: Clone + 'static,
{
    let here = SourceLocation::caller();
    let singleton = on.map_at(here.clone(), |k| BTreeMap::from([(k.clone(), ())]));
    let at = here.clone();
    let build: BuildFn = Rc::new(move |entries: Vec<(Dyn, Dyn)>| match entries.into_iter().next() {
        Some((_, result)) => Ok(Rc::new(downcast::<R>(&result)?.clone()) as Dyn),
        None => Err(CoreError::EmptyScope {
            here: Some(at.clone()),
        }),
    });
    let parts = AssocParts {
        map: Rc::clone(singleton.node()),
        split: split_map::<K, ()>(),
        build,
        keyed_by_model: false,
    };
    make_assoc(here, parts, |_: Value<K>, _: Value<()>| for_())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    fn assoc_node<T: 'static>(c: &Computation<T>) -> Rc<AssocNode> {
        match &c.node().kind {
            ComputationKind::Assoc(node) | ComputationKind::AssocOn(node) => Rc::clone(node),
            other => panic!("expected assoc, got {}", other.tag()),
        }
    }

    #[test]
    fn per_key_function_sees_the_bound_placeholders() {
        let map = Value::constant(BTreeMap::from([(1, "a".to_string())]));
        let c = assoc(&map, |k, v| Computation::return_(&k.both(&v)));
        let node = assoc_node(&c);
        let ComputationKind::Return(pair) = &node.by.kind else {
            panic!("expected return");
        };
        let ValueKind::Both { first, second, .. } = &pair.kind else {
            panic!("expected both");
        };
        assert!(matches!(first.kind, ValueKind::Named(var) if var == node.key_id));
        assert!(matches!(second.kind, ValueKind::Named(var) if var == node.data_id));
    }

    #[test]
    fn split_and_build_preserve_key_order() {
        let map = Value::constant(BTreeMap::from([(3, 30), (1, 10), (2, 20)]));
        let c = assoc(&map, |_, v| Computation::return_(&v.map(|x| x + 1)));
        let node = assoc_node(&c);
        let payload: Dyn = Rc::new(BTreeMap::from([(3, 30), (1, 10), (2, 20)]));
        let entries = (node.split)(&payload).unwrap();
        let keys: Vec<i32> = entries.iter().map(|e| *downcast::<i32>(&e.key).unwrap()).collect();
        assert_eq!(keys, vec![1, 2, 3]);
        assert_eq!(entries[0].model_key, Key::new(1));

        let results = entries
            .iter()
            .map(|e| (Rc::clone(&e.key), Rc::new(downcast::<i32>(&e.data).unwrap() + 1) as Dyn))
            .collect();
        let built = (node.build)(results).unwrap();
        let built = downcast::<BTreeMap<i32, i32>>(&built).unwrap();
        assert_eq!(built, &BTreeMap::from([(1, 11), (2, 21), (3, 31)]));
    }

    #[test]
    fn assoc_on_rejects_duplicate_model_keys() {
        let map = Value::constant(BTreeMap::<i32, i32>::new());
        let c = assoc_on(&map, |_, v| *v, |_, v| Computation::return_(&v));
        let node = assoc_node(&c);
        assert_eq!(c.node().kind.tag(), "assoc_on");

        let unique: Dyn = Rc::new(BTreeMap::from([(1, 7), (2, 8)]));
        let entries = (node.split)(&unique).unwrap();
        assert_eq!(entries[1].model_key, Key::new(8));

        let clash: Dyn = Rc::new(BTreeMap::from([(1, 7), (2, 7)]));
        let err = (node.split)(&clash).err().unwrap();
        assert!(matches!(err, CoreError::DuplicateModelKey { ref key, .. } if key == "7"));
    }

    #[test]
    fn assoc_simpl_calls_by_with_the_path() {
        let map = Value::constant(BTreeMap::from([("x".to_string(), 2)]));
        let c = assoc_simpl(&map, |path, k, v| format!("{path}:{k}:{v}"));
        let ComputationKind::AssocSimpl(node) = &c.node().kind else {
            panic!("expected assoc_simpl");
        };
        let out = (node.by)(
            &NodePath::root().child(1),
            &(Rc::new("x".to_string()) as Dyn),
            &(Rc::new(2) as Dyn),
        )
        .unwrap();
        assert_eq!(downcast::<String>(&out).unwrap(), "root.1:x:2");
    }

    #[test]
    fn scope_model_build_requires_an_entry() {
        let on = Value::constant(5_u8);
        let c = scope_model(&on, || Computation::const_("state"));
        let node = assoc_node(&c);
        let err = (node.build)(Vec::new()).err().unwrap();
        assert!(matches!(err, CoreError::EmptyScope { .. }));
        let built = (node.build)(vec![(Rc::new(5_u8) as Dyn, Rc::new("state") as Dyn)]).unwrap();
        assert_eq!(*downcast::<&str>(&built).unwrap(), "state");
    }
}
