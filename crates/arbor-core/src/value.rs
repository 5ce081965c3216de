//! The `Value` node algebra.
//!
//! A [`Value<T>`] describes a datum that may change over time. It is a typed
//! handle over an erased [`ValueNode`]; the node carries a unique id, the
//! source location of its constructor and one variant of the closed
//! [`ValueKind`] enumeration. Building a value is pure and cheap: it
//! describes a computation, it does not run one.
//!
//! Payloads are stored as [`Dyn`] (`Rc<dyn Any>`). The typed constructors are
//! the only way to build payload-carrying nodes, so a downcast failure while
//! evaluating is a defect in this crate, reported as
//! [`CoreError::TypeMismatch`].

use std::any::Any;
use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::CoreError;
use crate::id::{NodeId, VarId};
use crate::location::SourceLocation;
use crate::var::VarSource;

/// Erased, shareable payload.
pub type Dyn = Rc<dyn Any>;

/// Erased equality predicate over two payloads of the same type.
pub type EqualFn = Rc<dyn Fn(&Dyn, &Dyn) -> bool>;

/// Erased n-ary mapping function.
pub type MapFn = Rc<dyn Fn(&[Dyn]) -> Result<Dyn, CoreError>>;

/// Downcasts an erased payload to `T`.
pub fn downcast<T: 'static>(value: &Dyn) -> Result<&T, CoreError> {
    (**value).downcast_ref::<T>().ok_or(CoreError::TypeMismatch {
        expected: std::any::type_name::<T>(),
    })
}

/// Builds an erased equality from `PartialEq`.
pub(crate) fn equal_fn<T: PartialEq + 'static>() -> EqualFn {
    Rc::new(|a: &Dyn, b: &Dyn| match (downcast::<T>(a), downcast::<T>(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    })
}

// ---------------------------------------------------------------------------
// Erased nodes
// ---------------------------------------------------------------------------

/// An erased value node.
pub struct ValueNode {
    pub id: NodeId,
    pub here: Option<SourceLocation>,
    pub kind: ValueKind,
}

/// Every way a value can be formed.
#[derive(Clone)]
pub enum ValueKind {
    /// A value that never changes.
    Constant(Dyn),
    /// A constant computed on first use.
    Lazy(Rc<LazyValue>),
    /// An externally settable cell ([`crate::var::Var`]).
    Incr(Rc<dyn VarSource>),
    /// A placeholder bound by an enclosing binding site.
    Named(VarId),
    /// Two values paired up.
    Both {
        first: Rc<ValueNode>,
        second: Rc<ValueNode>,
        pair: MapFn,
    },
    /// Suppresses propagation while `equal` holds against the last
    /// emitted payload.
    Cutoff { inner: Rc<ValueNode>, equal: EqualFn },
    /// A function of one to seven inputs.
    Map { inputs: Vec<Rc<ValueNode>>, f: MapFn },
}

impl ValueKind {
    /// Descriptive tag of the variant, as shown in graph snapshots.
    pub fn tag(&self) -> &'static str {
        match self {
            ValueKind::Constant(_) => "constant",
            ValueKind::Lazy(_) => "lazy",
            ValueKind::Incr(_) => "incr",
            ValueKind::Named(_) => "named",
            ValueKind::Both { .. } => "both",
            ValueKind::Cutoff { .. } => "cutoff",
            ValueKind::Map { inputs, .. } => match inputs.len() {
                1 => "map",
                2 => "map2",
                3 => "map3",
                4 => "map4",
                5 => "map5",
                6 => "map6",
                _ => "map7",
            },
        }
    }

    /// Child value nodes, in slot order.
    pub fn children(&self) -> Vec<&Rc<ValueNode>> {
        match self {
            ValueKind::Constant(_)
            | ValueKind::Lazy(_)
            | ValueKind::Incr(_)
            | ValueKind::Named(_) => Vec::new(),
            ValueKind::Both { first, second, .. } => vec![first, second],
            ValueKind::Cutoff { inner, .. } => vec![inner],
            ValueKind::Map { inputs, .. } => inputs.iter().collect(),
        }
    }
}

impl fmt::Debug for ValueNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ValueNode");
        s.field("id", &self.id).field("kind", &self.kind.tag());
        if let ValueKind::Named(var) = &self.kind {
            s.field("var", var);
        }
        s.field("here", &self.here).finish()
    }
}

/// A constant forced on first read.
pub struct LazyValue {
    cell: OnceCell<Dyn>,
    thunk: RefCell<Option<Box<dyn FnOnce() -> Dyn>>>,
}

impl LazyValue {
    pub fn new(thunk: impl FnOnce() -> Dyn + 'static) -> Self {
        LazyValue {
            cell: OnceCell::new(),
            thunk: RefCell::new(Some(Box::new(thunk))),
        }
    }

    /// Forces the thunk once and returns the cached payload. Returns `None`
    /// if the thunk tried to force itself.
    pub fn force(&self) -> Option<Dyn> {
        if let Some(payload) = self.cell.get() {
            return Some(Rc::clone(payload));
        }
        let Some(thunk) = self.thunk.borrow_mut().take() else {
            tracing::error!("lazy value forced itself while being computed");
            return None;
        };
        let payload = thunk();
        Some(Rc::clone(self.cell.get_or_init(|| payload)))
    }

    pub fn is_forced(&self) -> bool {
        self.cell.get().is_some()
    }
}

// ---------------------------------------------------------------------------
// Typed handle
// ---------------------------------------------------------------------------

/// A typed description of a time-varying `T`.
pub struct Value<T> {
    node: Rc<ValueNode>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Value<T> {
    fn clone(&self) -> Self {
        Value {
            node: Rc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.node, f)
    }
}

impl<T: 'static> Value<T> {
    pub(crate) fn from_kind(kind: ValueKind, here: Option<SourceLocation>) -> Self {
        Value {
            node: Rc::new(ValueNode {
                id: NodeId::fresh(),
                here,
                kind,
            }),
            _marker: PhantomData,
        }
    }

    /// Wraps an erased node. The caller vouches for the payload type.
    pub fn from_node(node: Rc<ValueNode>) -> Self {
        Value {
            node,
            _marker: PhantomData,
        }
    }

    /// A placeholder for the variable `var`, resolved against the
    /// enclosing binder.
    pub(crate) fn named(var: VarId, here: Option<SourceLocation>) -> Self {
        Value::from_kind(ValueKind::Named(var), here)
    }

    /// A value that never changes.
    #[track_caller]
    pub fn constant(value: T) -> Self {
        Value::from_kind(
            ValueKind::Constant(Rc::new(value)),
            Some(SourceLocation::caller()),
        )
    }

    /// A constant computed the first time it is read.
    #[track_caller]
    pub fn lazy(thunk: impl FnOnce() -> T + 'static) -> Self {
        let lazy = LazyValue::new(move || Rc::new(thunk()) as Dyn);
        Value::from_kind(
            ValueKind::Lazy(Rc::new(lazy)),
            Some(SourceLocation::caller()),
        )
    }

    pub fn node(&self) -> &Rc<ValueNode> {
        &self.node
    }

    pub fn id(&self) -> NodeId {
        self.node.id
    }

    /// Applies `f` to every new payload.
    #[track_caller]
    pub fn map<U: 'static>(&self, f: impl Fn(&T) -> U + 'static) -> Value<U> {
        self.map_at(SourceLocation::caller(), f)
    }

    pub(crate) fn map_at<U: 'static>(
        &self,
        here: SourceLocation,
        f: impl Fn(&T) -> U + 'static,
    ) -> Value<U> {
        let f: MapFn = Rc::new(move |args: &[Dyn]| {
            let [a] = args else {
                return Err(CoreError::TypeMismatch {
                    expected: "one input",
                });
            };
            Ok(Rc::new(f(downcast::<T>(a)?)) as Dyn)
        });
        Value::from_kind(
            ValueKind::Map {
                inputs: vec![Rc::clone(&self.node)],
                f,
            },
            Some(here),
        )
    }

    /// Suppresses updates for which `equal(last_emitted, new)` holds.
    #[track_caller]
    pub fn cutoff(&self, equal: impl Fn(&T, &T) -> bool + 'static) -> Value<T> {
        let equal: EqualFn = Rc::new(move |a: &Dyn, b: &Dyn| {
            match (downcast::<T>(a), downcast::<T>(b)) {
                (Ok(a), Ok(b)) => equal(a, b),
                _ => false,
            }
        });
        Value::from_kind(
            ValueKind::Cutoff {
                inner: Rc::clone(&self.node),
                equal,
            },
            Some(SourceLocation::caller()),
        )
    }

    /// Pairs this value with `other`.
    #[track_caller]
    pub fn both<U>(&self, other: &Value<U>) -> Value<(T, U)>
    where
        T: Clone,
        U: Clone + 'static,
    {
        let pair: MapFn = Rc::new(|args: &[Dyn]| {
            let [a, b] = args else {
                return Err(CoreError::TypeMismatch {
                    expected: "two inputs",
                });
            };
            Ok(Rc::new((downcast::<T>(a)?.clone(), downcast::<U>(b)?.clone())) as Dyn)
        });
        Value::from_kind(
            ValueKind::Both {
                first: Rc::clone(&self.node),
                second: Rc::clone(&other.node),
                pair,
            },
            Some(SourceLocation::caller()),
        )
    }
}

impl<A, B> Value<(A, B)>
where
    A: Clone + 'static,
    B: Clone + 'static,
{
    /// Projects a pair into its two components.
    #[track_caller]
    pub fn split(&self) -> (Value<A>, Value<B>) {
        (self.map(|(a, _)| a.clone()), self.map(|(_, b)| b.clone()))
    }
}

macro_rules! define_map_n {
    ($(#[$doc:meta])* $name:ident, $($v:ident : $t:ident),+) => {
        $(#[$doc])*
        #[track_caller]
        pub fn $name<$($t: 'static,)+ R: 'static>(
            $($v: &Value<$t>,)+
            f: impl Fn($(&$t),+) -> R + 'static,
        ) -> Value<R> {
            let inputs = vec![$(Rc::clone($v.node())),+];
            let f: MapFn = Rc::new(move |args: &[Dyn]| {
                let [$($v),+] = args else {
                    return Err(CoreError::TypeMismatch {
                        expected: stringify!($name),
                    });
                };
                $(let $v = downcast::<$t>($v)?;)+
                Ok(Rc::new(f($($v),+)) as Dyn)
            });
            Value::from_kind(ValueKind::Map { inputs, f }, Some(SourceLocation::caller()))
        }
    };
}

define_map_n!(
    /// Combines two values positionally.
    map2, a: A, b: B
);
define_map_n!(map3, a: A, b: B, c: C);
define_map_n!(map4, a: A, b: B, c: C, d: D);
define_map_n!(map5, a: A, b: B, c: C, d: D, e: E);
define_map_n!(map6, a: A, b: B, c: C, d: D, e: E, g: G);
define_map_n!(map7, a: A, b: B, c: C, d: D, e: E, g: G, h: H);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_constructor_makes_a_distinct_node() {
        let a = Value::constant(1);
        let b = Value::constant(1);
        assert_ne!(a.id(), b.id());
        let c = a.clone();
        assert_eq!(a.id(), c.id());
    }

    #[test]
    fn constructors_record_their_caller() {
        let v = Value::constant("x");
        let here = v.node().here.as_ref().unwrap();
        assert!(here.file.ends_with("value.rs"));
    }

    #[test]
    fn tags_follow_the_variant() {
        let a = Value::constant(1);
        let b = Value::constant(2);
        assert_eq!(a.node().kind.tag(), "constant");
        assert_eq!(a.map(|x| x + 1).node().kind.tag(), "map");
        assert_eq!(map2(&a, &b, |x, y| x + y).node().kind.tag(), "map2");
        assert_eq!(
            map4(&a, &b, &a, &b, |w, x, y, z| w + x + y + z).node().kind.tag(),
            "map4"
        );
        assert_eq!(a.both(&b).node().kind.tag(), "both");
        assert_eq!(a.cutoff(|x, y| x == y).node().kind.tag(), "cutoff");
        assert_eq!(Value::lazy(|| 3).node().kind.tag(), "lazy");
    }

    #[test]
    fn map_function_downcasts_its_inputs() {
        let a = Value::constant(20);
        let b = Value::constant(22);
        let sum = map2(&a, &b, |x: &i32, y: &i32| x + y);
        let ValueKind::Map { f, .. } = &sum.node().kind else {
            panic!("expected a map node");
        };
        let out = f(&[Rc::new(20_i32) as Dyn, Rc::new(22_i32) as Dyn]).unwrap();
        assert_eq!(*downcast::<i32>(&out).unwrap(), 42);

        let err = f(&[Rc::new("no") as Dyn, Rc::new(22_i32) as Dyn]);
        assert!(matches!(err, Err(CoreError::TypeMismatch { .. })));
    }

    #[test]
    fn lazy_value_is_forced_once() {
        let count = Rc::new(std::cell::Cell::new(0));
        let counter = count.clone();
        let lazy = LazyValue::new(move || {
            counter.set(counter.get() + 1);
            Rc::new(5) as Dyn
        });
        assert!(!lazy.is_forced());
        let a = lazy.force().unwrap();
        let b = lazy.force().unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn lazy_value_forcing_itself_yields_nothing() {
        let slot: Rc<RefCell<Option<Rc<LazyValue>>>> = Rc::new(RefCell::new(None));
        let inner = Rc::clone(&slot);
        let lazy = Rc::new(LazyValue::new(move || {
            let again = inner.borrow().as_ref().and_then(|lazy| lazy.force());
            Rc::new(again.is_none()) as Dyn
        }));
        *slot.borrow_mut() = Some(Rc::clone(&lazy));

        let payload = lazy.force().unwrap();
        assert!(*downcast::<bool>(&payload).unwrap());
        assert!(lazy.is_forced());
    }

    #[test]
    fn children_are_listed_in_slot_order() {
        let a = Value::constant(1);
        let b = Value::constant(2);
        let m = map3(&a, &b, &a, |x, y, z| x + y + z);
        let ids: Vec<NodeId> = m.node().kind.children().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![a.id(), b.id(), a.id()]);
    }
}
