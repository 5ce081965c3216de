//! The `Computation` node algebra.
//!
//! A [`Computation<T>`] describes a stateful process that produces a
//! `Value<T>`. Like values, computations are immutable descriptions over an
//! erased [`ComputationNode`] with a unique id and a source location; the
//! closed [`ComputationKind`] enumeration is matched exhaustively by every
//! consumer (the driver, the transform engine), so adding a variant forces
//! all of them to handle it.
//!
//! # Binding discipline
//!
//! [`Computation::sub`] is the only way to turn a computation's result into
//! a value visible downstream. It allocates a fresh [`VarId`], hands the body
//! a `Named` placeholder for it, and records the binding in the node. A
//! driver evaluates the bound computation exactly once per frame and
//! resolves every read of the placeholder against that single result.

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::CoreError;
use crate::effect::Scheduler;
use crate::id::{NodeId, VarId};
use crate::key::Key;
use crate::location::SourceLocation;
use crate::path::NodePath;
use crate::value::{downcast, Dyn, EqualFn, Value, ValueKind, ValueNode};

// ---------------------------------------------------------------------------
// Erased function shapes
// ---------------------------------------------------------------------------

/// A state transition: `(scheduler, path, input, model, action) -> (model, response)`.
pub type ApplyFn =
    Rc<dyn Fn(&mut Scheduler, &NodePath, Option<&Dyn>, &Dyn, Dyn) -> Result<(Dyn, Dyn), CoreError>>;

/// Builds the typed inject callback for the machine at a path.
pub type InjectFn = Rc<dyn Fn(&NodePath) -> Dyn>;

/// Combines two erased payloads into one.
pub type CombineFn = Rc<dyn Fn(&Dyn, &Dyn) -> Result<Dyn, CoreError>>;

/// A function of one erased payload.
pub type UnaryFn = Rc<dyn Fn(&Dyn) -> Result<Dyn, CoreError>>;

/// Splits an associative collection into its entries.
pub type SplitFn = Rc<dyn Fn(&Dyn) -> Result<Vec<AssocEntry>, CoreError>>;

/// Rebuilds a collection from `(key, result)` pairs in key order.
pub type BuildFn = Rc<dyn Fn(Vec<(Dyn, Dyn)>) -> Result<Dyn, CoreError>>;

/// Stateless per-entry function of `assoc_simpl`.
pub type SimplFn = Rc<dyn Fn(&NodePath, &Dyn, &Dyn) -> Result<Dyn, CoreError>>;

// ---------------------------------------------------------------------------
// Node payloads
// ---------------------------------------------------------------------------

/// The stateful core shared by state machines, actors and `wrap`.
#[derive(Clone)]
pub struct Leaf {
    /// Model used until the first action is applied.
    pub default_model: Dyn,
    pub apply: ApplyFn,
    /// Model equality, consulted under `model_cutoff`.
    pub equal: EqualFn,
    pub make_inject: InjectFn,
}

/// One entry of an associative collection.
pub struct AssocEntry {
    /// The key as exposed to the per-key computation and the output.
    pub key: Dyn,
    /// The key the replica's state is stored under.
    pub model_key: Key,
    pub data: Dyn,
}

/// Keyed replication of `by` over the entries of `map`.
pub struct AssocNode {
    pub map: Rc<ValueNode>,
    pub key_id: VarId,
    pub data_id: VarId,
    pub by: Rc<ComputationNode>,
    pub split: SplitFn,
    pub build: BuildFn,
    pub key_equal: EqualFn,
    pub data_equal: EqualFn,
}

/// Stateless keyed mapping.
pub struct AssocSimplNode {
    pub map: Rc<ValueNode>,
    pub by: SimplFn,
    pub split: SplitFn,
    pub build: BuildFn,
    pub data_equal: EqualFn,
}

/// A self-referential computation: `inner` sees the wrapper's own model and
/// inject through `model_id` and `inject_id`, and `leaf.apply` receives
/// `inner`'s result as its input.
pub struct WrapNode {
    pub model_id: VarId,
    pub inject_id: VarId,
    pub inner: Rc<ComputationNode>,
    pub leaf: Leaf,
}

/// A computation built on first use.
pub struct LazyComputation {
    cell: OnceCell<Rc<ComputationNode>>,
    thunk: RefCell<Option<Box<dyn FnOnce() -> Rc<ComputationNode>>>>,
}

impl LazyComputation {
    pub fn new(thunk: impl FnOnce() -> Rc<ComputationNode> + 'static) -> Self {
        LazyComputation {
            cell: OnceCell::new(),
            thunk: RefCell::new(Some(Box::new(thunk))),
        }
    }

    /// A lazy computation that is already built.
    pub fn forced(node: Rc<ComputationNode>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(node);
        LazyComputation {
            cell,
            thunk: RefCell::new(None),
        }
    }

    /// Builds the computation if needed. Returns `None` if the thunk tried
    /// to force itself.
    pub fn force(&self) -> Option<Rc<ComputationNode>> {
        if let Some(node) = self.cell.get() {
            return Some(Rc::clone(node));
        }
        let thunk = self.thunk.borrow_mut().take()?;
        let node = thunk();
        Some(Rc::clone(self.cell.get_or_init(|| node)))
    }

    /// The computation, if it has already been forced.
    pub fn get(&self) -> Option<&Rc<ComputationNode>> {
        self.cell.get()
    }
}

// ---------------------------------------------------------------------------
// Erased nodes
// ---------------------------------------------------------------------------

/// An erased computation node.
pub struct ComputationNode {
    pub id: NodeId,
    pub here: Option<SourceLocation>,
    pub kind: ComputationKind,
}

/// Every way a computation can be formed.
#[derive(Clone)]
pub enum ComputationKind {
    /// Lifts a value.
    Return(Rc<ValueNode>),
    /// A state machine without input.
    Leaf0 { leaf: Rc<Leaf>, result: CombineFn },
    /// A state machine whose transitions read `input`.
    Leaf1 {
        input: Rc<ValueNode>,
        leaf: Rc<Leaf>,
        result: CombineFn,
    },
    /// A stateless function over `input`, recomputed only when it changes.
    LeafIncr { input: Rc<ValueNode>, compute: UnaryFn },
    /// Keeps the models below it when a transition returns an equal model.
    ModelCutoff(Rc<ComputationNode>),
    /// Binds the result of `from` to `via` while evaluating `into`.
    Sub {
        from: Rc<ComputationNode>,
        via: VarId,
        into: Rc<ComputationNode>,
    },
    /// Writes `value` to the dynamic scope variable `id` for `inner`.
    Store {
        id: VarId,
        value: Rc<ValueNode>,
        inner: Rc<ComputationNode>,
    },
    /// Reads the dynamic scope variable `id`, falling back to `default`.
    Fetch {
        id: VarId,
        default: Dyn,
        for_some: UnaryFn,
    },
    Assoc(Rc<AssocNode>),
    /// Like `Assoc`, but replicas are keyed by a derived model key.
    AssocOn(Rc<AssocNode>),
    AssocSimpl(Rc<AssocSimplNode>),
    /// Activates `arms[tag]`; the others are inactive.
    Switch {
        tag: Rc<ValueNode>,
        arms: Vec<Rc<ComputationNode>>,
    },
    Lazy(Rc<LazyComputation>),
    Wrap(Rc<WrapNode>),
    /// Pairs `inner`'s result with an effect that resets every model below it.
    WithModelResetter {
        inner: Rc<ComputationNode>,
        result: CombineFn,
    },
    /// The structural path of this node.
    Path,
    /// Registers lifecycle events for this position.
    Lifecycle(Rc<ValueNode>),
}

impl ComputationKind {
    /// Descriptive tag of the variant, as shown in graph snapshots.
    pub fn tag(&self) -> &'static str {
        match self {
            ComputationKind::Return(_) => "return",
            ComputationKind::Leaf0 { .. } => "leaf0",
            ComputationKind::Leaf1 { .. } => "leaf1",
            ComputationKind::LeafIncr { .. } => "leaf_incr",
            ComputationKind::ModelCutoff(_) => "model_cutoff",
            ComputationKind::Sub { .. } => "sub",
            ComputationKind::Store { .. } => "store",
            ComputationKind::Fetch { .. } => "fetch",
            ComputationKind::Assoc(_) => "assoc",
            ComputationKind::AssocOn(_) => "assoc_on",
            ComputationKind::AssocSimpl(_) => "assoc_simpl",
            ComputationKind::Switch { .. } => "switch",
            ComputationKind::Lazy(_) => "lazy",
            ComputationKind::Wrap(_) => "wrap",
            ComputationKind::WithModelResetter { .. } => "with_model_resetter",
            ComputationKind::Path => "path",
            ComputationKind::Lifecycle(_) => "lifecycle",
        }
    }
}

impl fmt::Debug for ComputationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputationNode")
            .field("id", &self.id)
            .field("kind", &self.kind.tag())
            .field("here", &self.here)
            .finish()
    }
}

pub(crate) fn new_node(kind: ComputationKind, here: Option<SourceLocation>) -> Rc<ComputationNode> {
    Rc::new(ComputationNode {
        id: NodeId::fresh(),
        here,
        kind,
    })
}

// ---------------------------------------------------------------------------
// Typed handle
// ---------------------------------------------------------------------------

/// A typed description of a stateful process producing a `Value<T>`.
pub struct Computation<T> {
    node: Rc<ComputationNode>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Computation<T> {
    fn clone(&self) -> Self {
        Computation {
            node: Rc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Computation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.node, f)
    }
}

impl<T: 'static> From<Value<T>> for Computation<T> {
    #[track_caller]
    fn from(value: Value<T>) -> Self {
        Computation::return_(&value)
    }
}

impl<T: 'static> Computation<T> {
    pub(crate) fn from_kind(kind: ComputationKind, here: Option<SourceLocation>) -> Self {
        Computation::from_node(new_node(kind, here))
    }

    /// Wraps an erased node. The caller vouches for the result type.
    pub fn from_node(node: Rc<ComputationNode>) -> Self {
        Computation {
            node,
            _marker: PhantomData,
        }
    }

    pub fn node(&self) -> &Rc<ComputationNode> {
        &self.node
    }

    pub fn id(&self) -> NodeId {
        self.node.id
    }

    /// A computation with no state that produces `value`.
    #[track_caller]
    pub fn return_(value: &Value<T>) -> Self {
        Computation::from_kind(
            ComputationKind::Return(Rc::clone(value.node())),
            Some(SourceLocation::caller()),
        )
    }

    /// A computation that always produces `value`.
    #[track_caller]
    pub fn const_(value: T) -> Self {
        let here = SourceLocation::caller();
        let value: Value<T> = Value::from_kind(
            ValueKind::Constant(Rc::new(value)),
            Some(here.clone()),
        );
        Computation::from_kind(ComputationKind::Return(Rc::clone(value.node())), Some(here))
    }

    /// Binds this computation's result for use in `f`.
    ///
    /// `f` runs immediately, while the graph is being built; it receives a
    /// placeholder that the driver resolves to this computation's single
    /// per-frame result.
    #[track_caller]
    pub fn sub<U: 'static>(&self, f: impl FnOnce(Value<T>) -> Computation<U>) -> Computation<U> {
        self.sub_at(Some(SourceLocation::caller()), f)
    }

    pub(crate) fn sub_at<U: 'static>(
        &self,
        here: Option<SourceLocation>,
        f: impl FnOnce(Value<T>) -> Computation<U>,
    ) -> Computation<U> {
        let via = VarId::fresh();
        let into = f(Value::named(via, here.clone()));
        Computation::from_kind(
            ComputationKind::Sub {
                from: Rc::clone(&self.node),
                via,
                into: Rc::clone(into.node()),
            },
            here,
        )
    }

    /// Maps the result through `f`.
    #[track_caller]
    pub fn map<U: 'static>(&self, f: impl Fn(&T) -> U + 'static) -> Computation<U> {
        self.map_at(SourceLocation::caller(), f)
    }

    pub(crate) fn map_at<U: 'static>(
        &self,
        here: SourceLocation,
        f: impl Fn(&T) -> U + 'static,
    ) -> Computation<U> {
        let at = here.clone();
        self.sub_at(Some(here), move |v| {
            let mapped = v.map_at(at.clone(), f);
            Computation::from_kind(ComputationKind::Return(Rc::clone(mapped.node())), Some(at))
        })
    }

    /// Defers building the computation until it is first evaluated.
    #[track_caller]
    pub fn lazy(f: impl FnOnce() -> Computation<T> + 'static) -> Self {
        let lazy = LazyComputation::new(move || Rc::clone(f().node()));
        Computation::from_kind(ComputationKind::Lazy(Rc::new(lazy)), Some(SourceLocation::caller()))
    }

    /// Transitions below this node that produce an equal model leave the
    /// stored model untouched.
    #[track_caller]
    pub fn model_cutoff(&self) -> Self {
        Computation::from_kind(
            ComputationKind::ModelCutoff(Rc::clone(&self.node)),
            Some(SourceLocation::caller()),
        )
    }

    /// A stateless computation over `input`, recomputed only when the input
    /// payload changes.
    #[track_caller]
    pub fn leaf_incr<I: 'static>(input: &Value<I>, compute: impl Fn(&I) -> T + 'static) -> Self {
        let compute: UnaryFn =
            Rc::new(move |input: &Dyn| Ok(Rc::new(compute(downcast::<I>(input)?)) as Dyn));
        Computation::from_kind(
            ComputationKind::LeafIncr {
                input: Rc::clone(input.node()),
                compute,
            },
            Some(SourceLocation::caller()),
        )
    }
}

impl Computation<NodePath> {
    /// Produces the structural path of this position in the tree.
    #[track_caller]
    pub fn path() -> Self {
        Computation::from_kind(ComputationKind::Path, Some(SourceLocation::caller()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::map2;

    #[test]
    fn sub_hands_the_body_a_named_placeholder() {
        let producer = Computation::const_(5);
        let mut seen = None;
        let c = producer.sub(|v| {
            seen = Some(v.clone());
            Computation::return_(&v)
        });

        let ComputationKind::Sub { from, via, into } = &c.node().kind else {
            panic!("expected sub");
        };
        assert!(Rc::ptr_eq(from, producer.node()));
        let seen = seen.unwrap();
        assert!(matches!(seen.node().kind, ValueKind::Named(var) if var == *via));
        let ComputationKind::Return(returned) = &into.kind else {
            panic!("expected return");
        };
        assert!(Rc::ptr_eq(returned, seen.node()));
    }

    #[test]
    fn two_readers_share_one_binding() {
        let c = Computation::const_(2).sub(|v| Computation::return_(&map2(&v, &v, |a, b| a * b)));
        let ComputationKind::Sub { into, via, .. } = &c.node().kind else {
            panic!("expected sub");
        };
        let ComputationKind::Return(value) = &into.kind else {
            panic!("expected return");
        };
        let readers: Vec<VarId> = value
            .kind
            .children()
            .iter()
            .filter_map(|n| match n.kind {
                ValueKind::Named(var) => Some(var),
                _ => None,
            })
            .collect();
        assert_eq!(readers, vec![*via, *via]);
    }

    #[test]
    fn lazy_computation_is_built_once() {
        let lazy = LazyComputation::new(|| Rc::clone(Computation::const_(1).node()));
        assert!(lazy.get().is_none());
        let a = lazy.force().unwrap();
        let b = lazy.force().unwrap();
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn tags_cover_constructors() {
        assert_eq!(Computation::const_(1).node().kind.tag(), "return");
        assert_eq!(Computation::const_(1).map(|x| x + 1).node().kind.tag(), "sub");
        assert_eq!(Computation::<i32>::lazy(|| Computation::const_(1)).node().kind.tag(), "lazy");
        assert_eq!(Computation::const_(1).model_cutoff().node().kind.tag(), "model_cutoff");
        assert_eq!(Computation::path().node().kind.tag(), "path");
        let input = Value::constant(3);
        assert_eq!(Computation::leaf_incr(&input, |x| x * 2).node().kind.tag(), "leaf_incr");
    }

    #[test]
    fn from_value_builds_a_return() {
        let c: Computation<u8> = Value::constant(1_u8).into();
        assert_eq!(c.node().kind.tag(), "return");
    }
}
