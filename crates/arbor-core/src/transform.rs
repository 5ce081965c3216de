//! Generic structure-preserving traversal of computation trees.
//!
//! [`transform`] walks a computation and every value inside it once, in
//! child-slot order, handing each node to a [`Visitor`]. The visitor
//! computes a piece of per-node info before the node's children are
//! visited; binding sites (`sub`, `store`, `assoc`, `wrap`) bind their
//! variables to the info of the node that produces them, and every
//! `named`/`fetch` reference is resolved against those bindings.
//!
//! Bindings live on an explicit scope stack owned by the traversal. A
//! binding is visible exactly inside the subtree of its binding site.
//!
//! The visitor may also rewrite nodes on the way out. Rebuilt nodes keep
//! their id and location; a node whose children all came back unchanged
//! is returned as-is.

use std::rc::Rc;

use crate::computation::{
    AssocNode, AssocSimplNode, ComputationKind, ComputationNode, LazyComputation, WrapNode,
};
use crate::error::CoreError;
use crate::id::VarId;
use crate::path::NodePath;
use crate::value::{ValueKind, ValueNode};

/// A scope stack mapping bound variables to visitor info.
#[derive(Debug, Clone)]
pub struct Environment<I> {
    scopes: Vec<(VarId, I)>,
}

impl<I> Default for Environment<I> {
    fn default() -> Self {
        Environment { scopes: Vec::new() }
    }
}

impl<I> Environment<I> {
    pub fn new() -> Self {
        Environment::default()
    }

    pub fn bind(&mut self, var: VarId, info: I) {
        self.scopes.push((var, info));
    }

    /// Removes the innermost binding, which must be `var`.
    pub fn unbind(&mut self, var: VarId) {
        match self.scopes.pop() {
            Some((top, _)) if top == var => {}
            Some((top, info)) => {
                tracing::error!(%var, %top, "unbalanced environment scope");
                self.scopes.push((top, info));
            }
            None => tracing::error!(%var, "unbind on an empty environment"),
        }
    }

    /// The innermost binding of `var`.
    pub fn lookup(&self, var: VarId) -> Option<&I> {
        self.scopes.iter().rev().find(|(v, _)| *v == var).map(|(_, info)| info)
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

/// Where the traversal currently is.
pub struct VisitCtx<'a, I> {
    pub path: &'a NodePath,
    pub parent: Option<&'a NodePath>,
    pub env: &'a Environment<I>,
}

/// Per-node hooks of [`transform`].
pub trait Visitor {
    type Info: Clone;

    /// Called for every computation node before its children.
    fn computation(
        &mut self,
        cx: &VisitCtx<'_, Self::Info>,
        node: &Rc<ComputationNode>,
    ) -> Self::Info;

    /// Called for every value node before its children.
    fn value(&mut self, cx: &VisitCtx<'_, Self::Info>, node: &Rc<ValueNode>) -> Self::Info;

    /// Called for every `named` value and every `fetch` computation with the
    /// info of the node that binds it. `binder` is `None` only for a `fetch`
    /// outside every matching `store`, which falls back to its default.
    fn reference(
        &mut self,
        _cx: &VisitCtx<'_, Self::Info>,
        _me: &Self::Info,
        _var: VarId,
        _binder: Option<&Self::Info>,
    ) {
    }

    fn rewrite_computation(&mut self, node: Rc<ComputationNode>) -> Rc<ComputationNode> {
        node
    }

    fn rewrite_value(&mut self, node: Rc<ValueNode>) -> Rc<ValueNode> {
        node
    }
}

/// Traverses `root` with `visitor` and returns the (possibly rewritten)
/// tree. Fails on the first `named` value without an enclosing binder.
pub fn transform<V: Visitor>(
    root: &Rc<ComputationNode>,
    visitor: &mut V,
) -> Result<Rc<ComputationNode>, CoreError> {
    let mut walker = Walker {
        visitor,
        env: Environment::new(),
    };
    let (node, _) = walker.computation(root, &NodePath::root(), None)?;
    Ok(node)
}

struct Walker<'v, V: Visitor> {
    visitor: &'v mut V,
    env: Environment<V::Info>,
}

fn same<T>(a: &Rc<T>, b: &Rc<T>) -> bool {
    Rc::ptr_eq(a, b)
}

impl<V: Visitor> Walker<'_, V> {
    fn computation(
        &mut self,
        node: &Rc<ComputationNode>,
        path: &NodePath,
        parent: Option<&NodePath>,
    ) -> Result<(Rc<ComputationNode>, V::Info), CoreError> {
        let info = {
            let cx = VisitCtx {
                path,
                parent,
                env: &self.env,
            };
            self.visitor.computation(&cx, node)
        };

        let rebuilt = match &node.kind {
            ComputationKind::Return(value) => {
                let (v, _) = self.value(value, &path.child(0), path)?;
                (!same(&v, value)).then(|| ComputationKind::Return(v))
            }
            ComputationKind::Leaf0 { .. } | ComputationKind::Path => None,
            ComputationKind::Leaf1 { input, leaf, result } => {
                let (v, _) = self.value(input, &path.child(0), path)?;
                (!same(&v, input)).then(|| ComputationKind::Leaf1 {
                    input: v,
                    leaf: Rc::clone(leaf),
                    result: Rc::clone(result),
                })
            }
            ComputationKind::LeafIncr { input, compute } => {
                let (v, _) = self.value(input, &path.child(0), path)?;
                (!same(&v, input)).then(|| ComputationKind::LeafIncr {
                    input: v,
                    compute: Rc::clone(compute),
                })
            }
            ComputationKind::ModelCutoff(inner) => {
                let (c, _) = self.computation(inner, &path.child(0), Some(path))?;
                (!same(&c, inner)).then(|| ComputationKind::ModelCutoff(c))
            }
            ComputationKind::Sub { from, via, into } => {
                let (f, from_info) = self.computation(from, &path.child(0), Some(path))?;
                self.env.bind(*via, from_info);
                let body = self.computation(into, &path.child(1), Some(path));
                self.env.unbind(*via);
                let (i, _) = body?;
                (!same(&f, from) || !same(&i, into)).then(|| ComputationKind::Sub {
                    from: f,
                    via: *via,
                    into: i,
                })
            }
            ComputationKind::Store { id, value, inner } => {
                let (v, value_info) = self.value(value, &path.child(0), path)?;
                self.env.bind(*id, value_info);
                let body = self.computation(inner, &path.child(1), Some(path));
                self.env.unbind(*id);
                let (i, _) = body?;
                (!same(&v, value) || !same(&i, inner)).then(|| ComputationKind::Store {
                    id: *id,
                    value: v,
                    inner: i,
                })
            }
            ComputationKind::Fetch { id, .. } => {
                let binder = self.env.lookup(*id).cloned();
                if binder.is_none() {
                    tracing::warn!(
                        var = %id,
                        %path,
                        "fetch outside every store; the default applies"
                    );
                }
                let cx = VisitCtx {
                    path,
                    parent,
                    env: &self.env,
                };
                self.visitor.reference(&cx, &info, *id, binder.as_ref());
                None
            }
            ComputationKind::Assoc(assoc) => self.assoc(assoc, path)?.map(ComputationKind::Assoc),
            ComputationKind::AssocOn(assoc) => {
                self.assoc(assoc, path)?.map(ComputationKind::AssocOn)
            }
            ComputationKind::AssocSimpl(simpl) => {
                let (m, _) = self.value(&simpl.map, &path.child(0), path)?;
                (!same(&m, &simpl.map)).then(|| {
                    ComputationKind::AssocSimpl(Rc::new(AssocSimplNode {
                        map: m,
                        by: Rc::clone(&simpl.by),
                        split: Rc::clone(&simpl.split),
                        build: Rc::clone(&simpl.build),
                        data_equal: Rc::clone(&simpl.data_equal),
                    }))
                })
            }
            ComputationKind::Switch { tag, arms } => {
                let (t, _) = self.value(tag, &path.child(0), path)?;
                let mut changed = !same(&t, tag);
                let mut new_arms = Vec::with_capacity(arms.len());
                for (i, arm) in arms.iter().enumerate() {
                    let (a, _) = self.computation(arm, &path.child_at(i + 1)?, Some(path))?;
                    changed |= !same(&a, arm);
                    new_arms.push(a);
                }
                changed.then(|| ComputationKind::Switch { tag: t, arms: new_arms })
            }
            ComputationKind::Lazy(lazy) => match lazy.get() {
                // Unforced lazies are left alone; forcing could build an
                // unbounded tree.
                None => None,
                Some(inner) => {
                    let inner = Rc::clone(inner);
                    let (c, _) = self.computation(&inner, &path.child(0), Some(path))?;
                    (!same(&c, &inner))
                        .then(|| ComputationKind::Lazy(Rc::new(LazyComputation::forced(c))))
                }
            },
            ComputationKind::Wrap(wrap) => {
                // The wrap's own leaf produces the model and the inject.
                self.env.bind(wrap.model_id, info.clone());
                self.env.bind(wrap.inject_id, info.clone());
                let body = self.computation(&wrap.inner, &path.child(0), Some(path));
                self.env.unbind(wrap.inject_id);
                self.env.unbind(wrap.model_id);
                let (i, _) = body?;
                (!same(&i, &wrap.inner)).then(|| {
                    ComputationKind::Wrap(Rc::new(WrapNode {
                        model_id: wrap.model_id,
                        inject_id: wrap.inject_id,
                        inner: i,
                        leaf: wrap.leaf.clone(),
                    }))
                })
            }
            ComputationKind::WithModelResetter { inner, result } => {
                let (c, _) = self.computation(inner, &path.child(0), Some(path))?;
                (!same(&c, inner)).then(|| ComputationKind::WithModelResetter {
                    inner: c,
                    result: Rc::clone(result),
                })
            }
            ComputationKind::Lifecycle(events) => {
                let (v, _) = self.value(events, &path.child(0), path)?;
                (!same(&v, events)).then(|| ComputationKind::Lifecycle(v))
            }
        };

        let node = match rebuilt {
            Some(kind) => Rc::new(ComputationNode {
                id: node.id,
                here: node.here.clone(),
                kind,
            }),
            None => Rc::clone(node),
        };
        Ok((self.visitor.rewrite_computation(node), info))
    }

    /// Entry keys and data are bound to the input map, which produces them.
    fn assoc(
        &mut self,
        assoc: &Rc<AssocNode>,
        path: &NodePath,
    ) -> Result<Option<Rc<AssocNode>>, CoreError> {
        let (m, map_info) = self.value(&assoc.map, &path.child(0), path)?;
        self.env.bind(assoc.key_id, map_info.clone());
        self.env.bind(assoc.data_id, map_info);
        let body = self.computation(&assoc.by, &path.child(1), Some(path));
        self.env.unbind(assoc.data_id);
        self.env.unbind(assoc.key_id);
        let (by, _) = body?;
        if same(&m, &assoc.map) && same(&by, &assoc.by) {
            return Ok(None);
        }
        Ok(Some(Rc::new(AssocNode {
            map: m,
            key_id: assoc.key_id,
            data_id: assoc.data_id,
            by,
            split: Rc::clone(&assoc.split),
            build: Rc::clone(&assoc.build),
            key_equal: Rc::clone(&assoc.key_equal),
            data_equal: Rc::clone(&assoc.data_equal),
        })))
    }

    fn value(
        &mut self,
        node: &Rc<ValueNode>,
        path: &NodePath,
        parent: &NodePath,
    ) -> Result<(Rc<ValueNode>, V::Info), CoreError> {
        let info = {
            let cx = VisitCtx {
                path,
                parent: Some(parent),
                env: &self.env,
            };
            self.visitor.value(&cx, node)
        };

        let rebuilt = match &node.kind {
            ValueKind::Constant(_) | ValueKind::Lazy(_) | ValueKind::Incr(_) => None,
            ValueKind::Named(var) => {
                let Some(binder) = self.env.lookup(*var).cloned() else {
                    let err = CoreError::UnresolvedVariable {
                        var: *var,
                        path: path.to_string(),
                        here: node.here.clone(),
                    };
                    tracing::error!(%err, "reference without an enclosing binder");
                    return Err(err);
                };
                let cx = VisitCtx {
                    path,
                    parent: Some(parent),
                    env: &self.env,
                };
                self.visitor.reference(&cx, &info, *var, Some(&binder));
                None
            }
            ValueKind::Both { first, second, pair } => {
                let (a, _) = self.value(first, &path.child(0), path)?;
                let (b, _) = self.value(second, &path.child(1), path)?;
                (!same(&a, first) || !same(&b, second)).then(|| ValueKind::Both {
                    first: a,
                    second: b,
                    pair: Rc::clone(pair),
                })
            }
            ValueKind::Cutoff { inner, equal } => {
                let (v, _) = self.value(inner, &path.child(0), path)?;
                (!same(&v, inner)).then(|| ValueKind::Cutoff {
                    inner: v,
                    equal: Rc::clone(equal),
                })
            }
            ValueKind::Map { inputs, f } => {
                let mut changed = false;
                let mut new_inputs = Vec::with_capacity(inputs.len());
                for (i, input) in inputs.iter().enumerate() {
                    let (v, _) = self.value(input, &path.child_at(i)?, path)?;
                    changed |= !same(&v, input);
                    new_inputs.push(v);
                }
                changed.then(|| ValueKind::Map {
                    inputs: new_inputs,
                    f: Rc::clone(f),
                })
            }
        };

        let node = match rebuilt {
            Some(kind) => Rc::new(ValueNode {
                id: node.id,
                here: node.here.clone(),
                kind,
            }),
            None => Rc::clone(node),
        };
        Ok((self.visitor.rewrite_value(node), info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computation::Computation;
    use crate::scope::DynamicVar;
    use crate::value::{map2, Value};

    /// Records `(path, tag)` per node and `(reference, binder)` per reference.
    #[derive(Default)]
    struct Recorder {
        nodes: Vec<(String, &'static str)>,
        refs: Vec<(String, Option<String>)>,
    }

    impl Visitor for Recorder {
        type Info = NodePath;

        fn computation(
            &mut self,
            cx: &VisitCtx<'_, NodePath>,
            node: &Rc<ComputationNode>,
        ) -> NodePath {
            self.nodes.push((cx.path.to_string(), node.kind.tag()));
            cx.path.clone()
        }

        fn value(&mut self, cx: &VisitCtx<'_, NodePath>, node: &Rc<ValueNode>) -> NodePath {
            self.nodes.push((cx.path.to_string(), node.kind.tag()));
            cx.path.clone()
        }

        fn reference(
            &mut self,
            _cx: &VisitCtx<'_, NodePath>,
            me: &NodePath,
            _var: VarId,
            binder: Option<&NodePath>,
        ) {
            self.refs.push((me.to_string(), binder.map(|b| b.to_string())));
        }
    }

    #[test]
    fn sub_binds_the_producer_path() {
        let c = Computation::const_(1).sub(|v| Computation::return_(&map2(&v, &v, |a, b| a + b)));
        let mut recorder = Recorder::default();
        transform(c.node(), &mut recorder).unwrap();

        let paths: Vec<&str> = recorder.nodes.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec!["root", "root.0", "root.0.0", "root.1", "root.1.0", "root.1.0.0", "root.1.0.1"]
        );
        assert_eq!(
            recorder.refs,
            vec![
                ("root.1.0.0".to_string(), Some("root.0".to_string())),
                ("root.1.0.1".to_string(), Some("root.0".to_string())),
            ]
        );
    }

    #[test]
    fn unbound_named_value_is_an_error() {
        let stray: Value<i32> = Value::named(VarId::fresh(), None);
        let c = Computation::return_(&stray);
        let err = transform(c.node(), &mut Recorder::default()).unwrap_err();
        assert!(matches!(err, CoreError::UnresolvedVariable { ref path, .. } if path == "root.0"));
    }

    #[test]
    fn bindings_do_not_escape_their_subtree() {
        let mut leaked = None;
        let inner = Computation::const_(1).sub(|v| {
            leaked = Some(v.clone());
            Computation::return_(&v)
        });
        let outside = Computation::return_(&leaked.unwrap());
        let c = inner.sub(|_| outside);
        assert!(transform(c.node(), &mut Recorder::default()).is_err());
    }

    #[test]
    fn fetch_resolves_to_the_store_value() {
        let var: DynamicVar<u8> = DynamicVar::new();
        let c = var.set_within(&Value::constant(3), var.lookup(0));
        let mut recorder = Recorder::default();
        transform(c.node(), &mut recorder).unwrap();
        assert_eq!(recorder.refs, vec![("root.1".to_string(), Some("root.0".to_string()))]);

        let mut recorder = Recorder::default();
        transform(var.lookup(0).node(), &mut recorder).unwrap();
        assert_eq!(recorder.refs, vec![("root".to_string(), None)]);
    }

    #[test]
    fn environment_shadows_and_unbinds() {
        let mut env = Environment::new();
        let var = VarId::fresh();
        env.bind(var, "outer");
        env.bind(var, "inner");
        assert_eq!(env.lookup(var), Some(&"inner"));
        env.unbind(var);
        assert_eq!(env.lookup(var), Some(&"outer"));
        env.unbind(var);
        assert_eq!(env.lookup(var), None);
        assert_eq!(env.depth(), 0);
    }

    struct ConstantDoubler;

    impl Visitor for ConstantDoubler {
        type Info = ();

        fn computation(&mut self, _: &VisitCtx<'_, ()>, _: &Rc<ComputationNode>) {}

        fn value(&mut self, _: &VisitCtx<'_, ()>, _: &Rc<ValueNode>) {}

        fn rewrite_value(&mut self, node: Rc<ValueNode>) -> Rc<ValueNode> {
            match &node.kind {
                ValueKind::Constant(c) => match c.downcast_ref::<i32>() {
                    Some(x) => Rc::new(ValueNode {
                        id: node.id,
                        here: node.here.clone(),
                        kind: ValueKind::Constant(Rc::new(x * 2)),
                    }),
                    None => node,
                },
                _ => node,
            }
        }
    }

    #[test]
    fn switch_with_unaddressable_arms_is_an_error() {
        let arm = Computation::const_(0_u8);
        let c = crate::switch::switch(&Value::constant(0_usize), vec![arm; 65_536]);
        let err = transform(c.node(), &mut ConstantDoubler).unwrap_err();
        assert!(matches!(
            err,
            CoreError::TooManyChildren { index: 65_536, ref path } if path == "root"
        ));
    }

    #[test]
    fn rewrites_rebuild_parents_and_keep_ids() {
        let c = Computation::const_(21);
        let untouched = Computation::const_("text");

        let rewritten = transform(c.node(), &mut ConstantDoubler).unwrap();
        assert!(!Rc::ptr_eq(&rewritten, c.node()));
        assert_eq!(rewritten.id, c.id());
        let ComputationKind::Return(v) = &rewritten.kind else {
            panic!("expected return");
        };
        let ValueKind::Constant(payload) = &v.kind else {
            panic!("expected constant");
        };
        assert_eq!(payload.downcast_ref::<i32>(), Some(&42));

        let same_tree = transform(untouched.node(), &mut ConstantDoubler).unwrap();
        assert!(Rc::ptr_eq(&same_tree, untouched.node()));
    }
}
