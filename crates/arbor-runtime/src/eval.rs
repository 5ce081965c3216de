//! Evaluation of one frame.
//!
//! The evaluator walks the computation tree from the root, numbering child
//! slots exactly like the transform engine, so a node's run-time path is
//! its snapshot path (plus `assoc` keys). Every payload-producing node is
//! memoized by path: when the node and all of its inputs are the same
//! `Rc`s as in the previous frame, the previous output is reused and
//! nothing downstream sees a change.

use std::collections::HashMap;
use std::rc::Rc;

use arbor_core::computation::{AssocNode, AssocSimplNode, CombineFn, Leaf};
use arbor_core::value::EqualFn;
use arbor_core::wrap::reset_effect;
use arbor_core::{
    downcast, ComputationKind, ComputationNode, CoreError, Dyn, Environment, Lifecycle, NodeId,
    NodePath, ValueKind, ValueNode,
};
use indexmap::IndexMap;

use crate::error::RuntimeError;

/// Output of a node in the previous frame, with the inputs it was computed from.
pub(crate) struct Memo {
    node: NodeId,
    inputs: Vec<Dyn>,
    output: Dyn,
}

/// A stateful position that can receive actions.
#[derive(Clone)]
pub(crate) enum LeafEntry {
    Machine {
        leaf: Leaf,
        input: Option<Dyn>,
        /// Inside a `model_cutoff`.
        cutoff: bool,
    },
    Resetter {
        scope: NodePath,
    },
}

/// Everything the driver keeps from one frame to the next.
#[derive(Default)]
pub(crate) struct FrameState {
    pub(crate) models: HashMap<NodePath, Dyn>,
    pub(crate) injects: HashMap<NodePath, Dyn>,
    pub(crate) resets: HashMap<NodePath, Dyn>,
    memo: HashMap<NodePath, Memo>,
    entries: HashMap<NodePath, (Dyn, Dyn)>,
}

pub(crate) struct FrameOutput {
    pub(crate) result: Dyn,
    pub(crate) leaves: HashMap<NodePath, LeafEntry>,
    pub(crate) lifecycles: IndexMap<NodePath, Lifecycle>,
}

/// Evaluates `root` against `state`. On success the memo tables of `state`
/// are replaced by this frame's; on failure they are left untouched.
pub(crate) fn evaluate(
    root: &Rc<ComputationNode>,
    state: &mut FrameState,
) -> Result<FrameOutput, RuntimeError> {
    let mut evaluator = Evaluator {
        state,
        next_memo: HashMap::new(),
        next_entries: HashMap::new(),
        leaves: HashMap::new(),
        lifecycles: IndexMap::new(),
        env: Environment::new(),
        cutoff_depth: 0,
    };
    let result = evaluator.computation(root, &NodePath::root())?;
    let Evaluator {
        state,
        next_memo,
        next_entries,
        leaves,
        lifecycles,
        ..
    } = evaluator;
    state.memo = next_memo;
    state.entries = next_entries;
    Ok(FrameOutput {
        result,
        leaves,
        lifecycles,
    })
}

struct Evaluator<'s> {
    state: &'s mut FrameState,
    next_memo: HashMap<NodePath, Memo>,
    next_entries: HashMap<NodePath, (Dyn, Dyn)>,
    leaves: HashMap<NodePath, LeafEntry>,
    lifecycles: IndexMap<NodePath, Lifecycle>,
    env: Environment<Dyn>,
    cutoff_depth: usize,
}

impl Evaluator<'_> {
    /// Reuses the previous output at `path` if `node` ran there with the
    /// same inputs, otherwise runs `compute`.
    fn memo(
        &mut self,
        path: &NodePath,
        node: NodeId,
        inputs: Vec<Dyn>,
        compute: impl FnOnce(&[Dyn]) -> Result<Dyn, CoreError>,
    ) -> Result<Dyn, RuntimeError> {
        let hit = self.state.memo.get(path).and_then(|prev| {
            let same = prev.node == node
                && prev.inputs.len() == inputs.len()
                && prev.inputs.iter().zip(&inputs).all(|(a, b)| Rc::ptr_eq(a, b));
            same.then(|| Rc::clone(&prev.output))
        });
        let output = match hit {
            Some(output) => output,
            None => compute(&inputs)?,
        };
        self.next_memo.insert(
            path.clone(),
            Memo {
                node,
                inputs,
                output: Rc::clone(&output),
            },
        );
        Ok(output)
    }

    /// Keeps the previous frame's key and data payloads for a replica when
    /// they compare equal, so the replica sees unchanged inputs.
    fn stable_entry(
        &mut self,
        at: &NodePath,
        key: Dyn,
        data: Dyn,
        key_equal: Option<&EqualFn>,
        data_equal: &EqualFn,
    ) -> (Dyn, Dyn) {
        let (key, data) = match self.state.entries.get(at) {
            Some((prev_key, prev_data)) => {
                let key = match key_equal {
                    Some(equal) if !equal(prev_key, &key) => key,
                    _ => Rc::clone(prev_key),
                };
                let data = if data_equal(prev_data, &data) {
                    Rc::clone(prev_data)
                } else {
                    data
                };
                (key, data)
            }
            None => (key, data),
        };
        self.next_entries.insert(at.clone(), (Rc::clone(&key), Rc::clone(&data)));
        (key, data)
    }

    fn inject_for(&mut self, path: &NodePath, leaf: &Leaf) -> Dyn {
        Rc::clone(
            self.state
                .injects
                .entry(path.clone())
                .or_insert_with(|| (leaf.make_inject)(path)),
        )
    }

    fn model_or_default(&self, path: &NodePath, leaf: &Leaf) -> Dyn {
        match self.state.models.get(path) {
            Some(model) => Rc::clone(model),
            None => Rc::clone(&leaf.default_model),
        }
    }

    fn machine(
        &mut self,
        node: &ComputationNode,
        path: &NodePath,
        leaf: &Leaf,
        input: Option<Dyn>,
        result: &CombineFn,
    ) -> Result<Dyn, RuntimeError> {
        let model = self.model_or_default(path, leaf);
        let inject = self.inject_for(path, leaf);
        self.leaves.insert(
            path.clone(),
            LeafEntry::Machine {
                leaf: leaf.clone(),
                input,
                cutoff: self.cutoff_depth > 0,
            },
        );
        let result = Rc::clone(result);
        let (m, i) = (Rc::clone(&model), Rc::clone(&inject));
        self.memo(path, node.id, vec![model, inject], move |_| result(&m, &i))
    }

    fn with_bindings<T>(
        &mut self,
        bindings: &[(arbor_core::VarId, Dyn)],
        body: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        for (var, value) in bindings {
            self.env.bind(*var, Rc::clone(value));
        }
        let out = body(self);
        for (var, _) in bindings.iter().rev() {
            self.env.unbind(*var);
        }
        out
    }

    pub(crate) fn computation(
        &mut self,
        node: &Rc<ComputationNode>,
        path: &NodePath,
    ) -> Result<Dyn, RuntimeError> {
        match &node.kind {
            ComputationKind::Return(value) => self.value(value, &path.child(0)),
            ComputationKind::Leaf0 { leaf, result } => self.machine(node, path, leaf, None, result),
            ComputationKind::Leaf1 { input, leaf, result } => {
                let input = self.value(input, &path.child(0))?;
                self.machine(node, path, leaf, Some(input), result)
            }
            ComputationKind::LeafIncr { input, compute } => {
                let input = self.value(input, &path.child(0))?;
                let compute = Rc::clone(compute);
                let i = Rc::clone(&input);
                self.memo(path, node.id, vec![input], move |_| compute(&i))
            }
            ComputationKind::ModelCutoff(inner) => {
                self.cutoff_depth += 1;
                let out = self.computation(inner, &path.child(0));
                self.cutoff_depth -= 1;
                out
            }
            ComputationKind::Sub { from, via, into } => {
                let bound = self.computation(from, &path.child(0))?;
                self.with_bindings(&[(*via, bound)], |ev| ev.computation(into, &path.child(1)))
            }
            ComputationKind::Store { id, value, inner } => {
                let value = self.value(value, &path.child(0))?;
                self.with_bindings(&[(*id, value)], |ev| ev.computation(inner, &path.child(1)))
            }
            ComputationKind::Fetch {
                id,
                default,
                for_some,
            } => match self.env.lookup(*id).cloned() {
                Some(found) => {
                    let for_some = Rc::clone(for_some);
                    let f = Rc::clone(&found);
                    self.memo(path, node.id, vec![found], move |_| for_some(&f))
                }
                None => Ok(Rc::clone(default)),
            },
            ComputationKind::Assoc(assoc) => self.assoc(node, assoc, path, false),
            ComputationKind::AssocOn(assoc) => self.assoc(node, assoc, path, true),
            ComputationKind::AssocSimpl(simpl) => self.assoc_simpl(node, simpl, path),
            ComputationKind::Switch { tag, arms } => {
                let tag = self.value(tag, &path.child(0))?;
                let index = *downcast::<usize>(&tag)?;
                let arm = arms.get(index).ok_or_else(|| RuntimeError::SwitchOutOfRange {
                    path: path.clone(),
                    index,
                    arms: arms.len(),
                    here: node.here.clone(),
                })?;
                self.computation(arm, &path.child_at(index + 1)?)
            }
            ComputationKind::Lazy(lazy) => {
                let inner = lazy.force().ok_or_else(|| RuntimeError::LazyCycle {
                    path: path.clone(),
                    here: node.here.clone(),
                })?;
                self.computation(&inner, &path.child(0))
            }
            ComputationKind::Wrap(wrap) => {
                let model = self.model_or_default(path, &wrap.leaf);
                let inject = self.inject_for(path, &wrap.leaf);
                let bindings = [(wrap.model_id, model), (wrap.inject_id, inject)];
                let result = self.with_bindings(&bindings, |ev| {
                    ev.computation(&wrap.inner, &path.child(0))
                })?;
                self.leaves.insert(
                    path.clone(),
                    LeafEntry::Machine {
                        leaf: wrap.leaf.clone(),
                        input: Some(Rc::clone(&result)),
                        cutoff: self.cutoff_depth > 0,
                    },
                );
                Ok(result)
            }
            ComputationKind::WithModelResetter { inner, result } => {
                let value = self.computation(inner, &path.child(0))?;
                let reset = Rc::clone(
                    self.state
                        .resets
                        .entry(path.clone())
                        .or_insert_with(|| Rc::new(reset_effect(path)) as Dyn),
                );
                self.leaves.insert(
                    path.clone(),
                    LeafEntry::Resetter {
                        scope: path.child(0),
                    },
                );
                let combine = Rc::clone(result);
                let (v, r) = (Rc::clone(&value), Rc::clone(&reset));
                self.memo(path, node.id, vec![value, reset], move |_| combine(&v, &r))
            }
            ComputationKind::Path => {
                self.memo(path, node.id, Vec::new(), |_| Ok(Rc::new(path.clone()) as Dyn))
            }
            ComputationKind::Lifecycle(events) => {
                let events = self.value(events, &path.child(0))?;
                let lifecycle = downcast::<Lifecycle>(&events)?.clone();
                self.lifecycles.insert(path.clone(), lifecycle);
                self.memo(path, node.id, Vec::new(), |_| Ok(Rc::new(()) as Dyn))
            }
        }
    }

    fn assoc(
        &mut self,
        node: &ComputationNode,
        assoc: &AssocNode,
        path: &NodePath,
        keyed_by_model: bool,
    ) -> Result<Dyn, RuntimeError> {
        let map = self.value(&assoc.map, &path.child(0))?;
        let entries = (assoc.split)(&map)?;
        let replicas = path.child(1);
        let mut results = Vec::with_capacity(entries.len());
        let mut inputs = Vec::with_capacity(entries.len() * 2);
        for entry in entries {
            let at = replicas.key(entry.model_key);
            // Plain assoc keys are equal whenever their paths are.
            let key_equal = keyed_by_model.then_some(&assoc.key_equal);
            let (key, data) =
                self.stable_entry(&at, entry.key, entry.data, key_equal, &assoc.data_equal);
            let bindings = [(assoc.key_id, Rc::clone(&key)), (assoc.data_id, data)];
            let result = self.with_bindings(&bindings, |ev| ev.computation(&assoc.by, &at))?;
            inputs.push(Rc::clone(&key));
            inputs.push(Rc::clone(&result));
            results.push((key, result));
        }
        let build = Rc::clone(&assoc.build);
        self.memo(path, node.id, inputs, move |_| build(results))
    }

    fn assoc_simpl(
        &mut self,
        node: &ComputationNode,
        simpl: &AssocSimplNode,
        path: &NodePath,
    ) -> Result<Dyn, RuntimeError> {
        let map = self.value(&simpl.map, &path.child(0))?;
        let entries = (simpl.split)(&map)?;
        let replicas = path.child(1);
        let mut results = Vec::with_capacity(entries.len());
        let mut inputs = Vec::with_capacity(entries.len() * 2);
        for entry in entries {
            let at = replicas.key(entry.model_key);
            let (key, data) =
                self.stable_entry(&at, entry.key, entry.data, None, &simpl.data_equal);
            let by = Rc::clone(&simpl.by);
            let (k, d, p) = (Rc::clone(&key), Rc::clone(&data), at.clone());
            let result =
                self.memo(&at, node.id, vec![Rc::clone(&key), data], move |_| by(&p, &k, &d))?;
            inputs.push(Rc::clone(&key));
            inputs.push(Rc::clone(&result));
            results.push((key, result));
        }
        let build = Rc::clone(&simpl.build);
        self.memo(path, node.id, inputs, move |_| build(results))
    }

    fn value(&mut self, node: &Rc<ValueNode>, path: &NodePath) -> Result<Dyn, RuntimeError> {
        match &node.kind {
            ValueKind::Constant(payload) => Ok(Rc::clone(payload)),
            ValueKind::Lazy(lazy) => lazy.force().ok_or_else(|| RuntimeError::LazyCycle {
                path: path.clone(),
                here: node.here.clone(),
            }),
            ValueKind::Incr(source) => Ok(source.current()),
            ValueKind::Named(var) => self.env.lookup(*var).cloned().ok_or_else(|| {
                let err = RuntimeError::UnboundVariable {
                    var: *var,
                    path: path.clone(),
                    here: node.here.clone(),
                };
                tracing::error!(%err, "reference without an enclosing binder");
                err
            }),
            ValueKind::Both { first, second, pair } => {
                let a = self.value(first, &path.child(0))?;
                let b = self.value(second, &path.child(1))?;
                let pair = Rc::clone(pair);
                self.memo(path, node.id, vec![a, b], move |inputs| pair(inputs))
            }
            ValueKind::Cutoff { inner, equal } => {
                let value = self.value(inner, &path.child(0))?;
                let output = match self.state.memo.get(path) {
                    Some(prev) if prev.node == node.id && equal(&prev.output, &value) => {
                        Rc::clone(&prev.output)
                    }
                    _ => Rc::clone(&value),
                };
                self.next_memo.insert(
                    path.clone(),
                    Memo {
                        node: node.id,
                        inputs: vec![value],
                        output: Rc::clone(&output),
                    },
                );
                Ok(output)
            }
            ValueKind::Map { inputs, f } => {
                let mut args = Vec::with_capacity(inputs.len());
                for (i, input) in inputs.iter().enumerate() {
                    args.push(self.value(input, &path.child_at(i)?)?);
                }
                let f = Rc::clone(f);
                self.memo(path, node.id, args, move |inputs| f(inputs))
            }
        }
    }
}
