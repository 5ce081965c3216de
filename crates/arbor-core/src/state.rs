//! State machines, actors and the helpers built on them.
//!
//! Every stateful combinator in this crate bottoms out in a [`Leaf`]: a
//! default model, an erased transition and a way to build the inject
//! callback for a given path. The typed constructors here are the only
//! place that erases models and actions, so the downcasts in the transitions
//! cannot fail for graphs built through this API.

use std::rc::Rc;

use crate::computation::{ApplyFn, CombineFn, Computation, ComputationKind, InjectFn, Leaf};
use crate::effect::{ApplyCtx, Callback, Effect, Inject, Scheduler};
use crate::error::CoreError;
use crate::location::SourceLocation;
use crate::path::NodePath;
use crate::value::{downcast, equal_fn, Dyn, Value};

/// Erases a typed transition into a [`Leaf`]. `input` is `Some` exactly
/// when the machine was built with an input value.
pub(crate) fn make_leaf<M, A, R>(
    default_model: M,
    transition: impl Fn(&mut ApplyCtx<'_, A>, Option<&Dyn>, M, A) -> Result<(M, R), CoreError>
        + 'static,
) -> Leaf
where
    M: Clone + PartialEq + 'static,
    A: Clone + 'static,
    R: Clone + 'static,
{
    let apply: ApplyFn = Rc::new(
        move |scheduler: &mut Scheduler,
              path: &NodePath,
              input: Option<&Dyn>,
              model: &Dyn,
              action: Dyn| {
            let model = downcast::<M>(model)?.clone();
            let action = downcast::<A>(&action)?.clone();
            let mut ctx = ApplyCtx::new(scheduler, path);
            let (model, response) = transition(&mut ctx, input, model, action)?;
            Ok((Rc::new(model) as Dyn, Rc::new(response) as Dyn))
        },
    );
    let make_inject: InjectFn = Rc::new(|path: &NodePath| {
        let path = path.clone();
        let callback: Callback<A, R> =
            Callback::new(move |action: A| Effect::enqueue_action(path.clone(), Rc::new(action)));
        Rc::new(callback) as Dyn
    });
    Leaf {
        default_model: Rc::new(default_model),
        apply,
        equal: equal_fn::<M>(),
        make_inject,
    }
}

/// Pairs the model with the inject callback.
pub(crate) fn pair_result<M, A, R>() -> CombineFn
where
    M: Clone + 'static,
    A: 'static,
    R: 'static,
{
    Rc::new(|model: &Dyn, inject: &Dyn| {
        let model = downcast::<M>(model)?.clone();
        let inject = downcast::<Callback<A, R>>(inject)?.clone();
        Ok(Rc::new((model, inject)) as Dyn)
    })
}

fn input_of<'a, I: 'static>(path: &NodePath, input: Option<&'a Dyn>) -> Result<&'a I, CoreError> {
    match input {
        Some(input) => downcast::<I>(input),
        None => Err(CoreError::MissingInput {
            path: path.to_string(),
        }),
    }
}

/// A state machine with no input.
///
/// Produces the current model and an inject function. Calling inject only
/// builds an effect; the action is applied once that effect runs and the
/// driver processes its action queue. `apply_action` may inject further
/// actions through the context; they are applied after the current one.
#[track_caller]
pub fn state_machine0<M, A>(
    default_model: M,
    apply_action: impl Fn(&mut ApplyCtx<'_, A>, M, A) -> M + 'static,
) -> Computation<(M, Inject<A>)>
where
    M: Clone + PartialEq + 'static,
    A: Clone + 'static,
{
    let leaf = make_leaf(default_model, move |ctx, _, model, action| {
        Ok((apply_action(ctx, model, action), ()))
    });
    Computation::from_kind(
        ComputationKind::Leaf0 {
            leaf: Rc::new(leaf),
            result: pair_result::<M, A, ()>(),
        },
        Some(SourceLocation::caller()),
    )
}

/// A state machine whose transitions also read the current `input`.
#[track_caller]
pub fn state_machine1<I, M, A>(
    input: &Value<I>,
    default_model: M,
    apply_action: impl Fn(&mut ApplyCtx<'_, A>, &I, M, A) -> M + 'static,
) -> Computation<(M, Inject<A>)>
where
    I: 'static,
    M: Clone + PartialEq + 'static,
    A: Clone + 'static,
{
    let leaf = make_leaf(default_model, move |ctx, input, model, action| {
        let input = input_of::<I>(ctx.path(), input)?;
        Ok((apply_action(ctx, input, model, action), ()))
    });
    Computation::from_kind(
        ComputationKind::Leaf1 {
            input: Rc::clone(input.node()),
            leaf: Rc::new(leaf),
            result: pair_result::<M, A, ()>(),
        },
        Some(SourceLocation::caller()),
    )
}

/// A state machine whose transition also produces a response.
///
/// Calling the returned callback yields an effect that resolves with the
/// response once the action has been applied.
#[track_caller]
pub fn actor0<M, A, R>(
    default_model: M,
    recv: impl Fn(&mut ApplyCtx<'_, A>, M, A) -> (M, R) + 'static,
) -> Computation<(M, Callback<A, R>)>
where
    M: Clone + PartialEq + 'static,
    A: Clone + 'static,
    R: Clone + 'static,
{
    let leaf = make_leaf(default_model, move |ctx, _, model, action| Ok(recv(ctx, model, action)));
    Computation::from_kind(
        ComputationKind::Leaf0 {
            leaf: Rc::new(leaf),
            result: pair_result::<M, A, R>(),
        },
        Some(SourceLocation::caller()),
    )
}

/// An actor whose transitions also read the current `input`.
#[track_caller]
pub fn actor1<I, M, A, R>(
    input: &Value<I>,
    default_model: M,
    recv: impl Fn(&mut ApplyCtx<'_, A>, &I, M, A) -> (M, R) + 'static,
) -> Computation<(M, Callback<A, R>)>
where
    I: 'static,
    M: Clone + PartialEq + 'static,
    A: Clone + 'static,
    R: Clone + 'static,
{
    let leaf = make_leaf(default_model, move |ctx, input, model, action| {
        let input = input_of::<I>(ctx.path(), input)?;
        Ok(recv(ctx, input, model, action))
    });
    Computation::from_kind(
        ComputationKind::Leaf1 {
            input: Rc::clone(input.node()),
            leaf: Rc::new(leaf),
            result: pair_result::<M, A, R>(),
        },
        Some(SourceLocation::caller()),
    )
}

/// A model replaced wholesale by every action.
#[track_caller]
pub fn state<M>(default_model: M) -> Computation<(M, Inject<M>)>
where
    M: Clone + PartialEq + 'static,
{
    state_machine0(default_model, |_, _, next| next)
}

/// Like [`state`], starting from `None`.
#[track_caller]
pub fn state_opt<M>(default_model: Option<M>) -> Computation<(Option<M>, Inject<Option<M>>)>
where
    M: Clone + PartialEq + 'static,
{
    state(default_model)
}

/// A boolean and an effect that flips it.
#[track_caller]
pub fn toggle(default_model: bool) -> Computation<(bool, Effect<()>)> {
    let here = SourceLocation::caller();
    state_machine0(default_model, |_, model: bool, ()| !model)
        .map_at(here, |(model, inject)| (*model, inject.call(())))
}

/// A monotonic id source: every call resolves with the next id, starting at 0.
#[track_caller]
pub fn id_gen() -> Computation<Callback<(), u64>> {
    let here = SourceLocation::caller();
    actor0(0_u64, |_, next, ()| (next + 1, next)).map_at(here, |(_, fetch)| fetch.clone())
}
