//! Self-referential state: `wrap`, fixed-point injection and model resets.

use std::rc::Rc;

use crate::computation::{CombineFn, Computation, ComputationKind, WrapNode};
use crate::effect::{ApplyCtx, Effect, Inject};
use crate::error::CoreError;
use crate::id::VarId;
use crate::location::SourceLocation;
use crate::path::NodePath;
use crate::state::make_leaf;
use crate::value::{downcast, Dyn, Value};

/// A state machine whose model and inject are visible to the computation
/// whose result its transitions read.
///
/// `f` receives the wrapper's current model and inject function; its result
/// becomes the wrapper's result and the input handed to `apply_action`.
#[track_caller]
pub fn wrap<M, A, R>(
    default_model: M,
    apply_action: impl Fn(&mut ApplyCtx<'_, A>, &R, M, A) -> M + 'static,
    f: impl FnOnce(Value<M>, Value<Inject<A>>) -> Computation<R>,
) -> Computation<R>
where
    M: Clone + PartialEq + 'static,
    A: Clone + 'static,
    R: 'static,
{
    let here = SourceLocation::caller();
    let model_id = VarId::fresh();
    let inject_id = VarId::fresh();
    let inner = f(
        Value::named(model_id, Some(here.clone())),
        Value::named(inject_id, Some(here.clone())),
    );
    let leaf = make_leaf(default_model, move |ctx, input, model, action| {
        let result = match input {
            Some(input) => downcast::<R>(input)?,
            None => {
                return Err(CoreError::MissingInput {
                    path: ctx.path().to_string(),
                })
            }
        };
        Ok((apply_action(ctx, result, model, action), ()))
    });
    Computation::from_kind(
        ComputationKind::Wrap(Rc::new(WrapNode {
            model_id,
            inject_id,
            inner: Rc::clone(inner.node()),
            leaf,
        })),
        Some(here),
    )
}

/// Lets `f` refer to an inject function that is only produced by `f`
/// itself. Actions sent to the placeholder are forwarded to the inject
/// function `f` returns, as of the frame in which they are applied.
#[track_caller]
pub fn with_inject_fixed_point<A, R>(
    f: impl FnOnce(Value<Inject<A>>) -> Computation<(R, Inject<A>)>,
) -> Computation<R>
where
    A: Clone + 'static,
    R: Clone + 'static,
{
    let here = SourceLocation::caller();
    wrap(
        (),
        |ctx, (_, forward): &(R, Inject<A>), (), action: A| {
            ctx.schedule_event(forward.call(action))
        },
        |_, inject| f(inject),
    )
    .map_at(here, |(result, _)| result.clone())
}

/// The action a model resetter sends to itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetModels;

/// The reset effect for the resetter at `path`. Running it discards every
/// model below the resetter's inner computation; they restart from their
/// defaults on the next frame.
pub fn reset_effect(path: &NodePath) -> Effect<()> {
    Effect::enqueue_action(path.clone(), Rc::new(ResetModels))
}

/// Pairs `inner`'s result with an effect that resets every model inside it.
#[track_caller]
pub fn with_model_resetter<R: Clone + 'static>(
    inner: Computation<R>,
) -> Computation<(R, Effect<()>)> {
    let result: CombineFn = Rc::new(|value: &Dyn, reset: &Dyn| {
        let value = downcast::<R>(value)?.clone();
        let reset = downcast::<Effect<()>>(reset)?.clone();
        Ok(Rc::new((value, reset)) as Dyn)
    });
    Computation::from_kind(
        ComputationKind::WithModelResetter {
            inner: Rc::clone(inner.node()),
            result,
        },
        Some(SourceLocation::caller()),
    )
}
