//! Lifecycle events and edge-triggered reactions.
//!
//! A [`lifecycle`] node registers up to three effects for its position in
//! the tree. The driver diffs the set of registered positions every frame
//! and schedules, in this order: every deactivation, every activation, then
//! every after-display. [`on_change`], [`on_change_with_prev`] and
//! [`mirror`] are built from a state machine remembering the last observed
//! value plus an after-display effect.

use std::fmt;
use std::rc::Rc;

use crate::computation::{Computation, ComputationKind};
use crate::effect::{Callback, Effect, Inject};
use crate::location::SourceLocation;
use crate::state::state_machine0;
use crate::value::{map2, map3, Value};

/// Effects attached to a position in the tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lifecycle {
    pub on_activate: Option<Effect<()>>,
    pub on_deactivate: Option<Effect<()>>,
    pub after_display: Option<Effect<()>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Lifecycle::default()
    }

    pub fn on_activate(mut self, effect: Effect<()>) -> Self {
        self.on_activate = Some(effect);
        self
    }

    pub fn on_deactivate(mut self, effect: Effect<()>) -> Self {
        self.on_deactivate = Some(effect);
        self
    }

    pub fn after_display(mut self, effect: Effect<()>) -> Self {
        self.after_display = Some(effect);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.on_activate.is_none() && self.on_deactivate.is_none() && self.after_display.is_none()
    }
}

/// Registers `events` for this position while it is active.
#[track_caller]
pub fn lifecycle(events: &Value<Lifecycle>) -> Computation<()> {
    lifecycle_at(SourceLocation::caller(), events)
}

fn lifecycle_at(here: SourceLocation, events: &Value<Lifecycle>) -> Computation<()> {
    Computation::from_kind(ComputationKind::Lifecycle(Rc::clone(events.node())), Some(here))
}

/// The last value an edge trigger acted on, compared with the trigger's
/// own equality.
#[derive(Clone)]
struct LastSeen<T> {
    value: Option<T>,
    equal: Rc<dyn Fn(&T, &T) -> bool>,
}

impl<T> PartialEq for LastSeen<T> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.value, &other.value) {
            (None, None) => true,
            (Some(a), Some(b)) => (self.equal)(a, b),
            _ => false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for LastSeen<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LastSeen").field(&self.value).finish()
    }
}

/// Calls `callback` with `(previous, current)` after every frame in which
/// `value` differs from the last value the callback was called with, and
/// once for the first value observed.
#[track_caller]
pub fn on_change_with_prev<T>(
    value: &Value<T>,
    equal: impl Fn(&T, &T) -> bool + 'static,
    callback: &Value<Callback<(Option<T>, T)>>,
) -> Computation<()>
where
    T: Clone + 'static,
{
    on_change_with_prev_at(SourceLocation::caller(), value, Rc::new(equal), callback)
}

fn on_change_with_prev_at<T>(
    here: SourceLocation,
    value: &Value<T>,
    equal: Rc<dyn Fn(&T, &T) -> bool>,
    callback: &Value<Callback<(Option<T>, T)>>,
) -> Computation<()>
where
    T: Clone + 'static,
{
    let initial = LastSeen { value: None, equal };
    let last_seen = state_machine0(initial, |_, model: LastSeen<T>, seen: T| LastSeen {
        value: Some(seen),
        ..model
    });
    let value = value.clone();
    let callback = callback.clone();
    let at = here.clone();
    last_seen.sub_at(Some(here), move |last_seen| {
        let events = map3(
            &last_seen,
            &value,
            &callback,
            |(last, remember): &(LastSeen<T>, Inject<T>),
             current: &T,
             callback: &Callback<(Option<T>, T)>| {
                let changed = match &last.value {
                    None => true,
                    Some(prev) => !(last.equal)(prev, current),
                };
                if !changed {
                    return Lifecycle::new();
                }
                Lifecycle::new().after_display(Effect::many(vec![
                    remember.call(current.clone()),
                    callback.call((last.value.clone(), current.clone())),
                ]))
            },
        );
        lifecycle_at(at, &events)
    })
}

/// Calls `callback` with the new value whenever `value` changes.
#[track_caller]
pub fn on_change<T>(
    value: &Value<T>,
    equal: impl Fn(&T, &T) -> bool + 'static,
    callback: &Value<Callback<T>>,
) -> Computation<()>
where
    T: Clone + 'static,
{
    let here = SourceLocation::caller();
    let callback = callback.map_at(here.clone(), |callback: &Callback<T>| {
        let callback = callback.clone();
        Callback::new(move |(_, current): (Option<T>, T)| callback.call(current))
    });
    on_change_with_prev_at(here, value, Rc::new(equal), &callback)
}

/// What `mirror` does for one observed change of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorAction {
    Nothing,
    StoreToInteractive,
    InteractiveToStore,
    /// Neither side changed, which the change detection should rule out.
    Impossible,
}

/// Decides how to reconcile `(store, interactive)` given the pair observed
/// last time.
pub fn reconcile<T: PartialEq>(prev: Option<&(T, T)>, current: &(T, T)) -> MirrorAction {
    let (store, interactive) = current;
    if store == interactive {
        return MirrorAction::Nothing;
    }
    match prev {
        None => MirrorAction::StoreToInteractive,
        Some((prev_store, prev_interactive)) => {
            let store_changed = prev_store != store;
            let interactive_changed = prev_interactive != interactive;
            match (store_changed, interactive_changed) {
                (_, true) => MirrorAction::InteractiveToStore,
                (true, false) => MirrorAction::StoreToInteractive,
                (false, false) => MirrorAction::Impossible,
            }
        }
    }
}

/// Keeps a store value and an interactive copy in sync.
///
/// The first time they are seen to differ, the store wins. Afterwards, a
/// change on the interactive side is pushed to the store, even if the store
/// also changed; a change on the store side alone is pushed to the
/// interactive side.
#[track_caller]
pub fn mirror<T>(
    store_set: &Value<Callback<T>>,
    store_value: &Value<T>,
    interactive_set: &Value<Callback<T>>,
    interactive_value: &Value<T>,
) -> Computation<()>
where
    T: Clone + PartialEq + fmt::Debug + 'static,
{
    let here = SourceLocation::caller();
    let pair = store_value.both(interactive_value);
    let at = here.clone();
    let reconcile_with = move |store_set: &Callback<T>, interactive_set: &Callback<T>| {
        let store_set = store_set.clone();
        let interactive_set = interactive_set.clone();
        let at = at.clone();
        Callback::new(move |(prev, current): (Option<(T, T)>, (T, T))| {
            match reconcile(prev.as_ref(), &current) {
                MirrorAction::Nothing => Effect::none(),
                MirrorAction::StoreToInteractive => interactive_set.call(current.0),
                MirrorAction::InteractiveToStore => store_set.call(current.1),
                MirrorAction::Impossible => {
                    tracing::error!(
                        here = %at,
                        store = ?current.0,
                        interactive = ?current.1,
                        "mirror reconciliation fired although neither side changed"
                    );
                    Effect::none()
                }
            }
        })
    };
    let callback = map2(store_set, interactive_set, reconcile_with);
    on_change_with_prev_at(here, &pair, Rc::new(|a: &(T, T), b: &(T, T)| a == b), &callback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_wins_the_first_divergence() {
        let current = ("x", "y");
        assert_eq!(reconcile(None, &current), MirrorAction::StoreToInteractive);
    }

    #[test]
    fn interactive_wins_afterwards() {
        let prev = ("x", "x");
        assert_eq!(reconcile(Some(&prev), &("x", "z")), MirrorAction::InteractiveToStore);
        assert_eq!(reconcile(Some(&prev), &("w", "z")), MirrorAction::InteractiveToStore);
        assert_eq!(reconcile(Some(&prev), &("w", "x")), MirrorAction::StoreToInteractive);
    }

    #[test]
    fn agreeing_sides_need_nothing() {
        assert_eq!(reconcile(None, &(1, 1)), MirrorAction::Nothing);
        assert_eq!(reconcile(Some(&(0, 2)), &(1, 1)), MirrorAction::Nothing);
    }

    #[test]
    fn unchanged_divergence_is_flagged() {
        let prev = ("a", "b");
        assert_eq!(reconcile(Some(&prev), &("a", "b")), MirrorAction::Impossible);
    }

    #[test]
    fn last_seen_uses_the_supplied_equality() {
        let equal: Rc<dyn Fn(&f64, &f64) -> bool> = Rc::new(|a: &f64, b: &f64| (a - b).abs() < 0.5);
        let a = LastSeen {
            value: Some(1.0),
            equal: equal.clone(),
        };
        let b = LastSeen {
            value: Some(1.2),
            equal: equal.clone(),
        };
        let none = LastSeen { value: None, equal };
        assert_eq!(a, b);
        assert_ne!(a, none);
    }

    #[test]
    fn lifecycle_builders_fill_slots() {
        let events = Lifecycle::new().on_activate(Effect::none());
        assert!(events.on_activate.is_some());
        assert!(events.after_display.is_none());
        assert!(!events.is_empty());
        assert!(Lifecycle::new().is_empty());
        assert_eq!(lifecycle(&Value::constant(events)).node().kind.tag(), "lifecycle");
    }
}
