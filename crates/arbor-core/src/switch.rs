//! Branching between computations.
//!
//! Only the selected arm of a [`switch`] is active. Arms that become
//! inactive lose their models at the end of the frame and their lifecycle
//! deactivation events fire; arms that become active start from their
//! default models.

use std::rc::Rc;

use crate::computation::{Computation, ComputationKind};
use crate::location::SourceLocation;
use crate::value::Value;

/// Activates `arms[tag]`. A tag outside the arms is a runtime error.
#[track_caller]
pub fn switch<R: 'static>(tag: &Value<usize>, arms: Vec<Computation<R>>) -> Computation<R> {
    switch_at(SourceLocation::caller(), tag, arms)
}

fn switch_at<R: 'static>(
    here: SourceLocation,
    tag: &Value<usize>,
    arms: Vec<Computation<R>>,
) -> Computation<R> {
    Computation::from_kind(
        ComputationKind::Switch {
            tag: Rc::clone(tag.node()),
            arms: arms.iter().map(|arm| Rc::clone(arm.node())).collect(),
        },
        Some(here),
    )
}

/// A finite set of tags a computation can branch on.
pub trait Enumerable: Clone + PartialEq + 'static {
    /// Every value, in a fixed order.
    fn all() -> Vec<Self>;
}

impl Enumerable for bool {
    fn all() -> Vec<Self> {
        vec![false, true]
    }
}

/// Builds one arm per value of `K` and activates the one matching `on`.
///
/// `with` runs once per value while the graph is built.
#[track_caller]
pub fn switch_enum<K, R>(
    on: &Value<K>,
    mut with: impl FnMut(&K) -> Computation<R>,
) -> Computation<R>
where
    K: Enumerable,
    R: 'static,
{
    let here = SourceLocation::caller();
    let all = K::all();
    let arms: Vec<Computation<R>> = all.iter().map(&mut with).collect();
    let tag = on.map_at(here.clone(), move |k| {
        all.iter().position(|c| c == k).unwrap_or(usize::MAX)
    });
    switch_at(here, &tag, arms)
}
