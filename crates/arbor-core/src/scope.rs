//! Dynamic scope.
//!
//! A [`DynamicVar`] is set for a subtree with [`DynamicVar::set_within`] and
//! read anywhere inside it with [`DynamicVar::lookup`]. Reads outside every
//! setter fall back to the default given at the read site.

use std::marker::PhantomData;
use std::rc::Rc;

use crate::computation::{Computation, ComputationKind, UnaryFn};
use crate::id::VarId;
use crate::location::SourceLocation;
use crate::value::{downcast, Dyn, Value};

/// A variable resolved against the nearest enclosing setter.
pub struct DynamicVar<T> {
    id: VarId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for DynamicVar<T> {
    fn clone(&self) -> Self {
        DynamicVar {
            id: self.id,
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + 'static> Default for DynamicVar<T> {
    fn default() -> Self {
        DynamicVar::new()
    }
}

impl<T: Clone + 'static> DynamicVar<T> {
    pub fn new() -> Self {
        DynamicVar {
            id: VarId::fresh(),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> VarId {
        self.id
    }

    /// Makes `value` visible to every lookup inside `inner`.
    #[track_caller]
    pub fn set_within<R: 'static>(
        &self,
        value: &Value<T>,
        inner: Computation<R>,
    ) -> Computation<R> {
        Computation::from_kind(
            ComputationKind::Store {
                id: self.id,
                value: Rc::clone(value.node()),
                inner: Rc::clone(inner.node()),
            },
            Some(SourceLocation::caller()),
        )
    }

    /// The innermost value set for this variable, or `default`.
    #[track_caller]
    pub fn lookup(&self, default: T) -> Computation<T> {
        self.lookup_map_at(SourceLocation::caller(), default, T::clone)
    }

    /// Like [`DynamicVar::lookup`], mapping the found value through `f`.
    #[track_caller]
    pub fn lookup_map<U: 'static>(
        &self,
        default: U,
        f: impl Fn(&T) -> U + 'static,
    ) -> Computation<U> {
        self.lookup_map_at(SourceLocation::caller(), default, f)
    }

    fn lookup_map_at<U: 'static>(
        &self,
        here: SourceLocation,
        default: U,
        f: impl Fn(&T) -> U + 'static,
    ) -> Computation<U> {
        let for_some: UnaryFn =
            Rc::new(move |found: &Dyn| Ok(Rc::new(f(downcast::<T>(found)?)) as Dyn));
        Computation::from_kind(
            ComputationKind::Fetch {
                id: self.id,
                default: Rc::new(default),
                for_some,
            },
            Some(here),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setter_and_lookup_share_the_variable() {
        let theme: DynamicVar<String> = DynamicVar::new();
        let inner = theme.lookup("light".to_string());
        let scoped = theme.set_within(&Value::constant("dark".to_string()), inner.clone());

        let ComputationKind::Store { id, inner: stored, .. } = &scoped.node().kind else {
            panic!("expected store");
        };
        assert_eq!(*id, theme.id());
        assert!(Rc::ptr_eq(stored, inner.node()));

        let ComputationKind::Fetch { id, default, for_some } = &inner.node().kind else {
            panic!("expected fetch");
        };
        assert_eq!(*id, theme.id());
        assert_eq!(downcast::<String>(default).unwrap(), "light");
        let found = for_some(&(Rc::new("dark".to_string()) as Dyn)).unwrap();
        assert_eq!(downcast::<String>(&found).unwrap(), "dark");
    }

    #[test]
    fn lookup_map_transforms_the_found_value() {
        let depth: DynamicVar<u32> = DynamicVar::new();
        let c = depth.lookup_map(0_usize, |d| *d as usize * 2);
        let ComputationKind::Fetch { for_some, .. } = &c.node().kind else {
            panic!("expected fetch");
        };
        let out = for_some(&(Rc::new(4_u32) as Dyn)).unwrap();
        assert_eq!(*downcast::<usize>(&out).unwrap(), 8);
    }
}
