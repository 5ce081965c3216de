//! Externally settable inputs.
//!
//! A [`Var<T>`] is the boundary through which data produced outside the graph
//! (RPC results, timers, test fixtures) enters it. Setting a var only swaps
//! the stored payload; the graph observes the new payload the next time a
//! driver evaluates a frame, never synchronously.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::location::SourceLocation;
use crate::value::{Dyn, Value, ValueKind};

/// Erased read access to a var's current payload.
pub trait VarSource {
    /// The current payload. Its identity only changes when the var is set.
    fn current(&self) -> Dyn;
}

struct VarCell<T> {
    value: RefCell<Rc<T>>,
}

impl<T: 'static> VarSource for VarCell<T> {
    fn current(&self) -> Dyn {
        let value: Rc<T> = Rc::clone(&self.value.borrow());
        value
    }
}

/// A mutable cell readable from inside the graph.
pub struct Var<T> {
    cell: Rc<VarCell<T>>,
}

impl<T> Clone for Var<T> {
    fn clone(&self) -> Self {
        Var {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Var<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Var").field(&*self.cell.value.borrow()).finish()
    }
}

impl<T: Clone + 'static> Var<T> {
    pub fn create(initial: T) -> Self {
        Var {
            cell: Rc::new(VarCell {
                value: RefCell::new(Rc::new(initial)),
            }),
        }
    }

    pub fn get(&self) -> T {
        T::clone(&self.cell.value.borrow())
    }

    pub fn set(&self, value: T) {
        *self.cell.value.borrow_mut() = Rc::new(value);
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.cell.value.borrow());
        self.set(next);
    }

    /// A read-only graph handle on this var.
    #[track_caller]
    pub fn value(&self) -> Value<T> {
        let source: Rc<dyn VarSource> = self.cell.clone();
        Value::from_kind(ValueKind::Incr(source), Some(SourceLocation::caller()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_update() {
        let var = Var::create(1);
        assert_eq!(var.get(), 1);
        var.set(5);
        assert_eq!(var.get(), 5);
        var.update(|x| x * 2);
        assert_eq!(var.get(), 10);
    }

    #[test]
    fn payload_identity_changes_only_on_set() {
        let var = Var::create(String::from("a"));
        let source: Rc<dyn VarSource> = var.cell.clone();
        let first = source.current();
        let again = source.current();
        assert!(Rc::ptr_eq(&first, &again));

        var.set(String::from("a"));
        let after = source.current();
        assert!(!Rc::ptr_eq(&first, &after));
    }

    #[test]
    fn value_handle_is_an_incr_node() {
        let var = Var::create(0_u8);
        assert_eq!(var.value().node().kind.tag(), "incr");
    }
}
