//! Deferred effects and the scheduling queue.
//!
//! An [`Effect<T>`] is a description of side-effecting work that eventually
//! produces a `T`. Nothing runs when an effect is built or when an inject
//! function is called: effects are appended to a [`Scheduler`] and executed
//! by whoever drains it (the driver, between synchronous transition
//! batches). Effects are continuation-passing, which is how an actor's
//! response gets back to the code awaiting it once the action is applied.
//!
//! The scheduler holds two FIFO queues:
//! - **effects**, drained in order; an effect may enqueue more of either;
//! - **actions**, each addressed to the structural path of a state machine,
//!   applied by the driver in order.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::path::NodePath;
use crate::value::{downcast, Dyn};

/// What to do with the result of an effect.
pub type Continuation<T> = Box<dyn FnOnce(&mut Scheduler, T)>;

// ---------------------------------------------------------------------------
// Effect
// ---------------------------------------------------------------------------

/// A deferred, re-runnable unit of work producing a `T`.
pub struct Effect<T> {
    run: Rc<dyn Fn(&mut Scheduler, Continuation<T>)>,
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Effect {
            run: Rc::clone(&self.run),
        }
    }
}

impl<T> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Effect(..)")
    }
}

impl<T> PartialEq for Effect<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.run, &other.run)
    }
}

impl<T: 'static> Effect<T> {
    /// Builds an effect from its runner. The runner must eventually hand a
    /// result to the continuation, or drop it if the effect never resolves.
    pub fn new(run: impl Fn(&mut Scheduler, Continuation<T>) + 'static) -> Self {
        Effect { run: Rc::new(run) }
    }

    /// Runs `f` when the effect is executed.
    pub fn of_fn(f: impl Fn() -> T + 'static) -> Self {
        Effect::new(move |scheduler, k| k(scheduler, f()))
    }

    /// Resolves immediately with `value`.
    pub fn return_(value: T) -> Self
    where
        T: Clone,
    {
        Effect::new(move |scheduler, k| k(scheduler, value.clone()))
    }

    /// Executes the effect, handing its result to `k`.
    pub fn run_with(&self, scheduler: &mut Scheduler, k: Continuation<T>) {
        (self.run)(scheduler, k)
    }

    pub fn map<U: 'static>(self, f: impl Fn(T) -> U + 'static) -> Effect<U> {
        let f = Rc::new(f);
        Effect::new(move |scheduler, k: Continuation<U>| {
            let f = Rc::clone(&f);
            self.run_with(scheduler, Box::new(move |s, t| k(s, f(t))));
        })
    }

    /// Sequences `f` after this effect.
    pub fn then<U: 'static>(self, f: impl Fn(T) -> Effect<U> + 'static) -> Effect<U> {
        let f = Rc::new(f);
        Effect::new(move |scheduler, k: Continuation<U>| {
            let f = Rc::clone(&f);
            self.run_with(scheduler, Box::new(move |s, t| f(t).run_with(s, k)));
        })
    }

    /// Discards the result.
    pub fn ignore(self) -> Effect<()> {
        self.map(|_| ())
    }

    /// Enqueues `action` for the state machine at `target`. The effect
    /// resolves with the machine's response once the action is applied.
    pub fn enqueue_action(target: NodePath, action: Dyn) -> Self
    where
        T: Clone,
    {
        Effect::new(move |scheduler, k: Continuation<T>| {
            let respond: Continuation<Dyn> =
                Box::new(move |s, response| match downcast::<T>(&response) {
                    Ok(response) => k(s, response.clone()),
                    Err(err) => tracing::error!(%err, "actor response has an unexpected type"),
                });
            scheduler.enqueue_action(target.clone(), Rc::clone(&action), respond);
        })
    }
}

impl Effect<()> {
    /// Does nothing.
    pub fn none() -> Self {
        Effect::new(|scheduler, k| k(scheduler, ()))
    }

    /// Runs every effect in order, then resolves.
    pub fn many(effects: Vec<Effect<()>>) -> Self {
        Effect::new(move |scheduler, k| {
            for effect in &effects {
                effect.run_with(scheduler, Box::new(|_, ()| {}));
            }
            k(scheduler, ())
        })
    }
}

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

/// A function from `A` to an effect, compared by identity.
pub struct Callback<A, R = ()> {
    f: Rc<dyn Fn(A) -> Effect<R>>,
}

/// The inject function of a state machine.
pub type Inject<A> = Callback<A, ()>;

impl<A, R> Clone for Callback<A, R> {
    fn clone(&self) -> Self {
        Callback {
            f: Rc::clone(&self.f),
        }
    }
}

impl<A, R> PartialEq for Callback<A, R> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}

impl<A, R> fmt::Debug for Callback<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

impl<A: 'static, R: 'static> Callback<A, R> {
    pub fn new(f: impl Fn(A) -> Effect<R> + 'static) -> Self {
        Callback { f: Rc::new(f) }
    }

    pub fn call(&self, arg: A) -> Effect<R> {
        (self.f)(arg)
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// An action waiting to be applied to the state machine at `target`.
pub struct PendingAction {
    pub target: NodePath,
    pub action: Dyn,
    pub respond: Continuation<Dyn>,
}

impl fmt::Debug for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAction")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// FIFO queues of pending effects and actions.
#[derive(Default)]
pub struct Scheduler {
    effects: VecDeque<Effect<()>>,
    actions: VecDeque<PendingAction>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("effects", &self.effects.len())
            .field("actions", &self.actions.len())
            .finish()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler::default()
    }

    /// Appends an effect to this cycle's queue.
    pub fn schedule(&mut self, effect: Effect<()>) {
        self.effects.push_back(effect);
    }

    /// Appends a one-shot job to the effect queue.
    pub fn schedule_once(&mut self, job: impl FnOnce(&mut Scheduler) + 'static) {
        let job = RefCell::new(Some(job));
        self.schedule(Effect::new(move |scheduler, k| {
            if let Some(job) = job.borrow_mut().take() {
                job(scheduler);
            }
            k(scheduler, ())
        }));
    }

    pub fn enqueue_action(&mut self, target: NodePath, action: Dyn, respond: Continuation<Dyn>) {
        self.actions.push_back(PendingAction {
            target,
            action,
            respond,
        });
    }

    pub fn pop_action(&mut self) -> Option<PendingAction> {
        self.actions.pop_front()
    }

    /// Runs queued effects until the effect queue is empty. Actions they
    /// enqueue are left for the caller. Returns the number of effects run.
    pub fn drain_effects(&mut self) -> usize {
        let mut ran = 0;
        while let Some(effect) = self.effects.pop_front() {
            effect.run_with(self, Box::new(|_, ()| {}));
            ran += 1;
        }
        ran
    }

    pub fn pending_effects(&self) -> usize {
        self.effects.len()
    }

    pub fn pending_actions(&self) -> usize {
        self.actions.len()
    }

    pub fn is_idle(&self) -> bool {
        self.effects.is_empty() && self.actions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Transition context
// ---------------------------------------------------------------------------

/// Handed to `apply_action`/`recv` while a transition runs.
///
/// Anything a transition wants to happen besides computing the next model
/// goes through here and is deferred: self-injected actions are applied
/// after the current one, events run at the next drain.
pub struct ApplyCtx<'a, A> {
    scheduler: &'a mut Scheduler,
    path: &'a NodePath,
    _action: PhantomData<fn(A)>,
}

impl<'a, A: 'static> ApplyCtx<'a, A> {
    pub fn new(scheduler: &'a mut Scheduler, path: &'a NodePath) -> Self {
        ApplyCtx {
            scheduler,
            path,
            _action: PhantomData,
        }
    }

    /// Queues another action for this same state machine.
    pub fn inject(&mut self, action: A) {
        self.scheduler
            .enqueue_action(self.path.clone(), Rc::new(action), Box::new(|_, _| {}));
    }

    /// Queues an effect.
    pub fn schedule_event(&mut self, effect: Effect<()>) {
        self.scheduler.schedule(effect);
    }

    /// Structural path of the machine being updated.
    pub fn path(&self) -> &NodePath {
        self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Effect<()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let record = move |msg: &str| {
            let sink = sink.clone();
            let msg = msg.to_string();
            Effect::of_fn(move || sink.borrow_mut().push(msg.clone()))
        };
        (log, record)
    }

    #[test]
    fn effects_do_not_run_until_drained() {
        let (log, record) = recorder();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(record("a"));
        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.drain_effects(), 1);
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn effects_drain_in_fifo_order() {
        let (log, record) = recorder();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(record("1"));
        scheduler.schedule(Effect::many(vec![record("2"), record("3")]));
        scheduler.schedule(record("4"));
        scheduler.drain_effects();
        assert_eq!(*log.borrow(), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn map_and_then_thread_results() {
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        let effect = Effect::return_(20)
            .map(|x| x + 1)
            .then(|x| Effect::return_(x * 2))
            .then(move |x| {
                let sink = sink.clone();
                Effect::of_fn(move || *sink.borrow_mut() = Some(x))
            });
        let mut scheduler = Scheduler::new();
        scheduler.schedule(effect);
        scheduler.drain_effects();
        assert_eq!(*seen.borrow(), Some(42));
    }

    #[test]
    fn enqueue_action_resolves_through_the_response() {
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        let target = NodePath::root().child(0);
        let effect: Effect<u32> = Effect::enqueue_action(target.clone(), Rc::new("ping"));
        let mut scheduler = Scheduler::new();
        scheduler.schedule(effect.then(move |r| {
            let sink = sink.clone();
            Effect::of_fn(move || *sink.borrow_mut() = Some(r))
        }));
        scheduler.drain_effects();
        assert_eq!(scheduler.pending_actions(), 1);

        let pending = scheduler.pop_action().unwrap();
        assert_eq!(pending.target, target);
        assert_eq!(*downcast::<&str>(&pending.action).unwrap(), "ping");
        (pending.respond)(&mut scheduler, Rc::new(7_u32));
        scheduler.drain_effects();
        assert_eq!(*seen.borrow(), Some(7));
    }

    #[test]
    fn apply_ctx_defers_injected_actions() {
        let mut scheduler = Scheduler::new();
        let path = NodePath::root().child(3);
        {
            let mut ctx: ApplyCtx<'_, i32> = ApplyCtx::new(&mut scheduler, &path);
            ctx.inject(1);
            ctx.inject(2);
            ctx.schedule_event(Effect::none());
        }
        assert_eq!(scheduler.pending_actions(), 2);
        assert_eq!(scheduler.pending_effects(), 1);
        let first = scheduler.pop_action().unwrap();
        assert_eq!(*downcast::<i32>(&first.action).unwrap(), 1);
    }

    #[test]
    fn callbacks_compare_by_identity() {
        let a: Callback<i32> = Callback::new(|_| Effect::none());
        let b: Callback<i32> = Callback::new(|_| Effect::none());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
