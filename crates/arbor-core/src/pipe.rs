//! An unbounded FIFO rendezvous between senders and receivers.
//!
//! A value sent with no receiver waiting is queued; a receive with no value
//! queued waits. Whichever side arrives second resolves the oldest entry of
//! the other queue. Nothing is ever dropped.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::computation::{Computation, ComputationKind};
use crate::effect::{ApplyCtx, Callback, Continuation, Effect, Inject};
use crate::location::SourceLocation;
use crate::state::state_machine0;

/// A receive waiting for a value.
struct Receiver<A> {
    respond: Rc<RefCell<Option<Continuation<A>>>>,
}

impl<A> Clone for Receiver<A> {
    fn clone(&self) -> Self {
        Receiver {
            respond: Rc::clone(&self.respond),
        }
    }
}

impl<A> PartialEq for Receiver<A> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.respond, &other.respond)
    }
}

impl<A> fmt::Debug for Receiver<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Receiver(..)")
    }
}

impl<A: Clone + 'static> Receiver<A> {
    fn new(respond: Continuation<A>) -> Self {
        Receiver {
            respond: Rc::new(RefCell::new(Some(respond))),
        }
    }

    /// An effect that hands `value` to this receiver, once.
    fn resolve(self, value: A) -> Effect<()> {
        Effect::new(move |scheduler, k| {
            let respond = self.respond.borrow_mut().take();
            if let Some(respond) = respond {
                respond(scheduler, value.clone());
            }
            k(scheduler, ())
        })
    }
}

#[derive(Clone, PartialEq)]
struct PipeModel<A> {
    queued_values: VecDeque<A>,
    queued_receivers: VecDeque<Receiver<A>>,
}

#[derive(Clone)]
enum PipeAction<A> {
    Send(A),
    Receive(Receiver<A>),
}

fn apply_pipe<A: Clone + 'static>(
    ctx: &mut ApplyCtx<'_, PipeAction<A>>,
    mut model: PipeModel<A>,
    action: PipeAction<A>,
) -> PipeModel<A> {
    match action {
        PipeAction::Send(value) => match model.queued_receivers.pop_front() {
            Some(receiver) => ctx.schedule_event(receiver.resolve(value)),
            None => model.queued_values.push_back(value),
        },
        PipeAction::Receive(receiver) => match model.queued_values.pop_front() {
            Some(value) => ctx.schedule_event(receiver.resolve(value)),
            None => model.queued_receivers.push_back(receiver),
        },
    }
    model
}

/// A send callback and a receive effect over one shared queue.
#[track_caller]
pub fn pipe<A>() -> Computation<(Callback<A>, Effect<A>)>
where
    A: Clone + PartialEq + 'static,
{
    let here = SourceLocation::caller();
    let model = PipeModel {
        queued_values: VecDeque::new(),
        queued_receivers: VecDeque::new(),
    };
    let machine = state_machine0(model, apply_pipe::<A>);
    let at = here.clone();
    machine.sub_at(Some(here), move |pair| {
        let inject = pair
            .map_at(at.clone(), |(_, inject)| inject.clone())
            .cutoff(|a: &Inject<PipeAction<A>>, b| a == b);
        let ends = inject.map_at(at.clone(), |inject: &Inject<PipeAction<A>>| {
            let send_to = inject.clone();
            let send = Callback::new(move |value: A| send_to.call(PipeAction::Send(value)));
            let receive_from = inject.clone();
            let receive = Effect::new(move |scheduler, k: Continuation<A>| {
                let request = receive_from.call(PipeAction::Receive(Receiver::new(k)));
                request.run_with(scheduler, Box::new(|_, ()| {}));
            });
            (send, receive)
        });
        Computation::from_kind(ComputationKind::Return(Rc::clone(ends.node())), Some(at))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Scheduler;
    use crate::path::NodePath;

    fn run_model(actions: Vec<PipeAction<u32>>) -> (PipeModel<u32>, Scheduler) {
        let mut scheduler = Scheduler::new();
        let path = NodePath::root();
        let mut model = PipeModel {
            queued_values: VecDeque::new(),
            queued_receivers: VecDeque::new(),
        };
        for action in actions {
            let mut ctx = ApplyCtx::new(&mut scheduler, &path);
            model = apply_pipe(&mut ctx, model, action);
        }
        (model, scheduler)
    }

    fn receiver(log: &Rc<RefCell<Vec<(u8, u32)>>>, id: u8) -> Receiver<u32> {
        let log = Rc::clone(log);
        Receiver::new(Box::new(move |_: &mut Scheduler, v: u32| log.borrow_mut().push((id, v))))
    }

    #[test]
    fn values_wait_for_receivers() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (model, mut scheduler) = run_model(vec![
            PipeAction::Send(1),
            PipeAction::Send(2),
            PipeAction::Receive(receiver(&log, 0)),
        ]);
        assert_eq!(model.queued_values, VecDeque::from([2]));
        scheduler.drain_effects();
        assert_eq!(*log.borrow(), vec![(0, 1)]);
    }

    #[test]
    fn receivers_wait_for_values_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (model, mut scheduler) = run_model(vec![
            PipeAction::Receive(receiver(&log, 0)),
            PipeAction::Receive(receiver(&log, 1)),
            PipeAction::Send(10),
            PipeAction::Send(20),
            PipeAction::Send(30),
        ]);
        assert!(model.queued_receivers.is_empty());
        assert_eq!(model.queued_values, VecDeque::from([30]));
        scheduler.drain_effects();
        assert_eq!(*log.borrow(), vec![(0, 10), (1, 20)]);
    }

    #[test]
    fn a_receiver_resolves_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let r = receiver(&log, 0);
        let effect = r.resolve(5);
        let mut scheduler = Scheduler::new();
        scheduler.schedule(effect.clone());
        scheduler.schedule(effect);
        scheduler.drain_effects();
        assert_eq!(*log.borrow(), vec![(0, 5)]);
    }
}
