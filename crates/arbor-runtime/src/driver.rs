//! The frame driver.
//!
//! A [`Driver`] owns everything a computation needs at run time: the models
//! of its state machines (keyed by structural path), the scheduler queues,
//! the previous frame's memo tables and the set of active lifecycle
//! positions. One [`Driver::flush`] is one cycle:
//!
//! 1. drain the effect queue and apply queued actions, in FIFO order, until
//!    both queues are empty;
//! 2. recompute the frame;
//! 3. schedule lifecycle effects (every deactivation, then every
//!    activation, then every after-display) and drain the effects once more.
//!
//! Actions enqueued while running step 3 wait for the next flush.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use arbor_core::effect::PendingAction;
use arbor_core::{
    downcast, Computation, ComputationNode, Dyn, Effect, Lifecycle, NodePath, Scheduler,
};
use indexmap::IndexMap;

use crate::config::DriverConfig;
use crate::error::RuntimeError;
use crate::eval::{self, FrameOutput, FrameState, LeafEntry};
use crate::trace::TraceEntry;

/// Runs a computation producing an `R`.
pub struct Driver<R> {
    root: Rc<ComputationNode>,
    config: DriverConfig,
    scheduler: Scheduler,
    state: FrameState,
    leaves: HashMap<NodePath, LeafEntry>,
    lifecycles: IndexMap<NodePath, Lifecycle>,
    result: Dyn,
    result_changed: bool,
    frame: u64,
    trace: Vec<TraceEntry>,
    _result: PhantomData<fn() -> R>,
}

impl<R: 'static> Driver<R> {
    /// Computes the first frame with the default configuration.
    pub fn new(computation: &Computation<R>) -> Result<Self, RuntimeError> {
        Self::with_config(computation, DriverConfig::default())
    }

    /// Computes the first frame, then runs its activation and
    /// after-display effects.
    pub fn with_config(
        computation: &Computation<R>,
        config: DriverConfig,
    ) -> Result<Self, RuntimeError> {
        let root = Rc::clone(computation.node());
        let mut state = FrameState::default();
        let output = eval::evaluate(&root, &mut state)?;
        let mut driver = Driver {
            root,
            config,
            scheduler: Scheduler::new(),
            state,
            leaves: HashMap::new(),
            lifecycles: IndexMap::new(),
            result: Rc::clone(&output.result),
            result_changed: true,
            frame: 0,
            trace: Vec::new(),
            _result: PhantomData,
        };
        driver.finish_frame(output);
        Ok(driver)
    }

    /// The result of the last computed frame.
    pub fn result(&self) -> Result<&R, RuntimeError> {
        Ok(downcast::<R>(&self.result)?)
    }

    /// Whether the last frame produced a different result payload than the
    /// one before it.
    pub fn result_changed(&self) -> bool {
        self.result_changed
    }

    /// Number of frames computed after the first one.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Queues an effect for the next flush.
    pub fn schedule(&mut self, effect: Effect<()>) {
        self.scheduler.schedule(effect);
    }

    pub fn has_pending_work(&self) -> bool {
        !self.scheduler.is_idle()
    }

    /// Number of stored models. A machine stores one once it has applied an
    /// action, and keeps it while its path stays active.
    pub fn model_count(&self) -> usize {
        self.state.models.len()
    }

    /// Paths of the lifecycle positions active in the last frame.
    pub fn active_lifecycles(&self) -> impl Iterator<Item = &NodePath> {
        self.lifecycles.keys()
    }

    /// Recorded events; empty unless tracing is enabled.
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Applies everything queued, then computes one frame.
    pub fn flush(&mut self) -> Result<(), RuntimeError> {
        let mut rounds = 0;
        loop {
            self.scheduler.drain_effects();
            let Some(pending) = self.scheduler.pop_action() else {
                break;
            };
            if rounds == self.config.max_action_rounds {
                tracing::error!(rounds, "state machines keep injecting actions");
                return Err(RuntimeError::ActionLoop { rounds });
            }
            rounds += 1;
            self.apply_action(pending)?;
        }
        self.recompute()
    }

    /// Flushes at least once, then as long as work remains.
    pub fn settle(&mut self) -> Result<(), RuntimeError> {
        for _ in 0..self.config.max_settle_flushes {
            self.flush()?;
            if !self.has_pending_work() {
                return Ok(());
            }
        }
        Err(RuntimeError::NotSettled {
            flushes: self.config.max_settle_flushes,
        })
    }

    fn record(&mut self, entry: impl FnOnce(u64) -> TraceEntry) {
        if self.config.trace_enabled {
            self.trace.push(entry(self.frame));
        }
    }

    fn apply_action(&mut self, pending: PendingAction) -> Result<(), RuntimeError> {
        let PendingAction {
            target,
            action,
            respond,
        } = pending;
        let Some(entry) = self.leaves.get(&target).cloned() else {
            tracing::warn!(%target, "dropping action for an inactive state machine");
            self.record(|frame| TraceEntry::ActionDropped { frame, target });
            return Ok(());
        };
        let response = match entry {
            LeafEntry::Machine { leaf, input, cutoff } => {
                let model = match self.state.models.get(&target) {
                    Some(model) => Rc::clone(model),
                    None => Rc::clone(&leaf.default_model),
                };
                let (next, response) =
                    (leaf.apply)(&mut self.scheduler, &target, input.as_ref(), &model, action)?;
                let next = if cutoff && (leaf.equal)(&model, &next) { model } else { next };
                self.state.models.insert(target.clone(), next);
                response
            }
            LeafEntry::Resetter { scope } => {
                let before = self.state.models.len();
                self.state.models.retain(|path, _| !path.starts_with(&scope));
                let discarded = before - self.state.models.len();
                tracing::debug!(%scope, discarded, "models reset");
                self.record(|frame| TraceEntry::ModelsReset {
                    frame,
                    scope,
                    discarded,
                });
                Rc::new(()) as Dyn
            }
        };
        tracing::trace!(%target, "action applied");
        self.record(|frame| TraceEntry::ActionApplied { frame, target });
        self.scheduler.schedule_once(move |scheduler| respond(scheduler, response));
        Ok(())
    }

    fn recompute(&mut self) -> Result<(), RuntimeError> {
        let output = eval::evaluate(&self.root, &mut self.state)?;
        self.frame += 1;
        self.result_changed = !Rc::ptr_eq(&self.result, &output.result);
        self.result = Rc::clone(&output.result);
        tracing::debug!(
            frame = self.frame,
            changed = self.result_changed,
            machines = output.leaves.len(),
            "frame computed"
        );
        self.finish_frame(output);
        Ok(())
    }

    /// Drops state of positions that disappeared and runs the lifecycle
    /// effects of the new frame.
    fn finish_frame(&mut self, output: FrameOutput) {
        let FrameOutput {
            leaves, lifecycles, ..
        } = output;
        self.state.models.retain(|path, _| leaves.contains_key(path));
        self.state.injects.retain(|path, _| leaves.contains_key(path));
        self.state.resets.retain(|path, _| leaves.contains_key(path));
        self.leaves = leaves;

        let previous = std::mem::replace(&mut self.lifecycles, lifecycles);
        let mut effects = Vec::new();
        let mut events = Vec::new();
        for (path, lifecycle) in &previous {
            if !self.lifecycles.contains_key(path) {
                events.push(TraceEntry::Deactivated {
                    frame: self.frame,
                    path: path.clone(),
                });
                effects.extend(lifecycle.on_deactivate.clone());
            }
        }
        for (path, lifecycle) in &self.lifecycles {
            if !previous.contains_key(path) {
                events.push(TraceEntry::Activated {
                    frame: self.frame,
                    path: path.clone(),
                });
                effects.extend(lifecycle.on_activate.clone());
            }
        }
        effects.extend(
            self.lifecycles
                .values()
                .filter_map(|lifecycle| lifecycle.after_display.clone()),
        );

        if self.config.trace_enabled {
            self.trace.extend(events);
        }
        for effect in effects {
            self.scheduler.schedule(effect);
        }
        self.scheduler.drain_effects();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{state_machine0, Var};

    #[test]
    fn constant_computation_has_a_result() {
        let driver = Driver::new(&Computation::const_(5_u32)).unwrap();
        assert_eq!(*driver.result().unwrap(), 5);
        assert!(driver.result_changed());
        assert!(!driver.has_pending_work());
    }

    #[test]
    fn unchanged_frames_keep_the_result_payload() {
        let var = Var::create(1_i32);
        let doubled = Computation::return_(&var.value().map(|x| x * 2));
        let mut driver = Driver::new(&doubled).unwrap();
        driver.flush().unwrap();
        assert!(!driver.result_changed());

        var.set(4);
        driver.flush().unwrap();
        assert!(driver.result_changed());
        assert_eq!(*driver.result().unwrap(), 8);
        assert_eq!(driver.frame(), 2);
    }

    #[test]
    fn transitions_update_the_model() {
        let counter = state_machine0(0_i32, |_, n: i32, by: i32| n + by);
        let mut driver = Driver::new(&counter).unwrap();
        let inject = driver.result().unwrap().1.clone();
        assert_eq!(driver.model_count(), 0);
        driver.schedule(inject.call(2));
        driver.schedule(inject.call(3));
        driver.flush().unwrap();
        assert_eq!(driver.result().unwrap().0, 5);
        assert_eq!(driver.model_count(), 1);
    }

    #[test]
    fn runaway_actions_are_bounded() {
        let looping = state_machine0(0_u32, |ctx, n: u32, ()| {
            ctx.inject(());
            n + 1
        });
        let config = DriverConfig {
            max_action_rounds: 50,
            ..DriverConfig::default()
        };
        let mut driver = Driver::with_config(&looping, config).unwrap();
        let inject = driver.result().unwrap().1.clone();
        driver.schedule(inject.call(()));
        let err = driver.flush().unwrap_err();
        assert!(matches!(err, RuntimeError::ActionLoop { rounds: 50 }));
    }

    #[test]
    fn wrong_result_type_is_reported() {
        let mut driver = Driver::new(&Computation::const_(String::new())).unwrap();
        assert!(driver.result().is_ok());
        driver.result = Rc::new(0_u8) as Dyn;
        assert!(matches!(driver.result(), Err(RuntimeError::Core(_))));
    }
}
