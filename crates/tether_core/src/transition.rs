//! Transition manager
//!
//! A transition turns a list of [`Action`]s into committed property values
//! and bindings, optionally handing part of the work to an animation:
//!
//! 1. any in-flight transition is interrupted
//! 2. bindings currently driving the affected properties are disabled
//! 3. when bindings change and an animation is supplied, every "to" side is
//!    applied speculatively to learn the end values, then rewound
//! 4. the animation claims the properties it will animate
//! 5. remaining actions are applied immediately
//! 6. on completion the "to" bindings are installed and the final values
//!    of animated properties are written
//!
//! Bindings in the actions are handed over to the engine only in step 6.
//! Until then an owned but unapplied "to" binding is destroyed by an
//! interrupt or [`TransitionManager::cancel`].

use std::fmt;

use crate::binding::BindingId;
use crate::engine::Engine;
use crate::property::{PropertyHandle, WriteFlags};
use crate::value::Value;

/// Why an action event is being run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventReason {
    /// The change is being committed
    ActualChange,
    /// The change is applied speculatively to read end values
    FastForward,
}

/// A state change that is not a plain property write
///
/// Events that change bindings are deferred to the commit phase together
/// with binding actions.
pub trait ActionEvent: Send {
    fn name(&self) -> &str;

    fn execute(&mut self, engine: &mut Engine, reason: EventReason);

    fn is_reversible(&self) -> bool {
        false
    }

    fn reverse(&mut self, _engine: &mut Engine, _reason: EventReason) {}

    /// Capture the values the event produces, after a fast-forward
    fn save_target_values(&mut self, _engine: &Engine) {}

    fn is_rewindable(&self) -> bool {
        self.is_reversible()
    }

    /// Undo a fast-forward
    fn rewind(&mut self, _engine: &mut Engine) {}

    fn changes_bindings(&self) -> bool {
        false
    }

    fn clear_bindings(&mut self, _engine: &mut Engine) {}
}

/// What determines an action's final value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionDriver {
    Value,
    Binding,
    Event,
}

/// One change applied by a transition
pub struct Action {
    pub property: Option<PropertyHandle>,
    pub from_value: Value,
    pub to_value: Value,
    pub from_binding: Option<BindingId>,
    pub to_binding: Option<BindingId>,
    /// The transition owns `to_binding` until it is installed
    pub deletable_to_binding: bool,
    pub event: Option<Box<dyn ActionEvent>>,
    /// Run the event's reverse instead of its execute
    pub reverse_event: bool,
    /// Set by an animation that fully handles an event
    pub action_done: bool,
}

impl Action {
    /// Change a property to a plain value
    pub fn value_change(engine: &Engine, property: PropertyHandle, to: impl Into<Value>) -> Self {
        Self {
            property: Some(property),
            from_value: engine.read(property).unwrap_or_default(),
            to_value: to.into(),
            from_binding: engine.binding(property),
            to_binding: None,
            deletable_to_binding: false,
            event: None,
            reverse_event: false,
            action_done: false,
        }
    }

    /// Install a binding on a property; the transition owns it until then
    pub fn binding_change(engine: &Engine, property: PropertyHandle, to_binding: BindingId) -> Self {
        Self {
            property: Some(property),
            from_value: engine.read(property).unwrap_or_default(),
            to_value: Value::Null,
            from_binding: engine.binding(property),
            to_binding: Some(to_binding),
            deletable_to_binding: true,
            event: None,
            reverse_event: false,
            action_done: false,
        }
    }

    pub fn event(event: Box<dyn ActionEvent>, reverse: bool) -> Self {
        Self {
            property: None,
            from_value: Value::Null,
            to_value: Value::Null,
            from_binding: None,
            to_binding: None,
            deletable_to_binding: false,
            event: Some(event),
            reverse_event: reverse,
            action_done: false,
        }
    }

    /// Keep ownership of the "to" binding with the caller
    pub fn retain_binding(mut self) -> Self {
        self.deletable_to_binding = false;
        self
    }

    pub fn driver(&self) -> ActionDriver {
        if self.event.is_some() {
            ActionDriver::Event
        } else if self.to_binding.is_some() {
            ActionDriver::Binding
        } else {
            ActionDriver::Value
        }
    }

    fn changes_bindings(&self) -> bool {
        self.to_binding.is_some() || self.event.as_ref().is_some_and(|e| e.changes_bindings())
    }

    fn run_event(&mut self, engine: &mut Engine, reason: EventReason) {
        let reverse = self.reverse_event;
        if let Some(event) = self.event.as_mut() {
            if reverse && event.is_reversible() {
                event.reverse(engine, reason);
            } else {
                event.execute(engine, reason);
            }
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("property", &self.property)
            .field("from_value", &self.from_value)
            .field("to_value", &self.to_value)
            .field("from_binding", &self.from_binding)
            .field("to_binding", &self.to_binding)
            .field("event", &self.event.as_ref().map(|e| e.name().to_string()))
            .field("reverse_event", &self.reverse_event)
            .finish()
    }
}

/// Result of advancing a transition animation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimationStatus {
    Running,
    Finished,
}

/// Animation driven by a transition
pub trait TransitionAnimation: Send {
    /// Inspect the resolved actions and push every property the animation
    /// will drive into `touched`
    fn prepare(&mut self, engine: &mut Engine, actions: &mut [Action], touched: &mut Vec<PropertyHandle>);

    fn advance(&mut self, engine: &mut Engine, dt_ms: f64) -> AnimationStatus;

    fn stop(&mut self, engine: &mut Engine);
}

/// Lifecycle of a transition
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransitionPhase {
    #[default]
    Idle,
    Computing,
    Animating,
    Committing,
}

/// Callback invoked once a transition has committed
pub type CommittedCallback = Box<dyn FnMut(&mut Engine) + Send>;

struct Rollback {
    property: PropertyHandle,
    value: Value,
    binding: Option<BindingId>,
}

/// Runs one transition at a time
#[derive(Default)]
pub struct TransitionManager {
    phase: TransitionPhase,
    animation: Option<Box<dyn TransitionAnimation>>,
    actions: Vec<Action>,
    /// Indices of actions applied at commit time
    bindings_list: Vec<usize>,
    /// Final values of animated properties
    complete_list: Vec<(PropertyHandle, Value)>,
    rollback: Vec<Rollback>,
    on_committed: Option<CommittedCallback>,
}

impl TransitionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TransitionPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == TransitionPhase::Animating
    }

    pub fn set_committed_callback(&mut self, callback: Option<CommittedCallback>) {
        self.on_committed = callback;
    }

    /// Apply `actions`, animating through `animation` when given
    pub fn transition(
        &mut self,
        engine: &mut Engine,
        actions: Vec<Action>,
        animation: Option<Box<dyn TransitionAnimation>>,
    ) {
        self.interrupt(engine);
        self.phase = TransitionPhase::Computing;
        self.actions = actions;
        tracing::debug!(
            actions = self.actions.len(),
            animated = animation.is_some(),
            "transition started"
        );

        for (i, action) in self.actions.iter_mut().enumerate() {
            if action.changes_bindings() {
                self.bindings_list.push(i);
            }
            match (action.property, action.event.as_mut()) {
                (_, Some(event)) => {
                    if event.changes_bindings() {
                        event.clear_bindings(engine);
                    }
                }
                (Some(property), None) => {
                    let current = engine.set_binding(property, None, WriteFlags::empty());
                    if action.from_binding.is_none() && current != action.to_binding {
                        action.from_binding = current;
                    }
                    self.rollback.push(Rollback {
                        property,
                        value: action.from_value.clone(),
                        binding: action.from_binding,
                    });
                }
                (None, None) => {}
            }
        }

        if animation.is_some() && !self.bindings_list.is_empty() {
            self.resolve_end_values(engine);
        }

        let mut handled = vec![false; self.actions.len()];
        if let Some(mut animation) = animation {
            let mut touched = Vec::new();
            animation.prepare(engine, &mut self.actions, &mut touched);

            for (i, action) in self.actions.iter().enumerate() {
                if action.event.is_some() {
                    handled[i] = action.action_done;
                    continue;
                }
                let Some(property) = action.property else {
                    continue;
                };
                if touched.contains(&property) {
                    if action.to_value != action.from_value {
                        self.complete_list.push((property, action.to_value.clone()));
                    }
                    handled[i] = true;
                }
            }
            self.animation = Some(animation);
        }

        for (i, action) in self.actions.iter_mut().enumerate() {
            if handled[i] {
                continue;
            }
            match action.driver() {
                ActionDriver::Event => {
                    if !action.changes_bindings() {
                        action.run_event(engine, EventReason::ActualChange);
                    }
                }
                ActionDriver::Value => {
                    if let Some(property) = action.property {
                        engine.write(property, action.to_value.clone(), WriteFlags::DONT_REMOVE_BINDING);
                    }
                }
                ActionDriver::Binding => {}
            }
        }

        match self.animation.is_some() {
            true => self.phase = TransitionPhase::Animating,
            false => self.complete(engine),
        }
    }

    /// Speculatively apply every "to" side, read the end values back and
    /// rewind to the "from" state
    fn resolve_end_values(&mut self, engine: &mut Engine) {
        let flags = WriteFlags::BYPASS_INTERCEPTOR | WriteFlags::DONT_REMOVE_BINDING;

        for action in self.actions.iter_mut() {
            match (action.driver(), action.property) {
                (ActionDriver::Binding, Some(property)) => {
                    engine.set_binding(property, action.to_binding, flags);
                }
                (ActionDriver::Value, Some(property)) => {
                    engine.write(property, action.to_value.clone(), flags);
                }
                (ActionDriver::Event, _) => {
                    if action.event.as_ref().is_some_and(|e| e.is_reversible()) {
                        action.run_event(engine, EventReason::FastForward);
                    }
                }
                _ => {}
            }
        }

        for action in self.actions.iter_mut() {
            if let Some(event) = action.event.as_mut() {
                event.save_target_values(engine);
                continue;
            }
            let Some(property) = action.property else {
                continue;
            };
            if action.to_binding.is_some() || action.to_value.is_null() {
                action.to_value = engine.read(property).unwrap_or_default();
            }
        }

        for action in self.actions.iter_mut() {
            if let Some(event) = action.event.as_mut() {
                if event.is_rewindable() {
                    event.clear_bindings(engine);
                    event.rewind(engine);
                }
                continue;
            }
            let Some(property) = action.property else {
                continue;
            };
            if action.to_binding.is_some() {
                engine.set_binding(property, None, WriteFlags::empty());
            }
            engine.write(property, action.from_value.clone(), flags);
        }
    }

    /// Advance the running animation, committing when it finishes
    pub fn advance(&mut self, engine: &mut Engine, dt_ms: f64) -> TransitionPhase {
        if self.phase != TransitionPhase::Animating {
            return self.phase;
        }
        let status = match self.animation.as_mut() {
            Some(animation) => animation.advance(engine, dt_ms),
            None => AnimationStatus::Finished,
        };
        if status == AnimationStatus::Finished {
            self.complete(engine);
        }
        self.phase
    }

    /// Commit: install bindings, run binding-changing events, write the
    /// final values of animated properties
    pub fn complete(&mut self, engine: &mut Engine) {
        if self.phase == TransitionPhase::Idle {
            return;
        }
        self.phase = TransitionPhase::Committing;
        self.animation = None;

        for i in std::mem::take(&mut self.bindings_list) {
            let Some(action) = self.actions.get_mut(i) else {
                continue;
            };
            match (action.to_binding.take(), action.property) {
                (Some(binding), Some(property)) => {
                    engine.set_binding(property, Some(binding), WriteFlags::empty());
                }
                _ => action.run_event(engine, EventReason::ActualChange),
            }
        }

        for (property, value) in std::mem::take(&mut self.complete_list) {
            engine.write(property, value, WriteFlags::DONT_REMOVE_BINDING);
        }

        self.actions.clear();
        self.rollback.clear();
        self.phase = TransitionPhase::Idle;
        tracing::debug!("transition committed");

        if let Some(callback) = self.on_committed.as_mut() {
            callback(engine);
        }
    }

    /// Abandon the in-flight transition and restore the state it started from
    ///
    /// Every property action gets its "from" value and binding back. Events
    /// that already ran are left as they are.
    pub fn cancel(&mut self, engine: &mut Engine) {
        if self.phase == TransitionPhase::Idle {
            return;
        }
        let rollback = std::mem::take(&mut self.rollback);
        self.interrupt(engine);

        let flags = WriteFlags::BYPASS_INTERCEPTOR | WriteFlags::DONT_REMOVE_BINDING;
        for entry in &rollback {
            engine.write(entry.property, entry.value.clone(), flags);
        }
        for entry in &rollback {
            if entry.binding.is_some() {
                engine.set_binding(entry.property, entry.binding, flags);
            }
        }
        tracing::debug!(restored = rollback.len(), "transition cancelled");
    }

    /// Stop the in-flight transition where it is
    fn interrupt(&mut self, engine: &mut Engine) {
        if let Some(mut animation) = self.animation.take() {
            animation.stop(engine);
        }
        for i in std::mem::take(&mut self.bindings_list) {
            let Some(action) = self.actions.get_mut(i) else {
                continue;
            };
            if action.deletable_to_binding {
                if let Some(binding) = action.to_binding.take() {
                    engine.destroy_binding(binding);
                }
            }
        }
        self.complete_list.clear();
        self.actions.clear();
        self.rollback.clear();
        self.phase = TransitionPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{ContextId, Evaluation};
    use crate::object::{ObjectClass, ObjectId, PropertyMeta};
    use crate::value::TypeTag;
    use std::sync::{Arc, Mutex};

    fn setup() -> (Engine, ContextId, ObjectId) {
        let class = ObjectClass::new("Item")
            .property(PropertyMeta::new("x", TypeTag::Real))
            .property(PropertyMeta::new("width", TypeTag::Real))
            .property(PropertyMeta::new("visible", TypeTag::Bool));
        let mut engine = Engine::new();
        let context = engine.create_context(None);
        let item = engine.create_object(&class, "item");
        (engine, context, item)
    }

    /// Claims every property action and finishes after a fixed number of ticks
    struct Claim {
        ticks: u32,
        seen: Arc<Mutex<Vec<(Value, Value)>>>,
    }

    impl TransitionAnimation for Claim {
        fn prepare(&mut self, _engine: &mut Engine, actions: &mut [Action], touched: &mut Vec<PropertyHandle>) {
            for action in actions.iter() {
                if let Some(property) = action.property {
                    touched.push(property);
                    self.seen
                        .lock()
                        .unwrap()
                        .push((action.from_value.clone(), action.to_value.clone()));
                }
            }
        }

        fn advance(&mut self, _engine: &mut Engine, _dt_ms: f64) -> AnimationStatus {
            self.ticks = self.ticks.saturating_sub(1);
            match self.ticks {
                0 => AnimationStatus::Finished,
                _ => AnimationStatus::Running,
            }
        }

        fn stop(&mut self, _engine: &mut Engine) {}
    }

    struct Toggle {
        target: PropertyHandle,
        runs: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ActionEvent for Toggle {
        fn name(&self) -> &str {
            "toggle"
        }

        fn execute(&mut self, engine: &mut Engine, _reason: EventReason) {
            self.runs.lock().unwrap().push("execute");
            engine.write(self.target, Value::Bool(true), WriteFlags::empty());
        }

        fn is_reversible(&self) -> bool {
            true
        }

        fn reverse(&mut self, engine: &mut Engine, _reason: EventReason) {
            self.runs.lock().unwrap().push("reverse");
            engine.write(self.target, Value::Bool(false), WriteFlags::empty());
        }
    }

    /// Binding-changing reversible event that records every hook call
    struct Recorder {
        target: PropertyHandle,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn push(&self, entry: impl Into<String>) {
            self.log.lock().unwrap().push(entry.into());
        }
    }

    impl ActionEvent for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn execute(&mut self, engine: &mut Engine, reason: EventReason) {
            self.push(format!("execute {reason:?}"));
            engine.write(self.target, Value::Bool(true), WriteFlags::empty());
        }

        fn is_reversible(&self) -> bool {
            true
        }

        fn save_target_values(&mut self, engine: &Engine) {
            self.push(format!("save {:?}", engine.read(self.target)));
        }

        fn rewind(&mut self, engine: &mut Engine) {
            self.push("rewind");
            engine.write(self.target, Value::Bool(false), WriteFlags::empty());
        }

        fn changes_bindings(&self) -> bool {
            true
        }

        fn clear_bindings(&mut self, _engine: &mut Engine) {
            self.push("clear");
        }
    }

    /// Takes over every event and finishes on the first tick
    struct AbsorbEvents;

    impl TransitionAnimation for AbsorbEvents {
        fn prepare(&mut self, _engine: &mut Engine, actions: &mut [Action], _touched: &mut Vec<PropertyHandle>) {
            for action in actions.iter_mut().filter(|a| a.event.is_some()) {
                action.action_done = true;
            }
        }

        fn advance(&mut self, _engine: &mut Engine, _dt_ms: f64) -> AnimationStatus {
            AnimationStatus::Finished
        }

        fn stop(&mut self, _engine: &mut Engine) {}
    }

    #[test]
    fn test_immediate_transition() {
        let (mut engine, context, item) = setup();
        let x = engine.property(item, "x").unwrap();
        let width = engine.property(item, "width").unwrap();
        let b = engine.create_binding(width, context, "x * 3", move |s| {
            Evaluation::value(s.read_real(x).unwrap_or(0.0) * 3.0)
        });

        let committed = Arc::new(Mutex::new(0));
        let counter = committed.clone();
        let mut manager = TransitionManager::new();
        manager.set_committed_callback(Some(Box::new(move |_| *counter.lock().unwrap() += 1)));

        let actions = vec![
            Action::value_change(&engine, x, 10.0),
            Action::binding_change(&engine, width, b),
        ];
        manager.transition(&mut engine, actions, None);

        assert_eq!(manager.phase(), TransitionPhase::Idle);
        assert_eq!(engine.read(x), Some(Value::Real(10.0)));
        assert_eq!(engine.read(width), Some(Value::Real(30.0)));
        assert_eq!(engine.binding(width), Some(b));
        assert_eq!(*committed.lock().unwrap(), 1);
    }

    #[test]
    fn test_end_value_of_binding_is_resolved() {
        let (mut engine, context, item) = setup();
        let x = engine.property(item, "x").unwrap();
        let width = engine.property(item, "width").unwrap();
        engine.write(x, Value::Real(5.0), WriteFlags::empty());
        let b = engine.create_binding(width, context, "x * 2", move |s| {
            Evaluation::value(s.read_real(x).unwrap_or(0.0) * 2.0)
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let animation: Box<dyn TransitionAnimation> = Box::new(Claim {
            ticks: 2,
            seen: seen.clone(),
        });
        let mut manager = TransitionManager::new();
        let actions = vec![Action::binding_change(&engine, width, b)];
        manager.transition(&mut engine, actions, Some(animation));

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[(Value::Real(0.0), Value::Real(10.0))]
        );
        assert_eq!(engine.read(width), Some(Value::Real(0.0)));
        assert!(!engine.is_binding_enabled(b));

        assert_eq!(manager.advance(&mut engine, 16.0), TransitionPhase::Animating);
        assert_eq!(manager.advance(&mut engine, 16.0), TransitionPhase::Idle);
        assert_eq!(engine.binding(width), Some(b));
        assert_eq!(engine.read(width), Some(Value::Real(10.0)));
    }

    #[test]
    fn test_cancel_round_trip() {
        let (mut engine, context, item) = setup();
        let x = engine.property(item, "x").unwrap();
        let width = engine.property(item, "width").unwrap();
        engine.write(x, Value::Real(2.0), WriteFlags::empty());
        let original = engine.create_binding(width, context, "x + 1", move |s| {
            Evaluation::value(s.read_real(x).unwrap_or(0.0) + 1.0)
        });
        engine.set_binding(width, Some(original), WriteFlags::empty());
        let replacement = engine.create_binding(width, context, "100", |_| Evaluation::value(100.0));

        let animation: Box<dyn TransitionAnimation> = Box::new(Claim {
            ticks: 10,
            seen: Arc::default(),
        });
        let mut manager = TransitionManager::new();
        let actions = vec![
            Action::binding_change(&engine, width, replacement),
            Action::value_change(&engine, x, 50.0),
        ];
        manager.transition(&mut engine, actions, Some(animation));
        assert!(manager.is_running());
        engine.write(width, Value::Real(60.0), WriteFlags::DONT_REMOVE_BINDING);

        manager.cancel(&mut engine);

        assert_eq!(manager.phase(), TransitionPhase::Idle);
        assert_eq!(engine.read(x), Some(Value::Real(2.0)));
        assert_eq!(engine.read(width), Some(Value::Real(3.0)));
        assert_eq!(engine.binding(width), Some(original));
        assert!(engine.is_binding_enabled(original));
        assert!(!engine.binding_exists(replacement));
    }

    #[test]
    fn test_new_transition_destroys_unapplied_bindings() {
        let (mut engine, context, item) = setup();
        let width = engine.property(item, "width").unwrap();
        let pending = engine.create_binding(width, context, "1", |_| Evaluation::value(1.0));
        let kept = engine.create_binding(width, context, "2", |_| Evaluation::value(2.0));

        let mut manager = TransitionManager::new();
        let claim = || -> Box<dyn TransitionAnimation> {
            Box::new(Claim {
                ticks: 5,
                seen: Arc::default(),
            })
        };
        let actions = vec![Action::binding_change(&engine, width, pending)];
        manager.transition(&mut engine, actions, Some(claim()));
        let actions = vec![Action::binding_change(&engine, width, kept).retain_binding()];
        manager.transition(&mut engine, actions, Some(claim()));
        assert!(!engine.binding_exists(pending));

        manager.transition(&mut engine, Vec::new(), None);
        assert!(engine.binding_exists(kept));
        assert!(!engine.is_binding_enabled(kept));
    }

    #[test]
    fn test_events_run_and_reverse() {
        let (mut engine, _context, item) = setup();
        let visible = engine.property(item, "visible").unwrap();
        let runs = Arc::new(Mutex::new(Vec::new()));

        let mut manager = TransitionManager::new();
        let toggle = |reverse| {
            Action::event(
                Box::new(Toggle {
                    target: visible,
                    runs: runs.clone(),
                }),
                reverse,
            )
        };
        manager.transition(&mut engine, vec![toggle(false)], None);
        assert_eq!(engine.read(visible), Some(Value::Bool(true)));

        manager.transition(&mut engine, vec![toggle(true)], None);
        assert_eq!(engine.read(visible), Some(Value::Bool(false)));
        assert_eq!(runs.lock().unwrap().as_slice(), &["execute", "reverse"]);
    }

    #[test]
    fn test_binding_event_is_fast_forwarded_then_deferred() {
        let (mut engine, _context, item) = setup();
        let visible = engine.property(item, "visible").unwrap();
        let x = engine.property(item, "x").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let animation: Box<dyn TransitionAnimation> = Box::new(Claim {
            ticks: 2,
            seen: Arc::default(),
        });
        let event = Recorder {
            target: visible,
            log: log.clone(),
        };
        let actions = vec![
            Action::event(Box::new(event), false),
            Action::value_change(&engine, x, 5.0),
        ];
        let mut manager = TransitionManager::new();
        manager.transition(&mut engine, actions, Some(animation));

        assert_eq!(
            log.lock().unwrap().as_slice(),
            &["clear", "execute FastForward", "save Some(Bool(true))", "clear", "rewind"]
        );
        assert_eq!(engine.read(visible), Some(Value::Bool(false)));
        assert_eq!(engine.read(x), Some(Value::Real(0.0)));

        assert_eq!(manager.advance(&mut engine, 16.0), TransitionPhase::Animating);
        assert_eq!(log.lock().unwrap().len(), 5);

        assert_eq!(manager.advance(&mut engine, 16.0), TransitionPhase::Idle);
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("execute ActualChange"));
        assert_eq!(engine.read(visible), Some(Value::Bool(true)));
        assert_eq!(engine.read(x), Some(Value::Real(5.0)));
    }

    #[test]
    fn test_binding_event_without_animation_runs_at_commit() {
        let (mut engine, _context, item) = setup();
        let visible = engine.property(item, "visible").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let event = Recorder {
            target: visible,
            log: log.clone(),
        };

        let mut manager = TransitionManager::new();
        manager.transition(&mut engine, vec![Action::event(Box::new(event), false)], None);

        assert_eq!(log.lock().unwrap().as_slice(), &["clear", "execute ActualChange"]);
        assert_eq!(engine.read(visible), Some(Value::Bool(true)));
    }

    #[test]
    fn test_done_events_are_left_to_the_animation() {
        let (mut engine, _context, item) = setup();
        let visible = engine.property(item, "visible").unwrap();
        let x = engine.property(item, "x").unwrap();
        let runs = Arc::new(Mutex::new(Vec::new()));
        let toggle = Toggle {
            target: visible,
            runs: runs.clone(),
        };

        let actions = vec![
            Action::event(Box::new(toggle), false),
            Action::value_change(&engine, x, 3.0),
        ];
        let mut manager = TransitionManager::new();
        manager.transition(&mut engine, actions, Some(Box::new(AbsorbEvents)));

        assert!(runs.lock().unwrap().is_empty());
        assert_eq!(engine.read(x), Some(Value::Real(3.0)));

        assert_eq!(manager.advance(&mut engine, 16.0), TransitionPhase::Idle);
        assert!(runs.lock().unwrap().is_empty());
        assert_eq!(engine.read(visible), Some(Value::Bool(false)));
    }

    #[test]
    fn test_action_driver() {
        let (engine, _context, item) = setup();
        let x = engine.property(item, "x").unwrap();
        let action = Action::value_change(&engine, x, 1.0);
        assert_eq!(action.driver(), ActionDriver::Value);
        assert_eq!(action.from_value, Value::Real(0.0));
        assert!(action.event.is_none());
        assert!(format!("{action:?}").starts_with("Action"));
    }
}
