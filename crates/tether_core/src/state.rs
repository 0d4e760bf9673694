//! Named states
//!
//! A [`StateGroup`] switches a set of properties between named states. Each
//! switch becomes one run of the [`TransitionManager`]: the new state's
//! changes plus reverts for properties the old state touched and the new one
//! does not. The group remembers the value or binding each property had
//! before any state touched it and restores that on revert.

use rustc_hash::FxHashMap;

use crate::binding::BindingId;
use crate::engine::Engine;
use crate::property::PropertyHandle;
use crate::transition::{Action, TransitionAnimation, TransitionManager, TransitionPhase};
use crate::value::Value;

/// Creates a fresh binding each time a state is entered
pub type BindingFactory = Box<dyn FnMut(&mut Engine) -> BindingId + Send>;

/// Creates the animation for one run of a transition
pub type AnimationFactory = Box<dyn FnMut() -> Box<dyn TransitionAnimation> + Send>;

/// Name of the implicit state no state's changes apply in
pub const BASE_STATE: &str = "";

pub enum PropertyChange {
    Value(PropertyHandle, Value),
    Binding(PropertyHandle, BindingFactory),
}

impl PropertyChange {
    pub fn property(&self) -> PropertyHandle {
        match self {
            PropertyChange::Value(property, _) | PropertyChange::Binding(property, _) => *property,
        }
    }
}

pub struct State {
    name: String,
    changes: Vec<PropertyChange>,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            changes: Vec::new(),
        }
    }

    pub fn with_value(mut self, property: PropertyHandle, value: impl Into<Value>) -> Self {
        self.changes
            .push(PropertyChange::Value(property, value.into()));
        self
    }

    pub fn with_binding<F>(mut self, property: PropertyHandle, factory: F) -> Self
    where
        F: FnMut(&mut Engine) -> BindingId + Send + 'static,
    {
        self.changes
            .push(PropertyChange::Binding(property, Box::new(factory)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn changes(&self) -> &[PropertyChange] {
        &self.changes
    }
}

/// Animation used when switching between matching states
pub struct TransitionSpec {
    from: String,
    to: String,
    reversible: bool,
    animation: AnimationFactory,
}

impl TransitionSpec {
    /// `from` and `to` are state names or `"*"`
    pub fn new<F>(from: impl Into<String>, to: impl Into<String>, animation: F) -> Self
    where
        F: FnMut() -> Box<dyn TransitionAnimation> + Send + 'static,
    {
        Self {
            from: from.into(),
            to: to.into(),
            reversible: false,
            animation: Box::new(animation),
        }
    }

    /// Also match the switch in the opposite direction
    pub fn reversible(mut self) -> Self {
        self.reversible = true;
        self
    }

    pub fn matches(&self, from: &str, to: &str) -> bool {
        let fits = |pattern: &str, name: &str| pattern == "*" || pattern == name;
        (fits(&self.from, from) && fits(&self.to, to))
            || (self.reversible && fits(&self.from, to) && fits(&self.to, from))
    }
}

struct BaseEntry {
    value: Value,
    binding: Option<BindingId>,
}

#[derive(Default)]
pub struct StateGroup {
    states: Vec<State>,
    transitions: Vec<TransitionSpec>,
    current: String,
    manager: TransitionManager,
    base: FxHashMap<PropertyHandle, BaseEntry>,
    /// Properties changed by the current state
    applied: Vec<PropertyHandle>,
    /// Properties whose revert to base has not committed yet
    reverting: Vec<PropertyHandle>,
    /// Bindings created for the current state
    created: Vec<BindingId>,
    /// Bindings of earlier states, destroyed once no transition is running
    retired: Vec<BindingId>,
}

impl StateGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&mut self, state: State) {
        self.states.push(state);
    }

    pub fn add_transition(&mut self, transition: TransitionSpec) {
        self.transitions.push(transition);
    }

    pub fn state(&self) -> &str {
        &self.current
    }

    pub fn manager(&self) -> &TransitionManager {
        &self.manager
    }

    /// Switch to the named state, returning whether a switch happened
    pub fn set_state(&mut self, engine: &mut Engine, name: &str) -> bool {
        if name == self.current {
            return false;
        }
        let Some(target) = self.find_state(name) else {
            tracing::warn!(state = name, "unknown state");
            return false;
        };

        let mut actions = Vec::new();
        let mut applied = Vec::new();
        let mut created = Vec::new();

        if let Some(index) = target {
            for change in self.states[index].changes.iter_mut() {
                let property = change.property();
                self.base.entry(property).or_insert_with(|| BaseEntry {
                    value: engine.read(property).unwrap_or_default(),
                    binding: engine.binding(property),
                });
                applied.push(property);

                let action = match change {
                    PropertyChange::Value(_, value) => {
                        Action::value_change(engine, property, value.clone())
                    }
                    PropertyChange::Binding(_, factory) => {
                        let binding = factory(engine);
                        created.push(binding);
                        Action::binding_change(engine, property, binding)
                    }
                };
                actions.push(action);
            }
        }

        // Reverts of an interrupted transition are carried into this one
        let mut reverting = Vec::new();
        let previous = std::mem::take(&mut self.applied);
        let unfinished = std::mem::take(&mut self.reverting);
        for property in previous.into_iter().chain(unfinished) {
            if applied.contains(&property) || reverting.contains(&property) {
                continue;
            }
            let Some(base) = self.base.get(&property) else {
                continue;
            };
            let action = match base.binding {
                Some(binding) => Action::binding_change(engine, property, binding).retain_binding(),
                None => Action::value_change(engine, property, base.value.clone()),
            };
            actions.push(action);
            reverting.push(property);
        }

        let animation = self
            .transitions
            .iter_mut()
            .find(|t| t.matches(&self.current, name))
            .map(|t| (t.animation)());

        tracing::debug!(from = %self.current, to = name, actions = actions.len(), "state change");
        self.retired.append(&mut self.created);
        self.created = created;
        self.applied = applied;
        self.reverting = reverting;
        self.current = name.to_string();

        self.manager.transition(engine, actions, animation);
        self.settle(engine);
        true
    }

    /// Advance a running state transition
    pub fn advance(&mut self, engine: &mut Engine, dt_ms: f64) -> TransitionPhase {
        let phase = self.manager.advance(engine, dt_ms);
        self.settle(engine);
        phase
    }

    /// `Some(None)` is the base state, `None` an unknown name
    fn find_state(&self, name: &str) -> Option<Option<usize>> {
        if name == BASE_STATE {
            return Some(None);
        }
        self.states.iter().position(|s| s.name == name).map(Some)
    }

    /// Once the transition has committed, forget the reverted base entries
    /// and destroy retired state bindings
    fn settle(&mut self, engine: &mut Engine) {
        if self.manager.phase() != TransitionPhase::Idle {
            return;
        }
        for property in self.reverting.drain(..) {
            self.base.remove(&property);
        }
        for binding in self.retired.drain(..) {
            engine.destroy_binding(binding);
        }
    }
}
