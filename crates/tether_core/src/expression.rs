//! Expression contract and evaluation contexts
//!
//! The engine does not parse or interpret expressions. An evaluator is any
//! [`Expression`] (closures included) that computes an [`Evaluation`] from an
//! [`EvalScope`]. Reads made through the scope are recorded as dependencies,
//! and the binding is resubscribed to exactly that set after every
//! evaluation.

use rustc_hash::FxHashMap;
use slotmap::new_key_type;
use smallvec::SmallVec;
use std::fmt;

use crate::binding::BindingId;
use crate::engine::Engine;
use crate::object::ObjectId;
use crate::property::{PropertyHandle, WriteFlags};
use crate::value::Value;

new_key_type! {
    /// Unique identifier for an evaluation context
    pub struct ContextId;
}

/// Where a binding's expression was written
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Outcome of evaluating an expression
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluation {
    Value(Value),
    /// The expression produced no value
    Undefined,
    /// The evaluator failed with a message
    Error(String),
}

impl Evaluation {
    pub fn value(value: impl Into<Value>) -> Self {
        Evaluation::Value(value.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Evaluation::Error(message.into())
    }
}

/// An evaluator that computes a binding's value
pub trait Expression: Send {
    fn evaluate(&mut self, scope: &mut EvalScope<'_>) -> Evaluation;
}

impl<F> Expression for F
where
    F: FnMut(&mut EvalScope<'_>) -> Evaluation + Send,
{
    fn evaluate(&mut self, scope: &mut EvalScope<'_>) -> Evaluation {
        self(scope)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Dependency {
    Property(ObjectId, u16),
    Context(ContextId, String),
}

pub(crate) struct ContextVar {
    pub(crate) value: Option<Value>,
    pub(crate) subscribers: SmallVec<[BindingId; 4]>,
}

pub(crate) struct ContextNode {
    pub(crate) parent: Option<ContextId>,
    pub(crate) vars: FxHashMap<String, ContextVar>,
    pub(crate) valid: bool,
}

/// Tracked view of the engine handed to an evaluator
pub struct EvalScope<'a> {
    engine: &'a mut Engine,
    binding: BindingId,
    context: Option<ContextId>,
    dependencies: SmallVec<[Dependency; 4]>,
}

impl<'a> EvalScope<'a> {
    pub(crate) fn new(engine: &'a mut Engine, binding: BindingId, context: Option<ContextId>) -> Self {
        Self {
            engine,
            binding,
            context,
            dependencies: SmallVec::new(),
        }
    }

    /// Read a property and depend on it. Dead properties read as null.
    pub fn read(&mut self, handle: PropertyHandle) -> Value {
        self.track(Dependency::Property(
            handle.object(),
            handle.index().core_index(),
        ));
        self.engine.read(handle).unwrap_or_default()
    }

    /// Numeric read, `None` for non-numeric values
    pub fn read_real(&mut self, handle: PropertyHandle) -> Option<f64> {
        self.read(handle).as_real()
    }

    /// Look up a context variable and depend on it
    ///
    /// The lookup walks from the binding's context towards the root. Every
    /// context visited is tracked so a later definition that shadows the
    /// current one also triggers re-evaluation.
    pub fn var(&mut self, name: &str) -> Option<Value> {
        let mut current = self.context;
        while let Some(id) = current {
            self.track(Dependency::Context(id, name.to_string()));
            let node = self.engine.contexts.get(id)?;
            if let Some(value) = node.vars.get(name).and_then(|v| v.value.clone()) {
                return Some(value);
            }
            current = node.parent;
        }
        None
    }

    /// Side-effect write that leaves bindings on the target in place
    ///
    /// Writing the binding's own target is a loop: it is reported and the
    /// write is dropped.
    pub fn write(&mut self, handle: PropertyHandle, value: Value) -> bool {
        let own_target = self
            .engine
            .binding_target(self.binding)
            .is_some_and(|target| overlaps(target, handle));
        if own_target {
            // Re-entering the updating binding records the loop
            self.engine.update_binding(self.binding, WriteFlags::empty());
            return false;
        }
        self.engine
            .write(handle, value, WriteFlags::DONT_REMOVE_BINDING)
    }

    /// Untracked access to the engine
    pub fn engine(&self) -> &Engine {
        &*self.engine
    }

    /// Untracked mutable access for native bindings with side effects
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut *self.engine
    }

    pub fn binding(&self) -> BindingId {
        self.binding
    }

    pub fn context(&self) -> Option<ContextId> {
        self.context
    }

    pub(crate) fn finish(self) -> SmallVec<[Dependency; 4]> {
        self.dependencies
    }

    fn track(&mut self, dependency: Dependency) {
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
    }
}

/// Whether writing `b` changes the value held at `a`
fn overlaps(a: PropertyHandle, b: PropertyHandle) -> bool {
    if a.object() != b.object() {
        return false;
    }
    let (a, b) = (a.index(), b.index());
    a.core_index() == b.core_index()
        && match (a.value_type_index(), b.value_type_index()) {
            (Some(x), Some(y)) => x == y,
            _ => true,
        }
}

impl Engine {
    // =========================================================================
    // CONTEXTS
    // =========================================================================

    pub fn create_context(&mut self, parent: Option<ContextId>) -> ContextId {
        self.contexts.insert(ContextNode {
            parent,
            vars: FxHashMap::default(),
            valid: true,
        })
    }

    /// Define or change a context variable, re-evaluating dependent bindings
    pub fn set_context_property(&mut self, context: ContextId, name: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let Some(node) = self.contexts.get_mut(context) else {
            return false;
        };
        let var = node
            .vars
            .entry(name.to_string())
            .or_insert_with(|| ContextVar {
                value: None,
                subscribers: SmallVec::new(),
            });
        if var.value.as_ref() == Some(&value) {
            return true;
        }
        var.value = Some(value);

        let subscribers = var.subscribers.clone();
        for subscriber in subscribers {
            self.schedule_update(subscriber);
        }
        true
    }

    /// Variable defined directly on a context (parents are not consulted)
    pub fn context_property(&self, context: ContextId, name: &str) -> Option<&Value> {
        self.contexts
            .get(context)?
            .vars
            .get(name)?
            .value
            .as_ref()
    }

    /// Invalidate a context; bindings evaluated in it or its children go inert
    pub fn invalidate_context(&mut self, context: ContextId) {
        if let Some(node) = self.contexts.get_mut(context) {
            node.valid = false;
            tracing::debug!(?context, "context invalidated");
        }
    }

    /// Whether the context and all of its ancestors are valid
    pub fn is_context_valid(&self, context: ContextId) -> bool {
        let mut current = Some(context);
        while let Some(id) = current {
            match self.contexts.get(id) {
                Some(node) if node.valid => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    pub(crate) fn subscribe(&mut self, id: BindingId, dependency: &Dependency) {
        match dependency {
            Dependency::Property(object, core) => {
                if let Some(slot) = self
                    .objects
                    .get_mut(*object)
                    .and_then(|n| n.slots.get_mut(*core as usize))
                {
                    if !slot.subscribers.contains(&id) {
                        slot.subscribers.push(id);
                    }
                }
            }
            Dependency::Context(context, name) => {
                if let Some(node) = self.contexts.get_mut(*context) {
                    let var = node.vars.entry(name.clone()).or_insert_with(|| ContextVar {
                        value: None,
                        subscribers: SmallVec::new(),
                    });
                    if !var.subscribers.contains(&id) {
                        var.subscribers.push(id);
                    }
                }
            }
        }
    }

    pub(crate) fn unsubscribe(&mut self, id: BindingId, dependency: &Dependency) {
        match dependency {
            Dependency::Property(object, core) => {
                if let Some(slot) = self
                    .objects
                    .get_mut(*object)
                    .and_then(|n| n.slots.get_mut(*core as usize))
                {
                    slot.subscribers.retain(|s| *s != id);
                }
            }
            Dependency::Context(context, name) => {
                if let Some(var) = self
                    .contexts
                    .get_mut(*context)
                    .and_then(|n| n.vars.get_mut(name))
                {
                    var.subscribers.retain(|s| *s != id);
                }
            }
        }
    }
}
