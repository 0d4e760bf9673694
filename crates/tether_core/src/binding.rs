//! Bindings and value-type proxies
//!
//! A binding computes the value of one target property and is re-evaluated
//! whenever something it read changes. Bindings live in the engine's arena
//! and are threaded into intrusive lists through `prev`/`next` ids:
//!
//! - every object has one list holding at most one entry per core property
//! - a binding on a value-type field (e.g. `margins.left`) is never linked to
//!   the object directly. It lives in the list of that core property's
//!   value-type proxy, and the proxy occupies the core property's entry.
//!
//! Bindings are created disabled. Enabling links them and forces one
//! evaluation; disabling unlinks them and drops their subscriptions.

use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::engine::Engine;
use crate::error::{BindingError, PropertyError};
use crate::expression::{ContextId, Dependency, EvalScope, Evaluation, Expression, SourceLocation};
use crate::object::ObjectId;
use crate::property::{PropertyHandle, PropertyIndex, WriteFlags};
use crate::value::{TypeTag, Value};

new_key_type! {
    /// Unique identifier for a binding
    pub struct BindingId;
}

/// The kind of a binding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// An evaluator with source text, evaluated in a context
    Expression,
    /// A native closure, optionally evaluated in a context
    Native,
    /// Mediator for the field bindings of one value-type property
    ValueTypeProxy,
}

pub(crate) enum BindingKind {
    Expression {
        evaluator: Option<Box<dyn Expression>>,
        source: String,
        location: Option<SourceLocation>,
        context: ContextId,
    },
    Native {
        evaluator: Option<Box<dyn Expression>>,
        context: Option<ContextId>,
    },
    ValueTypeProxy {
        head: Option<BindingId>,
        core: u16,
    },
}

/// The list a binding is linked into
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ListOwner {
    Object(ObjectId),
    Proxy(BindingId),
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Links {
    owner: Option<ListOwner>,
    prev: Option<BindingId>,
    next: Option<BindingId>,
}

pub(crate) struct BindingNode {
    pub(crate) kind: BindingKind,
    pub(crate) target: PropertyHandle,
    pub(crate) enabled: bool,
    /// Set while the binding is evaluating or writing its result
    pub(crate) updating: bool,
    /// Set when the binding was re-entered during the current update
    looped: bool,
    error: Option<BindingError>,
    /// Number of updates in progress; destruction waits for zero
    guard: u32,
    pending_destroy: bool,
    links: Links,
    dependencies: SmallVec<[Dependency; 4]>,
}

impl BindingNode {
    fn new(kind: BindingKind, target: PropertyHandle) -> Self {
        Self {
            kind,
            target,
            enabled: false,
            updating: false,
            looped: false,
            error: None,
            guard: 0,
            pending_destroy: false,
            links: Links::default(),
            dependencies: SmallVec::new(),
        }
    }

    pub(crate) fn location(&self) -> Option<&SourceLocation> {
        match &self.kind {
            BindingKind::Expression { location, .. } => location.as_ref(),
            _ => None,
        }
    }

    fn context(&self) -> Option<ContextId> {
        match &self.kind {
            BindingKind::Expression { context, .. } => Some(*context),
            BindingKind::Native { context, .. } => *context,
            BindingKind::ValueTypeProxy { .. } => None,
        }
    }

    fn is_proxy(&self) -> bool {
        matches!(self.kind, BindingKind::ValueTypeProxy { .. })
    }

    fn take_evaluator(&mut self) -> Option<Box<dyn Expression>> {
        match &mut self.kind {
            BindingKind::Expression { evaluator, .. } | BindingKind::Native { evaluator, .. } => {
                evaluator.take()
            }
            BindingKind::ValueTypeProxy { .. } => None,
        }
    }

    fn restore_evaluator(&mut self, restored: Box<dyn Expression>) {
        match &mut self.kind {
            BindingKind::Expression { evaluator, .. } | BindingKind::Native { evaluator, .. } => {
                *evaluator = Some(restored);
            }
            BindingKind::ValueTypeProxy { .. } => {}
        }
    }
}

impl Engine {
    // =========================================================================
    // CREATION
    // =========================================================================

    /// Create a disabled expression binding from a closure
    ///
    /// `source` is the expression text, kept for diagnostics.
    pub fn create_binding<F>(
        &mut self,
        target: PropertyHandle,
        context: ContextId,
        source: impl Into<String>,
        evaluate: F,
    ) -> BindingId
    where
        F: FnMut(&mut EvalScope<'_>) -> Evaluation + Send + 'static,
    {
        self.create_expression_binding(target, context, source, Box::new(evaluate))
    }

    /// Create a disabled expression binding from an external evaluator
    pub fn create_expression_binding(
        &mut self,
        target: PropertyHandle,
        context: ContextId,
        source: impl Into<String>,
        evaluator: Box<dyn Expression>,
    ) -> BindingId {
        self.bindings.insert(BindingNode::new(
            BindingKind::Expression {
                evaluator: Some(evaluator),
                source: source.into(),
                location: None,
                context,
            },
            target,
        ))
    }

    /// Create a disabled binding driven by a native closure
    pub fn create_native_binding<F>(
        &mut self,
        target: PropertyHandle,
        context: Option<ContextId>,
        evaluate: F,
    ) -> BindingId
    where
        F: FnMut(&mut EvalScope<'_>) -> Evaluation + Send + 'static,
    {
        self.bindings.insert(BindingNode::new(
            BindingKind::Native {
                evaluator: Some(Box::new(evaluate)),
                context,
            },
            target,
        ))
    }

    /// Attach a source location used in diagnostics
    pub fn set_binding_location(&mut self, id: BindingId, location: SourceLocation) {
        if let Some(BindingKind::Expression { location: slot, .. }) =
            self.bindings.get_mut(id).map(|n| &mut n.kind)
        {
            *slot = Some(location);
        }
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    pub fn binding_exists(&self, id: BindingId) -> bool {
        self.bindings
            .get(id)
            .is_some_and(|n| !n.pending_destroy)
    }

    pub fn is_binding_enabled(&self, id: BindingId) -> bool {
        self.bindings.get(id).is_some_and(|n| n.enabled)
    }

    /// Error recorded by the last evaluation, if it failed
    pub fn binding_error(&self, id: BindingId) -> Option<&BindingError> {
        self.bindings.get(id)?.error.as_ref()
    }

    pub fn binding_type(&self, id: BindingId) -> Option<BindingType> {
        self.bindings.get(id).map(|n| match n.kind {
            BindingKind::Expression { .. } => BindingType::Expression,
            BindingKind::Native { .. } => BindingType::Native,
            BindingKind::ValueTypeProxy { .. } => BindingType::ValueTypeProxy,
        })
    }

    pub fn binding_target(&self, id: BindingId) -> Option<PropertyHandle> {
        self.bindings.get(id).map(|n| n.target)
    }

    pub fn binding_source(&self, id: BindingId) -> Option<&str> {
        match &self.bindings.get(id)?.kind {
            BindingKind::Expression { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn binding_location(&self, id: BindingId) -> Option<&SourceLocation> {
        self.bindings.get(id)?.location()
    }

    /// The binding currently in effect for a property
    ///
    /// For a core property whose fields are bound this is the value-type
    /// proxy. For a field handle it is the field's binding, or a direct
    /// binding on the core property when there is one.
    pub fn binding(&self, target: PropertyHandle) -> Option<BindingId> {
        let entry = self.object_entry(target.object(), target.index().core_index())?;
        match target.index().value_type_index() {
            Some(sub) if self.is_proxy(entry) => self.proxy_binding(entry, sub),
            _ => Some(entry),
        }
    }

    /// Entries of an object's binding list, most recently linked first
    pub fn object_bindings(&self, object: ObjectId) -> Vec<BindingId> {
        self.list_ids(ListOwner::Object(object))
    }

    /// The value-type proxy of a core property, once one has been created
    pub fn value_type_proxy(&self, target: PropertyHandle) -> Option<BindingId> {
        self.objects
            .get(target.object())?
            .proxies
            .get(&target.index().core_index())
            .copied()
    }

    /// Field bindings currently linked into a proxy
    pub fn proxy_bindings(&self, proxy: BindingId) -> Vec<BindingId> {
        self.list_ids(ListOwner::Proxy(proxy))
    }

    /// The field binding a proxy holds for a sub-field offset
    pub fn proxy_binding(&self, proxy: BindingId, sub: u8) -> Option<BindingId> {
        self.find_linked(ListOwner::Proxy(proxy), |n| {
            n.target.index().value_type_index() == Some(sub)
        })
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Install `binding` on a property, returning the binding it displaced
    ///
    /// The displaced binding is disabled and detached but not destroyed; the
    /// caller owns it from here on.
    pub fn set_binding(
        &mut self,
        target: PropertyHandle,
        binding: Option<BindingId>,
        flags: WriteFlags,
    ) -> Option<BindingId> {
        let previous = self.binding(target);

        if let Some(id) = binding {
            debug_assert_eq!(self.binding_target(id).map(|t| t.core()), Some(target.core()));
        }

        if previous.is_some() && previous == binding {
            if let Some(id) = binding {
                if !self.is_binding_enabled(id) {
                    self.enable_binding(id, flags);
                }
            }
            return None;
        }

        if let Some(previous) = previous {
            self.disable_binding(previous);
        }
        if let Some(id) = binding {
            self.enable_binding(id, flags);
        }
        previous
    }

    /// Link a binding into its owner list and evaluate it once
    pub fn enable_binding(&mut self, id: BindingId, flags: WriteFlags) {
        let Some(node) = self.bindings.get_mut(id) else {
            return;
        };
        if node.pending_destroy {
            return;
        }
        if node.is_proxy() {
            self.enable_proxy(id, flags);
            return;
        }
        node.enabled = true;
        let target = node.target;

        self.add_to_object(id, target);
        self.update_binding(id, flags);
    }

    /// Unlink a binding and drop its subscriptions
    pub fn disable_binding(&mut self, id: BindingId) {
        let Some(node) = self.bindings.get_mut(id) else {
            return;
        };
        if node.is_proxy() {
            self.disable_proxy(id);
            return;
        }
        node.enabled = false;
        self.unlink(id);
        self.unsubscribe_all(id);
    }

    /// Destroy a binding
    ///
    /// A binding that is in the middle of an update is disabled now and
    /// removed when the update unwinds. Destroying a proxy destroys the field
    /// bindings it holds; the proxy itself lives as long as its object.
    pub fn destroy_binding(&mut self, id: BindingId) {
        let Some(node) = self.bindings.get_mut(id) else {
            return;
        };
        if node.is_proxy() {
            self.clear_proxy(id);
            return;
        }
        if node.guard > 0 {
            node.pending_destroy = true;
            node.enabled = false;
            self.unlink(id);
            self.unsubscribe_all(id);
            return;
        }

        self.unlink(id);
        self.unsubscribe_all(id);
        self.bindings.remove(id);
    }

    /// Evaluate a binding and write the result to its target
    pub fn update_binding(&mut self, id: BindingId, flags: WriteFlags) {
        let Some(node) = self.bindings.get_mut(id) else {
            return;
        };
        if !node.enabled || node.pending_destroy || node.is_proxy() {
            return;
        }
        if node.updating {
            node.looped = true;
            node.error = Some(BindingError::Loop);
            self.report(id, BindingError::Loop);
            return;
        }

        let target = node.target;
        let context = node.context();
        if context.is_some_and(|c| !self.is_context_valid(c)) || !self.object_exists(target.object()) {
            return;
        }

        let Some(mut evaluator) = self.begin_update(id) else {
            return;
        };

        let mut scope = EvalScope::new(self, id, context);
        let evaluation = evaluator.evaluate(&mut scope);
        let dependencies = scope.finish();

        if let Some(node) = self.bindings.get_mut(id) {
            node.restore_evaluator(evaluator);
        }
        self.resubscribe(id, dependencies);

        let (looped_in_evaluation, still_enabled) = self
            .bindings
            .get(id)
            .map_or((false, false), |n| (n.looped, n.enabled));

        if !looped_in_evaluation && still_enabled {
            let before = self.read(target);
            let outcome = self.apply_evaluation(target, evaluation, flags);

            let looped = self.bindings.get(id).is_some_and(|n| n.looped);
            if looped {
                if let Some(before) = before {
                    self.store(target, before, Some(id));
                }
            } else {
                match outcome {
                    Ok(()) => {
                        if let Some(node) = self.bindings.get_mut(id) {
                            node.error = None;
                        }
                    }
                    Err(error) => {
                        if let Some(node) = self.bindings.get_mut(id) {
                            node.error = Some(error.clone());
                        }
                        self.report(id, error);
                    }
                }
            }
        }

        self.end_update(id);
    }

    fn begin_update(&mut self, id: BindingId) -> Option<Box<dyn Expression>> {
        let node = self.bindings.get_mut(id)?;
        let evaluator = node.take_evaluator()?;
        node.updating = true;
        node.guard += 1;
        Some(evaluator)
    }

    fn end_update(&mut self, id: BindingId) {
        let Some(node) = self.bindings.get_mut(id) else {
            return;
        };
        node.updating = false;
        node.looped = false;
        node.guard = node.guard.saturating_sub(1);
        if node.guard == 0 && node.pending_destroy {
            self.destroy_binding(id);
        }
    }

    fn apply_evaluation(
        &mut self,
        target: PropertyHandle,
        evaluation: Evaluation,
        flags: WriteFlags,
    ) -> Result<(), BindingError> {
        let flags = flags | WriteFlags::DONT_REMOVE_BINDING;
        match evaluation {
            Evaluation::Value(value) => self.write_result(target, value, flags),
            Evaluation::Undefined => {
                if self.reset(target) {
                    return Ok(());
                }
                match self.property_type(target) {
                    Some(TypeTag::Variant) => self.write_result(target, Value::Null, flags),
                    Some(expected) => Err(BindingError::UndefinedAssignment { expected }),
                    None => Ok(()),
                }
            }
            Evaluation::Error(message) => Err(BindingError::Evaluation(message)),
        }
    }

    fn write_result(
        &mut self,
        target: PropertyHandle,
        value: Value,
        flags: WriteFlags,
    ) -> Result<(), BindingError> {
        match self.try_write(target, value, flags) {
            Ok(()) => Ok(()),
            Err(PropertyError::TypeMismatch { expected, found }) => {
                Err(BindingError::TypeMismatch { expected, found })
            }
            // Dead targets are inert
            Err(_) => Ok(()),
        }
    }

    fn resubscribe(&mut self, id: BindingId, dependencies: SmallVec<[Dependency; 4]>) {
        self.unsubscribe_all(id);
        if !self.is_binding_enabled(id) {
            return;
        }
        for dependency in &dependencies {
            self.subscribe(id, dependency);
        }
        if let Some(node) = self.bindings.get_mut(id) {
            node.dependencies = dependencies;
        }
    }

    fn unsubscribe_all(&mut self, id: BindingId) {
        let Some(node) = self.bindings.get_mut(id) else {
            return;
        };
        let dependencies = std::mem::take(&mut node.dependencies);
        for dependency in &dependencies {
            self.unsubscribe(id, dependency);
        }
    }

    /// Remove the binding a plain write to `handle` overrides
    ///
    /// A write to a value-type core property clears every field binding but
    /// keeps the proxy.
    pub(crate) fn remove_binding_for_write(&mut self, handle: PropertyHandle) {
        if let Some(id) = self.binding(handle) {
            match self.is_proxy(id) {
                true => self.clear_proxy(id),
                false => self.destroy_binding(id),
            }
        }
    }

    fn add_to_object(&mut self, id: BindingId, target: PropertyHandle) {
        let object = target.object();
        let core = target.index().core_index();

        match target.index().value_type_index() {
            None => {
                self.evict_entry(object, core, id);
                self.link(id, ListOwner::Object(object));
            }
            Some(sub) => {
                let Some(proxy) = self.ensure_proxy(object, core) else {
                    return;
                };
                if let Some(existing) = self.proxy_binding(proxy, sub) {
                    if existing != id {
                        self.disable_binding(existing);
                    }
                }
                self.link(id, ListOwner::Proxy(proxy));
                self.attach_proxy(proxy, object, core);
            }
        }
    }

    /// Disable whatever occupies a core property's entry, unless it is `keep`
    fn evict_entry(&mut self, object: ObjectId, core: u16, keep: BindingId) {
        if let Some(existing) = self.object_entry(object, core) {
            if existing != keep {
                self.disable_binding(existing);
            }
        }
    }

    fn object_entry(&self, object: ObjectId, core: u16) -> Option<BindingId> {
        self.find_linked(ListOwner::Object(object), |n| n.target.index().core_index() == core)
    }

    fn is_proxy(&self, id: BindingId) -> bool {
        self.bindings.get(id).is_some_and(BindingNode::is_proxy)
    }

    // =========================================================================
    // VALUE-TYPE PROXIES
    // =========================================================================

    fn ensure_proxy(&mut self, object: ObjectId, core: u16) -> Option<BindingId> {
        let node = self.objects.get(object)?;
        if let Some(proxy) = node.proxies.get(&core) {
            return Some(*proxy);
        }

        let target = PropertyHandle::new(object, PropertyIndex::core(core));
        let proxy = self.bindings.insert(BindingNode::new(
            BindingKind::ValueTypeProxy { head: None, core },
            target,
        ));
        if let Some(node) = self.objects.get_mut(object) {
            node.proxies.insert(core, proxy);
        }
        tracing::trace!(?object, core, "value-type proxy created");
        Some(proxy)
    }

    /// Link a proxy into its object's list if it is not there yet
    fn attach_proxy(&mut self, proxy: BindingId, object: ObjectId, core: u16) {
        let Some(node) = self.bindings.get_mut(proxy) else {
            return;
        };
        node.enabled = true;
        if node.links.owner == Some(ListOwner::Object(object)) {
            return;
        }
        self.evict_entry(object, core, proxy);
        self.link(proxy, ListOwner::Object(object));
    }

    fn enable_proxy(&mut self, proxy: BindingId, flags: WriteFlags) {
        let Some(node) = self.bindings.get(proxy) else {
            return;
        };
        let object = node.target.object();
        let core = node.target.index().core_index();
        self.attach_proxy(proxy, object, core);

        let subs = self.list_ids(ListOwner::Proxy(proxy));
        for &sub in &subs {
            self.unlink(sub);
        }
        // Each enable pushes to the front; reverse keeps the original order
        for &sub in subs.iter().rev() {
            self.enable_binding(sub, flags);
        }
        for &sub in subs.iter().rev() {
            if self
                .bindings
                .get(sub)
                .is_some_and(|n| n.links.owner.is_none() && !n.pending_destroy)
            {
                self.link(sub, ListOwner::Proxy(proxy));
            }
        }
    }

    fn disable_proxy(&mut self, proxy: BindingId) {
        let Some(node) = self.bindings.get_mut(proxy) else {
            return;
        };
        node.enabled = false;
        self.unlink(proxy);

        let subs = self.list_ids(ListOwner::Proxy(proxy));
        for &sub in subs.iter().rev() {
            self.disable_binding(sub);
            self.link(sub, ListOwner::Proxy(proxy));
        }
    }

    /// Destroy every field binding held by a proxy
    fn clear_proxy(&mut self, proxy: BindingId) {
        for sub in self.list_ids(ListOwner::Proxy(proxy)) {
            self.destroy_binding(sub);
        }
    }

    /// Destroy a proxy together with its field bindings
    pub(crate) fn remove_proxy(&mut self, proxy: BindingId) {
        self.clear_proxy(proxy);
        self.unlink(proxy);
        if let Some(node) = self.bindings.remove(proxy) {
            if let Some(object) = self.objects.get_mut(node.target.object()) {
                object.proxies.remove(&node.target.index().core_index());
            }
        }
    }

    // =========================================================================
    // INTRUSIVE LISTS
    // =========================================================================

    fn list_head(&self, owner: ListOwner) -> Option<BindingId> {
        match owner {
            ListOwner::Object(object) => self.objects.get(object)?.bindings_head,
            ListOwner::Proxy(proxy) => match self.bindings.get(proxy)?.kind {
                BindingKind::ValueTypeProxy { head, .. } => head,
                _ => None,
            },
        }
    }

    fn set_list_head(&mut self, owner: ListOwner, new_head: Option<BindingId>) {
        match owner {
            ListOwner::Object(object) => {
                if let Some(node) = self.objects.get_mut(object) {
                    node.bindings_head = new_head;
                }
            }
            ListOwner::Proxy(proxy) => {
                if let Some(BindingKind::ValueTypeProxy { head, .. }) =
                    self.bindings.get_mut(proxy).map(|n| &mut n.kind)
                {
                    *head = new_head;
                }
            }
        }
    }

    /// Push a binding to the front of a list, unlinking it first
    fn link(&mut self, id: BindingId, owner: ListOwner) {
        self.unlink(id);
        let head = self.list_head(owner);
        if let Some(node) = self.bindings.get_mut(id) {
            node.links = Links {
                owner: Some(owner),
                prev: None,
                next: head,
            };
        } else {
            return;
        }
        if let Some(next) = head.and_then(|h| self.bindings.get_mut(h)) {
            next.links.prev = Some(id);
        }
        self.set_list_head(owner, Some(id));
    }

    fn unlink(&mut self, id: BindingId) {
        let Some(node) = self.bindings.get_mut(id) else {
            return;
        };
        let links = std::mem::take(&mut node.links);
        let Some(owner) = links.owner else {
            return;
        };

        match links.prev.and_then(|p| self.bindings.get_mut(p)) {
            Some(prev) => prev.links.next = links.next,
            None => self.set_list_head(owner, links.next),
        }
        if let Some(next) = links.next.and_then(|n| self.bindings.get_mut(n)) {
            next.links.prev = links.prev;
        }
    }

    /// First binding in a list matching `pred`, walking the links in place
    fn find_linked(&self, owner: ListOwner, pred: impl Fn(&BindingNode) -> bool) -> Option<BindingId> {
        let mut current = self.list_head(owner);
        while let Some(id) = current {
            let node = self.bindings.get(id)?;
            if pred(node) {
                return Some(id);
            }
            current = node.links.next;
        }
        None
    }

    pub(crate) fn list_ids(&self, owner: ListOwner) -> Vec<BindingId> {
        let mut ids = Vec::new();
        let mut current = self.list_head(owner);
        while let Some(id) = current {
            ids.push(id);
            current = self.bindings.get(id).and_then(|n| n.links.next);
        }
        ids
    }
}
