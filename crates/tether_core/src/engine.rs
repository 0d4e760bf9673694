//! The binding engine
//!
//! [`Engine`] owns every object, binding and evaluation context. Writes notify
//! the bindings subscribed to a property; outside a batch they re-evaluate
//! synchronously, inside one they are queued and drained when the outermost
//! batch ends or when [`Engine::flush`] is called.

use slotmap::SlotMap;
use std::collections::VecDeque;

use crate::binding::{BindingId, BindingNode};
use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, Diagnostics};
use crate::error::BindingError;
use crate::expression::{ContextId, ContextNode};
use crate::object::{ObjectId, ObjectNode};
use crate::property::WriteFlags;

/// Owner of all objects, bindings and contexts
pub struct Engine {
    pub(crate) objects: SlotMap<ObjectId, ObjectNode>,
    pub(crate) bindings: SlotMap<BindingId, BindingNode>,
    pub(crate) contexts: SlotMap<ContextId, ContextNode>,
    /// Bindings waiting for re-evaluation
    pending: VecDeque<BindingId>,
    /// Current batch depth (> 0 means notifications are queued)
    batch_depth: u32,
    diagnostics: Diagnostics,
    config: EngineConfig,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::standard())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            objects: SlotMap::with_key(),
            bindings: SlotMap::with_key(),
            contexts: SlotMap::with_key(),
            pending: VecDeque::new(),
            batch_depth: 0,
            diagnostics: Diagnostics::new(config.max_diagnostics),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // BATCHING
    // =========================================================================

    /// Start a batch - binding updates are queued until the batch ends
    pub fn batch_start(&mut self) {
        self.batch_depth += 1;
    }

    /// End a batch and flush queued updates
    pub fn batch_end(&mut self) {
        if self.batch_depth > 0 {
            self.batch_depth -= 1;
            if self.batch_depth == 0 {
                self.flush();
            }
        }
    }

    /// Run a function in a batch context
    pub fn batch<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.batch_start();
        let result = f(self);
        self.batch_end();
        result
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }

    /// Re-evaluate every queued binding, returning how many were run
    ///
    /// Updates triggered while flushing run synchronously.
    pub fn flush(&mut self) -> usize {
        let depth = std::mem::take(&mut self.batch_depth);
        let mut count = 0;
        while let Some(id) = self.pending.pop_front() {
            self.update_binding(id, WriteFlags::empty());
            count += 1;
        }
        self.batch_depth = depth;
        count
    }

    /// Queue or run a binding update depending on the batch state
    ///
    /// A binding that is already evaluating is re-entered immediately so the
    /// loop is detected even inside a batch.
    pub(crate) fn schedule_update(&mut self, id: BindingId) {
        let updating = self.bindings.get(id).is_some_and(|n| n.updating);
        if self.batch_depth > 0 && !updating {
            if !self.pending.contains(&id) {
                self.pending.push_back(id);
            }
        } else {
            self.update_binding(id, WriteFlags::empty());
        }
    }

    // =========================================================================
    // DIAGNOSTICS
    // =========================================================================

    /// Diagnostics retained since the last [`take_diagnostics`](Self::take_diagnostics)
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.entries()
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.take()
    }

    /// Total number of diagnostics ever reported
    pub fn diagnostic_count(&self) -> u64 {
        self.diagnostics.total()
    }

    /// Install a callback invoked for every reported diagnostic
    pub fn set_diagnostic_sink(&mut self, sink: Option<DiagnosticSink>) {
        self.diagnostics.set_sink(sink);
    }

    pub(crate) fn report(&mut self, id: BindingId, error: BindingError) {
        let Some(node) = self.bindings.get(id) else {
            return;
        };
        let target = node.target;
        let location = node.location().cloned();

        let diagnostic = Diagnostic {
            object: target.object(),
            object_name: self
                .object_name(target.object())
                .unwrap_or_default()
                .to_string(),
            property: self.property_name(target),
            location,
            error,
        };

        let log = match diagnostic.is_loop() {
            true => self.config.log_binding_loops,
            false => self.config.log_binding_errors,
        };
        if log {
            tracing::warn!("{}", diagnostic);
        }
        self.diagnostics.push(diagnostic);
    }

    /// Get statistics about the engine
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            object_count: self.objects.len(),
            binding_count: self.bindings.len(),
            context_count: self.contexts.len(),
            pending_updates: self.pending.len(),
            diagnostics_reported: self.diagnostics.total(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub object_count: usize,
    pub binding_count: usize,
    pub context_count: usize,
    pub pending_updates: usize,
    pub diagnostics_reported: u64,
}
