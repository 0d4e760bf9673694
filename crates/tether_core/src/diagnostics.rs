//! Diagnostics channel
//!
//! Binding loops and evaluation errors are never thrown. They are reported
//! here with the object, the property and the binding's source location, then
//! logged and retained in a bounded ring for inspection.

use std::collections::VecDeque;
use std::fmt;

use crate::error::BindingError;
use crate::expression::SourceLocation;
use crate::object::ObjectId;

/// A single reported binding problem
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub error: BindingError,
    pub object: ObjectId,
    pub object_name: String,
    pub property: String,
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    pub fn is_loop(&self) -> bool {
        matches!(self.error, BindingError::Loop)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "{location}: ")?;
        }
        write!(
            f,
            "{} for property \"{}.{}\"",
            self.error, self.object_name, self.property
        )
    }
}

/// Callback invoked for every reported diagnostic
pub type DiagnosticSink = Box<dyn FnMut(&Diagnostic) + Send>;

pub(crate) struct Diagnostics {
    entries: VecDeque<Diagnostic>,
    capacity: usize,
    total: u64,
    sink: Option<DiagnosticSink>,
}

impl Diagnostics {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            total: 0,
            sink: None,
        }
    }

    pub(crate) fn set_sink(&mut self, sink: Option<DiagnosticSink>) {
        self.sink = sink;
    }

    pub(crate) fn push(&mut self, diagnostic: Diagnostic) {
        self.total += 1;
        if let Some(sink) = self.sink.as_mut() {
            sink(&diagnostic);
        }
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(diagnostic);
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub(crate) fn take(&mut self) -> Vec<Diagnostic> {
        self.entries.drain(..).collect()
    }

    pub(crate) fn total(&self) -> u64 {
        self.total
    }
}
