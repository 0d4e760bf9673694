//! Error types for tether_core

use thiserror::Error;

use crate::property::PropertyIndex;
use crate::value::TypeTag;

/// Errors recorded on a binding when an evaluation cannot be applied
///
/// These never propagate out of the engine. They are attached to the binding,
/// reported through the diagnostics channel, and cleared by the next
/// successful evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    /// The binding was re-entered while it was already evaluating
    #[error("binding loop detected")]
    Loop,

    /// The expression produced undefined for a property that cannot be reset
    #[error("unable to assign [undefined] to {expected}")]
    UndefinedAssignment { expected: TypeTag },

    /// The expression produced a value the property cannot hold
    #[error("unable to assign {found} to {expected}")]
    TypeMismatch {
        expected: TypeTag,
        found: &'static str,
    },

    /// The evaluator reported an error
    #[error("{0}")]
    Evaluation(String),
}

/// Errors from direct property access
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropertyError {
    /// The target object no longer exists
    #[error("object has been destroyed")]
    ObjectDestroyed,

    /// The object has no property at this index
    #[error("no property at index {0:?}")]
    UnknownProperty(PropertyIndex),

    /// The value cannot be coerced into the property's type
    #[error("cannot assign {found} to property of type {expected}")]
    TypeMismatch {
        expected: TypeTag,
        found: &'static str,
    },

    /// Reset was requested on a property without a reset
    #[error("property is not resettable")]
    NotResettable,
}

/// Errors from loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type for property access
pub type Result<T> = std::result::Result<T, PropertyError>;
