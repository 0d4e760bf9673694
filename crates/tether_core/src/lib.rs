//! Tether Core Runtime
//!
//! Declarative property bindings for object-oriented UI trees:
//!
//! - **Bindings**: Expressions re-evaluated when the properties and context
//!   variables they read change, with loop detection and deferred destruction
//! - **Value-Type Proxies**: Independent bindings on the fields of structured
//!   properties (points, sizes, rects, margins)
//! - **Transitions**: Before/after resolution of state changes, animated
//!   hand-off and late binding installation
//! - **States**: Named property configurations switched through transitions
//!
//! # Example
//!
//! ```rust
//! use tether_core::{Engine, Evaluation, ObjectClass, PropertyMeta, TypeTag, Value, WriteFlags};
//!
//! let class = ObjectClass::new("Rectangle")
//!     .property(PropertyMeta::new("width", TypeTag::Real))
//!     .property(PropertyMeta::new("height", TypeTag::Real));
//!
//! let mut engine = Engine::new();
//! let context = engine.create_context(None);
//! let rect = engine.create_object(&class, "rect");
//! let width = engine.property(rect, "width").unwrap();
//! let height = engine.property(rect, "height").unwrap();
//!
//! // height: width / 2
//! let binding = engine.create_binding(height, context, "width / 2", move |scope| {
//!     Evaluation::value(scope.read_real(width).unwrap_or(0.0) / 2.0)
//! });
//! engine.set_binding(height, Some(binding), WriteFlags::empty());
//!
//! engine.write(width, Value::Real(80.0), WriteFlags::empty());
//! assert_eq!(engine.read(height), Some(Value::Real(40.0)));
//! ```

pub mod binding;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod expression;
pub mod object;
pub mod property;
pub mod state;
pub mod transition;
pub mod value;

pub use binding::{BindingId, BindingType};
pub use config::EngineConfig;
pub use diagnostics::{Diagnostic, DiagnosticSink};
pub use engine::{Engine, EngineStats};
pub use error::{BindingError, ConfigError, PropertyError, Result};
pub use expression::{ContextId, EvalScope, Evaluation, Expression, SourceLocation};
pub use object::{ObjectClass, ObjectId, PropertyMeta};
pub use property::{Intercept, PropertyHandle, PropertyIndex, ValueInterceptor, WriteFlags};
pub use state::{
    AnimationFactory, BindingFactory, PropertyChange, State, StateGroup, TransitionSpec,
    BASE_STATE,
};
pub use transition::{
    Action, ActionDriver, ActionEvent, AnimationStatus, CommittedCallback, EventReason,
    TransitionAnimation, TransitionManager, TransitionPhase,
};
pub use value::{GroupKind, TypeTag, Value};
