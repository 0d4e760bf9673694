//! Tether Animation System
//!
//! Animation on top of the tether binding engine:
//!
//! - **Smoothed Animation**: Velocity- and duration-bounded pursuit of a
//!   target that can be retargeted mid-flight without a jump
//! - **Scheduler**: Frame driver writing animated values into the engine
//! - **Behaviors**: Interceptors turning property writes into animations
//! - **Transition Animations**: Eased interpolation and smoothed pursuit for
//!   state transitions
//!
//! # Example
//!
//! ```rust
//! use tether_animation::{AnimationScheduler, SmoothedBehavior, SmoothedConfig};
//! use tether_core::{Engine, ObjectClass, PropertyMeta, TypeTag, Value, WriteFlags};
//!
//! let class = ObjectClass::new("Item").property(PropertyMeta::new("x", TypeTag::Real));
//! let mut engine = Engine::new();
//! let item = engine.create_object(&class, "item");
//! let x = engine.property(item, "x").unwrap();
//!
//! let scheduler = AnimationScheduler::new();
//! let config = SmoothedConfig::standard().with_velocity(100.0);
//! SmoothedBehavior::install(&mut engine, &scheduler.handle(), x, config);
//!
//! // The write becomes the animation's target
//! engine.write(x, Value::Real(50.0), WriteFlags::empty());
//! assert_eq!(engine.read(x), Some(Value::Real(0.0)));
//!
//! while scheduler.tick(&mut engine, 16.0) {}
//! assert_eq!(engine.read(x), Some(Value::Real(50.0)));
//! ```

pub mod behavior;
pub mod easing;
pub mod scheduler;
pub mod smoothed;
pub mod transition;
pub mod values;

pub use behavior::SmoothedBehavior;
pub use easing::Easing;
pub use scheduler::{AnimationScheduler, SchedulerHandle, SmoothedId};
pub use smoothed::{
    ReversingMode, Restart, SmoothedAnimation, SmoothedConfig, SmoothedState, STOP_DELAY_MS,
};
pub use transition::{NumberTransition, SmoothedTransition};
pub use values::{is_animatable, Interpolate};
