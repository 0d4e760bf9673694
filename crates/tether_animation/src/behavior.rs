//! Smoothed behavior
//!
//! Installs a [`ValueInterceptor`] that turns plain numeric writes to a
//! property (including writes from its binding) into retargets of a
//! smoothed animation. The scheduler's own writes bypass the interceptor.
//!
//! A property holds a single interceptor, so one behavior covers one core
//! property or one field of it.

use tether_core::{Engine, Intercept, PropertyHandle, Value, ValueInterceptor};

use crate::scheduler::{SchedulerHandle, SmoothedId};
use crate::smoothed::{Restart, SmoothedConfig};

pub struct SmoothedBehavior {
    handle: SchedulerHandle,
    id: SmoothedId,
    target: PropertyHandle,
}

impl SmoothedBehavior {
    pub fn new(handle: SchedulerHandle, id: SmoothedId, target: PropertyHandle) -> Self {
        Self { handle, id, target }
    }

    /// Register an animation for `target` and intercept writes to it
    ///
    /// Returns `None` when the scheduler is gone.
    pub fn install(
        engine: &mut Engine,
        handle: &SchedulerHandle,
        target: PropertyHandle,
        config: SmoothedConfig,
    ) -> Option<SmoothedId> {
        let id = handle.register(target, config)?;
        engine.set_interceptor(target, Box::new(Self::new(handle.clone(), id, target)));
        tracing::trace!(?id, property = %engine.property_name(target), "smoothed behavior installed");
        Some(id)
    }

    /// Remove the interceptor and its animation, leaving the property where
    /// the animation stopped
    pub fn uninstall(engine: &mut Engine, handle: &SchedulerHandle, target: PropertyHandle, id: SmoothedId) {
        engine.clear_interceptor(target);
        handle.remove(id);
    }

    pub fn id(&self) -> SmoothedId {
        self.id
    }
}

impl ValueInterceptor for SmoothedBehavior {
    fn intercept(&mut self, target: PropertyHandle, current: &Value, incoming: Value) -> Intercept {
        if target != self.target {
            return Intercept::Write(incoming);
        }
        let (Some(from), Some(to)) = (current.as_real(), incoming.as_real()) else {
            return Intercept::Write(incoming);
        };
        match self.handle.set_target(self.id, from, to) {
            Some(Restart::Started) => Intercept::Swallow,
            Some(Restart::Snapped | Restart::Unchanged) | None => Intercept::Write(incoming),
        }
    }
}
