//! Animation scheduler
//!
//! Owns the smoothed animations driving engine properties and advances them
//! once per frame. Components hold a weak [`SchedulerHandle`], so dropping
//! the scheduler stops every animation without dangling references.
//!
//! The scheduler lock is never held while writing into the engine: a write
//! can re-evaluate bindings whose interceptors call back into the scheduler.

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tether_core::{Engine, PropertyHandle, Value, WriteFlags};

use crate::smoothed::{Restart, SmoothedAnimation, SmoothedConfig};

new_key_type! {
    /// Unique identifier for a scheduled smoothed animation
    pub struct SmoothedId;
}

impl SmoothedId {
    /// Convert to raw u64 for storage in external handles
    pub fn to_raw(self) -> u64 {
        self.0.as_ffi()
    }

    /// Reconstruct from raw u64
    pub fn from_raw(raw: u64) -> Self {
        Self::from(slotmap::KeyData::from_ffi(raw))
    }
}

struct Scheduled {
    target: PropertyHandle,
    animation: SmoothedAnimation,
}

#[derive(Default)]
struct SchedulerInner {
    animations: SlotMap<SmoothedId, Scheduled>,
}

fn lock(inner: &Mutex<SchedulerInner>) -> MutexGuard<'_, SchedulerInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Frame driver for smoothed animations
///
/// Construct one per engine and call [`AnimationScheduler::tick`] every frame.
#[derive(Default)]
pub struct AnimationScheduler {
    inner: Arc<Mutex<SchedulerInner>>,
}

impl AnimationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a handle to this scheduler for passing to components
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Advance every animation by `dt_ms` and write the results
    ///
    /// Queued binding re-evaluations are flushed first so animations see
    /// targets set during the frame. Animations whose target object is gone
    /// are dropped. Returns true while any animation still needs ticks.
    pub fn tick(&self, engine: &mut Engine, dt_ms: f64) -> bool {
        engine.flush();

        let mut writes: SmallVec<[(SmoothedId, PropertyHandle, f64); 8]> = SmallVec::new();
        {
            let mut inner = lock(&self.inner);
            for (id, scheduled) in inner.animations.iter_mut() {
                if let Some(value) = scheduled.animation.advance(dt_ms) {
                    writes.push((id, scheduled.target, value));
                }
            }
        }

        let mut orphaned: SmallVec<[SmoothedId; 4]> = SmallVec::new();
        let flags = WriteFlags::BYPASS_INTERCEPTOR | WriteFlags::DONT_REMOVE_BINDING;
        for (id, target, value) in writes {
            if !engine.object_exists(target.object()) {
                orphaned.push(id);
                continue;
            }
            engine.write(target, Value::Real(value), flags);
        }

        let mut inner = lock(&self.inner);
        for id in orphaned {
            inner.animations.remove(id);
            tracing::debug!(?id, "dropped animation of destroyed object");
        }
        inner.animations.values().any(|s| s.animation.is_active())
    }

    /// Check if any animations are still active
    pub fn has_active_animations(&self) -> bool {
        lock(&self.inner)
            .animations
            .values()
            .any(|s| s.animation.is_active())
    }

    pub fn animation_count(&self) -> usize {
        lock(&self.inner).animations.len()
    }
}

/// A weak handle to the animation scheduler
///
/// Every operation is a no-op returning `None` (or false) once the
/// scheduler has been dropped.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Weak<Mutex<SchedulerInner>>,
}

impl SchedulerHandle {
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Register an idle animation driving `target`
    pub fn register(&self, target: PropertyHandle, config: SmoothedConfig) -> Option<SmoothedId> {
        self.inner.upgrade().map(|inner| {
            lock(&inner).animations.insert(Scheduled {
                target,
                animation: SmoothedAnimation::new(config),
            })
        })
    }

    /// Point an animation at a new target
    pub fn set_target(&self, id: SmoothedId, current: f64, to: f64) -> Option<Restart> {
        self.with_animation_mut(id, |animation| animation.restart(current, to))
    }

    /// Apply a function to an animation if it exists
    pub fn with_animation_mut<F, R>(&self, id: SmoothedId, f: F) -> Option<R>
    where
        F: FnOnce(&mut SmoothedAnimation) -> R,
    {
        let inner = self.inner.upgrade()?;
        let mut guard = lock(&inner);
        guard.animations.get_mut(id).map(|s| f(&mut s.animation))
    }

    pub fn value(&self, id: SmoothedId) -> Option<f64> {
        self.with_animation_mut(id, |animation| animation.value())
    }

    pub fn target(&self, id: SmoothedId) -> Option<PropertyHandle> {
        let inner = self.inner.upgrade()?;
        let guard = lock(&inner);
        guard.animations.get(id).map(|s| s.target)
    }

    /// Whether the animation is still moving; missing animations are not
    pub fn is_running(&self, id: SmoothedId) -> bool {
        self.with_animation_mut(id, |animation| animation.is_running())
            .unwrap_or(false)
    }

    pub fn stop(&self, id: SmoothedId) {
        self.with_animation_mut(id, |animation| animation.stop());
    }

    pub fn remove(&self, id: SmoothedId) -> Option<SmoothedAnimation> {
        let inner = self.inner.upgrade()?;
        let mut guard = lock(&inner);
        guard.animations.remove(id).map(|s| s.animation)
    }
}
