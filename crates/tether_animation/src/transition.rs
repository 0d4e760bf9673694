//! Transition animations
//!
//! [`TransitionAnimation`] implementations handed to a
//! [`tether_core::TransitionManager`]. Both claim the property actions whose
//! start and end values can be animated, optionally restricted to a list of
//! property names (`"x"`, `"geometry.width"`). Unclaimed actions are applied
//! by the manager immediately.

use tether_core::{
    Action, AnimationStatus, Engine, PropertyHandle, TransitionAnimation, Value, WriteFlags,
};

use crate::easing::Easing;
use crate::smoothed::{Restart, SmoothedAnimation, SmoothedConfig};
use crate::values::{is_animatable, Interpolate};

const WRITE_FLAGS: WriteFlags = WriteFlags::BYPASS_INTERCEPTOR.union(WriteFlags::DONT_REMOVE_BINDING);

/// Start and end values closer than this are not animated
const UNCHANGED_EPSILON: f64 = 1e-9;

#[derive(Clone, Debug, Default)]
struct PropertyFilter(Option<Vec<String>>);

impl PropertyFilter {
    fn accepts(&self, engine: &Engine, property: PropertyHandle) -> bool {
        match &self.0 {
            None => true,
            Some(names) => {
                let name = engine.property_name(property);
                names.iter().any(|n| *n == name)
            }
        }
    }

    fn set<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0 = Some(names.into_iter().map(Into::into).collect());
    }
}

/// Property actions an animation may take over
fn candidates<'a>(actions: &'a [Action]) -> impl Iterator<Item = (PropertyHandle, &'a Action)> + 'a {
    actions
        .iter()
        .filter(|a| a.event.is_none())
        .filter_map(|a| a.property.map(|p| (p, a)))
}

// ============================================================================
// Duration-based interpolation
// ============================================================================

struct Track {
    property: PropertyHandle,
    from: Value,
    to: Value,
}

/// Interpolates numbers and groups over a fixed duration
pub struct NumberTransition {
    duration_ms: f64,
    easing: Easing,
    filter: PropertyFilter,
    tracks: Vec<Track>,
    elapsed_ms: f64,
}

impl NumberTransition {
    pub fn new(duration_ms: f64) -> Self {
        Self {
            duration_ms,
            easing: Easing::default(),
            filter: PropertyFilter::default(),
            tracks: Vec::new(),
            elapsed_ms: 0.0,
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Only animate the named properties
    pub fn with_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.set(names);
        self
    }

    fn progress(&self) -> f64 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }
        (self.elapsed_ms / self.duration_ms).min(1.0)
    }
}

impl TransitionAnimation for NumberTransition {
    fn prepare(&mut self, engine: &mut Engine, actions: &mut [Action], touched: &mut Vec<PropertyHandle>) {
        self.elapsed_ms = 0.0;
        self.tracks.clear();
        for (property, action) in candidates(actions) {
            if !is_animatable(&action.from_value)
                || !is_animatable(&action.to_value)
                || action.from_value.approx_eq(&action.to_value, UNCHANGED_EPSILON)
                || !self.filter.accepts(engine, property)
            {
                continue;
            }
            touched.push(property);
            self.tracks.push(Track {
                property,
                from: action.from_value.clone(),
                to: action.to_value.clone(),
            });
        }
        tracing::trace!(tracks = self.tracks.len(), "number transition prepared");
    }

    fn advance(&mut self, engine: &mut Engine, dt_ms: f64) -> AnimationStatus {
        self.elapsed_ms += dt_ms;
        let progress = self.progress();
        let eased = self.easing.apply(progress);
        for track in &self.tracks {
            engine.write(track.property, track.from.lerp(&track.to, eased), WRITE_FLAGS);
        }
        if progress >= 1.0 {
            AnimationStatus::Finished
        } else {
            AnimationStatus::Running
        }
    }

    fn stop(&mut self, _engine: &mut Engine) {
        self.tracks.clear();
    }
}

// ============================================================================
// Smoothed pursuit
// ============================================================================

/// Drives each claimed numeric property with its own smoothed animation
pub struct SmoothedTransition {
    config: SmoothedConfig,
    filter: PropertyFilter,
    tracks: Vec<(PropertyHandle, SmoothedAnimation)>,
}

impl SmoothedTransition {
    pub fn new(config: SmoothedConfig) -> Self {
        Self {
            config,
            filter: PropertyFilter::default(),
            tracks: Vec::new(),
        }
    }

    /// Only animate the named properties
    pub fn with_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.set(names);
        self
    }
}

impl TransitionAnimation for SmoothedTransition {
    fn prepare(&mut self, engine: &mut Engine, actions: &mut [Action], touched: &mut Vec<PropertyHandle>) {
        self.tracks.clear();
        for (property, action) in candidates(actions) {
            let (Some(from), Some(to)) = (action.from_value.as_real(), action.to_value.as_real()) else {
                continue;
            };
            if !self.filter.accepts(engine, property) {
                continue;
            }
            let mut animation = SmoothedAnimation::new(self.config.clone());
            // Snapped and unchanged properties are left to the manager
            if animation.restart(from, to) == Restart::Started {
                touched.push(property);
                self.tracks.push((property, animation));
            }
        }
    }

    fn advance(&mut self, engine: &mut Engine, dt_ms: f64) -> AnimationStatus {
        let mut running = false;
        for (property, animation) in self.tracks.iter_mut() {
            if let Some(value) = animation.advance(dt_ms) {
                engine.write(*property, Value::Real(value), WRITE_FLAGS);
            }
            running |= animation.is_running();
        }
        if running {
            AnimationStatus::Running
        } else {
            AnimationStatus::Finished
        }
    }

    fn stop(&mut self, _engine: &mut Engine) {
        for (_, animation) in self.tracks.iter_mut() {
            animation.stop();
        }
        self.tracks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{GroupKind, ObjectClass, ObjectId, PropertyMeta, TransitionManager, TransitionPhase, TypeTag};

    fn setup() -> (Engine, ObjectId) {
        let class = ObjectClass::new("Panel")
            .property(PropertyMeta::new("x", TypeTag::Real))
            .property(PropertyMeta::new("opacity", TypeTag::Real))
            .property(PropertyMeta::new("size", TypeTag::Group(GroupKind::Size)))
            .property(PropertyMeta::new("title", TypeTag::String));
        let mut engine = Engine::new();
        let panel = engine.create_object(&class, "panel");
        (engine, panel)
    }

    #[test]
    fn test_number_transition_interpolates() {
        let (mut engine, panel) = setup();
        let x = engine.property(panel, "x").unwrap();
        let size = engine.property(panel, "size").unwrap();
        let title = engine.property(panel, "title").unwrap();

        let actions = vec![
            Action::value_change(&engine, x, 100.0),
            Action::value_change(&engine, size, Value::group(GroupKind::Size, &[10.0, 20.0])),
            Action::value_change(&engine, title, "done"),
        ];
        let animation: Box<dyn TransitionAnimation> = Box::new(NumberTransition::new(100.0));
        let mut manager = TransitionManager::new();
        manager.transition(&mut engine, actions, Some(animation));

        assert_eq!(engine.read(title), Some(Value::from("done")));
        assert_eq!(engine.read(x), Some(Value::Real(0.0)));

        assert_eq!(manager.advance(&mut engine, 50.0), TransitionPhase::Animating);
        assert_eq!(engine.read(x), Some(Value::Real(50.0)));
        assert_eq!(engine.read(size), Some(Value::group(GroupKind::Size, &[5.0, 10.0])));

        assert_eq!(manager.advance(&mut engine, 50.0), TransitionPhase::Idle);
        assert_eq!(engine.read(x), Some(Value::Real(100.0)));
    }

    #[test]
    fn test_eased_progress() {
        let (mut engine, panel) = setup();
        let x = engine.property(panel, "x").unwrap();
        let mut animation = NumberTransition::new(100.0).with_easing(Easing::EaseInQuad);
        let mut actions = vec![Action::value_change(&engine, x, 100.0)];
        let mut touched = Vec::new();
        animation.prepare(&mut engine, &mut actions, &mut touched);

        assert_eq!(touched, vec![x]);
        assert_eq!(animation.advance(&mut engine, 50.0), AnimationStatus::Running);
        assert_eq!(engine.read(x), Some(Value::Real(25.0)));
    }

    #[test]
    fn test_property_filter() {
        let (mut engine, panel) = setup();
        let x = engine.property(panel, "x").unwrap();
        let opacity = engine.property(panel, "opacity").unwrap();
        let height = engine.property(panel, "size.height").unwrap();

        let mut animation = NumberTransition::new(100.0).with_properties(["opacity", "size.height"]);
        let mut actions = vec![
            Action::value_change(&engine, x, 1.0),
            Action::value_change(&engine, opacity, 1.0),
            Action::value_change(&engine, height, 1.0),
        ];
        let mut touched = Vec::new();
        animation.prepare(&mut engine, &mut actions, &mut touched);
        assert_eq!(touched, vec![opacity, height]);
    }

    #[test]
    fn test_unchanged_values_are_not_claimed() {
        let (mut engine, panel) = setup();
        let x = engine.property(panel, "x").unwrap();
        let opacity = engine.property(panel, "opacity").unwrap();
        engine.write(opacity, Value::Real(0.5), WriteFlags::empty());

        let mut animation = NumberTransition::new(100.0);
        let mut actions = vec![
            Action::value_change(&engine, x, 20.0),
            Action::value_change(&engine, opacity, 0.5),
        ];
        let mut touched = Vec::new();
        animation.prepare(&mut engine, &mut actions, &mut touched);
        assert_eq!(touched, vec![x]);
    }

    #[test]
    fn test_zero_duration_finishes_at_once() {
        let (mut engine, panel) = setup();
        let x = engine.property(panel, "x").unwrap();
        let mut animation = NumberTransition::new(0.0);
        let mut actions = vec![Action::value_change(&engine, x, 8.0)];
        animation.prepare(&mut engine, &mut actions, &mut Vec::new());

        assert_eq!(animation.advance(&mut engine, 0.0), AnimationStatus::Finished);
        assert_eq!(engine.read(x), Some(Value::Real(8.0)));
    }

    #[test]
    fn test_smoothed_transition_runs_to_target() {
        let (mut engine, panel) = setup();
        let x = engine.property(panel, "x").unwrap();
        let opacity = engine.property(panel, "opacity").unwrap();

        let actions = vec![
            Action::value_change(&engine, x, 40.0),
            Action::value_change(&engine, opacity, 0.0),
        ];
        let config = SmoothedConfig::standard().with_velocity(200.0);
        let animation: Box<dyn TransitionAnimation> = Box::new(SmoothedTransition::new(config));
        let mut manager = TransitionManager::new();
        manager.transition(&mut engine, actions, Some(animation));

        let mut frames = 0;
        while manager.advance(&mut engine, 16.0) == TransitionPhase::Animating {
            let value = engine.read(x).and_then(|v| v.as_real()).unwrap();
            assert!((0.0..=40.0).contains(&value));
            frames += 1;
        }
        assert_eq!(frames, 12);
        assert_eq!(engine.read(x), Some(Value::Real(40.0)));
    }
}
