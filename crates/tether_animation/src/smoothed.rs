//! Smoothed tracking animation
//!
//! A bounded-velocity pursuit of a target value. The motion is split into up
//! to three segments: a ramp from the incoming velocity to a peak velocity,
//! an optional cruise at that peak, and a ramp down to rest on the target.
//!
//! ```text
//!  velocity
//!     vp |     ________
//!        |    /        \
//!     vi |   /          \
//!        |  /            \
//!      0 +--+-----+------+---- time
//!           0    tp  td  tf
//! ```
//!
//! Retargeting while running re-splices the profile from the current
//! position and velocity, so the motion has no visible jump.

use serde::{Deserialize, Serialize};
use tether_core::ConfigError;

/// Time a finished animation lingers before stopping, absorbing rapid retargets
pub const STOP_DELAY_MS: f64 = 32.0;

const EPSILON: f64 = 1e-9;

/// What happens when a retarget reverses the direction of motion
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversingMode {
    /// Keep the current velocity and let the new profile turn around
    #[default]
    Eased,
    /// Jump to the new target and stop
    Sync,
    /// Drop the current velocity and start over from rest
    Immediate,
}

/// Configuration for a smoothed animation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothedConfig {
    /// Average speed in units per second. Values `<= 0` disable the velocity
    /// constraint.
    pub velocity: f64,
    /// Upper bound on the animation time in milliseconds
    pub duration_ms: Option<f64>,
    /// Longest time spent ramping up or down, in milliseconds. `Some(0.0)`
    /// animates linearly.
    pub maximum_easing_time_ms: Option<f64>,
    pub reversing_mode: ReversingMode,
}

impl Default for SmoothedConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl SmoothedConfig {
    /// 200 units per second, no duration bound, unclamped easing
    pub fn standard() -> Self {
        Self {
            velocity: 200.0,
            duration_ms: None,
            maximum_easing_time_ms: None,
            reversing_mode: ReversingMode::Eased,
        }
    }

    /// Purely duration-driven motion
    pub fn duration(duration_ms: f64) -> Self {
        Self {
            velocity: -1.0,
            duration_ms: Some(duration_ms),
            ..Self::standard()
        }
    }

    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_maximum_easing_time(mut self, easing_ms: f64) -> Self {
        self.maximum_easing_time_ms = Some(easing_ms);
        self
    }

    pub fn with_reversing_mode(mut self, mode: ReversingMode) -> Self {
        self.reversing_mode = mode;
        self
    }

    /// Parse a configuration from TOML. Missing keys take standard values.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }
}

/// Lifecycle of a smoothed animation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SmoothedState {
    #[default]
    Stopped,
    Running,
    /// Reached the target, waiting out [`STOP_DELAY_MS`]
    Settling,
}

/// Result of pointing an animation at a new target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Restart {
    /// The animation is running towards the target
    Started,
    /// The value jumped straight to the target
    Snapped,
    /// Already at rest on the target
    Unchanged,
}

/// Kinematic profile of one run, in seconds and units along `|s|`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Profile {
    s: f64,
    vi: f64,
    vp: f64,
    /// Ramp acceleration
    a: f64,
    /// Ramp-down deceleration
    d: f64,
    tp: f64,
    td: f64,
    tf: f64,
    /// Distance covered at `tp`
    sp: f64,
    /// Distance covered at `td`
    sd: f64,
    invert: bool,
}

impl Profile {
    fn linear(s: f64, tf: f64) -> Self {
        Self {
            s,
            vp: s / tf,
            td: tf,
            tf,
            sd: s,
            ..Self::default()
        }
    }

    /// Ramp up, cruise, then a ramp down of exactly `met` seconds
    ///
    /// With `a = d = vp / met` the distance constraint is a quadratic in
    /// `vp`: `2(tf - met)·vp² + 2(met·vi - s)·vp - met·vi² = 0`.
    fn clamped(s: f64, vi: f64, tf: f64, met: f64) -> Option<Self> {
        let c1 = 2.0 * (tf - met);
        let c2 = 2.0 * (met * vi - s);
        let c3 = -met * vi * vi;
        let vp = (-c2 + (c2 * c2 - 4.0 * c1 * c3).sqrt()) / (2.0 * c1);
        if !(vp > EPSILON) || vp < vi {
            return None;
        }

        let a = vp / met;
        let tp = (vp - vi) / a;
        let td = tf - met;
        if tp > td {
            return None;
        }
        let sp = vi * tp + 0.5 * a * tp * tp;
        Some(Self {
            s,
            vi,
            vp,
            a,
            d: a,
            tp,
            td,
            tf,
            sp,
            sd: sp + vp * (td - tp),
            invert: false,
        })
    }

    /// Symmetric ramp up and down with no cruise
    fn symmetric(s: f64, vi: f64, tf: f64) -> Self {
        let c1 = 0.25 * tf * tf;
        let c2 = 0.5 * vi * tf - s;
        let c3 = -0.25 * vi * vi;
        let a = (-c2 + (c2 * c2 - 4.0 * c1 * c3).sqrt()) / (2.0 * c1);
        let tp = 0.5 * tf - 0.5 * vi / a;
        if !(tp >= 0.0) || tp >= tf {
            return Self::decelerate(s, vi, tf);
        }

        let vp = a * tp + vi;
        let sp = vi * tp + 0.5 * a * tp * tp;
        Self {
            s,
            vi,
            vp,
            a,
            d: vp / (tf - tp),
            tp,
            td: tp,
            tf,
            sp,
            sd: sp,
            invert: false,
        }
    }

    /// Incoming velocity too high for a ramp: brake at a constant rate so
    /// the motion comes to rest exactly on the target, ending early
    fn decelerate(s: f64, vi: f64, tf: f64) -> Self {
        if s < EPSILON || vi <= 0.0 {
            return Self::linear(s, tf);
        }
        Self {
            s,
            vi,
            vp: vi,
            d: vi * vi / (2.0 * s),
            tf: 2.0 * s / vi,
            ..Self::default()
        }
    }

    /// Distance and velocity at time `t`
    fn follow(&self, t: f64) -> (f64, f64) {
        if t < self.tp {
            (self.vi * t + 0.5 * self.a * t * t, self.vi + self.a * t)
        } else if t < self.td {
            (self.sp + self.vp * (t - self.tp), self.vp)
        } else if t < self.tf {
            let u = t - self.td;
            (self.sd + self.vp * u - 0.5 * self.d * u * u, self.vp - self.d * u)
        } else {
            (self.s, 0.0)
        }
    }
}

/// A value chasing a target under velocity and duration constraints
#[derive(Clone, Debug)]
pub struct SmoothedAnimation {
    config: SmoothedConfig,
    state: SmoothedState,
    /// Value at the start of the current profile
    from: f64,
    to: f64,
    value: f64,
    track_velocity: f64,
    elapsed_ms: f64,
    settle_ms: f64,
    profile: Profile,
}

impl SmoothedAnimation {
    pub fn new(config: SmoothedConfig) -> Self {
        Self {
            config,
            state: SmoothedState::Stopped,
            from: 0.0,
            to: 0.0,
            value: 0.0,
            track_velocity: 0.0,
            elapsed_ms: 0.0,
            settle_ms: 0.0,
            profile: Profile::default(),
        }
    }

    pub fn config(&self) -> &SmoothedConfig {
        &self.config
    }

    /// Replace the configuration, re-splicing a running profile
    pub fn set_config(&mut self, config: SmoothedConfig) {
        self.config = config;
        if self.state == SmoothedState::Running {
            self.from = self.value;
            self.elapsed_ms = 0.0;
            if !self.recalc() {
                self.snap();
            }
        }
    }

    pub fn state(&self) -> SmoothedState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SmoothedState::Running
    }

    /// Running or settling
    pub fn is_active(&self) -> bool {
        self.state != SmoothedState::Stopped
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn target(&self) -> f64 {
        self.to
    }

    /// Signed instantaneous velocity in units per second
    pub fn track_velocity(&self) -> f64 {
        self.track_velocity
    }

    /// Length of the current profile, rounded up to whole milliseconds
    pub fn final_duration_ms(&self) -> u64 {
        (self.profile.tf * 1000.0).ceil() as u64
    }

    /// Point the animation at `to`
    ///
    /// `current` is the property's value and is only used when the animation
    /// is not running; a running animation continues from its own position
    /// and velocity.
    pub fn restart(&mut self, current: f64, to: f64) -> Restart {
        if self.state == SmoothedState::Running {
            let direction = if self.track_velocity.abs() > EPSILON {
                self.track_velocity.signum()
            } else if self.profile.invert {
                -1.0
            } else {
                1.0
            };
            if (to - self.value) * direction < 0.0 {
                match self.config.reversing_mode {
                    ReversingMode::Eased => {}
                    ReversingMode::Sync => {
                        self.to = to;
                        self.snap();
                        return Restart::Snapped;
                    }
                    ReversingMode::Immediate => self.track_velocity = 0.0,
                }
            }
        } else {
            self.value = current;
            self.track_velocity = 0.0;
            if (to - current).abs() < EPSILON {
                self.to = to;
                return Restart::Unchanged;
            }
        }

        self.to = to;
        self.from = self.value;
        self.elapsed_ms = 0.0;
        if !self.recalc() {
            tracing::debug!(to, "smoothed animation has no usable duration, snapping");
            self.snap();
            return Restart::Snapped;
        }
        self.state = SmoothedState::Running;
        tracing::trace!(
            from = self.from,
            to,
            duration_ms = self.final_duration_ms(),
            "smoothed animation started"
        );
        Restart::Started
    }

    /// Advance by `dt_ms`, returning the new value while running
    pub fn advance(&mut self, dt_ms: f64) -> Option<f64> {
        match self.state {
            SmoothedState::Stopped => None,
            SmoothedState::Settling => {
                self.settle_ms -= dt_ms;
                if self.settle_ms <= 0.0 {
                    self.state = SmoothedState::Stopped;
                }
                None
            }
            SmoothedState::Running => {
                self.elapsed_ms += dt_ms;
                let t = self.elapsed_ms / 1000.0;
                if t >= self.profile.tf {
                    self.value = self.to;
                    self.track_velocity = 0.0;
                    self.state = SmoothedState::Settling;
                    self.settle_ms = STOP_DELAY_MS;
                } else {
                    let (x, v) = self.profile.follow(t);
                    let sign = if self.profile.invert { -1.0 } else { 1.0 };
                    self.value = self.from + sign * x;
                    self.track_velocity = sign * v;
                }
                Some(self.value)
            }
        }
    }

    /// Stop where the animation currently is
    pub fn stop(&mut self) {
        self.state = SmoothedState::Stopped;
        self.track_velocity = 0.0;
    }

    fn snap(&mut self) {
        self.value = self.to;
        self.stop();
    }

    /// Derive the profile for the distance from `from` to `to`; `false` when
    /// no constraint yields a usable duration
    fn recalc(&mut self) -> bool {
        let mut s = self.to - self.from;
        let mut vi = self.track_velocity;
        let invert = s < 0.0;
        if invert {
            s = -s;
            vi = -vi;
        }
        if s < EPSILON && vi.abs() < EPSILON {
            return false;
        }

        let velocity = self.config.velocity;
        let duration = self
            .config
            .duration_ms
            .filter(|d| *d > 0.0)
            .map(|d| d / 1000.0);
        let tf = match (velocity > 0.0, duration) {
            (true, Some(duration)) => (s / velocity).min(duration),
            (true, None) => s / velocity,
            (false, Some(duration)) => duration,
            (false, None) => return false,
        };
        if !(tf > EPSILON) || !tf.is_finite() {
            return false;
        }

        let met = self
            .config
            .maximum_easing_time_ms
            .filter(|m| *m >= 0.0)
            .map(|m| m / 1000.0);
        let profile = match met {
            Some(met) if met == 0.0 => Profile::linear(s, tf),
            Some(met) if tf > met => {
                Profile::clamped(s, vi, tf, met).unwrap_or_else(|| Profile::symmetric(s, vi, tf))
            }
            _ => Profile::symmetric(s, vi, tf),
        };
        self.profile = Profile { invert, ..profile };
        true
    }
}
