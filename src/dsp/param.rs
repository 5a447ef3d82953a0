//! Automatable parameter: WebAudio `AudioParam` timeline semantics.
//!
//! Every graph parameter that changes while audio is playing goes through
//! an `AudioParam` so that changes are ramps on the audio clock instead of
//! steps. A step on a live node is an audible click.

/// One scheduled change on a parameter timeline. Times are seconds on the
/// audio clock.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ParamEvent {
    SetValue { time: f64, value: f64 },
    LinearRamp { time: f64, value: f64 },
    ExponentialRamp { time: f64, value: f64 },
    SetTarget { time: f64, target: f64, time_constant: f64 },
}

impl ParamEvent {
    fn time(&self) -> f64 {
        match *self {
            ParamEvent::SetValue { time, .. }
            | ParamEvent::LinearRamp { time, .. }
            | ParamEvent::ExponentialRamp { time, .. }
            | ParamEvent::SetTarget { time, .. } => time,
        }
    }
}

/// A first-order approach that has started and runs until the next event.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveTarget {
    start: f64,
    from: f64,
    target: f64,
    time_constant: f64,
}

impl ActiveTarget {
    fn value_at(&self, t: f64) -> f64 {
        let elapsed = (t - self.start).max(0.0);
        self.target + (self.from - self.target) * (-elapsed / self.time_constant).exp()
    }
}

/// Smallest magnitude an exponential ramp may target.
const EXP_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct AudioParam {
    /// Settled value at `anchor_time`.
    value: f64,
    anchor_time: f64,
    events: Vec<ParamEvent>,
    active_target: Option<ActiveTarget>,
    last: f64,
}

impl AudioParam {
    pub fn new(value: f64) -> Self {
        AudioParam {
            value,
            anchor_time: 0.0,
            events: Vec::new(),
            active_target: None,
            last: value,
        }
    }

    /// Value produced by the most recent [`AudioParam::value_at`].
    pub fn current(&self) -> f64 {
        self.last
    }

    /// Number of events still waiting on the timeline.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Value the parameter is heading toward once all automation settles.
    pub fn final_value(&self) -> f64 {
        match self.events.last() {
            Some(ParamEvent::SetValue { value, .. })
            | Some(ParamEvent::LinearRamp { value, .. })
            | Some(ParamEvent::ExponentialRamp { value, .. }) => *value,
            Some(ParamEvent::SetTarget { target, .. }) => *target,
            None => self
                .active_target
                .map(|a| a.target)
                .unwrap_or(self.value),
        }
    }

    pub fn set_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(ParamEvent::SetValue { time, value });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(ParamEvent::LinearRamp { time, value });
    }

    /// Exponential ramps cannot reach zero; targets are floored at a tiny
    /// magnitude with the sign preserved.
    pub fn exponential_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        let value = if value.abs() < EXP_FLOOR {
            EXP_FLOOR.copysign(if value == 0.0 { 1.0 } else { value })
        } else {
            value
        };
        self.insert(ParamEvent::ExponentialRamp { time, value });
    }

    /// Approach `target` from `start` with the given time constant (seconds
    /// to cover ~63% of the distance). A non-positive time constant is a jump.
    pub fn set_target_at_time(&mut self, target: f64, start: f64, time_constant: f64) {
        if time_constant <= 0.0 {
            self.set_value_at_time(target, start);
        } else {
            self.insert(ParamEvent::SetTarget {
                time: start,
                target,
                time_constant,
            });
        }
    }

    /// Drop every event scheduled at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    fn insert(&mut self, event: ParamEvent) {
        let at = self
            .events
            .iter()
            .position(|e| e.time() > event.time())
            .unwrap_or(self.events.len());
        self.events.insert(at, event);
    }

    fn settle_target(&mut self, time: f64) {
        if let Some(active) = self.active_target.take() {
            self.value = active.value_at(time);
            self.anchor_time = time;
        }
    }

    /// Evaluate the timeline at audio time `t`. Calls must use
    /// non-decreasing `t`; past events are consumed.
    pub fn value_at(&mut self, t: f64) -> f64 {
        while let Some(&event) = self.events.first() {
            if event.time() > t {
                break;
            }
            self.events.remove(0);
            match event {
                ParamEvent::SetValue { time, value }
                | ParamEvent::LinearRamp { time, value }
                | ParamEvent::ExponentialRamp { time, value } => {
                    self.active_target = None;
                    self.value = value;
                    self.anchor_time = time;
                }
                ParamEvent::SetTarget {
                    time,
                    target,
                    time_constant,
                } => {
                    self.settle_target(time);
                    self.anchor_time = time;
                    self.active_target = Some(ActiveTarget {
                        start: time,
                        from: self.value,
                        target,
                        time_constant,
                    });
                }
            }
        }

        let value = match self.events.first().copied() {
            Some(ParamEvent::LinearRamp { time, value }) => {
                self.settle_target(t);
                let span = time - self.anchor_time;
                if span <= 0.0 {
                    value
                } else {
                    let frac = ((t - self.anchor_time) / span).clamp(0.0, 1.0);
                    self.value + (value - self.value) * frac
                }
            }
            Some(ParamEvent::ExponentialRamp { time, value }) => {
                self.settle_target(t);
                let span = time - self.anchor_time;
                let same_sign = self.value * value > 0.0;
                if span <= 0.0 {
                    value
                } else if !same_sign {
                    self.value
                } else {
                    let frac = ((t - self.anchor_time) / span).clamp(0.0, 1.0);
                    self.value * (value / self.value).powf(frac)
                }
            }
            _ => match self.active_target {
                Some(active) => active.value_at(t),
                None => self.value,
            },
        };
        self.last = value;
        value
    }
}
