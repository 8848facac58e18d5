//! Stepper motor collaborator.
//!
//! The controller drives motors through [`StepperDriver`], keyed by channel.
//! [`SimulatedStepper`] integrates the commanded rate over time and stands in
//! for the board when running on a host.

use std::time::Duration;

use tracing::debug;

/// Largest rate magnitude, in percent of full speed
pub const MAX_RATE_PCT: f32 = 100.0;

/// Primitive operations of a stepper motor board
pub trait StepperDriver: Send {
    fn is_moving(&self, channel: u8) -> bool;

    fn start(&mut self, channel: u8);

    fn stop(&mut self, channel: u8);

    /// Shaft position in degrees
    fn position(&self, channel: u8) -> f32;

    /// Stops the motor once it reaches `degrees`
    fn set_stop_position(&mut self, channel: u8, degrees: f32);

    fn remove_stop_position(&mut self, channel: u8);

    /// Sets the speed in percent of full speed; the sign selects the direction.
    ///
    /// Values beyond ±100 are clamped.
    fn set_rate(&mut self, channel: u8, rate_pct: f32);
}

#[derive(Debug, Default, Clone, Copy)]
struct Motor {
    moving: bool,
    rate_pct: f32,
    position_deg: f32,
    stop_position_deg: Option<f32>,
}

/// Stepper board simulated in memory
#[derive(Debug, Clone)]
pub struct SimulatedStepper {
    motors: Vec<Motor>,
    full_speed_deg_per_sec: f32,
}

impl SimulatedStepper {
    /// Creates `channels` motors turning at `full_speed_deg_per_sec` at 100%
    pub fn new(channels: u8, full_speed_deg_per_sec: f32) -> Self {
        SimulatedStepper {
            motors: vec![Motor::default(); channels as usize],
            full_speed_deg_per_sec,
        }
    }

    /// Last commanded rate of `channel`
    pub fn rate(&self, channel: u8) -> f32 {
        self.motors
            .get(channel as usize)
            .map(|motor| motor.rate_pct)
            .unwrap_or(0.0)
    }

    /// Moves every running motor by `dt` at its current rate
    pub fn advance(&mut self, dt: Duration) {
        let scale = self.full_speed_deg_per_sec / MAX_RATE_PCT;
        for (channel, motor) in self.motors.iter_mut().enumerate() {
            if !motor.moving {
                continue;
            }

            let from = motor.position_deg;
            let to = from + motor.rate_pct * scale * dt.as_secs_f32();
            motor.position_deg = to;

            if let Some(stop) = motor.stop_position_deg {
                let crossed = (from <= stop && stop <= to) || (to <= stop && stop <= from);
                if crossed && from != to {
                    motor.position_deg = stop;
                    motor.moving = false;
                    debug!(channel, stop, "Stepper reached stop position");
                }
            }
        }
    }
}

impl StepperDriver for SimulatedStepper {
    fn is_moving(&self, channel: u8) -> bool {
        self.motors
            .get(channel as usize)
            .map(|motor| motor.moving)
            .unwrap_or(false)
    }

    fn start(&mut self, channel: u8) {
        if let Some(motor) = self.motors.get_mut(channel as usize) {
            motor.moving = true;
        }
    }

    fn stop(&mut self, channel: u8) {
        if let Some(motor) = self.motors.get_mut(channel as usize) {
            motor.moving = false;
        }
    }

    fn position(&self, channel: u8) -> f32 {
        self.motors
            .get(channel as usize)
            .map(|motor| motor.position_deg)
            .unwrap_or(0.0)
    }

    fn set_stop_position(&mut self, channel: u8, degrees: f32) {
        if let Some(motor) = self.motors.get_mut(channel as usize) {
            motor.stop_position_deg = Some(degrees);
        }
    }

    fn remove_stop_position(&mut self, channel: u8) {
        if let Some(motor) = self.motors.get_mut(channel as usize) {
            motor.stop_position_deg = None;
        }
    }

    fn set_rate(&mut self, channel: u8, rate_pct: f32) {
        if let Some(motor) = self.motors.get_mut(channel as usize) {
            motor.rate_pct = rate_pct.clamp(-MAX_RATE_PCT, MAX_RATE_PCT);
        }
    }
}
