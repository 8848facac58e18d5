//! Per-channel spin state machine.
//!
//! The controller consumes the spinner's inbound queue one message per step
//! and answers through the outbound queue with the request's transaction id.
//! [`SpinnerController::tick`] advances running plans and pushes the output
//! to the stepper driver.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::stepper::StepperDriver;
use super::{
    ChannelState, PlanLeg, SmallPayload, SpinnerCatalog, SpinnerKind, SpinnerPayload, SpinnerSettings,
};
use crate::core::{ErrorCode, MAX_PLAN_LEGS};
use crate::dispatch::SubsystemHandle;
use crate::protocol::Message;
use crate::sched::Step;

/// Return value for an accepted request
const ACCEPTED: i32 = 0;

/// Return value for a request refused in the current state
const REFUSED: i32 = 1;

#[derive(Debug, Default, Clone)]
struct Channel {
    state: ChannelState,
    plan: heapless::Vec<PlanLeg, MAX_PLAN_LEGS>,
    elapsed: Duration,
    output_pct: f32,
}

impl Channel {
    /// Output of the plan at `elapsed`, or `None` once every leg has run
    fn plan_output(&self) -> Option<f32> {
        let mut remaining = self.elapsed;
        let mut from = 0.0;

        for leg in &self.plan {
            let duration = Duration::from_millis(u64::from(leg.duration_ms));
            if remaining < duration {
                let fraction = remaining.as_secs_f32() / duration.as_secs_f32();
                return Some(from + (leg.target_pct - from) * fraction);
            }
            remaining -= duration;
            from = leg.target_pct;
        }

        None
    }

    fn final_target(&self) -> f32 {
        self.plan.last().map(|leg| leg.target_pct).unwrap_or(0.0)
    }
}

/// Spinner state machine driving one stepper per channel
pub struct SpinnerController<D: StepperDriver> {
    handle: SubsystemHandle<SpinnerCatalog>,
    channels: Vec<Channel>,
    driver: D,
    spindown_rate_pct_per_sec: f32,
}

impl<D: StepperDriver> SpinnerController<D> {
    pub fn new(handle: SubsystemHandle<SpinnerCatalog>, driver: D, settings: &SpinnerSettings) -> Self {
        SpinnerController {
            handle,
            channels: vec![Channel::default(); settings.channel_count as usize],
            driver,
            spindown_rate_pct_per_sec: settings.spindown_rate_pct_per_sec,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn state(&self, channel: u8) -> Option<ChannelState> {
        self.channels.get(channel as usize).map(|c| c.state)
    }

    /// Current output of `channel` in percent
    pub fn output(&self, channel: u8) -> Option<f32> {
        self.channels.get(channel as usize).map(|c| c.output_pct)
    }

    /// Time since `channel` was last started
    pub fn elapsed(&self, channel: u8) -> Option<Duration> {
        self.channels.get(channel as usize).map(|c| c.elapsed)
    }

    pub fn plan(&self, channel: u8) -> Option<&[PlanLeg]> {
        self.channels.get(channel as usize).map(|c| &c.plan[..])
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Handles at most one queued request
    pub fn step(&mut self) -> Step {
        match self.handle.try_recv() {
            Some(message) => {
                self.handle_message(message);
                Step::Worked
            }
            None => Step::Idle,
        }
    }

    fn handle_message(&mut self, message: Message<SpinnerPayload>) {
        let transaction_id = message.transaction_id();
        let kind = match SpinnerKind::from_index(message.kind()) {
            Some(kind) => kind,
            None => unreachable!("spinner has no message kind {}", message.kind()),
        };
        debug!(transaction_id, kind = kind.name(), "Spinner request");

        match kind {
            SpinnerKind::SetPlan => {
                let plan = message.payload.plan();
                let Some(index) = self.channel_index(plan.channel) else {
                    return;
                };

                let channel = &mut self.channels[index];
                let ret = match channel.state {
                    ChannelState::Stopped => {
                        channel.plan = plan.legs.clone();
                        ACCEPTED
                    }
                    ChannelState::Running | ChannelState::SpinningDown => REFUSED,
                };
                self.reply_ret_val(transaction_id, ret);
            }
            SpinnerKind::SetState => {
                let (channel, requested) = match *message.payload.small() {
                    SmallPayload::StateSet { channel, state } => (channel, state),
                    other => unreachable!("SET_STATE carrying {:?}", other),
                };
                let Some(index) = self.channel_index(channel) else {
                    return;
                };

                let ret = self.set_channel_state(index, channel, requested);
                self.reply_ret_val(transaction_id, ret);
            }
            SpinnerKind::GetPlan => {
                let channel = match *message.payload.small() {
                    SmallPayload::Channel(channel) => channel,
                    other => unreachable!("GET_PLAN carrying {:?}", other),
                };
                let Some(index) = self.channel_index(channel) else {
                    return;
                };

                let legs = &self.channels[index].plan;
                self.reply(transaction_id, SpinnerKind::PlanReply, |payload| {
                    let plan = payload.plan_mut();
                    plan.channel = channel;
                    plan.legs = legs.clone();
                });
            }
            SpinnerKind::GetState => {
                let channel = match *message.payload.small() {
                    SmallPayload::Channel(channel) => channel,
                    other => unreachable!("GET_STATE carrying {:?}", other),
                };
                let Some(index) = self.channel_index(channel) else {
                    return;
                };

                let current = &self.channels[index];
                let reply = SmallPayload::StateReply {
                    channel,
                    state: current.state,
                    elapsed_ms: u32::try_from(current.elapsed.as_millis()).unwrap_or(u32::MAX),
                    output_pct: current.output_pct,
                };
                self.reply(transaction_id, SpinnerKind::StateReply, |payload| {
                    *payload.small_mut() = reply;
                });
            }
            SpinnerKind::PlanReply | SpinnerKind::StateReply | SpinnerKind::RetVal => {
                unreachable!("{} has no parser and cannot be routed inbound", kind.name())
            }
        }
    }

    /// Index of `channel`, reporting a routing error when it does not exist
    fn channel_index(&self, channel: u8) -> Option<usize> {
        let index = channel as usize;
        if index < self.channels.len() {
            return Some(index);
        }

        debug!(channel, "Request for unknown spinner channel");
        self.handle.send_error(ErrorCode::MessageRouting);
        None
    }

    fn set_channel_state(&mut self, index: usize, channel: u8, requested: ChannelState) -> i32 {
        let current = &mut self.channels[index];
        match (current.state, requested) {
            (ChannelState::Stopped, ChannelState::Running) => {
                current.state = ChannelState::Running;
                current.elapsed = Duration::ZERO;
                current.output_pct = 0.0;
                self.driver.remove_stop_position(channel);
                self.driver.set_rate(channel, 0.0);
                self.driver.start(channel);
                info!(channel, "Spinner started");
                ACCEPTED
            }
            (ChannelState::Running, ChannelState::Stopped) => {
                current.state = ChannelState::SpinningDown;
                info!(channel, "Spinner spinning down");
                ACCEPTED
            }
            (ChannelState::SpinningDown, _) => REFUSED,
            _ => ACCEPTED,
        }
    }

    fn reply_ret_val(&self, transaction_id: u32, value: i32) {
        self.reply(transaction_id, SpinnerKind::RetVal, |payload| {
            *payload.small_mut() = SmallPayload::RetVal(value);
        });
    }

    fn reply<F>(&self, transaction_id: u32, kind: SpinnerKind, fill: F)
    where
        F: FnOnce(&mut SpinnerPayload),
    {
        let Some(mut reply) = self.handle.alloc(kind.index()) else {
            warn!("No memory for {} reply", kind.name());
            self.handle.send_error(ErrorCode::MemAlloc);
            return;
        };

        reply.set_transaction_id(transaction_id);
        fill(&mut reply.payload);
        if self.handle.send(reply).is_err() {
            warn!("Spinner outbound queue full, dropped {} reply", kind.name());
        }
    }

    /// Advances every channel by `dt`
    pub fn tick(&mut self, dt: Duration) {
        let spindown_step = self.spindown_rate_pct_per_sec * dt.as_secs_f32();

        for (index, current) in self.channels.iter_mut().enumerate() {
            let channel = index as u8;
            match current.state {
                ChannelState::Stopped => continue,
                ChannelState::Running => {
                    current.elapsed += dt;
                    match current.plan_output() {
                        Some(output) => current.output_pct = output,
                        None => {
                            current.output_pct = current.final_target();
                            current.state = ChannelState::SpinningDown;
                            info!(channel, "Spin plan finished, spinning down");
                        }
                    }
                }
                ChannelState::SpinningDown => {
                    current.elapsed += dt;
                    current.output_pct = if current.output_pct > 0.0 {
                        (current.output_pct - spindown_step).max(0.0)
                    } else {
                        (current.output_pct + spindown_step).min(0.0)
                    };

                    if current.output_pct == 0.0 {
                        current.state = ChannelState::Stopped;
                        self.driver.set_rate(channel, 0.0);
                        self.driver.stop(channel);
                        info!(channel, "Spinner stopped");
                        continue;
                    }
                }
            }

            self.driver.set_rate(channel, current.output_pct);
        }
    }
}
