//! Spinner subsystem
//!
//! This module defines the spin-plan message model: the seven message kinds
//! of the `SPINNER` subsystem, their payload pools, and the parse and
//! serialize functions plugged into the dispatcher. The per-channel state
//! machine consuming those messages lives in [`controller`].

pub mod controller;
pub mod stepper;

pub use self::controller::SpinnerController;
pub use self::stepper::{SimulatedStepper, StepperDriver};

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Config, MAX_PLAN_LEGS};
use crate::protocol::fields::parse_u32;
use crate::protocol::{Catalog, Fields, Message, MessageHandler, MessageHeader, ParseError};
use crate::util::{Pool, Pooled};

/// Name the spinner registers under
pub const SUBSYSTEM_NAME: &str = "SPINNER";

/// Message kinds, in handler table order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpinnerKind {
    SetPlan,
    GetPlan,
    PlanReply,
    SetState,
    GetState,
    StateReply,
    RetVal,
}

impl SpinnerKind {
    pub const ALL: [SpinnerKind; 7] = [
        SpinnerKind::SetPlan,
        SpinnerKind::GetPlan,
        SpinnerKind::PlanReply,
        SpinnerKind::SetState,
        SpinnerKind::GetState,
        SpinnerKind::StateReply,
        SpinnerKind::RetVal,
    ];

    /// Index into the handler table
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Name on the wire
    pub fn name(self) -> &'static str {
        match self {
            SpinnerKind::SetPlan => "SET_PLAN",
            SpinnerKind::GetPlan => "GET_PLAN",
            SpinnerKind::PlanReply => "PLAN_REPLY",
            SpinnerKind::SetState => "SET_STATE",
            SpinnerKind::GetState => "GET_STATE",
            SpinnerKind::StateReply => "STATE_REPLY",
            SpinnerKind::RetVal => "RET_VAL",
        }
    }

    /// Whether the payload comes from the plan pool
    pub fn carries_plan(self) -> bool {
        matches!(self, SpinnerKind::SetPlan | SpinnerKind::PlanReply)
    }
}

/// Run state of one spinner channel
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    #[default]
    Stopped,
    Running,
    SpinningDown,
}

impl ChannelState {
    pub fn name(self) -> &'static str {
        match self {
            ChannelState::Stopped => "STOPPED",
            ChannelState::Running => "RUNNING",
            ChannelState::SpinningDown => "SPINNING_DOWN",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One segment of a spin plan: ramp to `target_pct` over `duration_ms`
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PlanLeg {
    pub duration_ms: u32,
    pub target_pct: f32,
}

/// Payload of `SET_PLAN` and `PLAN_REPLY`
#[derive(Debug, Clone, PartialEq)]
pub struct SpinPlan {
    pub channel: u8,
    pub legs: heapless::Vec<PlanLeg, MAX_PLAN_LEGS>,
    /// Most legs accepted when parsing
    pub leg_limit: usize,
}

impl Default for SpinPlan {
    fn default() -> Self {
        SpinPlan {
            channel: 0,
            legs: heapless::Vec::new(),
            leg_limit: MAX_PLAN_LEGS,
        }
    }
}

/// Payloads of every kind except the plan carrying ones
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum SmallPayload {
    #[default]
    Empty,
    /// `GET_PLAN`, `GET_STATE`
    Channel(u8),
    /// `SET_STATE`
    StateSet { channel: u8, state: ChannelState },
    /// `STATE_REPLY`
    StateReply {
        channel: u8,
        state: ChannelState,
        elapsed_ms: u32,
        output_pct: f32,
    },
    /// `RET_VAL`
    RetVal(i32),
}

/// Payload of a spinner message, drawn from the pool matching its kind
#[derive(Debug)]
pub enum SpinnerPayload {
    Plan(Pooled<SpinPlan>),
    Small(Pooled<SmallPayload>),
}

impl SpinnerPayload {
    pub fn plan(&self) -> &SpinPlan {
        match self {
            SpinnerPayload::Plan(plan) => plan,
            SpinnerPayload::Small(_) => unreachable!("plan kind carrying a small payload"),
        }
    }

    pub fn plan_mut(&mut self) -> &mut SpinPlan {
        match self {
            SpinnerPayload::Plan(plan) => plan,
            SpinnerPayload::Small(_) => unreachable!("plan kind carrying a small payload"),
        }
    }

    pub fn small(&self) -> &SmallPayload {
        match self {
            SpinnerPayload::Small(small) => small,
            SpinnerPayload::Plan(_) => unreachable!("small kind carrying a plan payload"),
        }
    }

    pub fn small_mut(&mut self) -> &mut SmallPayload {
        match self {
            SpinnerPayload::Small(small) => small,
            SpinnerPayload::Plan(_) => unreachable!("small kind carrying a plan payload"),
        }
    }
}

/// Settings of the spinner controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinnerSettings {
    /// Number of channels, numbered from 0
    pub channel_count: u8,
    /// Output decay while spinning down, in percent per second
    pub spindown_rate_pct_per_sec: f32,
    /// Period of the controller's output update
    #[serde(serialize_with = "crate::core::serde::serialize_duration_ms")]
    #[serde(deserialize_with = "crate::core::serde::deserialize_duration_ms")]
    pub tick_interval: Duration,
}

impl Default for SpinnerSettings {
    fn default() -> Self {
        SpinnerSettings {
            channel_count: 1,
            spindown_rate_pct_per_sec: 50.0,
            tick_interval: Duration::from_millis(10),
        }
    }
}

fn parse_set_plan(payload: &mut SpinnerPayload, fields: &mut Fields<'_>) -> Result<(), ParseError> {
    let plan = payload.plan_mut();
    plan.channel = fields.channel()?;

    while let Some(token) = fields.next_field() {
        if plan.legs.len() >= plan.leg_limit {
            return Err(ParseError::TrailingFields);
        }

        let duration_ms = parse_u32(token).ok_or(ParseError::Invalid)?;
        let target_pct = fields.f32()?;
        plan.legs
            .push(PlanLeg {
                duration_ms,
                target_pct,
            })
            .map_err(|_| ParseError::TrailingFields)?;
    }

    if plan.legs.is_empty() {
        return Err(ParseError::Invalid);
    }
    Ok(())
}

fn parse_channel_only(payload: &mut SpinnerPayload, fields: &mut Fields<'_>) -> Result<(), ParseError> {
    *payload.small_mut() = SmallPayload::Channel(fields.channel()?);
    fields.expect_end()
}

fn parse_set_state(payload: &mut SpinnerPayload, fields: &mut Fields<'_>) -> Result<(), ParseError> {
    let channel = fields.channel()?;
    let state = match fields.required()? {
        "ON" => ChannelState::Running,
        "OFF" => ChannelState::Stopped,
        _ => return Err(ParseError::Invalid),
    };
    *payload.small_mut() = SmallPayload::StateSet { channel, state };
    fields.expect_end()
}

fn serialize_plan_reply(payload: &SpinnerPayload, out: &mut dyn fmt::Write) -> fmt::Result {
    let plan = payload.plan();
    write!(out, ",{}", plan.channel)?;
    for leg in &plan.legs {
        write!(out, ",{},{:.6}", leg.duration_ms, leg.target_pct)?;
    }
    Ok(())
}

fn serialize_state_reply(payload: &SpinnerPayload, out: &mut dyn fmt::Write) -> fmt::Result {
    match payload.small() {
        SmallPayload::StateReply {
            channel,
            state,
            elapsed_ms,
            output_pct,
        } => write!(out, ",{},{},{},{:.6}", channel, state, elapsed_ms, output_pct),
        // Nothing written is reported as a formatting failure
        _ => Ok(()),
    }
}

fn serialize_ret_val(payload: &SpinnerPayload, out: &mut dyn fmt::Write) -> fmt::Result {
    match payload.small() {
        SmallPayload::RetVal(value) => write!(out, ",{}", value),
        _ => Ok(()),
    }
}

/// Handler table and pools of the spinner subsystem
pub struct SpinnerCatalog {
    handlers: [MessageHandler<SpinnerPayload>; 7],
    headers: Pool<MessageHeader>,
    small: Pool<SmallPayload>,
    plans: Pool<SpinPlan>,
    max_plan_legs: usize,
}

impl SpinnerCatalog {
    pub fn new(config: &Config) -> Self {
        SpinnerCatalog {
            handlers: [
                MessageHandler::inbound("SET_PLAN", parse_set_plan),
                MessageHandler::inbound("GET_PLAN", parse_channel_only),
                MessageHandler::outbound("PLAN_REPLY", serialize_plan_reply),
                MessageHandler::inbound("SET_STATE", parse_set_state),
                MessageHandler::inbound("GET_STATE", parse_channel_only),
                MessageHandler::outbound("STATE_REPLY", serialize_state_reply),
                MessageHandler::outbound("RET_VAL", serialize_ret_val),
            ],
            headers: Pool::new("spinner headers", config.pools.messages),
            small: Pool::new("spinner small payloads", config.pools.small_payloads),
            plans: Pool::new("spinner plans", config.pools.plan_payloads),
            max_plan_legs: config.max_plan_legs.min(MAX_PLAN_LEGS),
        }
    }

    /// Free slots in the header, small payload and plan pools
    pub fn available(&self) -> (usize, usize, usize) {
        (
            self.headers.available(),
            self.small.available(),
            self.plans.available(),
        )
    }
}

impl Catalog for SpinnerCatalog {
    type Payload = SpinnerPayload;

    fn handlers(&self) -> &[MessageHandler<SpinnerPayload>] {
        &self.handlers
    }

    fn alloc(&self, kind: usize) -> Option<Message<SpinnerPayload>> {
        let spinner_kind = match SpinnerKind::from_index(kind) {
            Some(spinner_kind) => spinner_kind,
            None => unreachable!("spinner has no message kind {}", kind),
        };

        let header = self.headers.try_take()?;
        let payload = if spinner_kind.carries_plan() {
            let mut plan = self.plans.try_take()?;
            plan.leg_limit = self.max_plan_legs;
            SpinnerPayload::Plan(plan)
        } else {
            SpinnerPayload::Small(self.small.try_take()?)
        };

        Some(Message::new(header, kind, payload))
    }
}
