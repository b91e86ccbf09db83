//! Recording fakes of all board capabilities.
//!
//! The fakes never block: waits are recorded instead of slept, and the
//! fake clock advances only when it is polled.

use super::*;

use crate::platform::{
    Delay, HttpResponse, Network, NetworkError, PowerManager, ReadingDisplay, TimeService,
    Transport, TransportError,
};
use chrono::{DateTime, Utc};
use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    io::ErrorKind,
};

pub struct Probe {
    reading: Cell<Option<SensorReading>>,
    reads: Cell<usize>,
}

impl Probe {
    pub fn new(reading: SensorReading) -> Self {
        Self {
            reading: Cell::new(Some(reading)),
            reads: Cell::new(0),
        }
    }

    /// A probe that is not connected.
    pub fn failing() -> Self {
        Self {
            reading: Cell::new(None),
            reads: Cell::new(0),
        }
    }

    pub fn set_reading(&self, reading: SensorReading) {
        self.reading.set(Some(reading));
    }

    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    fn read(&self) -> Result<SensorReading> {
        self.reads.set(self.reads.get() + 1);
        self.reading
            .get()
            .ok_or_else(|| Error::new(ErrorKind::TimedOut, "No response from probe"))
    }
}

#[async_trait(?Send)]
impl Capabilities for Probe {
    async fn read_temperature(&self, _timeout: Option<Duration>) -> Result<Temperature> {
        self.read().map(|r| r.temperature)
    }

    async fn read_water_content(
        &self,
        _timeout: Option<Duration>,
    ) -> Result<VolumetricWaterContent> {
        self.read().map(|r| r.moisture)
    }

    async fn read_reading(&self, _timeout: Option<Duration>) -> Result<SensorReading> {
        self.read()
    }
}

#[derive(Default)]
pub struct Screen {
    frames: RefCell<Vec<(f64, f64)>>,
}

impl Screen {
    pub fn frames(&self) -> Vec<(f64, f64)> {
        self.frames.borrow().clone()
    }
}

impl ReadingDisplay for Screen {
    fn render(&self, moisture_pct: f64, temperature_c: f64) {
        self.frames.borrow_mut().push((moisture_pct, temperature_c));
    }
}

pub struct Wifi {
    result: std::result::Result<(), NetworkError>,
    connects: Cell<usize>,
}

impl Wifi {
    pub fn available() -> Self {
        Self {
            result: Ok(()),
            connects: Cell::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            result: Err(NetworkError::Timeout),
            connects: Cell::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.get()
    }
}

#[async_trait(?Send)]
impl Network for Wifi {
    async fn connect(
        &self,
        _ssid: &str,
        _password: &str,
        _timeout: Duration,
    ) -> std::result::Result<(), NetworkError> {
        self.connects.set(self.connects.get() + 1);
        self.result.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub body: String,
    pub bearer: Option<String>,
}

/// Scripted collector. Every URL answers from its own queue of
/// responses; an exhausted queue behaves like an unreachable host.
#[derive(Default)]
pub struct Collector {
    script: RefCell<HashMap<String, VecDeque<std::result::Result<HttpResponse, TransportError>>>>,
    requests: RefCell<Vec<Request>>,
}

impl Collector {
    pub fn respond(
        &self,
        url: &str,
        response: std::result::Result<HttpResponse, TransportError>,
    ) -> &Self {
        self.script
            .borrow_mut()
            .entry(url.to_owned())
            .or_default()
            .push_back(response);
        self
    }

    pub fn respond_status(&self, url: &str, status: u16, body: &str) -> &Self {
        self.respond(url, Ok(HttpResponse::new(status, body)))
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<Request> {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }
}

#[async_trait(?Send)]
impl Transport for Collector {
    async fn post_json(
        &self,
        url: &str,
        body: &str,
        bearer: Option<&str>,
    ) -> std::result::Result<HttpResponse, TransportError> {
        self.requests.borrow_mut().push(Request {
            url: url.to_owned(),
            body: body.to_owned(),
            bearer: bearer.map(ToOwned::to_owned),
        });
        self.script
            .borrow_mut()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(TransportError::ConnectionFailed(format!("{} unreachable", url))))
    }
}

/// Clock that reports the epoch until it has been polled a number of
/// times after a sync request.
pub struct Clock {
    synced: DateTime<Utc>,
    polls_until_synced: Option<usize>,
    sync_requested: Cell<bool>,
    polls: Cell<usize>,
}

impl Clock {
    pub fn syncing_after(polls: usize, synced: DateTime<Utc>) -> Self {
        Self {
            synced,
            polls_until_synced: Some(polls),
            sync_requested: Cell::new(false),
            polls: Cell::new(0),
        }
    }

    /// Clock that has been synchronized before the cycle started.
    pub fn fixed(now: DateTime<Utc>) -> Self {
        Self {
            synced: now,
            polls_until_synced: Some(0),
            sync_requested: Cell::new(true),
            polls: Cell::new(0),
        }
    }

    pub fn never_syncing() -> Self {
        Self {
            synced: DateTime::<Utc>::default(),
            polls_until_synced: None,
            sync_requested: Cell::new(false),
            polls: Cell::new(0),
        }
    }

    pub fn sync_requested(&self) -> bool {
        self.sync_requested.get()
    }

    pub fn polls(&self) -> usize {
        self.polls.get()
    }
}

#[async_trait(?Send)]
impl TimeService for Clock {
    async fn request_sync(&self, _server: &str) {
        self.sync_requested.set(true);
    }

    fn now(&self) -> DateTime<Utc> {
        let polls = self.polls.get() + 1;
        self.polls.set(polls);
        match self.polls_until_synced {
            Some(after) if self.sync_requested.get() && polls > after => self.synced,
            _ => DateTime::<Utc>::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    ArmExternal(WakeLevel),
    ArmTimer(Duration),
    DeepSleep,
}

pub struct Board {
    wake_cause: WakeEvent,
    events: RefCell<Vec<PowerEvent>>,
}

impl Board {
    pub fn woken_by(wake_cause: WakeEvent) -> Self {
        Self {
            wake_cause,
            events: RefCell::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<PowerEvent> {
        self.events.borrow().clone()
    }
}

impl PowerManager for Board {
    fn wake_cause(&self) -> WakeEvent {
        self.wake_cause
    }

    fn arm_external_wake(&self, level: WakeLevel) {
        self.events.borrow_mut().push(PowerEvent::ArmExternal(level));
    }

    fn arm_timer_wake(&self, after: Duration) {
        self.events.borrow_mut().push(PowerEvent::ArmTimer(after));
    }

    fn enter_deep_sleep(&self) {
        self.events.borrow_mut().push(PowerEvent::DeepSleep);
    }
}

#[derive(Default)]
pub struct Pauses {
    recorded: RefCell<Vec<Duration>>,
}

impl Pauses {
    pub fn recorded(&self) -> Vec<Duration> {
        self.recorded.borrow().clone()
    }

    pub fn total(&self) -> Duration {
        self.recorded.borrow().iter().sum()
    }
}

#[async_trait(?Send)]
impl Delay for Pauses {
    async fn pause(&self, duration: Duration) {
        self.recorded.borrow_mut().push(duration);
    }
}
