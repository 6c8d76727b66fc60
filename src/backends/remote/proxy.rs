// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Client side of the frame RPC protocol.
//!
//! State machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected <-> Busy
//!                     |             |
//!                     v             v
//!                   Failed     Disconnected
//! ```
//!
//! `Failed` means the last connect sequence exhausted its retry budget;
//! `Disconnected` means never connected or closed after a call failure.
//!
//! A timed-out call is abandoned, not cancelled: the service may keep working
//! on a request the proxy has already given up on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backends::process::ProcessReaper;
use crate::config::consts::{
    CONNECT_RETRY_COUNT_ENV, CONNECT_RETRY_DELAY, DEFAULT_CALL_TIMEOUT,
    DEFAULT_CONNECT_RETRY_COUNT, SHUTDOWN_GRACE, SHUTDOWN_POLL_ATTEMPTS, SHUTDOWN_POLL_INTERVAL,
};
use crate::config::DirectoryConfig;
use crate::errors::{ConfigError, ServiceError};
use crate::observability::messages::proxy::{
    CallFailed, ConnectAttemptFailed, Connected, NotificationFailed, ServiceResolved,
    ShutdownCompleted,
};
use crate::proto::commands::{
    COLLECTION_PROCESS_COMPLETE, COMMAND_KEY, GET_META, GET_PID, HOST_KEY, NO_SUCH_COMMAND,
    PID_KEY, PORT_KEY, RESOLVE, SERVER_KEY, SERVICE_KEY, SHUTDOWN, STATUS_KEY, STATUS_OK,
};
use crate::proto::Frame;

use super::transport::{Connector, FrameChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Disconnected,
    Connecting,
    Connected,
    Busy,
    Failed,
}

/// Where the proxy connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Address { host: String, port: u16 },
    Named { service: String },
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Address { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Named { service } => write!(f, "service '{}'", service),
        }
    }
}

/// Tunables for one proxy.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub timeout: Duration,
    /// Explicit retry budget. When unset the environment override or default applies.
    pub connect_retries: Option<u32>,
    /// Environment variable holding the retry budget override.
    pub retry_count_env: &'static str,
    pub retry_delay: Duration,
    /// Reconnect before a call when the channel is gone, and after a failed call.
    pub test_before_send: bool,
    pub directory: Option<DirectoryConfig>,
    pub shutdown_grace: Duration,
    pub shutdown_poll_attempts: u32,
    pub shutdown_poll_interval: Duration,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CALL_TIMEOUT,
            connect_retries: None,
            retry_count_env: CONNECT_RETRY_COUNT_ENV,
            retry_delay: CONNECT_RETRY_DELAY,
            test_before_send: false,
            directory: None,
            shutdown_grace: SHUTDOWN_GRACE,
            shutdown_poll_attempts: SHUTDOWN_POLL_ATTEMPTS,
            shutdown_poll_interval: SHUTDOWN_POLL_INTERVAL,
        }
    }
}

/// Counters kept across the proxy's life.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyStats {
    pub calls: u64,
    pub failed_calls: u64,
    /// Attempts made by the most recent connect sequence.
    pub last_connect_attempts: u32,
    pub round_trip: Duration,
    /// Processing time the service reported in its `AnnotationTime` replies.
    pub service_time: Duration,
}

pub struct RemoteServiceProxy {
    connector: Arc<dyn Connector>,
    reaper: Arc<dyn ProcessReaper>,
    settings: ProxySettings,
    state: ProxyState,
    channel: Option<Box<dyn FrameChannel>>,
    endpoint: Option<Endpoint>,
    /// Reported by the service on the current connection.
    pid: Option<u32>,
    /// Learned outside the protocol; survives reconnects.
    known_pid: Option<u32>,
    metadata: Option<Frame>,
    stats: ProxyStats,
}

impl RemoteServiceProxy {
    pub fn new(
        connector: Arc<dyn Connector>,
        reaper: Arc<dyn ProcessReaper>,
        settings: ProxySettings,
    ) -> Self {
        Self {
            connector,
            reaper,
            settings,
            state: ProxyState::Disconnected,
            channel: None,
            endpoint: None,
            pid: None,
            known_pid: None,
            metadata: None,
            stats: ProxyStats::default(),
        }
    }

    pub fn state(&self) -> ProxyState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ProxyState::Connected | ProxyState::Busy) && self.channel.is_some()
    }

    /// Process id of the service: the one it reported at connect time, else
    /// one recorded through [`set_pid`](Self::set_pid).
    pub fn pid(&self) -> Option<u32> {
        self.pid.or(self.known_pid)
    }

    /// Record a process id learned another way, e.g. from a spawned child.
    pub fn set_pid(&mut self, pid: u32) {
        self.known_pid = Some(pid);
    }

    /// Last health-check reply. `None` when the service predates `GetMeta`.
    pub fn metadata(&self) -> Option<&Frame> {
        self.metadata.as_ref()
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn stats(&self) -> &ProxyStats {
        &self.stats
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    pub fn record_service_time(&mut self, elapsed: Duration) {
        self.stats.service_time += elapsed;
    }

    /// Retry budget for one connect sequence.
    ///
    /// Read at the start of every sequence so the error can name the endpoint
    /// being connected to.
    fn retry_budget(&self, host: &str, port: u16) -> Result<u32, ConfigError> {
        if let Some(explicit) = self.settings.connect_retries {
            return Ok(explicit);
        }
        match std::env::var(self.settings.retry_count_env) {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidRetryCount {
                    value: raw.clone(),
                    host: host.to_string(),
                    port,
                }),
            Err(_) => Ok(DEFAULT_CONNECT_RETRY_COUNT),
        }
    }

    /// Connect to a literal address with bounded retry.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), ServiceError> {
        self.drop_channel().await;
        let budget = self.retry_budget(host, port)?;
        self.state = ProxyState::Connecting;
        self.pid = None;

        for attempt in 1..=budget {
            self.stats.last_connect_attempts = attempt;
            match self.attempt(host, port).await {
                Ok(channel) => {
                    self.finish_connect(channel, Endpoint::Address { host: host.to_string(), port });
                    tracing::info!("{}", Connected { host, port, attempt, pid: self.pid() });
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        "{}",
                        ConnectAttemptFailed { target: &format!("{}:{}", host, port), attempt, budget, error: &e }
                    );
                    if attempt < budget {
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
            }
        }

        self.state = ProxyState::Failed;
        Err(ServiceError::ConnectionFailed {
            host: host.to_string(),
            port,
            attempts: budget,
        })
    }

    /// Connect to a service registered with the directory.
    ///
    /// An unconfigured directory fails at once without consuming retries.
    pub async fn connect_named(&mut self, service: &str) -> Result<(), ServiceError> {
        let directory = self.settings.directory.clone().ok_or_else(|| {
            ConfigError::DirectoryNotConfigured {
                service: service.to_string(),
            }
        })?;
        self.drop_channel().await;
        let budget = self.retry_budget(&directory.host, directory.port)?;
        self.state = ProxyState::Connecting;
        self.pid = None;

        for attempt in 1..=budget {
            self.stats.last_connect_attempts = attempt;
            let outcome = match resolve(self.connector.as_ref(), &directory, service, self.settings.timeout).await {
                Ok((host, port)) => {
                    tracing::debug!("{}", ServiceResolved { service, host: &host, port });
                    self.attempt(&host, port).await.map(|ch| (ch, host, port))
                }
                Err(e) => Err(e),
            };
            match outcome {
                Ok((channel, host, port)) => {
                    self.finish_connect(
                        channel,
                        Endpoint::Named {
                            service: service.to_string(),
                        },
                    );
                    tracing::info!("{}", Connected { host: &host, port, attempt, pid: self.pid() });
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        "{}",
                        ConnectAttemptFailed { target: service, attempt, budget, error: &e }
                    );
                    if attempt < budget {
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
            }
        }

        self.state = ProxyState::Failed;
        Err(ServiceError::ServiceUnavailable {
            service: service.to_string(),
            attempts: budget,
        })
    }

    /// Reconnect to whatever endpoint the proxy last connected to.
    pub async fn reconnect(&mut self) -> Result<(), ServiceError> {
        match self.endpoint.clone() {
            Some(Endpoint::Address { host, port }) => self.connect(&host, port).await,
            Some(Endpoint::Named { service }) => self.connect_named(&service).await,
            None => Err(ServiceError::NotConnected),
        }
    }

    fn finish_connect(&mut self, channel: Box<dyn FrameChannel>, endpoint: Endpoint) {
        self.channel = Some(channel);
        self.endpoint = Some(endpoint);
        self.state = ProxyState::Connected;
    }

    /// One connect attempt: open, health check, best-effort pid query.
    async fn attempt(&mut self, host: &str, port: u16) -> Result<Box<dyn FrameChannel>, ServiceError> {
        let mut channel = self.connector.open(host, port).await?;

        let reply = match exchange(channel.as_mut(), Frame::command(GET_META), self.settings.timeout).await {
            Ok(reply) => reply,
            Err(e) => {
                channel.close().await;
                return Err(e);
            }
        };
        match reply.error().map(str::to_string) {
            None => self.metadata = Some(reply),
            Some(msg) if msg.contains(NO_SUCH_COMMAND) => self.metadata = None,
            Some(msg) => {
                let err = ServiceError::Remote(msg);
                channel.close().await;
                return Err(err);
            }
        }

        match exchange(channel.as_mut(), Frame::command(GET_PID), self.settings.timeout).await {
            Ok(reply) => {
                if reply.get_str(STATUS_KEY) == Some(STATUS_OK) {
                    self.pid = reply.get_parsed(PID_KEY);
                }
            }
            // A channel that timed out may still deliver the late reply.
            Err(e) if e.is_connection() => {
                channel.close().await;
                return Err(e);
            }
            Err(e) => tracing::debug!("GetPid not supported by {}:{}: {}", host, port, e),
        }
        Ok(channel)
    }

    /// Send a request and wait for its reply.
    ///
    /// Timeouts and transport failures close the channel and leave the proxy
    /// `Disconnected`. An embedded error in the reply is returned as an error
    /// but keeps the channel open.
    pub async fn call(&mut self, request: Frame) -> Result<Frame, ServiceError> {
        if self.settings.test_before_send && !self.is_connected() && self.endpoint.is_some() {
            self.reconnect().await?;
        }
        let mut channel = match (self.state, self.channel.take()) {
            (ProxyState::Connected, Some(channel)) => channel,
            (_, channel) => {
                self.channel = channel;
                return Err(ServiceError::NotConnected);
            }
        };

        let command = request.get_str(COMMAND_KEY).unwrap_or_default().to_string();
        self.state = ProxyState::Busy;
        let started = Instant::now();
        let result = exchange(channel.as_mut(), request, self.settings.timeout).await;
        self.stats.round_trip += started.elapsed();

        match result {
            Ok(reply) => {
                self.channel = Some(channel);
                self.state = ProxyState::Connected;
                self.stats.calls += 1;
                match reply.error().map(str::to_string) {
                    None => Ok(reply),
                    Some(msg) if is_unknown_command(&msg) => {
                        self.stats.failed_calls += 1;
                        Err(ServiceError::UnknownCommand(command))
                    }
                    Some(msg) => {
                        self.stats.failed_calls += 1;
                        Err(ServiceError::Remote(msg))
                    }
                }
            }
            Err(e) => {
                channel.close().await;
                self.state = ProxyState::Disconnected;
                self.stats.failed_calls += 1;
                tracing::warn!("{}", CallFailed { command: &command, error: &e });
                if self.settings.test_before_send {
                    if let Err(reconnect_err) = self.reconnect().await {
                        tracing::warn!("reconnect after failed '{}' failed: {}", command, reconnect_err);
                    }
                }
                Err(e)
            }
        }
    }

    /// One-way notification. Failures are logged, never returned.
    pub async fn notify(&mut self, command: &str) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        if let Err(e) = channel.send(Frame::command(command)).await {
            tracing::warn!("{}", NotificationFailed { command, error: &e });
        }
    }

    /// Notification that waits for the service's acknowledgement.
    pub async fn notify_and_wait(&mut self, command: &str) -> Result<(), ServiceError> {
        if !self.is_connected() {
            return Ok(());
        }
        self.call(Frame::command(command)).await.map(|_| ())
    }

    /// Shut the connection down. Always leaves the local channel closed.
    ///
    /// With `notify_first` a collection-complete is sent and acknowledged
    /// first. With `stop_service` a one-way `Shutdown` follows; if the service
    /// has not closed the channel within the grace period and a process id is
    /// known, the process is killed.
    pub async fn shutdown(&mut self, stop_service: bool, notify_first: bool) {
        if self.is_connected() {
            if notify_first {
                if let Err(e) = self.notify_and_wait(COLLECTION_PROCESS_COMPLETE).await {
                    tracing::warn!("{}", NotificationFailed { command: COLLECTION_PROCESS_COMPLETE, error: &e });
                }
            }
            if stop_service {
                self.notify(SHUTDOWN).await;
                let mut exited = match self.channel.as_mut() {
                    Some(channel) => channel.wait_closed(self.settings.shutdown_grace).await,
                    None => true,
                };
                if !exited {
                    if let Some(pid) = self.pid() {
                        self.reaper.kill(pid);
                    }
                    exited = self.wait_for_service_exit().await;
                }
                tracing::info!(
                    "{}",
                    ShutdownCompleted {
                        endpoint: &self
                            .endpoint
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_default(),
                        service_exited: exited,
                    }
                );
            }
        }
        self.drop_channel().await;
        self.state = ProxyState::Disconnected;
    }

    async fn wait_for_service_exit(&mut self) -> bool {
        let Some(channel) = self.channel.as_mut() else {
            return true;
        };
        for _ in 0..self.settings.shutdown_poll_attempts {
            if channel.wait_closed(self.settings.shutdown_poll_interval).await {
                return true;
            }
        }
        false
    }

    async fn drop_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
        if self.state != ProxyState::Failed {
            self.state = ProxyState::Disconnected;
        }
    }
}

fn is_unknown_command(msg: &str) -> bool {
    msg.contains(NO_SUCH_COMMAND) || msg.eq_ignore_ascii_case("unknown command")
}

/// Ask the directory service where `service` lives.
async fn resolve(
    connector: &dyn Connector,
    directory: &DirectoryConfig,
    service: &str,
    timeout: Duration,
) -> Result<(String, u16), ServiceError> {
    let mut channel = connector.open(&directory.host, directory.port).await?;
    let mut request = Frame::command(RESOLVE);
    request.add_str(SERVICE_KEY, service);
    let reply = exchange(channel.as_mut(), request, timeout).await;
    channel.close().await;
    let reply = reply?;

    if let Some(msg) = reply.error() {
        return Err(ServiceError::Remote(msg.to_string()));
    }
    let server = reply.get_frame(SERVER_KEY).unwrap_or(&reply);
    match (server.get_str(HOST_KEY), server.get_parsed::<u16>(PORT_KEY)) {
        (Some(host), Some(port)) => Ok((host.to_string(), port)),
        _ => Err(ServiceError::Remote(format!(
            "directory reply for '{}' has no usable HOST/PORT",
            service
        ))),
    }
}

/// Send one frame and wait for the reply, bounded by `timeout`.
async fn exchange(
    channel: &mut dyn FrameChannel,
    request: Frame,
    timeout: Duration,
) -> Result<Frame, ServiceError> {
    let round_trip = async {
        channel.send(request).await?;
        channel.recv().await
    };
    tokio::time::timeout(timeout, round_trip)
        .await
        .map_err(|_| ServiceError::Timeout(timeout))?
}
