// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Test doubles for stages, deployers, the wire transport and the reaper.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

use crate::backends::process::ProcessReaper;
use crate::backends::remote::{Connector, FrameChannel};
use crate::config::{DeploymentMode, StageDescriptor};
use crate::errors::{DeploymentError, ServiceError, StageError};
use crate::proto::commands::{
    ANNOTATE, ANNOTATION_TIME_KEY, BATCH_PROCESS_COMPLETE, COMMAND_KEY, DATA_KEY, ERROR_KEY,
    GET_META, GET_PID, HOST_KEY, KEYS_KEY, METADATA_KEY, NO_SUCH_COMMAND, PID_KEY, PORT_KEY,
    RESOLVE, SERVER_KEY, SERVICE_KEY, SHUTDOWN, STATUS_KEY, STATUS_OK,
};
use crate::proto::{Frame, XTalkCodec};
use crate::traits::{Stage, StageDeployer, StageMetadata};
use crate::work::{FeatureRecord, WorkObject};

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shared record of lifecycle calls made on stub stages.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Adds a `Stub` annotation naming itself and records every call.
pub struct StubStage {
    name: String,
    serial: usize,
    log: CallLog,
}

impl StubStage {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_log(name, 0, CallLog::default())
    }

    pub fn with_log(name: impl Into<String>, serial: usize, log: CallLog) -> Self {
        Self {
            name: name.into(),
            serial,
            log,
        }
    }

    fn record(&self, call: &str) {
        locked(&self.log).push(format!("{}#{}:{}", self.name, self.serial, call));
    }
}

#[async_trait]
impl Stage for StubStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata::named(&self.name)
    }

    async fn process(&mut self, work: &mut WorkObject) -> Result<(), StageError> {
        self.record("process");
        work.add_annotation(
            FeatureRecord::new("Stub")
                .with("stage", &self.name)
                .with("instance", self.serial),
        );
        Ok(())
    }

    async fn batch_complete(&mut self) {
        self.record("batch_complete");
    }

    async fn collection_complete(&mut self) -> Result<(), StageError> {
        self.record("collection_complete");
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.record("shutdown");
    }
}

/// Fails every call the way a dead remote service would.
pub struct FailingStage {
    name: String,
    serial: usize,
    log: CallLog,
}

impl FailingStage {
    pub fn new(name: impl Into<String>, serial: usize, log: CallLog) -> Self {
        Self {
            name: name.into(),
            serial,
            log,
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata::named(&self.name)
    }

    async fn process(&mut self, _work: &mut WorkObject) -> Result<(), StageError> {
        locked(&self.log).push(format!("{}#{}:failed", self.name, self.serial));
        Err(ServiceError::Timeout(Duration::from_millis(1)).into())
    }

    async fn shutdown(&mut self) {
        locked(&self.log).push(format!("{}#{}:shutdown", self.name, self.serial));
    }
}

/// One `produce` call seen by a [`CountingDeployer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceCall {
    pub stage: String,
    pub descriptor: Option<String>,
    pub resolved: Option<PathBuf>,
    pub count: usize,
}

/// Deployer that produces stub stages and remembers what it was asked for.
///
/// The first `failing` instances it produces are [`FailingStage`]s.
pub struct CountingDeployer {
    mode: DeploymentMode,
    failing: usize,
    produced: Mutex<usize>,
    calls: Mutex<Vec<ProduceCall>>,
    log: CallLog,
}

impl CountingDeployer {
    pub fn new(mode: DeploymentMode) -> Self {
        Self {
            mode,
            failing: 0,
            produced: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
            log: CallLog::default(),
        }
    }

    pub fn failing_first(mut self, failing: usize) -> Self {
        self.failing = failing;
        self
    }

    pub fn calls(&self) -> Vec<ProduceCall> {
        locked(&self.calls).clone()
    }

    pub fn produced(&self) -> usize {
        *locked(&self.produced)
    }

    pub fn log(&self) -> Vec<String> {
        locked(&self.log).clone()
    }
}

#[async_trait]
impl StageDeployer for CountingDeployer {
    fn mode(&self) -> DeploymentMode {
        self.mode
    }

    async fn produce(
        &self,
        descriptor: &StageDescriptor,
        resolved: Option<&Path>,
        count: usize,
    ) -> Result<Vec<Box<dyn Stage>>, DeploymentError> {
        locked(&self.calls).push(ProduceCall {
            stage: descriptor.name.clone(),
            descriptor: descriptor.descriptor.clone(),
            resolved: resolved.map(Path::to_path_buf),
            count,
        });
        let mut produced = locked(&self.produced);
        let mut stages: Vec<Box<dyn Stage>> = Vec::with_capacity(count);
        for _ in 0..count {
            let serial = *produced;
            *produced += 1;
            if serial < self.failing {
                stages.push(Box::new(FailingStage::new(&descriptor.name, serial, self.log.clone())));
            } else {
                stages.push(Box::new(StubStage::with_log(&descriptor.name, serial, self.log.clone())));
            }
        }
        Ok(stages)
    }
}

/// Reaper that records pids instead of signalling them.
#[derive(Default)]
pub struct RecordingReaper {
    killed: Mutex<Vec<u32>>,
}

impl RecordingReaper {
    pub fn killed(&self) -> Vec<u32> {
        locked(&self.killed).clone()
    }
}

impl ProcessReaper for RecordingReaper {
    fn kill(&self, pid: u32) {
        locked(&self.killed).push(pid);
    }
}

/// How a [`ScriptedConnector`] answers one command.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Frame(Frame),
    /// Never answer.
    Hang,
    /// Never answer the first time, echo afterwards.
    HangOnce,
}

pub const SCRIPTED_PID: u32 = 4242;

#[derive(Default)]
struct Script {
    refuse: u32,
    failing_health_checks: u32,
    legacy: bool,
    ignoring_shutdown: bool,
    replies: HashMap<String, ScriptedReply>,
    directory: HashMap<String, (String, u16)>,
    hung_once: Vec<String>,
    opens: u32,
    targets: Vec<(String, u16)>,
    closes: u32,
    commands: Vec<String>,
}

/// In-memory connector speaking the service side of the protocol.
#[derive(Default, Clone)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the first `n` opens.
    pub fn refusing(n: u32) -> Self {
        let connector = Self::new();
        locked(&connector.script).refuse = n;
        connector
    }

    /// Answer the first `n` health checks with an error.
    pub fn failing_health_checks(self, n: u32) -> Self {
        locked(&self.script).failing_health_checks = n;
        self
    }

    /// Behave like a service that knows neither `GetMeta` nor `GetPid`.
    pub fn legacy(self) -> Self {
        locked(&self.script).legacy = true;
        self
    }

    /// Keep the channel open after `Shutdown`.
    pub fn ignoring_shutdown(self) -> Self {
        locked(&self.script).ignoring_shutdown = true;
        self
    }

    pub fn with_reply(self, command: &str, reply: ScriptedReply) -> Self {
        locked(&self.script).replies.insert(command.to_string(), reply);
        self
    }

    /// Act as a directory that resolves `service` to `host:port`.
    pub fn with_directory(self, service: &str, host: &str, port: u16) -> Self {
        locked(&self.script)
            .directory
            .insert(service.to_string(), (host.to_string(), port));
        self
    }

    /// Every open call, refused ones included.
    pub fn opens(&self) -> u32 {
        locked(&self.script).opens
    }

    pub fn targets(&self) -> Vec<(String, u16)> {
        locked(&self.script).targets.clone()
    }

    pub fn closes(&self) -> u32 {
        locked(&self.script).closes
    }

    /// Commands received on service channels, in order.
    pub fn commands(&self) -> Vec<String> {
        locked(&self.script).commands.clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, host: &str, port: u16) -> Result<Box<dyn FrameChannel>, ServiceError> {
        let mut script = locked(&self.script);
        script.opens += 1;
        script.targets.push((host.to_string(), port));
        if script.refuse > 0 {
            script.refuse -= 1;
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "scripted refusal").into());
        }
        Ok(Box::new(ScriptedChannel {
            script: self.script.clone(),
            pending: VecDeque::new(),
            shutdown_received: false,
        }))
    }
}

enum Pending {
    Reply(Frame),
    Hang,
}

struct ScriptedChannel {
    script: Arc<Mutex<Script>>,
    pending: VecDeque<Pending>,
    shutdown_received: bool,
}

fn error_frame(message: &str) -> Frame {
    let mut frame = Frame::new();
    frame.add_str(ERROR_KEY, message);
    frame
}

impl ScriptedChannel {
    fn answer(&mut self, request: &Frame) -> Option<Pending> {
        let mut script = locked(&self.script);
        if let Some(service) = request.get_str(SERVICE_KEY) {
            if request.get_str(COMMAND_KEY) == Some(RESOLVE) {
                let reply = match script.directory.get(service) {
                    Some((host, port)) => {
                        let mut server = Frame::new();
                        server.add_str(HOST_KEY, host.as_str()).add_str(PORT_KEY, port.to_string());
                        let mut reply = Frame::new();
                        reply.add_frame(SERVER_KEY, server);
                        reply
                    }
                    None => error_frame("service not found"),
                };
                return Some(Pending::Reply(reply));
            }
        }

        let command = request.get_str(COMMAND_KEY).unwrap_or_default().to_string();
        script.commands.push(command.clone());
        match command.as_str() {
            GET_META if script.legacy => Some(Pending::Reply(error_frame(NO_SUCH_COMMAND))),
            GET_META if script.failing_health_checks > 0 => {
                script.failing_health_checks -= 1;
                Some(Pending::Reply(error_frame("still starting")))
            }
            GET_META => {
                let mut meta = Frame::new();
                meta.add_str("Name", "ScriptedService").add_str("Version", "1.0");
                let mut reply = Frame::new();
                reply.add_frame(METADATA_KEY, meta);
                Some(Pending::Reply(reply))
            }
            GET_PID if script.legacy => Some(Pending::Reply(error_frame(NO_SUCH_COMMAND))),
            GET_PID => {
                let mut reply = Frame::new();
                reply
                    .add_str(STATUS_KEY, STATUS_OK)
                    .add_str(PID_KEY, SCRIPTED_PID.to_string());
                Some(Pending::Reply(reply))
            }
            SHUTDOWN => {
                self.shutdown_received = true;
                None
            }
            BATCH_PROCESS_COMPLETE => None,
            _ => match script.replies.get(&command).cloned() {
                Some(ScriptedReply::Frame(reply)) => Some(Pending::Reply(reply)),
                Some(ScriptedReply::Hang) => Some(Pending::Hang),
                Some(ScriptedReply::HangOnce) if !script.hung_once.contains(&command) => {
                    script.hung_once.push(command);
                    Some(Pending::Hang)
                }
                _ => Some(Pending::Reply(request.clone())),
            },
        }
    }
}

#[async_trait]
impl FrameChannel for ScriptedChannel {
    async fn send(&mut self, frame: Frame) -> Result<(), ServiceError> {
        if let Some(reply) = self.answer(&frame) {
            self.pending.push_back(reply);
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Frame, ServiceError> {
        match self.pending.pop_front() {
            Some(Pending::Reply(frame)) => Ok(frame),
            _ => std::future::pending().await,
        }
    }

    async fn wait_closed(&mut self, within: Duration) -> bool {
        if self.shutdown_received && !locked(&self.script).ignoring_shutdown {
            return true;
        }
        tokio::time::sleep(within).await;
        false
    }

    async fn close(&mut self) {
        locked(&self.script).closes += 1;
    }
}

/// A real TCP service speaking the frame protocol on a loopback port.
///
/// `Annotate` echoes the request's keys and adds a `Length` annotation
/// holding the document's character count. `Shutdown` closes the connection.
pub struct FakeService {
    port: u16,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeService {
    pub async fn start() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let commands: Arc<Mutex<Vec<String>>> = Arc::default();

        let log = commands.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(Framed::new(stream, XTalkCodec::new()), log.clone()));
            }
        });
        Ok(Self { port, commands })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn commands(&self) -> Vec<String> {
        locked(&self.commands).clone()
    }

    pub fn count(&self, command: &str) -> usize {
        locked(&self.commands).iter().filter(|c| *c == command).count()
    }
}

async fn serve(
    mut framed: Framed<tokio::net::TcpStream, XTalkCodec>,
    log: Arc<Mutex<Vec<String>>>,
) {
    while let Some(Ok(request)) = framed.next().await {
        let command = request.get_str(COMMAND_KEY).unwrap_or_default().to_string();
        locked(&log).push(command.clone());

        let reply = match command.as_str() {
            GET_META => {
                let mut meta = Frame::new();
                meta.add_str("Name", "FakeService").add_str("Output", "Length");
                let mut reply = Frame::new();
                reply.add_frame(METADATA_KEY, meta);
                reply
            }
            // No pid: tests must never signal a real process.
            GET_PID => error_frame(NO_SUCH_COMMAND),
            ANNOTATE => annotate(&request),
            SHUTDOWN => return,
            BATCH_PROCESS_COMPLETE => continue,
            _ => {
                let mut reply = Frame::new();
                reply.add_str(STATUS_KEY, STATUS_OK);
                reply
            }
        };
        if framed.send(reply).await.is_err() {
            return;
        }
    }
}

fn annotate(request: &Frame) -> Frame {
    let Some(keys) = request.get_frame(DATA_KEY).and_then(|d| d.get_frame(KEYS_KEY)) else {
        return error_frame("Annotate without DATA/KEYS");
    };
    let mut keys = keys.clone();
    let length = keys
        .get_str(crate::proto::commands::DOCUMENT_TEXT_KEY)
        .map(|t| t.chars().count())
        .unwrap_or_default();
    let mut feature = Frame::new();
    feature.add_str("chars", length.to_string());
    keys.add_frame("Length", feature);

    let mut data = Frame::new();
    data.add_frame(KEYS_KEY, keys);
    let mut reply = Frame::new();
    reply.add_frame(DATA_KEY, data).add_str(ANNOTATION_TIME_KEY, "1");
    reply
}
