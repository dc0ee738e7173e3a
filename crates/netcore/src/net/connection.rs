use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::codec::FrameDecoder;
use super::protocol::{
    Account, Connect, ConnectAck, DisconnectReason, Packet, wire_timestamp,
};
use super::reliable::{Acknowledgement, ReceiveTracker, ReliableSender};
use super::stats::NetworkStats;
use super::transport::{
    ChannelCloser, ChannelReader, ChannelWriter, DuplexChannel, FrameTransform, TransformFactory,
    Transport, plaintext_factory,
};
use crate::config::{ClientConfig, ConnectionConfig, ReconnectConfig, ReliableConfig};
use crate::error::NetError;
use crate::event::{ClientEvent, EventSink};

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    InGame,
    Error,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (_, Disconnected) => true,
            (Disconnected | Error, Connecting) => true,
            (Connecting, Connected) => true,
            (Connected, Authenticating) => true,
            (Authenticating, InGame) => true,
            (Connecting | Connected | Authenticating, Error) => true,
            _ => false,
        }
    }

    /// A transport link exists in these states.
    pub fn is_linked(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Authenticating | ConnectionState::InGame
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::InGame => "in game",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Inbound {
    Packet(Packet),
    Closed(String),
}

/// State shared between the owner and the background threads of one
/// connection.
struct Link {
    running: AtomicBool,
    stopped: Mutex<bool>,
    stop_signal: Condvar,
    outbound: SyncSender<Vec<u8>>,
    reliable: Mutex<ReliableSender>,
    stats: Arc<Mutex<NetworkStats>>,
    queued: AtomicUsize,
    closer: ChannelCloser,
}

impl Link {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Hands an encoded frame to the writer thread. Never blocks.
    fn enqueue(&self, bytes: Vec<u8>) -> Result<(), NetError> {
        match self.outbound.try_send(bytes) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(NetError::OutboundFull),
            Err(TrySendError::Disconnected(_)) => Err(NetError::NotConnected),
        }
    }

    fn send_packet(&self, packet: &Packet) -> Result<(), NetError> {
        log::trace!("send {}", packet.id().name());
        self.enqueue(packet.encode())
    }

    fn send_reliable(&self, packet: &Packet) -> Result<u32, NetError> {
        let mut reliable = lock(&self.reliable);
        let (sequence, bytes) = reliable.send(packet.encode(), Instant::now());
        if let Err(err) = self.enqueue(bytes) {
            reliable.cancel(sequence);
            return Err(err);
        }
        log::trace!("send {} reliably as {sequence}", packet.id().name());
        Ok(sequence)
    }

    fn refresh_rtt(&self) {
        let (srtt, var) = {
            let reliable = lock(&self.reliable);
            (reliable.rtt().srtt(), reliable.rtt().rtt_var())
        };
        let mut stats = lock(&self.stats);
        stats.rtt_ms = srtt;
        stats.rtt_variance = var;
    }

    /// Sleeps up to `timeout`; `false` once the link has been stopped.
    fn wait(&self, timeout: Duration) -> bool {
        let guard = lock(&self.stopped);
        let (guard, _) = self
            .stop_signal
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        !*guard
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        *lock(&self.stopped) = true;
        self.stop_signal.notify_all();
    }

    fn close(&self) {
        (self.closer)();
    }
}

struct Session {
    link: Arc<Link>,
    inbound: Receiver<Inbound>,
    /// Disconnects when the writer thread exits.
    writer_done: Receiver<()>,
    flush_timeout: Duration,
    writer_thread: Option<JoinHandle<()>>,
    io_thread: Option<JoinHandle<()>>,
    timer_thread: Option<JoinHandle<()>>,
}

impl Session {
    /// The writer gets up to `flush_timeout` to flush what is already
    /// queued before the channel closes under it.
    fn shutdown(mut self) {
        self.link.stop();
        let flushed = self.writer_done.recv_timeout(self.flush_timeout);
        if let Err(RecvTimeoutError::Timeout) = flushed {
            log::debug!("outbound flush timed out");
        }
        self.link.close();
        join(self.writer_thread.take());
        join(self.io_thread.take());
        join(self.timer_thread.take());
    }
}

fn join(handle: Option<JoinHandle<()>>) {
    if let Some(handle) = handle {
        if handle.join().is_err() {
            log::error!("network thread panicked during shutdown");
        }
    }
}

/// Sole owner of the channel's write half.
struct WriterLoop {
    link: Arc<Link>,
    frames: Receiver<Vec<u8>>,
    writer: ChannelWriter,
    transform: Box<dyn FrameTransform>,
    poll: Duration,
}

impl WriterLoop {
    fn run(mut self) {
        while self.link.is_running() {
            match self.frames.recv_timeout(self.poll) {
                Ok(bytes) => {
                    if !self.write(bytes) {
                        return;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        while let Ok(bytes) = self.frames.try_recv() {
            if !self.write(bytes) {
                return;
            }
        }
    }

    fn write(&mut self, mut bytes: Vec<u8>) -> bool {
        let len = bytes.len();
        self.transform.apply(&mut bytes);
        let result = self
            .writer
            .write_all(&bytes)
            .and_then(|()| self.writer.flush());

        match result {
            Ok(()) => {
                lock(&self.link.stats).record_sent(len);
                true
            }
            Err(err) => {
                // A partial frame desynchronises the stream; the reader
                // reports the loss once the channel is closed.
                if self.link.is_running() {
                    log::warn!("write failed, closing link: {err}");
                    self.link.close();
                }
                false
            }
        }
    }
}

struct IoLoop {
    link: Arc<Link>,
    reader: ChannelReader,
    transform: Box<dyn FrameTransform>,
    inbound: SyncSender<Inbound>,
    decoder: FrameDecoder,
    received: ReceiveTracker,
}

impl IoLoop {
    fn run(mut self) {
        let mut buf = [0u8; READ_CHUNK];
        let reason = loop {
            if !self.link.is_running() {
                return;
            }

            match self.reader.read(&mut buf) {
                Ok(0) => break "connection closed by peer".to_string(),
                Ok(n) => {
                    let chunk = &mut buf[..n];
                    self.transform.apply(chunk);
                    lock(&self.link.stats).bytes_received += n as u64;
                    self.decoder.push(chunk);
                    if let Err(reason) = self.drain_frames() {
                        break reason;
                    }
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock
                            | io::ErrorKind::TimedOut
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(err) => break format!("transport error: {err}"),
            }
        };

        if self.link.is_running() {
            log::warn!("link lost: {reason}");
            self.deliver(Inbound::Closed(reason));
        }
    }

    fn drain_frames(&mut self) -> Result<(), String> {
        loop {
            match self.decoder.next_frame() {
                Ok(Some(packet)) => {
                    lock(&self.link.stats).packets_received += 1;
                    self.route(packet);
                }
                Ok(None) => return Ok(()),
                Err(err) => {
                    lock(&self.link.stats).decode_errors += 1;
                    if err.breaks_framing() {
                        return Err(format!("stream desynchronised: {err}"));
                    }
                    log::warn!("dropping frame: {err}");
                }
            }
        }
    }

    /// Transport-level packets are consumed here; everything else is queued
    /// for the simulation thread.
    fn route(&mut self, packet: Packet) {
        match packet {
            Packet::Ack { sequence } => {
                let outcome = lock(&self.link.reliable).acknowledge(sequence, Instant::now());
                match outcome {
                    Acknowledgement::Released { rtt: Some(_) } => self.link.refresh_rtt(),
                    Acknowledgement::Released { rtt: None } => {}
                    Acknowledgement::Unknown => log::trace!("late ack for {sequence}"),
                }
            }
            Packet::HeartbeatAck { timestamp } => {
                let elapsed = wire_timestamp().wrapping_sub(timestamp);
                if elapsed < 60_000 {
                    lock(&self.link.reliable).observe_rtt(Duration::from_millis(elapsed as u64));
                    self.link.refresh_rtt();
                }
            }
            Packet::Heartbeat { timestamp } => {
                if let Err(err) = self.link.send_packet(&Packet::HeartbeatAck { timestamp }) {
                    log::debug!("heartbeat reply failed: {err}");
                }
            }
            Packet::Reliable { sequence, frame } => {
                if let Err(err) = self.link.send_packet(&Packet::Ack { sequence }) {
                    log::debug!("ack for {sequence} failed: {err}");
                }
                if !self.received.record_received(sequence) {
                    lock(&self.link.stats).duplicates += 1;
                    log::debug!("duplicate reliable packet {sequence}");
                    return;
                }
                match Packet::decode(&frame) {
                    Ok(Packet::Reliable { .. }) => {
                        lock(&self.link.stats).decode_errors += 1;
                        log::warn!("nested reliable packet in {sequence} dropped");
                    }
                    Ok(inner) => self.route(inner),
                    Err(err) => {
                        lock(&self.link.stats).decode_errors += 1;
                        log::warn!("reliable packet {sequence} undecodable: {err}");
                    }
                }
            }
            other => self.deliver(Inbound::Packet(other)),
        }
    }

    fn deliver(&self, mut item: Inbound) {
        loop {
            match self.inbound.try_send(item) {
                Ok(()) => {
                    self.link.queued.fetch_add(1, Ordering::SeqCst);
                    return;
                }
                Err(TrySendError::Full(back)) => {
                    if !self.link.is_running() {
                        return;
                    }
                    item = back;
                    thread::sleep(Duration::from_millis(1));
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

struct TimerLoop {
    link: Arc<Link>,
    events: EventSink,
    tick_interval: Duration,
    heartbeat_interval: Duration,
}

impl TimerLoop {
    fn run(self) {
        let mut last_heartbeat = Instant::now();
        while self.link.wait(self.tick_interval) {
            let now = Instant::now();
            let update = lock(&self.link.reliable).update(now);

            for bytes in update.retransmit {
                match self.link.enqueue(bytes) {
                    Ok(()) => lock(&self.link.stats).retransmissions += 1,
                    Err(err) => log::debug!("retransmit failed: {err}"),
                }
            }

            if !update.lost.is_empty() {
                lock(&self.link.stats).packets_lost += update.lost.len() as u64;
                for sequence in update.lost {
                    log::warn!("reliable packet {sequence} lost after retries");
                    self.events.push(ClientEvent::DeliveryLost { sequence });
                }
            }

            if now.duration_since(last_heartbeat) >= self.heartbeat_interval {
                last_heartbeat = now;
                let heartbeat = Packet::Heartbeat {
                    timestamp: wire_timestamp(),
                };
                if let Err(err) = self.link.send_packet(&heartbeat) {
                    log::debug!("heartbeat failed: {err}");
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ReconnectSchedule {
    attempts: u32,
    next_at: Instant,
}

/// Owns the connection lifecycle: the state machine, the transport link and
/// its background threads, and the inbound queue.
pub struct ConnectionManager {
    config: ConnectionConfig,
    reliable_config: ReliableConfig,
    reconnect_config: ReconnectConfig,
    transport: Box<dyn Transport>,
    transform: TransformFactory,
    state: ConnectionState,
    session: Option<Session>,
    endpoint: Option<Endpoint>,
    stats: Arc<Mutex<NetworkStats>>,
    events: EventSink,
    server_time: Option<u32>,
    reconnect: Option<ReconnectSchedule>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("endpoint", &self.endpoint())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new(config: &ClientConfig, transport: Box<dyn Transport>, events: EventSink) -> Self {
        Self {
            config: config.connection.clone(),
            reliable_config: config.reliable.clone(),
            reconnect_config: config.reconnect.clone(),
            transport,
            transform: plaintext_factory(),
            state: ConnectionState::Disconnected,
            session: None,
            endpoint: None,
            stats: Arc::new(Mutex::new(NetworkStats::default())),
            events,
            server_time: None,
            reconnect: None,
        }
    }

    /// Applies to links opened after this call.
    pub fn set_transform(&mut self, factory: TransformFactory) {
        self.transform = factory;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn server_time(&self) -> Option<u32> {
        self.server_time
    }

    pub fn is_linked(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.reconnect.is_some()
    }

    pub fn network_stats(&self) -> NetworkStats {
        lock(&self.stats).clone()
    }

    pub fn pending_reliable(&self) -> usize {
        self.session
            .as_ref()
            .map_or(0, |s| lock(&s.link.reliable).pending_count())
    }

    pub fn inbound_queued(&self) -> usize {
        self.session
            .as_ref()
            .map_or(0, |s| s.link.queued.load(Ordering::SeqCst))
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            log::warn!("ignoring transition {} -> {}", self.state, next);
            return;
        }
        log::debug!("connection state {} -> {}", self.state, next);
        self.state = next;
    }

    pub fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> Result<(), NetError> {
        if !self.state.can_transition_to(ConnectionState::Connecting) {
            return Err(NetError::invalid_state("connect", self.state));
        }
        self.reconnect = None;
        self.endpoint = Some(Endpoint {
            host: host.to_string(),
            port,
            timeout,
        });
        self.establish()
    }

    fn establish(&mut self) -> Result<(), NetError> {
        let endpoint = self.endpoint.clone().ok_or(NetError::NotConnected)?;
        self.transition(ConnectionState::Connecting);
        log::info!("connecting to {endpoint}");

        let channel = match self
            .transport
            .open(&endpoint.host, endpoint.port, endpoint.timeout)
        {
            Ok(channel) => channel,
            Err(err) => {
                let err = match err.kind() {
                    io::ErrorKind::TimedOut => NetError::ConnectTimeout {
                        endpoint: endpoint.to_string(),
                    },
                    io::ErrorKind::NotFound => NetError::Resolve {
                        endpoint: endpoint.to_string(),
                    },
                    _ => NetError::Transport(err),
                };
                self.fail(err.to_string());
                return Err(err);
            }
        };

        match self.spawn_session(channel) {
            Ok(session) => self.session = Some(session),
            Err(err) => {
                self.fail(err.to_string());
                return Err(err);
            }
        }

        let hello = Packet::Connect(Connect {
            timestamp: wire_timestamp(),
            client_version: self.config.client_version,
        });
        if let Err(err) = self.send(&hello) {
            self.fail(format!("handshake failed: {err}"));
            return Err(err);
        }

        self.transition(ConnectionState::Connected);
        log::info!("connected to {endpoint}");
        self.events.push(ClientEvent::Connected);
        Ok(())
    }

    fn spawn_session(&self, channel: DuplexChannel) -> Result<Session, NetError> {
        let DuplexChannel {
            reader,
            writer,
            closer,
        } = channel;

        let (frames_tx, frames_rx) =
            mpsc::sync_channel(self.config.outbound_queue_capacity.max(1));
        let link = Arc::new(Link {
            running: AtomicBool::new(true),
            stopped: Mutex::new(false),
            stop_signal: Condvar::new(),
            outbound: frames_tx,
            reliable: Mutex::new(ReliableSender::new(
                self.reliable_config.retry_interval,
                self.reliable_config.max_retries,
            )),
            stats: Arc::clone(&self.stats),
            queued: AtomicUsize::new(0),
            closer,
        });

        let writer = WriterLoop {
            link: Arc::clone(&link),
            frames: frames_rx,
            writer,
            transform: (self.transform)(),
            poll: self.config.read_poll_interval,
        };
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let writer_thread = match thread::Builder::new()
            .name("tessera-writer".into())
            .spawn(move || {
                let _done = done_tx;
                writer.run();
            }) {
            Ok(handle) => handle,
            Err(err) => {
                link.stop();
                link.close();
                return Err(err.into());
            }
        };

        let (tx, rx) = mpsc::sync_channel(self.config.inbound_queue_capacity.max(1));
        let io = IoLoop {
            link: Arc::clone(&link),
            reader,
            transform: (self.transform)(),
            inbound: tx,
            decoder: FrameDecoder::new(),
            received: ReceiveTracker::new(self.reliable_config.dedup_window),
        };
        let io_thread = match thread::Builder::new()
            .name("tessera-io".into())
            .spawn(move || io.run())
        {
            Ok(handle) => handle,
            Err(err) => {
                link.stop();
                link.close();
                join(Some(writer_thread));
                return Err(err.into());
            }
        };

        let timer = TimerLoop {
            link: Arc::clone(&link),
            events: self.events.clone(),
            tick_interval: self.reliable_config.tick_interval,
            heartbeat_interval: self.config.heartbeat_interval,
        };
        let timer_thread = match thread::Builder::new()
            .name("tessera-timer".into())
            .spawn(move || timer.run())
        {
            Ok(handle) => handle,
            Err(err) => {
                link.stop();
                link.close();
                join(Some(writer_thread));
                join(Some(io_thread));
                return Err(err.into());
            }
        };

        Ok(Session {
            link,
            inbound: rx,
            writer_done: done_rx,
            flush_timeout: self.config.write_timeout,
            writer_thread: Some(writer_thread),
            io_thread: Some(io_thread),
            timer_thread: Some(timer_thread),
        })
    }

    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown();
        }
        self.server_time = None;
    }

    /// Falls back to `Disconnected` from states that cannot fail into
    /// `Error`, so a torn-down link never keeps a linked state.
    fn fail(&mut self, reason: String) {
        log::warn!("connection failed: {reason}");
        self.teardown();
        if self.state.can_transition_to(ConnectionState::Error) {
            self.transition(ConnectionState::Error);
            self.events.push(ClientEvent::ConnectionFailed { reason });
        } else {
            self.transition(ConnectionState::Disconnected);
            self.events.push(ClientEvent::Disconnected { reason });
        }
    }

    pub fn login(&mut self, username: &str, password: &str, realm: &str) -> Result<(), NetError> {
        if self.state != ConnectionState::Connected {
            return Err(NetError::invalid_state("login", self.state));
        }

        let account = Packet::Account(Account {
            username: username.to_string(),
            password: password.to_string(),
            realm: realm.to_string(),
        });
        self.send_reliable(&account)?;
        self.transition(ConnectionState::Authenticating);
        log::info!("logging in as {username} on {realm}");
        Ok(())
    }

    /// Returns `false` when there was nothing to tear down.
    pub fn disconnect(&mut self) -> bool {
        self.reconnect = None;
        if self.state == ConnectionState::Disconnected && self.session.is_none() {
            return false;
        }

        if let Some(session) = &self.session {
            let bye = Packet::Disconnect {
                reason: DisconnectReason::Graceful,
            };
            if let Err(err) = session.link.send_packet(&bye) {
                log::debug!("disconnect notice not sent: {err}");
            }
        }

        self.teardown();
        self.transition(ConnectionState::Disconnected);
        log::info!("disconnected");
        self.events.push(ClientEvent::Disconnected {
            reason: "disconnected by client".to_string(),
        });
        true
    }

    pub fn reconnect(&mut self) -> Result<(), NetError> {
        if self.endpoint.is_none() {
            return Err(NetError::NotConnected);
        }
        self.disconnect();
        self.establish()
    }

    /// Runs a due automatic reconnect attempt.
    pub fn poll_reconnect(&mut self, now: Instant) {
        let Some(schedule) = self.reconnect else {
            return;
        };
        if now < schedule.next_at
            || !matches!(
                self.state,
                ConnectionState::Disconnected | ConnectionState::Error
            )
        {
            return;
        }

        let attempt = schedule.attempts + 1;
        let max_attempts = self.reconnect_config.max_attempts;
        log::info!("reconnect attempt {attempt}/{max_attempts}");

        match self.establish() {
            Ok(()) => self.reconnect = None,
            Err(err) if attempt >= max_attempts => {
                log::warn!("giving up reconnecting after {attempt} attempts: {err}");
                self.reconnect = None;
            }
            Err(_) => {
                self.reconnect = Some(ReconnectSchedule {
                    attempts: attempt,
                    next_at: now + self.reconnect_config.delay,
                });
            }
        }
    }

    pub fn send(&self, packet: &Packet) -> Result<(), NetError> {
        let session = self.session.as_ref().ok_or(NetError::NotConnected)?;
        session.link.send_packet(packet)
    }

    pub fn send_reliable(&self, packet: &Packet) -> Result<u32, NetError> {
        let session = self.session.as_ref().ok_or(NetError::NotConnected)?;
        session.link.send_reliable(packet)
    }

    /// Takes up to `max` queued packets. A closed link is noticed here and
    /// turned into a state change on the calling thread.
    pub fn drain_inbound(&mut self, max: usize) -> Vec<Packet> {
        let mut packets = Vec::new();
        let mut closed = None;

        if let Some(session) = &self.session {
            while packets.len() < max {
                match session.inbound.try_recv() {
                    Ok(item) => {
                        session.link.queued.fetch_sub(1, Ordering::SeqCst);
                        match item {
                            Inbound::Packet(packet) => packets.push(packet),
                            Inbound::Closed(reason) => {
                                closed = Some(reason);
                                break;
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
        }

        if let Some(reason) = closed {
            self.on_transport_lost(reason);
        }
        packets
    }

    fn on_transport_lost(&mut self, reason: String) {
        let was = self.state;
        if was == ConnectionState::Authenticating {
            self.fail(reason);
        } else {
            self.teardown();
            self.transition(ConnectionState::Disconnected);
            self.events.push(ClientEvent::Disconnected { reason });
        }

        if self.reconnect_config.enabled && was.is_linked() {
            self.reconnect = Some(ReconnectSchedule {
                attempts: 0,
                next_at: Instant::now() + self.reconnect_config.delay,
            });
        }
    }

    pub(crate) fn on_connect_ack(&mut self, ack: &ConnectAck) {
        if self.state != ConnectionState::Connected {
            log::debug!("connect ack while {}, ignored", self.state);
            return;
        }
        if ack.is_accepted() {
            log::info!("handshake accepted, server time {}", ack.server_time);
            self.server_time = Some(ack.server_time);
            return;
        }

        self.fail(format!("handshake rejected ({}): {}", ack.result, ack.reason));
    }

    /// Login completes when the server sends the player's own info.
    pub(crate) fn on_user_info(&mut self) -> bool {
        if self.state != ConnectionState::Authenticating {
            log::debug!("user info while {}, ignored", self.state);
            return false;
        }
        self.transition(ConnectionState::InGame);
        true
    }

    pub(crate) fn on_server_disconnect(&mut self, reason: DisconnectReason) {
        if self.state == ConnectionState::Authenticating {
            self.fail(format!("login rejected: {}", reason.as_str()));
            return;
        }
        log::info!("server closed the session: {}", reason.as_str());
        self.teardown();
        self.transition(ConnectionState::Disconnected);
        self.events.push(ClientEvent::Disconnected {
            reason: reason.as_str().to_string(),
        });
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}
