use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::codec::FrameDecoder;
use super::protocol::Packet;

/// How long a blocking read waits before handing control back to the I/O
/// loop so it can observe a stop request.
pub const DEFAULT_READ_POLL: Duration = Duration::from_millis(50);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub type ChannelReader = Box<dyn Read + Send>;
pub type ChannelWriter = Box<dyn Write + Send>;

/// Closes both halves of a channel, unblocking any pending read.
pub type ChannelCloser = Box<dyn Fn() + Send + Sync>;

/// An open duplex byte stream, split so that reads and writes can live on
/// different threads. Reads must return `WouldBlock` or `TimedOut` at least
/// every poll interval while idle.
pub struct DuplexChannel {
    pub reader: ChannelReader,
    pub writer: ChannelWriter,
    pub closer: ChannelCloser,
}

impl std::fmt::Debug for DuplexChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexChannel").finish_non_exhaustive()
    }
}

/// Supplies the raw byte channel for a connection attempt.
pub trait Transport: Send {
    fn open(&mut self, host: &str, port: u16, timeout: Duration) -> io::Result<DuplexChannel>;
}

/// Length-preserving transform applied to every chunk of the byte stream,
/// once per direction. Encryption or obfuscation plugs in here.
pub trait FrameTransform: Send {
    fn apply(&mut self, bytes: &mut [u8]);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Plaintext;

impl FrameTransform for Plaintext {
    fn apply(&mut self, _bytes: &mut [u8]) {}
}

pub type TransformFactory = Box<dyn Fn() -> Box<dyn FrameTransform> + Send>;

pub fn plaintext_factory() -> TransformFactory {
    Box::new(|| Box::new(Plaintext))
}

#[derive(Debug, Clone)]
pub struct TcpTransport {
    read_poll: Duration,
    write_timeout: Duration,
    nodelay: bool,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self {
            read_poll: DEFAULT_READ_POLL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            nodelay: true,
        }
    }
}

impl TcpTransport {
    pub fn new(read_poll: Duration, write_timeout: Duration) -> Self {
        Self {
            read_poll,
            write_timeout,
            ..Default::default()
        }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self, host: &str, port: u16, timeout: Duration) -> io::Result<DuplexChannel> {
        let deadline = Instant::now() + timeout;
        let mut last_err = io::Error::new(
            io::ErrorKind::NotFound,
            format!("{host}:{port} did not resolve to any address"),
        );

        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|err| io::Error::new(io::ErrorKind::NotFound, err))?;
        for addr in addrs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connect timed out",
                ));
            }

            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => {
                    stream.set_nodelay(self.nodelay)?;
                    stream.set_read_timeout(Some(self.read_poll))?;
                    stream.set_write_timeout(Some(self.write_timeout))?;
                    let reader = stream.try_clone()?;
                    let closer = stream.try_clone()?;
                    log::debug!("tcp connected to {addr}");
                    return Ok(DuplexChannel {
                        reader: Box::new(reader),
                        writer: Box::new(stream),
                        closer: Box::new(move || {
                            let _ = closer.shutdown(Shutdown::Both);
                        }),
                    });
                }
                Err(err) => {
                    log::debug!("tcp connect to {addr} failed: {err}");
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct PipeState {
    data: VecDeque<u8>,
    closed: bool,
}

/// One direction of an in-memory byte stream.
#[derive(Debug, Clone, Default)]
struct Pipe {
    inner: Arc<(Mutex<PipeState>, Condvar)>,
}

impl Pipe {
    fn close(&self) {
        let (state, cvar) = &*self.inner;
        lock(state).closed = true;
        cvar.notify_all();
    }
}

struct PipeReader {
    pipe: Pipe,
    poll: Duration,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (state, cvar) = &*self.pipe.inner;
        let guard = lock(state);
        let (mut guard, _) = cvar
            .wait_timeout_while(guard, self.poll, |s| s.data.is_empty() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);

        if guard.data.is_empty() {
            if guard.closed {
                return Ok(0);
            }
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "no data"));
        }

        let count = buf.len().min(guard.data.len());
        for (slot, byte) in buf.iter_mut().zip(guard.data.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

struct PipeWriter {
    pipe: Pipe,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let (state, cvar) = &*self.pipe.inner;
        let mut guard = lock(state);
        if guard.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        guard.data.extend(buf);
        cvar.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// In-process transport. Every successful `open` hands the far end of the
/// new stream to the paired [`MemoryListener`].
pub struct MemoryTransport {
    accepted: Sender<MemoryPeer>,
    refuse: bool,
    read_poll: Duration,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryListener) {
        let (accepted, incoming) = mpsc::channel();
        (
            Self {
                accepted,
                refuse: false,
                read_poll: Duration::from_millis(5),
            },
            MemoryListener { incoming },
        )
    }

    /// A transport whose every `open` fails with `ConnectionRefused`.
    pub fn refusing() -> Self {
        let (transport, _listener) = Self::new();
        Self {
            refuse: true,
            ..transport
        }
    }

    pub fn set_refuse(&mut self, refuse: bool) {
        self.refuse = refuse;
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self, host: &str, port: u16, _timeout: Duration) -> io::Result<DuplexChannel> {
        if self.refuse {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{host}:{port} refused the connection"),
            ));
        }

        let upstream = Pipe::default();
        let downstream = Pipe::default();

        let peer = MemoryPeer {
            reader: PipeReader {
                pipe: upstream.clone(),
                poll: self.read_poll,
            },
            writer: PipeWriter {
                pipe: downstream.clone(),
            },
            upstream: upstream.clone(),
            downstream: downstream.clone(),
            decoder: FrameDecoder::new(),
        };
        self.accepted
            .send(peer)
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "listener dropped"))?;

        Ok(DuplexChannel {
            reader: Box::new(PipeReader {
                pipe: downstream.clone(),
                poll: self.read_poll,
            }),
            writer: Box::new(PipeWriter {
                pipe: upstream.clone(),
            }),
            closer: Box::new(move || {
                upstream.close();
                downstream.close();
            }),
        })
    }
}

pub struct MemoryListener {
    incoming: Receiver<MemoryPeer>,
}

impl MemoryListener {
    pub fn accept(&self, timeout: Duration) -> Option<MemoryPeer> {
        self.incoming.recv_timeout(timeout).ok()
    }
}

/// The server side of an in-memory stream, speaking whole packets.
pub struct MemoryPeer {
    reader: PipeReader,
    writer: PipeWriter,
    upstream: Pipe,
    downstream: Pipe,
    decoder: FrameDecoder,
}

impl MemoryPeer {
    pub fn send(&mut self, packet: &Packet) -> io::Result<()> {
        self.writer.write_all(&packet.encode())
    }

    pub fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)
    }

    /// Waits for the next well-formed packet from the client.
    pub fn recv(&mut self, timeout: Duration) -> Option<Packet> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 1024];
        loop {
            match self.decoder.next_frame() {
                Ok(Some(packet)) => return Some(packet),
                Ok(None) => {}
                Err(_) if self.decoder.is_broken() => return None,
                Err(_) => continue,
            }

            if Instant::now() >= deadline {
                return None;
            }

            match self.reader.read(&mut buf) {
                Ok(0) => return None,
                Ok(n) => self.decoder.push(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(_) => return None,
            }
        }
    }

    /// Receives packets until one matches `pred`, discarding the rest.
    pub fn recv_matching<F>(&mut self, timeout: Duration, mut pred: F) -> Option<Packet>
    where
        F: FnMut(&Packet) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let packet = self.recv(remaining)?;
            if pred(&packet) {
                return Some(packet);
            }
        }
    }

    pub fn close(&self) {
        self.upstream.close();
        self.downstream.close();
    }

    pub fn is_closed(&self) -> bool {
        let (state, _) = &*self.upstream.inner;
        lock(state).closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_transport_delivers_both_directions() {
        let (mut transport, listener) = MemoryTransport::new();
        let mut channel = transport
            .open("memory", 1, Duration::from_millis(10))
            .unwrap();
        let mut peer = listener.accept(Duration::from_millis(100)).unwrap();

        channel
            .writer
            .write_all(&Packet::Heartbeat { timestamp: 5 }.encode())
            .unwrap();
        assert_eq!(
            peer.recv(Duration::from_millis(200)),
            Some(Packet::Heartbeat { timestamp: 5 })
        );

        peer.send(&Packet::HeartbeatAck { timestamp: 5 }).unwrap();
        let mut buf = [0u8; 64];
        let n = channel.reader.read(&mut buf).unwrap();
        assert_eq!(
            Packet::decode(&buf[..n]).unwrap(),
            Packet::HeartbeatAck { timestamp: 5 }
        );
    }

    #[test]
    fn test_idle_read_would_block_and_close_reads_eof() {
        let (mut transport, listener) = MemoryTransport::new();
        let mut channel = transport
            .open("memory", 1, Duration::from_millis(10))
            .unwrap();
        let peer = listener.accept(Duration::from_millis(100)).unwrap();

        let mut buf = [0u8; 8];
        let err = channel.reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        (channel.closer)();
        assert_eq!(channel.reader.read(&mut buf).unwrap(), 0);
        assert!(peer.is_closed());
    }

    #[test]
    fn test_refusing_transport() {
        let mut transport = MemoryTransport::refusing();
        let err = transport
            .open("memory", 1, Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn test_refusal_can_be_lifted() {
        let (mut transport, listener) = MemoryTransport::new();
        transport.set_refuse(true);
        assert!(transport.open("memory", 1, Duration::from_millis(10)).is_err());
        assert!(listener.accept(Duration::from_millis(20)).is_none());

        transport.set_refuse(false);
        assert!(transport.open("memory", 1, Duration::from_millis(10)).is_ok());
        assert!(listener.accept(Duration::from_millis(100)).is_some());
    }
}
