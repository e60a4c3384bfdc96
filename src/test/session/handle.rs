use super::*;
use crate::session::{Transport, TransportFactory};
use std::io::{self, Write};
use std::sync::mpsc::{Receiver, Sender, SyncSender};
use std::time::Duration;

/// What the scripted transport's reader should yield next.
enum Feed {
    Data(Vec<u8>),
    Eof,
    Fail(String),
}

struct FeedReader {
    rx: Receiver<Feed>,
    pending: Vec<u8>,
}

impl Read for FeedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            match self.rx.recv() {
                Ok(Feed::Data(bytes)) => self.pending = bytes,
                Ok(Feed::Eof) | Err(_) => return Ok(0),
                Ok(Feed::Fail(message)) => return Err(io::Error::other(message)),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

struct FeedWriter {
    tx: SyncSender<Vec<u8>>,
}

impl Write for FeedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct LoopbackTransport {
    reader: Option<FeedReader>,
    writer: Option<FeedWriter>,
    feed_tx: Sender<Feed>,
}

impl Transport for LoopbackTransport {
    fn clone_reader(&mut self) -> Result<Box<dyn Read + Send>, SessionError> {
        self.reader
            .take()
            .map(|reader| Box::new(reader) as Box<dyn Read + Send>)
            .ok_or(SessionError::Connect("reader already taken".to_string()))
    }

    fn take_writer(&mut self) -> Result<Box<dyn Write + Send>, SessionError> {
        self.writer
            .take()
            .map(|writer| Box::new(writer) as Box<dyn Write + Send>)
            .ok_or(SessionError::Connect("writer already taken".to_string()))
    }

    fn resize(&self, _rows: u16, _cols: u16) -> Result<(), SessionError> {
        Ok(())
    }

    fn shutdown(&mut self) {
        let _ = self.feed_tx.send(Feed::Eof);
    }
}

/// Control handles for driving one loopback transport from a test.
struct Loopback {
    feed_tx: Sender<Feed>,
    written_rx: Receiver<Vec<u8>>,
}

/// `written_capacity` bounds the writer side so tests can simulate a
/// stalled peer by simply not draining `written_rx`.
fn loopback(written_capacity: usize) -> (LoopbackTransport, Loopback) {
    let (feed_tx, feed_rx) = mpsc::channel();
    let (written_tx, written_rx) = mpsc::sync_channel(written_capacity);
    let transport = LoopbackTransport {
        reader: Some(FeedReader {
            rx: feed_rx,
            pending: Vec::new(),
        }),
        writer: Some(FeedWriter { tx: written_tx }),
        feed_tx: feed_tx.clone(),
    };
    (transport, Loopback { feed_tx, written_rx })
}

struct OneShotFactory {
    transport: Mutex<Option<LoopbackTransport>>,
}

impl TransportFactory for OneShotFactory {
    fn connect(
        &self,
        _profile: Option<&crate::profile::ConnectionProfile>,
        _secret: Option<&[u8]>,
        _rows: u16,
        _cols: u16,
    ) -> Result<Box<dyn Transport>, SessionError> {
        let transport = match self.transport.lock().unwrap().take() {
            Some(transport) => transport,
            None => return Err(SessionError::Connect("connection refused".to_string())),
        };
        Ok(Box::new(transport))
    }
}

fn open_handle(write_queue_capacity: usize, write_timeout: Duration) -> (SessionHandle, Loopback) {
    let (transport, control) = loopback(64);
    let factory = OneShotFactory {
        transport: Mutex::new(Some(transport)),
    };
    let handle = SessionHandle::open(SessionId(1), &factory, None, None, 24, 80, write_queue_capacity, write_timeout).unwrap();
    (handle, control)
}

fn recv_chunk(rx: &Receiver<OutputChunk>) -> OutputChunk {
    rx.recv_timeout(Duration::from_secs(5)).expect("expected an output chunk")
}

#[test]
fn connect_failure_propagates() {
    let factory = OneShotFactory {
        transport: Mutex::new(None),
    };
    let result = SessionHandle::open(SessionId(1), &factory, None, None, 24, 80, 8, Duration::from_secs(1));
    assert!(matches!(result, Err(SessionError::Connect(_))));
}

#[test]
fn written_bytes_reach_the_transport() {
    let (handle, control) = open_handle(8, Duration::from_secs(1));

    handle.write(b"ls -l\n").unwrap();
    let written = control.written_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(written, b"ls -l\n");

    handle.close();
}

#[test]
fn output_stream_yields_data_then_eof() {
    let (handle, control) = open_handle(8, Duration::from_secs(1));
    let output = handle.take_output().expect("first take_output");

    control.feed_tx.send(Feed::Data(b"hello".to_vec())).unwrap();
    control.feed_tx.send(Feed::Data(b" world".to_vec())).unwrap();
    control.feed_tx.send(Feed::Eof).unwrap();

    let mut bytes = Vec::new();
    loop {
        match recv_chunk(&output) {
            OutputChunk::Data(chunk) => bytes.extend_from_slice(&chunk),
            OutputChunk::Eof => break,
            OutputChunk::Error(message) => panic!("unexpected error chunk: {}", message),
        }
    }
    assert_eq!(bytes, b"hello world");
}

#[test]
fn take_output_is_single_use() {
    let (handle, _control) = open_handle(8, Duration::from_secs(1));
    assert!(handle.take_output().is_some());
    assert!(handle.take_output().is_none());
    handle.close();
}

#[test]
fn transport_failure_surfaces_as_error_chunk() {
    let (handle, control) = open_handle(8, Duration::from_secs(1));
    let output = handle.take_output().unwrap();

    control.feed_tx.send(Feed::Fail("connection reset".to_string())).unwrap();

    match recv_chunk(&output) {
        OutputChunk::Error(message) => assert!(message.contains("connection reset")),
        other => panic!("expected Error chunk, got {:?}", other),
    }
}

#[test]
fn read_error_after_close_is_reported_as_eof() {
    let (handle, control) = open_handle(8, Duration::from_secs(1));
    let output = handle.take_output().unwrap();

    handle.close();
    // A teardown-induced read error must not look like a transport failure.
    let _ = control.feed_tx.send(Feed::Fail("pty gone".to_string()));

    match recv_chunk(&output) {
        OutputChunk::Eof => {}
        other => panic!("expected Eof after close, got {:?}", other),
    }
}

#[test]
fn close_is_idempotent() {
    let (handle, _control) = open_handle(8, Duration::from_secs(1));
    handle.close();
    handle.close();
    assert!(handle.is_closed());
}

#[test]
fn write_after_close_fails_with_closed() {
    let (handle, _control) = open_handle(8, Duration::from_secs(1));
    handle.close();
    assert!(matches!(handle.write(b"late"), Err(SessionError::Closed)));
}

#[test]
fn sustained_backpressure_times_out_instead_of_hanging() {
    // Writer side capacity 1 and nobody draining: the writer thread blocks
    // on its first send, the queue fills, and write() must give up within
    // its deadline.
    let (transport, control) = loopback(1);
    let factory = OneShotFactory {
        transport: Mutex::new(Some(transport)),
    };
    let handle = SessionHandle::open(SessionId(1), &factory, None, None, 24, 80, 1, Duration::from_millis(100)).unwrap();

    let started = Instant::now();
    let mut saw_timeout = false;
    for _ in 0..8 {
        match handle.write(b"spam") {
            Ok(()) => continue,
            Err(SessionError::WriteTimeout) => {
                saw_timeout = true;
                break;
            }
            Err(other) => panic!("unexpected write error: {:?}", other),
        }
    }
    assert!(saw_timeout, "write should time out under backpressure");
    assert!(started.elapsed() < Duration::from_secs(5), "timeout must be bounded");

    drop(control);
    handle.close();
}
