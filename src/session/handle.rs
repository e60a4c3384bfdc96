//! A live session's transport, writer queue, and output stream.
//!
//! Reads run on a dedicated pump thread so a stalled remote never blocks
//! callers; writes go through a bounded queue drained by a worker thread so
//! backpressure turns into a bounded-time `WriteTimeout` instead of a hang.

use super::{OutputChunk, SessionError, SessionId, Transport, TransportFactory};
use crate::profile::ConnectionProfile;
use crate::{log_debug, log_error};
use std::{
    io::Read,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError},
    },
    thread,
    time::{Duration, Instant},
};

const READ_BUFFER_SIZE: usize = 8192;
const WRITE_RETRY_INTERVAL: Duration = Duration::from_millis(10);
const WRITER_IDLE_POLL: Duration = Duration::from_millis(100);

pub struct SessionHandle {
    id: SessionId,
    transport: Arc<Mutex<Option<Box<dyn Transport>>>>,
    writer_tx: SyncSender<Vec<u8>>,
    output_rx: Mutex<Option<Receiver<OutputChunk>>>,
    closed: Arc<AtomicBool>,
    write_timeout: Duration,
}

impl SessionHandle {
    /// Establish the transport and wire up both I/O threads.
    pub fn open(
        id: SessionId,
        factory: &dyn TransportFactory,
        profile: Option<&ConnectionProfile>,
        secret: Option<&[u8]>,
        rows: u16,
        cols: u16,
        write_queue_capacity: usize,
        write_timeout: Duration,
    ) -> Result<Self, SessionError> {
        let mut transport = factory.connect(profile, secret, rows, cols)?;
        let reader = transport.clone_reader()?;
        let mut writer = transport.take_writer()?;

        let closed = Arc::new(AtomicBool::new(false));

        // Writer worker: drains the bounded queue; recv_timeout keeps it
        // responsive to the closed flag.
        let (writer_tx, writer_rx) = mpsc::sync_channel::<Vec<u8>>(write_queue_capacity.max(1));
        let writer_closed = closed.clone();
        thread::Builder::new()
            .name(format!("session-writer-{}", id))
            .spawn(move || {
                loop {
                    match writer_rx.recv_timeout(WRITER_IDLE_POLL) {
                        Ok(bytes) => {
                            if let Err(err) = writer.write_all(&bytes).and_then(|_| writer.flush()) {
                                log_error!("Session {} write failed: {}", id, err);
                                writer_closed.store(true, Ordering::SeqCst);
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if writer_closed.load(Ordering::SeqCst) {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log_debug!("Session {} writer thread exiting", id);
            })
            .map_err(|err| SessionError::Connect(format!("failed to spawn writer thread: {}", err)))?;

        // Reader pump: blocking transport reads, forwarded as chunks. A
        // clean remote EOF ends the stream with Eof; an unexpected error
        // ends it with Error, unless close() caused it.
        let (chunk_tx, chunk_rx) = mpsc::channel::<OutputChunk>();
        let reader_closed = closed.clone();
        thread::Builder::new()
            .name(format!("session-reader-{}", id))
            .spawn(move || run_reader_pump(id, reader, chunk_tx, reader_closed))
            .map_err(|err| SessionError::Connect(format!("failed to spawn reader thread: {}", err)))?;

        Ok(Self {
            id,
            transport: Arc::new(Mutex::new(Some(transport))),
            writer_tx,
            output_rx: Mutex::new(Some(chunk_rx)),
            closed,
            write_timeout,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue bytes for the transport. Fails fast on a closed session and
    /// with `WriteTimeout` once backpressure outlasts the deadline.
    pub fn write(&self, bytes: &[u8]) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }

        let deadline = Instant::now() + self.write_timeout;
        let mut payload = bytes.to_vec();
        loop {
            match self.writer_tx.try_send(payload) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(returned)) => {
                    if Instant::now() >= deadline {
                        return Err(SessionError::WriteTimeout);
                    }
                    payload = returned;
                    thread::sleep(WRITE_RETRY_INTERVAL);
                }
                Err(TrySendError::Disconnected(_)) => return Err(SessionError::Closed),
            }
        }
    }

    /// Take the output stream. Yields chunks until the session terminates;
    /// not restartable, so the second call returns None.
    pub fn take_output(&self) -> Option<Receiver<OutputChunk>> {
        match self.output_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), SessionError> {
        let guard = match self.transport.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(transport) => transport.resize(rows, cols),
            None => Err(SessionError::Closed),
        }
    }

    /// Tear down the transport. Idempotent: only the first call shuts the
    /// transport down, later calls observe the flag and return.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let transport = {
            let mut guard = match self.transport.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.take()
        };

        if let Some(mut transport) = transport {
            transport.shutdown();
        }
        log_debug!("Session {} closed", self.id);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_reader_pump(id: SessionId, mut reader: Box<dyn Read + Send>, chunk_tx: mpsc::Sender<OutputChunk>, closed: Arc<AtomicBool>) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                let _ = chunk_tx.send(OutputChunk::Eof);
                break;
            }
            Ok(bytes_read) => {
                if chunk_tx.send(OutputChunk::Data(buf[..bytes_read].to_vec())).is_err() {
                    // Consumer gone; nothing left to pump for.
                    break;
                }
            }
            Err(err) => {
                if closed.load(Ordering::SeqCst) {
                    // close() killed the child; the resulting read error is
                    // an intentional teardown, not a transport failure.
                    let _ = chunk_tx.send(OutputChunk::Eof);
                } else {
                    log_error!("Session {} transport read failed: {}", id, err);
                    let _ = chunk_tx.send(OutputChunk::Error(err.to_string()));
                }
                break;
            }
        }
    }
    log_debug!("Session {} reader thread exiting", id);
}

#[cfg(test)]
#[path = "../test/session/handle.rs"]
mod tests;
