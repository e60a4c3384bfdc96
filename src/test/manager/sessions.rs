use super::*;
use crate::profile::ProfileDraft;
use crate::session::Transport;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, RecvTimeoutError, Sender, SyncSender};
use std::time::Instant;

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
    fn clone_reader(&mut self) -> Result<Box<dyn Read + Send>, crate::session::SessionError> {
        self.reader
            .take()
            .map(|reader| Box::new(reader) as Box<dyn Read + Send>)
            .ok_or(SessionError::Connect("reader already taken".to_string()))
    }

    fn take_writer(&mut self) -> Result<Box<dyn Write + Send>, crate::session::SessionError> {
        self.writer
            .take()
            .map(|writer| Box::new(writer) as Box<dyn Write + Send>)
            .ok_or(SessionError::Connect("writer already taken".to_string()))
    }

    fn resize(&self, _rows: u16, _cols: u16) -> Result<(), crate::session::SessionError> {
        Ok(())
    }

    fn shutdown(&mut self) {
        let _ = self.feed_tx.send(Feed::Eof);
    }
}

/// Test-side control handles for one scripted transport.
struct Peer {
    feed_tx: Sender<Feed>,
    written_rx: Receiver<Vec<u8>>,
}

enum Script {
    Accept,
    Refuse(String),
}

/// Factory that follows a per-connect script and hands the matching
/// `Peer` controls back to the test.
struct ScriptedFactory {
    script: Mutex<VecDeque<Script>>,
    peers: Mutex<VecDeque<Peer>>,
}

impl ScriptedFactory {
    fn new(script: Vec<Script>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            peers: Mutex::new(VecDeque::new()),
        }
    }

    fn accepting(connects: usize) -> Self {
        Self::new((0..connects).map(|_| Script::Accept).collect())
    }

    fn next_peer(&self) -> Peer {
        self.peers.lock().unwrap().pop_front().expect("no peer for this connect")
    }
}

impl TransportFactory for ScriptedFactory {
    fn connect(
        &self,
        _profile: Option<&crate::profile::ConnectionProfile>,
        _secret: Option<&[u8]>,
        _rows: u16,
        _cols: u16,
    ) -> Result<Box<dyn Transport>, crate::session::SessionError> {
        match self.script.lock().unwrap().pop_front() {
            Some(Script::Accept) | None => {}
            Some(Script::Refuse(message)) => return Err(SessionError::Connect(message)),
        }

        let (feed_tx, feed_rx) = mpsc::channel();
        let (written_tx, written_rx) = mpsc::sync_channel(64);
        self.peers.lock().unwrap().push_back(Peer {
            feed_tx: feed_tx.clone(),
            written_rx,
        });
        Ok(Box::new(LoopbackTransport {
            reader: Some(FeedReader {
                rx: feed_rx,
                pending: Vec::new(),
            }),
            writer: Some(FeedWriter { tx: written_tx }),
            feed_tx,
        }))
    }
}

/// Records whether the transport was shut down, for races where the test
/// cannot observe the teardown through a peer.
struct GatedTransport {
    inner: LoopbackTransport,
    torn_down: Arc<AtomicBool>,
}

impl Transport for GatedTransport {
    fn clone_reader(&mut self) -> Result<Box<dyn Read + Send>, crate::session::SessionError> {
        self.inner.clone_reader()
    }

    fn take_writer(&mut self) -> Result<Box<dyn Write + Send>, crate::session::SessionError> {
        self.inner.take_writer()
    }

    fn resize(&self, rows: u16, cols: u16) -> Result<(), crate::session::SessionError> {
        self.inner.resize(rows, cols)
    }

    fn shutdown(&mut self) {
        self.torn_down.store(true, Ordering::SeqCst);
        self.inner.shutdown();
    }
}

/// Factory whose first connect parks until the test releases the gate.
struct GatedFactory {
    gate: Mutex<Option<Receiver<()>>>,
    torn_down: Arc<AtomicBool>,
}

impl TransportFactory for GatedFactory {
    fn connect(
        &self,
        _profile: Option<&crate::profile::ConnectionProfile>,
        _secret: Option<&[u8]>,
        _rows: u16,
        _cols: u16,
    ) -> Result<Box<dyn Transport>, crate::session::SessionError> {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            let _ = gate.recv();
        }

        let (feed_tx, feed_rx) = mpsc::channel();
        let (written_tx, _written_rx) = mpsc::sync_channel(64);
        Ok(Box::new(GatedTransport {
            inner: LoopbackTransport {
                reader: Some(FeedReader {
                    rx: feed_rx,
                    pending: Vec::new(),
                }),
                writer: Some(FeedWriter { tx: written_tx }),
                feed_tx,
            },
            torn_down: self.torn_down.clone(),
        }))
    }
}

struct Fixture {
    manager: Arc<SessionManager>,
    factory: Arc<ScriptedFactory>,
    store: Arc<ProfileStore>,
    events: Arc<EventBus>,
    _dir: tempfile::TempDir,
}

fn fixture(factory: ScriptedFactory) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let events = Arc::new(EventBus::new());
    let (store, _load_error) = ProfileStore::open(dir.path().join("profiles.json"), events.clone());
    let store = Arc::new(store);
    let factory = Arc::new(factory);
    let manager = Arc::new(SessionManager::new(store.clone(), events.clone(), factory.clone()));
    Fixture {
        manager,
        factory,
        store,
        events,
        _dir: dir,
    }
}

fn wait_for_state(rx: &Receiver<Event>, session: SessionId, target: SessionState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(Event::SessionStateChanged { session: id, state }) if id == session && state == target => return,
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    panic!("timed out waiting for {} to reach {}", session, target);
}

fn wait_for_data(rx: &Receiver<Event>, session: SessionId) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(Event::DataAvailable { session: id }) if id == session => return,
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    panic!("timed out waiting for data from {}", session);
}

fn bound_session(manager: &SessionManager, tab: TabId) -> Option<SessionId> {
    manager.list_tabs().into_iter().find(|t| t.id == tab).and_then(|t| t.session)
}

#[test]
fn open_reaches_active_and_binds_the_tab() {
    let fx = fixture(ScriptedFactory::accepting(1));
    let rx = fx.events.subscribe();

    let tab = fx.manager.create_tab("work");
    let session = fx.manager.open(None, tab, None, 24, 80).unwrap();

    assert_eq!(fx.manager.session_state(session).unwrap(), SessionState::Active);
    assert_eq!(bound_session(&fx.manager, tab), Some(session));

    // The full lifecycle prefix arrives in order.
    let mut states = Vec::new();
    while states.len() < 3 {
        if let Ok(Event::SessionStateChanged { session: id, state }) = rx.recv_timeout(Duration::from_secs(5)) {
            if id == session {
                states.push(state);
            }
        }
    }
    assert_eq!(states, vec![SessionState::Pending, SessionState::Connecting, SessionState::Active]);
}

#[test]
fn second_open_on_a_bound_tab_is_rejected() {
    let fx = fixture(ScriptedFactory::accepting(2));
    let tab = fx.manager.create_tab("work");
    let first = fx.manager.open(None, tab, None, 24, 80).unwrap();

    match fx.manager.open(None, tab, None, 24, 80) {
        Err(ManagerError::AlreadyBound(id)) => assert_eq!(id, tab),
        other => panic!("expected AlreadyBound, got {:?}", other.map(|_| ())),
    }

    // The original session is untouched.
    assert_eq!(fx.manager.session_state(first).unwrap(), SessionState::Active);
    assert_eq!(bound_session(&fx.manager, tab), Some(first));
    assert_eq!(fx.manager.list_sessions().len(), 1);
}

#[test]
fn written_bytes_reach_the_transport() {
    let fx = fixture(ScriptedFactory::accepting(1));
    let tab = fx.manager.create_tab("work");
    let session = fx.manager.open(None, tab, None, 24, 80).unwrap();
    let peer = fx.factory.next_peer();

    fx.manager.write(session, b"uptime\n").unwrap();
    let written = peer.written_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(written, b"uptime\n");
}

#[test]
fn output_is_buffered_until_taken() {
    let fx = fixture(ScriptedFactory::accepting(1));
    let rx = fx.events.subscribe();
    let tab = fx.manager.create_tab("work");
    let session = fx.manager.open(None, tab, None, 24, 80).unwrap();
    let peer = fx.factory.next_peer();

    peer.feed_tx.send(Feed::Data(b"load average".to_vec())).unwrap();
    wait_for_data(&rx, session);

    assert_eq!(fx.manager.take_output(session).unwrap(), b"load average");
    assert!(fx.manager.take_output(session).unwrap().is_empty(), "take_output drains the buffer");
}

#[test]
fn clean_remote_eof_finishes_in_closed() {
    let fx = fixture(ScriptedFactory::accepting(1));
    let rx = fx.events.subscribe();
    let tab = fx.manager.create_tab("work");
    let session = fx.manager.open(None, tab, None, 24, 80).unwrap();
    let peer = fx.factory.next_peer();

    peer.feed_tx.send(Feed::Eof).unwrap();
    wait_for_state(&rx, session, SessionState::Closed);

    assert_eq!(fx.manager.session_exit(session).unwrap(), Some(SessionExit::Clean));
    assert_eq!(bound_session(&fx.manager, tab), None, "tab unbinds on termination");
}

#[test]
fn transport_drop_marks_the_session_failed() {
    let fx = fixture(ScriptedFactory::accepting(1));
    let rx = fx.events.subscribe();
    let tab = fx.manager.create_tab("work");
    let session = fx.manager.open(None, tab, None, 24, 80).unwrap();
    let peer = fx.factory.next_peer();

    peer.feed_tx.send(Feed::Fail("connection reset".to_string())).unwrap();
    wait_for_state(&rx, session, SessionState::Failed);

    match fx.manager.session_exit(session).unwrap() {
        Some(SessionExit::Error(message)) => assert!(message.contains("connection reset")),
        other => panic!("expected Error exit, got {:?}", other),
    }
    assert_eq!(bound_session(&fx.manager, tab), None);
    assert!(matches!(fx.manager.write(session, b"x"), Err(ManagerError::Session(SessionError::Closed))));
}

#[test]
fn close_walks_closing_to_closed_exactly_once() {
    let fx = fixture(ScriptedFactory::accepting(1));
    let rx = fx.events.subscribe();
    let tab = fx.manager.create_tab("work");
    let session = fx.manager.open(None, tab, None, 24, 80).unwrap();

    fx.manager.close(session).unwrap();
    assert_eq!(fx.manager.session_state(session).unwrap(), SessionState::Closed);
    assert_eq!(fx.manager.session_exit(session).unwrap(), Some(SessionExit::Clean));

    // Second close is a no-op.
    fx.manager.close(session).unwrap();

    let mut closing = 0;
    let mut closed = 0;
    while let Ok(event) = rx.try_recv() {
        if let Event::SessionStateChanged { session: id, state } = event {
            if id == session {
                match state {
                    SessionState::Closing => closing += 1,
                    SessionState::Closed => closed += 1,
                    _ => {}
                }
            }
        }
    }
    assert_eq!(closing, 1);
    assert_eq!(closed, 1);
}

#[test]
fn concurrent_closes_perform_one_teardown() {
    let fx = fixture(ScriptedFactory::accepting(1));
    let tab = fx.manager.create_tab("work");
    let session = fx.manager.open(None, tab, None, 24, 80).unwrap();

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let manager = fx.manager.clone();
            thread::spawn(move || manager.close(session))
        })
        .collect();
    for handle in threads {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(fx.manager.session_state(session).unwrap(), SessionState::Closed);
    assert_eq!(fx.manager.session_exit(session).unwrap(), Some(SessionExit::Clean));
}

#[test]
fn close_during_connect_wins_and_tears_the_transport_down() {
    let (release_tx, release_rx) = mpsc::channel();
    let torn_down = Arc::new(AtomicBool::new(false));
    let factory = Arc::new(GatedFactory {
        gate: Mutex::new(Some(release_rx)),
        torn_down: torn_down.clone(),
    });

    let dir = tempfile::tempdir().unwrap();
    let events = Arc::new(EventBus::new());
    let (store, _load_error) = ProfileStore::open(dir.path().join("profiles.json"), events.clone());
    let manager = Arc::new(SessionManager::new(Arc::new(store), events.clone(), factory));
    let tab = manager.create_tab("work");

    let opener = {
        let manager = manager.clone();
        thread::spawn(move || manager.open(None, tab, None, 24, 80))
    };

    // Wait until the opening thread is parked inside connect.
    let deadline = Instant::now() + Duration::from_secs(5);
    let session = loop {
        if let Some(info) = manager
            .list_sessions()
            .into_iter()
            .find(|info| info.state == SessionState::Connecting)
        {
            break info.id;
        }
        assert!(Instant::now() < deadline, "session never reached Connecting");
        thread::sleep(Duration::from_millis(5));
    };

    manager.close(session).unwrap();
    assert_eq!(manager.session_state(session).unwrap(), SessionState::Closing);

    release_tx.send(()).unwrap();
    let opened = opener.join().unwrap().unwrap();
    assert_eq!(opened, session);

    assert_eq!(manager.session_state(session).unwrap(), SessionState::Closed);
    assert_eq!(manager.session_exit(session).unwrap(), Some(SessionExit::Clean));
    assert!(torn_down.load(Ordering::SeqCst), "the raced transport must be shut down");
    assert_eq!(bound_session(&manager, tab), None);
}

#[test]
fn refused_connect_fails_the_session_and_frees_the_tab() {
    let fx = fixture(ScriptedFactory::new(vec![Script::Refuse("no route to host".to_string()), Script::Accept]));
    let rx = fx.events.subscribe();
    let tab = fx.manager.create_tab("work");

    let err = fx.manager.open(None, tab, None, 24, 80).unwrap_err();
    assert!(matches!(err, ManagerError::Session(SessionError::Connect(_))));

    let failed = fx
        .manager
        .list_sessions()
        .into_iter()
        .find(|info| info.state == SessionState::Failed)
        .expect("failed session should be recorded");
    wait_for_state(&rx, failed.id, SessionState::Failed);
    assert!(matches!(failed.exit, Some(SessionExit::Error(_))));

    // The tab is free again and a retry succeeds.
    let retry = fx.manager.open(None, tab, None, 24, 80).unwrap();
    assert_eq!(fx.manager.session_state(retry).unwrap(), SessionState::Active);
}

#[test]
fn close_tab_closes_its_session() {
    let fx = fixture(ScriptedFactory::accepting(1));
    let tab = fx.manager.create_tab("work");
    let session = fx.manager.open(None, tab, None, 24, 80).unwrap();

    fx.manager.close_tab(tab).unwrap();
    assert_eq!(fx.manager.session_state(session).unwrap(), SessionState::Closed);
    assert!(fx.manager.list_tabs().is_empty());
}

#[test]
fn remove_profile_closes_sessions_opened_from_it() {
    let fx = fixture(ScriptedFactory::accepting(1));
    let profile_id = fx
        .store
        .create(ProfileDraft {
            host: "web1.example.com".to_string(),
            port: 22,
            label: "web1".to_string(),
            group: String::new(),
            credential: None,
        })
        .unwrap();

    let tab = fx.manager.create_tab("web1");
    let session = fx.manager.open(Some(&profile_id), tab, None, 24, 80).unwrap();

    fx.manager.remove_profile(&profile_id).unwrap();

    assert!(fx.manager.session_state(session).unwrap().is_terminal());
    assert!(matches!(fx.store.get(&profile_id), Err(crate::profile::StoreError::NotFound(_))));
}

#[test]
fn terminated_sessions_can_be_removed_from_the_table() {
    let fx = fixture(ScriptedFactory::accepting(1));
    let tab = fx.manager.create_tab("work");
    let session = fx.manager.open(None, tab, None, 24, 80).unwrap();

    match fx.manager.remove_session(session) {
        Err(ManagerError::SessionStillLive(id)) => assert_eq!(id, session),
        other => panic!("expected SessionStillLive, got {:?}", other),
    }
    assert_eq!(fx.manager.session_state(session).unwrap(), SessionState::Active);

    fx.manager.close(session).unwrap();
    fx.manager.remove_session(session).unwrap();

    assert!(matches!(fx.manager.session_state(session), Err(ManagerError::SessionNotFound(_))));
    assert!(fx.manager.list_sessions().is_empty());
    assert!(matches!(fx.manager.remove_session(session), Err(ManagerError::SessionNotFound(_))));
}

#[test]
fn unknown_ids_are_reported_as_not_found() {
    let fx = fixture(ScriptedFactory::accepting(1));
    let tab = fx.manager.create_tab("work");
    let session = fx.manager.open(None, tab, None, 24, 80).unwrap();
    fx.manager.close(session).unwrap();

    let ghost_profile = ProfileId::from("missing");
    assert!(matches!(
        fx.manager.open(Some(&ghost_profile), tab, None, 24, 80),
        Err(ManagerError::Profile(crate::profile::StoreError::NotFound(_)))
    ));
    assert!(matches!(fx.manager.close_tab(TabId(9999)), Err(ManagerError::TabNotFound(_))));
}

#[test]
fn shutdown_closes_every_live_session() {
    let fx = fixture(ScriptedFactory::accepting(2));
    let tab_a = fx.manager.create_tab("a");
    let tab_b = fx.manager.create_tab("b");
    let session_a = fx.manager.open(None, tab_a, None, 24, 80).unwrap();
    let session_b = fx.manager.open(None, tab_b, None, 24, 80).unwrap();

    fx.manager.shutdown();

    assert!(fx.manager.session_state(session_a).unwrap().is_terminal());
    assert!(fx.manager.session_state(session_b).unwrap().is_terminal());
}
