//! Shared harness for daemon integration tests: a daemon on temp sockets,
//! a hook shim stand-in, and a framed frontend client.

// Each test binary compiles this module separately and uses a subset of it.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use atoll_config::Config;
use atoll_daemon::Daemon;
use atoll_daemon::frontend::{read_frame, write_frame};
use atoll_events::{
    FrontendCall, FrontendEvent, FrontendFrame, FrontendReply, FrontendRequest, SessionSummary,
};

pub const WAIT: Duration = Duration::from_secs(5);

pub struct TestDaemon {
    pub daemon: Daemon,
    pub config: Config,
    _dir: TempDir,
}

pub async fn start_daemon(approval_timeout_secs: u64) -> TestDaemon {
    let dir = TempDir::new().unwrap();
    let config = Config {
        sessions_root: dir.path().join("sessions"),
        socket_path: dir.path().join("hook.sock"),
        frontend_socket_path: dir.path().join("frontend.sock"),
        approval_timeout_secs,
        ..Config::default()
    };
    let daemon = Daemon::start(config.clone()).await.unwrap();
    TestDaemon {
        daemon,
        config,
        _dir: dir,
    }
}

/// A stand-in for the assistant's hook shim: one connection, one event.
pub struct HookClient {
    reader: BufReader<UnixStream>,
}

impl HookClient {
    pub async fn send(path: &Path, event: serde_json::Value) -> Self {
        let mut stream = UnixStream::connect(path).await.unwrap();
        stream
            .write_all(event.to_string().as_bytes())
            .await
            .unwrap();
        Self {
            reader: BufReader::new(stream),
        }
    }

    /// Read one newline-terminated JSON response frame.
    pub async fn read_response(&mut self) -> serde_json::Value {
        self.read_response_within(WAIT).await
    }

    pub async fn read_response_within(&mut self, wait: Duration) -> serde_json::Value {
        let mut line = String::new();
        tokio::time::timeout(wait, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for hook response")
            .unwrap();
        serde_json::from_str(&line).expect("hook response was not a JSON line")
    }

    /// Assert the server closed the connection without further frames.
    pub async fn expect_eof(&mut self) {
        let mut line = String::new();
        let n = tokio::time::timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for EOF")
            .unwrap();
        assert_eq!(n, 0, "expected EOF, got {line:?}");
    }
}

/// A framed frontend client with an event buffer.
pub struct FrontendClient {
    stream: UnixStream,
    events: VecDeque<FrontendEvent>,
    next_id: u64,
}

impl FrontendClient {
    pub async fn connect(path: &Path) -> Self {
        let stream = UnixStream::connect(path).await.unwrap();
        let mut client = Self {
            stream,
            events: VecDeque::new(),
            next_id: 1,
        };
        // A first round-trip guarantees the server task is subscribed to
        // the bus before the test produces any deltas.
        let _ = client.call(FrontendRequest::ListSessions).await;
        client
    }

    /// Issue a request and await its reply, buffering any events that
    /// arrive in between.
    pub async fn call(&mut self, request: FrontendRequest) -> FrontendReply {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        write_frame(&mut self.stream, &FrontendCall { id, request })
            .await
            .unwrap();

        loop {
            match self.read_one().await {
                FrontendFrame::Reply {
                    id: reply_id,
                    reply,
                } => {
                    assert_eq!(reply_id, id, "reply correlation mismatch");
                    return reply;
                },
                FrontendFrame::Event { event } => self.events.push_back(event),
            }
        }
    }

    /// Next pushed event (buffered or fresh).
    pub async fn next_event(&mut self) -> FrontendEvent {
        if let Some(event) = self.events.pop_front() {
            return event;
        }
        loop {
            match self.read_one().await {
                FrontendFrame::Event { event } => return event,
                FrontendFrame::Reply { .. } => panic!("unexpected reply while awaiting event"),
            }
        }
    }

    pub async fn list_sessions(&mut self) -> Vec<SessionSummary> {
        match self.call(FrontendRequest::ListSessions).await {
            FrontendReply::Sessions(sessions) => sessions,
            other => panic!("expected Sessions reply, got {other:?}"),
        }
    }

    /// Poll `list_sessions` until the predicate holds.
    pub async fn wait_for_sessions<F>(&mut self, predicate: F) -> Vec<SessionSummary>
    where
        F: Fn(&[SessionSummary]) -> bool,
    {
        let deadline = tokio::time::Instant::now()
            .checked_add(WAIT)
            .expect("deadline overflow");
        loop {
            let sessions = self.list_sessions().await;
            if predicate(&sessions) {
                return sessions;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "sessions never reached the expected state: {sessions:?}"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    async fn read_one(&mut self) -> FrontendFrame {
        let payload = tokio::time::timeout(WAIT, read_frame(&mut self.stream))
            .await
            .expect("timed out waiting for frontend frame")
            .unwrap()
            .expect("frontend connection closed unexpectedly");
        serde_json::from_slice(&payload).unwrap()
    }
}
