use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use io_buffer::RingBuffer;
use lazy_static::lazy_static;
use reqwest::Client;
use tokio::runtime::Runtime;

use crate::{StreamError, StreamResult};

/// Upper bound for one blocking wait slice. A timeout here is only a
/// reason to re-check the session state, never an error; the enclosing
/// call has no aggregate timeout.
const WAIT_SLICE: Duration = Duration::from_secs(1);

lazy_static! {
    static ref TRANSFER_DRIVER: Mutex<Option<Arc<TransferDriver>>> = Mutex::new(None);
}

/// Process-wide transfer engine, created lazily by the first remote open.
/// Owns the runtime that advances every open session together and the
/// HTTP client they share, and tracks which sessions are live.
pub struct TransferDriver {
    runtime: Runtime,
    client: Client,
    next_session_id: AtomicU64,
    sessions: Mutex<HashMap<u64, String>>,
}

impl TransferDriver {
    pub fn shared() -> StreamResult<Arc<TransferDriver>> {
        let mut slot = TRANSFER_DRIVER.lock().unwrap();
        if let Some(driver) = slot.as_ref() {
            return Ok(driver.clone());
        }

        info!("initializing shared transfer driver");
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("transfer-driver")
            .enable_all()
            .build()
            .map_err(|e| {
                StreamError::OpenFailure(format!("failed to start transfer runtime: {}", e))
            })?;
        let client = Client::builder().build().map_err(|e| {
            StreamError::OpenFailure(format!("failed to create http client: {}", e))
        })?;

        let driver = Arc::new(TransferDriver {
            runtime,
            client,
            next_session_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        });
        *slot = Some(driver.clone());
        Ok(driver)
    }

    /// Number of sessions currently registered with the driver.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn register(&self, url: &str) -> u64 {
        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        self.sessions.lock().unwrap().insert(id, url.to_string());
        debug!("registered transfer session {} for {}", id, url);
        id
    }

    fn deregister(&self, id: u64) {
        if self.sessions.lock().unwrap().remove(&id).is_some() {
            debug!("deregistered transfer session {}", id);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TransferPhase {
    Connecting,
    Active,
    Finished,
    Failed(String),
}

struct SessionState {
    buffer: RingBuffer,
    phase: TransferPhase,
    total_len: Option<u64>,
    closed: bool,
}

struct SessionShared {
    state: Mutex<SessionState>,
    delivered: Condvar,
}

/// One in-progress remote fetch. A task on the driver runtime streams the
/// response body into the ring buffer; the owning stream consumes it
/// through bounded blocking waits on the shared state.
pub struct TransferSession {
    id: u64,
    url: String,
    driver: Arc<TransferDriver>,
    shared: Arc<SessionShared>,
    task: tokio::task::JoinHandle<()>,
}

impl TransferSession {
    pub(crate) fn open(
        url: &str,
        initial_capacity: usize,
        request_timeout: Option<Duration>,
    ) -> StreamResult<TransferSession> {
        let driver = TransferDriver::shared()?;
        let id = driver.register(url);

        let shared = Arc::new(SessionShared {
            state: Mutex::new(SessionState {
                buffer: RingBuffer::new(initial_capacity),
                phase: TransferPhase::Connecting,
                total_len: None,
                closed: false,
            }),
            delivered: Condvar::new(),
        });

        let task = driver.runtime.spawn(run_transfer(
            driver.client.clone(),
            url.to_string(),
            request_timeout,
            shared.clone(),
        ));

        let session = TransferSession {
            id,
            url: url.to_string(),
            driver,
            shared,
            task,
        };

        if let Err(e) = session.wait_until_resolved() {
            drop(session);
            return Err(e);
        }
        Ok(session)
    }

    /// Block until the transfer has either delivered its first byte or
    /// ended. A transfer that ends without delivering anything does not
    /// resolve to a readable resource.
    fn wait_until_resolved(&self) -> StreamResult<()> {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if state.buffer.total_written() > 0 {
                return Ok(());
            }
            match &state.phase {
                TransferPhase::Finished => {
                    return Err(StreamError::NotFound(format!(
                        "{}: no data delivered",
                        self.url
                    )));
                }
                TransferPhase::Failed(reason) => {
                    return Err(StreamError::NotFound(format!("{}: {}", self.url, reason)));
                }
                _ => {}
            }
            let (guard, _timeout) = self
                .shared
                .delivered
                .wait_timeout(state, WAIT_SLICE)
                .unwrap();
            state = guard;
        }
    }

    /// Block until the buffer holds `len` unread bytes, the transfer
    /// finishes, or it fails. Each wait slice is bounded by `WAIT_SLICE`;
    /// the call as a whole blocks for as long as the source stalls.
    fn wait_for(&self, len: u64) -> StreamResult<()> {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if let TransferPhase::Failed(reason) = &state.phase {
                return Err(StreamError::ReadFailure(format!(
                    "transfer failed for {}: {}",
                    self.url, reason
                )));
            }
            if state.buffer.len() as u64 >= len || state.phase == TransferPhase::Finished {
                return Ok(());
            }
            let (guard, _timeout) = self
                .shared
                .delivered
                .wait_timeout(state, WAIT_SLICE)
                .unwrap();
            state = guard;
        }
    }

    /// Blocking read: waits until `dest.len()` bytes are buffered or the
    /// transfer ends, then serves from the buffer. A short count means the
    /// session ended; 0 means it ended with nothing left to serve.
    pub fn read(&mut self, dest: &mut [u8]) -> StreamResult<usize> {
        self.wait_for(dest.len() as u64)?;
        let mut state = self.shared.state.lock().unwrap();
        Ok(state.buffer.read(dest))
    }

    /// Read-and-discard up to `len` bytes, forcing production of bytes not
    /// yet buffered. Returns the distance actually skipped (short when the
    /// transfer ends first). Skipped bytes stay replayable.
    pub fn skip(&mut self, len: u64) -> StreamResult<u64> {
        self.wait_for(len)?;
        let mut state = self.shared.state.lock().unwrap();
        Ok(state.buffer.skip(len))
    }

    /// Move backward by up to `len` bytes. Only the buffered replay window
    /// can be revisited; bytes discarded beyond it are not re-requested,
    /// so the result is clamped. Never fails.
    pub fn rewind(&mut self, len: u64) -> u64 {
        let mut state = self.shared.state.lock().unwrap();
        state.buffer.rewind(len)
    }

    /// Pull the transfer to completion, buffering everything that remains.
    pub fn drain_to_end(&mut self) -> StreamResult<()> {
        self.wait_for(u64::MAX)
    }

    /// Logical consumer offset from the beginning of the resource.
    pub fn position(&self) -> u64 {
        self.shared.state.lock().unwrap().buffer.position()
    }

    /// Total length reported by the remote side, when it reported one.
    pub fn total_len(&self) -> Option<u64> {
        self.shared.state.lock().unwrap().total_len
    }

    pub(crate) fn shutdown(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.task.abort();
        self.driver.deregister(self.id);
        debug!("closed transfer session for {}", self.url);
    }
}

impl Drop for TransferSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_transfer(
    client: Client,
    url: String,
    request_timeout: Option<Duration>,
    shared: Arc<SessionShared>,
) {
    let mut request = client.get(&url);
    if let Some(timeout) = request_timeout {
        request = request.timeout(timeout);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            fail(&shared, format!("request failed: {}", e));
            return;
        }
    };
    if !response.status().is_success() {
        fail(&shared, format!("http status {}", response.status()));
        return;
    }

    let content_length = response.content_length();
    {
        let mut state = shared.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.total_len = content_length;
        if let Some(len) = content_length {
            // one pre-expansion instead of repeated grow/copy cycles
            // while the body arrives
            if let Ok(len) = usize::try_from(len) {
                state.buffer.expand_to(len);
            }
        }
        state.phase = TransferPhase::Active;
        shared.delivered.notify_all();
    }

    let mut body = response.bytes_stream();
    while let Some(next) = body.next().await {
        match next {
            Ok(chunk) => {
                let mut state = shared.state.lock().unwrap();
                if state.closed {
                    return;
                }
                state.buffer.write(&chunk);
                shared.delivered.notify_all();
            }
            Err(e) => {
                fail(&shared, format!("transfer interrupted: {}", e));
                return;
            }
        }
    }

    let mut state = shared.state.lock().unwrap();
    if !state.closed {
        state.phase = TransferPhase::Finished;
        debug!(
            "transfer finished for {}, {} bytes",
            url,
            state.buffer.total_written()
        );
    }
    shared.delivered.notify_all();
}

fn fail(shared: &SessionShared, reason: String) {
    let mut state = shared.state.lock().unwrap();
    if !state.closed {
        warn!("{}", reason);
        state.phase = TransferPhase::Failed(reason);
    }
    shared.delivered.notify_all();
}
