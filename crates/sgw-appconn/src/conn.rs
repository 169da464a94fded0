//! Client connection to an application server
//!
//! One connection owns one socket: a read-loop task feeding decoded
//! frames to the worker pool, a locked write path, per-connection
//! sequence numbering with response correlation, the registration
//! handshake and the echo keepalive.

use crate::action::ActionRegistry;
use crate::channel::{FrameReader, FrameWriter, RawFrame};
use crate::executor::WorkerPool;
use crate::future::Future;
use crate::ie::{Composite, Ie};
use crate::message::{
    self, Message, TypeRegistry, PROTOCOL_VERSION, REQUEST_ACCEPTED,
};
use crate::scheduler::{self, TimerHandle};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};

/// Default application server port
pub const DEFAULT_PORT: u16 = 8482;

/// Echo keepalive period
pub const ECHO_REQUEST_PERIOD: Duration = Duration::from_secs(32);

/// Failed probes tolerated before the connection is released
pub const MAX_FAILED_ECHO: u32 = 2;

/// Sentinel byte carried by the echo probe
pub const ECHO_SENTINEL: u8 = 0xaa;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Offline,
    Online,
}

/// A single client connection identified by `(conn_id, conn_index)`.
pub struct AppConn {
    conn_id: u32,
    conn_index: u8,
    state: RwLock<ConnState>,
    types: Arc<TypeRegistry>,
    actions: Arc<ActionRegistry>,
    workers: Arc<WorkerPool>,
    writer: tokio::sync::Mutex<Option<FrameWriter>>,
    pending: DashMap<u16, Arc<Future<Message>>>,
    sequence_number: parking_lot::Mutex<u16>,
    failed_echo: AtomicU32,
    echo_timer: parking_lot::Mutex<Option<TimerHandle>>,
    shutdown: Arc<Notify>,
}

impl AppConn {
    /// Opens a connection and, for registrable endpoints, performs the
    /// register handshake. Always returns the connection object; on any
    /// failure it is left `Offline` for the failsafe sweep to repair.
    #[instrument(skip(types, actions, workers))]
    pub async fn connect(
        types: Arc<TypeRegistry>,
        actions: Arc<ActionRegistry>,
        workers: Arc<WorkerPool>,
        host: &str,
        port: u16,
        conn_id: u32,
        conn_index: u8,
        registrable: bool,
    ) -> Arc<AppConn> {
        actions.put(Arc::new(crate::action::EchoAction));

        let conn = Arc::new(AppConn {
            conn_id,
            conn_index,
            state: RwLock::new(ConnState::Offline),
            types,
            actions,
            workers,
            writer: tokio::sync::Mutex::new(None),
            pending: DashMap::new(),
            sequence_number: parking_lot::Mutex::new(0),
            failed_echo: AtomicU32::new(0),
            echo_timer: parking_lot::Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
        });

        let stream = match TcpStream::connect((host, port)).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "connect failed");
                return conn;
            }
        };

        let (read_half, write_half) = stream.into_split();
        *conn.writer.lock().await = Some(FrameWriter::new(write_half));
        tokio::spawn(read_loop(
            Arc::downgrade(&conn),
            FrameReader::new(read_half),
            conn.shutdown.clone(),
        ));

        if registrable {
            if conn.register().await {
                conn.schedule_echo_request();
                conn.set_state(ConnState::Online);
            } else {
                conn.clear().await;
            }
        } else {
            conn.set_state(ConnState::Online);
        }
        conn
    }

    /// Dispatches a message. Requests block until the linked response
    /// arrives or the message time-to-live elapses (`None`); advices and
    /// responses degenerate to a plain write.
    pub async fn dispatch(&self, mut message: Message) -> Option<Message> {
        let message_type = self.types.get(message.ty())?;
        if !message_type.is_request() {
            self.write(&message).await;
            return None;
        }

        let sequence_number = self.next_sequence_number();
        message.set_sequence_number(sequence_number);
        let handle = Arc::new(Future::new());
        self.pending.insert(sequence_number, handle.clone());
        self.write(&message).await;
        let response = handle.get(message.time_to_live()).await;
        self.pending.remove(&sequence_number);
        if response.is_none() {
            warn!(
                conn_id = self.conn_id,
                ty = message.ty(),
                "dispatcher timeout"
            );
        }
        response
    }

    /// Writes one message; a socket error releases the connection.
    pub async fn write(&self, message: &Message) {
        let failed = {
            let mut writer = self.writer.lock().await;
            match writer.as_mut() {
                Some(writer) => match writer.write_frame(message).await {
                    Ok(()) => false,
                    Err(e) => {
                        error!(conn_id = self.conn_id, error = %e, "write failed");
                        true
                    }
                },
                None => return,
            }
        };
        if failed {
            self.clear().await;
        }
    }

    /// Completes the pending request matching the response's sequence
    /// number; responses with no pending handle are discarded.
    pub fn set_response(&self, response: Message) {
        if let Some(handle) = self.pending.get(&response.sequence_number()) {
            handle.set(response);
        }
    }

    /// Releases the socket and goes `Offline`.
    pub async fn clear(&self) {
        self.set_state(ConnState::Offline);
        self.writer.lock().await.take();
        self.shutdown.notify_waiters();
    }

    /// Arms the periodic echo probe, resetting the failure count.
    pub fn schedule_echo_request(self: &Arc<Self>) {
        self.failed_echo.store(0, Ordering::SeqCst);
        let conn = Arc::downgrade(self);
        let handle = scheduler::schedule_at_fixed_rate(
            ECHO_REQUEST_PERIOD,
            ECHO_REQUEST_PERIOD,
            move || {
                let conn = conn.clone();
                async move {
                    let Some(conn) = conn.upgrade() else { return };
                    if conn.state() != ConnState::Online {
                        return;
                    }
                    let echo = Message::tv(message::ECHO_REQUEST.ty, ECHO_SENTINEL);
                    let response = conn.dispatch(echo).await;
                    let alive = matches!(
                        &response,
                        Some(r) if r.ty() == message::ECHO_REQUEST.linked_type
                            && r.value_byte() == ECHO_SENTINEL
                    );
                    if !alive {
                        conn.register_failed_echo().await;
                    }
                }
            },
        );
        *self.echo_timer.lock() = Some(handle);
    }

    /// Counts a failed echo probe; at the threshold the connection is
    /// forced offline.
    pub async fn register_failed_echo(&self) {
        let failed = self.failed_echo.fetch_add(1, Ordering::SeqCst) + 1;
        if failed >= MAX_FAILED_ECHO {
            warn!(
                conn_id = self.conn_id,
                conn_index = self.conn_index,
                "max failed echo"
            );
            self.clear().await;
        }
    }

    /// Dispatches the register request carrying the node identity.
    #[instrument(skip(self), fields(conn_id = self.conn_id, conn_index = self.conn_index))]
    async fn register(&self) -> bool {
        let mut node = Composite::container(message::NODE);
        node.put(Ie::Long(self.conn_id));
        node.put(Ie::Byte(self.conn_index));
        let request = Message::tlv(message::REGISTER_REQUEST.ty, vec![Ie::Composite(node)]);

        match self.dispatch(request).await {
            Some(response)
                if response.ty() == message::REGISTER_REQUEST.linked_type
                    && response.value_byte() == REQUEST_ACCEPTED =>
            {
                info!("register request accepted");
                true
            }
            _ => {
                warn!("register request failed");
                false
            }
        }
    }

    /// Issues the next sequence number, wrapping 0xffff back to 0.
    fn next_sequence_number(&self) -> u16 {
        let mut sequence_number = self.sequence_number.lock();
        if *sequence_number < 0xffff {
            *sequence_number += 1;
        } else {
            *sequence_number = 0;
        }
        *sequence_number
    }

    pub fn conn_id(&self) -> u32 {
        self.conn_id
    }

    pub fn conn_index(&self) -> u8 {
        self.conn_index
    }

    pub fn state(&self) -> ConnState {
        *self.state.read()
    }

    fn set_state(&self, state: ConnState) {
        *self.state.write() = state;
    }
}

impl Drop for AppConn {
    fn drop(&mut self) {
        // wakes the read loop so it can observe the connection is gone
        self.shutdown.notify_waiters();
    }
}

/// Reads frames until the socket closes or the connection is released,
/// handing each one to the worker pool.
async fn read_loop(conn: Weak<AppConn>, mut reader: FrameReader, shutdown: Arc<Notify>) {
    loop {
        let mut notified = std::pin::pin!(shutdown.notified());
        notified.as_mut().enable();
        tokio::select! {
            result = reader.read_frame() => match result {
                Ok(frame) => {
                    let Some(conn) = conn.upgrade() else { break };
                    conn.workers.clone().submit(handle_frame(conn, frame));
                }
                Err(e) => {
                    if let Some(conn) = conn.upgrade() {
                        warn!(conn_id = conn.conn_id(), error = %e, "read loop ended");
                        conn.clear().await;
                    }
                    break;
                }
            },
            _ = notified => break,
        }
    }
    debug!("read loop exited");
}

/// Handles one inbound frame: version check, decode, then either action
/// execution (requests and advices) or response correlation.
async fn handle_frame(conn: Arc<AppConn>, frame: RawFrame) {
    if frame.version != PROTOCOL_VERSION {
        debug!(version = frame.version, "unsupported version");
        let mut advice = Message::tv(message::VERSION_NOT_SUPPORTED_ADVICE.ty, PROTOCOL_VERSION);
        advice.set_sequence_number(frame.sequence_number);
        conn.write(&advice).await;
        return;
    }

    let message = match frame.into_message() {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "dropping undecodable frame");
            return;
        }
    };

    tracing::trace!(xml = %message.to_xml(), "inbound message");

    let Some(message_type) = conn.types.get(message.ty()) else {
        debug!(ty = message.ty(), "dropping unsupported message type");
        return;
    };

    if message_type.is_response() {
        conn.set_response(message);
    } else if let Some(action) = conn.actions.get(message.ty()) {
        if let Err(e) = action.execute(&conn, message).await {
            warn!(error = %e, "message action failed");
        }
    }
}
