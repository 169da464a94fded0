//! Gateway wiring
//!
//! Owns the dialog cache, the worker pool running dialog processing,
//! the outbound block queue feeding the transport and the inbound event
//! pump. All transport calls happen on the single sender task, so the
//! non-reentrant transport is never entered concurrently.

use crate::config::GatewayConfig;
use crate::dialog::{Dialog, DialogCache, DialogState};
use crate::dialogs::ForwardMoSm;
use crate::transport::{EventKind, MapTransport, Primitive, RequestKind, TransportEvent};
use parking_lot::RwLock;
use sgw_appconn::executor::DEFAULT_WORKERS;
use sgw_appconn::{AppClient, ConnState, WorkerPool};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// One queued outbound unit: the primitive plus the dialog it belongs to.
pub struct OutboundBlock {
    pub dialog: Arc<dyn Dialog>,
    pub primitive: Primitive,
}

/// The MAP short-message gateway.
pub struct MapGateway {
    config: GatewayConfig,
    client: Arc<AppClient>,
    dialogs: Arc<DialogCache>,
    workers: Arc<WorkerPool>,
    blocks: mpsc::UnboundedSender<OutboundBlock>,
    state: RwLock<ConnState>,
}

impl MapGateway {
    /// Wires the gateway onto a transport and starts the sender task and
    /// the event pump.
    pub fn start(
        config: GatewayConfig,
        client: Arc<AppClient>,
        transport: Box<dyn MapTransport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Arc<MapGateway> {
        let (block_tx, block_rx) = mpsc::unbounded_channel();
        let dialogs = DialogCache::new();

        let gateway = Arc::new(MapGateway {
            config,
            client,
            dialogs: dialogs.clone(),
            workers: WorkerPool::new(DEFAULT_WORKERS),
            blocks: block_tx,
            state: RwLock::new(ConnState::Online),
        });

        tokio::spawn(block_sender(transport, dialogs, block_rx));
        tokio::spawn(event_pump(Arc::downgrade(&gateway), events));
        info!(logical_name = %gateway.config.logical_name, "gateway online");
        gateway
    }

    /// Queues an outbound primitive for the transport sender task.
    pub fn push(&self, dialog: Arc<dyn Dialog>, primitive: Primitive) {
        if self.blocks.send(OutboundBlock { dialog, primitive }).is_err() {
            warn!("transport sender gone, dropping outbound block");
        }
    }

    /// Submits a dialog for application-layer processing.
    pub fn submit(&self, dialog: Arc<dyn Dialog>) {
        self.workers.submit(async move { dialog.run().await });
    }

    pub fn client(&self) -> &AppClient {
        &self.client
    }

    pub fn dialogs(&self) -> &DialogCache {
        &self.dialogs
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn state(&self) -> ConnState {
        *self.state.read()
    }

    /// Takes the gateway offline; the event pump stops at the next event.
    pub fn shutdown(&self) {
        *self.state.write() = ConnState::Offline;
    }
}

/// Consumes outbound blocks one at a time, serializing every call into
/// the transport. Blocks for dialogs that already started closing or
/// aborting are skipped; a transport failure forces the dialog to abort.
async fn block_sender(
    mut transport: Box<dyn MapTransport>,
    dialogs: Arc<DialogCache>,
    mut blocks: mpsc::UnboundedReceiver<OutboundBlock>,
) {
    while let Some(block) = blocks.recv().await {
        let core = block.dialog.core();
        let state = core.state();
        if state == DialogState::Close0 || state == DialogState::Abort0 {
            continue;
        }
        match block.primitive {
            Primitive::OpenRequest(params) => match transport.open_dialog(params).await {
                Ok(dialog_id) => {
                    core.set_dialog_id(dialog_id);
                    dialogs.put(block.dialog.clone());
                }
                Err(e) => {
                    error!(error = %e, "open dialog failed");
                    core.set_state(DialogState::Abort0);
                }
            },
            Primitive::Close => match transport.close_dialog(core.dialog_id()).await {
                Ok(()) => core.set_state(DialogState::Close0),
                Err(e) => {
                    error!(dialog_id = core.dialog_id(), error = %e, "close dialog failed");
                    core.set_state(DialogState::Abort0);
                }
            },
            Primitive::UserAbort => {
                if let Err(e) = transport.abort_dialog(core.dialog_id()).await {
                    error!(dialog_id = core.dialog_id(), error = %e, "abort dialog failed");
                    core.set_state(DialogState::Abort0);
                }
            }
            primitive => {
                if let Err(e) = transport.send_primitive(core.dialog_id(), primitive).await {
                    error!(dialog_id = core.dialog_id(), error = %e, "send primitive failed");
                    core.set_state(DialogState::Abort0);
                }
            }
        }
    }
    debug!("block sender stopped");
}

/// Routes inbound transport events: an open request creates a
/// transport-initiated dialog, everything else goes to the cached
/// dialog with the matching id.
async fn event_pump(gateway: Weak<MapGateway>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        let Some(gateway) = gateway.upgrade() else { break };
        if gateway.state() != ConnState::Online {
            break;
        }
        let opens_dialog = matches!(event.kind, EventKind::Request(RequestKind::Open { .. }));
        if opens_dialog {
            let dialog = ForwardMoSm::new(gateway.clone());
            dialog.core().set_dialog_id(event.dialog_id);
            dialog.clone().init();
            gateway.dialogs.put(dialog.clone());
            dialog.handle_event(event);
        } else {
            match gateway.dialogs.get(event.dialog_id) {
                Some(dialog) => dialog.handle_event(event),
                None => debug!(dialog_id = event.dialog_id, "event for unknown dialog"),
            }
        }
    }
    debug!("event pump stopped");
}
