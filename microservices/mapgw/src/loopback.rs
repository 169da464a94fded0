//! In-process loopback transport
//!
//! Stands in for the vendor MAP stack when the gateway runs stand-alone
//! and in the integration tests: dialog ids are assigned locally,
//! outbound primitives are surfaced on a channel, and inbound events can
//! be injected at will.

use crate::transport::{
    DialogId, MapTransport, OpenParams, Primitive, TransportEvent,
};
use crate::errors::TransportError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// What the transport side observed, per dialog
pub type SentPrimitive = (DialogId, Primitive);

/// Test/lab harness around the loopback transport
pub struct LoopbackHarness {
    /// Injects inbound transport events into the gateway
    pub events: mpsc::UnboundedSender<TransportEvent>,
    /// Observes outbound primitives in transport order
    pub sent: mpsc::UnboundedReceiver<SentPrimitive>,
}

pub struct LoopbackTransport {
    next_dialog_id: DialogId,
    sent: mpsc::UnboundedSender<SentPrimitive>,
}

/// Builds a loopback transport plus the event receiver for the gateway
/// and the harness for the driving side.
pub fn loopback() -> (
    Box<dyn MapTransport>,
    mpsc::UnboundedReceiver<TransportEvent>,
    LoopbackHarness,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let transport = LoopbackTransport { next_dialog_id: 0, sent: sent_tx };
    (
        Box::new(transport),
        event_rx,
        LoopbackHarness { events: event_tx, sent: sent_rx },
    )
}

#[async_trait]
impl MapTransport for LoopbackTransport {
    async fn open_dialog(&mut self, params: OpenParams) -> Result<DialogId, TransportError> {
        self.next_dialog_id += 1;
        let dialog_id = self.next_dialog_id;
        let _ = self.sent.send((dialog_id, Primitive::OpenRequest(params)));
        Ok(dialog_id)
    }

    async fn send_primitive(
        &mut self,
        dialog_id: DialogId,
        primitive: Primitive,
    ) -> Result<(), TransportError> {
        let _ = self.sent.send((dialog_id, primitive));
        Ok(())
    }

    async fn close_dialog(&mut self, dialog_id: DialogId) -> Result<(), TransportError> {
        let _ = self.sent.send((dialog_id, Primitive::Close));
        Ok(())
    }

    async fn abort_dialog(&mut self, dialog_id: DialogId) -> Result<(), TransportError> {
        let _ = self.sent.send((dialog_id, Primitive::UserAbort));
        Ok(())
    }
}
