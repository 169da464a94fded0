//! Mobile-originated short message forwarding
//!
//! Transport-initiated dialog: the open event creates it, the
//! MO-forward-SM invoke carries the payload, and `run` forwards the
//! short message to an application server.

use crate::dialog::{self, Dialog, DialogCore, DialogState};
use crate::fields;
use crate::gateway::MapGateway;
use crate::transport::{
    AddressString, EventKind, Primitive, RequestKind, TransportEvent, SYSTEM_FAILURE,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use sgw_appconn::ie::{Composite, Ie};
use sgw_appconn::Message;
use std::sync::Arc;
use tracing::debug;

pub struct ForwardMoSm {
    gateway: Arc<MapGateway>,
    core: DialogCore,
    inner: Mutex<MoState>,
}

struct MoState {
    service_type: u8,
    service_centre: Option<AddressString>,
    msisdn: Option<AddressString>,
    node_id: String,
    tpdu: Vec<u8>,
    tpdu_type: u8,
}

impl ForwardMoSm {
    pub fn new(gateway: Arc<MapGateway>) -> Arc<ForwardMoSm> {
        Arc::new(ForwardMoSm {
            gateway,
            core: DialogCore::new(),
            inner: Mutex::new(MoState {
                service_type: fields::SM | fields::ORIGINATING,
                service_centre: None,
                msisdn: None,
                node_id: String::new(),
                tpdu: Vec::new(),
                tpdu_type: fields::SMS_SUBMIT,
            }),
        })
    }
}

#[async_trait]
impl Dialog for ForwardMoSm {
    fn core(&self) -> &DialogCore {
        &self.core
    }

    fn init(self: Arc<Self>) {}

    fn check(self: Arc<Self>) {
        let gateway = self.gateway.clone();
        dialog::escalate(self, &gateway);
    }

    fn handle_event(self: Arc<Self>, event: TransportEvent) {
        match event.kind {
            EventKind::Request(request) => match request {
                RequestKind::Open { originating_gt } => {
                    if let Some(node_id) = originating_gt {
                        self.inner.lock().node_id = node_id;
                    }
                    self.gateway.push(self.clone(), Primitive::OpenAccept);
                    self.core.set_state(DialogState::WInvoke);
                }
                RequestKind::MoForwardSm { invoke_id, service_centre, msisdn, tpdu } => {
                    self.core.set_invoke_id(invoke_id);
                    {
                        let mut inner = self.inner.lock();
                        inner.service_centre = service_centre;
                        inner.msisdn = msisdn;
                        if !tpdu.is_empty() {
                            inner.tpdu = tpdu;
                        }
                    }
                    self.core.set_state(DialogState::Invoke);
                    self.gateway.submit(self.clone());
                }
                RequestKind::AlertServiceCentre { invoke_id } => {
                    self.core.set_invoke_id(invoke_id);
                    self.gateway.push(self.clone(), Primitive::Close);
                }
                RequestKind::Delimiter => {
                    if self.core.state() == DialogState::WInvoke {
                        self.gateway.push(self.clone(), Primitive::Delimiter);
                    }
                }
                RequestKind::Close => self.core.set_state(DialogState::Close0),
                RequestKind::UserAbort | RequestKind::ProviderAbort => {
                    self.core.set_state(DialogState::Abort0)
                }
            },
            EventKind::Error { .. } => self.core.set_state(DialogState::WClose0),
            EventKind::Response(_) => {}
        }
    }

    async fn run(self: Arc<Self>) {
        let Some(conn) = self.gateway.client().next_online() else {
            self.gateway.push(self.clone(), Primitive::Error { code: SYSTEM_FAILURE });
            self.gateway.push(self.clone(), Primitive::Close);
            return;
        };

        let (service_type, msisdn, node_id, tpdu, tpdu_type) = {
            let inner = self.inner.lock();
            (
                inner.service_type,
                inner.msisdn.clone(),
                inner.node_id.clone(),
                inner.tpdu.clone(),
                inner.tpdu_type,
            )
        };

        if msisdn.as_ref().map_or(true, |m| m.is_empty()) || tpdu.is_empty() {
            return;
        }
        let msisdn = msisdn.unwrap();

        let mut ies = vec![Ie::Composite(Composite::value(fields::TYPE, service_type))];
        ies.push(fields::address_ie(fields::MSISDN, &msisdn.digits, msisdn.toa));
        if !node_id.is_empty() {
            ies.push(fields::string_ie(fields::NODE_ID, &node_id));
        }
        ies.push(fields::tpdu_ie(&tpdu, tpdu_type));

        let request = Message::tlv(fields::FORWARD_MO_SM_REQUEST.ty, ies);
        match conn.dispatch(request).await {
            Some(response) if response.ty() == fields::FORWARD_MO_SM_REQUEST.linked_type => {
                let action = response
                    .composite(fields::ACTION)
                    .map(|c| c.value_byte())
                    .unwrap_or(0);
                debug!(
                    msisdn = %msisdn.digits,
                    accepted = action & fields::MESSAGE_ACTION == fields::ACCEPT,
                    "forward MO SM"
                );
                self.gateway.push(self.clone(), Primitive::MoForwardSmResponse);
                self.gateway.push(self.clone(), Primitive::Close);
            }
            _ => {
                debug!(msisdn = %msisdn.digits, "forward MO SM failed");
                self.gateway.push(self.clone(), Primitive::Error { code: SYSTEM_FAILURE });
                self.gateway.push(self.clone(), Primitive::Close);
            }
        }
    }
}
