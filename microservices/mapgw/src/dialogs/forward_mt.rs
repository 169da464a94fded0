//! Mobile-terminated short message forwarding
//!
//! Application-initiated dialog: relays one short message towards the
//! serving MSC and reports the outcome back as an advice.

use crate::dialog::{self, Dialog, DialogCore, DialogState, TIME_60S};
use crate::fields;
use crate::gateway::MapGateway;
use crate::transport::{
    AddressString, ApplicationContext, EventKind, OpenParams, Primitive, RequestKind,
    ResponseKind, TransportEvent,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use sgw_appconn::ie::Ie;
use sgw_appconn::message::{Message, REQUEST_ACCEPTED, REQUEST_FAILED};
use std::sync::Arc;
use tracing::debug;

/// Remote subsystem of the MT relay context
const MSC_SSN: u8 = 8;

pub struct ForwardMtSm {
    gateway: Arc<MapGateway>,
    core: DialogCore,
    message_id: String,
    tpdu: Vec<u8>,
    imsi: String,
    lmsi: String,
    remote_gt: AddressString,
    inner: Mutex<MtState>,
}

struct MtState {
    service_message: i32,
}

impl ForwardMtSm {
    pub fn new(
        gateway: Arc<MapGateway>,
        message_id: String,
        tpdu: Vec<u8>,
        imsi: String,
        lmsi: String,
        remote_gt: AddressString,
    ) -> Arc<ForwardMtSm> {
        Arc::new(ForwardMtSm {
            gateway,
            core: DialogCore::with_expiry(TIME_60S),
            message_id,
            tpdu,
            imsi,
            lmsi,
            remote_gt,
            inner: Mutex::new(MtState { service_message: -1 }),
        })
    }
}

#[async_trait]
impl Dialog for ForwardMtSm {
    fn core(&self) -> &DialogCore {
        &self.core
    }

    fn init(self: Arc<Self>) {
        self.core.set_state(DialogState::WInvoke);
        let config = self.gateway.config();
        self.gateway.push(
            self.clone(),
            Primitive::OpenRequest(OpenParams {
                application_context: ApplicationContext::ShortMsgMtRelay,
                local_ssn: config.local_ssn,
                local_pc: config.local_pc,
                local_gt: config.local_gt_address(),
                remote_ssn: MSC_SSN,
                remote_pc: config.remote_pc,
                remote_gt: self.remote_gt.clone(),
            }),
        );
        self.gateway.push(
            self.clone(),
            Primitive::MtForwardSmRequest {
                tpdu: self.tpdu.clone(),
                imsi: self.imsi.clone(),
                lmsi: self.lmsi.clone(),
                service_centre: config.local_gt_address(),
            },
        );
        self.gateway.push(self.clone(), Primitive::Delimiter);
    }

    fn check(self: Arc<Self>) {
        let gateway = self.gateway.clone();
        dialog::escalate(self, &gateway);
    }

    fn handle_event(self: Arc<Self>, event: TransportEvent) {
        match event.kind {
            EventKind::Response(response) => match response {
                ResponseKind::Open => self.core.set_state(DialogState::WInvoke),
                ResponseKind::MtForwardSm => {
                    self.inner.lock().service_message = 0;
                    self.core.set_state(DialogState::WClose0);
                }
                ResponseKind::SriSm { .. } => {}
            },
            EventKind::Request(request) => match request {
                RequestKind::Close => {
                    self.gateway.submit(self.clone());
                    self.core.set_state(DialogState::Close0);
                }
                RequestKind::UserAbort | RequestKind::ProviderAbort => {
                    self.gateway.submit(self.clone());
                    self.core.set_state(DialogState::Abort0);
                }
                _ => {}
            },
            EventKind::Error { code } => {
                self.inner.lock().service_message = code as i32;
                self.core.set_state(DialogState::WClose0);
            }
        }
    }

    async fn run(self: Arc<Self>) {
        let Some(conn) = self.gateway.client().next_online() else { return };

        let service_message = self.inner.lock().service_message;
        let mut ies = Vec::new();
        if !self.message_id.is_empty() {
            ies.push(fields::string_ie(fields::MESSAGE_ID, &self.message_id));
        }
        if service_message == 0 {
            ies.push(Ie::Byte(REQUEST_ACCEPTED));
        } else {
            ies.push(Ie::Byte(REQUEST_FAILED));
            ies.push(Ie::Integer((service_message & 0xffff) as u16));
        }

        let advice = Message::tlv(fields::FORWARD_MT_SM_ADVICE.ty, ies);
        conn.write(&advice).await;
        debug!(
            message_id = %self.message_id,
            service_message,
            "forward MT SM advice"
        );
    }
}
