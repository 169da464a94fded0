//! Routing-information lookup for a short message
//!
//! Application-initiated dialog: opened towards the HLR with an
//! SRI-for-SM request; the outcome is reported back to the requesting
//! application server as an advice.

use crate::dialog::{self, Dialog, DialogCore, DialogState};
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

/// Remote subsystem of the SM gateway context
const HLR_SSN: u8 = 6;

pub struct SendRiForSm {
    gateway: Arc<MapGateway>,
    core: DialogCore,
    message_id: String,
    remote_gt: AddressString,
    msisdn: AddressString,
    sm_rp_pri: u8,
    inner: Mutex<RiState>,
}

struct RiState {
    imsi: String,
    lmsi: String,
    roaming_number: Option<AddressString>,
    msc_number: Option<AddressString>,
    service_message: i32,
}

impl SendRiForSm {
    pub fn new(
        gateway: Arc<MapGateway>,
        message_id: String,
        remote_gt: AddressString,
        msisdn: AddressString,
        sm_rp_pri: u8,
    ) -> Arc<SendRiForSm> {
        Arc::new(SendRiForSm {
            gateway,
            core: DialogCore::new(),
            message_id,
            remote_gt,
            msisdn,
            sm_rp_pri,
            inner: Mutex::new(RiState {
                imsi: String::new(),
                lmsi: String::new(),
                roaming_number: None,
                msc_number: None,
                service_message: -1,
            }),
        })
    }
}

#[async_trait]
impl Dialog for SendRiForSm {
    fn core(&self) -> &DialogCore {
        &self.core
    }

    fn init(self: Arc<Self>) {
        self.core.set_state(DialogState::WInvoke);
        let config = self.gateway.config();
        self.gateway.push(
            self.clone(),
            Primitive::OpenRequest(OpenParams {
                application_context: ApplicationContext::ShortMsgGateway,
                local_ssn: config.local_ssn,
                local_pc: config.local_pc,
                local_gt: config.local_gt_address(),
                remote_ssn: HLR_SSN,
                remote_pc: config.remote_pc,
                remote_gt: self.remote_gt.clone(),
            }),
        );
        self.gateway.push(
            self.clone(),
            Primitive::SriSmRequest {
                msisdn: self.msisdn.clone(),
                sm_rp_pri: self.sm_rp_pri,
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
                ResponseKind::SriSm { imsi, lmsi, roaming_number, msc_number } => {
                    {
                        let mut inner = self.inner.lock();
                        inner.imsi = imsi;
                        inner.lmsi = lmsi;
                        inner.roaming_number = roaming_number;
                        inner.msc_number = msc_number;
                        inner.service_message = 0;
                    }
                    self.core.set_state(DialogState::WClose0);
                }
                ResponseKind::MtForwardSm => {}
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

        let (imsi, lmsi, remote_gt, service_message) = {
            let inner = self.inner.lock();
            (
                inner.imsi.clone(),
                inner.lmsi.clone(),
                inner.roaming_number.clone().or_else(|| inner.msc_number.clone()),
                inner.service_message,
            )
        };

        let mut ies = Vec::new();
        if !self.message_id.is_empty() {
            ies.push(fields::string_ie(fields::MESSAGE_ID, &self.message_id));
        }
        if !imsi.is_empty() {
            ies.push(fields::string_ie(fields::IMSI, &imsi));
        }
        if !lmsi.is_empty() {
            ies.push(fields::string_ie(fields::LMSI, &lmsi));
        }
        if let Some(remote_gt) = &remote_gt {
            ies.push(fields::address_ie(fields::REMOTE_GT, &remote_gt.digits, remote_gt.toa));
        }
        if service_message == 0 {
            ies.push(Ie::Byte(REQUEST_ACCEPTED));
        } else {
            ies.push(Ie::Byte(REQUEST_FAILED));
            ies.push(Ie::Integer((service_message & 0xffff) as u16));
        }

        let advice = Message::tlv(fields::SEND_RI_F_SM_ADVICE.ty, ies);
        conn.write(&advice).await;
        debug!(
            message_id = %self.message_id,
            msisdn = %self.msisdn.digits,
            service_message,
            "send RI for SM advice"
        );
    }
}
