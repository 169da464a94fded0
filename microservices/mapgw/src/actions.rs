//! Inbound message actions
//!
//! Application servers drive the gateway over the connection protocol;
//! these actions validate the requests, spin up the matching dialog
//! flavor and answer with accepted or failed.

use crate::dialog::Dialog;
use crate::dialogs::{ForwardMtSm, SendRiForSm};
use crate::fields;
use crate::gateway::MapGateway;
use crate::transport::AddressString;
use async_trait::async_trait;
use sgw_appconn::message::{Message, REQUEST_ACCEPTED, REQUEST_FAILED};
use sgw_appconn::{AppConn, MessageAction};
use std::sync::Arc;
use tracing::{debug, info};

/// Handles `SEND_RI_F_SM_REQUEST`: needs a message id, a remote GT and
/// an msisdn.
pub struct SendRiForSmAction {
    gateway: Arc<MapGateway>,
}

impl SendRiForSmAction {
    pub fn new(gateway: Arc<MapGateway>) -> SendRiForSmAction {
        SendRiForSmAction { gateway }
    }
}

#[async_trait]
impl MessageAction for SendRiForSmAction {
    fn message_type(&self) -> u8 {
        fields::SEND_RI_F_SM_REQUEST.ty
    }

    async fn execute(&self, conn: &AppConn, message: Message) -> sgw_appconn::Result<()> {
        let message_id = message
            .composite(fields::MESSAGE_ID)
            .map(|c| c.string())
            .unwrap_or_default();
        let remote_gt = message
            .composite(fields::REMOTE_GT)
            .map(|c| AddressString::new(c.string(), c.byte()));
        let msisdn = message
            .composite(fields::MSISDN)
            .map(|c| AddressString::new(c.string(), c.byte()));
        let sm_rp_pri = message
            .composite(fields::SMRPPRI)
            .map(|c| c.value_byte())
            .unwrap_or(0);

        let valid = !message_id.is_empty()
            && remote_gt.as_ref().is_some_and(|gt| !gt.is_empty())
            && msisdn.as_ref().is_some_and(|m| !m.is_empty());

        let value = if valid {
            let dialog = SendRiForSm::new(
                self.gateway.clone(),
                message_id.clone(),
                remote_gt.unwrap(),
                msisdn.unwrap(),
                sm_rp_pri,
            );
            dialog.init();
            info!(message_id = %message_id, "send RI for SM accepted");
            REQUEST_ACCEPTED
        } else {
            debug!(message_id = %message_id, "send RI for SM failed");
            REQUEST_FAILED
        };

        let mut response = Message::tv(fields::SEND_RI_F_SM_REQUEST.linked_type, value);
        response.set_sequence_number(message.sequence_number());
        conn.write(&response).await;
        Ok(())
    }
}

/// Handles `FORWARD_MT_SM_REQUEST`: needs a message id, tpdu bytes, a
/// remote GT and at least one of imsi or lmsi.
pub struct MtForwardSmAction {
    gateway: Arc<MapGateway>,
}

impl MtForwardSmAction {
    pub fn new(gateway: Arc<MapGateway>) -> MtForwardSmAction {
        MtForwardSmAction { gateway }
    }
}

#[async_trait]
impl MessageAction for MtForwardSmAction {
    fn message_type(&self) -> u8 {
        fields::FORWARD_MT_SM_REQUEST.ty
    }

    async fn execute(&self, conn: &AppConn, message: Message) -> sgw_appconn::Result<()> {
        let message_id = message
            .composite(fields::MESSAGE_ID)
            .map(|c| c.string())
            .unwrap_or_default();
        let tpdu = message
            .composite(fields::TPDU)
            .map(|c| c.byte_array().to_vec())
            .unwrap_or_default();
        let imsi = message
            .composite(fields::IMSI)
            .map(|c| c.string())
            .unwrap_or_default();
        let lmsi = message
            .composite(fields::LMSI)
            .map(|c| c.string())
            .unwrap_or_default();
        let remote_gt = message
            .composite(fields::REMOTE_GT)
            .map(|c| AddressString::new(c.string(), c.byte()));

        let valid = !message_id.is_empty()
            && !tpdu.is_empty()
            && (!imsi.is_empty() || !lmsi.is_empty())
            && remote_gt.as_ref().is_some_and(|gt| !gt.is_empty());

        let value = if valid {
            let dialog = ForwardMtSm::new(
                self.gateway.clone(),
                message_id.clone(),
                tpdu,
                imsi,
                lmsi,
                remote_gt.unwrap(),
            );
            dialog.init();
            info!(message_id = %message_id, "forward MT SM accepted");
            REQUEST_ACCEPTED
        } else {
            debug!(message_id = %message_id, "forward MT SM failed");
            REQUEST_FAILED
        };

        let mut response = Message::tv(fields::FORWARD_MT_SM_REQUEST.linked_type, value);
        response.set_sequence_number(message.sequence_number());
        conn.write(&response).await;
        Ok(())
    }
}
