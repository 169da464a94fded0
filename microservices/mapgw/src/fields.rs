//! Message types and field type bytes of the short-message application
//! protocol

use sgw_appconn::ie::{Composite, Ie};
use sgw_appconn::message::{Group, MessageType};
use sgw_appconn::TypeRegistry;

pub const FORWARD_MO_SM_REQUEST: MessageType = MessageType::new(0xb0, 0xb1, Group::Request);
pub const FORWARD_MO_SM_RESPONSE: MessageType = MessageType::new(0xb1, 0xb0, Group::Response);

pub const FORWARD_MT_SM_REQUEST: MessageType = MessageType::new(0xb2, 0x10, Group::Request);
pub const FORWARD_MT_SM_RESPONSE: MessageType = MessageType::new(0x10, 0xb2, Group::Response);
pub const FORWARD_MT_SM_ADVICE: MessageType = MessageType::new(0xb3, 0xff, Group::Advice);

pub const SEND_RI_F_SM_REQUEST: MessageType = MessageType::new(0xb4, 0x11, Group::Request);
pub const SEND_RI_F_SM_RESPONSE: MessageType = MessageType::new(0x11, 0xb4, Group::Response);
pub const SEND_RI_F_SM_ADVICE: MessageType = MessageType::new(0xb5, 0xff, Group::Advice);

/* field type bytes, within the composite namespace */
pub const MESSAGE_ID: u8 = 0xb0; // byteArray
pub const REFERENCE_ID: u8 = 0xb1; // byteArray
pub const TYPE: u8 = 0x10;
pub const ACTION: u8 = 0x11;
pub const MSISDN: u8 = 0xb2; // byteArray, byte
pub const TPDU: u8 = 0xb3; // byteArray, byte
pub const NODE_ID: u8 = 0xb4; // byteArray
pub const FROM_NAME: u8 = 0xb5; // byteArray, byte
pub const TO_NAME: u8 = 0xb6; // byteArray, byte
pub const SMRPPRI: u8 = 0x12;
pub const REMOTE_GT: u8 = 0xb7; // byteArray, byte
pub const IMSI: u8 = 0xb8; // byteArray
pub const LMSI: u8 = 0xb9; // byteArray

/* service type, bits 2 to 5 */
pub const SERVICE_TYPE: u8 = 0x3c;
pub const SM: u8 = 0x4;
pub const MM: u8 = 0x8;
/* request type, bits 0 and 1 */
pub const REQUEST_TYPE: u8 = 0x3;
pub const ORIGINATING: u8 = 0x0;
pub const TERMINATING: u8 = 0x1;

/* action, bits 0 to 3 */
pub const MESSAGE_ACTION: u8 = 0x7;
pub const ACCEPT: u8 = 0x1;
pub const END: u8 = 0x3;

/* tpdu types */
pub const SMS_DELIVER: u8 = 0;
pub const SMS_DELIVER_REPORT: u8 = 1;
pub const SMS_STATUS_REPORT: u8 = 2;
pub const SMS_COMMAND: u8 = 3;
pub const SMS_SUBMIT: u8 = 4;
pub const SMS_SUBMIT_REPORT: u8 = 5;
pub const RESERVED: u8 = 6;

/// Registers the short-message types on top of the base protocol types.
pub fn register_message_types(registry: &TypeRegistry) {
    registry.put(FORWARD_MO_SM_REQUEST);
    registry.put(FORWARD_MO_SM_RESPONSE);

    registry.put(SEND_RI_F_SM_REQUEST);
    registry.put(SEND_RI_F_SM_RESPONSE);
    registry.put(SEND_RI_F_SM_ADVICE);

    registry.put(FORWARD_MT_SM_REQUEST);
    registry.put(FORWARD_MT_SM_RESPONSE);
    registry.put(FORWARD_MT_SM_ADVICE);
}

/// Address field: digits plus the type-of-address byte.
pub fn address_ie(ty: u8, digits: &str, toa: u8) -> Ie {
    Ie::Composite(Composite::with_children(
        ty,
        vec![Ie::string(digits), Ie::Byte(toa)],
    ))
}

/// Plain string field
pub fn string_ie(ty: u8, value: &str) -> Ie {
    Ie::Composite(Composite::with_children(ty, vec![Ie::string(value)]))
}

/// Tpdu field: the raw unit plus its tpdu type byte.
pub fn tpdu_ie(tpdu: &[u8], tpdu_type: u8) -> Ie {
    Ie::Composite(Composite::with_children(
        TPDU,
        vec![Ie::Bytes(tpdu.to_vec()), Ie::Byte(tpdu_type)],
    ))
}
