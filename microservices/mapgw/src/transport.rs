//! Abstract signalling transport boundary
//!
//! The gateway drives the external MAP transport exclusively through
//! this interface; it never encodes or decodes signalling bytes itself.
//! Outbound work travels as primitives, inbound traffic arrives as
//! transport events on a channel owned by the gateway.

use crate::errors::TransportError;
use async_trait::async_trait;

/// Dialog identity assigned by the transport once a dialog is opened
pub type DialogId = u32;

/// MAP systemFailure service code
pub const SYSTEM_FAILURE: u16 = 34;

/// Address digits plus the type-of-address byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressString {
    pub digits: String,
    pub toa: u8,
}

impl AddressString {
    pub fn new(digits: impl Into<String>, toa: u8) -> AddressString {
        AddressString { digits: digits.into(), toa }
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }
}

/// Application context proposed when opening a dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationContext {
    ShortMsgGateway,
    ShortMsgMtRelay,
}

/// Routing parameters of an outbound dialog open
#[derive(Debug, Clone)]
pub struct OpenParams {
    pub application_context: ApplicationContext,
    pub local_ssn: u8,
    pub local_pc: u32,
    pub local_gt: AddressString,
    pub remote_ssn: u8,
    pub remote_pc: u32,
    pub remote_gt: AddressString,
}

/// Outbound signalling primitive
#[derive(Debug, Clone)]
pub enum Primitive {
    OpenRequest(OpenParams),
    OpenAccept,
    MoForwardSmResponse,
    SriSmRequest {
        msisdn: AddressString,
        sm_rp_pri: u8,
        service_centre: AddressString,
    },
    MtForwardSmRequest {
        tpdu: Vec<u8>,
        imsi: String,
        lmsi: String,
        service_centre: AddressString,
    },
    Delimiter,
    Close,
    UserAbort,
    Error { code: u16 },
}

/// One inbound transport event, correlated by dialog id
#[derive(Debug, Clone)]
pub struct TransportEvent {
    pub dialog_id: DialogId,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
pub enum EventKind {
    Request(RequestKind),
    Response(ResponseKind),
    Error { code: u16 },
}

/// Transport-initiated service requests
#[derive(Debug, Clone)]
pub enum RequestKind {
    Open {
        originating_gt: Option<String>,
    },
    MoForwardSm {
        invoke_id: i32,
        service_centre: Option<AddressString>,
        msisdn: Option<AddressString>,
        tpdu: Vec<u8>,
    },
    AlertServiceCentre {
        invoke_id: i32,
    },
    Delimiter,
    Close,
    UserAbort,
    ProviderAbort,
}

/// Responses to primitives this side issued earlier
#[derive(Debug, Clone)]
pub enum ResponseKind {
    Open,
    SriSm {
        imsi: String,
        lmsi: String,
        roaming_number: Option<AddressString>,
        msc_number: Option<AddressString>,
    },
    MtForwardSm,
}

/// The external MAP transport. Implementations are assumed
/// non-reentrant; the gateway serializes every call through one sender
/// task. Inbound events are delivered on the channel handed over at
/// gateway construction.
#[async_trait]
pub trait MapTransport: Send {
    /// Opens a dialog and returns the transport-assigned id.
    async fn open_dialog(&mut self, params: OpenParams) -> Result<DialogId, TransportError>;

    /// Sends one primitive on an open dialog.
    async fn send_primitive(
        &mut self,
        dialog_id: DialogId,
        primitive: Primitive,
    ) -> Result<(), TransportError>;

    /// Closes the dialog.
    async fn close_dialog(&mut self, dialog_id: DialogId) -> Result<(), TransportError>;

    /// Aborts the dialog.
    async fn abort_dialog(&mut self, dialog_id: DialogId) -> Result<(), TransportError>;
}
