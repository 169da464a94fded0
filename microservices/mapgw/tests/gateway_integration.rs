//! Gateway integration tests
//!
//! Real application-server traffic over TCP plus scripted signalling
//! events through the loopback transport.

use mapgw::actions::{MtForwardSmAction, SendRiForSmAction};
use mapgw::dialog::{Dialog, DialogState, TIME_10S};
use mapgw::dialogs::SendRiForSm;
use mapgw::fields;
use mapgw::gateway::MapGateway;
use mapgw::loopback::{loopback, LoopbackHarness};
use mapgw::transport::{
    AddressString, ApplicationContext, EventKind, Primitive, RequestKind, ResponseKind,
    TransportEvent, SYSTEM_FAILURE,
};
use mapgw::GatewayConfig;
use sgw_appconn::message::{REQUEST_ACCEPTED, REQUEST_FAILED};
use sgw_appconn::{
    ActionRegistry, AppClient, ClientConfig, Message, TypeRegistry, WorkerPool,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Reads and decodes one frame from the application-server side.
async fn read_message(stream: &mut TcpStream) -> std::io::Result<Message> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let ty = header[3];
    let value = if ty < 128 {
        let mut value = [0u8; 1];
        stream.read_exact(&mut value).await?;
        value.to_vec()
    } else {
        let mut len = [0u8; 1];
        stream.read_exact(&mut len).await?;
        let mut value = vec![0u8; len[0] as usize];
        stream.read_exact(&mut value).await?;
        value
    };
    Ok(Message::decode(
        header[0],
        u16::from_be_bytes([header[1], header[2]]),
        ty,
        &value,
    )
    .expect("decodable frame"))
}

async fn write_message(stream: &mut TcpStream, message: &Message) {
    stream.write_all(&message.encode().unwrap()).await.unwrap();
}

struct Setup {
    gateway: Arc<MapGateway>,
    harness: LoopbackHarness,
    /// The one connection the gateway's client opened to the test server
    server_stream: Option<TcpStream>,
}

/// Builds the gateway against a one-connection test server. When
/// `server_up` is false the client pool starts (and stays) offline.
async fn start_gateway(server_up: bool) -> Setup {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let accept = if server_up {
        Some(tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            stream
        }))
    } else {
        drop(listener);
        None
    };

    let types = Arc::new(TypeRegistry::new());
    fields::register_message_types(&types);
    let actions = Arc::new(ActionRegistry::new());
    let workers = WorkerPool::new(4);
    let client = Arc::new(
        AppClient::connect(
            1,
            ClientConfig {
                address: addr.ip().to_string(),
                port: addr.port(),
                conn_index: 0,
                size: 1,
                registrable: false,
                failsafe: false,
            },
            types,
            actions.clone(),
            workers,
        )
        .await
        .unwrap(),
    );

    let (transport, events, harness) = loopback();
    let config = GatewayConfig {
        logical_name: "mapgw-test".to_string(),
        local_pc: 1001,
        remote_pc: 2002,
        local_gt: "59170000001".to_string(),
        node_name: "node0".to_string(),
        ..Default::default()
    };
    let gateway = MapGateway::start(config, client, transport, events);
    actions.put(Arc::new(SendRiForSmAction::new(gateway.clone())));
    actions.put(Arc::new(MtForwardSmAction::new(gateway.clone())));

    let server_stream = match accept {
        Some(accept) => Some(timeout(Duration::from_secs(2), accept).await.unwrap().unwrap()),
        None => None,
    };
    Setup { gateway, harness, server_stream }
}

async fn next_sent(
    sent: &mut mpsc::UnboundedReceiver<(u32, Primitive)>,
) -> (u32, Primitive) {
    timeout(Duration::from_secs(2), sent.recv())
        .await
        .expect("outbound primitive in time")
        .expect("sender alive")
}

fn mt_request(message_id: &str, imsi: &str, lmsi: &str, remote_gt: &str, tpdu: &[u8]) -> Message {
    let mut ies = Vec::new();
    if !message_id.is_empty() {
        ies.push(fields::string_ie(fields::MESSAGE_ID, message_id));
    }
    if !tpdu.is_empty() {
        ies.push(fields::tpdu_ie(tpdu, fields::SMS_DELIVER));
    }
    if !imsi.is_empty() {
        ies.push(fields::string_ie(fields::IMSI, imsi));
    }
    if !lmsi.is_empty() {
        ies.push(fields::string_ie(fields::LMSI, lmsi));
    }
    if !remote_gt.is_empty() {
        ies.push(fields::address_ie(fields::REMOTE_GT, remote_gt, 0x91));
    }
    Message::tlv(fields::FORWARD_MT_SM_REQUEST.ty, ies)
}

#[tokio::test]
async fn test_mt_forward_flow_end_to_end() {
    let mut setup = start_gateway(true).await;
    let mut stream = setup.server_stream.take().unwrap();

    // application server asks the gateway to deliver a short message
    let mut request = mt_request("msg-1", "716001234567890", "", "59176000000", &[0x04, 0x0b, 0x91]);
    request.set_sequence_number(5);
    write_message(&mut stream, &request).await;

    // the gateway accepts the request
    let response = timeout(Duration::from_secs(2), read_message(&mut stream))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.ty(), fields::FORWARD_MT_SM_REQUEST.linked_type);
    assert_eq!(response.sequence_number(), 5);
    assert_eq!(response.value_byte(), REQUEST_ACCEPTED);

    // the dialog opened towards the MSC: open, invoke, delimiter
    let (dialog_id, open) = next_sent(&mut setup.harness.sent).await;
    match open {
        Primitive::OpenRequest(params) => {
            assert_eq!(params.application_context, ApplicationContext::ShortMsgMtRelay);
            assert_eq!(params.remote_ssn, 8);
            assert_eq!(params.remote_gt.digits, "59176000000");
        }
        other => panic!("expected open request, got {:?}", other),
    }
    let (_, invoke) = next_sent(&mut setup.harness.sent).await;
    match invoke {
        Primitive::MtForwardSmRequest { tpdu, imsi, lmsi, .. } => {
            assert_eq!(tpdu, vec![0x04, 0x0b, 0x91]);
            assert_eq!(imsi, "716001234567890");
            assert!(lmsi.is_empty());
        }
        other => panic!("expected MT forward request, got {:?}", other),
    }
    let (_, delimiter) = next_sent(&mut setup.harness.sent).await;
    assert!(matches!(delimiter, Primitive::Delimiter));

    let dialog = setup.gateway.dialogs().get(dialog_id).expect("dialog cached");
    assert_eq!(dialog.core().state(), DialogState::WInvoke);

    // the remote side answers and closes
    setup
        .harness
        .events
        .send(TransportEvent { dialog_id, kind: EventKind::Response(ResponseKind::Open) })
        .unwrap();
    setup
        .harness
        .events
        .send(TransportEvent { dialog_id, kind: EventKind::Response(ResponseKind::MtForwardSm) })
        .unwrap();
    setup
        .harness
        .events
        .send(TransportEvent { dialog_id, kind: EventKind::Request(RequestKind::Close) })
        .unwrap();

    // the outcome is reported back to the application server
    let advice = timeout(Duration::from_secs(2), read_message(&mut stream))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(advice.ty(), fields::FORWARD_MT_SM_ADVICE.ty);
    assert_eq!(advice.composite(fields::MESSAGE_ID).unwrap().string(), "msg-1");
    assert_eq!(advice.body().byte(), REQUEST_ACCEPTED);
    assert_eq!(dialog.core().state(), DialogState::Close0);
}

#[tokio::test]
async fn test_mt_forward_without_identity_rejected() {
    let mut setup = start_gateway(true).await;
    let mut stream = setup.server_stream.take().unwrap();

    // both imsi and lmsi missing: invalid even with remote GT and tpdu
    let mut request = mt_request("msg-2", "", "", "59176000000", &[0x04]);
    request.set_sequence_number(9);
    write_message(&mut stream, &request).await;

    let response = timeout(Duration::from_secs(2), read_message(&mut stream))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.ty(), fields::FORWARD_MT_SM_REQUEST.linked_type);
    assert_eq!(response.sequence_number(), 9);
    assert_eq!(response.value_byte(), REQUEST_FAILED);

    // no dialog was opened
    assert!(timeout(Duration::from_millis(200), setup.harness.sent.recv())
        .await
        .is_err());
    assert!(setup.gateway.dialogs().is_empty());
}

#[tokio::test]
async fn test_send_ri_flow_reports_routing_info() {
    let mut setup = start_gateway(true).await;
    let mut stream = setup.server_stream.take().unwrap();

    let mut request = Message::tlv(
        fields::SEND_RI_F_SM_REQUEST.ty,
        vec![
            fields::string_ie(fields::MESSAGE_ID, "msg-3"),
            fields::address_ie(fields::REMOTE_GT, "59175000000", 0x91),
            fields::address_ie(fields::MSISDN, "59171234567", 0x91),
            sgw_appconn::Ie::Composite(sgw_appconn::Composite::value(fields::SMRPPRI, 1)),
        ],
    );
    request.set_sequence_number(3);
    write_message(&mut stream, &request).await;

    let response = timeout(Duration::from_secs(2), read_message(&mut stream))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.ty(), fields::SEND_RI_F_SM_REQUEST.linked_type);
    assert_eq!(response.value_byte(), REQUEST_ACCEPTED);

    let (dialog_id, open) = next_sent(&mut setup.harness.sent).await;
    match open {
        Primitive::OpenRequest(params) => {
            assert_eq!(params.application_context, ApplicationContext::ShortMsgGateway);
            assert_eq!(params.remote_ssn, 6);
        }
        other => panic!("expected open request, got {:?}", other),
    }
    let (_, invoke) = next_sent(&mut setup.harness.sent).await;
    match invoke {
        Primitive::SriSmRequest { msisdn, sm_rp_pri, .. } => {
            assert_eq!(msisdn.digits, "59171234567");
            assert_eq!(sm_rp_pri, 1);
        }
        other => panic!("expected SRI request, got {:?}", other),
    }
    let (_, delimiter) = next_sent(&mut setup.harness.sent).await;
    assert!(matches!(delimiter, Primitive::Delimiter));

    // routing info comes back, then the remote closes
    setup
        .harness
        .events
        .send(TransportEvent {
            dialog_id,
            kind: EventKind::Response(ResponseKind::SriSm {
                imsi: "716001234567890".to_string(),
                lmsi: String::new(),
                roaming_number: Some(AddressString::new("59178000000", 0x91)),
                msc_number: None,
            }),
        })
        .unwrap();
    setup
        .harness
        .events
        .send(TransportEvent { dialog_id, kind: EventKind::Request(RequestKind::Close) })
        .unwrap();

    let advice = timeout(Duration::from_secs(2), read_message(&mut stream))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(advice.ty(), fields::SEND_RI_F_SM_ADVICE.ty);
    assert_eq!(advice.composite(fields::IMSI).unwrap().string(), "716001234567890");
    assert_eq!(advice.composite(fields::REMOTE_GT).unwrap().string(), "59178000000");
    assert_eq!(advice.body().byte(), REQUEST_ACCEPTED);
}

#[tokio::test]
async fn test_mo_dialog_forwards_to_application_server() {
    let mut setup = start_gateway(true).await;
    let mut stream = setup.server_stream.take().unwrap();
    let dialog_id = 99;

    // inbound open creates the dialog and accepts it
    setup
        .harness
        .events
        .send(TransportEvent {
            dialog_id,
            kind: EventKind::Request(RequestKind::Open {
                originating_gt: Some("59177000000".to_string()),
            }),
        })
        .unwrap();
    let (id, accept) = next_sent(&mut setup.harness.sent).await;
    assert_eq!(id, dialog_id);
    assert!(matches!(accept, Primitive::OpenAccept));

    let dialog = setup.gateway.dialogs().get(dialog_id).expect("dialog cached");
    assert_eq!(dialog.core().state(), DialogState::WInvoke);

    // the invoke carries the short message; the gateway forwards it
    setup
        .harness
        .events
        .send(TransportEvent {
            dialog_id,
            kind: EventKind::Request(RequestKind::MoForwardSm {
                invoke_id: 4,
                service_centre: Some(AddressString::new("59170000001", 0x91)),
                msisdn: Some(AddressString::new("59171234567", 0x91)),
                tpdu: vec![0x01, 0x02, 0x03],
            }),
        })
        .unwrap();

    let forward = timeout(Duration::from_secs(2), read_message(&mut stream))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(forward.ty(), fields::FORWARD_MO_SM_REQUEST.ty);
    assert_eq!(forward.composite(fields::MSISDN).unwrap().string(), "59171234567");
    assert_eq!(forward.composite(fields::TPDU).unwrap().byte_array(), &[0x01, 0x02, 0x03]);
    assert_eq!(forward.composite(fields::NODE_ID).unwrap().string(), "59177000000");
    assert_eq!(dialog.core().state(), DialogState::Invoke);
    assert_eq!(dialog.core().invoke_id(), 4);

    // application server accepts the message
    let mut response = Message::tlv(
        fields::FORWARD_MO_SM_RESPONSE.ty,
        vec![sgw_appconn::Ie::Composite(sgw_appconn::Composite::value(
            fields::ACTION,
            fields::ACCEPT,
        ))],
    );
    response.set_sequence_number(forward.sequence_number());
    write_message(&mut stream, &response).await;

    // the dialog answers the invoke and closes
    let (_, result) = next_sent(&mut setup.harness.sent).await;
    assert!(matches!(result, Primitive::MoForwardSmResponse));
    let (_, close) = next_sent(&mut setup.harness.sent).await;
    assert!(matches!(close, Primitive::Close));
    timeout(Duration::from_secs(1), async {
        while dialog.core().state() != DialogState::Close0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("dialog closed after the transport close");
}

#[tokio::test]
async fn test_mo_dialog_with_pool_exhausted_fails_fast() {
    let mut setup = start_gateway(false).await;
    let dialog_id = 7;

    setup
        .harness
        .events
        .send(TransportEvent {
            dialog_id,
            kind: EventKind::Request(RequestKind::Open { originating_gt: None }),
        })
        .unwrap();
    let (_, accept) = next_sent(&mut setup.harness.sent).await;
    assert!(matches!(accept, Primitive::OpenAccept));

    setup
        .harness
        .events
        .send(TransportEvent {
            dialog_id,
            kind: EventKind::Request(RequestKind::MoForwardSm {
                invoke_id: 1,
                service_centre: None,
                msisdn: Some(AddressString::new("59171234567", 0x91)),
                tpdu: vec![0x01],
            }),
        })
        .unwrap();

    // no online connection: system failure plus immediate close
    let (_, error) = next_sent(&mut setup.harness.sent).await;
    match error {
        Primitive::Error { code } => assert_eq!(code, SYSTEM_FAILURE),
        other => panic!("expected error primitive, got {:?}", other),
    }
    let (_, close) = next_sent(&mut setup.harness.sent).await;
    assert!(matches!(close, Primitive::Close));
}

#[tokio::test]
async fn test_stalled_dialog_escalates_one_step_per_sweep() {
    let mut setup = start_gateway(false).await;

    let dialog = SendRiForSm::new(
        setup.gateway.clone(),
        "msg-6".to_string(),
        AddressString::new("59175000000", 0x91),
        AddressString::new("59171234567", 0x91),
        0,
    );
    dialog.clone().init();
    assert_eq!(dialog.core().state(), DialogState::WInvoke);

    // wait for the open to be sent so the dialog lands in the cache
    let (dialog_id, open) = next_sent(&mut setup.harness.sent).await;
    assert!(matches!(open, Primitive::OpenRequest(_)));
    next_sent(&mut setup.harness.sent).await;
    next_sent(&mut setup.harness.sent).await;
    assert!(setup.gateway.dialogs().get(dialog_id).is_some());

    let expire = |d: &std::sync::Arc<SendRiForSm>| {
        d.core().set_deadline(tokio::time::Instant::now() - TIME_10S)
    };

    // one step per sweep, never jumping
    expire(&dialog);
    setup.gateway.dialogs().check();
    assert_eq!(dialog.core().state(), DialogState::WClose0);

    expire(&dialog);
    setup.gateway.dialogs().check();
    assert_eq!(dialog.core().state(), DialogState::WClose1);

    expire(&dialog);
    setup.gateway.dialogs().check();
    let (_, abort) = next_sent(&mut setup.harness.sent).await;
    assert!(matches!(abort, Primitive::UserAbort));

    // a terminal dialog is evicted instead of re-escalated
    dialog.core().set_state(DialogState::Close0);
    dialog.core().set_state(DialogState::Close1);
    expire(&dialog);
    setup.gateway.dialogs().check();
    assert!(setup.gateway.dialogs().get(dialog_id).is_none());
}
