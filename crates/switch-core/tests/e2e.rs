//! End-to-end loopback scenarios (spec §8 "End-to-end scenarios (seed
//! tests)"): a real [`Engine`] bound to an ephemeral `127.0.0.1` port,
//! driven over actual UDP loopback by a bare-bones test UAC that builds
//! and parses wire bytes directly through `sipswitch-sip-core`. No mock
//! transport -- this is the same wire format production peers speak,
//! just confined to loopback.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use sipswitch_core::account::{Account, AccountInfo, Binding};
use sipswitch_core::channel::{ChannelEvent, ChannelSink};
use sipswitch_core::config::Config;
use sipswitch_core::media_port::SequentialPortAllocator;
use sipswitch_core::resolver::StaticResolver;
use sipswitch_core::wire;
use sipswitch_core::{Engine, EngineDeps};
use sipswitch_registrar_core::binding::InMemoryBindingStore;
use sipswitch_sip_core::message::{Message, Request};
use sipswitch_sip_core::method::Method;
use sipswitch_sip_core::parser::{parse_message, ParserMode};
use sipswitch_sip_core::sdp::Codec;
use sipswitch_sip_core::uri::Uri;
use sipswitch_sip_transport::Transport;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// A single configured account ("bob"), unauthenticated, PCMU/PCMA only --
/// enough to drive spec §8 scenario S1.
struct FixedAccount(AccountInfo);

#[async_trait]
impl Account for FixedAccount {
    async fn lookup(&self, name: &str) -> Option<AccountInfo> {
        (name == self.0.name).then(|| self.0.clone())
    }
}

struct FixedBinding(String);

#[async_trait]
impl Binding for FixedBinding {
    async fn resolve(&self, user: &str) -> Option<String> {
        (user == self.0).then(|| self.0.clone())
    }
}

#[derive(Default)]
struct RecordingChannel(Mutex<Vec<(String, ChannelEvent)>>);

#[async_trait]
impl ChannelSink for RecordingChannel {
    async fn dispatch(&self, dialog_id: &str, event: ChannelEvent) {
        self.0.lock().unwrap().push((dialog_id.to_string(), event));
    }
}

impl RecordingChannel {
    fn events_for(&self, dialog_id: &str) -> Vec<ChannelEvent> {
        self.0.lock().unwrap().iter().filter(|(id, _)| id == dialog_id).map(|(_, e)| e.clone()).collect()
    }
}

fn bob_account() -> AccountInfo {
    AccountInfo {
        name: "bob".into(),
        realm: "biloxi.example".into(),
        secret: None,
        permitted_audio_codecs: vec![
            Codec { payload_type: 0, name: "PCMU".into(), clock_rate: 8000 },
            Codec { payload_type: 8, name: "PCMA".into(), clock_rate: 8000 },
        ],
        video_enabled: false,
        t38_enabled: false,
        t38_udp_ec_preference: sipswitch_sip_core::sdp::UdpEc::Redundancy,
        nat_mode: sipswitch_sip_transport::NatMode::Never,
        call_limit: 0,
        mailbox: None,
        acl: Vec::new(),
    }
}

/// Bind a running [`Engine`] on `127.0.0.1:0` with a single unauthenticated
/// "bob" account, and spawn its reader/monitor tasks.
async fn spawn_test_engine() -> (Arc<Engine>, Arc<RecordingChannel>, SocketAddr) {
    let mut config = Config::default();
    config.bind_addr = "127.0.0.1".parse().unwrap();
    config.bind_port = 0;
    config.allow_guest = true;

    let channel = Arc::new(RecordingChannel::default());
    let deps = EngineDeps {
        accounts: Arc::new(FixedAccount(bob_account())),
        outbound: Arc::new(FixedBinding("bob".into())),
        resolver: Arc::new(StaticResolver::new()),
        channel: channel.clone(),
        credentials: Arc::new(sipswitch_auth_core::StaticCredentialStore::new()),
        binding_store: Arc::new(InMemoryBindingStore::new()),
        media_ports: Arc::new(SequentialPortAllocator::new(20000, 20100)),
    };

    let (engine, rx) = Engine::bind(config, deps).await.expect("bind");
    let addr = engine.transport.local_addr().expect("local addr");
    engine.spawn(rx);
    (engine, channel, addr)
}

/// Build the S1 audio-only offer: `audio 0 PCMU PCMA` from `alice`.
fn offer_sdp(alice_port: u16) -> String {
    format!(
        "v=0\r\no=alice 2890844526 2890844526 IN IP4 127.0.0.1\r\ns=-\r\nc=IN IP4 127.0.0.1\r\nt=0 0\r\n\
         m=audio {alice_port} RTP/AVP 0 8\r\na=rtpmap:0 PCMU/8000\r\na=rtpmap:8 PCMA/8000\r\n"
    )
}

fn build_invite(call_id: &str, from_tag: &str, alice_addr: SocketAddr) -> Request {
    let mut req = wire::build_request(
        Method::Invite,
        Uri::parse("sip:bob@biloxi.example").unwrap(),
        call_id,
        &format!("\"Alice\" <sip:alice@atlanta.example>;tag={from_tag}"),
        "\"Bob\" <sip:bob@biloxi.example>",
        1,
        "127.0.0.1",
        alice_addr.port(),
    );
    let body = offer_sdp(alice_addr.port()).into_bytes();
    req.headers.remove_all(&sipswitch_sip_core::headers::HeaderName::ContentLength);
    req.headers.push(sipswitch_sip_core::headers::HeaderName::ContentType, "application/sdp");
    req.headers.push(sipswitch_sip_core::headers::HeaderName::ContentLength, body.len().to_string());
    req.body = body;
    req
}

/// Receive and parse one datagram from `sock`, retrying past provisional
/// responses until a final (>=200) response or `None` on timeout.
async fn recv_final_response(sock: &UdpSocket) -> Option<(u16, Message)> {
    let mut buf = vec![0u8; 4096];
    loop {
        let (n, _src) = timeout(RECV_TIMEOUT, sock.recv_from(&mut buf)).await.ok()??;
        let msg = parse_message(&buf[..n], ParserMode::Lenient).ok()?;
        if let Message::Response(r) = &msg {
            if r.status.0 >= 200 {
                return Some((r.status.0, msg));
            }
            continue;
        }
        return Some((0, msg));
    }
}

#[tokio::test]
async fn s1_invite_200_ack_bye_happy_path() {
    let (engine, channel, bob_addr) = spawn_test_engine().await;

    let alice = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let alice_addr = alice.local_addr().unwrap();
    let call_id = format!("{:x}@atlanta.example", rand_u64());
    let from_tag = "1928301774".to_string();

    let invite = build_invite(&call_id, &from_tag, alice_addr);
    alice.send_to(&wire::message_bytes(&Message::Request(invite)), bob_addr).await.unwrap();

    let (status, final_msg) = recv_final_response(&alice).await.expect("final response to INVITE");
    assert_eq!(status, 200, "expected 200 OK for an audio-only offer bob supports");

    let Message::Response(ok) = final_msg else { panic!("expected a response") };
    assert!(ok.headers.get(&sipswitch_sip_core::headers::HeaderName::ContentType).is_some());
    let sdp_text = String::from_utf8(ok.body.clone()).unwrap();
    assert!(sdp_text.contains("PCMU"), "answer should negotiate PCMU: {sdp_text}");

    let to_header = ok.headers.get(&sipswitch_sip_core::headers::HeaderName::To).unwrap().to_string();

    // Ringing, then Answered should have reached the channel sink.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let events = channel.events_for(&call_id);
    assert!(events.iter().any(|e| matches!(e, ChannelEvent::Ringing)), "missing Ringing event: {events:?}");
    assert!(events.iter().any(|e| matches!(e, ChannelEvent::Answered { .. })), "missing Answered event: {events:?}");

    let ack = wire::build_request(
        Method::Ack,
        Uri::parse("sip:bob@biloxi.example").unwrap(),
        &call_id,
        &format!("\"Alice\" <sip:alice@atlanta.example>;tag={from_tag}"),
        &to_header,
        1,
        "127.0.0.1",
        alice_addr.port(),
    );
    alice.send_to(&wire::message_bytes(&Message::Request(ack)), bob_addr).await.unwrap();

    let bye = wire::build_request(
        Method::Bye,
        Uri::parse("sip:bob@biloxi.example").unwrap(),
        &call_id,
        &format!("\"Alice\" <sip:alice@atlanta.example>;tag={from_tag}"),
        &to_header,
        2,
        "127.0.0.1",
        alice_addr.port(),
    );
    alice.send_to(&wire::message_bytes(&Message::Request(bye)), bob_addr).await.unwrap();

    let (bye_status, _) = recv_final_response(&alice).await.expect("200 OK to BYE");
    assert_eq!(bye_status, 200);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let events = channel.events_for(&call_id);
    assert!(
        events.iter().any(|e| matches!(e, ChannelEvent::HangupWithCause { .. })),
        "missing hangup event after BYE: {events:?}"
    );

    // Dialog must still exist right after BYE (autodestruct grace period,
    // spec §8 invariant 4), not be gone instantly.
    assert!(engine.dialogs.get(&call_id).is_some(), "dialog destroyed before its 32s grace period");
}

#[tokio::test]
async fn s1_unsupported_codec_offer_is_rejected_488() {
    let (_engine, _channel, bob_addr) = spawn_test_engine().await;

    let alice = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let alice_addr = alice.local_addr().unwrap();
    let call_id = format!("{:x}@atlanta.example", rand_u64());

    let mut req = wire::build_request(
        Method::Invite,
        Uri::parse("sip:bob@biloxi.example").unwrap(),
        &call_id,
        "\"Alice\" <sip:alice@atlanta.example>;tag=abc123",
        "\"Bob\" <sip:bob@biloxi.example>",
        1,
        "127.0.0.1",
        alice_addr.port(),
    );
    let body = format!(
        "v=0\r\no=alice 1 1 IN IP4 127.0.0.1\r\ns=-\r\nc=IN IP4 127.0.0.1\r\nt=0 0\r\n\
         m=audio {} RTP/AVP 97\r\na=rtpmap:97 SPEEX/16000\r\n",
        alice_addr.port()
    )
    .into_bytes();
    req.headers.remove_all(&sipswitch_sip_core::headers::HeaderName::ContentLength);
    req.headers.push(sipswitch_sip_core::headers::HeaderName::ContentType, "application/sdp");
    req.headers.push(sipswitch_sip_core::headers::HeaderName::ContentLength, body.len().to_string());
    req.body = body;

    alice.send_to(&wire::message_bytes(&Message::Request(req)), bob_addr).await.unwrap();
    let (status, _) = recv_final_response(&alice).await.expect("final response");
    assert_eq!(status, 488, "an offer with no codec bob supports must be rejected per spec §4.2/§7");
}

#[tokio::test]
async fn s1_unknown_destination_gets_404() {
    let (_engine, _channel, bob_addr) = spawn_test_engine().await;

    let alice = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let alice_addr = alice.local_addr().unwrap();
    let call_id = format!("{:x}@atlanta.example", rand_u64());

    let req = wire::build_request(
        Method::Invite,
        Uri::parse("sip:nobody@biloxi.example").unwrap(),
        &call_id,
        "\"Alice\" <sip:alice@atlanta.example>;tag=abc123",
        "\"Nobody\" <sip:nobody@biloxi.example>",
        1,
        "127.0.0.1",
        alice_addr.port(),
    );
    alice.send_to(&wire::message_bytes(&Message::Request(req)), bob_addr).await.unwrap();
    let (status, _) = recv_final_response(&alice).await.expect("final response");
    assert_eq!(status, 404);
}

#[tokio::test]
async fn s1_bye_for_unknown_dialog_gets_481() {
    let (_engine, _channel, bob_addr) = spawn_test_engine().await;

    let alice = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let alice_addr = alice.local_addr().unwrap();

    let bye = wire::build_request(
        Method::Bye,
        Uri::parse("sip:bob@biloxi.example").unwrap(),
        "nonexistent-call-id",
        "\"Alice\" <sip:alice@atlanta.example>;tag=abc123",
        "\"Bob\" <sip:bob@biloxi.example>;tag=xyz789",
        1,
        "127.0.0.1",
        alice_addr.port(),
    );
    alice.send_to(&wire::message_bytes(&Message::Request(bye)), bob_addr).await.unwrap();
    let (status, _) = recv_final_response(&alice).await.expect("final response");
    assert_eq!(status, 481, "spec §7: NoSuchDialog maps to 481 for any method but ACK");
}

/// Receive one datagram and insist it parses as a request, retrying past
/// nothing -- callers that expect a request know what should be queued.
async fn recv_request(sock: &UdpSocket) -> Option<Request> {
    let mut buf = vec![0u8; 4096];
    let (n, _src) = timeout(RECV_TIMEOUT, sock.recv_from(&mut buf)).await.ok()??;
    match parse_message(&buf[..n], ParserMode::Lenient).ok()? {
        Message::Request(r) => Some(r),
        Message::Response(_) => None,
    }
}

async fn reply_to(sock: &UdpSocket, req: &Request, dest: SocketAddr, status: u16) {
    let resp = wire::build_response(req, status, Some("peer-tag"), Vec::new());
    sock.send_to(&wire::message_bytes(&Message::Response(resp)), dest).await.unwrap();
}

#[tokio::test]
async fn s5_register_then_query_then_expire() {
    let (_engine, _channel, bob_addr) = spawn_test_engine().await;
    let alice = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let alice_addr = alice.local_addr().unwrap();
    let call_id = format!("{:x}@atlanta.example", rand_u64());
    let contact = format!("<sip:bob@{}:{}>", alice_addr.ip(), alice_addr.port());

    let mut register = wire::build_request(
        Method::Register,
        Uri::parse("sip:biloxi.example").unwrap(),
        &call_id,
        "<sip:bob@biloxi.example>;tag=reg1",
        "<sip:bob@biloxi.example>",
        1,
        "127.0.0.1",
        alice_addr.port(),
    );
    register.headers.push(sipswitch_sip_core::headers::HeaderName::Contact, contact.clone());
    register.headers.push(sipswitch_sip_core::headers::HeaderName::Expires, "3600");
    alice.send_to(&wire::message_bytes(&Message::Request(register)), bob_addr).await.unwrap();

    let (status, msg) = recv_final_response(&alice).await.expect("response to REGISTER");
    assert_eq!(status, 200, "unauthenticated REGISTER must succeed once allow_guest is set");
    let Message::Response(ok) = msg else { panic!("expected a response") };
    let registered_contact = ok.headers.get(&sipswitch_sip_core::headers::HeaderName::Contact).expect("Contact echoed back");
    assert!(registered_contact.contains("expires=3600"), "binding should keep the requested expiry: {registered_contact}");

    // A bare query (no Contact, no Expires) must report the binding we just made.
    let query = wire::build_request(
        Method::Register,
        Uri::parse("sip:biloxi.example").unwrap(),
        &call_id,
        "<sip:bob@biloxi.example>;tag=reg1",
        "<sip:bob@biloxi.example>",
        2,
        "127.0.0.1",
        alice_addr.port(),
    );
    alice.send_to(&wire::message_bytes(&Message::Request(query)), bob_addr).await.unwrap();
    let (status, msg) = recv_final_response(&alice).await.expect("response to query REGISTER");
    assert_eq!(status, 200);
    let Message::Response(ok) = msg else { panic!("expected a response") };
    assert!(ok.headers.get(&sipswitch_sip_core::headers::HeaderName::Contact).is_some(), "query must report the live binding");

    // Expires: 0 against the same (non-wildcard) contact removes just that binding.
    let mut remove = wire::build_request(
        Method::Register,
        Uri::parse("sip:biloxi.example").unwrap(),
        &call_id,
        "<sip:bob@biloxi.example>;tag=reg1",
        "<sip:bob@biloxi.example>",
        3,
        "127.0.0.1",
        alice_addr.port(),
    );
    remove.headers.push(sipswitch_sip_core::headers::HeaderName::Contact, contact.clone());
    remove.headers.push(sipswitch_sip_core::headers::HeaderName::Expires, "0");
    alice.send_to(&wire::message_bytes(&Message::Request(remove)), bob_addr).await.unwrap();
    let (status, _) = recv_final_response(&alice).await.expect("response to removing REGISTER");
    assert_eq!(status, 200);

    // Binding is now gone: the same bare query reports no Contact.
    let requery = wire::build_request(
        Method::Register,
        Uri::parse("sip:biloxi.example").unwrap(),
        &call_id,
        "<sip:bob@biloxi.example>;tag=reg1",
        "<sip:bob@biloxi.example>",
        4,
        "127.0.0.1",
        alice_addr.port(),
    );
    alice.send_to(&wire::message_bytes(&Message::Request(requery)), bob_addr).await.unwrap();
    let (status, msg) = recv_final_response(&alice).await.expect("response to post-removal query");
    assert_eq!(status, 200);
    let Message::Response(ok) = msg else { panic!("expected a response") };
    assert!(ok.headers.get(&sipswitch_sip_core::headers::HeaderName::Contact).is_none(), "binding should be gone after Expires: 0");
}

#[tokio::test]
async fn s6_blind_transfer_bridges_to_new_destination_and_tears_down_original() {
    let (engine, channel, bob_addr) = spawn_test_engine().await;
    let alice = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let alice_addr = alice.local_addr().unwrap();
    let call_id = format!("{:x}@atlanta.example", rand_u64());
    let from_tag = "1928301774".to_string();

    let invite = build_invite(&call_id, &from_tag, alice_addr);
    alice.send_to(&wire::message_bytes(&Message::Request(invite)), bob_addr).await.unwrap();
    let (status, final_msg) = recv_final_response(&alice).await.expect("final response to INVITE");
    assert_eq!(status, 200);
    let Message::Response(ok) = final_msg else { panic!("expected a response") };
    let to_header = ok.headers.get(&sipswitch_sip_core::headers::HeaderName::To).unwrap().to_string();

    let ack = wire::build_request(
        Method::Ack,
        Uri::parse("sip:bob@biloxi.example").unwrap(),
        &call_id,
        &format!("\"Alice\" <sip:alice@atlanta.example>;tag={from_tag}"),
        &to_header,
        1,
        "127.0.0.1",
        alice_addr.port(),
    );
    alice.send_to(&wire::message_bytes(&Message::Request(ack)), bob_addr).await.unwrap();

    let mut refer = wire::build_request(
        Method::Refer,
        Uri::parse("sip:bob@biloxi.example").unwrap(),
        &call_id,
        &format!("\"Alice\" <sip:alice@atlanta.example>;tag={from_tag}"),
        &to_header,
        2,
        "127.0.0.1",
        alice_addr.port(),
    );
    refer.headers.push(sipswitch_sip_core::headers::HeaderName::ReferTo, "<sip:carol@biloxi.example>");
    alice.send_to(&wire::message_bytes(&Message::Request(refer)), bob_addr).await.unwrap();

    let (status, _) = recv_final_response(&alice).await.expect("202 to REFER");
    assert_eq!(status, 202, "spec §4.5: REFER always gets an immediate 202 Accepted");

    let trying_notify = recv_request(&alice).await.expect("progress NOTIFY");
    assert_eq!(trying_notify.method, Method::Notify);
    assert!(String::from_utf8_lossy(&trying_notify.body).contains("100 Trying"));
    reply_to(&alice, &trying_notify, bob_addr, 200).await;

    // The engine originates a fresh INVITE toward the transfer destination;
    // over this loopback harness it lands back on alice's socket, which
    // plays the destination's part and answers it.
    let xfer_invite = recv_request(&alice).await.expect("outbound transfer INVITE");
    assert_eq!(xfer_invite.method, Method::Invite);
    reply_to(&alice, &xfer_invite, bob_addr, 200).await;

    let final_notify = recv_request(&alice).await.expect("final progress NOTIFY");
    assert_eq!(final_notify.method, Method::Notify);
    assert!(String::from_utf8_lossy(&final_notify.body).contains("200 OK"));
    reply_to(&alice, &final_notify, bob_addr, 200).await;

    let bye = recv_request(&alice).await.expect("BYE tearing down the referring dialog");
    assert_eq!(bye.method, Method::Bye);
    reply_to(&alice, &bye, bob_addr, 200).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let events = channel.events_for(&call_id);
    assert!(
        events.iter().any(|e| matches!(e, ChannelEvent::HangupWithCause { .. })),
        "referring dialog should report a hangup once the transfer succeeds: {events:?}"
    );
    assert!(engine.dialogs.get(&call_id).is_some(), "dialog stays around for its autodestruct grace period");
}

fn rand_u64() -> u64 {
    use rand::Rng;
    rand::thread_rng().gen()
}
