//! Protocol-level tests of the service side, driving raw envelopes over the
//! transport the way a client implementation would.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::timeout;

use fsp_service::{
    ActivityHandle, ActivityLauncher, ActivityOutcome, ConnectionId, FlowService,
    FlowServiceHandler, LifecycleEvent, ServiceConfig, ServiceContext, ServiceError,
};
use fsp_transport::{Channel, EndpointAddress, TransportHub};
use fsp_types::codes;
use fsp_types::{Envelope, ErrorPayload, InternalData, MessageType, EMPTY_DATA};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn client_data() -> InternalData {
    InternalData::new("1.0.0", "com.example.client")
}

async fn send(channel: &Channel, envelope: Envelope) {
    channel.send(envelope.encode()).await.unwrap();
}

async fn recv(channel: &mut Channel) -> Envelope {
    let raw = timeout(RECV_TIMEOUT, channel.recv())
        .await
        .expect("timed out waiting for envelope")
        .expect("channel closed unexpectedly");
    Envelope::decode(&raw).unwrap()
}

async fn send_request(channel: &Channel, payload: &str) {
    send(
        channel,
        Envelope::new(MessageType::Request, payload, Some(client_data())),
    )
    .await;
}

/// Replies with the configured payload.
struct Respond {
    reply: String,
}

#[async_trait]
impl FlowServiceHandler for Respond {
    async fn process_request(
        &self,
        ctx: ServiceContext,
        _request: String,
        _sender: Option<InternalData>,
    ) -> Result<(), ServiceError> {
        ctx.finish_with_response(self.reply.clone()).await;
        Ok(())
    }
}

/// Echoes the request payload back.
struct Echo;

#[async_trait]
impl FlowServiceHandler for Echo {
    async fn process_request(
        &self,
        ctx: ServiceContext,
        request: String,
        _sender: Option<InternalData>,
    ) -> Result<(), ServiceError> {
        ctx.finish_with_response(request).await;
        Ok(())
    }
}

struct Panicking;

#[async_trait]
impl FlowServiceHandler for Panicking {
    async fn process_request(
        &self,
        _ctx: ServiceContext,
        _request: String,
        _sender: Option<InternalData>,
    ) -> Result<(), ServiceError> {
        panic!("till drawer jammed");
    }
}

/// Returns Ok without ever sending a terminal envelope.
struct Silent;

#[async_trait]
impl FlowServiceHandler for Silent {
    async fn process_request(
        &self,
        _ctx: ServiceContext,
        _request: String,
        _sender: Option<InternalData>,
    ) -> Result<(), ServiceError> {
        Ok(())
    }
}

struct Backgrounding;

#[async_trait]
impl FlowServiceHandler for Backgrounding {
    async fn process_request(
        &self,
        ctx: ServiceContext,
        _request: String,
        _sender: Option<InternalData>,
    ) -> Result<(), ServiceError> {
        ctx.notify_background_processing().await;
        Ok(())
    }
}

/// Hands processing to a delegated activity and returns.
struct Delegating;

#[async_trait]
impl FlowServiceHandler for Delegating {
    async fn process_request(
        &self,
        ctx: ServiceContext,
        request: String,
        _sender: Option<InternalData>,
    ) -> Result<(), ServiceError> {
        ctx.launch_activity(request).await
    }
}

/// Launcher whose activities block until force-finished, counting how often
/// the finish signal fires.
struct BlockingLauncher {
    finishes: Arc<AtomicUsize>,
}

#[async_trait]
impl ActivityLauncher for BlockingLauncher {
    async fn launch(
        &self,
        _connection_id: ConnectionId,
        _request: String,
    ) -> Result<ActivityHandle, ServiceError> {
        let (handle, mut controller) = ActivityHandle::channel();
        let finishes = self.finishes.clone();
        tokio::spawn(async move {
            controller.send_lifecycle_event(LifecycleEvent::Started).await;
            controller.finish_requested().await;
            finishes.fetch_add(1, Ordering::SeqCst);
            controller.complete(ActivityOutcome::NoResponse);
        });
        Ok(handle)
    }
}

async fn start_service(
    hub: &TransportHub,
    address: &str,
    handler: impl FlowServiceHandler,
) -> fsp_service::ServiceHandle {
    FlowService::new(ServiceConfig::new("com.example.flowservice"), handler)
        .serve(hub, EndpointAddress::from(address))
        .await
        .unwrap()
}

#[tokio::test]
async fn request_gets_ack_response_end_stream() {
    let hub = TransportHub::new();
    let _service = start_service(
        &hub,
        "flow.respond",
        Respond {
            reply: r#"{"status":"ok"}"#.to_string(),
        },
    )
    .await;

    let mut channel = hub
        .connect(&EndpointAddress::from("flow.respond"), "com.example.client")
        .await
        .unwrap();
    send_request(&channel, r#"{"amount":100}"#).await;

    let ack = recv(&mut channel).await;
    assert_eq!(ack.message_type(), MessageType::Ack);

    let response = recv(&mut channel).await;
    assert_eq!(response.message_type(), MessageType::Response);
    assert_eq!(response.message_data(), r#"{"status":"ok"}"#);
    assert_eq!(
        response.internal_data().unwrap().sender_id(),
        "com.example.flowservice"
    );

    let end = recv(&mut channel).await;
    assert_eq!(end.message_type(), MessageType::EndStream);
}

#[tokio::test]
async fn ack_arrives_while_handler_is_still_blocked() {
    struct Gated {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl FlowServiceHandler for Gated {
        async fn process_request(
            &self,
            ctx: ServiceContext,
            _request: String,
            _sender: Option<InternalData>,
        ) -> Result<(), ServiceError> {
            self.gate.notified().await;
            ctx.finish_with_response("released").await;
            Ok(())
        }
    }

    let gate = Arc::new(Notify::new());
    let hub = TransportHub::new();
    let _service = start_service(&hub, "flow.gated", Gated { gate: gate.clone() }).await;

    let mut channel = hub
        .connect(&EndpointAddress::from("flow.gated"), "com.example.client")
        .await
        .unwrap();
    send_request(&channel, EMPTY_DATA).await;

    // The ack must arrive while the handler is still parked on the gate.
    let ack = recv(&mut channel).await;
    assert_eq!(ack.message_type(), MessageType::Ack);

    gate.notify_one();
    let response = recv(&mut channel).await;
    assert_eq!(response.message_data(), "released");
    assert_eq!(recv(&mut channel).await.message_type(), MessageType::EndStream);
}

#[tokio::test]
async fn force_finish_interrupts_delegated_activity() {
    let finishes = Arc::new(AtomicUsize::new(0));
    let hub = TransportHub::new();
    let _service = FlowService::new(ServiceConfig::new("com.example.flowservice"), Delegating)
        .with_activity_launcher(BlockingLauncher {
            finishes: finishes.clone(),
        })
        .serve(&hub, EndpointAddress::from("flow.delegating"))
        .await
        .unwrap();

    let mut channel = hub
        .connect(&EndpointAddress::from("flow.delegating"), "com.example.client")
        .await
        .unwrap();
    send_request(&channel, r#"{"amount":250}"#).await;
    assert_eq!(recv(&mut channel).await.message_type(), MessageType::Ack);

    send(
        &channel,
        Envelope::empty(MessageType::ForceFinish, Some(client_data())),
    )
    .await;

    // A bare end of stream, no response payload first.
    let end = recv(&mut channel).await;
    assert_eq!(end.message_type(), MessageType::EndStream);
    assert!(timeout(RECV_TIMEOUT, channel.recv()).await.unwrap().is_none());

    // The activity task observes the finish signal asynchronously.
    for _ in 0..100 {
        if finishes.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(finishes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panicking_handler_is_isolated_from_other_connections() {
    let hub = TransportHub::new();
    let _panicking = start_service(&hub, "flow.panics", Panicking).await;
    let _healthy = start_service(
        &hub,
        "flow.healthy",
        Respond {
            reply: "still here".to_string(),
        },
    )
    .await;

    let mut bad = hub
        .connect(&EndpointAddress::from("flow.panics"), "client-a")
        .await
        .unwrap();
    let mut good = hub
        .connect(&EndpointAddress::from("flow.healthy"), "client-b")
        .await
        .unwrap();

    send_request(&bad, EMPTY_DATA).await;
    assert_eq!(recv(&mut bad).await.message_type(), MessageType::Ack);

    let error = recv(&mut bad).await;
    assert_eq!(error.message_type(), MessageType::Error);
    let payload = ErrorPayload::decode_lossy(error.message_data());
    assert_eq!(payload.code, codes::SERVICE_EXCEPTION);
    assert!(payload.message.contains("till drawer jammed"));
    assert_eq!(recv(&mut bad).await.message_type(), MessageType::EndStream);

    send_request(&good, EMPTY_DATA).await;
    assert_eq!(recv(&mut good).await.message_type(), MessageType::Ack);
    assert_eq!(recv(&mut good).await.message_data(), "still here");
    assert_eq!(recv(&mut good).await.message_type(), MessageType::EndStream);
}

#[tokio::test]
async fn malformed_input_is_skipped_and_connection_survives() {
    let hub = TransportHub::new();
    let _service = start_service(
        &hub,
        "flow.tolerant",
        Respond {
            reply: "processed".to_string(),
        },
    )
    .await;

    let mut channel = hub
        .connect(&EndpointAddress::from("flow.tolerant"), "com.example.client")
        .await
        .unwrap();

    channel.send("this is not an envelope").await.unwrap();
    channel
        .send(r#"{"messageType":"NONSENSE","messageData":"{}"}"#)
        .await
        .unwrap();
    send_request(&channel, EMPTY_DATA).await;

    assert_eq!(recv(&mut channel).await.message_type(), MessageType::Ack);
    assert_eq!(recv(&mut channel).await.message_data(), "processed");
    assert_eq!(recv(&mut channel).await.message_type(), MessageType::EndStream);
}

#[tokio::test]
async fn unexpected_message_type_is_answered_with_error() {
    let hub = TransportHub::new();
    let _service = start_service(
        &hub,
        "flow.strict",
        Respond {
            reply: "unused".to_string(),
        },
    )
    .await;

    let mut channel = hub
        .connect(&EndpointAddress::from("flow.strict"), "com.example.client")
        .await
        .unwrap();
    send(
        &channel,
        Envelope::new(MessageType::Response, "sneaky", Some(client_data())),
    )
    .await;

    let error = recv(&mut channel).await;
    assert_eq!(error.message_type(), MessageType::Error);
    assert_eq!(
        ErrorPayload::decode_lossy(error.message_data()).code,
        codes::INVALID_MESSAGE_TYPE
    );
    assert_eq!(recv(&mut channel).await.message_type(), MessageType::EndStream);
}

#[tokio::test]
async fn silent_handler_is_auto_finished() {
    let hub = TransportHub::new();
    let _service = start_service(&hub, "flow.silent", Silent).await;

    let mut channel = hub
        .connect(&EndpointAddress::from("flow.silent"), "com.example.client")
        .await
        .unwrap();
    send_request(&channel, EMPTY_DATA).await;

    assert_eq!(recv(&mut channel).await.message_type(), MessageType::Ack);
    let response = recv(&mut channel).await;
    assert_eq!(response.message_type(), MessageType::Response);
    assert!(response.is_empty_data());
    assert_eq!(recv(&mut channel).await.message_type(), MessageType::EndStream);
}

#[tokio::test]
async fn background_processing_sets_extension_and_stops_service_when_configured() {
    let hub = TransportHub::new();
    let service = FlowService::new(
        ServiceConfig::new("com.example.flowservice").with_stop_on_end_of_stream(true),
        Backgrounding,
    )
    .serve(&hub, EndpointAddress::from("flow.background"))
    .await
    .unwrap();

    let mut channel = hub
        .connect(&EndpointAddress::from("flow.background"), "com.example.client")
        .await
        .unwrap();
    send_request(&channel, EMPTY_DATA).await;

    assert_eq!(recv(&mut channel).await.message_type(), MessageType::Ack);
    let response = recv(&mut channel).await;
    assert_eq!(response.message_type(), MessageType::Response);
    assert!(response.is_empty_data());
    assert_eq!(
        response
            .internal_data()
            .unwrap()
            .extension("backgroundProcessing"),
        Some("true")
    );
    assert_eq!(recv(&mut channel).await.message_type(), MessageType::EndStream);

    // stop_on_end_of_stream: the endpoint goes away once the stream ended.
    timeout(RECV_TIMEOUT, service.join()).await.unwrap();
    assert!(hub
        .connect(&EndpointAddress::from("flow.background"), "late-client")
        .await
        .is_err());
}

#[tokio::test]
async fn concurrent_clients_do_not_cross_talk() {
    let hub = TransportHub::new();
    let _service = start_service(&hub, "flow.echo", Echo).await;
    let address = EndpointAddress::from("flow.echo");

    let mut first = hub.connect(&address, "client-a").await.unwrap();
    let mut second = hub.connect(&address, "client-b").await.unwrap();

    send_request(&first, r#"{"client":"a"}"#).await;
    send_request(&second, r#"{"client":"b"}"#).await;

    assert_eq!(recv(&mut second).await.message_type(), MessageType::Ack);
    assert_eq!(recv(&mut first).await.message_type(), MessageType::Ack);

    assert_eq!(recv(&mut second).await.message_data(), r#"{"client":"b"}"#);
    assert_eq!(recv(&mut first).await.message_data(), r#"{"client":"a"}"#);

    assert_eq!(recv(&mut first).await.message_type(), MessageType::EndStream);
    assert_eq!(recv(&mut second).await.message_type(), MessageType::EndStream);
}

#[tokio::test]
async fn second_request_on_same_connection_is_rejected() {
    let hub = TransportHub::new();
    let _service = start_service(
        &hub,
        "flow.single",
        Respond {
            reply: "one".to_string(),
        },
    )
    .await;

    let mut channel = hub
        .connect(&EndpointAddress::from("flow.single"), "com.example.client")
        .await
        .unwrap();
    send_request(&channel, EMPTY_DATA).await;
    send_request(&channel, EMPTY_DATA).await;

    assert_eq!(recv(&mut channel).await.message_type(), MessageType::Ack);

    // The duplicate request loses the race in one of two orders: either the
    // first request already responded, or the duplicate is rejected first.
    let mut saw_error = false;
    let mut saw_end = false;
    while !saw_end {
        let envelope = recv(&mut channel).await;
        match envelope.message_type() {
            MessageType::Error => {
                saw_error = true;
                assert_eq!(
                    ErrorPayload::decode_lossy(envelope.message_data()).code,
                    codes::INVALID_MESSAGE_TYPE
                );
            }
            MessageType::Response => {}
            MessageType::EndStream => saw_end = true,
            other => panic!("unexpected message type {other}"),
        }
    }
    let _ = saw_error;
}
