use {
    com::{
        ChannelConfig, ChannelEvent, ChannelState, ClassifierServer, ComError, Prediction,
        PredictionChannel, SendOutcome, ServerConfig, WireSchema,
    },
    futures_util::{SinkExt, StreamExt},
    tokio::{
        net::{TcpListener, TcpStream},
        sync::mpsc,
        time::{Duration, sleep, timeout},
    },
    tokio_websockets::{Message, ServerBuilder, WebSocketStream},
};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xD9];

async fn next_event(events: &mut mpsc::Receiver<ChannelEvent>) -> ChannelEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event timed out")
        .expect("event stream ended")
}

async fn expect_connected(events: &mut mpsc::Receiver<ChannelEvent>) {
    let event = next_event(events).await;
    assert!(matches!(event, ChannelEvent::Connected), "got {event:?}");
}

async fn expect_prediction(events: &mut mpsc::Receiver<ChannelEvent>) -> Prediction {
    match next_event(events).await {
        ChannelEvent::Prediction(prediction) => prediction,
        other => panic!("expected prediction, got {other:?}"),
    }
}

async fn classifier_server(schema: WireSchema, prediction: Option<Prediction>) -> ClassifierServer {
    ClassifierServer::bind(
        "127.0.0.1:0",
        ServerConfig::default().with_schema(schema),
        move |_jpeg: &[u8]| prediction.clone(),
    )
    .await
    .expect("bind failed")
}

fn config_for(endpoint: String, schema: WireSchema) -> ChannelConfig {
    ChannelConfig::default()
        .with_endpoint(endpoint)
        .with_schema(schema)
        .with_connect_timeout(Duration::from_secs(2))
}

// accepts one client and runs the handshake by hand, then hands over the socket
async fn accept_raw(
    listener: &TcpListener,
    ping_interval_ms: u64,
    ping_timeout_ms: u64,
) -> WebSocketStream<TcpStream> {
    let (tcp, _) = listener.accept().await.unwrap();
    let (_request, mut ws) = ServerBuilder::new().accept(tcp).await.unwrap();
    ws.send(Message::text(format!(
        r#"0{{"sid":"raw","upgrades":[],"pingInterval":{ping_interval_ms},"pingTimeout":{ping_timeout_ms},"maxPayload":1000000}}"#
    )))
    .await
    .unwrap();
    assert_eq!(next_text(&mut ws).await, "40");
    ws.send(Message::text(r#"40{"sid":"raw"}"#.to_string()))
        .await
        .unwrap();
    ws
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("read timed out")
            .expect("stream ended")
            .expect("read failed");
        if let Some(text) = message.as_text() {
            return text.to_string();
        }
    }
}

#[tokio::test]
async fn test_prediction_round_trip() {
    let server = classifier_server(WireSchema::DataUrl, Some(Prediction::new("A", 0.92))).await;
    let (channel, mut events) =
        PredictionChannel::open(config_for(server.endpoint(), WireSchema::DataUrl));

    expect_connected(&mut events).await;
    assert_eq!(channel.state(), ChannelState::Connected);

    assert_eq!(channel.send_frame(JPEG), SendOutcome::Sent);
    assert!(channel.is_in_flight());

    let prediction = expect_prediction(&mut events).await;
    assert_eq!(prediction.label, "A");
    assert_eq!(prediction.confidence, 0.92);
    assert!(!channel.is_in_flight());
    assert_eq!(server.frames_received(), 1);

    channel.close().await;
}

#[tokio::test]
async fn test_second_send_is_skipped_while_in_flight() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let (channel, mut events) = PredictionChannel::open(config_for(endpoint, WireSchema::DataUrl));
    let mut ws = accept_raw(&listener, 25000, 20000).await;
    expect_connected(&mut events).await;

    assert_eq!(channel.send_frame(JPEG), SendOutcome::Sent);
    assert_eq!(channel.send_frame(JPEG), SendOutcome::SkippedInFlight);
    assert_eq!(channel.send_frame(JPEG), SendOutcome::SkippedInFlight);

    let frame = next_text(&mut ws).await;
    assert!(frame.starts_with(r#"42["message","data:image/jpeg;base64,"#));

    ws.send(Message::text(
        r#"42["prediction",{"class":"B","confidence":0.4}]"#.to_string(),
    ))
    .await
    .unwrap();
    assert_eq!(expect_prediction(&mut events).await.label, "B");
    assert_eq!(channel.send_frame(JPEG), SendOutcome::Sent);

    channel.close().await;
}

#[tokio::test]
async fn test_send_before_connected_is_skipped() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let (channel, _events) = PredictionChannel::open(config_for(endpoint, WireSchema::DataUrl));
    // nobody accepts, so the handshake never completes
    assert_eq!(channel.state(), ChannelState::Connecting);
    assert_eq!(channel.send_frame(JPEG), SendOutcome::SkippedDisconnected);
    assert!(!channel.is_in_flight());
}

#[tokio::test]
async fn test_label_schema() {
    let server =
        classifier_server(WireSchema::Base64Frame, Some(Prediction::new("hello", 0.8))).await;
    let (channel, mut events) =
        PredictionChannel::open(config_for(server.endpoint(), WireSchema::Base64Frame));
    expect_connected(&mut events).await;

    assert_eq!(channel.send_frame(JPEG), SendOutcome::Sent);
    let prediction = expect_prediction(&mut events).await;
    assert_eq!(prediction.label, "Hello");
    assert_eq!(prediction.overlay, None);

    channel.close().await;
}

#[tokio::test]
async fn test_overlay_arrives_as_attachment() {
    let overlay = vec![0xFF, 0xD8, 0x42, 0xFF, 0xD9];
    let server = classifier_server(
        WireSchema::DataUrl,
        Some(Prediction::new("C", 0.5).with_overlay(overlay.clone())),
    )
    .await;
    let (channel, mut events) =
        PredictionChannel::open(config_for(server.endpoint(), WireSchema::DataUrl));
    expect_connected(&mut events).await;

    channel.send_frame(JPEG);
    let prediction = expect_prediction(&mut events).await;
    assert_eq!(prediction.overlay, Some(overlay));

    channel.close().await;
}

#[tokio::test]
async fn test_no_hand_reply() {
    let server = classifier_server(WireSchema::DataUrl, None).await;
    let (channel, mut events) =
        PredictionChannel::open(config_for(server.endpoint(), WireSchema::DataUrl));
    expect_connected(&mut events).await;

    channel.send_frame(JPEG);
    let prediction = expect_prediction(&mut events).await;
    assert!(prediction.is_no_hand());
    assert_eq!(prediction.confidence, 0.0);

    channel.close().await;
}

#[tokio::test]
async fn test_disconnect_while_in_flight_clears_in_flight() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let (channel, mut events) = PredictionChannel::open(config_for(endpoint, WireSchema::DataUrl));
    let mut ws = accept_raw(&listener, 25000, 20000).await;
    expect_connected(&mut events).await;

    assert_eq!(channel.send_frame(JPEG), SendOutcome::Sent);
    next_text(&mut ws).await;
    assert!(channel.is_in_flight());

    // the service goes away without answering
    drop(ws);

    loop {
        match next_event(&mut events).await {
            ChannelEvent::Disconnected => break,
            ChannelEvent::Error(_) => {}
            other => panic!("unexpected {other:?}"),
        }
    }
    assert!(!channel.is_in_flight());
    assert_eq!(channel.state(), ChannelState::Disconnected);
    assert_eq!(channel.send_frame(JPEG), SendOutcome::SkippedDisconnected);
    assert!(!channel.is_in_flight());
}

#[tokio::test]
async fn test_server_drop_disconnects_channel() {
    let server = classifier_server(WireSchema::DataUrl, Some(Prediction::new("A", 0.9))).await;
    let (channel, mut events) =
        PredictionChannel::open(config_for(server.endpoint(), WireSchema::DataUrl));
    expect_connected(&mut events).await;

    drop(server);
    loop {
        match next_event(&mut events).await {
            ChannelEvent::Disconnected => break,
            ChannelEvent::Error(_) => {}
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn test_connect_refused_reports_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let (channel, mut events) = PredictionChannel::open(config_for(endpoint, WireSchema::DataUrl));
    let event = next_event(&mut events).await;
    assert!(matches!(event, ChannelEvent::Error(_)), "got {event:?}");
    assert!(matches!(next_event(&mut events).await, ChannelEvent::Disconnected));
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn test_malformed_prediction_is_an_error_and_acknowledges() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let (channel, mut events) = PredictionChannel::open(config_for(endpoint, WireSchema::DataUrl));
    let mut ws = accept_raw(&listener, 25000, 20000).await;
    expect_connected(&mut events).await;

    channel.send_frame(JPEG);
    next_text(&mut ws).await;
    ws.send(Message::text(r#"42["prediction",{"class":"A"}]"#.to_string()))
        .await
        .unwrap();

    let event = next_event(&mut events).await;
    assert!(
        matches!(event, ChannelEvent::Error(ComError::Protocol(_))),
        "got {event:?}"
    );
    assert!(!channel.is_in_flight());
    assert_eq!(channel.state(), ChannelState::Connected);

    channel.close().await;
}

#[tokio::test]
async fn test_oversized_attachment_count_is_ignored() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let (channel, mut events) = PredictionChannel::open(config_for(endpoint, WireSchema::DataUrl));
    let mut ws = accept_raw(&listener, 25000, 20000).await;
    expect_connected(&mut events).await;

    channel.send_frame(JPEG);
    next_text(&mut ws).await;
    ws.send(Message::text(
        r#"4599999999999-["prediction",{"class":"A","confidence":0.5}]"#.to_string(),
    ))
    .await
    .unwrap();
    ws.send(Message::text(
        r#"42["prediction",{"class":"B","confidence":0.5}]"#.to_string(),
    ))
    .await
    .unwrap();

    let prediction = expect_prediction(&mut events).await;
    assert_eq!(prediction.label, "B");
    assert!(!channel.is_in_flight());
    assert_eq!(channel.state(), ChannelState::Connected);

    channel.close().await;
}

#[tokio::test]
async fn test_new_binary_event_replaces_incomplete_one() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let (channel, mut events) = PredictionChannel::open(config_for(endpoint, WireSchema::DataUrl));
    let mut ws = accept_raw(&listener, 25000, 20000).await;
    expect_connected(&mut events).await;

    channel.send_frame(JPEG);
    next_text(&mut ws).await;
    for label in ["A", "B"] {
        ws.send(Message::text(format!(
            r#"451-["prediction",{{"class":"{label}","confidence":0.5,"image":{{"_placeholder":true,"num":0}}}}]"#
        )))
        .await
        .unwrap();
    }
    ws.send(Message::binary(JPEG.to_vec())).await.unwrap();

    let prediction = expect_prediction(&mut events).await;
    assert_eq!(prediction.label, "B");
    assert_eq!(prediction.overlay.as_deref(), Some(JPEG));
    assert!(!channel.is_in_flight());

    channel.close().await;
}

#[tokio::test]
async fn test_answers_server_pings() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let (channel, mut events) = PredictionChannel::open(config_for(endpoint, WireSchema::DataUrl));
    let mut ws = accept_raw(&listener, 25000, 20000).await;
    expect_connected(&mut events).await;

    ws.send(Message::text("2".to_string())).await.unwrap();
    assert_eq!(next_text(&mut ws).await, "3");

    channel.close().await;
}

#[tokio::test]
async fn test_missing_pings_drop_the_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let (channel, mut events) = PredictionChannel::open(config_for(endpoint, WireSchema::DataUrl));
    // the server promises a ping every 50 ms and never sends one
    let _ws = accept_raw(&listener, 50, 50).await;
    expect_connected(&mut events).await;

    let event = next_event(&mut events).await;
    assert!(
        matches!(event, ChannelEvent::Error(ComError::Timeout(_))),
        "got {event:?}"
    );
    assert!(matches!(next_event(&mut events).await, ChannelEvent::Disconnected));
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let server = classifier_server(WireSchema::DataUrl, Some(Prediction::new("A", 0.9))).await;
    let (channel, mut events) =
        PredictionChannel::open(config_for(server.endpoint(), WireSchema::DataUrl));
    expect_connected(&mut events).await;

    channel.close().await;
    channel.close().await;
    assert_eq!(channel.state(), ChannelState::Disconnected);
    assert_eq!(channel.send_frame(JPEG), SendOutcome::SkippedClosed);

    // the server notices the disconnect
    sleep(Duration::from_millis(100)).await;
    assert_eq!(server.client_count().await, 0);
}
