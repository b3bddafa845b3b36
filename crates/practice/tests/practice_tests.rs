use {
    base::Vec2,
    com::{ClassifierServer, ServerConfig},
    futures_util::{SinkExt, StreamExt},
    image::{Image, PixelFormat, decode_to_rgb, rgb_to_jpeg},
    practice::{
        ChannelState, LetterboxPolicy, PacingState, Practice, PracticeConfig, Prediction,
        WireSchema, decode_overlay,
    },
    std::sync::Arc,
    tokio::{
        net::{TcpListener, TcpStream},
        sync::broadcast::{self, error::TryRecvError},
        time::{Duration, sleep, timeout},
    },
    tokio_websockets::{Message, ServerBuilder, WebSocketStream},
    video::StillSource,
};

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

async fn next_prediction(predictions: &mut broadcast::Receiver<Prediction>) -> Prediction {
    timeout(Duration::from_secs(5), predictions.recv())
        .await
        .expect("prediction timed out")
        .expect("prediction stream closed")
}

fn camera_frame(size: Vec2<usize>) -> Image {
    Image::new(size, vec![200; size.area() * 3], PixelFormat::Rgb8)
}

async fn fixed_server(schema: WireSchema, prediction: Prediction) -> ClassifierServer {
    ClassifierServer::bind(
        "127.0.0.1:0",
        ServerConfig::default().with_schema(schema),
        move |_jpeg: &[u8]| Some(prediction.clone()),
    )
    .await
    .expect("bind failed")
}

fn letters(endpoint: String, frame_delay_ms: u64) -> PracticeConfig {
    PracticeConfig::letters()
        .with_endpoint(endpoint)
        .with_frame_delay(Duration::from_millis(frame_delay_ms))
        .with_not_ready_delay(Duration::from_millis(20))
}

// one Socket.IO client whose frames are never answered
async fn accept_silent(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (tcp, _) = listener.accept().await.unwrap();
    let (_request, mut ws) = ServerBuilder::new().accept(tcp).await.unwrap();
    ws.send(Message::text(
        r#"0{"sid":"silent","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#
            .to_string(),
    ))
    .await
    .unwrap();
    assert_eq!(next_text(&mut ws).await, "40");
    ws.send(Message::text(r#"40{"sid":"silent"}"#.to_string()))
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

#[tokio::test(flavor = "multi_thread")]
async fn test_prediction_reaches_subscriber_once_then_paces() {
    let server = fixed_server(WireSchema::DataUrl, Prediction::new("A", 0.92)).await;
    let source = StillSource::new(camera_frame(Vec2::new(640, 480)));
    let mut practice = Practice::new(source, letters(server.endpoint(), 400));
    let mut predictions = practice.subscribe();

    practice.start();
    assert!(practice.is_practicing());

    let prediction = next_prediction(&mut predictions).await;
    assert_eq!(prediction.label, "A");
    assert_eq!(prediction.confidence, 0.92);

    wait_until(|| practice.pacing() == PacingState::AwaitingCapture).await;
    assert_eq!(practice.latest(), Some(prediction));
    assert_eq!(practice.status(), ChannelState::Connected);
    // the next frame waits for the frame delay
    assert!(matches!(predictions.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(server.frames_received(), 1);

    let second = next_prediction(&mut predictions).await;
    assert_eq!(second.label, "A");
    assert_eq!(server.frames_received(), 2);

    practice.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_frames_arrive_letterboxed() {
    let server = ClassifierServer::bind(
        "127.0.0.1:0",
        ServerConfig::default(),
        |jpeg: &[u8]| {
            let image = decode_to_rgb(jpeg).ok()?;
            Some(Prediction::new(image.size.to_string(), 1.0))
        },
    )
    .await
    .unwrap();
    let source = StillSource::new(camera_frame(Vec2::new(1280, 720)));
    let mut practice = Practice::new(source, letters(server.endpoint(), 50));
    let mut predictions = practice.subscribe();
    practice.start();

    assert_eq!(next_prediction(&mut predictions).await.label, "640x480");
    practice.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_words_preset_round_trip() {
    let server = fixed_server(WireSchema::Base64Frame, Prediction::new("thank you", 0.66)).await;
    let source = StillSource::new(camera_frame(Vec2::new(320, 240)));
    let config = PracticeConfig::words().with_endpoint(server.endpoint());
    assert_eq!(config.letterbox(), LetterboxPolicy::Native);
    let mut practice = Practice::new(source, config);
    let mut predictions = practice.subscribe();
    practice.start();

    let prediction = next_prediction(&mut predictions).await;
    assert_eq!(prediction.label, "Thank you");
    assert!(prediction.overlay.is_none());
    practice.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_not_ready_source_delays_first_frame() {
    let server = fixed_server(WireSchema::DataUrl, Prediction::new("B", 0.5)).await;
    let source = Arc::new(StillSource::empty());
    let mut practice =
        Practice::with_shared_source(Arc::clone(&source), letters(server.endpoint(), 100));
    let mut predictions = practice.subscribe();
    practice.start();

    wait_until(|| practice.status() == ChannelState::Connected).await;
    sleep(Duration::from_millis(150)).await;
    assert_eq!(server.frames_received(), 0);
    assert_eq!(practice.pacing(), PacingState::AwaitingCapture);
    assert!(!practice.is_in_flight());

    source.set(camera_frame(Vec2::new(640, 480)));
    assert_eq!(next_prediction(&mut predictions).await.label, "B");
    practice.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_is_idempotent_and_halts_frames() {
    let server = fixed_server(WireSchema::DataUrl, Prediction::new("C", 0.7)).await;
    let source = StillSource::new(camera_frame(Vec2::new(640, 480)));
    let mut practice = Practice::new(source, letters(server.endpoint(), 20));
    let mut predictions = practice.subscribe();
    let mut practicing = practice.practicing();
    practice.start();
    next_prediction(&mut predictions).await;

    practice.stop().await;
    practice.stop().await;
    assert!(!practice.is_practicing());
    assert!(!*practicing.borrow_and_update());
    assert_eq!(practice.status(), ChannelState::Disconnected);
    assert_eq!(practice.pacing(), PacingState::Idle);

    let frames = server.frames_received();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(server.frames_received(), frames);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_drop_without_stop_closes_the_channel() {
    let server = fixed_server(WireSchema::DataUrl, Prediction::new("G", 0.8)).await;
    let source = StillSource::new(camera_frame(Vec2::new(640, 480)));
    let mut practice = Practice::new(source, letters(server.endpoint(), 20));
    let mut predictions = practice.subscribe();
    practice.start();
    next_prediction(&mut predictions).await;
    assert_eq!(server.client_count().await, 1);

    drop(practice);
    timeout(Duration::from_secs(5), async {
        while server.client_count().await > 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("client still connected after drop");

    let frames = server.frames_received();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(server.frames_received(), frames);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_before_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let source = StillSource::new(camera_frame(Vec2::new(64, 48)));
    let mut practice = Practice::new(source, letters(endpoint, 20));
    practice.start();
    assert_eq!(practice.status(), ChannelState::Connecting);
    practice.stop().await;
    assert_eq!(practice.status(), ChannelState::Disconnected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_disconnect_in_flight_halts_until_restart() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let source = StillSource::new(camera_frame(Vec2::new(640, 480)));
    let mut practice = Practice::new(source, letters(endpoint, 20));
    practice.start();

    let mut ws = accept_silent(&listener).await;
    let frame = next_text(&mut ws).await;
    assert!(frame.starts_with(r#"42["message","data:image/jpeg;base64,"#));
    wait_until(|| practice.is_in_flight()).await;
    assert_eq!(practice.pacing(), PacingState::AwaitingPrediction);

    drop(ws);
    wait_until(|| practice.status() == ChannelState::Disconnected).await;
    wait_until(|| practice.pacing() == PacingState::Idle).await;
    assert!(!practice.is_in_flight());
    // still toggled on, but nothing is sent until start()
    assert!(practice.is_practicing());

    practice.start();
    let mut ws = accept_silent(&listener).await;
    let frame = next_text(&mut ws).await;
    assert!(frame.starts_with(r#"42["message","#));

    practice.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_while_running_keeps_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let source = StillSource::new(camera_frame(Vec2::new(64, 48)));
    let mut practice = Practice::new(source, letters(endpoint, 20));
    practice.start();
    let mut ws = accept_silent(&listener).await;
    next_text(&mut ws).await;

    practice.start();
    // a second session would connect again
    assert!(
        timeout(Duration::from_millis(200), listener.accept())
            .await
            .is_err()
    );
    practice.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_toggle() {
    let server = fixed_server(WireSchema::DataUrl, Prediction::new("D", 0.4)).await;
    let source = StillSource::new(camera_frame(Vec2::new(64, 48)));
    let mut practice = Practice::new(source, letters(server.endpoint(), 20));

    practice.toggle().await;
    assert!(practice.is_practicing());
    practice.toggle().await;
    assert!(!practice.is_practicing());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_overlay_decodes_to_image() {
    let size = Vec2::new(32, 24);
    let overlay = rgb_to_jpeg(size, &vec![90; size.area() * 3], 90).unwrap();
    let server = fixed_server(
        WireSchema::DataUrl,
        Prediction::new("E", 0.9).with_overlay(overlay),
    )
    .await;
    let source = StillSource::new(camera_frame(Vec2::new(64, 48)));
    let mut practice = Practice::new(source, letters(server.endpoint(), 20));
    let mut predictions = practice.subscribe();
    practice.start();

    let prediction = next_prediction(&mut predictions).await;
    let image = decode_overlay(&prediction).unwrap().expect("overlay missing");
    assert_eq!(image.size, size);
    assert_eq!(decode_overlay(&Prediction::new("F", 0.1)).unwrap(), None);
    practice.stop().await;
}
