use {
    crate::{
        FrameEncoder, Pacer, PacingState, PracticeConfig, PracticeError,
        session::{Outputs, Session},
    },
    base::Epoch,
    com::{ChannelState, Prediction},
    image::{Image, decode_to_rgb},
    std::sync::Arc,
    tokio::sync::{broadcast, watch},
    video::FrameSource,
};

const PREDICTION_CAPACITY: usize = 64;

/// The live practice surface.
///
/// `start` opens a session that streams frames from `source` to the
/// classification service and publishes every prediction to subscribers.
/// `stop` ends the session. Only one session exists at a time.
pub struct Practice<S: FrameSource> {
    source: Arc<S>,
    config: PracticeConfig,
    encoder: FrameEncoder,
    epoch: Epoch,
    session: Option<Session>,
    practicing: watch::Sender<bool>,
    outputs: Outputs,
}

impl<S: FrameSource> Practice<S> {
    pub fn new(source: S, config: PracticeConfig) -> Self {
        Self::with_shared_source(Arc::new(source), config)
    }

    pub fn with_shared_source(source: Arc<S>, config: PracticeConfig) -> Self {
        let (predictions, _) = broadcast::channel(PREDICTION_CAPACITY);
        let (latest, _) = watch::channel(None);
        let (practicing, _) = watch::channel(false);
        Self {
            source,
            encoder: FrameEncoder::from_config(&config),
            config,
            epoch: Epoch::new(),
            session: None,
            practicing,
            outputs: Outputs {
                predictions,
                latest: Arc::new(latest),
            },
        }
    }

    pub fn config(&self) -> &PracticeConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Begin practicing. Does nothing while a session is running; a session
    /// halted by a dropped channel is replaced with a fresh one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.session.as_ref().is_some_and(Session::is_running) {
            return;
        }
        // dropping a halted session releases its socket
        self.session.take();

        self.epoch.advance();
        log::info!("practice started ({})", self.config.channel().url());
        self.session = Some(Session::start(
            Arc::clone(&self.source),
            self.encoder.clone(),
            self.config.channel().clone(),
            Pacer::new(self.config.frame_delay(), self.config.not_ready_delay()),
            self.epoch.clone(),
            self.outputs.clone(),
        ));
        self.practicing.send_replace(true);
    }

    /// End practicing and close the channel. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        self.epoch.advance();
        self.practicing.send_replace(false);
        if let Some(session) = self.session.take() {
            session.stop().await;
            log::info!("practice stopped");
        }
    }

    pub async fn toggle(&mut self) {
        if self.is_practicing() {
            self.stop().await;
        } else {
            self.start();
        }
    }

    pub fn is_practicing(&self) -> bool {
        *self.practicing.borrow()
    }

    /// Watch the practicing flag.
    pub fn practicing(&self) -> watch::Receiver<bool> {
        self.practicing.subscribe()
    }

    /// Receive every prediction, in send order.
    pub fn subscribe(&self) -> broadcast::Receiver<Prediction> {
        self.outputs.predictions.subscribe()
    }

    pub fn latest(&self) -> Option<Prediction> {
        self.outputs.latest.borrow().clone()
    }

    /// Connectivity of the current session.
    pub fn status(&self) -> ChannelState {
        self.session
            .as_ref()
            .map(Session::channel_state)
            .unwrap_or(ChannelState::Disconnected)
    }

    pub fn pacing(&self) -> PacingState {
        self.session
            .as_ref()
            .map(Session::pacing)
            .unwrap_or(PacingState::Idle)
    }

    /// Whether a frame is sent and not yet answered.
    pub fn is_in_flight(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_in_flight)
    }
}

impl<S: FrameSource> Drop for Practice<S> {
    fn drop(&mut self) {
        self.epoch.advance();
    }
}

/// Decode the overlay image returned with a prediction, if any.
pub fn decode_overlay(prediction: &Prediction) -> Result<Option<Image>, PracticeError> {
    match &prediction.overlay {
        Some(jpeg) => Ok(Some(decode_to_rgb(jpeg)?)),
        None => Ok(None),
    }
}
