use {
    crate::{FrameEncoder, Pacer, PacingAction, PacingState},
    base::Epoch,
    com::{ChannelConfig, ChannelEvent, ChannelState, Prediction, PredictionChannel, SendOutcome},
    std::{sync::Arc, time::Duration},
    tokio::{
        sync::{broadcast, mpsc, watch},
        task::{JoinHandle, spawn_blocking},
        time::{Instant, sleep},
    },
    video::{FrameSource, VideoError},
};

/// Where a session reports its predictions.
#[derive(Clone)]
pub(crate) struct Outputs {
    pub predictions: broadcast::Sender<Prediction>,
    pub latest: Arc<watch::Sender<Option<Prediction>>>,
}

/// One practice session: a channel plus the task that paces frames over it.
///
/// Dropping the session aborts the driver and the channel.
pub(crate) struct Session {
    channel: Arc<PredictionChannel>,
    driver: Option<JoinHandle<()>>,
    pacing: watch::Receiver<PacingState>,
}

impl Session {
    pub fn start<S: FrameSource>(
        source: Arc<S>,
        encoder: FrameEncoder,
        channel_config: ChannelConfig,
        pacer: Pacer,
        epoch: Epoch,
        outputs: Outputs,
    ) -> Self {
        let generation = epoch.current();
        let (channel, events) = PredictionChannel::open(channel_config);
        let channel = Arc::new(channel);
        let (pacing_tx, pacing) = watch::channel(pacer.state());

        let driver = Driver {
            source,
            encoder,
            channel: Arc::clone(&channel),
            pacer,
            pacing: pacing_tx,
            epoch,
            generation,
            outputs,
        };
        let driver = tokio::spawn(driver.run(events));

        Self {
            channel,
            driver: Some(driver),
            pacing,
        }
    }

    /// Whether the driver still runs. False once the channel dropped.
    pub fn is_running(&self) -> bool {
        self.driver.as_ref().is_some_and(|driver| !driver.is_finished())
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn pacing(&self) -> PacingState {
        if self.is_running() {
            *self.pacing.borrow()
        } else {
            PacingState::Idle
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.channel.is_in_flight()
    }

    /// Stop pacing and close the channel. The caller advances the epoch
    /// first so a driver caught mid-encode does not send.
    pub async fn stop(mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.channel.close().await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

struct Driver<S> {
    source: Arc<S>,
    encoder: FrameEncoder,
    channel: Arc<PredictionChannel>,
    pacer: Pacer,
    pacing: watch::Sender<PacingState>,
    epoch: Epoch,
    generation: u64,
    outputs: Outputs,
}

impl<S: FrameSource> Driver<S> {
    async fn run(mut self, mut events: mpsc::Receiver<ChannelEvent>) {
        let timer = sleep(Duration::ZERO);
        tokio::pin!(timer);
        let mut armed = false;

        loop {
            let action = tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(ChannelEvent::Connected) => self.pacer.on_connected(),
                        Some(ChannelEvent::Prediction(prediction)) => {
                            if !self.is_current() {
                                return;
                            }
                            log::debug!("prediction {} ({:.2})", prediction.label, prediction.confidence);
                            self.outputs.latest.send_replace(Some(prediction.clone()));
                            let _ = self.outputs.predictions.send(prediction);
                            self.pacer.on_acknowledged()
                        }
                        Some(ChannelEvent::Error(error)) => {
                            log::warn!("channel error: {}", error);
                            self.pacer.on_acknowledged()
                        }
                        Some(ChannelEvent::Disconnected) | None => {
                            self.pacer.on_disconnected();
                            self.publish();
                            log::info!("session halted: channel disconnected");
                            return;
                        }
                    }
                }
                () = &mut timer, if armed => {
                    armed = false;
                    self.capture_and_send().await
                }
            };

            if !self.is_current() {
                return;
            }
            self.publish();

            match action {
                PacingAction::Wait => {}
                PacingAction::CaptureNow => {
                    timer.as_mut().reset(Instant::now());
                    armed = true;
                }
                PacingAction::CaptureAfter(delay) => {
                    timer.as_mut().reset(Instant::now() + delay);
                    armed = true;
                }
            }
        }
    }

    fn is_current(&self) -> bool {
        self.epoch.is_current(self.generation)
    }

    fn publish(&self) {
        self.pacing.send_replace(self.pacer.state());
    }

    async fn capture_and_send(&mut self) -> PacingAction {
        if !self.pacer.may_send() {
            return PacingAction::Wait;
        }

        let frame = match self.source.capture_frame() {
            Ok(frame) => frame,
            Err(VideoError::NotReady) => {
                log::debug!("video not ready, retrying");
                return self.pacer.on_not_ready();
            }
            Err(error) => {
                log::warn!("capture failed: {}", error);
                return self.pacer.on_capture_failed();
            }
        };

        let encoder = self.encoder.clone();
        let encoded = spawn_blocking(move || encoder.encode(&frame.color)).await;
        // the session may have ended while encoding
        if !self.is_current() {
            return PacingAction::Wait;
        }
        let encoded = match encoded {
            Ok(Ok(encoded)) => encoded,
            Ok(Err(error)) => {
                log::warn!("encode failed: {}", error);
                return self.pacer.on_capture_failed();
            }
            Err(error) => {
                log::warn!("encode task failed: {}", error);
                return self.pacer.on_capture_failed();
            }
        };

        match self.channel.send_frame(&encoded.jpeg) {
            SendOutcome::Sent => self.pacer.on_sent(),
            outcome => {
                log::debug!("frame not sent: {:?}", outcome);
                self.pacer.on_send_skipped()
            }
        }
    }
}
