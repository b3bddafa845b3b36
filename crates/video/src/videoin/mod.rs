use {
    crate::*,
    base::Vec2,
    std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::Instant,
    },
    tokio::{
        sync::{oneshot, watch},
        task::{JoinHandle, spawn_blocking},
    },
};

mod synthetic;
pub use synthetic::SyntheticConfig;

#[cfg(feature = "v4l2")]
pub mod v4l2;

// delay before reopening the device after a capture failure
const WAIT_BEFORE_RECONNECT_MS: u64 = 100;

#[derive(Debug, Clone)]
pub enum VideoInConfig {
    Synthetic(SyntheticConfig),
    #[cfg(feature = "v4l2")]
    V4l2(v4l2::V4l2Config),
}

impl VideoInConfig {
    /// Platform default: the first V4L2 camera when built with `v4l2`,
    /// otherwise the synthetic test pattern.
    pub fn platform_default() -> Self {
        #[cfg(feature = "v4l2")]
        {
            VideoInConfig::V4l2(v4l2::V4l2Config::default())
        }
        #[cfg(not(feature = "v4l2"))]
        {
            VideoInConfig::Synthetic(SyntheticConfig::default())
        }
    }
}

pub(crate) trait VideoInDevice: Send {
    fn open(&mut self, config: &VideoInConfig) -> Result<VideoInConfig, VideoError>; // open the device, return config that was actually set
    fn close(&mut self); // close the device, if open
    fn blocking_capture(&mut self) -> Result<image::Image, VideoError>; // capture a frame
}

/// A live camera.
///
/// The device is owned by a blocking worker that keeps publishing its newest
/// frame. `capture_frame` returns a copy of that frame, or
/// `VideoError::NotReady` while the device is still warming up.
pub struct VideoIn {
    latest: watch::Receiver<Option<VideoFrame>>,
    cancel: Arc<AtomicBool>,
    config: VideoInConfig,
    join_handle: Option<JoinHandle<()>>,
}

impl VideoIn {
    fn create_device(config: &VideoInConfig) -> Box<dyn VideoInDevice> {
        match config {
            VideoInConfig::Synthetic(_) => Box::new(synthetic::Synthetic::new()),
            #[cfg(feature = "v4l2")]
            VideoInConfig::V4l2(_) => Box::new(v4l2::V4l2::new()),
        }
    }

    async fn spawn_worker(
        latest: watch::Sender<Option<VideoFrame>>,
        config: VideoInConfig,
        cancel: Arc<AtomicBool>,
    ) -> Result<(JoinHandle<()>, VideoInConfig), VideoError> {
        let mut device = Self::create_device(&config);

        // device.open() runs on the worker thread because some backends
        // need open and capture on the same OS thread
        let (init_tx, init_rx) = oneshot::channel::<Result<VideoInConfig, VideoError>>();

        let join_handle = spawn_blocking(move || {
            let mut config = match device.open(&config) {
                Ok(config) => {
                    let _ = init_tx.send(Ok(config.clone()));
                    config
                }
                Err(e) => {
                    let _ = init_tx.send(Err(e));
                    return;
                }
            };

            let mut sequence = 0u64;
            while !cancel.load(Ordering::Relaxed) {
                log::info!("video worker: starting capture loop");
                while !cancel.load(Ordering::Relaxed) {
                    match device.blocking_capture() {
                        Ok(color) => {
                            latest.send_replace(Some(VideoFrame {
                                color,
                                sequence,
                                captured_at: Instant::now(),
                            }));
                            sequence += 1;
                            if latest.is_closed() {
                                // every VideoIn handle is gone
                                device.close();
                                return;
                            }
                        }
                        Err(e) => {
                            log::error!("video worker: capture failed: {}", e);
                            break;
                        }
                    }
                }

                // close, wait, and reopen the device
                while !cancel.load(Ordering::Relaxed) {
                    log::info!("video worker: reconnecting...");
                    device.close();
                    std::thread::sleep(std::time::Duration::from_millis(
                        WAIT_BEFORE_RECONNECT_MS,
                    ));
                    if let Ok(new_config) = device.open(&config) {
                        config = new_config;
                        break;
                    }
                }
            }
            device.close();
        });

        let config = init_rx
            .await
            .map_err(|_| VideoError::Device("worker thread died during init".to_string()))??;

        Ok((join_handle, config))
    }

    /// Open a video input. `None` picks `VideoInConfig::platform_default()`.
    pub async fn open(config: Option<VideoInConfig>) -> Result<Self, VideoError> {
        let config = config.unwrap_or_else(VideoInConfig::platform_default);
        let (sender, latest) = watch::channel::<Option<VideoFrame>>(None);
        let cancel = Arc::new(AtomicBool::new(false));

        let (join_handle, config) = Self::spawn_worker(sender, config, Arc::clone(&cancel)).await?;
        log::info!("video input open: {:?}", config);

        Ok(Self {
            latest,
            cancel,
            config,
            join_handle: Some(join_handle),
        })
    }

    /// The configuration the device actually accepted.
    pub fn config(&self) -> &VideoInConfig {
        &self.config
    }

    pub fn size(&self) -> Vec2<usize> {
        match &self.config {
            VideoInConfig::Synthetic(config) => config.size(),
            #[cfg(feature = "v4l2")]
            VideoInConfig::V4l2(config) => config.size.unwrap_or_default(),
        }
    }

    /// Whether the first frame has arrived.
    pub fn is_ready(&self) -> bool {
        self.latest.borrow().is_some()
    }

    /// Wait for the first frame.
    pub async fn wait_ready(&self) -> Result<(), VideoError> {
        let mut latest = self.latest.clone();
        latest
            .wait_for(|frame| frame.is_some())
            .await
            .map(|_| ())
            .map_err(|_| VideoError::Closed)
    }

    /// Subscribe to every frame the device publishes.
    pub fn frames(&self) -> watch::Receiver<Option<VideoFrame>> {
        self.latest.clone()
    }
}

impl FrameSource for VideoIn {
    fn capture_frame(&self) -> Result<VideoFrame, VideoError> {
        self.latest.borrow().clone().ok_or(VideoError::NotReady)
    }
}

impl Drop for VideoIn {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}
