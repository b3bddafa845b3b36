use {
    crate::PracticeError,
    base::Vec2,
    com::{ChannelConfig, WireSchema},
    std::time::Duration,
};

/// Environment variable overriding the service endpoint.
pub const ENDPOINT_ENV: &str = "PRACTICE_ENDPOINT";

/// Environment variable selecting the preset: `letters` or `words`.
pub const MODE_ENV: &str = "PRACTICE_MODE";

/// How frames are fitted to the target size before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LetterboxPolicy {
    /// Scale to fit and pad with black to exactly the target size.
    #[default]
    Letterbox,
    /// Send frames at the camera's own resolution.
    Native,
}

#[derive(Debug, Clone)]
pub struct PracticeConfig {
    channel: ChannelConfig,
    target_size: Vec2<usize>,
    quality: f32,
    letterbox: LetterboxPolicy,
    frame_delay: Duration,
    not_ready_delay: Duration,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self::letters()
    }
}

impl PracticeConfig {
    /// Letter practice: data-URL frames to port 3000, letterboxed,
    /// one frame every 500 ms.
    pub fn letters() -> Self {
        Self {
            channel: ChannelConfig::default()
                .with_endpoint("ws://127.0.0.1:3000")
                .with_schema(WireSchema::DataUrl),
            target_size: Vec2::new(640, 480),
            quality: 0.8,
            letterbox: LetterboxPolicy::Letterbox,
            frame_delay: Duration::from_millis(500),
            not_ready_delay: Duration::from_millis(100),
        }
    }

    /// Word practice: base64 frames to port 2000 at native resolution,
    /// one frame every 100 ms.
    pub fn words() -> Self {
        Self {
            channel: ChannelConfig::default()
                .with_endpoint("ws://127.0.0.1:2000")
                .with_schema(WireSchema::Base64Frame),
            target_size: Vec2::new(640, 480),
            quality: 0.7,
            letterbox: LetterboxPolicy::Native,
            frame_delay: Duration::from_millis(100),
            not_ready_delay: Duration::from_millis(100),
        }
    }

    /// Pick the preset and endpoint from `lookup`, usually `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PracticeError> {
        let mut config = match lookup(MODE_ENV).as_deref().map(str::trim) {
            None | Some("") | Some("letters") => Self::letters(),
            Some("words") => Self::words(),
            Some(other) => {
                return Err(PracticeError::Config(format!(
                    "{MODE_ENV} must be letters or words, not {other:?}"
                )));
            }
        };
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|endpoint| !endpoint.trim().is_empty()) {
            config.channel = config.channel.with_endpoint(endpoint.trim());
        }
        Ok(config)
    }

    pub fn from_env() -> Result<Self, PracticeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.channel = self.channel.with_endpoint(endpoint);
        self
    }

    pub fn with_target_size(mut self, target_size: Vec2<usize>) -> Self {
        self.target_size = target_size;
        self
    }

    /// JPEG quality in [0, 1].
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_letterbox(mut self, letterbox: LetterboxPolicy) -> Self {
        self.letterbox = letterbox;
        self
    }

    pub fn with_frame_delay(mut self, frame_delay: Duration) -> Self {
        self.frame_delay = frame_delay;
        self
    }

    pub fn with_not_ready_delay(mut self, not_ready_delay: Duration) -> Self {
        self.not_ready_delay = not_ready_delay;
        self
    }

    pub fn channel(&self) -> &ChannelConfig {
        &self.channel
    }

    pub fn target_size(&self) -> Vec2<usize> {
        self.target_size
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn letterbox(&self) -> LetterboxPolicy {
        self.letterbox
    }

    pub fn frame_delay(&self) -> Duration {
        self.frame_delay
    }

    pub fn not_ready_delay(&self) -> Duration {
        self.not_ready_delay
    }
}
