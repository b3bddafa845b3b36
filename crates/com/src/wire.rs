use {
    crate::{
        ComError,
        engineio::{Packet, placeholder, placeholder_index},
    },
    image::{JPEG_MIME, from_base64, parse_data_url, to_base64, to_data_url},
    serde_json::{Map, Value, json},
};

/// Event the service answers with, in both schemas.
pub const PREDICTION_EVENT: &str = "prediction";

/// How frames and predictions are laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireSchema {
    /// Frames go out as a data-URL string on the `message` event.
    /// Predictions come back as `{class, confidence, image?}`.
    #[default]
    DataUrl,
    /// Frames go out as `{image: <base64>}` on the `frame` event.
    /// Predictions come back as `{label, confidence}`.
    Base64Frame,
}

impl WireSchema {
    pub fn frame_event(&self) -> &'static str {
        match self {
            WireSchema::DataUrl => "message",
            WireSchema::Base64Frame => "frame",
        }
    }

    fn label_key(&self) -> &'static str {
        match self {
            WireSchema::DataUrl => "class",
            WireSchema::Base64Frame => "label",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Always within [0, 1].
    pub confidence: f32,
    /// Processed frame returned by the service, JPEG encoded.
    pub overlay: Option<Vec<u8>>,
}

impl Prediction {
    /// Label of the reply sent when nothing could be classified.
    pub const NO_HAND: &'static str = "No Hand Detected";

    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            overlay: None,
        }
    }

    pub fn no_hand() -> Self {
        Self::new(Self::NO_HAND, 0.0)
    }

    pub fn with_overlay(mut self, jpeg: Vec<u8>) -> Self {
        self.overlay = Some(jpeg);
        self
    }

    pub fn is_no_hand(&self) -> bool {
        self.label == Self::NO_HAND
    }
}

/// Build the packet that carries one encoded frame.
pub fn encode_frame(schema: WireSchema, jpeg: &[u8]) -> Packet {
    let data = match schema {
        WireSchema::DataUrl => Value::String(to_data_url(JPEG_MIME, jpeg)),
        WireSchema::Base64Frame => json!({ "image": to_base64(jpeg) }),
    };
    Packet::event(schema.frame_event(), data)
}

/// Extract the JPEG bytes from a frame event payload.
pub fn decode_frame(schema: WireSchema, data: &Value) -> Result<Vec<u8>, ComError> {
    match schema {
        WireSchema::DataUrl => {
            let url = data
                .as_str()
                .ok_or_else(|| ComError::Protocol("frame is not a data URL".to_string()))?;
            Ok(parse_data_url(url)?.data)
        }
        WireSchema::Base64Frame => {
            let text = data
                .get("image")
                .and_then(Value::as_str)
                .ok_or_else(|| ComError::Protocol("frame without image".to_string()))?;
            Ok(from_base64(text)?)
        }
    }
}

/// Decode a `prediction` payload. `attachments` are the binary frames that
/// followed the event, referenced by placeholders.
pub fn decode_prediction(
    schema: WireSchema,
    data: &Value,
    attachments: &[Vec<u8>],
) -> Result<Prediction, ComError> {
    let label = data
        .get(schema.label_key())
        .and_then(Value::as_str)
        .ok_or_else(|| ComError::Protocol(format!("prediction without {}", schema.label_key())))?;
    let confidence = data
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|confidence| confidence.is_finite())
        .ok_or_else(|| ComError::Protocol("prediction without a finite confidence".to_string()))?;

    let label = match schema {
        WireSchema::DataUrl => label.to_string(),
        WireSchema::Base64Frame => capitalize(label),
    };

    let overlay = match data.get("image") {
        None | Some(Value::Null) => None,
        Some(image) => Some(decode_overlay(image, attachments)?),
    };

    Ok(Prediction {
        label,
        confidence: (confidence as f32).clamp(0.0, 1.0),
        overlay,
    })
}

fn decode_overlay(image: &Value, attachments: &[Vec<u8>]) -> Result<Vec<u8>, ComError> {
    if let Some(num) = placeholder_index(image) {
        return attachments
            .get(num)
            .cloned()
            .ok_or_else(|| ComError::Protocol(format!("missing attachment {num}")));
    }
    match image {
        Value::Array(bytes) => bytes
            .iter()
            .map(|byte| {
                byte.as_u64()
                    .and_then(|byte| u8::try_from(byte).ok())
                    .ok_or_else(|| ComError::Protocol("image array holds a non-byte".to_string()))
            })
            .collect(),
        Value::String(text) if text.starts_with("data:") => Ok(parse_data_url(text)?.data),
        Value::String(text) => Ok(from_base64(text)?),
        _ => Err(ComError::Protocol("unsupported image encoding".to_string())),
    }
}

/// Build the `prediction` packet and its binary attachments.
pub fn encode_prediction(schema: WireSchema, prediction: &Prediction) -> (Packet, Vec<Vec<u8>>) {
    let mut data = Map::new();
    data.insert(
        schema.label_key().to_string(),
        Value::String(prediction.label.clone()),
    );
    data.insert("confidence".to_string(), json!(prediction.confidence));

    let mut attachments = Vec::new();
    if schema == WireSchema::DataUrl {
        if let Some(overlay) = &prediction.overlay {
            data.insert("image".to_string(), placeholder(0));
            attachments.push(overlay.clone());
        }
    }

    let packet = Packet::Event {
        name: PREDICTION_EVENT.to_string(),
        data: Value::Object(data),
        attachments: attachments.len(),
    };
    (packet, attachments)
}

/// Upper-case the first character and lower-case the rest.
pub fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    }
}
