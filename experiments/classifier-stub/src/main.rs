use {
    anyhow::{Result, bail},
    com::{ClassifierServer, Prediction, ServerConfig, WireSchema},
    image::decode_to_rgb,
};

const ADDR_ENV: &str = "CLASSIFIER_ADDR";
const MODE_ENV: &str = "PRACTICE_MODE";
const LOG_ENV: &str = "PRACTICE_LOG";

// frames darker than this count as "no hand"
const MIN_BRIGHTNESS: f32 = 20.0;

/// Stand-in for the model: picks a letter from the mean brightness.
fn classify(jpeg: &[u8], schema: WireSchema) -> Option<Prediction> {
    let image = match decode_to_rgb(jpeg) {
        Ok(image) => image,
        Err(e) => {
            log::warn!("undecodable frame: {}", e);
            return None;
        }
    };
    if image.data.is_empty() {
        return None;
    }
    let brightness =
        image.data.iter().map(|&v| v as f32).sum::<f32>() / image.data.len() as f32;
    if brightness < MIN_BRIGHTNESS {
        return None;
    }

    let letter = (b'a' + (brightness as u8 / 10) % 26) as char;
    let prediction = match schema {
        WireSchema::DataUrl => {
            Prediction::new(letter.to_ascii_uppercase().to_string(), brightness / 255.0)
                .with_overlay(jpeg.to_vec())
        }
        WireSchema::Base64Frame => Prediction::new(letter.to_string(), brightness / 255.0),
    };
    Some(prediction)
}

#[tokio::main]
async fn main() -> Result<()> {
    match std::env::var(LOG_ENV).ok().and_then(|level| base::parse_level_filter(&level)) {
        Some(level) => base::init_stdout_logger_with(level),
        None => base::init_stdout_logger(),
    }

    let schema = match std::env::var(MODE_ENV).ok().as_deref() {
        None | Some("letters") => WireSchema::DataUrl,
        Some("words") => WireSchema::Base64Frame,
        Some(other) => bail!("{MODE_ENV} must be letters or words, not {other:?}"),
    };
    let addr = std::env::var(ADDR_ENV).unwrap_or_else(|_| match schema {
        WireSchema::DataUrl => "127.0.0.1:3000".to_string(),
        WireSchema::Base64Frame => "127.0.0.1:2000".to_string(),
    });

    let server = ClassifierServer::bind(
        addr.as_str(),
        ServerConfig::default().with_schema(schema),
        move |jpeg: &[u8]| classify(jpeg, schema),
    )
    .await?;
    println!("Classifier stub listening on {}", server.endpoint());
    println!("Controls: Ctrl-C to exit");

    tokio::signal::ctrl_c().await?;
    log::info!(
        "{} frames classified, {} clients connected",
        server.frames_received(),
        server.client_count().await
    );
    println!("Exiting...");
    Ok(())
}
