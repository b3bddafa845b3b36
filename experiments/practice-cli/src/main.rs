use {
    anyhow::Result,
    practice::{Practice, PracticeConfig},
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        sync::broadcast::error::RecvError,
    },
    video::VideoIn,
};

const LOG_ENV: &str = "PRACTICE_LOG";

#[tokio::main]
async fn main() -> Result<()> {
    match std::env::var(LOG_ENV).ok().and_then(|level| base::parse_level_filter(&level)) {
        Some(level) => base::init_stdout_logger_with(level),
        None => base::init_stdout_logger(),
    }

    let config = PracticeConfig::from_env()?;
    println!("Practice");
    println!("Endpoint: {}", config.channel().url());
    println!("Controls: Enter toggles practicing, q + Enter quits");
    println!();

    log::info!("opening camera...");
    let video_in = VideoIn::open(None).await?;
    log::info!("camera open: {}", video_in.size());

    let mut practice = Practice::new(video_in, config);
    let mut predictions = practice.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    None => break,
                    Some(line) if line.trim() == "q" => break,
                    Some(_) => {
                        practice.toggle().await;
                        if practice.is_practicing() {
                            println!("practicing");
                        } else {
                            println!("stopped");
                        }
                    }
                }
            }
            prediction = predictions.recv() => {
                match prediction {
                    Ok(prediction) => println!(
                        "{:>20} {:5.1}%  {:?}",
                        prediction.label,
                        prediction.confidence * 100.0,
                        practice.status()
                    ),
                    Err(RecvError::Lagged(skipped)) => log::warn!("skipped {} predictions", skipped),
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    practice.stop().await;
    println!("Exiting...");
    Ok(())
}
