use anyhow::{Context, Result};
use blob_event_bridge::app::{App, Screened};
use blob_event_bridge::conf::Settings;
use blob_event_bridge::event::Envelope;
use std::io::{stdin, Read};
use tracing::warn;

/// Screen a notification body read from standard input against the
/// configured admission filter, printing the decision taken for each
/// contained notification. No storage access happens; this is meant
/// for inspecting filter configurations locally.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .without_time()
        .init();
    let app = App::new(Settings::from_env()?);

    let mut body = String::new();
    stdin()
        .read_to_string(&mut body)
        .context("Failed to read the notification body from stdin")?;

    let envelopes = match Envelope::from_message(&body) {
        Ok(envelopes) => envelopes,
        Err(e) => {
            warn!("Failed to parse the notification body: {:?}", e);
            println!("reject: undecodable body");
            return Ok(());
        }
    };
    for envelope in envelopes {
        match app.screen(&envelope) {
            Screened::Process { bucket, key } => {
                println!("admit: blob {:?} in bucket {:?}", key, bucket)
            }
            Screened::Skip(reason) => println!("reject: {:?}", reason),
        }
    }
    Ok(())
}
