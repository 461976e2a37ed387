//! Built-in sample alerts for checking assets and layout without a live
//! EventSub session

use std::time::Duration;

use tracing::{error, info};

use crate::alert::{AlertRenderer, AlertRequest};
use crate::error::Result;

/// (username, image id, text color)
const SAMPLE_ALERTS: [(&str, &str, &str); 4] = [
    ("HNDR", "twitch-new-follower-img", "#6441a4"),
    ("EGriZZ", "twitch-new-subscriber-img", "#6441a4"),
    ("NotLilBear", "twitch-first-time-chat-img", "#6441a4"),
    ("KuHouse", "twitch-new-donation-img", "#c0ffa9"),
];

/// The sample alerts with the given duration
pub fn sample_alerts(duration: Duration) -> Vec<AlertRequest> {
    SAMPLE_ALERTS
        .iter()
        .map(|(username, image_id, text_color)| AlertRequest {
            username: username.to_string(),
            image_id: image_id.to_string(),
            text_color: text_color.to_string(),
            duration,
        })
        .collect()
}

/// Show one alert and wait for it to finish
pub async fn show_one(renderer: &AlertRenderer, request: AlertRequest) -> Result<()> {
    let handle = renderer.show(request)?;
    if let Err(e) = handle.await {
        error!(error = %e, "Alert task failed");
    }
    Ok(())
}

/// Show the sample alerts back to back; with `repeat` cycle until cancelled
pub async fn run_demo(renderer: &AlertRenderer, duration: Duration, repeat: bool) -> Result<u64> {
    let alerts = sample_alerts(duration);
    let mut shown = 0u64;

    loop {
        for request in alerts.iter().cloned() {
            info!(username = %request.username, image_id = %request.image_id, "Demo alert");
            match show_one(renderer, request).await {
                Ok(()) => shown += 1,
                Err(e) => error!(error = %e, "Skipping demo alert"),
            }
        }

        if !repeat {
            return Ok(shown);
        }
    }
}
