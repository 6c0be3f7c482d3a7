//! services/api/src/web/timers.rs
//!
//! The scoped timer tasks a checklist screen can arm: simulated audio
//! playback and the recording auto-stop cap.
//!
//! Each task owns a `CancellationToken`; the handler that spawned it keeps
//! the handle in `StageTimers` and cancels it on any transition that ends
//! the timer's validity (stop, retake, stage navigation). A tick therefore
//! never lands after the state it targets has moved on, and the engine's
//! own state checks catch anything that races the cancellation.

use crate::config::Config;
use crate::web::state::{SessionEntry, TimerHandle};
use econsent_core::ports::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Arms the simulated narration playback for a checklist item. After the
/// declared duration elapses the item's audio phase completes.
pub fn spawn_audio_completion(
    clock: Arc<dyn Clock>,
    entry: Arc<Mutex<SessionEntry>>,
    item_id: u32,
    duration_secs: i64,
) -> TimerHandle {
    let token = CancellationToken::new();
    let tick = token.clone();
    let handle = tokio::spawn(async move {
        let playback = tokio::time::sleep(Duration::from_secs(duration_secs.max(0) as u64));
        tokio::select! {
            _ = tick.cancelled() => {
                debug!(item_id, "audio playback cancelled");
                return;
            }
            _ = playback => {}
        }

        let mut entry = entry.lock().await;
        let now = clock.now();
        match entry.session.checklist.complete_audio(item_id, now) {
            Ok(()) => info!(item_id, "audio playback finished"),
            Err(e) => warn!(item_id, error = %e, "late audio tick ignored"),
        }
        entry.timers.audio = None;
    });
    TimerHandle::new(token, handle)
}

/// Arms the recording cap for a checklist item. If the patient has not
/// stopped by the cap, the capture is force-stopped and the clip held for
/// review exactly as a manual stop would.
pub fn spawn_recording_cap(
    clock: Arc<dyn Clock>,
    config: Arc<Config>,
    entry: Arc<Mutex<SessionEntry>>,
    item_id: u32,
    cap_secs: i64,
) -> TimerHandle {
    let token = CancellationToken::new();
    let tick = token.clone();
    let handle = tokio::spawn(async move {
        let cap = tokio::time::sleep(Duration::from_secs(cap_secs.max(0) as u64));
        tokio::select! {
            _ = tick.cancelled() => {
                debug!(item_id, "recording cap cancelled");
                return;
            }
            _ = cap => {}
        }

        let mut entry = entry.lock().await;
        let now = clock.now();
        match entry
            .session
            .checklist
            .stop_recording(item_id, &config.consent, now)
        {
            Ok(clip) => info!(
                item_id,
                duration_secs = clip.duration_secs,
                "recording auto-stopped at cap"
            ),
            Err(e) => warn!(item_id, error = %e, "late recording tick ignored"),
        }
        entry.timers.recording = None;
    });
    TimerHandle::new(token, handle)
}
