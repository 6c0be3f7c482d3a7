//! crates/econsent_core/src/checklist.rs
//!
//! Comprehension checklist engine: per-item two-phase attestation.
//!
//! Each item is a sequential gate: the narrated audio must finish before a
//! video confirmation may be recorded, and a recorded clip must be accepted
//! before the item counts as completed. `total_completed`/`all_completed`
//! are recomputed from the item list on every accept, never patched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ChecklistItemSpec, ConsentConfig};
use crate::error::{ConsentError, GateUnsatisfied, StateConflict};

/// One attestation statement and its phase progress.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: u32,
    pub statement: String,
    pub audio_duration_secs: i64,
    pub audio_played: bool,
    pub audio_completed_at: Option<DateTime<Utc>>,
    pub video_recorded: bool,
    pub video_duration_secs: i64,
    pub video_recorded_at: Option<DateTime<Utc>>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ChecklistItem {
    fn from_spec(spec: &ChecklistItemSpec) -> Self {
        Self {
            id: spec.id,
            statement: spec.statement.clone(),
            audio_duration_secs: spec.audio_duration_secs,
            audio_played: false,
            audio_completed_at: None,
            video_recorded: false,
            video_duration_secs: 0,
            video_recorded_at: None,
            completed: false,
            completed_at: None,
        }
    }
}

/// A stopped recording held for the patient to accept or retake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateClip {
    pub item_id: u32,
    pub duration_secs: i64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct AudioPlayback {
    item_id: u32,
    started_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct RecordingSession {
    item_id: u32,
    started_at: DateTime<Utc>,
}

/// The comprehension-checklist slice of the session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChecklistProgress {
    pub items: Vec<ChecklistItem>,
    pub total_completed: usize,
    pub all_completed: bool,
    // Transient per-screen runtime; at most one of each at a time.
    playback: Option<AudioPlayback>,
    recording: Option<RecordingSession>,
    held_clip: Option<CandidateClip>,
}

impl ChecklistProgress {
    pub fn new(cfg: &ConsentConfig) -> Self {
        let items: Vec<ChecklistItem> = cfg
            .checklist_items
            .iter()
            .map(ChecklistItem::from_spec)
            .collect();
        let mut progress = Self {
            items,
            total_completed: 0,
            all_completed: false,
            playback: None,
            recording: None,
            held_clip: None,
        };
        progress.recompute();
        progress
    }

    pub fn item(&self, item_id: u32) -> Option<&ChecklistItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    fn item_mut(&mut self, item_id: u32) -> Result<&mut ChecklistItem, StateConflict> {
        self.items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(StateConflict::UnknownItem(item_id))
    }

    /// Item currently playing back, if any.
    pub fn active_playback(&self) -> Option<u32> {
        self.playback.map(|p| p.item_id)
    }

    /// Item currently recording, if any.
    pub fn active_recording(&self) -> Option<u32> {
        self.recording.map(|r| r.item_id)
    }

    /// The clip awaiting accept/retake, if any.
    pub fn candidate_clip(&self) -> Option<&CandidateClip> {
        self.held_clip.as_ref()
    }

    /// Starts (or restarts) playback of an item's narration and returns the
    /// declared duration for the playback collaborator to honor. Replaying
    /// an already-played item is allowed and never regresses its state.
    pub fn begin_audio(&mut self, item_id: u32, now: DateTime<Utc>) -> Result<i64, ConsentError> {
        let duration = self
            .item(item_id)
            .ok_or(StateConflict::UnknownItem(item_id))?
            .audio_duration_secs;

        if let Some(playback) = self.playback {
            if playback.item_id == item_id {
                // Same item already playing; treat the replay as a no-op.
                return Ok(duration);
            }
            return Err(StateConflict::PlaybackInProgress.into());
        }
        if self.recording.is_some() {
            return Err(StateConflict::RecordingInProgress.into());
        }

        self.playback = Some(AudioPlayback {
            item_id,
            started_at: now,
        });
        Ok(duration)
    }

    /// Marks an item's narration as finished. The first completion stamps
    /// `audio_completed_at`; later replays keep the original timestamp so
    /// the audio-before-video ordering stays stable.
    pub fn complete_audio(&mut self, item_id: u32, now: DateTime<Utc>) -> Result<(), ConsentError> {
        let playing_this_item = matches!(self.playback, Some(p) if p.item_id == item_id);
        let already_played = self
            .item(item_id)
            .ok_or(StateConflict::UnknownItem(item_id))?
            .audio_played;

        if !playing_this_item {
            if already_played {
                return Ok(());
            }
            return Err(StateConflict::NoActivePlayback(item_id).into());
        }

        self.playback = None;
        let item = self.item_mut(item_id)?;
        item.audio_played = true;
        if item.audio_completed_at.is_none() {
            item.audio_completed_at = Some(now);
        }
        Ok(())
    }

    /// Discards an in-flight playback without marking anything played.
    /// Called when the patient navigates away mid-narration.
    pub fn cancel_playback(&mut self) {
        self.playback = None;
    }

    /// Opens a recording session for an item whose audio phase is done.
    /// Returns the hard cap in seconds so the caller can arm the auto-stop.
    pub fn start_recording(
        &mut self,
        item_id: u32,
        cfg: &ConsentConfig,
        now: DateTime<Utc>,
    ) -> Result<i64, ConsentError> {
        let item = self
            .item(item_id)
            .ok_or(StateConflict::UnknownItem(item_id))?;
        if item.completed {
            return Err(StateConflict::ItemAlreadyCompleted(item_id).into());
        }
        if !item.audio_played {
            return Err(GateUnsatisfied::AudioPhaseIncomplete { item_id }.into());
        }
        if self.playback.is_some() {
            return Err(StateConflict::PlaybackInProgress.into());
        }
        if self.recording.is_some() {
            return Err(StateConflict::RecordingInProgress.into());
        }
        if let Some(clip) = &self.held_clip {
            return Err(StateConflict::ClipAwaitingReview(clip.item_id).into());
        }

        self.recording = Some(RecordingSession {
            item_id,
            started_at: now,
        });
        Ok(cfg.max_recording_secs)
    }

    /// Ends the capture and holds the clip for acceptance. The elapsed
    /// duration is clamped to the configured cap so a late auto-stop tick
    /// can never record an over-long clip.
    pub fn stop_recording(
        &mut self,
        item_id: u32,
        cfg: &ConsentConfig,
        now: DateTime<Utc>,
    ) -> Result<CandidateClip, ConsentError> {
        match self.recording {
            Some(rec) if rec.item_id == item_id => {
                self.recording = None;
                let elapsed = (now - rec.started_at)
                    .num_seconds()
                    .clamp(0, cfg.max_recording_secs);
                let clip = CandidateClip {
                    item_id,
                    duration_secs: elapsed,
                    recorded_at: now,
                };
                self.held_clip = Some(clip.clone());
                Ok(clip)
            }
            _ => Err(StateConflict::NoActiveRecording(item_id).into()),
        }
    }

    /// Discards an in-flight recording without producing a clip.
    pub fn cancel_recording(&mut self) {
        self.recording = None;
    }

    /// Accepts the held clip: the item's video phase and completion are
    /// persisted and the aggregate counters recomputed.
    pub fn accept_clip(&mut self, item_id: u32, now: DateTime<Utc>) -> Result<(), ConsentError> {
        let clip = match &self.held_clip {
            Some(clip) if clip.item_id == item_id => clip.clone(),
            _ => return Err(StateConflict::NoClipHeld(item_id).into()),
        };

        let item = self.item_mut(item_id)?;
        item.video_recorded = true;
        item.video_duration_secs = clip.duration_secs;
        item.video_recorded_at = Some(clip.recorded_at);
        item.completed = true;
        item.completed_at = Some(now);

        self.held_clip = None;
        self.recompute();
        Ok(())
    }

    /// Discards the held clip so the patient can record again. Persisted
    /// item state is untouched.
    pub fn retake_clip(&mut self, item_id: u32) -> Result<(), ConsentError> {
        match &self.held_clip {
            Some(clip) if clip.item_id == item_id => {
                self.held_clip = None;
                Ok(())
            }
            _ => Err(StateConflict::NoClipHeld(item_id).into()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.items.len() - self.total_completed
    }

    fn recompute(&mut self) {
        self.total_completed = self.items.iter().filter(|i| i.completed).count();
        self.all_completed = self.total_completed == self.items.len();
    }
}
