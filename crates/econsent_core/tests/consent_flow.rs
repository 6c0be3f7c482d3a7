//! End-to-end walk of one consent attempt through every stage gate, plus
//! the cross-slice properties the engine promises.

use chrono::{DateTime, Duration, TimeZone, Utc};
use econsent_core::{
    AcknowledgementKind, AuthError, ChecklistItemSpec, ConsentConfig, ConsentError,
    ConsentSession, ConsentStage, DeviceInfo, GateUnsatisfied, PatientProfile, StateConflict,
    StudyInfo, SubmitStart, REJECTED_CODE_SENTINEL,
};

fn cfg() -> ConsentConfig {
    ConsentConfig {
        total_pages: 3,
        checklist_items: vec![
            ChecklistItemSpec::new(1, "I understand the purpose of this study", 4),
            ChecklistItemSpec::new(2, "I understand the potential risks", 5),
        ],
        ..ConsentConfig::default()
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 14, 0, 0).unwrap()
}

fn patient() -> PatientProfile {
    PatientProfile {
        patient_id: "SITE-001-123".into(),
        patient_name: "John Doe".into(),
        email: "john.doe@example.com".into(),
        language: "English".into(),
    }
}

fn study() -> StudyInfo {
    StudyInfo {
        protocol_id: "CARDIO-2024-01".into(),
        protocol_name: "Cardiovascular Health Study".into(),
        version: "v2.0".into(),
        site_code: "USA-NYC-001".into(),
        site_name: "Apollo Hospital Delhi".into(),
        investigator_name: "Dr. Sarah Johnson".into(),
    }
}

fn open_session(cfg: &ConsentConfig) -> ConsentSession {
    ConsentSession::open(
        "tok-flow-1",
        patient(),
        study(),
        cfg,
        DeviceInfo {
            browser: "Chrome".into(),
            os: "Linux".into(),
            device: "Desktop".into(),
        },
        t0(),
    )
}

#[test]
fn full_session_reaches_complete_with_reconstructible_timeline() {
    let cfg = cfg();
    let mut s = open_session(&cfg);
    let mut now = t0();

    // Landing → identity.
    s.advance_stage(now).unwrap();

    // Identity: send to a valid address, burn one attempt on the sentinel,
    // then verify with a well-formed code.
    now += Duration::seconds(5);
    let challenge = s.send_challenge("a@b.co", &cfg, now).unwrap();
    assert_eq!(challenge.expires_at, now + Duration::seconds(300));
    let err = s.verify_code(REJECTED_CODE_SENTINEL, &cfg, now).unwrap_err();
    assert_eq!(
        err,
        ConsentError::Auth(AuthError::IncorrectCode {
            attempts_remaining: 2
        })
    );
    assert_eq!(s.auth.attempts, 1);
    now += Duration::seconds(10);
    s.verify_code("123456", &cfg, now).unwrap();
    assert!(s.auth.verified);
    s.advance_stage(now).unwrap();
    assert_eq!(s.stage, ConsentStage::ReadDocument);

    // Document: three pages, each read for the minimum dwell and scrolled.
    for page in 1..=3u32 {
        assert_eq!(s.document.current_page, page);
        s.document.record_scroll(100);
        now += Duration::seconds(15);
        s.document.advance(&cfg, now).unwrap();
    }
    assert!(s.document.completed);
    assert_eq!(s.document.page_timings.len(), 3);
    assert_eq!(s.document.total_reading_time_secs, 45);
    s.advance_stage(now).unwrap();
    assert_eq!(s.stage, ConsentStage::Checklist);

    // Checklist: both items, audio strictly before video.
    for id in [1u32, 2] {
        let duration = s.checklist.begin_audio(id, now).unwrap();
        now += Duration::seconds(duration);
        s.checklist.complete_audio(id, now).unwrap();
        now += Duration::seconds(1);
        s.checklist.start_recording(id, &cfg, now).unwrap();
        now += Duration::seconds(12);
        s.checklist.stop_recording(id, &cfg, now).unwrap();
        now += Duration::seconds(1);
        s.checklist.accept_clip(id, now).unwrap();
    }
    assert!(s.checklist.all_completed);
    s.advance_stage(now).unwrap();
    assert_eq!(s.stage, ConsentStage::Signature);

    // Signature: draw, acknowledge twice, submit.
    s.signature.mark_stroke().unwrap();
    s.signature.mark_stroke().unwrap();
    s.signature
        .set_acknowledgement(AcknowledgementKind::Consent, true)
        .unwrap();
    s.signature
        .set_acknowledgement(AcknowledgementKind::Terms, true)
        .unwrap();
    now += Duration::seconds(3);
    assert_eq!(s.begin_submit(now).unwrap(), SubmitStart::Started);
    // A second tap while the backend round trip is pending does nothing.
    assert_eq!(s.begin_submit(now).unwrap(), SubmitStart::AlreadyInFlight);
    now += Duration::seconds(2);
    s.complete_submit(now).unwrap();

    assert_eq!(s.stage, ConsentStage::Complete);
    assert!(s.audit.is_finalized());

    // The export carries the full timeline.
    let export = s.export().unwrap();
    assert_eq!(export.page_timings.len(), 3);
    assert_eq!(export.checklist_items.len(), 2);
    assert!(export.signature.submitted);
    assert_eq!(export.audit.completed_at, Some(now));
    for item in &export.checklist_items {
        assert!(item.completed);
        assert!(item.audio_completed_at.unwrap() < item.video_recorded_at.unwrap());
    }

    // And it serializes for the downstream generator.
    let json = serde_json::to_string(&export).unwrap();
    assert!(json.contains("CARDIO-2024-01"));
    assert!(json.contains("email_verification"));
}

#[test]
fn dwell_gate_scenario_refuses_then_allows() {
    let cfg = cfg();
    let mut s = open_session(&cfg);
    let mut now = t0();
    s.advance_stage(now).unwrap();
    s.send_challenge("a@b.co", &cfg, now).unwrap();
    s.verify_code("424242", &cfg, now).unwrap();
    s.advance_stage(now).unwrap();

    s.document.record_scroll(100);
    now += Duration::seconds(10);
    let err = s.document.advance(&cfg, now).unwrap_err();
    assert_eq!(
        err,
        ConsentError::Gate(GateUnsatisfied::InsufficientDwell { remaining_secs: 5 })
    );

    now += Duration::seconds(5);
    s.document.advance(&cfg, now).unwrap();
    assert!(s.document.pages_read.contains(&1));
    assert_eq!(s.document.current_page, 2);
}

#[test]
fn lockout_survives_across_stage_boundary_checks() {
    let cfg = cfg();
    let mut s = open_session(&cfg);
    let now = t0();
    s.advance_stage(now).unwrap();
    s.send_challenge("a@b.co", &cfg, now).unwrap();

    for _ in 0..3 {
        let _ = s.verify_code(REJECTED_CODE_SENTINEL, &cfg, now).unwrap_err();
    }
    // Exhausted: a well-formed code is still rejected, and the stage gate
    // never opens.
    let err = s.verify_code("123456", &cfg, now).unwrap_err();
    assert_eq!(err, ConsentError::Auth(AuthError::AttemptsExhausted));
    let err = s.advance_stage(now).unwrap_err();
    assert_eq!(err, ConsentError::Gate(GateUnsatisfied::IdentityNotVerified));
}

#[test]
fn checklist_stage_cannot_be_left_early() {
    let cfg = cfg();
    let mut s = open_session(&cfg);
    let mut now = t0();
    s.advance_stage(now).unwrap();
    s.send_challenge("a@b.co", &cfg, now).unwrap();
    s.verify_code("987654", &cfg, now).unwrap();
    s.advance_stage(now).unwrap();
    for _ in 0..3 {
        s.document.record_scroll(100);
        now += Duration::seconds(15);
        s.document.advance(&cfg, now).unwrap();
    }
    s.advance_stage(now).unwrap();

    // One of two items done.
    s.checklist.begin_audio(1, now).unwrap();
    now += Duration::seconds(4);
    s.checklist.complete_audio(1, now).unwrap();
    s.checklist.start_recording(1, &cfg, now).unwrap();
    now += Duration::seconds(8);
    s.checklist.stop_recording(1, &cfg, now).unwrap();
    s.checklist.accept_clip(1, now).unwrap();

    let err = s.advance_stage(now).unwrap_err();
    assert_eq!(
        err,
        ConsentError::Gate(GateUnsatisfied::ChecklistIncomplete { remaining: 1 })
    );
}

#[test]
fn export_is_refused_before_submission() {
    let cfg = cfg();
    let s = open_session(&cfg);
    let err = s.export().unwrap_err();
    assert_eq!(err, ConsentError::State(StateConflict::NotSubmitted));
}
