// Unit tests for business rules

use super::*;

fn create_test_source(container: &str, mime_type: &str) -> SourceMetadata {
    SourceMetadata {
        duration: 10.0,
        geometry: FrameGeometry::new(320, 240),
        container: container.to_string(),
        mime_type: mime_type.to_string(),
    }
}

#[test]
fn test_validate_rejects_zero_fps() {
    let params = ScrambleParams::new(0, 1.0, 0);
    let err = ParameterRules::validate(&params).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
}

#[test]
fn test_validate_rejects_bad_duration() {
    assert!(ParameterRules::validate(&ScrambleParams::new(24, 0.0, 0)).is_err());
    assert!(ParameterRules::validate(&ScrambleParams::new(24, -2.0, 0)).is_err());
    assert!(ParameterRules::validate(&ScrambleParams::new(24, f64::INFINITY, 0)).is_err());
    assert!(ParameterRules::validate(&ScrambleParams::new(24, 1.0, 100)).is_ok());
}

#[test]
fn test_advisories_flag_out_of_range_values() {
    assert!(ParameterRules::advisories(&ScrambleParams::new(24, 1.0, 0)).is_empty());

    let notes = ParameterRules::advisories(&ScrambleParams::new(24, 10.0, 30));
    assert_eq!(notes.len(), 2);

    let clamped = ParameterRules::advisories(&ScrambleParams::new(4, 1.0, 10));
    assert!(clamped.iter().any(|n| n.contains("clamp")));
}

#[test]
fn test_buffer_limit() {
    let source = create_test_source("matroska,webm", "video/webm");
    let required = source.estimated_buffer_bytes(24);
    assert!(ParameterRules::check_buffer_limit(&source, 24, None).is_ok());
    assert!(ParameterRules::check_buffer_limit(&source, 24, Some(required)).is_ok());

    let err = ParameterRules::check_buffer_limit(&source, 24, Some(required - 1)).unwrap_err();
    assert_eq!(
        err,
        DomainError::BufferLimitExceeded {
            required,
            limit: required - 1
        }
    );
}

#[test]
fn test_job_transitions_follow_pipeline_order() {
    use JobState::*;

    let path = [
        Idle,
        Extracting,
        Segmenting,
        Shuffling,
        Reconstructing,
        Encoding,
        AwaitingUpload,
        Complete,
    ];
    for pair in path.windows(2) {
        assert!(JobTransitions::is_allowed(pair[0], pair[1]), "{:?}", pair);
    }

    assert!(JobTransitions::is_allowed(Encoding, Complete));
    assert!(!JobTransitions::is_allowed(Idle, Encoding));
    assert!(!JobTransitions::is_allowed(Shuffling, Segmenting));
}

#[test]
fn test_any_running_state_can_fail_but_terminal_states_are_final() {
    use JobState::*;

    let failed = Failed(ErrorKind::SeekTimeout);
    assert!(JobTransitions::is_allowed(Extracting, failed));
    assert!(JobTransitions::is_allowed(Idle, failed));
    assert!(!JobTransitions::is_allowed(Complete, failed));
    assert!(!JobTransitions::is_allowed(failed, Idle));
}

#[test]
fn test_codec_candidates_prefer_mp4_for_mp4_sources() {
    let mp4 = create_test_source("mov,mp4,m4a,3gp,3g2,mj2", "video/mp4");
    let mimes: Vec<_> = CodecPreferences::candidates(&mp4)
        .into_iter()
        .map(|c| c.mime_type)
        .collect();
    assert_eq!(
        mimes,
        vec![
            "video/mp4;codecs=h264",
            "video/webm;codecs=vp9",
            "video/webm;codecs=vp8",
            "video/webm",
        ]
    );

    let webm = create_test_source("matroska,webm", "video/webm");
    let first = &CodecPreferences::candidates(&webm)[0];
    assert_eq!(first.mime_type, "video/webm;codecs=vp9");
}

#[test]
fn test_negotiate_picks_first_supported() {
    let source = create_test_source("mov,mp4,m4a,3gp,3g2,mj2", "video/mp4");
    let candidates = CodecPreferences::candidates(&source);

    let chosen =
        CodecPreferences::negotiate(&candidates, |c| c.codec == Some(VideoCodec::Vp8)).unwrap();
    assert_eq!(chosen.mime_type, "video/webm;codecs=vp8");

    let err = CodecPreferences::negotiate(&candidates, |_| false).unwrap_err();
    match err {
        DomainError::CodecUnsupported(listed) => assert_eq!(listed.len(), 4),
        other => panic!("unexpected error: {other}"),
    }
}
