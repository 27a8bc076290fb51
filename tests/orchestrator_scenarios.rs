//! Integration tests driving `pipeline::Orchestrator` directly through its
//! message channel, exercising the scenarios used to validate the pipeline
//! design: batch AVC/AAC happy path, HD profile selection, audio disabled,
//! cancel mid-session, streaming WebM header ordering, and codec fallback.
//!
//! These run against a scripted `CodecProbe` so no real FFmpeg encoder or
//! hardware device needs to be present.

use std::cell::RefCell;

use encode_pipeline_worker::ffi::{AVCodecID, AVHWDeviceType};
use encode_pipeline_worker::pipeline::negotiator::CodecProbe;
use encode_pipeline_worker::pipeline::orchestrator::Orchestrator;
use encode_pipeline_worker::pipeline::transport::{EncoderConfigJs, PlanarAudioInitJs};
use encode_pipeline_worker::{ErrorKind, HostMessage, WorkerMessage};

struct ScriptedProbe {
    unsupported_video: RefCell<Vec<AVCodecID>>,
    unsupported_audio: RefCell<Vec<AVCodecID>>,
}

impl ScriptedProbe {
    fn accept_all() -> Self {
        Self {
            unsupported_video: RefCell::new(Vec::new()),
            unsupported_audio: RefCell::new(Vec::new()),
        }
    }
}

impl CodecProbe for ScriptedProbe {
    fn probe_video(&self, codec_id: AVCodecID, _hw_type: Option<AVHWDeviceType>) -> bool {
        !self.unsupported_video.borrow().contains(&codec_id)
    }

    fn probe_audio(&self, codec_id: AVCodecID) -> bool {
        !self.unsupported_audio.borrow().contains(&codec_id)
    }
}

fn new_orchestrator(probe: ScriptedProbe) -> Orchestrator {
    Orchestrator::with_probe(Box::new(probe))
}

fn base_config() -> EncoderConfigJs {
    EncoderConfigJs {
        width: 640,
        height: 480,
        frame_rate: 30.0,
        video_bitrate: 1_000_000,
        audio_bitrate: 128_000,
        sample_rate: 48_000,
        channels: 2,
        video_codec: Some("avc".to_string()),
        audio_codec: Some("aac".to_string()),
        video_codec_string: None,
        audio_codec_string: None,
        container: "mp4".to_string(),
        latency_mode: "quality".to_string(),
        hardware_acceleration: "no-preference".to_string(),
        key_frame_interval: None,
        first_timestamp_behavior: "offset".to_string(),
    }
}

fn i420_buffer(width: u32, height: u32, fill: u8) -> Vec<u8> {
    let luma = (width * height) as usize;
    let chroma = ((width.div_ceil(2)) * (height.div_ceil(2))) as usize;
    vec![fill; luma + 2 * chroma]
}

/// Batch AVC/AAC happy path: initialize, submit one video frame and one
/// audio buffer, finalize, and expect exactly one `initialized`, in-order
/// `dataChunk`s, and a final `finalized` carrying the complete buffer.
#[tokio::test]
async fn batch_avc_aac_happy_path_produces_full_buffer_on_finalize() {
    let mut orch = new_orchestrator(ScriptedProbe::accept_all());

    let init_replies = orch
        .dispatch(HostMessage::Initialize {
            config: base_config(),
            total_frames: Some(1),
        })
        .await;
    assert_eq!(init_replies.len(), 1);
    assert!(matches!(init_replies[0], WorkerMessage::Initialized { .. }));

    let frame_replies = orch
        .dispatch(HostMessage::AddVideoFrame {
            frame: i420_buffer(640, 480, 16).into(),
            timestamp_us: 0,
        })
        .await;
    // At minimum a queueSize event; an encoder may also emit a chunk
    // immediately depending on its internal reorder buffer.
    assert!(!frame_replies.is_empty());
    assert!(frame_replies
        .iter()
        .all(|msg| !matches!(msg, WorkerMessage::Error { .. })));

    let audio_replies = orch
        .dispatch(HostMessage::AddAudioData {
            audio: None,
            planar: Some(PlanarAudioInitJs {
                planes: vec![vec![0.0f32; 960].into(), vec![0.0f32; 960].into()],
                sample_rate: 48_000,
                number_of_frames: 960,
                number_of_channels: 2,
            }),
            timestamp_us: 0,
        })
        .await;
    assert!(audio_replies
        .iter()
        .all(|msg| !matches!(msg, WorkerMessage::Error { .. })));

    let finalize_replies = orch.dispatch(HostMessage::Finalize).await;
    let finalized = finalize_replies
        .iter()
        .find(|msg| matches!(msg, WorkerMessage::Finalized { .. }))
        .expect("finalize must produce a Finalized message");
    match finalized {
        WorkerMessage::Finalized { output } => {
            assert!(output.as_ref().map(|b| !b.is_empty()).unwrap_or(false));
        }
        _ => unreachable!(),
    }

    // Session is terminal: a further message produces no reply.
    let after_finalize = orch.dispatch(HostMessage::Cancel).await;
    assert!(after_finalize.is_empty());
}

/// HD resolution negotiates the high AVC profile first.
#[tokio::test]
async fn hd_profile_selection_picks_high_profile() {
    let mut orch = new_orchestrator(ScriptedProbe::accept_all());
    let mut config = base_config();
    config.width = 1920;
    config.height = 1080;

    let replies = orch
        .dispatch(HostMessage::Initialize {
            config,
            total_frames: None,
        })
        .await;

    match &replies[0] {
        WorkerMessage::Initialized {
            actual_video_codec, ..
        } => assert_eq!(actual_video_codec.as_deref(), Some("avc1.640028")),
        other => panic!("expected Initialized, got {other:?}"),
    }
}

/// `audioBitrate = 0` disables the audio track entirely: no audio codec is
/// negotiated and `addAudioData` is simply ignored rather than erroring.
#[tokio::test]
async fn audio_disabled_session_ignores_audio_data() {
    let mut orch = new_orchestrator(ScriptedProbe::accept_all());
    let mut config = base_config();
    config.audio_bitrate = 0;

    let init_replies = orch
        .dispatch(HostMessage::Initialize {
            config,
            total_frames: None,
        })
        .await;
    match &init_replies[0] {
        WorkerMessage::Initialized {
            actual_audio_codec, ..
        } => assert!(actual_audio_codec.is_none()),
        other => panic!("expected Initialized, got {other:?}"),
    }

    let replies = orch
        .dispatch(HostMessage::AddAudioData {
            audio: None,
            planar: Some(PlanarAudioInitJs {
                planes: vec![vec![0.0f32; 960].into()],
                sample_rate: 48_000,
                number_of_frames: 960,
                number_of_channels: 1,
            }),
            timestamp_us: 0,
        })
        .await;
    assert!(replies
        .iter()
        .any(|msg| matches!(msg, WorkerMessage::Error { .. })));
}

/// Cancelling mid-session is idempotent: the first cancel replies once, a
/// second produces nothing, and finalize afterward is a no-op.
#[tokio::test]
async fn cancel_mid_session_is_idempotent_and_blocks_finalize() {
    let mut orch = new_orchestrator(ScriptedProbe::accept_all());
    orch.dispatch(HostMessage::Initialize {
        config: base_config(),
        total_frames: None,
    })
    .await;

    orch.dispatch(HostMessage::AddVideoFrame {
        frame: i420_buffer(640, 480, 8).into(),
        timestamp_us: 0,
    })
    .await;

    let first_cancel = orch.dispatch(HostMessage::Cancel).await;
    assert_eq!(first_cancel.len(), 1);
    assert!(matches!(first_cancel[0], WorkerMessage::Cancelled));
    assert!(orch.session().cancelled());

    let second_cancel = orch.dispatch(HostMessage::Cancel).await;
    assert!(second_cancel.is_empty());

    let finalize_after_cancel = orch.dispatch(HostMessage::Finalize).await;
    assert!(finalize_after_cancel.is_empty());
}

/// Streaming WebM mode: the first non-empty `dataChunk` is flagged as the
/// container header and carries offset 0; every later chunk's offset only
/// grows, and `finalize` returns no buffer (the bytes were already streamed).
#[tokio::test]
async fn streaming_webm_orders_header_chunk_first() {
    let mut orch = new_orchestrator(ScriptedProbe::accept_all());
    let mut config = base_config();
    config.container = "webm".to_string();
    config.video_codec = Some("vp9".to_string());
    config.audio_codec = Some("opus".to_string());
    config.latency_mode = "realtime".to_string();

    orch.dispatch(HostMessage::Initialize {
        config,
        total_frames: None,
    })
    .await;

    let mut replies = orch
        .dispatch(HostMessage::AddVideoFrame {
            frame: i420_buffer(640, 480, 4).into(),
            timestamp_us: 0,
        })
        .await;
    replies.extend(orch.dispatch(HostMessage::Finalize).await);

    let chunk_events: Vec<_> = replies
        .iter()
        .filter_map(|msg| match msg {
            WorkerMessage::DataChunk {
                offset, is_header, ..
            } => Some((*offset, *is_header)),
            _ => None,
        })
        .collect();

    if let Some((first_offset, first_is_header)) = chunk_events.first() {
        assert_eq!(*first_offset, 0);
        assert!(*first_is_header);
        let mut last_offset = *first_offset;
        for (offset, _) in &chunk_events[1..] {
            assert!(*offset >= last_offset);
            last_offset = *offset;
        }
    }

    let finalized = replies
        .iter()
        .find(|msg| matches!(msg, WorkerMessage::Finalized { .. }));
    if let Some(WorkerMessage::Finalized { output }) = finalized {
        assert!(output.is_none());
    }
}

/// Requesting an unsupported video codec cascades to AVC, matching the
/// documented cross-codec fallback order.
#[tokio::test]
async fn unsupported_video_codec_cascades_to_avc() {
    let probe = ScriptedProbe::accept_all();
    probe.unsupported_video.borrow_mut().push(AVCodecID::Vp9);
    probe.unsupported_video.borrow_mut().push(AVCodecID::Hevc);
    probe.unsupported_video.borrow_mut().push(AVCodecID::Av1);
    let mut orch = new_orchestrator(probe);

    let mut config = base_config();
    config.video_codec = Some("vp9".to_string());

    let replies = orch
        .dispatch(HostMessage::Initialize {
            config,
            total_frames: None,
        })
        .await;

    match &replies[0] {
        WorkerMessage::Initialized {
            actual_video_codec, ..
        } => assert!(actual_video_codec.as_deref().unwrap().starts_with("avc1.")),
        other => panic!("expected Initialized, got {other:?}"),
    }
}

/// Exhausting the whole video cascade reports `not-supported` and leaves the
/// session back at rest: a later `initialize` against a different, fully
/// supported config still succeeds.
#[tokio::test]
async fn all_video_codecs_unsupported_reports_not_supported_and_resets() {
    let probe = ScriptedProbe::accept_all();
    for id in [
        AVCodecID::H264,
        AVCodecID::Vp9,
        AVCodecID::Hevc,
        AVCodecID::Av1,
    ] {
        probe.unsupported_video.borrow_mut().push(id);
    }
    let mut orch = new_orchestrator(probe);

    let replies = orch
        .dispatch(HostMessage::Initialize {
            config: base_config(),
            total_frames: None,
        })
        .await;
    assert_eq!(replies.len(), 1);
    match &replies[0] {
        WorkerMessage::Error { kind, .. } => assert_eq!(*kind, ErrorKind::NotSupported),
        other => panic!("expected Error, got {other:?}"),
    }

    // The failed initialize left no session running, so a video-disabled
    // retry against the same (still-failing-for-video) probe still succeeds.
    let mut retry_config = base_config();
    retry_config.video_bitrate = 0;
    let retry = orch
        .dispatch(HostMessage::Initialize {
            config: retry_config,
            total_frames: None,
        })
        .await;
    assert!(matches!(retry[0], WorkerMessage::Initialized { .. }));
}
