//! Pipeline Orchestrator
//!
//! Owns the session state machine described in SPEC_FULL.md 4.5: receives
//! `HostMessage`s, negotiates a codec configuration, drives the Video/Audio
//! Drivers and the Muxer Adapter, and replies with `WorkerMessage`s. This is
//! the one component with no single teacher analog (the teacher exposes
//! `VideoEncoder`/`AudioEncoder`/muxers as separately-driven napi classes
//! with no unifying session state machine); it is assembled from the
//! teacher's parts in the teacher's idiom, the way `muxer_base.rs` already
//! logs recoverable faults through `tracing::warn!`/`tracing::error!` and
//! the crate already depends on `tokio` for off-thread orchestration.

use std::sync::Arc;

use napi::bindgen_prelude::Buffer;
use tokio::sync::mpsc;

use crate::codec::{CodecError, ContainerFormat, Frame};
use crate::ffi::AVPixelFormat;
use crate::webcodecs::AudioData;

use super::audio_driver::{AudioDriver, AudioDriverConfig, PlanarAudioInit};
use super::chunk::{DataChunkEvent, EncodedChunk};
use super::error::{PipelineError, PipelineResult};
use super::muxer_adapter::{AudioTrackConfig, MuxerAdapter, MuxerMode, VideoTrackConfig};
use super::negotiator::{
    self, AudioCodecKind, CodecProbe, FfmpegCodecProbe, HardwareAccelerationPreference,
    NegotiationRequest, Negotiator, VideoCodecKind,
};
use super::timestamp::{FirstTimestampBehavior, TrackTimestamps};
use super::transport::{EncoderConfigJs, HostMessage, PlanarAudioInitJs, WorkerMessage};
use super::video_driver::{EncodeHints, LatencyMode, VideoDriver, VideoDriverConfig};

/// Top-level session state machine, per SPEC_FULL.md 4.5:
///
/// ```text
/// Idle -> [initialize ok] -> Running -> [cancel] -> Cancelled
/// Idle -> [initialize err] -> Idle     -> [finalize ok] -> Finalized
/// ```
///
/// `Poisoned` is this spec's materialization of "session poisoned" from the
/// error table in SPEC_FULL.md 7 (video/audio encoding errors, muxing
/// failures): a driver's error callback already moves that driver into a
/// terminal state by itself (SPEC_FULL.md 4.3); this mirrors that at the
/// session level so subsequent non-`cancel`/`initialize` messages keep
/// surfacing the same class of error instead of silently resuming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    Idle,
    Running,
    Cancelled,
    Finalized,
    Poisoned,
}

/// `SessionState` from SPEC_FULL.md 3: the mutable, per-session state that
/// lives from one `initialize` to the next (or to teardown).
pub struct SessionState {
    status: SessionStatus,
    cancelled: bool,
    container: ContainerFormat,
    latency_mode: LatencyMode,
    video_enabled: bool,
    audio_enabled: bool,
    timestamps: TrackTimestamps,
    key_frame_interval: Option<u32>,
    processed_video_frames: u64,
    total_frames: Option<u64>,
    video_width: u32,
    video_height: u32,
    audio_channels: u32,
}

impl SessionState {
    fn idle() -> Self {
        Self {
            status: SessionStatus::Idle,
            cancelled: false,
            container: ContainerFormat::Mp4,
            latency_mode: LatencyMode::Quality,
            video_enabled: false,
            audio_enabled: false,
            timestamps: TrackTimestamps::new(FirstTimestampBehavior::Offset),
            key_frame_interval: None,
            processed_video_frames: 0,
            total_frames: None,
            video_width: 0,
            video_height: 0,
            audio_channels: 0,
        }
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn processed_video_frames(&self) -> u64 {
        self.processed_video_frames
    }

    pub fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }
}

/// Drives one encoding session end to end. Owns the encoder/muxer handles
/// exclusively (SPEC_FULL.md 3's ownership note); Drivers never touch the
/// Muxer directly.
pub struct Orchestrator {
    session: SessionState,
    video_driver: VideoDriver,
    audio_driver: AudioDriver,
    muxer: Option<MuxerAdapter>,
    error_rx: crossbeam::channel::Receiver<PipelineError>,
    probe: Box<dyn CodecProbe + Send + Sync>,
}

impl Orchestrator {
    /// Build an orchestrator that probes real FFmpeg encoders (Design Note
    /// "Callback-based error delivery -> explicit error channel": both
    /// Drivers share one bounded error channel that the dispatch loop
    /// drains).
    pub fn new() -> Self {
        Self::with_probe(Box::new(FfmpegCodecProbe))
    }

    /// Build an orchestrator against a scripted `CodecProbe`, so tests can
    /// exercise negotiation fallbacks without real hardware or FFmpeg
    /// encoders present.
    pub fn with_probe(probe: Box<dyn CodecProbe + Send + Sync>) -> Self {
        let (error_tx, error_rx) = crossbeam::channel::unbounded();
        Self {
            session: SessionState::idle(),
            video_driver: VideoDriver::new(error_tx.clone()),
            audio_driver: AudioDriver::new(error_tx),
            muxer: None,
            error_rx,
            probe,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Run the worker's single cooperative task: read `HostMessage`s from
    /// the primary channel, interleaving the optional secondary audio port
    /// once `connectAudioPort` attaches one (SPEC_FULL.md 4.6), and forward
    /// every `WorkerMessage` reply to `out_tx` until the primary channel
    /// closes.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<HostMessage>,
        out_tx: mpsc::UnboundedSender<WorkerMessage>,
    ) {
        let mut port_rx: Option<mpsc::Receiver<HostMessage>> = None;
        loop {
            let next = match port_rx.as_mut() {
                Some(port) => {
                    tokio::select! {
                        biased;
                        msg = rx.recv() => msg,
                        msg = port.recv() => msg,
                    }
                }
                None => rx.recv().await,
            };
            let Some(msg) = next else { break };

            match msg {
                HostMessage::ConnectAudioPort { port_rx: new_port } => {
                    port_rx = Some(new_port);
                }
                other => {
                    for reply in self.dispatch(other).await {
                        if out_tx.send(reply).is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Handle one `HostMessage`, returning the `WorkerMessage`s it produced
    /// (zero or more). Exposed directly (in addition to `run`) so tests can
    /// drive the Orchestrator's message channel without standing up the
    /// full `select!` loop.
    pub async fn dispatch(&mut self, msg: HostMessage) -> Vec<WorkerMessage> {
        match msg {
            HostMessage::ConnectAudioPort { .. } => Vec::new(),
            HostMessage::Initialize {
                config,
                total_frames,
            } => self.handle_initialize(config, total_frames),
            HostMessage::Cancel => self.handle_cancel(),
            _ if matches!(
                self.session.status,
                SessionStatus::Cancelled | SessionStatus::Finalized
            ) =>
            {
                Vec::new()
            }
            HostMessage::AddVideoFrame {
                frame,
                timestamp_us,
            } => self.handle_add_video_frame(frame, timestamp_us),
            HostMessage::AddAudioData {
                audio,
                planar,
                timestamp_us,
            } => self.handle_add_audio_data(audio, planar, timestamp_us),
            HostMessage::Finalize => self.handle_finalize().await,
        }
    }

    fn handle_initialize(
        &mut self,
        config: EncoderConfigJs,
        total_frames: Option<u64>,
    ) -> Vec<WorkerMessage> {
        self.video_driver.close();
        self.audio_driver.close();
        self.muxer = None;
        self.clear_error_channel();

        match self.try_initialize(&config, total_frames) {
            Ok((actual_video_codec, actual_audio_codec)) => {
                vec![WorkerMessage::Initialized {
                    actual_video_codec,
                    actual_audio_codec,
                }]
            }
            Err(err) => {
                self.video_driver.close();
                self.audio_driver.close();
                self.muxer = None;
                self.session = SessionState::idle();
                let kind = err.kind();
                tracing::error!(target: "pipeline::orchestrator", kind = %kind, "{}", err);
                vec![WorkerMessage::Error {
                    message: err.to_string(),
                    kind,
                    stack: Some(err.stack()),
                }]
            }
        }
    }

    fn try_initialize(
        &mut self,
        config: &EncoderConfigJs,
        total_frames: Option<u64>,
    ) -> PipelineResult<(Option<String>, Option<String>)> {
        let video_enabled = config.video_bitrate > 0;
        let audio_enabled = config.audio_bitrate > 0;
        if !video_enabled && !audio_enabled {
            return Err(PipelineError::ConfigurationError(
                "at least one of videoBitrate/audioBitrate must be non-zero".to_string(),
            ));
        }
        if video_enabled && (config.width == 0 || config.height == 0) {
            return Err(PipelineError::ConfigurationError(
                "width and height must be positive when videoBitrate > 0".to_string(),
            ));
        }
        if audio_enabled && (config.sample_rate == 0 || config.channels == 0) {
            return Err(PipelineError::ConfigurationError(
                "sampleRate and channels must be positive when audioBitrate > 0".to_string(),
            ));
        }

        let container = match config.container.as_str() {
            "mp4" => ContainerFormat::Mp4,
            "webm" => ContainerFormat::WebM,
            other => {
                return Err(PipelineError::InitializationFailed(format!(
                    "unsupported container {other:?}"
                )))
            }
        };
        let latency_mode = match config.latency_mode.as_str() {
            "quality" => LatencyMode::Quality,
            "realtime" => LatencyMode::Realtime,
            other => {
                return Err(PipelineError::InitializationFailed(format!(
                    "unsupported latencyMode {other:?}"
                )))
            }
        };
        let hardware_acceleration = match config.hardware_acceleration.as_str() {
            "no-preference" => HardwareAccelerationPreference::NoPreference,
            "prefer-hardware" => HardwareAccelerationPreference::PreferHardware,
            "prefer-software" => HardwareAccelerationPreference::PreferSoftware,
            other => {
                return Err(PipelineError::InitializationFailed(format!(
                    "unsupported hardwareAcceleration {other:?}"
                )))
            }
        };
        let first_timestamp_behavior = match config.first_timestamp_behavior.as_str() {
            "offset" => FirstTimestampBehavior::Offset,
            "passthrough" => FirstTimestampBehavior::Passthrough,
            other => {
                return Err(PipelineError::InitializationFailed(format!(
                    "unsupported firstTimestampBehavior {other:?}"
                )))
            }
        };

        let requested_video_codec = match config.video_codec.as_deref() {
            Some(s) => parse_video_codec(s)?,
            None => default_video_codec(container),
        };
        let requested_audio_codec = match config.audio_codec.as_deref() {
            Some(s) => parse_audio_codec(s)?,
            None => default_audio_codec(container),
        };

        let request = NegotiationRequest {
            width: config.width,
            height: config.height,
            frame_rate: config.frame_rate,
            video_enabled,
            audio_enabled,
            requested_video_codec,
            requested_audio_codec,
            video_codec_string_override: config.video_codec_string.clone(),
            audio_codec_string_override: config.audio_codec_string.clone(),
            hardware_acceleration,
            channels: config.channels,
        };

        let negotiated = Negotiator::negotiate(&request, self.probe.as_ref())?;

        let actual_video_codec = match &negotiated.video {
            Some(video) => {
                let (framerate_num, framerate_den) = rational_from_fps(config.frame_rate);
                let hw_type = video
                    .used_hardware
                    .then(negotiator::default_hw_device_type);
                self.video_driver.configure(VideoDriverConfig {
                    codec_id: video.codec_id,
                    width: config.width,
                    height: config.height,
                    framerate_num,
                    framerate_den,
                    bitrate: config.video_bitrate as u64,
                    latency_mode,
                    key_frame_interval: config.key_frame_interval,
                    hw_type,
                })?;
                Some(video.codec_string.clone())
            }
            None => None,
        };

        let actual_audio_codec = match &negotiated.audio {
            Some(audio) => {
                self.audio_driver.configure(AudioDriverConfig {
                    codec_id: audio.codec_id,
                    codec_name: audio.codec_string.clone(),
                    sample_rate: config.sample_rate,
                    channels: audio.channels,
                    bitrate: config.audio_bitrate as u64,
                })?;
                Some(audio.codec_string.clone())
            }
            None => None,
        };

        let mode = match latency_mode {
            LatencyMode::Quality => MuxerMode::Batch,
            LatencyMode::Realtime => MuxerMode::Streaming {
                buffer_capacity: 64 * 1024,
            },
        };
        let video_track = negotiated.video.as_ref().map(|v| VideoTrackConfig {
            codec_id: v.codec_id,
            width: config.width,
            height: config.height,
            extradata: None,
        });
        let audio_track = negotiated.audio.as_ref().map(|a| AudioTrackConfig {
            codec_id: a.codec_id,
            sample_rate: config.sample_rate,
            channels: a.channels,
            frame_size: None,
            extradata: None,
        });
        let muxer = MuxerAdapter::new(container, mode, video_track, audio_track)?;

        self.muxer = Some(muxer);
        self.session = SessionState {
            status: SessionStatus::Running,
            cancelled: false,
            container,
            latency_mode,
            video_enabled: negotiated.video.is_some(),
            audio_enabled: negotiated.audio.is_some(),
            timestamps: TrackTimestamps::new(first_timestamp_behavior),
            key_frame_interval: config.key_frame_interval,
            processed_video_frames: 0,
            total_frames,
            video_width: config.width,
            video_height: config.height,
            audio_channels: config.channels,
        };

        Ok((actual_video_codec, actual_audio_codec))
    }

    fn handle_add_video_frame(&mut self, frame: Buffer, timestamp_us: i64) -> Vec<WorkerMessage> {
        let normalized_ts = self.session.timestamps.video.normalize(timestamp_us);

        let decoded = match frame_from_i420_buffer(
            &frame,
            self.session.video_width,
            self.session.video_height,
        ) {
            Ok(frame) => frame,
            Err(err) => {
                return self.report_error(PipelineError::VideoEncodingError(err.to_string()))
            }
        };

        let result = self
            .video_driver
            .encode(&decoded, normalized_ts, EncodeHints::default());
        self.clear_error_channel();
        let chunks = match result {
            Ok(chunks) => chunks,
            Err(err) => return self.report_error(err),
        };

        self.session.processed_video_frames = self.video_driver.processed_frames();

        let mut out = match self.mux_video_chunks(&chunks) {
            Ok(msgs) => msgs,
            Err(err) => return self.report_error(err),
        };

        if let Some(total) = self.session.total_frames {
            if self.session.latency_mode == LatencyMode::Quality {
                out.push(WorkerMessage::Progress {
                    processed_frames: self.session.processed_video_frames,
                    total_frames: total,
                });
            }
        }
        out.push(self.queue_size_event());
        out
    }

    fn handle_add_audio_data(
        &mut self,
        audio: Option<Arc<AudioData>>,
        planar: Option<PlanarAudioInitJs>,
        timestamp_us: i64,
    ) -> Vec<WorkerMessage> {
        let normalized_ts = self.session.timestamps.audio.normalize(timestamp_us);

        let result = if let Some(audio) = audio {
            self.encode_prebuilt_audio(&audio, normalized_ts)
        } else if let Some(planar) = planar {
            self.encode_planar_audio(planar, normalized_ts)
        } else {
            return self.report_error(PipelineError::ConfigurationError(
                "addAudioData requires either a prebuilt audio value or planar sample data"
                    .to_string(),
            ));
        };

        self.clear_error_channel();
        let chunks = match result {
            Ok(chunks) => chunks,
            Err(err) => return self.report_error(err),
        };

        let mut out = match self.mux_audio_chunks(&chunks) {
            Ok(msgs) => msgs,
            Err(err) => return self.report_error(err),
        };
        out.push(self.queue_size_event());
        out
    }

    /// The prebuilt half of "addAudioData"'s dual input contract: routes
    /// straight to `AudioDriver::encode`, bypassing the planar-init path.
    fn encode_prebuilt_audio(
        &mut self,
        audio: &AudioData,
        normalized_ts: i64,
    ) -> Result<Vec<EncodedChunk>, PipelineError> {
        let channels = audio.number_of_channels()?;
        if channels != self.session.audio_channels {
            return Err(PipelineError::ConfigurationError(format!(
                "audio data has {} channels, session configured for {}",
                channels, self.session.audio_channels
            )));
        }
        let src_format = audio
            .format()?
            .ok_or_else(|| PipelineError::ConfigurationError("audio data has no format".into()))?
            .to_av_format();

        audio
            .with_frame(|frame| self.audio_driver.encode(frame, normalized_ts, src_format))
            .map_err(PipelineError::from)?
    }

    fn encode_planar_audio(
        &mut self,
        planar: PlanarAudioInitJs,
        normalized_ts: i64,
    ) -> Result<Vec<EncodedChunk>, PipelineError> {
        if planar.number_of_channels != self.session.audio_channels {
            return Err(PipelineError::ConfigurationError(format!(
                "audio data has {} channels, session configured for {}",
                planar.number_of_channels, self.session.audio_channels
            )));
        }

        let plane_slices: Vec<&[f32]> = planar.planes.iter().map(|p| -> &[f32] { p }).collect();
        let init = PlanarAudioInit {
            planes: &plane_slices,
            sample_rate: planar.sample_rate,
            number_of_channels: planar.number_of_channels,
            number_of_frames: planar.number_of_frames,
        };

        self.audio_driver.encode_planar(init, normalized_ts)
    }

    async fn handle_finalize(&mut self) -> Vec<WorkerMessage> {
        let video_enabled = self.session.video_enabled;
        let audio_enabled = self.session.audio_enabled;

        // Flushes are awaited concurrently (SPEC_FULL.md 5: "their flush
        // calls are awaited concurrently and both must complete before
        // finalize"), even though the underlying FFmpeg calls are
        // synchronous today: this join is what makes the ordering contract
        // hold if either Driver ever moves real work off this thread.
        let video_driver = &mut self.video_driver;
        let audio_driver = &mut self.audio_driver;
        let (video_result, audio_result) = tokio::join!(
            async {
                if video_enabled {
                    video_driver.flush()
                } else {
                    Ok(Vec::new())
                }
            },
            async {
                if audio_enabled {
                    audio_driver.flush()
                } else {
                    Ok(Vec::new())
                }
            },
        );
        self.clear_error_channel();

        let video_chunks = match video_result {
            Ok(chunks) => chunks,
            Err(err) => return self.report_error(err),
        };
        let audio_chunks = match audio_result {
            Ok(chunks) => chunks,
            Err(err) => return self.report_error(err),
        };

        let mut out = Vec::new();
        match self.mux_video_chunks(&video_chunks) {
            Ok(msgs) => out.extend(msgs),
            Err(err) => return self.report_error(err),
        }
        match self.mux_audio_chunks(&audio_chunks) {
            Ok(msgs) => out.extend(msgs),
            Err(err) => return self.report_error(err),
        }

        let finalize_result = match self.muxer.as_mut() {
            Some(muxer) => muxer.finalize(),
            None => Err(PipelineError::MuxingFailed(
                "muxer not initialized".to_string(),
            )),
        };

        match finalize_result {
            Ok(output) => {
                self.video_driver.close();
                self.audio_driver.close();
                self.session.status = SessionStatus::Finalized;
                out.push(WorkerMessage::Finalized { output });
                out
            }
            Err(err) => self.report_error(err),
        }
    }

    fn handle_cancel(&mut self) -> Vec<WorkerMessage> {
        // Idempotent (SPEC_FULL.md 4.5): a session already at rest in
        // Cancelled or Finalized produces no further reply.
        if matches!(
            self.session.status,
            SessionStatus::Cancelled | SessionStatus::Finalized
        ) {
            return Vec::new();
        }

        self.video_driver.close();
        self.audio_driver.close();
        self.muxer = None;
        self.clear_error_channel();
        self.session.status = SessionStatus::Cancelled;
        self.session.cancelled = true;

        vec![WorkerMessage::Cancelled]
    }

    fn mux_video_chunks(&mut self, chunks: &[EncodedChunk]) -> PipelineResult<Vec<WorkerMessage>> {
        let muxer = self.muxer.as_mut().ok_or_else(|| {
            PipelineError::MuxingFailed("no muxer configured for video track".to_string())
        })?;
        let mut out = Vec::new();
        for chunk in chunks {
            let events = muxer.add_video_chunk(chunk)?;
            out.extend(events.into_iter().map(data_chunk_to_message));
        }
        Ok(out)
    }

    fn mux_audio_chunks(&mut self, chunks: &[EncodedChunk]) -> PipelineResult<Vec<WorkerMessage>> {
        let muxer = self.muxer.as_mut().ok_or_else(|| {
            PipelineError::MuxingFailed("no muxer configured for audio track".to_string())
        })?;
        let mut out = Vec::new();
        for chunk in chunks {
            let events = muxer.add_audio_chunk(chunk)?;
            out.extend(events.into_iter().map(data_chunk_to_message));
        }
        Ok(out)
    }

    fn queue_size_event(&self) -> WorkerMessage {
        WorkerMessage::QueueSize {
            video_queue_size: self.video_driver.queue_size(),
            audio_queue_size: self.audio_driver.queue_size(),
        }
    }

    /// Errors that reach a Driver's own error callback are also pushed onto
    /// the shared channel from Design Note 1; this crate's encoder calls
    /// are synchronous so the same failure always arrives here via the
    /// `Result` each call already returns, but the channel is drained all
    /// the same so it never accumulates stale entries across sessions.
    fn clear_error_channel(&mut self) {
        while self.error_rx.try_recv().is_ok() {}
    }

    fn report_error(&mut self, err: PipelineError) -> Vec<WorkerMessage> {
        let kind = err.kind();
        tracing::error!(target: "pipeline::orchestrator", kind = %kind, "{}", err);
        self.session.status = SessionStatus::Poisoned;
        self.clear_error_channel();
        vec![WorkerMessage::Error {
            message: err.to_string(),
            kind,
            stack: Some(err.stack()),
        }]
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn data_chunk_to_message(event: DataChunkEvent) -> WorkerMessage {
    WorkerMessage::DataChunk {
        container: event.container,
        chunk: event.chunk,
        offset: event.offset,
        is_header: event.is_header,
    }
}

fn default_video_codec(container: ContainerFormat) -> VideoCodecKind {
    match container {
        ContainerFormat::Mp4 => VideoCodecKind::Avc,
        _ => VideoCodecKind::Vp9,
    }
}

fn parse_video_codec(s: &str) -> PipelineResult<VideoCodecKind> {
    match s {
        "avc" => Ok(VideoCodecKind::Avc),
        "hevc" => Ok(VideoCodecKind::Hevc),
        "vp9" => Ok(VideoCodecKind::Vp9),
        "vp8" => Ok(VideoCodecKind::Vp8),
        "av1" => Ok(VideoCodecKind::Av1),
        other => Err(PipelineError::ConfigurationError(format!(
            "unsupported video codec {other:?}"
        ))),
    }
}

fn default_audio_codec(container: ContainerFormat) -> AudioCodecKind {
    match container {
        ContainerFormat::Mp4 => AudioCodecKind::Aac,
        _ => AudioCodecKind::Opus,
    }
}

fn parse_audio_codec(s: &str) -> PipelineResult<AudioCodecKind> {
    match s {
        "aac" => Ok(AudioCodecKind::Aac),
        "opus" => Ok(AudioCodecKind::Opus),
        other => Err(PipelineError::ConfigurationError(format!(
            "unsupported audio codec {other:?}"
        ))),
    }
}

/// A coarse fractional approximation of a frame rate expressed as a float,
/// matching the teacher's `video_encoder.rs` which takes whole-number fps
/// as `framerate_num/1`; this adds a `/1000` fallback for fractional rates
/// (e.g. 29.97) so the muxer's time base isn't silently rounded to 30.
fn rational_from_fps(fps: f64) -> (u32, u32) {
    if fps.fract().abs() < f64::EPSILON {
        (fps.max(1.0) as u32, 1)
    } else {
        ((fps * 1000.0).round().max(1.0) as u32, 1000)
    }
}

/// Build a `codec::Frame` from a tightly-packed planar I420 (YUV 4:2:0)
/// buffer at the session's configured resolution. `addVideoFrame` carries
/// the decoded picture as a raw buffer rather than an opaque frame handle
/// (SPEC_FULL.md 3's "Frame-like... inputs" note), so this is the one place
/// that materializes it into the `codec::Frame` the Video Driver expects.
fn frame_from_i420_buffer(data: &[u8], width: u32, height: u32) -> Result<Frame, CodecError> {
    let mut frame = Frame::new_video(width, height, AVPixelFormat::Yuv420p)?;

    let chroma_width = width.div_ceil(2) as usize;
    let chroma_height = (height as usize).div_ceil(2);
    let planes = [
        (width as usize, height as usize),
        (chroma_width, chroma_height),
        (chroma_width, chroma_height),
    ];

    let mut src_offset = 0usize;
    for (plane_index, (plane_width, plane_height)) in planes.into_iter().enumerate() {
        let linesize = frame.linesize(plane_index) as usize;
        let dest = frame.plane_data_mut(plane_index).ok_or_else(|| {
            CodecError::InvalidConfig(format!("video frame is missing plane {plane_index}"))
        })?;

        for row in 0..plane_height {
            let src_start = src_offset + row * plane_width;
            let src_end = src_start + plane_width;
            let Some(src_row) = data.get(src_start..src_end) else {
                return Err(CodecError::InvalidConfig(
                    "video frame buffer is shorter than the configured I420 layout".to_string(),
                ));
            };
            let dest_start = row * linesize;
            dest[dest_start..dest_start + plane_width].copy_from_slice(src_row);
        }
        src_offset += plane_width * plane_height;
    }

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::AVCodecID;
    use std::cell::RefCell;

    /// Accepts every probe by default; tests flip individual codecs off to
    /// script negotiator fallbacks without real FFmpeg encoders.
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
        fn probe_video(
            &self,
            codec_id: AVCodecID,
            _hw_type: Option<crate::ffi::AVHWDeviceType>,
        ) -> bool {
            !self.unsupported_video.borrow().contains(&codec_id)
        }

        fn probe_audio(&self, codec_id: AVCodecID) -> bool {
            !self.unsupported_audio.borrow().contains(&codec_id)
        }
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

    fn new_orchestrator() -> Orchestrator {
        crate::webcodecs::hw_fallback::reset_hardware_fallback_state();
        Orchestrator::with_probe(Box::new(ScriptedProbe::accept_all()))
    }

    #[tokio::test]
    async fn initialize_replies_with_negotiated_codecs() {
        let mut orch = new_orchestrator();
        let replies = orch
            .dispatch(HostMessage::Initialize {
                config: base_config(),
                total_frames: None,
            })
            .await;

        assert_eq!(replies.len(), 1);
        match &replies[0] {
            WorkerMessage::Initialized {
                actual_video_codec,
                actual_audio_codec,
            } => {
                assert_eq!(actual_video_codec.as_deref(), Some("avc1.42001f"));
                assert_eq!(actual_audio_codec.as_deref(), Some("mp4a.40.2"));
            }
            other => panic!("expected Initialized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn initialize_rejects_missing_tracks() {
        let mut orch = new_orchestrator();
        let mut config = base_config();
        config.video_bitrate = 0;
        config.audio_bitrate = 0;

        let replies = orch
            .dispatch(HostMessage::Initialize {
                config,
                total_frames: None,
            })
            .await;

        assert_eq!(replies.len(), 1);
        match &replies[0] {
            WorkerMessage::Error { kind, .. } => {
                assert_eq!(*kind, super::super::error::ErrorKind::ConfigurationError)
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn audio_disabled_initializes_with_no_audio_codec() {
        let mut orch = new_orchestrator();
        let mut config = base_config();
        config.audio_bitrate = 0;

        let replies = orch
            .dispatch(HostMessage::Initialize {
                config,
                total_frames: None,
            })
            .await;

        match &replies[0] {
            WorkerMessage::Initialized {
                actual_audio_codec, ..
            } => assert!(actual_audio_codec.is_none()),
            other => panic!("expected Initialized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn two_consecutive_cancels_produce_exactly_one_reply() {
        let mut orch = new_orchestrator();
        orch.dispatch(HostMessage::Initialize {
            config: base_config(),
            total_frames: None,
        })
        .await;

        let first = orch.dispatch(HostMessage::Cancel).await;
        assert_eq!(first.len(), 1);
        assert!(matches!(first[0], WorkerMessage::Cancelled));

        let second = orch.dispatch(HostMessage::Cancel).await;
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn finalize_after_cancel_produces_no_reply() {
        let mut orch = new_orchestrator();
        orch.dispatch(HostMessage::Initialize {
            config: base_config(),
            total_frames: None,
        })
        .await;
        orch.dispatch(HostMessage::Cancel).await;

        let replies = orch.dispatch(HostMessage::Finalize).await;
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn unsupported_video_codec_cascades_and_warns() {
        let mut orch = {
            crate::webcodecs::hw_fallback::reset_hardware_fallback_state();
            let probe = ScriptedProbe::accept_all();
            probe.unsupported_video.borrow_mut().push(AVCodecID::Vp9);
            Orchestrator::with_probe(Box::new(probe))
        };
        let mut config = base_config();
        config.video_codec = Some("vp9".to_string());
        config.container = "webm".to_string();
        config.audio_codec = Some("opus".to_string());

        let replies = orch
            .dispatch(HostMessage::Initialize {
                config,
                total_frames: None,
            })
            .await;

        match &replies[0] {
            WorkerMessage::Initialized {
                actual_video_codec, ..
            } => {
                assert!(actual_video_codec.as_deref().unwrap().starts_with("avc1."));
            }
            other => panic!("expected Initialized, got {other:?}"),
        }
    }

    #[test]
    fn frame_from_i420_buffer_rejects_short_input() {
        let buf = vec![0u8; 4];
        let err = frame_from_i420_buffer(&buf, 16, 16).unwrap_err();
        assert!(matches!(err, CodecError::InvalidConfig(_)));
    }

    #[test]
    fn rational_from_fps_keeps_whole_numbers_exact() {
        assert_eq!(rational_from_fps(30.0), (30, 1));
        assert_eq!(rational_from_fps(60.0), (60, 1));
    }

    #[test]
    fn rational_from_fps_approximates_fractional_rates() {
        let (num, den) = rational_from_fps(29.97);
        assert_eq!(den, 1000);
        assert!((num as f64 / den as f64 - 29.97).abs() < 0.001);
    }
}
