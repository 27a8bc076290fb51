//! Video Encoder Driver
//!
//! Configures a video encoder context, submits decoded frames, and emits
//! `EncodedChunk`s. Grounded on `webcodecs::video_encoder::VideoEncoder`
//! (its `configure`/`encode`/`flush` bodies), generalized to a plain Rust
//! struct driven by the Orchestrator's message loop instead of a napi
//! class, and reporting errors over an explicit `crossbeam::channel`
//! instead of a `ThreadsafeFunction` error callback.

use crossbeam::channel::Sender;

use crate::codec::{CodecContext, EncoderConfig, Frame, Scaler};
use crate::ffi::{AVCodecID, AVHWDeviceType, AVPixelFormat};

use super::chunk::{ChunkKind, ChunkMeta, EncodedChunk};
use super::error::PipelineError;

/// Driver state machine, per SPEC_FULL.md 4.3: the teacher's `CodecState`
/// conflates flushing into `Configured`; this adds the missing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Unconfigured,
    Configured,
    Flushing,
    Closed,
}

/// How the driver should pace keyframes and B-frame depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyMode {
    Quality,
    Realtime,
}

/// Arguments produced by the Negotiator for the video track
#[derive(Debug, Clone)]
pub struct VideoDriverConfig {
    pub codec_id: AVCodecID,
    pub width: u32,
    pub height: u32,
    pub framerate_num: u32,
    pub framerate_den: u32,
    pub bitrate: u64,
    pub latency_mode: LatencyMode,
    pub key_frame_interval: Option<u32>,
    pub hw_type: Option<AVHWDeviceType>,
}

/// Per-call hints attached to an `encode` submission
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeHints {
    pub force_key_frame: bool,
}

/// Emitted after a successful encode submission, mirroring the
/// `progress`/`queueSize` events the Orchestrator forwards to the host
#[derive(Debug, Clone, Copy)]
pub struct VideoEncodeOutcome {
    pub chunks_emitted: usize,
    pub processed_frames: u64,
}

pub struct VideoDriver {
    state: DriverState,
    config: Option<VideoDriverConfig>,
    context: Option<CodecContext>,
    scaler: Option<Scaler>,
    extradata_sent: bool,
    processed_frames: u64,
    /// Frames submitted to the codec but not yet returned as packets,
    /// i.e. buffered inside the encoder's own reorder window. Backs the
    /// `queueSize` event (SPEC_FULL.md 4.5).
    queued_frames: i64,
    error_tx: Sender<PipelineError>,
}

impl VideoDriver {
    pub fn new(error_tx: Sender<PipelineError>) -> Self {
        Self {
            state: DriverState::Unconfigured,
            config: None,
            context: None,
            scaler: None,
            extradata_sent: false,
            processed_frames: 0,
            queued_frames: 0,
            error_tx,
        }
    }

    /// Frames submitted but not yet emitted as encoded chunks
    pub fn queue_size(&self) -> u32 {
        self.queued_frames.max(0) as u32
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        self.state = DriverState::Closed;
        let _ = self.error_tx.send(err.clone());
        err
    }

    /// Configure the encoder. Illegal once `Configured` (mirrors the
    /// driver state machine: `configure` from `Configured` is fatal).
    pub fn configure(&mut self, args: VideoDriverConfig) -> Result<(), PipelineError> {
        if self.state == DriverState::Configured || self.state == DriverState::Flushing {
            let err = PipelineError::ConfigurationError(
                "video driver already configured".to_string(),
            );
            return Err(self.fail(err));
        }
        if self.state == DriverState::Closed {
            let err = PipelineError::ConfigurationError("video driver is closed".to_string());
            return Err(err);
        }

        let mut context = CodecContext::new_encoder_with_hw(args.codec_id, args.hw_type)
            .map_err(|e| self.fail(PipelineError::InitializationFailed(e.to_string())))?;

        // Keyframe cadence and B-frame depth follow latency mode, matching
        // the teacher's realtime-vs-quality table in `video_encoder.rs`.
        let (gop_size, max_b_frames) = match args.latency_mode {
            LatencyMode::Realtime => (10, 0),
            LatencyMode::Quality => (60, 2),
        };
        let gop_size = args.key_frame_interval.unwrap_or(gop_size);

        let encoder_config = EncoderConfig {
            width: args.width,
            height: args.height,
            pixel_format: AVPixelFormat::Yuv420p,
            bitrate: args.bitrate,
            framerate_num: args.framerate_num,
            framerate_den: args.framerate_den,
            gop_size,
            max_b_frames,
            ..EncoderConfig::default()
        };

        context
            .configure_encoder(&encoder_config)
            .map_err(|e| self.fail(PipelineError::InitializationFailed(e.to_string())))?;
        context
            .open()
            .map_err(|e| self.fail(PipelineError::InitializationFailed(e.to_string())))?;

        self.context = Some(context);
        self.scaler = None;
        self.extradata_sent = false;
        self.processed_frames = 0;
        self.queued_frames = 0;
        self.config = Some(args);
        self.state = DriverState::Configured;

        Ok(())
    }

    /// Encode one decoded frame. `timestamp_us` has already passed through
    /// the Timestamp Normalizer. Returns the chunks produced (usually zero
    /// or one, but an encoder may buffer and emit in bursts).
    pub fn encode(
        &mut self,
        frame: &Frame,
        timestamp_us: i64,
        hints: EncodeHints,
    ) -> Result<Vec<EncodedChunk>, PipelineError> {
        if self.state != DriverState::Configured {
            let err =
                PipelineError::VideoEncodingError("video driver not configured".to_string());
            return Err(self.fail(err));
        }

        let args = self
            .config
            .as_ref()
            .ok_or_else(|| PipelineError::InternalError("missing video driver config".into()))?;

        let needs_conversion = frame.format() != AVPixelFormat::Yuv420p
            || frame.width() != args.width
            || frame.height() != args.height;

        let mut owned_frame = if needs_conversion {
            if self.scaler.is_none() {
                let scaler = Scaler::new(
                    frame.width(),
                    frame.height(),
                    frame.format(),
                    args.width,
                    args.height,
                    AVPixelFormat::Yuv420p,
                    Default::default(),
                )
                .map_err(|e| self.fail(PipelineError::VideoEncodingError(e.to_string())))?;
                self.scaler = Some(scaler);
            }
            self.scaler
                .as_ref()
                .unwrap()
                .scale_alloc(frame)
                .map_err(|e| self.fail(PipelineError::VideoEncodingError(e.to_string())))?
        } else {
            frame
                .try_clone()
                .map_err(|e| self.fail(PipelineError::VideoEncodingError(e.to_string())))?
        };
        owned_frame.set_pts(timestamp_us);

        let keyframe_requested = hints.force_key_frame
            || args
                .key_frame_interval
                .map(|interval| interval > 0 && self.processed_frames % interval as u64 == 0)
                .unwrap_or(false);
        if keyframe_requested {
            owned_frame.force_key_frame();
        }
        let frame_to_encode = &owned_frame;

        let extradata = if !self.extradata_sent {
            self.context
                .as_ref()
                .and_then(|ctx| ctx.extradata().map(|d| d.to_vec()))
        } else {
            None
        };

        let context = self
            .context
            .as_mut()
            .ok_or_else(|| PipelineError::InternalError("missing video codec context".into()))?;

        let packets = context
            .encode(Some(frame_to_encode))
            .map_err(|e| self.fail(PipelineError::VideoEncodingError(e.to_string())))?;

        self.processed_frames += 1;
        self.queued_frames += 1 - packets.len() as i64;

        let mut chunks = Vec::with_capacity(packets.len());
        for packet in &packets {
            let kind = if packet.is_key() {
                ChunkKind::Key
            } else {
                ChunkKind::Delta
            };
            let mut meta = ChunkMeta::default();
            if !self.extradata_sent && packet.is_key() {
                meta.decoder_description = extradata.clone();
                self.extradata_sent = true;
            }
            let mut chunk = EncodedChunk::new(kind, timestamp_us, None, packet.to_vec());
            chunk.meta = meta;
            chunks.push(chunk);
        }

        Ok(chunks)
    }

    /// Flush buffered frames out of the encoder. Moves `Configured ->
    /// Flushing -> Configured` on success (per the state machine in
    /// SPEC_FULL.md 4.3: `flush` completes when all submitted items are
    /// emitted, then the driver is ready for another `encode` or `close`).
    pub fn flush(&mut self) -> Result<Vec<EncodedChunk>, PipelineError> {
        if self.state != DriverState::Configured {
            let err =
                PipelineError::VideoEncodingError("video driver not configured".to_string());
            return Err(self.fail(err));
        }
        self.state = DriverState::Flushing;

        let context = self
            .context
            .as_mut()
            .ok_or_else(|| PipelineError::InternalError("missing video codec context".into()))?;

        let packets = context
            .flush_encoder()
            .map_err(|e| self.fail(PipelineError::VideoEncodingError(e.to_string())))?;

        let chunks = packets
            .iter()
            .map(|packet| {
                let kind = if packet.is_key() {
                    ChunkKind::Key
                } else {
                    ChunkKind::Delta
                };
                EncodedChunk::new(kind, 0, None, packet.to_vec())
            })
            .collect();

        self.queued_frames = 0;
        self.state = DriverState::Configured;
        Ok(chunks)
    }

    pub fn close(&mut self) {
        self.context = None;
        self.scaler = None;
        self.config = None;
        self.queued_frames = 0;
        self.state = DriverState::Closed;
    }

    pub fn processed_frames(&self) -> u64 {
        self.processed_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn starts_unconfigured() {
        let (tx, _rx) = unbounded();
        let driver = VideoDriver::new(tx);
        assert_eq!(driver.state(), DriverState::Unconfigured);
    }

    #[test]
    fn gop_table_follows_latency_mode() {
        // realtime -> (10, 0), quality -> (60, 2), matching the teacher's table.
        let realtime = match LatencyMode::Realtime {
            LatencyMode::Realtime => (10u32, 0u32),
            LatencyMode::Quality => (60, 2),
        };
        assert_eq!(realtime, (10, 0));
        let quality = match LatencyMode::Quality {
            LatencyMode::Realtime => (10u32, 0u32),
            LatencyMode::Quality => (60, 2),
        };
        assert_eq!(quality, (60, 2));
    }

    #[test]
    fn encode_before_configure_reports_error_and_closes() {
        let (tx, rx) = unbounded();
        let mut driver = VideoDriver::new(tx);
        let frame = Frame::new_video(64, 64, AVPixelFormat::Yuv420p).unwrap();
        let result = driver.encode(&frame, 0, EncodeHints::default());
        assert!(result.is_err());
        assert_eq!(driver.state(), DriverState::Closed);
        assert!(rx.try_recv().is_ok());
    }
}
