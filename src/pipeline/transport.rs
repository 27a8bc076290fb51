//! Host↔Worker transport
//!
//! Two closed Rust enums carry the full message protocol (Design Note:
//! "dynamic `postMessage` protocol -> tagged variants"). Napi-bridged the
//! way the teacher bridges `Either<A, B>` unions and `#[napi(object)]`
//! structs elsewhere in `webcodecs::*`.

use napi::bindgen_prelude::*;
use napi_derive::napi;

use std::sync::Arc;

use crate::webcodecs::AudioData;

use super::error::ErrorKind;

/// Mirrors `EncoderConfig` in SPEC_FULL.md 3, the immutable per-session
/// configuration a host sends with `initialize`.
#[napi(object)]
#[derive(Debug, Clone)]
pub struct EncoderConfigJs {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    pub sample_rate: u32,
    pub channels: u32,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub video_codec_string: Option<String>,
    pub audio_codec_string: Option<String>,
    pub container: String,
    pub latency_mode: String,
    pub hardware_acceleration: String,
    pub key_frame_interval: Option<u32>,
    pub first_timestamp_behavior: String,
}

/// A planar `Float32` audio submission, the non-prebuilt half of
/// "addAudioData" (SPEC_FULL.md 6).
#[napi(object)]
#[derive(Debug, Clone)]
pub struct PlanarAudioInitJs {
    pub planes: Vec<Float32Array>,
    pub sample_rate: u32,
    pub number_of_frames: u32,
    pub number_of_channels: u32,
}

/// Host -> Worker messages. Exactly the set in SPEC_FULL.md 6; the
/// payload is read only after the variant is decided (Design Note 2).
pub enum HostMessage {
    Initialize {
        config: EncoderConfigJs,
        total_frames: Option<u64>,
    },
    AddVideoFrame {
        frame: Buffer,
        timestamp_us: i64,
    },
    AddAudioData {
        /// An already-constructed audio-data value, the prebuilt half of
        /// "addAudioData"'s dual input contract. Takes precedence over
        /// `planar` when both are somehow present.
        audio: Option<Arc<AudioData>>,
        planar: Option<PlanarAudioInitJs>,
        timestamp_us: i64,
    },
    ConnectAudioPort {
        port_rx: tokio::sync::mpsc::Receiver<HostMessage>,
    },
    Finalize,
    Cancel,
}

/// Worker -> Host messages.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    Initialized {
        actual_video_codec: Option<String>,
        actual_audio_codec: Option<String>,
    },
    Progress {
        processed_frames: u64,
        total_frames: u64,
    },
    QueueSize {
        video_queue_size: u32,
        audio_queue_size: u32,
    },
    DataChunk {
        container: &'static str,
        chunk: Vec<u8>,
        offset: u64,
        is_header: bool,
    },
    Finalized {
        output: Option<Vec<u8>>,
    },
    Cancelled,
    Error {
        message: String,
        kind: ErrorKind,
        stack: Option<String>,
    },
}

impl WorkerMessage {
    /// The `type` discriminant string used on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Initialized { .. } => "initialized",
            Self::Progress { .. } => "progress",
            Self::QueueSize { .. } => "queueSize",
            Self::DataChunk { .. } => "dataChunk",
            Self::Finalized { .. } => "finalized",
            Self::Cancelled => "cancelled",
            Self::Error { .. } => "error",
        }
    }
}

/// Napi-facing mirror of `WorkerMessage`, the shape actually handed back
/// across the FFI boundary (tagged by `r#type`, matching the teacher's
/// `#[napi(object)]` + discriminant-field convention).
#[napi(object)]
#[derive(Debug, Clone)]
pub struct WorkerMessageJs {
    pub r#type: String,
    pub actual_video_codec: Option<String>,
    pub actual_audio_codec: Option<String>,
    pub processed_frames: Option<BigInt>,
    pub total_frames: Option<BigInt>,
    pub video_queue_size: Option<u32>,
    pub audio_queue_size: Option<u32>,
    pub container: Option<String>,
    pub chunk: Option<Buffer>,
    pub offset: Option<BigInt>,
    pub is_header: Option<bool>,
    pub output: Option<Buffer>,
    pub error_message: Option<String>,
    pub error_type: Option<String>,
    pub error_stack: Option<String>,
}

impl From<WorkerMessage> for WorkerMessageJs {
    fn from(msg: WorkerMessage) -> Self {
        let r#type = msg.type_name().to_string();
        let mut js = WorkerMessageJs {
            r#type,
            actual_video_codec: None,
            actual_audio_codec: None,
            processed_frames: None,
            total_frames: None,
            video_queue_size: None,
            audio_queue_size: None,
            container: None,
            chunk: None,
            offset: None,
            is_header: None,
            output: None,
            error_message: None,
            error_type: None,
            error_stack: None,
        };
        match msg {
            WorkerMessage::Initialized {
                actual_video_codec,
                actual_audio_codec,
            } => {
                js.actual_video_codec = actual_video_codec;
                js.actual_audio_codec = actual_audio_codec;
            }
            WorkerMessage::Progress {
                processed_frames,
                total_frames,
            } => {
                js.processed_frames = Some(BigInt::from(processed_frames));
                js.total_frames = Some(BigInt::from(total_frames));
            }
            WorkerMessage::QueueSize {
                video_queue_size,
                audio_queue_size,
            } => {
                js.video_queue_size = Some(video_queue_size);
                js.audio_queue_size = Some(audio_queue_size);
            }
            WorkerMessage::DataChunk {
                container,
                chunk,
                offset,
                is_header,
            } => {
                js.container = Some(container.to_string());
                js.chunk = Some(Buffer::from(chunk));
                js.offset = Some(BigInt::from(offset));
                js.is_header = Some(is_header);
            }
            WorkerMessage::Finalized { output } => {
                js.output = output.map(Buffer::from);
            }
            WorkerMessage::Cancelled => {}
            WorkerMessage::Error {
                message,
                kind,
                stack,
            } => {
                js.error_message = Some(message);
                js.error_type = Some(kind.as_str().to_string());
                js.error_stack = stack;
            }
        }
        js
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_match_wire_protocol() {
        assert_eq!(
            WorkerMessage::Cancelled.type_name(),
            "cancelled"
        );
        assert_eq!(
            WorkerMessage::Finalized { output: None }.type_name(),
            "finalized"
        );
    }

    #[test]
    fn data_chunk_converts_to_js_shape_with_offset_and_header_flag() {
        let msg = WorkerMessage::DataChunk {
            container: "webm",
            chunk: vec![1, 2, 3],
            offset: 0,
            is_header: true,
        };
        let js: WorkerMessageJs = msg.into();
        assert_eq!(js.r#type, "dataChunk");
        assert_eq!(js.container.as_deref(), Some("webm"));
        assert_eq!(js.is_header, Some(true));
    }

    #[test]
    fn error_message_carries_kind_string() {
        let msg = WorkerMessage::Error {
            message: "boom".into(),
            kind: ErrorKind::MuxingFailed,
            stack: None,
        };
        let js: WorkerMessageJs = msg.into();
        assert_eq!(js.error_type.as_deref(), Some("muxing-failed"));
    }
}
