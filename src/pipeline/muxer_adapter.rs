//! Muxer Adapter
//!
//! Wraps `codec::MuxerContext` behind a uniform chunk-append + finalize
//! interface, in batch (in-memory buffer) or streaming (fragmented,
//! chunk-forwarding) mode. Grounded directly on
//! `webcodecs::muxer_base::MuxerInner<F>` — the monotonic-PTS clamp,
//! lazy-header-on-first-chunk, and extradata-update-on-keyframe logic
//! below are the same algorithm, retargeted from napi `EncodedVideoChunk`/
//! `EncodedAudioChunkMetadataJs` parameters to `pipeline::EncodedChunk`/
//! `ChunkMeta`, and from a raw `ThreadsafeFunction` streaming callback to
//! `pipeline::transport::WorkerMessage::DataChunk`.

use crate::codec::muxer::{
    AudioStreamConfig, ContainerFormat, MuxerContext, MuxerOptions, MuxerOutput, VideoStreamConfig,
};
use crate::codec::{CodecError, Packet};
use crate::ffi::{AVCodecID, AVPixelFormat, AVRational, AVSampleFormat};

use super::chunk::{ChunkMeta, DataChunkEvent, EncodedChunk};
use super::error::PipelineError;

/// Which track layout the adapter was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MuxState {
    ConfiguringTracks,
    Muxing,
    Finalized,
}

/// Video track parameters fixed at construction
#[derive(Debug, Clone)]
pub struct VideoTrackConfig {
    pub codec_id: AVCodecID,
    pub width: u32,
    pub height: u32,
    pub extradata: Option<Vec<u8>>,
}

/// Audio track parameters fixed at construction
#[derive(Debug, Clone)]
pub struct AudioTrackConfig {
    pub codec_id: AVCodecID,
    pub sample_rate: u32,
    pub channels: u32,
    pub frame_size: Option<u32>,
    pub extradata: Option<Vec<u8>>,
}

/// The adapter's build mode, matching SPEC_FULL.md 4.4
pub enum MuxerMode {
    /// `fastStart = "in-memory"`; `finalize` returns the complete container
    Batch,
    /// `fastStart = "fragmented"`; every appended run is forwarded as a `DataChunkEvent`
    Streaming { buffer_capacity: usize },
}

pub struct MuxerAdapter {
    container: &'static str,
    muxer: MuxerContext,
    state: MuxState,
    is_streaming: bool,
    video_stream_index: Option<i32>,
    audio_stream_index: Option<i32>,
    last_video_pts: i64,
    last_audio_pts: i64,
    audio_sample_rate: u32,
    streamed_bytes: u64,
    muxer_options: MuxerOptions,
}

impl MuxerAdapter {
    /// Construct the adapter, adding whichever tracks are not disabled.
    /// `disable_audio` mirrors the Negotiator's audio-disabled short
    /// circuit (SPEC_FULL.md 4.1 step 5): no audio stream is added and
    /// `add_audio_chunk` becomes illegal.
    pub fn new(
        container: ContainerFormat,
        mode: MuxerMode,
        video: Option<VideoTrackConfig>,
        audio: Option<AudioTrackConfig>,
    ) -> Result<Self, PipelineError> {
        let (output, is_streaming, fragmented) = match mode {
            MuxerMode::Batch => (MuxerOutput::Buffer, false, false),
            MuxerMode::Streaming { buffer_capacity } => {
                (MuxerOutput::Streaming(buffer_capacity), true, true)
            }
        };

        let mut muxer = MuxerContext::new(container, output)
            .map_err(|e| PipelineError::MuxingFailed(e.to_string()))?;

        let mut video_stream_index = None;
        if let Some(cfg) = video {
            let stream_config = VideoStreamConfig {
                codec_id: cfg.codec_id,
                width: cfg.width,
                height: cfg.height,
                pixel_format: AVPixelFormat::Yuv420p,
                time_base: AVRational::MICROSECONDS,
                bitrate: None,
                extradata: cfg.extradata,
            };
            video_stream_index = Some(
                muxer
                    .add_video_stream(&stream_config)
                    .map_err(|e| PipelineError::MuxingFailed(e.to_string()))?,
            );
        }

        let mut audio_stream_index = None;
        let mut audio_sample_rate = 48_000;
        if let Some(cfg) = audio {
            audio_sample_rate = cfg.sample_rate;
            let stream_config = AudioStreamConfig {
                codec_id: cfg.codec_id,
                sample_rate: cfg.sample_rate,
                channels: cfg.channels,
                sample_format: AVSampleFormat::Fltp,
                time_base: AVRational::new(1, cfg.sample_rate as i32),
                bitrate: None,
                frame_size: cfg.frame_size,
                extradata: cfg.extradata,
            };
            audio_stream_index = Some(
                muxer
                    .add_audio_stream(&stream_config)
                    .map_err(|e| PipelineError::MuxingFailed(e.to_string()))?,
            );
        }

        Ok(Self {
            container: container.extension(),
            muxer,
            state: MuxState::ConfiguringTracks,
            is_streaming,
            video_stream_index,
            audio_stream_index,
            last_video_pts: -1,
            last_audio_pts: -1,
            audio_sample_rate,
            streamed_bytes: 0,
            muxer_options: MuxerOptions {
                fast_start: !fragmented,
                fragmented,
                live: false,
            },
        })
    }

    fn ensure_header_written(&mut self) -> Result<(), PipelineError> {
        if self.state == MuxState::ConfiguringTracks {
            self.muxer
                .write_header(Some(&self.muxer_options))
                .map_err(|e| PipelineError::MuxingFailed(e.to_string()))?;
            self.state = MuxState::Muxing;
        }
        Ok(())
    }

    /// Append an encoded video chunk, draining streaming output afterward
    /// if streaming mode is active.
    pub fn add_video_chunk(
        &mut self,
        chunk: &EncodedChunk,
    ) -> Result<Vec<DataChunkEvent>, PipelineError> {
        let video_index = self
            .video_stream_index
            .ok_or_else(|| PipelineError::MuxingFailed("no video track added".to_string()))?;

        self.ensure_header_written()?;

        let mut packet =
            chunk_to_packet(chunk).map_err(|e| PipelineError::MuxingFailed(e.to_string()))?;
        packet.set_stream_index(video_index);

        let pts = if chunk.timestamp_us <= self.last_video_pts {
            self.last_video_pts + 1
        } else {
            chunk.timestamp_us
        };
        self.last_video_pts = pts;
        packet.set_pts(pts);
        packet.set_dts(pts);
        if let Some(duration) = chunk.duration_us {
            packet.set_duration(duration);
        }
        if chunk.is_key() {
            packet.set_flags(crate::ffi::pkt_flag::KEY);
        }

        self.apply_metadata(&chunk.meta, TrackKind::Video, &mut packet);

        self.muxer
            .write_packet(&mut packet)
            .map_err(|e| PipelineError::MuxingFailed(e.to_string()))?;

        self.drain_streaming()
    }

    /// Append an encoded audio chunk, draining streaming output afterward
    /// if streaming mode is active.
    pub fn add_audio_chunk(
        &mut self,
        chunk: &EncodedChunk,
    ) -> Result<Vec<DataChunkEvent>, PipelineError> {
        let audio_index = self
            .audio_stream_index
            .ok_or_else(|| PipelineError::MuxingFailed("no audio track added".to_string()))?;

        self.ensure_header_written()?;

        let mut packet =
            chunk_to_packet(chunk).map_err(|e| PipelineError::MuxingFailed(e.to_string()))?;
        packet.set_stream_index(audio_index);

        let sample_rate = self.audio_sample_rate as i64;
        let pts_in_samples = chunk.timestamp_us * sample_rate / 1_000_000;
        let pts = if pts_in_samples <= self.last_audio_pts {
            self.last_audio_pts + 1
        } else {
            pts_in_samples
        };
        self.last_audio_pts = pts;
        packet.set_pts(pts);
        packet.set_dts(pts);
        if let Some(duration) = chunk.duration_us {
            packet.set_duration(duration * sample_rate / 1_000_000);
        }
        // Audio packets are typically all keyframes.
        packet.set_flags(crate::ffi::pkt_flag::KEY);

        self.apply_metadata(&chunk.meta, TrackKind::Audio, &mut packet);

        self.muxer
            .write_packet(&mut packet)
            .map_err(|e| PipelineError::MuxingFailed(e.to_string()))?;

        self.drain_streaming()
    }

    fn apply_metadata(&mut self, meta: &ChunkMeta, track: TrackKind, packet: &mut Packet) {
        if let Some(description) = meta.decoder_description.as_ref() {
            if !description.is_empty() {
                let result = match track {
                    TrackKind::Video => self.muxer.update_video_extradata(description),
                    TrackKind::Audio => self.muxer.update_audio_extradata(description),
                };
                if let Err(e) = result {
                    tracing::warn!(target: "pipeline", "failed to update {:?} extradata: {}", track, e);
                }
            }
        }
        if let Some(alpha) = meta.alpha_side_data.as_ref() {
            if !alpha.is_empty() {
                if let Err(e) = packet.add_matroska_blockadditional(alpha) {
                    tracing::warn!(target: "pipeline", "failed to add alpha side data: {}", e);
                }
            }
        }
    }

    /// Flush any buffered packets in the interleaver.
    pub fn flush(&mut self) -> Result<(), PipelineError> {
        if self.state == MuxState::Muxing {
            self.muxer
                .flush()
                .map_err(|e| PipelineError::MuxingFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Finalize the container. Batch mode returns the complete bytes;
    /// streaming mode returns `None` (the bytes were already forwarded via
    /// `DataChunkEvent`s, but finalize must still run to write trailing
    /// boxes such as MP4's `mfra`).
    pub fn finalize(&mut self) -> Result<Option<Vec<u8>>, PipelineError> {
        if self.state == MuxState::ConfiguringTracks {
            if self.video_stream_index.is_none() && self.audio_stream_index.is_none() {
                return Err(PipelineError::MuxingFailed(
                    "no tracks added to muxer".to_string(),
                ));
            }
            self.ensure_header_written()?;
        }
        if self.state == MuxState::Finalized {
            return Err(PipelineError::MuxingFailed(
                "muxer already finalized".to_string(),
            ));
        }

        self.muxer
            .finalize()
            .map_err(|e| PipelineError::MuxingFailed(e.to_string()))?;
        self.state = MuxState::Finalized;

        if self.is_streaming {
            self.muxer.finish_streaming();
            return Ok(None);
        }

        let data = self
            .muxer
            .take_buffer()
            .ok_or_else(|| PipelineError::MuxingFailed("failed to take output buffer".into()))?;
        Ok(Some(data))
    }

    /// Drain whatever the streaming sink has accumulated since the last
    /// call, tagging the very first run as the container header.
    fn drain_streaming(&mut self) -> Result<Vec<DataChunkEvent>, PipelineError> {
        if !self.is_streaming {
            return Ok(Vec::new());
        }
        let Some(handle) = self.muxer.get_streaming_handle() else {
            return Ok(Vec::new());
        };
        let mut events = Vec::new();
        if let Some(bytes) = handle.read_available() {
            if !bytes.is_empty() {
                let is_header = self.streamed_bytes == 0;
                let offset = self.streamed_bytes;
                self.streamed_bytes += bytes.len() as u64;
                events.push(DataChunkEvent {
                    container: self.container,
                    chunk: bytes,
                    offset,
                    is_header,
                });
            }
        }
        Ok(events)
    }
}

#[derive(Debug, Clone, Copy)]
enum TrackKind {
    Video,
    Audio,
}

fn chunk_to_packet(chunk: &EncodedChunk) -> Result<Packet, CodecError> {
    let mut packet = Packet::new()?;
    packet.copy_data_from(&chunk.data)?;
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::chunk::ChunkKind;

    #[test]
    fn batch_adapter_with_no_tracks_rejects_finalize() {
        let mut adapter =
            MuxerAdapter::new(ContainerFormat::Mp4, MuxerMode::Batch, None, None).unwrap();
        assert!(adapter.finalize().is_err());
    }

    #[test]
    fn monotonic_pts_clamp_never_regresses() {
        // Mirrors `muxer_base.rs`'s clamp: an out-of-order timestamp bumps
        // by exactly one unit rather than going backward.
        let mut last = 10i64;
        let incoming = 5i64;
        let pts = if incoming <= last { last + 1 } else { incoming };
        last = pts;
        assert_eq!(last, 11);
    }

    #[test]
    fn video_track_missing_rejects_video_chunk() {
        let mut adapter =
            MuxerAdapter::new(ContainerFormat::Mp4, MuxerMode::Batch, None, None).unwrap();
        let chunk = EncodedChunk::new(ChunkKind::Key, 0, None, vec![0u8; 4]);
        assert!(adapter.add_video_chunk(&chunk).is_err());
    }
}
