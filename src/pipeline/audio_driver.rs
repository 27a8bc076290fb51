//! Audio Encoder Driver
//!
//! Configures an audio encoder context, accumulates samples into
//! codec-sized frames, and emits `EncodedChunk`s. Grounded on
//! `webcodecs::audio_encoder::AudioEncoder` (its `configure`/`encode`/
//! `flush` bodies), generalized the same way `pipeline::video_driver`
//! generalizes `VideoEncoder`: a plain Rust struct, an explicit
//! `crossbeam::channel` error path instead of a `ThreadsafeFunction`.

use crossbeam::channel::Sender;

use crate::codec::context::get_audio_encoder_name;
use crate::codec::{AudioEncoderConfig, AudioSampleBuffer, CodecContext, Frame, Resampler};
use crate::ffi::{AVCodecID, AVSampleFormat};

use super::chunk::{ChunkKind, ChunkMeta, EncodedChunk};
use super::error::PipelineError;
use super::video_driver::DriverState;

/// Arguments produced by the Negotiator for the audio track
#[derive(Debug, Clone)]
pub struct AudioDriverConfig {
    pub codec_id: AVCodecID,
    pub codec_name: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub bitrate: u64,
}

/// A planar `Float32` submission, the non-prebuilt half of
/// "Frame-like and audio-data-like inputs" (SPEC_FULL.md 3).
pub struct PlanarAudioInit<'a> {
    pub planes: &'a [&'a [f32]],
    pub sample_rate: u32,
    pub number_of_channels: u32,
    pub number_of_frames: u32,
}

pub struct AudioDriver {
    state: DriverState,
    config: Option<AudioDriverConfig>,
    context: Option<CodecContext>,
    resampler: Option<Resampler>,
    sample_buffer: Option<AudioSampleBuffer>,
    target_format: AVSampleFormat,
    frame_count: u64,
    extradata_sent: bool,
    /// Submissions accepted but not yet drained into encoded chunks. Backs
    /// the `queueSize` event (SPEC_FULL.md 4.5).
    queued_submissions: i64,
    error_tx: Sender<PipelineError>,
}

impl AudioDriver {
    pub fn new(error_tx: Sender<PipelineError>) -> Self {
        Self {
            state: DriverState::Unconfigured,
            config: None,
            context: None,
            resampler: None,
            sample_buffer: None,
            target_format: AVSampleFormat::Fltp,
            frame_count: 0,
            extradata_sent: false,
            queued_submissions: 0,
            error_tx,
        }
    }

    /// Submissions accepted but not yet emitted as encoded chunks
    pub fn queue_size(&self) -> u32 {
        self.queued_submissions.max(0) as u32
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        self.state = DriverState::Closed;
        let _ = self.error_tx.send(err.clone());
        err
    }

    pub fn configure(&mut self, args: AudioDriverConfig) -> Result<(), PipelineError> {
        if self.state == DriverState::Configured || self.state == DriverState::Flushing {
            return Err(self.fail(PipelineError::ConfigurationError(
                "audio driver already configured".to_string(),
            )));
        }
        if self.state == DriverState::Closed {
            return Err(PipelineError::ConfigurationError(
                "audio driver is closed".to_string(),
            ));
        }

        let encoder_name = get_audio_encoder_name(args.codec_id);
        let mut context = if let Some(name) = encoder_name {
            CodecContext::new_encoder_by_name(name)
                .or_else(|_| CodecContext::new_encoder(args.codec_id))
        } else {
            CodecContext::new_encoder(args.codec_id)
        }
        .map_err(|e| self.fail(PipelineError::InitializationFailed(e.to_string())))?;

        let target_format = encoder_sample_format(args.codec_id);

        let encoder_config = AudioEncoderConfig {
            sample_rate: args.sample_rate,
            channels: args.channels,
            sample_format: target_format,
            bitrate: args.bitrate,
            thread_count: 0,
        };
        context
            .configure_audio_encoder(&encoder_config)
            .map_err(|e| self.fail(PipelineError::InitializationFailed(e.to_string())))?;
        context
            .open()
            .map_err(|e| self.fail(PipelineError::InitializationFailed(e.to_string())))?;

        let frame_size = context.frame_size();
        let frame_size = if frame_size == 0 {
            AudioSampleBuffer::frame_size_for_codec(&args.codec_name)
        } else {
            frame_size as usize
        };
        let sample_buffer =
            AudioSampleBuffer::new(frame_size, args.channels, args.sample_rate, target_format);

        self.context = Some(context);
        self.sample_buffer = Some(sample_buffer);
        self.target_format = target_format;
        self.resampler = None;
        self.frame_count = 0;
        self.extradata_sent = false;
        self.queued_submissions = 0;
        self.config = Some(args);
        self.state = DriverState::Configured;

        Ok(())
    }

    /// Encode an already-constructed audio-data frame (the
    /// `webcodecs::AudioData`/`codec::Frame` path).
    pub fn encode(
        &mut self,
        data: &Frame,
        timestamp_us: i64,
        src_format: AVSampleFormat,
    ) -> Result<Vec<EncodedChunk>, PipelineError> {
        if self.state != DriverState::Configured {
            return Err(self.fail(PipelineError::AudioEncodingError(
                "audio driver not configured".to_string(),
            )));
        }

        let args = self
            .config
            .as_ref()
            .ok_or_else(|| PipelineError::InternalError("missing audio driver config".into()))?;

        if data.channels() != args.channels {
            return Err(self.fail(PipelineError::ConfigurationError(format!(
                "audio data has {} channels, encoder configured for {}",
                data.channels(),
                args.channels
            ))));
        }

        let needs_resampling = data.sample_rate() != args.sample_rate
            || data.channels() != args.channels
            || src_format != self.target_format;

        if needs_resampling && self.resampler.is_none() {
            let resampler = Resampler::new(
                data.channels(),
                data.sample_rate(),
                src_format,
                args.channels,
                args.sample_rate,
                self.target_format,
            )
            .map_err(|e| self.fail(PipelineError::AudioEncodingError(e.to_string())))?;
            self.resampler = Some(resampler);
        }

        let frame_to_add = if let Some(resampler) = self.resampler.as_mut() {
            resampler
                .convert_alloc(data)
                .map_err(|e| self.fail(PipelineError::AudioEncodingError(e.to_string())))?
        } else {
            data.try_clone()
                .map_err(|e| self.fail(PipelineError::AudioEncodingError(e.to_string())))?
        };

        {
            let sample_buffer = self
                .sample_buffer
                .as_mut()
                .ok_or_else(|| PipelineError::InternalError("missing sample buffer".into()))?;
            sample_buffer
                .add_frame(&frame_to_add)
                .map_err(|e| self.fail(PipelineError::AudioEncodingError(e.to_string())))?;
        }

        self.queued_submissions += 1;
        let chunks = self.drain_full_frames(timestamp_us)?;
        self.queued_submissions -= chunks.len() as i64;
        Ok(chunks)
    }

    /// Build a transient `Frame` from planar `Float32` channel arrays and
    /// encode it, exactly as `audio_encoder.rs::encode()` does today for
    /// its `AudioDataInit` branch (SPEC_FULL.md 3).
    pub fn encode_planar(
        &mut self,
        init: PlanarAudioInit<'_>,
        timestamp_us: i64,
    ) -> Result<Vec<EncodedChunk>, PipelineError> {
        if init.number_of_channels as usize != init.planes.len() {
            return Err(self.fail(PipelineError::ConfigurationError(
                "planar audio init channel count mismatch".to_string(),
            )));
        }

        let mut frame = Frame::new_audio(
            init.number_of_frames,
            init.number_of_channels,
            init.sample_rate,
            AVSampleFormat::Fltp,
        )
        .map_err(|e| self.fail(PipelineError::AudioEncodingError(e.to_string())))?;

        for (channel, samples) in init.planes.iter().enumerate() {
            if let Some(plane) = frame.plane_data_mut(channel) {
                let bytes = unsafe {
                    std::slice::from_raw_parts(samples.as_ptr() as *const u8, samples.len() * 4)
                };
                let len = bytes.len().min(plane.len());
                plane[..len].copy_from_slice(&bytes[..len]);
            }
        }

        self.encode(&frame, timestamp_us, AVSampleFormat::Fltp)
    }

    fn drain_full_frames(&mut self, timestamp_us: i64) -> Result<Vec<EncodedChunk>, PipelineError> {
        let extradata = if !self.extradata_sent {
            self.context
                .as_ref()
                .and_then(|ctx| ctx.extradata().map(|d| d.to_vec()))
        } else {
            None
        };

        let mut chunks = Vec::new();
        loop {
            let (has_frame, frame_size, sample_rate) = match self.sample_buffer.as_ref() {
                Some(buf) => (
                    buf.has_full_frame(),
                    buf.frame_size() as i64,
                    buf.sample_rate() as i64,
                ),
                None => break,
            };
            if !has_frame {
                break;
            }

            let mut frame_to_encode = {
                let sample_buffer = self
                    .sample_buffer
                    .as_mut()
                    .ok_or_else(|| PipelineError::InternalError("missing sample buffer".into()))?;
                sample_buffer
                    .take_frame()
                    .map_err(|e| self.fail(PipelineError::AudioEncodingError(e.to_string())))?
                    .ok_or_else(|| {
                        PipelineError::InternalError("expected a full audio frame".into())
                    })?
            };

            let frame_timestamp = if self.frame_count == 0 {
                timestamp_us
            } else {
                timestamp_us + (self.frame_count as i64 * frame_size * 1_000_000) / sample_rate
            };
            frame_to_encode.set_pts(frame_timestamp);

            let context = self
                .context
                .as_mut()
                .ok_or_else(|| PipelineError::InternalError("missing audio codec context".into()))?;
            let packets = context
                .encode(Some(&frame_to_encode))
                .map_err(|e| self.fail(PipelineError::AudioEncodingError(e.to_string())))?;

            self.frame_count += 1;
            let duration_us = (frame_size * 1_000_000) / sample_rate;

            for packet in &packets {
                let kind = if packet.is_key() {
                    ChunkKind::Key
                } else {
                    ChunkKind::Delta
                };
                let mut meta = ChunkMeta::default();
                if !self.extradata_sent {
                    meta.decoder_description = extradata.clone();
                    self.extradata_sent = true;
                }
                let mut chunk =
                    EncodedChunk::new(kind, frame_timestamp, Some(duration_us), packet.to_vec());
                chunk.meta = meta;
                chunks.push(chunk);
            }
        }

        Ok(chunks)
    }

    /// Flush the partial sample buffer and then the encoder itself.
    pub fn flush(&mut self) -> Result<Vec<EncodedChunk>, PipelineError> {
        if self.state != DriverState::Configured {
            return Err(self.fail(PipelineError::AudioEncodingError(
                "audio driver not configured".to_string(),
            )));
        }
        self.state = DriverState::Flushing;

        let mut chunks = Vec::new();

        let partial = match self.sample_buffer.as_mut() {
            Some(buf) => buf
                .flush()
                .map_err(|e| self.fail(PipelineError::AudioEncodingError(e.to_string())))?,
            None => None,
        };

        if let Some(mut frame) = partial {
            let (frame_size, sample_rate) = match self.sample_buffer.as_ref() {
                Some(buf) => (buf.frame_size() as i64, buf.sample_rate() as i64),
                None => (0, 1),
            };
            let frame_timestamp = (self.frame_count as i64 * frame_size * 1_000_000) / sample_rate;
            frame.set_pts(frame_timestamp);

            let context = self
                .context
                .as_mut()
                .ok_or_else(|| PipelineError::InternalError("missing audio codec context".into()))?;
            let packets = context
                .encode(Some(&frame))
                .map_err(|e| self.fail(PipelineError::AudioEncodingError(e.to_string())))?;

            let duration_us = (frame.nb_samples() as i64 * 1_000_000) / sample_rate;
            for packet in &packets {
                let kind = if packet.is_key() {
                    ChunkKind::Key
                } else {
                    ChunkKind::Delta
                };
                chunks.push(EncodedChunk::new(
                    kind,
                    frame_timestamp,
                    Some(duration_us),
                    packet.to_vec(),
                ));
            }
        }

        let context = self
            .context
            .as_mut()
            .ok_or_else(|| PipelineError::InternalError("missing audio codec context".into()))?;
        let packets = context
            .flush_encoder()
            .map_err(|e| self.fail(PipelineError::AudioEncodingError(e.to_string())))?;
        for packet in &packets {
            let kind = if packet.is_key() {
                ChunkKind::Key
            } else {
                ChunkKind::Delta
            };
            chunks.push(EncodedChunk::new(kind, 0, None, packet.to_vec()));
        }

        self.queued_submissions = 0;
        self.state = DriverState::Configured;
        Ok(chunks)
    }

    pub fn close(&mut self) {
        self.context = None;
        self.resampler = None;
        self.sample_buffer = None;
        self.config = None;
        self.queued_submissions = 0;
        self.state = DriverState::Closed;
    }
}

/// Preferred sample format per codec, matching `audio_encoder.rs`'s
/// `get_encoder_sample_format`.
fn encoder_sample_format(codec_id: AVCodecID) -> AVSampleFormat {
    match codec_id {
        AVCodecID::Aac => AVSampleFormat::Fltp,
        AVCodecID::Opus => AVSampleFormat::Flt,
        AVCodecID::Mp3 => AVSampleFormat::S16p,
        AVCodecID::Flac => AVSampleFormat::S16,
        AVCodecID::Vorbis => AVSampleFormat::Fltp,
        _ => AVSampleFormat::Fltp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn starts_unconfigured() {
        let (tx, _rx) = unbounded();
        let driver = AudioDriver::new(tx);
        assert_eq!(driver.state(), DriverState::Unconfigured);
    }

    #[test]
    fn encode_before_configure_reports_error_and_closes() {
        let (tx, rx) = unbounded();
        let mut driver = AudioDriver::new(tx);
        let frame = Frame::new_audio(960, 2, 48_000, AVSampleFormat::Fltp).unwrap();
        let result = driver.encode(&frame, 0, AVSampleFormat::Fltp);
        assert!(result.is_err());
        assert_eq!(driver.state(), DriverState::Closed);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn channel_mismatch_before_configure_also_reports_not_configured() {
        // Without a config present the driver reports "not configured"
        // before it ever inspects channel counts.
        let (tx, rx) = unbounded();
        let mut driver = AudioDriver::new(tx);
        let frame = Frame::new_audio(960, 1, 48_000, AVSampleFormat::Fltp).unwrap();
        assert!(driver.encode(&frame, 0, AVSampleFormat::Fltp).is_err());
        assert!(rx.try_recv().is_ok());
    }
}
