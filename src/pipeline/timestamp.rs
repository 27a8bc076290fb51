//! Per-track timestamp normalization
//!
//! Two independent trackers (video, audio) apply a first-timestamp offset so
//! the muxer always sees a stream starting at (or near) zero, matching the
//! source's per-track origin rather than a single shared origin (see the
//! Timestamp Normalizer open question resolution).

/// How the first observed timestamp of a track is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstTimestampBehavior {
    /// Rewrite the first chunk's timestamp to 0 and subtract the observed
    /// offset from every later chunk, clamping at 0.
    Offset,
    /// Pass timestamps through unchanged.
    Passthrough,
}

/// Normalizes a single track's timestamp sequence
#[derive(Debug, Clone, Copy)]
pub struct TimestampNormalizer {
    behavior: FirstTimestampBehavior,
    first_timestamp_us: Option<i64>,
}

impl TimestampNormalizer {
    pub fn new(behavior: FirstTimestampBehavior) -> Self {
        Self {
            behavior,
            first_timestamp_us: None,
        }
    }

    /// Normalize one timestamp, recording the track's origin on first call
    pub fn normalize(&mut self, timestamp_us: i64) -> i64 {
        match self.behavior {
            FirstTimestampBehavior::Passthrough => timestamp_us,
            FirstTimestampBehavior::Offset => match self.first_timestamp_us {
                None => {
                    self.first_timestamp_us = Some(timestamp_us);
                    0
                }
                Some(first) => (timestamp_us - first).max(0),
            },
        }
    }

    pub fn has_seen_first_timestamp(&self) -> bool {
        self.first_timestamp_us.is_some()
    }
}

/// Independent video/audio timestamp trackers for one session
#[derive(Debug, Clone, Copy)]
pub struct TrackTimestamps {
    pub video: TimestampNormalizer,
    pub audio: TimestampNormalizer,
}

impl TrackTimestamps {
    pub fn new(behavior: FirstTimestampBehavior) -> Self {
        Self {
            video: TimestampNormalizer::new(behavior),
            audio: TimestampNormalizer::new(behavior),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_mode_zeroes_first_timestamp() {
        let mut norm = TimestampNormalizer::new(FirstTimestampBehavior::Offset);
        assert_eq!(norm.normalize(5_000), 0);
        assert_eq!(norm.normalize(5_033), 33);
        assert_eq!(norm.normalize(5_066), 66);
    }

    #[test]
    fn offset_mode_clamps_at_zero_for_out_of_order_timestamps() {
        let mut norm = TimestampNormalizer::new(FirstTimestampBehavior::Offset);
        assert_eq!(norm.normalize(1_000), 0);
        assert_eq!(norm.normalize(900), 0);
    }

    #[test]
    fn passthrough_mode_leaves_timestamps_unchanged() {
        let mut norm = TimestampNormalizer::new(FirstTimestampBehavior::Passthrough);
        assert_eq!(norm.normalize(5_000), 5_000);
        assert_eq!(norm.normalize(10_000), 10_000);
    }

    #[test]
    fn video_and_audio_tracks_keep_independent_origins() {
        let mut tracks = TrackTimestamps::new(FirstTimestampBehavior::Offset);
        assert_eq!(tracks.video.normalize(5_000), 0);
        assert_eq!(tracks.audio.normalize(2_000), 0);
        assert_eq!(tracks.video.normalize(5_033), 33);
        assert_eq!(tracks.audio.normalize(2_020), 20);
    }
}
