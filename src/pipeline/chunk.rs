//! Encoded chunk data model shared between encoder drivers and the muxer adapter

/// Chunk type, mirroring `webcodecs::EncodedVideoChunkType`/`EncodedAudioChunkType`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Key,
    Delta,
}

/// Out-of-band metadata attached to a chunk, mirroring the teacher's
/// `EncodedVideoChunkMetadataJs`/`EncodedAudioChunkMetadataJs` shapes
#[derive(Debug, Clone, Default)]
pub struct ChunkMeta {
    /// Decoder description bytes (e.g. SPS/PPS, AudioSpecificConfig), present on keyframes
    pub decoder_description: Option<Vec<u8>>,
    /// VP9 alpha channel side data, if present
    pub alpha_side_data: Option<Vec<u8>>,
}

/// A single encoder output unit: one video picture or one audio access unit
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub kind: ChunkKind,
    pub timestamp_us: i64,
    pub duration_us: Option<i64>,
    pub data: Vec<u8>,
    pub meta: ChunkMeta,
}

impl EncodedChunk {
    pub fn new(kind: ChunkKind, timestamp_us: i64, duration_us: Option<i64>, data: Vec<u8>) -> Self {
        Self {
            kind,
            timestamp_us,
            duration_us,
            data,
            meta: ChunkMeta::default(),
        }
    }

    pub fn is_key(&self) -> bool {
        self.kind == ChunkKind::Key
    }
}

/// A streaming-mode byte run forwarded to the host as the muxer produces output
#[derive(Debug, Clone)]
pub struct DataChunkEvent {
    pub container: &'static str,
    pub chunk: Vec<u8>,
    pub offset: u64,
    pub is_header: bool,
}
