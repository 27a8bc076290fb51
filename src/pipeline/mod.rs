//! Media encoding pipeline orchestration
//!
//! Composes the codec/container substrate in `crate::codec`/`crate::webcodecs`
//! into a single worker-style session: negotiate a codec configuration, drive
//! video/audio encoder state machines, feed a container muxer, and report
//! progress/errors back to the host over a message channel.

pub mod audio_driver;
pub mod chunk;
pub mod error;
pub mod muxer_adapter;
pub mod negotiator;
pub mod orchestrator;
pub mod timestamp;
pub mod transport;
pub mod video_driver;

pub use chunk::{ChunkKind, ChunkMeta, DataChunkEvent, EncodedChunk};
pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use negotiator::{NegotiatedCodecs, Negotiator};
pub use orchestrator::{Orchestrator, SessionState};
pub use transport::{HostMessage, WorkerMessage};
