//! Domain entities for the chunk lifecycle pipeline

pub mod chunk;
pub mod event;
pub mod session;

pub use chunk::{Chunk, ChunkStatus, AGGREGATE_CHUNK_INDEX};
pub use event::{ViolationEvent, ViolationKind};
pub use session::{Session, SessionStatus};
