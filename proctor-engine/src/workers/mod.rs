//! Background workers of the chunk lifecycle pipeline
//!
//! Three independent loops, each runnable as its own process (and in any
//! number of instances for the chunk processor):
//! - chunk processor: dequeues jobs and analyzes chunk media
//! - batch compactor: periodically folds PROCESSED chunks together
//! - session finalizer: assembles the final recording and retires sessions
//!
//! All coordination goes through the shared database: the job queue, the
//! per-session lock key space, and conditional row updates.

pub mod batch_compactor;
pub mod chunk_processor;
pub mod finalizer;

pub use batch_compactor::BatchCompactor;
pub use chunk_processor::ChunkProcessor;
pub use finalizer::SessionFinalizer;
