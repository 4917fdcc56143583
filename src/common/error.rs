use thiserror::Error;

use super::types::{FrameId, PageId};

/// Storage runtime error types
#[derive(Error, Debug)]
pub enum MinibaseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Invalid frame ID: {0}")]
    InvalidFrameId(FrameId),

    #[error("Frame {0} is not evictable")]
    FrameNotEvictable(FrameId),

    #[error("Disk request failed for page {0}")]
    DiskRequestFailed(PageId),

    #[error("Disk scheduler error: {0}")]
    Scheduler(String),
}

pub type Result<T> = std::result::Result<T, MinibaseError>;
