use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId, PAGE_SIZE};

/// Metadata for the page resident in a frame.
///
/// Kept as one plain struct behind a single lock so that related updates
/// (drop a pin and fold in the dirty bit, say) are one critical section
/// instead of a dance across separate atomics.
struct FrameMeta {
    /// Id of the resident page; `None` while the frame holds no page
    page_id: Option<PageId>,
    /// Outstanding references to the buffer; non-zero blocks reuse
    pin_count: u32,
    /// Set on first modification, cleared by a flush or a reset
    is_dirty: bool,
}

impl FrameMeta {
    fn empty() -> Self {
        Self {
            page_id: None,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

/// A slot of the buffer pool: one page-sized buffer plus the metadata the
/// pool needs to manage it.
///
/// Metadata and page contents are synchronised separately. The buffer
/// carries the reader-writer latch the page guards take, and can stay
/// latched for as long as a caller holds a guard; metadata updates are
/// short lock-and-release affairs driven by the pool.
pub struct Frame {
    /// Index of this frame within the pool
    frame_id: FrameId,
    meta: Mutex<FrameMeta>,
    /// The page buffer, latched by guards (pub(crate) for guard access)
    pub(crate) data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl Frame {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            meta: Mutex::new(FrameMeta::empty()),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Id of the resident page, or `None` for an empty frame.
    pub fn page_id(&self) -> Option<PageId> {
        self.meta.lock().page_id
    }

    /// Makes the frame the home of `page_id`. The frame must be empty.
    pub fn install(&self, page_id: PageId) {
        let mut meta = self.meta.lock();
        debug_assert!(meta.page_id.is_none(), "install over a resident page");
        meta.page_id = Some(page_id);
    }

    pub fn pin_count(&self) -> u32 {
        self.meta.lock().pin_count
    }

    /// Takes one reference to the frame. Returns the new pin count.
    pub fn pin(&self) -> u32 {
        let mut meta = self.meta.lock();
        meta.pin_count += 1;
        meta.pin_count
    }

    /// Drops one reference, folding the caller's dirty bit into the flag
    /// in the same step. Returns the new pin count, or `None` when no pin
    /// was held (the caller's accounting is off).
    pub fn unpin(&self, dirty: bool) -> Option<u32> {
        let mut meta = self.meta.lock();
        if meta.pin_count == 0 {
            return None;
        }
        meta.pin_count -= 1;
        meta.is_dirty |= dirty;
        Some(meta.pin_count)
    }

    pub fn is_dirty(&self) -> bool {
        self.meta.lock().is_dirty
    }

    /// Clears the dirty flag after the contents have been written out.
    pub fn clear_dirty(&self) {
        self.meta.lock().is_dirty = false;
    }

    /// Takes the shared latch on the page buffer.
    pub fn latch_read(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Takes the exclusive latch on the page buffer.
    pub fn latch_write(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Returns the frame to its empty state: no page, no pins, clean,
    /// zeroed buffer.
    pub fn reset(&self) {
        *self.meta.lock() = FrameMeta::empty();
        self.data.write().fill(0);
    }
}
