use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::common::{FrameId, MinibaseError, PageId, Result, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{AccessType, BasicPageGuard, Frame, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Bookkeeping protected by the pool latch
struct PoolState {
    /// Page table: maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Frames not currently holding any page
    free_list: VecDeque<FrameId>,
    /// Monotone page id allocator
    next_page_id: i32,
}

/// Shared interior of the buffer pool, referenced by the pool itself and
/// by every outstanding page guard.
pub(crate) struct PoolCore {
    pool_size: usize,
    /// The buffer pool frames; fixed at construction
    frames: Vec<Arc<Frame>>,
    /// Single latch serialising every public pool operation
    latch: Mutex<PoolState>,
    /// LRU-K replacer for eviction decisions; only called under `latch`
    replacer: LruKReplacer,
    /// Disk scheduler for page I/O
    disk_scheduler: DiskScheduler,
}

/// BufferPoolManager mediates between callers and disk, caching pages in a
/// fixed set of in-memory frames.
///
/// On a miss it takes a frame from the free list or sacrifices a victim
/// chosen by the LRU-K replacer, writing the victim out first when dirty.
/// A single latch serialises all public operations, including the disk
/// I/O they issue; a frame installed for a page can therefore never be
/// reassigned while the installing operation is still in flight.
pub struct BufferPoolManager {
    core: Arc<PoolCore>,
}

impl BufferPoolManager {
    /// Creates a pool with `pool_size` frames, LRU-`replacer_k`
    /// replacement, and the given disk manager.
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<dyn DiskManager>) -> Self {
        assert!(pool_size >= 1, "buffer pool needs at least one frame");

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        debug!(pool_size, replacer_k, "buffer pool created");

        Self {
            core: Arc::new(PoolCore {
                pool_size,
                frames,
                latch: Mutex::new(PoolState {
                    page_table: HashMap::new(),
                    free_list,
                    next_page_id: 0,
                }),
                replacer: LruKReplacer::new(replacer_k, pool_size - 1),
                disk_scheduler: DiskScheduler::new(disk_manager),
            }),
        }
    }

    /// Allocates a brand-new page pinned into a frame.
    ///
    /// The page comes back with `pin_count == 1`; the caller owns that pin
    /// and releases it with [`unpin_page`](Self::unpin_page).
    pub fn new_page(&self) -> Result<PageId> {
        self.core.new_page().map(|(page_id, _)| page_id)
    }

    /// Allocates a new page and wraps the pin in a guard.
    pub fn new_page_guarded(&self) -> Result<BasicPageGuard> {
        let (_, frame_id) = self.core.new_page()?;
        let frame = Arc::clone(&self.core.frames[frame_id.as_usize()]);
        Ok(BasicPageGuard::new(Arc::clone(&self.core), frame))
    }

    /// Pins the page into a frame (reading it from disk on a miss) and
    /// returns the frame. The caller must eventually unpin.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Frame>> {
        self.fetch_page_with(page_id, AccessType::Unknown)
    }

    /// [`fetch_page`](Self::fetch_page) with an explicit access kind for
    /// the replacer's weighting.
    pub fn fetch_page_with(&self, page_id: PageId, access_type: AccessType) -> Result<Arc<Frame>> {
        let frame_id = self.core.fetch_page(page_id, access_type)?;
        Ok(Arc::clone(&self.core.frames[frame_id.as_usize()]))
    }

    /// Fetches a page wrapped in a plain pin-holding guard.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<BasicPageGuard> {
        let frame_id = self.core.fetch_page(page_id, AccessType::Unknown)?;
        let frame = Arc::clone(&self.core.frames[frame_id.as_usize()]);
        Ok(BasicPageGuard::new(Arc::clone(&self.core), frame))
    }

    /// Fetches a page and takes the shared latch on its buffer.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        Ok(self.fetch_page_basic(page_id)?.upgrade_read())
    }

    /// Fetches a page and takes the exclusive latch on its buffer.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        Ok(self.fetch_page_basic(page_id)?.upgrade_write())
    }

    /// Releases one pin on a page, folding in the caller's dirty bit.
    ///
    /// Returns false when the page is not resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.core.unpin_page(page_id, is_dirty)
    }

    /// Writes a resident page out to disk, pinned or not, and clears its
    /// dirty flag. Returns false when the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        self.core.flush_page(page_id)
    }

    /// Writes every resident page out to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        self.core.flush_all_pages()
    }

    /// Drops a page from the pool.
    ///
    /// Returns true when the page was removed or was not resident to begin
    /// with; false when it is pinned and cannot be removed.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        self.core.delete_page(page_id)
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        self.core.get_pin_count(page_id)
    }

    pub fn pool_size(&self) -> usize {
        self.core.pool_size
    }

    /// Returns the number of frames not holding any page.
    pub fn free_frame_count(&self) -> usize {
        self.core.latch.lock().free_list.len()
    }

    /// Returns the number of frames the replacer would currently consider.
    pub fn evictable_count(&self) -> usize {
        self.core.replacer.size()
    }
}

impl PoolCore {
    fn new_page(&self) -> Result<(PageId, FrameId)> {
        let mut state = self.latch.lock();

        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = PageId::new(state.next_page_id);
        state.next_page_id += 1;

        let frame = &self.frames[frame_id.as_usize()];
        frame.install(page_id);
        state.page_table.insert(page_id, frame_id);

        self.replacer.record_access(frame_id, AccessType::Unknown)?;
        self.replacer.set_evictable(frame_id, false);
        frame.pin();

        trace!(%page_id, %frame_id, "new page");
        Ok((page_id, frame_id))
    }

    fn fetch_page(&self, page_id: PageId, access_type: AccessType) -> Result<FrameId> {
        if !page_id.is_valid() {
            return Err(MinibaseError::InvalidPageId(page_id));
        }

        let mut state = self.latch.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.as_usize()];
            frame.pin();
            self.replacer.record_access(frame_id, access_type)?;
            self.replacer.set_evictable(frame_id, false);
            return Ok(frame_id);
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.as_usize()];

        let mut buf = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_scheduler.schedule_read_sync(page_id, &mut buf) {
            // The frame was never installed; hand it back rather than leak it.
            state.free_list.push_back(frame_id);
            return Err(e);
        }

        frame.install(page_id);
        frame.latch_write().copy_from_slice(&buf);
        frame.pin();
        state.page_table.insert(page_id, frame_id);

        self.replacer.record_access(frame_id, access_type)?;
        self.replacer.set_evictable(frame_id, false);

        trace!(%page_id, %frame_id, "fetched page from disk");
        Ok(frame_id)
    }

    pub(crate) fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.latch.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };

        let frame = &self.frames[frame_id.as_usize()];
        match frame.unpin(is_dirty) {
            None => false,
            Some(remaining) => {
                if remaining == 0 {
                    self.replacer.set_evictable(frame_id, true);
                }
                true
            }
        }
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let state = self.latch.lock();

        match state.page_table.get(&page_id) {
            Some(&frame_id) => {
                self.write_frame_to_disk(page_id, &self.frames[frame_id.as_usize()])?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn flush_all_pages(&self) -> Result<()> {
        let state = self.latch.lock();

        for (&page_id, &frame_id) in state.page_table.iter() {
            self.write_frame_to_disk(page_id, &self.frames[frame_id.as_usize()])?;
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.latch.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(true);
        };

        let frame = &self.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        state.page_table.remove(&page_id);
        self.replacer.remove(frame_id)?;
        frame.reset();
        state.free_list.push_back(frame_id);
        self.deallocate_page(page_id);

        trace!(%page_id, %frame_id, "deleted page");
        Ok(true)
    }

    fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.latch.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.frames[frame_id.as_usize()].pin_count())
    }

    /// Finds a frame for a new resident: free list first, then eviction.
    /// The returned frame is reset and detached from the page table.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.replacer.evict() else {
            return Err(MinibaseError::BufferPoolFull);
        };

        let frame = &self.frames[frame_id.as_usize()];
        if let Some(old_page_id) = frame.page_id() {
            if frame.is_dirty() {
                self.write_frame_to_disk(old_page_id, frame)?;
            }
            state.page_table.remove(&old_page_id);
            trace!(victim = %old_page_id, %frame_id, "evicted page");
        }
        frame.reset();

        Ok(frame_id)
    }

    /// Stages the frame contents and writes them out synchronously,
    /// clearing the dirty flag on success.
    fn write_frame_to_disk(&self, page_id: PageId, frame: &Frame) -> Result<()> {
        let mut buf = [0u8; PAGE_SIZE];
        buf.copy_from_slice(&frame.latch_read()[..]);
        self.disk_scheduler.schedule_write_sync(page_id, &buf)?;
        frame.clear_dirty();
        Ok(())
    }

    fn deallocate_page(&self, _page_id: PageId) {
        // Page id space is append-only; freed ids are not recycled.
    }
}
