use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, trace};

use crate::common::{Channel, MinibaseError, PageId, Result, DEFAULT_DISK_WORKERS, PAGE_SIZE};

use super::DiskManager;

/// Represents a Write or Read request for the DiskManager to execute
pub struct DiskRequest {
    /// Whether this is a write (true) or read (false) request
    pub is_write: bool,
    /// Pointer to the PAGE_SIZE buffer a read fills or a write drains.
    /// Ownership of the buffer passes to the worker for the duration of
    /// the I/O; the issuer must keep it alive until the callback fires.
    pub data: *mut u8,
    /// The page ID to read/write
    pub page_id: PageId,
    /// One-shot signal fulfilled with the success flag once the request
    /// has been executed
    pub callback: Sender<bool>,
}

// Safety: the request is consumed by exactly one worker thread, and the
// issuer guarantees the data pointer stays valid until completion.
unsafe impl Send for DiskRequest {}

impl DiskRequest {
    /// Creates a new read request
    pub fn read(page_id: PageId, data: *mut u8, callback: Sender<bool>) -> Self {
        Self {
            is_write: false,
            data,
            page_id,
            callback,
        }
    }

    /// Creates a new write request
    pub fn write(page_id: PageId, data: *mut u8, callback: Sender<bool>) -> Self {
        Self {
            is_write: true,
            data,
            page_id,
            callback,
        }
    }
}

/// DiskScheduler dispatches read and write requests to the DiskManager
/// from a pool of background worker threads.
///
/// Requests are enqueued with [`DiskScheduler::schedule`] and picked up by
/// whichever worker is free; completion is signalled through the request's
/// callback. Requests for different pages may complete in any order.
/// Shutdown enqueues one sentinel per worker and joins them, so every
/// outstanding request drains before the scheduler goes away.
pub struct DiskScheduler {
    /// The disk manager for actual I/O operations
    disk_manager: Arc<dyn DiskManager>,
    /// Shared request queue; `None` is the worker shutdown sentinel
    request_queue: Channel<Option<DiskRequest>>,
    /// Handles of the background worker threads
    workers: Vec<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a scheduler with the default number of workers.
    pub fn new(disk_manager: Arc<dyn DiskManager>) -> Self {
        Self::with_workers(disk_manager, DEFAULT_DISK_WORKERS)
    }

    /// Creates a scheduler with `num_workers` background threads.
    pub fn with_workers(disk_manager: Arc<dyn DiskManager>, num_workers: usize) -> Self {
        assert!(num_workers >= 1, "scheduler needs at least one worker");

        let request_queue: Channel<Option<DiskRequest>> = Channel::new();
        let workers = (0..num_workers)
            .map(|_| {
                let queue = request_queue.clone();
                let dm = Arc::clone(&disk_manager);
                thread::spawn(move || Self::worker_loop(dm, queue))
            })
            .collect();

        debug!(num_workers, "disk scheduler started");

        Self {
            disk_manager,
            request_queue,
            workers,
        }
    }

    /// Enqueues a request for a worker to execute. Returns immediately.
    pub fn schedule(&self, request: DiskRequest) {
        self.request_queue.put(Some(request));
    }

    /// Schedules a read request and blocks until it completes.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = Self::create_completion();
        self.schedule(DiskRequest::read(page_id, data.as_mut_ptr(), tx));
        Self::wait(page_id, rx)
    }

    /// Schedules a write request and blocks until it completes.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = Self::create_completion();
        // The worker only reads through the pointer for a write request.
        self.schedule(DiskRequest::write(page_id, data.as_ptr() as *mut u8, tx));
        Self::wait(page_id, rx)
    }

    /// Creates a one-shot completion signal pair for a request.
    pub fn create_completion() -> (Sender<bool>, Receiver<bool>) {
        std::sync::mpsc::channel()
    }

    fn wait(page_id: PageId, rx: Receiver<bool>) -> Result<()> {
        let success = rx
            .recv()
            .map_err(|e| MinibaseError::Scheduler(format!("completion signal dropped: {e}")))?;
        if success {
            Ok(())
        } else {
            Err(MinibaseError::DiskRequestFailed(page_id))
        }
    }

    /// Returns the number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<dyn DiskManager> {
        &self.disk_manager
    }

    fn worker_loop(disk_manager: Arc<dyn DiskManager>, queue: Channel<Option<DiskRequest>>) {
        while let Some(request) = queue.get() {
            Self::process_request(disk_manager.as_ref(), request);
        }
    }

    fn process_request(disk_manager: &dyn DiskManager, request: DiskRequest) {
        trace!(page_id = %request.page_id, is_write = request.is_write, "processing disk request");

        let outcome = if request.is_write {
            // Safety: the issuer keeps the buffer alive until the callback
            // fires and no other thread touches it meanwhile.
            let data = unsafe { std::slice::from_raw_parts(request.data, PAGE_SIZE) };
            disk_manager.write_page(request.page_id, data)
        } else {
            // Safety: as above, with exclusive access for the fill.
            let data = unsafe { std::slice::from_raw_parts_mut(request.data, PAGE_SIZE) };
            disk_manager.read_page(request.page_id, data)
        };

        if let Err(e) = &outcome {
            error!(page_id = %request.page_id, error = %e, "disk request failed");
        }

        // The issuer may have gone away; a dead callback is not an error
        // for the worker.
        let _ = request.callback.send(outcome.is_ok());
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // One sentinel per worker; the queue drains outstanding requests
        // before each worker sees its sentinel.
        for _ in 0..self.workers.len() {
            self.request_queue.put(None);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::MemoryDiskManager;

    #[test]
    fn test_disk_scheduler_read_write() {
        let dm: Arc<dyn DiskManager> = Arc::new(MemoryDiskManager::new());
        let scheduler = DiskScheduler::new(dm);
        let page_id = PageId::new(0);

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler.schedule_write_sync(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        scheduler
            .schedule_read_sync(page_id, &mut read_data)
            .unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
    }

    #[test]
    fn test_disk_scheduler_raw_schedule() {
        let dm: Arc<dyn DiskManager> = Arc::new(MemoryDiskManager::new());
        let scheduler = DiskScheduler::new(dm);
        let page_id = PageId::new(4);

        let mut buf = [7u8; PAGE_SIZE];
        let (tx, rx) = DiskScheduler::create_completion();
        scheduler.schedule(DiskRequest::write(page_id, buf.as_mut_ptr(), tx));
        assert!(rx.recv().unwrap());

        let mut read_back = [0u8; PAGE_SIZE];
        let (tx, rx) = DiskScheduler::create_completion();
        scheduler.schedule(DiskRequest::read(page_id, read_back.as_mut_ptr(), tx));
        assert!(rx.recv().unwrap());
        assert_eq!(read_back, buf);
    }

    #[test]
    fn test_disk_scheduler_many_pages_single_worker() {
        let dm: Arc<dyn DiskManager> = Arc::new(MemoryDiskManager::new());
        let scheduler = DiskScheduler::with_workers(dm, 1);

        for i in 0..16 {
            let data = [i as u8; PAGE_SIZE];
            scheduler
                .schedule_write_sync(PageId::new(i), &data)
                .unwrap();
        }

        for i in 0..16 {
            let mut data = [0u8; PAGE_SIZE];
            scheduler
                .schedule_read_sync(PageId::new(i), &mut data)
                .unwrap();
            assert_eq!(data[0], i as u8);
        }
    }

    #[test]
    fn test_disk_scheduler_shutdown_drains_requests() {
        let dm = Arc::new(MemoryDiskManager::new());
        let page_id = PageId::new(1);

        {
            let scheduler = DiskScheduler::with_workers(Arc::clone(&dm) as _, 2);
            let data = [9u8; PAGE_SIZE];
            scheduler.schedule_write_sync(page_id, &data).unwrap();
            // Drop joins both workers after they drain the queue.
        }

        let mut read_back = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut read_back).unwrap();
        assert_eq!(read_back[0], 9);
    }
}
