use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::common::{MinibaseError, PageId, Result, PAGE_SIZE};

/// Random-access block device abstraction consumed by the disk scheduler.
///
/// Both operations are synchronous and may block. Implementations must be
/// safe to share between the scheduler's worker threads.
pub trait DiskManager: Send + Sync {
    /// Reads a page from the device into the provided buffer.
    fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()>;

    /// Writes a page to the device from the provided buffer.
    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()>;

    /// Releases any resources held by the device.
    fn shut_down(&self);
}

/// File-backed disk manager storing pages at `page_id * PAGE_SIZE` offsets
/// in a single database file.
pub struct FileDiskManager {
    file: Mutex<File>,
    db_path: PathBuf,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl FileDiskManager {
    /// Opens the database file at the given path, creating it if absent.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        debug!(path = %db_path.display(), "opened database file");

        Ok(Self {
            file: Mutex::new(file),
            db_path,
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    fn byte_offset(page_id: PageId) -> Result<u64> {
        if !page_id.is_valid() {
            return Err(MinibaseError::InvalidPageId(page_id));
        }
        Ok(page_id.as_i32() as u64 * PAGE_SIZE as u64)
    }

    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    /// Forces all buffered writes out to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        let offset = Self::byte_offset(page_id)?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        // Reads past the end of the file yield a zeroed page.
        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        data[filled..].fill(0);

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        let offset = Self::byte_offset(page_id)?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn shut_down(&self) {
        let _ = self.file.lock().sync_all();
    }
}

impl Drop for FileDiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}

/// In-memory disk manager with unlimited capacity, used by tests.
/// Pages that were never written read back as zeroes.
#[derive(Default)]
pub struct MemoryDiskManager {
    pages: Mutex<HashMap<PageId, Box<[u8; PAGE_SIZE]>>>,
}

impl MemoryDiskManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        if !page_id.is_valid() {
            return Err(MinibaseError::InvalidPageId(page_id));
        }

        match self.pages.lock().get(&page_id) {
            Some(page) => data.copy_from_slice(&page[..]),
            None => data.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        if !page_id.is_valid() {
            return Err(MinibaseError::InvalidPageId(page_id));
        }

        let mut pages = self.pages.lock();
        let page = pages
            .entry(page_id)
            .or_insert_with(|| Box::new([0u8; PAGE_SIZE]));
        page.copy_from_slice(data);
        Ok(())
    }

    fn shut_down(&self) {
        self.pages.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_disk_manager_read_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dm = FileDiskManager::new(temp_dir.path().join("rw.db")).unwrap();

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        write_data[PAGE_SIZE - 1] = 128;
        dm.write_page(PageId::new(0), &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(0), &mut read_data).unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
        assert_eq!(read_data[PAGE_SIZE - 1], 128);
        assert_eq!(dm.get_num_reads(), 1);
        assert_eq!(dm.get_num_writes(), 1);
    }

    #[test]
    fn test_file_disk_manager_read_past_eof_zero_fills() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dm = FileDiskManager::new(temp_dir.path().join("eof.db")).unwrap();

        let mut data = [0xFFu8; PAGE_SIZE];
        dm.read_page(PageId::new(7), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_file_disk_manager_rejects_invalid_page_id() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dm = FileDiskManager::new(temp_dir.path().join("bad.db")).unwrap();

        let mut data = [0u8; PAGE_SIZE];
        assert!(matches!(
            dm.read_page(PageId::new(-1), &mut data),
            Err(MinibaseError::InvalidPageId(_))
        ));
    }

    #[test]
    fn test_file_disk_manager_persistence() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("persist.db");

        {
            let dm = FileDiskManager::new(&db_path).unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[0] = 123;
            dm.write_page(PageId::new(3), &data).unwrap();
        }

        {
            let dm = FileDiskManager::new(&db_path).unwrap();
            let mut data = [0u8; PAGE_SIZE];
            dm.read_page(PageId::new(3), &mut data).unwrap();
            assert_eq!(data[0], 123);
        }
    }

    #[test]
    fn test_memory_disk_manager_round_trip() {
        let dm = MemoryDiskManager::new();

        let mut data = [0u8; PAGE_SIZE];
        data[..5].copy_from_slice(b"hello");
        dm.write_page(PageId::new(9), &data).unwrap();

        let mut read_back = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(9), &mut read_back).unwrap();
        assert_eq!(&read_back[..5], b"hello");

        // Unwritten page reads as zeroes.
        dm.read_page(PageId::new(10), &mut read_back).unwrap();
        assert!(read_back.iter().all(|&b| b == 0));
    }
}
