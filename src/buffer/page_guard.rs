use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

use super::buffer_pool_manager::PoolCore;
use super::Frame;

/// The pool handle + pinned frame a live guard carries
struct GuardInner {
    core: Arc<PoolCore>,
    frame: Arc<Frame>,
}

/// Scoped holder of one pin on a buffer pool frame.
///
/// Dropping the guard returns the pin to the pool together with the dirty
/// flag the guard accumulated. Moving a guard out (or upgrading it)
/// empties the source, so exactly one unpin happens per pin no matter how
/// the guard travels. Guards cannot be cloned.
pub struct BasicPageGuard {
    inner: Option<GuardInner>,
    is_dirty: bool,
}

impl BasicPageGuard {
    /// Wraps an already-pinned frame. The guard takes over the pin.
    pub(crate) fn new(core: Arc<PoolCore>, frame: Arc<Frame>) -> Self {
        Self {
            inner: Some(GuardInner { core, frame }),
            is_dirty: false,
        }
    }

    /// Returns the guarded page's id, or `INVALID_PAGE_ID` for an emptied
    /// guard.
    pub fn page_id(&self) -> PageId {
        self.inner
            .as_ref()
            .and_then(|inner| inner.frame.page_id())
            .unwrap_or(INVALID_PAGE_ID)
    }

    /// Reads the page buffer under a short shared latch.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let inner = self.inner.as_ref().expect("access through emptied guard");
        let data = inner.frame.latch_read();
        f(&data[..])
    }

    /// Mutates the page buffer under a short exclusive latch, marking the
    /// guard dirty.
    pub fn with_data_mut<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        self.is_dirty = true;
        let inner = self.inner.as_ref().expect("access through emptied guard");
        let mut data = inner.frame.latch_write();
        f(&mut data[..])
    }

    /// Trades this guard for one holding the shared latch on the page
    /// buffer. The pin transfers; the source is emptied.
    pub fn upgrade_read(mut self) -> ReadPageGuard {
        let inner = self.inner.take().expect("upgrade of emptied guard");
        ReadPageGuard::latch(inner)
    }

    /// Trades this guard for one holding the exclusive latch on the page
    /// buffer. The pin transfers; the source is emptied.
    pub fn upgrade_write(mut self) -> WritePageGuard {
        let inner = self.inner.take().expect("upgrade of emptied guard");
        WritePageGuard::latch(inner)
    }

    /// Releases the guard early.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Drop for BasicPageGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            // A pinned frame always has a resident page.
            if let Some(page_id) = inner.frame.page_id() {
                inner.core.unpin_page(page_id, self.is_dirty);
            }
        }
    }
}

/// RAII guard holding the shared latch on a page in addition to its pin.
///
/// On drop the latch is released first and the pin only afterwards: once
/// the pin is gone the replacer may hand the frame to someone else, so the
/// latch must not still be held at that point.
pub struct ReadPageGuard {
    base: BasicPageGuard,
    /// Shared latch on the page buffer; `None` only mid-drop
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    fn latch(inner: GuardInner) -> Self {
        // Safety: the transmute erases the borrow of `inner.frame`, which
        // the base guard keeps alive (via Arc) for at least as long as the
        // latch guard. Drop releases the latch before the frame can go.
        let data_guard = unsafe {
            std::mem::transmute::<
                RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>>,
                RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>,
            >(inner.frame.data.read())
        };

        Self {
            base: BasicPageGuard {
                inner: Some(inner),
                is_dirty: false,
            },
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id()
    }

    /// Returns the latched page contents.
    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Releases the guard early.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Latch first; the base guard unpins afterwards.
        self.data_guard.take();
    }
}

/// RAII guard holding the exclusive latch on a page in addition to its
/// pin. The page is marked dirty when the guard drops: an exclusive latch
/// is only taken to modify.
pub struct WritePageGuard {
    base: BasicPageGuard,
    /// Exclusive latch on the page buffer; `None` only mid-drop
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    fn latch(inner: GuardInner) -> Self {
        // Safety: as for ReadPageGuard::latch.
        let data_guard = unsafe {
            std::mem::transmute::<
                RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>>,
                RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>,
            >(inner.frame.data.write())
        };

        Self {
            base: BasicPageGuard {
                inner: Some(inner),
                is_dirty: false,
            },
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id()
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.base.is_dirty = true;
        &mut self.data_guard.as_mut().unwrap()[..]
    }

    /// Releases the guard early.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // Having held the exclusive latch counts as a modification.
        self.base.is_dirty = true;
        // Latch first; the base guard unpins afterwards.
        self.data_guard.take();
    }
}
