use crate::common::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// Hard cap on the directory's addressing depth
pub const HTABLE_DIRECTORY_MAX_DEPTH: u32 = 9;
/// Number of directory slots: 2^HTABLE_DIRECTORY_MAX_DEPTH
pub const HTABLE_DIRECTORY_ARRAY_SIZE: usize = 1 << HTABLE_DIRECTORY_MAX_DEPTH;

// Persisted little-endian layout:
//   u32 max_depth; u32 global_depth;
//   u8[ARRAY_SIZE] local_depths; i32[ARRAY_SIZE] bucket_page_ids;
const MAX_DEPTH_OFFSET: usize = 0;
const GLOBAL_DEPTH_OFFSET: usize = 4;
const LOCAL_DEPTHS_OFFSET: usize = 8;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + HTABLE_DIRECTORY_ARRAY_SIZE;

/// Directory page of an extendible hash table.
///
/// The directory maps the low `global_depth` bits of a key's hash to a
/// bucket page. Each slot additionally records the local depth of its
/// bucket: the number of hash bits that bucket actually distinguishes.
/// Slots whose local depth is below the global depth share their bucket
/// with their split images. The layout is bit-exact so the page can be
/// read straight off disk.
pub struct DirectoryPage<'a> {
    data: &'a mut [u8],
}

impl<'a> DirectoryPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    /// Initialises an empty directory addressing with `max_depth` bits at
    /// most: global depth 0, all local depths 0, every bucket invalid.
    pub fn init(&mut self, max_depth: u32) {
        assert!(max_depth <= HTABLE_DIRECTORY_MAX_DEPTH);
        self.set_u32(MAX_DEPTH_OFFSET, max_depth);
        self.set_u32(GLOBAL_DEPTH_OFFSET, 0);
        for i in 0..HTABLE_DIRECTORY_ARRAY_SIZE {
            self.data[LOCAL_DEPTHS_OFFSET + i] = 0;
            self.set_raw_bucket_page_id(i, INVALID_PAGE_ID);
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.get_u32(MAX_DEPTH_OFFSET)
    }

    pub fn global_depth(&self) -> u32 {
        self.get_u32(GLOBAL_DEPTH_OFFSET)
    }

    /// Mask selecting the low `global_depth` bits of a hash
    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth()) - 1
    }

    /// Mask selecting the low `local_depth` bits for the given slot
    pub fn local_depth_mask(&self, bucket_idx: u32) -> u32 {
        (1u32 << self.local_depth(bucket_idx)) - 1
    }

    /// Directory slot addressed by a hash value
    pub fn hash_to_bucket_index(&self, hash: u32) -> u32 {
        hash & self.global_depth_mask()
    }

    /// The slot this one split from (or will merge with): the index with
    /// the bit just above the slot's local-depth prefix flipped.
    pub fn split_image_index(&self, bucket_idx: u32) -> u32 {
        bucket_idx ^ (1u32 << self.local_depth(bucket_idx))
    }

    /// Number of addressable slots: 2^global_depth
    pub fn size(&self) -> u32 {
        1u32 << self.global_depth()
    }

    /// Largest size this directory can grow to: 2^max_depth
    pub fn max_size(&self) -> u32 {
        1u32 << self.max_depth()
    }

    pub fn bucket_page_id(&self, bucket_idx: u32) -> PageId {
        assert!((bucket_idx as usize) < HTABLE_DIRECTORY_ARRAY_SIZE);
        let offset = BUCKET_PAGE_IDS_OFFSET + bucket_idx as usize * 4;
        PageId::new(i32::from_le_bytes(
            self.data[offset..offset + 4].try_into().unwrap(),
        ))
    }

    pub fn set_bucket_page_id(&mut self, bucket_idx: u32, bucket_page_id: PageId) {
        assert!((bucket_idx as usize) < HTABLE_DIRECTORY_ARRAY_SIZE);
        self.set_raw_bucket_page_id(bucket_idx as usize, bucket_page_id);
    }

    pub fn local_depth(&self, bucket_idx: u32) -> u32 {
        assert!((bucket_idx as usize) < HTABLE_DIRECTORY_ARRAY_SIZE);
        u32::from(self.data[LOCAL_DEPTHS_OFFSET + bucket_idx as usize])
    }

    pub fn set_local_depth(&mut self, bucket_idx: u32, local_depth: u8) {
        assert!((bucket_idx as usize) < HTABLE_DIRECTORY_ARRAY_SIZE);
        self.data[LOCAL_DEPTHS_OFFSET + bucket_idx as usize] = local_depth;
    }

    pub fn incr_local_depth(&mut self, bucket_idx: u32) {
        assert!((bucket_idx as usize) < HTABLE_DIRECTORY_ARRAY_SIZE);
        self.data[LOCAL_DEPTHS_OFFSET + bucket_idx as usize] += 1;
    }

    pub fn decr_local_depth(&mut self, bucket_idx: u32) {
        assert!((bucket_idx as usize) < HTABLE_DIRECTORY_ARRAY_SIZE);
        self.data[LOCAL_DEPTHS_OFFSET + bucket_idx as usize] -= 1;
    }

    /// Doubles the directory by mirroring every slot into its new upper
    /// half twin, keeping all split-image pairs pointed at their shared
    /// buckets. No-op once `max_depth` is reached.
    pub fn incr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        if global_depth == self.max_depth() {
            return;
        }

        let size = self.size() as usize;
        for i in 0..size {
            let page_id = self.bucket_page_id(i as u32);
            let local_depth = self.data[LOCAL_DEPTHS_OFFSET + i];
            self.set_raw_bucket_page_id(i + size, page_id);
            self.data[LOCAL_DEPTHS_OFFSET + i + size] = local_depth;
        }
        self.set_u32(GLOBAL_DEPTH_OFFSET, global_depth + 1);
    }

    /// Halves the directory when no bucket needs the full global depth.
    /// The abandoned upper half is cleared back to the empty state.
    pub fn decr_global_depth(&mut self) {
        if !self.can_shrink() {
            return;
        }

        let global_depth = self.global_depth();
        let new_size = 1usize << (global_depth - 1);
        for i in new_size..self.size() as usize {
            self.set_raw_bucket_page_id(i, INVALID_PAGE_ID);
            self.data[LOCAL_DEPTHS_OFFSET + i] = 0;
        }
        self.set_u32(GLOBAL_DEPTH_OFFSET, global_depth - 1);
    }

    /// True when the directory can halve: it is not already minimal and no
    /// active slot uses all `global_depth` bits, so every bucket stays
    /// addressable with one bit fewer.
    pub fn can_shrink(&self) -> bool {
        let global_depth = self.global_depth();
        if global_depth == 0 {
            return false;
        }
        (0..self.size()).all(|i| self.local_depth(i) < global_depth)
    }

    fn get_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap())
    }

    fn set_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn set_raw_bucket_page_id(&mut self, index: usize, page_id: PageId) {
        let offset = BUCKET_PAGE_IDS_OFFSET + index * 4;
        self.data[offset..offset + 4].copy_from_slice(&page_id.as_i32().to_le_bytes());
    }
}

/// Read-only view over a persisted directory page
pub struct DirectoryPageRef<'a> {
    data: &'a [u8],
}

impl<'a> DirectoryPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn max_depth(&self) -> u32 {
        u32::from_le_bytes(self.data[MAX_DEPTH_OFFSET..MAX_DEPTH_OFFSET + 4].try_into().unwrap())
    }

    pub fn global_depth(&self) -> u32 {
        u32::from_le_bytes(
            self.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn size(&self) -> u32 {
        1u32 << self.global_depth()
    }

    pub fn hash_to_bucket_index(&self, hash: u32) -> u32 {
        hash & ((1u32 << self.global_depth()) - 1)
    }

    pub fn bucket_page_id(&self, bucket_idx: u32) -> PageId {
        assert!((bucket_idx as usize) < HTABLE_DIRECTORY_ARRAY_SIZE);
        let offset = BUCKET_PAGE_IDS_OFFSET + bucket_idx as usize * 4;
        PageId::new(i32::from_le_bytes(
            self.data[offset..offset + 4].try_into().unwrap(),
        ))
    }

    pub fn local_depth(&self, bucket_idx: u32) -> u32 {
        assert!((bucket_idx as usize) < HTABLE_DIRECTORY_ARRAY_SIZE);
        u32::from(self.data[LOCAL_DEPTHS_OFFSET + bucket_idx as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_directory(data: &mut [u8], max_depth: u32) -> DirectoryPage<'_> {
        let mut dir = DirectoryPage::new(data);
        dir.init(max_depth);
        dir
    }

    #[test]
    fn test_directory_page_init() {
        let mut data = [0xAAu8; PAGE_SIZE];
        let dir = empty_directory(&mut data, 9);

        assert_eq!(dir.max_depth(), 9);
        assert_eq!(dir.global_depth(), 0);
        assert_eq!(dir.size(), 1);
        assert_eq!(dir.max_size(), 512);
        assert_eq!(dir.bucket_page_id(0), INVALID_PAGE_ID);
        assert_eq!(dir.local_depth(0), 0);
    }

    #[test]
    fn test_directory_page_hash_masks_low_bits() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = empty_directory(&mut data, 9);

        dir.incr_global_depth();
        dir.incr_global_depth();
        assert_eq!(dir.global_depth_mask(), 0b11);

        assert_eq!(dir.hash_to_bucket_index(0b10110), 0b10);
        // Masking is idempotent.
        let idx = dir.hash_to_bucket_index(0xDEAD_BEEF);
        assert_eq!(dir.hash_to_bucket_index(idx), idx);
        assert!(idx < dir.size());
    }

    #[test]
    fn test_directory_page_incr_global_depth_mirrors() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = empty_directory(&mut data, 9);

        dir.incr_global_depth();
        dir.set_bucket_page_id(0, PageId::new(10));
        dir.set_bucket_page_id(1, PageId::new(11));
        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);

        dir.incr_global_depth();
        assert_eq!(dir.global_depth(), 2);
        assert_eq!(dir.size(), 4);

        // Each upper-half slot mirrors its lower-half twin.
        for i in 0..2 {
            assert_eq!(dir.bucket_page_id(i), dir.bucket_page_id(i + 2));
            assert_eq!(dir.local_depth(i), dir.local_depth(i + 2));
        }
    }

    #[test]
    fn test_directory_page_incr_global_depth_capped() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = empty_directory(&mut data, 2);

        for _ in 0..5 {
            dir.incr_global_depth();
        }
        assert_eq!(dir.global_depth(), 2);
        assert_eq!(dir.size(), 4);
    }

    #[test]
    fn test_directory_page_split_image_index() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = empty_directory(&mut data, 9);

        dir.incr_global_depth();
        dir.incr_global_depth();
        dir.set_local_depth(1, 1);

        // Flips the bit just above the local-depth prefix.
        assert_eq!(dir.split_image_index(1), 0b11);
        dir.set_local_depth(2, 2);
        assert_eq!(dir.split_image_index(2), 0b110);
    }

    #[test]
    fn test_directory_page_grow_then_shrink_sequence() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = empty_directory(&mut data, 9);

        dir.incr_global_depth();
        dir.incr_global_depth();
        dir.incr_global_depth();
        assert_eq!(dir.size(), 8);

        dir.set_bucket_page_id(0, PageId::new(10));
        dir.set_bucket_page_id(1, PageId::new(11));
        dir.set_bucket_page_id(2, PageId::new(10));
        dir.set_bucket_page_id(3, PageId::new(11));
        for i in 0..4 {
            dir.set_local_depth(i, 1);
        }

        // No slot uses all three bits, so the directory can halve.
        assert!(dir.can_shrink());
        dir.decr_global_depth();
        assert_eq!(dir.size(), 4);
        for (i, expected) in [10, 11, 10, 11].into_iter().enumerate() {
            assert_eq!(dir.bucket_page_id(i as u32), PageId::new(expected));
        }

        dir.decr_global_depth();
        assert_eq!(dir.size(), 2);
        assert_eq!(dir.bucket_page_id(0), PageId::new(10));
        assert_eq!(dir.bucket_page_id(1), PageId::new(11));

        // Local depth 1 == global depth 1: shrinking further would strand
        // the second bucket.
        assert!(!dir.can_shrink());
        dir.decr_global_depth();
        assert_eq!(dir.size(), 2);
    }

    #[test]
    fn test_directory_page_shrink_clears_upper_half() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = empty_directory(&mut data, 9);

        dir.incr_global_depth();
        dir.set_bucket_page_id(0, PageId::new(5));
        dir.set_bucket_page_id(1, PageId::new(5));

        assert!(dir.can_shrink());
        dir.decr_global_depth();
        assert_eq!(dir.global_depth(), 0);

        // The abandoned slot reads as empty again.
        assert_eq!(dir.bucket_page_id(1), INVALID_PAGE_ID);
        assert_eq!(dir.local_depth(1), 0);
    }

    #[test]
    fn test_directory_page_cannot_shrink_at_depth_zero() {
        let mut data = [0u8; PAGE_SIZE];
        let dir = empty_directory(&mut data, 9);
        assert!(!dir.can_shrink());
    }

    #[test]
    fn test_directory_page_ref_reads_persisted_layout() {
        let mut data = [0u8; PAGE_SIZE];
        {
            let mut dir = DirectoryPage::new(&mut data);
            dir.init(9);
            dir.incr_global_depth();
            dir.set_bucket_page_id(0, PageId::new(42));
            dir.set_local_depth(0, 1);
        }

        // Spot-check the wire format directly: little-endian u32 header
        // fields, then the local depth bytes, then i32 bucket ids.
        assert_eq!(&data[0..4], &9u32.to_le_bytes());
        assert_eq!(&data[4..8], &1u32.to_le_bytes());
        assert_eq!(data[8], 1);
        assert_eq!(&data[520..524], &42i32.to_le_bytes());
        assert_eq!(&data[524..528], &(-1i32).to_le_bytes());

        let view = DirectoryPageRef::new(&data);
        assert_eq!(view.max_depth(), 9);
        assert_eq!(view.global_depth(), 1);
        assert_eq!(view.size(), 2);
        assert_eq!(view.bucket_page_id(0), PageId::new(42));
        assert_eq!(view.bucket_page_id(1), INVALID_PAGE_ID);
        assert_eq!(view.local_depth(0), 1);
        assert_eq!(view.hash_to_bucket_index(0b111), 1);
    }
}
