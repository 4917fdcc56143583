use std::sync::Arc;

use minibase::buffer::BufferPoolManager;
use minibase::storage::disk::{DiskManager, FileDiskManager};
use minibase::Trie;

fn main() {
    println!("Minibase - storage runtime of a disk-oriented DBMS");
    println!("===================================================\n");

    let db_path = "demo.db";

    let disk: Arc<dyn DiskManager> =
        Arc::new(FileDiskManager::new(db_path).expect("Failed to create disk manager"));
    println!("Opened database file: {}", db_path);

    // 10 frames, LRU-2 replacement
    let bpm = BufferPoolManager::new(10, 2, disk);
    println!("Created buffer pool with 10 frames\n");

    let page_id = bpm.new_page().expect("Failed to allocate page");
    println!("Allocated new page: {}", page_id);

    // Write through an exclusive guard; the latch and pin release when the
    // guard goes out of scope.
    {
        let mut guard = bpm
            .fetch_page_write(page_id)
            .expect("Failed to get write guard");
        let message = b"Hello from the buffer pool!";
        guard.data_mut()[..message.len()].copy_from_slice(message);
        println!("Wrote {} bytes through a write guard", message.len());
    }
    bpm.unpin_page(page_id, false);

    bpm.flush_page(page_id).expect("Failed to flush page");
    println!("Flushed page to disk");

    {
        let guard = bpm
            .fetch_page_read(page_id)
            .expect("Failed to get read guard");
        let text = String::from_utf8_lossy(&guard.data()[..27]);
        println!("Read back: {:?}\n", text);
    }

    // The trie is a persistent map: every put yields a new version and the
    // old ones keep working.
    let t1 = Trie::new().put(b"ab", 1u32);
    let t2 = t1.put(b"ac", 2u32);
    println!("t1[ab] = {:?}, t1[ac] = {:?}", t1.get::<u32>(b"ab"), t1.get::<u32>(b"ac"));
    println!("t2[ab] = {:?}, t2[ac] = {:?}", t2.get::<u32>(b"ab"), t2.get::<u32>(b"ac"));

    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
