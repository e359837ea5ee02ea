use std::mem;

use chain_fs::BLOCK_SIZE;
use chain_fs::layout::{DirEntry, DirEntryBlock, DiskInode, INODES_PER_BLOCK};

#[test]
fn layout() {
    assert_eq!(40, mem::size_of::<DiskInode>());
    assert_eq!(64, mem::size_of::<DirEntry>());
    assert_eq!(BLOCK_SIZE, mem::size_of::<DirEntryBlock>());
    assert_eq!(102, INODES_PER_BLOCK);
}
