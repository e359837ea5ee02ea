//! # 索引节点表
//!
//! 固定容量的 inode 数组，以 [`Inum`] 为下标，由 inode 位图记录分配情况。
//! 对象超过一个块时，多出的部分推给后继 inode，形成链；
//! 链的增长与收缩都在这里完成。

use alloc::vec;
use alloc::vec::Vec;

use crate::block_store::BlockStore;
use crate::cfs::{Clock, epoch};
use crate::directory::Directory;
use crate::layout::{Bitmap, DiskInode, Geometry, INODE_SIZE, INODES_PER_BLOCK, Mode};
use crate::{BLOCK_SIZE, BlockId, Error, Inum, ROOT_INUM, Result};

#[derive(Debug)]
pub struct InodeTable {
    bitmap: Bitmap,
    area_start_block: u32,
    capacity: u32,
    clock: Clock,
}

impl InodeTable {
    pub fn new(geometry: &Geometry) -> Self {
        Self {
            // 0号永不分配，1号留给根目录
            bitmap: Bitmap::new(
                geometry.inode_bitmap_start(),
                geometry.inode_count,
                ROOT_INUM.raw() + 1,
            ),
            area_start_block: geometry.inode_area_start(),
            capacity: geometry.inode_count,
            clock: epoch,
        }
    }

    #[inline]
    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    #[inline]
    pub fn now(&self) -> u64 {
        (self.clock)()
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// 若根目录尚未分配，则创建它并写入 `.` 与 `..`。
    /// 返回是否真的创建了根目录。
    pub fn initialize(&mut self, store: &mut BlockStore) -> Result<bool> {
        if self.is_allocated(store, ROOT_INUM) {
            return Ok(false);
        }

        let block = store.allocate()?;
        self.bitmap.set(&mut store.cache, ROOT_INUM.raw(), true);
        let now = self.now();
        self.update(store, ROOT_INUM, |root| {
            root.init(Mode::DIRECTORY, block, now);
            root.links = 1;
        })?;
        Directory::new(block).init(store, ROOT_INUM, ROOT_INUM)?;

        log::debug!("root directory created at block {block:?}");
        Ok(true)
    }

    pub fn is_allocated(&self, store: &BlockStore, inum: Inum) -> bool {
        inum.raw() < self.capacity && self.bitmap.get(&store.cache, inum.raw())
    }

    /// 拷贝出 inode；未分配时返回 [`Error::NotFound`]
    pub fn get(&self, store: &BlockStore, inum: Inum) -> Result<DiskInode> {
        self.map(store, inum, |inode| *inode)
    }

    pub fn map<V>(&self, store: &BlockStore, inum: Inum, f: impl FnOnce(&DiskInode) -> V) -> Result<V> {
        if !self.is_allocated(store, inum) {
            return Err(Error::NotFound);
        }
        let (block_id, offset) = self.disk_inode_pos(inum);
        Ok(store.map(block_id, offset, f))
    }

    pub fn update<V>(
        &self,
        store: &mut BlockStore,
        inum: Inum,
        f: impl FnOnce(&mut DiskInode) -> V,
    ) -> Result<V> {
        if !self.is_allocated(store, inum) {
            return Err(Error::NotFound);
        }
        let (block_id, offset) = self.disk_inode_pos(inum);
        Ok(store.map_mut(block_id, offset, f))
    }

    /// 在根目录之后寻找第一个空闲 inode，为它分配一个新块
    pub fn allocate(&mut self, store: &mut BlockStore, mode: Mode) -> Result<Inum> {
        let inum = self
            .bitmap
            .alloc(&mut store.cache)
            .map(Inum::new)
            .ok_or(Error::NoFreeInode)?;

        let block = match store.allocate() {
            Ok(block) => block,
            Err(err) => {
                self.bitmap.dealloc(&mut store.cache, inum.raw());
                return Err(err);
            }
        };

        let now = self.now();
        self.update(store, inum, |inode| inode.init(mode, block, now))?;
        log::debug!("alloc inode {inum:?} with block {block:?}");
        Ok(inum)
    }

    /// 释放 inode 及其整条链。调用者必须保证链接数已归零。
    pub fn free(&mut self, store: &mut BlockStore, inum: Inum) {
        assert_ne!(inum, ROOT_INUM, "root inode is permanent");
        let inode = self
            .get(store, inum)
            .unwrap_or_else(|_| panic!("free of unallocated inode {inum:?}"));
        assert_eq!(inode.links, 0, "free of linked inode {inum:?}");

        log::debug!("free inode {inum:?}");
        if !inode.is_dir() {
            // 目录从不成链，大小也恒为0
            self.shrink(store, inum, inode.size)
                .unwrap_or_else(|err| panic!("shrink of {inum:?} to zero failed: {err}"));
        }
        self.release(store, inum);
    }

    /// 链上所有节点，链头在前
    pub fn chain(&self, store: &BlockStore, inum: Inum) -> Result<Vec<Inum>> {
        let mut chain = vec![inum];
        let mut next = self.get(store, inum)?.next();
        while let Some(inum) = next {
            assert!(
                chain.len() < self.capacity as usize,
                "inode chain starting at {:?} loops",
                chain[0]
            );
            chain.push(inum);
            next = self.get(store, inum)?.next();
        }
        Ok(chain)
    }

    /// 对象增大 `delta` 字节。
    ///
    /// 所需的后继 inode 先全部分配好再改写大小，
    /// 分配失败时已分配的会被归还，对象保持原样。
    pub fn grow(&mut self, store: &mut BlockStore, inum: Inum, delta: u32) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }

        let size = self.get(store, inum)?.size;
        let new_size = size.checked_add(delta).ok_or(Error::InvalidArgument)?;
        let mut chain = self.chain(store, inum)?;
        let nodes = Self::nodes_for(new_size);

        let mut reserved = Vec::with_capacity(nodes.saturating_sub(chain.len()));
        while chain.len() + reserved.len() < nodes {
            match self.allocate(store, Mode::REGULAR) {
                Ok(next) => reserved.push(next),
                Err(err) => {
                    log::debug!("grow of {inum:?} by {delta} aborted: {err}");
                    for next in reserved {
                        self.release(store, next);
                    }
                    return Err(err);
                }
            }
        }

        chain.extend(reserved);
        for pair in chain.windows(2) {
            self.update(store, pair[0], |node| node.set_next(Some(pair[1])))?;
        }
        self.rewrite_sizes(store, &chain, new_size)?;

        log::debug!("grow inode {inum:?} from {size} to {new_size}");
        Ok(())
    }

    /// 对象缩小 `delta` 字节，释放多余的后继 inode，
    /// 新的链尾中超出对象末尾的字节被清零。
    pub fn shrink(&mut self, store: &mut BlockStore, inum: Inum, delta: u32) -> Result<()> {
        let size = self.get(store, inum)?.size;
        if delta > size {
            return Err(Error::InvalidArgument);
        }
        if delta == 0 {
            return Ok(());
        }

        let new_size = size - delta;
        let chain = self.chain(store, inum)?;
        let nodes = Self::nodes_for(new_size);

        let tail = chain[nodes - 1];
        self.update(store, tail, |node| node.set_next(None))?;
        for &dropped in &chain[nodes..] {
            self.release(store, dropped);
        }
        self.rewrite_sizes(store, &chain[..nodes], new_size)?;

        let tail_size = new_size as usize - (nodes - 1) * BLOCK_SIZE;
        let block = self.get(store, tail)?.block();
        store.get_block_mut(block)[tail_size..].fill(0);

        log::debug!("shrink inode {inum:?} from {size} to {new_size}");
        Ok(())
    }

    /// 尚可分配的 inode 数
    pub fn free_inodes(&self, store: &BlockStore) -> u32 {
        // 0号不可用，根目录的位也计入了已用
        self.capacity - 1 - self.bitmap.count_used(&store.cache)
    }
}

impl InodeTable {
    /// 容纳 `size` 字节需要的节点数，空对象也占一个
    #[inline]
    fn nodes_for(size: u32) -> usize {
        (size as usize).div_ceil(BLOCK_SIZE).max(1)
    }

    /// 通过ID获取 inode 在磁盘上的位置：**块ID**以及**块内偏移**
    fn disk_inode_pos(&self, inum: Inum) -> (BlockId, usize) {
        let index = usize::from(inum);
        let block_id = self.area_start_block + (index / INODES_PER_BLOCK) as u32;
        (BlockId::new(block_id), index % INODES_PER_BLOCK * INODE_SIZE)
    }

    /// 链上第 j 个节点记录 `total - j * BLOCK_SIZE`
    fn rewrite_sizes(&self, store: &mut BlockStore, chain: &[Inum], total: u32) -> Result<()> {
        for (j, &node) in chain.iter().enumerate() {
            let remaining = total - (j * BLOCK_SIZE) as u32;
            self.update(store, node, |inode| inode.size = remaining)?;
        }
        Ok(())
    }

    /// 只释放单个节点：数据块、记录与位
    fn release(&mut self, store: &mut BlockStore, inum: Inum) {
        let (block_id, offset) = self.disk_inode_pos(inum);
        let block = store.map_mut(block_id, offset, |inode: &mut DiskInode| {
            let block = inode.block();
            *inode = DiskInode::default();
            block
        });
        store.free(block);
        self.bitmap.dealloc(&mut store.cache, inum.raw());
    }
}
