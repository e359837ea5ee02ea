//! # 块存储
//!
//! 固定数量、固定大小的块，加上一张块位图。
//! 上层只通过 [`BlockStore::allocate`]、[`BlockStore::free`]
//! 与 [`BlockStore::get_block`] 使用块，从不接触半个块。

use alloc::sync::Arc;

use block_dev::BlockDevice;

use crate::block_cache::{BlockCache, Plain};
use crate::layout::{Bitmap, Geometry};
use crate::{BLOCK_SIZE, BlockId, Error, Result};

#[derive(Debug)]
pub struct BlockStore {
    pub(crate) cache: BlockCache,
    bitmap: Bitmap,
}

impl BlockStore {
    /// 读入已有镜像
    pub fn load(device: Arc<dyn BlockDevice>, geometry: &Geometry) -> Self {
        Self {
            cache: BlockCache::load(device, geometry.total_blocks as usize),
            bitmap: Self::bitmap(geometry),
        }
    }

    /// 全零的镜像，元数据区域的块预先标记为已用
    pub fn format(device: Arc<dyn BlockDevice>, geometry: &Geometry) -> Self {
        let mut store = Self {
            cache: BlockCache::zeroed(device, geometry.total_blocks as usize),
            bitmap: Self::bitmap(geometry),
        };
        store.reserve_metadata(geometry);
        store
    }

    /// 镜像未初始化时，把元数据区域的块标记为已用
    pub(crate) fn reserve_metadata(&mut self, geometry: &Geometry) {
        for block_id in 0..geometry.data_area_start() {
            self.bitmap.set(&mut self.cache, block_id, true);
        }
    }

    /// 分配新的数据块，返回其ID
    pub fn allocate(&mut self) -> Result<BlockId> {
        let block_id = self
            .bitmap
            .alloc(&mut self.cache)
            .map(BlockId::new)
            .ok_or(Error::NoFreeBlock)?;
        log::trace!("alloc block {block_id:?}");
        Ok(block_id)
    }

    /// 清零并释放数据块
    pub fn free(&mut self, block_id: BlockId) {
        log::trace!("free block {block_id:?}");
        self.cache.zeroize(block_id);
        self.bitmap.dealloc(&mut self.cache, block_id.raw());
    }

    #[inline]
    pub fn get_block(&self, block_id: BlockId) -> &[u8; BLOCK_SIZE] {
        self.cache.bytes(block_id)
    }

    #[inline]
    pub fn get_block_mut(&mut self, block_id: BlockId) -> &mut [u8; BLOCK_SIZE] {
        self.cache.bytes_mut(block_id)
    }

    #[inline]
    pub fn map<T: Plain, V>(&self, block_id: BlockId, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        self.cache.map(block_id, offset, f)
    }

    #[inline]
    pub fn map_mut<T: Plain, V>(
        &mut self,
        block_id: BlockId,
        offset: usize,
        f: impl FnOnce(&mut T) -> V,
    ) -> V {
        self.cache.map_mut(block_id, offset, f)
    }

    pub fn free_blocks(&self) -> u32 {
        self.bitmap.capacity() - self.bitmap.count_used(&self.cache)
    }

    #[inline]
    pub fn sync(&mut self) {
        self.cache.sync();
    }
}

impl BlockStore {
    fn bitmap(geometry: &Geometry) -> Bitmap {
        Bitmap::new(geometry.block_bitmap_start(), geometry.total_blocks, 0)
    }
}

#[cfg(test)]
mod tests {
    use block_dev::MemoryDevice;

    use super::*;

    fn store(geometry: &Geometry) -> BlockStore {
        let dev = Arc::new(MemoryDevice::new(BLOCK_SIZE, geometry.total_blocks as usize));
        BlockStore::format(dev, geometry)
    }

    #[test]
    fn metadata_is_never_handed_out() {
        let geometry = Geometry::new(8, 64);
        let mut store = store(&geometry);

        let first = store.allocate().unwrap();
        assert_eq!(first.raw(), geometry.data_area_start());
        assert_eq!(store.free_blocks(), geometry.data_area_blocks() - 1);
    }

    #[test]
    fn device_full() {
        let geometry = Geometry::new(5, 64);
        let mut store = store(&geometry);

        assert!(store.allocate().is_ok());
        assert!(store.allocate().is_ok());
        assert_eq!(store.allocate(), Err(Error::NoFreeBlock));
    }

    #[test]
    fn freed_block_is_zeroed_and_reused() {
        let geometry = Geometry::default();
        let mut store = store(&geometry);

        let free_blocks = store.free_blocks();
        let block_id = store.allocate().unwrap();
        store.get_block_mut(block_id)[..3].copy_from_slice(b"abc");
        store.free(block_id);
        assert_eq!(store.free_blocks(), free_blocks);

        let again = store.allocate().unwrap();
        assert_eq!(again, block_id);
        assert!(store.get_block(again).iter().all(|&b| b == 0));
    }
}
