//! # 块缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此在内存中保留整个镜像的副本：
//! 挂载时一次性读入所有块，之后对块的操作都在副本上进行，
//! 由 [`BlockCache::sync`] 把脏块写回设备。
//!
//! 没有淘汰策略，镜像有多大，缓存就有多大。

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::mem;

use block_dev::BlockDevice;

use crate::{BLOCK_SIZE, BlockId, DataBlock};

/// 可以从任意字节原地解读出来的类型。
///
/// # Safety
///
/// 实现者必须是 `#[repr(C)]`、没有填充字节，
/// 且任意位模式都是合法值，对齐不超过8字节。
pub unsafe trait Plain: Sized {}

unsafe impl Plain for u8 {}
unsafe impl Plain for u32 {}
unsafe impl Plain for u64 {}
unsafe impl<T: Plain, const N: usize> Plain for [T; N] {}

/// 内存中的镜像副本
#[derive(Debug)]
pub struct BlockCache {
    /// 缓存的数据
    blocks: Vec<DataBlock>,
    /// 是否为脏块
    modified: Vec<bool>,
    /// 底层块设备的引用
    device: Arc<dyn BlockDevice>,
}

impl BlockCache {
    /// 从设备读入前 `total_blocks` 个块
    pub fn load(device: Arc<dyn BlockDevice>, total_blocks: usize) -> Self {
        let mut blocks = vec![DataBlock::zeroed(); total_blocks];
        for (block_id, block) in blocks.iter_mut().enumerate() {
            device.read_block(block_id, &mut block.0);
        }
        log::trace!("loaded {total_blocks} blocks");

        Self {
            blocks,
            modified: vec![false; total_blocks],
            device,
        }
    }

    /// 全零的镜像，所有块都视为脏块，下次同步时会覆盖设备
    pub fn zeroed(device: Arc<dyn BlockDevice>, total_blocks: usize) -> Self {
        Self {
            blocks: vec![DataBlock::zeroed(); total_blocks],
            modified: vec![true; total_blocks],
            device,
        }
    }

    pub fn sync(&mut self) {
        for (block_id, (block, modified)) in
            self.blocks.iter().zip(self.modified.iter_mut()).enumerate()
        {
            if *modified {
                *modified = false;
                self.device.write_block(block_id, &block.0);
            }
        }
    }

    pub fn bytes(&self, block_id: BlockId) -> &[u8; BLOCK_SIZE] {
        &self.blocks[usize::from(block_id)].0
    }

    pub fn bytes_mut(&mut self, block_id: BlockId) -> &mut [u8; BLOCK_SIZE] {
        let index = usize::from(block_id);
        self.modified[index] = true;
        &mut self.blocks[index].0
    }

    pub fn zeroize(&mut self, block_id: BlockId) {
        self.bytes_mut(block_id).fill(0);
    }

    pub fn get<T: Plain>(&self, block_id: BlockId, offset: usize) -> &T {
        Self::check::<T>(offset);
        let addr = self.bytes(block_id)[offset..].as_ptr().cast::<T>();
        unsafe { &*addr }
    }

    pub fn get_mut<T: Plain>(&mut self, block_id: BlockId, offset: usize) -> &mut T {
        Self::check::<T>(offset);
        let addr = self.bytes_mut(block_id)[offset..].as_mut_ptr().cast::<T>();
        unsafe { &mut *addr }
    }

    #[inline]
    pub fn map<T: Plain, V>(&self, block_id: BlockId, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(block_id, offset))
    }

    #[inline]
    pub fn map_mut<T: Plain, V>(
        &mut self,
        block_id: BlockId,
        offset: usize,
        f: impl FnOnce(&mut T) -> V,
    ) -> V {
        f(self.get_mut(block_id, offset))
    }
}

impl BlockCache {
    fn check<T>(offset: usize) {
        assert!(mem::size_of::<T>() + offset <= BLOCK_SIZE);
        assert!(mem::align_of::<T>() <= mem::align_of::<DataBlock>());
        assert_eq!(offset % mem::align_of::<T>(), 0, "misaligned access");
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        self.sync();
    }
}

#[cfg(test)]
mod tests {
    use block_dev::MemoryDevice;

    use super::*;

    #[test]
    fn only_dirty_blocks_reach_the_device() {
        let dev = Arc::new(MemoryDevice::new(BLOCK_SIZE, 4));
        let mut cache = BlockCache::load(dev.clone(), 4);

        cache.map_mut(BlockId::new(2), 8, |word: &mut u64| *word = u64::MAX);
        assert!(dev.snapshot().iter().all(|&b| b == 0));

        cache.sync();
        let image = dev.snapshot();
        let start = 2 * BLOCK_SIZE + 8;
        assert!(image[start..start + 8].iter().all(|&b| b == 0xFF));
        assert_eq!(image.iter().filter(|&&b| b != 0).count(), 8);
    }

    #[test]
    fn reload_sees_synced_data() {
        let dev = Arc::new(MemoryDevice::new(BLOCK_SIZE, 2));
        {
            let mut cache = BlockCache::zeroed(dev.clone(), 2);
            cache.bytes_mut(BlockId::new(1))[..5].copy_from_slice(b"hello");
        }

        let cache = BlockCache::load(dev, 2);
        assert_eq!(&cache.bytes(BlockId::new(1))[..5], b"hello");
    }

    #[test]
    #[should_panic(expected = "misaligned")]
    fn misaligned_record_is_rejected() {
        let dev = Arc::new(MemoryDevice::new(BLOCK_SIZE, 1));
        let cache = BlockCache::load(dev, 1);
        let _: &u32 = cache.get(BlockId::new(0), 2);
    }
}
