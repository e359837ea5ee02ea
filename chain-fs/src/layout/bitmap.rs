use crate::block_cache::BlockCache;
use crate::{BLOCK_BITS, BlockId};

/// 位图区域内块的结构
type BitmapBlock = [u64; BLOCK_BITS / 64];

/// 位图区域，记录其指示区域的分配情况
#[derive(Debug)]
pub struct Bitmap {
    /// 位图的起始块
    start_block_id: u32,
    /// 位图所指示区域的有效位数
    capacity: u32,
    /// 可分配的最小编号，低于它的位永远不会被分配
    floor: u32,
    /// 在 `[floor, cursor)` 之间不存在空闲位
    cursor: u32,
}

/// 位在位图区域中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BitPos {
    block_index: u32,
    group_index: usize,
    ingroup_index: u32,
}

impl Bitmap {
    #[inline]
    pub fn new(start_block_id: u32, capacity: u32, floor: u32) -> Self {
        Self {
            start_block_id,
            capacity,
            floor,
            cursor: floor,
        }
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn get(&self, cache: &BlockCache, id: u32) -> bool {
        assert!(id < self.capacity, "bit {id} is outbound");
        let pos = BitPos::decode(id);
        cache.map(self.block_id(pos), 0, |bitmap_block: &BitmapBlock| {
            bitmap_block[pos.group_index] & (1 << pos.ingroup_index) != 0
        })
    }

    pub fn set(&mut self, cache: &mut BlockCache, id: u32, used: bool) {
        assert!(id < self.capacity, "bit {id} is outbound");
        let pos = BitPos::decode(id);
        cache.map_mut(self.block_id(pos), 0, |bitmap_block: &mut BitmapBlock| {
            if used {
                bitmap_block[pos.group_index] |= 1 << pos.ingroup_index;
            } else {
                bitmap_block[pos.group_index] &= !(1 << pos.ingroup_index);
            }
        });
        if !used && id >= self.floor {
            self.cursor = self.cursor.min(id);
        }
    }

    /// 从游标开始寻找第一个空闲位并占用，返回其编号。
    /// 若位图的空间用尽，则返回空。
    pub fn alloc(&mut self, cache: &mut BlockCache) -> Option<u32> {
        let mut id = self.cursor;
        while id < self.capacity {
            let pos = BitPos::decode(id);
            let bits = cache.map(self.block_id(pos), 0, |bitmap_block: &BitmapBlock| {
                bitmap_block[pos.group_index]
            });
            // 组内低于 id 的位视为已占用
            let bits = bits | ((1u64 << pos.ingroup_index) - 1);

            if bits != u64::MAX {
                let found = BitPos {
                    ingroup_index: bits.trailing_ones(),
                    ..pos
                }
                .encode();
                if found >= self.capacity {
                    break;
                }

                self.set(cache, found, true);
                self.cursor = found + 1;
                return Some(found);
            }

            // 跳到下一组的开头
            id = (id / 64 + 1) * 64;
        }

        self.cursor = self.capacity;
        None
    }

    pub fn dealloc(&mut self, cache: &mut BlockCache, id: u32) {
        // 编号一定得有对应的位
        assert!(self.get(cache, id), "double free of bit {id}");
        self.set(cache, id, false);
    }

    /// 已占用的位数
    pub fn count_used(&self, cache: &BlockCache) -> u32 {
        (0..self.capacity).filter(|&id| self.get(cache, id)).count() as u32
    }
}

impl Bitmap {
    #[inline]
    fn block_id(&self, pos: BitPos) -> BlockId {
        BlockId::new(self.start_block_id + pos.block_index)
    }
}

impl BitPos {
    /// 线性映射解码得到位置
    fn decode(id: u32) -> Self {
        let block_bits = BLOCK_BITS as u32;
        let inblock = id % block_bits;
        Self {
            block_index: id / block_bits,
            group_index: (inblock / 64) as usize,
            ingroup_index: inblock % 64,
        }
    }

    #[inline]
    fn encode(self) -> u32 {
        self.block_index * BLOCK_BITS as u32 + self.group_index as u32 * 64 + self.ingroup_index
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use block_dev::MemoryDevice;

    use super::*;
    use crate::BLOCK_SIZE;

    fn cache(blocks: usize) -> BlockCache {
        BlockCache::load(Arc::new(MemoryDevice::new(BLOCK_SIZE, blocks)), blocks)
    }

    #[test]
    fn first_fit_above_floor() {
        let mut cache = cache(1);
        let mut bitmap = Bitmap::new(0, 64, 2);

        assert_eq!(bitmap.alloc(&mut cache), Some(2));
        assert_eq!(bitmap.alloc(&mut cache), Some(3));
        assert_eq!(bitmap.alloc(&mut cache), Some(4));
        assert!(!bitmap.get(&cache, 0));
        assert!(!bitmap.get(&cache, 1));

        bitmap.dealloc(&mut cache, 3);
        assert_eq!(bitmap.alloc(&mut cache), Some(3));
        assert_eq!(bitmap.alloc(&mut cache), Some(5));
    }

    #[test]
    fn exhaustion_and_reuse() {
        let mut cache = cache(1);
        let mut bitmap = Bitmap::new(0, 70, 0);

        for expected in 0..70 {
            assert_eq!(bitmap.alloc(&mut cache), Some(expected));
        }
        assert_eq!(bitmap.alloc(&mut cache), None);
        assert_eq!(bitmap.count_used(&cache), 70);

        bitmap.dealloc(&mut cache, 65);
        assert_eq!(bitmap.alloc(&mut cache), Some(65));
        assert_eq!(bitmap.alloc(&mut cache), None);
    }

    #[test]
    fn bits_set_by_hand_are_skipped() {
        let mut cache = cache(1);
        let mut bitmap = Bitmap::new(0, 256, 0);
        for id in 0..130 {
            bitmap.set(&mut cache, id, true);
        }

        assert_eq!(bitmap.alloc(&mut cache), Some(130));
    }

    #[test]
    fn spans_several_blocks() {
        let mut cache = cache(2);
        let capacity = BLOCK_BITS as u32 + 10;
        let mut bitmap = Bitmap::new(0, capacity, 0);
        for id in 0..BLOCK_BITS as u32 {
            bitmap.set(&mut cache, id, true);
        }

        assert_eq!(bitmap.alloc(&mut cache), Some(BLOCK_BITS as u32));
        assert!(cache.bytes(BlockId::new(1))[0] & 1 == 1);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let mut cache = cache(1);
        let mut bitmap = Bitmap::new(0, 8, 0);
        bitmap.dealloc(&mut cache, 1);
    }
}
