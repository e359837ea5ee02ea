//! # 磁盘数据结构层
//!
//! chain-fs 的磁盘布局：
//! 块位图 | 索引节点位图 | 索引节点区域 | 数据块区域
//!
//! 块编号是设备上的绝对编号，元数据区域所占的块在格式化时就在块位图中标记为已用。

mod bitmap;
mod dir_entry;
mod inode;

pub use self::{
    bitmap::Bitmap,
    dir_entry::{DirEntry, DirEntryBlock},
    inode::{DiskInode, INODE_SIZE, INODES_PER_BLOCK, Mode, Permission, StatKind},
};

use crate::{BLOCK_BITS, BLOCK_SIZE, Error, ROOT_INUM, Result};

/// 镜像的几何参数，部署时确定，不写入镜像
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// 镜像占据块数
    pub total_blocks: u32,
    /// 索引节点池的容量
    pub inode_count: u32,
}

impl Default for Geometry {
    /// 1 MiB 的镜像，64个 inode
    fn default() -> Self {
        Self::new(256, 64)
    }
}

impl Geometry {
    #[inline]
    pub const fn new(total_blocks: u32, inode_count: u32) -> Self {
        Self {
            total_blocks,
            inode_count,
        }
    }

    /// 能装下 `bytes` 字节镜像的几何参数
    pub fn with_image_bytes(bytes: u64, inode_count: u32) -> Self {
        Self::new((bytes / BLOCK_SIZE as u64) as u32, inode_count)
    }

    #[inline]
    pub const fn block_bitmap_start(&self) -> u32 {
        0
    }

    pub const fn block_bitmap_blocks(&self) -> u32 {
        self.total_blocks.div_ceil(BLOCK_BITS as u32)
    }

    pub const fn inode_bitmap_start(&self) -> u32 {
        self.block_bitmap_start() + self.block_bitmap_blocks()
    }

    pub const fn inode_bitmap_blocks(&self) -> u32 {
        self.inode_count.div_ceil(BLOCK_BITS as u32)
    }

    pub const fn inode_area_start(&self) -> u32 {
        self.inode_bitmap_start() + self.inode_bitmap_blocks()
    }

    pub const fn inode_area_blocks(&self) -> u32 {
        self.inode_count.div_ceil(INODES_PER_BLOCK as u32)
    }

    /// 数据区的第一个块，也是元数据区域所占的块数
    pub const fn data_area_start(&self) -> u32 {
        self.inode_area_start() + self.inode_area_blocks()
    }

    pub const fn data_area_blocks(&self) -> u32 {
        self.total_blocks.saturating_sub(self.data_area_start())
    }

    #[inline]
    pub const fn image_bytes(&self) -> u64 {
        self.total_blocks as u64 * BLOCK_SIZE as u64
    }

    /// 至少要有根目录之外的一个 inode，以及容纳根目录的一个数据块
    pub fn validate(&self) -> Result<()> {
        if self.inode_count <= ROOT_INUM.raw() + 1 || self.data_area_blocks() == 0 {
            log::error!("unusable geometry: {self:?}");
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}
