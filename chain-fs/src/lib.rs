#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* chain-fs 的整体架构，自上而下 */

// 门面层：按路径或 inode 编号提供 stat/read/write/mknod 等操作
mod vfs;

// 文件系统上下文：持有块存储与索引节点表，负责挂载与路径解析
mod cfs;

// 目录编码层：把目录的数据块解读为目录项数组
mod directory;

// 索引节点表：分配、释放与链式增长/收缩
mod inode_table;

// 路径工具
pub mod path;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
pub mod layout;

// 块存储层：镜像缓存、块分配
mod block_cache;
mod block_store;

mod error;

use derive_more::{From, Into};

pub use self::{
    block_cache::{BlockCache, Plain},
    block_store::BlockStore,
    cfs::{ChainFileSystem, Clock},
    error::{Error, Result},
    inode_table::InodeTable,
    layout::{DirEntry, DiskInode, Geometry, Mode, Permission, StatKind},
    vfs::{Dirent, Stat, Target},
};

pub const BLOCK_SIZE: usize = 4096;
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;

/// 根目录的 inode 编号，格式化时即被占用，永不释放
pub const ROOT_INUM: Inum = Inum(1);

/// 目录项名字的最大字节数（不含结尾的 `\0`）
pub const NAME_MAX_LEN: usize = 47;

/// 块缓存中的一个块，按8字节对齐，以便原地解读为 `#[repr(C)]` 结构
#[derive(Clone)]
#[repr(C, align(8))]
pub struct DataBlock(pub [u8; BLOCK_SIZE]);

/// inode 编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct Inum(u32);

/// 设备上块的绝对编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct BlockId(u32);

impl Inum {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl BlockId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<Inum> for usize {
    fn from(inum: Inum) -> Self {
        inum.0 as usize
    }
}

impl From<BlockId> for usize {
    fn from(id: BlockId) -> Self {
        id.0 as usize
    }
}

impl DataBlock {
    pub const fn zeroed() -> Self {
        Self([0; BLOCK_SIZE])
    }
}

impl core::fmt::Debug for DataBlock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DataBlock").finish_non_exhaustive()
    }
}
