//! 链式 inode
//!
//! 每个 inode 恰好拥有一个数据块。超过一个块的对象由多个 inode
//! 通过 `next` 串成一条链：`I0 → I1 → … → Ik`。
//!
//! 链上每个节点的 `size` 记录的是**从该节点开始剩余的**字节数，
//! 即 `Ij.size == S - j * BLOCK_SIZE`，并且 `Ik.size <= BLOCK_SIZE`。

use core::mem;

use enumflags2::{BitFlags, bitflags};

use crate::block_cache::Plain;
use crate::{BLOCK_SIZE, BlockId, Inum};

pub const INODE_SIZE: usize = mem::size_of::<DiskInode>();
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DiskInode {
    /// 硬链接个数
    pub links: u32,
    /// 类型与权限
    pub mode: Mode,
    /// 从本节点开始剩余的字节数；对链头而言就是对象的大小
    pub size: u32,
    /// 唯一的数据块
    block: u32,
    /// 后继 inode，[`DiskInode::NO_NEXT`] 表示链尾
    next: u32,
    _reserved: u32,
    /// 最后访问时间
    pub atime: u64,
    /// 最后修改时间
    pub mtime: u64,
}

unsafe impl Plain for DiskInode {}

/// 文件类型与权限位，布局同 `st_mode`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Mode(u32);

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatKind {
    DIR = 0o040000,
    #[default]
    FILE = 0o100000,
}

#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    OtherExec = 0o001,
    OtherWrite = 0o002,
    OtherRead = 0o004,
    GroupExec = 0o010,
    GroupWrite = 0o020,
    GroupRead = 0o040,
    OwnerExec = 0o100,
    OwnerWrite = 0o200,
    OwnerRead = 0o400,
}

impl DiskInode {
    pub const NO_NEXT: u32 = u32::MAX;

    /// 新分配的 inode：没有链接、大小为0、没有后继
    #[inline]
    pub fn init(&mut self, mode: Mode, block: BlockId, now: u64) {
        *self = Self {
            links: 0,
            mode,
            size: 0,
            block: block.raw(),
            next: Self::NO_NEXT,
            _reserved: 0,
            atime: now,
            mtime: now,
        }
    }

    #[inline]
    pub fn block(&self) -> BlockId {
        BlockId::new(self.block)
    }

    #[inline]
    pub fn next(&self) -> Option<Inum> {
        (self.next != Self::NO_NEXT).then_some(Inum::new(self.next))
    }

    #[inline]
    pub fn set_next(&mut self, next: Option<Inum>) {
        self.next = next.map_or(Self::NO_NEXT, Inum::raw);
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.mode.is_file()
    }
}

impl Mode {
    const TYPE_MASK: u32 = 0o170000;
    const PERM_MASK: u32 = 0o777;

    /// 根目录与 `mkdir` 的默认值
    pub const DIRECTORY: Self = Self(0o040755);
    /// 新分配 inode 的默认值
    pub const REGULAR: Self = Self(0o100644);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn new(kind: StatKind, perm: BitFlags<Permission>) -> Self {
        Self(kind as u32 | perm.bits())
    }

    /// 不是目录或普通文件时返回空，原始值仍保留在 [`Mode::raw`] 中
    pub fn kind(self) -> Option<StatKind> {
        match self.0 & Self::TYPE_MASK {
            0o040000 => Some(StatKind::DIR),
            0o100000 => Some(StatKind::FILE),
            _ => None,
        }
    }

    #[inline]
    pub fn is_dir(self) -> bool {
        self.kind() == Some(StatKind::DIR)
    }

    #[inline]
    pub fn is_file(self) -> bool {
        self.kind() == Some(StatKind::FILE)
    }

    pub fn permissions(self) -> BitFlags<Permission> {
        BitFlags::from_bits_truncate(self.0 & Self::PERM_MASK)
    }

    /// 替换权限位，保留类型位
    pub fn with_permissions(self, perm: BitFlags<Permission>) -> Self {
        Self((self.0 & !Self::PERM_MASK) | perm.bits())
    }
}

impl From<u32> for Mode {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<Mode> for u32 {
    fn from(mode: Mode) -> Self {
        mode.0
    }
}
