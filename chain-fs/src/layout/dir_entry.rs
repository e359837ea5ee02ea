use crate::block_cache::Plain;
use crate::{BLOCK_SIZE, Error, Inum, NAME_MAX_LEN, Result};

/// 目录项：名字到 inode 编号的映射。
///
/// 删除时只清除 `filled` 标记，名字与编号原样留在槽位里。
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct DirEntry {
    // 最后一字节留给 \0
    name: [u8; NAME_MAX_LEN + 1],
    inum: u32,
    _reserved: [u8; 8],
    filled: u32,
}

unsafe impl Plain for DirEntry {}

/// 目录唯一的数据块
pub type DirEntryBlock = [DirEntry; DirEntry::PER_BLOCK];

impl DirEntry {
    /// 目录项大小恒为64字节
    pub const SIZE: usize = 64;
    /// 一个目录最多能容纳的目录项数
    pub const PER_BLOCK: usize = BLOCK_SIZE / Self::SIZE;

    pub const EMPTY: Self = Self {
        name: [0; NAME_MAX_LEN + 1],
        inum: 0,
        _reserved: [0; 8],
        filled: 0,
    };

    /// 名字须先经过 [`DirEntry::check_name`]
    pub fn new(name: &str, inum: Inum) -> Self {
        let bytes = name.as_bytes();
        let mut entry = Self::EMPTY;
        entry.name[..bytes.len()].copy_from_slice(bytes);
        entry.inum = inum.raw();
        entry.filled = 1;
        entry
    }

    pub fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.contains('/') || name.contains('\0') {
            return Err(Error::InvalidArgument);
        }
        if name.len() > NAME_MAX_LEN {
            return Err(Error::NameTooLong);
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_MAX_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or_default()
    }

    #[inline]
    pub fn inum(&self) -> Inum {
        Inum::new(self.inum)
    }

    #[inline]
    pub fn is_filled(&self) -> bool {
        self.filled == 1
    }

    /// 标记为空槽
    #[inline]
    pub fn clear(&mut self) {
        self.filled = 0;
    }
}
