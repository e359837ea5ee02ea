//! # 门面层
//!
//! 按路径或 inode 编号操作文件树。每个修改操作完成后都会把脏块写回设备。

use core::ops::Range;

use alloc::string::String;
use alloc::vec::Vec;

use enumflags2::BitFlags;

use crate::cfs::ChainFileSystem;
use crate::directory::Directory;
use crate::layout::{DirEntry, Mode, Permission, StatKind};
use crate::{BLOCK_SIZE, Error, Inum, Result};

/// 操作对象：路径与编号二选一
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Path(&'a str),
    Inum(Inum),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inum: Inum,
    pub mode: Mode,
    pub links: u32,
    /// 只对普通文件有意义，其它类型恒为0
    pub size: u64,
    /// 链上的节点数，即占用的数据块数
    pub blocks: u64,
    pub atime: u64,
    pub mtime: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub name: String,
    pub inum: Inum,
}

impl<'a> From<&'a str> for Target<'a> {
    #[inline]
    fn from(path: &'a str) -> Self {
        Self::Path(path)
    }
}

impl From<Inum> for Target<'_> {
    #[inline]
    fn from(inum: Inum) -> Self {
        Self::Inum(inum)
    }
}

impl Stat {
    #[inline]
    pub fn kind(&self) -> Option<StatKind> {
        self.mode.kind()
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }
}

impl ChainFileSystem {
    pub fn stat<'a>(&self, target: impl Into<Target<'a>>) -> Result<Stat> {
        let inum = self.locate(target.into())?;
        let inode = self.inodes.get(&self.store, inum)?;
        let blocks = self.inodes.chain(&self.store, inum)?.len();

        Ok(Stat {
            inum,
            mode: inode.mode,
            links: inode.links,
            size: if inode.is_file() { inode.size as u64 } else { 0 },
            blocks: blocks as u64,
            atime: inode.atime,
            mtime: inode.mtime,
        })
    }

    /// 从 `offset` 开始读取，不超过对象末尾。返回读到的字节数。
    pub fn read<'a>(
        &self,
        target: impl Into<Target<'a>>,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<usize> {
        let inum = self.locate(target.into())?;
        let inode = self.inodes.get(&self.store, inum)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        let size = inode.size as usize;
        if offset >= size || buf.is_empty() {
            return Ok(0);
        }
        let end = size.min(offset.saturating_add(buf.len()));

        let chain = self.inodes.chain(&self.store, inum)?;
        for (index, in_block, in_buf) in segments(offset, end) {
            let block = self.inodes.get(&self.store, chain[index])?.block();
            buf[in_buf].copy_from_slice(&self.store.get_block(block)[in_block]);
        }

        log::trace!("read {inum:?} [{offset}, {end})");
        Ok(end - offset)
    }

    /// 在 `offset` 处写入整个 `buf`，必要时先增大对象。
    ///
    /// 增大失败时对象保持原样；`offset` 越过末尾留下的空洞读出为0。
    pub fn write<'a>(
        &mut self,
        target: impl Into<Target<'a>>,
        offset: usize,
        buf: &[u8],
    ) -> Result<usize> {
        let inum = self.locate(target.into())?;
        let inode = self.inodes.get(&self.store, inum)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let end = offset
            .checked_add(buf.len())
            .and_then(|end| u32::try_from(end).ok())
            .ok_or(Error::InvalidArgument)?;
        if end > inode.size {
            self.inodes.grow(&mut self.store, inum, end - inode.size)?;
        }

        let chain = self.inodes.chain(&self.store, inum)?;
        for (index, in_block, in_buf) in segments(offset, end as usize) {
            let block = self.inodes.get(&self.store, chain[index])?.block();
            self.store.get_block_mut(block)[in_block].copy_from_slice(&buf[in_buf]);
        }

        let now = self.now();
        self.inodes.update(&mut self.store, inum, |inode| inode.mtime = now)?;
        self.store.sync();

        log::debug!("write {inum:?} [{offset}, {end})");
        Ok(buf.len())
    }

    /// 把对象的大小调整为 `new_size`
    pub fn truncate<'a>(&mut self, target: impl Into<Target<'a>>, new_size: usize) -> Result<()> {
        let inum = self.locate(target.into())?;
        let inode = self.inodes.get(&self.store, inum)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        let new_size = u32::try_from(new_size).map_err(|_| Error::InvalidArgument)?;
        if new_size > inode.size {
            self.inodes.grow(&mut self.store, inum, new_size - inode.size)?;
        } else {
            self.inodes.shrink(&mut self.store, inum, inode.size - new_size)?;
        }

        let now = self.now();
        self.inodes.update(&mut self.store, inum, |inode| inode.mtime = now)?;
        self.store.sync();

        log::debug!("truncate {inum:?} from {} to {new_size}", inode.size);
        Ok(())
    }

    /// 在目录 `parent` 下创建名为 `name` 的对象。
    ///
    /// 目录类型的 `mode` 会同时写入 `.` 与 `..`。
    pub fn mknod<'a>(
        &mut self,
        parent: impl Into<Target<'a>>,
        name: &str,
        mode: Mode,
    ) -> Result<Inum> {
        let parent = self.locate(parent.into())?;
        let dir = self.directory(parent)?;

        DirEntry::check_name(name)?;
        if dir.lookup(&self.store, name).is_some() {
            return Err(Error::AlreadyExists);
        }
        if !dir.has_free_slot(&self.store) {
            return Err(Error::DirectoryFull);
        }

        let inum = self.inodes.allocate(&mut self.store, mode)?;
        let inode = self.inodes.update(&mut self.store, inum, |inode| {
            inode.links = 1;
            *inode
        })?;
        let inserted = if mode.is_dir() {
            Directory::new(inode.block())
                .init(&mut self.store, inum, parent)
                .and_then(|()| dir.insert(&mut self.store, name, inum))
        } else {
            dir.insert(&mut self.store, name, inum)
        };
        if let Err(err) = inserted {
            self.inodes.update(&mut self.store, inum, |inode| inode.links = 0)?;
            self.inodes.free(&mut self.store, inum);
            return Err(err);
        }

        self.touch(parent)?;
        self.store.sync();

        log::debug!("mknod {name:?} -> {inum:?} in {parent:?} with {mode:?}");
        Ok(inum)
    }

    pub fn mkdir<'a>(
        &mut self,
        parent: impl Into<Target<'a>>,
        name: &str,
        perm: BitFlags<Permission>,
    ) -> Result<Inum> {
        self.mknod(parent, name, Mode::new(StatKind::DIR, perm))
    }

    /// 删除目录项；链接数归零时释放整条链。
    ///
    /// 目录须用 [`ChainFileSystem::rmdir`] 删除。
    pub fn unlink<'a>(&mut self, parent: impl Into<Target<'a>>, name: &str) -> Result<()> {
        if matches!(name, "." | "..") {
            return Err(Error::InvalidArgument);
        }
        let parent = self.locate(parent.into())?;
        let dir = self.directory(parent)?;

        let inum = dir.lookup(&self.store, name).ok_or(Error::NotFound)?;
        if self.inodes.get(&self.store, inum)?.is_dir() {
            return Err(Error::IsADirectory);
        }

        dir.delete(&mut self.store, name)?;
        self.drop_link(inum)?;
        self.touch(parent)?;
        self.store.sync();

        log::debug!("unlink {name:?} ({inum:?}) from {parent:?}");
        Ok(())
    }

    /// 删除空目录
    pub fn rmdir<'a>(&mut self, parent: impl Into<Target<'a>>, name: &str) -> Result<()> {
        if matches!(name, "." | "..") {
            return Err(Error::InvalidArgument);
        }
        let parent = self.locate(parent.into())?;
        let dir = self.directory(parent)?;

        let inum = dir.lookup(&self.store, name).ok_or(Error::NotFound)?;
        if !self.directory(inum)?.is_empty(&self.store) {
            return Err(Error::DirectoryNotEmpty);
        }

        dir.delete(&mut self.store, name)?;
        self.drop_link(inum)?;
        self.touch(parent)?;
        self.store.sync();

        log::debug!("rmdir {name:?} ({inum:?}) from {parent:?}");
        Ok(())
    }

    /// 为已有的普通文件增加一个名字
    pub fn link<'a, 'b>(
        &mut self,
        source: impl Into<Target<'a>>,
        parent: impl Into<Target<'b>>,
        name: &str,
    ) -> Result<()> {
        let inum = self.locate(source.into())?;
        if self.inodes.get(&self.store, inum)?.is_dir() {
            return Err(Error::IsADirectory);
        }
        let parent = self.locate(parent.into())?;
        let dir = self.directory(parent)?;

        DirEntry::check_name(name)?;
        if dir.lookup(&self.store, name).is_some() {
            return Err(Error::AlreadyExists);
        }

        dir.insert(&mut self.store, name, inum)?;
        self.inodes
            .update(&mut self.store, inum, |inode| inode.links += 1)?;
        self.touch(parent)?;
        self.store.sync();

        log::debug!("link {inum:?} as {name:?} in {parent:?}");
        Ok(())
    }

    /// 先在目标目录加入新名字，再删去旧名字；链接数不变。
    ///
    /// 所有可能失败的检查都在第一次修改之前完成。
    pub fn rename<'a, 'b>(
        &mut self,
        src_parent: impl Into<Target<'a>>,
        src_name: &str,
        dst_parent: impl Into<Target<'b>>,
        dst_name: &str,
    ) -> Result<()> {
        if [src_name, dst_name].iter().any(|name| matches!(*name, "." | "..")) {
            return Err(Error::InvalidArgument);
        }
        let src_parent = self.locate(src_parent.into())?;
        let dst_parent = self.locate(dst_parent.into())?;
        let src_dir = self.directory(src_parent)?;
        let dst_dir = self.directory(dst_parent)?;

        let inum = src_dir
            .lookup(&self.store, src_name)
            .ok_or(Error::NotFound)?;
        DirEntry::check_name(dst_name)?;
        if src_parent == dst_parent && src_name == dst_name {
            return Ok(());
        }
        if dst_dir.lookup(&self.store, dst_name).is_some() {
            return Err(Error::AlreadyExists);
        }
        if !dst_dir.has_free_slot(&self.store) {
            return Err(Error::DirectoryFull);
        }

        let moved_dir = self.inodes.get(&self.store, inum)?.is_dir() && src_parent != dst_parent;
        if moved_dir && self.is_ancestor(inum, dst_parent)? {
            return Err(Error::InvalidArgument);
        }

        dst_dir.insert(&mut self.store, dst_name, inum)?;
        src_dir.delete(&mut self.store, src_name)?;
        if moved_dir {
            self.directory(inum)?.set_parent(&mut self.store, dst_parent)?;
        }

        self.touch(src_parent)?;
        self.touch(dst_parent)?;
        self.store.sync();

        log::debug!("rename {src_name:?} in {src_parent:?} to {dst_name:?} in {dst_parent:?}");
        Ok(())
    }

    /// 目录中所有有效目录项，按存储顺序
    pub fn list<'a>(&self, target: impl Into<Target<'a>>) -> Result<Vec<Dirent>> {
        let inum = self.locate(target.into())?;
        let entries = self.directory(inum)?.list(&self.store);

        Ok(entries
            .iter()
            .map(|entry| Dirent {
                name: String::from(entry.name()),
                inum: entry.inum(),
            })
            .collect())
    }

    /// 替换权限位，类型位保持不变
    pub fn chmod<'a>(
        &mut self,
        target: impl Into<Target<'a>>,
        perm: BitFlags<Permission>,
    ) -> Result<()> {
        let inum = self.locate(target.into())?;
        self.inodes.update(&mut self.store, inum, |inode| {
            inode.mode = inode.mode.with_permissions(perm);
        })?;
        self.store.sync();
        Ok(())
    }

    pub fn set_times<'a>(
        &mut self,
        target: impl Into<Target<'a>>,
        atime: u64,
        mtime: u64,
    ) -> Result<()> {
        let inum = self.locate(target.into())?;
        self.inodes.update(&mut self.store, inum, |inode| {
            inode.atime = atime;
            inode.mtime = mtime;
        })?;
        self.store.sync();
        Ok(())
    }
}

impl ChainFileSystem {
    fn touch(&mut self, inum: Inum) -> Result<()> {
        let now = self.now();
        self.inodes.update(&mut self.store, inum, |inode| inode.mtime = now)
    }

    /// 链接数减一，归零时释放
    fn drop_link(&mut self, inum: Inum) -> Result<()> {
        let links = self.inodes.update(&mut self.store, inum, |inode| {
            inode.links -= 1;
            inode.links
        })?;
        if links == 0 {
            self.inodes.free(&mut self.store, inum);
        }
        Ok(())
    }
}

/// 把 `[start, end)` 切成不跨块的片段：`(链上序号, 块内范围, 缓冲区范围)`
fn segments(start: usize, end: usize) -> impl Iterator<Item = (usize, Range<usize>, Range<usize>)> {
    let mut pos = start;
    core::iter::from_fn(move || {
        (pos < end).then(|| {
            let in_block = pos % BLOCK_SIZE;
            let len = (BLOCK_SIZE - in_block).min(end - pos);
            let segment = (
                pos / BLOCK_SIZE,
                in_block..in_block + len,
                pos - start..pos - start + len,
            );
            pos += len;
            segment
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_split_on_block_boundaries() {
        let parts: Vec<_> = segments(4000, 4096 * 2 + 10).collect();
        assert_eq!(
            parts,
            [
                (0, 4000..4096, 0..96),
                (1, 0..4096, 96..4192),
                (2, 0..10, 4192..4202),
            ]
        );
        assert_eq!(segments(5, 5).count(), 0);
    }
}
