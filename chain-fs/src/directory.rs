//! # 目录编码层
//!
//! 目录的数据块被解读为定长的 [`DirEntry`] 数组。目录从不成链，
//! 因此一个目录最多容纳 [`DirEntry::PER_BLOCK`] 个目录项（含 `.` 与 `..`）。

use alloc::vec::Vec;

use crate::block_store::BlockStore;
use crate::layout::{DirEntry, DirEntryBlock};
use crate::{BlockId, Error, Inum, Result};

/// 目录数据块的视图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directory {
    block: BlockId,
}

impl Directory {
    #[inline]
    pub fn new(block: BlockId) -> Self {
        Self { block }
    }

    /// 空目录只含 `.` 与 `..`
    pub fn init(&self, store: &mut BlockStore, this: Inum, parent: Inum) -> Result<()> {
        self.insert(store, ".", this)?;
        self.insert(store, "..", parent)
    }

    /// 第一个同名且有效的目录项
    pub fn lookup(&self, store: &BlockStore, name: &str) -> Option<Inum> {
        let inum = self.on_entries(store, |entries| {
            entries
                .iter()
                .find(|entry| entry.is_filled() && entry.name() == name)
                .map(DirEntry::inum)
        });
        log::trace!("lookup {name:?} in {:?} -> {inum:?}", self.block);
        inum
    }

    /// 占用第一个空槽；目录满时不会扩展
    pub fn insert(&self, store: &mut BlockStore, name: &str, inum: Inum) -> Result<()> {
        DirEntry::check_name(name)?;

        self.on_entries_mut(store, |entries| {
            let Some(slot) = entries.iter_mut().find(|entry| !entry.is_filled()) else {
                log::warn!("directory at {:?} is full", self.block);
                return Err(Error::DirectoryFull);
            };
            *slot = DirEntry::new(name, inum);
            Ok(())
        })
    }

    /// 把第一个同名的有效目录项标记为空槽，返回它指向的 inode
    pub fn delete(&self, store: &mut BlockStore, name: &str) -> Result<Inum> {
        self.on_entries_mut(store, |entries| {
            let entry = entries
                .iter_mut()
                .find(|entry| entry.is_filled() && entry.name() == name)
                .ok_or(Error::NotFound)?;
            entry.clear();
            Ok(entry.inum())
        })
    }

    /// 按存储顺序列出所有有效目录项
    pub fn list(&self, store: &BlockStore) -> Vec<DirEntry> {
        self.on_entries(store, |entries| {
            entries
                .iter()
                .filter(|entry| entry.is_filled())
                .copied()
                .collect()
        })
    }

    /// 除 `.` 与 `..` 外没有其它目录项
    pub fn is_empty(&self, store: &BlockStore) -> bool {
        self.on_entries(store, |entries| {
            entries
                .iter()
                .filter(|entry| entry.is_filled())
                .all(|entry| matches!(entry.name(), "." | ".."))
        })
    }

    pub fn has_free_slot(&self, store: &BlockStore) -> bool {
        self.on_entries(store, |entries| entries.iter().any(|entry| !entry.is_filled()))
    }

    /// 重新指向父目录，目录被移动时使用
    pub fn set_parent(&self, store: &mut BlockStore, parent: Inum) -> Result<()> {
        self.delete(store, "..")?;
        self.insert(store, "..", parent)
    }
}

impl Directory {
    fn on_entries<V>(&self, store: &BlockStore, f: impl FnOnce(&DirEntryBlock) -> V) -> V {
        store.map(self.block, 0, f)
    }

    fn on_entries_mut<V>(
        &self,
        store: &mut BlockStore,
        f: impl FnOnce(&mut DirEntryBlock) -> V,
    ) -> V {
        store.map_mut(self.block, 0, f)
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::sync::Arc;

    use block_dev::MemoryDevice;

    use super::*;
    use crate::BLOCK_SIZE;
    use crate::layout::Geometry;

    fn setup() -> (BlockStore, Directory) {
        let geometry = Geometry::default();
        let dev = Arc::new(MemoryDevice::new(BLOCK_SIZE, geometry.total_blocks as usize));
        let mut store = BlockStore::format(dev, &geometry);
        let dir = Directory::new(store.allocate().unwrap());
        dir.init(&mut store, Inum::new(2), Inum::new(1)).unwrap();
        (store, dir)
    }

    fn names(store: &BlockStore, dir: &Directory) -> Vec<String> {
        dir.list(store)
            .iter()
            .map(|entry| String::from(entry.name()))
            .collect()
    }

    #[test]
    fn fresh_directory_has_dot_entries() {
        let (store, dir) = setup();
        assert_eq!(dir.lookup(&store, "."), Some(Inum::new(2)));
        assert_eq!(dir.lookup(&store, ".."), Some(Inum::new(1)));
        assert!(dir.is_empty(&store));
        assert_eq!(names(&store, &dir), [".", ".."]);
    }

    #[test]
    fn deleted_slot_is_reused_first() {
        let (mut store, dir) = setup();
        dir.insert(&mut store, "a", Inum::new(3)).unwrap();
        dir.insert(&mut store, "b", Inum::new(4)).unwrap();
        assert!(!dir.is_empty(&store));

        assert_eq!(dir.delete(&mut store, "a"), Ok(Inum::new(3)));
        assert_eq!(dir.lookup(&store, "a"), None);
        assert_eq!(dir.delete(&mut store, "a"), Err(Error::NotFound));

        dir.insert(&mut store, "c", Inum::new(5)).unwrap();
        assert_eq!(names(&store, &dir), [".", "..", "c", "b"]);
    }

    #[test]
    fn full_directory_rejects_insert() {
        let (mut store, dir) = setup();
        for i in 2..DirEntry::PER_BLOCK {
            dir.insert(&mut store, &alloc::format!("f{i}"), Inum::new(i as u32))
                .unwrap();
        }
        assert!(!dir.has_free_slot(&store));
        assert_eq!(
            dir.insert(&mut store, "one-more", Inum::new(9)),
            Err(Error::DirectoryFull)
        );
        assert_eq!(dir.list(&store).len(), DirEntry::PER_BLOCK);
    }

    #[test]
    fn duplicate_names_resolve_to_first() {
        let (mut store, dir) = setup();
        dir.insert(&mut store, "dup", Inum::new(7)).unwrap();
        dir.insert(&mut store, "dup", Inum::new(8)).unwrap();
        assert_eq!(dir.lookup(&store, "dup"), Some(Inum::new(7)));
    }

    #[test]
    fn reparent() {
        let (mut store, dir) = setup();
        dir.set_parent(&mut store, Inum::new(9)).unwrap();
        assert_eq!(dir.lookup(&store, ".."), Some(Inum::new(9)));
    }
}
