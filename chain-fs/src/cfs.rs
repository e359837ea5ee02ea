//! # 文件系统上下文
//!
//! [`ChainFileSystem`] 持有块存储与索引节点表，
//! 负责格式化、挂载以及把路径解析为 inode 编号。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::block_store::BlockStore;
use crate::directory::Directory;
use crate::inode_table::InodeTable;
use crate::layout::{DiskInode, Geometry};
use crate::path::Path;
use crate::vfs::Target;
use crate::{Error, Inum, ROOT_INUM, Result};

/// 时间戳来源，返回自纪元以来的秒数
pub type Clock = fn() -> u64;

/// 未设置时钟时所有时间戳都是0
pub(crate) fn epoch() -> u64 {
    0
}

#[derive(Debug)]
pub struct ChainFileSystem {
    pub(crate) store: BlockStore,
    pub(crate) inodes: InodeTable,
    geometry: Geometry,
}

impl ChainFileSystem {
    /// 清零整个镜像，写入元数据并创建根目录
    pub fn format(device: Arc<dyn BlockDevice>, geometry: Geometry) -> Result<Self> {
        geometry.validate()?;

        let mut store = BlockStore::format(device, &geometry);
        let mut inodes = InodeTable::new(&geometry);
        inodes.initialize(&mut store)?;
        store.sync();

        log::debug!("formatted {geometry:?}");
        Ok(Self {
            store,
            inodes,
            geometry,
        })
    }

    /// 载入已有镜像；若镜像是空白的，就地初始化
    pub fn mount(device: Arc<dyn BlockDevice>, geometry: Geometry) -> Result<Self> {
        geometry.validate()?;

        let mut store = BlockStore::load(device, &geometry);
        let mut inodes = InodeTable::new(&geometry);
        if !inodes.is_allocated(&store, ROOT_INUM) {
            log::debug!("blank image, initializing");
            store.reserve_metadata(&geometry);
            inodes.initialize(&mut store)?;
            store.sync();
        }

        Ok(Self {
            store,
            inodes,
            geometry,
        })
    }

    /// 之后新建或修改的对象使用 `clock` 记录时间
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.inodes.set_clock(clock);
        self
    }

    /// 在多线程宿主中共享时，由调用方持锁串行化所有操作
    pub fn into_shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    #[inline]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    #[inline]
    pub fn sync(&mut self) {
        self.store.sync();
    }

    pub fn free_inodes(&self) -> u32 {
        self.inodes.free_inodes(&self.store)
    }

    pub fn free_blocks(&self) -> u32 {
        self.store.free_blocks()
    }

    /// 从根目录开始逐个分量查找。
    ///
    /// 空路径与 `/` 都是根目录；相对路径同样从根目录开始。
    pub fn resolve(&self, path: &str) -> Result<Inum> {
        let mut inum = ROOT_INUM;
        for name in path.components() {
            inum = self
                .directory(inum)?
                .lookup(&self.store, name)
                .ok_or(Error::NotFound)?;
        }
        log::trace!("resolve {path:?} -> {inum:?}");
        Ok(inum)
    }

    /// 拷贝出 inode，包括链上的后继节点
    pub fn inode(&self, inum: Inum) -> Result<DiskInode> {
        self.inodes.get(&self.store, inum)
    }

    /// 对象的整条链，链头在前
    pub fn chain<'a>(&self, target: impl Into<Target<'a>>) -> Result<Vec<Inum>> {
        let inum = self.locate(target.into())?;
        self.inodes.chain(&self.store, inum)
    }
}

impl ChainFileSystem {
    #[inline]
    pub(crate) fn now(&self) -> u64 {
        self.inodes.now()
    }

    /// 把目标落实为一个链头。
    ///
    /// 后继节点没有链接，按编号访问时视为不存在。
    pub(crate) fn locate(&self, target: Target<'_>) -> Result<Inum> {
        match target {
            Target::Path(path) => self.resolve(path),
            Target::Inum(inum) => {
                if self.inodes.get(&self.store, inum)?.links == 0 {
                    return Err(Error::NotFound);
                }
                Ok(inum)
            }
        }
    }

    pub(crate) fn directory(&self, inum: Inum) -> Result<Directory> {
        let inode = self.inodes.get(&self.store, inum)?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok(Directory::new(inode.block()))
    }

    /// `ancestor` 是否为 `inum` 本身或沿 `..` 向上可达
    pub(crate) fn is_ancestor(&self, ancestor: Inum, mut inum: Inum) -> Result<bool> {
        for _ in 0..self.inodes.capacity() {
            if inum == ancestor {
                return Ok(true);
            }
            if inum == ROOT_INUM {
                return Ok(false);
            }
            inum = self
                .directory(inum)?
                .lookup(&self.store, "..")
                .ok_or(Error::NotFound)?;
        }
        panic!("`..` chain from {inum:?} never reaches root");
    }
}

#[cfg(test)]
mod tests {
    use block_dev::MemoryDevice;

    use super::*;
    use crate::BLOCK_SIZE;

    fn device(geometry: &Geometry) -> Arc<MemoryDevice> {
        Arc::new(MemoryDevice::new(BLOCK_SIZE, geometry.total_blocks as usize))
    }

    #[test]
    fn blank_image_is_initialized_on_mount() {
        let geometry = Geometry::default();
        let dev = device(&geometry);

        let fs = ChainFileSystem::mount(dev.clone(), geometry).unwrap();
        assert_eq!(fs.resolve("/").unwrap(), ROOT_INUM);
        assert_eq!(fs.free_inodes(), 62);
        assert_eq!(fs.free_blocks(), geometry.data_area_blocks() - 1);
        drop(fs);

        let again = ChainFileSystem::mount(dev, geometry).unwrap();
        assert_eq!(again.free_blocks(), geometry.data_area_blocks() - 1);
    }

    #[test]
    fn degenerate_geometry_is_refused() {
        let geometry = Geometry::new(2, 64);
        assert_eq!(
            ChainFileSystem::format(device(&geometry), geometry).unwrap_err(),
            Error::InvalidArgument
        );
    }

    #[test]
    fn resolve_edge_cases() {
        let geometry = Geometry::default();
        let fs = ChainFileSystem::format(device(&geometry), geometry).unwrap();

        assert_eq!(fs.resolve("").unwrap(), ROOT_INUM);
        assert_eq!(fs.resolve("//").unwrap(), ROOT_INUM);
        assert_eq!(fs.resolve("/./..").unwrap(), ROOT_INUM);
        assert_eq!(fs.resolve("/missing"), Err(Error::NotFound));
        assert!(fs.is_ancestor(ROOT_INUM, ROOT_INUM).unwrap());
    }

    #[test]
    fn shared_handle() {
        let geometry = Geometry::default();
        let fs = ChainFileSystem::format(device(&geometry), geometry)
            .unwrap()
            .into_shared();
        let inum = fs.lock().resolve("/").unwrap();
        assert_eq!(inum, ROOT_INUM);
    }
}
