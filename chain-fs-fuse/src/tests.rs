use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use block_dev::MemoryDevice;
use chain_fs::{ChainFileSystem, Error, Geometry, Mode};

use super::*;

struct TempImage(PathBuf);

impl TempImage {
    fn new(tag: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "chain-fs-{tag}-{}.img",
            std::process::id()
        ));
        Self(path)
    }

    fn open(&self, geometry: Geometry) -> Arc<BlockFile> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.0)
            .unwrap();
        fd.set_len(geometry.image_bytes()).unwrap();
        Arc::new(BlockFile::new(fd))
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

#[test]
fn block_file_round_trip() {
    let image = TempImage::new("block");
    let dev = image.open(Geometry::new(4, 8));

    let block = [0x5A; BLOCK_SIZE];
    dev.write_block(2, &block);
    let mut buf = [0; BLOCK_SIZE];
    dev.read_block(2, &mut buf);
    assert_eq!(buf, block);

    dev.read_block(1, &mut buf);
    assert!(buf.iter().all(|&b| b == 0));
}

#[test]
fn image_survives_reopen() {
    let image = TempImage::new("reopen");
    let geometry = Geometry::default();

    let mut fs = ChainFileSystem::format(image.open(geometry), geometry).unwrap();
    fs.mknod("/", "note", Mode::REGULAR).unwrap();
    fs.write("/note", 0, b"persisted").unwrap();
    drop(fs);

    let fs = ChainFileSystem::mount(image.open(geometry), geometry).unwrap();
    let mut buf = [0; 9];
    assert_eq!(fs.read("/note", 0, &mut buf), Ok(9));
    assert_eq!(&buf, b"persisted");
}

#[test]
fn error_kinds() {
    assert_eq!(to_io_error(Error::NotFound).kind(), io::ErrorKind::NotFound);
    assert_eq!(
        to_io_error(Error::NoFreeBlock).kind(),
        io::ErrorKind::StorageFull
    );
    assert_eq!(
        to_io_error(Error::IsADirectory).to_string(),
        "is a directory"
    );
}

fn memory_fs(geometry: Geometry) -> ChainFileSystem {
    let dev = Arc::new(MemoryDevice::new(BLOCK_SIZE, geometry.total_blocks as usize));
    ChainFileSystem::format(dev, geometry).unwrap()
}

#[test]
fn put_and_remove_by_path() {
    let mut fs = memory_fs(Geometry::default());
    fs.mkdir("/", "docs", Mode::DIRECTORY.permissions()).unwrap();

    let inum = put(&mut fs, "/docs/readme", b"chained").unwrap();
    assert_eq!(fs.resolve("/docs/readme"), Ok(inum));
    let mut buf = [0; 7];
    assert_eq!(fs.read("/docs/readme", 0, &mut buf), Ok(7));
    assert_eq!(&buf, b"chained");

    assert_eq!(
        put(&mut fs, "docs/x", b"").unwrap_err().kind(),
        io::ErrorKind::InvalidInput
    );
    assert_eq!(
        remove(&mut fs, "/").unwrap_err().kind(),
        io::ErrorKind::InvalidInput
    );
    assert_eq!(
        remove(&mut fs, "/docs").unwrap_err().kind(),
        io::ErrorKind::DirectoryNotEmpty
    );

    remove(&mut fs, "/docs/readme").unwrap();
    remove(&mut fs, "/docs/").unwrap();
    assert_eq!(fs.resolve("/docs"), Err(Error::NotFound));
}

#[test]
fn failed_put_leaves_no_entry() {
    // 数据区只有根目录与新文件各一个块
    let mut fs = memory_fs(Geometry::new(5, 64));
    let err = put(&mut fs, "/big", &[1; BLOCK_SIZE + 1]).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::StorageFull);
    assert_eq!(fs.resolve("/big"), Err(Error::NotFound));
    assert_eq!(fs.list("/").unwrap().len(), 2);
}

#[test]
fn mismatched_inode_count_shows_dangling_entries() {
    let geometry = Geometry::new(256, 64);
    let dev = Arc::new(MemoryDevice::new(BLOCK_SIZE, geometry.total_blocks as usize));
    let mut fs = ChainFileSystem::format(dev.clone(), geometry).unwrap();
    for i in 0..20 {
        fs.mknod("/", &format!("f{i}"), Mode::REGULAR).unwrap();
    }
    assert!(dangling_entries(&fs, "/").unwrap().is_empty());
    drop(fs);

    let fs = ChainFileSystem::mount(dev, Geometry::new(256, 16)).unwrap();
    let dangling = dangling_entries(&fs, "/").unwrap();
    assert_eq!(dangling.len(), 6);
    assert!(dangling.iter().all(|dirent| dirent.inum.raw() >= 16));
}
