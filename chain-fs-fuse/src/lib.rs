#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use block_dev::BlockDevice;
use chain_fs::path::Path;
use chain_fs::{BLOCK_SIZE, ChainFileSystem, Dirent, Inum, Mode};

/// 以宿主文件为后端的块设备
#[derive(Debug)]
pub struct BlockFile(pub Mutex<File>);

impl BlockFile {
    pub fn new(fd: File) -> Self {
        Self(Mutex::new(fd))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete block!");
    }
}

/// 把存储引擎的错误翻译为宿主的 I/O 错误
pub fn to_io_error(err: chain_fs::Error) -> io::Error {
    use chain_fs::Error;

    let kind = match err {
        Error::NotFound => io::ErrorKind::NotFound,
        Error::AlreadyExists => io::ErrorKind::AlreadyExists,
        Error::NotADirectory => io::ErrorKind::NotADirectory,
        Error::IsADirectory => io::ErrorKind::IsADirectory,
        Error::DirectoryNotEmpty => io::ErrorKind::DirectoryNotEmpty,
        Error::DirectoryFull | Error::NoFreeInode | Error::NoFreeBlock => {
            io::ErrorKind::StorageFull
        }
        Error::NameTooLong => io::ErrorKind::InvalidFilename,
        Error::InvalidArgument => io::ErrorKind::InvalidInput,
    };
    io::Error::new(kind, err)
}

/// 在镜像中的绝对路径 `dest` 处新建普通文件并写入 `data`。
/// 写入失败时新建的文件会被删掉。
pub fn put(fs: &mut ChainFileSystem, dest: &str, data: &[u8]) -> io::Result<Inum> {
    let (parent, name) = split(dest)?;
    let inum = fs.mknod(parent, name, Mode::REGULAR).map_err(to_io_error)?;
    if let Err(err) = fs.write(inum, 0, data) {
        fs.unlink(parent, name).map_err(to_io_error)?;
        return Err(to_io_error(err));
    }
    Ok(inum)
}

/// 删除镜像中的文件或空目录
pub fn remove(fs: &mut ChainFileSystem, path: &str) -> io::Result<()> {
    let (parent, name) = split(path)?;
    let removed = if fs.stat(path).map_err(to_io_error)?.is_dir() {
        fs.rmdir(parent, name)
    } else {
        fs.unlink(parent, name)
    };
    removed.map_err(to_io_error)
}

/// 目录中指向不存在 inode 的目录项。
///
/// 镜像不记录 inode 表的容量，用错 `--inodes` 挂载时编号超出容量的对象会出现在这里。
pub fn dangling_entries(fs: &ChainFileSystem, dir: &str) -> io::Result<Vec<Dirent>> {
    let entries = fs.list(dir).map_err(to_io_error)?;
    Ok(entries
        .into_iter()
        .filter(|dirent| fs.stat(dirent.inum).is_err())
        .collect())
}

fn split(path: &str) -> io::Result<(&str, &str)> {
    if path.is_relative() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{path:?} is not an absolute path"),
        ));
    }
    path.parent_file()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "root has no parent"))
}
