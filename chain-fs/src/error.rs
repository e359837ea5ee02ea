use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 路径分量、inode 或目录项不存在
    NotFound,
    AlreadyExists,
    NotADirectory,
    IsADirectory,
    DirectoryNotEmpty,
    /// 目录只有一个块，槽位已用尽
    DirectoryFull,
    NoFreeInode,
    NoFreeBlock,
    NameTooLong,
    InvalidArgument,
}

pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::NotFound => "no such file or directory",
            Error::AlreadyExists => "file exists",
            Error::NotADirectory => "not a directory",
            Error::IsADirectory => "is a directory",
            Error::DirectoryNotEmpty => "directory not empty",
            Error::DirectoryFull => "no free slot in directory",
            Error::NoFreeInode => "out of inodes",
            Error::NoFreeBlock => "no space left on device",
            Error::NameTooLong => "file name too long",
            Error::InvalidArgument => "invalid argument",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}
