//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 块的大小由上层文件系统决定，驱动只按 `buf.len()` 搬运数据。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod memory;

use core::any::Any;
use core::fmt::Debug;

pub use self::memory::MemoryDevice;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any + Debug {
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    fn write_block(&self, block_id: usize, buf: &[u8]);
}
