use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::BlockDevice;

/// 位于内存的块设备，镜像文件的替身
#[derive(Debug)]
pub struct MemoryDevice {
    block_size: usize,
    data: Mutex<Vec<u8>>,
}

impl MemoryDevice {
    pub fn new(block_size: usize, blocks: usize) -> Self {
        Self {
            block_size,
            data: Mutex::new(vec![0; block_size * blocks]),
        }
    }

    /// 拷贝出整个设备的内容
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl BlockDevice for MemoryDevice {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let data = self.data.lock();
        let start = block_id * self.block_size;
        assert!(start + buf.len() <= data.len(), "block {block_id} is outbound");
        buf.copy_from_slice(&data[start..start + buf.len()]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut data = self.data.lock();
        let start = block_id * self.block_size;
        assert!(start + buf.len() <= data.len(), "block {block_id} is outbound");
        data[start..start + buf.len()].copy_from_slice(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_do_not_overlap() {
        let dev = MemoryDevice::new(16, 4);
        dev.write_block(1, &[0xAB; 16]);
        dev.write_block(2, &[0xCD; 16]);

        let mut buf = [0; 16];
        dev.read_block(1, &mut buf);
        assert_eq!(buf, [0xAB; 16]);
        dev.read_block(3, &mut buf);
        assert_eq!(buf, [0; 16]);
        assert_eq!(dev.snapshot().len(), 64);
    }
}
