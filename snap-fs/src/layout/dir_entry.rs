use core::{mem, ptr, slice};

/// 目录项名的最大字节数，最后一字节留给 `\0`
pub const NAME_MAX_LEN: usize = 59;

/// 64 字节的目录项。
/// 目录的数据就是这种记录的紧密排列，没有墓碑。
#[derive(Debug, Clone)]
#[repr(C)]
pub struct DirEntry {
    inode_id: u32,
    /// C 字符串，`\0` 结尾
    name: [u8; NAME_MAX_LEN + 1],
}

impl DirEntry {
    pub const SIZE: usize = mem::size_of::<Self>();

    pub fn empty() -> Self {
        Self {
            inode_id: 0,
            name: [0; NAME_MAX_LEN + 1],
        }
    }

    /// 调用方保证 `name` 不超过 [`NAME_MAX_LEN`] 字节
    pub fn new(name: &str, inode_id: u32) -> Self {
        debug_assert!(name.len() <= NAME_MAX_LEN);
        let mut entry = Self::empty();
        entry.inode_id = inode_id;
        entry.name[..name.len()].copy_from_slice(name.as_bytes());
        entry
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        // 损坏的非 UTF-8 名字当成空名，查找时自然落空
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    #[inline]
    pub fn inode_id(&self) -> u32 {
        self.inode_id
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), Self::SIZE) }
    }
}

impl Default for DirEntry {
    fn default() -> Self {
        Self::empty()
    }
}
