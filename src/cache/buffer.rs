//! 缓存块结构

use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    /// 缓存块标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CacheFlags: u8 {
        /// 数据已更新（有效）
        const UPTODATE = 0x01;
        /// 数据已修改（脏）
        const DIRTY    = 0x02;
    }
}

/// 缓存块
///
/// # 字段说明
///
/// - `block`: 块在后备文件中的块号（字节偏移 / 块大小）
/// - `data`: 块数据缓冲区
/// - `pins`: pin 计数，当 > 0 时块不能被驱逐
/// - `flags`: 块状态标志
pub struct CacheBuffer {
    /// 文件内块号
    pub block: u64,

    /// 块数据
    pub data: Vec<u8>,

    /// pin 计数
    pub pins: u32,

    /// 块状态标志
    pub flags: CacheFlags,
}

impl core::fmt::Debug for CacheBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CacheBuffer")
            .field("block", &self.block)
            .field("data_len", &self.data.len())
            .field("pins", &self.pins)
            .field("flags", &self.flags)
            .finish()
    }
}

impl CacheBuffer {
    /// 创建新的缓存块（全零，未 pin）
    pub fn new(block: u64, block_size: usize) -> Self {
        Self {
            block,
            data: alloc::vec![0u8; block_size],
            pins: 0,
            flags: CacheFlags::empty(),
        }
    }

    /// 增加 pin 计数
    pub fn pin(&mut self) {
        self.pins = self.pins.saturating_add(1);
    }

    /// 减少 pin 计数
    pub fn unpin(&mut self) {
        self.pins = self.pins.saturating_sub(1);
    }

    /// 检查是否被 pin
    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    /// 标记为脏（已修改）
    pub fn mark_dirty(&mut self) {
        self.flags.insert(CacheFlags::DIRTY);
    }

    /// 标记为干净（已写入后备文件）
    pub fn mark_clean(&mut self) {
        self.flags.remove(CacheFlags::DIRTY);
    }

    /// 检查是否是脏块
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(CacheFlags::DIRTY)
    }

    /// 标记数据有效
    pub fn mark_uptodate(&mut self) {
        self.flags.insert(CacheFlags::UPTODATE);
    }

    /// 检查数据是否有效
    pub fn is_uptodate(&self) -> bool {
        self.flags.contains(CacheFlags::UPTODATE)
    }
}
