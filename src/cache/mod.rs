//! 缓冲区缓存模块
//!
//! journal 引擎本身不做块 I/O，而是通过 [`BufferCache`] 能力对象向宿主的
//! 缓冲区缓存 pin/unpin 固定大小的块。这个模块定义该接口，并提供一个
//! 基于 `lru` crate 的参考实现 [`LruBufferCache`]。
//!
//! # 主要组件
//!
//! - [`BufferCache`] - 宿主缓存接口（pin-for-read / pin-for-write / 标脏 / unpin）
//! - [`PinToken`] - 一次 pin 的凭据，只能移动，`unpin` 时被消费
//! - [`BackingFile`] - 后备文件接口（按字节偏移读写）
//! - [`MemFile`] - 内存后备文件
//! - [`LruBufferCache`] - 参考缓存实现
//! - [`CacheBuffer`] / [`CacheFlags`] - 单个缓存块及其状态标志
//!
//! # 与宿主缓存的对应关系
//!
//! | 宿主缓存操作                  | 本模块                                 |
//! |-------------------------------|----------------------------------------|
//! | `CcPinRead`                   | [`BufferCache::pin_read()`]            |
//! | `CcPreparePinWrite`           | [`BufferCache::prepare_pin_write()`]   |
//! | `CcSetDirtyPinnedData`        | [`BufferCache::mark_dirty()`]          |
//! | `CcUnpinData`                 | [`BufferCache::unpin()`]               |
//! | `CcFlushCache`                | [`BufferCache::flush()`]               |
//! | `CcUninitializeCacheMap` + 等待 | [`BufferCache::synchronous_uninitialize()`] |
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use jbd2_core::cache::{BufferCache, LruBufferCache, MemFile};
//!
//! let mut cache = LruBufferCache::new(64, 4096);
//! let file = cache.attach(MemFile::new(64 * 4096));
//!
//! cache::write_pinned(&mut cache, file, 0, 4096, true, true, |data| {
//!     data[0] = 0x42;
//! })?;
//! cache.flush(file)?;
//! ```

mod buffer;
mod file;
mod lru_cache;

pub use buffer::{CacheBuffer, CacheFlags};
pub use file::{BackingFile, MemFile};
pub use lru_cache::{CacheStats, LruBufferCache, DEFAULT_CACHE_SIZE};

use crate::error::Result;

/// 后备文件标识
///
/// 由缓存实现分配，journal 只把它当作不透明句柄传回缓存。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u32);

/// Pin 凭据
///
/// 每次成功的 pin 产生一个凭据，凭据不可复制，`unpin` 会消费它，
/// 因此同一次 pin 不可能被释放两次。
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a pinned buffer must be released with BufferCache::unpin"]
pub struct PinToken {
    file: FileId,
    offset: u64,
    len: usize,
}

impl PinToken {
    /// 创建凭据（供缓存实现使用）
    pub fn new(file: FileId, offset: u64, len: usize) -> Self {
        Self { file, offset, len }
    }

    /// 所属文件
    pub fn file(&self) -> FileId {
        self.file
    }

    /// 字节偏移
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 长度（字节）
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空区间
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// 宿主缓冲区缓存接口
///
/// `wait == false` 时，凡是需要阻塞（例如需要读盘）的请求都应返回
/// `ErrorKind::CantWait`，由调用者在可阻塞的上下文中重试。
/// pin 失败一律作为致命错误向上传播，journal 不做重试。
pub trait BufferCache {
    /// pin 一段已有内容用于读取
    fn pin_read(&mut self, file: FileId, offset: u64, len: usize, wait: bool) -> Result<PinToken>;

    /// pin 一段内容用于写入
    ///
    /// `zero_fill == true` 时不读取原有内容，直接返回全零缓冲区。
    fn prepare_pin_write(
        &mut self,
        file: FileId,
        offset: u64,
        len: usize,
        zero_fill: bool,
        wait: bool,
    ) -> Result<PinToken>;

    /// 访问已 pin 的缓冲区
    fn buffer(&self, token: &PinToken) -> Result<&[u8]>;

    /// 可变访问已 pin 的缓冲区
    fn buffer_mut(&mut self, token: &PinToken) -> Result<&mut [u8]>;

    /// 标记已 pin 的缓冲区为脏
    fn mark_dirty(&mut self, token: &PinToken);

    /// 释放 pin
    fn unpin(&mut self, token: PinToken);

    /// 把文件的全部脏缓冲区写回后备文件
    fn flush(&mut self, file: FileId) -> Result<()>;

    /// 同步卸载文件的缓存：写回或丢弃全部缓存页后才返回
    fn synchronous_uninitialize(&mut self, file: FileId) -> Result<()>;
}

impl<T: BufferCache + ?Sized> BufferCache for &mut T {
    fn pin_read(&mut self, file: FileId, offset: u64, len: usize, wait: bool) -> Result<PinToken> {
        (**self).pin_read(file, offset, len, wait)
    }

    fn prepare_pin_write(
        &mut self,
        file: FileId,
        offset: u64,
        len: usize,
        zero_fill: bool,
        wait: bool,
    ) -> Result<PinToken> {
        (**self).prepare_pin_write(file, offset, len, zero_fill, wait)
    }

    fn buffer(&self, token: &PinToken) -> Result<&[u8]> {
        (**self).buffer(token)
    }

    fn buffer_mut(&mut self, token: &PinToken) -> Result<&mut [u8]> {
        (**self).buffer_mut(token)
    }

    fn mark_dirty(&mut self, token: &PinToken) {
        (**self).mark_dirty(token)
    }

    fn unpin(&mut self, token: PinToken) {
        (**self).unpin(token)
    }

    fn flush(&mut self, file: FileId) -> Result<()> {
        (**self).flush(file)
    }

    fn synchronous_uninitialize(&mut self, file: FileId) -> Result<()> {
        (**self).synchronous_uninitialize(file)
    }
}

/// pin 一块只读数据并在闭包中访问
///
/// 无论闭包或访问是否成功，pin 都会在返回前释放。
pub fn read_pinned<C, R, F>(
    cache: &mut C,
    file: FileId,
    offset: u64,
    len: usize,
    wait: bool,
    f: F,
) -> Result<R>
where
    C: BufferCache + ?Sized,
    F: FnOnce(&[u8]) -> R,
{
    let token = cache.pin_read(file, offset, len, wait)?;
    let result = cache.buffer(&token).map(f);
    cache.unpin(token);
    result
}

/// pin 一块数据用于写入，在闭包中修改后标脏
///
/// 与 [`read_pinned`] 相同，pin 总会被释放；只有闭包成功执行后才会标脏。
pub fn write_pinned<C, R, F>(
    cache: &mut C,
    file: FileId,
    offset: u64,
    len: usize,
    zero_fill: bool,
    wait: bool,
    f: F,
) -> Result<R>
where
    C: BufferCache + ?Sized,
    F: FnOnce(&mut [u8]) -> R,
{
    let token = cache.prepare_pin_write(file, offset, len, zero_fill, wait)?;
    let result = cache.buffer_mut(&token).map(f);
    if result.is_ok() {
        cache.mark_dirty(&token);
    }
    cache.unpin(token);
    result
}
