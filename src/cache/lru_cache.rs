//! 参考缓冲区缓存实现（基于 lru crate）
//!
//! 以 `(FileId, 块号)` 为键缓存固定大小的块。被 pin 的块不会被驱逐；
//! 驱逐未 pin 的脏块前先写回后备文件。
//!
//! ```text
//! struct LruBufferCache {
//!     cache: LruCache<(FileId, u64), CacheBuffer>,   // O(1)，自动LRU
//!     files: BTreeMap<FileId, Box<dyn BackingFile>>, // 已挂接的后备文件
//!     block_size: usize,
//!     stats: CacheStats,
//! }
//! ```

use super::{BackingFile, BufferCache, CacheBuffer, FileId, PinToken};
use crate::error::{Error, ErrorKind, Result};
use alloc::{boxed::Box, collections::BTreeMap, vec::Vec};
use core::num::NonZeroUsize;
use lru::LruCache;

/// 默认缓存块数量
pub const DEFAULT_CACHE_SIZE: usize = 256;

type CacheKey = (FileId, u64);

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 脏块写回次数
    pub writebacks: u64,
    /// 驱逐次数
    pub evictions: u64,
}

/// LRU 缓冲区缓存
pub struct LruBufferCache {
    /// LRU缓存核心：自动管理块的生命周期和访问顺序
    cache: LruCache<CacheKey, CacheBuffer>,

    /// 已挂接的后备文件
    files: BTreeMap<FileId, Box<dyn BackingFile>>,

    /// 下一个分配的文件标识
    next_file: u32,

    /// 块大小（字节）
    block_size: usize,

    /// 统计信息
    stats: CacheStats,
}

impl LruBufferCache {
    /// 创建新的缓冲区缓存
    ///
    /// # 参数
    ///
    /// * `capacity` - 缓存容量（块数量，0 按 1 处理）
    /// * `block_size` - 块大小（字节）
    pub fn new(capacity: usize, block_size: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            files: BTreeMap::new(),
            next_file: 0,
            block_size,
            stats: CacheStats::default(),
        }
    }

    /// 挂接后备文件，返回分配的文件标识
    pub fn attach<F: BackingFile + 'static>(&mut self, file: F) -> FileId {
        let id = FileId(self.next_file);
        self.next_file += 1;
        self.files.insert(id, Box::new(file));
        log::debug!("[CACHE] attach file {:?}", id);
        id
    }

    /// 卸载文件缓存并解除挂接
    pub fn detach(&mut self, file: FileId) -> Result<()> {
        self.synchronous_uninitialize(file)?;
        self.files.remove(&file);
        Ok(())
    }

    /// 块大小
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// 获取统计信息
    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    /// 缓存容量
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    /// 当前缓存块数量
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// 缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// 当前被 pin 的块数量
    pub fn pinned_count(&self) -> usize {
        self.cache.iter().filter(|(_, buf)| buf.is_pinned()).count()
    }

    /// 当前脏块数量
    pub fn dirty_count(&self) -> usize {
        self.cache.iter().filter(|(_, buf)| buf.is_dirty()).count()
    }

    fn key(&self, file: FileId, offset: u64, len: usize) -> Result<CacheKey> {
        if len != self.block_size || offset % self.block_size as u64 != 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "pin range must be one aligned block",
            ));
        }
        if !self.files.contains_key(&file) {
            return Err(Error::new(ErrorKind::InvalidInput, "unknown file"));
        }
        Ok((file, offset / self.block_size as u64))
    }

    fn token_key(&self, token: &PinToken) -> CacheKey {
        (token.file(), token.offset() / self.block_size as u64)
    }

    /// 为新块腾出空间
    ///
    /// 从最久未使用的一端找第一个未 pin 的块，脏块先写回再驱逐。
    fn make_room(&mut self, wait: bool) -> Result<()> {
        if self.cache.len() < self.cache.cap().get() {
            return Ok(());
        }

        // iter() 从最近使用到最久未使用，rev() 后从最久未使用开始
        let victim = self
            .cache
            .iter()
            .rev()
            .find(|(_, buf)| !buf.is_pinned())
            .map(|(key, _)| *key);

        let Some(key) = victim else {
            log::warn!(
                "[CACHE] all {} buffers are pinned, cannot evict",
                self.cache.len()
            );
            return Err(if wait {
                Error::new(ErrorKind::ResourceExhausted, "all cache buffers are pinned")
            } else {
                Error::new(ErrorKind::CantWait, "cache full, eviction would block")
            });
        };

        let block_size = self.block_size as u64;
        if let Some(buf) = self.cache.peek(&key) {
            if buf.is_dirty() {
                let file = self
                    .files
                    .get_mut(&key.0)
                    .ok_or(Error::new(ErrorKind::InvalidState, "buffer of detached file"))?;
                file.write_at(key.1 * block_size, &buf.data)?;
                self.stats.writebacks += 1;
            }
        }
        self.cache.pop(&key);
        self.stats.evictions += 1;
        log::trace!("[CACHE] evicted {:?} block {}", key.0, key.1);
        Ok(())
    }

    /// 命中则增加 pin 计数，未命中则装入新块
    fn pin_block(&mut self, key: CacheKey, zero_fill: bool, wait: bool) -> Result<()> {
        if let Some(buf) = self.cache.get_mut(&key) {
            buf.pin();
            if zero_fill {
                buf.data.fill(0);
            }
            self.stats.hits += 1;
            log::trace!("[CACHE] pin {:?} block {} HIT (pins={})", key.0, key.1, buf.pins);
            return Ok(());
        }

        self.stats.misses += 1;
        if !zero_fill && !wait {
            return Err(Error::new(ErrorKind::CantWait, "buffer not resident"));
        }

        self.make_room(wait)?;

        let mut buf = CacheBuffer::new(key.1, self.block_size);
        if !zero_fill {
            let file = self
                .files
                .get_mut(&key.0)
                .ok_or(Error::new(ErrorKind::InvalidInput, "unknown file"))?;
            file.read_at(key.1 * self.block_size as u64, &mut buf.data)?;
        }
        buf.mark_uptodate();
        buf.pin();
        self.cache.put(key, buf);
        log::trace!("[CACHE] pin {:?} block {} MISS", key.0, key.1);
        Ok(())
    }
}

impl BufferCache for LruBufferCache {
    fn pin_read(&mut self, file: FileId, offset: u64, len: usize, wait: bool) -> Result<PinToken> {
        let key = self.key(file, offset, len)?;
        self.pin_block(key, false, wait)?;
        Ok(PinToken::new(file, offset, len))
    }

    fn prepare_pin_write(
        &mut self,
        file: FileId,
        offset: u64,
        len: usize,
        zero_fill: bool,
        wait: bool,
    ) -> Result<PinToken> {
        let key = self.key(file, offset, len)?;
        self.pin_block(key, zero_fill, wait)?;
        Ok(PinToken::new(file, offset, len))
    }

    fn buffer(&self, token: &PinToken) -> Result<&[u8]> {
        self.cache
            .peek(&self.token_key(token))
            .filter(|buf| buf.is_pinned())
            .map(|buf| buf.data.as_slice())
            .ok_or(Error::new(ErrorKind::InvalidState, "buffer is not pinned"))
    }

    fn buffer_mut(&mut self, token: &PinToken) -> Result<&mut [u8]> {
        let key = self.token_key(token);
        self.cache
            .peek_mut(&key)
            .filter(|buf| buf.is_pinned())
            .map(|buf| buf.data.as_mut_slice())
            .ok_or(Error::new(ErrorKind::InvalidState, "buffer is not pinned"))
    }

    fn mark_dirty(&mut self, token: &PinToken) {
        let key = self.token_key(token);
        if let Some(buf) = self.cache.peek_mut(&key) {
            buf.mark_dirty();
        }
    }

    fn unpin(&mut self, token: PinToken) {
        let key = self.token_key(&token);
        match self.cache.peek_mut(&key) {
            Some(buf) => buf.unpin(),
            None => log::warn!("[CACHE] unpin of non-resident block {}", key.1),
        }
    }

    fn flush(&mut self, file: FileId) -> Result<()> {
        let mut dirty: Vec<CacheKey> = self
            .cache
            .iter()
            .filter(|(key, buf)| key.0 == file && buf.is_dirty())
            .map(|(key, _)| *key)
            .collect();
        dirty.sort_unstable();

        let block_size = self.block_size as u64;
        let backing = self
            .files
            .get_mut(&file)
            .ok_or(Error::new(ErrorKind::InvalidInput, "unknown file"))?;

        for key in &dirty {
            if let Some(buf) = self.cache.peek_mut(key) {
                backing.write_at(key.1 * block_size, &buf.data)?;
                buf.mark_clean();
                self.stats.writebacks += 1;
            }
        }
        backing.sync()?;

        log::debug!("[CACHE] flush {:?}: {} dirty blocks written", file, dirty.len());
        Ok(())
    }

    fn synchronous_uninitialize(&mut self, file: FileId) -> Result<()> {
        self.flush(file)?;

        let keys: Vec<CacheKey> = self
            .cache
            .iter()
            .filter(|(key, _)| key.0 == file)
            .map(|(key, _)| *key)
            .collect();

        if keys
            .iter()
            .any(|key| self.cache.peek(key).is_some_and(|buf| buf.is_pinned()))
        {
            return Err(Error::new(
                ErrorKind::InvalidState,
                "cannot uninitialize a file with pinned buffers",
            ));
        }

        for key in &keys {
            self.cache.pop(key);
        }
        log::debug!("[CACHE] uninitialize {:?}: {} buffers dropped", file, keys.len());
        Ok(())
    }
}

impl core::fmt::Debug for LruBufferCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LruBufferCache")
            .field("capacity", &self.cache.cap())
            .field("len", &self.cache.len())
            .field("files", &self.files.len())
            .field("block_size", &self.block_size)
            .field("stats", &self.stats)
            .finish()
    }
}
