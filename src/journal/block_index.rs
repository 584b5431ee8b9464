//! 按块号索引的引用计数表
//!
//! journal 维护两张这样的表：
//!
//! - 日志缓冲区表（[`LoggedBufferIndex`]）：每个被事务记录过的客户端块一个条目，
//!   持有该块的 pin，记录最后写它的事务和最近一次提交它的事务；
//! - 撤销表（[`RevokeIndex`]）：恢复期间每个被撤销的块一个条目，记录撤销它的最大 tid。
//!
//! 同一个块号在一张表里最多一个条目，但可以同时出现在两张表里。
//! 条目通过只能移动的 [`IndexRef`] 获取和释放，计数归零时条目被移除并交还给调用者。

use super::transaction::Tid;
use crate::cache::PinToken;
use crate::error::{Error, ErrorKind, Result};
use alloc::collections::BTreeMap;

/// 索引条目句柄
///
/// 每个句柄对应条目上的一次引用，[`BlockIndex::release()`] 会消费它。
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an index reference must be released with BlockIndex::release"]
pub struct IndexRef {
    block: u64,
}

impl IndexRef {
    /// 条目对应的块号
    pub fn block(&self) -> u64 {
        self.block
    }
}

#[derive(Debug)]
struct IndexEntry<T> {
    refcount: u32,
    newly_created: bool,
    value: T,
}

/// 引用计数块索引
#[derive(Debug)]
pub struct BlockIndex<T> {
    entries: BTreeMap<u64, IndexEntry<T>>,
    limit: Option<usize>,
}

impl<T> Default for BlockIndex<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T> BlockIndex<T> {
    /// 创建索引
    ///
    /// `limit` 为条目数上限，超出时 `get_or_insert` 返回 `ResourceExhausted`。
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            entries: BTreeMap::new(),
            limit,
        }
    }

    /// 查找已有条目并增加引用
    pub fn find(&mut self, block: u64) -> Option<IndexRef> {
        let entry = self.entries.get_mut(&block)?;
        entry.refcount += 1;
        entry.newly_created = false;
        Some(IndexRef { block })
    }

    /// 释放一次引用
    ///
    /// 计数归零时移除条目并返回其内容。
    pub fn release(&mut self, handle: IndexRef) -> Option<T> {
        let Some(entry) = self.entries.get_mut(&handle.block) else {
            log::warn!("[jbd2] release of missing index entry {}", handle.block);
            return None;
        };
        entry.refcount -= 1;
        if entry.refcount > 0 {
            return None;
        }
        self.entries.remove(&handle.block).map(|entry| entry.value)
    }

    /// 无条件清空全部条目
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 移除全部条目并按块号升序交还内容（忽略引用计数）
    pub fn drain(&mut self) -> impl Iterator<Item = T> {
        core::mem::take(&mut self.entries)
            .into_values()
            .map(|entry| entry.value)
    }

    /// 访问句柄对应的内容
    pub fn get(&self, handle: &IndexRef) -> Option<&T> {
        self.entries.get(&handle.block).map(|entry| &entry.value)
    }

    /// 可变访问句柄对应的内容
    pub fn get_mut(&mut self, handle: &IndexRef) -> Option<&mut T> {
        self.entries.get_mut(&handle.block).map(|entry| &mut entry.value)
    }

    /// 按块号查看内容（不增加引用）
    pub fn peek(&self, block: u64) -> Option<&T> {
        self.entries.get(&block).map(|entry| &entry.value)
    }

    /// 条目当前引用计数（不存在时为 0）
    pub fn refcount(&self, block: u64) -> u32 {
        self.entries.get(&block).map_or(0, |entry| entry.refcount)
    }

    /// 条目是否由最近一次 `get_or_insert` 新建
    pub fn is_newly_created(&self, handle: &IndexRef) -> bool {
        self.entries
            .get(&handle.block)
            .is_some_and(|entry| entry.newly_created)
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按块号升序遍历
    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.entries.iter().map(|(block, entry)| (*block, &entry.value))
    }
}

impl<T: Default> BlockIndex<T> {
    /// 查找或插入条目
    ///
    /// 已存在时引用计数加 1；不存在时新建（标记为新建）并把计数置为 1。
    /// 第二个返回值表示是否为新建条目。
    pub fn get_or_insert(&mut self, block: u64) -> Result<(IndexRef, bool)> {
        if let Some(handle) = self.find(block) {
            return Ok((handle, false));
        }

        if self.limit.is_some_and(|limit| self.entries.len() >= limit) {
            log::warn!("[jbd2] block index full ({} entries)", self.entries.len());
            return Err(Error::new(ErrorKind::ResourceExhausted, "block index is full"));
        }

        self.entries.insert(
            block,
            IndexEntry {
                refcount: 1,
                newly_created: true,
                value: T::default(),
            },
        );
        Ok((IndexRef { block }, true))
    }
}

/// 日志缓冲区控制块
///
/// 一个客户端块在 journal 中的状态。
#[derive(Debug, Default)]
pub struct LoggedBuffer {
    /// 客户端块的 pin（首次记录时获取，检查点时释放）
    pub pin: Option<PinToken>,
    /// 最后写入该块的事务
    pub txn: Option<Tid>,
    /// 最近一次把该块写进日志的事务
    pub cp_txn: Option<Tid>,
}

impl LoggedBuffer {
    /// 最后写入它的事务是否已把它写进日志
    pub fn is_logged(&self) -> bool {
        self.txn.is_some() && self.txn == self.cp_txn
    }
}

/// 撤销条目
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RevokeEntry {
    /// 撤销该块的最大事务号
    pub tid: Tid,
}

/// 日志缓冲区索引
pub type LoggedBufferIndex = BlockIndex<LoggedBuffer>;

/// 撤销索引
pub type RevokeIndex = BlockIndex<RevokeEntry>;
