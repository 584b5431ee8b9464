//! 事务
//!
//! 事务状态只能按 RUNNING → LOCKED → COMMITTING → CHECKPOINT 前进，
//! 其他任何转换都返回 `InvalidState`。

use super::block_index::IndexRef;
use super::format::{LogFormat, HEADER_SIZE, UUID_SIZE};
use crate::error::{Error, ErrorKind, Result};
use alloc::vec::Vec;

/// 事务号
pub type Tid = u32;

/// `a` 是否在 `b` 之后（按有符号差值比较，允许回绕）
#[inline]
pub fn tid_gt(a: Tid, b: Tid) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

/// `a` 是否不早于 `b`
#[inline]
pub fn tid_geq(a: Tid, b: Tid) -> bool {
    (a.wrapping_sub(b) as i32) >= 0
}

/// 事务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// 仍在接受修改
    Running,
    /// 已停止，等待提交
    Locked,
    /// 正在写入日志
    Committing,
    /// 已提交，等待检查点
    Checkpoint,
}

impl TxnState {
    /// 是否允许转换到 `next`
    pub fn can_transition_to(self, next: TxnState) -> bool {
        matches!(
            (self, next),
            (TxnState::Running, TxnState::Locked)
                | (TxnState::Locked, TxnState::Committing)
                | (TxnState::Committing, TxnState::Checkpoint)
        )
    }
}

/// 一个 journal 事务
#[derive(Debug)]
pub struct Transaction {
    /// 事务号
    pub tid: Tid,
    /// 在日志中的起始块（提交时确定）
    pub start_blk: u32,
    /// 预留的块数（0 表示不限定，停止时立即提交）
    pub reserved: u32,
    /// 已记录的块数
    pub logged_cnt: u32,
    /// 尚未写回客户端文件的块数
    pub unwritten_cnt: u32,
    /// 提交占用的日志块数
    pub log_blocks_used: u32,
    /// 共享该事务的 `txn_start` 调用数
    pub nesting: u32,
    state: TxnState,
    /// 本事务持有的日志缓冲区
    pub(super) lbcbs: Vec<IndexRef>,
    /// 本事务撤销的块
    pub(super) revokes: Vec<u64>,
}

impl Transaction {
    /// 创建运行中的事务
    pub fn new(tid: Tid, start_blk: u32, reserved: u32) -> Self {
        Self {
            tid,
            start_blk,
            reserved,
            logged_cnt: 0,
            unwritten_cnt: 0,
            log_blocks_used: 0,
            nesting: 1,
            state: TxnState::Running,
            lbcbs: Vec::new(),
            revokes: Vec::new(),
        }
    }

    /// 当前状态
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// 状态转换
    pub fn transition(&mut self, next: TxnState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            log::error!(
                "[jbd2] txn {}: illegal state transition {:?} -> {:?}",
                self.tid,
                self.state,
                next
            );
            return Err(Error::new(ErrorKind::InvalidState, "illegal transaction state transition"));
        }
        log::trace!("[jbd2] txn {}: {:?} -> {:?}", self.tid, self.state, next);
        self.state = next;
        Ok(())
    }

    /// 是否没有任何需要写入日志的内容
    pub fn is_empty(&self) -> bool {
        self.lbcbs.is_empty() && self.revokes.is_empty()
    }

    /// 本事务撤销的块
    pub fn revokes(&self) -> &[u64] {
        &self.revokes
    }

    /// 记录撤销，已存在时返回 false
    pub fn add_revoke(&mut self, block: u64) -> bool {
        if self.revokes.contains(&block) {
            return false;
        }
        self.revokes.push(block);
        true
    }

    /// 取消撤销（同一事务中块又被重新记录）
    pub fn cancel_revoke(&mut self, block: u64) -> bool {
        let before = self.revokes.len();
        self.revokes.retain(|&b| b != block);
        before != self.revokes.len()
    }

    /// 提交本事务需要的日志块数
    pub fn log_blocks_needed(&self, format: &LogFormat) -> u32 {
        if self.is_empty() {
            return 0;
        }
        log_blocks_for(format, self.lbcbs.len() as u32, self.revokes.len() as u32)
    }
}

/// 一个描述符块能容纳的 tag 数
///
/// 第一个 tag 后跟 UUID，其余 tag 都带 SAME_UUID。
pub fn tags_per_descriptor(format: &LogFormat) -> u32 {
    let tag = format.tag_bytes();
    let first = HEADER_SIZE + tag + UUID_SIZE;
    let limit = format.descriptor_limit();
    if limit < first {
        return 0;
    }
    (1 + (limit - first) / tag) as u32
}

/// 记录 `data_blocks` 个块并撤销 `revokes` 个块的事务需要的日志块数
///
/// 描述符块 + 数据块 + 撤销块 + 提交块。
pub fn log_blocks_for(format: &LogFormat, data_blocks: u32, revokes: u32) -> u32 {
    let per_desc = tags_per_descriptor(format).max(1);
    let per_revoke = (format.revoke_capacity() as u32).max(1);
    data_blocks.div_ceil(per_desc) + data_blocks + revokes.div_ceil(per_revoke) + 1
}
