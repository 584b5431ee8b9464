//! Journal 检查点管理
//!
//! 已提交事务的块交还给缓存（标脏后 unpin），刷新客户端文件后
//! 回收它占用的日志空间，并推进超级块中的日志尾。
//!
//! # 检查点流程
//!
//! 1. 从队列头取出已提交（CHECKPOINT 状态）的事务
//! 2. 对事务中每个日志缓冲区释放一次引用；最后一个持有者标脏并 unpin，
//!    已被后续事务接管的块只释放引用
//! 3. 刷新客户端文件
//! 4. 回收日志空间
//! 5. 更新超级块的 `start` / `sequence`

use super::handle::JournalHandle;
use super::transaction::{Transaction, TxnState};
use crate::cache::BufferCache;
use crate::error::Result;

impl<C: BufferCache> JournalHandle<C> {
    /// 对队列头部所有已提交事务做检查点，返回处理的事务数
    pub(super) fn checkpoint_committed(&mut self) -> Result<usize> {
        let mut done = 0;
        while let Some(txn) = self.queue.front() {
            if txn.state() != TxnState::Checkpoint {
                break;
            }
            // 日志副本是这些块唯一的持久副本，接管者提交前不能回收
            if self.held_by_uncommitted(txn) {
                log::debug!(
                    "[jbd2] txn {}: checkpoint deferred, blocks held by uncommitted txn",
                    txn.tid
                );
                break;
            }
            let Some(mut txn) = self.queue.pop_front() else {
                break;
            };
            self.checkpoint_transaction(&mut txn)?;
            done += 1;
        }

        if done == 0 {
            return Ok(0);
        }

        // 还在日志里的最早事务就是新的日志尾
        match self.queue.front().filter(|txn| txn.state() != TxnState::Locked) {
            Some(txn) => {
                self.sb.start = txn.start_blk;
                self.sb.sequence = txn.tid;
            }
            None => {
                self.sb.start = 0;
                self.sb.sequence = self
                    .queue
                    .front()
                    .map(|txn| txn.tid)
                    .or(self.running.as_ref().map(|txn| txn.tid))
                    .unwrap_or(self.next_tid);
            }
        }
        self.write_superblock()?;
        Ok(done)
    }

    /// 事务的某个块是否已被一个尚未提交的后续事务接管
    ///
    /// 此时缓冲区里是接管者未提交的内容，既不能写回客户端文件，
    /// 也不能丢掉本事务的日志副本。
    fn held_by_uncommitted(&self, txn: &Transaction) -> bool {
        txn.lbcbs.iter().any(|handle| {
            self.buffers
                .get(handle)
                .is_some_and(|lb| lb.txn != Some(txn.tid) && !lb.is_logged())
        })
    }

    /// 对单个已提交事务做检查点
    fn checkpoint_transaction(&mut self, txn: &mut Transaction) -> Result<()> {
        let mut written = 0;
        for handle in txn.lbcbs.drain(..) {
            // 只有最后一个持有者拿回缓冲区；被后续事务接管的块由后续事务写回
            if let Some(pin) = self.buffers.release(handle).and_then(|lb| lb.pin) {
                self.cache.mark_dirty(&pin);
                self.cache.unpin(pin);
                written += 1;
            }
            txn.unwritten_cnt = txn.unwritten_cnt.saturating_sub(1);
        }

        self.cache.flush(self.client_file)?;
        self.reclaim(txn.log_blocks_used);

        log::debug!(
            "[jbd2] txn {} checkpointed: {} blocks written back, {} log blocks reclaimed",
            txn.tid,
            written,
            txn.log_blocks_used
        );
        Ok(())
    }

    /// 检查是否需要做检查点
    ///
    /// # 参数
    ///
    /// * `threshold` - 日志使用率阈值（百分比，0 表示从不）
    ///
    /// # 返回
    ///
    /// 已用（含待提交）日志块超过阈值时返回 true
    pub fn should_checkpoint(&self, threshold: u32) -> bool {
        if threshold == 0 {
            return false;
        }
        let total = self.log_len() as u64;
        let used = total - self.available() as u64;
        used * 100 > threshold as u64 * total
    }
}
