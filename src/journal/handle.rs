//! Journal 句柄
//!
//! 每个卷一个 [`JournalHandle`]，持有环形日志的几何信息、运行中的事务、
//! 等待提交/检查点的事务队列以及两张块索引。所有修改都通过 `&mut self`
//! 进行，需要共享的宿主自行加锁。
//!
//! # 日志几何
//!
//! ```text
//!   0        start                                       end
//!   ┌──────┬──────┬──────┬──────┬──────┬──────┬──────┬──────┐
//!   │  sb  │      │ used │ used │ free │ free │ free │      │
//!   └──────┴──────┴──────┴──────┴──────┴──────┴──────┴──────┘
//!                               ▲                    ▲
//!                          free_start            free_end
//! ```
//!
//! 越过 `end` 时减去 `end - start + 1` 回绕到 `start`。

use super::block_index::{LoggedBufferIndex, RevokeIndex};
use super::checksum::{stamp_superblock, verify_superblock, JournalChecksum};
use super::config::JournalConfig;
use super::format::{LogFormat, Superblock, SUPERBLOCK_SIZE, UUID_SIZE};
use super::recovery::RecoveryInfo;
use super::transaction::{log_blocks_for, Tid, Transaction, TxnState};
use crate::cache::{read_pinned, write_pinned, BufferCache, FileId};
use crate::error::{Error, ErrorKind, Result};
use alloc::{collections::VecDeque, vec::Vec};

/// Journal 句柄
pub struct JournalHandle<C: BufferCache> {
    pub(super) cache: C,
    pub(super) log_file: FileId,
    pub(super) client_file: FileId,
    pub(super) block_size: u32,
    pub(super) block_count: u32,
    pub(super) start: u32,
    pub(super) end: u32,
    pub(super) free_start: u32,
    pub(super) free_end: u32,
    pub(super) free_count: u32,
    pub(super) sb: Superblock,
    pub(super) format: LogFormat,
    pub(super) csum: JournalChecksum,
    pub(super) next_tid: Tid,
    pub(super) running: Option<Transaction>,
    pub(super) queue: VecDeque<Transaction>,
    pub(super) buffers: LoggedBufferIndex,
    pub(super) revokes: RevokeIndex,
    pub(super) config: JournalConfig,
    pub(super) recovered: bool,
    pub(super) last_recovery: Option<RecoveryInfo>,
}

impl<C: BufferCache> JournalHandle<C> {
    /// 打开 journal
    ///
    /// 读取并校验日志块 0 处的超级块，初始化几何信息和空闲区。
    /// 日志不干净（`start != 0`）时必须先调用 `replay_journal` 才能开始事务。
    ///
    /// # 参数
    ///
    /// * `cache` - 缓冲区缓存
    /// * `log_file` - 日志文件
    /// * `client_file` - 被保护的客户端文件（卷）
    /// * `log_size_bytes` - 日志文件字节长度
    /// * `block_size` - 卷块大小（≥ 1024 且为 2 的幂）
    /// * `config` - 配置
    ///
    /// # 返回
    ///
    /// * `DiskCorrupt` - 超级块与几何参数不符或校验和错误
    /// * `UnrecognizedVolume` - 存在未知特性
    pub fn open_journal(
        mut cache: C,
        log_file: FileId,
        client_file: FileId,
        log_size_bytes: u64,
        block_size: u32,
        config: JournalConfig,
    ) -> Result<Self> {
        if block_size < SUPERBLOCK_SIZE as u32 || !block_size.is_power_of_two() {
            return Err(Error::new(ErrorKind::InvalidInput, "invalid journal block size"));
        }

        let raw = read_pinned(
            &mut cache,
            log_file,
            0,
            block_size as usize,
            config.pin_wait,
            |buf| buf[..SUPERBLOCK_SIZE].to_vec(),
        )?;
        let sb = Superblock::parse(&raw)?;
        sb.validate(block_size, log_size_bytes)?;

        let format = LogFormat::from_superblock(&sb);
        if !verify_superblock(&format, config.checksum, &raw) {
            log::error!("[jbd2] superblock checksum mismatch");
            return Err(Error::new(ErrorKind::DiskCorrupt, "journal superblock checksum mismatch"));
        }

        let start = sb.first;
        let end = sb.maxlen - 1;
        let csum = JournalChecksum::new(&format, &sb.uuid, config.checksum);

        log::info!(
            "[jbd2] open journal: bs={} blocks={} first={} sequence={} start={} incompat={:?}",
            block_size,
            sb.maxlen,
            sb.first,
            sb.sequence,
            sb.start,
            format.incompat
        );

        Ok(Self {
            cache,
            log_file,
            client_file,
            block_size,
            block_count: sb.maxlen,
            start,
            end,
            free_start: start,
            free_end: end,
            free_count: end - start + 1,
            next_tid: sb.sequence,
            recovered: sb.start == 0,
            format,
            csum,
            sb,
            running: None,
            queue: VecDeque::new(),
            buffers: LoggedBufferIndex::new(config.max_index_entries),
            revokes: RevokeIndex::new(config.max_index_entries),
            config,
            last_recovery: None,
        })
    }

    // ===== 几何 =====

    /// 日志区块数（`end - start + 1`）
    pub fn log_len(&self) -> u32 {
        self.end - self.start + 1
    }

    /// 把越过 `end` 的块号回绕到 `start` 之后
    pub fn wrap(&self, blk: u32) -> u32 {
        if blk > self.end {
            blk - self.log_len()
        } else {
            blk
        }
    }

    /// 从 `blk` 向前移动 `n` 个块（回绕）
    pub fn advance(&self, blk: u32, n: u32) -> u32 {
        let offset = (blk - self.start) as u64 + n as u64;
        self.start + (offset % self.log_len() as u64) as u32
    }

    /// 消耗 `n` 个空闲块
    pub(super) fn consume(&mut self, n: u32) {
        self.free_start = self.advance(self.free_start, n);
        self.free_count -= n;
    }

    /// 回收 `n` 个块
    pub(super) fn reclaim(&mut self, n: u32) {
        self.free_end = self.advance(self.free_end, n);
        self.free_count += n;
    }

    /// 已停止但尚未提交的事务将占用的日志块数
    pub(super) fn pending_log_blocks(&self) -> u32 {
        self.queue
            .iter()
            .filter(|txn| txn.state() == TxnState::Locked)
            .map(|txn| txn.log_blocks_needed(&self.format))
            .sum()
    }

    /// 扣除待提交事务后的可用日志块数
    pub(super) fn available(&self) -> u32 {
        self.free_count.saturating_sub(self.pending_log_blocks())
    }

    // ===== 事务 =====

    /// 开始（或加入）事务
    ///
    /// 已有运行中的事务时加入它，预留块数累加；累加后超过 `max_transaction`
    /// 或可用日志空间时返回 `CantWait`，调用者应先停止当前事务再重试。
    ///
    /// `reserved == 0` 的事务不限定块数，停止时立即提交并做检查点。
    ///
    /// # 返回
    ///
    /// 事务号
    pub fn txn_start(&mut self, reserved: u32) -> Result<Tid> {
        if !self.recovered {
            return Err(Error::new(ErrorKind::InvalidState, "journal needs recovery"));
        }

        let max_transaction = self.sb.max_transaction;
        let available = self.available();
        let format = self.format;

        if let Some(txn) = self.running.as_mut() {
            let total = txn.reserved.saturating_add(reserved);
            if (max_transaction != 0 && total > max_transaction)
                || log_blocks_for(&format, total, 0) > available
            {
                log::debug!(
                    "[jbd2] txn {}: cannot grow reservation {} -> {}",
                    txn.tid,
                    txn.reserved,
                    total
                );
                return Err(Error::new(ErrorKind::CantWait, "running transaction is full"));
            }
            txn.reserved = total;
            txn.nesting += 1;
            return Ok(txn.tid);
        }

        if max_transaction != 0 && reserved > max_transaction {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "reservation exceeds max transaction size",
            ));
        }

        if reserved > 0 {
            let need = log_blocks_for(&format, reserved, 0);
            if need > available {
                self.flush()?;
            }
            if need > self.available() {
                return Err(Error::new(ErrorKind::ResourceExhausted, "journal is full"));
            }
        }

        let tid = self.next_tid;
        self.next_tid = self.next_tid.wrapping_add(1);
        self.running = Some(Transaction::new(tid, self.free_start, reserved));
        log::debug!("[jbd2] txn {} started, reserved={}", tid, reserved);
        Ok(tid)
    }

    /// 停止事务
    ///
    /// 嵌套的 `txn_start` 全部停止后事务才真正关闭。空事务直接丢弃并归还事务号；
    /// 不限定块数的事务立即提交并做检查点；其余事务进入队列等待 `flush`。
    pub fn txn_stop(&mut self) -> Result<()> {
        let Some(mut txn) = self.running.take() else {
            return Err(Error::new(ErrorKind::InvalidState, "no running transaction"));
        };

        txn.nesting -= 1;
        if txn.nesting > 0 {
            self.running = Some(txn);
            return Ok(());
        }

        if txn.is_empty() {
            if self.next_tid == txn.tid.wrapping_add(1) {
                self.next_tid = txn.tid;
            }
            log::debug!("[jbd2] txn {} empty, discarded", txn.tid);
            return Ok(());
        }

        txn.transition(TxnState::Locked)?;
        let immediate = txn.reserved == 0;
        log::debug!(
            "[jbd2] txn {} stopped: {} blocks, {} revokes",
            txn.tid,
            txn.logged_cnt,
            txn.revokes().len()
        );
        self.queue.push_back(txn);

        if immediate || self.pending_log_blocks() > self.free_count {
            self.flush()
        } else if self.should_checkpoint(self.config.checkpoint_threshold) {
            log::debug!("[jbd2] log usage over {}%, flushing", self.config.checkpoint_threshold);
            self.flush()
        } else {
            Ok(())
        }
    }

    /// 在运行中的事务里修改客户端块
    ///
    /// 块第一次被记录时从缓存 pin 住，直到检查点才释放；`f` 直接修改缓存中的内容。
    /// 如果该块最后一次是被一个已停止但尚未提交的事务修改的，先提交队列。
    pub fn txn_write_block<R, F>(&mut self, block: u64, f: F) -> Result<R>
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let Some(tid) = self.running.as_ref().map(|txn| txn.tid) else {
            return Err(Error::new(ErrorKind::InvalidInput, "no running transaction"));
        };
        let bs = self.block_size as usize;
        let Some(offset) = block.checked_mul(bs as u64) else {
            return Err(Error::new(ErrorKind::InvalidInput, "block number out of range"));
        };

        let needs_commit = self
            .buffers
            .peek(block)
            .is_some_and(|lb| lb.txn != Some(tid) && !lb.is_logged());
        if needs_commit {
            log::debug!("[jbd2] block {} owned by an uncommitted transaction, flushing", block);
            self.flush()?;
        }

        let held = self.buffers.peek(block).is_some_and(|lb| lb.txn == Some(tid));
        if !held {
            if let Some(txn) = self.running.as_ref() {
                if txn.reserved > 0 && txn.logged_cnt >= txn.reserved {
                    return Err(Error::new(
                        ErrorKind::InvalidInput,
                        "transaction exceeds its reservation",
                    ));
                }
                let need = log_blocks_for(
                    &self.format,
                    txn.logged_cnt + 1,
                    txn.revokes().len() as u32,
                );
                if need > self.log_len() {
                    return Err(Error::new(
                        ErrorKind::ResourceExhausted,
                        "transaction larger than the log",
                    ));
                }
            }
        }

        let (handle, created) = self.buffers.get_or_insert(block)?;
        if created {
            match self.cache.prepare_pin_write(
                self.client_file,
                offset,
                bs,
                false,
                self.config.pin_wait,
            ) {
                Ok(pin) => {
                    if let Some(lb) = self.buffers.get_mut(&handle) {
                        lb.pin = Some(pin);
                    }
                }
                Err(err) => {
                    self.buffers.release(handle);
                    return Err(err);
                }
            }
        }

        let result = match self.buffers.get(&handle).and_then(|lb| lb.pin.as_ref()) {
            Some(pin) => self.cache.buffer_mut(pin).map(f),
            None => Err(Error::new(ErrorKind::InvalidState, "logged buffer is not pinned")),
        };
        let value = match result {
            Ok(value) => value,
            Err(err) => {
                if let Some(pin) = self.buffers.release(handle).and_then(|lb| lb.pin) {
                    self.cache.unpin(pin);
                }
                return Err(err);
            }
        };

        let Some(txn) = self.running.as_mut() else {
            return Err(Error::new(ErrorKind::InvalidState, "no running transaction"));
        };
        if held {
            self.buffers.release(handle);
        } else {
            if let Some(lb) = self.buffers.get_mut(&handle) {
                lb.txn = Some(tid);
            }
            txn.lbcbs.push(handle);
            txn.logged_cnt += 1;
            txn.unwritten_cnt += 1;
        }
        txn.cancel_revoke(block);
        log::trace!("[jbd2] txn {}: logged block {}", tid, block);
        Ok(value)
    }

    /// 在运行中的事务里撤销一个块
    ///
    /// 恢复时，事务号不大于本事务的日志副本都不会再被重放。
    pub fn txn_revoke_block(&mut self, block: u64) -> Result<()> {
        if !self.format.has_revoke() {
            return Err(Error::new(ErrorKind::InvalidInput, "journal has no revoke feature"));
        }
        let Some(txn) = self.running.as_mut() else {
            return Err(Error::new(ErrorKind::InvalidInput, "no running transaction"));
        };
        if txn.add_revoke(block) {
            log::trace!("[jbd2] txn {}: revoked block {}", txn.tid, block);
        }
        Ok(())
    }

    /// 提交队列中的全部事务（FIFO），然后对它们做检查点
    pub fn flush(&mut self) -> Result<()> {
        self.commit_queued()?;
        self.checkpoint_committed().map(|_| ())
    }

    /// 按 FIFO 顺序提交队列中所有已停止的事务，不做检查点
    ///
    /// 日志空间不足时先对已提交的事务做检查点。
    pub fn commit_queued(&mut self) -> Result<()> {
        while let Some(pos) = self
            .queue
            .iter()
            .position(|txn| txn.state() == TxnState::Locked)
        {
            let need = self.queue[pos].log_blocks_needed(&self.format);
            if need > self.free_count {
                if self.checkpoint_committed()? == 0 {
                    return Err(Error::new(ErrorKind::ResourceExhausted, "journal is full"));
                }
                continue;
            }

            let Some(mut txn) = self.queue.remove(pos) else {
                break;
            };
            let result = self.commit_transaction(&mut txn);
            self.queue.insert(pos, txn);
            result?;
        }
        Ok(())
    }

    /// 关闭 journal
    ///
    /// 强制停止运行中的事务，提交并检查点全部事务，卸载日志文件缓存后交还缓存对象。
    /// 失败时仍会释放所有日志缓冲区的 pin。
    pub fn close_journal(mut self) -> Result<C> {
        if let Some(mut txn) = self.running.take() {
            log::warn!("[jbd2] closing with running txn {} (nesting={})", txn.tid, txn.nesting);
            if txn.is_empty() {
                self.next_tid = txn.tid;
            } else {
                txn.transition(TxnState::Locked)?;
                self.queue.push_back(txn);
            }
        }

        let flushed = if self.recovered { self.flush() } else { Ok(()) };

        // 没能检查点的块丢弃修改，只归还 pin
        let mut dropped = 0;
        for lb in self.buffers.drain() {
            if let Some(pin) = lb.pin {
                self.cache.unpin(pin);
                dropped += 1;
            }
        }
        self.revokes.clear();
        if let Err(err) = flushed {
            log::error!("[jbd2] close failed: {}, {} pinned buffers released", err, dropped);
            return Err(err);
        }

        self.cache.synchronous_uninitialize(self.log_file)?;
        log::info!("[jbd2] journal closed, next tid {}", self.next_tid);
        Ok(self.cache)
    }

    // ===== 超级块与日志块 I/O =====

    /// 把内存中的超级块写回日志块 0
    pub(super) fn write_superblock(&mut self) -> Result<()> {
        let sb = self.sb.clone();
        let format = self.format;
        let csum = self.config.checksum;
        write_pinned(
            &mut self.cache,
            self.log_file,
            0,
            self.block_size as usize,
            false,
            self.config.pin_wait,
            |buf| {
                sb.encode(buf);
                stamp_superblock(&format, csum, buf);
            },
        )?;
        self.cache.flush(self.log_file)?;
        log::debug!("[jbd2] superblock written: start={} sequence={}", sb.start, sb.sequence);
        Ok(())
    }

    /// 读取一个日志块的副本
    pub(super) fn read_log_block(&mut self, blk: u32) -> Result<Vec<u8>> {
        let bs = self.block_size as usize;
        read_pinned(
            &mut self.cache,
            self.log_file,
            blk as u64 * bs as u64,
            bs,
            self.config.pin_wait,
            |buf| buf.to_vec(),
        )
    }

    /// 写入一个日志块
    pub(super) fn write_log_block(&mut self, blk: u32, data: &[u8]) -> Result<()> {
        let bs = self.block_size as usize;
        write_pinned(
            &mut self.cache,
            self.log_file,
            blk as u64 * bs as u64,
            bs,
            true,
            self.config.pin_wait,
            |buf| buf.copy_from_slice(data),
        )
    }

    // ===== 访问器 =====

    /// 块大小
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// 日志总块数
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// 日志区起始块
    pub fn log_start(&self) -> u32 {
        self.start
    }

    /// 日志区结束块（含）
    pub fn log_end(&self) -> u32 {
        self.end
    }

    /// 下一个写入位置
    pub fn free_start(&self) -> u32 {
        self.free_start
    }

    /// 空闲区结束块（含）
    pub fn free_end(&self) -> u32 {
        self.free_end
    }

    /// 空闲块数
    pub fn free_count(&self) -> u32 {
        self.free_count
    }

    /// 下一个分配的事务号
    pub fn next_tid(&self) -> Tid {
        self.next_tid
    }

    /// 运行中的事务号
    pub fn running_tid(&self) -> Option<Tid> {
        self.running.as_ref().map(|txn| txn.tid)
    }

    /// 等待提交或检查点的事务数
    pub fn queued_transactions(&self) -> usize {
        self.queue.len()
    }

    /// 当前被记录的客户端块数
    pub fn logged_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// 内存中的超级块
    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    /// 日志格式
    pub fn format(&self) -> &LogFormat {
        &self.format
    }

    /// 日志 UUID
    pub fn uuid(&self) -> &[u8; UUID_SIZE] {
        &self.sb.uuid
    }

    /// 校验和种子
    pub fn checksum_seed(&self) -> u32 {
        self.csum.seed()
    }

    /// 日志是否需要恢复
    pub fn needs_recovery(&self) -> bool {
        !self.recovered
    }

    /// 最近一次恢复的结果
    pub fn last_recovery(&self) -> Option<&RecoveryInfo> {
        self.last_recovery.as_ref()
    }

    /// 配置
    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    /// 缓存
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// 可变访问缓存
    pub fn cache_mut(&mut self) -> &mut C {
        &mut self.cache
    }
}

impl<C: BufferCache> core::fmt::Debug for JournalHandle<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JournalHandle")
            .field("block_size", &self.block_size)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("free_start", &self.free_start)
            .field("free_end", &self.free_end)
            .field("free_count", &self.free_count)
            .field("next_tid", &self.next_tid)
            .field("running", &self.running_tid())
            .field("queued", &self.queue.len())
            .finish()
    }
}
