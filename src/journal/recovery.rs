//! Journal 恢复逻辑
//!
//! 三个阶段按顺序执行，每个阶段都从超级块记录的 `(sequence, start)` 开始遍历日志：
//!
//! 1. **SCAN** - 校验每个块的 magic、事务号和校验和，找出有效范围
//!    `[start_tid, end_tid]`。第一个校验失败的块就是日志的结尾，不是错误。
//! 2. **SCAN_REVOKE** - 在有效范围内收集撤销记录，每个块记录撤销它的最大事务号。
//! 3. **REPLAY** - 在有效范围内把没有被撤销的日志块写回客户端文件，
//!    带 ESCAPE 标志的块恢复前 4 字节的 magic。
//!
//! 后两个阶段在有效范围内再遇到校验失败说明日志在扫描后被改动，返回 `DiskCorrupt`。
//! 无论成功与否，撤销表在 REPLAY 之后都会被清空。
//!
//! 三个阶段共用一个遍历器 [`JournalHandle::walk`]，由 [`PassVisitor`] 提供各阶段的处理。

use super::format::{BlockHeader, BlockTag, BlockType, TagFlags, JBD2_MAGIC};
use super::handle::JournalHandle;
use super::transaction::{tid_geq, tid_gt, Tid};
use crate::cache::{write_pinned, BufferCache};
use crate::error::{Error, ErrorKind, Result};
use alloc::vec::Vec;
use byteorder::{BigEndian, ByteOrder};

/// 恢复阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPass {
    /// 扫描有效范围
    Scan,
    /// 收集撤销记录
    ScanRevoke,
    /// 重放
    Replay,
}

/// 恢复统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// SCAN 阶段读过的日志块（不含数据块）
    pub blocks_scanned: u32,
    /// 描述符块数
    pub descriptor_blocks: u32,
    /// 提交块数
    pub commit_blocks: u32,
    /// 撤销块数
    pub revoke_blocks: u32,
    /// 载入的撤销记录数
    pub revoke_records: u32,
    /// 重放的块数
    pub replayed_blocks: u32,
    /// 因撤销而跳过的块数
    pub revoked_blocks: u32,
}

/// 一次恢复的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryInfo {
    /// 第一个事务号
    pub start_tid: Tid,
    /// 最后一个有效事务号（含）；范围为空时等于 `start_tid - 1`
    pub end_tid: Tid,
    /// 日志起始块
    pub start_block: u32,
    /// 最后一个有效提交块之后的位置
    pub end_block: u32,
    /// 统计
    pub stats: RecoveryStats,
}

impl RecoveryInfo {
    /// 从 `(start_tid, start_block)` 开始的空范围
    pub fn new(start_tid: Tid, start_block: u32) -> Self {
        Self {
            start_tid,
            end_tid: start_tid.wrapping_sub(1),
            start_block,
            end_block: start_block,
            stats: RecoveryStats::default(),
        }
    }

    /// 日志干净时的结果
    pub fn clean(sequence: Tid) -> Self {
        Self::new(sequence, 0)
    }

    /// 有效事务数
    pub fn transaction_count(&self) -> u32 {
        self.end_tid.wrapping_sub(self.start_tid).wrapping_add(1)
    }

    /// 是否没有需要重放的事务
    pub fn is_empty(&self) -> bool {
        self.transaction_count() == 0
    }

    fn contains(&self, tid: Tid) -> bool {
        tid_geq(tid, self.start_tid) && tid_geq(self.end_tid, tid)
    }
}

/// 遍历动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// 单个恢复阶段的处理
trait PassVisitor {
    const PASS: RecoveryPass;

    /// 处理描述符块，`pos` 为描述符块位置，数据块紧随其后
    fn descriptor<C: BufferCache>(
        &mut self,
        journal: &mut JournalHandle<C>,
        info: &mut RecoveryInfo,
        pos: u32,
        tid: Tid,
        tags: &[BlockTag],
    ) -> Result<Flow>;

    /// 处理撤销块
    fn revoke<C: BufferCache>(
        &mut self,
        _journal: &mut JournalHandle<C>,
        _info: &mut RecoveryInfo,
        _tid: Tid,
        _block: &[u8],
    ) -> Result<()> {
        Ok(())
    }

    /// 处理提交块，`next` 为提交块之后的位置
    fn commit(&mut self, _info: &mut RecoveryInfo, _tid: Tid, _next: u32) {}
}

struct ScanPass;

impl PassVisitor for ScanPass {
    const PASS: RecoveryPass = RecoveryPass::Scan;

    fn descriptor<C: BufferCache>(
        &mut self,
        journal: &mut JournalHandle<C>,
        info: &mut RecoveryInfo,
        pos: u32,
        tid: Tid,
        tags: &[BlockTag],
    ) -> Result<Flow> {
        info.stats.descriptor_blocks += 1;
        if !journal.csum.is_enabled() {
            return Ok(Flow::Continue);
        }
        for (i, tag) in tags.iter().enumerate() {
            let data_pos = journal.advance(pos, 1 + i as u32);
            let data = journal.read_log_block(data_pos)?;
            if !journal.csum.verify_data(tag, tid, &data) {
                log::warn!(
                    "[jbd2] SCAN: data block {} (target {}) of txn {} fails checksum",
                    data_pos,
                    tag.block,
                    tid
                );
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    fn revoke<C: BufferCache>(
        &mut self,
        _journal: &mut JournalHandle<C>,
        info: &mut RecoveryInfo,
        _tid: Tid,
        _block: &[u8],
    ) -> Result<()> {
        info.stats.revoke_blocks += 1;
        Ok(())
    }

    fn commit(&mut self, info: &mut RecoveryInfo, tid: Tid, next: u32) {
        info.end_tid = tid;
        info.end_block = next;
        info.stats.commit_blocks += 1;
    }
}

struct RevokePass;

impl PassVisitor for RevokePass {
    const PASS: RecoveryPass = RecoveryPass::ScanRevoke;

    fn descriptor<C: BufferCache>(
        &mut self,
        _journal: &mut JournalHandle<C>,
        _info: &mut RecoveryInfo,
        _pos: u32,
        _tid: Tid,
        _tags: &[BlockTag],
    ) -> Result<Flow> {
        Ok(Flow::Continue)
    }

    fn revoke<C: BufferCache>(
        &mut self,
        journal: &mut JournalHandle<C>,
        info: &mut RecoveryInfo,
        tid: Tid,
        block: &[u8],
    ) -> Result<()> {
        let records: Vec<u64> = journal.format.revoke_records(block)?.collect();
        for record in records {
            let (handle, created) = journal.revokes.get_or_insert(record)?;
            if let Some(entry) = journal.revokes.get_mut(&handle) {
                if created || tid_gt(tid, entry.tid) {
                    entry.tid = tid;
                }
            }
            info.stats.revoke_records += 1;
        }
        Ok(())
    }
}

struct ReplayPass;

impl PassVisitor for ReplayPass {
    const PASS: RecoveryPass = RecoveryPass::Replay;

    fn descriptor<C: BufferCache>(
        &mut self,
        journal: &mut JournalHandle<C>,
        info: &mut RecoveryInfo,
        pos: u32,
        tid: Tid,
        tags: &[BlockTag],
    ) -> Result<Flow> {
        let bs = journal.block_size as usize;
        for (i, tag) in tags.iter().enumerate() {
            let data_pos = journal.advance(pos, 1 + i as u32);

            let revoked = match journal.revokes.find(tag.block) {
                Some(handle) => {
                    let revoked = journal
                        .revokes
                        .get(&handle)
                        .is_some_and(|entry| tid_geq(entry.tid, tid));
                    journal.revokes.release(handle);
                    revoked
                }
                None => false,
            };
            if revoked {
                log::trace!("[jbd2] REPLAY: block {} of txn {} revoked", tag.block, tid);
                info.stats.revoked_blocks += 1;
                continue;
            }

            let mut data = journal.read_log_block(data_pos)?;
            if !journal.csum.verify_data(tag, tid, &data) {
                log::error!(
                    "[jbd2] REPLAY: data block {} of txn {} fails checksum",
                    data_pos,
                    tid
                );
                return Err(Error::new(
                    ErrorKind::DiskCorrupt,
                    "journal data block checksum mismatch",
                ));
            }
            if tag.flags.contains(TagFlags::ESCAPE) {
                BigEndian::write_u32(&mut data[0..4], JBD2_MAGIC);
            }
            let Some(offset) = tag.block.checked_mul(bs as u64) else {
                log::error!(
                    "[jbd2] REPLAY: target block {} of txn {} out of range",
                    tag.block,
                    tid
                );
                return Err(Error::new(
                    ErrorKind::DiskCorrupt,
                    "journal tag block out of range",
                ));
            };

            write_pinned(
                &mut journal.cache,
                journal.client_file,
                offset,
                bs,
                true,
                journal.config.pin_wait,
                |buf| buf.copy_from_slice(&data),
            )?;
            info.stats.replayed_blocks += 1;
            log::trace!("[jbd2] REPLAY: log block {} -> block {}", data_pos, tag.block);
        }
        Ok(Flow::Continue)
    }
}

/// 日志块校验失败
///
/// SCAN 阶段这就是日志结尾；其他阶段说明有效范围内的数据被破坏。
fn end_of_log(pass: RecoveryPass, pos: u32, tid: Tid, reason: &'static str) -> Result<()> {
    if pass == RecoveryPass::Scan {
        log::debug!("[jbd2] SCAN: end of log at block {} (txn {}): {}", pos, tid, reason);
        Ok(())
    } else {
        log::error!("[jbd2] {:?}: block {} (txn {}): {}", pass, pos, tid, reason);
        Err(Error::new(ErrorKind::DiskCorrupt, reason))
    }
}

impl<C: BufferCache> JournalHandle<C> {
    /// 重放日志
    ///
    /// 日志干净（`start == 0`）时什么都不做。成功后刷新客户端文件，
    /// 把超级块重置为干净日志（`start = 0`，`sequence = end_tid + 1`）并写回。
    ///
    /// # 返回
    ///
    /// * `DiskCorrupt` - 有效范围内的日志块校验失败
    /// * `UnexpectedIo` - pin 日志块或客户端块失败
    pub fn replay_journal(&mut self) -> Result<RecoveryInfo> {
        if self.running.is_some() || !self.queue.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidState,
                "cannot replay with active transactions",
            ));
        }

        if self.sb.start == 0 {
            let info = RecoveryInfo::clean(self.sb.sequence);
            log::info!("[jbd2] journal clean, nothing to replay");
            self.recovered = true;
            self.last_recovery = Some(info.clone());
            return Ok(info);
        }

        if self.sb.start < self.start || self.sb.start > self.end {
            return Err(Error::new(ErrorKind::DiskCorrupt, "journal start out of range"));
        }

        let mut info = RecoveryInfo::new(self.sb.sequence, self.sb.start);
        let result = self.run_passes(&mut info);
        self.revokes.clear();
        result?;

        self.cache.flush(self.client_file)?;

        let next = info.end_tid.wrapping_add(1);
        self.sb.start = 0;
        self.sb.sequence = next;
        self.write_superblock()?;

        self.next_tid = next;
        self.free_start = self.start;
        self.free_end = self.end;
        self.free_count = self.log_len();
        self.recovered = true;

        log::info!(
            "[jbd2] recovery complete: {} transactions, {} blocks replayed, {} revoked",
            info.transaction_count(),
            info.stats.replayed_blocks,
            info.stats.revoked_blocks
        );
        self.last_recovery = Some(info.clone());
        Ok(info)
    }

    fn run_passes(&mut self, info: &mut RecoveryInfo) -> Result<()> {
        self.walk(&mut ScanPass, info)?;
        log::info!(
            "[jbd2] SCAN: txns {}..={} valid, blocks {}..{}",
            info.start_tid,
            info.end_tid,
            info.start_block,
            info.end_block
        );
        if info.is_empty() {
            return Ok(());
        }

        self.walk(&mut RevokePass, info)?;
        log::info!("[jbd2] SCAN_REVOKE: {} revoke records", info.stats.revoke_records);

        self.walk(&mut ReplayPass, info)?;
        log::info!("[jbd2] REPLAY: {} blocks replayed", info.stats.replayed_blocks);
        Ok(())
    }

    /// 从日志起点遍历，直到日志结尾（SCAN）或有效范围结束（其他阶段）
    fn walk<V: PassVisitor>(&mut self, visitor: &mut V, info: &mut RecoveryInfo) -> Result<()> {
        let mut pos = info.start_block;
        let mut tid = info.start_tid;
        let mut walked = 0u64;
        let log_len = self.log_len() as u64;

        loop {
            if V::PASS != RecoveryPass::Scan && !info.contains(tid) {
                break;
            }
            if walked >= log_len {
                log::warn!("[jbd2] {:?}: walked the whole log, stopping", V::PASS);
                break;
            }

            let block = self.read_log_block(pos)?;
            if V::PASS == RecoveryPass::Scan {
                info.stats.blocks_scanned += 1;
            }

            let header = BlockHeader::parse(&block);
            if !header.has_valid_magic() {
                end_of_log(V::PASS, pos, tid, "bad journal block magic")?;
                break;
            }
            if header.sequence != tid {
                end_of_log(V::PASS, pos, tid, "unexpected transaction id")?;
                break;
            }

            match header.kind() {
                Some(BlockType::Descriptor) => {
                    if !self.csum.verify_descriptor(&block) {
                        end_of_log(V::PASS, pos, tid, "descriptor block checksum mismatch")?;
                        break;
                    }
                    let tags: Vec<BlockTag> = self.format.descriptor_tags(&block).collect();
                    if visitor.descriptor(self, info, pos, tid, &tags)? == Flow::Stop {
                        break;
                    }
                    let span = 1 + tags.len() as u32;
                    pos = self.advance(pos, span);
                    walked += span as u64;
                }
                Some(BlockType::Commit) => {
                    if !self.csum.verify_commit(&block) {
                        end_of_log(V::PASS, pos, tid, "commit block checksum mismatch")?;
                        break;
                    }
                    pos = self.advance(pos, 1);
                    walked += 1;
                    visitor.commit(info, tid, pos);
                    tid = tid.wrapping_add(1);
                }
                Some(BlockType::Revoke) => {
                    if !self.csum.verify_revoke(&block) {
                        end_of_log(V::PASS, pos, tid, "revoke block checksum mismatch")?;
                        break;
                    }
                    visitor.revoke(self, info, tid, &block)?;
                    pos = self.advance(pos, 1);
                    walked += 1;
                }
                _ => {
                    end_of_log(V::PASS, pos, tid, "unknown journal block type")?;
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::format::{IncompatFeatures, Superblock};
    use crate::journal::test_utils::{block_of, Fixture, LogBuilder};

    const BS: usize = 1024;

    fn revoke_log() -> LogBuilder {
        LogBuilder::new(BS, 32, IncompatFeatures::REVOKE)
    }

    #[test]
    fn test_clean_journal() {
        let mut fx = Fixture::new(&revoke_log(), 16);
        let mut journal = fx.open().unwrap();
        assert!(!journal.needs_recovery());

        let info = journal.replay_journal().unwrap();
        assert!(info.is_empty());
        assert_eq!(info.start_tid, 1);
        assert_eq!(info.stats, RecoveryStats::default());
    }

    #[test]
    fn test_two_tag_descriptor() {
        let mut b = revoke_log();
        b.transaction(5, &[(3, block_of(BS, 0xA1)), (7, block_of(BS, 0xB2))]);
        b.dirty(1, 5);

        let mut fx = Fixture::new(&b, 16);
        let client = fx.client.clone();
        let log = fx.log.clone();
        let mut journal = fx.open().unwrap();
        assert!(journal.needs_recovery());

        let info = journal.replay_journal().unwrap();
        assert_eq!(info.start_tid, 5);
        assert_eq!(info.end_tid, 5);
        assert_eq!(info.transaction_count(), 1);
        assert_eq!(info.start_block, 1);
        assert_eq!(info.end_block, 5);
        assert_eq!(info.stats.blocks_scanned, 3);
        assert_eq!(info.stats.descriptor_blocks, 1);
        assert_eq!(info.stats.commit_blocks, 1);
        assert_eq!(info.stats.replayed_blocks, 2);

        assert_eq!(client.read_range(3 * BS, BS), block_of(BS, 0xA1));
        assert_eq!(client.read_range(7 * BS, BS), block_of(BS, 0xB2));
        assert_eq!(client.read_range(4 * BS, BS), block_of(BS, 0));

        // 日志变为干净，下一个事务号接在最后一个有效事务之后
        assert!(!journal.needs_recovery());
        assert_eq!(journal.next_tid(), 6);
        assert_eq!(journal.last_recovery(), Some(&info));
        let sb = Superblock::parse(&log.read_range(0, 1024)).unwrap();
        assert_eq!(sb.start, 0);
        assert_eq!(sb.sequence, 6);
    }

    #[test]
    fn test_escaped_block_restored() {
        let mut data = block_of(BS, 0x33);
        BigEndian::write_u32(&mut data[0..4], JBD2_MAGIC);

        let mut b = revoke_log();
        b.transaction(1, &[(2, data.clone())]);
        b.dirty(1, 1);
        // 日志里的副本前 4 字节被清零
        assert_eq!(&b.block_mut(2)[0..4], &[0u8; 4]);

        let mut fx = Fixture::new(&b, 16);
        let client = fx.client.clone();
        let mut journal = fx.open().unwrap();
        journal.replay_journal().unwrap();

        assert_eq!(client.read_range(2 * BS, BS), data);
    }

    #[test]
    fn test_revoke_then_rewrite() {
        // txn 1 写块 5，txn 2 撤销块 5，txn 3 重新写块 5：重放 txn 3 的内容
        let mut b = revoke_log();
        b.transaction(1, &[(5, block_of(BS, 0x11))]);
        b.revoke(2, &[5]);
        b.commit(2);
        b.transaction(3, &[(5, block_of(BS, 0x33))]);
        b.dirty(1, 1);

        let mut fx = Fixture::new(&b, 16);
        let client = fx.client.clone();
        let mut journal = fx.open().unwrap();
        let info = journal.replay_journal().unwrap();

        assert_eq!(info.end_tid, 3);
        assert_eq!(info.stats.revoke_blocks, 1);
        assert_eq!(info.stats.revoke_records, 1);
        assert_eq!(info.stats.revoked_blocks, 1);
        assert_eq!(info.stats.replayed_blocks, 1);
        assert_eq!(client.read_range(5 * BS, BS), block_of(BS, 0x33));
        assert!(journal.revokes.is_empty());
    }

    #[test]
    fn test_revoke_without_rewrite() {
        let mut b = revoke_log();
        b.transaction(1, &[(5, block_of(BS, 0x11)), (6, block_of(BS, 0x12))]);
        b.revoke(2, &[5]);
        b.transaction(2, &[(8, block_of(BS, 0x22))]);
        b.dirty(1, 1);

        let mut fx = Fixture::new(&b, 16);
        let client = fx.client.clone();
        let mut journal = fx.open().unwrap();
        let info = journal.replay_journal().unwrap();

        assert_eq!(info.transaction_count(), 2);
        assert_eq!(client.read_range(5 * BS, BS), block_of(BS, 0));
        assert_eq!(client.read_range(6 * BS, BS), block_of(BS, 0x12));
        assert_eq!(client.read_range(8 * BS, BS), block_of(BS, 0x22));
    }

    #[test]
    fn test_uncommitted_transaction_ignored() {
        let mut b = revoke_log();
        b.transaction(1, &[(2, block_of(BS, 0xAA))]);
        b.descriptor(2, &[(3, block_of(BS, 0xBB))]);
        b.dirty(1, 1);

        let mut fx = Fixture::new(&b, 16);
        let client = fx.client.clone();
        let mut journal = fx.open().unwrap();
        let info = journal.replay_journal().unwrap();

        assert_eq!(info.end_tid, 1);
        assert_eq!(info.stats.descriptor_blocks, 2);
        assert_eq!(client.read_range(2 * BS, BS), block_of(BS, 0xAA));
        assert_eq!(client.read_range(3 * BS, BS), block_of(BS, 0));
        assert_eq!(journal.next_tid(), 2);
    }

    #[test]
    fn test_stale_transaction_id_ends_scan() {
        let mut b = revoke_log();
        b.transaction(1, &[(2, block_of(BS, 0xAA))]);
        // 上一轮留下的旧事务
        b.transaction(7, &[(3, block_of(BS, 0xBB))]);
        b.dirty(1, 1);

        let mut fx = Fixture::new(&b, 16);
        let client = fx.client.clone();
        let mut journal = fx.open().unwrap();
        let info = journal.replay_journal().unwrap();

        assert_eq!(info.end_tid, 1);
        assert_eq!(client.read_range(3 * BS, BS), block_of(BS, 0));
    }

    #[test]
    fn test_corrupted_commit_checksum_ends_scan() {
        let mut b = LogBuilder::new(BS, 32, IncompatFeatures::REVOKE | IncompatFeatures::CSUM_V3);
        b.transaction(1, &[(2, block_of(BS, 0xAA))]);
        b.descriptor(2, &[(3, block_of(BS, 0xBB))]);
        let commit = b.commit(2);
        b.block_mut(commit)[16] ^= 0xFF;
        b.dirty(1, 1);

        let mut fx = Fixture::new(&b, 16);
        let client = fx.client.clone();
        let mut journal = fx.open().unwrap();
        let info = journal.replay_journal().unwrap();

        assert_eq!(info.end_tid, 1);
        assert_eq!(info.end_block, 4);
        assert_eq!(client.read_range(2 * BS, BS), block_of(BS, 0xAA));
        assert_eq!(client.read_range(3 * BS, BS), block_of(BS, 0));
    }

    #[test]
    fn test_data_checksum_mismatch_ends_scan() {
        let mut b = LogBuilder::new(BS, 32, IncompatFeatures::CSUM_V2);
        b.transaction(1, &[(2, block_of(BS, 0xAA))]);
        let desc = b.descriptor(2, &[(3, block_of(BS, 0xBB))]);
        b.commit(2);
        b.block_mut(desc + 1)[100] ^= 1;
        b.dirty(1, 1);

        let mut fx = Fixture::new(&b, 16);
        let client = fx.client.clone();
        let mut journal = fx.open().unwrap();
        let info = journal.replay_journal().unwrap();

        assert_eq!(info.end_tid, 1);
        assert_eq!(client.read_range(3 * BS, BS), block_of(BS, 0));
    }

    #[test]
    fn test_corruption_inside_valid_range() {
        // SCAN 不解析撤销记录，r_count 越界要到 SCAN_REVOKE 才发现
        let mut b = revoke_log();
        b.transaction(1, &[(2, block_of(BS, 0xAA))]);
        let revoke = b.revoke(2, &[2]);
        b.commit(2);
        BigEndian::write_u32(&mut b.block_mut(revoke)[12..16], 4096);
        b.dirty(1, 1);

        let mut fx = Fixture::new(&b, 16);
        let client = fx.client.clone();
        let mut journal = fx.open().unwrap();
        let err = journal.replay_journal().unwrap_err();

        assert!(err.is_corrupt());
        assert!(journal.needs_recovery());
        assert!(journal.revokes.is_empty());
        assert!(journal.last_recovery().is_none());
        assert_eq!(client.read_range(2 * BS, BS), block_of(BS, 0));
    }

    #[test]
    fn test_replay_wraps_around_log_end() {
        // 日志区 [1, 7]：描述符在 5，数据在 6、7，提交块回绕到 1
        let mut b = LogBuilder::new(BS, 8, IncompatFeatures::REVOKE);
        b.seek(5);
        b.transaction(10, &[(1, block_of(BS, 0x01)), (2, block_of(BS, 0x02))]);
        assert_eq!(b.position(), 2);
        b.dirty(5, 10);

        let mut fx = Fixture::new(&b, 8);
        let client = fx.client.clone();
        let mut journal = fx.open().unwrap();
        let info = journal.replay_journal().unwrap();

        assert_eq!(info.end_tid, 10);
        assert_eq!(info.end_block, 2);
        assert_eq!(client.read_range(BS, BS), block_of(BS, 0x01));
        assert_eq!(client.read_range(2 * BS, BS), block_of(BS, 0x02));
    }

    #[test]
    fn test_tag_block_beyond_addressable_range() {
        let mut b = LogBuilder::new(BS, 32, IncompatFeatures::REVOKE | IncompatFeatures::BIT64);
        b.transaction(1, &[(1u64 << 60, block_of(BS, 0x60))]);
        b.dirty(1, 1);

        let mut fx = Fixture::new(&b, 16);
        let mut journal = fx.open().unwrap();
        let err = journal.replay_journal().unwrap_err();

        assert!(err.is_corrupt());
        assert!(journal.needs_recovery());
        assert!(journal.revokes.is_empty());
    }

    #[test]
    fn test_64bit_csum_v2_log() {
        let mut b = LogBuilder::new(
            BS,
            32,
            IncompatFeatures::REVOKE | IncompatFeatures::BIT64 | IncompatFeatures::CSUM_V2,
        );
        assert_eq!(b.format.tag_bytes(), 14);
        b.transaction(1, &[(4, block_of(BS, 0x44)), (5, block_of(BS, 0x55))]);
        b.revoke(2, &[5]);
        b.commit(2);
        b.dirty(1, 1);

        let mut fx = Fixture::new(&b, 16);
        let client = fx.client.clone();
        let mut journal = fx.open().unwrap();
        let info = journal.replay_journal().unwrap();

        assert_eq!(info.end_tid, 2);
        assert_eq!(client.read_range(4 * BS, BS), block_of(BS, 0x44));
        assert_eq!(client.read_range(5 * BS, BS), block_of(BS, 0));
    }

    #[test]
    fn test_tid_wraparound_in_log() {
        let mut b = revoke_log();
        b.transaction(u32::MAX, &[(2, block_of(BS, 0x0F))]);
        b.transaction(0, &[(3, block_of(BS, 0xF0))]);
        b.dirty(1, u32::MAX);

        let mut fx = Fixture::new(&b, 16);
        let client = fx.client.clone();
        let mut journal = fx.open().unwrap();
        let info = journal.replay_journal().unwrap();

        assert_eq!(info.transaction_count(), 2);
        assert_eq!(info.end_tid, 0);
        assert_eq!(journal.next_tid(), 1);
        assert_eq!(client.read_range(3 * BS, BS), block_of(BS, 0xF0));
    }

    #[test]
    fn test_start_out_of_range() {
        let mut b = revoke_log();
        b.dirty(40, 1);
        let mut fx = Fixture::new(&b, 16);
        let mut journal = fx.open().unwrap();
        assert!(journal.replay_journal().unwrap_err().is_corrupt());
    }

    #[test]
    fn test_remount_after_replay_is_clean() {
        let mut b = revoke_log();
        b.transaction(3, &[(2, block_of(BS, 0xAA))]);
        b.dirty(1, 3);

        let mut fx = Fixture::new(&b, 16);
        fx.open().unwrap().replay_journal().unwrap();

        let mut fx2 = fx.remount();
        let journal = fx2.open().unwrap();
        assert!(!journal.needs_recovery());
        assert_eq!(journal.superblock().sequence, 4);
        assert_eq!(journal.next_tid(), 4);
    }
}
