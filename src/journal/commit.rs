//! 事务提交
//!
//! 把一个已停止的事务写进日志：
//!
//! 1. 描述符块 + 数据块副本（前 4 字节等于 magic 的块打 ESCAPE 标志并清零）
//! 2. 撤销块
//! 3. 刷新日志文件
//! 4. 日志原本为空时，更新超级块指向本事务
//! 5. 提交块，再刷新日志文件
//!
//! 所有块的校验和在写入前计算。

use super::format::{
    BlockHeader, BlockTag, BlockType, CommitBlock, TagFlags, HEADER_SIZE, JBD2_CRC32C_CHKSUM,
    JBD2_CRC32_CHKSUM_SIZE, JBD2_MAGIC, UUID_SIZE,
};
use super::handle::JournalHandle;
use super::transaction::{tags_per_descriptor, Transaction, TxnState};
use crate::cache::BufferCache;
use crate::error::{Error, ErrorKind, Result};
use alloc::{vec, vec::Vec};
use byteorder::{BigEndian, ByteOrder};

impl<C: BufferCache> JournalHandle<C> {
    /// 提交事务（LOCKED → COMMITTING → CHECKPOINT）
    pub(super) fn commit_transaction(&mut self, txn: &mut Transaction) -> Result<()> {
        txn.transition(TxnState::Committing)?;

        let need = txn.log_blocks_needed(&self.format);
        if need > self.free_count {
            return Err(Error::new(ErrorKind::ResourceExhausted, "journal is full"));
        }

        let bs = self.block_size as usize;
        txn.start_blk = self.free_start;
        let mut pos = self.free_start;

        // 描述符块 + 数据块
        let blocks: Vec<u64> = txn.lbcbs.iter().map(|handle| handle.block()).collect();
        let per_desc = (tags_per_descriptor(&self.format) as usize).max(1);
        let tag_bytes = self.format.tag_bytes();

        for chunk in blocks.chunks(per_desc) {
            let desc_pos = pos;
            pos = self.advance(pos, 1);

            let mut desc = vec![0u8; bs];
            BlockHeader::new(BlockType::Descriptor, txn.tid).encode(&mut desc);
            let mut offset = HEADER_SIZE;

            for (i, &block) in chunk.iter().enumerate() {
                let mut data = self.client_block_copy(block)?;

                let mut flags = TagFlags::empty();
                if BigEndian::read_u32(&data[0..4]) == JBD2_MAGIC {
                    flags |= TagFlags::ESCAPE;
                    data[0..4].fill(0);
                }
                if i > 0 {
                    flags |= TagFlags::SAME_UUID;
                }
                if i + 1 == chunk.len() {
                    flags |= TagFlags::LAST_TAG;
                }

                let tag = BlockTag {
                    block,
                    flags,
                    checksum: self.csum.data_csum(txn.tid, &data),
                };
                self.format.encode_tag(&tag, &mut desc[offset..]);
                offset += tag_bytes;
                if i == 0 {
                    desc[offset..offset + UUID_SIZE].copy_from_slice(&self.sb.uuid);
                    offset += UUID_SIZE;
                }

                self.write_log_block(pos, &data)?;
                pos = self.advance(pos, 1);
            }

            self.csum.stamp_descriptor(&mut desc);
            self.write_log_block(desc_pos, &desc)?;
        }

        // 撤销块
        let per_revoke = self.format.revoke_capacity().max(1);
        for chunk in txn.revokes.chunks(per_revoke) {
            let mut block = vec![0u8; bs];
            self.format.encode_revoke(&mut block, txn.tid, chunk);
            self.csum.stamp_revoke(&mut block);
            self.write_log_block(pos, &block)?;
            pos = self.advance(pos, 1);
        }

        self.cache.flush(self.log_file)?;

        if self.sb.start == 0 {
            self.sb.start = txn.start_blk;
            self.sb.sequence = txn.tid;
            self.write_superblock()?;
        }

        // 提交块
        let mut commit = CommitBlock::new(txn.tid);
        if self.csum.is_enabled() {
            commit.chksum_type = JBD2_CRC32C_CHKSUM;
            commit.chksum_size = JBD2_CRC32_CHKSUM_SIZE;
        }
        let mut block = vec![0u8; bs];
        commit.encode(&mut block);
        self.csum.stamp_commit(&mut block);
        self.write_log_block(pos, &block)?;
        self.cache.flush(self.log_file)?;

        self.consume(need);
        txn.log_blocks_used = need;
        for handle in &txn.lbcbs {
            if let Some(lb) = self.buffers.get_mut(handle) {
                if lb.txn == Some(txn.tid) {
                    lb.cp_txn = Some(txn.tid);
                }
            }
        }
        txn.transition(TxnState::Checkpoint)?;

        log::info!(
            "[jbd2] txn {} committed: blocks {}..{} ({} data, {} revokes)",
            txn.tid,
            txn.start_blk,
            pos,
            blocks.len(),
            txn.revokes.len()
        );
        Ok(())
    }

    /// 通过日志缓冲区的 pin 拷贝客户端块当前内容
    fn client_block_copy(&self, block: u64) -> Result<Vec<u8>> {
        let pin = self
            .buffers
            .peek(block)
            .and_then(|lb| lb.pin.as_ref())
            .ok_or(Error::new(ErrorKind::InvalidState, "logged buffer is not pinned"))?;
        Ok(self.cache.buffer(pin)?.to_vec())
    }
}
