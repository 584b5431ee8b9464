//! 测试用日志镜像构造器

use super::checksum::{stamp_superblock, JournalChecksum};
use super::format::{
    BlockHeader, BlockTag, BlockType, CommitBlock, IncompatFeatures, LogFormat, Superblock,
    TagFlags, HEADER_SIZE, JBD2_CRC32C_CHKSUM, JBD2_MAGIC, UUID_SIZE,
};
use super::transaction::Tid;
use super::{JournalConfig, JournalHandle};
use crate::cache::{FileId, LruBufferCache, MemFile};
use crate::crc::crc32c_append;
use crate::error::Result;
use alloc::{vec, vec::Vec};
use byteorder::{BigEndian, ByteOrder};

pub(crate) const UUID: [u8; UUID_SIZE] = [
    0x6B, 0x1D, 0x42, 0x07, 0x90, 0x3E, 0x4C, 0x11, 0xA2, 0x58, 0x0D, 0xE4, 0x77, 0x31, 0xC9, 0x05,
];

/// 按块写日志镜像，块号在 `[first, maxlen - 1]` 内回绕
pub(crate) struct LogBuilder {
    pub sb: Superblock,
    pub format: LogFormat,
    pub csum: JournalChecksum,
    pub bs: usize,
    image: Vec<u8>,
    pos: u32,
}

impl LogBuilder {
    pub fn new(bs: usize, maxlen: u32, incompat: IncompatFeatures) -> Self {
        let mut sb = Superblock::new(bs as u32, maxlen, UUID);
        sb.feature_incompat = incompat;
        if incompat.intersects(IncompatFeatures::CSUM_V2 | IncompatFeatures::CSUM_V3) {
            sb.checksum_type = JBD2_CRC32C_CHKSUM;
        }
        let format = LogFormat::from_superblock(&sb);
        let csum = JournalChecksum::new(&format, &sb.uuid, crc32c_append);
        Self {
            pos: sb.first,
            sb,
            format,
            csum,
            bs,
            image: vec![0u8; bs * maxlen as usize],
        }
    }

    pub fn position(&self) -> u32 {
        self.pos
    }

    pub fn seek(&mut self, pos: u32) {
        self.pos = pos;
    }

    /// 让超级块指向 `(start, sequence)`，即日志需要恢复
    pub fn dirty(&mut self, start: u32, sequence: Tid) {
        self.sb.start = start;
        self.sb.sequence = sequence;
    }

    fn next_pos(&mut self) -> u32 {
        let pos = self.pos;
        self.pos = if pos + 1 >= self.sb.maxlen { self.sb.first } else { pos + 1 };
        pos
    }

    pub fn block_mut(&mut self, blk: u32) -> &mut [u8] {
        let start = blk as usize * self.bs;
        &mut self.image[start..start + self.bs]
    }

    fn put(&mut self, blk: u32, data: &[u8]) {
        self.block_mut(blk).copy_from_slice(data);
    }

    /// 写一个描述符块和它的数据块，返回描述符块位置
    pub fn descriptor(&mut self, tid: Tid, entries: &[(u64, Vec<u8>)]) -> u32 {
        let desc_pos = self.next_pos();
        let mut desc = vec![0u8; self.bs];
        BlockHeader::new(BlockType::Descriptor, tid).encode(&mut desc);
        let mut offset = HEADER_SIZE;

        for (i, (block, data)) in entries.iter().enumerate() {
            let mut copy = data.clone();
            let mut flags = TagFlags::empty();
            if BigEndian::read_u32(&copy[0..4]) == JBD2_MAGIC {
                flags |= TagFlags::ESCAPE;
                copy[0..4].fill(0);
            }
            if i > 0 {
                flags |= TagFlags::SAME_UUID;
            }
            if i + 1 == entries.len() {
                flags |= TagFlags::LAST_TAG;
            }
            let tag = BlockTag {
                block: *block,
                flags,
                checksum: self.csum.data_csum(tid, &copy),
            };
            self.format.encode_tag(&tag, &mut desc[offset..]);
            offset += self.format.tag_bytes();
            if i == 0 {
                desc[offset..offset + UUID_SIZE].copy_from_slice(&UUID);
                offset += UUID_SIZE;
            }
            let data_pos = self.next_pos();
            self.put(data_pos, &copy);
        }

        self.csum.stamp_descriptor(&mut desc);
        self.put(desc_pos, &desc);
        desc_pos
    }

    pub fn revoke(&mut self, tid: Tid, blocks: &[u64]) -> u32 {
        let pos = self.next_pos();
        let mut block = vec![0u8; self.bs];
        self.format.encode_revoke(&mut block, tid, blocks);
        self.csum.stamp_revoke(&mut block);
        self.put(pos, &block);
        pos
    }

    pub fn commit(&mut self, tid: Tid) -> u32 {
        let pos = self.next_pos();
        let mut block = vec![0u8; self.bs];
        let mut commit = CommitBlock::new(tid);
        if self.csum.is_enabled() {
            commit.chksum_type = JBD2_CRC32C_CHKSUM;
            commit.chksum_size = 4;
        }
        commit.encode(&mut block);
        self.csum.stamp_commit(&mut block);
        self.put(pos, &block);
        pos
    }

    /// 一个完整事务：描述符 + 数据 + 提交
    pub fn transaction(&mut self, tid: Tid, entries: &[(u64, Vec<u8>)]) -> u32 {
        let start = self.descriptor(tid, entries);
        self.commit(tid);
        start
    }

    pub fn image(&self) -> Vec<u8> {
        let mut image = self.image.clone();
        self.sb.encode(&mut image[..self.bs]);
        stamp_superblock(&self.format, crc32c_append, &mut image[..self.bs]);
        image
    }
}

/// 一块以 `fill` 填充的数据
pub(crate) fn block_of(bs: usize, fill: u8) -> Vec<u8> {
    vec![fill; bs]
}

/// 日志文件 + 客户端文件 + 缓存
pub(crate) struct Fixture {
    pub cache: LruBufferCache,
    pub log: MemFile,
    pub client: MemFile,
    pub log_id: FileId,
    pub client_id: FileId,
    pub bs: usize,
}

impl Fixture {
    pub fn new(builder: &LogBuilder, client_blocks: usize) -> Self {
        Self::from_files(
            MemFile::from_vec(builder.image()),
            MemFile::new(client_blocks * builder.bs),
            builder.bs,
        )
    }

    /// 在同一对文件上新建缓存（模拟崩溃后重新挂载）
    pub fn from_files(log: MemFile, client: MemFile, bs: usize) -> Self {
        let mut cache = LruBufferCache::new(64, bs);
        let log_id = cache.attach(log.clone());
        let client_id = cache.attach(client.clone());
        Self {
            cache,
            log,
            client,
            log_id,
            client_id,
            bs,
        }
    }

    pub fn remount(&self) -> Self {
        Self::from_files(self.log.clone(), self.client.clone(), self.bs)
    }

    pub fn open(&mut self) -> Result<JournalHandle<&mut LruBufferCache>> {
        self.open_with(JournalConfig::default())
    }

    pub fn open_with(
        &mut self,
        config: JournalConfig,
    ) -> Result<JournalHandle<&mut LruBufferCache>> {
        use crate::cache::BackingFile;
        let log_size = self.log.len();
        JournalHandle::open_journal(
            &mut self.cache,
            self.log_id,
            self.client_id,
            log_size,
            self.bs as u32,
            config,
        )
    }

    pub fn client_block(&self, block: usize) -> Vec<u8> {
        self.client.read_range(block * self.bs, self.bs)
    }
}
