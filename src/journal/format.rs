//! JBD2 磁盘格式编解码
//!
//! 这个模块定义 journal 的全部磁盘结构，并提供与字节缓冲区之间的
//! 解析/编码函数。
//!
//! # 重要说明
//!
//! - **所有字段都是大端序（big-endian）**，统一通过 `byteorder::BigEndian` 读写
//! - 不使用 `#[repr(C, packed)]` 结构体强转，全部按偏移量编解码
//! - 特性位只对 V2 超级块生效，V1 超级块没有特性字段语义
//!
//! # 块布局
//!
//! ```text
//! Header      : magic(4) | blocktype(4) | sequence(4)
//! Superblock  : header | blocksize | maxlen | first | sequence | start | errno
//!               | compat | incompat | ro_compat | uuid(16) | nr_users | dynsuper
//!               | max_transaction | max_trans_data | checksum_type(1) | ...
//!               | checksum @0xFC | users(768) @0x100
//! Descriptor  : header | tag [uuid] | tag [uuid] | ... | [tail checksum(4)]
//! Commit      : header | chksum_type(1) | chksum_size(1) | pad(2)
//!               | chksum[8](32) | commit_sec(8) | commit_nsec(4)
//! Revoke      : header | r_count(4) | blocknr(4 或 8) ... | [tail checksum(4)]
//! ```

use crate::error::{Error, ErrorKind, Result};
use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};

/// JBD2 magic number
pub const JBD2_MAGIC: u32 = 0xC03B_3998;

/// 块头大小
pub const HEADER_SIZE: usize = 12;

/// 超级块大小
pub const SUPERBLOCK_SIZE: usize = 1024;

/// UUID 大小（128位）
pub const UUID_SIZE: usize = 16;

/// 描述符块/撤销块尾部校验和大小
pub const TAIL_SIZE: usize = 4;

/// 撤销块头大小（块头 + r_count）
pub const REVOKE_HEADER_SIZE: usize = 16;

/// 提交块中 `h_chksum[0]` 的偏移
pub const COMMIT_CHECKSUM_OFFSET: usize = 16;

/// 提交块中校验和数组字节数
pub const COMMIT_CHECKSUM_BYTES: usize = 32;

/// CRC32C 校验和类型
pub const JBD2_CRC32C_CHKSUM: u8 = 4;

/// CRC32C 校验和长度
pub const JBD2_CRC32_CHKSUM_SIZE: u8 = 4;

/// 已知的只读兼容特性（当前没有）
pub const KNOWN_RO_COMPAT: u32 = 0;

// 超级块字段偏移
const SB_BLOCKSIZE: usize = 0x0C;
const SB_MAXLEN: usize = 0x10;
const SB_FIRST: usize = 0x14;
const SB_SEQUENCE: usize = 0x18;
const SB_START: usize = 0x1C;
const SB_ERRNO: usize = 0x20;
const SB_FEATURE_COMPAT: usize = 0x24;
const SB_FEATURE_INCOMPAT: usize = 0x28;
const SB_FEATURE_RO_COMPAT: usize = 0x2C;
const SB_UUID: usize = 0x30;
const SB_NR_USERS: usize = 0x40;
const SB_DYNSUPER: usize = 0x44;
const SB_MAX_TRANSACTION: usize = 0x48;
const SB_MAX_TRANS_DATA: usize = 0x4C;
const SB_CHECKSUM_TYPE: usize = 0x50;
/// 超级块校验和字段偏移
pub const SB_CHECKSUM: usize = 0xFC;

/// 块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BlockType {
    /// 描述符块
    Descriptor = 1,
    /// 提交块
    Commit = 2,
    /// V1 超级块
    SuperblockV1 = 3,
    /// V2 超级块
    SuperblockV2 = 4,
    /// 撤销块
    Revoke = 5,
}

impl BlockType {
    /// 从磁盘值转换
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Descriptor),
            2 => Some(Self::Commit),
            3 => Some(Self::SuperblockV1),
            4 => Some(Self::SuperblockV2),
            5 => Some(Self::Revoke),
            _ => None,
        }
    }
}

bitflags! {
    /// 兼容特性
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CompatFeatures: u32 {
        /// 旧式提交块校验和（v1）
        const CHECKSUM = 0x1;
    }
}

bitflags! {
    /// 不兼容特性
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IncompatFeatures: u32 {
        /// 日志中存在撤销块
        const REVOKE       = 0x1;
        /// 64 位块号
        const BIT64        = 0x2;
        /// 异步提交
        const ASYNC_COMMIT = 0x4;
        /// 校验和 v2
        const CSUM_V2      = 0x8;
        /// 校验和 v3
        const CSUM_V3      = 0x10;
    }
}

bitflags! {
    /// 描述符块中 tag 的标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TagFlags: u32 {
        /// 数据块前 4 字节原本是 magic，写入日志时被清零
        const ESCAPE    = 0x1;
        /// 与上一个 tag 使用相同 UUID（tag 后不跟 UUID）
        const SAME_UUID = 0x2;
        /// 块已被删除
        const DELETED   = 0x4;
        /// 描述符块中最后一个 tag
        const LAST_TAG  = 0x8;
    }
}

/// 块头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Magic number
    pub magic: u32,
    /// 块类型（原始值）
    pub block_type: u32,
    /// 事务序列号
    pub sequence: u32,
}

impl BlockHeader {
    /// 创建块头
    pub fn new(block_type: BlockType, sequence: u32) -> Self {
        Self {
            magic: JBD2_MAGIC,
            block_type: block_type as u32,
            sequence,
        }
    }

    /// 从缓冲区解析（至少 12 字节）
    pub fn parse(buf: &[u8]) -> Self {
        Self {
            magic: BigEndian::read_u32(&buf[0..4]),
            block_type: BigEndian::read_u32(&buf[4..8]),
            sequence: BigEndian::read_u32(&buf[8..12]),
        }
    }

    /// 编码到缓冲区
    pub fn encode(&self, buf: &mut [u8]) {
        BigEndian::write_u32(&mut buf[0..4], self.magic);
        BigEndian::write_u32(&mut buf[4..8], self.block_type);
        BigEndian::write_u32(&mut buf[8..12], self.sequence);
    }

    /// magic 是否正确
    pub fn has_valid_magic(&self) -> bool {
        self.magic == JBD2_MAGIC
    }

    /// 块类型
    pub fn kind(&self) -> Option<BlockType> {
        BlockType::from_raw(self.block_type)
    }
}

/// Journal 超级块
///
/// 用户区（`users`）和填充区不解析，写回时由调用者保留原有字节。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// 块头
    pub header: BlockHeader,
    /// 日志设备块大小
    pub block_size: u32,
    /// 日志总块数
    pub maxlen: u32,
    /// 第一个日志块
    pub first: u32,
    /// 日志中第一个事务的序列号
    pub sequence: u32,
    /// 日志起始块号（0 表示日志干净）
    pub start: u32,
    /// 错误号
    pub errno: i32,
    /// 兼容特性
    pub feature_compat: CompatFeatures,
    /// 不兼容特性（保留未知位）
    pub feature_incompat: IncompatFeatures,
    /// 只读兼容特性（原始值）
    pub feature_ro_compat: u32,
    /// 日志 UUID
    pub uuid: [u8; UUID_SIZE],
    /// 共享该日志的文件系统数量
    pub nr_users: u32,
    /// 动态超级块位置
    pub dynsuper: u32,
    /// 单个事务最大块数
    pub max_transaction: u32,
    /// 单个事务最大数据块数
    pub max_trans_data: u32,
    /// 校验和类型
    pub checksum_type: u8,
    /// 超级块校验和
    pub checksum: u32,
}

impl Superblock {
    /// 创建新的 V2 超级块（日志干净，序列号从 1 开始）
    pub fn new(block_size: u32, maxlen: u32, uuid: [u8; UUID_SIZE]) -> Self {
        Self {
            header: BlockHeader::new(BlockType::SuperblockV2, 0),
            block_size,
            maxlen,
            first: 1,
            sequence: 1,
            start: 0,
            errno: 0,
            feature_compat: CompatFeatures::empty(),
            feature_incompat: IncompatFeatures::empty(),
            feature_ro_compat: 0,
            uuid,
            nr_users: 1,
            dynsuper: 0,
            max_transaction: 0,
            max_trans_data: 0,
            checksum_type: 0,
            checksum: 0,
        }
    }

    /// 从缓冲区解析超级块（只读取字段，不做校验）
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < SUPERBLOCK_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "superblock buffer too small",
            ));
        }

        let mut uuid = [0u8; UUID_SIZE];
        uuid.copy_from_slice(&buf[SB_UUID..SB_UUID + UUID_SIZE]);

        Ok(Self {
            header: BlockHeader::parse(buf),
            block_size: BigEndian::read_u32(&buf[SB_BLOCKSIZE..]),
            maxlen: BigEndian::read_u32(&buf[SB_MAXLEN..]),
            first: BigEndian::read_u32(&buf[SB_FIRST..]),
            sequence: BigEndian::read_u32(&buf[SB_SEQUENCE..]),
            start: BigEndian::read_u32(&buf[SB_START..]),
            errno: BigEndian::read_i32(&buf[SB_ERRNO..]),
            feature_compat: CompatFeatures::from_bits_retain(BigEndian::read_u32(
                &buf[SB_FEATURE_COMPAT..],
            )),
            feature_incompat: IncompatFeatures::from_bits_retain(BigEndian::read_u32(
                &buf[SB_FEATURE_INCOMPAT..],
            )),
            feature_ro_compat: BigEndian::read_u32(&buf[SB_FEATURE_RO_COMPAT..]),
            uuid,
            nr_users: BigEndian::read_u32(&buf[SB_NR_USERS..]),
            dynsuper: BigEndian::read_u32(&buf[SB_DYNSUPER..]),
            max_transaction: BigEndian::read_u32(&buf[SB_MAX_TRANSACTION..]),
            max_trans_data: BigEndian::read_u32(&buf[SB_MAX_TRANS_DATA..]),
            checksum_type: buf[SB_CHECKSUM_TYPE],
            checksum: BigEndian::read_u32(&buf[SB_CHECKSUM..]),
        })
    }

    /// 把字段编码到缓冲区（不改动填充区和用户区）
    pub fn encode(&self, buf: &mut [u8]) {
        self.header.encode(buf);
        BigEndian::write_u32(&mut buf[SB_BLOCKSIZE..], self.block_size);
        BigEndian::write_u32(&mut buf[SB_MAXLEN..], self.maxlen);
        BigEndian::write_u32(&mut buf[SB_FIRST..], self.first);
        BigEndian::write_u32(&mut buf[SB_SEQUENCE..], self.sequence);
        BigEndian::write_u32(&mut buf[SB_START..], self.start);
        BigEndian::write_i32(&mut buf[SB_ERRNO..], self.errno);
        BigEndian::write_u32(&mut buf[SB_FEATURE_COMPAT..], self.feature_compat.bits());
        BigEndian::write_u32(&mut buf[SB_FEATURE_INCOMPAT..], self.feature_incompat.bits());
        BigEndian::write_u32(&mut buf[SB_FEATURE_RO_COMPAT..], self.feature_ro_compat);
        buf[SB_UUID..SB_UUID + UUID_SIZE].copy_from_slice(&self.uuid);
        BigEndian::write_u32(&mut buf[SB_NR_USERS..], self.nr_users);
        BigEndian::write_u32(&mut buf[SB_DYNSUPER..], self.dynsuper);
        BigEndian::write_u32(&mut buf[SB_MAX_TRANSACTION..], self.max_transaction);
        BigEndian::write_u32(&mut buf[SB_MAX_TRANS_DATA..], self.max_trans_data);
        buf[SB_CHECKSUM_TYPE] = self.checksum_type;
        BigEndian::write_u32(&mut buf[SB_CHECKSUM..], self.checksum);
    }

    /// 是否为 V2 超级块
    pub fn is_v2(&self) -> bool {
        self.header.block_type == BlockType::SuperblockV2 as u32
    }

    /// 校验超级块与调用者提供的几何参数是否一致
    ///
    /// # 参数
    ///
    /// * `block_size` - 调用者提供的块大小
    /// * `log_size_bytes` - 日志文件字节长度
    ///
    /// # 返回
    ///
    /// * `DiskCorrupt` - magic、块类型、块大小或日志长度不符
    /// * `UnrecognizedVolume` - 存在未知或互斥的特性位
    pub fn validate(&self, block_size: u32, log_size_bytes: u64) -> Result<()> {
        if !self.header.has_valid_magic() {
            return Err(Error::new(ErrorKind::DiskCorrupt, "bad journal superblock magic"));
        }
        match self.header.kind() {
            Some(BlockType::SuperblockV1) | Some(BlockType::SuperblockV2) => {}
            _ => {
                return Err(Error::new(
                    ErrorKind::DiskCorrupt,
                    "unknown journal superblock version",
                ))
            }
        }
        if self.block_size != block_size {
            return Err(Error::new(
                ErrorKind::DiskCorrupt,
                "journal block size does not match volume",
            ));
        }
        if block_size == 0 || (self.maxlen as u64) < log_size_bytes / block_size as u64 {
            return Err(Error::new(ErrorKind::DiskCorrupt, "journal maxlen too small"));
        }
        if self.first == 0 || self.first >= self.maxlen {
            return Err(Error::new(ErrorKind::DiskCorrupt, "journal first block out of range"));
        }

        if !self.is_v2() {
            return Ok(());
        }

        let unknown_incompat = self.feature_incompat.bits() & !IncompatFeatures::all().bits();
        if unknown_incompat != 0 {
            log::error!("[jbd2] unknown incompat features {:#x}", unknown_incompat);
            return Err(Error::new(
                ErrorKind::UnrecognizedVolume,
                "unknown incompatible journal features",
            ));
        }
        if self.feature_ro_compat & !KNOWN_RO_COMPAT != 0 {
            log::error!("[jbd2] unknown ro_compat features {:#x}", self.feature_ro_compat);
            return Err(Error::new(
                ErrorKind::UnrecognizedVolume,
                "unknown read-only compatible journal features",
            ));
        }

        let v2 = self.feature_incompat.contains(IncompatFeatures::CSUM_V2);
        let v3 = self.feature_incompat.contains(IncompatFeatures::CSUM_V3);
        if v2 && v3 {
            return Err(Error::new(
                ErrorKind::UnrecognizedVolume,
                "journal has both csum v2 and v3",
            ));
        }
        if (v2 || v3) && self.feature_compat.contains(CompatFeatures::CHECKSUM) {
            return Err(Error::new(
                ErrorKind::UnrecognizedVolume,
                "journal has both v1 and v2/v3 checksums",
            ));
        }
        if (v2 || v3) && self.checksum_type != JBD2_CRC32C_CHKSUM {
            return Err(Error::new(
                ErrorKind::UnrecognizedVolume,
                "unknown journal checksum type",
            ));
        }
        Ok(())
    }
}

/// 描述符块中的一个 tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockTag {
    /// 目标块号（客户端文件中的块号）
    pub block: u64,
    /// 标志
    pub flags: TagFlags,
    /// 数据块校验和（v2 只有低 16 位）
    pub checksum: u32,
}

/// 由特性位决定的日志格式
///
/// 所有与特性相关的尺寸计算都集中在这里。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFormat {
    /// 块大小
    pub block_size: usize,
    /// 兼容特性
    pub compat: CompatFeatures,
    /// 不兼容特性
    pub incompat: IncompatFeatures,
}

impl LogFormat {
    /// 创建格式描述
    pub fn new(block_size: usize, compat: CompatFeatures, incompat: IncompatFeatures) -> Self {
        Self {
            block_size,
            compat,
            incompat,
        }
    }

    /// 从超级块得到格式（V1 超级块不带特性）
    pub fn from_superblock(sb: &Superblock) -> Self {
        if sb.is_v2() {
            Self::new(sb.block_size as usize, sb.feature_compat, sb.feature_incompat)
        } else {
            Self::new(
                sb.block_size as usize,
                CompatFeatures::empty(),
                IncompatFeatures::empty(),
            )
        }
    }

    /// 是否启用 64 位块号
    pub fn is_64bit(&self) -> bool {
        self.incompat.contains(IncompatFeatures::BIT64)
    }

    /// 是否启用校验和 v2
    pub fn csum_v2(&self) -> bool {
        self.incompat.contains(IncompatFeatures::CSUM_V2)
    }

    /// 是否启用校验和 v3
    pub fn csum_v3(&self) -> bool {
        self.incompat.contains(IncompatFeatures::CSUM_V3)
    }

    /// 是否启用 v2 或 v3 块校验和
    pub fn has_block_checksums(&self) -> bool {
        self.csum_v2() || self.csum_v3()
    }

    /// 是否允许撤销块
    pub fn has_revoke(&self) -> bool {
        self.incompat.contains(IncompatFeatures::REVOKE)
    }

    /// 描述符块/撤销块尾部校验和大小
    pub fn tail_size(&self) -> usize {
        if self.has_block_checksums() {
            TAIL_SIZE
        } else {
            0
        }
    }

    /// tag 字节数
    ///
    /// csum v3 固定 16 字节；否则 12 字节，csum v2 再加 2，非 64 位减 4。
    pub fn tag_bytes(&self) -> usize {
        if self.csum_v3() {
            return 16;
        }
        let mut size = 12;
        if self.csum_v2() {
            size += 2;
        }
        if self.is_64bit() {
            size
        } else {
            size - 4
        }
    }

    /// 撤销记录字节数
    pub fn revoke_record_size(&self) -> usize {
        if self.is_64bit() {
            8
        } else {
            4
        }
    }

    /// 描述符块中可用于 tag 的字节上限
    pub fn descriptor_limit(&self) -> usize {
        self.block_size - self.tail_size()
    }

    /// 每个撤销块能容纳的记录数
    pub fn revoke_capacity(&self) -> usize {
        (self.block_size - self.tail_size() - REVOKE_HEADER_SIZE) / self.revoke_record_size()
    }

    /// 解析一个 tag
    pub fn decode_tag(&self, buf: &[u8]) -> BlockTag {
        let low = BigEndian::read_u32(&buf[0..4]) as u64;
        if self.csum_v3() {
            let high = if self.is_64bit() {
                BigEndian::read_u32(&buf[8..12]) as u64
            } else {
                0
            };
            BlockTag {
                block: low | (high << 32),
                flags: TagFlags::from_bits_retain(BigEndian::read_u32(&buf[4..8])),
                checksum: BigEndian::read_u32(&buf[12..16]),
            }
        } else {
            let high = if self.is_64bit() {
                BigEndian::read_u32(&buf[8..12]) as u64
            } else {
                0
            };
            BlockTag {
                block: low | (high << 32),
                flags: TagFlags::from_bits_retain(BigEndian::read_u16(&buf[6..8]) as u32),
                checksum: BigEndian::read_u16(&buf[4..6]) as u32,
            }
        }
    }

    /// 编码一个 tag（写 `tag_bytes()` 字节）
    pub fn encode_tag(&self, tag: &BlockTag, buf: &mut [u8]) {
        let size = self.tag_bytes();
        buf[..size].fill(0);
        BigEndian::write_u32(&mut buf[0..4], tag.block as u32);
        let high = (tag.block >> 32) as u32;
        if self.csum_v3() {
            BigEndian::write_u32(&mut buf[4..8], tag.flags.bits());
            if self.is_64bit() {
                BigEndian::write_u32(&mut buf[8..12], high);
            }
            BigEndian::write_u32(&mut buf[12..16], tag.checksum);
        } else {
            BigEndian::write_u16(&mut buf[4..6], tag.checksum as u16);
            BigEndian::write_u16(&mut buf[6..8], tag.flags.bits() as u16);
            if self.is_64bit() {
                BigEndian::write_u32(&mut buf[8..12], high);
            }
        }
    }

    /// 遍历描述符块中的 tag
    pub fn descriptor_tags<'a>(&self, block: &'a [u8]) -> DescriptorTags<'a> {
        DescriptorTags {
            block,
            format: *self,
            offset: HEADER_SIZE,
            done: false,
        }
    }

    /// 解析撤销块，返回其中的撤销记录
    ///
    /// `r_count` 小于头部或超过可用字节数时返回 `DiskCorrupt`。
    pub fn revoke_records<'a>(&self, block: &'a [u8]) -> Result<RevokeRecords<'a>> {
        let count = BigEndian::read_u32(&block[HEADER_SIZE..REVOKE_HEADER_SIZE]) as usize;
        if count < REVOKE_HEADER_SIZE || count > self.block_size - self.tail_size() {
            log::error!("[jbd2] revoke block r_count {} out of range", count);
            return Err(Error::new(ErrorKind::DiskCorrupt, "revoke block count out of range"));
        }
        Ok(RevokeRecords {
            data: &block[REVOKE_HEADER_SIZE..count],
            record_size: self.revoke_record_size(),
        })
    }

    /// 编码撤销块（块头 + r_count + 记录），返回写入的字节数
    ///
    /// 记录数不能超过 [`LogFormat::revoke_capacity()`]。
    pub fn encode_revoke(&self, block: &mut [u8], sequence: u32, records: &[u64]) -> usize {
        block.fill(0);
        BlockHeader::new(BlockType::Revoke, sequence).encode(block);
        let size = self.revoke_record_size();
        let mut offset = REVOKE_HEADER_SIZE;
        for &record in records {
            if size == 8 {
                BigEndian::write_u64(&mut block[offset..offset + 8], record);
            } else {
                BigEndian::write_u32(&mut block[offset..offset + 4], record as u32);
            }
            offset += size;
        }
        BigEndian::write_u32(&mut block[HEADER_SIZE..REVOKE_HEADER_SIZE], offset as u32);
        offset
    }
}

/// 描述符块 tag 迭代器
///
/// 遇到 LAST_TAG 或下一个 tag 会越过可用区域时结束。
/// 没有 SAME_UUID 标志的 tag 后面跟着 16 字节 UUID。
#[derive(Debug, Clone)]
pub struct DescriptorTags<'a> {
    block: &'a [u8],
    format: LogFormat,
    offset: usize,
    done: bool,
}

impl Iterator for DescriptorTags<'_> {
    type Item = BlockTag;

    fn next(&mut self) -> Option<BlockTag> {
        let tag_bytes = self.format.tag_bytes();
        if self.done || self.offset + tag_bytes > self.format.descriptor_limit() {
            return None;
        }

        let tag = self.format.decode_tag(&self.block[self.offset..]);
        self.offset += tag_bytes;
        if !tag.flags.contains(TagFlags::SAME_UUID) {
            self.offset += UUID_SIZE;
        }
        if tag.flags.contains(TagFlags::LAST_TAG) {
            self.done = true;
        }
        Some(tag)
    }
}

/// 撤销记录迭代器
#[derive(Debug, Clone)]
pub struct RevokeRecords<'a> {
    data: &'a [u8],
    record_size: usize,
}

impl Iterator for RevokeRecords<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.data.len() < self.record_size {
            return None;
        }
        let (record, rest) = self.data.split_at(self.record_size);
        self.data = rest;
        Some(if self.record_size == 8 {
            BigEndian::read_u64(record)
        } else {
            BigEndian::read_u32(record) as u64
        })
    }
}

/// 提交块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitBlock {
    /// 块头
    pub header: BlockHeader,
    /// 校验和类型
    pub chksum_type: u8,
    /// 校验和长度
    pub chksum_size: u8,
    /// `h_chksum[0]`
    pub checksum: u32,
    /// 提交时间（秒）
    pub commit_sec: u64,
    /// 提交时间（纳秒）
    pub commit_nsec: u32,
}

impl CommitBlock {
    /// 创建提交块
    pub fn new(sequence: u32) -> Self {
        Self {
            header: BlockHeader::new(BlockType::Commit, sequence),
            chksum_type: 0,
            chksum_size: 0,
            checksum: 0,
            commit_sec: 0,
            commit_nsec: 0,
        }
    }

    /// 从缓冲区解析
    pub fn parse(buf: &[u8]) -> Self {
        Self {
            header: BlockHeader::parse(buf),
            chksum_type: buf[12],
            chksum_size: buf[13],
            checksum: BigEndian::read_u32(&buf[COMMIT_CHECKSUM_OFFSET..]),
            commit_sec: BigEndian::read_u64(&buf[48..56]),
            commit_nsec: BigEndian::read_u32(&buf[56..60]),
        }
    }

    /// 编码到缓冲区（整块先清零）
    pub fn encode(&self, buf: &mut [u8]) {
        buf.fill(0);
        self.header.encode(buf);
        buf[12] = self.chksum_type;
        buf[13] = self.chksum_size;
        BigEndian::write_u32(&mut buf[COMMIT_CHECKSUM_OFFSET..], self.checksum);
        BigEndian::write_u64(&mut buf[48..56], self.commit_sec);
        BigEndian::write_u32(&mut buf[56..60], self.commit_nsec);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    fn v2_superblock() -> Superblock {
        let mut sb = Superblock::new(4096, 1024, [7u8; 16]);
        sb.feature_incompat = IncompatFeatures::REVOKE | IncompatFeatures::CSUM_V3;
        sb.checksum_type = JBD2_CRC32C_CHKSUM;
        sb
    }

    #[test]
    fn test_header_roundtrip() {
        let mut buf = [0u8; 12];
        let header = BlockHeader::new(BlockType::Commit, 42);
        header.encode(&mut buf);

        assert_eq!(&buf[0..4], &[0xC0, 0x3B, 0x39, 0x98]);
        let parsed = BlockHeader::parse(&buf);
        assert!(parsed.has_valid_magic());
        assert_eq!(parsed.kind(), Some(BlockType::Commit));
        assert_eq!(parsed.sequence, 42);
    }

    #[test]
    fn test_superblock_field_offsets() {
        let mut buf = vec![0u8; SUPERBLOCK_SIZE];
        let mut sb = v2_superblock();
        sb.start = 9;
        sb.sequence = 0x0102_0304;
        sb.encode(&mut buf);

        assert_eq!(BigEndian::read_u32(&buf[0x0C..]), 4096);
        assert_eq!(BigEndian::read_u32(&buf[0x10..]), 1024);
        assert_eq!(BigEndian::read_u32(&buf[0x18..]), 0x0102_0304);
        assert_eq!(BigEndian::read_u32(&buf[0x1C..]), 9);
        assert_eq!(&buf[0x30..0x40], &[7u8; 16]);
        assert_eq!(buf[0x50], JBD2_CRC32C_CHKSUM);

        let parsed = Superblock::parse(&buf).unwrap();
        assert_eq!(parsed, sb);
    }

    #[test]
    fn test_superblock_parse_short_buffer() {
        let err = Superblock::parse(&[0u8; 100]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_validate_accepts_matching_geometry() {
        let sb = v2_superblock();
        assert!(sb.validate(4096, 1024 * 4096).is_ok());
        // 日志文件比 maxlen 小也可以
        assert!(sb.validate(4096, 512 * 4096).is_ok());
    }

    #[test]
    fn test_validate_geometry_mismatch() {
        let sb = v2_superblock();
        assert_eq!(sb.validate(1024, 1024 * 4096).unwrap_err().kind(), ErrorKind::DiskCorrupt);
        assert_eq!(sb.validate(4096, 2048 * 4096).unwrap_err().kind(), ErrorKind::DiskCorrupt);

        let mut bad_magic = v2_superblock();
        bad_magic.header.magic = 0xDEAD_BEEF;
        assert_eq!(bad_magic.validate(4096, 4096).unwrap_err().kind(), ErrorKind::DiskCorrupt);

        let mut bad_type = v2_superblock();
        bad_type.header.block_type = BlockType::Commit as u32;
        assert_eq!(bad_type.validate(4096, 4096).unwrap_err().kind(), ErrorKind::DiskCorrupt);

        let mut bad_first = v2_superblock();
        bad_first.first = 0;
        assert_eq!(bad_first.validate(4096, 4096).unwrap_err().kind(), ErrorKind::DiskCorrupt);
    }

    #[test]
    fn test_validate_unknown_features() {
        let mut sb = v2_superblock();
        sb.feature_incompat = IncompatFeatures::from_bits_retain(0x100);
        assert_eq!(sb.validate(4096, 4096).unwrap_err().kind(), ErrorKind::UnrecognizedVolume);

        let mut sb = v2_superblock();
        sb.feature_ro_compat = 0x1;
        assert_eq!(sb.validate(4096, 4096).unwrap_err().kind(), ErrorKind::UnrecognizedVolume);

        let mut sb = v2_superblock();
        sb.feature_incompat |= IncompatFeatures::CSUM_V2;
        assert_eq!(sb.validate(4096, 4096).unwrap_err().kind(), ErrorKind::UnrecognizedVolume);

        let mut sb = v2_superblock();
        sb.checksum_type = 1;
        assert_eq!(sb.validate(4096, 4096).unwrap_err().kind(), ErrorKind::UnrecognizedVolume);
    }

    #[test]
    fn test_v1_superblock_ignores_features() {
        let mut sb = Superblock::new(1024, 64, [0u8; 16]);
        sb.header.block_type = BlockType::SuperblockV1 as u32;
        sb.feature_incompat = IncompatFeatures::from_bits_retain(0xFFFF_0000);
        assert!(sb.validate(1024, 64 * 1024).is_ok());

        let format = LogFormat::from_superblock(&sb);
        assert_eq!(format.incompat, IncompatFeatures::empty());
        assert_eq!(format.tag_bytes(), 8);
    }

    #[test]
    fn test_tag_bytes() {
        let f = |incompat| LogFormat::new(4096, CompatFeatures::empty(), incompat);
        assert_eq!(f(IncompatFeatures::empty()).tag_bytes(), 8);
        assert_eq!(f(IncompatFeatures::BIT64).tag_bytes(), 12);
        assert_eq!(f(IncompatFeatures::CSUM_V2).tag_bytes(), 10);
        assert_eq!(f(IncompatFeatures::CSUM_V2 | IncompatFeatures::BIT64).tag_bytes(), 14);
        assert_eq!(f(IncompatFeatures::CSUM_V3).tag_bytes(), 16);
        assert_eq!(f(IncompatFeatures::CSUM_V3 | IncompatFeatures::BIT64).tag_bytes(), 16);

        assert_eq!(f(IncompatFeatures::empty()).revoke_record_size(), 4);
        assert_eq!(f(IncompatFeatures::BIT64).revoke_record_size(), 8);
        assert_eq!(f(IncompatFeatures::CSUM_V3).tail_size(), 4);
    }

    #[test]
    fn test_tag_layouts() {
        // v3 tag: blocknr | flags32 | high | csum32
        let v3 = LogFormat::new(
            4096,
            CompatFeatures::empty(),
            IncompatFeatures::CSUM_V3 | IncompatFeatures::BIT64,
        );
        let tag = BlockTag {
            block: 0x0000_0001_0000_0002,
            flags: TagFlags::ESCAPE | TagFlags::LAST_TAG,
            checksum: 0xAABB_CCDD,
        };
        let mut buf = [0u8; 16];
        v3.encode_tag(&tag, &mut buf);
        assert_eq!(BigEndian::read_u32(&buf[0..4]), 2);
        assert_eq!(BigEndian::read_u32(&buf[4..8]), 0x9);
        assert_eq!(BigEndian::read_u32(&buf[8..12]), 1);
        assert_eq!(BigEndian::read_u32(&buf[12..16]), 0xAABB_CCDD);
        assert_eq!(v3.decode_tag(&buf), tag);

        // 旧式 tag: blocknr | csum16 | flags16
        let legacy = LogFormat::new(4096, CompatFeatures::empty(), IncompatFeatures::CSUM_V2);
        let tag = BlockTag {
            block: 77,
            flags: TagFlags::SAME_UUID,
            checksum: 0x1234,
        };
        let mut buf = [0u8; 10];
        legacy.encode_tag(&tag, &mut buf);
        assert_eq!(BigEndian::read_u16(&buf[4..6]), 0x1234);
        assert_eq!(BigEndian::read_u16(&buf[6..8]), 0x2);
        assert_eq!(legacy.decode_tag(&buf), tag);
    }

    #[test]
    fn test_tag_high_bits_ignored_without_64bit() {
        let format = LogFormat::new(1024, CompatFeatures::empty(), IncompatFeatures::CSUM_V3);
        let mut buf = [0u8; 16];
        BigEndian::write_u32(&mut buf[0..4], 5);
        BigEndian::write_u32(&mut buf[8..12], 0xFFFF_FFFF);
        assert_eq!(format.decode_tag(&buf).block, 5);
    }

    #[test]
    fn test_descriptor_tags_two_tags() {
        // 第一个 tag 带 UUID，第二个 SAME_UUID|LAST_TAG
        let format = LogFormat::new(1024, CompatFeatures::empty(), IncompatFeatures::empty());
        let mut block = vec![0u8; 1024];
        BlockHeader::new(BlockType::Descriptor, 3).encode(&mut block);

        let mut offset = HEADER_SIZE;
        format.encode_tag(&BlockTag { block: 100, ..Default::default() }, &mut block[offset..]);
        offset += format.tag_bytes() + UUID_SIZE;
        format.encode_tag(
            &BlockTag {
                block: 200,
                flags: TagFlags::SAME_UUID | TagFlags::LAST_TAG,
                checksum: 0,
            },
            &mut block[offset..],
        );
        // LAST_TAG 之后的垃圾不应被读到
        offset += format.tag_bytes();
        format.encode_tag(&BlockTag { block: 300, ..Default::default() }, &mut block[offset..]);

        let blocks: Vec<u64> = format.descriptor_tags(&block).map(|t| t.block).collect();
        assert_eq!(blocks, vec![100, 200]);
    }

    #[test]
    fn test_descriptor_tags_stop_at_capacity() {
        // 全部 SAME_UUID 且没有 LAST_TAG：数量由可用区域决定
        let format = LogFormat::new(1024, CompatFeatures::empty(), IncompatFeatures::CSUM_V3);
        let mut block = vec![0u8; 1024];
        let mut offset = HEADER_SIZE;
        while offset + 16 <= 1024 {
            format.encode_tag(
                &BlockTag { block: 1, flags: TagFlags::SAME_UUID, checksum: 0 },
                &mut block[offset..],
            );
            offset += 16;
        }
        // (1024 - 4 - 12) / 16 = 63
        assert_eq!(format.descriptor_tags(&block).count(), 63);
    }

    #[test]
    fn test_revoke_block() {
        let format = LogFormat::new(1024, CompatFeatures::empty(), IncompatFeatures::BIT64);
        let mut block = vec![0u8; 1024];
        let used = format.encode_revoke(&mut block, 8, &[5, 0x1_0000_0009]);
        assert_eq!(used, 16 + 16);

        let header = BlockHeader::parse(&block);
        assert_eq!(header.kind(), Some(BlockType::Revoke));
        let records: Vec<u64> = format.revoke_records(&block).unwrap().collect();
        assert_eq!(records, vec![5, 0x1_0000_0009]);
        assert_eq!(format.revoke_capacity(), (1024 - 16) / 8);
    }

    #[test]
    fn test_revoke_count_out_of_range() {
        let format = LogFormat::new(1024, CompatFeatures::empty(), IncompatFeatures::CSUM_V2);
        let mut block = vec![0u8; 1024];
        format.encode_revoke(&mut block, 1, &[1]);
        BigEndian::write_u32(&mut block[12..16], 1024);
        assert!(format.revoke_records(&block).unwrap_err().is_corrupt());

        BigEndian::write_u32(&mut block[12..16], 8);
        assert!(format.revoke_records(&block).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_commit_block_layout() {
        let mut buf = vec![0xFFu8; 1024];
        let mut commit = CommitBlock::new(77);
        commit.chksum_type = JBD2_CRC32C_CHKSUM;
        commit.chksum_size = JBD2_CRC32_CHKSUM_SIZE;
        commit.checksum = 0x0102_0304;
        commit.commit_sec = 1_700_000_000;
        commit.encode(&mut buf);

        assert_eq!(BigEndian::read_u32(&buf[16..20]), 0x0102_0304);
        assert_eq!(buf[100], 0);
        assert_eq!(CommitBlock::parse(&buf), commit);
    }
}
