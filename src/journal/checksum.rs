//! Journal 校验和计算
//!
//! 只在 csum v2/v3 启用时生效，未启用时所有校验都视为通过、所有写入
//! 都不做改动。
//!
//! | 对象        | 计算方式                                              |
//! |-------------|-------------------------------------------------------|
//! | 种子        | `crc(!0, uuid)`                                       |
//! | 描述符/撤销 | `crc(seed, 整块)`，尾部 4 字节校验和字段视为 0        |
//! | 提交块      | `crc(seed, 整块)`，`h_chksum[0]` 视为 0              |
//! | 数据块      | `crc(crc(seed, be32(sequence)), 数据块)`，v2 截断为 16 位 |
//! | 超级块      | `crc(!0, sb[0..1024])`，`s_checksum` 视为 0          |

use super::format::{
    BlockTag, LogFormat, COMMIT_CHECKSUM_OFFSET, SB_CHECKSUM, SUPERBLOCK_SIZE, TAIL_SIZE,
};
use crate::crc::JBD_CRC32_INIT;
use byteorder::{BigEndian, ByteOrder};

/// 校验和原语：`(初值, 数据) -> 新值`
pub type ChecksumFn = fn(u32, &[u8]) -> u32;

const ZERO_FIELD: [u8; 4] = [0u8; 4];

/// 计算一段数据的校验和，其中 `[field, field + 4)` 按 0 计算
fn csum_with_zeroed_field(csum: ChecksumFn, seed: u32, data: &[u8], field: usize) -> u32 {
    let crc = csum(seed, &data[..field]);
    let crc = csum(crc, &ZERO_FIELD);
    csum(crc, &data[field + 4..])
}

/// 每个 journal 的校验和上下文
#[derive(Clone, Copy)]
pub struct JournalChecksum {
    enabled: bool,
    v3: bool,
    seed: u32,
    csum: ChecksumFn,
}

impl core::fmt::Debug for JournalChecksum {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JournalChecksum")
            .field("enabled", &self.enabled)
            .field("v3", &self.v3)
            .field("seed", &format_args!("{:#010x}", self.seed))
            .finish()
    }
}

impl JournalChecksum {
    /// 根据日志格式和 UUID 创建校验和上下文
    ///
    /// # 参数
    ///
    /// * `format` - 日志格式（决定是否启用以及 v2/v3）
    /// * `uuid` - Journal UUID
    /// * `csum` - CRC32C 原语
    pub fn new(format: &LogFormat, uuid: &[u8; 16], csum: ChecksumFn) -> Self {
        Self {
            enabled: format.has_block_checksums(),
            v3: format.csum_v3(),
            seed: csum(JBD_CRC32_INIT, uuid),
            csum,
        }
    }

    /// 校验和种子
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// 是否启用块校验和
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn tail_csum(&self, block: &[u8]) -> u32 {
        csum_with_zeroed_field(self.csum, self.seed, block, block.len() - TAIL_SIZE)
    }

    /// 验证描述符块尾部校验和
    pub fn verify_descriptor(&self, block: &[u8]) -> bool {
        if !self.enabled {
            return true;
        }
        let stored = BigEndian::read_u32(&block[block.len() - TAIL_SIZE..]);
        stored == self.tail_csum(block)
    }

    /// 写入描述符块尾部校验和
    pub fn stamp_descriptor(&self, block: &mut [u8]) {
        if !self.enabled {
            return;
        }
        let csum = self.tail_csum(block);
        let len = block.len();
        BigEndian::write_u32(&mut block[len - TAIL_SIZE..], csum);
    }

    /// 验证撤销块尾部校验和（布局与描述符块相同）
    pub fn verify_revoke(&self, block: &[u8]) -> bool {
        self.verify_descriptor(block)
    }

    /// 写入撤销块尾部校验和
    pub fn stamp_revoke(&self, block: &mut [u8]) {
        self.stamp_descriptor(block)
    }

    fn commit_csum(&self, block: &[u8]) -> u32 {
        csum_with_zeroed_field(self.csum, self.seed, block, COMMIT_CHECKSUM_OFFSET)
    }

    /// 验证提交块校验和
    pub fn verify_commit(&self, block: &[u8]) -> bool {
        if !self.enabled {
            return true;
        }
        let stored = BigEndian::read_u32(&block[COMMIT_CHECKSUM_OFFSET..]);
        stored == self.commit_csum(block)
    }

    /// 写入提交块校验和
    pub fn stamp_commit(&self, block: &mut [u8]) {
        if !self.enabled {
            return;
        }
        let csum = self.commit_csum(block);
        BigEndian::write_u32(&mut block[COMMIT_CHECKSUM_OFFSET..], csum);
    }

    /// 计算数据块校验和（写入 tag 的值）
    ///
    /// v2 只保留低 16 位。
    pub fn data_csum(&self, sequence: u32, data: &[u8]) -> u32 {
        if !self.enabled {
            return 0;
        }
        let crc = (self.csum)(self.seed, &sequence.to_be_bytes());
        let crc = (self.csum)(crc, data);
        if self.v3 {
            crc
        } else {
            crc & 0xFFFF
        }
    }

    /// 用 tag 中保存的校验和验证数据块
    pub fn verify_data(&self, tag: &BlockTag, sequence: u32, data: &[u8]) -> bool {
        !self.enabled || tag.checksum == self.data_csum(sequence, data)
    }
}

/// 计算超级块校验和
pub fn superblock_csum(csum: ChecksumFn, sb: &[u8]) -> u32 {
    csum_with_zeroed_field(csum, JBD_CRC32_INIT, &sb[..SUPERBLOCK_SIZE], SB_CHECKSUM)
}

/// 验证超级块校验和（未启用 v2/v3 时总是通过）
pub fn verify_superblock(format: &LogFormat, csum: ChecksumFn, sb: &[u8]) -> bool {
    if !format.has_block_checksums() {
        return true;
    }
    BigEndian::read_u32(&sb[SB_CHECKSUM..]) == superblock_csum(csum, sb)
}

/// 写入超级块校验和
pub fn stamp_superblock(format: &LogFormat, csum: ChecksumFn, sb: &mut [u8]) {
    if !format.has_block_checksums() {
        return;
    }
    let value = superblock_csum(csum, sb);
    BigEndian::write_u32(&mut sb[SB_CHECKSUM..], value);
}
