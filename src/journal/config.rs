//! Journal 配置

use super::checksum::ChecksumFn;

/// Journal 配置
///
/// 以 [`Default`] 为基础按需修改：
///
/// ```rust,ignore
/// let config = JournalConfig {
///     checkpoint_threshold: 50,
///     ..JournalConfig::default()
/// };
/// ```
#[derive(Debug, Clone, Copy)]
pub struct JournalConfig {
    /// pin 缓冲区时是否允许阻塞；为 false 时需要 I/O 的 pin 返回 `CantWait`
    pub pin_wait: bool,
    /// 日志使用率超过该百分比时，`txn_stop` 触发 flush（0 表示关闭）
    pub checkpoint_threshold: u32,
    /// 日志缓冲区索引条目上限
    pub max_index_entries: Option<usize>,
    /// CRC32C 原语
    pub checksum: ChecksumFn,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            pin_wait: true,
            checkpoint_threshold: 75,
            max_index_entries: None,
            checksum: crate::crc::crc32c_append,
        }
    }
}
