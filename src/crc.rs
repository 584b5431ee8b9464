//! CRC32C 校验和计算
//!
//! 为 journal 元数据块和数据块提供 CRC32C 校验和计算功能。
//!
//! JBD2 使用的是"原始" CRC32C：调用方给出的初值直接作为寄存器状态，
//! 结果也不做最终取反。`crc32c` crate 的 `crc32c_append` 在进出时各取反一次，
//! 因此这里两端再取反一次以抵消。

/// CRC32 初始值（校验和种子由 `crc32c_append(JBD_CRC32_INIT, uuid)` 得到）
pub const JBD_CRC32_INIT: u32 = !0u32;

/// 计算 CRC32C 校验和（追加模式）
///
/// # 参数
/// * `crc` - 初始 CRC 值
/// * `data` - 要计算校验和的数据
///
/// # 返回
/// 更新后的 CRC32C 值
#[inline]
pub fn crc32c_append(crc: u32, data: &[u8]) -> u32 {
    !crc32c::crc32c_append(!crc, data)
}
