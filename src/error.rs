//! 错误类型定义
//!
//! 提供 journal 引擎各操作的错误类型。

use core::fmt;

/// journal 操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 内存或索引容量耗尽
    ResourceExhausted,
    /// 磁盘结构损坏（校验和/魔数不匹配，或超级块与几何参数不符）
    DiskCorrupt,
    /// 存在未知的必需特性位，拒绝挂载
    UnrecognizedVolume,
    /// 对后备文件的 pin/读/写失败
    UnexpectedIo,
    /// 非阻塞请求无法立即完成，调用者需在可阻塞上下文中重试
    CantWait,
    /// 无效参数
    InvalidInput,
    /// 无效状态
    InvalidState,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// 是否为磁盘损坏错误
    pub fn is_corrupt(&self) -> bool {
        self.kind == ErrorKind::DiskCorrupt
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
