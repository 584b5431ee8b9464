//! jbd2_core: JBD2 风格的预写日志引擎
//!
//! 为一个客户端文件（卷）提供崩溃一致性：
//! - **事务**：修改以事务为单位先写进环形日志，提交后再写回客户端文件
//! - **恢复**：挂载时按 SCAN → SCAN_REVOKE → REPLAY 重放已提交的事务
//! - **磁盘格式**：兼容 JBD2 的超级块、描述符块、提交块和撤销块，
//!   支持 64 位块号与 CRC32C v2/v3 校验和
//!
//! 引擎本身不做 I/O，所有块都通过 [`cache::BufferCache`] 的 pin/unpin 接口访问。
//!
//! # 示例
//!
//! ```rust,ignore
//! use jbd2_core::cache::{LruBufferCache, MemFile};
//! use jbd2_core::journal::{JournalConfig, JournalHandle};
//!
//! fn main() -> jbd2_core::Result<()> {
//!     let mut cache = LruBufferCache::new(256, 4096);
//!     let log = cache.attach(MemFile::from_vec(log_image));
//!     let volume = cache.attach(MemFile::new(volume_size));
//!
//!     let mut journal = JournalHandle::open_journal(
//!         &mut cache, log, volume, log_size, 4096, JournalConfig::default(),
//!     )?;
//!     journal.replay_journal()?;
//!
//!     journal.txn_start(0)?;
//!     journal.txn_write_block(42, |data| data.fill(0))?;
//!     journal.txn_stop()?;
//!
//!     journal.close_journal()?;
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`cache`] - 缓冲区缓存接口与 LRU 实现
//! - [`journal`] - 日志格式、事务、检查点与恢复

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 缓冲区缓存
pub mod cache;

/// Journal (JBD2) 系统
pub mod journal;

/// CRC32C 校验和计算
pub(crate) mod crc;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// Cache
pub use cache::{
    BackingFile, BufferCache, CacheBuffer, CacheFlags, CacheStats, FileId, LruBufferCache,
    MemFile, PinToken, DEFAULT_CACHE_SIZE,
};

// Journal
pub use journal::{
    JournalConfig, JournalHandle, RecoveryInfo, RecoveryStats, Superblock, Tid, Transaction,
    TxnState,
};
