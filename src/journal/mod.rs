//! JBD2 风格的预写日志引擎
//!
//! 为一个客户端文件（卷）提供崩溃一致性：修改先以事务为单位写进环形日志，
//! 提交后再写回客户端文件；挂载时重放已提交但未写回的事务。
//!
//! # 架构概述
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Filesystem Layer                        │
//! │     txn_start / txn_write_block / txn_stop / flush        │
//! └───────────────────────┬──────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                    JournalHandle                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐   │
//! │  │ Transaction  │  │    Commit    │  │  Checkpoint  │   │
//! │  │  (RUNNING →  │  │ (descriptor, │  │ (write back, │   │
//! │  │   LOCKED)    │  │ data, commit)│  │ reclaim log) │   │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘   │
//! │         │   ┌─────────────┴──────┐           │           │
//! │         └──▶│ BlockIndex (LBCB / │◀──────────┘           │
//! │             │  revoke entries)   │                       │
//! │             └────────────────────┘                       │
//! │  ┌──────────────────────────────────────────────────┐    │
//! │  │ Recovery: SCAN → SCAN_REVOKE → REPLAY            │    │
//! │  └──────────────────────────────────────────────────┘    │
//! │  ┌──────────────────────┐  ┌─────────────────────────┐   │
//! │  │ format (codec)       │  │ checksum (CRC32C v2/v3) │   │
//! │  └──────────────────────┘  └─────────────────────────┘   │
//! └───────────────────────────┬──────────────────────────────┘
//!                             │
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                BufferCache (pin / unpin)                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # 核心组件
//!
//! - [`format`] - JBD2 磁盘格式编解码
//! - [`checksum`] - 块校验和
//! - [`block_index`] - 引用计数块索引
//! - [`JournalHandle`] - 每个卷的 journal 状态与事务接口
//! - [`Transaction`] - 单个事务
//! - [`RecoveryInfo`] - 恢复结果
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use jbd2_core::journal::{JournalConfig, JournalHandle};
//!
//! // 1. mount：打开并重放
//! let mut journal = JournalHandle::open_journal(
//!     cache, log_file, client_file, log_size, 4096, JournalConfig::default(),
//! )?;
//! journal.replay_journal()?;
//!
//! // 2. 事务
//! journal.txn_start(0)?;
//! journal.txn_write_block(100, |data| data[0] = 0x42)?;
//! journal.txn_stop()?;
//!
//! // 3. umount
//! let cache = journal.close_journal()?;
//! ```

pub mod block_index;
pub mod checksum;
mod checkpoint;
mod commit;
pub mod config;
pub mod format;
mod handle;
pub mod recovery;
pub mod transaction;

#[cfg(test)]
pub(crate) mod test_utils;

pub use block_index::{BlockIndex, IndexRef, LoggedBuffer, RevokeEntry};
pub use checksum::{ChecksumFn, JournalChecksum};
pub use config::JournalConfig;
pub use format::{LogFormat, Superblock};
pub use handle::JournalHandle;
pub use recovery::{RecoveryInfo, RecoveryPass, RecoveryStats};
pub use transaction::{tid_geq, tid_gt, Tid, Transaction, TxnState};
