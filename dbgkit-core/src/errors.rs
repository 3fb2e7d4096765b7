//! エラー型

use crate::target::ProcessId;
use thiserror::Error;

/// デバッガ操作のエラー
#[derive(Debug, Error)]
pub enum DebugError {
    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Breakpoint(#[from] BreakpointError),

    #[error("Not attached to a process")]
    NotAttached,

    #[error("Already attached to process {0}")]
    AlreadyAttached(ProcessId),

    /// リモートバックエンドのソケットレベルの失敗
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// コマンドプロトコルが定義されていない操作
    #[error("'{0}' is not implemented by the remote kernel protocol")]
    NotImplemented(&'static str),

    /// アタッチ・ブレークポイント以外でトレース操作が失敗した
    #[error("Process control failed: {0:#}")]
    Control(anyhow::Error),

    #[error("Failed to install signal handler: {0}")]
    Signal(nix::errno::Errno),
}

/// アタッチの失敗理由
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("Process {0} not found")]
    NotFound(ProcessId),

    #[error("Permission denied to trace process {0}")]
    PermissionDenied(ProcessId),

    #[error("Failed to spawn target: {0}")]
    Spawn(String),

    #[error("This backend cannot attach to {0}")]
    Unsupported(&'static str),

    #[error("Attach failed: {0}")]
    Failed(String),
}

impl AttachError {
    /// OSのエラーをアタッチエラーに変換する
    pub(crate) fn from_os(pid: ProcessId, error: anyhow::Error) -> Self {
        use nix::errno::Errno;

        match error.downcast_ref::<Errno>() {
            Some(Errno::ESRCH) => AttachError::NotFound(pid),
            Some(Errno::EPERM) | Some(Errno::EACCES) => AttachError::PermissionDenied(pid),
            _ => AttachError::Failed(format!("{:#}", error)),
        }
    }
}

/// ブレークポイント操作の失敗理由
#[derive(Debug, Error)]
pub enum BreakpointError {
    #[error("Cannot read target memory at 0x{address:x}: {reason}")]
    Read { address: u64, reason: String },

    #[error("Cannot write target memory at 0x{address:x}: {reason}")]
    Write { address: u64, reason: String },

    /// 有効でないブレークポイントを元に戻そうとした
    #[error("No active breakpoint at 0x{0:x}")]
    NotArmed(u64),

    #[error("No breakpoint at 0x{0:x}")]
    Unknown(u64),

    #[error("Cannot resolve symbol '{0}': no symbol information")]
    SymbolUnresolved(String),

    #[error("Entry address of the target is unavailable")]
    EntryUnavailable,
}
