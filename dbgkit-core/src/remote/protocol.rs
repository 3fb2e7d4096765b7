//! リモートカーネルのコマンドプロトコル
//!
//! ヘッダのレイアウト以外のコマンドのエンコーディングは上流で定まっていないため、
//! プロトコルは差し替え可能なトレイトにしています。既定の [`PendingProtocol`] は
//! すべてのコマンドを `NotImplemented` で失敗させます。

use crate::contract::BreakpointLocation;
use crate::errors::DebugError;
use crate::Result;

/// リモートエージェントに送るコマンド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand<'a> {
    /// 接続直後の挨拶
    Hello { kernel: &'a str },
    BreakAt(&'a BreakpointLocation),
    ClearBreakpoint(u64),
    Break,
    Continue,
    Step,
    Detach,
}

impl RemoteCommand<'_> {
    /// コマンド名
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCommand::Hello { .. } => "attach",
            RemoteCommand::BreakAt(_) => "break at",
            RemoteCommand::ClearBreakpoint(_) => "clear breakpoint",
            RemoteCommand::Break => "break",
            RemoteCommand::Continue => "continue",
            RemoteCommand::Step => "step",
            RemoteCommand::Detach => "detach",
        }
    }
}

/// コマンドをワイヤ上のバイト列にエンコードする
pub trait RemoteProtocol {
    fn encode(&self, command: &RemoteCommand<'_>) -> Result<Vec<u8>>;
}

/// コマンドプロトコルが未定義であることを明示するプロトコル
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingProtocol;

impl RemoteProtocol for PendingProtocol {
    fn encode(&self, command: &RemoteCommand<'_>) -> Result<Vec<u8>> {
        Err(DebugError::NotImplemented(command.name()))
    }
}

/// NeKernelのテキストフレーム
///
/// `VMK1.0.0;` に続けて `;KEY=VALUE;` を並べ、`\r` で終端します。
/// フレームは256バイトまでです。
#[derive(Debug, Clone, Copy, Default)]
pub struct TextProtocol;

impl TextProtocol {
    pub const MAGIC: &'static str = "VMK1.0.0;";
    pub const MAX_FRAME_LEN: usize = 256;
    /// カーネルがハンドオーバーを開始するシンボル
    pub const ENTRY_SYMBOL: &'static str = "$HANDOVER_START";

    fn frame(body: &str) -> Vec<u8> {
        format!("{};{}\r", Self::MAGIC, body).into_bytes()
    }
}

impl RemoteProtocol for TextProtocol {
    fn encode(&self, command: &RemoteCommand<'_>) -> Result<Vec<u8>> {
        let frame = match command {
            RemoteCommand::Hello { .. } => Self::frame(""),
            RemoteCommand::BreakAt(BreakpointLocation::Symbol(name)) => {
                Self::frame(&format!("SYM={};", name))
            }
            RemoteCommand::BreakAt(BreakpointLocation::Entry) => {
                Self::frame(&format!("SYM={};", Self::ENTRY_SYMBOL))
            }
            RemoteCommand::Break => Self::frame("BRK=1;"),
            RemoteCommand::Continue => Self::frame("CONT=1;"),
            RemoteCommand::Detach => Self::frame("DTCH=1;"),
            RemoteCommand::BreakAt(BreakpointLocation::Address(_))
            | RemoteCommand::ClearBreakpoint(_)
            | RemoteCommand::Step => return Err(DebugError::NotImplemented(command.name())),
        };

        if frame.len() > Self::MAX_FRAME_LEN {
            return Err(DebugError::Transport(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("command frame of {} bytes exceeds {} bytes", frame.len(), Self::MAX_FRAME_LEN),
            )));
        }
        Ok(frame)
    }
}
