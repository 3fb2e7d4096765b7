//! dbgkit デバッガのコア機能
//!
//! このクレートは、デバッガの中核となるロジックを提供します。
//! バックエンド共通のデバッガ契約（[`DebuggerContract`]）と、ptraceによる
//! ローカルプロセス制御、ソケット経由のリモートカーネルデバッグ、
//! 割り込みシグナルの中継、コマンドループ用のセッションを統合します。

pub mod breakpoint;
pub mod command;
pub mod contract;
pub mod errors;
pub mod interrupt;
pub mod parse;
pub mod process_control;
pub mod remote;
pub mod session;
pub mod target;

pub use breakpoint::{Breakpoint, BreakpointTable};
pub use command::Command;
pub use contract::{AttachTarget, BackendKind, BreakpointLocation, DebuggerContract, StopReason};
pub use errors::{AttachError, BreakpointError, DebugError};
pub use interrupt::InterruptRelay;
pub use process_control::ProcessControlBackend;
pub use remote::{PendingProtocol, RemoteDebugHeader, RemoteKernelBackend, RemoteProtocol, TextProtocol};
pub use session::{Outcome, Session};
pub use target::{DebugTarget, ProcessId, TargetState};

// 他のクレートから使用するために再エクスポート
pub use dbgkit_target::TrapEncoding;

/// デバッガの結果型
pub type Result<T> = std::result::Result<T, DebugError>;
