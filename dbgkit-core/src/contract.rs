//! デバッガ契約
//!
//! ローカルプロセス制御とリモートカーネルデバッグの両方のバックエンドが満たす
//! 操作の集合です。呼び出し側は `Box<dyn DebuggerContract>` だけに依存し、
//! どちらのバックエンドかを知る必要はありません。

use crate::breakpoint::BreakpointTable;
use crate::parse::parse_address;
use crate::target::{DebugTarget, ProcessId};
use crate::Result;
use nix::sys::signal::Signal;
use std::net::SocketAddr;
use std::path::PathBuf;

/// アタッチ先
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachTarget {
    /// 実行可能ファイルを起動してトレースする
    Spawn { program: PathBuf, args: Vec<String> },
    /// 既存のプロセスにアタッチする
    Process(ProcessId),
    /// リモートのカーネルデバッグエージェントに接続する
    Remote { kernel: String, addr: SocketAddr },
}

/// ブレークポイントの位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointLocation {
    Address(u64),
    Symbol(String),
    /// プログラムのエントリポイント
    Entry,
}

impl BreakpointLocation {
    /// オペレータの入力をパースする
    ///
    /// `0x` で始まるか、数字で始まる16進数はアドレス、`entry` はエントリポイント、
    /// それ以外はシンボル名として扱います。
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input == "entry" {
            return BreakpointLocation::Entry;
        }

        let looks_like_address = input.starts_with("0x")
            || input.starts_with("0X")
            || input.starts_with(|c: char| c.is_ascii_digit());

        match parse_address(input) {
            Ok(addr) if looks_like_address => BreakpointLocation::Address(addr),
            _ => BreakpointLocation::Symbol(input.to_string()),
        }
    }
}

impl std::fmt::Display for BreakpointLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakpointLocation::Address(addr) => write!(f, "0x{:x}", addr),
            BreakpointLocation::Symbol(name) => write!(f, "{}", name),
            BreakpointLocation::Entry => write!(f, "entry"),
        }
    }
}

/// 停止理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 有効なブレークポイントのトラップで停止した（PCはアドレスに巻き戻し済み）
    Breakpoint { address: u64 },
    /// ブレークポイント以外のSIGTRAP
    Trap { pc: u64 },
    /// ステップ実行完了
    Step { pc: u64 },
    /// 割り込み要求（SIGSTOP / SIGINT）で停止した
    Interrupted,
    /// その他のシグナルで停止した（次の再開時に配送される）
    Signal(Signal),
    /// プロセス終了
    Exited(i32),
    /// シグナルによる強制終了
    Killed(Signal),
    /// トランスポートが停止を報告しない
    Unreported,
    /// その他の停止
    Other,
}

impl StopReason {
    /// ブレークポイントヒットか
    pub fn is_breakpoint(&self) -> bool {
        matches!(self, StopReason::Breakpoint { .. })
    }

    /// プロセスが終了したか
    pub fn is_exit(&self) -> bool {
        matches!(self, StopReason::Exited(_) | StopReason::Killed(_))
    }
}

/// バックエンドの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    ProcessControl,
    RemoteKernel,
}

/// デバッガ契約
///
/// すべての操作は成功・失敗を `Result` で返します。`detach` だけは
/// 個々のブレークポイントの復元に失敗しても最後まで進みます。
pub trait DebuggerContract {
    /// バックエンドの種類
    fn kind(&self) -> BackendKind;

    /// トレースを開始する
    ///
    /// 既にアタッチ中なら `DebugError::AlreadyAttached` を返します。
    fn attach(&mut self, target: &AttachTarget) -> Result<ProcessId>;

    /// ブレークポイントを設定する（既に有効なら何もしない）
    ///
    /// 解決したアドレスを返します。位置を解決せずにそのまま転送するバックエンドは
    /// `None` を返します。
    fn set_breakpoint(&mut self, location: &BreakpointLocation) -> Result<Option<u64>>;

    /// ブレークポイントを解除し、テーブルから削除する
    fn remove_breakpoint(&mut self, address: u64) -> Result<()>;

    /// ブレークポイントを解除し、無効なエントリとして残す
    fn disable_breakpoint(&mut self, address: u64) -> Result<()>;

    /// 実行中のターゲットに停止を要求する（停止は待たない。停止中なら何もしない）
    fn request_break(&mut self) -> Result<()>;

    /// 実行を再開し、次に停止または終了するまで待つ
    fn continue_execution(&mut self) -> Result<StopReason>;

    /// 1命令だけ実行する
    fn step(&mut self) -> Result<StopReason>;

    /// 全てのブレークポイントを元に戻してトレースを終了する
    fn detach(&mut self) -> Result<()>;

    /// ブレークポイントテーブル
    fn breakpoints(&self) -> &BreakpointTable;

    /// デバッグ対象
    fn target(&self) -> &DebugTarget;
}
