//! 割り込みシグナルの中継
//!
//! オペレータの停止キー（SIGINT）を、ターゲットへの停止要求とセッションループへの
//! フラグに変換します。シグナルハンドラは非同期シグナルコンテキストで動くため、
//! アトミック変数の更新と `kill(2)` 以外は行いません（メモリ確保・ログ出力・ロックは禁止）。

use crate::errors::DebugError;
use crate::target::ProcessId;
use crate::Result;
use nix::sys::signal::{kill, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// 割り込みを受けたか
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// 割り込み時にSIGSTOPを送るプロセス（0なら送らない）
static ARMED_PID: AtomicI32 = AtomicI32::new(0);

/// 停止対象が実行中か（停止中のトレース対象にはSIGSTOPを送らない）
static RUNNING: AtomicBool = AtomicBool::new(false);

static INSTALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_interrupt(_signal: nix::libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);

    let pid = ARMED_PID.load(Ordering::SeqCst);
    if pid > 0 && RUNNING.load(Ordering::SeqCst) {
        let _ = kill(Pid::from_raw(pid), Signal::SIGSTOP);
    }
}

/// 割り込みシグナルの中継
///
/// プロセス全体で1つのフラグを共有します。セッションループはコマンドを読む合間に
/// [`InterruptRelay::take`] でフラグを確認し、クリアします。
#[derive(Debug)]
pub struct InterruptRelay {
    _private: (),
}

impl InterruptRelay {
    /// SIGINTハンドラを登録する
    ///
    /// 2回目以降の呼び出しはハンドラを登録し直しません。
    /// SA_RESTARTにより、`continue` で待機中のwaitpidは割り込み後も待ち続け、
    /// ターゲットがSIGSTOPで停止した時点で戻ります。
    pub fn install() -> Result<Self> {
        if !INSTALLED.swap(true, Ordering::SeqCst) {
            let action = SigAction::new(
                SigHandler::Handler(handle_interrupt),
                SaFlags::SA_RESTART,
                SigSet::empty(),
            );
            // ハンドラはアトミック変数とkillだけを使う
            if let Err(errno) = unsafe { sigaction(Signal::SIGINT, &action) } {
                INSTALLED.store(false, Ordering::SeqCst);
                return Err(DebugError::Signal(errno));
            }
        }
        Ok(Self { _private: () })
    }

    /// 割り込み時に停止させるプロセスを設定する
    pub fn arm(&self, pid: ProcessId) {
        ARMED_PID.store(pid, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        ARMED_PID.store(0, Ordering::SeqCst);
        RUNNING.store(false, Ordering::SeqCst);
    }

    /// 停止対象が実行中かどうかを設定する
    ///
    /// 実行中でない間の割り込みはフラグを立てるだけで、SIGSTOPは送りません。
    pub fn set_running(&self, running: bool) {
        RUNNING.store(running, Ordering::SeqCst);
    }

    /// 停止対象のプロセス
    pub fn armed_pid(&self) -> Option<ProcessId> {
        match ARMED_PID.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// 割り込みを受けていればフラグをクリアしてtrueを返す
    pub fn take(&self) -> bool {
        INTERRUPTED.swap(false, Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        INTERRUPTED.load(Ordering::SeqCst)
    }
}
