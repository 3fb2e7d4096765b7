//! プロセス制御機能

use crate::Result;
use nix::sys::ptrace;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use std::ffi::CString;
use std::fs;
use std::path::Path;

/// waitpidで観測した停止・終了イベント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// SIGTRAPによる停止（ブレークポイント、ステップ実行、exec直後など）
    Trap,
    /// SIGTRAP以外のシグナルによる停止
    Signal(Signal),
    /// プロセス終了
    Exited(i32),
    /// シグナルによる強制終了
    Killed(Signal),
    /// その他の停止（ptraceイベントなど）
    Other,
}

impl WaitOutcome {
    /// プロセスが既に存在しないか
    pub fn is_terminal(&self) -> bool {
        matches!(self, WaitOutcome::Exited(_) | WaitOutcome::Killed(_))
    }

    fn from_status(status: WaitStatus) -> Self {
        match status {
            WaitStatus::Stopped(_, Signal::SIGTRAP) => WaitOutcome::Trap,
            WaitStatus::Stopped(_, signal) => WaitOutcome::Signal(signal),
            WaitStatus::Exited(_, code) => WaitOutcome::Exited(code),
            WaitStatus::Signaled(_, signal, _) => WaitOutcome::Killed(signal),
            _ => WaitOutcome::Other,
        }
    }
}

/// デバッグ対象のプロセス
pub struct Process {
    pid: Pid,
    /// ptraceでトレース中か（detach済み・終了済みならfalse）
    traced: bool,
}

impl Process {
    /// 実行可能ファイルを起動してデバッグ対象プロセスを開始する
    ///
    /// 新しいプロセスをforkし、子プロセスで自身のプロセスグループを作成して
    /// PTRACE_TRACEMEを設定してから、指定された実行可能ファイルをexecvpで実行します。
    /// プロセスはexec直後のSIGTRAPで停止した状態で返されます。
    pub fn spawn<P: AsRef<Path>>(program: P, args: &[String]) -> Result<Self> {
        use nix::unistd::{execvp, fork, setpgid, ForkResult};

        let program_path = program.as_ref().to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid program path"))?;
        let program_cstring = CString::new(program_path)?;

        // fork後の子プロセスではメモリ確保をしないよう、引数は先に用意しておく
        let mut cstring_args = vec![program_cstring.clone()];
        for arg in args {
            cstring_args.push(CString::new(arg.as_str())?);
        }

        match unsafe { fork()? } {
            ForkResult::Parent { child } => {
                match waitpid(child, None)? {
                    WaitStatus::Stopped(_, Signal::SIGTRAP) => Ok(Self { pid: child, traced: true }),
                    WaitStatus::Exited(_, code) => Err(anyhow::anyhow!(
                        "Failed to execute {} (exit status {})",
                        program_path,
                        code
                    )),
                    status => Err(anyhow::anyhow!(
                        "Unexpected wait status after exec: {:?}",
                        status
                    )),
                }
            }
            ForkResult::Child => {
                // 端末からのSIGINTがデバッガだけに届くよう、プロセスグループを分ける
                let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));

                if ptrace::traceme().is_ok() {
                    let _ = execvp(&program_cstring, &cstring_args);
                }

                // execvpが失敗した場合は親のテストハーネスなどに戻らずに終了する
                unsafe { nix::libc::_exit(127) }
            }
        }
    }

    /// 既存のプロセスにアタッチする
    ///
    /// PTRACE_ATTACHが引き起こす停止をwaitpidで待ってから返します。
    pub fn attach(pid: i32) -> Result<Self> {
        let pid = Pid::from_raw(pid);
        ptrace::attach(pid)?;

        loop {
            match waitpid(pid, None)? {
                WaitStatus::Stopped(_, _) => return Ok(Self { pid, traced: true }),
                WaitStatus::Exited(_, _) | WaitStatus::Signaled(_, _, _) => {
                    return Err(nix::errno::Errno::ESRCH.into());
                }
                _ => continue,
            }
        }
    }

    /// プロセスIDを取得する
    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    /// プロセスを実行継続して停止イベントを待機する
    ///
    /// `signal`が指定された場合は、そのシグナルを配送しながら再開します。
    pub fn continue_and_wait(&mut self, signal: Option<Signal>) -> Result<WaitOutcome> {
        ptrace::cont(self.pid, signal)?;
        self.wait()
    }

    /// 1命令だけ実行して停止する（ステップ実行）
    pub fn step(&mut self, signal: Option<Signal>) -> Result<WaitOutcome> {
        ptrace::step(self.pid, signal)?;
        self.wait()
    }

    /// 次の停止イベントを待機する
    pub fn wait(&mut self) -> Result<WaitOutcome> {
        let outcome = WaitOutcome::from_status(waitpid(self.pid, None)?);
        if outcome.is_terminal() {
            self.traced = false;
        }
        Ok(outcome)
    }

    /// プロセスを停止する（SIGSTOPを送信）
    ///
    /// 停止の完了は待ちません。停止は次のwaitで観測されます。
    pub fn stop(&self) -> Result<()> {
        kill(self.pid, Signal::SIGSTOP)?;
        Ok(())
    }

    /// SIGSTOPが保留されているか
    ///
    /// `/proc/<pid>/status` のスレッド宛て（SigPnd）とプロセス宛て（ShdPnd）の両方を確認します。
    pub fn has_pending_stop(&self) -> Result<bool> {
        let status = fs::read_to_string(format!("/proc/{}/status", self.pid))?;
        let bit = 1u64 << (Signal::SIGSTOP as i32 - 1);

        for line in status.lines() {
            let mask = match line
                .strip_prefix("SigPnd:")
                .or_else(|| line.strip_prefix("ShdPnd:"))
            {
                Some(mask) => mask,
                None => continue,
            };
            if u64::from_str_radix(mask.trim(), 16)? & bit != 0 {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// 保留中のSIGSTOPを配送前に取り除く
    ///
    /// 停止中のトレース対象に届いたSIGSTOPは、デタッチ後に配送されてプロセスを
    /// 停止状態のまま残します。一度再開させ、シグナル配送停止の時点で握りつぶします。
    /// 先に取り出された他のシグナルはそのまま配送します。
    pub fn discard_pending_stop(&mut self) -> Result<()> {
        if !self.traced || !self.has_pending_stop()? {
            return Ok(());
        }

        let mut signal = None;
        loop {
            match self.continue_and_wait(signal)? {
                WaitOutcome::Signal(Signal::SIGSTOP) => return Ok(()),
                WaitOutcome::Signal(other) => signal = Some(other),
                outcome if outcome.is_terminal() => return Ok(()),
                _ => signal = None,
            }
        }
    }

    /// トレースを終了する
    pub fn detach(&mut self, signal: Option<Signal>) -> Result<()> {
        if !self.traced {
            return Ok(());
        }
        self.traced = false;
        ptrace::detach(self.pid, signal)?;
        Ok(())
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if self.traced {
            let _ = ptrace::detach(self.pid, None);
        }
    }
}
