//! コマンドループ用のセッション
//!
//! デバッガとセッション状態はグローバル変数に置かず、このセッションを
//! コマンドループに参照で渡します。失敗したコマンドはエラーとして返るだけで、
//! セッションは続行できます。

use crate::breakpoint::Breakpoint;
use crate::command::Command;
use crate::contract::{AttachTarget, DebuggerContract, StopReason};
use crate::errors::DebugError;
use crate::interrupt::InterruptRelay;
use crate::target::{ProcessId, TargetState};
use crate::Result;
use tracing::debug;

/// コマンドの実行結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Attached(ProcessId),
    /// ブレークポイントを設定した（アドレスは解決できた場合のみ）
    BreakpointSet(Option<u64>),
    BreakpointRemoved(u64),
    BreakpointDisabled(u64),
    Stopped(StopReason),
    Detached,
    Info {
        pid: Option<ProcessId>,
        state: TargetState,
        breakpoints: Vec<Breakpoint>,
    },
    Help,
    Quit,
}

/// デバッグセッション
pub struct Session {
    debugger: Box<dyn DebuggerContract>,
    relay: Option<InterruptRelay>,
}

impl Session {
    pub fn new(debugger: Box<dyn DebuggerContract>) -> Self {
        Self {
            debugger,
            relay: None,
        }
    }

    /// 割り込み中継を使う
    pub fn with_relay(mut self, relay: InterruptRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn debugger(&self) -> &dyn DebuggerContract {
        self.debugger.as_ref()
    }

    pub fn debugger_mut(&mut self) -> &mut dyn DebuggerContract {
        self.debugger.as_mut()
    }

    /// 割り込みを受けていればフラグをクリアしてtrueを返す
    ///
    /// ローカルプロセスはシグナルハンドラが既に停止させているため、
    /// ここでは停止要求を重ねて送りません。
    pub fn poll_interrupt(&mut self) -> bool {
        let Some(relay) = &self.relay else {
            return false;
        };
        if !relay.take() {
            return false;
        }

        if relay.armed_pid().is_none() && self.debugger.target().is_attached() {
            if let Err(e) = self.debugger.request_break() {
                debug!("Break request after interrupt failed: {}", e);
            }
        }
        true
    }

    /// アタッチ後に割り込み中継の停止対象を更新する
    fn arm_relay(&self, pid: ProcessId) {
        if let Some(relay) = &self.relay {
            if pid > 0 {
                relay.arm(pid);
            }
        }
    }

    fn set_running(&self, running: bool) {
        if let Some(relay) = &self.relay {
            relay.set_running(running);
        }
    }

    /// ターゲットを再開して停止を待つ
    ///
    /// 待機中だけ割り込みでターゲットを停止させます。
    fn resume(&mut self, stepping: bool) -> Result<Outcome> {
        self.set_running(true);
        let result = if stepping {
            self.debugger.step()
        } else {
            self.debugger.continue_execution()
        };
        self.set_running(false);

        let reason = result?;
        if reason.is_exit() {
            self.disarm_relay();
        }
        Ok(Outcome::Stopped(reason))
    }

    fn disarm_relay(&self) {
        if let Some(relay) = &self.relay {
            relay.disarm();
        }
    }

    /// デバッガに接続・起動を依頼する
    pub fn attach(&mut self, target: &AttachTarget) -> Result<ProcessId> {
        let pid = self.debugger.attach(target)?;
        self.arm_relay(pid);
        Ok(pid)
    }

    /// コマンドを実行する
    pub fn execute(&mut self, command: Command) -> Result<Outcome> {
        match command {
            Command::Run { program, args } => {
                let target = AttachTarget::Spawn {
                    program: program.into(),
                    args,
                };
                self.attach(&target).map(Outcome::Attached)
            }
            Command::Attach(pid) => self.attach(&AttachTarget::Process(pid)).map(Outcome::Attached),
            Command::Break(location) => self
                .debugger
                .set_breakpoint(&location)
                .map(Outcome::BreakpointSet),
            Command::Delete(address) => {
                self.debugger.remove_breakpoint(address)?;
                Ok(Outcome::BreakpointRemoved(address))
            }
            Command::Disable(address) => {
                self.debugger.disable_breakpoint(address)?;
                Ok(Outcome::BreakpointDisabled(address))
            }
            Command::Continue => self.resume(false),
            Command::Step => self.resume(true),
            Command::Detach => {
                self.disarm_relay();
                self.debugger.detach()?;
                Ok(Outcome::Detached)
            }
            Command::Info => {
                let mut breakpoints: Vec<Breakpoint> =
                    self.debugger.breakpoints().all().cloned().collect();
                breakpoints.sort_by_key(|bp| bp.address);
                let target = self.debugger.target();
                Ok(Outcome::Info {
                    pid: target.pid(),
                    state: target.state(),
                    breakpoints,
                })
            }
            Command::Help => Ok(Outcome::Help),
            Command::Quit => {
                if self.debugger.target().is_attached() {
                    self.disarm_relay();
                    match self.debugger.detach() {
                        Ok(()) | Err(DebugError::NotAttached) => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(Outcome::Quit)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::BreakpointTable;
    use crate::contract::{BackendKind, BreakpointLocation};
    use crate::target::DebugTarget;

    /// 呼び出しを記録するだけのバックエンド
    #[derive(Default)]
    struct RecordingBackend {
        target: DebugTarget,
        breakpoints: BreakpointTable,
        calls: Vec<&'static str>,
    }

    impl DebuggerContract for RecordingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::ProcessControl
        }

        fn attach(&mut self, _target: &AttachTarget) -> Result<ProcessId> {
            if self.target.is_attached() {
                return Err(DebugError::AlreadyAttached(7));
            }
            self.calls.push("attach");
            self.target.attached(7);
            Ok(7)
        }

        fn set_breakpoint(&mut self, location: &BreakpointLocation) -> Result<Option<u64>> {
            self.calls.push("set_breakpoint");
            match location {
                BreakpointLocation::Address(addr) => {
                    self.breakpoints.arm(*addr, 0);
                    Ok(Some(*addr))
                }
                _ => Ok(None),
            }
        }

        fn remove_breakpoint(&mut self, address: u64) -> Result<()> {
            self.calls.push("remove_breakpoint");
            self.breakpoints.remove(address);
            Ok(())
        }

        fn disable_breakpoint(&mut self, address: u64) -> Result<()> {
            self.calls.push("disable_breakpoint");
            self.breakpoints.disarm(address)?;
            Ok(())
        }

        fn request_break(&mut self) -> Result<()> {
            self.calls.push("request_break");
            Ok(())
        }

        fn continue_execution(&mut self) -> Result<StopReason> {
            if !self.target.is_attached() {
                return Err(DebugError::NotAttached);
            }
            self.calls.push("continue");
            self.target.transition(TargetState::Running);
            self.target.reset();
            Ok(StopReason::Exited(0))
        }

        fn step(&mut self) -> Result<StopReason> {
            self.calls.push("step");
            Ok(StopReason::Step { pc: 0 })
        }

        fn detach(&mut self) -> Result<()> {
            if !self.target.is_attached() {
                return Err(DebugError::NotAttached);
            }
            self.calls.push("detach");
            self.breakpoints.clear();
            self.target.reset();
            Ok(())
        }

        fn breakpoints(&self) -> &BreakpointTable {
            &self.breakpoints
        }

        fn target(&self) -> &DebugTarget {
            &self.target
        }
    }

    #[test]
    fn test_commands_drive_the_backend() {
        let mut session = Session::new(Box::new(RecordingBackend::default()));

        assert_eq!(session.execute(Command::Attach(7)).unwrap(), Outcome::Attached(7));
        assert_eq!(
            session.execute(Command::parse("b 0x2000").unwrap()).unwrap(),
            Outcome::BreakpointSet(Some(0x2000))
        );
        assert_eq!(
            session.execute(Command::parse("b 0x1000").unwrap()).unwrap(),
            Outcome::BreakpointSet(Some(0x1000))
        );

        match session.execute(Command::Info).unwrap() {
            Outcome::Info { pid, state, breakpoints } => {
                assert_eq!(pid, Some(7));
                assert_eq!(state, TargetState::Attached);
                let addrs: Vec<u64> = breakpoints.iter().map(|bp| bp.address).collect();
                assert_eq!(addrs, vec![0x1000, 0x2000]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(session.execute(Command::Detach).unwrap(), Outcome::Detached);
        assert!(session.debugger().breakpoints().is_empty());
    }

    #[test]
    fn test_failures_do_not_end_the_session() {
        let mut session = Session::new(Box::new(RecordingBackend::default()));

        assert!(matches!(session.execute(Command::Continue), Err(DebugError::NotAttached)));
        assert!(matches!(session.execute(Command::Detach), Err(DebugError::NotAttached)));

        session.execute(Command::Attach(7)).unwrap();
        assert!(matches!(
            session.execute(Command::Attach(8)),
            Err(DebugError::AlreadyAttached(7))
        ));
        assert_eq!(
            session.execute(Command::Continue).unwrap(),
            Outcome::Stopped(StopReason::Exited(0))
        );
    }

    #[test]
    fn test_quit_detaches_live_target() {
        let mut session = Session::new(Box::new(RecordingBackend::default()));
        assert_eq!(session.execute(Command::Quit).unwrap(), Outcome::Quit);

        session.execute(Command::Attach(7)).unwrap();
        assert_eq!(session.execute(Command::Quit).unwrap(), Outcome::Quit);
        assert!(!session.debugger().target().is_attached());
    }
}
