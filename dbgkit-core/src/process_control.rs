//! ptraceによるローカルプロセス制御バックエンド

use crate::breakpoint::BreakpointTable;
use crate::contract::{AttachTarget, BackendKind, BreakpointLocation, DebuggerContract, StopReason};
use crate::errors::{AttachError, BreakpointError, DebugError};
use crate::target::{DebugTarget, ProcessId, TargetState};
use crate::Result;
use dbgkit_target::{Memory, Process, Registers, TrapEncoding, WaitOutcome};
use nix::sys::signal::Signal;
use tracing::{debug, info, warn};

/// ローカルプロセス制御バックエンド
///
/// ブレークポイントのアドレスは、メモリの読み書きに成功するかどうか以外は検証しません。
/// シンボル情報を持たないため、読み書き可能なデータ領域に設定したブレークポイントも
/// 受け付け、実行されればターゲットの動作を壊します。正しいアドレスを渡すのは呼び出し側の責任です。
pub struct ProcessControlBackend {
    /// デバッグ対象
    target: DebugTarget,
    /// デバッグ対象プロセス
    process: Option<Process>,
    /// メモリアクセス
    memory: Option<Memory>,
    /// レジスタアクセス
    registers: Option<Registers>,
    /// ブレークポイント管理
    breakpoints: BreakpointTable,
    /// トラップ命令のエンコーディング
    trap: TrapEncoding,
    /// 次の再開時にターゲットへ配送するシグナル
    pending_signal: Option<Signal>,
}

impl ProcessControlBackend {
    /// 実行中のアーキテクチャ用のバックエンドを作成する
    pub fn new() -> Self {
        Self::with_trap(TrapEncoding::native())
    }

    /// トラップ命令を指定してバックエンドを作成する
    pub fn with_trap(trap: TrapEncoding) -> Self {
        Self {
            target: DebugTarget::new(),
            process: None,
            memory: None,
            registers: None,
            breakpoints: BreakpointTable::new(),
            trap,
            pending_signal: None,
        }
    }

    pub fn trap(&self) -> TrapEncoding {
        self.trap
    }

    fn require_attached(&self) -> Result<()> {
        if self.target.is_attached() {
            Ok(())
        } else {
            Err(DebugError::NotAttached)
        }
    }

    fn require_memory(&self) -> Result<&Memory> {
        self.memory.as_ref().ok_or(DebugError::NotAttached)
    }

    fn require_process(&mut self) -> Result<&mut Process> {
        self.process.as_mut().ok_or(DebugError::NotAttached)
    }

    /// プログラムのエントリアドレスを取得する
    pub fn entry_address(&self) -> Result<u64> {
        self.require_memory()?.entry_address().map_err(|e| {
            debug!("Failed to read entry address: {:#}", e);
            BreakpointError::EntryUnavailable.into()
        })
    }

    /// プログラムカウンタを取得する
    pub fn pc(&self) -> Result<u64> {
        let registers = self.registers.as_ref().ok_or(DebugError::NotAttached)?;
        registers.get_pc().map_err(DebugError::Control)
    }

    fn resolve(&self, location: &BreakpointLocation) -> Result<u64> {
        match location {
            BreakpointLocation::Address(addr) => Ok(*addr),
            BreakpointLocation::Entry => self.entry_address(),
            BreakpointLocation::Symbol(name) => {
                Err(BreakpointError::SymbolUnresolved(name.clone()).into())
            }
        }
    }

    /// トラップ命令を書き込み、書き込み前のワードを返す
    fn write_trap(&self, address: u64) -> Result<u64> {
        let memory = self.require_memory()?;

        let original = memory.read_word(address).map_err(|e| BreakpointError::Read {
            address,
            reason: format!("{:#}", e),
        })?;

        memory
            .write_word(address, self.trap.patch(original))
            .map_err(|e| BreakpointError::Write {
                address,
                reason: format!("{:#}", e),
            })?;

        Ok(original)
    }

    /// トラップ命令の部分だけを元のバイトに戻す
    fn restore(&self, address: u64, original: u64) -> Result<()> {
        let memory = self.require_memory()?;

        let current = memory.read_word(address).map_err(|e| BreakpointError::Read {
            address,
            reason: format!("{:#}", e),
        })?;

        memory
            .write_word(address, self.trap.restore(current, original))
            .map_err(|e| BreakpointError::Write {
                address,
                reason: format!("{:#}", e),
            })?;

        Ok(())
    }

    /// 有効なブレークポイントのメモリを元に戻す
    ///
    /// メモリの復元に失敗した場合はテーブルを変更しません。
    fn unpatch(&self, address: u64) -> Result<()> {
        let bp = self
            .breakpoints
            .get(address)
            .ok_or(BreakpointError::Unknown(address))?;
        if !bp.active {
            return Err(BreakpointError::NotArmed(address).into());
        }
        self.restore(address, bp.original_word)
    }

    /// PCが有効なブレークポイント上にあれば、元の命令を1ステップ実行してから再設定する
    ///
    /// ステップ実行した場合はその結果を返します。
    fn step_over_breakpoint(&mut self) -> Result<Option<WaitOutcome>> {
        let Ok(pc) = self.pc() else {
            return Ok(None);
        };
        let original = match self.breakpoints.get(pc) {
            Some(bp) if bp.active => bp.original_word,
            _ => return Ok(None),
        };

        debug!("Stepping over breakpoint at 0x{:x}", pc);
        // 元の命令に戻している間はエントリを無効にしておき、
        // 途中で失敗してもテーブルとメモリが食い違わないようにする
        self.restore(pc, original)?;
        self.breakpoints.disarm(pc)?;

        let signal = self.pending_signal.take();
        self.target.transition(TargetState::Running);
        let outcome = match self.require_process()?.step(signal) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.target.transition(TargetState::Stopped);
                return Err(DebugError::Control(e));
            }
        };

        if !outcome.is_terminal() {
            self.target.transition(TargetState::Stopped);
            let original = self.write_trap(pc)?;
            self.breakpoints.arm(pc, original);
        }

        Ok(Some(outcome))
    }

    /// 停止イベントを分類し、状態を更新する
    fn classify(&mut self, outcome: WaitOutcome, stepping: bool) -> Result<StopReason> {
        let reason = match outcome {
            WaitOutcome::Trap => {
                self.target.transition(TargetState::Stopped);
                self.classify_trap(stepping)?
            }
            WaitOutcome::Signal(Signal::SIGSTOP) | WaitOutcome::Signal(Signal::SIGINT) => {
                self.target.transition(TargetState::Stopped);
                StopReason::Interrupted
            }
            WaitOutcome::Signal(signal) => {
                self.target.transition(TargetState::Stopped);
                self.pending_signal = Some(signal);
                StopReason::Signal(signal)
            }
            WaitOutcome::Exited(code) => {
                self.finish_exited();
                StopReason::Exited(code)
            }
            WaitOutcome::Killed(signal) => {
                self.finish_exited();
                StopReason::Killed(signal)
            }
            WaitOutcome::Other => {
                self.target.transition(TargetState::Stopped);
                StopReason::Other
            }
        };

        debug!("Target stopped: {:?}", reason);
        Ok(reason)
    }

    fn classify_trap(&mut self, stepping: bool) -> Result<StopReason> {
        let pc = match self.pc() {
            Ok(pc) => pc,
            Err(e) => {
                // PCを読めないアーキテクチャではヒットしたアドレスを特定できない
                warn!("Cannot read program counter: {}", e);
                return Ok(StopReason::Trap { pc: 0 });
            }
        };

        if stepping {
            return Ok(StopReason::Step { pc });
        }

        let address = self.trap.breakpoint_address(pc);
        if !self.breakpoints.is_active(address) {
            return Ok(StopReason::Trap { pc });
        }

        // 次に再開したときに元の命令から実行されるよう、PCを巻き戻す
        if address != pc {
            let registers = self.registers.as_ref().ok_or(DebugError::NotAttached)?;
            registers.set_pc(address).map_err(DebugError::Control)?;
        }

        info!("Breakpoint hit at 0x{:x}", address);
        Ok(StopReason::Breakpoint { address })
    }

    /// プロセスが終了した後の後始末
    fn finish_exited(&mut self) {
        // アドレス空間が既に存在しないため、復元せずに破棄する
        self.breakpoints.clear();
        self.process = None;
        self.memory = None;
        self.registers = None;
        self.pending_signal = None;
        self.target.reset();
    }
}

impl Default for ProcessControlBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DebuggerContract for ProcessControlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ProcessControl
    }

    fn attach(&mut self, target: &AttachTarget) -> Result<ProcessId> {
        if let (true, Some(pid)) = (self.target.is_attached(), self.target.pid()) {
            return Err(DebugError::AlreadyAttached(pid));
        }

        let process = match target {
            AttachTarget::Spawn { program, args } => Process::spawn(program, args)
                .map_err(|e| AttachError::Spawn(format!("{}: {:#}", program.display(), e)))?,
            AttachTarget::Process(pid) => {
                Process::attach(*pid).map_err(|e| AttachError::from_os(*pid, e))?
            }
            AttachTarget::Remote { .. } => {
                return Err(AttachError::Unsupported("a remote kernel").into());
            }
        };

        let pid = process.pid();
        self.memory = Some(Memory::new(pid));
        self.registers = Some(Registers::new(pid));
        self.process = Some(process);
        self.pending_signal = None;
        self.target.attached(pid);

        info!("Attached to process {}", pid);
        Ok(pid)
    }

    fn set_breakpoint(&mut self, location: &BreakpointLocation) -> Result<Option<u64>> {
        self.require_attached()?;
        let address = self.resolve(location)?;

        if self.breakpoints.is_active(address) {
            debug!("Breakpoint at 0x{:x} is already active", address);
            return Ok(Some(address));
        }

        let original = self.write_trap(address)?;
        self.breakpoints.arm(address, original);

        info!("Breakpoint set at 0x{:x}", address);
        Ok(Some(address))
    }

    fn remove_breakpoint(&mut self, address: u64) -> Result<()> {
        self.require_attached()?;

        match self.breakpoints.get(address) {
            Some(bp) if bp.active => self.unpatch(address)?,
            Some(_) => {}
            None => return Err(BreakpointError::Unknown(address).into()),
        }
        self.breakpoints.remove(address);

        debug!("Breakpoint at 0x{:x} removed", address);
        Ok(())
    }

    fn disable_breakpoint(&mut self, address: u64) -> Result<()> {
        self.require_attached()?;

        self.unpatch(address)?;
        self.breakpoints.disarm(address)?;

        debug!("Breakpoint at 0x{:x} disabled", address);
        Ok(())
    }

    fn request_break(&mut self) -> Result<()> {
        self.require_attached()?;

        // 停止中のトレース対象にSIGSTOPを送ると、次の再開がすぐ割り込み停止になる
        if self.target.state() != TargetState::Running {
            debug!("Target is not running; break request ignored");
            return Ok(());
        }

        let process = self.require_process()?;
        process.stop().map_err(DebugError::Control)
    }

    fn continue_execution(&mut self) -> Result<StopReason> {
        self.require_attached()?;

        if let Some(outcome) = self.step_over_breakpoint()? {
            if outcome != WaitOutcome::Trap {
                // ステップ中にシグナルや終了を観測した
                return self.classify(outcome, false);
            }
        }

        let signal = self.pending_signal.take();
        self.target.transition(TargetState::Running);
        let result = self.require_process()?.continue_and_wait(signal);

        match result {
            Ok(outcome) => self.classify(outcome, false),
            Err(e) => {
                self.target.transition(TargetState::Stopped);
                Err(DebugError::Control(e))
            }
        }
    }

    fn step(&mut self) -> Result<StopReason> {
        self.require_attached()?;

        let outcome = match self.step_over_breakpoint()? {
            Some(outcome) => outcome,
            None => {
                let signal = self.pending_signal.take();
                self.target.transition(TargetState::Running);
                match self.require_process()?.step(signal) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        self.target.transition(TargetState::Stopped);
                        return Err(DebugError::Control(e));
                    }
                }
            }
        };

        self.classify(outcome, true)
    }

    fn detach(&mut self) -> Result<()> {
        let pid = match (self.target.is_attached(), self.target.pid()) {
            (true, Some(pid)) => pid,
            _ => return Err(DebugError::NotAttached),
        };

        // 復元は最善努力: ターゲットが既に消えていても失敗はログに残して続行する
        for bp in self.breakpoints.take_active() {
            if let Err(e) = self.restore(bp.address, bp.original_word) {
                warn!("Failed to restore breakpoint at 0x{:x}: {}", bp.address, e);
            }
        }

        if let Some(mut process) = self.process.take() {
            if let Err(e) = process.discard_pending_stop() {
                warn!("Failed to discard pending stop of process {}: {:#}", pid, e);
            }
            if let Err(e) = process.detach(self.pending_signal.take()) {
                warn!("Failed to detach from process {}: {:#}", pid, e);
            }
        }

        self.memory = None;
        self.registers = None;
        self.pending_signal = None;
        self.target.reset();

        info!("Detached from process {}", pid);
        Ok(())
    }

    fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    fn target(&self) -> &DebugTarget {
        &self.target
    }
}
