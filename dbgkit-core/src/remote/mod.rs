//! ソケット経由のリモートカーネルデバッグバックエンド
//!
//! トランスポート（TCP接続とヘッダのコーデック）は定義済みですが、コマンドの
//! エンコーディングは [`RemoteProtocol`] に委ねます。既定の [`PendingProtocol`] では
//! すべての契約操作が `NotImplemented` で失敗し、ソケットレベルの失敗は
//! `Transport` として区別されます。

pub mod header;
pub mod protocol;

pub use header::RemoteDebugHeader;
pub use protocol::{PendingProtocol, RemoteCommand, RemoteProtocol, TextProtocol};

use crate::breakpoint::BreakpointTable;
use crate::contract::{AttachTarget, BackendKind, BreakpointLocation, DebuggerContract, StopReason};
use crate::errors::{AttachError, DebugError};
use crate::target::{DebugTarget, ProcessId, TargetState};
use crate::Result;
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use tracing::{debug, info, warn};

/// リモートエージェントの既定のTCPポート
pub const DEFAULT_PORT: u16 = 51820;

/// リモートカーネルにはプロセスIDがないため、接続中はこの値を使う
pub const KERNEL_PROCESS_ID: ProcessId = 0;

/// リモートカーネルデバッグバックエンド
pub struct RemoteKernelBackend<P: RemoteProtocol = PendingProtocol> {
    target: DebugTarget,
    protocol: P,
    stream: Option<TcpStream>,
    kernel: Option<String>,
    /// リモート側はアドレスを返さないため、常に空
    breakpoints: BreakpointTable,
    /// 転送済みのブレークポイント位置
    requested: Vec<BreakpointLocation>,
}

impl RemoteKernelBackend<PendingProtocol> {
    pub fn new() -> Self {
        Self::with_protocol(PendingProtocol)
    }
}

impl Default for RemoteKernelBackend<PendingProtocol> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: RemoteProtocol> RemoteKernelBackend<P> {
    pub fn with_protocol(protocol: P) -> Self {
        Self {
            target: DebugTarget::new(),
            protocol,
            stream: None,
            kernel: None,
            breakpoints: BreakpointTable::new(),
            requested: Vec::new(),
        }
    }

    /// 接続中のカーネルイメージのパス
    pub fn kernel(&self) -> Option<&str> {
        self.kernel.as_deref()
    }

    /// リモート側に転送したブレークポイント位置
    pub fn requested_breakpoints(&self) -> &[BreakpointLocation] {
        &self.requested
    }

    fn require_stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(DebugError::NotAttached)
    }

    /// コマンドをエンコードして送信する
    fn send(&mut self, command: RemoteCommand<'_>) -> Result<()> {
        let frame = self.protocol.encode(&command)?;
        let stream = self.require_stream()?;
        stream.write_all(&frame)?;
        stream.flush()?;
        debug!("Sent '{}' ({} bytes)", command.name(), frame.len());
        Ok(())
    }

    /// ヘッダをそのまま送信する
    pub fn send_header(&mut self, header: &RemoteDebugHeader) -> Result<()> {
        header.write_to(self.require_stream()?)?;
        Ok(())
    }

    /// ヘッダを1つ受信する
    pub fn receive_header(&mut self) -> Result<RemoteDebugHeader> {
        Ok(RemoteDebugHeader::read_from(self.require_stream()?)?)
    }

    fn close(&mut self) {
        self.stream = None;
        self.kernel = None;
        self.requested.clear();
        self.target.reset();
    }
}

impl<P: RemoteProtocol> DebuggerContract for RemoteKernelBackend<P> {
    fn kind(&self) -> BackendKind {
        BackendKind::RemoteKernel
    }

    fn attach(&mut self, target: &AttachTarget) -> Result<ProcessId> {
        if self.target.is_attached() {
            return Err(DebugError::AlreadyAttached(KERNEL_PROCESS_ID));
        }

        let (kernel, addr): (&str, SocketAddr) = match target {
            AttachTarget::Remote { kernel, addr } => (kernel.as_str(), *addr),
            _ => return Err(AttachError::Unsupported("a local process").into()),
        };
        if kernel.is_empty() {
            return Err(AttachError::Failed("kernel path is empty".to_string()).into());
        }

        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);

        if let Err(e) = self.send(RemoteCommand::Hello { kernel }) {
            self.stream = None;
            return Err(e);
        }

        self.kernel = Some(kernel.to_string());
        self.target.attached(KERNEL_PROCESS_ID);
        info!("Connected to kernel debug agent at {}", addr);
        Ok(KERNEL_PROCESS_ID)
    }

    fn set_breakpoint(&mut self, location: &BreakpointLocation) -> Result<Option<u64>> {
        if !self.target.is_attached() {
            return Err(DebugError::NotAttached);
        }
        if self.requested.contains(location) {
            return Ok(None);
        }

        self.send(RemoteCommand::BreakAt(location))?;
        self.requested.push(location.clone());
        Ok(None)
    }

    fn remove_breakpoint(&mut self, address: u64) -> Result<()> {
        if !self.target.is_attached() {
            return Err(DebugError::NotAttached);
        }
        self.send(RemoteCommand::ClearBreakpoint(address))
    }

    fn disable_breakpoint(&mut self, address: u64) -> Result<()> {
        self.remove_breakpoint(address)
    }

    fn request_break(&mut self) -> Result<()> {
        if !self.target.is_attached() {
            return Err(DebugError::NotAttached);
        }
        self.send(RemoteCommand::Break)?;
        if self.target.state() == TargetState::Running {
            self.target.transition(TargetState::Stopped);
        }
        Ok(())
    }

    fn continue_execution(&mut self) -> Result<StopReason> {
        if !self.target.is_attached() {
            return Err(DebugError::NotAttached);
        }
        self.send(RemoteCommand::Continue)?;
        self.target.transition(TargetState::Running);
        // 停止通知の形式が定義されていないため、送信できた時点で返る
        Ok(StopReason::Unreported)
    }

    fn step(&mut self) -> Result<StopReason> {
        if !self.target.is_attached() {
            return Err(DebugError::NotAttached);
        }
        self.send(RemoteCommand::Step)?;
        Ok(StopReason::Unreported)
    }

    fn detach(&mut self) -> Result<()> {
        if !self.target.is_attached() {
            return Err(DebugError::NotAttached);
        }
        if let Err(e) = self.send(RemoteCommand::Detach) {
            warn!("Failed to send detach to kernel debug agent: {}", e);
        }
        self.close();
        info!("Disconnected from kernel debug agent");
        Ok(())
    }

    fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    fn target(&self) -> &DebugTarget {
        &self.target
    }
}
