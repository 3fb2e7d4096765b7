//! レジスタアクセス機能

use crate::Result;
use nix::unistd::Pid;

/// レジスタ情報
pub struct Registers {
    pid: Pid,
}

impl Registers {
    /// レジスタアクセスを作成する
    pub fn new(pid: i32) -> Self {
        Self {
            pid: Pid::from_raw(pid),
        }
    }

    /// プログラムカウンタ（RIP）を取得する
    #[cfg(target_arch = "x86_64")]
    pub fn get_pc(&self) -> Result<u64> {
        let regs = nix::sys::ptrace::getregs(self.pid)?;
        Ok(regs.rip)
    }

    /// プログラムカウンタ（RIP）を設定する
    #[cfg(target_arch = "x86_64")]
    pub fn set_pc(&self, pc: u64) -> Result<()> {
        let mut regs = nix::sys::ptrace::getregs(self.pid)?;
        regs.rip = pc;
        nix::sys::ptrace::setregs(self.pid, regs)?;
        Ok(())
    }

    #[cfg(not(target_arch = "x86_64"))]
    pub fn get_pc(&self) -> Result<u64> {
        Err(anyhow::anyhow!("Reading the program counter of {} is not supported on this architecture", self.pid))
    }

    #[cfg(not(target_arch = "x86_64"))]
    pub fn set_pc(&self, _pc: u64) -> Result<()> {
        Err(anyhow::anyhow!("Writing the program counter of {} is not supported on this architecture", self.pid))
    }
}
