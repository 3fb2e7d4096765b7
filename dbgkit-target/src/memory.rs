//! メモリアクセス機能

use crate::Result;
use nix::sys::ptrace;
use nix::unistd::Pid;
use std::ffi::c_void;

/// ptraceで読み書きするワードのサイズ（バイト数）
pub const WORD_SIZE: usize = std::mem::size_of::<nix::libc::c_long>();

/// メモリアクセス
///
/// PTRACE_PEEKDATA / PTRACE_POKEDATA を使って、停止中のターゲットプロセスの
/// メモリをワード単位で読み書きします。
pub struct Memory {
    pid: Pid,
}

impl Memory {
    /// メモリアクセスを作成する
    pub fn new(pid: i32) -> Self {
        Self {
            pid: Pid::from_raw(pid),
        }
    }

    /// 指定アドレスから1ワードを読み取る
    pub fn read_word(&self, addr: u64) -> Result<u64> {
        let word = ptrace::read(self.pid, addr as *mut c_void)
            .map_err(|e| anyhow::anyhow!("Failed to read via ptrace at 0x{:x}: {}", addr, e))?;
        Ok(word as u64)
    }

    /// 指定アドレスに1ワードを書き込む
    pub fn write_word(&self, addr: u64, word: u64) -> Result<()> {
        ptrace::write(self.pid, addr as *mut c_void, word as nix::libc::c_long)
            .map_err(|e| anyhow::anyhow!("Failed to write via ptrace at 0x{:x}: {}", addr, e))?;
        Ok(())
    }

    /// 補助ベクタ（/proc/pid/auxv）からプログラムのエントリアドレスを取得する
    ///
    /// PIEの場合もロード後の実アドレスが得られます。
    pub fn entry_address(&self) -> Result<u64> {
        let auxv_path = format!("/proc/{}/auxv", self.pid);
        let bytes = std::fs::read(&auxv_path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", auxv_path, e))?;

        // フォーマット: (キー, 値) のワードの組がAT_NULLまで続く
        for pair in bytes.chunks_exact(WORD_SIZE * 2) {
            let (key, value) = pair.split_at(WORD_SIZE);
            let key = word_from_ne_bytes(key)?;
            let value = word_from_ne_bytes(value)?;

            if key == nix::libc::AT_NULL as u64 {
                break;
            }
            if key == nix::libc::AT_ENTRY as u64 {
                return Ok(value);
            }
        }

        Err(anyhow::anyhow!("AT_ENTRY not found in {}", auxv_path))
    }
}

fn word_from_ne_bytes(bytes: &[u8]) -> Result<u64> {
    let array: [u8; WORD_SIZE] = bytes.try_into()
        .map_err(|_| anyhow::anyhow!("Failed to convert {} bytes to a word (expected {} bytes)", bytes.len(), WORD_SIZE))?;
    Ok(nix::libc::c_ulong::from_ne_bytes(array) as u64)
}
