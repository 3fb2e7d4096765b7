//! トラップ命令のエンコーディング
//!
//! ソフトウェアブレークポイントは、ptraceで読み出した1ワードの下位バイトだけを
//! トラップ命令に置き換えて書き戻すことで設定します。ワード全体を書き換えると
//! 隣接する命令を壊してしまうため、置き換えるのはトラップ命令の長さ分だけです。

/// アーキテクチャごとのトラップ命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapEncoding {
    /// メモリ上のバイト列（アドレスの低い順）
    opcode: &'static [u8],
    /// トラップ後のPCがブレークポイントのアドレスからどれだけ進んでいるか
    pc_offset: u64,
}

impl TrapEncoding {
    /// x86_64のINT3命令（0xCC）
    pub const X86_64: Self = Self {
        opcode: &[0xCC],
        pc_offset: 1,
    };

    /// AArch64のBRK #0命令
    pub const AARCH64: Self = Self {
        opcode: &[0x00, 0x00, 0x20, 0xD4],
        pc_offset: 0,
    };

    /// 実行中のアーキテクチャのトラップ命令を取得する
    pub fn native() -> Self {
        if cfg!(target_arch = "aarch64") {
            Self::AARCH64
        } else {
            Self::X86_64
        }
    }

    /// トラップ命令のバイト列
    pub fn opcode(&self) -> &'static [u8] {
        self.opcode
    }

    /// トラップ命令の長さ（バイト数）
    pub fn len(&self) -> usize {
        self.opcode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opcode.is_empty()
    }

    /// トラップ後のPCのずれ
    pub fn pc_offset(&self) -> u64 {
        self.pc_offset
    }

    /// ワード内でトラップ命令が占めるビットのマスク
    fn mask(&self) -> u64 {
        if self.len() >= 8 {
            u64::MAX
        } else {
            (1u64 << (8 * self.len())) - 1
        }
    }

    /// トラップ命令をリトルエンディアンのワード値として取得する
    fn encoded(&self) -> u64 {
        self.opcode
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, byte)| acc | (u64::from(*byte) << (8 * i)))
    }

    /// 元のワードの下位バイトをトラップ命令に置き換えたワードを返す
    pub fn patch(&self, word: u64) -> u64 {
        (word & !self.mask()) | self.encoded()
    }

    /// 現在のワードのトラップ部分だけを元のバイトに戻したワードを返す
    ///
    /// 同じワード内の他のブレークポイントを上書きしないよう、
    /// トラップ命令の長さ分だけを書き戻します。
    pub fn restore(&self, current: u64, original: u64) -> u64 {
        (current & !self.mask()) | (original & self.mask())
    }

    /// ワードの下位バイトがトラップ命令になっているか
    pub fn is_patched(&self, word: u64) -> bool {
        word & self.mask() == self.encoded()
    }

    /// トラップ停止時のPCからブレークポイントのアドレスを求める
    pub fn breakpoint_address(&self, pc: u64) -> u64 {
        pc.wrapping_sub(self.pc_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_replaces_only_low_byte() {
        let word = 0x1122_3344_5566_7788;
        let patched = TrapEncoding::X86_64.patch(word);
        assert_eq!(patched, 0x1122_3344_5566_77CC);
        assert!(TrapEncoding::X86_64.is_patched(patched));
        assert!(!TrapEncoding::X86_64.is_patched(word));
    }

    #[test]
    fn test_patch_aarch64_word() {
        let word = 0xAAAA_BBBB_D503_201F;
        let patched = TrapEncoding::AARCH64.patch(word);
        assert_eq!(patched, 0xAAAA_BBBB_D420_0000);
    }

    #[test]
    fn test_restore_keeps_neighbouring_trap() {
        let enc = TrapEncoding::X86_64;
        let original = 0x0000_0000_0000_9090;
        // addr と addr+1 の両方にトラップが入っている状態
        let current = 0x0000_0000_0000_CCCC;
        assert_eq!(enc.restore(current, original), 0x0000_0000_0000_CC90);
    }

    #[test]
    fn test_breakpoint_address() {
        assert_eq!(TrapEncoding::X86_64.breakpoint_address(0x1001), 0x1000);
        assert_eq!(TrapEncoding::AARCH64.breakpoint_address(0x1000), 0x1000);
    }
}
