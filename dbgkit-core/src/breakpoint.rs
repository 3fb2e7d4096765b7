//! ブレークポイント管理

use crate::errors::BreakpointError;
use std::collections::HashMap;

/// ブレークポイント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    /// ターゲットの仮想アドレス
    pub address: u64,
    /// トラップ命令を書き込む直前にそのアドレスから読み出したワード
    pub original_word: u64,
    /// 無効なエントリは再設定用に残るが、メモリは書き換えない
    pub active: bool,
}

/// アドレスをキーとするブレークポイントテーブル
///
/// 有効なエントリについては、ターゲットのメモリ上のそのアドレスにトラップ命令が
/// 書き込まれており、`original_word` が書き込み直前の値であることを保証します。
/// テーブルの更新はメモリの書き換えに成功した後にのみ行います。
#[derive(Debug, Default)]
pub struct BreakpointTable {
    breakpoints: HashMap<u64, Breakpoint>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// ブレークポイントを取得する
    pub fn get(&self, address: u64) -> Option<&Breakpoint> {
        self.breakpoints.get(&address)
    }

    /// 指定アドレスに有効なブレークポイントがあるか
    pub fn is_active(&self, address: u64) -> bool {
        self.get(address).is_some_and(|bp| bp.active)
    }

    /// パッチ済みのアドレスを有効なエントリとして記録する
    ///
    /// 同じアドレスの無効なエントリは上書きされます。
    pub fn arm(&mut self, address: u64, original_word: u64) {
        debug_assert!(
            !self.is_active(address),
            "breakpoint at 0x{:x} armed twice",
            address
        );
        self.breakpoints.insert(
            address,
            Breakpoint {
                address,
                original_word,
                active: true,
            },
        );
    }

    /// 有効なエントリを無効にし、元のワードを返す
    pub fn disarm(&mut self, address: u64) -> Result<u64, BreakpointError> {
        match self.breakpoints.get_mut(&address) {
            Some(bp) if bp.active => {
                bp.active = false;
                Ok(bp.original_word)
            }
            Some(_) => Err(BreakpointError::NotArmed(address)),
            None => Err(BreakpointError::Unknown(address)),
        }
    }

    /// エントリを削除する
    pub fn remove(&mut self, address: u64) -> Option<Breakpoint> {
        self.breakpoints.remove(&address)
    }

    /// 全てのブレークポイントを取得する
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    /// 有効なブレークポイントを取得する
    pub fn active(&self) -> impl Iterator<Item = &Breakpoint> {
        self.all().filter(|bp| bp.active)
    }

    /// テーブルを空にし、有効だったエントリを返す
    pub fn take_active(&mut self) -> Vec<Breakpoint> {
        self.breakpoints
            .drain()
            .map(|(_, bp)| bp)
            .filter(|bp| bp.active)
            .collect()
    }

    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_and_disarm() {
        let mut table = BreakpointTable::new();
        table.arm(0x1000, 0xdead_beef);

        assert!(table.is_active(0x1000));
        assert_eq!(table.disarm(0x1000).unwrap(), 0xdead_beef);
        assert!(!table.is_active(0x1000));

        // 無効なエントリは残る
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0x1000).map(|bp| bp.active), Some(false));
    }

    #[test]
    fn test_disarm_twice_is_an_error() {
        let mut table = BreakpointTable::new();
        table.arm(0x1000, 1);
        table.disarm(0x1000).unwrap();

        assert!(matches!(table.disarm(0x1000), Err(BreakpointError::NotArmed(0x1000))));
        assert!(matches!(table.disarm(0x2000), Err(BreakpointError::Unknown(0x2000))));
    }

    #[test]
    fn test_rearm_overwrites_inactive_entry() {
        let mut table = BreakpointTable::new();
        table.arm(0x1000, 1);
        table.disarm(0x1000).unwrap();
        table.arm(0x1000, 2);

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0x1000).unwrap().original_word, 2);
    }

    #[test]
    fn test_take_active_clears_table() {
        let mut table = BreakpointTable::new();
        table.arm(0x1000, 1);
        table.arm(0x2000, 2);
        table.disarm(0x2000).unwrap();

        let active = table.take_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].address, 0x1000);
        assert!(table.is_empty());
    }
}
