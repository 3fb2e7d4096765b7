//! デバッガコマンド

use crate::contract::BreakpointLocation;
use crate::parse::{parse_address, parse_pid};
use crate::target::ProcessId;

/// デバッガコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 実行可能ファイルを起動してアタッチ
    Run { program: String, args: Vec<String> },
    /// 既存のプロセスにアタッチ
    Attach(ProcessId),
    /// ブレークポイントを設定
    Break(BreakpointLocation),
    /// ブレークポイントを削除
    Delete(u64),
    /// ブレークポイントを無効化
    Disable(u64),
    /// 実行継続
    Continue,
    /// ステップ実行
    Step,
    /// デタッチ
    Detach,
    /// 状態とブレークポイント一覧を表示
    Info,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    ///
    /// 不明なコマンドや引数の誤りはNoneになります。
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        match parts[0] {
            "run" | "r" | "start" => {
                let program = parts.get(1)?.to_string();
                let args = parts[2..].iter().map(|s| s.to_string()).collect();
                Some(Command::Run { program, args })
            }
            "attach" => parts.get(1).and_then(|pid| parse_pid(pid).ok()).map(Command::Attach),
            "break" | "b" => {
                if parts.len() > 1 {
                    Some(Command::Break(BreakpointLocation::parse(&parts[1..].join(" "))))
                } else {
                    None
                }
            }
            "delete" => parts.get(1).and_then(|a| parse_address(a).ok()).map(Command::Delete),
            "disable" => parts.get(1).and_then(|a| parse_address(a).ok()).map(Command::Disable),
            "continue" | "cont" | "c" => Some(Command::Continue),
            "step" | "s" => Some(Command::Step),
            "detach" | "d" => Some(Command::Detach),
            "info" | "i" => Some(Command::Info),
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}
