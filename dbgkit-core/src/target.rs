//! デバッグ対象のハンドル

/// OSのプロセスID
pub type ProcessId = i32;

/// デバッグ対象のライフサイクル状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetState {
    #[default]
    Detached,
    Attached,
    Stopped,
    Running,
}

impl TargetState {
    /// 状態遷移が許可されているか
    ///
    /// ```text
    /// Detached --attach--> Attached --continue--> Running
    /// Running --trap--> Stopped --continue--> Running
    /// Attached/Stopped/Running --detach--> Detached
    /// ```
    pub fn allows(self, next: TargetState) -> bool {
        use TargetState::*;

        matches!(
            (self, next),
            (Detached, Attached)
                | (Attached, Running)
                | (Stopped, Running)
                | (Running, Stopped)
                | (Attached, Detached)
                | (Stopped, Detached)
                | (Running, Detached)
        )
    }
}

/// アタッチ中のプロセス
///
/// バックエンドのインスタンスが排他的に所有し、1インスタンスにつき高々1つです。
#[derive(Debug, Clone, Default)]
pub struct DebugTarget {
    pid: Option<ProcessId>,
    state: TargetState,
}

impl DebugTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// プロセスIDを取得する（デタッチ中はNone）
    pub fn pid(&self) -> Option<ProcessId> {
        self.pid
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    /// プロセスにアタッチしているか
    pub fn is_attached(&self) -> bool {
        self.state != TargetState::Detached
    }

    /// アタッチに成功したことを記録する
    pub fn attached(&mut self, pid: ProcessId) {
        self.transition(TargetState::Attached);
        self.pid = Some(pid);
    }

    /// 状態を遷移させる
    ///
    /// 同じ状態への遷移は何もしません。許可されていない遷移はプログラミングエラーです。
    pub fn transition(&mut self, next: TargetState) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.allows(next),
            "invalid target transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    /// デタッチ状態に戻す
    pub fn reset(&mut self) {
        self.transition(TargetState::Detached);
        self.pid = None;
    }
}
