use domain::{ActionSlot, BusySlots, Identity, PerSlot, TodoListSnapshot, TodoRecord};
use shared::AppError;
use std::sync::Arc;

/// ウォレット接続の段階
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// 画面から見たコントローラーの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Disconnected,
    Connecting,
    /// 接続済みだがリスト未取得
    ConnectedNoData,
    ConnectedLoaded,
}

/// 画面に公開する読み取り専用の状態
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    pub phase: ConnectionPhase,
    pub identity: Option<Identity>,
    pub snapshot: Arc<TodoListSnapshot>,
    pub busy: BusySlots,
    /// スロットごとの直近の失敗（次の成功で消える）
    pub slot_errors: PerSlot<Option<AppError>>,
    pub connect_error: Option<AppError>,
    pub fetch_error: Option<AppError>,
    pub refreshing: bool,
}

impl AppState {
    pub fn controller_state(&self) -> ControllerState {
        match (self.phase, &self.identity) {
            (ConnectionPhase::Disconnected, _) => ControllerState::Disconnected,
            (ConnectionPhase::Connecting, _) => ControllerState::Connecting,
            (ConnectionPhase::Connected, Some(identity))
                if self.snapshot.is_loaded_for(identity) =>
            {
                ControllerState::ConnectedLoaded
            }
            (ConnectionPhase::Connected, _) => ControllerState::ConnectedNoData,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    pub fn is_busy(&self, slot: ActionSlot) -> bool {
        self.busy.is_busy(slot)
    }

    pub fn last_error(&self, slot: ActionSlot) -> Option<&AppError> {
        self.slot_errors.get(slot).as_ref()
    }

    /// 削除済みを除いたレコード
    pub fn visible_todos(&self) -> Vec<TodoRecord> {
        self.snapshot.visible().into_iter().cloned().collect()
    }
}
