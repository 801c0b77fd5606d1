use crate::action::ActionSlot;
use crate::identity::Identity;
use crate::todo::TodoId;
use serde::{Deserialize, Serialize};

/// コントローラーが発行する離散イベント
///
/// `IdentityChanged` と `MutationConfirmed` を受けたコントローラーはリストを再取得する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ControllerEvent {
    IdentityChanged {
        identity: Identity,
    },
    MutationSubmitted {
        slot: ActionSlot,
        todo_id: Option<TodoId>,
    },
    MutationConfirmed {
        slot: ActionSlot,
        todo_id: Option<TodoId>,
        tx_hash: String,
    },
    MutationFailed {
        slot: ActionSlot,
        todo_id: Option<TodoId>,
        reason: String,
    },
    SnapshotRefreshed {
        owner: Identity,
        record_count: usize,
    },
    RefreshFailed {
        owner: Identity,
        reason: String,
    },
}

impl ControllerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ControllerEvent::IdentityChanged { .. } => "identity_changed",
            ControllerEvent::MutationSubmitted { .. } => "mutation_submitted",
            ControllerEvent::MutationConfirmed { .. } => "mutation_confirmed",
            ControllerEvent::MutationFailed { .. } => "mutation_failed",
            ControllerEvent::SnapshotRefreshed { .. } => "snapshot_refreshed",
            ControllerEvent::RefreshFailed { .. } => "refresh_failed",
        }
    }

    /// リスト再取得が必要なイベントかどうか
    pub fn requires_refresh(&self) -> bool {
        matches!(
            self,
            ControllerEvent::IdentityChanged { .. } | ControllerEvent::MutationConfirmed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_refresh() {
        let identity = Identity::from_string("0xABC".to_string()).unwrap();
        assert!(ControllerEvent::IdentityChanged { identity: identity.clone() }.requires_refresh());
        assert!(ControllerEvent::MutationConfirmed {
            slot: ActionSlot::Toggle,
            todo_id: Some(TodoId::from(1)),
            tx_hash: "0x01".to_string(),
        }
        .requires_refresh());
        assert!(!ControllerEvent::MutationFailed {
            slot: ActionSlot::Toggle,
            todo_id: Some(TodoId::from(1)),
            reason: "reverted".to_string(),
        }
        .requires_refresh());
        assert!(!ControllerEvent::SnapshotRefreshed {
            owner: identity,
            record_count: 0,
        }
        .requires_refresh());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ControllerEvent::MutationSubmitted {
            slot: ActionSlot::Create,
            todo_id: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "mutation_submitted");
        assert_eq!(json["slot"], "create");
        assert_eq!(event.event_type(), "mutation_submitted");
    }
}
