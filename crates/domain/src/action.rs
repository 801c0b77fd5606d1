use serde::{Deserialize, Serialize};

/// 実行中の変更操作の排他単位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSlot {
    Create,
    Toggle,
    Delete,
}

impl ActionSlot {
    pub const ALL: [ActionSlot; 3] = [ActionSlot::Create, ActionSlot::Toggle, ActionSlot::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionSlot::Create => "create",
            ActionSlot::Toggle => "toggle",
            ActionSlot::Delete => "delete",
        }
    }

    fn index(&self) -> usize {
        match self {
            ActionSlot::Create => 0,
            ActionSlot::Toggle => 1,
            ActionSlot::Delete => 2,
        }
    }
}

impl std::fmt::Display for ActionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// スロットごとに1つの値を持つ固定長マップ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerSlot<T> {
    values: [T; 3],
}

impl<T> PerSlot<T> {
    pub fn get(&self, slot: ActionSlot) -> &T {
        &self.values[slot.index()]
    }

    pub fn set(&mut self, slot: ActionSlot, value: T) {
        self.values[slot.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionSlot, &T)> {
        ActionSlot::ALL.into_iter().zip(self.values.iter())
    }
}

/// 各スロットの実行中フラグ
pub type BusySlots = PerSlot<bool>;

impl PerSlot<bool> {
    pub fn is_busy(&self, slot: ActionSlot) -> bool {
        *self.get(slot)
    }

    pub fn any(&self) -> bool {
        self.values.iter().any(|busy| *busy)
    }
}
