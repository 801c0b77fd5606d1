use crate::errors::DomainError;
use crate::identity::Identity;
use alloy_primitives::U256;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// コントラクトが採番するToDo ID（所有者ごとに一意・単調増加）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TodoId(pub U256);

impl TodoId {
    pub fn new(value: U256) -> Self {
        Self(value)
    }

    /// 10進数文字列からTodoIdを作成
    pub fn from_string(id: &str) -> Result<Self, DomainError> {
        U256::from_str_radix(id.trim(), 10)
            .map(Self)
            .map_err(|e| DomainError::InvalidTodoId(format!("{id}: {e}")))
    }

    pub fn value(&self) -> U256 {
        self.0
    }
}

impl From<u64> for TodoId {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl std::fmt::Display for TodoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoRecord {
    pub id: TodoId,
    pub name: String,
    pub description: String,
    /// UNIX秒（選択日のUTC 0時）
    pub deadline: u64,
    pub completed: bool,
    /// 論理削除フラグ。削除済みレコードは表示から除外されるがスナップショットには残る
    pub deleted: bool,
}

impl TodoRecord {
    pub fn is_visible(&self) -> bool {
        !self.deleted
    }

    pub fn deadline_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.deadline)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// 期限切れかどうか（完了済みは対象外）
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.deadline_at().is_some_and(|deadline| deadline < now)
    }
}

/// 現在のIdentityに対するToDoリストの完全なコピー
///
/// 取得成功のたびに丸ごと置き換えられ、フィールド単位で更新されることはない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoListSnapshot {
    owner: Option<Identity>,
    records: Vec<TodoRecord>,
    fetched_at: Option<DateTime<Utc>>,
}

impl TodoListSnapshot {
    /// 所有者なしの空スナップショット
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(owner: Identity, records: Vec<TodoRecord>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            owner: Some(owner),
            records,
            fetched_at: Some(fetched_at),
        }
    }

    pub fn owner(&self) -> Option<&Identity> {
        self.owner.as_ref()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// 指定したIdentityの取得済みデータかどうか
    pub fn is_loaded_for(&self, identity: &Identity) -> bool {
        self.owner.as_ref() == Some(identity)
    }

    /// 削除済みを含む全レコード
    pub fn records(&self) -> &[TodoRecord] {
        &self.records
    }

    /// 表示対象のレコード（削除済みを除く）
    pub fn visible(&self) -> Vec<&TodoRecord> {
        self.records.iter().filter(|todo| todo.is_visible()).collect()
    }

    pub fn get(&self, id: TodoId) -> Option<&TodoRecord> {
        self.records.iter().find(|todo| todo.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 作成フォームの入力値
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTodo {
    pub name: String,
    pub description: String,
    pub deadline: Option<NaiveDate>,
}

impl NewTodo {
    pub fn new(name: impl Into<String>, description: impl Into<String>, deadline: NaiveDate) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            deadline: Some(deadline),
        }
    }

    /// フォーム文字列（期限は `YYYY-MM-DD`）から作成
    pub fn from_form(name: &str, description: &str, deadline: &str) -> Result<Self, DomainError> {
        let deadline = deadline.trim();
        let deadline = if deadline.is_empty() {
            None
        } else {
            Some(
                NaiveDate::parse_from_str(deadline, "%Y-%m-%d")
                    .map_err(|e| DomainError::InvalidDeadline(format!("{deadline}: {e}")))?,
            )
        };

        Ok(Self {
            name: name.to_string(),
            description: description.to_string(),
            deadline,
        })
    }

    /// 送信前のローカル検証
    pub fn validate(&self, now: DateTime<Utc>) -> Result<ValidatedTodo, DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation("Name is required".to_string()));
        }

        let deadline = self
            .deadline
            .ok_or_else(|| DomainError::Validation("Deadline is required".to_string()))?;

        let midnight = deadline
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| DomainError::InvalidDeadline(deadline.to_string()))?
            .and_utc();

        if midnight <= now {
            return Err(DomainError::Validation(format!(
                "Deadline must be in the future: {deadline}"
            )));
        }

        let deadline_epoch_seconds = u64::try_from(midnight.timestamp())
            .map_err(|_| DomainError::InvalidDeadline(deadline.to_string()))?;

        Ok(ValidatedTodo {
            name: self.name.clone(),
            description: self.description.clone(),
            deadline_epoch_seconds,
        })
    }
}

/// 検証済みの作成リクエスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTodo {
    pub name: String,
    pub description: String,
    pub deadline_epoch_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(id: u64, completed: bool, deleted: bool) -> TodoRecord {
        TodoRecord {
            id: TodoId::from(id),
            name: format!("todo-{id}"),
            description: String::new(),
            deadline: 1_893_456_000,
            completed,
            deleted,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_todo_id_from_string() {
        assert_eq!(TodoId::from_string("42").unwrap(), TodoId::from(42));
        assert!(TodoId::from_string("abc").is_err());
        assert_eq!(TodoId::from(7).to_string(), "7");
    }

    #[test]
    fn test_visible_excludes_tombstones() {
        let owner = Identity::from_string("0xABC".to_string()).unwrap();
        let snapshot = TodoListSnapshot::new(
            owner.clone(),
            vec![record(1, false, false), record(2, true, true)],
            now(),
        );

        assert_eq!(snapshot.len(), 2);
        let visible: Vec<TodoId> = snapshot.visible().iter().map(|t| t.id).collect();
        assert_eq!(visible, vec![TodoId::from(1)]);

        // 削除済みも生データには残る
        assert!(snapshot.get(TodoId::from(2)).unwrap().deleted);
        assert!(snapshot.is_loaded_for(&owner));
    }

    #[test]
    fn test_empty_snapshot_has_no_owner() {
        let snapshot = TodoListSnapshot::empty();
        assert!(snapshot.owner().is_none());
        assert!(snapshot.is_empty());
        assert!(snapshot.fetched_at().is_none());
    }

    #[test]
    fn test_validate_converts_deadline_to_utc_midnight() {
        let draft = NewTodo::new("Buy milk", "2 litres", NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());
        let validated = draft.validate(now()).unwrap();

        let expected = Utc.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap().timestamp() as u64;
        assert_eq!(validated.deadline_epoch_seconds, expected);
        assert_eq!(validated.name, "Buy milk");
    }

    #[test]
    fn test_validate_rejects_missing_name_and_deadline() {
        let blank_name = NewTodo::new("  ", "x", NaiveDate::from_ymd_opt(2027, 1, 1).unwrap());
        assert!(matches!(
            blank_name.validate(now()),
            Err(DomainError::Validation(_))
        ));

        let no_deadline = NewTodo::from_form("x", "y", "").unwrap();
        assert!(matches!(
            no_deadline.validate(now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_past_and_today() {
        let past = NewTodo::new("x", "y", NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
        assert!(matches!(past.validate(now()), Err(DomainError::Validation(_))));

        // 当日の0時はすでに過ぎている
        let today = NewTodo::new("x", "y", now().date_naive());
        assert!(matches!(today.validate(now()), Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_from_form_rejects_malformed_deadline() {
        assert!(matches!(
            NewTodo::from_form("x", "y", "20/10/2026"),
            Err(DomainError::InvalidDeadline(_))
        ));

        let parsed = NewTodo::from_form("x", "y", "2026-10-20").unwrap();
        assert_eq!(parsed.deadline, NaiveDate::from_ymd_opt(2026, 10, 20));
    }

    #[test]
    fn test_is_overdue() {
        let mut todo = record(1, false, false);
        todo.deadline = (now() - Duration::days(1)).timestamp() as u64;
        assert!(todo.is_overdue(now()));

        todo.completed = true;
        assert!(!todo.is_overdue(now()));
    }
}
