//! プロセス内で完結するチェーンの代替実装（ウォレット＋ToDoListコントラクト）
//!
//! 書き込みは確定時に適用される。確定の保留や失敗を差し込めるため、実行中の排他や
//! 失敗時の状態を検証するテストで使用する。

use crate::gateway::{
    PendingTransaction, TodoReader, TodoWriter, TransactionHandle, TransactionReceipt,
    WalletProvider,
};
use async_trait::async_trait;
use domain::{Identity, TodoId, TodoRecord, ValidatedTodo};
use shared::AppError;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

/// 各境界メソッドの呼び出し回数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounters {
    pub accounts: usize,
    pub request_accounts: usize,
    pub reads: usize,
    pub writes: usize,
    pub confirmations: usize,
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Create(ValidatedTodo),
    Toggle(TodoId),
    Delete(TodoId),
}

#[derive(Default)]
struct ChainState {
    authorized: Vec<String>,
    wallet_accounts: Vec<String>,
    reject_authorization: bool,
    todos: HashMap<String, Vec<TodoRecord>>,
    next_ids: HashMap<String, u64>,
    fail_next_confirmation: Option<String>,
    fail_next_submission: Option<String>,
    fail_next_read: Option<String>,
    counters: CallCounters,
    read_latches: VecDeque<watch::Receiver<bool>>,
    tx_count: u64,
    block_number: u64,
}

struct Inner {
    state: Mutex<ChainState>,
    confirmation_gate: watch::Sender<bool>,
    authorization_gate: watch::Sender<bool>,
    read_gate: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct InMemoryChain {
    inner: Arc<Inner>,
}

impl Default for InMemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChain {
    pub fn new() -> Self {
        let (confirmation_gate, _) = watch::channel(false);
        let (authorization_gate, _) = watch::channel(false);
        let (read_gate, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ChainState::default()),
                confirmation_gate,
                authorization_gate,
                read_gate,
            }),
        }
    }

    /// ウォレットが保持するアカウントを設定（承認要求時に返される）
    pub fn with_wallet_accounts(self, accounts: &[&str]) -> Self {
        self.state().wallet_accounts = accounts.iter().map(|a| a.to_string()).collect();
        self
    }

    /// 承認済みセッションを設定（`eth_accounts` が返す）
    pub fn with_authorized_accounts(self, accounts: &[&str]) -> Self {
        let accounts: Vec<String> = accounts.iter().map(|a| a.to_string()).collect();
        {
            let mut state = self.state();
            state.authorized = accounts.clone();
            if state.wallet_accounts.is_empty() {
                state.wallet_accounts = accounts;
            }
        }
        self
    }

    /// 所有者のレコードを丸ごと置き換える
    pub fn seed(&self, owner: &str, records: Vec<TodoRecord>) {
        let mut state = self.state();
        let max_id = records
            .iter()
            .filter_map(|r| u64::try_from(r.id.value()).ok())
            .max()
            .unwrap_or(0);
        state.next_ids.insert(owner.to_string(), max_id + 1);
        state.todos.insert(owner.to_string(), records);
    }

    pub fn todos(&self, owner: &str) -> Vec<TodoRecord> {
        self.state().todos.get(owner).cloned().unwrap_or_default()
    }

    pub fn counters(&self) -> CallCounters {
        self.state().counters.clone()
    }

    pub fn reject_authorization(&self, reject: bool) {
        self.state().reject_authorization = reject;
    }

    pub fn fail_next_confirmation(&self, reason: &str) {
        self.state().fail_next_confirmation = Some(reason.to_string());
    }

    pub fn fail_next_submission(&self, reason: &str) {
        self.state().fail_next_submission = Some(reason.to_string());
    }

    pub fn fail_next_read(&self, reason: &str) {
        self.state().fail_next_read = Some(reason.to_string());
    }

    /// 確定待ちを保留する（`release_confirmations` まで待機）
    pub fn hold_confirmations(&self) {
        self.inner.confirmation_gate.send_replace(true);
    }

    pub fn release_confirmations(&self) {
        self.inner.confirmation_gate.send_replace(false);
    }

    pub fn hold_authorization(&self) {
        self.inner.authorization_gate.send_replace(true);
    }

    pub fn release_authorization(&self) {
        self.inner.authorization_gate.send_replace(false);
    }

    pub fn hold_reads(&self) {
        self.inner.read_gate.send_replace(true);
    }

    pub fn release_reads(&self) {
        self.inner.read_gate.send_replace(false);
    }

    /// 次に発行される読み取りを個別に保留する
    ///
    /// 呼び出した順に後続の読み取りへ割り当てられる。保留された読み取りは発行時点の
    /// レコードを返すため、複数の読み取りを任意の順序で完了させられる。
    pub fn hold_next_read(&self) -> ReadLatch {
        let (latch, rx) = watch::channel(true);
        self.state().read_latches.push_back(rx);
        ReadLatch(latch)
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn submit(&self, from: &Identity, write: PendingWrite) -> Result<PendingTransaction, AppError> {
        let mut state = self.state();
        state.counters.writes += 1;

        if let Some(reason) = state.fail_next_submission.take() {
            return Err(AppError::Chain(reason));
        }

        state.tx_count += 1;
        let tx_hash = format!("0x{:064x}", state.tx_count);
        debug!(tx_hash = %tx_hash, from = %from, ?write, "トランザクション受付");

        Ok(Box::new(InMemoryTransaction {
            chain: self.clone(),
            from: from.as_str().to_string(),
            tx_hash,
            write,
        }))
    }

    fn confirm(&self, from: &str, tx_hash: &str, write: PendingWrite) -> Result<TransactionReceipt, AppError> {
        let mut state = self.state();
        state.counters.confirmations += 1;

        if let Some(reason) = state.fail_next_confirmation.take() {
            return Err(AppError::Chain(reason));
        }

        match write {
            PendingWrite::Create(todo) => {
                let next_id = state.next_ids.entry(from.to_string()).or_insert(1);
                let id = TodoId::from(*next_id);
                *next_id += 1;
                state.todos.entry(from.to_string()).or_default().push(TodoRecord {
                    id,
                    name: todo.name,
                    description: todo.description,
                    deadline: todo.deadline_epoch_seconds,
                    completed: false,
                    deleted: false,
                });
            }
            PendingWrite::Toggle(id) => {
                let todo = find_live(&mut state, from, id)?;
                todo.completed = !todo.completed;
            }
            PendingWrite::Delete(id) => {
                let todo = find_live(&mut state, from, id)?;
                todo.deleted = true;
            }
        }

        state.block_number += 1;
        Ok(TransactionReceipt {
            tx_hash: tx_hash.to_string(),
            block_number: Some(state.block_number),
        })
    }
}

fn find_live<'a>(
    state: &'a mut ChainState,
    owner: &str,
    id: TodoId,
) -> Result<&'a mut TodoRecord, AppError> {
    state
        .todos
        .get_mut(owner)
        .and_then(|todos| todos.iter_mut().find(|t| t.id == id && !t.deleted))
        .ok_or_else(|| AppError::Chain(format!("execution reverted: todo {id} not found")))
}

async fn wait_open(gate: &watch::Sender<bool>) {
    let mut rx = gate.subscribe();
    // 送信側は常に生存しているため、エラーにはならない
    let _ = rx.wait_for(|held| !*held).await;
}

/// `hold_next_read` で保留した読み取りの解放口。破棄しても解放される
pub struct ReadLatch(watch::Sender<bool>);

impl ReadLatch {
    pub fn release(&self) {
        self.0.send_replace(false);
    }
}

#[async_trait]
impl WalletProvider for InMemoryChain {
    async fn accounts(&self) -> Result<Vec<String>, AppError> {
        let mut state = self.state();
        state.counters.accounts += 1;
        Ok(state.authorized.clone())
    }

    async fn request_accounts(&self) -> Result<Vec<String>, AppError> {
        self.state().counters.request_accounts += 1;
        wait_open(&self.inner.authorization_gate).await;

        let mut state = self.state();
        if state.reject_authorization {
            return Err(AppError::UserRejected("User rejected the request.".to_string()));
        }
        state.authorized = state.wallet_accounts.clone();
        Ok(state.authorized.clone())
    }
}

#[async_trait]
impl TodoReader for InMemoryChain {
    async fn get_todos(&self, owner: &Identity) -> Result<Vec<TodoRecord>, AppError> {
        let latch = {
            let mut state = self.state();
            state.counters.reads += 1;
            state.read_latches.pop_front().map(|latch| {
                let records = state.todos.get(owner.as_str()).cloned().unwrap_or_default();
                (latch, records)
            })
        };
        wait_open(&self.inner.read_gate).await;

        let issued = match latch {
            Some((mut latch, records)) => {
                // 解放口が破棄された場合も待機を終える
                let _ = latch.wait_for(|held| !*held).await;
                Some(records)
            }
            None => None,
        };

        let mut state = self.state();
        if let Some(reason) = state.fail_next_read.take() {
            return Err(AppError::Chain(reason));
        }
        Ok(issued.unwrap_or_else(|| state.todos.get(owner.as_str()).cloned().unwrap_or_default()))
    }
}

#[async_trait]
impl TodoWriter for InMemoryChain {
    async fn create_todo(
        &self,
        from: &Identity,
        todo: &ValidatedTodo,
    ) -> Result<PendingTransaction, AppError> {
        self.submit(from, PendingWrite::Create(todo.clone()))
    }

    async fn toggle_completed(
        &self,
        from: &Identity,
        id: TodoId,
    ) -> Result<PendingTransaction, AppError> {
        self.submit(from, PendingWrite::Toggle(id))
    }

    async fn delete_todo(
        &self,
        from: &Identity,
        id: TodoId,
    ) -> Result<PendingTransaction, AppError> {
        self.submit(from, PendingWrite::Delete(id))
    }
}

struct InMemoryTransaction {
    chain: InMemoryChain,
    from: String,
    tx_hash: String,
    write: PendingWrite,
}

#[async_trait]
impl TransactionHandle for InMemoryTransaction {
    fn tx_hash(&self) -> &str {
        &self.tx_hash
    }

    async fn await_confirmation(self: Box<Self>) -> Result<TransactionReceipt, AppError> {
        let this = *self;
        wait_open(&this.chain.inner.confirmation_gate).await;
        this.chain.confirm(&this.from, &this.tx_hash, this.write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const OWNER: &str = "0xABC";

    fn owner() -> Identity {
        Identity::from_string(OWNER.to_string()).unwrap()
    }

    fn draft(name: &str) -> ValidatedTodo {
        ValidatedTodo {
            name: name.to_string(),
            description: String::new(),
            deadline_epoch_seconds: 1_893_456_000,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_monotonic_ids_on_confirmation() {
        let chain = InMemoryChain::new();

        let first = chain.create_todo(&owner(), &draft("a")).await.unwrap();
        // 確定前は反映されない
        assert!(chain.todos(OWNER).is_empty());
        first.await_confirmation().await.unwrap();

        let second = chain.create_todo(&owner(), &draft("b")).await.unwrap();
        second.await_confirmation().await.unwrap();

        let ids: Vec<TodoId> = chain.todos(OWNER).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![TodoId::from(1), TodoId::from(2)]);
    }

    #[tokio::test]
    async fn test_toggle_and_delete_missing_todo_reverts() {
        let chain = InMemoryChain::new();

        let pending = chain.toggle_completed(&owner(), TodoId::from(9)).await.unwrap();
        assert!(matches!(
            pending.await_confirmation().await,
            Err(AppError::Chain(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_marks_tombstone() {
        let chain = InMemoryChain::new();
        chain
            .create_todo(&owner(), &draft("a"))
            .await
            .unwrap()
            .await_confirmation()
            .await
            .unwrap();

        chain
            .delete_todo(&owner(), TodoId::from(1))
            .await
            .unwrap()
            .await_confirmation()
            .await
            .unwrap();

        let todos = chain.get_todos(&owner()).await.unwrap();
        assert_eq!(todos.len(), 1);
        assert!(todos[0].deleted);
    }

    #[tokio::test]
    async fn test_held_confirmation_waits_for_release() {
        let chain = InMemoryChain::new();
        chain.hold_confirmations();

        let pending = chain.create_todo(&owner(), &draft("a")).await.unwrap();
        let wait = tokio::spawn(pending.await_confirmation());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!wait.is_finished());

        chain.release_confirmations();
        assert!(wait.await.unwrap().is_ok());
        assert_eq!(chain.todos(OWNER).len(), 1);
    }

    #[tokio::test]
    async fn test_latched_reads_complete_in_any_order() {
        let chain = InMemoryChain::new();
        let first_latch = chain.hold_next_read();
        let second_latch = chain.hold_next_read();

        let first = tokio::spawn({
            let chain = chain.clone();
            async move { chain.get_todos(&owner()).await }
        });
        while chain.counters().reads < 1 {
            tokio::task::yield_now().await;
        }
        chain
            .create_todo(&owner(), &draft("later"))
            .await
            .unwrap()
            .await_confirmation()
            .await
            .unwrap();

        let second = tokio::spawn({
            let chain = chain.clone();
            async move { chain.get_todos(&owner()).await }
        });
        second_latch.release();
        let second = second.await.unwrap().unwrap();
        assert!(!first.is_finished());

        drop(first_latch);
        let first = first.await.unwrap().unwrap();

        // 各読み取りは発行時点のレコードを返す
        assert!(first.is_empty());
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_authorization_and_counters() {
        let chain = InMemoryChain::new().with_wallet_accounts(&[OWNER]);
        assert!(chain.accounts().await.unwrap().is_empty());

        assert_eq!(chain.request_accounts().await.unwrap(), vec![OWNER.to_string()]);
        assert_eq!(chain.accounts().await.unwrap(), vec![OWNER.to_string()]);

        chain.reject_authorization(true);
        assert!(matches!(
            chain.request_accounts().await,
            Err(AppError::UserRejected(_))
        ));

        let counters = chain.counters();
        assert_eq!(counters.accounts, 2);
        assert_eq!(counters.request_accounts, 2);
    }
}
