use crate::executor::TransactionExecutor;
use crate::session::WalletSession;
use crate::state::{AppState, ConnectionPhase, ControllerState};
use crate::sync::{InFlight, TodoListSync};
use chrono::Utc;
use domain::{ActionSlot, ControllerEvent, Identity, NewTodo, TodoId, TodoListSnapshot, TodoRecord};
use infrastructure::{
    PendingTransaction, TodoReader, TodoWriter, TransactionReceipt, WalletProvider,
};
use shared::{AppError, Config};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// ウォレット接続・変更操作・リスト同期をまとめる状態機械
///
/// 状態は `subscribe` で、離散イベントは `events` で購読する。
/// どの失敗も状態として記録され、コントローラーは常に接続済みか未接続のどちらかに落ち着く。
pub struct TodoListController {
    session: WalletSession,
    executor: TransactionExecutor,
    sync: TodoListSync,
    writer: Arc<dyn TodoWriter>,
    state: Arc<watch::Sender<AppState>>,
    events: broadcast::Sender<ControllerEvent>,
    identity_announced: AtomicBool,
    refreshes: AtomicUsize,
}

impl TodoListController {
    pub fn new(
        provider: Option<Arc<dyn WalletProvider>>,
        reader: Arc<dyn TodoReader>,
        writer: Arc<dyn TodoWriter>,
        config: &Config,
    ) -> Self {
        let (state, _) = watch::channel(AppState::default());
        let state = Arc::new(state);
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));

        // 実行中フラグは設定・解除のたびに状態へ反映する
        let observed = Arc::clone(&state);
        let executor = TransactionExecutor::with_observer(move |busy| {
            observed.send_if_modified(|state| {
                if state.busy == *busy {
                    return false;
                }
                state.busy = busy.clone();
                true
            });
        });

        info!(
            environment = %config.environment,
            event_channel_capacity = config.event_channel_capacity,
            "コントローラーを初期化"
        );

        Self {
            session: WalletSession::new(provider),
            executor,
            sync: TodoListSync::new(reader),
            writer,
            state,
            events,
            identity_announced: AtomicBool::new(false),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> AppState {
        self.state.borrow().clone()
    }

    pub fn controller_state(&self) -> ControllerState {
        self.state.borrow().controller_state()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.identity()
    }

    pub fn snapshot(&self) -> Arc<TodoListSnapshot> {
        self.sync.snapshot()
    }

    pub fn visible_todos(&self) -> Vec<TodoRecord> {
        self.sync.snapshot().visible().into_iter().cloned().collect()
    }

    /// ページ読み込み時の処理。承認済みアカウントがあれば接続済みとしてリストを取得する
    pub async fn start(&self) -> Result<Option<Identity>, AppError> {
        match self.session.check_existing().await {
            Ok(Some(identity)) => {
                self.adopt_identity(identity.clone()).await;
                Ok(Some(identity))
            }
            Ok(None) => {
                debug!("承認済みアカウントなし");
                self.publish();
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "既存接続の確認に失敗");
                self.state.send_modify(|state| state.connect_error = Some(e.clone()));
                self.publish();
                Err(e)
            }
        }
    }

    /// ウォレット接続を要求する
    pub async fn connect(&self) -> Result<Identity, AppError> {
        if let Some(identity) = self.session.identity() {
            return Ok(identity.clone());
        }

        self.state.send_modify(|state| {
            state.phase = ConnectionPhase::Connecting;
            state.connect_error = None;
        });

        match self.session.connect().await {
            Ok(identity) => {
                self.adopt_identity(identity.clone()).await;
                Ok(identity)
            }
            Err(e) => {
                // 同時に走った別の接続が成功していれば状態は変えない
                if self.session.identity().is_none() {
                    self.state.send_modify(|state| {
                        state.phase = ConnectionPhase::Disconnected;
                        state.connect_error = Some(e.clone());
                    });
                }
                self.publish();
                Err(e)
            }
        }
    }

    /// ToDoを作成する
    ///
    /// 接続確認を入力検証より先に行うため、未接続なら入力が不正でも `NotConnected` を返す。
    /// どちらの拒否もネットワーク呼び出しの前に起きる。
    pub async fn create(&self, draft: NewTodo) -> Result<TransactionReceipt, AppError> {
        let slot = ActionSlot::Create;
        let identity = self.require_identity(slot)?;
        let todo = draft
            .validate(Utc::now())
            .map_err(|e| self.reject(slot, AppError::from_input(e)))?;

        self.mutate(slot, None, || self.writer.create_todo(&identity, &todo))
            .await
    }

    /// フォーム入力（期限は `YYYY-MM-DD`）から作成する。拒否の順序は `create` と同じ
    pub async fn create_from_form(
        &self,
        name: &str,
        description: &str,
        deadline: &str,
    ) -> Result<TransactionReceipt, AppError> {
        self.require_identity(ActionSlot::Create)?;
        let draft = NewTodo::from_form(name, description, deadline)
            .map_err(|e| self.reject(ActionSlot::Create, AppError::from_input(e)))?;
        self.create(draft).await
    }

    pub async fn toggle(&self, id: TodoId) -> Result<TransactionReceipt, AppError> {
        let slot = ActionSlot::Toggle;
        let identity = self.require_identity(slot)?;
        self.mutate(slot, Some(id), || self.writer.toggle_completed(&identity, id))
            .await
    }

    pub async fn delete(&self, id: TodoId) -> Result<TransactionReceipt, AppError> {
        let slot = ActionSlot::Delete;
        let identity = self.require_identity(slot)?;
        self.mutate(slot, Some(id), || self.writer.delete_todo(&identity, id))
            .await
    }

    /// リストを再取得する（取得失敗後の手動再試行にも使う）
    pub async fn refresh(&self) -> Result<Arc<TodoListSnapshot>, AppError> {
        let identity = self.session.identity().cloned();
        let Some(owner) = identity else {
            return self.sync.refresh(None).await;
        };

        let result = {
            let _refreshing = InFlight::enter(&self.refreshes);
            self.publish();
            self.sync.refresh(Some(&owner)).await
        };

        match &result {
            Ok(snapshot) => {
                self.state.send_modify(|state| state.fetch_error = None);
                self.emit(ControllerEvent::SnapshotRefreshed {
                    owner,
                    record_count: snapshot.len(),
                });
            }
            Err(e) => {
                warn!(owner = %owner, error = %e, "リスト取得に失敗。直前のスナップショットを保持");
                self.state.send_modify(|state| state.fetch_error = Some(e.clone()));
                self.emit(ControllerEvent::RefreshFailed {
                    owner,
                    reason: e.to_string(),
                });
            }
        }
        self.publish();
        result
    }

    async fn adopt_identity(&self, identity: Identity) {
        self.state.send_modify(|state| {
            state.phase = ConnectionPhase::Connected;
            state.connect_error = None;
        });
        self.publish();

        // 同時接続で複数回呼ばれても通知は一度だけ
        if !self.identity_announced.swap(true, Ordering::SeqCst) {
            info!(identity = %identity, short = %identity.short(), "Identityを設定");
            self.dispatch(ControllerEvent::IdentityChanged { identity }).await;
        }
    }

    async fn mutate<F, Fut>(
        &self,
        slot: ActionSlot,
        todo_id: Option<TodoId>,
        write_call: F,
    ) -> Result<TransactionReceipt, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PendingTransaction, AppError>>,
    {
        let result = self
            .executor
            .run(slot, || {
                self.emit(ControllerEvent::MutationSubmitted { slot, todo_id });
                write_call()
            })
            .await;

        match result {
            Ok(receipt) => {
                info!(slot = %slot, tx_hash = %receipt.tx_hash, block_number = ?receipt.block_number, "変更操作が確定");
                self.state.send_modify(|state| state.slot_errors.set(slot, None));
                self.publish();
                self.dispatch(ControllerEvent::MutationConfirmed {
                    slot,
                    todo_id,
                    tx_hash: receipt.tx_hash.clone(),
                })
                .await;
                Ok(receipt)
            }
            // 実行中の操作の状態を上書きしない
            Err(e @ AppError::AlreadyInProgress(_)) => Err(e),
            Err(e) => {
                self.state
                    .send_modify(|state| state.slot_errors.set(slot, Some(e.clone())));
                self.publish();
                self.emit(ControllerEvent::MutationFailed {
                    slot,
                    todo_id,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// イベントを通知し、再取得が必要なものはここで処理する
    async fn dispatch(&self, event: ControllerEvent) {
        if let ControllerEvent::IdentityChanged { identity } = &event {
            if !self.sync.snapshot().is_loaded_for(identity) {
                self.sync.reset();
            }
        }

        let requires_refresh = event.requires_refresh();
        self.emit(event);

        if requires_refresh {
            // 失敗は fetch_error として記録済み
            let _ = self.refresh().await;
        }
    }

    fn emit(&self, event: ControllerEvent) {
        debug!(event_type = event.event_type(), "イベント通知");
        // 購読者がいない場合は捨てる
        let _ = self.events.send(event);
    }

    fn require_identity(&self, slot: ActionSlot) -> Result<Identity, AppError> {
        match self.session.identity() {
            Some(identity) if self.state.borrow().is_connected() => Ok(identity.clone()),
            _ => Err(self.reject(slot, AppError::NotConnected)),
        }
    }

    /// ネットワーク呼び出し前の拒否をスロットの失敗として記録する
    fn reject(&self, slot: ActionSlot, error: AppError) -> AppError {
        debug!(slot = %slot, error = %error, "変更操作を送信前に拒否");
        self.state
            .send_modify(|state| state.slot_errors.set(slot, Some(error.clone())));
        error
    }

    /// 各コンポーネントの現在値を状態に反映する
    fn publish(&self) {
        let identity = self.session.identity().cloned();
        let snapshot = self.sync.snapshot();
        let busy = self.executor.busy();
        let refreshing =
            self.refreshes.load(Ordering::SeqCst) > 0 || self.sync.is_refreshing();

        self.state.send_if_modified(|state| {
            let changed = state.identity != identity
                || !Arc::ptr_eq(&state.snapshot, &snapshot)
                || state.busy != busy
                || state.refreshing != refreshing;
            state.identity = identity;
            state.snapshot = snapshot;
            state.busy = busy;
            state.refreshing = refreshing;
            changed
        });
    }
}
