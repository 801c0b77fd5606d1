use domain::{ActionSlot, BusySlots};
use infrastructure::{PendingTransaction, TransactionReceipt};
use shared::{trace_operation, AppError};
use std::future::Future;
use tokio::sync::watch;
use tracing::{debug, info};

/// スロット単位で変更操作を直列化し、送信から確定までを実行する
///
/// 同じスロットで実行中の操作がある間、新しい操作は即座に `AlreadyInProgress` で拒否される。
/// 異なるスロット同士は互いに影響しない。
pub struct TransactionExecutor {
    busy: watch::Sender<BusySlots>,
    observer: Option<BusyObserver>,
}

/// フラグが変わるたびに呼ばれる通知先
pub type BusyObserver = Box<dyn Fn(&BusySlots) + Send + Sync>;

impl Default for TransactionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionExecutor {
    pub fn new() -> Self {
        let (busy, _) = watch::channel(BusySlots::default());
        Self {
            busy,
            observer: None,
        }
    }

    /// フラグの設定・解除のたびに `observer` を呼ぶ
    ///
    /// 解除はガードの破棄時に行われるため、パニックや future の破棄でも通知される。
    pub fn with_observer(observer: impl Fn(&BusySlots) + Send + Sync + 'static) -> Self {
        Self {
            observer: Some(Box::new(observer)),
            ..Self::new()
        }
    }

    /// 現在の実行中フラグ
    pub fn busy(&self) -> BusySlots {
        self.busy.borrow().clone()
    }

    pub fn is_busy(&self, slot: ActionSlot) -> bool {
        self.busy.borrow().is_busy(slot)
    }

    pub fn subscribe(&self) -> watch::Receiver<BusySlots> {
        self.busy.subscribe()
    }

    /// フラグの確認と設定を一度に行う。ガードを破棄するとフラグは解除される
    pub fn try_acquire(&self, slot: ActionSlot) -> Result<SlotGuard<'_>, AppError> {
        let acquired = self.busy.send_if_modified(|busy| {
            if busy.is_busy(slot) {
                false
            } else {
                busy.set(slot, true);
                true
            }
        });

        if !acquired {
            debug!(slot = %slot, "スロットが使用中のため拒否");
            return Err(AppError::AlreadyInProgress(slot));
        }

        self.notify();
        Ok(SlotGuard {
            executor: self,
            slot,
        })
    }

    fn notify(&self) {
        if let Some(observer) = &self.observer {
            let busy = self.busy();
            observer(&busy);
        }
    }

    /// 書き込みを送信し、確定まで待つ
    ///
    /// `write_call` はフラグを設定した後に呼ばれる。成功・失敗・パニック・future の破棄の
    /// いずれでもフラグは解除される。
    pub async fn run<F, Fut>(
        &self,
        slot: ActionSlot,
        write_call: F,
    ) -> Result<TransactionReceipt, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PendingTransaction, AppError>>,
    {
        let _guard = self.try_acquire(slot)?;

        trace_operation(operation_name(slot), async move {
            let pending = write_call().await?;
            info!(slot = %slot, tx_hash = %pending.tx_hash(), "トランザクション送信完了、確定待ち");
            pending.await_confirmation().await
        })
        .await
    }
}

fn operation_name(slot: ActionSlot) -> &'static str {
    match slot {
        ActionSlot::Create => "create_todo",
        ActionSlot::Toggle => "toggle_completed",
        ActionSlot::Delete => "delete_todo",
    }
}

/// 実行中フラグを保持するガード
pub struct SlotGuard<'a> {
    executor: &'a TransactionExecutor,
    slot: ActionSlot,
}

impl SlotGuard<'_> {
    pub fn slot(&self) -> ActionSlot {
        self.slot
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let slot = self.slot;
        self.executor.busy.send_modify(|busy| busy.set(slot, false));
        self.executor.notify();
    }
}
