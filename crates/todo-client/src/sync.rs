use chrono::Utc;
use domain::{Identity, TodoListSnapshot};
use infrastructure::TodoReader;
use shared::{trace_operation, AppError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// 現在のIdentityのToDoリストを取得し、スナップショットとして公開する
///
/// 公開中のスナップショットは取得成功のたびに丸ごと差し替えられる。
/// 同時に複数の取得が走った場合は、最後に完了したものが残る。
pub struct TodoListSync {
    reader: Arc<dyn TodoReader>,
    snapshot: watch::Sender<Arc<TodoListSnapshot>>,
    in_flight: AtomicUsize,
}

impl TodoListSync {
    pub fn new(reader: Arc<dyn TodoReader>) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(TodoListSnapshot::empty()));
        Self {
            reader,
            snapshot,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<TodoListSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<TodoListSnapshot>> {
        self.snapshot.subscribe()
    }

    /// 取得中の読み取りが1つ以上あるか
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// 公開中のスナップショットを破棄する
    pub fn reset(&self) {
        debug!("スナップショットを破棄");
        self.snapshot.send_replace(Arc::new(TodoListSnapshot::empty()));
    }

    /// リストを再取得する
    ///
    /// Identityがなければ空のスナップショットを返し、公開中のものには触れない。
    /// 失敗時は直前のスナップショットを保持したままエラーを返す。
    pub async fn refresh(
        &self,
        identity: Option<&Identity>,
    ) -> Result<Arc<TodoListSnapshot>, AppError> {
        let Some(owner) = identity else {
            debug!("Identity未設定のため取得をスキップ");
            return Ok(Arc::new(TodoListSnapshot::empty()));
        };

        let _in_flight = InFlight::enter(&self.in_flight);

        let records = trace_operation("get_todos", self.reader.get_todos(owner)).await?;
        let snapshot = Arc::new(TodoListSnapshot::new(owner.clone(), records, Utc::now()));

        info!(
            owner = %owner,
            record_count = snapshot.len(),
            visible_count = snapshot.visible().len(),
            "スナップショットを更新"
        );
        self.snapshot.send_replace(snapshot.clone());
        Ok(snapshot)
    }
}

/// 取得中の数を数えるガード
pub(crate) struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    pub(crate) fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
