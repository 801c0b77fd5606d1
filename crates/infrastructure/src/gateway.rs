use async_trait::async_trait;
use domain::{Identity, TodoId, TodoRecord, ValidatedTodo};
use serde::{Deserialize, Serialize};
use shared::AppError;

/// 注入されたウォレットプロバイダーの境界
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// 承認済みアカウントの一覧（ユーザーへの確認は行わない）
    async fn accounts(&self) -> Result<Vec<String>, AppError>;

    /// アカウント承認をユーザーに要求
    async fn request_accounts(&self) -> Result<Vec<String>, AppError>;
}

/// コントラクトの読み取り側
#[async_trait]
pub trait TodoReader: Send + Sync {
    async fn get_todos(&self, owner: &Identity) -> Result<Vec<TodoRecord>, AppError>;
}

/// コントラクトの書き込み側。各呼び出しは署名者を明示して送信する
#[async_trait]
pub trait TodoWriter: Send + Sync {
    async fn create_todo(
        &self,
        from: &Identity,
        todo: &ValidatedTodo,
    ) -> Result<PendingTransaction, AppError>;

    async fn toggle_completed(
        &self,
        from: &Identity,
        id: TodoId,
    ) -> Result<PendingTransaction, AppError>;

    async fn delete_todo(&self, from: &Identity, id: TodoId)
        -> Result<PendingTransaction, AppError>;
}

/// 送信済みトランザクション
#[async_trait]
pub trait TransactionHandle: Send {
    fn tx_hash(&self) -> &str;

    /// チェーンでの確定を待つ。タイムアウトはない
    async fn await_confirmation(self: Box<Self>) -> Result<TransactionReceipt, AppError>;
}

pub type PendingTransaction = Box<dyn TransactionHandle>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}
