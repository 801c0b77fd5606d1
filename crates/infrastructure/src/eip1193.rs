//! EIP-1193 プロバイダー（`window.ethereum` 相当）経由のウォレット・コントラクトアクセス

use crate::abi::{self, createTodoCall, deleteToDoCall, getTodosCall, toggleCompletedCall};
use crate::gateway::{
    PendingTransaction, TodoReader, TodoWriter, TransactionHandle, TransactionReceipt,
    WalletProvider,
};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use domain::{DomainError, Identity, TodoId, TodoRecord, ValidatedTodo};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{AppError, Config};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// EIP-1193 で定義されたプロバイダーエラー
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Error)]
#[error("provider error {code}: {message}")]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl ProviderRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<ProviderRpcError> for AppError {
    fn from(error: ProviderRpcError) -> Self {
        match error.code {
            // ユーザー拒否・未承認
            4001 | 4100 => AppError::UserRejected(error.message),
            // 未対応メソッド・切断・承認リクエスト重複
            4200 | 4900 | 4901 | -32601 | -32002 => AppError::ProviderUnavailable(error.message),
            _ => AppError::Chain(error.message),
        }
    }
}

/// プロバイダーへのリクエスト送信口
#[async_trait]
pub trait Eip1193Transport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError>;
}

fn parse_accounts(value: Value) -> Result<Vec<String>, AppError> {
    serde_json::from_value(value)
        .map_err(|e| AppError::Decode(format!("account list is not a string array: {e}")))
}

fn parse_address(identity: &Identity) -> Result<Address, AppError> {
    identity
        .as_str()
        .parse::<Address>()
        .map_err(|e| AppError::Domain(DomainError::InvalidIdentity(format!("{identity}: {e}"))))
}

pub struct Eip1193Wallet<T> {
    transport: Arc<T>,
}

impl<T: Eip1193Transport> Eip1193Wallet<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: Eip1193Transport> WalletProvider for Eip1193Wallet<T> {
    async fn accounts(&self) -> Result<Vec<String>, AppError> {
        let value = self.transport.request("eth_accounts", json!([])).await?;
        parse_accounts(value)
    }

    async fn request_accounts(&self) -> Result<Vec<String>, AppError> {
        let value = self
            .transport
            .request("eth_requestAccounts", json!([]))
            .await?;
        parse_accounts(value)
    }
}

/// ToDoListコントラクトのプロキシ
pub struct Eip1193Contract<T> {
    transport: Arc<T>,
    address: Address,
    poll_interval: Duration,
}

impl<T: Eip1193Transport + 'static> Eip1193Contract<T> {
    pub fn new(transport: Arc<T>, address: Address, poll_interval: Duration) -> Self {
        Self {
            transport,
            address,
            poll_interval,
        }
    }

    pub fn from_config(transport: Arc<T>, config: &Config) -> Result<Self, AppError> {
        let raw = config.require_contract_address()?;
        let address = raw.parse::<Address>().map_err(|e| {
            AppError::Configuration(format!("TODO_CONTRACT_ADDRESS={raw}: {e}"))
        })?;
        Ok(Self::new(transport, address, config.receipt_poll_interval()))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn send(&self, from: &Identity, data: Vec<u8>) -> Result<PendingTransaction, AppError> {
        let from = parse_address(from)?;
        let params = json!([{
            "from": from,
            "to": self.address,
            "data": Bytes::from(data),
        }]);

        let value = self
            .transport
            .request("eth_sendTransaction", params)
            .await?;
        let tx_hash: String = serde_json::from_value(value)
            .map_err(|e| AppError::Decode(format!("transaction hash is not a string: {e}")))?;

        info!(tx_hash = %tx_hash, from = %from, "トランザクション送信完了");

        Ok(Box::new(Eip1193PendingTransaction {
            transport: self.transport.clone(),
            tx_hash,
            poll_interval: self.poll_interval,
        }))
    }
}

#[async_trait]
impl<T: Eip1193Transport + 'static> TodoReader for Eip1193Contract<T> {
    async fn get_todos(&self, owner: &Identity) -> Result<Vec<TodoRecord>, AppError> {
        let owner = parse_address(owner)?;
        let data = Bytes::from(getTodosCall { owner }.abi_encode());
        let params = json!([{ "to": self.address, "data": data }, "latest"]);

        let value = self.transport.request("eth_call", params).await?;
        let output: Bytes = serde_json::from_value(value)
            .map_err(|e| AppError::Decode(format!("eth_call result is not hex: {e}")))?;

        abi::decode_todos(&output)
    }
}

#[async_trait]
impl<T: Eip1193Transport + 'static> TodoWriter for Eip1193Contract<T> {
    async fn create_todo(
        &self,
        from: &Identity,
        todo: &ValidatedTodo,
    ) -> Result<PendingTransaction, AppError> {
        let call = createTodoCall {
            name: todo.name.clone(),
            description: todo.description.clone(),
            deadline: U256::from(todo.deadline_epoch_seconds),
        };
        self.send(from, call.abi_encode()).await
    }

    async fn toggle_completed(
        &self,
        from: &Identity,
        id: TodoId,
    ) -> Result<PendingTransaction, AppError> {
        let call = toggleCompletedCall { id: id.value() };
        self.send(from, call.abi_encode()).await
    }

    async fn delete_todo(
        &self,
        from: &Identity,
        id: TodoId,
    ) -> Result<PendingTransaction, AppError> {
        let call = deleteToDoCall { id: id.value() };
        self.send(from, call.abi_encode()).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    block_number: Option<String>,
    status: Option<String>,
}

/// レシートが得られるまでポーリングするトランザクションハンドル
pub struct Eip1193PendingTransaction<T> {
    transport: Arc<T>,
    tx_hash: String,
    poll_interval: Duration,
}

#[async_trait]
impl<T: Eip1193Transport + 'static> TransactionHandle for Eip1193PendingTransaction<T> {
    fn tx_hash(&self) -> &str {
        &self.tx_hash
    }

    async fn await_confirmation(self: Box<Self>) -> Result<TransactionReceipt, AppError> {
        let this = *self;
        let mut polls: u64 = 0;

        loop {
            let value = this
                .transport
                .request("eth_getTransactionReceipt", json!([this.tx_hash]))
                .await?;

            if value.is_null() {
                polls += 1;
                debug!(tx_hash = %this.tx_hash, polls, "レシート待機中");
                tokio::time::sleep(this.poll_interval).await;
                continue;
            }

            let receipt: RpcReceipt = serde_json::from_value(value)
                .map_err(|e| AppError::Decode(format!("malformed receipt: {e}")))?;
            let block_number = receipt.block_number.as_deref().and_then(parse_quantity);

            return match receipt.status.as_deref() {
                Some("0x1") | None => Ok(TransactionReceipt {
                    tx_hash: this.tx_hash,
                    block_number,
                }),
                Some(status) => {
                    warn!(tx_hash = %this.tx_hash, status, "トランザクションがリバートされました");
                    Err(AppError::Chain(format!(
                        "transaction {} reverted",
                        this.tx_hash
                    )))
                }
            };
        }
    }
}

fn parse_quantity(value: &str) -> Option<u64> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16).ok()
}
