use domain::ActionSlot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// アプリケーション全体で使用される包括的なエラー型
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    // ドメインエラー
    #[error("Domain error: {0}")]
    Domain(#[from] domain::DomainError),

    // ウォレットエラー
    #[error("Wallet provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Request rejected by user: {0}")]
    UserRejected(String),

    // ローカル検証エラー
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Wallet is not connected")]
    NotConnected,

    #[error("Another {0} operation is already in progress")]
    AlreadyInProgress(ActionSlot),

    // チェーンエラー
    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Decode error: {0}")]
    Decode(String),

    // システムエラー
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// エラーの分類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 利用者の入力・操作に起因
    Client,
    /// ウォレット側に起因
    Wallet,
    /// チェーン・ネットワークに起因
    Chain,
    /// 設定や実装に起因
    Internal,
}

/// エラーの重要度
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// エラーメタデータ
#[derive(Debug, Clone)]
pub struct ErrorMetadata {
    /// エラーコード
    pub code: &'static str,
    /// エラー分類
    pub category: ErrorCategory,
    /// エラー重要度
    pub severity: ErrorSeverity,
    /// 利用者による手動再実行で解決しうるか（自動リトライは行わない）
    pub user_retryable: bool,
}

impl AppError {
    /// エラーメタデータを取得
    pub fn metadata(&self) -> ErrorMetadata {
        let (code, category, severity, user_retryable) = match self {
            AppError::Domain(_) => ("DOMAIN_ERROR", ErrorCategory::Client, ErrorSeverity::Info, false),
            AppError::Validation(_) => (
                "VALIDATION_ERROR",
                ErrorCategory::Client,
                ErrorSeverity::Info,
                false,
            ),
            AppError::NotConnected => (
                "NOT_CONNECTED",
                ErrorCategory::Client,
                ErrorSeverity::Info,
                true,
            ),
            AppError::AlreadyInProgress(_) => (
                "ALREADY_IN_PROGRESS",
                ErrorCategory::Client,
                ErrorSeverity::Info,
                true,
            ),
            AppError::ProviderUnavailable(_) => (
                "PROVIDER_UNAVAILABLE",
                ErrorCategory::Wallet,
                ErrorSeverity::Warning,
                false,
            ),
            AppError::UserRejected(_) => (
                "USER_REJECTED",
                ErrorCategory::Wallet,
                ErrorSeverity::Info,
                true,
            ),
            AppError::Chain(_) => ("CHAIN_ERROR", ErrorCategory::Chain, ErrorSeverity::Error, true),
            AppError::Decode(_) => (
                "DECODE_ERROR",
                ErrorCategory::Internal,
                ErrorSeverity::Critical,
                false,
            ),
            AppError::Configuration(_) => (
                "CONFIGURATION_ERROR",
                ErrorCategory::Internal,
                ErrorSeverity::Critical,
                false,
            ),
        };

        ErrorMetadata {
            code,
            category,
            severity,
            user_retryable,
        }
    }

    /// 入力検証の失敗を `Validation` に変換する（メッセージはドメイン側のものをそのまま使う）
    pub fn from_input(error: domain::DomainError) -> Self {
        use domain::DomainError;
        match error {
            DomainError::Validation(msg)
            | DomainError::InvalidDeadline(msg)
            | DomainError::InvalidIdentity(msg)
            | DomainError::InvalidTodoId(msg) => AppError::Validation(msg),
        }
    }

    /// ユーザー向けメッセージを取得
    pub fn user_message(&self) -> String {
        match self {
            AppError::ProviderUnavailable(_) => {
                "ウォレットが見つかりません。MetaMaskをインストールしてください".to_string()
            }
            AppError::UserRejected(_) => "ウォレットで操作が拒否されました".to_string(),
            AppError::Validation(msg) => format!("入力データが無効です: {msg}"),
            AppError::Domain(e) => format!("入力データが無効です: {e}"),
            AppError::NotConnected => "先にウォレットを接続してください".to_string(),
            AppError::AlreadyInProgress(slot) => {
                format!("{slot} の処理が実行中です。完了までお待ちください")
            }
            AppError::Chain(_) => {
                "トランザクションが失敗しました。再度お試しください".to_string()
            }
            _ => "予期しないエラーが発生しました".to_string(),
        }
    }
}

/// 表示層へ渡すためのエラー情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    pub details: String,
    pub timestamp: String,
}

impl ErrorReport {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            code: error.metadata().code.to_string(),
            message: error.user_message(),
            details: error.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
