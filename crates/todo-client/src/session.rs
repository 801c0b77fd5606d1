use domain::Identity;
use futures::future::{BoxFuture, FutureExt, Shared};
use infrastructure::WalletProvider;
use shared::AppError;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, info, warn};

type AuthorizationRequest = Shared<BoxFuture<'static, Result<String, AppError>>>;

/// ウォレット接続とIdentityの管理
///
/// Identityは一度設定されるとプロセス終了まで変わらない。
pub struct WalletSession {
    provider: Option<Arc<dyn WalletProvider>>,
    identity: OnceLock<Identity>,
    outstanding: Mutex<Option<AuthorizationRequest>>,
}

impl WalletSession {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        Self {
            provider,
            identity: OnceLock::new(),
            outstanding: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.get()
    }

    /// 承認済みアカウントがあればIdentityとして採用する（ユーザーへの確認は行わない）
    pub async fn check_existing(&self) -> Result<Option<Identity>, AppError> {
        if let Some(identity) = self.identity() {
            return Ok(Some(identity.clone()));
        }

        let Some(provider) = &self.provider else {
            debug!("ウォレットプロバイダーが見つからないため既存接続の確認をスキップ");
            return Ok(None);
        };

        let accounts = provider.accounts().await?;
        match accounts.into_iter().next() {
            Some(address) => {
                let identity = self.adopt(address)?;
                info!(identity = %identity, "承認済みセッションを検出");
                Ok(Some(identity))
            }
            None => Ok(None),
        }
    }

    /// アカウント承認を要求する
    ///
    /// 要求中に呼ばれた場合は新たなプロンプトを出さず、実行中の要求の結果を共有する。
    pub async fn connect(&self) -> Result<Identity, AppError> {
        if let Some(identity) = self.identity() {
            return Ok(identity.clone());
        }

        let provider = self.provider.clone().ok_or_else(|| {
            AppError::ProviderUnavailable("No injected wallet provider found".to_string())
        })?;

        let request = {
            let mut outstanding = self.lock_outstanding();
            match outstanding.as_ref() {
                Some(request) => {
                    debug!("承認要求が実行中のため結果を待機");
                    request.clone()
                }
                None => {
                    let request = request_authorization(provider);
                    *outstanding = Some(request.clone());
                    request
                }
            }
        };

        let result = request.clone().await;

        {
            let mut outstanding = self.lock_outstanding();
            if outstanding.as_ref().is_some_and(|current| current.ptr_eq(&request)) {
                *outstanding = None;
            }
        }

        match result {
            Ok(address) => {
                let identity = self.adopt(address)?;
                info!(identity = %identity, "ウォレット接続完了");
                Ok(identity)
            }
            Err(e) => {
                warn!(error = %e, "ウォレット接続失敗");
                Err(e)
            }
        }
    }

    /// 既に設定済みならその値を返す
    fn adopt(&self, address: String) -> Result<Identity, AppError> {
        let candidate = Identity::from_string(address)?;
        Ok(self.identity.get_or_init(|| candidate).clone())
    }

    fn lock_outstanding(&self) -> std::sync::MutexGuard<'_, Option<AuthorizationRequest>> {
        self.outstanding
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn request_authorization(provider: Arc<dyn WalletProvider>) -> AuthorizationRequest {
    async move {
        let accounts = provider.request_accounts().await?;
        accounts
            .into_iter()
            .next()
            .ok_or_else(|| AppError::UserRejected("Wallet returned no accounts".to_string()))
    }
    .boxed()
    .shared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrastructure::InMemoryChain;

    const OWNER: &str = "0xABC";

    fn session(chain: &InMemoryChain) -> WalletSession {
        WalletSession::new(Some(Arc::new(chain.clone())))
    }

    #[tokio::test]
    async fn test_check_existing_is_idempotent() {
        let chain = InMemoryChain::new().with_authorized_accounts(&[OWNER, "0xDEF"]);
        let session = session(&chain);

        let first = session.check_existing().await.unwrap();
        let second = session.check_existing().await.unwrap();

        assert_eq!(first.as_ref().map(|i| i.as_str()), Some(OWNER));
        assert_eq!(first, second);
        assert_eq!(chain.counters().request_accounts, 0);
    }

    #[tokio::test]
    async fn test_check_existing_without_session() {
        let chain = InMemoryChain::new();
        let session = session(&chain);

        assert_eq!(session.check_existing().await.unwrap(), None);
        assert!(session.identity().is_none());
    }

    #[tokio::test]
    async fn test_check_existing_without_provider() {
        let session = WalletSession::new(None);
        assert_eq!(session.check_existing().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_connect_without_provider_fails() {
        let session = WalletSession::new(None);
        assert!(matches!(
            session.connect().await,
            Err(AppError::ProviderUnavailable(_))
        ));
        assert!(session.identity().is_none());
    }

    #[tokio::test]
    async fn test_connect_rejected_keeps_identity_absent() {
        let chain = InMemoryChain::new().with_wallet_accounts(&[OWNER]);
        chain.reject_authorization(true);
        let session = session(&chain);

        assert!(matches!(
            session.connect().await,
            Err(AppError::UserRejected(_))
        ));
        assert!(session.identity().is_none());

        // 拒否後の再接続は新しい要求になる
        chain.reject_authorization(false);
        assert_eq!(session.connect().await.unwrap().as_str(), OWNER);
        assert_eq!(chain.counters().request_accounts, 2);
    }

    #[tokio::test]
    async fn test_concurrent_connect_issues_single_prompt() {
        let chain = InMemoryChain::new().with_wallet_accounts(&[OWNER]);
        chain.hold_authorization();
        let session = session(&chain);

        let connects = futures::future::join(session.connect(), async {
            tokio::task::yield_now().await;
            chain.release_authorization();
            session.connect().await
        });
        let (first, second) = connects.await;

        assert_eq!(first.unwrap().as_str(), OWNER);
        assert_eq!(second.unwrap().as_str(), OWNER);
        assert_eq!(chain.counters().request_accounts, 1);
    }

    #[tokio::test]
    async fn test_identity_is_read_consistent() {
        let chain = InMemoryChain::new().with_wallet_accounts(&[OWNER]);
        let session = session(&chain);

        let connected = session.connect().await.unwrap();
        // ウォレット側でアカウントが変わっても追従しない
        let _ = chain.clone().with_authorized_accounts(&["0xDEF"]);
        assert_eq!(session.check_existing().await.unwrap(), Some(connected.clone()));
        assert_eq!(session.connect().await.unwrap(), connected);
        assert_eq!(chain.counters().request_accounts, 1);
    }
}
