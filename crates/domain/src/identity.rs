use crate::errors::DomainError;
use serde::{Deserialize, Serialize};

/// 接続中のウォレットアドレス（ToDoリストの所有者かつトランザクション署名者）
///
/// ウォレットが返した文字列をそのまま保持する。チェックサム形式への正規化は行わない。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// 文字列からIdentityを作成
    pub fn from_string(address: String) -> Result<Self, DomainError> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidIdentity(
                "Address cannot be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// アドレスを文字列として取得
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 表示用の短縮形（例: `0x1234...abcd`）
    pub fn short(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 10 {
            return self.0.clone();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
