//! ウォレット接続・トランザクション実行・リスト同期を統合するクライアントコア

pub mod controller;
pub mod executor;
pub mod session;
pub mod state;
pub mod sync;

pub use controller::*;
pub use executor::*;
pub use session::*;
pub use state::*;
pub use sync::*;
