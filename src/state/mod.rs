//! 运行时状态模块
//!
//! 管理组件共享依赖和凭据存储

pub mod app_state;
pub mod credential_store;

pub use app_state::AppState;
pub use credential_store::{CredentialStore, MemoryCredentialStore};
