//! 基础设施模块
//!
//! 封装外部依赖（命令执行、加密、临时文件）

pub mod cipher;
pub mod command;
pub mod scratch;

pub use cipher::{AesGcmCipher, PlainCipher, SecretCipher};
pub use command::{CommandExecutor, CommandOutput, CommandSpec, ProcessRunner};
pub use scratch::Scratch;
