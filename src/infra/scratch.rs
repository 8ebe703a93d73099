//! 临时文件
//!
//! kubeconfig、chart 目录、values 文件都只在一次调用内有效。
//! 返回的 guard 被 drop 时自动删除，任何退出路径都不会残留。

use std::io::Write;
use std::path::PathBuf;

use tempfile::{Builder, TempDir, TempPath};

/// 临时文件位置
#[derive(Clone, Debug, Default)]
pub struct Scratch {
    /// 为空时使用系统临时目录
    dir: Option<PathBuf>,
}

impl Scratch {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// 写入一个仅当前用户可读写的临时文件
    pub fn write_file(&self, prefix: &str, suffix: &str, contents: &str) -> std::io::Result<TempPath> {
        let mut builder = Builder::new();
        builder.prefix(prefix).suffix(suffix);
        let mut file = match self.dir {
            Some(ref dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        Ok(file.into_temp_path())
    }

    /// 创建临时目录
    pub fn dir(&self, prefix: &str) -> std::io::Result<TempDir> {
        let mut builder = Builder::new();
        builder.prefix(prefix);
        match self.dir {
            Some(ref dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }
}
