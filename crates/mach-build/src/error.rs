use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] mach_config::ConfigError),

    #[error("Template error: {file}\n{message}")]
    Template { file: PathBuf, message: String },

    #[error("Invalid target pattern: {0}")]
    Pattern(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Failed to remove generated Dockerfile {path}: {source}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("Push timed out after {}s", .0.as_secs())]
    PushTimeout(Duration),

    #[error("Authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// 実行全体を中止すべきエラーか
    ///
    /// テンプレートや設定の誤り、生成ファイルの削除失敗はターゲット単位ではなく
    /// 実行全体の問題として扱う。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BuildError::Config(_)
                | BuildError::Template { .. }
                | BuildError::Pattern(_)
                | BuildError::Git(_)
                | BuildError::Cleanup { .. }
        )
    }

    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::Template { file, message } => {
                format!(
                    "テンプレートの展開に失敗しました: {}\n\
                     {}\n\
                     \n\
                     解決方法:\n\
                     1. テンプレートの構文を確認してください\n\
                     2. includes/ 内のテンプレート名が正しいか確認してください",
                    file.display(),
                    message
                )
            }
            BuildError::BuildFailed(msg) => {
                format!(
                    "ビルドに失敗しました: {}\n\
                     \n\
                     Dockerfileの内容を確認してください。",
                    msg
                )
            }
            BuildError::DockerConnection(e) => {
                format!(
                    "Docker接続エラー: {}\n\
                     \n\
                     Dockerが起動しているか確認してください。",
                    e
                )
            }
            BuildError::Cleanup { path, source } => {
                format!(
                    "生成したDockerfileを削除できませんでした: {}\n理由: {}\n\
                     \n\
                     イメージディレクトリの権限を確認してください。",
                    path.display(),
                    source
                )
            }
            _ => format!("{}", self),
        }
    }
}

/// tera のエラーは原因が source チェーンに入っているため連結して表示する
pub(crate) fn tera_error_message(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(&format!("\n  caused by: {}", cause));
        source = cause.source();
    }
    message
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
