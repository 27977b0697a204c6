//! イメージプッシュ処理
//!
//! ビルドしたタグを設定に応じてレジストリへプッシュします。
//! プッシュの失敗はターゲット単位の結果として返し、実行全体は止めません。

use crate::auth::RegistryAuth;
use crate::backend::ImageBackend;
use crate::driver::RunState;
use crate::error::{BuildError, BuildResult};
use crate::log::{BuildLogRecord, interpret_log_line};
use crate::progress::PushProgress;
use crate::tag::Tag;
use bollard::auth::DockerCredentials;
use colored::Colorize;
use futures_util::StreamExt;
use mach_config::BuildConfig;
use std::fmt;
use std::time::Duration;

/// プッシュしなかった理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// --no-push、またはレジストリ未設定
    NoPush,
    /// output-only モード
    DryMode,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoPush => write!(f, "no-push configured"),
            SkipReason::DryMode => write!(f, "dry mode"),
        }
    }
}

/// プッシュの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushResult {
    Skipped(SkipReason),
    Completed,
    Failed(String),
}

impl PushResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, PushResult::Completed)
    }
}

impl fmt::Display for PushResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushResult::Skipped(reason) => write!(f, "skipped ({})", reason),
            PushResult::Completed => write!(f, "pushed"),
            PushResult::Failed(error) => write!(f, "failed: {}", error),
        }
    }
}

/// 設定に応じてタグをプッシュする
pub struct PushGate<'a, B> {
    backend: &'a B,
    auth: RegistryAuth,
    timeout: Duration,
    push_in_dry_mode: bool,
    verbose: bool,
}

impl<'a, B: ImageBackend> PushGate<'a, B> {
    pub fn new(backend: &'a B, config: &BuildConfig) -> Self {
        Self {
            backend,
            auth: RegistryAuth::from_config(config),
            timeout: config.push_timeout(),
            push_in_dry_mode: config.push_in_dry_mode,
            verbose: config.verbose,
        }
    }

    /// 認証情報マネージャーを指定
    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = auth;
        self
    }

    pub async fn maybe_push(&self, tag: &Tag, state: &RunState) -> PushResult {
        if state.no_push {
            return PushResult::Skipped(SkipReason::NoPush);
        }
        if state.dry_run && !self.push_in_dry_mode {
            return PushResult::Skipped(SkipReason::DryMode);
        }

        match self.push(tag).await {
            Ok(()) => PushResult::Completed,
            Err(e) => {
                tracing::warn!(tag = %tag, error = %e, "Push failed");
                PushResult::Failed(e.to_string())
            }
        }
    }

    async fn push(&self, tag: &Tag) -> BuildResult<()> {
        let credentials = self.auth.credentials(tag)?;
        let tag_name = tag.to_string();
        let progress = PushProgress::new(&tag_name);

        let result = tokio::time::timeout(
            self.timeout,
            self.stream_push(tag, credentials, &progress),
        )
        .await
        .unwrap_or(Err(BuildError::PushTimeout(self.timeout)));

        match &result {
            Ok(()) => progress.finish_success(&tag_name),
            Err(e) => progress.finish_error(&e.to_string()),
        }
        result
    }

    async fn stream_push(
        &self,
        tag: &Tag,
        credentials: Option<DockerCredentials>,
        progress: &PushProgress,
    ) -> BuildResult<()> {
        let mut stream = self.backend.push_image(tag, credentials);
        let mut error_message: Option<String> = None;

        while let Some(line) = stream.next().await {
            let record = interpret_log_line(&line?);

            match &record {
                BuildLogRecord::Error(message) => {
                    progress.println(&message.red().to_string());
                    error_message = Some(message.clone());
                }
                // レイヤーごとの進捗はスピナーに表示（ノイズ軽減）
                BuildLogRecord::Status { progress: p, text, .. }
                    if !self.verbose
                        && (p.is_some() || matches!(text.as_str(), "Preparing" | "Waiting")) =>
                {
                    progress.set_message(&record.display_text());
                }
                _ => {
                    for display_line in record.display_lines() {
                        progress.println(&display_line);
                    }
                }
            }
        }

        match error_message {
            Some(message) => Err(BuildError::PushFailed { message }),
            None => Ok(()),
        }
    }
}
