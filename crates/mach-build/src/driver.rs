//! ビルド実行のループ
//!
//! 探索したターゲットを順にビルドし、必要ならプッシュします。
//! ターゲットは 1 つずつ完了させてから次に進みます。

use crate::auth::RegistryAuth;
use crate::backend::ImageBackend;
use crate::builder::{BuildStage, ImageBuilder, StageError};
use crate::discovery::discover;
use crate::error::{BuildError, BuildResult};
use crate::git::BranchProvider;
use crate::pusher::{PushGate, PushResult};
use crate::tag::Tag;
use mach_config::{BuildConfig, FailurePolicy};
use std::path::PathBuf;

/// 実行中に変化しうるフラグ
///
/// 書き換えるのはドライバーのみ（レジストリ未設定のタグを解決したら `no_push`）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    pub no_push: bool,
    pub dry_run: bool,
}

impl RunState {
    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            no_push: config.no_push,
            dry_run: config.output_only,
        }
    }
}

/// 成功したターゲットの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub dockerfile: PathBuf,
    pub tag: Tag,
    pub pushed: bool,
    pub push_result: PushResult,
}

/// 失敗したターゲット（keep-going 時に記録）
#[derive(Debug)]
pub struct TargetFailure {
    pub dockerfile: PathBuf,
    pub tag: Option<Tag>,
    pub stage: BuildStage,
    pub error: BuildError,
}

impl TargetFailure {
    fn new(dockerfile: PathBuf, failure: StageError) -> Self {
        Self {
            dockerfile,
            tag: failure.tag,
            stage: failure.stage,
            error: failure.error,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<BuildOutcome>,
    pub failures: Vec<TargetFailure>,
}

impl RunReport {
    /// ビルド失敗またはプッシュ失敗があったか
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
            || self
                .outcomes
                .iter()
                .any(|o| matches!(o.push_result, PushResult::Failed(_)))
    }
}

pub struct Driver<'a, B, P> {
    config: &'a BuildConfig,
    builder: ImageBuilder<'a, B, P>,
    gate: PushGate<'a, B>,
}

impl<'a, B: ImageBackend, P: BranchProvider> Driver<'a, B, P> {
    pub fn new(config: &'a BuildConfig, backend: &'a B, branch: P) -> Self {
        Self {
            config,
            builder: ImageBuilder::new(backend, config, branch),
            gate: PushGate::new(backend, config),
        }
    }

    /// 認証情報マネージャーを指定
    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.gate = self.gate.with_auth(auth);
        self
    }

    /// ターゲットを探索してビルド・プッシュする
    ///
    /// `Halt` ポリシーでは最初に失敗したターゲットのエラーを返す。
    /// テンプレートの誤りなど致命的なエラーはポリシーに関わらず中止する。
    #[tracing::instrument(skip_all, fields(root = %self.config.build_image_dirname.display()))]
    pub async fn run(&self, args: &[String]) -> BuildResult<RunReport> {
        let targets = discover(&self.config.build_image_dirname, args)?;
        let mut state = RunState::from_config(self.config);
        let mut report = RunReport::default();

        tracing::debug!(
            targets = targets.len(),
            dry_run = state.dry_run,
            no_push = state.no_push,
            "Starting build run"
        );

        for target in targets {
            let tag = match self.builder.build(&target, state.dry_run).await {
                Ok(tag) => tag,
                Err(failure) => {
                    let failure = TargetFailure::new(target.dockerfile.clone(), failure);
                    tracing::error!(
                        dockerfile = %failure.dockerfile.display(),
                        stage = %failure.stage,
                        "{}",
                        failure.error
                    );

                    if failure.error.is_fatal()
                        || self.config.failure_policy == FailurePolicy::Halt
                    {
                        return Err(failure.error);
                    }
                    report.failures.push(failure);
                    continue;
                }
            };

            if !tag.is_pushable() && !state.no_push {
                tracing::debug!("No registry configured; disabling push");
                state.no_push = true;
            }

            let push_result = self.gate.maybe_push(&tag, &state).await;
            tracing::debug!(tag = %tag, result = %push_result, "Target done");

            report.outcomes.push(BuildOutcome {
                dockerfile: target.dockerfile,
                pushed: push_result.is_completed(),
                tag,
                push_result,
            });

            if self.config.first_only {
                tracing::debug!("first-only: stopping after the first target");
                break;
            }
        }

        Ok(report)
    }
}
