//! ビルド対象 1 つ分のイメージビルド
//!
//! 各ターゲットは次の段階を順に進みます:
//!
//! 1. `Resolving` - タグを解決
//! 2. `Rendering` - テンプレートを展開（テンプレートの場合のみ）
//! 3. `Packaging` - ビルドコンテキストを作成
//! 4. `Invoking` / `Streaming` - ビルドを実行し、ログを解釈
//!
//! output-only モードでは展開結果を標準出力に書いた時点で終了します。
//! 生成した Dockerfile は成否に関わらず削除します。

use crate::backend::{BuildRequest, ImageBackend};
use crate::context::ContextBuilder;
use crate::discovery::BuildTarget;
use crate::error::{BuildError, BuildResult};
use crate::git::BranchProvider;
use crate::log::{BuildLogRecord, LogDisplay, LogTarget, interpret_log_line};
use crate::tag::{Tag, TagResolver};
use crate::template::{RenderTarget, TemplateRenderer};
use futures_util::StreamExt;
use mach_config::BuildConfig;
use std::fmt;
use std::path::Path;

/// ビルドの段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Resolving,
    Rendering,
    Packaging,
    Invoking,
    Streaming,
    Cleanup,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Resolving => "resolving",
            BuildStage::Rendering => "rendering",
            BuildStage::Packaging => "packaging",
            BuildStage::Invoking => "invoking",
            BuildStage::Streaming => "streaming",
            BuildStage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// 失敗した段階と、解決済みならそのタグ
#[derive(Debug)]
pub struct StageError {
    pub stage: BuildStage,
    pub tag: Option<Tag>,
    pub error: BuildError,
}

impl StageError {
    fn new(stage: BuildStage, tag: Option<&Tag>, error: BuildError) -> Self {
        Self {
            stage,
            tag: tag.cloned(),
            error,
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.stage)
    }
}

pub struct ImageBuilder<'a, B, P> {
    backend: &'a B,
    resolver: TagResolver<P>,
    no_cache: bool,
    display: LogDisplay,
}

impl<'a, B: ImageBackend, P: BranchProvider> ImageBuilder<'a, B, P> {
    pub fn new(backend: &'a B, config: &BuildConfig, branch: P) -> Self {
        Self {
            backend,
            resolver: TagResolver::new(config, branch),
            no_cache: config.no_cache,
            display: LogDisplay::new(LogTarget::Stdout),
        }
    }

    /// ターゲットをビルドして解決済みのタグを返す
    ///
    /// `dry_run` の場合は Dockerfile を標準出力に書くだけでビルドしない。
    pub async fn build(&self, target: &BuildTarget, dry_run: bool) -> Result<Tag, StageError> {
        let tag = self
            .resolver
            .resolve(&target.dockerfile)
            .map_err(|e| StageError::new(BuildStage::Resolving, None, e))?;

        if dry_run {
            print_dockerfile(target)
                .map_err(|e| StageError::new(BuildStage::Rendering, Some(&tag), e))?;
            return Ok(tag);
        }

        if !target.is_template {
            self.invoke(target, &file_name(&target.dockerfile), &tag)
                .await?;
            return Ok(tag);
        }

        let generated = TemplateRenderer::generated_path(&target.dockerfile);
        let result = match TemplateRenderer::render(
            &target.dockerfile,
            &RenderTarget::File(generated.clone()),
        ) {
            Ok(()) => self.invoke(target, &file_name(&generated), &tag).await,
            Err(e) => Err(StageError::new(BuildStage::Rendering, Some(&tag), e)),
        };

        let cleanup = remove_generated(&generated)
            .map_err(|e| StageError::new(BuildStage::Cleanup, Some(&tag), e));

        match (result, cleanup) {
            (Ok(()), Ok(())) => Ok(tag),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(build_error), Err(cleanup_error)) => {
                tracing::error!(
                    dockerfile = %target.dockerfile.display(),
                    stage = %build_error.stage,
                    "Build failed before cleanup: {}",
                    build_error.error
                );
                Err(cleanup_error)
            }
        }
    }

    /// コンテキストを作成してビルドを実行し、ログを表示する
    async fn invoke(
        &self,
        target: &BuildTarget,
        dockerfile_name: &str,
        tag: &Tag,
    ) -> Result<(), StageError> {
        let context = ContextBuilder::create_context(&target.directory)
            .map_err(|e| StageError::new(BuildStage::Packaging, Some(tag), e))?;

        let request = BuildRequest {
            context,
            dockerfile: dockerfile_name.to_string(),
            tag: tag.to_string(),
            no_cache: self.no_cache,
        };

        let mut stage = BuildStage::Invoking;
        let mut stream = self.backend.build_image(request);

        while let Some(line) = stream.next().await {
            let line = line.map_err(|e| StageError::new(stage, Some(tag), e))?;
            stage = BuildStage::Streaming;

            let record = interpret_log_line(&line);
            self.display.show(&record);

            if let BuildLogRecord::Error(message) = record {
                return Err(StageError::new(
                    stage,
                    Some(tag),
                    BuildError::BuildFailed(message),
                ));
            }
        }

        tracing::info!("Successfully built: {}", tag);
        Ok(())
    }
}

/// output-only モードの出力
///
/// テンプレートは展開結果を、通常の Dockerfile はそのままの内容を書く。
fn print_dockerfile(target: &BuildTarget) -> BuildResult<()> {
    if target.is_template {
        return TemplateRenderer::render(&target.dockerfile, &RenderTarget::Stdout);
    }

    let mut file = std::fs::File::open(&target.dockerfile)?;
    let stdout = std::io::stdout();
    std::io::copy(&mut file, &mut stdout.lock())?;
    Ok(())
}

fn remove_generated(path: &Path) -> BuildResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(BuildError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
