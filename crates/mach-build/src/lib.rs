//! mach のイメージビルド機能
//!
//! Dockerfile（またはテンプレート）の探索、タグの解決、テンプレート展開、
//! ビルドコンテキストの作成、イメージのビルドとレジストリへのプッシュを提供します。

pub mod auth;
pub mod backend;
pub mod builder;
pub mod context;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod git;
pub mod log;
pub mod progress;
pub mod pusher;
pub mod tag;
pub mod template;

#[cfg(test)]
mod testing;

pub use auth::RegistryAuth;
pub use backend::{BuildRequest, DockerBackend, ImageBackend};
pub use builder::{BuildStage, ImageBuilder, StageError};
pub use context::ContextBuilder;
pub use discovery::{BuildTarget, TargetSpec, discover};
pub use driver::{BuildOutcome, Driver, RunReport, RunState, TargetFailure};
pub use error::{BuildError, BuildResult};
pub use git::{Branch, BranchProvider, FixedBranch, GitBranchProvider};
pub use log::{BuildLogRecord, LogDisplay, LogTarget, interpret_log_line};
pub use pusher::{PushGate, PushResult, SkipReason};
pub use tag::{Tag, TagResolver};
pub use template::{RenderTarget, TemplateRenderer};
