//! mach の実行設定
//!
//! `.mach.yaml` の読み込み、デフォルト値、CLI / 環境変数による上書きを扱います。
//! 読み込んだ設定は実行中は読み取り専用として各コンポーネントに渡されます。

pub mod error;

pub use error::*;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// カレントディレクトリで探す設定ファイル名（優先順）
pub const CONFIG_FILE_CANDIDATES: [&str; 2] = [".mach.yaml", ".mach.yml"];

/// デフォルトのレジストリサーバー（Docker Hub）
pub const DEFAULT_DOCKER_HOST: &str = "https://index.docker.io/v1/";

/// プッシュのタイムアウト（30分）
pub const DEFAULT_PUSH_TIMEOUT_SECS: u64 = 30 * 60;

/// ビルド失敗時の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// 最初のビルドエラーで実行全体を中止する
    #[default]
    Halt,
    /// 失敗したターゲットを記録して次のターゲットへ進む
    Continue,
}

/// ビルド実行の設定
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Dockerfile を探すルートディレクトリ
    #[serde(alias = "BuildImageDirname", alias = "buildImageDirname")]
    pub build_image_dirname: PathBuf,
    /// ブランチ名をタグに含めないブランチ
    #[serde(alias = "defaultGitBranch")]
    pub default_git_branch: String,
    /// 現在のブランチを明示する（CI の detached HEAD 向け）
    #[serde(alias = "gitBranch")]
    pub git_branch: Option<String>,
    /// レジストリのサーバーアドレス（認証用）
    pub docker_host: String,
    /// プッシュ先のリポジトリ（例: acme/app）。空ならプッシュしない
    pub docker_registry: String,
    pub docker_user: String,
    #[serde(alias = "docker_pass")]
    pub docker_password: String,
    pub no_push: bool,
    pub output_only: bool,
    pub first_only: bool,
    pub no_cache: bool,
    pub verbose: bool,
    pub failure_policy: FailurePolicy,
    /// output-only でもプッシュを試みる
    pub push_in_dry_mode: bool,
    pub push_timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build_image_dirname: PathBuf::from("."),
            default_git_branch: "main".to_string(),
            git_branch: None,
            docker_host: DEFAULT_DOCKER_HOST.to_string(),
            docker_registry: String::new(),
            docker_user: String::new(),
            docker_password: String::new(),
            no_push: false,
            output_only: false,
            first_only: false,
            no_cache: false,
            verbose: false,
            failure_policy: FailurePolicy::Halt,
            push_in_dry_mode: false,
            push_timeout_secs: DEFAULT_PUSH_TIMEOUT_SECS,
        }
    }
}

/// CLI フラグ・環境変数からの上書き値
///
/// `Option` は指定された場合のみ上書きし、bool フラグは有効化のみ行います。
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub build_image_dirname: Option<PathBuf>,
    pub default_git_branch: Option<String>,
    pub git_branch: Option<String>,
    pub docker_host: Option<String>,
    pub docker_registry: Option<String>,
    pub docker_user: Option<String>,
    pub docker_password: Option<String>,
    pub push_timeout_secs: Option<u64>,
    pub no_push: bool,
    pub output_only: bool,
    pub first_only: bool,
    pub no_cache: bool,
    pub verbose: bool,
    pub keep_going: bool,
    pub push_in_dry_mode: bool,
}

impl BuildConfig {
    /// YAML 設定ファイルを読み込む
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        if content.trim().is_empty() {
            tracing::debug!("Config file {} is empty, using defaults", path.display());
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 設定ファイルを探して読み込む。見つからなければデフォルト値
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        match find_config_file(explicit)? {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                let config = Self::load(&path)?;
                Ok((config, Some(path)))
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok((Self::default(), None))
            }
        }
    }

    /// CLI / 環境変数の値を反映
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(dir) = overrides.build_image_dirname {
            self.build_image_dirname = dir;
        }
        if let Some(branch) = overrides.default_git_branch {
            self.default_git_branch = branch;
        }
        if let Some(branch) = overrides.git_branch {
            self.git_branch = Some(branch);
        }
        if let Some(host) = overrides.docker_host {
            self.docker_host = host;
        }
        if let Some(registry) = overrides.docker_registry {
            self.docker_registry = registry;
        }
        if let Some(user) = overrides.docker_user {
            self.docker_user = user;
        }
        if let Some(password) = overrides.docker_password {
            self.docker_password = password;
        }
        if let Some(secs) = overrides.push_timeout_secs {
            self.push_timeout_secs = secs;
        }

        self.no_push |= overrides.no_push;
        self.output_only |= overrides.output_only;
        self.first_only |= overrides.first_only;
        self.no_cache |= overrides.no_cache;
        self.verbose |= overrides.verbose;
        self.push_in_dry_mode |= overrides.push_in_dry_mode;

        if overrides.keep_going {
            self.failure_policy = FailurePolicy::Continue;
        }
    }

    /// ビルドルートの存在確認
    pub fn validate(&self) -> Result<()> {
        if !self.build_image_dirname.is_dir() {
            return Err(ConfigError::BuildRootNotFound(
                self.build_image_dirname.clone(),
            ));
        }
        Ok(())
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }
}

/// mach の設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 明示的な指定（--config）。存在しなければエラー
/// 2. 環境変数 MACH_CONFIG
/// 3. カレントディレクトリ: .mach.yaml, .mach.yml
/// 4. ~/.config/mach/config.yaml (グローバル設定)
///
/// どれも無い場合は `Ok(None)`（デフォルト値で動作）
pub fn find_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    // 1. 明示的な指定
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ConfigError::ConfigFileNotFound(path.to_path_buf()));
    }

    // 2. 環境変数で直接指定
    if let Ok(config_path) = std::env::var("MACH_CONFIG") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        tracing::warn!("MACH_CONFIG points to a missing file: {}", path.display());
    }

    // 3. カレントディレクトリで検索
    let current_dir = std::env::current_dir()?;
    for filename in &CONFIG_FILE_CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    // 4. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("mach").join("config.yaml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}
