//! ビルド対象の探索
//!
//! イメージディレクトリ直下の `<name>/Dockerfile*` をビルド対象とします。
//! 引数 `name[:variant]` を指定した場合はそのイメージ（とバリアント）に絞り込みます。

use crate::error::{BuildError, BuildResult};
use crate::tag::is_template;
use glob::{MatchOptions, Pattern};
use mach_config::ConfigError;
use std::path::{Path, PathBuf};

/// 1 つの Dockerfile（テンプレートまたは通常ファイル）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// ビルドコンテキストになるディレクトリ
    pub directory: PathBuf,
    pub dockerfile: PathBuf,
    pub is_template: bool,
}

impl BuildTarget {
    pub fn from_dockerfile(dockerfile: PathBuf) -> Self {
        let directory = dockerfile
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let is_template = is_template(&dockerfile);

        Self {
            directory,
            dockerfile,
            is_template,
        }
    }
}

/// コマンドライン引数 `name[:variant]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub name: String,
    pub variant: Option<String>,
}

impl TargetSpec {
    pub fn parse(arg: &str) -> BuildResult<Self> {
        let (name, variant) = match arg.split_once(':') {
            Some((name, variant)) => (name, Some(variant)),
            None => (arg, None),
        };

        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(BuildError::Pattern(arg.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            variant: variant.filter(|v| !v.is_empty()).map(str::to_string),
        })
    }

    /// `<root>/<name>/Dockerfile[-<variant>]*`
    fn pattern(&self, root: &str) -> String {
        let file = match &self.variant {
            Some(variant) => format!("Dockerfile-{}*", Pattern::escape(variant)),
            None => "Dockerfile*".to_string(),
        };
        format!("{}/{}/{}", root, Pattern::escape(&self.name), file)
    }
}

/// ビルド対象を列挙する
///
/// 引数が無ければイメージディレクトリ全体を、あれば引数の順に探索する。
/// 各パターンの一致はパス順にソートする。
pub fn discover(root: &Path, args: &[String]) -> BuildResult<Vec<BuildTarget>> {
    if !root.is_dir() {
        return Err(ConfigError::BuildRootNotFound(root.to_path_buf()).into());
    }

    let root_str = root
        .to_str()
        .ok_or_else(|| BuildError::Pattern(root.display().to_string()))?;
    let root_pattern = Pattern::escape(root_str.trim_end_matches('/'));

    if args.is_empty() {
        let targets = glob_dockerfiles(&format!("{}/*/Dockerfile*", root_pattern))?;
        tracing::debug!("Discovered {} Dockerfile(s) in {}", targets.len(), root.display());
        return Ok(targets);
    }

    let mut targets = Vec::new();
    for arg in args {
        let spec = TargetSpec::parse(arg)?;
        let matched = glob_dockerfiles(&spec.pattern(&root_pattern))?;
        if matched.is_empty() {
            tracing::warn!("No Dockerfile matches '{}' in {}", arg, root.display());
            continue;
        }
        targets.extend(matched);
    }
    Ok(targets)
}

fn glob_dockerfiles(pattern: &str) -> BuildResult<Vec<BuildTarget>> {
    tracing::debug!("Globbing {}", pattern);

    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };
    let paths = glob::glob_with(pattern, options)
        .map_err(|e| BuildError::Pattern(format!("{}: {}", pattern, e)))?;

    let mut dockerfiles = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => dockerfiles.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!("Skipping unreadable path: {}", e),
        }
    }
    dockerfiles.sort();

    Ok(dockerfiles
        .into_iter()
        .map(BuildTarget::from_dockerfile)
        .collect())
}
