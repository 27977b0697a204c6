//! イメージタグの解決
//!
//! タグはディレクトリ構成とブランチから決まります:
//!
//! - `images/php/Dockerfile` → `<registry>:php`
//! - `images/php/Dockerfile-8.1.tpl` → `<registry>:php-8.1`
//! - デフォルト以外のブランチ（例: `feature/x`）では末尾に `-x` が付く

use crate::error::BuildResult;
use crate::git::BranchProvider;
use mach_config::BuildConfig;
use std::fmt;
use std::path::Path;

/// テンプレートの拡張子
pub const TEMPLATE_SUFFIX: &str = ".tpl";

/// レジストリに登録するタグ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    registry: String,
    image_name: String,
    variant: String,
}

impl Tag {
    pub fn new(
        registry: impl Into<String>,
        image_name: impl Into<String>,
        variant: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            image_name: image_name.into(),
            variant: variant.into(),
        }
    }

    /// プッシュ先のリポジトリ。未設定なら `None`
    pub fn registry(&self) -> Option<&str> {
        if self.registry.is_empty() {
            None
        } else {
            Some(&self.registry)
        }
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    /// `-arm64-x` のようなサフィックス（空の場合あり）
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// `registry:<ここ>` の部分
    pub fn tag_part(&self) -> String {
        format!("{}{}", self.image_name, self.variant)
    }

    /// レジストリが無いタグはプッシュできない
    pub fn is_pushable(&self) -> bool {
        !self.registry.is_empty()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.registry.is_empty() {
            write!(f, "{}{}", self.image_name, self.variant)
        } else {
            write!(f, "{}:{}{}", self.registry, self.image_name, self.variant)
        }
    }
}

/// Dockerfile がテンプレートか
pub fn is_template(dockerfile: &Path) -> bool {
    dockerfile
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(TEMPLATE_SUFFIX))
}

/// ファイル名に埋め込まれたバリアント
///
/// # Examples
/// - `Dockerfile` -> ``
/// - `Dockerfile-arm64` -> `arm64`
/// - `Dockerfile-arm64.tpl` -> `arm64`
pub fn filename_variant(dockerfile: &Path) -> String {
    let Some(name) = dockerfile.file_name().and_then(|n| n.to_str()) else {
        return String::new();
    };

    match name.split_once('-') {
        Some((_, rest)) => rest.strip_suffix(TEMPLATE_SUFFIX).unwrap_or(rest).to_string(),
        None => String::new(),
    }
}

/// 参照名からブランチの短縮名を取り出す
///
/// タグに `/` は使えないため最後のセグメントを使う。
/// `/` を含まない参照（detached HEAD の `HEAD` など）は `None`。
///
/// # Examples
/// - `refs/heads/main` -> `main`
/// - `refs/heads/feature/x` -> `x`
/// - `heads/x` -> `x`
pub fn branch_short_name(reference: &str) -> Option<&str> {
    if !reference.contains('/') {
        return None;
    }
    reference.rsplit('/').next().filter(|name| !name.is_empty())
}

/// デフォルトブランチ以外なら `-<branch>` を返す
pub fn branch_variant(reference: &str, default_branch: &str) -> String {
    match branch_short_name(reference) {
        Some(branch) if branch != default_branch => format!("-{}", branch),
        _ => String::new(),
    }
}

/// Dockerfile の親ディレクトリ名
fn image_name(dockerfile: &Path) -> String {
    let parent = dockerfile
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    parent
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .or_else(|| {
            let canonical = parent.canonicalize().ok()?;
            canonical
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_default()
}

/// Dockerfile のパス・設定・ブランチからタグを解決する
pub struct TagResolver<B> {
    registry: String,
    default_branch: String,
    branch: B,
}

impl<B: BranchProvider> TagResolver<B> {
    pub fn new(config: &BuildConfig, branch: B) -> Self {
        Self {
            registry: config.docker_registry.clone(),
            default_branch: config.default_git_branch.clone(),
            branch,
        }
    }

    /// 現在のブランチ参照。リポジトリが無い場合はデフォルトブランチとみなす
    fn current_reference(&self) -> BuildResult<String> {
        Ok(self
            .branch
            .current_reference()?
            .unwrap_or_else(|| format!("refs/heads/{}", self.default_branch)))
    }

    pub fn resolve(&self, dockerfile: &Path) -> BuildResult<Tag> {
        let mut variant = match filename_variant(dockerfile) {
            v if v.is_empty() => String::new(),
            v => format!("-{}", v),
        };
        variant.push_str(&branch_variant(
            &self.current_reference()?,
            &self.default_branch,
        ));

        let tag = Tag::new(&self.registry, image_name(dockerfile), variant);
        tracing::debug!(dockerfile = %dockerfile.display(), tag = %tag, "Resolved tag");
        Ok(tag)
    }
}
