//! 現在のブランチの取得
//!
//! タグのブランチ部分を決めるために、作業ディレクトリの git リポジトリから
//! HEAD の参照名（例: `refs/heads/main`）を取得します。

use crate::error::BuildResult;
use git2::{ErrorCode, Repository};
use std::path::PathBuf;

/// 現在のブランチ参照を提供する
pub trait BranchProvider {
    /// `refs/heads/<branch>` 形式の参照名。リポジトリが無い場合は `None`
    fn current_reference(&self) -> BuildResult<Option<String>>;
}

/// git リポジトリの HEAD を読むプロバイダ
#[derive(Debug, Clone)]
pub struct GitBranchProvider {
    path: PathBuf,
}

impl GitBranchProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for GitBranchProvider {
    fn default() -> Self {
        Self::new(".")
    }
}

impl BranchProvider for GitBranchProvider {
    fn current_reference(&self) -> BuildResult<Option<String>> {
        let repo = match Repository::open(&self.path) {
            Ok(repo) => repo,
            Err(e) if e.code() == ErrorCode::NotFound => {
                tracing::debug!("No git repository at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match repo.head() {
            // detached HEAD の場合は "HEAD" になる
            Ok(head) => Ok(Some(head.name().unwrap_or("HEAD").to_string())),
            // コミットが無いブランチは HEAD のシンボリック参照先を使う
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = repo.find_reference("HEAD")?;
                Ok(head.symbolic_target().map(str::to_string))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// 設定で明示されたブランチを返すプロバイダ
#[derive(Debug, Clone)]
pub struct FixedBranch {
    reference: String,
}

impl FixedBranch {
    /// `feature/x` のような短い名前は `refs/heads/feature/x` として扱う
    pub fn new(branch: &str) -> Self {
        let reference = if branch.starts_with("refs/") {
            branch.to_string()
        } else {
            format!("refs/heads/{}", branch)
        };
        Self { reference }
    }
}

impl BranchProvider for FixedBranch {
    fn current_reference(&self) -> BuildResult<Option<String>> {
        Ok(Some(self.reference.clone()))
    }
}

/// 設定に応じたプロバイダ
#[derive(Debug, Clone)]
pub enum Branch {
    Git(GitBranchProvider),
    Fixed(FixedBranch),
}

impl Branch {
    pub fn from_config(config: &mach_config::BuildConfig) -> Self {
        match config.git_branch.as_deref() {
            Some(branch) if !branch.is_empty() => Branch::Fixed(FixedBranch::new(branch)),
            _ => Branch::Git(GitBranchProvider::default()),
        }
    }
}

impl BranchProvider for Branch {
    fn current_reference(&self) -> BuildResult<Option<String>> {
        match self {
            Branch::Git(provider) => provider.current_reference(),
            Branch::Fixed(provider) => provider.current_reference(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use tempfile::tempdir;

    fn commit_initial(repo: &Repository) -> git2::Oid {
        let sig = Signature::now("mach", "mach@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap()
    }

    #[test]
    fn test_no_repository() {
        let temp_dir = tempdir().unwrap();
        let provider = GitBranchProvider::new(temp_dir.path());

        assert_eq!(provider.current_reference().unwrap(), None);
    }

    #[test]
    fn test_unborn_branch() {
        let temp_dir = tempdir().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        repo.set_head("refs/heads/feature/x").unwrap();

        let provider = GitBranchProvider::new(temp_dir.path());
        assert_eq!(
            provider.current_reference().unwrap().as_deref(),
            Some("refs/heads/feature/x")
        );
    }

    #[test]
    fn test_branch_with_commit() {
        let temp_dir = tempdir().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        repo.set_head("refs/heads/main").unwrap();
        commit_initial(&repo);

        let provider = GitBranchProvider::new(temp_dir.path());
        assert_eq!(
            provider.current_reference().unwrap().as_deref(),
            Some("refs/heads/main")
        );
    }

    #[test]
    fn test_detached_head() {
        let temp_dir = tempdir().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        let oid = commit_initial(&repo);
        repo.set_head_detached(oid).unwrap();

        let provider = GitBranchProvider::new(temp_dir.path());
        assert_eq!(provider.current_reference().unwrap().as_deref(), Some("HEAD"));
    }

    #[test]
    fn test_fixed_branch() {
        assert_eq!(
            FixedBranch::new("feature/x")
                .current_reference()
                .unwrap()
                .as_deref(),
            Some("refs/heads/feature/x")
        );
        assert_eq!(
            FixedBranch::new("refs/heads/main")
                .current_reference()
                .unwrap()
                .as_deref(),
            Some("refs/heads/main")
        );
    }

    #[test]
    fn test_branch_from_config() {
        let config = mach_config::BuildConfig {
            git_branch: Some("release".to_string()),
            ..Default::default()
        };
        assert!(matches!(Branch::from_config(&config), Branch::Fixed(_)));

        let config = mach_config::BuildConfig::default();
        assert!(matches!(Branch::from_config(&config), Branch::Git(_)));
    }
}
