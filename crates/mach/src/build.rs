use crate::docker;
use clap::Args;
use colored::Colorize;
use mach_build::{Branch, DockerBackend, Driver, PushResult, RunReport};
use mach_config::{BuildConfig, ConfigOverrides};
use std::path::PathBuf;

/// build サブコマンドの引数
#[derive(Debug, Args)]
pub struct BuildArgs {
    /// ビルド対象 (name または name:variant)。省略時は全イメージ
    pub targets: Vec<String>,

    /// ビルド後にプッシュしない
    #[arg(short = 'n', long)]
    pub no_push: bool,

    /// キャッシュを使わずにビルド
    #[arg(long)]
    pub no_cache: bool,

    /// ビルドせずに Dockerfile を標準出力に書き出す
    #[arg(short = 'o', long)]
    pub output_only: bool,

    /// 最初のターゲットだけ処理する
    #[arg(short = 'f', long)]
    pub first_only: bool,

    /// 詳細なログを表示
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// ビルドに失敗しても残りのターゲットを続ける
    #[arg(long)]
    pub keep_going: bool,

    /// output-only モードでもプッシュする
    #[arg(long)]
    pub push_in_dry_mode: bool,

    /// 設定ファイルのパス (環境変数 MACH_CONFIG でも指定可)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// イメージディレクトリ
    #[arg(long, env = "MACH_BUILD_IMAGE_DIRNAME")]
    pub build_image_dirname: Option<PathBuf>,

    /// タグにブランチ名を付けないブランチ
    #[arg(long, env = "MACH_DEFAULT_GIT_BRANCH")]
    pub default_git_branch: Option<String>,

    /// git リポジトリを参照せずに使うブランチ名
    #[arg(long = "branch", env = "MACH_GIT_BRANCH")]
    pub git_branch: Option<String>,

    /// 認証に使うレジストリのアドレス
    #[arg(long, env = "MACH_DOCKER_HOST")]
    pub docker_host: Option<String>,

    /// プッシュ先のリポジトリ (例: acme/app)
    #[arg(long, env = "MACH_DOCKER_REGISTRY")]
    pub docker_registry: Option<String>,

    #[arg(long, env = "MACH_DOCKER_USER")]
    pub docker_user: Option<String>,

    #[arg(long, env = "MACH_DOCKER_PASSWORD", hide_env_values = true)]
    pub docker_password: Option<String>,

    /// プッシュのタイムアウト（秒）
    #[arg(long = "push-timeout", env = "MACH_PUSH_TIMEOUT")]
    pub push_timeout_secs: Option<u64>,
}

impl BuildArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            build_image_dirname: self.build_image_dirname.clone(),
            default_git_branch: self.default_git_branch.clone(),
            git_branch: self.git_branch.clone(),
            docker_host: self.docker_host.clone(),
            docker_registry: self.docker_registry.clone(),
            docker_user: self.docker_user.clone(),
            docker_password: self.docker_password.clone(),
            push_timeout_secs: self.push_timeout_secs,
            no_push: self.no_push,
            output_only: self.output_only,
            first_only: self.first_only,
            no_cache: self.no_cache,
            verbose: self.verbose,
            keep_going: self.keep_going,
            push_in_dry_mode: self.push_in_dry_mode,
        }
    }
}

/// 設定ファイルを読み込み、CLI / 環境変数の値で上書きする
pub fn load_config(args: &BuildArgs) -> anyhow::Result<(BuildConfig, Option<PathBuf>)> {
    let (mut config, path) = BuildConfig::discover(args.config.as_deref())?;
    config.apply(args.overrides());
    config.validate()?;
    Ok((config, path))
}

/// ビルドコマンドを処理
pub async fn handle_build_command(
    targets: &[String],
    config: BuildConfig,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let dry_run = config.output_only;
    tracing::debug!(
        ?targets,
        ?config_path,
        registry = %config.docker_registry,
        dry_run,
        "Starting build command"
    );

    // output-only の stdout は Dockerfile のみ
    if !dry_run {
        println!("{}", "Dockerイメージをビルド中...".green());
        if let Some(path) = &config_path {
            println!("設定ファイル: {}", path.display().to_string().cyan());
        }
        println!(
            "イメージディレクトリ: {}",
            config.build_image_dirname.display().to_string().cyan()
        );
        if config.docker_registry.is_empty() {
            println!(
                "{}",
                "レジストリが未設定のため、プッシュは行いません".yellow()
            );
        } else {
            println!("レジストリ: {}", config.docker_registry.cyan());
        }
        println!();
    }

    let docker_conn = if dry_run {
        docker::connect_without_ping()?
    } else {
        docker::init_docker_with_error_handling().await?
    };
    let backend = DockerBackend::new(docker_conn);
    let branch = Branch::from_config(&config);

    let report = match Driver::new(&config, &backend, branch).run(targets).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "✗".red().bold(), e.user_message());
            return Err(anyhow::anyhow!("ビルドに失敗しました"));
        }
    };

    if report.outcomes.is_empty() && report.failures.is_empty() {
        eprintln!("{}", "ビルド対象の Dockerfile がありません".yellow());
        return Ok(());
    }

    if !dry_run {
        print_summary(&report);
    }

    if report.has_failures() {
        return Err(anyhow::anyhow!("一部のターゲットが失敗しました"));
    }
    Ok(())
}

/// 結果サマリー
fn print_summary(report: &RunReport) {
    println!();
    println!("{}", "結果サマリー:".bold());

    for outcome in &report.outcomes {
        let (mark, result) = match &outcome.push_result {
            PushResult::Completed => ("✓".green(), "pushed".green()),
            PushResult::Skipped(reason) => ("✓".green(), format!("push skipped: {}", reason).dimmed()),
            PushResult::Failed(error) => ("⚠".yellow(), format!("push failed: {}", error).red()),
        };
        println!("  {} {} ({})", mark, outcome.tag.to_string().cyan(), result);
    }

    for failure in &report.failures {
        let name = failure
            .tag
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_else(|| failure.dockerfile.display().to_string());
        println!(
            "  {} {} ({} で失敗: {})",
            "✗".red().bold(),
            name,
            failure.stage,
            failure.error
        );
    }
}
