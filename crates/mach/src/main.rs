mod build;
mod docker;

use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

#[derive(Parser)]
#[command(name = "mach")]
#[command(
    about = "Dockerfile テンプレートからイメージをビルドし、レジストリへプッシュします",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dockerイメージをビルド
    Build(build::BuildArgs),
    /// バージョン情報を表示
    Version,
}

fn log_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("warn,mach=debug,mach_build=debug,mach_config=debug")
        } else {
            EnvFilter::new("warn")
        }
    })
}

/// ログは stderr に出す（output-only の stdout は Dockerfile のみにする）
///
/// 設定ファイルの読み込み前に初期化し、読み込み後に `verbose` が
/// 有効になった場合はフィルタを差し替える。
fn init_tracing(verbose: bool) -> reload::Handle<EnvFilter, Registry> {
    let (filter, handle) = reload::Layer::new(log_filter(verbose));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    handle
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("mach {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Build(args) => {
            let log_handle = init_tracing(args.verbose);
            let (config, config_path) = build::load_config(&args)?;
            if config.verbose
                && !args.verbose
                && let Err(e) = log_handle.reload(log_filter(true))
            {
                tracing::warn!("Failed to enable verbose logging: {}", e);
            }
            build::handle_build_command(&args.targets, config, config_path).await?;
        }
    }

    Ok(())
}
