use colored::Colorize;

fn print_connection_error(e: &dyn std::fmt::Display) {
    eprintln!();
    eprintln!("{}", "✗ Docker接続エラー".red().bold());
    eprintln!();
    eprintln!("{}", "原因:".yellow());
    eprintln!("  {}", e);
    eprintln!();
    eprintln!("{}", "解決方法:".yellow());
    eprintln!("  • Dockerが起動しているか確認してください");
    eprintln!("  • DOCKER_HOST の値が正しいか確認してください");
    eprintln!("  • docker ps コマンドが正常に動作するか確認してください");
}

/// Docker接続を初期化（エラーハンドリング付き）
pub async fn init_docker_with_error_handling() -> anyhow::Result<bollard::Docker> {
    let docker = connect_without_ping()?;

    // 接続テスト
    if let Err(e) = docker.ping().await {
        print_connection_error(&e);
        return Err(anyhow::anyhow!("Docker接続に失敗しました"));
    }
    Ok(docker)
}

/// クライアントだけ作成する（output-only ではデーモンに接続しない）
pub fn connect_without_ping() -> anyhow::Result<bollard::Docker> {
    bollard::Docker::connect_with_local_defaults().map_err(|e| {
        print_connection_error(&e);
        anyhow::anyhow!("Docker接続に失敗しました")
    })
}
