use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ファイルが見つかりません: {0}")]
    ConfigFileNotFound(PathBuf),

    #[error("設定ファイルの解析に失敗しました: {path}\n理由: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error(
        "イメージディレクトリが見つかりません: {0}\n\nヒント:\n  • .mach.yaml の build_image_dirname を確認してください\n  • --build-image-dirname または MACH_BUILD_IMAGE_DIRNAME で指定できます"
    )]
    BuildRootNotFound(PathBuf),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
