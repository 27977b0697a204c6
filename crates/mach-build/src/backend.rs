//! イメージのビルド / プッシュを実行するバックエンド
//!
//! バックエンドはデーモンのログを 1 行ずつの JSON テキストとして返し、
//! 分類は [`crate::log::interpret_log_line`] がまとめて行います。

use crate::error::{BuildError, BuildResult};
use crate::tag::Tag;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::models::{BuildInfo, PushImageInfo};
use bytes::Bytes;
use futures_util::future;
use futures_util::stream::{BoxStream, StreamExt};
use http_body_util::{Either, Full};
use serde_json::{Map, Value, json};

/// ビルド要求
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// tar.gz のビルドコンテキスト
    pub context: Vec<u8>,
    /// コンテキスト内の Dockerfile 名
    pub dockerfile: String,
    pub tag: String,
    pub no_cache: bool,
}

/// ビルド / プッシュのバックエンド
pub trait ImageBackend {
    fn build_image(&self, request: BuildRequest) -> BoxStream<'_, BuildResult<String>>;

    fn push_image(
        &self,
        tag: &Tag,
        credentials: Option<DockerCredentials>,
    ) -> BoxStream<'_, BuildResult<String>>;
}

/// Docker Engine API (bollard) によるバックエンド
#[derive(Debug, Clone)]
pub struct DockerBackend {
    docker: Docker,
}

impl DockerBackend {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

/// bollard が解析済みのメッセージを元の JSON 行に戻す
///
/// デーモンの `error` 行は bollard が `DockerStreamError` に変換するので、
/// ここで `{"error": ...}` の行に戻してログ解釈に任せる。
/// JSON として読めなかったペイロードは内容をそのまま流す。
/// `encode` が `None` を返したメッセージは捨てる。
fn to_log_line<T>(
    item: Result<T, bollard::errors::Error>,
    encode: fn(T) -> Option<String>,
) -> Option<BuildResult<String>> {
    match item {
        Ok(info) => encode(info).map(Ok),
        Err(bollard::errors::Error::DockerStreamError { error }) => {
            Some(Ok(json!({ "error": error }).to_string()))
        }
        Err(bollard::errors::Error::JsonDataError { message, .. }) => Some(Ok(message)),
        Err(e) => Some(Err(BuildError::DockerConnection(e))),
    }
}

/// `BuildInfo` のフィールドから JSON 行を組み立てる
///
/// 値の無いフィールドは出力しない。表示対象のフィールドを一つも
/// 持たないメッセージ（`aux` のイメージ ID など）は `None`。
fn build_info_line(info: BuildInfo) -> Option<String> {
    let mut fields = Map::new();
    for (key, value) in [
        ("id", info.id),
        ("status", info.status),
        ("progress", info.progress),
        ("stream", info.stream),
        ("error", info.error),
    ] {
        if let Some(value) = value {
            fields.insert(key.to_string(), Value::String(value));
        }
    }
    if let Some(message) = info.error_detail.and_then(|detail| detail.message) {
        fields.insert("errorDetail".to_string(), json!({ "message": message }));
    }

    if fields.is_empty() {
        return None;
    }
    Some(Value::Object(fields).to_string())
}

fn push_info_line(info: PushImageInfo) -> Option<String> {
    match serde_json::to_string(&info) {
        Ok(line) => Some(line),
        Err(e) => {
            tracing::warn!("Failed to encode push progress: {}", e);
            None
        }
    }
}

impl ImageBackend for DockerBackend {
    fn build_image(&self, request: BuildRequest) -> BoxStream<'_, BuildResult<String>> {
        tracing::info!("Building image: {}", request.tag);

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions::<String> {
            dockerfile: request.dockerfile,
            t: request.tag,
            nocache: request.no_cache,
            rm: true,      // 中間コンテナを削除
            forcerm: true, // ビルド失敗時も中間コンテナを削除
            ..Default::default()
        };
        tracing::debug!("Build options: {:?}", options);

        let body = Full::new(Bytes::from(request.context));

        #[allow(deprecated)]
        let stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        stream
            .filter_map(|item| future::ready(to_log_line(item, build_info_line)))
            .boxed()
    }

    fn push_image(
        &self,
        tag: &Tag,
        credentials: Option<DockerCredentials>,
    ) -> BoxStream<'_, BuildResult<String>> {
        let repository = tag.registry().unwrap_or(tag.image_name()).to_string();

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> {
            tag: tag.tag_part(),
        };

        tracing::info!("Pushing image: {}", tag);

        #[allow(deprecated)]
        let stream = self
            .docker
            .push_image(&repository, Some(options), credentials);

        stream
            .filter_map(|item| future::ready(to_log_line(item, push_info_line)))
            .boxed()
    }
}
