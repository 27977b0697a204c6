//! テスト用のバックエンド

use crate::backend::{BuildRequest, ImageBackend};
use crate::error::BuildResult;
use crate::tag::Tag;
use bollard::auth::DockerCredentials;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::io::Read;
use std::sync::Mutex;

/// 決まった JSON 行を返すバックエンド。呼び出しを記録する
#[derive(Default)]
pub struct FakeBackend {
    build_lines: Vec<String>,
    push_lines: Vec<String>,
    failing_tags: Vec<(String, String)>,
    hanging_push: bool,
    builds: Mutex<Vec<BuildRequest>>,
    pushes: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn with_build_lines(mut self, lines: &[&str]) -> Self {
        self.build_lines = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_push_lines(mut self, lines: &[&str]) -> Self {
        self.push_lines = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    /// 指定タグのビルドだけ `line` を返す
    pub fn with_failing_tag(mut self, tag: &str, line: &str) -> Self {
        self.failing_tags.push((tag.to_string(), line.to_string()));
        self
    }

    /// 終わらないプッシュ
    pub fn with_hanging_push(mut self) -> Self {
        self.hanging_push = true;
        self
    }

    pub fn builds(&self) -> Vec<BuildRequest> {
        self.builds.lock().unwrap().clone()
    }

    pub fn pushes(&self) -> Vec<String> {
        self.pushes.lock().unwrap().clone()
    }
}

impl ImageBackend for FakeBackend {
    fn build_image(&self, request: BuildRequest) -> BoxStream<'_, BuildResult<String>> {
        let lines = match self.failing_tags.iter().find(|(tag, _)| *tag == request.tag) {
            Some((_, line)) => vec![line.clone()],
            None => self.build_lines.clone(),
        };
        self.builds.lock().unwrap().push(request);
        stream::iter(lines.into_iter().map(Ok)).boxed()
    }

    fn push_image(
        &self,
        tag: &Tag,
        _credentials: Option<DockerCredentials>,
    ) -> BoxStream<'_, BuildResult<String>> {
        self.pushes.lock().unwrap().push(tag.to_string());
        if self.hanging_push {
            return stream::pending().boxed();
        }
        stream::iter(self.push_lines.clone().into_iter().map(Ok)).boxed()
    }
}

/// tar.gz コンテキストから 1 ファイルを読み出す
pub fn unpack_file(context: &[u8], name: &str) -> String {
    let decoder = flate2::read::GzDecoder::new(context);
    let mut archive = tar::Archive::new(decoder);
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.path().unwrap().file_name().and_then(|n| n.to_str()) == Some(name) {
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            return content;
        }
    }
    panic!("{} not found in build context", name);
}
