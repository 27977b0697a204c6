//! Dockerfile テンプレートの展開
//!
//! `Dockerfile[-<variant>].tpl` を Tera で展開します。同じディレクトリの
//! `includes/*.tpl` は同じ名前空間に登録されるため、テンプレートから
//! `{% include "php-ext.tpl" %}` や `{% import "macros.tpl" as m %}` で参照できます。
//!
//! テンプレートに渡す変数は `filename`（テンプレート自身のファイル名）のみです。
//! ホストの環境変数は渡しません。

use crate::error::{BuildError, BuildResult, tera_error_message};
use crate::tag::TEMPLATE_SUFFIX;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tera::{Context, Tera, Value};

/// 共有テンプレートを置くディレクトリ名
pub const INCLUDES_DIR: &str = "includes";

/// 展開結果の出力先
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderTarget {
    /// 標準出力（output-only モード）
    Stdout,
    /// ビルド用の生成ファイル
    File(PathBuf),
}

pub struct TemplateRenderer;

impl TemplateRenderer {
    /// 生成される Dockerfile のパス
    ///
    /// `images/php/Dockerfile-8.1.tpl` -> `images/php/.Dockerfile-8.1.generated`
    pub fn generated_path(template: &Path) -> PathBuf {
        let name = file_name(template);
        let stem = name.strip_suffix(TEMPLATE_SUFFIX).unwrap_or(&name);
        template.with_file_name(format!(".{}.generated", stem))
    }

    /// テンプレートを展開して出力先へ書き込む
    pub fn render(template: &Path, target: &RenderTarget) -> BuildResult<()> {
        match target {
            RenderTarget::Stdout => {
                let stdout = std::io::stdout();
                Self::render_to(template, stdout.lock())
            }
            RenderTarget::File(path) => {
                let mut writer = BufWriter::new(File::create(path)?);
                Self::render_to(template, &mut writer)?;
                writer.flush()?;
                tracing::debug!("Rendered {} to {}", template.display(), path.display());
                Ok(())
            }
        }
    }

    /// テンプレートを展開して `writer` へ書き込む
    pub fn render_to<W: Write>(template: &Path, writer: W) -> BuildResult<()> {
        let name = file_name(template);
        let tera = Self::load(template, &name)?;

        let mut context = Context::new();
        context.insert("filename", &name);

        tera.render_to(&name, &context, writer)
            .map_err(|e| template_error(template, &e))
    }

    /// テンプレート本体と includes/*.tpl を一つの Tera に登録する
    fn load(template: &Path, name: &str) -> BuildResult<Tera> {
        let mut sources = Self::includes(template)?;
        // 本体は最後に登録して同名の include より優先させる
        sources.push((name.to_string(), std::fs::read_to_string(template)?));

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.register_function("get_env", deny_get_env);
        tera.add_raw_templates(sources)
            .map_err(|e| template_error(template, &e))?;

        Ok(tera)
    }

    /// `includes/` 内の `*.tpl` をファイル名順に読み込む
    fn includes(template: &Path) -> BuildResult<Vec<(String, String)>> {
        let dir = template
            .parent()
            .unwrap_or(Path::new("."))
            .join(INCLUDES_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && file_name(path).ends_with(TEMPLATE_SUFFIX))
            .collect();
        paths.sort();

        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            tracing::debug!("Loading include: {}", path.display());
            sources.push((file_name(&path), std::fs::read_to_string(&path)?));
        }
        Ok(sources)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn template_error(template: &Path, err: &tera::Error) -> BuildError {
    BuildError::Template {
        file: template.to_path_buf(),
        message: tera_error_message(err),
    }
}

/// ホストの環境変数をテンプレートから読めないようにする
fn deny_get_env(_args: &HashMap<String, Value>) -> tera::Result<Value> {
    Err(tera::Error::msg(
        "get_env() is not available in Dockerfile templates",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn render_string(template: &Path) -> BuildResult<String> {
        let mut out = Vec::new();
        TemplateRenderer::render_to(template, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_generated_path() {
        assert_eq!(
            TemplateRenderer::generated_path(Path::new("images/php/Dockerfile-8.1.tpl")),
            PathBuf::from("images/php/.Dockerfile-8.1.generated")
        );
        assert_eq!(
            TemplateRenderer::generated_path(Path::new("images/php/Dockerfile.tpl")),
            PathBuf::from("images/php/.Dockerfile.generated")
        );
    }

    #[test]
    fn test_render_filename_variable() {
        let temp_dir = tempdir().unwrap();
        let template = temp_dir.path().join("Dockerfile-arm64.tpl");
        fs::write(&template, "# generated from {{ filename }}\nFROM alpine\n").unwrap();

        let output = render_string(&template).unwrap();
        assert_eq!(output, "# generated from Dockerfile-arm64.tpl\nFROM alpine\n");
    }

    #[test]
    fn test_render_with_includes() {
        let temp_dir = tempdir().unwrap();
        let includes = temp_dir.path().join(INCLUDES_DIR);
        fs::create_dir(&includes).unwrap();
        fs::write(includes.join("base.tpl"), "FROM php:8.1-fpm").unwrap();
        fs::write(
            includes.join("macros.tpl"),
            "{% macro ext(name) %}RUN docker-php-ext-install {{ name }}{% endmacro ext %}",
        )
        .unwrap();
        // .tpl 以外は無視される
        fs::write(includes.join("README.md"), "{{ broken").unwrap();

        let template = temp_dir.path().join("Dockerfile.tpl");
        fs::write(
            &template,
            "{% import \"macros.tpl\" as m %}{% include \"base.tpl\" %}\n\
             {% for e in [\"pdo\", \"zip\"] %}{{ m::ext(name=e) }}\n{% endfor %}",
        )
        .unwrap();

        let output = render_string(&template).unwrap();
        assert_eq!(
            output,
            "FROM php:8.1-fpm\n\
             RUN docker-php-ext-install pdo\n\
             RUN docker-php-ext-install zip\n"
        );
    }

    #[test]
    fn test_render_does_not_escape() {
        let temp_dir = tempdir().unwrap();
        let template = temp_dir.path().join("Dockerfile.tpl");
        fs::write(
            &template,
            "{% set cmd = \"a && b > /dev/null\" %}RUN {{ cmd }}",
        )
        .unwrap();

        assert_eq!(render_string(&template).unwrap(), "RUN a && b > /dev/null");
    }

    #[test]
    fn test_render_to_file() {
        let temp_dir = tempdir().unwrap();
        let template = temp_dir.path().join("Dockerfile.tpl");
        fs::write(&template, "FROM alpine").unwrap();

        let generated = TemplateRenderer::generated_path(&template);
        TemplateRenderer::render(&template, &RenderTarget::File(generated.clone())).unwrap();

        assert_eq!(fs::read_to_string(generated).unwrap(), "FROM alpine");
    }

    #[test]
    fn test_parse_error_is_fatal() {
        let temp_dir = tempdir().unwrap();
        let template = temp_dir.path().join("Dockerfile.tpl");
        fs::write(&template, "FROM {{ image").unwrap();

        let err = render_string(&template).unwrap_err();
        assert!(matches!(err, BuildError::Template { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_include_is_error() {
        let temp_dir = tempdir().unwrap();
        let template = temp_dir.path().join("Dockerfile.tpl");
        fs::write(&template, "{% include \"missing.tpl\" %}").unwrap();

        assert!(matches!(
            render_string(&template),
            Err(BuildError::Template { .. })
        ));
    }

    #[test]
    fn test_environment_is_not_exposed() {
        let temp_dir = tempdir().unwrap();
        let template = temp_dir.path().join("Dockerfile.tpl");
        fs::write(&template, "ENV SECRET={{ get_env(name=\"MACH_TEST_SECRET\") }}").unwrap();

        let result = temp_env::with_var("MACH_TEST_SECRET", Some("s3cr3t"), || {
            render_string(&template)
        });
        assert!(matches!(result, Err(BuildError::Template { .. })));

        // 環境変数名と同じ変数もコンテキストには存在しない
        fs::write(&template, "{{ MACH_TEST_SECRET }}").unwrap();
        let result = temp_env::with_var("MACH_TEST_SECRET", Some("s3cr3t"), || {
            render_string(&template)
        });
        assert!(result.is_err());
    }
}
