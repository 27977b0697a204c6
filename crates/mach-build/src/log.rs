//! Docker デーモンのビルド / プッシュログの解釈
//!
//! デーモンは 1 行 1 JSON オブジェクトでログを返します。各行を
//! [`BuildLogRecord`] に分類し、表示とエラー判定に使います。
//!
//! 複数のキーを含む行は `error` > `status` > `stream` > `errorDetail` の
//! 優先順位で分類します。JSON でない行はそのまま表示します。

use colored::Colorize;
use serde_json::{Map, Value};

/// 分類済みのログ 1 行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildLogRecord {
    /// ビルド進捗のテキスト（複数行を含むことがある）
    Stream(String),
    /// ステータス（pull / push の進捗など）
    Status {
        id: Option<String>,
        text: String,
        progress: Option<String>,
    },
    /// 致命的なエラー
    Error(String),
    /// エラーの詳細（表示のみ）
    ErrorDetail(String),
    /// 解釈できない行（生のテキスト）
    Unrecognized(String),
}

/// ログ 1 行を分類する
pub fn interpret_log_line(raw: &str) -> BuildLogRecord {
    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(raw) else {
        return BuildLogRecord::Unrecognized(raw.to_string());
    };

    if let Some(message) = text_field(&fields, "error") {
        return BuildLogRecord::Error(message);
    }

    if let Some(text) = text_field(&fields, "status") {
        return BuildLogRecord::Status {
            id: text_field(&fields, "id"),
            text,
            progress: text_field(&fields, "progress").filter(|p| !p.is_empty()),
        };
    }

    if let Some(text) = text_field(&fields, "stream") {
        return BuildLogRecord::Stream(text);
    }

    if let Some(detail) = fields.get("errorDetail").filter(|v| !v.is_null()) {
        let message = detail
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| detail.to_string());
        return BuildLogRecord::ErrorDetail(message);
    }

    BuildLogRecord::Unrecognized(raw.to_string())
}

/// 文字列フィールドを取り出す。null は未指定として扱う
fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl BuildLogRecord {
    /// ターゲットのビルドを中止すべきレコードか
    pub fn is_fatal(&self) -> bool {
        matches!(self, BuildLogRecord::Error(_))
    }

    /// 表示用の行
    ///
    /// `Stream` は埋め込まれた改行で分割し、空行は除く。
    /// `Unrecognized` は受け取った行をそのまま返す。
    pub fn display_lines(&self) -> Vec<String> {
        match self {
            BuildLogRecord::Stream(text) => text
                .lines()
                .map(|line| line.trim_end_matches('\r'))
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect(),
            BuildLogRecord::Status { id, text, progress } => {
                let mut line = match id {
                    Some(id) => format!("{}: {}", id, text),
                    None => text.clone(),
                };
                if let Some(progress) = progress {
                    line.push(' ');
                    line.push_str(progress);
                }
                vec![line]
            }
            BuildLogRecord::Error(message) | BuildLogRecord::ErrorDetail(message) => {
                vec![message.clone()]
            }
            BuildLogRecord::Unrecognized(raw) => vec![raw.clone()],
        }
    }

    pub fn display_text(&self) -> String {
        self.display_lines().join("\n")
    }
}

/// 表示先
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

/// 分類済みレコードを端末に表示する
#[derive(Debug, Clone, Copy)]
pub struct LogDisplay {
    target: LogTarget,
}

impl LogDisplay {
    pub fn new(target: LogTarget) -> Self {
        Self { target }
    }

    pub fn show(&self, record: &BuildLogRecord) {
        for line in record.display_lines() {
            let line = match record {
                BuildLogRecord::Stream(_) => line.blue().to_string(),
                BuildLogRecord::Status { .. } => line.yellow().to_string(),
                BuildLogRecord::Error(_) => line.red().bold().to_string(),
                BuildLogRecord::ErrorDetail(_) => line.red().to_string(),
                BuildLogRecord::Unrecognized(_) => line,
            };

            // エラーは出力先に関係なく stderr
            if self.target == LogTarget::Stderr
                || matches!(
                    record,
                    BuildLogRecord::Error(_) | BuildLogRecord::ErrorDetail(_)
                )
            {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_line() {
        let record = interpret_log_line("{\"stream\":\"Successfully built 6dbb9cc54074\\n\"}");

        assert_eq!(
            record,
            BuildLogRecord::Stream("Successfully built 6dbb9cc54074\n".to_string())
        );
        assert_eq!(record.display_text(), "Successfully built 6dbb9cc54074");
        assert!(!record.is_fatal());
    }

    #[test]
    fn test_stream_with_embedded_lines() {
        let record =
            interpret_log_line(r#"{"stream":"Step 1/2 : FROM alpine\n ---> 14119a10abf4\n\n"}"#);

        assert_eq!(
            record.display_lines(),
            vec!["Step 1/2 : FROM alpine", " ---> 14119a10abf4"]
        );
    }

    #[test]
    fn test_non_json_is_passed_through() {
        let record = interpret_log_line("blah");

        assert_eq!(record, BuildLogRecord::Unrecognized("blah".to_string()));
        assert_eq!(record.display_text(), "blah");
    }

    #[test]
    fn test_unknown_keys_are_passed_through() {
        let raw = r#"{"aux":{"ID":"sha256:6dbb9cc54074"}}"#;
        assert_eq!(
            interpret_log_line(raw),
            BuildLogRecord::Unrecognized(raw.to_string())
        );

        // JSON でもオブジェクトでなければ同様
        assert_eq!(
            interpret_log_line("[1,2]"),
            BuildLogRecord::Unrecognized("[1,2]".to_string())
        );
    }

    #[test]
    fn test_error_line_is_fatal() {
        let record = interpret_log_line(r#"{"error":"no such file"}"#);

        assert_eq!(record, BuildLogRecord::Error("no such file".to_string()));
        assert!(record.is_fatal());
    }

    #[test]
    fn test_error_takes_priority_over_other_keys() {
        let record = interpret_log_line(
            r#"{"errorDetail":{"message":"returned a non-zero code: 1"},"stream":"x","error":"returned a non-zero code: 1"}"#,
        );

        assert_eq!(
            record,
            BuildLogRecord::Error("returned a non-zero code: 1".to_string())
        );
    }

    #[test]
    fn test_status_takes_priority_over_stream() {
        let record = interpret_log_line(r#"{"stream":"ignored","status":"Pulling fs layer"}"#);
        assert!(matches!(record, BuildLogRecord::Status { ref text, .. } if text == "Pulling fs layer"));
    }

    #[test]
    fn test_error_detail_alone_is_not_fatal() {
        let record = interpret_log_line(r#"{"errorDetail":{"code":1,"message":"denied"}}"#);

        assert_eq!(record, BuildLogRecord::ErrorDetail("denied".to_string()));
        assert!(!record.is_fatal());
    }

    #[test]
    fn test_null_fields_are_ignored() {
        let record = interpret_log_line(r#"{"error":null,"status":null,"stream":"ok\n"}"#);
        assert_eq!(record, BuildLogRecord::Stream("ok\n".to_string()));
    }

    #[test]
    fn test_push_status_with_progress() {
        let record = interpret_log_line(
            r#"{"status":"Pushing","id":"a1b2c3","progress":"[==>    ] 1.2MB/5MB"}"#,
        );

        assert_eq!(
            record.display_text(),
            "a1b2c3: Pushing [==>    ] 1.2MB/5MB"
        );
    }
}
