//! レジストリ認証処理
//!
//! 設定の docker_user / docker_password を優先し、未設定の場合は
//! Docker config.json（auths / credsStore）から認証情報を取得します。

use crate::error::{BuildError, BuildResult};
use crate::tag::Tag;
use base64::Engine;
use bollard::auth::DockerCredentials;
use mach_config::{BuildConfig, DEFAULT_DOCKER_HOST};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Docker Hub のレジストリ名
const DOCKER_HUB: &str = "docker.io";

/// Docker config.json の構造
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    /// credential helper 名 (例: "osxkeychain", "desktop")
    #[serde(default)]
    creds_store: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthEntry {
    /// Base64エンコードされた "username:password"
    auth: Option<String>,
}

/// credential helper からのレスポンス
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialResponse {
    username: String,
    secret: String,
}

/// レジストリ認証を管理
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    config_path: PathBuf,
    username: String,
    password: String,
    server_address: String,
}

impl RegistryAuth {
    /// 実行設定から作成
    ///
    /// config.json はデフォルトで ~/.docker/config.json（DOCKER_CONFIG で変更可）
    pub fn from_config(config: &BuildConfig) -> Self {
        let config_path = std::env::var("DOCKER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|h| h.join(".docker"))
                    .unwrap_or_else(|| PathBuf::from(".docker"))
            })
            .join("config.json");

        Self {
            config_path,
            username: config.docker_user.clone(),
            password: config.docker_password.clone(),
            server_address: config.docker_host.clone(),
        }
    }

    /// 指定したパスの config.json を使用
    pub fn with_config_path(mut self, config_path: PathBuf) -> Self {
        self.config_path = config_path;
        self
    }

    /// タグのプッシュに使う認証情報
    ///
    /// # Returns
    /// * `Ok(Some(credentials))` - 認証情報が見つかった場合
    /// * `Ok(None)` - 見つからない場合（匿名でプッシュ）
    pub fn credentials(&self, tag: &Tag) -> BuildResult<Option<DockerCredentials>> {
        if !self.username.is_empty() {
            tracing::debug!("Using configured credentials for {}", self.server_address);
            return Ok(Some(DockerCredentials {
                username: Some(self.username.clone()),
                password: Some(self.password.clone()),
                serveraddress: Some(self.server_address.clone()),
                ..Default::default()
            }));
        }

        let registry = extract_registry(tag.registry().unwrap_or_default());

        if !self.config_path.exists() {
            tracing::debug!("Docker config.json not found at {:?}", self.config_path);
            return Ok(None);
        }

        let config = self.load_docker_config()?;

        // 1. auths セクションを確認
        for key in self.config_keys(&registry) {
            if let Some(auth_entry) = config.auths.get(&key)
                && let Some(auth_b64) = &auth_entry.auth
                && let Some(creds) = decode_auth(auth_b64, &key)?
            {
                tracing::debug!("Found credentials in auths for {}", key);
                return Ok(Some(creds));
            }
        }

        // 2. credential helper を確認
        if let Some(helper) = &config.creds_store {
            tracing::debug!("Trying credential helper: {}", helper);
            for key in self.config_keys(&registry) {
                if let Ok(Some(creds)) = get_from_helper(helper, &key) {
                    return Ok(Some(creds));
                }
            }
        }

        tracing::debug!("No credentials found for {}", registry);
        Ok(None)
    }

    /// config.json 内で探すキー
    ///
    /// Docker Hub は `https://index.docker.io/v1/` で登録されていることが多い
    fn config_keys(&self, registry: &str) -> Vec<String> {
        if registry != DOCKER_HUB {
            return vec![registry.to_string()];
        }

        let mut keys = vec![self.server_address.clone()];
        for key in [DEFAULT_DOCKER_HOST, DOCKER_HUB] {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
        keys
    }

    fn load_docker_config(&self) -> BuildResult<DockerConfig> {
        let content =
            std::fs::read_to_string(&self.config_path).map_err(|e| BuildError::AuthFailed {
                registry: self.config_path.display().to_string(),
                message: format!("Failed to read config.json: {}", e),
            })?;

        serde_json::from_str(&content).map_err(|e| BuildError::AuthFailed {
            registry: self.config_path.display().to_string(),
            message: format!("Failed to parse config.json: {}", e),
        })
    }
}

/// リポジトリ名からレジストリを抽出
///
/// # Examples
/// - `ghcr.io/org/app` -> `ghcr.io`
/// - `acme/app` -> `docker.io`
/// - `localhost:5000/app` -> `localhost:5000`
pub fn extract_registry(repository: &str) -> String {
    if let Some((first, _)) = repository.split_once('/')
        && (first.contains('.') || first.contains(':'))
    {
        return first.to_string();
    }

    DOCKER_HUB.to_string()
}

/// Base64エンコードされた認証情報をデコード
fn decode_auth(auth_b64: &str, registry: &str) -> BuildResult<Option<DockerCredentials>> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth_b64)
        .map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to decode auth: {}", e),
        })?;

    let auth_str = String::from_utf8(decoded).map_err(|e| BuildError::AuthFailed {
        registry: registry.to_string(),
        message: format!("Invalid UTF-8 in auth: {}", e),
    })?;

    Ok(auth_str
        .split_once(':')
        .map(|(username, password)| DockerCredentials {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            serveraddress: Some(registry.to_string()),
            ..Default::default()
        }))
}

/// credential helper から認証情報を取得
fn get_from_helper(helper: &str, registry: &str) -> BuildResult<Option<DockerCredentials>> {
    let helper_cmd = format!("docker-credential-{}", helper);

    let mut child = Command::new(&helper_cmd)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to run {}: {}", helper_cmd, e),
        })?;

    // レジストリ名を stdin に渡す
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(registry.as_bytes()).ok();
    }

    let output = child
        .wait_with_output()
        .map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Credential helper failed: {}", e),
        })?;

    if !output.status.success() {
        tracing::debug!(
            "Credential helper returned error for {}: {}",
            registry,
            String::from_utf8_lossy(&output.stderr)
        );
        return Ok(None);
    }

    let response: CredentialResponse =
        serde_json::from_slice(&output.stdout).map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to parse credential helper response: {}", e),
        })?;

    Ok(Some(DockerCredentials {
        username: Some(response.username),
        password: Some(response.secret),
        serveraddress: Some(registry.to_string()),
        ..Default::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn tag(registry: &str) -> Tag {
        Tag::new(registry, "example", "")
    }

    #[test]
    fn test_extract_registry() {
        assert_eq!(extract_registry("ghcr.io/org/app"), "ghcr.io");
        assert_eq!(extract_registry("acme/app"), "docker.io");
        assert_eq!(extract_registry("nginx"), "docker.io");
        assert_eq!(extract_registry("localhost:5000/myapp"), "localhost:5000");
        assert_eq!(
            extract_registry("123456789.dkr.ecr.ap-northeast-1.amazonaws.com/app"),
            "123456789.dkr.ecr.ap-northeast-1.amazonaws.com"
        );
    }

    #[test]
    fn test_configured_credentials_take_priority() {
        let config = BuildConfig {
            docker_user: "bot".to_string(),
            docker_password: "hunter2".to_string(),
            ..Default::default()
        };
        let auth = RegistryAuth::from_config(&config)
            .with_config_path(PathBuf::from("/nonexistent/config.json"));

        let creds = auth.credentials(&tag("acme/app")).unwrap().unwrap();
        assert_eq!(creds.username.as_deref(), Some("bot"));
        assert_eq!(creds.password.as_deref(), Some("hunter2"));
        assert_eq!(creds.serveraddress.as_deref(), Some(DEFAULT_DOCKER_HOST));
    }

    #[test]
    fn test_missing_docker_config() {
        let auth = RegistryAuth::from_config(&BuildConfig::default())
            .with_config_path(PathBuf::from("/nonexistent/config.json"));

        assert!(auth.credentials(&tag("acme/app")).unwrap().is_none());
    }

    #[test]
    fn test_docker_hub_credentials_from_config_json() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.json");
        // "bot:hunter2"
        fs::write(
            &config_path,
            r#"{"auths":{"https://index.docker.io/v1/":{"auth":"Ym90Omh1bnRlcjI="}}}"#,
        )
        .unwrap();

        let auth =
            RegistryAuth::from_config(&BuildConfig::default()).with_config_path(config_path);
        let creds = auth.credentials(&tag("acme/app")).unwrap().unwrap();

        assert_eq!(creds.username.as_deref(), Some("bot"));
        assert_eq!(creds.password.as_deref(), Some("hunter2"));
        assert_eq!(
            creds.serveraddress.as_deref(),
            Some("https://index.docker.io/v1/")
        );
    }

    #[test]
    fn test_private_registry_credentials_from_config_json() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.json");
        fs::write(
            &config_path,
            r#"{"auths":{"ghcr.io":{"auth":"Ym90Omh1bnRlcjI="},"docker.io":{}}}"#,
        )
        .unwrap();

        let auth =
            RegistryAuth::from_config(&BuildConfig::default()).with_config_path(config_path);

        let creds = auth.credentials(&tag("ghcr.io/acme/app")).unwrap().unwrap();
        assert_eq!(creds.serveraddress.as_deref(), Some("ghcr.io"));

        // auth の無いエントリは認証なし
        assert!(auth.credentials(&tag("acme/app")).unwrap().is_none());
    }

    #[test]
    fn test_invalid_config_json() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.json");
        fs::write(&config_path, "{ not json").unwrap();

        let auth =
            RegistryAuth::from_config(&BuildConfig::default()).with_config_path(config_path);
        assert!(matches!(
            auth.credentials(&tag("acme/app")),
            Err(BuildError::AuthFailed { .. })
        ));
    }
}
