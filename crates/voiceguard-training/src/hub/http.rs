//! HTTP client for a Hugging-Face-compatible model hub.

use super::{HubClient, RepoInfo, Visibility};
use crate::config::HubSettings;
use crate::error::{TrainingError, TrainingResult};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

pub struct HttpHubClient {
    http_client: Client,
    settings: HubSettings,
}

impl HttpHubClient {
    #[must_use]
    pub fn new(settings: &HubSettings) -> Self {
        let mut settings = settings.clone();
        settings.endpoint = settings.endpoint.trim_end_matches('/').to_string();
        Self { http_client: Client::new(), settings }
    }

    fn authorized(&self, request: RequestBuilder) -> TrainingResult<RequestBuilder> {
        Ok(request.bearer_auth(self.settings.require_token()?))
    }

    async fn send(&self, request: RequestBuilder, operation: &str) -> TrainingResult<Response> {
        self.authorized(request)?
            .send()
            .await
            .map_err(|e| TrainingError::Remote(format!("{operation}: {e}")))
    }
}

#[derive(Deserialize)]
struct WhoAmI {
    name: String,
}

fn split_repo_id(repo_id: &str) -> TrainingResult<(&str, &str)> {
    repo_id
        .split_once('/')
        .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
        .ok_or_else(|| TrainingError::InvalidConfig(format!("repository id must be owner/name: {repo_id}")))
}

async fn error_for_status(response: Response, operation: &str) -> TrainingResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
    Err(map_http_error(status, &body, operation))
}

/// 401/403 are credential problems; every other failure is a hub error.
fn map_http_error(status: StatusCode, body: &str, operation: &str) -> TrainingError {
    match status.as_u16() {
        401 | 403 => TrainingError::Auth(format!("{operation} rejected ({status}): {body}")),
        _ => TrainingError::Remote(format!("{operation} failed ({status}): {body}")),
    }
}

#[async_trait]
impl HubClient for HttpHubClient {
    async fn whoami(&self) -> TrainingResult<String> {
        let url = format!("{}/api/whoami-v2", self.settings.endpoint);
        let response = self.send(self.http_client.get(&url), "whoami").await?;
        let response = error_for_status(response, "whoami").await?;
        let me: WhoAmI = response
            .json()
            .await
            .map_err(|e| TrainingError::Remote(format!("whoami: unexpected response: {e}")))?;
        Ok(me.name)
    }

    async fn create_repo(&self, repo_id: &str, exist_ok: bool) -> TrainingResult<()> {
        let (owner, name) = split_repo_id(repo_id)?;
        let url = format!("{}/api/repos/create", self.settings.endpoint);
        let body = json!({ "type": "model", "name": name, "organization": owner, "private": false });

        let response = self.send(self.http_client.post(&url).json(&body), "create repo").await?;
        if response.status() == StatusCode::CONFLICT && exist_ok {
            debug!(repo_id = %repo_id, "Repository already exists");
            return Ok(());
        }
        error_for_status(response, "create repo").await?;
        debug!(repo_id = %repo_id, "Repository created");
        Ok(())
    }

    async fn update_repo_visibility(&self, repo_id: &str, visibility: Visibility) -> TrainingResult<()> {
        split_repo_id(repo_id)?;
        let url = format!("{}/api/models/{repo_id}/settings", self.settings.endpoint);
        let body = json!({ "private": visibility.is_private() });

        let response = self.send(self.http_client.put(&url).json(&body), "update visibility").await?;
        error_for_status(response, "update visibility").await?;
        Ok(())
    }

    async fn upload_file(&self, repo_id: &str, path_in_repo: &str, content: Vec<u8>) -> TrainingResult<()> {
        split_repo_id(repo_id)?;
        let url = format!("{}/api/models/{repo_id}/commit/main", self.settings.endpoint);

        // NDJSON commit: a header line followed by one inline file operation.
        let header = json!({
            "key": "header",
            "value": { "summary": format!("Upload {path_in_repo}"), "description": "" },
        });
        let file = json!({
            "key": "file",
            "value": {
                "path": path_in_repo,
                "encoding": "base64",
                "content": base64::engine::general_purpose::STANDARD.encode(&content),
            },
        });
        let body = format!("{header}\n{file}\n");

        let request = self
            .http_client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let response = self.send(request, "upload file").await?;
        error_for_status(response, &format!("upload {path_in_repo}")).await?;
        debug!(repo_id = %repo_id, path = %path_in_repo, bytes = content.len(), "File uploaded");
        Ok(())
    }

    async fn repo_info(&self, repo_id: &str) -> TrainingResult<RepoInfo> {
        split_repo_id(repo_id)?;
        let url = format!("{}/api/models/{repo_id}", self.settings.endpoint);
        let response = self.send(self.http_client.get(&url), "repo info").await?;
        let response = error_for_status(response, "repo info").await?;
        response
            .json()
            .await
            .map_err(|e| TrainingError::Remote(format!("repo info: unexpected response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn hub_client(endpoint: &str, token: Option<&str>) -> HttpHubClient {
        HttpHubClient::new(&HubSettings {
            endpoint: format!("{endpoint}/"),
            token: token.map(str::to_string),
            ..HubSettings::default()
        })
    }

    #[test]
    fn test_split_repo_id() {
        assert_eq!(split_repo_id("alice/model").unwrap(), ("alice", "model"));
        assert!(split_repo_id("model").is_err());
        assert!(split_repo_id("/model").is_err());
        assert!(split_repo_id("a/b/c").is_err());
    }

    #[test]
    fn test_map_http_error() {
        assert!(matches!(map_http_error(StatusCode::UNAUTHORIZED, "", "x"), TrainingError::Auth(_)));
        assert!(matches!(map_http_error(StatusCode::FORBIDDEN, "", "x"), TrainingError::Auth(_)));
        assert!(matches!(map_http_error(StatusCode::NOT_FOUND, "", "x"), TrainingError::Remote(_)));
        assert!(matches!(
            map_http_error(StatusCode::INTERNAL_SERVER_ERROR, "", "x"),
            TrainingError::Remote(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_token_is_auth_error_without_request() {
        let client = hub_client("http://127.0.0.1:9", None);
        assert!(matches!(client.whoami().await, Err(TrainingError::Auth(_))));
    }

    #[tokio::test]
    async fn test_blank_token_is_auth_error() {
        let client = hub_client("http://127.0.0.1:9", Some("   "));
        let err = client.create_repo("alice/model", true).await.unwrap_err();
        assert!(matches!(err, TrainingError::Auth(msg) if msg.contains("HF_ACCESS_TOKEN")));
    }

    #[tokio::test]
    async fn test_whoami() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/whoami-v2")
            .match_header("authorization", "Bearer hf_test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "alice", "type": "user"}"#)
            .create_async()
            .await;

        let client = hub_client(&server.url(), Some("hf_test"));
        assert_eq!(client.whoami().await.unwrap(), "alice");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_whoami_rejected_token() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/api/whoami-v2").with_status(401).with_body("Invalid token").create_async().await;

        let client = hub_client(&server.url(), Some("hf_bad"));
        assert!(matches!(client.whoami().await, Err(TrainingError::Auth(_))));
    }

    #[tokio::test]
    async fn test_create_repo_accepts_conflict_when_exist_ok() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/repos/create")
            .match_body(Matcher::PartialJson(json!({ "name": "model", "organization": "alice" })))
            .with_status(409)
            .with_body(r#"{"error": "You already created this model repo"}"#)
            .expect(2)
            .create_async()
            .await;

        let client = hub_client(&server.url(), Some("hf_test"));
        client.create_repo("alice/model", true).await.unwrap();
        assert!(matches!(client.create_repo("alice/model", false).await, Err(TrainingError::Remote(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_visibility_sends_private_flag() {
        let mut server = mockito::Server::new_async().await;
        let private = server
            .mock("PUT", "/api/models/alice/model/settings")
            .match_body(Matcher::Json(json!({ "private": true })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = hub_client(&server.url(), Some("hf_test"));
        client.update_repo_visibility("alice/model", Visibility::Private).await.unwrap();
        private.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_file_posts_ndjson_commit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/models/alice/model/commit/main")
            .match_header("content-type", "application/x-ndjson")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""key":"header""#.to_string()),
                Matcher::Regex(r#""path":"nested/weights.pt""#.to_string()),
                Matcher::Regex(r#""content":"aGVsbG8=""#.to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"commitOid": "abc123"}"#)
            .create_async()
            .await;

        let client = hub_client(&server.url(), Some("hf_test"));
        client.upload_file("alice/model", "nested/weights.pt", b"hello".to_vec()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_repo_info_reads_sha() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/models/alice/model")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "alice/model", "sha": "abc123", "private": true, "downloads": 0}"#)
            .create_async()
            .await;

        let client = hub_client(&server.url(), Some("hf_test"));
        let info = client.repo_info("alice/model").await.unwrap();
        assert_eq!(info, RepoInfo { id: "alice/model".to_string(), sha: "abc123".to_string(), private: true });
    }

    #[tokio::test]
    async fn test_server_error_is_remote_error() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/api/models/alice/model").with_status(503).create_async().await;

        let client = hub_client(&server.url(), Some("hf_test"));
        assert!(matches!(client.repo_info("alice/model").await, Err(TrainingError::Remote(_))));
    }
}
