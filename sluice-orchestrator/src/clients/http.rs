//! HTTP implementations of the CAFS and auth clients
//!
//! JSON over HTTP against the external services. Error bodies are
//! carried through verbatim so the "not found" / "already exists"
//! classification keeps working across the wire.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use sluice_core::domain::cafs::{Branch, BranchInfo, Commit, CommitInfo, FileInfo, TagInfo};

use crate::clients::auth::{AuthClient, Scope, WhoAmI};
use crate::clients::cafs::CafsClient;
use crate::error::{Error, Result};

/// CAFS over HTTP
#[derive(Debug, Clone)]
pub struct HttpCafs {
    base_url: String,
    client: Client,
    token: Option<String>,
}

impl HttpCafs {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            token: None,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, self.url(path));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        if message.is_empty() {
            return Err(Error::Cafs(format!("request failed with status {}", status)));
        }
        Err(Error::Cafs(message))
    }

    async fn json<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let response = self.check(response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::TransientRpc(format!("failed to parse response: {}", e)))
    }
}

#[derive(Serialize)]
struct CreateBranchBody<'a> {
    branch: &'a str,
    head: Option<&'a str>,
    provenance: &'a [Branch],
}

#[async_trait]
impl CafsClient for HttpCafs {
    fn with_token(&self, token: &str) -> Arc<dyn CafsClient> {
        Arc::new(Self {
            base_url: self.base_url.clone(),
            client: self.client.clone(),
            token: Some(token.to_string()),
        })
    }

    async fn create_repo(&self, repo: &str) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, "/repos")
            .json(&serde_json::json!({ "repo": repo }))
            .send()
            .await?;
        self.check(resp).await.map(|_| ())
    }

    async fn inspect_repo(&self, repo: &str) -> Result<()> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/repos/{}", repo))
            .send()
            .await?;
        self.check(resp).await.map(|_| ())
    }

    async fn list_repos(&self) -> Result<Vec<String>> {
        let resp = self.request(reqwest::Method::GET, "/repos").send().await?;
        self.json(resp).await
    }

    async fn delete_repo(&self, repo: &str, force: bool) -> Result<()> {
        let resp = self
            .request(reqwest::Method::DELETE, &format!("/repos/{}", repo))
            .query(&[("force", force)])
            .send()
            .await?;
        self.check(resp).await.map(|_| ())
    }

    async fn create_branch(
        &self,
        repo: &str,
        branch: &str,
        head: Option<&str>,
        provenance: &[Branch],
    ) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/repos/{}/branches", repo))
            .json(&CreateBranchBody {
                branch,
                head,
                provenance,
            })
            .send()
            .await?;
        self.check(resp).await.map(|_| ())
    }

    async fn inspect_branch(&self, repo: &str, branch: &str) -> Result<BranchInfo> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/branches/{}", repo, branch),
            )
            .send()
            .await?;
        self.json(resp).await
    }

    async fn delete_branch(&self, repo: &str, branch: &str) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::DELETE,
                &format!("/repos/{}/branches/{}", repo, branch),
            )
            .send()
            .await?;
        self.check(resp).await.map(|_| ())
    }

    async fn start_commit(&self, repo: &str, branch: &str) -> Result<Commit> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/repos/{}/commits", repo))
            .json(&serde_json::json!({ "branch": branch }))
            .send()
            .await?;
        self.json(resp).await
    }

    async fn finish_commit(&self, repo: &str, commit: &str, empty: bool) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/commits/{}/finish", repo, commit),
            )
            .json(&serde_json::json!({ "empty": empty }))
            .send()
            .await?;
        self.check(resp).await.map(|_| ())
    }

    async fn inspect_commit(&self, repo: &str, commit: &str) -> Result<CommitInfo> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/commits/{}", repo, commit),
            )
            .send()
            .await?;
        self.json(resp).await
    }

    async fn list_commits(&self, repo: &str, to: Option<&str>) -> Result<Vec<CommitInfo>> {
        let mut request = self.request(reqwest::Method::GET, &format!("/repos/{}/commits", repo));
        if let Some(to) = to {
            request = request.query(&[("to", to)]);
        }
        let resp = request.send().await?;
        self.json(resp).await
    }

    async fn delete_commit(&self, repo: &str, commit: &str) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::DELETE,
                &format!("/repos/{}/commits/{}", repo, commit),
            )
            .send()
            .await?;
        self.check(resp).await.map(|_| ())
    }

    async fn put_file(&self, repo: &str, commit: &str, path: &str, data: Vec<u8>) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::PUT,
                &format!("/repos/{}/commits/{}/file", repo, commit),
            )
            .query(&[("path", path)])
            .body(data)
            .send()
            .await?;
        self.check(resp).await.map(|_| ())
    }

    async fn get_file(&self, repo: &str, commit: &str, path: &str) -> Result<Vec<u8>> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/commits/{}/file", repo, commit),
            )
            .query(&[("path", path)])
            .send()
            .await?;
        let resp = self.check(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn delete_file(&self, repo: &str, commit: &str, path: &str) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::DELETE,
                &format!("/repos/{}/commits/{}/file", repo, commit),
            )
            .query(&[("path", path)])
            .send()
            .await?;
        self.check(resp).await.map(|_| ())
    }

    async fn inspect_file(&self, repo: &str, commit: &str, path: &str) -> Result<FileInfo> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/commits/{}/file-info", repo, commit),
            )
            .query(&[("path", path)])
            .send()
            .await?;
        self.json(resp).await
    }

    async fn list_files(&self, repo: &str, commit: &str, path: &str) -> Result<Vec<FileInfo>> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/commits/{}/files", repo, commit),
            )
            .query(&[("path", path)])
            .send()
            .await?;
        self.json(resp).await
    }

    async fn glob_file(&self, repo: &str, commit: &str, pattern: &str) -> Result<Vec<FileInfo>> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/commits/{}/glob", repo, commit),
            )
            .query(&[("pattern", pattern)])
            .send()
            .await?;
        self.json(resp).await
    }

    async fn list_objects(&self) -> Result<Vec<String>> {
        let resp = self.request(reqwest::Method::GET, "/objects").send().await?;
        self.json(resp).await
    }

    async fn get_object(&self, hash: &str) -> Result<Vec<u8>> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/objects/{}", hash))
            .send()
            .await?;
        let resp = self.check(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn delete_objects(&self, hashes: &[String]) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, "/objects/delete")
            .json(&serde_json::json!({ "hashes": hashes }))
            .send()
            .await?;
        self.check(resp).await.map(|_| ())
    }

    async fn list_tags(&self, prefix: Option<&str>, include_object: bool) -> Result<Vec<TagInfo>> {
        let mut request = self.request(reqwest::Method::GET, "/tags");
        if let Some(prefix) = prefix {
            request = request.query(&[("prefix", prefix)]);
        }
        let resp = request
            .query(&[("include_object", include_object)])
            .send()
            .await?;
        self.json(resp).await
    }

    async fn delete_tags(&self, tags: &[String]) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, "/tags/delete")
            .json(&serde_json::json!({ "tags": tags }))
            .send()
            .await?;
        self.check(resp).await.map(|_| ())
    }
}

/// Auth service over HTTP
#[derive(Debug, Clone)]
pub struct HttpAuth {
    base_url: String,
    client: Client,
}

#[derive(Deserialize)]
struct AuthorizeResponse {
    authorized: bool,
}

#[derive(Deserialize)]
struct CapabilityResponse {
    capability: String,
}

impl HttpAuth {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        if message.contains("not activated") {
            return Err(Error::AuthNotActivated);
        }
        Err(Error::TransientRpc(format!(
            "auth request failed with status {}: {}",
            status, message
        )))
    }
}

#[async_trait]
impl AuthClient for HttpAuth {
    async fn who_am_i(&self) -> Result<WhoAmI> {
        let resp = self
            .client
            .get(format!("{}/auth/whoami", self.base_url))
            .send()
            .await?;
        let resp = self.check(resp).await?;
        resp.json()
            .await
            .map_err(|e| Error::TransientRpc(format!("failed to parse response: {}", e)))
    }

    async fn authorize(&self, repo: &str, scope: Scope) -> Result<bool> {
        let resp = self
            .client
            .post(format!("{}/auth/authorize", self.base_url))
            .json(&serde_json::json!({ "repo": repo, "scope": scope }))
            .send()
            .await?;
        let resp = self.check(resp).await?;
        let body: AuthorizeResponse = resp
            .json()
            .await
            .map_err(|e| Error::TransientRpc(format!("failed to parse response: {}", e)))?;
        Ok(body.authorized)
    }

    async fn get_capability(&self) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/auth/capability", self.base_url))
            .send()
            .await?;
        let resp = self.check(resp).await?;
        let body: CapabilityResponse = resp
            .json()
            .await
            .map_err(|e| Error::TransientRpc(format!("failed to parse response: {}", e)))?;
        Ok(body.capability)
    }

    async fn revoke_auth_token(&self, token: &str) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/auth/revoke", self.base_url))
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await?;
        self.check(resp).await.map(|_| ())
    }
}
