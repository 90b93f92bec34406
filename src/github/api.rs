// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! GitHub GraphQL client.
//!
//! Only the handful of operations needed to open and maintain pull requests
//! for self-updates are covered.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};

/// Default GraphQL endpoint.
pub const GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";

const VIEWER_QUERY: &str = "query { viewer { login } }";

const FIND_PULL_REQUEST_QUERY: &str = r#"
query FindPullRequest($owner: String!, $repo: String!, $branch: String!) {
  repository(owner: $owner, name: $repo) {
    id
    pullRequests(first: 1, headRefName: $branch, states: [OPEN]) {
      nodes { id number url }
    }
  }
}"#;

const CREATE_PULL_REQUEST_MUTATION: &str = r#"
mutation CreatePullRequest($repositoryId: ID!, $baseRefName: String!, $headRefName: String!, $title: String!, $body: String) {
  createPullRequest(input: {repositoryId: $repositoryId, baseRefName: $baseRefName, headRefName: $headRefName, title: $title, body: $body}) {
    pullRequest { id number url }
  }
}"#;

const UPDATE_PULL_REQUEST_MUTATION: &str = r#"
mutation UpdatePullRequest($pullRequestId: ID!, $title: String!, $body: String) {
  updatePullRequest(input: {pullRequestId: $pullRequestId, title: $title, body: $body}) {
    pullRequest { id number url }
  }
}"#;

const CLOSE_PULL_REQUEST_MUTATION: &str = r#"
mutation ClosePullRequest($pullRequestId: ID!) {
  closePullRequest(input: {pullRequestId: $pullRequestId}) {
    pullRequest { id number url }
  }
}"#;

/// Pull request as reported by GitHub.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize)]
pub struct PullRequest {
    pub id: String,
    pub number: u64,
    pub url: String,
}

/// Desired state of pull request.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PullRequestOptions {
    /// Repository owner.
    pub owner: String,

    /// Repository name.
    pub repo: String,

    /// Branch carrying changes.
    pub head_branch: String,

    /// Branch to merge into.
    pub base_branch: String,

    /// Title of pull request.
    pub title: String,

    /// Description of pull request.
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
struct GraphqlRequest<'a, V> {
    query: &'a str,
    variables: V,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlMessage>,
}

#[derive(Debug, Deserialize)]
struct GraphqlMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ViewerData {
    viewer: Viewer,
}

#[derive(Debug, Deserialize)]
struct Viewer {
    login: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindData {
    repository: FindRepository,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindRepository {
    id: String,
    pull_requests: Nodes<PullRequest>,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestPayload {
    pull_request: PullRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateData {
    create_pull_request: PullRequestPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateData {
    update_pull_request: PullRequestPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloseData {
    close_pull_request: PullRequestPayload,
}

/// GitHub GraphQL API client.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl GithubClient {
    /// Construct new client authenticating with `token`.
    ///
    /// # Errors
    ///
    /// - Return [`GithubError::Http`] if HTTP client cannot be built.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("chored/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint: GITHUB_GRAPHQL_URL.into(),
            token: token.into(),
        })
    }

    /// Send requests to `endpoint` instead of GitHub.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Execute GraphQL query.
    ///
    /// # Errors
    ///
    /// - Return [`GithubError::Http`] if request cannot be sent.
    /// - Return [`GithubError::Api`] if GitHub responds with a failure status.
    /// - Return [`GithubError::Graphql`] if response carries errors.
    #[instrument(skip(self, query, variables), level = "debug")]
    pub async fn execute<V, T>(&self, query: &str, variables: V) -> Result<T>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        debug!("POST {}", self.endpoint);
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&GraphqlRequest { query, variables })
            .send()
            .await?;
        let response = check_response(response).await?;
        extract_data(response.json().await?)
    }

    /// Login of user that owns the token.
    ///
    /// Doubles as token validation before doing anything irreversible.
    ///
    /// # Errors
    ///
    /// - Return [`GithubError`] if token is rejected.
    pub async fn viewer_login(&self) -> Result<String> {
        let data: ViewerData = self.execute(VIEWER_QUERY, json!({})).await?;
        Ok(data.viewer.login)
    }

    /// Find open pull request for head branch.
    ///
    /// Returns identifier of repository along with pull request, if any.
    ///
    /// # Errors
    ///
    /// - Return [`GithubError`] if query fails.
    pub async fn find_pull_request(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<(String, Option<PullRequest>)> {
        let data: FindData = self
            .execute(
                FIND_PULL_REQUEST_QUERY,
                json!({ "owner": owner, "repo": repo, "branch": branch }),
            )
            .await?;

        let repository = data.repository;
        Ok((
            repository.id,
            repository.pull_requests.nodes.into_iter().next(),
        ))
    }

    /// Open new pull request.
    ///
    /// # Errors
    ///
    /// - Return [`GithubError`] if mutation fails.
    pub async fn create_pull_request(
        &self,
        repository_id: &str,
        opts: &PullRequestOptions,
    ) -> Result<PullRequest> {
        let data: CreateData = self
            .execute(
                CREATE_PULL_REQUEST_MUTATION,
                json!({
                    "repositoryId": repository_id,
                    "baseRefName": opts.base_branch,
                    "headRefName": opts.head_branch,
                    "title": opts.title,
                    "body": opts.body,
                }),
            )
            .await?;

        Ok(data.create_pull_request.pull_request)
    }

    /// Update title and description of pull request.
    ///
    /// # Errors
    ///
    /// - Return [`GithubError`] if mutation fails.
    pub async fn update_pull_request(
        &self,
        pull_request_id: &str,
        opts: &PullRequestOptions,
    ) -> Result<PullRequest> {
        let data: UpdateData = self
            .execute(
                UPDATE_PULL_REQUEST_MUTATION,
                json!({
                    "pullRequestId": pull_request_id,
                    "title": opts.title,
                    "body": opts.body,
                }),
            )
            .await?;

        Ok(data.update_pull_request.pull_request)
    }

    /// Close pull request without merging.
    ///
    /// # Errors
    ///
    /// - Return [`GithubError`] if mutation fails.
    pub async fn close_pull_request(&self, pull_request_id: &str) -> Result<PullRequest> {
        let data: CloseData = self
            .execute(
                CLOSE_PULL_REQUEST_MUTATION,
                json!({ "pullRequestId": pull_request_id }),
            )
            .await?;

        Ok(data.close_pull_request.pull_request)
    }

    /// Update open pull request for head branch, or open a new one.
    ///
    /// # Errors
    ///
    /// - Return [`GithubError`] if any query or mutation fails.
    #[instrument(skip(self, opts), level = "debug")]
    pub async fn create_or_update_pull_request(
        &self,
        opts: &PullRequestOptions,
    ) -> Result<PullRequest> {
        let (repository_id, existing) = self
            .find_pull_request(&opts.owner, &opts.repo, &opts.head_branch)
            .await?;

        let pull_request = match existing {
            Some(existing) => {
                info!("updating pull request #{}", existing.number);
                self.update_pull_request(&existing.id, opts).await?
            }
            None => {
                info!("opening pull request for {}", opts.head_branch);
                self.create_pull_request(&repository_id, opts).await?
            }
        };
        info!("pull request: {}", pull_request.url);

        Ok(pull_request)
    }
}

async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    if !response.status().is_success() {
        return Err(GithubError::Api {
            status: response.status().as_u16(),
            message: response.text().await.unwrap_or_default(),
        });
    }

    Ok(response)
}

fn extract_data<T>(response: GraphqlResponse<T>) -> Result<T> {
    if !response.errors.is_empty() {
        let messages = response
            .errors
            .into_iter()
            .map(|error| error.message)
            .collect::<Vec<_>>();
        return Err(GithubError::Graphql(messages.join("; ")));
    }

    response.data.ok_or(GithubError::MissingData)
}

/// GitHub error types.
#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    /// HTTP transport error.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// GitHub responded with a failure status.
    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// GraphQL response carries errors.
    #[error("GitHub GraphQL error: {0}")]
    Graphql(String),

    /// GraphQL response carries neither data nor errors.
    #[error("GitHub GraphQL response has no data")]
    MissingData,
}

/// Friendly result alias :3
type Result<T, E = GithubError> = std::result::Result<T, E>;
