pub mod signer;

use anyhow::{anyhow, Context};
use chrono::Utc;
use serde_json::json;
use url::Url;

use crate::error::{Error, Result};
use crate::storage::{CloudProfile, EffectiveConfig};

use signer::SigningKey;

/// Domain the per-service endpoints hang off.
const CLOUD_DOMAIN: &str = "otc.t-systems.com";

/// Auth material for one cloud, as a tagged variant. The variant is
/// chosen by the profile's `auth_type` tag, never by sniffing which
/// fields happen to be non-empty.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOptions {
    Password {
        auth_url: String,
        username: String,
        password: String,
        domain_name: Option<String>,
        domain_id: Option<String>,
        project_name: Option<String>,
    },
    Token {
        token: String,
    },
    AkSk {
        access_key: String,
        secret_key: String,
        security_token: Option<String>,
    },
    ApplicationCredential {
        auth_url: String,
        id: String,
        secret: String,
    },
}

impl AuthOptions {
    /// Builds auth options from a stored profile. The security token is
    /// carried into the AkSk variant here, directly from the profile;
    /// nothing downstream needs to patch it in afterwards.
    pub fn from_profile(name: &str, profile: &CloudProfile) -> Result<Self> {
        let misconfigured = |reason: &str| Error::AuthMisconfigured {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let auth = &profile.auth;
        let auth_type = profile
            .auth_type
            .as_deref()
            .ok_or_else(|| misconfigured("profile has no auth_type"))?;

        match auth_type {
            "password" => Ok(AuthOptions::Password {
                auth_url: auth
                    .auth_url
                    .clone()
                    .ok_or_else(|| misconfigured("auth_type 'password' needs auth_url"))?,
                username: auth
                    .username
                    .clone()
                    .ok_or_else(|| misconfigured("auth_type 'password' needs username"))?,
                password: auth
                    .password
                    .clone()
                    .ok_or_else(|| misconfigured("auth_type 'password' needs password"))?,
                domain_name: auth.domain_name.clone().or(auth.user_domain_name.clone()),
                domain_id: auth.domain_id.clone(),
                project_name: auth.project_name.clone(),
            }),
            "token" | "v3token" => Ok(AuthOptions::Token {
                token: auth
                    .token
                    .clone()
                    .ok_or_else(|| misconfigured("auth_type 'token' needs a token"))?,
            }),
            "aksk" => Ok(AuthOptions::AkSk {
                access_key: auth
                    .access_key
                    .clone()
                    .ok_or_else(|| misconfigured("auth_type 'aksk' needs ak"))?,
                secret_key: auth
                    .secret_key
                    .clone()
                    .ok_or_else(|| misconfigured("auth_type 'aksk' needs sk"))?,
                security_token: auth.security_token.clone(),
            }),
            "v3applicationcredential" => Ok(AuthOptions::ApplicationCredential {
                auth_url: auth
                    .auth_url
                    .clone()
                    .ok_or_else(|| misconfigured("application credentials need auth_url"))?,
                id: auth
                    .application_credential_id
                    .clone()
                    .ok_or_else(|| misconfigured("application credentials need an id"))?,
                secret: auth.application_credential_secret.clone().ok_or_else(|| {
                    misconfigured("application credentials need a secret")
                })?,
            }),
            other => Err(misconfigured(&format!("unsupported auth_type '{other}'"))),
        }
    }
}

enum RequestAuth {
    Signed(AkSkMaterial),
    Token(String),
}

struct AkSkMaterial {
    access_key: String,
    secret_key: String,
    security_token: Option<String>,
}

/// Authenticated HTTP client for the management APIs. AK/SK profiles
/// sign every request; the other shapes are exchanged for an IAM token
/// once, at construction.
pub struct CloudClient {
    http: reqwest::blocking::Client,
    auth: RequestAuth,
    region: String,
    project_id: Option<String>,
}

impl CloudClient {
    pub fn new(effective: &EffectiveConfig) -> anyhow::Result<Self> {
        let profile = effective.require_profile()?;
        let options = AuthOptions::from_profile(&effective.cloud_name, profile)?;

        let region = effective
            .region
            .clone()
            .ok_or_else(|| anyhow!("no region resolved; pass --region or set region_name"))?;

        let http = reqwest::blocking::Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        let auth = match options {
            AuthOptions::AkSk {
                access_key,
                secret_key,
                security_token,
            } => RequestAuth::Signed(AkSkMaterial {
                access_key,
                secret_key,
                security_token,
            }),
            AuthOptions::Token { token } => RequestAuth::Token(token),
            AuthOptions::Password {
                ref auth_url,
                ref username,
                ref password,
                ref domain_name,
                ref domain_id,
                ref project_name,
            } => {
                let mut user = json!({ "name": username, "password": password });
                if let Some(domain) = domain_name {
                    user["domain"] = json!({ "name": domain });
                } else if let Some(id) = domain_id {
                    user["domain"] = json!({ "id": id });
                }
                let mut body = json!({
                    "auth": {
                        "identity": {
                            "methods": ["password"],
                            "password": { "user": user }
                        }
                    }
                });
                if let Some(project) = project_name {
                    body["auth"]["scope"] = json!({ "project": { "name": project } });
                }
                RequestAuth::Token(issue_token(&http, auth_url, &body)?)
            }
            AuthOptions::ApplicationCredential {
                ref auth_url,
                ref id,
                ref secret,
            } => {
                let body = json!({
                    "auth": {
                        "identity": {
                            "methods": ["application_credential"],
                            "application_credential": { "id": id, "secret": secret }
                        }
                    }
                });
                RequestAuth::Token(issue_token(&http, auth_url, &body)?)
            }
        };

        Ok(Self {
            http,
            auth,
            region,
            project_id: profile.auth.project_id.clone(),
        })
    }

    /// Regional endpoint for one service, e.g. `ecs` or `cce`.
    pub fn service_endpoint(&self, service: &str) -> String {
        format!("https://{service}.{}.{CLOUD_DOMAIN}", self.region)
    }

    /// Service URLs are project-scoped; the profile has to say which
    /// project to address.
    pub fn project_id(&self) -> anyhow::Result<&str> {
        self.project_id
            .as_deref()
            .ok_or_else(|| anyhow!("profile has no auth.project_id; set it in the clouds file"))
    }

    pub fn get(&self, url: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        self.request(reqwest::Method::GET, url, query, None)
    }

    pub fn post(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        self.request(reqwest::Method::POST, url, &[], Some(body))
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        self.request_inner(method, url, query, body)
            .map_err(|e| Error::Api {
                context: format!("request to {url} failed"),
                reason: e,
            })
    }

    fn request_inner(
        &self,
        method: reqwest::Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> anyhow::Result<serde_json::Value> {
        let mut parsed = Url::parse(url)?;
        for (key, value) in query {
            parsed.query_pairs_mut().append_pair(key, value);
        }

        let body_bytes = match body {
            Some(b) => serde_json::to_vec(b)?,
            None => Vec::new(),
        };

        let mut request = self
            .http
            .request(method.clone(), parsed.clone())
            .header("content-type", "application/json");

        match &self.auth {
            RequestAuth::Token(token) => {
                request = request.header("x-auth-token", token);
            }
            RequestAuth::Signed(material) => {
                let key = SigningKey {
                    access_key: &material.access_key,
                    secret_key: &material.secret_key,
                    security_token: material.security_token.as_deref(),
                };
                for (name, value) in
                    signer::sign_request(&key, method.as_str(), &parsed, &body_bytes, Utc::now())
                {
                    request = request.header(name, value);
                }
            }
        }

        if body.is_some() {
            request = request.body(body_bytes);
        }

        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            anyhow::bail!("HTTP {status}: {text}");
        }
        if text.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Exchanges password or application-credential material for a scoped
/// IAM token (`X-Subject-Token` response header).
fn issue_token(
    http: &reqwest::blocking::Client,
    auth_url: &str,
    body: &serde_json::Value,
) -> anyhow::Result<String> {
    let url = format!("{}/auth/tokens", auth_url.trim_end_matches('/'));
    let response = http
        .post(&url)
        .json(body)
        .send()
        .with_context(|| format!("token request to {url} failed"))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().unwrap_or_default();
        anyhow::bail!("token request to {url} failed: HTTP {status}: {text}");
    }

    let token = response
        .headers()
        .get("x-subject-token")
        .and_then(|v| v.to_str().ok())
        .context("token response carried no x-subject-token header")?;
    Ok(token.to_string())
}
