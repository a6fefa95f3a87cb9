pub mod browser;
pub mod harvest;

use std::time::Duration;

use chrono::DateTime;
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::storage::{ConfigStore, EffectiveConfig};

use browser::BrowserSession;
use harvest::PollConfig;

pub const DEFAULT_PROTOCOL: &str = "saml";
pub const DEFAULT_EXPIRATION_SECS: u64 = 3600;
pub const DEFAULT_BASE_URL: &str = "https://auth.otc.t-systems.com/authui/federation/websso";
pub const DEFAULT_AUTH_URL: &str = "https://iam.eu-de.otc.t-systems.com/v3";

/// Element the cloud console renders only after the IdP has redirected
/// back; its appearance is the observable login-completed signal.
const COMPLETION_MARKER_ID: &str = "cf_logo";

/// Overall cap on the interactive part of the flow.
const AUTH_TIMEOUT: Duration = Duration::from_secs(600);
const MARKER_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Login-specific overrides accepted by the CLI.
#[derive(Debug, Clone, Default)]
pub struct LoginFlags {
    pub base_url: Option<String>,
    pub auth_url: Option<String>,
    pub domain_id: Option<String>,
    pub idp: Option<String>,
    pub protocol: Option<String>,
    pub expiration: Option<u64>,
}

/// Resolved parameters for one login attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginArgs {
    pub base_url: String,
    pub auth_url: String,
    pub domain_id: String,
    pub idp: String,
    pub protocol: String,
    pub expiration: u64,
}

impl LoginArgs {
    /// Flag -> stored SSO parameters of the selected profile -> built-in
    /// default. Domain id and IdP have no defaults; a first login must
    /// name them, later logins replay the stored values.
    pub fn resolve(flags: &LoginFlags, effective: &EffectiveConfig) -> anyhow::Result<Self> {
        let profile = effective.profile.as_ref();
        let sso = profile.and_then(|p| p.sso.as_ref());

        let base_url = flags
            .base_url
            .clone()
            .or_else(|| sso.and_then(|s| s.base_url.clone()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let auth_url = flags
            .auth_url
            .clone()
            .or_else(|| profile.and_then(|p| p.auth.auth_url.clone()))
            .unwrap_or_else(|| DEFAULT_AUTH_URL.to_string());

        let domain_id = flags
            .domain_id
            .clone()
            .or_else(|| profile.and_then(|p| p.auth.domain_id.clone()))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no domain id for cloud '{}'; pass --domain-id for the first login",
                    effective.cloud_name
                )
            })?;

        let idp = flags
            .idp
            .clone()
            .or_else(|| sso.and_then(|s| s.idp.clone()))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no identity provider for cloud '{}'; pass --idp for the first login",
                    effective.cloud_name
                )
            })?;

        let protocol = flags
            .protocol
            .clone()
            .or_else(|| sso.and_then(|s| s.protocol.clone()))
            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());

        let expiration = flags
            .expiration
            .or_else(|| sso.and_then(|s| s.expiration))
            .unwrap_or(DEFAULT_EXPIRATION_SECS);

        Ok(Self {
            base_url,
            auth_url,
            domain_id,
            idp,
            protocol,
            expiration,
        })
    }

    /// Federation entry URL the browser opens to start the flow.
    pub fn federation_url(&self) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        url.query_pairs_mut()
            .append_pair("domain_id", &self.domain_id)
            .append_pair("idp", &self.idp)
            .append_pair("protocol", &self.protocol);
        Ok(url)
    }
}

/// Response envelope of the credential-issuing endpoint.
#[derive(Debug, Deserialize)]
pub struct StsCredentialResponse {
    pub data: StsCredentialData,
    #[serde(rename = "retinfo")]
    pub ret_info: String,
}

#[derive(Debug, Deserialize)]
pub struct StsCredentialData {
    pub credential: StsCredential,
}

/// Short-lived access key / secret key / security token triple.
#[derive(Debug, Deserialize)]
pub struct StsCredential {
    pub access: String,
    pub secret: String,
    pub expires_at: String,
    #[serde(rename = "securitytoken")]
    pub security_token: String,
}

/// Runs one complete login: browser session, marker wait, credential
/// harvest, store update. The browser is closed before any harvest error
/// surfaces; a leaked interactive Chrome window is its own failure mode.
pub fn run_login(
    store: &ConfigStore,
    effective: &EffectiveConfig,
    args: &LoginArgs,
    poll: &PollConfig,
) -> anyhow::Result<()> {
    let url = args.federation_url()?;

    eprintln!("Opening managed browser for login...");
    let mut session = BrowserSession::launch(store.browser_profile_dir(), AUTH_TIMEOUT)?;

    let raw = drive_session(&mut session, &url, args, poll);
    session.close();
    let raw = raw?;

    materialize(store, effective, args, &raw)?;
    Ok(())
}

fn drive_session(
    session: &mut BrowserSession,
    url: &Url,
    args: &LoginArgs,
    poll: &PollConfig,
) -> Result<String> {
    session.open_federation_page(url)?;

    eprintln!("Please complete the login in the opened browser window.");
    eprintln!("Waiting for redirect to console...");
    session.wait_for_authentication(COMPLETION_MARKER_ID, AUTH_TIMEOUT, MARKER_POLL_INTERVAL)?;
    debug_assert_eq!(session.state(), browser::SessionState::Authenticated);

    eprintln!("Fetching credentials...");
    harvest::harvest(session.tab(), args.expiration, poll)
}

/// Validates the harvested payload and writes it into the store under
/// the selected cloud. Only the credential, connection and SSO replay
/// fields are touched; everything else on the profile, including keys
/// this tool does not interpret, stays as it was.
pub fn materialize(
    store: &ConfigStore,
    effective: &EffectiveConfig,
    args: &LoginArgs,
    raw_payload: &str,
) -> Result<()> {
    let response: StsCredentialResponse =
        serde_json::from_str(raw_payload).map_err(Error::MalformedCredentialPayload)?;

    if response.ret_info != "success" {
        return Err(Error::CredentialRequestRejected(response.ret_info));
    }

    let credential = response.data.credential;
    let expires_at = credential.expires_at.clone();

    store.upsert_profile(&effective.cloud_name, |profile| {
        let sso = profile.sso.get_or_insert_with(Default::default);
        sso.base_url = Some(args.base_url.clone());
        sso.idp = Some(args.idp.clone());
        sso.protocol = Some(args.protocol.clone());
        sso.expiration = Some(args.expiration);

        profile.auth.auth_url = Some(args.auth_url.clone());
        profile.auth.domain_id = Some(args.domain_id.clone());
        profile.auth.access_key = Some(credential.access);
        profile.auth.secret_key = Some(credential.secret);
        profile.auth.security_token = Some(credential.security_token);
        profile.auth.expires_at = Some(credential.expires_at);

        if let Some(project) = &effective.project_name {
            profile.auth.project_name = Some(project.clone());
        }
        if let Some(region) = &effective.region {
            profile.region_name = Some(region.clone());
        }

        profile.auth_type = Some("aksk".to_string());
    })?;

    store.select_cloud(&effective.cloud_name)?;

    eprintln!(
        "Credentials stored in {} under cloud '{}'",
        store.path().display(),
        effective.cloud_name
    );
    match DateTime::parse_from_rfc3339(&expires_at) {
        Ok(ts) => eprintln!("Credentials expire at {}", ts.to_rfc2822()),
        Err(_) => eprintln!("Credentials expire at {expires_at}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{resolve, CommonFlags, SsoSection};

    const PAYLOAD: &str = r#"{"data":{"credential":{"access":"AK","secret":"SK","expires_at":"2025-01-01T00:00:00Z","securitytoken":"TOK"}},"retinfo":"success"}"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn temp_store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join("clouds.yaml"));
        (dir, store)
    }

    fn login_args() -> LoginArgs {
        LoginArgs {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            domain_id: "d1".to_string(),
            idp: "idpA".to_string(),
            protocol: "saml".to_string(),
            expiration: 3600,
        }
    }

    #[test]
    fn federation_url_carries_the_three_query_parameters() {
        let url = login_args().federation_url().unwrap();
        assert_eq!(
            url.as_str(),
            format!("{DEFAULT_BASE_URL}?domain_id=d1&idp=idpA&protocol=saml")
        );
    }

    #[test]
    fn login_args_fall_back_to_stored_sso_parameters_then_defaults() {
        let (_dir, store) = temp_store();
        store
            .upsert_profile("prod", |p| {
                p.auth.domain_id = Some("stored-domain".into());
                p.sso = Some(SsoSection {
                    idp: Some("stored-idp".into()),
                    expiration: Some(900),
                    ..Default::default()
                });
            })
            .unwrap();

        let flags = CommonFlags {
            cloud: Some("prod".into()),
            ..Default::default()
        };
        let effective = resolve(&flags, no_env, &store.load().unwrap());

        // A bare `login` replays the stored flow.
        let args = LoginArgs::resolve(&LoginFlags::default(), &effective).unwrap();
        assert_eq!(args.domain_id, "stored-domain");
        assert_eq!(args.idp, "stored-idp");
        assert_eq!(args.expiration, 900);
        assert_eq!(args.protocol, DEFAULT_PROTOCOL);
        assert_eq!(args.base_url, DEFAULT_BASE_URL);

        // Explicit flags still win over stored values.
        let overridden = LoginArgs::resolve(
            &LoginFlags {
                idp: Some("flag-idp".into()),
                expiration: Some(7200),
                ..Default::default()
            },
            &effective,
        )
        .unwrap();
        assert_eq!(overridden.idp, "flag-idp");
        assert_eq!(overridden.expiration, 7200);
    }

    #[test]
    fn first_login_requires_domain_id_and_idp() {
        let effective = resolve(&CommonFlags::default(), no_env, &Default::default());
        assert!(LoginArgs::resolve(&LoginFlags::default(), &effective).is_err());
    }

    #[test]
    fn successful_payload_lands_in_the_store() {
        let (_dir, store) = temp_store();
        let flags = CommonFlags {
            cloud: Some("prod".into()),
            region: Some("eu-de".into()),
            project: Some("eu-de_sandbox".into()),
        };
        let effective = resolve(&flags, no_env, &store.load().unwrap());

        materialize(&store, &effective, &login_args(), PAYLOAD).unwrap();

        let clouds = store.load().unwrap();
        let profile = &clouds.clouds["prod"];
        assert_eq!(profile.auth.access_key.as_deref(), Some("AK"));
        assert_eq!(profile.auth.secret_key.as_deref(), Some("SK"));
        assert_eq!(profile.auth.security_token.as_deref(), Some("TOK"));
        assert_eq!(
            profile.auth.expires_at.as_deref(),
            Some("2025-01-01T00:00:00Z")
        );
        assert_eq!(profile.auth_type.as_deref(), Some("aksk"));
        assert_eq!(profile.region_name.as_deref(), Some("eu-de"));
        assert_eq!(profile.auth.project_name.as_deref(), Some("eu-de_sandbox"));
        assert_eq!(clouds.selected_cloud.as_deref(), Some("prod"));

        // The SSO parameters are recorded so a bare login replays them.
        let sso = profile.sso.as_ref().unwrap();
        assert_eq!(sso.idp.as_deref(), Some("idpA"));
        assert_eq!(sso.protocol.as_deref(), Some("saml"));
        assert_eq!(sso.expiration, Some(3600));
    }

    #[test]
    fn rejected_payload_never_touches_the_store() {
        let (_dir, store) = temp_store();
        store
            .upsert_profile("prod", |p| {
                p.auth.username = Some("keep-me".into());
            })
            .unwrap();
        let before = store.load().unwrap();

        let effective = resolve(
            &CommonFlags {
                cloud: Some("prod".into()),
                ..Default::default()
            },
            no_env,
            &before,
        );
        let rejected = PAYLOAD.replace("success", "failure");

        match materialize(&store, &effective, &login_args(), &rejected) {
            Err(Error::CredentialRequestRejected(info)) => assert_eq!(info, "failure"),
            other => panic!("expected CredentialRequestRejected, got {other:?}"),
        }
        assert_eq!(store.load().unwrap(), before);
    }

    #[test]
    fn malformed_payload_is_its_own_error_kind() {
        let (_dir, store) = temp_store();
        let effective = resolve(&CommonFlags::default(), no_env, &Default::default());

        match materialize(&store, &effective, &login_args(), "<html>sign in</html>") {
            Err(Error::MalformedCredentialPayload(_)) => {}
            other => panic!("expected MalformedCredentialPayload, got {other:?}"),
        }
        assert!(store.load().unwrap().clouds.is_empty());
    }

    #[test]
    fn materialize_preserves_unrelated_profile_fields() {
        let (dir, store) = temp_store();
        std::fs::write(
            dir.path().join("clouds.yaml"),
            "\
clouds:
  prod:
    auth:
      username: alice
      vendor_hint: opaque
    interface: public
    pinned: true
",
        )
        .unwrap();

        let effective = resolve(
            &CommonFlags {
                cloud: Some("prod".into()),
                ..Default::default()
            },
            no_env,
            &store.load().unwrap(),
        );
        materialize(&store, &effective, &login_args(), PAYLOAD).unwrap();

        let profile = store.profile("prod").unwrap().unwrap();
        assert_eq!(profile.auth.username.as_deref(), Some("alice"));
        assert_eq!(profile.interface.as_deref(), Some("public"));
        assert!(profile.auth.extra.contains_key("vendor_hint"));
        assert!(profile.extra.contains_key("pinned"));
        assert_eq!(profile.auth.access_key.as_deref(), Some("AK"));
    }

    // End-to-end over the non-interactive half of the flow: empty store,
    // resolved args, harvested payload, stored aksk profile.
    #[test]
    fn empty_store_to_stored_aksk_profile() {
        let (_dir, store) = temp_store();
        let flags = CommonFlags {
            cloud: Some("otc-prod".into()),
            ..Default::default()
        };
        let effective = resolve(&flags, no_env, &store.load().unwrap());

        let args = LoginArgs::resolve(
            &LoginFlags {
                domain_id: Some("d1".into()),
                idp: Some("idpA".into()),
                protocol: Some("saml".into()),
                expiration: Some(3600),
                ..Default::default()
            },
            &effective,
        )
        .unwrap();

        let cfg = harvest::PollConfig {
            attempts: 3,
            retry_delay: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
            poll_timeout: Duration::from_millis(1),
        };
        let raw = harvest::harvest_with(&cfg, || Ok(Some(PAYLOAD.to_string()))).unwrap();

        materialize(&store, &effective, &args, &raw).unwrap();

        let clouds = store.load().unwrap();
        let profile = &clouds.clouds["otc-prod"];
        assert_eq!(profile.auth.access_key.as_deref(), Some("AK"));
        assert_eq!(profile.auth.secret_key.as_deref(), Some("SK"));
        assert_eq!(profile.auth.security_token.as_deref(), Some("TOK"));
        assert_eq!(profile.auth_type.as_deref(), Some("aksk"));
    }
}
