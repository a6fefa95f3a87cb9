use std::time::{Duration, Instant};

use headless_chrome::Tab;

use crate::error::{Error, Result};

/// Page-scoped slot the injected script writes the response body into.
const RESULT_SLOT: &str = "__ssokey_credentials__";

/// Retry schedule for the credential fetch. The authenticated session
/// can briefly 401 right after the redirect, before its cookies fully
/// propagate, so one attempt is not enough. Defaults match the flow this
/// was tuned against; all four knobs are adjustable.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Full fetch attempts before giving up.
    pub attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Interval at which the result slot is polled within one attempt.
    pub poll_interval: Duration,
    /// Per-attempt cap on waiting for the slot to fill.
    pub poll_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            retry_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(10),
        }
    }
}

/// Fetches a temporary credential payload from inside the authenticated
/// session. Returns the raw response body; parsing is the caller's
/// concern, so fetch failures and payload-shape failures stay distinct.
pub fn harvest(tab: &Tab, expiration_secs: u64, cfg: &PollConfig) -> Result<String> {
    harvest_with(cfg, || fetch_attempt(tab, expiration_secs, cfg))
}

/// Retry engine, generic over one fetch attempt. An attempt yields
/// `Ok(Some(body))` on success, `Ok(None)` when the slot never filled
/// within its window, and `Err` on a scripting failure; the latter two
/// both count against the attempt budget.
pub fn harvest_with<F>(cfg: &PollConfig, mut attempt: F) -> Result<String>
where
    F: FnMut() -> anyhow::Result<Option<String>>,
{
    for n in 1..=cfg.attempts {
        match attempt() {
            Ok(Some(body)) if !body.is_empty() => return Ok(body),
            Ok(_) => {}
            Err(e) => {
                eprintln!("Credential fetch attempt failed: {e:#}");
            }
        }

        if n < cfg.attempts {
            eprintln!("Retrying credential fetch ({n}/{})...", cfg.attempts);
            std::thread::sleep(cfg.retry_delay);
        }
    }

    Err(Error::CredentialFetchFailed {
        attempts: cfg.attempts,
    })
}

/// One attempt: clear the slot, fire the in-page request with the
/// session's cookies, then poll the slot until the response lands or the
/// per-attempt window lapses. The fetch resolves asynchronously relative
/// to the injection point, which is why the result has to be polled
/// rather than returned.
fn fetch_attempt(tab: &Tab, expiration_secs: u64, cfg: &PollConfig) -> anyhow::Result<Option<String>> {
    let inject = format!(
        r#"
        window.{slot} = null;
        fetch('/iam/server/aklist?type=sts&duration={duration}', {{
            method: 'GET',
            credentials: 'include'
        }})
            .then(response => response.text())
            .then(text => {{ window.{slot} = text; }});
        "#,
        slot = RESULT_SLOT,
        duration = expiration_secs,
    );
    tab.evaluate(&inject, false)?;

    let started = Instant::now();
    while started.elapsed() < cfg.poll_timeout {
        let result = tab.evaluate(&format!("window.{RESULT_SLOT}"), false)?;
        if let Some(serde_json::Value::String(body)) = result.value {
            if !body.is_empty() {
                return Ok(Some(body));
            }
        }
        std::thread::sleep(cfg.poll_interval);
    }

    Ok(None)
}
