use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use headless_chrome::{Browser, LaunchOptions, Tab};
use url::Url;

use crate::error::{Error, Result};

/// Evaluate failures tolerated in a row before the browser is considered
/// gone. A single failure can be a page mid-navigation; the IdP redirect
/// chain navigates several times.
const CLOSED_DETECTION_STRIKES: u32 = 3;

const WINDOW_SIZE: (u32, u32) = (800, 900);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Launching,
    Navigating,
    AwaitingAuthentication,
    Authenticated,
    Closing,
    Closed,
    Failed,
}

/// State before any browser process exists.
impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

/// One interactive Chrome window, owned for the duration of a single
/// login attempt. The session holds the only `Browser` handle, so every
/// exit path, including panics, tears the process down when the session
/// is dropped.
pub struct BrowserSession {
    browser: Browser,
    tab: Arc<Tab>,
    state: SessionState,
}

impl BrowserSession {
    /// Idle -> Launching. Binds the browser to a persistent per-user
    /// profile directory so the IdP's "remember me" cookies survive
    /// between logins.
    pub fn launch(profile_dir: PathBuf, auth_timeout: Duration) -> Result<Self> {
        std::fs::create_dir_all(&profile_dir)
            .map_err(|e| Error::LaunchFailed(e.into()))?;

        let options = LaunchOptions {
            headless: false,
            window_size: Some(WINDOW_SIZE),
            user_data_dir: Some(profile_dir),
            // The connection must outlive a human completing an
            // interactive login, not just an automation round-trip.
            idle_browser_timeout: auth_timeout + Duration::from_secs(60),
            args: vec![
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-default-apps"),
            ],
            ..Default::default()
        };

        let browser = Browser::new(options).map_err(Error::LaunchFailed)?;
        let tab = browser.new_tab().map_err(Error::LaunchFailed)?;

        Ok(Self {
            browser,
            tab,
            state: SessionState::Launching,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tab(&self) -> &Tab {
        &self.tab
    }

    /// Launching -> Navigating -> AwaitingAuthentication. Opens the
    /// federation entry URL and waits for the initial page to reach DOM
    /// ready.
    pub fn open_federation_page(&mut self, url: &Url) -> Result<()> {
        self.state = SessionState::Navigating;

        let result = self
            .tab
            .navigate_to(url.as_str())
            .and_then(|tab| tab.wait_until_navigated());

        match result {
            Ok(_) => {
                self.state = SessionState::AwaitingAuthentication;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(Error::NavigationFailed(e))
            }
        }
    }

    /// AwaitingAuthentication -> Authenticated. There is no callback
    /// server to catch the redirect; completion is inferred purely from
    /// page content, by polling for a marker element the console only
    /// renders once the IdP has redirected back. A closed window and a
    /// never-appearing marker are distinct, user-diagnosable failures.
    pub fn wait_for_authentication(
        &mut self,
        marker_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<()> {
        let started = Instant::now();
        let probe = format!(
            "document.getElementById({}) !== null",
            serde_json::to_string(marker_id).unwrap_or_default()
        );
        let mut strikes = 0u32;

        loop {
            if started.elapsed() > timeout {
                self.state = SessionState::Failed;
                return Err(Error::AuthenticationTimeout(timeout.as_secs()));
            }

            match self.tab.evaluate(&probe, false) {
                Ok(result) => {
                    strikes = 0;
                    if result.value == Some(serde_json::Value::Bool(true)) {
                        self.state = SessionState::Authenticated;
                        return Ok(());
                    }
                }
                Err(_) => {
                    // An evaluate can fail transiently while the IdP
                    // chain is mid-navigation; a dead browser process
                    // fails the version probe as well.
                    strikes += 1;
                    if self.browser.get_version().is_err() || strikes >= CLOSED_DETECTION_STRIKES {
                        self.state = SessionState::Failed;
                        return Err(Error::BrowserClosedPrematurely);
                    }
                }
            }

            std::thread::sleep(poll_interval);
        }
    }

    /// Closing -> Closed. Best-effort; dropping the only `Browser`
    /// handle kills the Chrome process. Called on success and failure
    /// alike, before any harvest error is surfaced.
    pub fn close(mut self) {
        self.state = SessionState::Closing;
        // Consuming self drops the Browser handle at the end of this
        // call, which is what actually tears Chrome down.
        self.state = SessionState::Closed;
    }
}
