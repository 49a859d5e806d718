//! Instagram web client.
//!
//! Speaks the same endpoints a browser uses: prime a CSRF token, post the
//! login form, optionally answer a two-factor challenge, then look up the
//! account's own profile. The whole session lives in a cookie jar that can be
//! exported to and restored from a `SessionData`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::auth::SessionData;
use crate::models::{Profile, WebProfileInfoResponse};

use super::{ApiError, AuthError};

// ============================================================================
// Constants
// ============================================================================

/// Instagram web origin; all endpoints below are relative to it.
const BASE_URL: &str = "https://www.instagram.com";

const LOGIN_PATH: &str = "/api/v1/web/accounts/login/ajax/";
const TWO_FACTOR_PATH: &str = "/accounts/login/ajax/two_factor/";
const PROFILE_PATH: &str = "/api/v1/users/web_profile_info/";

/// Redirect target used when a request needs a logged-in session.
const LOGIN_PAGE_PREFIX: &str = "/accounts/login";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Public app id of the Instagram web frontend; required by the JSON API.
const IG_APP_ID: &str = "936619743392459";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const CSRF_COOKIE: &str = "csrftoken";
const SESSION_COOKIE: &str = "sessionid";

// ============================================================================
// Client seam
// ============================================================================

/// Operations the bootstrap flow needs from an authentication backend.
#[allow(async_fn_in_trait)]
pub trait AuthClient {
    /// Replace the current session with a stored one.
    fn load_session(&mut self, session: &SessionData) -> Result<(), AuthError>;

    /// Snapshot the current session for persisting.
    fn export_session(&self, username: &str) -> SessionData;

    /// Whether the current session still carries a login cookie.
    fn is_logged_in(&self) -> bool;

    async fn login(&mut self, username: &str, password: &SecretString) -> Result<(), AuthError>;

    async fn complete_two_factor(
        &mut self,
        challenge: &TwoFactorChallenge,
        code: &str,
    ) -> Result<(), AuthError>;

    async fn fetch_profile(&self, username: &str) -> Result<Profile, AuthError>;
}

/// Pending second login step handed back by `login`.
#[derive(Debug, Clone)]
pub struct TwoFactorChallenge {
    pub username: String,
    pub identifier: String,
    csrf_token: String,
}

impl TwoFactorChallenge {
    pub(crate) fn new(username: &str, identifier: &str, csrf_token: &str) -> Self {
        Self {
            username: username.to_string(),
            identifier: identifier.to_string(),
            csrf_token: csrf_token.to_string(),
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    authenticated: Option<bool>,
    #[serde(default)]
    user: Option<bool>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    two_factor_required: Option<bool>,
    #[serde(default)]
    two_factor_info: Option<TwoFactorInfo>,
    #[serde(default)]
    checkpoint_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwoFactorInfo {
    two_factor_identifier: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Decide what a login response means.
fn interpret_login(
    resp: LoginResponse,
    username: &str,
    csrf_token: &str,
) -> Result<(), AuthError> {
    if resp.two_factor_required.unwrap_or(false) {
        let info = resp.two_factor_info.ok_or_else(|| {
            AuthError::UnexpectedResponse("two-factor required without challenge".to_string())
        })?;
        return Err(AuthError::TwoFactorRequired(TwoFactorChallenge::new(
            username,
            &info.two_factor_identifier,
            csrf_token,
        )));
    }

    if let Some(url) = resp.checkpoint_url {
        return Err(AuthError::CheckpointRequired(url));
    }

    let status = resp.status.unwrap_or_default();
    if status != "ok" {
        return Err(AuthError::Rejected(match resp.message {
            Some(message) => format!("\"{}\" status, message \"{}\"", status, message),
            None => format!("\"{}\" status", status),
        }));
    }

    match resp.authenticated {
        Some(true) => Ok(()),
        Some(false) if resp.user.unwrap_or(false) => Err(AuthError::BadCredentials),
        Some(false) => Err(AuthError::UnknownUser(username.to_string())),
        None => Err(AuthError::UnexpectedResponse(
            resp.message
                .unwrap_or_else(|| "this might indicate a blocked IP".to_string()),
        )),
    }
}

// ============================================================================
// ApiClient
// ============================================================================

/// Cookie-based Instagram web client.
pub struct ApiClient {
    client: Client,
    jar: Arc<Jar>,
    base_url: Url,
}

impl ApiClient {
    /// Create a client for instagram.com
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(BASE_URL)
    }

    /// Create a client against another origin (used by tests)
    pub fn with_base_url(base_url: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::InvalidResponse(format!("invalid base URL {}: {}", base_url, e)))?;
        let jar = Arc::new(Jar::default());
        let client = Self::build_http(jar.clone())?;
        Ok(Self {
            client,
            jar,
            base_url,
        })
    }

    fn build_http(jar: Arc<Jar>) -> Result<Client, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert("x-ig-app-id", HeaderValue::from_static(IG_APP_ID));
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .cookie_provider(jar)
            .build()?;
        Ok(client)
    }

    /// Drop every cookie by swapping in a fresh jar.
    fn reset(&mut self) -> Result<(), ApiError> {
        let jar = Arc::new(Jar::default());
        self.client = Self::build_http(jar.clone())?;
        self.jar = jar;
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidResponse(format!("invalid path {}: {}", path, e)))
    }

    /// Cookies the jar would send to the base origin.
    fn cookies(&self) -> BTreeMap<String, String> {
        let mut cookies = BTreeMap::new();
        let Some(header) = self.jar.cookies(&self.base_url) else {
            return cookies;
        };
        let Ok(header) = header.to_str() else {
            warn!("Cookie header is not valid UTF-8");
            return cookies;
        };
        for pair in header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                cookies.insert(name.to_string(), value.to_string());
            }
        }
        cookies
    }

    fn csrf_token(&self) -> Option<String> {
        self.cookies()
            .remove(CSRF_COOKIE)
            .filter(|token| !token.is_empty())
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

impl AuthClient for ApiClient {
    fn load_session(&mut self, session: &SessionData) -> Result<(), AuthError> {
        self.reset()?;
        for (name, value) in &session.cookies {
            self.jar
                .add_cookie_str(&format!("{}={}; Path=/", name, value), &self.base_url);
        }
        debug!(username = %session.username, cookies = session.cookies.len(), "Session loaded into client");
        Ok(())
    }

    fn export_session(&self, username: &str) -> SessionData {
        SessionData::new(username, self.cookies())
    }

    fn is_logged_in(&self) -> bool {
        self.cookies()
            .get(SESSION_COOKIE)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    async fn login(&mut self, username: &str, password: &SecretString) -> Result<(), AuthError> {
        self.reset()?;

        // The landing page sets the csrftoken cookie the login form must echo.
        let response = self.client.get(self.base_url.clone()).send().await?;
        debug!(status = %response.status(), "Fetched landing page");
        Self::check_response(response).await?;
        let csrf_token = self.csrf_token().ok_or(AuthError::MissingCsrfToken)?;

        let enc_password = format!(
            "#PWD_INSTAGRAM_BROWSER:0:{}:{}",
            Utc::now().timestamp(),
            password.expose_secret()
        );

        let response = self
            .client
            .post(self.url(LOGIN_PATH)?)
            .header("x-csrftoken", &csrf_token)
            .header(header::REFERER, self.base_url.as_str())
            .form(&[("enc_password", enc_password.as_str()), ("username", username)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let resp: LoginResponse = serde_json::from_str(&body).map_err(|_| {
            AuthError::UnexpectedResponse(format!("login returned non-JSON body, status {}", status))
        })?;

        interpret_login(resp, username, &csrf_token)?;
        info!(username = %username, "Logged in");
        Ok(())
    }

    async fn complete_two_factor(
        &mut self,
        challenge: &TwoFactorChallenge,
        code: &str,
    ) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.url(TWO_FACTOR_PATH)?)
            .header("x-csrftoken", &challenge.csrf_token)
            .header(header::REFERER, self.base_url.as_str())
            .form(&[
                ("username", challenge.username.as_str()),
                ("verificationCode", code),
                ("identifier", challenge.identifier.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let resp: StatusResponse = serde_json::from_str(&body).map_err(|_| {
            AuthError::TwoFactorFailed(format!("non-JSON response, status {}", status))
        })?;

        let resp_status = resp.status.unwrap_or_default();
        if resp_status != "ok" {
            return Err(AuthError::TwoFactorFailed(
                resp.message
                    .unwrap_or_else(|| format!("\"{}\" status", resp_status)),
            ));
        }

        info!(username = %challenge.username, "Two-factor login completed");
        Ok(())
    }

    async fn fetch_profile(&self, username: &str) -> Result<Profile, AuthError> {
        let mut url = self.url(PROFILE_PATH)?;
        url.query_pairs_mut().append_pair("username", username);

        let response = self.client.get(url).send().await?;

        if response.url().path().starts_with(LOGIN_PAGE_PREFIX) {
            return Err(AuthError::LoginRequired);
        }

        let response = Self::check_response(response).await?;
        let body = response.text().await?;
        let parsed: WebProfileInfoResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::UnexpectedResponse(format!("failed to parse profile response: {}", e))
        })?;

        parsed.into_profile().ok_or_else(|| {
            AuthError::UnexpectedResponse(format!("no profile returned for @{}", username))
        })
    }
}
