//! Best-effort delivery of test results
//!
//! Submission never fails the surrounding run: every transport or protocol
//! problem is reduced to a printed diagnostic. The reporter drives
//! redirects itself with a bounded hop count rather than trusting the
//! server to terminate.

use crate::config::TestOptions;
use crate::envelope::{self, ResultEnvelope};
use crate::error::Result;
use crate::ui::UI;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

/// Well-known collector endpoint, overridable via `upload_service_url`.
pub const DEFAULT_RESULTS_URL: &str = "http://test.rubygems.org/test_results";

/// Environment toggle for an HTTP transcript on stderr.
pub const DEBUG_HTTP_ENV: &str = "GEMTEST_DEBUG_HTTP";

const MAX_REDIRECTS: usize = 3;

/// Structured reply from the collector
#[derive(Debug, Deserialize)]
struct CollectorResponse {
    success: bool,
    #[serde(default)]
    data: Option<Vec<String>>,
    #[serde(default)]
    errors: Option<Vec<String>>,
}

/// What one POST attempt came back as
#[derive(Debug, PartialEq)]
enum PostOutcome {
    Success(String),
    Redirect(Option<String>),
    NotFound,
    ClientError(u16),
    ServerError(u16),
    Unexpected(u16),
    ConnectionRefused,
    TransportError(String),
}

/// Submits result envelopes to the remote collector
pub struct ResultReporter {
    endpoint: String,
    agent: ureq::Agent,
}

impl ResultReporter {
    pub fn from_config(config: &TestOptions) -> Self {
        let endpoint = config
            .upload_service_url
            .clone()
            .unwrap_or_else(|| DEFAULT_RESULTS_URL.to_string());
        Self::new(endpoint)
    }

    pub fn new(endpoint: String) -> Self {
        // Redirects are handled by the submission loop, and HTTP error
        // statuses come back as plain responses for classification.
        let mut builder = ureq::Agent::config_builder()
            .max_redirects(0)
            .http_status_as_error(false);

        if let Some(proxy_url) = proxy_from_env() {
            if let Ok(proxy) = ureq::Proxy::new(&proxy_url) {
                builder = builder.proxy(Some(proxy));
            }
        }

        ResultReporter {
            endpoint,
            agent: builder.build().into(),
        }
    }

    /// Submit the envelope. Never raises to the caller; every failure mode
    /// ends in a diagnostic through the UI.
    pub fn submit(&self, envelope: &ResultEnvelope, ui: &mut dyn UI) {
        let payload = match envelope::serialize(envelope) {
            Ok(payload) => payload,
            Err(e) => {
                let _ = ui.error(&e.to_string());
                return;
            }
        };

        if let Err(e) = self.post_with_redirects(&payload, ui) {
            let _ = ui.output(&e.to_string());
        }
    }

    fn post_with_redirects(&self, payload: &str, ui: &mut dyn UI) -> Result<()> {
        let mut url = self.endpoint.clone();

        for _ in 0..=MAX_REDIRECTS {
            match self.post_once(&url, payload) {
                PostOutcome::Success(body) => return report_success_body(&body, ui),
                PostOutcome::Redirect(location) => {
                    match redirect_target(&url, location.as_deref()) {
                        Some(next) => {
                            url = next;
                            continue;
                        }
                        None => {
                            return ui.output(&format!(
                                "Caught redirection but was unable to redirect to {}.",
                                location.as_deref().unwrap_or("<missing>")
                            ))
                        }
                    }
                }
                PostOutcome::NotFound => {
                    return ui.output(
                        "Unable to find where to put the test results. Try: `gem update gemtest`",
                    )
                }
                PostOutcome::ClientError(_) => {
                    return ui.output(
                        "Results server didn't like the results submission. Try: `gem update gemtest`",
                    )
                }
                PostOutcome::ServerError(_) => {
                    return ui.output(
                        "Oof. Something went wrong on the results server processing these results. Sorry!",
                    )
                }
                PostOutcome::Unexpected(status) => {
                    return ui.output(&format!(
                        "Unexpected response from the results server (HTTP {}). Probably a bug.",
                        status
                    ))
                }
                PostOutcome::ConnectionRefused => {
                    return ui.output(
                        "Unable to post test results. Can't connect to the results server.",
                    )
                }
                PostOutcome::TransportError(message) => return ui.output(&message),
            }
        }

        ui.output("Caught redirection but ran out of redirects to follow.")
    }

    fn post_once(&self, url: &str, payload: &str) -> PostOutcome {
        let debug = env::var_os(DEBUG_HTTP_ENV).is_some();
        if debug {
            eprintln!("> POST {} ({} bytes)", url, payload.len());
        }

        match self.agent.post(url).send_form([("results", payload)]) {
            Ok(mut response) => {
                let status = response.status().as_u16();
                let location = response
                    .headers()
                    .get(ureq::http::header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .map(|value| value.to_string());
                let body = response.body_mut().read_to_string().unwrap_or_default();

                if debug {
                    eprintln!("< HTTP {}", status);
                    eprintln!("< {}", body);
                }

                classify_response(status, location, body)
            }
            Err(ureq::Error::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                PostOutcome::ConnectionRefused
            }
            Err(ureq::Error::ConnectionFailed) => PostOutcome::ConnectionRefused,
            Err(e) => PostOutcome::TransportError(e.to_string()),
        }
    }
}

fn classify_response(status: u16, location: Option<String>, body: String) -> PostOutcome {
    match status {
        200..=299 => PostOutcome::Success(body),
        300..=399 => PostOutcome::Redirect(location),
        404 => PostOutcome::NotFound,
        400..=499 => PostOutcome::ClientError(status),
        500..=599 => PostOutcome::ServerError(status),
        _ => PostOutcome::Unexpected(status),
    }
}

/// Decide whether a redirect can be followed. A missing location, or one
/// pointing back at the URL just tried, cannot.
fn redirect_target(current: &str, location: Option<&str>) -> Option<String> {
    match location {
        Some(location) if !location.is_empty() && location != current => {
            Some(location.to_string())
        }
        _ => None,
    }
}

fn report_success_body(body: &str, ui: &mut dyn UI) -> Result<()> {
    match serde_yaml::from_str::<CollectorResponse>(body) {
        Ok(reply) if reply.success => {
            let followup = reply.data.as_ref().and_then(|data| data.first());
            match followup {
                Some(url) => ui.output(&format!(
                    "\nTest results posted successfully!\n\nresults url:\t{}\n",
                    url
                )),
                None => ui.output("\nTest results posted successfully!\n"),
            }
        }
        Ok(reply) => {
            for error in reply.errors.unwrap_or_default() {
                ui.output(&error)?;
            }
            Ok(())
        }
        Err(e) => ui.output(&format!(
            "Results server replied with something unreadable: {}",
            e
        )),
    }
}

/// Proxy location from the environment, if declared. Bare host:port forms
/// default to an http scheme; credentials come from the _user/_pass
/// variants when not embedded in the URL itself.
fn proxy_from_env() -> Option<String> {
    let raw = env::var("http_proxy")
        .ok()
        .filter(|value| !value.is_empty())
        .or_else(|| env::var("HTTP_PROXY").ok().filter(|value| !value.is_empty()))?;

    let uri = normalize_uri(&raw);
    if uri.contains('@') {
        return Some(uri);
    }

    let user = env::var("http_proxy_user")
        .ok()
        .or_else(|| env::var("HTTP_PROXY_USER").ok());
    let pass = env::var("http_proxy_pass")
        .ok()
        .or_else(|| env::var("HTTP_PROXY_PASS").ok());

    match user {
        Some(user) => {
            let (scheme, rest) = split_scheme(&uri);
            let credentials = match pass {
                Some(pass) => format!("{}:{}", user, pass),
                None => user,
            };
            Some(format!("{}://{}@{}", scheme, credentials, rest))
        }
        None => Some(uri),
    }
}

fn scheme_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(https?|ftp|file):").expect("valid pattern"))
}

/// Prepend an http scheme when the value carries none.
fn normalize_uri(uri: &str) -> String {
    if scheme_pattern().is_match(uri) {
        uri.to_string()
    } else {
        format!("http://{}", uri)
    }
}

fn split_scheme(uri: &str) -> (&str, &str) {
    match uri.find("://") {
        Some(idx) => (&uri[..idx], &uri[idx + 3..]),
        None => ("http", uri),
    }
}
