//! Single-candidate probing against the server identification endpoint.

use aria_core::{FailureKind, RetryPolicy, ServerInfo};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// Why one probe attempt failed. Probe failures are never surfaced to the
/// caller of `discover`; they only decide whether the candidate gets
/// another attempt.
#[derive(Debug)]
pub(crate) enum ProbeFailure {
    Transport(FailureKind),
    /// Answered, but the body was not an Aria server identification
    NotAnAriaServer,
}

/// Probe one candidate with a small retry budget.
///
/// Each attempt is bounded by `timeout`; transient transport failures are
/// retried per the policy, anything else fails the candidate immediately.
pub(crate) async fn probe_with_retry(
    http: &Client,
    base_url: &Url,
    timeout: Duration,
    policy: &RetryPolicy,
) -> Result<ServerInfo, ProbeFailure> {
    let mut attempt = 0;
    loop {
        match probe_once(http, base_url, timeout).await {
            Ok(info) => return Ok(info),
            Err(ProbeFailure::Transport(kind))
                if attempt + 1 < policy.max_attempts
                    && RetryPolicy::classify(kind).is_retryable() =>
            {
                let delay = policy.backoff(attempt, kind);
                trace!(url = %base_url, attempt, delay_ms = delay.as_millis() as u64, "Probe retry");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(failure) => return Err(failure),
        }
    }
}

async fn probe_once(
    http: &Client,
    base_url: &Url,
    timeout: Duration,
) -> Result<ServerInfo, ProbeFailure> {
    let url = identification_url(base_url);
    debug!(url = %url, "Probing candidate");

    let request = http.get(url).timeout(timeout).send();
    let response = match request.await {
        Ok(r) => r,
        Err(e) => return Err(ProbeFailure::Transport(map_transport_error(&e))),
    };

    let status = response.status();
    if !status.is_success() {
        return Err(ProbeFailure::Transport(FailureKind::Status(status.as_u16())));
    }

    match response.json::<ServerInfo>().await {
        Ok(info) if info.is_valid_identification() => Ok(info),
        Ok(_) | Err(_) => Err(ProbeFailure::NotAnAriaServer),
    }
}

/// `{base}/api/info`, the unauthenticated identification endpoint.
fn identification_url(base_url: &Url) -> String {
    let base = base_url.as_str().trim_end_matches('/');
    format!("{base}/api/info")
}

fn map_transport_error(e: &reqwest::Error) -> FailureKind {
    if e.is_timeout() {
        FailureKind::TimedOut
    } else if e.is_connect() {
        FailureKind::ConnectFailed
    } else {
        // reqwest reports DNS failure as a connect error with a hyper
        // source; without a resolver signal we treat remaining request
        // errors as DNS-ish address problems: not worth retrying
        FailureKind::DnsFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identification_url_strips_trailing_slash() {
        let base = Url::parse("https://media.example.com:8920/").unwrap();
        assert_eq!(
            identification_url(&base),
            "https://media.example.com:8920/api/info"
        );

        let with_path = Url::parse("https://media.example.com/aria").unwrap();
        assert_eq!(
            identification_url(&with_path),
            "https://media.example.com/aria/api/info"
        );
    }
}
