//! Expansion of a raw user-entered address into ordered candidate URLs.

use crate::error::{DiscoveryError, Result};
use url::Url;

/// Conventional TLS port for an Aria server.
pub const WELL_KNOWN_TLS_PORT: u16 = 8920;
/// Conventional plain-HTTP port for an Aria server.
pub const WELL_KNOWN_HTTP_PORT: u16 = 8096;

/// One probe target derived from the user-entered address.
///
/// Lower priority values are probed first. HTTPS ranks above HTTP and
/// well-known server ports above bare scheme defaults; anything the user
/// spelled out explicitly ranks above all generated variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCandidate {
    pub url: Url,
    pub priority: u8,
}

impl EndpointCandidate {
    fn new(url: Url, priority: u8) -> Self {
        Self { url, priority }
    }
}

/// Expand a raw address into an ordered, deduplicated candidate list.
///
/// Accepted inputs: bare hostname, `host:port`, or a full URL with
/// scheme and optional path. The candidate order implements the
/// preference HTTPS > HTTP, well-known port > scheme default.
pub fn expand_candidates(raw: &str) -> Result<Vec<EndpointCandidate>> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(DiscoveryError::InvalidAddress(
            "address cannot be empty".into(),
        ));
    }

    let mut candidates = if trimmed.contains("://") {
        expand_explicit_scheme(trimmed)?
    } else {
        expand_bare_host(trimmed)?
    };

    candidates.sort_by_key(|c| c.priority);
    candidates.dedup_by(|a, b| a.url == b.url);
    Ok(candidates)
}

/// The user supplied a scheme; respect it, but still try the well-known
/// port for that scheme when no port was spelled out.
fn expand_explicit_scheme(raw: &str) -> Result<Vec<EndpointCandidate>> {
    let url = parse(raw)?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(DiscoveryError::InvalidAddress(format!(
                "unsupported scheme: {other}"
            )))
        }
    }

    let mut candidates = vec![EndpointCandidate::new(url.clone(), 0)];

    if url.port().is_none() {
        let well_known = match url.scheme() {
            "https" => WELL_KNOWN_TLS_PORT,
            _ => WELL_KNOWN_HTTP_PORT,
        };
        let mut variant = url;
        if variant.set_port(Some(well_known)).is_ok() {
            candidates.push(EndpointCandidate::new(variant, 1));
        }
    }

    Ok(candidates)
}

/// No scheme given: permute scheme and port, HTTPS variants first.
fn expand_bare_host(raw: &str) -> Result<Vec<EndpointCandidate>> {
    let (host, explicit_port) = split_host_port(raw);

    if let Some(port) = explicit_port {
        return Ok(vec![
            EndpointCandidate::new(parse(&format!("https://{host}:{port}"))?, 0),
            EndpointCandidate::new(parse(&format!("http://{host}:{port}"))?, 1),
        ]);
    }

    Ok(vec![
        EndpointCandidate::new(
            parse(&format!("https://{host}:{WELL_KNOWN_TLS_PORT}"))?,
            0,
        ),
        EndpointCandidate::new(parse(&format!("https://{host}"))?, 1),
        EndpointCandidate::new(
            parse(&format!("http://{host}:{WELL_KNOWN_HTTP_PORT}"))?,
            2,
        ),
        EndpointCandidate::new(parse(&format!("http://{host}"))?, 3),
    ])
}

/// Split a scheme-less address into host and optional port.
///
/// Bracketed IPv6 literals keep their brackets; a suffix only counts as
/// a port when it parses as one.
fn split_host_port(raw: &str) -> (String, Option<u16>) {
    if raw.starts_with('[') {
        if let Some((host, port)) = raw.rsplit_once("]:") {
            if let Ok(port) = port.parse() {
                return (format!("{host}]"), Some(port));
            }
        }
        return (raw.to_string(), None);
    }

    if raw.matches(':').count() == 1 {
        if let Some((host, port)) = raw.rsplit_once(':') {
            if let Ok(port) = port.parse() {
                return (host.to_string(), Some(port));
            }
        }
    }

    (raw.to_string(), None)
}

fn parse(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| DiscoveryError::InvalidAddress(format!("{raw}: {e}")))
}
