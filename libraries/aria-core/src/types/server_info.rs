/// Server identification types
use serde::{Deserialize, Serialize};

/// Identification response from an Aria server (`GET /api/info`).
///
/// Discovery uses this to confirm a candidate address actually hosts an
/// Aria server before any authenticated traffic flows to it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    /// Stable identifier for the server installation
    pub server_id: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    /// Whether the server requires authentication
    #[serde(default = "default_requires_auth")]
    pub requires_auth: bool,
}

fn default_requires_auth() -> bool {
    true
}

impl ServerInfo {
    /// Whether this response plausibly identifies an Aria server.
    ///
    /// A reverse proxy or captive portal can answer 200 with arbitrary
    /// JSON; an empty product name or version is treated as "not ours".
    pub fn is_valid_identification(&self) -> bool {
        !self.name.is_empty() && !self.version.is_empty()
    }
}
