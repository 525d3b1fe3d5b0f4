/// Network classification used to scale discovery timeouts
use serde::{Deserialize, Serialize};

/// Coarse class of the active network connection.
///
/// Metered connections (cellular, tethering) get proportionally longer
/// probe timeouts than unmetered Wi-Fi/Ethernet. The host application
/// reports this; the core never inspects interfaces itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkClass {
    /// Wi-Fi, Ethernet - latency expectations are tight
    Unmetered,
    /// Cellular or other metered link - allow slower round trips
    Metered,
}

impl Default for NetworkClass {
    fn default() -> Self {
        Self::Unmetered
    }
}

impl NetworkClass {
    /// Whether timeouts should be scaled up for this class
    pub fn is_metered(self) -> bool {
        matches!(self, Self::Metered)
    }
}
