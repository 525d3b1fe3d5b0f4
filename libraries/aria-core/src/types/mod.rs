mod ids;
mod network;
mod server_info;

pub use ids::{DeviceId, UserId};
pub use network::NetworkClass;
pub use server_info::ServerInfo;
