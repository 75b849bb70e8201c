pub mod renet_transport;
pub mod transport;

pub use renet_transport::RenetTransport;
pub use transport::{PeerHandle, Transport, TransportEvent};
