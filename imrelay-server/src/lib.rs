/// Chat relay: authenticates clients by display name and routes private,
/// group and presence frames between them.
pub use registry::{ConnectionId, RegisterError, Registry};
pub use relay::Relay;
pub use router::{Delivery, RelayEvent, Router};

pub mod registry;
mod relay;
pub mod router;
