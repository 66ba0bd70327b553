mod btleplug_backend;
mod fake_backend;
mod model;
mod session;
mod transport;

pub use self::btleplug_backend::BtleplugTransport;
pub use self::fake_backend::{FakeController, FakeTransport, FakeTransportConfig};
pub(crate) use self::fake_backend::{HexPayload, NotificationPayloads};
pub use self::model::{CharacteristicInfo, FoundDevice, LinkEvent, LinkEventStream, ServiceInfo};
pub(crate) use self::session::validate_identity;
pub use self::transport::{Transport, TransportSession};
pub(crate) use self::transport::{TransportBackend, transport_from_backend};
