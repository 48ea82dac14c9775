pub mod mock;
pub mod rpc;

pub use mock::MockTransport;
pub use rpc::{RpcBackend, Transport};
