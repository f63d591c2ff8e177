mod access;
mod chain;
pub mod convert;
mod reader;
mod transport;
#[cfg(target_os = "windows")]
mod win32;

// Mock transport for testing (always available for unit and integration tests)
#[doc(hidden)]
pub mod mock;

pub use access::{ChainWrite, MemoryAccess, ReadOutcome, TargetHandle};
pub use chain::{EmptyChain, PointerWidth};
pub use reader::ReadMemory;
pub(crate) use reader::zeroed;
pub use transport::{MemoryTransport, Protection, RawHandle};
#[cfg(target_os = "windows")]
pub use win32::WindowsTransport;

#[doc(hidden)]
pub use mock::{MockOpenFailure, MockTransport, MockTransportBuilder};
