pub mod cancel;
pub mod channel;
pub mod kernel;

pub use cancel::CancelToken;
pub use channel::{event_channel, EventReceiver, EventSender, Received, DEFAULT_CAPACITY};
pub use kernel::RunKernel;
