mod config;
pub mod device;
mod endpoint;
mod error;
mod format;
pub mod logging;
pub mod sink;
pub mod source;
mod stream;

pub use config::BridgeConfig;
pub use device::{Bridge, Capabilities, ChannelArea, Direction, HwParams, OpenMode, VirtualDevice};
pub use endpoint::{Endpoint, DEFAULT_PORT};
pub use error::{BridgeError, NetError};
pub use format::{PcmFormat, SampleFormat};
pub use sink::Sink;
pub use source::Source;
pub use stream::{ClientOptions, ClientState, ClientStats, StreamClient};
