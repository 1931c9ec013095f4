//! Gateway: builder and the assembled interception layer

mod builder;
mod offline;

pub use builder::{Muninn, MuninnBuilder};
pub use offline::OfflineGateway;
