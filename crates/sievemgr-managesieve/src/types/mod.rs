//! Core ManageSieve types.

mod capability;
mod mechanism;
mod response;
mod response_code;

pub use capability::Capabilities;
pub use mechanism::Mechanism;
pub use response::{Response, Status};
pub use response_code::ResponseCode;
