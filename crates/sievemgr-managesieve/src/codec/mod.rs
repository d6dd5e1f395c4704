//! Wire codec for the ManageSieve protocol.
//!
//! - [`FramedStream`]: buffered line and literal I/O
//! - [`Reply`]: a response line together with the literal it announces
//! - [`parse_first_line`] / [`parse_response`]: response classification
//! - [`ScriptBodyDecoder`]: GETSCRIPT bodies that arrive without a literal
//! - [`quote`] / [`unquote`]: quoted-string encoding

mod framed;
mod quoted;
mod reply;
mod response;
mod script_body;

pub use framed::{FramedStream, MAX_LITERAL_SIZE};
pub use quoted::{quote, split_strings, unquote};
pub use reply::{Literal, Reply, before_literal};
pub use response::{FirstLine, literal_length, parse_first_line, parse_response};
pub use script_body::ScriptBodyDecoder;
