//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → codec.rs (frame and buffer one request off the client socket)
//!     → message.rs (start line, ordered headers, body)
//!     → [policy gate decides forward or rewrite]
//!     → codec.rs (read the upstream response head)
//!     → classifiable: buffer the body, response.rs builds a report if the gate trips
//!     → otherwise: relay the body to the client as it arrives
//! ```

pub mod codec;
pub mod headers;
pub mod message;
pub mod response;

pub use codec::{read_request, read_response_head, BodyFraming, RawMessage, ResponseHead};
pub use headers::Headers;
pub use message::{HttpMessage, StartLine};
pub use response::SyntheticResponses;
