//! The transport-facing side of a request.
//!
//! Whatever produced a request (a CGI gateway, a socket listener, a test
//! harness) hands it over through [`RequestSource`];
//! [`ServerRequest::from_source`](crate::protocol::ServerRequest::from_source)
//! assembles the message from it.

use bytes::Bytes;

use crate::protocol::ServerParams;

/// Supplies the raw pieces of an incoming request.
#[cfg_attr(test, mockall::automock)]
pub trait RequestSource {
    /// The method as declared by the client.
    fn method(&self) -> String;

    fn request_target(&self) -> String;

    /// The protocol label, such as `HTTP/1.1`.
    fn protocol(&self) -> String;

    /// Header name and value pairs in arrival order.
    fn header_lines(&self) -> Vec<(String, String)>;

    fn body(&self) -> Bytes;

    /// Environment values passed through to the request untouched.
    fn environment(&self) -> ServerParams;
}
