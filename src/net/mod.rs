//! HTTP plumbing for the remote speech and chat services.

pub mod http;
pub mod mock;
pub mod multipart;
pub mod transport;

pub use http::{ReqwestTransport, TransportSettings};
pub use mock::{MockReply, MockTransport, RecordedRequest};
pub use multipart::{Boundary, MultipartUpload};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, RequestBody};

use std::io;

/// True if an I/O error raised while reading a response body is a timeout.
///
/// The blocking reqwest body wraps its own error type inside `io::Error`,
/// so the kind alone is not enough.
pub fn is_timeout(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::TimedOut {
        return true;
    }
    error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
        .is_some_and(reqwest::Error::is_timeout)
}
