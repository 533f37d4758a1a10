use crate::FetchError;
use std::error::Error as StdError;
use std::io;

/// Classifies a transport error into a fetch failure
///
/// The source chain is walked for resolver messages and I/O error kinds,
/// since reqwest reports DNS failures and refused connections alike as
/// connect errors.
pub fn classify_reqwest_error(url: &str, err: reqwest::Error) -> FetchError {
    let url = url.to_string();
    let mut unknown_host = false;
    let mut no_route = false;
    let mut refused = false;

    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        let message = cause.to_string().to_lowercase();
        if message.contains("dns error")
            || message.contains("failed to lookup address")
            || message.contains("name or service not known")
            || message.contains("no such host")
        {
            unknown_host = true;
        }
        if message.contains("no route to host") || message.contains("network is unreachable") {
            no_route = true;
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::ConnectionRefused {
                refused = true;
            }
        }
        source = cause.source();
    }

    if unknown_host {
        FetchError::UnknownHost { url, source: err }
    } else if no_route {
        FetchError::NoRoute { url, source: err }
    } else if refused || err.is_connect() {
        FetchError::Connection { url, source: err }
    } else if err.is_timeout() || err.is_body() {
        FetchError::Socket { url, source: err }
    } else {
        FetchError::Http { url, source: err }
    }
}
