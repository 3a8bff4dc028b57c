use std::io;

macro_rules! reason_phrases {
    ($( $code:literal => $reason:literal; )*) => {
        /// Reason phrase for the status codes the server produces itself.
        pub(crate) const fn reason_phrase(code: u16) -> &'static str {
            match code {
                $( $code => $reason, )*
                _ => "Error",
            }
        }
    };
}

reason_phrases! {
    400 => "Bad Request";
    401 => "Unauthorized";
    403 => "Forbidden";
    404 => "Not Found";
    405 => "Method Not Allowed";
    408 => "Request Timeout";
    411 => "Length Required";
    413 => "Payload Too Large";
    414 => "URI Too Long";
    431 => "Request Header Fields Too Large";
    500 => "Internal Server Error";
    501 => "Not Implemented";
    502 => "Bad Gateway";
    503 => "Service Unavailable";
    505 => "HTTP Version Not Supported";
}

/// A peer that resets or hangs up an idle keep-alive connection is routine.
/// Such failures are logged at debug level; anything after the first byte of
/// a request is not.
pub(crate) fn should_suppress_read_error(error: &io::Error, received: bool) -> bool {
    if received {
        return false;
    }

    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
