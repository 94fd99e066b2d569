//! User-facing error messages.
//!
//! [`make_friendly`] turns an error chain into a short title, an explanation
//! and a hint. Structured causes (cancellation, transport failures, I/O
//! kinds) are inspected first; the rendered chain text is used as a fallback.

use std::error::Error;
use std::fmt;
use std::io;

use multiuploader_providers::ProviderError;
use multiuploader_transport::TransportError;

/// An error rewritten for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendlyError {
    pub title: String,
    pub message: String,
    /// How to fix it; may be empty.
    pub hint: String,
}

impl FriendlyError {
    fn new(title: &str, message: &str, hint: &str) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new("Upload Cancelled", "The upload was cancelled by user.", "")
    }

    /// Title, message and the hint (if any) separated by blank lines.
    pub fn format(&self) -> String {
        let mut out = format!("{}\n\n{}", self.title, self.message);
        if !self.hint.is_empty() {
            out.push_str("\n\nTip: ");
            out.push_str(&self.hint);
        }
        out
    }
}

impl fmt::Display for FriendlyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Cancelled,
    Network,
    Auth,
    File,
    Server,
    Validation,
    Unknown,
}

/// Facts gathered from the typed error chain.
#[derive(Debug, Default)]
struct Causes {
    cancelled: bool,
    network: bool,
    timeout: bool,
    refused: bool,
    status: Option<u16>,
    io: Option<io::ErrorKind>,
}

impl Causes {
    fn collect(err: &(dyn Error + 'static)) -> Self {
        let mut causes = Self::default();
        causes.visit(err);
        causes
    }

    fn visit(&mut self, err: &(dyn Error + 'static)) {
        if let Some(p) = err.downcast_ref::<ProviderError>() {
            self.visit_provider(p);
            return;
        }
        if let Some(t) = err.downcast_ref::<TransportError>() {
            self.visit_transport(t);
        }
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            self.visit_io(io_err);
        }
        if let Some(source) = err.source() {
            self.visit(source);
        }
    }

    // Transparent and boxed variants hide their inner error from `source()`,
    // so provider errors are walked structurally.
    fn visit_provider(&mut self, err: &ProviderError) {
        match err {
            ProviderError::Cancelled => self.cancelled = true,
            ProviderError::Context { source, .. } => self.visit_provider(source),
            ProviderError::Transport(t) => {
                self.visit_transport(t);
                if let Some(source) = t.source() {
                    self.visit(source);
                }
            }
            ProviderError::Io(io_err) => self.visit_io(io_err),
            other => {
                if let Some(source) = other.source() {
                    self.visit(source);
                }
            }
        }
    }

    fn visit_transport(&mut self, err: &TransportError) {
        self.cancelled |= err.is_cancelled();
        self.network |= err.is_network();
        self.timeout |= err.is_timeout();
        if self.status.is_none() {
            self.status = err.status();
        }
    }

    fn visit_io(&mut self, err: &io::Error) {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => {
                self.network = true;
                self.refused = true;
            }
            io::ErrorKind::TimedOut => {
                self.network = true;
                self.timeout = true;
            }
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                self.network = true;
            }
            kind => {
                self.io.get_or_insert(kind);
            }
        }
    }
}

/// Renders the whole chain, skipping causes whose text is already included.
fn chain_text(err: &(dyn Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let part = cause.to_string();
        if !text.contains(&part) {
            text.push_str(": ");
            text.push_str(&part);
        }
        source = cause.source();
    }
    text
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

fn classify(causes: &Causes, text: &str) -> Category {
    if causes.cancelled || contains_any(text, &["cancelled", "canceled"]) {
        return Category::Cancelled;
    }
    if causes.network {
        return Category::Network;
    }
    if matches!(
        causes.io,
        Some(
            io::ErrorKind::NotFound
                | io::ErrorKind::PermissionDenied
                | io::ErrorKind::UnexpectedEof
        )
    ) {
        return Category::File;
    }

    if contains_any(text, &["connection", "timeout", "timed out", "dial", "network"]) {
        return Category::Network;
    }
    if contains_any(
        text,
        &["unauthorized", "api key", "api token", "forbidden", "authentication"],
    ) {
        return Category::Auth;
    }

    // Checked before the file keywords: provider contexts such as "failed to
    // upload file" mention files without being file errors.
    if causes.status.is_some() || text.contains("status") {
        return match causes.status.or_else(|| extract_status_code(text)) {
            Some(401 | 403) => Category::Auth,
            Some(400 | 413) => Category::Validation,
            _ => Category::Server,
        };
    }

    if text.contains("server returned error") {
        return Category::Server;
    }
    if contains_any(text, &["no such file", "permission denied", "file"]) {
        return Category::File;
    }
    if contains_any(text, &["invalid", "too large"]) {
        return Category::Validation;
    }

    Category::Unknown
}

/// Classifies `err` and returns a message suitable for end users.
pub fn make_friendly(err: &(dyn Error + 'static)) -> FriendlyError {
    let causes = Causes::collect(err);
    let raw = chain_text(err);
    let text = raw.to_lowercase();

    match classify(&causes, &text) {
        Category::Cancelled => FriendlyError::cancelled(),
        Category::Network => network_error(&causes, &text),
        Category::Auth => auth_error(&causes, &text),
        Category::File => file_error(&causes, &text),
        Category::Server => server_error(&causes, &raw, &text),
        Category::Validation => validation_error(&text),
        Category::Unknown => FriendlyError {
            title: "Unexpected Error".into(),
            message: "An unexpected error occurred.".into(),
            hint: format!("Technical details: {raw}"),
        },
    }
}

fn network_error(causes: &Causes, text: &str) -> FriendlyError {
    if causes.timeout {
        return FriendlyError::new(
            "Connection Timeout",
            "The connection to the server timed out.",
            "Please check your internet connection and try again. If the problem persists, the server may be experiencing issues.",
        );
    }
    if contains_any(text, &["dns error", "failed to lookup address", "name resolution"]) {
        return FriendlyError::new(
            "DNS Lookup Failed",
            "Could not resolve the server address.",
            "Please check your internet connection and DNS settings. Try again in a few moments.",
        );
    }
    if causes.refused || contains_any(text, &["connection refused", "econnrefused"]) {
        return FriendlyError::new(
            "Connection Refused",
            "The server refused the connection.",
            "The service may be temporarily unavailable. Please try again later.",
        );
    }
    FriendlyError::new(
        "Network Error",
        "A network error occurred while communicating with the server.",
        "Please check your internet connection and try again.",
    )
}

fn auth_error(causes: &Causes, text: &str) -> FriendlyError {
    let code = causes.status.or_else(|| extract_status_code(text));
    if code == Some(401) || text.contains("unauthorized") {
        return FriendlyError::new(
            "Invalid API Key",
            "The API key you provided is not valid.",
            "Please check your API key in Settings and make sure it's correct.",
        );
    }
    if code == Some(403) || text.contains("forbidden") {
        return FriendlyError::new(
            "Access Denied",
            "Your API key does not have permission to perform this operation.",
            "Please check that your API key has the necessary permissions, or contact the service provider.",
        );
    }
    FriendlyError::new(
        "Authentication Error",
        "There was a problem authenticating with the service.",
        "Please check your API key in Settings.",
    )
}

fn file_error(causes: &Causes, text: &str) -> FriendlyError {
    match causes.io {
        Some(io::ErrorKind::NotFound) => return file_not_found(),
        Some(io::ErrorKind::PermissionDenied) => return permission_denied(),
        Some(io::ErrorKind::UnexpectedEof) => return read_error(),
        _ => {}
    }
    if contains_any(text, &["no such file", "not found"]) {
        return file_not_found();
    }
    if contains_any(text, &["permission denied", "access is denied"]) {
        return permission_denied();
    }
    if text.contains("eof") {
        return read_error();
    }
    FriendlyError::new(
        "File Error",
        "There was a problem reading the file.",
        "Please make sure the file is accessible and not being used by another program.",
    )
}

fn file_not_found() -> FriendlyError {
    FriendlyError::new(
        "File Not Found",
        "The selected file could not be found.",
        "The file may have been moved or deleted. Please select the file again.",
    )
}

fn permission_denied() -> FriendlyError {
    FriendlyError::new(
        "Permission Denied",
        "You don't have permission to access this file.",
        "Please check the file permissions or try selecting a different file.",
    )
}

fn read_error() -> FriendlyError {
    FriendlyError::new(
        "File Read Error",
        "The file could not be read completely.",
        "The file may be corrupted or locked by another program. Please try again.",
    )
}

fn server_error(causes: &Causes, raw: &str, text: &str) -> FriendlyError {
    let code = causes.status.or_else(|| extract_status_code(text));

    match code {
        Some(400) => FriendlyError::new(
            "Invalid Request",
            "The server could not process your request.",
            "Please try selecting the file again. If the problem persists, the file may not be supported.",
        ),
        Some(404) => FriendlyError::new(
            "Service Not Found",
            "The upload service endpoint could not be found.",
            "The service may be temporarily unavailable or under maintenance. Please try again later.",
        ),
        Some(413) => FriendlyError::new(
            "File Too Large",
            "The file you're trying to upload is too large for this provider.",
            "Please try a smaller file or use a different provider that supports larger files.",
        ),
        Some(429) => FriendlyError::new(
            "Rate Limit Exceeded",
            "You've made too many requests in a short period.",
            "Please wait a few minutes before trying again.",
        ),
        Some(500) => FriendlyError::new(
            "Server Error",
            "The server encountered an internal error.",
            "This is a temporary server issue. Please try again in a few minutes.",
        ),
        Some(502) => FriendlyError::new(
            "Bad Gateway",
            "The server received an invalid response from an upstream server.",
            "This is a temporary server issue. Please try again in a few minutes.",
        ),
        Some(503) => FriendlyError::new(
            "Service Unavailable",
            "The service is temporarily unavailable.",
            "The server may be under maintenance. Please try again later.",
        ),
        Some(504) => FriendlyError::new(
            "Gateway Timeout",
            "The server did not receive a timely response.",
            "The service may be experiencing high load. Please try again in a few minutes.",
        ),
        Some(code) if code >= 500 => FriendlyError {
            title: "Server Error".into(),
            message: format!("The server returned an error (HTTP {code})."),
            hint: "This is a temporary issue. Please try again later.".into(),
        },
        _ => {
            if text.contains("server returned error")
                && let Some((_, reported)) = raw.rsplit_once(':')
            {
                return FriendlyError {
                    title: "Upload Failed".into(),
                    message: format!("The server reported an error: {}", reported.trim()),
                    hint: "Please check your file and try again.".into(),
                };
            }
            FriendlyError::new(
                "Server Error",
                "The server encountered an error while processing your request.",
                "Please try again. If the problem persists, try a different provider.",
            )
        }
    }
}

fn validation_error(text: &str) -> FriendlyError {
    if contains_any(text, &["too large", "413"]) {
        return FriendlyError::new(
            "File Too Large",
            "The file exceeds the maximum size allowed by this provider.",
            "Please try a smaller file or use a different provider.",
        );
    }
    if contains_any(text, &["invalid", "400"]) {
        return FriendlyError::new(
            "Invalid File",
            "The file or request parameters are not valid.",
            "Please make sure you selected a valid file and try again.",
        );
    }
    FriendlyError::new(
        "Validation Error",
        "The file or request could not be validated.",
        "Please check your file and try again.",
    )
}

/// Finds an HTTP status code in free-form error text.
///
/// Looks for "status ", "status code ", "http status " or "code " and reads
/// up to three digits after it. Only values in `100..=599` are accepted.
pub fn extract_status_code(text: &str) -> Option<u16> {
    let lower = text.to_lowercase();

    for pattern in ["status ", "status code ", "http status ", "code "] {
        let Some(idx) = lower.find(pattern) else {
            continue;
        };

        let mut digits = String::new();
        for c in lower[idx + pattern.len()..].chars() {
            if c.is_ascii_digit() {
                digits.push(c);
                if digits.len() == 3 {
                    break;
                }
            } else if !digits.is_empty() {
                break;
            }
        }

        if let Ok(code) = digits.parse::<u16>()
            && (100..=599).contains(&code)
        {
            return Some(code);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(msg: &str) -> ProviderError {
        ProviderError::Rejected(msg.into())
    }

    #[test]
    fn extracts_status_codes() {
        assert_eq!(extract_status_code("upload failed with status 500"), Some(500));
        assert_eq!(extract_status_code("HTTP status code 404 returned"), Some(404));
        assert_eq!(extract_status_code("error code 429"), Some(429));
        assert_eq!(extract_status_code("status: 503 unavailable"), None);
        assert_eq!(extract_status_code("status 42"), None);
        assert_eq!(extract_status_code("status 999"), None);
        assert_eq!(extract_status_code("nothing here"), None);
    }

    #[test]
    fn cancellation_is_neutral() {
        let err = ProviderError::Cancelled.context("upload parts failed");
        let friendly = make_friendly(&err);
        assert_eq!(friendly.title, "Upload Cancelled");
        assert!(friendly.hint.is_empty());

        let transport = ProviderError::Transport(TransportError::Cancelled);
        assert_eq!(make_friendly(&transport).title, "Upload Cancelled");
    }

    #[test]
    fn status_codes_map_to_server_messages() {
        let cases = [
            (500, "Server Error"),
            (502, "Bad Gateway"),
            (503, "Service Unavailable"),
            (504, "Gateway Timeout"),
            (404, "Service Not Found"),
            (429, "Rate Limit Exceeded"),
        ];
        for (code, title) in cases {
            let err = rejected(&format!("upload failed with status {code}"))
                .context("failed to upload file");
            assert_eq!(make_friendly(&err).title, title, "status {code}");
        }

        let err = rejected("upload failed with status 507");
        let friendly = make_friendly(&err);
        assert_eq!(friendly.title, "Server Error");
        assert!(friendly.message.contains("HTTP 507"));
    }

    #[test]
    fn exhausted_retries_use_structured_status() {
        let err = ProviderError::Transport(TransportError::RetriesExhausted {
            attempts: 4,
            last: Box::new(TransportError::RetriableStatus(503)),
        });
        assert_eq!(make_friendly(&err).title, "Service Unavailable");
    }

    #[test]
    fn auth_failures() {
        let err = rejected("upload failed with status 401").context("init failed");
        assert_eq!(make_friendly(&err).title, "Invalid API Key");

        let err = rejected("request failed with status 403");
        assert_eq!(make_friendly(&err).title, "Access Denied");

        let err = ProviderError::InvalidKey("API key is required".into());
        assert_eq!(make_friendly(&err).title, "Authentication Error");
    }

    #[test]
    fn validation_failures() {
        let err = rejected("upload failed with status 413");
        assert_eq!(make_friendly(&err).title, "File Too Large");

        let err = rejected("invalid chunk size");
        assert_eq!(make_friendly(&err).title, "Invalid File");
    }

    #[test]
    fn io_errors_are_file_errors() {
        let err = ProviderError::from(io::Error::new(io::ErrorKind::NotFound, "gone"))
            .context("failed to read part 2");
        assert_eq!(make_friendly(&err).title, "File Not Found");

        let err = ProviderError::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert_eq!(make_friendly(&err).title, "Permission Denied");

        let err = ProviderError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "short"));
        assert_eq!(make_friendly(&err).title, "File Read Error");
    }

    #[test]
    fn refused_connection_is_network() {
        let err = ProviderError::from(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(make_friendly(&err).title, "Connection Refused");

        let err = rejected("connection reset by peer");
        assert_eq!(make_friendly(&err).title, "Network Error");
    }

    #[test]
    fn provider_reported_errors() {
        let err = rejected("FileKeeper server returned error: quota exceeded")
            .context("failed to get upload server");
        let friendly = make_friendly(&err);
        assert_eq!(friendly.title, "Upload Failed");
        assert_eq!(friendly.message, "The server reported an error: quota exceeded");
    }

    #[test]
    fn unknown_errors_keep_details() {
        let err = rejected("simulated upload error at 50%");
        let friendly = make_friendly(&err);
        assert_eq!(friendly.title, "Unexpected Error");
        assert_eq!(friendly.hint, "Technical details: simulated upload error at 50%");
    }

    #[test]
    fn format_includes_tip_only_with_hint() {
        let friendly = FriendlyError::new("Title", "Message", "Do this");
        assert_eq!(friendly.format(), "Title\n\nMessage\n\nTip: Do this");
        assert_eq!(
            FriendlyError::cancelled().format(),
            "Upload Cancelled\n\nThe upload was cancelled by user."
        );
    }
}
