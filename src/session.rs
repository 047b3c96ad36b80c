//! Ambient data for one incoming request

/// What the front end knows about the caller: the network address it
/// connected from and the captcha code previously issued to its session.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub remote_addr: String,
    pub issued_security_code: Option<String>,
}

impl RequestContext {
    pub fn new(remote_addr: impl Into<String>) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            issued_security_code: None,
        }
    }

    pub fn with_security_code(mut self, code: impl Into<String>) -> Self {
        self.issued_security_code = Some(code.into());
        self
    }

    /// Verbatim comparison. A session that was never issued a code matches nothing.
    pub fn security_code_matches(&self, supplied: &str) -> bool {
        self.issued_security_code.as_deref() == Some(supplied)
    }
}
