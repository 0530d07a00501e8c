//! Client key derivation.
//!
//! Different endpoint classes count at different granularity: generic
//! pages by network address alone, data endpoints by address and path,
//! sensitive submissions by address and authenticated identity. The
//! strategy is chosen per limiter, so changing granularity never touches
//! the limiter's core logic.

/// Request attributes available to key derivation.
#[derive(Clone, Copy, Debug)]
pub struct RequestContext<'a> {
    /// Client network address.
    pub address: &'a str,
    /// Request path.
    pub path: &'a str,
    /// Authenticated identity, when the endpoint has one.
    pub identity: Option<&'a str>,
}

impl<'a> RequestContext<'a> {
    pub fn new(address: &'a str, path: &'a str) -> Self {
        Self {
            address,
            path,
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: &'a str) -> Self {
        self.identity = Some(identity);
        self
    }
}

/// How the counting key is derived from a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyStrategy {
    ByAddress,
    ByAddressAndPath,
    ByAddressAndIdentity,
}

impl KeyStrategy {
    /// Derive the counting key for a request.
    pub fn derive(&self, ctx: &RequestContext<'_>) -> String {
        match self {
            Self::ByAddress => format!("rl:{}", ctx.address),
            Self::ByAddressAndPath => format!("rl:{}:{}", ctx.address, ctx.path),
            Self::ByAddressAndIdentity => {
                format!("rl:{}:{}", ctx.address, ctx.identity.unwrap_or("anon"))
            }
        }
    }
}
