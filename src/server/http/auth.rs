use super::exchange::ExchangeContext;

/// Decision of an [`Authenticator`] about one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Run the route's handler.
    Allow,
    /// Answer `403 Forbidden`.
    Deny,
    /// Answer `401 Unauthorized` with the given `WWW-Authenticate` value.
    Challenge(String),
}

/// Gate attached to a single route, consulted before its handler runs.
/// No authentication scheme is built in; closures taking an
/// [`ExchangeContext`] work as authenticators.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, exchange: &ExchangeContext) -> AuthOutcome;
}

impl<F> Authenticator for F
where
    F: Fn(&ExchangeContext) -> AuthOutcome + Send + Sync,
{
    fn authenticate(&self, exchange: &ExchangeContext) -> AuthOutcome {
        self(exchange)
    }
}
