use std::{fmt, sync::Arc};

use super::{
    auth::Authenticator,
    req::Request,
    res::Response,
};

/// Caller logic for one route. Invoked synchronously, once per matched
/// request, possibly from several worker threads at the same time.
pub trait Handler: Send + Sync {
    fn handle(&self, req: &Request, res: &mut Response);
}

impl<F> Handler for F
where
    F: Fn(&Request, &mut Response) + Send + Sync,
{
    fn handle(&self, req: &Request, res: &mut Response) {
        self(req, res)
    }
}

pub type HandlerRef = Arc<dyn Handler>;
pub type AuthenticatorRef = Arc<dyn Authenticator>;

/// A registration: path, handler and optional authenticator.
#[derive(Clone)]
pub struct HandlerEntry {
    path: String,
    handler: HandlerRef,
    authenticator: Option<AuthenticatorRef>,
}

impl HandlerEntry {
    pub fn new(path: &str, handler: impl Handler + 'static) -> Self {
        Self {
            path: path.to_string(),
            handler: Arc::new(handler),
            authenticator: None,
        }
    }

    pub fn with_authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    pub fn authenticator(&self) -> Option<&AuthenticatorRef> {
        self.authenticator.as_ref()
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("path", &self.path)
            .field("authenticated", &self.authenticator.is_some())
            .finish()
    }
}
