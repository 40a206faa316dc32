mod server;
pub mod config;
pub mod error;
pub mod http;
pub mod line;
#[cfg(test)]
pub(crate) mod testing;

pub use {
    server::Server,
    config::ServerConfig,
    error::{DispatchError, ExecuteError, ServerError},
    http::{
        AuthOutcome, Authenticator, ExchangeContext, Handler, HandlerEntry, Headers, Request, Response,
    },
    line::{Executor, Job, LinePool, ThreadPerRequest},
};
