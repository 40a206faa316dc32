pub mod req;
pub mod res;
pub mod auth;
pub mod handler;
pub mod matcher;
pub mod exchange;
pub mod dispatch;
pub mod headers;

pub use {
    req::Request,
    res::Response,
    auth::{AuthOutcome, Authenticator},
    handler::{Handler, HandlerEntry},
    matcher::{Muxer, Route},
    exchange::ExchangeContext,
    headers::Headers,
};
