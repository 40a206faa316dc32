use std::{
    any::Any,
    net,
    panic::{self, AssertUnwindSafe},
};

use super::{
    auth::AuthOutcome,
    exchange::{check_response_headers, Connection, Exchange},
    headers::{Headers, HTTP_HEADER_WWW_AUTHENTICATE},
    matcher::Muxer,
    res::Response,
};
use crate::{
    logger::micro::*,
    server::{config::ServerConfig, error::DispatchError},
};

const NOT_FOUND_BODY: &[u8] = b"No context found for request";

/// The request adapter shared by every route: reads one exchange from
/// `stream`, runs the matching handler and writes its response. The
/// connection is closed on return, on every path.
pub fn serve(muxer: &Muxer, stream: net::TcpStream, config: &ServerConfig) -> Result<(), DispatchError> {
    let conn = Connection::new(stream, config.io_timeout)?;
    trace!("exchange started with {:?}", conn.peer());
    let mut exchange = match conn.read_exchange(config.max_head_line) {
        Ok(exchange) => exchange,
        Err((mut conn, e)) => {
            if let Some(status) = e.status_code() {
                if let Err(write_err) = conn.send_response(status, &Headers::new(), b"", false) {
                    debug!("could not answer {} after {}: {}", status, e, write_err);
                }
            }
            return Err(e);
        }
    };
    let body = match exchange.read_body() {
        Ok(body) => body,
        Err(e) => {
            reply_error(&mut exchange, &e);
            return Err(e);
        }
    };
    info!("{}", exchange.context());

    let route = match muxer.get_route(exchange.context().path()) {
        Some(route) => route,
        None => {
            exchange.send_response(404, &Headers::new(), NOT_FOUND_BODY)?;
            return Ok(());
        }
    };

    if let Some(authenticator) = route.authenticator() {
        match authenticator.authenticate(exchange.context()) {
            AuthOutcome::Allow => {}
            AuthOutcome::Deny => {
                debug!("{} denied by authenticator of {}", exchange.context(), route.path());
                exchange.send_response(403, &Headers::new(), b"")?;
                return Ok(());
            }
            AuthOutcome::Challenge(challenge) => {
                debug!("{} challenged by authenticator of {}", exchange.context(), route.path());
                let mut headers = Headers::new();
                headers.add(HTTP_HEADER_WWW_AUTHENTICATE, &challenge);
                exchange.send_response(401, &headers, b"")?;
                return Ok(());
            }
        }
    }

    let request = exchange.context().to_request(&body);
    let mut response = Response::default();
    let handler = route.handler();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&request, &mut response)));
    match outcome {
        Ok(()) => match check_response_headers(response.headers()) {
            Ok(()) => {
                exchange.send_response(response.status_code(), response.headers(), response.body().as_bytes())?;
                Ok(())
            }
            Err(e) => {
                reply_error(&mut exchange, &e);
                Err(e)
            }
        },
        Err(payload) => {
            let e = DispatchError::HandlerPanicked {
                path: route.path().to_string(),
                message: panic_message(payload.as_ref()),
            };
            reply_error(&mut exchange, &e);
            Err(e)
        }
    }
}

fn reply_error(exchange: &mut Exchange, e: &DispatchError) {
    if let Some(status) = e.status_code() {
        if let Err(write_err) = exchange.send_response(status, &Headers::new(), b"") {
            debug!("could not answer {} after {}: {}", status, e, write_err);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
