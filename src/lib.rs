//! A small HTTP/1.x server to embed in test suites.
//!
//! Register handlers by path, start on an ephemeral loopback port, point a
//! client at [`Server::url`], and stop (or drop) the server at the end of
//! the test.
//!
//! ```no_run
//! use embedhttp::Server;
//!
//! # fn main() -> Result<(), embedhttp::ServerError> {
//! let mut server = Server::new();
//! server
//!     .add_handler("/post", |req, res| {
//!         println!("{} with {:?}", req, req.first_header("content-type"));
//!         res.set_body(r#"{"message": "Roger that!"}"#)
//!             .add_header("content-type", "application/json");
//!     })?
//!     .start()?;
//! let url = server.url("/post")?;
//! # let _ = url;
//! server.close();
//! # Ok(())
//! # }
//! ```

mod server;
pub mod logger;

pub use server::*;
