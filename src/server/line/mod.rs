mod line;
mod line_pool;

pub use line::{Line, SendError};
pub use line_pool::LinePool;

use std::thread;

use crate::server::error::ExecuteError;

/// Work handed to an executor: serving one accepted connection.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Decides on which thread each exchange is served. A rejected job is
/// dropped, which closes its connection.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job) -> Result<(), ExecuteError>;
}

/// Default executor: one fresh thread per connection, unbounded.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPerRequest;

impl Executor for ThreadPerRequest {
    fn execute(&self, job: Job) -> Result<(), ExecuteError> {
        thread::Builder::new()
            .name("embedhttp-exchange".to_string())
            .spawn(job)
            .map(|_| ())
            .map_err(|_| ExecuteError::Spawn)
    }
}
