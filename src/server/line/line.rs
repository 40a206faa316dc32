use std::{
    fmt,
    io,
    sync::mpsc,
    thread,
};

use super::Job;
use crate::logger::micro::*;

const SYNC_CHANNEL_BUFFER_SIZE: usize = 2;

#[derive(Debug, PartialEq)]
pub enum SendError {
    LineBusy,
    Disconnected,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SendError::LineBusy => write!(f, "SendError::LineBusy"),
            SendError::Disconnected => write!(f, "SendError::Disconnected"),
        }
    }
}

/// One worker thread fed through a small bounded channel. The thread exits
/// once the `Line` is dropped and its queued jobs are done.
pub struct Line {
    id: usize,
    s: mpsc::SyncSender<Job>,
}

impl Line {
    pub fn new(id: usize) -> io::Result<Self> {
        let (s, r) = mpsc::sync_channel::<Job>(SYNC_CHANNEL_BUFFER_SIZE);
        thread::Builder::new()
            .name(format!("embedhttp-line-{}", id))
            .spawn(move || {
                for job in r {
                    job();
                }
                trace!("line#{} finished", id);
            })?;
        Ok(Self { id, s })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn send(&self, job: Job) -> Result<(), (Job, SendError)> {
        self.s.try_send(job).map_err(|e| {
            match e {
                mpsc::TrySendError::Full(j) => (j, SendError::LineBusy),
                mpsc::TrySendError::Disconnected(j) => (j, SendError::Disconnected),
            }
        })
    }
}
