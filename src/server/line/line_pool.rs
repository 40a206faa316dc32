use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use super::{Executor, Job, Line, SendError};
use crate::{logger::micro::*, server::error::ExecuteError};

/// Bounded executor made of up to `max_line` worker lines. Lines are
/// created on demand; a job goes to the first line with room in its
/// channel, and is rejected when every line is saturated.
pub struct LinePool {
    lines: Mutex<Vec<Line>>,
    max_line: usize,
    next_id: AtomicUsize,
}

impl LinePool {
    pub fn new(max_line: usize) -> Self {
        LinePool {
            lines: Mutex::new(vec![]),
            max_line: max_line.max(1),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn max_line(&self) -> usize {
        self.max_line
    }

    pub fn line_count(&self) -> usize {
        self.lines.lock().map(|lines| lines.len()).unwrap_or(0)
    }

    fn add_new_line(&self, lines: &mut Vec<Line>) -> Result<(), ExecuteError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = Line::new(id).map_err(|e| {
            error!("failed to spawn line#{}: {}", id, e);
            ExecuteError::Spawn
        })?;
        lines.push(line);
        debug!("new line added. line count:{}", lines.len());
        Ok(())
    }

    fn send_to_line(&self, lines: &mut Vec<Line>, job: Job, idx: usize) -> Result<(), ExecuteError> {
        if idx == lines.len() {
            if lines.len() >= self.max_line {
                return Err(ExecuteError::Saturated);
            }
            self.add_new_line(lines)?;
        }
        match lines[idx].send(job) {
            Ok(_) => Ok(()),
            Err((job_back, SendError::LineBusy)) => self.send_to_line(lines, job_back, idx + 1),
            Err((job_back, SendError::Disconnected)) => {
                let removed = lines.remove(idx);
                debug!("line#{} removed due to disconnection", removed.id());
                self.send_to_line(lines, job_back, idx)
            }
        }
    }
}

impl Default for LinePool {
    /// Twice as many lines as there are CPUs.
    fn default() -> Self {
        Self::new(num_cpus::get() * 2)
    }
}

impl Executor for LinePool {
    fn execute(&self, job: Job) -> Result<(), ExecuteError> {
        let mut lines = match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let res = self.send_to_line(&mut lines, job, 0);
        if let Err(ExecuteError::Saturated) = res {
            warn!("out of capacity to handle incoming connection");
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::mpsc, time};

    fn blocking_job(started: mpsc::Sender<()>, release: mpsc::Receiver<()>) -> Job {
        Box::new(move || {
            started.send(()).unwrap();
            let _ = release.recv();
        })
    }

    #[test]
    fn saturates_at_max_line() {
        let pool = LinePool::new(1);
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();

        pool.execute(blocking_job(started_tx, release_rx)).unwrap();
        started_rx.recv_timeout(time::Duration::from_secs(5)).unwrap();

        pool.execute(Box::new(|| {})).unwrap();
        pool.execute(Box::new(|| {})).unwrap();
        assert_eq!(pool.execute(Box::new(|| {})), Err(ExecuteError::Saturated));
        assert_eq!(pool.line_count(), 1);

        release_tx.send(()).unwrap();
    }

    #[test]
    fn grows_when_lines_are_busy() {
        let pool = LinePool::new(2);
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();

        pool.execute(blocking_job(started_tx, release_rx)).unwrap();
        started_rx.recv_timeout(time::Duration::from_secs(5)).unwrap();
        pool.execute(Box::new(|| {})).unwrap();
        pool.execute(Box::new(|| {})).unwrap();
        assert_eq!(pool.line_count(), 1);

        let (done_tx, done_rx) = mpsc::channel();
        pool.execute(Box::new(move || done_tx.send(()).unwrap())).unwrap();
        assert_eq!(pool.line_count(), 2);
        done_rx.recv_timeout(time::Duration::from_secs(5)).unwrap();

        release_tx.send(()).unwrap();
    }

    #[test]
    fn replaces_disconnected_lines() {
        let pool = LinePool::new(1);
        pool.execute(Box::new(|| panic!("job failed"))).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let deadline = time::Instant::now() + time::Duration::from_secs(5);
        loop {
            let tx = done_tx.clone();
            let _ = pool.execute(Box::new(move || { let _ = tx.send(()); }));
            if done_rx.recv_timeout(time::Duration::from_millis(100)).is_ok() {
                break;
            }
            assert!(time::Instant::now() < deadline, "pool never recovered");
        }
        assert_eq!(pool.line_count(), 1);
    }

    #[test]
    fn default_is_sized_by_cpus() {
        assert_eq!(LinePool::default().max_line(), num_cpus::get() * 2);
    }
}
