use crate::{Board, job::Job};
use std::{
    rc::Rc,
    time::{Duration, Instant},
};

/// Coarse progress signal of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkStatus {
    /// The session is idle.
    NotStarted,
    /// At most one cell is left in the queue.
    Converged,
    /// Work is queued but there are no credentials to do it with.
    Starved,
    /// Rough upper bound on the time needed to drain the queue.
    Remaining(Duration),
}

impl WorkStatus {
    pub fn estimate(active: bool, backlog: usize, credentials: usize, cooldown: Duration) -> Self {
        if !active {
            Self::NotStarted
        } else if backlog < 2 {
            Self::Converged
        } else if credentials == 0 {
            Self::Starved
        } else {
            Self::Remaining(cooldown * backlog as u32 / credentials as u32)
        }
    }
}

/// Log throughput until the queue drains, then fall silent.
pub(crate) async fn report<B: Board>(job: Rc<Job<B>>, period: Duration) {
    let cancel = job.cancel().clone();
    let started = Instant::now();

    while cancel
        .run_until_cancelled(monoio::time::sleep(period))
        .await
        .is_some()
    {
        let status = job.status();
        if status == WorkStatus::Converged {
            info!("image complete, maintaining");
            return;
        }

        let credentials = job.credentials.borrow().len();
        let written = job.schedule.written.get();
        let elapsed = started.elapsed().as_secs_f64();
        let rate = if credentials == 0 || elapsed == 0.0 {
            0.0
        } else {
            written as f64 * job.config.cooldown.as_secs_f64() / (elapsed * credentials as f64)
        };

        info!(
            credentials,
            written,
            backlog = job.schedule.queue.len(),
            rate = format_args!("{rate:.3}"),
            ?status,
            "progress"
        );
    }
}
