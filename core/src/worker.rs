use crate::{Board, job::Job};
use std::rc::Rc;

pub(crate) async fn run<B: Board>(job: Rc<Job<B>>, id: usize) {
    let cancel = job.cancel().clone();
    while let Some(true) = cancel.run_until_cancelled(step(&job)).await {}

    debug!(worker = id, "worker stopped");
}

/// Handle one queued offset. Returns `false` once the schedule has shut down.
///
/// Entries that went stale while queued are dropped without spending a credential.
/// Rejected writes are not requeued; the next scan cycle picks the cell up again.
async fn step<B: Board>(job: &Job<B>) -> bool {
    let schedule = &job.schedule;
    let Some(offset) = schedule.queue.pop().await else {
        return false;
    };
    schedule.pending.clear(offset);

    if !job.needs_paint(offset) {
        return true;
    }
    let color = job.image.color(offset);

    let Some(lease) = schedule.pool.acquire().await else {
        return false;
    };
    let Some(credential) = job.credential(lease.uid()) else {
        warn!(uid = lease.uid(), "credential vanished");
        return true;
    };

    let (x, y) = job.canvas_coords(offset);
    if job.board.write_pixel(x, y, color, &credential).await {
        schedule.written.set(schedule.written.get() + 1);
        lease.cool_down(job.config.reentry_delay());

        let backlog = schedule.queue.len();
        if backlog != 0 {
            debug!(x, y, %color, backlog, status = ?job.status(), "painted");
        }
    } else {
        debug!(x, y, %color, uid = credential.uid, "write rejected");
    }

    true
}
