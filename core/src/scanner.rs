use crate::{Board, job::Job};
use rand::seq::SliceRandom;
use std::rc::Rc;

/// Order in which a scan cycle visits the raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Traversal {
    /// Ascending offsets.
    Raster,
    /// A fresh random permutation of all offsets.
    Shuffled,
}

impl Traversal {
    pub fn pick(first_cycle: bool, backlog: usize, ordered_backlog: usize) -> Self {
        if first_cycle || backlog <= ordered_backlog {
            Self::Raster
        } else {
            Self::Shuffled
        }
    }
}

pub(crate) async fn run<B: Board>(job: Rc<Job<B>>) {
    let cancel = job.cancel().clone();
    let mut order = Vec::new();
    let mut first_cycle = true;

    if cancel
        .run_until_cancelled(monoio::time::sleep(job.config.scan_delay))
        .await
        .is_none()
    {
        info!("scanner stopped");
        return;
    }

    loop {
        job.spawn_refresh();

        let traversal = Traversal::pick(
            first_cycle,
            job.schedule.queue.len(),
            job.config.ordered_backlog,
        );
        let Some(queued) = cancel
            .run_until_cancelled(scan(&job, traversal, &mut order))
            .await
        else {
            break;
        };
        first_cycle = false;

        info!(
            ?traversal,
            queued,
            backlog = job.schedule.queue.len(),
            "scan finished"
        );

        if cancel
            .run_until_cancelled(monoio::time::sleep(job.config.update_interval))
            .await
            .is_none()
        {
            break;
        }
    }

    info!("scanner stopped");
}

/// Enqueue every mismatching offset that is not pending yet. Returns how many were queued.
pub(crate) async fn scan<B: Board>(
    job: &Job<B>,
    traversal: Traversal,
    order: &mut Vec<usize>,
) -> usize {
    order.clear();
    order.extend(0..job.image.area());
    if traversal == Traversal::Shuffled {
        order.shuffle(&mut rand::thread_rng());
    }

    let mut queued = 0;
    for &offset in order.iter() {
        if !job.needs_paint(offset) || !job.schedule.pending.try_mark(offset) {
            continue;
        }

        if !job.schedule.queue.push(offset).await {
            break;
        }
        queued += 1;
    }

    queued
}

#[cfg(test)]
mod tests {
    use super::{Traversal, scan};
    use crate::{
        Color, Config, MemoryBoard, Placement, Raster, block_on,
        job::{Job, Schedule},
    };
    use std::{
        cell::{Cell, RefCell},
        collections::{BTreeMap, HashSet},
        rc::Rc,
    };

    fn job(board: MemoryBoard, image: Raster, ignore_background: bool) -> Rc<Job<MemoryBoard>> {
        let config = Config::default();
        let schedule = Schedule::new(&config, []);

        Job::new(
            Rc::new(board),
            Rc::new(image),
            Placement::default(),
            config,
            Rc::new(Cell::new(ignore_background)),
            Rc::new(RefCell::new(BTreeMap::new())),
            schedule,
        )
    }

    fn drain(job: &Job<MemoryBoard>) -> Vec<(u32, u32)> {
        std::iter::from_fn(|| job.schedule.queue.try_pop())
            .map(|offset| job.image.coords(offset))
            .collect()
    }

    fn two_by_two() -> Raster {
        let cells = [[0x000000, 0xFFFFFF], [0x111111, 0x222222]];
        Raster::from_fn(2, 2, |x, y| Color(cells[x as usize][y as usize]))
    }

    #[test]
    fn raster_scan_enqueues_mismatches_in_order() {
        block_on(async {
            let job = job(MemoryBoard::new(4, 4, Color::WHITE), two_by_two(), false);

            let queued = scan(&job, Traversal::Raster, &mut Vec::new()).await;
            assert_eq!(queued, 3);
            assert_eq!(drain(&job), vec![(0, 0), (1, 0), (1, 1)]);
        });
    }

    #[test]
    fn background_skip_only_drops_sentinel_candidates() {
        block_on(async {
            let job = job(MemoryBoard::new(4, 4, Color::WHITE), two_by_two(), true);

            let queued = scan(&job, Traversal::Raster, &mut Vec::new()).await;
            assert_eq!(queued, 3);
            assert_eq!(drain(&job), vec![(0, 0), (1, 0), (1, 1)]);
        });
    }

    #[test]
    fn background_skip_leaves_foreign_paint_alone() {
        block_on(async {
            let board = MemoryBoard::new(4, 4, Color::WHITE);
            board.paint(0, 1, Color(0xABCDEF));
            board.sync();

            let on = job(board, two_by_two(), true);
            scan(&on, Traversal::Raster, &mut Vec::new()).await;
            assert_eq!(drain(&on), vec![(0, 0), (1, 0), (1, 1)]);

            let board = MemoryBoard::new(4, 4, Color::WHITE);
            board.paint(0, 1, Color(0xABCDEF));
            board.sync();

            let off = job(board, two_by_two(), false);
            scan(&off, Traversal::Raster, &mut Vec::new()).await;
            assert_eq!(drain(&off), vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        });
    }

    #[test]
    fn pending_offsets_are_not_queued_twice() {
        block_on(async {
            let job = job(MemoryBoard::new(4, 4, Color::WHITE), two_by_two(), false);
            let mut order = Vec::new();

            assert_eq!(scan(&job, Traversal::Raster, &mut order).await, 3);
            assert_eq!(scan(&job, Traversal::Shuffled, &mut order).await, 0);
            assert_eq!(job.schedule.queue.len(), 3);
            assert_eq!(job.schedule.pending.count(), 3);
        });
    }

    #[test]
    fn matching_board_queues_nothing() {
        block_on(async {
            let image = two_by_two();
            let board = MemoryBoard::new(4, 4, Color::WHITE);
            for x in 0..2 {
                for y in 0..2 {
                    board.paint(x, y, image.color_at(x, y));
                }
            }
            board.sync();

            let job = job(board, image, false);
            assert_eq!(scan(&job, Traversal::Raster, &mut Vec::new()).await, 0);
            assert!(job.schedule.queue.is_empty());
        });
    }

    #[test]
    fn shuffled_scan_visits_every_offset_once() {
        block_on(async {
            let image = Raster::from_fn(10, 10, |_, _| Color(0x010101));
            let job = job(MemoryBoard::new(10, 10, Color::WHITE), image, false);

            assert_eq!(scan(&job, Traversal::Shuffled, &mut Vec::new()).await, 100);
            let seen: HashSet<_> = drain(&job).into_iter().collect();
            assert_eq!(seen.len(), 100);
        });
    }

    #[test]
    fn raster_order_while_backlog_is_small() {
        assert_eq!(Traversal::pick(true, 5000, 1000), Traversal::Raster);
        assert_eq!(Traversal::pick(false, 1000, 1000), Traversal::Raster);
        assert_eq!(Traversal::pick(false, 1001, 1000), Traversal::Shuffled);
    }
}
