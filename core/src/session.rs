use crate::{
    Board, Config, Error, Placement, PoolStats, Raster, WorkStatus,
    job::{Job, KnownCredentials, Schedule},
    scanner, status, worker,
};
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
};

/// Owns the target image, the placement and the credentials, and drives the scanner and
/// worker loops that repaint the image onto `B`.
///
/// Lifecycle: idle until [`Session::start`], back to idle on [`Session::reset`]. Changing the
/// image or the placement resets the session.
pub struct Session<B> {
    board: Rc<B>,
    config: Config,
    image: Option<Rc<Raster>>,
    placement: Placement,
    ignore_background: Rc<Cell<bool>>,
    credentials: KnownCredentials,
    schedule: Rc<Schedule>,
    active: bool,
}

impl<B: Board> Session<B> {
    pub fn new(board: Rc<B>, config: Config) -> Self {
        let schedule = Schedule::new(&config, []);

        Self {
            board,
            config,
            image: None,
            placement: Placement::default(),
            ignore_background: Rc::new(Cell::new(false)),
            credentials: Rc::new(RefCell::new(BTreeMap::new())),
            schedule,
            active: false,
        }
    }

    /// Stop every loop and throw away all queued work and cooldowns.
    pub fn reset(&mut self) {
        info!("resetting session");
        self.schedule.shutdown();

        let uids: Vec<u64> = self.credentials.borrow().keys().copied().collect();
        self.schedule = Schedule::new(&self.config, uids);
        self.active = false;
    }

    /// Install a new target image. Oversized images are rejected after the reset.
    pub fn set_image(&mut self, image: Raster) -> Result<(), Error> {
        self.reset();

        let (max_width, max_height) = self.config.max_image;
        if image.width() > max_width || image.height() > max_height {
            return Err(Error::ImageTooLarge {
                width: image.width(),
                height: image.height(),
                max_width,
                max_height,
            });
        }

        info!(width = image.width(), height = image.height(), "image set");
        self.image = Some(Rc::new(image));
        Ok(())
    }

    pub fn set_placement(&mut self, x: u32, y: u32) -> Result<(), Error> {
        let (width, height) = self.config.canvas;
        if x > width || y > height {
            return Err(Error::PlacementOutOfBounds {
                x,
                y,
                width,
                height,
            });
        }

        self.placement = Placement { x, y };
        self.reset();
        Ok(())
    }

    /// Toggle skipping of the background color. Takes effect without a reset.
    pub fn set_ignore_background(&self, ignore: bool) {
        self.ignore_background.set(ignore);
    }

    /// Register a credential, or replace the secret of a known one.
    pub fn add_credential(&self, uid: u64, secret: impl Into<String>) {
        let known = self
            .credentials
            .borrow_mut()
            .insert(uid, secret.into())
            .is_some();

        if !known {
            self.schedule.pool.insert(uid);
        }
        debug!(uid, replaced = known, "credential added");
    }

    /// Reset, force a board refresh, then spawn the scanner, the workers and the reporter.
    ///
    /// Must be called from within a monoio runtime with the timer enabled.
    pub async fn start(&mut self) -> Result<(), Error> {
        let image = self.image.clone().ok_or(Error::NoImage)?;
        self.reset();

        if let Err(error) = self.board.refresh(true).await {
            warn!(%error, "initial board refresh failed");
        }

        let job = Job::new(
            Rc::clone(&self.board),
            image,
            self.placement,
            self.config.clone(),
            Rc::clone(&self.ignore_background),
            Rc::clone(&self.credentials),
            Rc::clone(&self.schedule),
        );

        info!(
            credentials = self.credentials.borrow().len(),
            workers = self.config.workers,
            x = self.placement.x,
            y = self.placement.y,
            "starting session"
        );

        monoio::spawn(scanner::run(Rc::clone(&job)));
        for id in 0..self.config.workers {
            monoio::spawn(worker::run(Rc::clone(&job), id));
        }
        if let Some(period) = self.config.report_interval {
            monoio::spawn(status::report(job, period));
        }

        self.active = true;
        Ok(())
    }

    pub fn work_status(&self) -> WorkStatus {
        WorkStatus::estimate(
            self.active,
            self.schedule.queue.len(),
            self.credentials.borrow().len(),
            self.config.cooldown,
        )
    }

    /// Known credentials, uid to secret.
    pub fn snapshot_credentials(&self) -> BTreeMap<u64, String> {
        self.credentials.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn image(&self) -> Option<&Raster> {
        self.image.as_deref()
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    /// Length of the wait queue.
    pub fn backlog(&self) -> usize {
        self.schedule.queue.len()
    }

    pub fn pending(&self) -> usize {
        self.schedule.pending.count()
    }

    /// Successful writes since the last reset.
    pub fn written(&self) -> u64 {
        self.schedule.written.get()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.schedule.pool.stats()
    }

    /// Uids currently ready to be issued.
    pub fn available_credentials(&self) -> Vec<u64> {
        self.schedule.pool.available_uids()
    }
}

impl<B> Drop for Session<B> {
    fn drop(&mut self) {
        self.schedule.shutdown();
    }
}
