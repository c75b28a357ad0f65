use crate::{
    Board, Color, Config, Credential, CredentialPool, PendingSet, Placement, Raster, WaitQueue,
    WorkStatus,
};
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
};
use tokio_util::sync::CancellationToken;

pub(crate) type KnownCredentials = Rc<RefCell<BTreeMap<u64, String>>>;

/// Per-session scheduling state. Replaced wholesale on every reset.
pub(crate) struct Schedule {
    pub pending: PendingSet,
    pub queue: WaitQueue,
    pub pool: Rc<CredentialPool>,
    pub written: Cell<u64>,
    pub cancel: CancellationToken,
}

impl Schedule {
    pub fn new(config: &Config, uids: impl IntoIterator<Item = u64>) -> Rc<Self> {
        let cancel = CancellationToken::new();

        Rc::new(Self {
            pending: PendingSet::new(config.max_area()),
            queue: WaitQueue::new(config.queue_capacity),
            pool: CredentialPool::new(uids, cancel.clone()),
            written: Cell::new(0),
            cancel,
        })
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.queue.close();
        self.pool.close();
    }
}

/// Everything the spawned loops of an active session share.
pub(crate) struct Job<B> {
    pub board: Rc<B>,
    pub image: Rc<Raster>,
    pub placement: Placement,
    pub config: Config,
    pub ignore_background: Rc<Cell<bool>>,
    pub credentials: KnownCredentials,
    pub schedule: Rc<Schedule>,
    refreshing: Cell<bool>,
}

impl<B: Board> Job<B> {
    pub fn new(
        board: Rc<B>,
        image: Rc<Raster>,
        placement: Placement,
        config: Config,
        ignore_background: Rc<Cell<bool>>,
        credentials: KnownCredentials,
        schedule: Rc<Schedule>,
    ) -> Rc<Self> {
        Rc::new(Self {
            board,
            image,
            placement,
            config,
            ignore_background,
            credentials,
            schedule,
            refreshing: Cell::new(false),
        })
    }

    #[inline]
    pub fn cancel(&self) -> &CancellationToken {
        &self.schedule.cancel
    }

    #[inline]
    pub fn skips(&self, color: Color) -> bool {
        self.ignore_background.get() && color == self.config.background
    }

    #[inline]
    pub fn canvas_coords(&self, offset: usize) -> (u32, u32) {
        let (x, y) = self.image.coords(offset);
        (self.placement.x + x, self.placement.y + y)
    }

    /// Whether the board disagrees with the target image at `offset`.
    pub fn needs_paint(&self, offset: usize) -> bool {
        let expected = self.image.color(offset);
        let (x, y) = self.canvas_coords(offset);
        let observed = self.board.observed_color(x, y);
        if observed == Some(expected) || self.skips(expected) {
            return false;
        }

        debug!(
            offset,
            x,
            y,
            expected = %expected,
            observed = ?observed.map(|color| color.to_string()),
            "diff"
        );
        true
    }

    pub fn credential(&self, uid: u64) -> Option<Credential> {
        self.credentials
            .borrow()
            .get(&uid)
            .map(|secret| Credential {
                uid,
                secret: secret.clone(),
            })
    }

    pub fn status(&self) -> WorkStatus {
        WorkStatus::estimate(
            true,
            self.schedule.queue.len(),
            self.credentials.borrow().len(),
            self.config.cooldown,
        )
    }

    /// Fire-and-forget board refresh. Skipped while another one is still running.
    pub fn spawn_refresh(self: &Rc<Self>) {
        if self.refreshing.replace(true) {
            debug!("refresh already in flight");
            return;
        }

        let job = Rc::clone(self);
        monoio::spawn(async move {
            match job.cancel().run_until_cancelled(job.board.refresh(false)).await {
                Some(Err(error)) => warn!(%error, "keeping previous board snapshot"),
                Some(Ok(())) => debug!("board refreshed"),
                None => {}
            }

            job.refreshing.set(false);
        });
    }
}
