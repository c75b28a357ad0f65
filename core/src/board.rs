use crate::{Color, Credential, Error};
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    io,
    time::{Duration, Instant},
};

/// Origin of the target image on the remote canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
}

/// Remote canvas as seen by the scheduler.
#[allow(async_fn_in_trait)]
pub trait Board: 'static {
    /// Last known color at `(x, y)`, `None` if the cell has never been observed.
    ///
    /// Must not block; a refresh may be in progress.
    fn observed_color(&self, x: u32, y: u32) -> Option<Color>;

    /// Fetch a fresh snapshot. On failure the previous snapshot must stay intact.
    async fn refresh(&self, force: bool) -> Result<(), Error>;

    /// Attempt a single write. `false` means the write was rejected.
    async fn write_pixel(&self, x: u32, y: u32, color: Color, credential: &Credential) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteRecord {
    pub x: u32,
    pub y: u32,
    pub color: Color,
    pub uid: u64,
}

/// In-memory canvas.
///
/// Writes land on the live canvas immediately while `observed_color` serves the snapshot
/// taken by the last successful refresh.
pub struct MemoryBoard {
    width: u32,
    height: u32,
    live: RefCell<Vec<Color>>,
    snapshot: RefCell<Vec<Color>>,
    cooldown: Option<Duration>,
    last_write: RefCell<HashMap<u64, Instant>>,
    writes: RefCell<Vec<WriteRecord>>,
    rejected: Cell<usize>,
    refreshes: Cell<usize>,
    fail_refresh: Cell<bool>,
    fail_writes: Cell<bool>,
}

impl MemoryBoard {
    pub fn new(width: u32, height: u32, fill: Color) -> Self {
        let cells = vec![fill; width as usize * height as usize];

        Self {
            width,
            height,
            live: RefCell::new(cells.clone()),
            snapshot: RefCell::new(cells),
            cooldown: None,
            last_write: RefCell::new(HashMap::new()),
            writes: RefCell::new(Vec::new()),
            rejected: Cell::new(0),
            refreshes: Cell::new(0),
            fail_refresh: Cell::new(false),
            fail_writes: Cell::new(false),
        }
    }

    /// Reject writes of a uid that wrote less than `cooldown` ago.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y as usize * self.width as usize + x as usize)
    }

    /// Write to the live canvas as some unrelated party.
    pub fn paint(&self, x: u32, y: u32, color: Color) {
        if let Some(idx) = self.index(x, y) {
            self.live.borrow_mut()[idx] = color;
        }
    }

    pub fn live_color(&self, x: u32, y: u32) -> Option<Color> {
        self.index(x, y).map(|idx| self.live.borrow()[idx])
    }

    /// Copy the live canvas into the snapshot without going through `refresh`.
    pub fn sync(&self) {
        self.snapshot.borrow_mut().clone_from(&self.live.borrow());
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.borrow().clone()
    }

    pub fn rejected(&self) -> usize {
        self.rejected.get()
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.get()
    }

    pub fn set_fail_refresh(&self, fail: bool) {
        self.fail_refresh.set(fail);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    fn reject(&self) -> bool {
        self.rejected.set(self.rejected.get() + 1);
        false
    }
}

impl Board for MemoryBoard {
    fn observed_color(&self, x: u32, y: u32) -> Option<Color> {
        self.index(x, y).map(|idx| self.snapshot.borrow()[idx])
    }

    async fn refresh(&self, _force: bool) -> Result<(), Error> {
        self.refreshes.set(self.refreshes.get() + 1);
        if self.fail_refresh.get() {
            return Err(Error::RefreshFailed(io::Error::other("refresh disabled")));
        }

        self.sync();
        Ok(())
    }

    async fn write_pixel(&self, x: u32, y: u32, color: Color, credential: &Credential) -> bool {
        let Some(idx) = self.index(x, y) else {
            return self.reject();
        };
        if self.fail_writes.get() {
            return self.reject();
        }

        let now = Instant::now();
        if let Some(cooldown) = self.cooldown {
            let mut last_write = self.last_write.borrow_mut();
            let too_early = last_write
                .get(&credential.uid)
                .is_some_and(|last| now.duration_since(*last) < cooldown);
            if too_early {
                drop(last_write);
                return self.reject();
            }
            last_write.insert(credential.uid, now);
        }

        self.live.borrow_mut()[idx] = color;
        self.writes.borrow_mut().push(WriteRecord {
            x,
            y,
            color,
            uid: credential.uid,
        });

        true
    }
}
