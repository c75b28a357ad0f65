use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    rc::Rc,
    time::Duration,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Identity plus secret authorised to write one pixel per cooldown window.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub uid: u64,
    pub secret: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("uid", &self.uid)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub issued: usize,
    pub available: usize,
    pub cooling: usize,
    pub total: usize,
}

/// Rate-limited pool of credential uids.
///
/// `issued + available + cooling` always equals the amount of uids ever inserted.
pub struct CredentialPool {
    available: RefCell<VecDeque<u64>>,
    permits: Semaphore,
    issued: Cell<usize>,
    cooling: Cell<usize>,
    cancel: CancellationToken,
}

impl CredentialPool {
    /// Pending cooldown timers return their uid early once `cancel` fires.
    pub fn new(uids: impl IntoIterator<Item = u64>, cancel: CancellationToken) -> Rc<Self> {
        let available: VecDeque<u64> = uids.into_iter().collect();
        let permits = Semaphore::new(available.len());

        Rc::new(Self {
            available: RefCell::new(available),
            permits,
            issued: Cell::new(0),
            cooling: Cell::new(0),
            cancel,
        })
    }

    pub fn insert(&self, uid: u64) {
        self.put_back(uid);
    }

    /// Wait until a credential is available. Returns `None` once the pool is closed.
    pub async fn acquire(self: &Rc<Self>) -> Option<Lease> {
        let permit = self.permits.acquire().await.ok()?;
        permit.forget();

        let uid = self.available.borrow_mut().pop_front()?;
        self.issued.set(self.issued.get() + 1);

        Some(Lease {
            pool: Rc::clone(self),
            uid: Some(uid),
        })
    }

    pub fn close(&self) {
        self.permits.close();
    }

    pub fn stats(&self) -> PoolStats {
        let issued = self.issued.get();
        let available = self.available.borrow().len();
        let cooling = self.cooling.get();

        PoolStats {
            issued,
            available,
            cooling,
            total: issued + available + cooling,
        }
    }

    pub fn available_uids(&self) -> Vec<u64> {
        self.available.borrow().iter().copied().collect()
    }

    fn put_back(&self, uid: u64) {
        self.available.borrow_mut().push_back(uid);
        self.permits.add_permits(1);
    }

    fn give_back(&self, uid: u64) {
        self.issued.set(self.issued.get() - 1);
        self.put_back(uid);
    }

    fn start_cooldown(self: Rc<Self>, uid: u64, delay: Duration) {
        self.issued.set(self.issued.get() - 1);
        self.cooling.set(self.cooling.get() + 1);

        monoio::spawn(async move {
            self.cancel
                .run_until_cancelled(monoio::time::sleep(delay))
                .await;

            self.cooling.set(self.cooling.get() - 1);
            self.put_back(uid);
        });
    }
}

/// An issued credential. Dropping the lease returns it to the pool immediately.
pub struct Lease {
    pool: Rc<CredentialPool>,
    uid: Option<u64>,
}

impl Lease {
    #[inline]
    pub fn uid(&self) -> u64 {
        self.uid.unwrap_or_default()
    }

    /// Return the credential after `delay` without blocking the caller.
    pub fn cool_down(mut self, delay: Duration) {
        if let Some(uid) = self.uid.take() {
            Rc::clone(&self.pool).start_cooldown(uid, delay);
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(uid) = self.uid.take() {
            self.pool.give_back(uid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CredentialPool, PoolStats};
    use crate::block_on;
    use std::{
        rc::Rc,
        time::{Duration, Instant},
    };
    use tokio_util::sync::CancellationToken;

    fn assert_conserved(pool: &CredentialPool, total: usize) {
        let stats = pool.stats();
        assert_eq!(stats.issued + stats.available + stats.cooling, total);
        assert_eq!(stats.total, total);
    }

    #[test]
    fn dropped_lease_returns_at_once() {
        block_on(async {
            let pool = CredentialPool::new([1, 2], CancellationToken::new());
            let lease = pool.acquire().await.unwrap();
            assert_eq!(lease.uid(), 1);
            assert_eq!(
                pool.stats(),
                PoolStats {
                    issued: 1,
                    available: 1,
                    cooling: 0,
                    total: 2
                }
            );

            drop(lease);
            assert_eq!(pool.available_uids(), vec![2, 1]);
            assert_conserved(&pool, 2);
        });
    }

    #[test]
    fn cooldown_delays_reentry() {
        block_on(async {
            let pool = CredentialPool::new([7], CancellationToken::new());
            let started = Instant::now();

            pool.acquire().await.unwrap().cool_down(Duration::from_millis(40));
            assert_eq!(pool.stats().cooling, 1);
            assert_conserved(&pool, 1);

            let lease = pool.acquire().await.unwrap();
            assert_eq!(lease.uid(), 7);
            assert!(started.elapsed() >= Duration::from_millis(40));
            assert_conserved(&pool, 1);
        });
    }

    #[test]
    fn acquire_waits_while_empty() {
        block_on(async {
            let pool = CredentialPool::new([], CancellationToken::new());
            let waiter = monoio::spawn({
                let pool = Rc::clone(&pool);
                async move { pool.acquire().await.map(|lease| lease.uid()) }
            });

            monoio::time::sleep(Duration::from_millis(10)).await;
            pool.insert(3);
            assert_eq!(waiter.await, Some(3));
        });
    }

    #[test]
    fn cancel_cuts_cooldown_short() {
        block_on(async {
            let cancel = CancellationToken::new();
            let pool = CredentialPool::new([1], cancel.clone());

            pool.acquire().await.unwrap().cool_down(Duration::from_secs(3600));
            cancel.cancel();
            monoio::time::sleep(Duration::from_millis(5)).await;

            assert_eq!(pool.stats().available, 1);
            assert_conserved(&pool, 1);
        });
    }

    #[test]
    fn closed_pool_wakes_waiters() {
        block_on(async {
            let pool = CredentialPool::new([], CancellationToken::new());
            let waiter = monoio::spawn({
                let pool = Rc::clone(&pool);
                async move { pool.acquire().await.is_none() }
            });

            monoio::time::sleep(Duration::from_millis(5)).await;
            pool.close();
            assert!(waiter.await);
        });
    }
}
