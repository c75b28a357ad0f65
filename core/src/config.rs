use crate::Color;
use std::time::Duration;

/// Scheduling knobs. The defaults match a board with a 30 second cooldown.
#[derive(Clone, Debug)]
pub struct Config {
    /// Minimum time between two writes of the same credential.
    pub cooldown: Duration,

    /// Credentials re-enter the pool this much before their cooldown ends.
    pub head_start: Duration,

    /// Amount of concurrent writers.
    pub workers: usize,

    /// Delay between `start` and the first scan cycle.
    pub scan_delay: Duration,

    /// Scan period.
    pub update_interval: Duration,

    /// Backlog at or below which cells are scanned in raster order.
    pub ordered_backlog: usize,

    pub queue_capacity: usize,

    /// Largest accepted raster, `(width, height)`.
    pub max_image: (u32, u32),

    /// Size of the remote canvas, `(width, height)`.
    pub canvas: (u32, u32),

    /// Sentinel treated as transparent while ignore-background is on.
    pub background: Color,

    /// Throughput report period, `None` disables the reporter.
    pub report_interval: Option<Duration>,
}

impl Config {
    /// Delay after which a credential that just wrote becomes available again.
    #[inline]
    pub fn reentry_delay(&self) -> Duration {
        self.cooldown.saturating_sub(self.head_start)
    }

    #[inline]
    pub fn max_area(&self) -> usize {
        self.max_image.0 as usize * self.max_image.1 as usize
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30),
            head_start: Duration::from_secs(2) / 7,
            workers: 7,
            scan_delay: Duration::from_secs(1),
            update_interval: Duration::from_secs(60),
            ordered_backlog: 1000,
            queue_capacity: 40_000,
            max_image: (200, 200),
            canvas: (1000, 600),
            background: Color::WHITE,
            report_interval: Some(Duration::from_secs(3)),
        }
    }
}
