#[macro_use]
extern crate tracing;

mod pixelflut;
mod tasks;

use self::{
    pixelflut::{PixelflutBoard, Region},
    tasks::{Task, TaskCredential, TaskFile},
};
use anyhow::bail;
use repaint_core::{Board, Color, Config, MemoryBoard, Raster, Session, WorkStatus};
use std::{
    fs::File,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    rc::Rc,
    time::Duration,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const WHERE_TO: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1337);

/// How often the batch runner checks whether the image is done.
const POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone, argh::FromArgs)]
/// Keep an image painted on a shared canvas
struct Args {
    #[argh(option)]
    /// raster file produced by repaint-process
    image: Option<PathBuf>,

    #[argh(option)]
    /// TOML file listing several images to paint one after another
    tasks: Option<PathBuf>,

    #[argh(option, default = "WHERE_TO")]
    /// address of the pixelflut server
    addr: SocketAddr,

    #[argh(option, default = "0")]
    /// x offset
    x_offset: u32,

    #[argh(option, default = "0")]
    /// y offset
    y_offset: u32,

    #[argh(option)]
    /// credential as <uid>:<secret>, may be repeated
    credential: Vec<TaskCredential>,

    #[argh(option, default = "7")]
    /// amount of concurrent writers
    workers: usize,

    #[argh(option, default = "30.0")]
    /// per-credential cooldown in seconds
    cooldown: f64,

    #[argh(option, default = "60.0")]
    /// seconds between two scans of the board
    update_interval: f64,

    #[argh(option, default = "1000")]
    /// canvas width
    canvas_width: u32,

    #[argh(option, default = "600")]
    /// canvas height
    canvas_height: u32,

    #[argh(switch)]
    /// leave white pixels of the image alone
    ignore_background: bool,

    #[argh(switch)]
    /// exit once the image is complete instead of maintaining it
    exit_when_done: bool,

    #[argh(option, default = "20")]
    /// seconds to wait before checking for completion
    settle: u64,

    #[argh(switch)]
    /// paint onto an in-memory canvas instead of the network
    dry_run: bool,
}

impl Args {
    fn config(&self) -> anyhow::Result<Config> {
        Ok(Config {
            cooldown: Duration::try_from_secs_f64(self.cooldown)?,
            workers: self.workers,
            update_interval: Duration::try_from_secs_f64(self.update_interval)?,
            canvas: (self.canvas_width, self.canvas_height),
            ..Config::default()
        })
    }

    /// Either the tasks of `--tasks` or a single task built from the other options.
    fn tasks(&self) -> anyhow::Result<Vec<Task>> {
        let tasks = match (&self.image, &self.tasks) {
            (Some(image), None) => vec![Task {
                image: image.clone(),
                x: self.x_offset,
                y: self.y_offset,
                ignore_background: self.ignore_background,
                credentials: Vec::new(),
            }],
            (None, Some(path)) => TaskFile::load(path)?.tasks,
            _ => bail!("expected exactly one of --image and --tasks"),
        };

        if tasks.is_empty() {
            bail!("nothing to paint");
        }
        Ok(tasks)
    }
}

fn load_raster(path: &Path) -> anyhow::Result<Raster> {
    let file = File::open(path)?;
    let data = unsafe { memmap2::Mmap::map(&file)? };
    Ok(Raster::from_archive(&data)?)
}

/// Canvas area covered by the task's image.
fn covered_region(task: &Task, raster: &Raster) -> Region {
    Region {
        x: task.x,
        y: task.y,
        width: raster.width(),
        height: raster.height(),
    }
}

fn add_credentials<B: Board>(session: &Session<B>, credentials: &[TaskCredential]) {
    for credential in credentials {
        session.add_credential(credential.uid, credential.secret.clone());
        info!(uid = credential.uid, "credential added");
    }
}

async fn wait_until_converged<B: Board>(session: &Session<B>, settle: Duration) {
    info!("waiting {}s before checking progress..", settle.as_secs());
    monoio::time::sleep(settle).await;

    loop {
        match session.work_status() {
            WorkStatus::Converged => break,
            WorkStatus::Starved => warn!("no credentials, nothing gets painted"),
            status => debug!(?status, "still painting"),
        }

        monoio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Paint every task in turn on one session.
///
/// The last task keeps being maintained unless `--exit-when-done` is given.
async fn drive<B: Board>(board: B, jobs: Vec<(Task, Raster)>, args: Args) -> anyhow::Result<()> {
    let mut session = Session::new(Rc::new(board), args.config()?);
    add_credentials(&session, &args.credential);

    let count = jobs.len();
    for (idx, (task, raster)) in jobs.into_iter().enumerate() {
        session.set_image(raster)?;
        session.set_placement(task.x, task.y)?;
        session.set_ignore_background(task.ignore_background);
        add_credentials(&session, &task.credentials);

        info!(task = idx, image = %task.image.display(), "starting task");
        session.start().await?;

        let last = idx + 1 == count;
        if last && !args.exit_when_done {
            return std::future::pending().await;
        }

        wait_until_converged(&session, Duration::from_secs(args.settle)).await;
        info!(task = idx, written = session.written(), "task done");
    }

    session.reset();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = argh::from_env();

    let mut jobs = Vec::new();
    for task in args.tasks()? {
        info!("loading {}..", task.image.display());
        let raster = load_raster(&task.image)?;
        info!(
            width = raster.width(),
            height = raster.height(),
            "loaded image successfully"
        );
        jobs.push((task, raster));
    }

    let mut runtime = monoio::RuntimeBuilder::<monoio::FusionDriver>::new()
        .enable_timer()
        .build()?;

    runtime.block_on(async move {
        if args.dry_run {
            info!("dry run, painting onto a blank canvas");
            let board = MemoryBoard::new(args.canvas_width, args.canvas_height, Color::WHITE);
            drive(board, jobs, args).await
        } else {
            let Some(region) = jobs
                .iter()
                .map(|(task, raster)| covered_region(task, raster))
                .reduce(Region::union)
            else {
                bail!("nothing to paint");
            };
            info!(addr = %args.addr, ?region, "painting via pixelflut");
            drive(PixelflutBoard::new(args.addr, region), jobs, args).await
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{Args, covered_region};
    use crate::tasks::Task;
    use argh::FromArgs;
    use repaint_core::Raster;
    use std::time::Duration;

    fn args(extra: &[&str]) -> Result<Args, argh::EarlyExit> {
        Args::from_args(&["repaint"], extra)
    }

    #[test]
    fn durations_come_from_seconds() {
        let args = args(&["--image", "a.rkyv", "--cooldown", "1.5"]).unwrap();
        let config = args.config().unwrap();
        assert_eq!(config.cooldown, Duration::from_millis(1500));
        assert_eq!(config.update_interval, Duration::from_secs(60));
    }

    #[test]
    fn invalid_durations_are_an_error() {
        let mut negative = args(&["--image", "a.rkyv"]).unwrap();
        negative.cooldown = -1.0;
        assert!(negative.config().is_err());

        let mut nan = args(&["--image", "a.rkyv"]).unwrap();
        nan.update_interval = f64::NAN;
        assert!(nan.config().is_err());
    }

    #[test]
    fn image_and_tasks_are_exclusive() {
        assert!(args(&[]).unwrap().tasks().is_err());
        assert!(args(&["--image", "a", "--tasks", "b"]).unwrap().tasks().is_err());

        let tasks = args(&["--image", "a.rkyv", "--x-offset", "3", "--ignore-background"])
            .unwrap()
            .tasks()
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!((tasks[0].x, tasks[0].y), (3, 0));
        assert!(tasks[0].ignore_background);
    }

    #[test]
    fn region_spans_the_image() {
        let task = Task {
            image: "a.rkyv".into(),
            x: 4,
            y: 5,
            ignore_background: false,
            credentials: Vec::new(),
        };
        let raster = Raster::from_fn(3, 2, |_, _| repaint_core::Color::WHITE);

        let region = covered_region(&task, &raster);
        assert_eq!((region.x, region.y, region.width, region.height), (4, 5, 3, 2));
    }
}
