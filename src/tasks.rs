use serde::Deserialize;
use std::{fmt, fs, path::Path, path::PathBuf, str::FromStr};

/// Images to paint one after another.
///
/// ```toml
/// [[task]]
/// image = "logo.rkyv"
/// x = 120
/// y = 40
/// ignore_background = true
/// credentials = [{ uid = 1, secret = "..." }]
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct TaskFile {
    #[serde(default, rename = "task")]
    pub tasks: Vec<Task>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Task {
    pub image: PathBuf,
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
    #[serde(default)]
    pub ignore_background: bool,
    /// Added on top of the credentials already known to the session.
    #[serde(default)]
    pub credentials: Vec<TaskCredential>,
}

#[derive(Clone, Deserialize)]
pub struct TaskCredential {
    pub uid: u64,
    pub secret: String,
}

impl fmt::Debug for TaskCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCredential")
            .field("uid", &self.uid)
            .finish_non_exhaustive()
    }
}

/// `<uid>:<secret>`, as given on the command line.
impl FromStr for TaskCredential {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (uid, secret) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <uid>:<secret>, got {s:?}"))?;
        let uid = uid
            .parse::<u64>()
            .map_err(|error| format!("invalid uid {uid:?}: {error}"))?;

        Ok(Self {
            uid,
            secret: secret.to_owned(),
        })
    }
}

impl TaskFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut file: Self = toml::from_str(&contents)?;

        // Image paths are relative to the task file
        if let Some(dir) = path.parent() {
            for task in &mut file.tasks {
                if task.image.is_relative() {
                    task.image = dir.join(&task.image);
                }
            }
        }

        Ok(file)
    }
}
