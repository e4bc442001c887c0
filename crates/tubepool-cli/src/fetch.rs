//! External downloader driven by the `[fetch]` config section.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use tubepool_config::log_fetch_debug;
use tubepool_config::FetchConfig;
use tubepool_store::{ContentItem, FetchError, Fetcher};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long the pipes may stay open once the command has exited
const OUTPUT_GRACE: Duration = Duration::from_secs(5);

/// Runs an argv template once per item.
///
/// The command must print the final file path on its last stdout line.
/// Any failure is reported as a fetch error, which the run treats as
/// transient.
#[derive(Debug, Clone)]
pub struct CommandFetcher {
    argv: Vec<String>,
    /// `None` waits forever
    timeout: Option<Duration>,
    output_grace: Duration,
}

impl CommandFetcher {
    pub fn new(argv: Vec<String>, timeout: Option<Duration>) -> Result<Self> {
        if argv.first().map_or(true, |p| p.is_empty()) {
            bail!("fetch.command must name a program");
        }
        Ok(Self {
            argv,
            timeout,
            output_grace: OUTPUT_GRACE,
        })
    }

    /// `timeout_secs = 0` disables the timeout.
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        Self::new(config.command.clone(), timeout)
    }

    pub fn with_output_grace(mut self, grace: Duration) -> Self {
        self.output_grace = grace;
        self
    }

    /// Substitute `{id}`, `{title}`, `{channel}` and `{pool}` in every argument.
    pub fn render(&self, item: &ContentItem, pool_dir: &Path) -> Vec<String> {
        let pool = pool_dir.to_string_lossy();
        self.argv
            .iter()
            .map(|arg| {
                arg.replace("{id}", &item.id)
                    .replace("{title}", &item.title)
                    .replace("{channel}", &item.channel)
                    .replace("{pool}", &pool)
            })
            .collect()
    }
}

impl Fetcher for CommandFetcher {
    fn fetch(&self, item: &ContentItem, pool_dir: &Path) -> std::result::Result<PathBuf, FetchError> {
        let argv = self.render(item, pool_dir);
        let (program, args) = argv.split_first().ok_or("fetch command is empty")?;
        log_fetch_debug!("Spawning fetch command", id = item.id.as_str(), program = program.as_str());

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {}", program, e))?;

        // Drain both pipes so a chatty child never blocks on a full buffer
        let out_rx = drain(child.stdout.take());
        let err_rx = drain(child.stderr.take());

        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if let Some(timeout) = self.timeout {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(format!("{} timed out after {:?}", program, timeout).into());
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        // A background process left behind can hold the pipes open
        let stdout = out_rx
            .recv_timeout(self.output_grace)
            .map_err(|_| format!("{} kept its output open after exiting", program))?;
        let stderr = err_rx.recv_timeout(self.output_grace).unwrap_or_default();

        if !status.success() {
            let detail = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(format!("{} exited with {}: {}", program, status, detail.trim()).into());
        }

        let line = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| format!("{} printed no file path", program))?;
        log_fetch_debug!("Fetch command finished", id = item.id.as_str(), path = line);
        Ok(PathBuf::from(line))
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(read_lossy(reader));
    });
    rx
}

fn read_lossy<R: Read>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut r) = reader {
        let _ = r.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}
