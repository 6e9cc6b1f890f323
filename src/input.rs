//! Blocking line input, isolated on its own thread.
//!
//! The worker thread owns the input handle. Callers send it a prompt and
//! await the reply on a oneshot channel, so the async runtime never blocks on
//! a terminal read.

use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::mpsc;

use tokio::sync::oneshot;

type Reply = io::Result<Option<String>>;

struct Request {
    prompt: String,
    reply: oneshot::Sender<Reply>,
}

pub struct LineReader {
    requests: mpsc::Sender<Request>,
    pending: Option<oneshot::Receiver<Reply>>,
}

impl LineReader {
    /// Read lines from this process's stdin, echoing prompts to stdout.
    pub fn stdin(histfile: Option<PathBuf>) -> io::Result<Self> {
        Self::spawn(BufReader::new(io::stdin()), io::stdout(), histfile)
    }

    pub fn spawn<R, W>(input: R, output: W, histfile: Option<PathBuf>) -> io::Result<Self>
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("line-input".to_string())
            .spawn(move || worker(rx, input, output, histfile))?;
        Ok(Self {
            requests: tx,
            pending: None,
        })
    }

    /// Prompt for and return the next line, without its line terminator.
    ///
    /// `Ok(None)` at end of input. Cancel safe: if this future is dropped
    /// the outstanding request is kept and the next call waits for its line
    /// instead of prompting again.
    pub async fn read_line(&mut self, prompt: &str) -> Reply {
        if self.pending.is_none() {
            let (reply, rx) = oneshot::channel();
            self.requests
                .send(Request {
                    prompt: prompt.to_string(),
                    reply,
                })
                .map_err(|_| worker_gone())?;
            self.pending = Some(rx);
        }
        let Some(pending) = self.pending.as_mut() else {
            return Err(worker_gone());
        };
        let result = pending.await;
        self.pending = None;
        result.map_err(|_| worker_gone())?
    }
}

fn worker_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "line input worker exited")
}

fn worker<R: BufRead, W: Write>(
    requests: mpsc::Receiver<Request>,
    mut input: R,
    mut output: W,
    histfile: Option<PathBuf>,
) {
    while let Ok(req) = requests.recv() {
        let result = prompt_line(&mut input, &mut output, &req.prompt);
        if let (Ok(Some(line)), Some(path)) = (&result, &histfile) {
            if let Err(e) = append_history(path, line) {
                tracing::debug!(path = %path.display(), error = %e, "failed to append history");
            }
        }
        let eof = matches!(result, Ok(None) | Err(_));
        if req.reply.send(result).is_err() || eof {
            break;
        }
    }
}

fn prompt_line<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> Reply {
    output.write_all(prompt.as_bytes())?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(|c: char| c == '\n' || c == '\r').len();
    line.truncate(trimmed);
    Ok(Some(line))
}

fn append_history(path: &std::path::Path, line: &str) -> io::Result<()> {
    if line.trim().is_empty() {
        return Ok(());
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}
