use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::process::{ChildStderr, ChildStdout, Command, Stdio};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::error::{ToolError, ToolErrorKind};
use crate::ffmpeg::{FFmpeg, Invocation, Transcoder};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STDERR_TAIL_LINES: usize = 5;

#[derive(Debug, Default)]
struct EncodeProgress {
    pub frame: usize,
    pub fps: f64,
    pub out_time: String,
}

enum FFmpegStdoutResult {
    Continue,
    Render,
}

impl Transcoder for FFmpeg {
    fn run(&self, invocation: &Invocation) -> Result<(), ToolError> {
        debug!("ffmpeg {}", invocation.display_args());

        let mut child = Command::new(&self.binary)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ToolError::new(ToolErrorKind::Spawn, &format!("unable to run ffmpeg: {}", e)))?;

        let label = invocation.label;
        let stdout_thread = child.stdout.take().map(|stdout| thread::spawn(move || consume_stdout(stdout, label)));
        let stderr_thread = child.stderr.take().map(|stderr| thread::spawn(move || read_stderr_to_end(stderr)));

        let started = Instant::now();
        let mut killed: Option<ToolErrorKind> = None;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => (),
                Err(e) => break Err(e),
            }

            if killed.is_none() {
                if self.stop.load(Ordering::SeqCst) {
                    warn!("Caught stop signal; killing ffmpeg ({})", child.id());
                    killed = Some(ToolErrorKind::Interrupted);
                } else if self.timeout.is_some_and(|t| started.elapsed() > t) {
                    warn!("{} exceeded {:?}; killing ffmpeg ({})", label, self.timeout, child.id());
                    killed = Some(ToolErrorKind::TimedOut);
                }
                if killed.is_some() {
                    if let Err(err) = child.kill() {
                        warn!("error killing ffmpeg process ({}) {:?}", child.id(), err);
                    }
                }
            }

            thread::sleep(POLL_INTERVAL);
        };

        if let Some(handle) = stdout_thread {
            let _ = handle.join();
        }
        let stderr_tail = stderr_thread
            .and_then(|handle| handle.join().ok())
            .flatten()
            .map(|stderr| tail(&stderr, STDERR_TAIL_LINES));

        if let Some(kind) = killed {
            let msg = match kind {
                ToolErrorKind::TimedOut => format!("ffmpeg {} timed out", label),
                _ => format!("ffmpeg {} was interrupted", label),
            };
            return Err(ToolError::new(kind, &msg).with_stderr(stderr_tail));
        }

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                if let Some(stderr) = &stderr_tail {
                    debug!("ffmpeg {} stderr: {}", label, stderr);
                }
                let msg = match status.code() {
                    Some(code) => format!("ffmpeg {} exited with {}", label, code),
                    None => format!("ffmpeg {} did not exit successfully", label),
                };
                Err(ToolError::new(ToolErrorKind::Exit(status.code()), &msg).with_stderr(stderr_tail))
            },
            Err(e) => Err(ToolError::new(
                ToolErrorKind::Exit(None),
                &format!("There was an error waiting for the ffmpeg process: {}", e))),
        }
    }
}

fn consume_stdout(stdout: ChildStdout, label: &'static str) {
    let mut progress = EncodeProgress::default();
    let stdout_reader = BufReader::new(stdout);
    for line in stdout_reader.lines().map_while(Result::ok) {
        match handle_ffmpeg_stdout_line(&line, &mut progress) {
            FFmpegStdoutResult::Continue => continue,
            FFmpegStdoutResult::Render => trace!(
                "{}: frame={} fps={:.1} time={}",
                label, progress.frame, progress.fps, progress.out_time),
        }
    }
}

fn handle_ffmpeg_stdout_line(line: &str, progress: &mut EncodeProgress) -> FFmpegStdoutResult {
    match line.split_once('=') {
        Some((key, value)) => match key.trim() {
            "fps" => {
                progress.fps = value.trim().parse().unwrap_or(progress.fps);
                FFmpegStdoutResult::Continue
            },
            "frame" => {
                progress.frame = value.trim().parse().unwrap_or(progress.frame);
                FFmpegStdoutResult::Continue
            },
            "out_time" => {
                progress.out_time = String::from(value.trim());
                FFmpegStdoutResult::Continue
            },
            "progress" => FFmpegStdoutResult::Render,
            _ => FFmpegStdoutResult::Continue,
        },
        None => FFmpegStdoutResult::Continue,
    }
}

fn read_stderr_to_end(stderr: ChildStderr) -> Option<String> {
    let mut buf = Vec::new();
    match BufReader::new(stderr).read_to_end(&mut buf) {
        Ok(_) => Some(String::from_utf8_lossy(&buf).into_owned()),
        Err(_) => None,
    }
}

fn tail(text: &str, lines: usize) -> String {
    let mut last: VecDeque<&str> = VecDeque::with_capacity(lines);
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if last.len() == lines {
            last.pop_front();
        }
        last.push_back(line);
    }
    last.into_iter().collect::<Vec<&str>>().join(" | ")
}
