// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    fs::{self, File},
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use flate2::read::GzDecoder;
use reqwest::Url;

use crate::{
    Error, Result,
    api::{CONNECT_TIMEOUT, USER_AGENT},
    types::ProgressState,
};

const DOWNLOAD_BUFFER_SIZE: usize = 8192;
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// How the response body is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Write the bytes as received.
    Raw,
    /// Inflate a gzip stream while writing.
    Gzip,
}

/// A finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    /// Bytes written to disk.
    pub size: u64,
    /// md5 of the bytes written to disk.
    pub checksum: String,
}

/// Builds a client for streaming transfers.
///
/// `idle_timeout` bounds the wait for the response head and every single
/// read of the body, never the transfer as a whole, so a slow download that
/// keeps making progress is not cut off.
pub fn transfer_client(idle_timeout: Duration) -> Result<reqwest::blocking::Client> {
    let client = reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(idle_timeout)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Streams `url` into `target` using a [`transfer_client`].
///
/// Any stale file at `target` is removed first and the new file is only
/// created once the server answered `200`. Transport, status and write
/// failures all surface as [`Error::DownloadFailed`]. A partially written
/// file is left in place; the next attempt removes it before starting.
///
/// `on_progress` sees transport-level (compressed) byte counts. A final
/// event with `percent == 1.0` fires when the transport stream ends, which
/// is before the file has been flushed; this function returns only after
/// the flush.
pub fn download(
    client: &reqwest::blocking::Client,
    url: Url,
    target: &Path,
    encoding: Encoding,
    on_progress: &mut dyn FnMut(ProgressState),
) -> Result<Downloaded> {
    if target.exists() {
        log::info!(target: "download", "removing old file at {}", target.display());
        fs::remove_file(target).map_err(|e| Error::download(format!("failed to remove old file: {e}")))?;
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::download(format!("failed to create target directory {}: {e}", parent.display()))
        })?;
    }

    log::debug!(target: "download", "downloading {url} to {}", target.display());
    let response = client
        .get(url)
        .send()
        .map_err(|e| Error::download(format!("request failed: {e}")))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(Error::download(format!("invalid http response code: {status}")));
    }

    let total = response.content_length().unwrap_or(0);
    let file = File::create(target).map_err(|e| Error::download(format!("disk write error: {e}")))?;
    let mut writer = BufWriter::new(file);
    let mut hasher = md5::Context::new();
    let mut written = 0u64;

    let mut source = ProgressReader::new(response, total, on_progress);
    {
        let mut reader: Box<dyn Read + '_> = match encoding {
            Encoding::Raw => Box::new(&mut source),
            Encoding::Gzip => Box::new(GzDecoder::new(&mut source)),
        };
        let mut buffer = [0u8; DOWNLOAD_BUFFER_SIZE];

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| Error::download(format!("stream error: {e}")))?;
            if bytes_read == 0 {
                break;
            }

            let chunk = &buffer[..bytes_read];
            hasher.consume(chunk);
            writer
                .write_all(chunk)
                .map_err(|e| Error::download(format!("disk write error: {e}")))?;
            written += bytes_read as u64;
        }
    }
    source.finish();

    writer
        .flush()
        .map_err(|e| Error::download(format!("disk write error: {e}")))?;
    drop(writer);

    let checksum = format!("{:x}", hasher.finalize());
    log::info!(target: "download", "wrote {written} bytes to {}", target.display());

    Ok(Downloaded {
        path: target.to_path_buf(),
        size: written,
        checksum,
    })
}

/// Counts transport bytes and reports throttled progress.
struct ProgressReader<'a, R> {
    inner: R,
    total: u64,
    transferred: u64,
    started: Instant,
    last_report: Instant,
    finished: bool,
    sink: &'a mut dyn FnMut(ProgressState),
}

impl<'a, R: Read> ProgressReader<'a, R> {
    fn new(inner: R, total: u64, sink: &'a mut dyn FnMut(ProgressState)) -> Self {
        let now = Instant::now();
        Self {
            inner,
            total,
            transferred: 0,
            started: now,
            last_report: now,
            finished: false,
            sink,
        }
    }

    fn report(&mut self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 {
            self.transferred as f64 / elapsed
        } else {
            0.0
        };
        let percent = if self.total > 0 {
            (self.transferred as f64 / self.total as f64).min(1.0)
        } else {
            0.0
        };
        let remaining = if speed > 0.0 && self.total > self.transferred {
            (self.total - self.transferred) as f64 / speed
        } else {
            0.0
        };

        (self.sink)(ProgressState {
            percent,
            speed_bytes_per_sec: speed,
            size_total: self.total,
            size_transferred: self.transferred,
            elapsed_secs: elapsed,
            remaining_secs: remaining,
        });
    }

    /// Emits the end-of-stream event once.
    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            (self.sink)(ProgressState::finished());
        }
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            self.finish();
            return Ok(0);
        }

        self.transferred += n as u64;
        if self.last_report.elapsed() >= PROGRESS_INTERVAL {
            self.last_report = Instant::now();
            self.report();
        }
        Ok(n)
    }
}
