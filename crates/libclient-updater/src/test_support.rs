// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loopback HTTP fixtures shared by unit tests.

use std::{
    io::{BufRead, BufReader, Write},
    net::TcpListener,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

pub(crate) struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
    pub delay: Duration,
    /// Sends the body in chunks of this size with a pause after each one.
    pub trickle: Option<(usize, Duration)>,
}

impl Reply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: Duration::ZERO,
            trickle: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: b"error".to_vec(),
            delay: Duration::ZERO,
            trickle: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn trickled(mut self, chunk: usize, gap: Duration) -> Self {
        self.trickle = Some((chunk.max(1), gap));
        self
    }
}

/// A background HTTP/1.1 server on `127.0.0.1:0` answering every request
/// through `handler(request_target)`.
pub(crate) struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}/", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(handler);

        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let handler = Arc::clone(&handler);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    let mut reader = BufReader::new(&stream);
                    let mut request_line = String::new();
                    if reader.read_line(&mut request_line).is_err() {
                        return;
                    }
                    loop {
                        let mut header = String::new();
                        match reader.read_line(&mut header) {
                            Ok(0) => break,
                            Ok(_) if header == "\r\n" || header == "\n" => break,
                            Ok(_) => {}
                            Err(_) => return,
                        }
                    }

                    counter.fetch_add(1, Ordering::SeqCst);
                    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
                    let reply = handler(target);
                    if !reply.delay.is_zero() {
                        thread::sleep(reply.delay);
                    }

                    let mut stream = &stream;
                    let head = format!(
                        "HTTP/1.1 {} Canned\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        reply.status,
                        reply.body.len()
                    );
                    let _ = stream.write_all(head.as_bytes());
                    match reply.trickle {
                        Some((chunk, gap)) => {
                            for part in reply.body.chunks(chunk) {
                                if stream.write_all(part).and_then(|()| stream.flush()).is_err() {
                                    return;
                                }
                                thread::sleep(gap);
                            }
                        }
                        None => {
                            let _ = stream.write_all(&reply.body);
                        }
                    }
                    let _ = stream.flush();
                });
            }
        });

        Self { base_url, hits }
    }

    /// Serves the same body for every request.
    pub fn fixed(status: u16, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        Self::start(move |_| Reply {
            status,
            body: body.clone(),
            delay: Duration::ZERO,
            trickle: None,
        })
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Returns the base URL of a port nothing listens on.
pub(crate) fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/")
}

/// Whether the tests run with root privileges, which bypass file modes.
#[cfg(unix)]
pub(crate) fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

#[cfg(not(unix))]
pub(crate) fn is_root() -> bool {
    false
}

/// Gzip-compresses `data`.
pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Builds an in-memory tar archive from `(path, contents)` pairs.
pub(crate) fn tar_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap()
}
