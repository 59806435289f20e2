use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::time::Duration;

use url::Url;

use crate::transfer::TransferSession;
use crate::{StreamError, StreamResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpenMode {
    ReadOnly,
}

/// Open-time tuning knobs.
#[derive(Debug, Clone)]
pub struct UriStreamOptions {
    /// Ring buffer capacity used before any known-length hint arrives.
    pub initial_buffer_size: usize,
    /// Overall time limit for one remote transfer. `None` (the default)
    /// lets a stalled source block its reader indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for UriStreamOptions {
    fn default() -> Self {
        Self {
            initial_buffer_size: 2048,
            request_timeout: None,
        }
    }
}

impl UriStreamOptions {
    pub fn with_initial_buffer_size(mut self, size: usize) -> Self {
        self.initial_buffer_size = size;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

enum StreamKind {
    Local(File),
    Remote(TransferSession),
}

/// Pull-based, seekable byte stream over a local file or a remote HTTP(S)
/// resource fetched incrementally. The variant is chosen once at open and
/// never changes; decoders consume both through the same blocking
/// read/seek surface (also exposed as `std::io::Read` / `Seek`).
pub struct UriStream {
    kind: StreamKind,
    source: String,
}

impl UriStream {
    /// Open `path_or_url` for reading. A string naming a readable local
    /// file always resolves to that file, even when it would also parse
    /// as a URL; everything else is fetched as an http(s) resource.
    pub fn open(path_or_url: &str, mode: OpenMode) -> StreamResult<UriStream> {
        Self::open_with_options(path_or_url, mode, UriStreamOptions::default())
    }

    pub fn open_with_options(
        path_or_url: &str,
        mode: OpenMode,
        options: UriStreamOptions,
    ) -> StreamResult<UriStream> {
        match mode {
            OpenMode::ReadOnly => {}
        }

        match File::open(path_or_url) {
            Ok(file) => {
                debug!("opened local file {}", path_or_url);
                return Ok(UriStream {
                    kind: StreamKind::Local(file),
                    source: path_or_url.to_string(),
                });
            }
            Err(e) => {
                debug!(
                    "{} is not a readable local file ({}), trying remote",
                    path_or_url, e
                );
            }
        }

        let url = Url::parse(path_or_url).map_err(|_| {
            StreamError::NotFound(format!(
                "{} is neither a local file nor a valid url",
                path_or_url
            ))
        })?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(StreamError::NotFound(format!(
                    "{}: unsupported url scheme {}",
                    path_or_url, other
                )));
            }
        }

        let session = TransferSession::open(
            url.as_str(),
            options.initial_buffer_size,
            options.request_timeout,
        )?;
        info!(
            "opened remote stream {} (len {:?})",
            path_or_url,
            session.total_len()
        );
        Ok(UriStream {
            kind: StreamKind::Remote(session),
            source: path_or_url.to_string(),
        })
    }

    /// Read up to `dest.len()` bytes. A short count means end of stream;
    /// 0 means no byte will ever follow.
    pub fn read(&mut self, dest: &mut [u8]) -> StreamResult<usize> {
        match &mut self.kind {
            StreamKind::Local(file) => {
                let mut filled = 0;
                while filled < dest.len() {
                    let n = file.read(&mut dest[filled..])?;
                    if n == 0 {
                        break;
                    }
                    filled += n;
                }
                Ok(filled)
            }
            StreamKind::Remote(session) => session.read(dest),
        }
    }

    /// Move backward by up to `len` bytes. The distance actually rewound
    /// is returned, clamped to what the source can still replay; the call
    /// never fails.
    pub fn rewind(&mut self, len: u64) -> u64 {
        match &mut self.kind {
            StreamKind::Local(file) => {
                let pos = match file.stream_position() {
                    Ok(pos) => pos,
                    Err(e) => {
                        warn!("rewind: cannot query position of {}: {}", self.source, e);
                        return 0;
                    }
                };
                let n = len.min(pos).min(i64::MAX as u64);
                match file.seek(SeekFrom::Current(-(n as i64))) {
                    Ok(_) => n,
                    Err(e) => {
                        warn!("rewind failed on {}: {}", self.source, e);
                        0
                    }
                }
            }
            StreamKind::Remote(session) => session.rewind(len),
        }
    }

    /// Read-and-discard up to `len` bytes, forcing remote production when
    /// needed. Returns the distance actually skipped (short at end of
    /// stream).
    pub fn skip(&mut self, len: u64) -> StreamResult<u64> {
        match &mut self.kind {
            StreamKind::Local(file) => {
                let pos = file.stream_position()?;
                let end = file.seek(SeekFrom::End(0))?;
                let n = len.min(end.saturating_sub(pos));
                file.seek(SeekFrom::Start(pos + n))?;
                Ok(n)
            }
            StreamKind::Remote(session) => session.skip(len),
        }
    }

    /// Reposition the stream and return the new offset. Local sources
    /// support arbitrary absolute seeks. Remote sources drain forward
    /// through the blocking read path and replay at most the buffered
    /// rewind window going backward (clamped, never re-requested);
    /// end-relative seeks first drain the transfer to completion.
    pub fn seek(&mut self, pos: SeekFrom) -> StreamResult<u64> {
        match &mut self.kind {
            StreamKind::Local(file) => Ok(file.seek(pos)?),
            StreamKind::Remote(session) => {
                match pos {
                    SeekFrom::Start(target) => {
                        let current = session.position();
                        if target >= current {
                            session.skip(target - current)?;
                        } else {
                            session.rewind(current - target);
                        }
                    }
                    SeekFrom::Current(offset) => {
                        if offset >= 0 {
                            let current = session.position();
                            if current.checked_add(offset as u64).is_none() {
                                return Err(StreamError::OffsetTooLarge(format!(
                                    "seek overflows stream position: {} + {}",
                                    current, offset
                                )));
                            }
                            session.skip(offset as u64)?;
                        } else {
                            session.rewind(offset.unsigned_abs());
                        }
                    }
                    SeekFrom::End(offset) => {
                        if offset > 0 {
                            return Err(StreamError::InvalidParam(
                                "cannot seek past the end of a remote stream".to_string(),
                            ));
                        }
                        session.drain_to_end()?;
                        session.skip(u64::MAX)?;
                        session.rewind(offset.unsigned_abs());
                    }
                }
                Ok(session.position())
            }
        }
    }

    /// Current logical offset from the start of the stream.
    pub fn position(&mut self) -> StreamResult<u64> {
        match &mut self.kind {
            StreamKind::Local(file) => Ok(file.stream_position()?),
            StreamKind::Remote(session) => Ok(session.position()),
        }
    }

    /// Close the stream, releasing the file handle or tearing down the
    /// transfer session. Consuming `self` makes a second close a compile
    /// error; dropping an open stream performs the same teardown, so
    /// abandoning one inside an error path is safe at any time.
    pub fn close(mut self) {
        match &mut self.kind {
            StreamKind::Local(_) => {}
            StreamKind::Remote(session) => session.shutdown(),
        }
        debug!("closed stream {}", self.source);
    }
}

impl fmt::Debug for UriStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            StreamKind::Local(_) => "Local",
            StreamKind::Remote(_) => "Remote",
        };
        f.debug_struct("UriStream")
            .field("kind", &kind)
            .field("source", &self.source)
            .finish()
    }
}

impl Read for UriStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        UriStream::read(self, buf).map_err(Into::into)
    }
}

impl Seek for UriStream {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        UriStream::seek(self, pos).map_err(Into::into)
    }
}
