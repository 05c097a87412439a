//! Outbound transcoding: gzip-compressed response output
//!
//! A [`GzippedResponse`] hands out either a byte stream or a text writer,
//! never both. Whichever is requested first creates the gzip sink; the
//! owner calls [`GzippedResponse::finish`] once the handler returns.

use crate::compressor::{Compressor, GZIP_ENCODING};
use encoding_rs::Encoding;
use flate2::write::GzEncoder;
use http::header::{HeaderValue, CONTENT_ENCODING};
use std::fmt;
use std::io::{self, Write};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use transcode_core::{charset, Error, RawResponse, Result, TranscodeConfig};

const STREAM_IN_USE: &str = "output_stream() already called";
const WRITER_IN_USE: &str = "writer() already called";

/// Shared handle on a gzip sink's closed state
///
/// Clones share one atomic flag, so a close path outside the handler (for
/// instance on another thread) races safely with
/// [`GzippedResponse::finish`]: exactly one side wins.
#[derive(Debug, Clone, Default)]
pub struct CloseFlag(Arc<AtomicBool>);

impl CloseFlag {
    /// Whether the sink has been closed
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Mark the sink closed; true only for the caller that performed the flip
    ///
    /// Closing through a handle is final. Later writes fail, and the sink
    /// neither writes its trailer on close nor closes the native sink.
    pub fn close(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Gzip encoder over a response's native sink, closable exactly once
pub struct GzipSink<W: Write> {
    encoder: GzEncoder<W>,
    closed: CloseFlag,
}

impl<W: RawResponse> GzipSink<W> {
    fn new(inner: W, level: u32) -> Self {
        Self {
            encoder: GzEncoder::new(inner, Compressor::level(level)),
            closed: CloseFlag::default(),
        }
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    /// Write the gzip trailer and close the native sink
    ///
    /// Only the first close does anything, whether it comes through here or
    /// through a [`CloseFlag`].
    pub fn close(&mut self) -> io::Result<()> {
        if !self.closed.close() {
            return Ok(());
        }

        self.encoder.try_finish()?;
        self.encoder.get_mut().close_output()?;
        debug!("Gzip sink closed");
        Ok(())
    }

    fn get_ref(&self) -> &W {
        self.encoder.get_ref()
    }

    fn into_inner(self) -> io::Result<W> {
        self.encoder.finish()
    }
}

impl<W: RawResponse> Write for GzipSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "gzip sink closed"));
        }
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.closed.is_closed() {
            return Ok(());
        }
        self.encoder.flush()
    }
}

impl<W: Write> fmt::Debug for GzipSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipSink")
            .field("closed", &self.closed.is_closed())
            .finish()
    }
}

/// Characters written through the text writer, not yet encoded
#[derive(Debug)]
struct TextBuffer {
    encoding: &'static Encoding,
    pending: String,
    capacity: usize,
}

impl TextBuffer {
    fn new(encoding: &'static Encoding, capacity: usize) -> Self {
        Self {
            encoding,
            pending: String::new(),
            capacity,
        }
    }

    fn push<S: Write + ?Sized>(&mut self, s: &str, sink: &mut S) -> io::Result<()> {
        self.pending.push_str(s);
        if self.pending.len() >= self.capacity {
            self.drain(sink)?;
        }
        Ok(())
    }

    fn drain<S: Write + ?Sized>(&mut self, sink: &mut S) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let bytes = charset::encode(self.encoding, &self.pending);
        sink.write_all(&bytes)?;
        self.pending.clear();
        Ok(())
    }
}

enum Output<W: RawResponse> {
    /// No output mode chosen yet
    Idle(W),
    /// Byte stream through gzip
    Stream(GzipSink<W>),
    /// Text writer through gzip
    Writer { sink: GzipSink<W>, text: TextBuffer },
    /// Byte stream straight to an already committed response
    NativeStream(W),
    /// Text writer straight to an already committed response
    NativeWriter { inner: W, text: TextBuffer },
    /// Only observable if a transition panicked
    Poisoned,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Stream,
    Writer,
}

/// A response whose body is transparently gzip-compressed
pub struct GzippedResponse<W: RawResponse> {
    output: Output<W>,
    level: u32,
    platform_charset: &'static Encoding,
    writer_buffer: usize,
}

impl<W: RawResponse> GzippedResponse<W> {
    /// Wrap `response`, declaring `Content-Encoding: gzip` on it
    pub fn new(mut response: W, config: &TranscodeConfig) -> Self {
        response.set_header(CONTENT_ENCODING, HeaderValue::from_static(GZIP_ENCODING));

        Self {
            output: Output::Idle(response),
            level: config.level,
            platform_charset: config.platform_encoding(),
            writer_buffer: config.writer_buffer.max(1),
        }
    }

    /// The byte stream for the response body
    ///
    /// Fails with [`Error::IllegalState`] if [`writer`](Self::writer) was
    /// called first.
    pub fn output_stream(&mut self) -> Result<ResponseStream<'_, W>> {
        self.activate(Mode::Stream)?;

        match &mut self.output {
            Output::Stream(sink) => Ok(ResponseStream::Gzip(sink)),
            Output::NativeStream(inner) => Ok(ResponseStream::Native(inner)),
            Output::Writer { .. } | Output::NativeWriter { .. } => Err(Error::IllegalState(WRITER_IN_USE)),
            Output::Idle(_) | Output::Poisoned => Err(Error::Internal("response output unavailable".to_string())),
        }
    }

    /// The text writer for the response body
    ///
    /// Text is encoded with the response's declared charset, or the platform
    /// charset when none is declared. Fails with [`Error::IllegalState`] if
    /// [`output_stream`](Self::output_stream) was called first.
    pub fn writer(&mut self) -> Result<ResponseWriter<'_, W>> {
        self.activate(Mode::Writer)?;

        match &mut self.output {
            Output::Writer { sink, text } => Ok(ResponseWriter {
                text,
                out: ResponseStream::Gzip(sink),
            }),
            Output::NativeWriter { inner, text } => Ok(ResponseWriter {
                text,
                out: ResponseStream::Native(inner),
            }),
            Output::Stream(_) | Output::NativeStream(_) => Err(Error::IllegalState(STREAM_IN_USE)),
            Output::Idle(_) | Output::Poisoned => Err(Error::Internal("response output unavailable".to_string())),
        }
    }

    /// Flush pending text, then the gzip sink, or the native response if no
    /// sink exists
    pub fn flush_buffer(&mut self) -> Result<()> {
        match &mut self.output {
            Output::Writer { sink, text } => {
                if !sink.is_closed() {
                    text.drain(sink)?;
                }
                sink.flush()?;
            }
            Output::Stream(sink) => sink.flush()?,
            Output::NativeWriter { inner, text } => {
                text.drain(inner)?;
                inner.flush_buffer()?;
            }
            Output::Idle(inner) | Output::NativeStream(inner) => inner.flush_buffer()?,
            Output::Poisoned => {}
        }
        Ok(())
    }

    /// Flush pending text and close the gzip sink
    ///
    /// Called once by the owner after the handler returns. Repeated calls
    /// are harmless: the sink closes only once.
    pub fn finish(&mut self) -> Result<()> {
        match &mut self.output {
            Output::Writer { sink, text } => {
                if !sink.is_closed() {
                    text.drain(sink)?;
                    sink.flush()?;
                }
                sink.close()?;
            }
            Output::Stream(sink) => sink.close()?,
            Output::NativeWriter { inner, text } => text.drain(inner)?,
            Output::Idle(_) | Output::NativeStream(_) | Output::Poisoned => {}
        }
        Ok(())
    }

    /// Whether the gzip sink exists and has been closed
    pub fn is_closed(&self) -> bool {
        self.close_flag().is_some_and(|flag| flag.is_closed())
    }

    /// Handle that observes or closes the gzip sink, once the sink exists
    pub fn close_flag(&self) -> Option<CloseFlag> {
        match &self.output {
            Output::Stream(sink) | Output::Writer { sink, .. } => Some(sink.closed.clone()),
            _ => None,
        }
    }

    /// The wrapped response
    ///
    /// `None` only after a panic during an output transition.
    pub fn inner(&self) -> Option<&W> {
        match &self.output {
            Output::Idle(inner) | Output::NativeStream(inner) | Output::NativeWriter { inner, .. } => Some(inner),
            Output::Stream(sink) | Output::Writer { sink, .. } => Some(sink.get_ref()),
            Output::Poisoned => None,
        }
    }

    /// Unwrap the response
    ///
    /// A sink that was never finished gets its gzip trailer written here,
    /// but the native sink is left open.
    pub fn into_inner(self) -> Result<W> {
        match self.output {
            Output::Idle(inner) | Output::NativeStream(inner) => Ok(inner),
            Output::NativeWriter { mut inner, mut text } => {
                text.drain(&mut inner)?;
                Ok(inner)
            }
            Output::Stream(sink) => Ok(sink.into_inner()?),
            Output::Writer { mut sink, mut text } => {
                if !sink.is_closed() {
                    text.drain(&mut sink)?;
                }
                Ok(sink.into_inner()?)
            }
            Output::Poisoned => Err(Error::Internal("response output unavailable".to_string())),
        }
    }

    fn activate(&mut self, mode: Mode) -> Result<()> {
        let encoding = match (&self.output, mode) {
            (Output::Idle(inner), Mode::Writer) => match inner.character_encoding() {
                Some(label) => charset::resolve_output(label)?,
                None => charset::for_output(self.platform_charset)?,
            },
            (Output::Idle(_), Mode::Stream) => self.platform_charset,
            (Output::Stream(_) | Output::NativeStream(_), Mode::Writer) => {
                return Err(Error::IllegalState(STREAM_IN_USE))
            }
            (Output::Writer { .. } | Output::NativeWriter { .. }, Mode::Stream) => {
                return Err(Error::IllegalState(WRITER_IN_USE))
            }
            _ => return Ok(()),
        };

        let Output::Idle(inner) = mem::replace(&mut self.output, Output::Poisoned) else {
            return Err(Error::Internal("response output unavailable".to_string()));
        };

        self.output = if inner.is_committed() {
            warn!("Response already committed, writing uncompressed output");
            match mode {
                Mode::Stream => Output::NativeStream(inner),
                Mode::Writer => Output::NativeWriter {
                    inner,
                    text: TextBuffer::new(encoding, self.writer_buffer),
                },
            }
        } else {
            debug!(level = self.level, "Gzip sink created");
            let sink = GzipSink::new(inner, self.level);
            match mode {
                Mode::Stream => Output::Stream(sink),
                Mode::Writer => Output::Writer {
                    sink,
                    text: TextBuffer::new(encoding, self.writer_buffer),
                },
            }
        };

        Ok(())
    }
}

impl<W: RawResponse> fmt::Debug for GzippedResponse<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.output {
            Output::Idle(_) => "idle",
            Output::Stream(_) => "stream",
            Output::Writer { .. } => "writer",
            Output::NativeStream(_) => "native-stream",
            Output::NativeWriter { .. } => "native-writer",
            Output::Poisoned => "poisoned",
        };
        f.debug_struct("GzippedResponse")
            .field("state", &state)
            .field("level", &self.level)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Byte output of a [`GzippedResponse`]
pub enum ResponseStream<'a, W: RawResponse> {
    /// Compressed through the gzip sink
    Gzip(&'a mut GzipSink<W>),
    /// Uncompressed, straight to a committed response
    Native(&'a mut W),
}

impl<W: RawResponse> ResponseStream<'_, W> {
    /// Whether output is going through gzip
    pub fn is_compressed(&self) -> bool {
        matches!(self, ResponseStream::Gzip(_))
    }

    fn is_closed(&self) -> bool {
        match self {
            ResponseStream::Gzip(sink) => sink.is_closed(),
            ResponseStream::Native(_) => false,
        }
    }
}

impl<W: RawResponse> Write for ResponseStream<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ResponseStream::Gzip(sink) => sink.write(buf),
            ResponseStream::Native(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ResponseStream::Gzip(sink) => sink.flush(),
            ResponseStream::Native(inner) => inner.flush(),
        }
    }
}

impl<W: RawResponse> fmt::Debug for ResponseStream<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream")
            .field("compressed", &self.is_compressed())
            .finish()
    }
}

/// Text output of a [`GzippedResponse`]
///
/// Text is buffered and encoded into the byte output when the buffer fills,
/// on [`flush`](Self::flush), or when the response is finished.
pub struct ResponseWriter<'a, W: RawResponse> {
    text: &'a mut TextBuffer,
    out: ResponseStream<'a, W>,
}

impl<W: RawResponse> ResponseWriter<'_, W> {
    /// Write a string
    pub fn write_str(&mut self, s: &str) -> io::Result<()> {
        if self.out.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "gzip sink closed"));
        }
        self.text.push(s, &mut self.out)
    }

    /// Write formatted text
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        match args.as_str() {
            Some(s) => self.write_str(s),
            None => self.write_str(&args.to_string()),
        }
    }

    /// Encode buffered text and flush the byte output
    pub fn flush(&mut self) -> io::Result<()> {
        if self.out.is_closed() {
            return Ok(());
        }
        self.text.drain(&mut self.out)?;
        self.out.flush()
    }

    /// Charset used to encode text
    pub fn encoding(&self) -> &'static Encoding {
        self.text.encoding
    }
}

impl<W: RawResponse> fmt::Write for ResponseWriter<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        ResponseWriter::write_str(self, s).map_err(|_| fmt::Error)
    }
}

impl<W: RawResponse> fmt::Debug for ResponseWriter<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("encoding", &self.text.encoding.name())
            .field("pending", &self.text.pending.len())
            .field("compressed", &self.out.is_compressed())
            .finish()
    }
}
