use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use encoding_rs::{CoderResult, Decoder};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use super::copy::{copy_stream_with, CHUNK_LEN};
use super::fragment;
use super::meta::ResponseMeta;
use crate::error::FilterError;
use crate::metrics::{AggregateMetrics, RequestObservation};

/// Closing body tag, optionally followed by the closing html tag, touching
/// the end of the buffered text modulo trailing whitespace.
static CLOSING_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(</body>\s*</html>|</body>)\s*$").expect("closing-tag pattern")
});

/// Write-only filter that buffers a response body and, on flush, injects a
/// metrics fragment in front of the document's final `</body>`.
///
/// Everything written is appended to an in-memory buffer. The filter keeps
/// its own read position into that buffer: bytes between the read position
/// and the append position are pending and have not reached `output` yet.
///
/// * Ineligible content types (see [`ResponseMeta::is_rewritable`]) are
///   copied to `output` verbatim on every write.
/// * Eligible content is held until [`flush`](Write::flush), then decoded
///   with the response's current encoding, scanned, rewritten, re-encoded
///   and written to `output`.
///
/// Reading, seeking and length changes are permanently unsupported.
pub struct RewriteFilter<W: Write> {
    input: Cursor<Vec<u8>>,
    copy_buf: Vec<u8>,
    output: Option<W>,
    decoder: Option<Decoder>,
    meta: Arc<ResponseMeta>,
    observation: Arc<RequestObservation>,
    aggregate: Arc<AggregateMetrics>,
    content_length: u64,
    read_position: u64,
    disposed: bool,
}

impl<W: Write> RewriteFilter<W> {
    pub fn new(
        output: W,
        meta: Arc<ResponseMeta>,
        observation: Arc<RequestObservation>,
        aggregate: Arc<AggregateMetrics>,
    ) -> Self {
        Self {
            input: Cursor::new(Vec::new()),
            copy_buf: Vec::new(),
            output: Some(output),
            decoder: None,
            meta,
            observation,
            aggregate,
            content_length: 0,
            read_position: 0,
            disposed: false,
        }
    }

    /// Total bytes written into the filter so far.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Current position of the input buffer. Fails once disposed.
    pub fn position(&self) -> Result<u64, FilterError> {
        self.ensure_live("position")?;
        Ok(self.input.position())
    }

    /// Length of the input buffer. Fails once disposed.
    pub fn len(&self) -> Result<u64, FilterError> {
        self.ensure_live("len")?;
        Ok(self.input.get_ref().len() as u64)
    }

    pub fn is_empty(&self) -> Result<bool, FilterError> {
        self.ensure_live("is_empty")?;
        Ok(self.input.get_ref().is_empty())
    }

    pub fn can_read(&self) -> bool {
        false
    }

    pub fn can_seek(&self) -> bool {
        false
    }

    pub fn can_write(&self) -> bool {
        !self.disposed
    }

    /// Downstream sink, until the filter is disposed.
    pub fn output_mut(&mut self) -> Option<&mut W> {
        self.output.as_mut()
    }

    pub fn read_byte(&mut self) -> Result<u8, FilterError> {
        Err(FilterError::NotSupported("read_byte"))
    }

    pub fn write_byte(&mut self, _byte: u8) -> Result<(), FilterError> {
        Err(FilterError::NotSupported("write_byte"))
    }

    pub fn set_len(&mut self, _len: u64) -> Result<(), FilterError> {
        Err(FilterError::NotSupported("set_len"))
    }

    pub fn set_position(&mut self, _position: u64) -> Result<(), FilterError> {
        Err(FilterError::NotSupported("set_position"))
    }

    /// Terminal flush: emit pending content, then drain whatever partial
    /// character the decoder still holds (as U+FFFD). Nothing written after
    /// this can complete that character.
    pub fn finish(&mut self) -> Result<(), FilterError> {
        self.ensure_live("flush")?;
        self.input.flush()?;
        self.emit_pending(true)?;
        self.drain_decoder()?;
        if let Some(output) = self.output.as_mut() {
            output.flush()?;
        }
        Ok(())
    }

    /// [`finish`](Self::finish), then dispose.
    pub fn close(&mut self) -> Result<(), FilterError> {
        self.finish()?;
        self.dispose();
        Ok(())
    }

    /// Release the input buffer, decoder and downstream sink. Repeated calls
    /// are ignored; any later write or flush fails.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        debug!(
            request = self.observation.sequence_id(),
            content_length = self.content_length,
            "rewrite filter disposed"
        );
        self.disposed = true;
        self.decoder = None;
        self.input = Cursor::default();
        self.output = None;
    }

    fn ensure_live(&self, op: &'static str) -> Result<(), FilterError> {
        if self.disposed {
            return Err(FilterError::Disposed(op));
        }
        Ok(())
    }

    fn write_buffered(&mut self, buf: &[u8]) -> Result<usize, FilterError> {
        self.ensure_live("write")?;
        self.input.write_all(buf)?;
        self.content_length += buf.len() as u64;
        trace!(
            request = self.observation.sequence_id(),
            len = buf.len(),
            content_length = self.content_length,
            "buffered write"
        );
        self.emit_pending(false)?;
        Ok(buf.len())
    }

    fn flush_buffered(&mut self) -> Result<(), FilterError> {
        self.ensure_live("flush")?;
        self.input.flush()?;
        self.emit_pending(true)?;
        if let Some(output) = self.output.as_mut() {
            output.flush()?;
        }
        Ok(())
    }

    /// Move pending bytes downstream. The input position is restored to the
    /// append position whatever happens.
    fn emit_pending(&mut self, allow_terminal_scan: bool) -> Result<(), FilterError> {
        let write_position = self.input.position();
        if self.read_position == write_position {
            return Ok(());
        }

        self.input.seek(SeekFrom::Start(self.read_position))?;
        let result = self.emit_from_read_position(write_position, allow_terminal_scan);
        self.input.seek(SeekFrom::Start(write_position))?;
        result
    }

    fn emit_from_read_position(
        &mut self,
        write_position: u64,
        allow_terminal_scan: bool,
    ) -> Result<(), FilterError> {
        if !self.meta.is_rewritable() {
            let output = self.output.as_mut().ok_or(FilterError::Disposed("write"))?;
            let pending = (write_position - self.read_position) as usize;
            let want = pending.min(CHUNK_LEN);
            if self.copy_buf.len() < want {
                self.copy_buf.resize(want, 0);
            }
            let copied = copy_stream_with(&mut self.input, output, &mut self.copy_buf);
            // Bytes handed to a failing sink count as consumed.
            self.read_position = self.input.position();
            copied?;
            return Ok(());
        }

        if !allow_terminal_scan {
            return Ok(());
        }

        let encoding = self.meta.encoding();
        if self
            .decoder
            .as_ref()
            .is_some_and(|d| d.encoding() != encoding)
        {
            self.decoder = None;
        }
        let decoder = self.decoder.get_or_insert_with(|| encoding.new_decoder());

        let start = self.input.position() as usize;
        let end = write_position as usize;
        let text = decode(decoder, &self.input.get_ref()[start..end], false);
        self.input.set_position(write_position);
        // Consumed from here on, matched or not.
        self.read_position = write_position;

        let text = self.rewrite(text);

        let (bytes, _, _) = self.meta.encoding().encode(&text);
        let output = self.output.as_mut().ok_or(FilterError::Disposed("flush"))?;
        output.write_all(&bytes)?;
        Ok(())
    }

    fn drain_decoder(&mut self) -> Result<(), FilterError> {
        let Some(mut decoder) = self.decoder.take() else {
            return Ok(());
        };
        let tail = decode(&mut decoder, &[], true);
        if tail.is_empty() {
            return Ok(());
        }
        debug!(
            request = self.observation.sequence_id(),
            "incomplete trailing character replaced"
        );
        let (bytes, _, _) = self.meta.encoding().encode(&tail);
        let output = self.output.as_mut().ok_or(FilterError::Disposed("flush"))?;
        output.write_all(&bytes)?;
        Ok(())
    }

    /// Replace the last closing-tag match with a freshly generated fragment.
    fn rewrite(&self, text: String) -> String {
        let last = CLOSING_TAGS.find_iter(&text).last().map(|m| m.range());
        let Some(range) = last else {
            debug!(
                request = self.observation.sequence_id(),
                "no closing body tag in flushed content"
            );
            return text;
        };

        let matched = &text[range.clone()];
        let replacement = fragment::generate(
            matched,
            self.content_length,
            &self.observation,
            &self.aggregate,
        );
        debug!(
            request = self.observation.sequence_id(),
            uri = self.observation.source_uri(),
            offset = range.start,
            "injected metrics fragment"
        );

        let mut rewritten = String::with_capacity(text.len() - matched.len() + replacement.len());
        rewritten.push_str(&text[..range.start]);
        rewritten.push_str(&replacement);
        rewritten.push_str(&text[range.end..]);
        rewritten
    }
}

/// Run `src` through the persistent decoder. Unless `last` is set,
/// incomplete trailing sequences stay inside the decoder for the next call.
fn decode(decoder: &mut Decoder, mut src: &[u8], last: bool) -> String {
    let capacity = decoder
        .max_utf8_buffer_length(src.len())
        .unwrap_or(src.len());
    let mut text = String::with_capacity(capacity);
    loop {
        let (result, read, _) = decoder.decode_to_string(src, &mut text, last);
        src = &src[read..];
        match result {
            CoderResult::InputEmpty => return text,
            CoderResult::OutputFull => {
                let more = decoder
                    .max_utf8_buffer_length(src.len())
                    .unwrap_or(src.len())
                    .max(16);
                text.reserve(more);
            }
        }
    }
}

impl<W: Write> Write for RewriteFilter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_buffered(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_buffered()?)
    }
}

impl<W: Write> Read for RewriteFilter<W> {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(FilterError::NotSupported("read").into())
    }
}

impl<W: Write> Seek for RewriteFilter<W> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(FilterError::NotSupported("seek").into())
    }
}

impl<W: Write> Drop for RewriteFilter<W> {
    fn drop(&mut self) {
        self.dispose();
    }
}
