//! Stream reader - decodes one pipe into lines and forwards them.
//!
//! Each invocation runs two readers (stdout, stderr) as independent tasks
//! feeding the same channel, so lines land in arrival order.

use encoding_rs::{CoderResult, Encoding, UTF_8, UTF_16LE};
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::{OutputEncoding, OutputLine, StreamSource};

const READ_CHUNK: usize = 4096;

/// Bytes decoded in one step, and whether any of them were malformed
#[derive(Debug, Default, PartialEq, Eq)]
struct Decoded {
    text: String,
    malformed: bool,
}

/// Streaming decoder; sequences split across reads are carried over and a
/// leading BOM is dropped.
struct Decoder {
    inner: encoding_rs::Decoder,
    finished: bool,
}

impl Decoder {
    fn new(encoding: OutputEncoding) -> Self {
        let encoding: &'static Encoding = match encoding {
            OutputEncoding::Text => UTF_8,
            OutputEncoding::Utf16le => UTF_16LE,
        };
        Self {
            inner: encoding.new_decoder_with_bom_removal(),
            finished: false,
        }
    }

    fn decode(&mut self, bytes: &[u8]) -> Decoded {
        self.run(bytes, false)
    }

    /// Flush at end of stream; leftover bytes are an incomplete sequence.
    fn finish(&mut self) -> Decoded {
        if self.finished {
            return Decoded::default();
        }
        self.finished = true;
        self.run(&[], true)
    }

    fn run(&mut self, bytes: &[u8], last: bool) -> Decoded {
        let mut out = Decoded::default();
        let mut rest = bytes;
        loop {
            let needed = self
                .inner
                .max_utf8_buffer_length(rest.len())
                .unwrap_or(rest.len() * 3 + 4);
            out.text.reserve(needed);

            let (result, read, replaced) = self.inner.decode_to_string(rest, &mut out.text, last);
            out.malformed |= replaced;
            rest = &rest[read..];
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
        out
    }
}

/// Splits decoded text on `\n`, `\r\n` or a lone `\r`, dropping empty lines.
#[derive(Debug, Default)]
struct LineSplitter {
    buf: String,
    pending_cr: bool,
}

impl LineSplitter {
    fn push(&mut self, text: &str) -> Vec<String> {
        let mut lines = Vec::new();
        for c in text.chars() {
            if self.pending_cr {
                self.pending_cr = false;
                if c == '\n' {
                    continue;
                }
            }
            match c {
                '\n' => self.emit(&mut lines),
                '\r' => {
                    self.emit(&mut lines);
                    self.pending_cr = true;
                }
                c => self.buf.push(c),
            }
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        self.pending_cr = false;
        let line = std::mem::take(&mut self.buf);
        (!line.is_empty()).then_some(line)
    }

    fn emit(&mut self, lines: &mut Vec<String>) {
        let line = std::mem::take(&mut self.buf);
        if !line.is_empty() {
            lines.push(line);
        }
    }
}

/// Per-pipe worker that turns raw bytes into tagged lines
#[derive(Debug, Clone, Copy)]
pub struct StreamReader {
    source: StreamSource,
    encoding: OutputEncoding,
}

impl StreamReader {
    pub fn new(source: StreamSource, encoding: OutputEncoding) -> Self {
        Self { source, encoding }
    }

    /// Run on its own task; the pipe is dropped (closed) when the task ends.
    pub fn spawn<R>(
        self,
        pipe: R,
        tx: UnboundedSender<OutputLine>,
        cancel: CancellationToken,
    ) -> JoinHandle<usize>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move { self.run(pipe, tx, cancel).await })
    }

    /// Read until end of stream or cancellation. Returns the number of lines forwarded.
    pub async fn run<R>(
        self,
        mut pipe: R,
        tx: UnboundedSender<OutputLine>,
        cancel: CancellationToken,
    ) -> usize
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; READ_CHUNK];
        let mut decoder = Decoder::new(self.encoding);
        let mut splitter = LineSplitter::default();
        let mut state = ForwardState::default();

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("{:?} reader stopped by cancellation", self.source);
                    break;
                }
                read = pipe.read(&mut buf) => read,
            };

            match read {
                Ok(0) => break,
                Ok(n) => {
                    let decoded = decoder.decode(&buf[..n]);
                    if !self.forward(decoded, &mut splitter, &mut state, &tx) {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{:?} reader failed: {}", self.source, e);
                    state.send(&tx, self.diagnostic(&format!("read failed: {}", e)));
                    break;
                }
            }
        }

        let tail = decoder.finish();
        self.forward(tail, &mut splitter, &mut state, &tx);
        if let Some(line) = splitter.finish() {
            state.send(&tx, OutputLine { source: self.source, text: line });
        }

        state.forwarded
    }

    /// Push decoded text through the splitter. Returns false once the receiver is gone.
    fn forward(
        &self,
        decoded: Decoded,
        splitter: &mut LineSplitter,
        state: &mut ForwardState,
        tx: &UnboundedSender<OutputLine>,
    ) -> bool {
        for line in splitter.push(&decoded.text) {
            if !state.send(tx, OutputLine { source: self.source, text: line }) {
                return false;
            }
        }

        if decoded.malformed && !state.reported_malformed {
            state.reported_malformed = true;
            let what = match self.encoding {
                OutputEncoding::Text => "invalid text data in output (replaced)",
                OutputEncoding::Utf16le => "invalid UTF-16 data in output (replaced)",
            };
            return state.send(tx, self.diagnostic(what));
        }
        true
    }

    /// Reader failures travel on the error channel whichever pipe they came from
    fn diagnostic(&self, message: &str) -> OutputLine {
        let stream = match self.source {
            StreamSource::Stdout => "stdout",
            StreamSource::Stderr => "stderr",
        };
        OutputLine::stderr(format!("{}: {}", stream, message))
    }
}

#[derive(Debug, Default)]
struct ForwardState {
    reported_malformed: bool,
    forwarded: usize,
}

impl ForwardState {
    fn send(&mut self, tx: &UnboundedSender<OutputLine>, line: OutputLine) -> bool {
        if tx.send(line).is_err() {
            return false;
        }
        self.forwarded += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn utf16le(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    async fn read_all(
        bytes: &[u8],
        source: StreamSource,
        encoding: OutputEncoding,
    ) -> Vec<OutputLine> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        StreamReader::new(source, encoding)
            .run(bytes, tx, CancellationToken::new())
            .await;
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_utf16_hello_decodes_without_spacing() {
        let mut decoder = Decoder::new(OutputEncoding::Utf16le);
        let decoded = decoder.decode(&utf16le("Hello"));
        assert_eq!(decoded.text, "Hello");
        assert!(!decoded.malformed);
    }

    #[test]
    fn test_utf16_odd_byte_carried_to_next_read() {
        let bytes = utf16le("Hi");
        let mut decoder = Decoder::new(OutputEncoding::Utf16le);
        assert_eq!(decoder.decode(&bytes[..3]).text, "H");
        assert_eq!(decoder.decode(&bytes[3..]).text, "i");
    }

    #[test]
    fn test_utf16_split_surrogate_pair() {
        let bytes = utf16le("a😀");
        let mut decoder = Decoder::new(OutputEncoding::Utf16le);
        let first = decoder.decode(&bytes[..4]);
        assert_eq!(first.text, "a");
        let second = decoder.decode(&bytes[4..]);
        assert_eq!(second.text, "😀");
        assert!(!second.malformed);
    }

    #[test]
    fn test_utf16_lone_surrogate_is_replaced() {
        let bytes = [0x00, 0xDC, b'A', 0x00];
        let mut decoder = Decoder::new(OutputEncoding::Utf16le);
        let decoded = decoder.decode(&bytes);
        assert_eq!(decoded.text, "\u{fffd}A");
        assert!(decoded.malformed);
    }

    #[test]
    fn test_utf8_multibyte_split_across_reads() {
        let bytes = "é".as_bytes();
        let mut decoder = Decoder::new(OutputEncoding::Text);
        assert_eq!(decoder.decode(&bytes[..1]).text, "");
        assert_eq!(decoder.decode(&bytes[1..]).text, "é");
    }

    #[test]
    fn test_finish_flags_truncated_sequence() {
        let mut decoder = Decoder::new(OutputEncoding::Utf16le);
        decoder.decode(&[b'A']);
        let tail = decoder.finish();
        assert!(tail.malformed);
        assert_eq!(decoder.finish(), Decoded::default());
    }

    #[test]
    fn test_splitter_handles_all_terminators() {
        let mut splitter = LineSplitter::default();
        let lines = splitter.push("one\r\ntwo\nthree\rfour");
        assert_eq!(lines, vec!["one", "two", "three"]);
        assert_eq!(splitter.finish(), Some("four".to_string()));
    }

    #[test]
    fn test_splitter_crlf_split_across_pushes() {
        let mut splitter = LineSplitter::default();
        assert_eq!(splitter.push("line\r"), vec!["line"]);
        assert_eq!(splitter.push("\nnext\n"), vec!["next"]);
    }

    #[test]
    fn test_splitter_drops_empty_lines() {
        let mut splitter = LineSplitter::default();
        assert_eq!(splitter.push("\n\r\n\na\n\n"), vec!["a"]);
        assert_eq!(splitter.finish(), None);
    }

    #[tokio::test]
    async fn test_reader_wide_mode_single_line() {
        let bytes = utf16le("Hello\r\n");
        let lines = read_all(&bytes, StreamSource::Stdout, OutputEncoding::Utf16le).await;
        assert_eq!(lines, vec![OutputLine::stdout("Hello")]);
    }

    #[tokio::test]
    async fn test_reader_wide_mode_strips_bom() {
        let bytes = utf16le("\u{feff}Beginning system scan.\r\n");
        let lines = read_all(&bytes, StreamSource::Stdout, OutputEncoding::Utf16le).await;
        assert_eq!(lines[0].text, "Beginning system scan.");
    }

    #[tokio::test]
    async fn test_reader_text_mode_strips_bom() {
        let bytes = b"\xef\xbb\xbfDeployment Image Servicing\n";
        let lines = read_all(bytes, StreamSource::Stdout, OutputEncoding::Text).await;
        assert_eq!(lines, vec![OutputLine::stdout("Deployment Image Servicing")]);
    }

    #[test]
    fn test_bom_split_across_reads_is_dropped() {
        let bytes = utf16le("\u{feff}OK");
        let mut decoder = Decoder::new(OutputEncoding::Utf16le);
        assert_eq!(decoder.decode(&bytes[..1]).text, "");
        assert_eq!(decoder.decode(&bytes[1..]).text, "OK");
    }

    #[tokio::test]
    async fn test_reader_text_mode_tags_source() {
        let lines = read_all(b"Access denied\n", StreamSource::Stderr, OutputEncoding::Text).await;
        assert_eq!(lines, vec![OutputLine::stderr("Access denied")]);
    }

    #[tokio::test]
    async fn test_reader_reports_malformed_once_and_continues() {
        let bytes = b"ok\n\xff\xfe bad\n\xff again\n";
        let lines = read_all(bytes, StreamSource::Stdout, OutputEncoding::Text).await;
        let errors: Vec<_> = lines.iter().filter(|l| l.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].text.contains("invalid text data"));
        assert!(lines.iter().any(|l| l.text.ends_with("again")));
    }

    #[tokio::test]
    async fn test_reader_flushes_unterminated_last_line() {
        let lines = read_all(b"first\nlast", StreamSource::Stdout, OutputEncoding::Text).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].text, "last");
    }

    #[tokio::test]
    async fn test_reader_stops_when_cancelled() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_writer, pipe) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        let handle = StreamReader::new(StreamSource::Stdout, OutputEncoding::Text).spawn(
            pipe,
            tx,
            cancel.clone(),
        );
        cancel.cancel();
        let forwarded = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("reader should observe cancellation")
            .unwrap();
        assert_eq!(forwarded, 0);
    }
}
