//! Duplex chat session
//!
//! One sender thread turns local lines into frames; one receiver thread
//! turns frames into rendered lines. Both share the connection through
//! split `Transport` handles and are joined before the connection is
//! released. Neither cancels the other: a finished sender leaves the
//! receiver blocked until the peer closes, and a finished receiver leaves
//! the sender blocked on its line source.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::Shutdown;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use super::connection::Transport;
use crate::error::{Error, Result};
use crate::protocol::{Decoder, Encoder, MAX_PAYLOAD_LEN};

/// Receive-side buffer; a console chat rarely exceeds one frame per read.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Sentinel line that ends the sender.
pub const DEFAULT_EXIT_WORD: &str = "exit";

/// Lifecycle: `Idle → Connecting → Running → Closing → Closed`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle = 0,
    Connecting = 1,
    Running = 2,
    /// At least one activity has finished.
    Closing = 3,
    /// Both activities joined and the connection released.
    Closed = 4,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::Running,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn transition(&self, to: SessionState) {
        let from = SessionState::from_u8(self.0.swap(to as u8, Ordering::AcqRel));
        tracing::debug!(?from, ?to, "session state");
    }
}

/// Read-only view of a session's state, usable while `run` executes.
#[derive(Clone)]
pub struct StateHandle(Arc<StateCell>);

impl StateHandle {
    pub fn get(&self) -> SessionState {
        self.0.get()
    }
}

/// Per-session behavior switches.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Local line that ends the sender without sending anything.
    pub exit_word: String,
    /// Shut down the write half once the sentinel is read.
    pub half_close_on_exit: bool,
    /// Longer lines are skipped instead of sent.
    pub max_line_len: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            exit_word: DEFAULT_EXIT_WORD.to_string(),
            half_close_on_exit: false,
            max_line_len: MAX_PAYLOAD_LEN,
        }
    }
}

/// Why the sender stopped cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderExit {
    /// The exit word was typed.
    Sentinel,
    /// The line source ran dry.
    InputClosed,
}

/// Why the receiver stopped cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverExit {
    PeerClosed,
}

/// Session counters, updated by both activities.
#[derive(Default)]
pub struct SessionStats {
    frames_sent: AtomicU64,
    oversized_lines: AtomicU64,
    messages_rendered: AtomicU64,
    frames_dropped: AtomicU64,
}

impl SessionStats {
    fn new() -> Self {
        Self::default()
    }
}

/// Outcome of both activities after teardown.
#[derive(Debug)]
pub struct SessionReport {
    pub sender: Result<SenderExit>,
    pub receiver: Result<ReceiverExit>,
    pub state: SessionState,
    pub frames_sent: u64,
    pub oversized_lines: u64,
    pub messages_rendered: u64,
    pub frames_dropped: u64,
}

impl SessionReport {
    fn new(
        sender: Result<SenderExit>,
        receiver: Result<ReceiverExit>,
        state: SessionState,
        stats: &SessionStats,
    ) -> Self {
        Self {
            sender,
            receiver,
            state,
            frames_sent: stats.frames_sent.load(Ordering::Relaxed),
            oversized_lines: stats.oversized_lines.load(Ordering::Relaxed),
            messages_rendered: stats.messages_rendered.load(Ordering::Relaxed),
            frames_dropped: stats.frames_dropped.load(Ordering::Relaxed),
        }
    }

    /// True when neither activity ended with an error.
    pub fn is_clean(&self) -> bool {
        self.sender.is_ok() && self.receiver.is_ok()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.sender
            .as_ref()
            .err()
            .into_iter()
            .chain(self.receiver.as_ref().err())
    }
}

/// One client run over one connection.
pub struct Session<S> {
    stream: S,
    options: SessionOptions,
    state: Arc<StateCell>,
    stats: SessionStats,
}

impl<S: Transport> Session<S> {
    /// Connect via `factory`, then run both activities to completion.
    pub fn start<F, I, W>(
        factory: F,
        destination: &str,
        options: SessionOptions,
        input: I,
        output: W,
    ) -> Result<SessionReport>
    where
        F: FnOnce(&str) -> Result<S>,
        I: BufRead + Send,
        W: Write + Send,
    {
        Self::connect(factory, destination, options)?.run(input, output)
    }

    /// Establish the connection; a failure never reaches `Running`.
    pub fn connect<F>(factory: F, destination: &str, options: SessionOptions) -> Result<Self>
    where
        F: FnOnce(&str) -> Result<S>,
    {
        let state = Arc::new(StateCell::new(SessionState::Idle));
        state.transition(SessionState::Connecting);

        match factory(destination) {
            Ok(stream) => {
                state.transition(SessionState::Running);
                Ok(Self {
                    stream,
                    options,
                    state,
                    stats: SessionStats::new(),
                })
            }
            Err(e) => {
                state.transition(SessionState::Closed);
                Err(e)
            }
        }
    }

    /// Wrap an already established stream.
    pub fn from_stream(stream: S, options: SessionOptions) -> Self {
        Self {
            stream,
            options,
            state: Arc::new(StateCell::new(SessionState::Running)),
            stats: SessionStats::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// A handle that keeps reporting the state after `run` takes the session.
    pub fn state_handle(&self) -> StateHandle {
        StateHandle(Arc::clone(&self.state))
    }

    /// Run the sender and receiver until both finish, then release the
    /// connection.
    ///
    /// Fails only when the connection cannot be split into two handles.
    pub fn run<I, W>(self, input: I, output: W) -> Result<SessionReport>
    where
        I: BufRead + Send,
        W: Write + Send,
    {
        let Session {
            mut stream,
            options,
            state,
            stats,
        } = self;

        let writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(e) => {
                release(&stream);
                state.transition(SessionState::Closed);
                return Err(e.into());
            }
        };

        let finished = AtomicUsize::new(0);
        let on_finish = |activity: &str| {
            tracing::debug!(activity, "activity finished");
            if finished.fetch_add(1, Ordering::AcqRel) == 0 {
                state.transition(SessionState::Closing);
            }
        };

        let (options, stats, on_finish) = (&options, &stats, &on_finish);
        let reader = &mut stream;

        let (sender, receiver) = thread::scope(|scope| {
            let sender = scope.spawn(move || {
                let mut writer = writer;
                let result = send_lines(input, &mut writer, options, stats);
                if let Ok(SenderExit::Sentinel) = result {
                    if options.half_close_on_exit {
                        if let Err(e) = writer.shutdown(Shutdown::Write) {
                            tracing::warn!(error = %e, "half-close failed");
                        }
                    }
                }
                if let Err(ref e) = result {
                    tracing::error!(error = %e, "sender stopped");
                }
                on_finish("sender");
                result
            });

            let receiver = scope.spawn(move || {
                let buffered = BufReader::with_capacity(READ_BUFFER_SIZE, reader);
                let result = receive_messages(buffered, output, stats);
                if let Err(ref e) = result {
                    tracing::error!(error = %e, "receiver stopped");
                }
                on_finish("receiver");
                result
            });

            (join(sender), join(receiver))
        });

        release(&stream);
        drop(stream);
        state.transition(SessionState::Closed);

        Ok(SessionReport::new(sender, receiver, state.get(), stats))
    }
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    handle
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

/// Shut the connection down in both directions; the peer may already be gone.
fn release<S: Transport>(stream: &S) {
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        tracing::debug!(error = %e, "shutdown on release");
    }
}

/// Sender activity: frame every local line until the exit word or end of
/// input.
///
/// Lines are sent as raw bytes, so non-UTF-8 input passes through.
/// Oversized lines are skipped; a failed write ends the activity.
pub fn send_lines<I, W>(
    mut input: I,
    mut writer: W,
    options: &SessionOptions,
    stats: &SessionStats,
) -> Result<SenderExit>
where
    I: BufRead,
    W: Write,
{
    let mut encoder = Encoder::with_limit(options.max_line_len);
    let mut line = Vec::new();

    loop {
        line.clear();
        if input.read_until(b'\n', &mut line).map_err(Error::Input)? == 0 {
            break;
        }
        let text = strip_line_ending(&line);
        if text == options.exit_word.as_bytes() {
            tracing::info!("exit requested");
            return Ok(SenderExit::Sentinel);
        }

        let frame = match encoder.encode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "message too long, not sent");
                stats.oversized_lines.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        writer.write_all(frame)?;
        writer.flush()?;

        stats.frames_sent.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(bytes = frame.len(), "message sent");
    }

    Ok(SenderExit::InputClosed)
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    match line.strip_suffix(b"\n") {
        Some(line) => line.strip_suffix(b"\r").unwrap_or(line),
        None => line,
    }
}

/// Receiver activity: decode frames and render each as `[HH:MM]: body`.
///
/// Malformed frames are dropped; end of stream ends the activity cleanly.
pub fn receive_messages<R, W>(
    reader: R,
    mut output: W,
    stats: &SessionStats,
) -> Result<ReceiverExit>
where
    R: Read,
    W: Write,
{
    let mut decoder = Decoder::new(reader);

    loop {
        match decoder.next_message() {
            Ok(Some(message)) => {
                writeln!(output, "{message}")
                    .and_then(|()| output.flush())
                    .map_err(Error::Render)?;
                stats.messages_rendered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {
                tracing::info!("connection closed by the server");
                return Ok(ReceiverExit::PeerClosed);
            }
            Err(e) if !e.is_fatal() => {
                tracing::warn!(error = %e, "dropping frame");
                stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn stamped(frames: &[(u32, u32, &str)]) -> Vec<u8> {
        let mut encoder = Encoder::new();
        let mut out = Vec::new();
        for &(hours, minutes, body) in frames {
            out.extend_from_slice(encoder.encode_stamped(hours, minutes, body).unwrap());
        }
        out
    }

    fn framed(lines: &[&[u8]]) -> Vec<u8> {
        let mut encoder = Encoder::new();
        let mut out = Vec::new();
        for line in lines {
            out.extend_from_slice(encoder.encode(line).unwrap());
        }
        out
    }

    #[test]
    fn test_sentinel_writes_nothing() {
        let stats = SessionStats::new();
        let mut wire: Vec<u8> = Vec::new();

        let exit = send_lines(
            Cursor::new("exit\nnever sent\n"),
            &mut wire,
            &SessionOptions::default(),
            &stats,
        );

        assert_eq!(exit.unwrap(), SenderExit::Sentinel);
        assert!(wire.is_empty());
        assert_eq!(stats.frames_sent.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_sender_frames_each_line() {
        let stats = SessionStats::new();
        let mut wire: Vec<u8> = Vec::new();

        let exit = send_lines(
            Cursor::new("hi\r\nexit now\n"),
            &mut wire,
            &SessionOptions::default(),
            &stats,
        );

        assert_eq!(exit.unwrap(), SenderExit::InputClosed);
        assert_eq!(wire, framed(&[b"hi", b"exit now"]));
        assert_eq!(stats.frames_sent.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_sender_passes_non_utf8_line() {
        let stats = SessionStats::new();
        let mut wire: Vec<u8> = Vec::new();

        let exit = send_lines(
            Cursor::new(&b"caf\xe9\nhello\nexit\n"[..]),
            &mut wire,
            &SessionOptions::default(),
            &stats,
        );

        assert_eq!(exit.unwrap(), SenderExit::Sentinel);
        assert_eq!(wire, framed(&[b"caf\xe9", b"hello"]));
        assert_eq!(stats.frames_sent.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_sender_skips_oversized_line() {
        let options = SessionOptions {
            max_line_len: 5,
            ..SessionOptions::default()
        };
        let stats = SessionStats::new();
        let mut wire: Vec<u8> = Vec::new();

        let exit = send_lines(
            Cursor::new("hello\nway too long\nbye\nexit\n"),
            &mut wire,
            &options,
            &stats,
        );

        assert_eq!(exit.unwrap(), SenderExit::Sentinel);
        assert_eq!(wire, framed(&[b"hello", b"bye"]));
        assert_eq!(stats.frames_sent.load(Ordering::Relaxed), 2);
        assert_eq!(stats.oversized_lines.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_strip_line_ending() {
        assert_eq!(strip_line_ending(b"a\r\n"), b"a");
        assert_eq!(strip_line_ending(b"a\n"), b"a");
        assert_eq!(strip_line_ending(b"a"), b"a");
        // A bare trailing CR without LF is content.
        assert_eq!(strip_line_ending(b"a\r"), b"a\r");
    }

    #[test]
    fn test_sender_write_failure() {
        let stats = SessionStats::new();
        let err = send_lines(
            Cursor::new("hello\n"),
            BrokenPipe,
            &SessionOptions::default(),
            &stats,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn test_receiver_renders_and_skips_malformed() {
        let mut wire = stamped(&[(7, 30, "hello")]);
        let mut encoder = Encoder::new();
        wire.extend_from_slice(encoder.encode("garbage").unwrap());
        wire.extend_from_slice(&stamped(&[(8, 5, "bye")]));

        let stats = SessionStats::new();
        let mut rendered: Vec<u8> = Vec::new();
        let exit = receive_messages(&wire[..], &mut rendered, &stats).unwrap();

        assert_eq!(exit, ReceiverExit::PeerClosed);
        assert_eq!(
            String::from_utf8(rendered).unwrap(),
            "[07:30]: hello\n[08:05]: bye\n"
        );
        assert_eq!(stats.messages_rendered.load(Ordering::Relaxed), 2);
        assert_eq!(stats.frames_dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_receiver_truncated_is_fatal() {
        let mut wire = stamped(&[(1, 1, "ok")]);
        wire.extend_from_slice(&50u32.to_be_bytes());
        wire.extend_from_slice(b"0123456789");

        let stats = SessionStats::new();
        let mut rendered: Vec<u8> = Vec::new();
        let err = receive_messages(&wire[..], &mut rendered, &stats).unwrap_err();

        assert!(matches!(err, Error::TruncatedFrame { .. }));
        assert_eq!(rendered, b"[01:01]: ok\n");
    }

    #[test]
    fn test_connect_failure_never_runs() {
        let result = Session::<std::net::TcpStream>::connect(
            |dest| Err(Error::Resolve(dest.to_string())),
            "nowhere",
            SessionOptions::default(),
        );
        assert!(matches!(result, Err(Error::Resolve(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_over_socket_pair() {
        use std::os::unix::net::UnixStream;

        let (client, peer) = UnixStream::pair().unwrap();

        let peer_thread = thread::spawn(move || {
            let mut decoder = Decoder::new(&peer);
            let sent = decoder.next_payload().unwrap().unwrap().to_vec();
            (&peer)
                .write_all(&stamped(&[(9, 15, "welcome")]))
                .unwrap();
            sent
        });

        let session = Session::from_stream(client, SessionOptions::default());
        assert_eq!(session.state(), SessionState::Running);

        let mut rendered: Vec<u8> = Vec::new();
        let report = session
            .run(Cursor::new("hello\nexit\n"), &mut rendered)
            .unwrap();

        assert_eq!(peer_thread.join().unwrap(), b"hello");
        assert_eq!(rendered, b"[09:15]: welcome\n");
        assert!(report.is_clean());
        assert_eq!(report.sender.unwrap(), SenderExit::Sentinel);
        assert_eq!(report.receiver.unwrap(), ReceiverExit::PeerClosed);
        assert_eq!(report.state, SessionState::Closed);
        assert_eq!(report.frames_sent, 1);
        assert_eq!(report.messages_rendered, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_state_handle_tracks_teardown() {
        use std::os::unix::net::UnixStream;
        use std::time::{Duration, Instant};

        let (client, peer) = UnixStream::pair().unwrap();

        let session = Session::from_stream(client, SessionOptions::default());
        let handle = session.state_handle();
        assert_eq!(handle.get(), SessionState::Running);

        let runner =
            thread::spawn(move || session.run(Cursor::new("exit\n"), Vec::<u8>::new()));

        // Sender is done; the receiver stays blocked while the peer is open.
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.get() != SessionState::Closing && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handle.get(), SessionState::Closing);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(handle.get(), SessionState::Closing);
        assert!(!runner.is_finished());

        drop(peer);
        let report = runner.join().unwrap().unwrap();

        assert_eq!(handle.get(), SessionState::Closed);
        assert_eq!(report.state, SessionState::Closed);
        assert_eq!(report.sender.unwrap(), SenderExit::Sentinel);
        assert_eq!(report.receiver.unwrap(), ReceiverExit::PeerClosed);
    }
}
