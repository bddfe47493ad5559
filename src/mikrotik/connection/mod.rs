// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Multiplexed RouterOS API session
//!
//! A [`Session`] is a cheap handle to a task that owns the transport. The
//! task is the only reader of the stream and the only writer of the pending
//! request map; callers send it tagged requests over a channel and wait on a
//! oneshot for their own tag. Encoded requests go to a separate writer task,
//! so a slow write never holds up reading.
//!
//! ```text
//! query ─┐                         ┌─► mpsc<Bytes> ─► writer task
//! query ─┼─► mpsc<Command> ─► task ┤
//! query ─┘   oneshot ◄── route ◄───┴── read + frame
//! ```

mod aggregate;
mod auth;
mod framer;
mod parse;
mod protocol;
mod state;
mod writer;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{ApiError, Result};

use super::observer::{Observers, SessionObserver};
use super::types::{AttributeMap, IndexedResult, Sentence, Tag};
use aggregate::{ReplySender, ResponseAggregator};
use writer::{FrameSender, spawn_writer_task};

pub use auth::{LoginMethod, challenge_response};
pub use framer::SentenceFramer;
pub use parse::index_by_id_or_tag;
pub(crate) use parse::parse_attributes;
pub use protocol::{
    DEFAULT_MAX_INBOUND_WORD_LEN, MAX_WORD_LEN, decode_length, decode_word, encode_length,
    encode_word,
};
pub use state::{CloseReason, RequestOutcome, SessionState, TagSequence};

/// Size of a single transport read
const READ_CHUNK: usize = 4096;

enum Command {
    Send {
        tag: Tag,
        words: Vec<String>,
        reply: ReplySender,
    },
    Cancel(Tag),
    Close(CloseReason),
}

/// Options for [`Session::with_options`]
#[derive(Clone)]
pub struct SessionOptions {
    /// Tag sequence, shared with earlier sessions to keep tags monotonic
    pub tags: TagSequence,
    /// Event hook, none by default
    pub observer: Option<Arc<dyn SessionObserver>>,
    /// Largest inbound word accepted before the stream is treated as corrupt
    pub max_word_len: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            tags: TagSequence::new(),
            observer: None,
            max_word_len: DEFAULT_MAX_INBOUND_WORD_LEN,
        }
    }
}

/// Handle to a RouterOS API session
///
/// Clones share the same connection. Any number of queries may be in flight
/// at once; each gets its own tag and completes independently.
#[derive(Clone)]
pub struct Session {
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<watch::Sender<SessionState>>,
    tags: TagSequence,
}

impl Session {
    /// Starts a session over a connected stream
    ///
    /// Must be called within a tokio runtime. The session starts in
    /// `Connecting` and only accepts queries after [`Session::login`].
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_options(stream, SessionOptions::default())
    }

    pub fn with_options<S>(stream: S, options: SessionOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (commands, rx) = mpsc::unbounded_channel();
        let state = Arc::new(watch::Sender::new(SessionState::Connecting));
        let observer = options
            .observer
            .unwrap_or_else(|| Arc::new(Observers::new()));
        let (reader, writer) = tokio::io::split(stream);
        let (frames, writer_task) = spawn_writer_task(writer);

        let task = SessionTask {
            reader,
            frames,
            writer_task,
            commands: rx,
            framer: SentenceFramer::with_max_word_len(options.max_word_len),
            aggregator: ResponseAggregator::new(observer.clone()),
            observer,
            state: state.clone(),
        };
        tokio::spawn(task.run());

        Self {
            commands,
            state,
            tags: options.tags,
        }
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Waits until the session is closed and returns why
    pub async fn closed(&self) -> CloseReason {
        let mut rx = self.state.subscribe();
        let state = rx.wait_for(SessionState::is_closed).await.map(|s| s.clone());
        match state {
            Ok(SessionState::Closed(reason)) => reason,
            _ => CloseReason::Local,
        }
    }

    /// Sends a command and waits for its indexed result
    ///
    /// # Errors
    ///
    /// - `ApiError::Trap` if the router rejected this command
    /// - `ApiError::Fatal` / `ApiError::Io` / `ApiError::ProtocolCorruption`
    ///   if the connection failed while waiting
    /// - `ApiError::ConnectionClosed` if the session is already closed
    /// - `ApiError::InvalidArgument` for an empty word list
    /// - `ApiError::InvalidState` before login has completed
    pub async fn query<W: AsRef<str>>(&self, words: &[W]) -> Result<IndexedResult> {
        self.query_rows(words).await.map(index_by_id_or_tag)
    }

    /// Like [`Session::query`], returning every row in arrival order
    ///
    /// # Errors
    ///
    /// Same as [`Session::query`].
    pub async fn query_rows<W: AsRef<str>>(&self, words: &[W]) -> Result<Vec<AttributeMap>> {
        self.request(words, &SessionState::Ready).await
    }

    /// Like [`Session::query`], failing with `ApiError::Timeout` after `limit`
    ///
    /// The abandoned tag is removed from the pending map; a late reply for it
    /// is dropped.
    ///
    /// # Errors
    ///
    /// Same as [`Session::query`], plus `ApiError::Timeout`.
    pub async fn query_timeout<W: AsRef<str>>(
        &self,
        words: &[W],
        limit: Duration,
    ) -> Result<IndexedResult> {
        tokio::time::timeout(limit, self.query(words))
            .await
            .map_err(|_| ApiError::Timeout(limit))?
    }

    /// Closes the session, failing any pending requests
    pub async fn close(&self) {
        self.close_with(CloseReason::Local);
        self.closed().await;
    }

    /// Asks the task to close; the state changes once it has shut down
    fn close_with(&self, reason: CloseReason) {
        if self.commands.send(Command::Close(reason)).is_err() {
            tracing::trace!("Session task already gone");
        }
    }

    /// Moves `from → to`, failing if the session is elsewhere
    fn advance(&self, from: &SessionState, to: SessionState) -> Result<()> {
        let mut actual = None;
        let moved = self.state.send_if_modified(|current| {
            if *current == *from {
                *current = to;
                true
            } else {
                actual = Some(current.clone());
                false
            }
        });
        if moved {
            return Ok(());
        }
        match actual {
            Some(SessionState::Closed(_)) | None => Err(ApiError::ConnectionClosed),
            Some(other) => Err(ApiError::InvalidState(other)),
        }
    }

    async fn request<W: AsRef<str>>(
        &self,
        words: &[W],
        required: &SessionState,
    ) -> Result<Vec<AttributeMap>> {
        if words.is_empty() {
            return Err(ApiError::InvalidArgument(
                "a sentence needs at least one word".to_string(),
            ));
        }
        {
            let current = self.state.borrow();
            if current.is_closed() {
                return Err(ApiError::ConnectionClosed);
            }
            if *current != *required {
                return Err(ApiError::InvalidState(current.clone()));
            }
        }

        let tag = self.tags.next_tag();
        let mut words: Vec<String> = words.iter().map(|w| w.as_ref().to_string()).collect();
        words.push(format!(".tag={tag}"));

        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Send { tag, words, reply })
            .map_err(|_| ApiError::ConnectionClosed)?;

        let guard = CancelGuard {
            tag,
            commands: self.commands.clone(),
            armed: true,
        };
        let result = rx.await.unwrap_or(Err(ApiError::ConnectionClosed));
        guard.disarm();
        result
    }
}

/// Deregisters a tag if its caller stops waiting before the reply arrives
struct CancelGuard {
    tag: Tag,
    commands: mpsc::UnboundedSender<Command>,
    armed: bool,
}

impl CancelGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed && self.commands.send(Command::Cancel(self.tag)).is_err() {
            tracing::trace!(tag = self.tag, "Session task already gone");
        }
    }
}

/// Owner of the read half and the pending request map
///
/// Writes go through the writer task so the read arm never waits on them.
struct SessionTask<S> {
    reader: ReadHalf<S>,
    frames: FrameSender,
    writer_task: JoinHandle<std::io::Result<()>>,
    commands: mpsc::UnboundedReceiver<Command>,
    framer: SentenceFramer,
    aggregator: ResponseAggregator,
    observer: Arc<dyn SessionObserver>,
    state: Arc<watch::Sender<SessionState>>,
}

impl<S> SessionTask<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn run(mut self) {
        let mut chunk = vec![0u8; READ_CHUNK];
        let (reason, err) = loop {
            tokio::select! {
                // commands first, so a cancel or close beats a reply already buffered
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Send { tag, words, reply }) => {
                        if let Some(closing) = self.send(tag, words, reply) {
                            break closing;
                        }
                    }
                    Some(Command::Cancel(tag)) => {
                        self.aggregator.cancel(tag);
                    }
                    Some(Command::Close(reason)) => break (reason, ApiError::ConnectionClosed),
                    // every handle dropped
                    None => break (CloseReason::Local, ApiError::ConnectionClosed),
                },
                read = self.reader.read(&mut chunk) => match read {
                    Ok(0) => {
                        let err = std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "connection closed by router",
                        );
                        break (CloseReason::Transport(err.to_string()), err.into());
                    }
                    Ok(n) => {
                        if let Some(closing) = self.dispatch_inbound(&chunk[..n]) {
                            break closing;
                        }
                    }
                    Err(e) => break (CloseReason::Transport(e.to_string()), e.into()),
                },
                written = &mut self.writer_task => {
                    let err = match written {
                        Ok(Err(e)) => e,
                        Ok(Ok(())) => std::io::Error::other("writer stopped"),
                        Err(e) => std::io::Error::other(e.to_string()),
                    };
                    tracing::warn!("Write to RouterOS failed: {}", err);
                    break (CloseReason::Transport(err.to_string()), err.into());
                }
            }
        };
        self.shutdown(reason, err);
    }

    /// Feeds received bytes and routes every complete sentence
    fn dispatch_inbound(&mut self, bytes: &[u8]) -> Option<(CloseReason, ApiError)> {
        self.framer.feed(bytes);
        loop {
            match self.framer.next_sentence() {
                Ok(Some(sentence)) => {
                    if let Some(err) = self.aggregator.handle(&sentence) {
                        let message = match &err {
                            ApiError::Fatal(message) => message.clone(),
                            other => other.to_string(),
                        };
                        tracing::warn!("RouterOS closed the session: {}", message);
                        return Some((CloseReason::Fatal(message), err));
                    }
                }
                Ok(None) => return None,
                Err(err) => {
                    tracing::warn!("Undecodable data from RouterOS: {}", err);
                    return Some((CloseReason::Corruption(err.to_string()), err));
                }
            }
        }
    }

    /// Registers the request and queues its frame for the writer task
    fn send(
        &mut self,
        tag: Tag,
        words: Vec<String>,
        reply: ReplySender,
    ) -> Option<(CloseReason, ApiError)> {
        let frame = match Sentence::from_words(&words).to_bytes() {
            Ok(frame) => frame,
            Err(err) => {
                // only this request is affected
                if reply.send(Err(err)).is_err() {
                    tracing::trace!(tag, "Waiter already gone");
                }
                return None;
            }
        };
        if reply.is_closed() {
            tracing::trace!(tag, "Caller gone before send, skipping");
            return None;
        }

        self.aggregator.register(tag, reply);
        self.observer.request_sent(tag, &words);
        if self.frames.send(frame).is_err() {
            let err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "writer task gone");
            return Some((CloseReason::Transport(err.to_string()), err.into()));
        }
        None
    }

    fn shutdown(mut self, reason: CloseReason, err: ApiError) {
        // refuse new commands before failing the ones already taken
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Send { tag, reply, .. } = command
                && reply.send(Err(ApiError::ConnectionClosed)).is_err()
            {
                tracing::trace!(tag, "Waiter already gone");
            }
        }
        tracing::trace!(pending = self.aggregator.pending_len(), "Shutting down session");
        self.aggregator.fail_all(&err);

        tracing::debug!("Session closed: {}", reason);
        self.observer.session_closed(&reason);
        // a local close lets queued frames drain before the writer shuts the transport
        if reason != CloseReason::Local {
            self.writer_task.abort();
        }
        drop(self.frames);

        self.state.send_if_modified(|current| {
            if current.is_closed() {
                false
            } else {
                *current = SessionState::Closed(reason);
                true
            }
        });
    }
}
