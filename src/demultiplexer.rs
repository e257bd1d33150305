//! Client-side connection demultiplexer.
//!
//! Lets any number of application threads issue requests over one TCP
//! connection, each blocking only on its own response. Every `send`
//! allocates a fresh tag, registers a one-shot wakeup channel under that
//! tag, writes the frame (serialized with the send lock), and parks on the
//! channel. A single background reader thread routes each incoming frame
//! to exactly the waiter registered for its tag, so a long-blocking request
//! never holds up the others.
//!
//! A socket failure is sticky: the reader records it, wakes every pending
//! waiter with it, and all later sends fail fast.

use crate::errors::DemuxError;
use crate::protocol;

use std::collections::HashMap;
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;

struct DemuxState {
    next_tag: i32,
    pending: HashMap<i32, SyncSender<Result<Vec<u8>, DemuxError>>>,
    failure: Option<String>,
}

/// Tag-demultiplexed request pipe over one TCP connection.
pub struct Demultiplexer {
    socket: TcpStream,
    writer: Mutex<TcpStream>,
    state: Arc<Mutex<DemuxState>>,
}

impl Demultiplexer {
    /// Wraps a connected socket and starts the background reader thread.
    pub fn new(socket: TcpStream) -> Result<Self, DemuxError> {
        let writer = socket.try_clone()?;
        let reader = socket.try_clone()?;

        let state = Arc::new(Mutex::new(DemuxState {
            next_tag: 0,
            pending: HashMap::new(),
            failure: None,
        }));

        {
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name("demux-reader".into())
                .spawn(move || reader_loop(reader, state))
                .map_err(DemuxError::Io)?;
        }

        Ok(Demultiplexer {
            socket,
            writer: Mutex::new(writer),
            state,
        })
    }

    /// Sends one request body and blocks until its response body arrives.
    ///
    /// Concurrent callers are serialized only while the frame bytes go out;
    /// they wait independently afterwards and may complete in any order.
    pub fn send(&self, body: &[u8]) -> Result<Vec<u8>, DemuxError> {
        let (tx, rx) = sync_channel(1);

        let tag = {
            let mut state = self.lock_state();
            if let Some(reason) = &state.failure {
                return Err(DemuxError::ConnectionFailed(reason.clone()));
            }
            let tag = state.next_tag;
            state.next_tag = state.next_tag.wrapping_add(1);
            // Tags recycle only after their entry is removed; a collision
            // would mean 2^32 requests still in flight.
            debug_assert!(!state.pending.contains_key(&tag));
            state.pending.insert(tag, tx);
            tag
        };

        let write_result = {
            let mut writer = match self.writer.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            protocol::write_frame(&mut *writer, tag, body)
        };
        if let Err(e) = write_result {
            self.lock_state().pending.remove(&tag);
            return Err(DemuxError::ConnectionFailed(e.to_string()));
        }

        // The reader removes the entry when it delivers; a dropped sender
        // (reader died without recording a failure) surfaces as an error.
        match rx.recv() {
            Ok(result) => result,
            Err(_) => Err(DemuxError::Disconnected),
        }
    }

    /// Shuts the socket down, failing every pending and future call.
    pub fn close(&self) {
        let _ = self.socket.shutdown(Shutdown::Both);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, DemuxState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for Demultiplexer {
    fn drop(&mut self) {
        self.close();
    }
}

fn reader_loop(mut socket: TcpStream, state: Arc<Mutex<DemuxState>>) {
    let error = loop {
        match protocol::read_frame(&mut socket) {
            Ok(Some((tag, body))) => {
                let entry = {
                    let mut state = match state.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    state.pending.remove(&tag)
                };
                match entry {
                    // Wake exactly the caller that sent this tag.
                    Some(tx) => {
                        let _ = tx.send(Ok(body));
                    }
                    None => log::warn!("Response for unknown tag {} dropped", tag),
                }
            }
            Ok(None) => break "connection closed by server".to_string(),
            Err(e) => break e.to_string(),
        }
    };

    // Socket is gone: record the failure and wake everyone still waiting.
    let mut state = match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    log::debug!("Demux reader exiting: {}", error);
    state.failure = Some(error.clone());
    for (_, tx) in state.pending.drain() {
        let _ = tx.send(Err(DemuxError::ConnectionFailed(error.clone())));
    }
}
