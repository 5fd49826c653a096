// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a scripted in-memory socket and log capture

use crate::{
    features::Sockopt,
    socket::{RecvSlot, Socket},
};
use core::ffi::c_int;
use parking_lot::Mutex;
use std::{
    collections::{HashSet, VecDeque},
    io,
    net::SocketAddr,
    sync::Arc,
};

pub fn init_tracing() {
    if cfg!(any(miri, fuzzing)) {
        return;
    }

    use std::sync::Once;

    static TRACING: Once = Once::new();

    // make sure this only gets initialized once
    TRACING.call_once(|| {
        let format = tracing_subscriber::fmt::format()
            .with_timer(tracing_subscriber::fmt::time::Uptime::default())
            .compact();

        let default_level = if cfg!(debug_assertions) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        };

        let env_filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(default_level.into())
            .with_env_var("QUIC_IO_LOG")
            .from_env_lossy();

        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .event_format(format)
            .with_test_writer()
            .try_init();
    });
}

/// A datagram delivered by [`Scripted`]
#[derive(Clone, Debug)]
pub struct Datagram {
    pub remote: SocketAddr,
    pub payload: Vec<u8>,
    /// Encoded control messages, as the kernel would write them
    pub control: Vec<u8>,
}

impl Datagram {
    pub fn new(remote: SocketAddr, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            remote,
            payload: payload.into(),
            control: vec![],
        }
    }

    pub fn with_control(mut self, control: Vec<u8>) -> Self {
        self.control = control;
        self
    }
}

/// A datagram passed to [`Socket::send_msg`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sent {
    pub payload: Vec<u8>,
    pub remote: SocketAddr,
    pub control: Vec<u8>,
}

#[derive(Debug)]
enum Step {
    Recv(VecDeque<Datagram>),
    Error(io::ErrorKind),
}

#[derive(Debug, Default)]
struct State {
    script: VecDeque<Step>,
    rejected: HashSet<Sockopt>,
    options: Vec<(Sockopt, c_int)>,
    sent: Vec<Sent>,
    recv_calls: usize,
}

/// An in-memory socket that replays a script of receive results
///
/// Each `recv_batch` call consumes one scripted step. Datagrams that do not
/// fit in the provided slots stay queued for the next call. Once the script
/// is exhausted the socket reports that it was closed.
#[derive(Debug)]
pub struct Scripted {
    local_addr: SocketAddr,
    state: Mutex<State>,
}

impl Scripted {
    pub fn new(local_addr: SocketAddr) -> Self {
        Self {
            local_addr,
            state: Default::default(),
        }
    }

    /// Queues a receive call that delivers a single datagram
    pub fn push(&self, datagram: Datagram) {
        self.push_batch(vec![datagram]);
    }

    /// Queues a receive call that delivers all of `datagrams`
    pub fn push_batch(&self, datagrams: Vec<Datagram>) {
        self.state
            .lock()
            .script
            .push_back(Step::Recv(datagrams.into()));
    }

    /// Queues a receive call that fails
    pub fn push_error(&self, kind: io::ErrorKind) {
        self.state.lock().script.push_back(Step::Error(kind));
    }

    /// Makes setting `option` fail
    pub fn reject(&self, option: Sockopt) {
        self.state.lock().rejected.insert(option);
    }

    /// Values written to `option`, in order
    pub fn option_writes(&self, option: Sockopt) -> Vec<c_int> {
        self.state
            .lock()
            .options
            .iter()
            .filter(|(o, _)| *o == option)
            .map(|(_, value)| *value)
            .collect()
    }

    pub fn recv_calls(&self) -> usize {
        self.state.lock().recv_calls
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.state.lock().sent.clone()
    }
}

impl Socket for Scripted {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }

    fn recv_batch(&self, slots: &mut [RecvSlot]) -> io::Result<usize> {
        let mut state = self.state.lock();
        state.recv_calls += 1;

        let mut datagrams = match state.script.pop_front() {
            None => return Ok(0),
            Some(Step::Error(kind)) => return Err(kind.into()),
            Some(Step::Recv(datagrams)) => datagrams,
        };

        let mut count = 0;
        for slot in slots.iter_mut() {
            let Some(datagram) = datagrams.pop_front() else {
                break;
            };

            let (payload, control) = slot.parts_mut();
            let payload_len = datagram.payload.len().min(payload.len());
            payload[..payload_len].copy_from_slice(&datagram.payload[..payload_len]);
            let control_len = datagram.control.len().min(control.len());
            control[..control_len].copy_from_slice(&datagram.control[..control_len]);

            slot.complete(payload_len, datagram.remote, control_len);
            if payload_len < datagram.payload.len() {
                slot.mark_truncated();
            }
            count += 1;
        }

        if !datagrams.is_empty() {
            state.script.push_front(Step::Recv(datagrams));
        }

        Ok(count)
    }

    fn send_msg(&self, payload: &[u8], remote: &SocketAddr, control: &[u8]) -> io::Result<usize> {
        self.state.lock().sent.push(Sent {
            payload: payload.to_vec(),
            remote: *remote,
            control: control.to_vec(),
        });
        Ok(payload.len())
    }

    fn set_option(&self, option: Sockopt, value: c_int) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.rejected.contains(&option) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "option rejected by script",
            ));
        }
        state.options.push((option, value));
        Ok(())
    }

    fn get_option(&self, option: Sockopt) -> io::Result<c_int> {
        let state = self.state.lock();
        Ok(state
            .options
            .iter()
            .rev()
            .find(|(o, _)| *o == option)
            .map_or(0, |(_, value)| *value))
    }
}

/// A `tracing-subscriber` writer that keeps formatted events in memory
#[derive(Clone, Debug, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Installs a subscriber writing into the capture for the duration of `f`
    pub fn capture<F: FnOnce() -> R, R>(&self, f: F) -> R {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(String::from)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
