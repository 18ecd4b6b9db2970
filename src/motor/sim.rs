//! In-memory motor channel for running the runtime without hardware.
//!
//! [`SimChannel`] records every command it receives and can be told to fail
//! specific operations, which is how tests exercise the init/kill policies.
//! Bytes pushed with [`SimChannel::inject_status`] come out of its status
//! stream, so fault markers can be simulated too.
//!
//! Clones share state: keep one clone for inspection and hand the other to
//! the runtime.

use std::collections::HashSet;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::channel::{ChannelError, MotorChannel, Result, StatusStream};

/// How long a simulated status read blocks before reporting a timeout
const SIM_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Operations of the [`MotorChannel`] contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Stop,
    SetMode,
    SetEncoder,
    Toggle,
    SetVelocity,
}

/// A recorded call and its argument
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotorCall {
    Stop,
    SetMode(i32),
    SetEncoder(i32),
    Toggle(bool),
    SetVelocity(f64),
}

impl MotorCall {
    pub fn operation(&self) -> Operation {
        match self {
            MotorCall::Stop => Operation::Stop,
            MotorCall::SetMode(_) => Operation::SetMode,
            MotorCall::SetEncoder(_) => Operation::SetEncoder,
            MotorCall::Toggle(_) => Operation::Toggle,
            MotorCall::SetVelocity(_) => Operation::SetVelocity,
        }
    }
}

#[derive(Default)]
struct SimState {
    calls: Vec<MotorCall>,
    failing: HashSet<Operation>,
    energized: bool,
    velocity: f64,
}

#[derive(Clone)]
pub struct SimChannel {
    name: String,
    state: Arc<Mutex<SimState>>,
    status_tx: Sender<Vec<u8>>,
    status_rx: Arc<Mutex<Option<Receiver<Vec<u8>>>>>,
}

impl SimChannel {
    pub fn new(name: impl Into<String>) -> Self {
        let (status_tx, status_rx) = mpsc::channel();
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(SimState::default())),
            status_tx,
            status_rx: Arc::new(Mutex::new(Some(status_rx))),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every future call of `op` report failure (the call is still recorded)
    pub fn fail(&self, op: Operation) {
        self.state().failing.insert(op);
    }

    /// Undo all injected failures
    pub fn heal(&self) {
        self.state().failing.clear();
    }

    /// Push raw bytes onto the status stream
    pub fn inject_status(&self, bytes: &[u8]) {
        // The receiver only goes away once the stream is dropped
        let _ = self.status_tx.send(bytes.to_vec());
    }

    pub fn calls(&self) -> Vec<MotorCall> {
        self.state().calls.clone()
    }

    pub fn count(&self, op: Operation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.operation() == op)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Whether the last successful toggle energized the motor
    pub fn is_energized(&self) -> bool {
        self.state().energized
    }

    /// Last velocity accepted by the channel
    pub fn velocity(&self) -> f64 {
        self.state().velocity
    }

    fn record(&self, call: MotorCall) -> Result<()> {
        let mut state = self.state();
        state.calls.push(call);
        if state.failing.contains(&call.operation()) {
            return Err(ChannelError::Rejected {
                channel: self.name.clone(),
                command: format!("{:?}", call),
            });
        }
        match call {
            MotorCall::Stop => state.velocity = 0.0,
            MotorCall::Toggle(on) => state.energized = on,
            MotorCall::SetVelocity(value) => state.velocity = value,
            MotorCall::SetMode(_) | MotorCall::SetEncoder(_) => {}
        }
        Ok(())
    }
}

impl MotorChannel for SimChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop_motor(&mut self) -> Result<()> {
        self.record(MotorCall::Stop)
    }

    fn set_mode(&mut self, mode: i32) -> Result<()> {
        self.record(MotorCall::SetMode(mode))
    }

    fn set_encoder(&mut self, value: i32) -> Result<()> {
        self.record(MotorCall::SetEncoder(value))
    }

    fn toggle_motor(&mut self, enable: bool) -> Result<()> {
        self.record(MotorCall::Toggle(enable))
    }

    fn set_velocity(&mut self, value: f64) -> Result<()> {
        self.record(MotorCall::SetVelocity(value))
    }

    /// The stream can be taken once
    fn status_stream(&self) -> Result<Box<dyn StatusStream>> {
        let rx = self
            .status_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| ChannelError::StatusUnavailable {
                channel: self.name.clone(),
            })?;
        Ok(Box::new(SimStatusStream {
            rx,
            pending: Vec::new(),
        }))
    }
}

struct SimStatusStream {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl StatusStream for SimStatusStream {
    fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(SIM_READ_TIMEOUT) {
                Ok(bytes) => self.pending = bytes,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no status data"));
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_calls_in_order() {
        let mut ch = SimChannel::new("sim0");
        ch.stop_motor().unwrap();
        ch.set_mode(5).unwrap();
        ch.toggle_motor(true).unwrap();
        assert_eq!(
            ch.calls(),
            vec![MotorCall::Stop, MotorCall::SetMode(5), MotorCall::Toggle(true)]
        );
        assert!(ch.is_energized());
    }

    #[test]
    fn test_injected_failure_is_recorded_and_reported() {
        let mut ch = SimChannel::new("sim0");
        ch.fail(Operation::SetVelocity);
        assert!(ch.set_velocity(10.0).is_err());
        assert_eq!(ch.count(Operation::SetVelocity), 1);
        assert_eq!(ch.velocity(), 0.0);

        ch.heal();
        ch.set_velocity(10.0).unwrap();
        assert_eq!(ch.velocity(), 10.0);
    }

    #[test]
    fn test_status_stream_splits_large_chunks() {
        let ch = SimChannel::new("sim0");
        let mut stream = ch.status_stream().unwrap();
        ch.inject_status(b"abcdef");

        let mut buf = [0u8; 4];
        assert_eq!(stream.read_raw(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(stream.read_raw(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn test_status_stream_times_out_when_idle() {
        let ch = SimChannel::new("sim0");
        let mut stream = ch.status_stream().unwrap();
        let mut buf = [0u8; 4];
        let err = stream.read_raw(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_status_stream_taken_once() {
        let ch = SimChannel::new("sim0");
        let _stream = ch.status_stream().unwrap();
        assert!(matches!(
            ch.status_stream(),
            Err(ChannelError::StatusUnavailable { .. })
        ));
    }
}
