// Fault monitor: one per motor channel
//
// Reads the controller's raw status output and drops the shared enabled
// flag when a fault marker shows up. It never re-enables the motors and
// never writes to the channel.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::STATUS_READ_LEN;
use crate::motor::StatusStream;
use crate::shutdown::Shutdown;
use crate::state::SharedState;

/// Controller reported an emergency stop
pub const ESTOP_MARKER: &[u8] = b"a?";
/// Controller refused a command because the motor is off
pub const MOTOR_OFF_MARKER: &[u8] = b":?";

const MARKERS: [(&[u8], Fault); 2] = [
    (ESTOP_MARKER, Fault::EmergencyStop),
    (MOTOR_OFF_MARKER, Fault::CommandRejected),
];

/// Pause before reading again from a closed or failing stream
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Longest marker minus one: bytes carried between reads
const CARRY_LEN: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    EmergencyStop,
    CommandRejected,
}

/// First fault marker contained in `buf`, if any
pub fn find_fault(buf: &[u8]) -> Option<Fault> {
    MARKERS
        .iter()
        .find(|(marker, _)| buf.windows(marker.len()).any(|w| w == *marker))
        .map(|(_, fault)| *fault)
}

/// Scans a byte stream chunk by chunk, catching markers split across reads
#[derive(Debug, Default)]
pub struct FaultScanner {
    carry: Vec<u8>,
}

impl FaultScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan(&mut self, chunk: &[u8]) -> Option<Fault> {
        let mut window = std::mem::take(&mut self.carry);
        window.extend_from_slice(chunk);
        let fault = find_fault(&window);
        let keep = window.len().min(CARRY_LEN);
        self.carry = window.split_off(window.len() - keep);
        fault
    }
}

pub struct FaultMonitor {
    name: String,
    stream: Box<dyn StatusStream>,
    state: Arc<SharedState>,
    shutdown: Shutdown,
}

impl FaultMonitor {
    pub fn new(
        name: impl Into<String>,
        stream: Box<dyn StatusStream>,
        state: Arc<SharedState>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            name: name.into(),
            stream,
            state,
            shutdown,
        }
    }

    /// Blocking read loop; run it on a blocking thread
    ///
    /// Returns only when shutdown is triggered. Read timeouts are how
    /// shutdown gets noticed while the line is quiet. A closed or failing
    /// stream is retried after `READ_RETRY_DELAY` so a lost controller
    /// neither stops the monitor nor spins its thread.
    pub fn run(mut self) {
        info!("Fault monitor started on {}", self.name);
        let mut scanner = FaultScanner::new();
        let mut buf = [0u8; STATUS_READ_LEN];
        let mut failing = false;

        while !self.shutdown.is_triggered() {
            match self.stream.read_raw(&mut buf) {
                Ok(0) => {
                    if !failing {
                        error!("Status stream on {} closed, faults go unseen", self.name);
                    }
                    failing = true;
                    thread::sleep(READ_RETRY_DELAY);
                }
                Ok(n) => {
                    if failing {
                        info!("Status stream on {} recovered", self.name);
                        failing = false;
                    }
                    if let Some(fault) = scanner.scan(&buf[..n]) {
                        self.on_fault(fault);
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    // A bad read only means no marker was seen
                    if !failing {
                        error!("Status read on {} failed: {}", self.name, e);
                    } else {
                        debug!("Status read on {} failed: {}", self.name, e);
                    }
                    failing = true;
                    thread::sleep(READ_RETRY_DELAY);
                }
            }
        }
        info!("Fault monitor on {} stopped", self.name);
    }

    fn on_fault(&self, fault: Fault) {
        let was_enabled = self.state.disable_motors();
        match fault {
            Fault::EmergencyStop => error!("Emergency stop reported on {}", self.name),
            Fault::CommandRejected => {
                error!("{} rejected a command: motor is off", self.name)
            }
        }
        if was_enabled {
            warn!("Motors disabled by fault on {}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::sim::SimChannel;
    use crate::motor::MotorChannel;
    use crate::shutdown::ShutdownSignal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_find_fault_markers() {
        assert_eq!(find_fault(b"MO=1;a?;"), Some(Fault::EmergencyStop));
        assert_eq!(find_fault(b"JV=100:?"), Some(Fault::CommandRejected));
        assert_eq!(find_fault(b"JV=100;BG;"), None);
        assert_eq!(find_fault(b""), None);
    }

    #[test]
    fn test_find_fault_requires_exact_marker() {
        assert_eq!(find_fault(b"a;?"), None);
        assert_eq!(find_fault(b"A?"), None);
        assert_eq!(find_fault(b":;?"), None);
        assert_eq!(find_fault(b"a"), None);
    }

    #[test]
    fn test_scanner_catches_split_marker() {
        let mut scanner = FaultScanner::new();
        assert_eq!(scanner.scan(b"ST;MO=0;a"), None);
        assert_eq!(scanner.scan(b"?;"), Some(Fault::EmergencyStop));
    }

    #[test]
    fn test_scanner_does_not_join_unrelated_chunks() {
        let mut scanner = FaultScanner::new();
        assert_eq!(scanner.scan(b"a;"), None);
        assert_eq!(scanner.scan(b"?"), None);
    }

    fn wait_until(deadline: Duration, cond: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_monitor_disables_on_fault_and_stops_on_shutdown() {
        let channel = SimChannel::new("sim0");
        let state = Arc::new(SharedState::new());
        state.set_motors_enabled(true);
        let signal = ShutdownSignal::new();

        let monitor = FaultMonitor::new(
            "sim0",
            channel.status_stream().unwrap(),
            state.clone(),
            signal.subscribe(),
        );
        let handle = thread::spawn(move || monitor.run());

        channel.inject_status(b"PX=0;MO=1;");
        thread::sleep(Duration::from_millis(50));
        assert!(state.motors_enabled());

        channel.inject_status(b"BG:?;");
        assert!(wait_until(Duration::from_secs(2), || !state.motors_enabled()));

        signal.trigger();
        assert!(wait_until(Duration::from_secs(2), || handle.is_finished()));
        handle.join().unwrap();
    }

    #[test]
    fn test_monitor_never_reenables() {
        let channel = SimChannel::new("sim0");
        let state = Arc::new(SharedState::new());
        state.set_motors_enabled(true);
        let signal = ShutdownSignal::new();

        let monitor = FaultMonitor::new(
            "sim0",
            channel.status_stream().unwrap(),
            state.clone(),
            signal.subscribe(),
        );
        let handle = thread::spawn(move || monitor.run());

        channel.inject_status(b"a?");
        channel.inject_status(b"MO=1;");
        thread::sleep(Duration::from_millis(50));
        assert!(!state.motors_enabled());

        signal.trigger();
        handle.join().unwrap();
    }

    /// Stream that never yields data: every read fails or reports end of file
    struct DeadStream {
        reads: Arc<AtomicUsize>,
        kind: Option<io::ErrorKind>,
    }

    impl StatusStream for DeadStream {
        fn read_raw(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match self.kind {
                Some(kind) => Err(io::Error::new(kind, "device unplugged")),
                None => Ok(0),
            }
        }
    }

    fn spawn_dead(
        kind: Option<io::ErrorKind>,
    ) -> (Arc<AtomicUsize>, ShutdownSignal, thread::JoinHandle<()>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let stream = DeadStream {
            reads: reads.clone(),
            kind,
        };
        let state = Arc::new(SharedState::new());
        let signal = ShutdownSignal::new();
        let monitor = FaultMonitor::new("dead", Box::new(stream), state, signal.subscribe());
        let handle = thread::spawn(move || monitor.run());
        (reads, signal, handle)
    }

    #[test]
    fn test_monitor_backs_off_on_read_errors() {
        let (reads, signal, handle) = spawn_dead(Some(io::ErrorKind::BrokenPipe));
        thread::sleep(Duration::from_millis(250));
        signal.trigger();
        handle.join().unwrap();

        let reads = reads.load(Ordering::SeqCst);
        assert!(reads >= 1);
        assert!(reads < 10, "monitor spun on a failing stream: {} reads", reads);
    }

    #[test]
    fn test_monitor_survives_closed_stream() {
        let (reads, signal, handle) = spawn_dead(None);
        thread::sleep(Duration::from_millis(250));
        assert!(!handle.is_finished());
        assert!(reads.load(Ordering::SeqCst) < 10);

        signal.trigger();
        assert!(wait_until(Duration::from_secs(2), || handle.is_finished()));
        handle.join().unwrap();
    }
}
