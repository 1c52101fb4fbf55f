//! In-memory port for testing the device link without hardware.
//!
//! A [`MockPortOpener`] hands out [`MockPort`]s that all share one
//! [`MockPortHandle`]; tests push controller input and inspect what the
//! bridge wrote back through that handle.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{LinePort, PortOpener};

/// Shared state behind every port a [`MockPortOpener`] opens.
#[derive(Debug, Default)]
pub struct MockPortHandle {
    input: Mutex<VecDeque<u8>>,
    written: Mutex<Vec<u8>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    write_delay: Mutex<Duration>,
}

impl MockPortHandle {
    /// Queues bytes as if the controller had sent them.
    pub fn push_input(&self, data: &str) {
        self.input.lock().unwrap().extend(data.as_bytes());
    }

    /// Everything written so far, split into newline-terminated lines.
    pub fn written_lines(&self) -> Vec<String> {
        let written = self.written.lock().unwrap();
        String::from_utf8_lossy(&written)
            .split_terminator('\n')
            .map(str::to_string)
            .collect()
    }

    pub fn clear_written(&self) {
        self.written.lock().unwrap().clear();
    }

    pub fn set_read_failure(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_write_failure(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every write block the calling thread for `delay`, like a slow
    /// serial line.
    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = delay;
    }
}

pub struct MockPort {
    handle: Arc<MockPortHandle>,
}

impl LinePort for MockPort {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        if self.handle.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock read failure"));
        }
        let pending = self.handle.input.lock().unwrap().len();
        Ok(u32::try_from(pending).unwrap_or(u32::MAX))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.handle.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock read failure"));
        }
        let mut input = self.handle.input.lock().unwrap();
        let n = buf.len().min(input.len());
        for (slot, byte) in buf.iter_mut().zip(input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if self.handle.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        let delay = *self.handle.write_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.handle.written.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct MockPortOpener {
    handle: Arc<MockPortHandle>,
    exists: AtomicBool,
    fail_open: AtomicBool,
    opens: AtomicUsize,
    attempts: Mutex<Vec<Instant>>,
}

impl MockPortOpener {
    /// An opener whose device node exists and opens successfully.
    pub fn new() -> Self {
        Self {
            handle: Arc::new(MockPortHandle::default()),
            exists: AtomicBool::new(true),
            fail_open: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> Arc<MockPortHandle> {
        Arc::clone(&self.handle)
    }

    pub fn set_exists(&self, exists: bool) {
        self.exists.store(exists, Ordering::SeqCst);
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// When each connect attempt checked for the device node.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    /// Number of successful opens.
    pub fn open_calls(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Default for MockPortOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl PortOpener for MockPortOpener {
    fn exists(&self, _path: &str) -> bool {
        self.attempts.lock().unwrap().push(Instant::now());
        self.exists.load(Ordering::SeqCst)
    }

    fn probe(&self, path: &str, _baud_rate: u32) -> io::Result<()> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("mock: cannot access {path}"),
            ));
        }
        Ok(())
    }

    fn open(&self, path: &str, baud_rate: u32) -> io::Result<Box<dyn LinePort>> {
        self.probe(path, baud_rate)?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPort {
            handle: Arc::clone(&self.handle),
        }))
    }
}
