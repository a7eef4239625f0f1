// src/io/serial/mock.rs
//
// In-memory serial backend for tests. A `MockDevice` holds the bytes the
// "device" has sent (read by the bridge) and the bytes the bridge wrote to it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::port::{PortDescriptor, SerialBackend, SerialLink};
use crate::io::error::IoError;

/// Shared state of one opened device
#[derive(Default)]
pub struct MockDevice {
    inbound: Mutex<VecDeque<u8>>,
    outbound: Mutex<Vec<u8>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    open_handles: AtomicUsize,
}

impl MockDevice {
    /// Queue bytes as if the device had transmitted them
    pub fn push_inbound(&self, data: &[u8]) {
        self.inbound.lock().unwrap().extend(data.iter().copied());
    }

    pub fn written(&self) -> Vec<u8> {
        self.outbound.lock().unwrap().clone()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.open_handles.load(Ordering::SeqCst) == 0
    }

    /// Poll until at least `len` bytes were written or `timeout` passes
    pub fn wait_for_written(&self, len: usize, timeout: Duration) -> Vec<u8> {
        let deadline = Instant::now() + timeout;
        loop {
            let written = self.written();
            if written.len() >= len || Instant::now() >= deadline {
                return written;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_closed() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        true
    }
}

pub struct MockLink {
    name: String,
    device: Arc<MockDevice>,
}

impl MockLink {
    pub fn new(name: &str, device: Arc<MockDevice>) -> Self {
        device.open_handles.fetch_add(1, Ordering::SeqCst);
        MockLink {
            name: name.to_string(),
            device,
        }
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.device.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SerialLink for MockLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.device.fail_reads.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device unplugged",
            ));
        }

        let mut inbound = self.device.inbound.lock().unwrap();
        if inbound.is_empty() {
            drop(inbound);
            std::thread::sleep(Duration::from_millis(2));
            return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "no data"));
        }

        let n = buf.len().min(inbound.len());
        for (slot, byte) in buf.iter_mut().zip(inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        if self.device.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device unplugged",
            ));
        }
        self.device.outbound.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn try_clone_link(&self) -> std::io::Result<Box<dyn SerialLink>> {
        Ok(Box::new(MockLink::new(&self.name, self.device.clone())))
    }
}

/// Backend whose port list and open results are driven by the test
#[derive(Default)]
pub struct MockBackend {
    ports: Mutex<Vec<PortDescriptor>>,
    /// Port that appears once the given number of scans has happened
    appear_after: Mutex<Option<(usize, PortDescriptor)>>,
    scans: AtomicUsize,
    fail_enumeration: AtomicBool,
    failing_opens: AtomicUsize,
    opened: Mutex<Vec<Arc<MockDevice>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        MockBackend::default()
    }

    pub fn plug(&self, port: PortDescriptor) {
        self.ports.lock().unwrap().push(port);
    }

    /// Make `port` visible only after `scans` enumerations returned without it
    pub fn plug_after(&self, scans: usize, port: PortDescriptor) {
        *self.appear_after.lock().unwrap() = Some((scans, port));
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` open attempts
    pub fn fail_next_opens(&self, count: usize) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Devices handed out so far, oldest first
    pub fn opened(&self) -> Vec<Arc<MockDevice>> {
        self.opened.lock().unwrap().clone()
    }

    pub fn wait_opened(&self, count: usize, timeout: Duration) -> Vec<Arc<MockDevice>> {
        let deadline = Instant::now() + timeout;
        loop {
            let opened = self.opened();
            if opened.len() >= count || Instant::now() >= deadline {
                return opened;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

impl SerialBackend for MockBackend {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, IoError> {
        let completed = self.scans.fetch_add(1, Ordering::SeqCst);
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(IoError::enumerate("mock enumeration failure"));
        }

        let mut ports = self.ports.lock().unwrap().clone();
        if let Some((after, port)) = self.appear_after.lock().unwrap().as_ref() {
            if completed >= *after {
                ports.push(port.clone());
            }
        }
        Ok(ports)
    }

    fn open(&self, port: &PortDescriptor) -> Result<Box<dyn SerialLink>, IoError> {
        let failing = self.failing_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_opens.store(failing - 1, Ordering::SeqCst);
            return Err(IoError::connection(&port.port_name, "resource busy"));
        }

        let device = Arc::new(MockDevice::default());
        self.opened.lock().unwrap().push(device.clone());
        Ok(Box::new(MockLink::new(&port.port_name, device)))
    }
}
