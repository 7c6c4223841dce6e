//! An in-memory transport that records every frame the engine sends.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::transport::{Transport, TransportError};

#[derive(Default)]
struct LogInner {
    frames: Vec<Vec<u8>>,
    closed: bool,
    fail_sends: bool,
}

/// Sending half handed to the peer under test.
pub struct RecordingTransport {
    log: Rc<RefCell<LogInner>>,
}

/// Inspection half kept by the test.
#[derive(Clone)]
pub struct TransportLog {
    log: Rc<RefCell<LogInner>>,
}

impl RecordingTransport {
    /// Builds a transport plus the log observing it.
    pub fn new() -> (Self, TransportLog) {
        let log = Rc::new(RefCell::new(LogInner::default()));
        (
            Self {
                log: Rc::clone(&log),
            },
            TransportLog { log },
        )
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.log.borrow_mut();
        if inner.fail_sends {
            return Err(TransportError::Closed);
        }
        inner.frames.push(frame.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.log.borrow_mut().closed = true;
        Ok(())
    }
}

impl TransportLog {
    /// Number of frames sent so far.
    pub fn frame_count(&self) -> usize {
        self.log.borrow().frames.len()
    }

    /// Every sent frame, decoded as JSON.
    pub fn frames(&self) -> Vec<Value> {
        self.log
            .borrow()
            .frames
            .iter()
            .map(|raw| serde_json::from_slice(raw).expect("sent frame is not JSON"))
            .collect()
    }

    /// The most recent frame, decoded as JSON.
    pub fn last_frame(&self) -> Value {
        self.frames().pop().expect("no frame was sent")
    }

    /// Every sent frame as raw bytes.
    pub fn raw_frames(&self) -> Vec<Vec<u8>> {
        self.log.borrow().frames.clone()
    }

    /// Whether the peer asked the transport to close.
    pub fn is_closed(&self) -> bool {
        self.log.borrow().closed
    }

    /// Makes every subsequent send fail.
    pub fn fail_sends(&self) {
        self.log.borrow_mut().fail_sends = true;
    }

    /// Forgets the frames recorded so far.
    pub fn clear(&self) {
        self.log.borrow_mut().frames.clear();
    }
}
