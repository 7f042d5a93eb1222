//! In-memory stand-in for the timer appliance.
//!
//! Parses the byte stream the way the firmware does and answers from its
//! own slot memory, so driver and reconciler tests can inspect the device
//! state afterwards through the shared [`FakeState`].

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use timer_link::{Action, Error, Result, Transport, ACTION_RECORD_SIZE};

pub struct FakeState {
    /// Raw slot memory
    pub slots: Vec<[u8; ACTION_RECORD_SIZE]>,
    pub hw_version: String,
    pub sw_version: String,
    /// Replaces the generated info block when set
    pub info_override: Option<[u8; 24]>,
    pub clock: [u8; 7],
    pub timer_running: bool,
    pub verbose: bool,
    /// Command codes in the order they were received
    pub log: Vec<u8>,
    /// Every byte the host wrote
    pub written: Vec<u8>,
    /// (major, minor, command) of every direct switch
    pub switches: Vec<(u8, u8, u8)>,
    /// Answer this command code with the failure flag
    pub reject: Option<u8>,
    /// Stop answering when this slot is written
    pub hang_on_slot: Option<u16>,
    pub hung: bool,
    pub close_calls: usize,
}

impl FakeState {
    pub fn slot(&self, index: usize) -> Action {
        Action::from_bytes(&self.slots[index])
    }

    pub fn set_slot(&mut self, index: usize, action: &Action) {
        self.slots[index] = action.to_bytes();
    }

    pub fn count(&self, code: u8) -> usize {
        self.log.iter().filter(|c| **c == code).count()
    }

    fn info_block(&self) -> [u8; 24] {
        if let Some(block) = self.info_override {
            return block;
        }
        // The firmware counts the leading run of valid slots, not every valid one
        let valid = self.slots.iter().take_while(|s| s[0] != 0).count();
        let text = format!(
            "{:>3}{:>3}{:05}{:05}00000000",
            self.hw_version,
            self.sw_version,
            self.slots.len() * ACTION_RECORD_SIZE,
            valid
        );
        let mut block = [0u8; 24];
        block.copy_from_slice(text.as_bytes());
        block
    }
}

pub type Handle = Arc<Mutex<FakeState>>;

pub struct FakeTimer {
    state: Handle,
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
}

impl FakeTimer {
    /// A device with `slots` empty action slots and a stopped timer
    pub fn new(slots: usize) -> (Self, Handle) {
        let state = Arc::new(Mutex::new(FakeState {
            slots: vec![Action::EMPTY.to_bytes(); slots],
            hw_version: "1".to_string(),
            sw_version: "2".to_string(),
            info_override: None,
            clock: [17, 10, 26, 6, 12, 0, 0],
            timer_running: true,
            verbose: false,
            log: Vec::new(),
            written: Vec::new(),
            switches: Vec::new(),
            reject: None,
            hang_on_slot: None,
            hung: false,
            close_calls: 0,
        }));
        let fake = Self {
            state: state.clone(),
            inbox: Vec::new(),
            outbox: VecDeque::new(),
        };
        (fake, state)
    }

    fn payload_len(code: u8) -> usize {
        match code {
            b'D' => 7,
            b'E' => 2,
            b'F' => 2 + ACTION_RECORD_SIZE,
            b'G' => 3,
            b'I' => 8,
            _ => 0,
        }
    }

    fn process(&mut self) {
        while let Some(&code) = self.inbox.first() {
            let needed = 1 + Self::payload_len(code);
            if self.inbox.len() < needed {
                return;
            }
            let frame: Vec<u8> = self.inbox.drain(..needed).collect();
            self.handle(code, &frame[1..]);
        }
    }

    fn handle(&mut self, code: u8, payload: &[u8]) {
        let mut state = self.state.lock();
        state.log.push(code);
        if state.hung {
            return;
        }
        if state.reject == Some(code) {
            self.outbox.push_back(b'0');
            return;
        }

        match code {
            b'A' => {
                state.timer_running = true;
                self.outbox.push_back(b'1');
            }
            b'B' => {
                state.timer_running = false;
                self.outbox.push_back(b'1');
            }
            b'C' => self.outbox.extend(state.clock),
            b'D' => {
                state.clock.copy_from_slice(payload);
                self.outbox.push_back(b'1');
            }
            b'E' => {
                let index = u16::from_le_bytes([payload[0], payload[1]]) as usize;
                // An unreadable slot gets no answer at all
                if let Some(slot) = state.slots.get(index) {
                    let slot = *slot;
                    self.outbox.extend(slot);
                }
            }
            b'F' => {
                let index = u16::from_le_bytes([payload[0], payload[1]]);
                if state.hang_on_slot == Some(index) {
                    state.hung = true;
                    return;
                }
                match state.slots.get_mut(index as usize) {
                    Some(slot) => {
                        slot.copy_from_slice(&payload[2..]);
                        self.outbox.push_back(b'1');
                    }
                    None => self.outbox.push_back(b'0'),
                }
            }
            b'G' => {
                state.switches.push((payload[0], payload[1], payload[2]));
                self.outbox.push_back(b'1');
            }
            b'H' => {
                let block = state.info_block();
                self.outbox.extend(block);
            }
            b'I' => {}
            b'J' => {
                state.verbose = true;
                self.outbox.push_back(b'1');
            }
            b'K' => {}
            _ => self.outbox.push_back(b'0'),
        }
    }
}

#[async_trait]
impl Transport for FakeTimer {
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.outbox.len() < buf.len() {
            let received = self.outbox.len();
            self.outbox.clear();
            return Err(Error::Timeout {
                expected: buf.len(),
                received,
            });
        }
        for byte in buf.iter_mut() {
            *byte = self.outbox.pop_front().unwrap();
        }
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.state.lock().written.extend_from_slice(data);
        self.inbox.extend_from_slice(data);
        self.process();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.state.lock().close_calls += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "fake-timer"
    }
}

/// A valid action at `hh:mm`
pub fn action(major: u8, minor: u8, hour: u8, minute: u8, command: u8) -> Action {
    Action {
        valid: true,
        major,
        minor,
        day: 0,
        month: 0,
        year: 0,
        weekday: 0,
        hour,
        minute,
        command,
    }
}
