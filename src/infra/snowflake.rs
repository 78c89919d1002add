//! Snowflake-style 63-bit identifiers: 41 bits of milliseconds since
//! [`EPOCH_MS`], 10 bits of node id, 12 bits of per-millisecond sequence.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::application::ids::IdGenerator;
use crate::config::MAX_NODE_ID;

use super::lock::mutex_lock;

/// 2023-01-01T00:00:00Z.
pub const EPOCH_MS: u64 = 1_672_531_200_000;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const SOURCE: &str = "infra::snowflake";

#[derive(Debug, Default)]
struct State {
    last_ms: u64,
    sequence: u64,
}

#[derive(Debug)]
pub struct SnowflakeGenerator {
    node_id: u64,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    /// `node_id` above [`MAX_NODE_ID`] is masked to its low ten bits.
    pub fn new(node_id: u16) -> Self {
        Self {
            node_id: u64::from(node_id & MAX_NODE_ID),
            state: Mutex::new(State::default()),
        }
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
            .saturating_sub(EPOCH_MS)
    }

    fn next_with(&self, observed_ms: u64) -> i64 {
        let mut state = mutex_lock(&self.state, SOURCE, "next_id");

        // A clock that steps backwards keeps issuing from the last millisecond.
        let mut ms = observed_ms.max(state.last_ms);
        if ms == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                ms += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = ms;

        let id = (ms << (NODE_BITS + SEQUENCE_BITS))
            | (self.node_id << SEQUENCE_BITS)
            | state.sequence;
        (id & i64::MAX as u64) as i64
    }
}

impl IdGenerator for SnowflakeGenerator {
    fn next_id(&self) -> i64 {
        self.next_with(Self::now_ms())
    }
}
