use core::cell::RefCell;

use atomic::{Atomic, Ordering};
use critical_section::{CriticalSection, Mutex};
use heapless::Deque;

use crate::State;

pub struct StateHolder<const HISTORY_SIZE: usize> {
    history: Mutex<RefCell<Deque<State, HISTORY_SIZE>>>,
    state: Atomic<State>,
}

impl<const HISTORY_SIZE: usize> StateHolder<HISTORY_SIZE> {
    pub const fn new() -> Self {
        Self {
            history: Mutex::new(RefCell::new(Deque::new())),
            state: Atomic::new(State::Ok),
        }
    }

    /// Only called with the engine's critical section held.
    pub fn set_state(&self, cs: CriticalSection, state: State) {
        trace!("twi: {} -> {}", self.get_state(), state);
        self.add_state_in_history(cs, state);
        self.state.store(state, Ordering::SeqCst);
    }

    /// Read without a critical section. The interrupt handler may change the
    /// state between two calls.
    pub fn get_state(&self) -> State {
        self.state.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn history_into(&self, cs: CriticalSection, arr: &mut [State; HISTORY_SIZE]) {
        let h = self.history.borrow_ref(cs);
        let n = h.len();
        let (a, b) = h.as_slices();
        let s = HISTORY_SIZE - n;

        arr[s..s + a.len()].copy_from_slice(a);
        arr[s + a.len()..].copy_from_slice(b);
    }

    fn add_state_in_history(&self, cs: CriticalSection, state: State) {
        let mut h = self.history.borrow_ref_mut(cs);
        if h.is_full() {
            h.pop_front();
        }
        // Room was made above.
        let _ = h.push_back(state);
    }
}
