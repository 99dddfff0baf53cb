use std::sync::atomic::{AtomicU8, Ordering};

/// Remote half-stream progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Remote {
    /// Initial HEADERS not yet received.
    Pending,
    /// Initial HEADERS delivered; body frames flow through the queue.
    Streaming,
}

/// Stream lifecycle states of RFC 7540 §5.1, as seen by one stream.
///
/// `Closed` is terminal; every other state can be reset. The associated
/// payloads (the pending-message promise and the body frame queue) live in
/// slots next to the cell and are published by the transitions that install
/// them, so the whole state fits a single atomic byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    /// Both halves open.
    Open { remote: Remote },
    /// Local END_STREAM already sent.
    LocalClosed { remote: Remote },
    /// Remote END_STREAM already received.
    RemoteClosed,
    /// Terminal.
    Closed,
}

const OPEN_PENDING: u8 = 0;
const OPEN_STREAMING: u8 = 1;
const LOCAL_CLOSED_PENDING: u8 = 2;
const LOCAL_CLOSED_STREAMING: u8 = 3;
const REMOTE_CLOSED: u8 = 4;
const CLOSED: u8 = 5;

impl State {
    fn pack(self) -> u8 {
        match self {
            State::Open {
                remote: Remote::Pending,
            } => OPEN_PENDING,
            State::Open {
                remote: Remote::Streaming,
            } => OPEN_STREAMING,
            State::LocalClosed {
                remote: Remote::Pending,
            } => LOCAL_CLOSED_PENDING,
            State::LocalClosed {
                remote: Remote::Streaming,
            } => LOCAL_CLOSED_STREAMING,
            State::RemoteClosed => REMOTE_CLOSED,
            State::Closed => CLOSED,
        }
    }

    fn unpack(value: u8) -> State {
        match value {
            OPEN_PENDING => State::Open {
                remote: Remote::Pending,
            },
            OPEN_STREAMING => State::Open {
                remote: Remote::Streaming,
            },
            LOCAL_CLOSED_PENDING => State::LocalClosed {
                remote: Remote::Pending,
            },
            LOCAL_CLOSED_STREAMING => State::LocalClosed {
                remote: Remote::Streaming,
            },
            REMOTE_CLOSED => State::RemoteClosed,
            CLOSED => State::Closed,
            _ => unreachable!("invalid stream state"),
        }
    }
}

/// The atomic stream state cell.
///
/// All mutation goes through `transition`, a compare-and-set from the state
/// the caller observed. A failed transition means the state moved under the
/// caller, who re-reads and re-evaluates; every transition moves the stream
/// monotonically toward `Closed`, so retries are bounded by the state count.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> StateCell {
        StateCell(AtomicU8::new(OPEN_PENDING))
    }

    pub(crate) fn load(&self) -> State {
        State::unpack(self.0.load(Ordering::Acquire))
    }

    /// Compare-and-set `from` to `to`. Returns `false` if the current state
    /// is no longer `from`.
    pub(crate) fn transition(&self, from: State, to: State) -> bool {
        self.0
            .compare_exchange(from.pack(), to.pack(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl std::fmt::Debug for StateCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.load(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::{Remote, State, StateCell};

    const ALL: [State; 6] = [
        State::Open {
            remote: Remote::Pending,
        },
        State::Open {
            remote: Remote::Streaming,
        },
        State::LocalClosed {
            remote: Remote::Pending,
        },
        State::LocalClosed {
            remote: Remote::Streaming,
        },
        State::RemoteClosed,
        State::Closed,
    ];

    #[test]
    fn pack_roundtrip() {
        for state in ALL {
            assert_eq!(State::unpack(state.pack()), state);
        }
    }

    #[test]
    fn transition_is_a_compare_and_set() {
        let cell = StateCell::new();
        assert_eq!(
            cell.load(),
            State::Open {
                remote: Remote::Pending
            }
        );

        // wrong expected state
        assert!(!cell.transition(State::RemoteClosed, State::Closed));
        assert_eq!(
            cell.load(),
            State::Open {
                remote: Remote::Pending
            }
        );

        assert!(cell.transition(
            State::Open {
                remote: Remote::Pending
            },
            State::Open {
                remote: Remote::Streaming
            }
        ));
        assert!(cell.transition(
            State::Open {
                remote: Remote::Streaming
            },
            State::Closed
        ));
        // losing a race is observable as a failed transition
        assert!(!cell.transition(State::RemoteClosed, State::Closed));
        assert_eq!(cell.load(), State::Closed);
    }
}
