use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for compiler operations.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct EventState {
    pub ops: EventOps,
    pub collections: BTreeMap<String, CollectionCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Front end
    pub parse_calls: u64,
    pub parse_failures: u64,
    pub normalize_calls: u64,

    // Minimizer
    pub minimize_calls: u64,
    pub minimize_variables_max: u64,
    pub cubes_in: u64,
    pub cubes_out: u64,
    pub tristate_fallbacks: u64,

    // Backends
    pub store_compiles: u64,
    pub store_never_matches: u64,
    pub paginate_calls: u64,
    pub paginate_gap_cubes: u64,
}

///
/// CollectionCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CollectionCounters {
    pub compiles: u64,
    pub never_matches: u64,
}

///
/// EventReport
/// Snapshot handed to callers; detached from the live state.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub ops: EventOps,
    pub collections: BTreeMap<String, CollectionCounters>,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

pub(crate) fn report() -> EventReport {
    with_state(|m| EventReport {
        ops: m.ops.clone(),
        collections: m.collections.clone(),
    })
}
