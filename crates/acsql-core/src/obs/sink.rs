//! Metrics sink boundary.
//!
//! Compiler logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
use crate::obs::metrics;
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = RefCell::new(None);
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent {
    Parse {
        ok: bool,
    },
    Normalize,
    Minimize {
        variables: u64,
        cubes_in: u64,
        cubes_out: u64,
    },
    TristateFallback,
    StoreCompile {
        collection: &'static str,
        never_matches: bool,
    },
    Paginate {
        gap_cubes: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent);
}

/// GlobalMetricsSink
/// Default process-local sink that writes into the thread-local counters.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        metrics::with_state_mut(|m| match event {
            MetricsEvent::Parse { ok } => {
                m.ops.parse_calls = m.ops.parse_calls.saturating_add(1);
                if !ok {
                    m.ops.parse_failures = m.ops.parse_failures.saturating_add(1);
                }
            }

            MetricsEvent::Normalize => {
                m.ops.normalize_calls = m.ops.normalize_calls.saturating_add(1);
            }

            MetricsEvent::Minimize {
                variables,
                cubes_in,
                cubes_out,
            } => {
                m.ops.minimize_calls = m.ops.minimize_calls.saturating_add(1);
                m.ops.minimize_variables_max = m.ops.minimize_variables_max.max(variables);
                m.ops.cubes_in = m.ops.cubes_in.saturating_add(cubes_in);
                m.ops.cubes_out = m.ops.cubes_out.saturating_add(cubes_out);
            }

            MetricsEvent::TristateFallback => {
                m.ops.tristate_fallbacks = m.ops.tristate_fallbacks.saturating_add(1);
            }

            MetricsEvent::StoreCompile {
                collection,
                never_matches,
            } => {
                m.ops.store_compiles = m.ops.store_compiles.saturating_add(1);
                let entry = m.collections.entry(collection.to_string()).or_default();
                entry.compiles = entry.compiles.saturating_add(1);
                if never_matches {
                    m.ops.store_never_matches = m.ops.store_never_matches.saturating_add(1);
                    entry.never_matches = entry.never_matches.saturating_add(1);
                }
            }

            MetricsEvent::Paginate { gap_cubes } => {
                m.ops.paginate_calls = m.ops.paginate_calls.saturating_add(1);
                m.ops.paginate_gap_cubes = m.ops.paginate_gap_cubes.saturating_add(gap_cubes);
            }
        });
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent) {
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current thread's metrics counters.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all metrics counters.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override.
///
/// The previous sink is restored on every exit, including unwinding.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        cell::Cell,
        panic::{AssertUnwindSafe, catch_unwind},
    };

    #[derive(Default)]
    struct CountingSink {
        calls: Cell<usize>,
    }

    impl MetricsSink for CountingSink {
        fn record(&self, _: MetricsEvent) {
            self.calls.set(self.calls.get() + 1);
        }
    }

    fn clear_override() {
        SINK_OVERRIDE.with(|cell| {
            *cell.borrow_mut() = None;
        });
    }

    #[test]
    fn with_metrics_sink_routes_and_restores_nested_overrides() {
        clear_override();

        let outer = Rc::new(CountingSink::default());
        let inner = Rc::new(CountingSink::default());

        // No override installed yet.
        record(MetricsEvent::Normalize);
        assert_eq!(outer.calls.get(), 0);
        assert_eq!(inner.calls.get(), 0);

        with_metrics_sink(outer.clone(), || {
            record(MetricsEvent::Normalize);
            assert_eq!(outer.calls.get(), 1);
            assert_eq!(inner.calls.get(), 0);

            with_metrics_sink(inner.clone(), || {
                record(MetricsEvent::Parse { ok: true });
            });

            // Inner override was restored to outer override.
            record(MetricsEvent::Parse { ok: false });
        });

        assert_eq!(outer.calls.get(), 2);
        assert_eq!(inner.calls.get(), 1);

        SINK_OVERRIDE.with(|cell| {
            assert!(cell.borrow().is_none());
        });
    }

    #[test]
    fn with_metrics_sink_restores_override_on_panic() {
        clear_override();

        let sink = Rc::new(CountingSink::default());
        let panicked = catch_unwind(AssertUnwindSafe(|| {
            with_metrics_sink(sink.clone(), || {
                record(MetricsEvent::Normalize);
                panic!("intentional panic for guard test");
            });
        }))
        .is_err();

        assert!(panicked);
        assert_eq!(sink.calls.get(), 1);
        SINK_OVERRIDE.with(|cell| {
            assert!(cell.borrow().is_none());
        });
    }

    #[test]
    fn global_sink_accumulates_store_and_minimizer_counters() {
        clear_override();
        metrics_reset_all();

        record(MetricsEvent::Minimize {
            variables: 4,
            cubes_in: 3,
            cubes_out: 1,
        });
        record(MetricsEvent::Minimize {
            variables: 2,
            cubes_in: 2,
            cubes_out: 2,
        });
        record(MetricsEvent::StoreCompile {
            collection: "devices",
            never_matches: true,
        });
        record(MetricsEvent::Parse { ok: false });

        let report = metrics_report();
        assert_eq!(report.ops.minimize_calls, 2);
        assert_eq!(report.ops.minimize_variables_max, 4);
        assert_eq!(report.ops.cubes_in, 5);
        assert_eq!(report.ops.cubes_out, 3);
        assert_eq!(report.ops.parse_failures, 1);

        let devices = report
            .collections
            .get("devices")
            .expect("collection counters should be present");
        assert_eq!(devices.compiles, 1);
        assert_eq!(devices.never_matches, 1);
    }
}
