//! Trace session bookkeeping.
//!
//! A trace session is created the first time its identifier is seen, counts
//! one call per stop/start cycle, and reports when the call-count budget is
//! reached. `TraceTable` holds the records and implements every state
//! transition; [`TraceRegistry`] wraps it in a mutex so any number of threads
//! can share one registry, each operation taking the whole table as a single
//! critical section.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroU64;
use std::sync::{Arc, Mutex};

use crate::error::TraceRegistryError;
use crate::{registry_debug, registry_warn};

/// Bookkeeping for a single trace session.
///
/// The budget and options are fixed when the record is created; only the call
/// counter and the running flag change afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceRecord<O> {
    max_calls: NonZeroU64,
    calls: u64,
    running: bool,
    options: O,
}

impl<O> TraceRecord<O> {
    fn new(max_calls: NonZeroU64, options: O) -> Self {
        TraceRecord {
            max_calls,
            calls: 0,
            running: true,
            options,
        }
    }

    /// Call-count budget the trace was created with.
    pub fn max_calls(&self) -> NonZeroU64 {
        self.max_calls
    }

    /// Calls counted so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Whether the trace is currently counting calls.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Options the trace was created with.
    pub fn options(&self) -> &O {
        &self.options
    }
}

/// Outcome of a successful start-or-advance request.
#[derive(Clone, Debug, PartialEq)]
pub enum StartOutcome<I, O> {
    /// The trace was created, is still below its budget, or was already
    /// running. The caller proceeds with the traced invocation.
    Started {
        /// Identifier the request was made with.
        id: I,
    },
    /// The budget was reached on this call. The caller should finalize the
    /// trace, emit its report, and follow up with a stop request. The record
    /// stays running until that stop arrives.
    EndTrace {
        /// Identifier the request was made with.
        id: I,
        /// Final call count, equal to the budget.
        calls: u64,
        /// Options the trace was created with, echoed back unchanged.
        options: O,
    },
}

/// Successful reply to a stop request.
#[derive(Clone, Debug, PartialEq)]
pub struct StoppedTrace<I, O> {
    /// Identifier the request was made with.
    pub id: I,
    /// Calls counted so far.
    pub calls: u64,
    /// Options the trace was created with, echoed back unchanged.
    pub options: O,
}

/// The trace table itself. Single-threaded; both public facades serialize
/// access to it, one through a mutex and one through a worker task.
#[derive(Debug)]
pub(crate) struct TraceTable<I, O> {
    records: HashMap<I, TraceRecord<O>>,
}

impl<I, O> TraceTable<I, O>
where
    I: Eq + Hash + Clone + fmt::Debug,
    O: Clone + PartialEq,
{
    pub(crate) fn new() -> Self {
        TraceTable {
            records: HashMap::new(),
        }
    }

    /// Create the trace if the identifier is new, count one call if it is
    /// stopped, or leave it untouched if it is already running.
    pub(crate) fn start_or_advance(
        &mut self,
        id: I,
        max_calls: NonZeroU64,
        options: O,
    ) -> Result<StartOutcome<I, O>, TraceRegistryError> {
        match self.records.entry(id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(TraceRecord::new(max_calls, options));
                registry_debug!(
                    name: "TraceRegistry.TraceCreated",
                    id = format!("{id:?}"),
                    max_calls = max_calls.get()
                );
                Ok(StartOutcome::Started { id })
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if record.running {
                    // Mid-flight call: the counter only moves on calls that
                    // arrive after an explicit stop.
                    return Ok(StartOutcome::Started { id });
                }
                if record.max_calls != max_calls || record.options != options {
                    return Err(TraceRegistryError::ConfigMismatch(format!("{id:?}")));
                }
                record.calls += 1;
                record.running = true;
                if record.calls == record.max_calls.get() {
                    registry_debug!(
                        name: "TraceRegistry.BudgetReached",
                        id = format!("{id:?}"),
                        calls = record.calls
                    );
                    Ok(StartOutcome::EndTrace {
                        id,
                        calls: record.calls,
                        options: record.options.clone(),
                    })
                } else {
                    Ok(StartOutcome::Started { id })
                }
            }
        }
    }

    /// Deactivate the trace. Stopping an already-stopped trace repeats the
    /// previous reply without touching the record.
    pub(crate) fn stop(&mut self, id: &I) -> Result<StoppedTrace<I, O>, TraceRegistryError> {
        match self.records.get_mut(id) {
            None => {
                registry_warn!(name: "TraceRegistry.UnknownTrace", id = format!("{id:?}"));
                Err(TraceRegistryError::UnknownTrace(format!("{id:?}")))
            }
            Some(record) => {
                record.running = false;
                Ok(StoppedTrace {
                    id: id.clone(),
                    calls: record.calls,
                    options: record.options.clone(),
                })
            }
        }
    }

    pub(crate) fn record(&self, id: &I) -> Option<TraceRecord<O>> {
        self.records.get(id).cloned()
    }

    pub(crate) fn remove(&mut self, id: &I) -> Option<TraceRecord<O>> {
        self.records.remove(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

/// A thread-safe trace registry.
///
/// Cloning is cheap and yields another handle to the same registry. Every
/// operation takes one exclusive critical section over the whole table, so
/// check-then-mutate sequences never interleave, on the same identifier or
/// across identifiers.
#[derive(Clone, Debug)]
pub struct TraceRegistry<I, O> {
    inner: Arc<Mutex<TraceTable<I, O>>>,
}

impl<I, O> TraceRegistry<I, O>
where
    I: Eq + Hash + Clone + fmt::Debug,
    O: Clone + PartialEq,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        TraceRegistry {
            inner: Arc::new(Mutex::new(TraceTable::new())),
        }
    }

    /// Create or advance the trace for `id`.
    ///
    /// A previously-unseen identifier creates a record with a zeroed counter
    /// and returns [`StartOutcome::Started`]. A stopped record whose stored
    /// budget and options match the arguments counts one call and is re-armed,
    /// returning [`StartOutcome::EndTrace`] if the counter has reached the
    /// budget. A running record is left untouched. Re-arming with a different
    /// budget or different options is rejected with
    /// [`TraceRegistryError::ConfigMismatch`].
    pub fn start_or_advance(
        &self,
        id: I,
        max_calls: NonZeroU64,
        options: O,
    ) -> Result<StartOutcome<I, O>, TraceRegistryError> {
        let mut table = self.inner.lock()?;
        table.start_or_advance(id, max_calls, options)
    }

    /// Deactivate the trace for `id`, returning its current call count and
    /// options. Stopping twice in a row returns the same reply both times;
    /// stopping an identifier that was never started returns
    /// [`TraceRegistryError::UnknownTrace`].
    pub fn stop(&self, id: &I) -> Result<StoppedTrace<I, O>, TraceRegistryError> {
        let mut table = self.inner.lock()?;
        table.stop(id)
    }

    /// Snapshot of the record for `id`, if one exists.
    pub fn record(&self, id: &I) -> Result<Option<TraceRecord<O>>, TraceRegistryError> {
        let table = self.inner.lock()?;
        Ok(table.record(id))
    }

    /// Evict the record for `id`, returning it if one existed. The registry
    /// never removes records on its own; this is the only removal path.
    pub fn remove(&self, id: &I) -> Result<Option<TraceRecord<O>>, TraceRegistryError> {
        let mut table = self.inner.lock()?;
        Ok(table.remove(id))
    }

    /// Number of records, running or stopped.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|table| table.len()).unwrap_or(0)
    }

    /// Whether the registry holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<I, O> Default for TraceRegistry<I, O>
where
    I: Eq + Hash + Clone + fmt::Debug,
    O: Clone + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;
    use std::thread;

    use crate::error::TraceRegistryError;
    use crate::registry::{StartOutcome, TraceRegistry};

    type Options = Vec<&'static str>;

    fn budget(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    fn options() -> Options {
        vec!["return_trace", "arity"]
    }

    #[test]
    fn fresh_id_starts_running() {
        let registry = TraceRegistry::new();

        let outcome = registry
            .start_or_advance("factorial", budget(3), options())
            .unwrap();
        assert_eq!(outcome, StartOutcome::Started { id: "factorial" });

        let record = registry.record(&"factorial").unwrap().unwrap();
        assert_eq!(record.calls(), 0);
        assert!(record.is_running());
        assert_eq!(record.max_calls(), budget(3));
        assert_eq!(record.options(), &options());
    }

    #[test]
    fn start_while_running_is_a_noop() {
        let registry = TraceRegistry::new();
        registry
            .start_or_advance("fib", budget(3), options())
            .unwrap();

        let outcome = registry
            .start_or_advance("fib", budget(3), options())
            .unwrap();
        assert_eq!(outcome, StartOutcome::Started { id: "fib" });

        let record = registry.record(&"fib").unwrap().unwrap();
        assert_eq!(record.calls(), 0);
        assert!(record.is_running());
    }

    #[test]
    fn stop_start_cycles_reach_the_budget() {
        let registry = TraceRegistry::new();

        registry
            .start_or_advance("ackermann", budget(3), options())
            .unwrap();
        registry.stop(&"ackermann").unwrap();
        registry
            .start_or_advance("ackermann", budget(3), options())
            .unwrap();
        registry.stop(&"ackermann").unwrap();

        // Third start counts the second call; still below the budget of 3.
        let outcome = registry
            .start_or_advance("ackermann", budget(3), options())
            .unwrap();
        assert_eq!(outcome, StartOutcome::Started { id: "ackermann" });
        assert_eq!(
            registry.record(&"ackermann").unwrap().unwrap().calls(),
            2
        );

        registry.stop(&"ackermann").unwrap();
        let outcome = registry
            .start_or_advance("ackermann", budget(3), options())
            .unwrap();
        assert_eq!(
            outcome,
            StartOutcome::EndTrace {
                id: "ackermann",
                calls: 3,
                options: options(),
            }
        );

        // EndTrace is an event, not a state: the record stays running until
        // the follow-up stop arrives.
        let record = registry.record(&"ackermann").unwrap().unwrap();
        assert!(record.is_running());
        assert_eq!(record.calls(), 3);

        let stopped = registry.stop(&"ackermann").unwrap();
        assert_eq!(stopped.calls, 3);
    }

    #[test]
    fn stop_of_unseen_id_is_an_error() {
        let registry: TraceRegistry<&str, Options> = TraceRegistry::new();
        assert!(matches!(
            registry.stop(&"never-started"),
            Err(TraceRegistryError::UnknownTrace(_))
        ));
    }

    #[test]
    fn stop_is_idempotent() {
        let registry = TraceRegistry::new();
        registry
            .start_or_advance("quicksort", budget(5), options())
            .unwrap();

        let first = registry.stop(&"quicksort").unwrap();
        let second = registry.stop(&"quicksort").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.calls, 0);
        assert_eq!(first.options, options());
    }

    #[test]
    fn budget_and_options_are_echoed_unchanged() {
        let registry = TraceRegistry::new();
        let opts = vec!["send", "procs"];

        registry
            .start_or_advance("mapreduce", budget(1), opts.clone())
            .unwrap();
        let stopped = registry.stop(&"mapreduce").unwrap();
        assert_eq!(stopped.options, opts);

        let outcome = registry
            .start_or_advance("mapreduce", budget(1), opts.clone())
            .unwrap();
        assert_eq!(
            outcome,
            StartOutcome::EndTrace {
                id: "mapreduce",
                calls: 1,
                options: opts,
            }
        );
    }

    #[test]
    fn mismatched_rearm_is_rejected() {
        let registry = TraceRegistry::new();
        registry
            .start_or_advance("handle_call", budget(3), options())
            .unwrap();
        registry.stop(&"handle_call").unwrap();

        assert!(matches!(
            registry.start_or_advance("handle_call", budget(4), options()),
            Err(TraceRegistryError::ConfigMismatch(_))
        ));
        assert!(matches!(
            registry.start_or_advance("handle_call", budget(3), vec!["garbage"]),
            Err(TraceRegistryError::ConfigMismatch(_))
        ));

        // The rejection leaves the stored record untouched.
        let record = registry.record(&"handle_call").unwrap().unwrap();
        assert_eq!(record.calls(), 0);
        assert!(!record.is_running());
        assert_eq!(record.max_calls(), budget(3));
    }

    #[test]
    fn remove_evicts_the_record() {
        let registry = TraceRegistry::new();
        registry
            .start_or_advance("evicted", budget(2), options())
            .unwrap();

        let removed = registry.remove(&"evicted").unwrap().unwrap();
        assert_eq!(removed.calls(), 0);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.stop(&"evicted"),
            Err(TraceRegistryError::UnknownTrace(_))
        ));
    }

    #[test]
    fn disjoint_ids_do_not_interfere() {
        let registry: TraceRegistry<String, Options> = TraceRegistry::new();
        let threads = 8;
        let max_calls = budget(4);

        let handles: Vec<_> = (0..threads)
            .map(|n| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let id = format!("trace-{n}");
                    registry
                        .start_or_advance(id.clone(), max_calls, options())
                        .unwrap();
                    for call in 1..=max_calls.get() {
                        registry.stop(&id).unwrap();
                        let outcome = registry
                            .start_or_advance(id.clone(), max_calls, options())
                            .unwrap();
                        if call == max_calls.get() {
                            assert_eq!(
                                outcome,
                                StartOutcome::EndTrace {
                                    id: id.clone(),
                                    calls: max_calls.get(),
                                    options: options(),
                                }
                            );
                        } else {
                            assert_eq!(outcome, StartOutcome::Started { id: id.clone() });
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), threads);
        for n in 0..threads {
            let record = registry.record(&format!("trace-{n}")).unwrap().unwrap();
            assert_eq!(record.calls(), max_calls.get());
        }
    }

    #[test]
    fn contended_id_stays_consistent() {
        let registry: TraceRegistry<&str, Options> = TraceRegistry::new();
        let threads = 8;
        let iterations = 100;
        let max_calls = budget(1_000_000);

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for _ in 0..iterations {
                        // The first stop may lose the race with creation.
                        let _ = registry.stop(&"shared");
                        registry
                            .start_or_advance("shared", max_calls, options())
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 1);
        let record = registry.record(&"shared").unwrap().unwrap();
        // Each counted call required an observed stop/start pair; the total
        // can never exceed the number of pairs issued.
        assert!(record.calls() <= (threads * iterations) as u64);
    }
}
