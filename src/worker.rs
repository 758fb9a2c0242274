//! Channel-driven registry facade for async callers.
//!
//! A [`RegistryWorker`] owns the trace table outright and serializes every
//! operation by consuming requests from a single mpsc channel; callers hold a
//! cloneable [`RegistryHandle`] and receive replies over per-request oneshot
//! channels. The worker exits on an explicit [`RegistryMessage::Shutdown`] or
//! once every handle has been dropped.

use std::fmt;
use std::hash::Hash;
use std::num::NonZeroU64;

use futures_channel::{mpsc, oneshot};
use futures_util::{SinkExt, StreamExt};

use crate::error::TraceRegistryError;
use crate::registry::{StartOutcome, StoppedTrace, TraceTable};
use crate::registry_debug;

/// Requests understood by [`RegistryWorker`].
///
/// The set is closed: a request that cannot be expressed as one of these
/// variants cannot be sent to the worker at all, so there is no path for
/// unexpected messages to be silently acknowledged.
#[derive(Debug)]
pub enum RegistryMessage<I, O> {
    /// Create or advance a trace, replying with the outcome.
    StartOrAdvance {
        /// Trace identifier.
        id: I,
        /// Call-count budget; only read when the trace is created.
        max_calls: NonZeroU64,
        /// Opaque options carried through to the trace's reports.
        options: O,
        /// Reply channel for this request.
        respond_to: oneshot::Sender<Result<StartOutcome<I, O>, TraceRegistryError>>,
    },
    /// Deactivate a trace, replying with its current call count and options.
    Stop {
        /// Trace identifier.
        id: I,
        /// Reply channel for this request.
        respond_to: oneshot::Sender<Result<StoppedTrace<I, O>, TraceRegistryError>>,
    },
    /// Stop the worker loop. Requests queued ahead of this message are still
    /// served.
    Shutdown,
}

/// Create a connected handle/worker pair with the given channel capacity.
pub fn pair<I, O>(buffer: usize) -> (RegistryHandle<I, O>, RegistryWorker<I, O>)
where
    I: Eq + Hash + Clone + fmt::Debug,
    O: Clone + PartialEq,
{
    let (sender, receiver) = mpsc::channel(buffer);
    (
        RegistryHandle { sender },
        RegistryWorker {
            receiver,
            table: TraceTable::new(),
        },
    )
}

/// Worker task owning the trace table.
#[derive(Debug)]
pub struct RegistryWorker<I, O> {
    receiver: mpsc::Receiver<RegistryMessage<I, O>>,
    table: TraceTable<I, O>,
}

impl<I, O> RegistryWorker<I, O>
where
    I: Eq + Hash + Clone + fmt::Debug,
    O: Clone + PartialEq,
{
    /// Process requests until shutdown.
    ///
    /// Requests are handled strictly in arrival order, one at a time, so each
    /// caller's check-then-mutate sequence is atomic with respect to every
    /// other caller's.
    pub async fn process(&mut self) {
        loop {
            match self.receiver.next().await {
                None => {
                    // All handles have been dropped.
                    self.receiver.close();
                    registry_debug!(name: "RegistryWorker.Shutdown", reason = "handles dropped");
                    return;
                }
                Some(RegistryMessage::Shutdown) => {
                    self.receiver.close();
                    registry_debug!(name: "RegistryWorker.Shutdown", reason = "explicit");
                    return;
                }
                Some(RegistryMessage::StartOrAdvance {
                    id,
                    max_calls,
                    options,
                    respond_to,
                }) => {
                    let reply = self.table.start_or_advance(id, max_calls, options);
                    if respond_to.send(reply).is_err() {
                        registry_debug!(
                            name: "RegistryWorker.ReplyDropped",
                            operation = "start_or_advance"
                        );
                    }
                }
                Some(RegistryMessage::Stop { id, respond_to }) => {
                    let reply = self.table.stop(&id);
                    if respond_to.send(reply).is_err() {
                        registry_debug!(name: "RegistryWorker.ReplyDropped", operation = "stop");
                    }
                }
            }
        }
    }
}

/// Cloneable client for a [`RegistryWorker`].
#[derive(Clone, Debug)]
pub struct RegistryHandle<I, O> {
    sender: mpsc::Sender<RegistryMessage<I, O>>,
}

impl<I, O> RegistryHandle<I, O>
where
    I: Eq + Hash + Clone + fmt::Debug,
    O: Clone + PartialEq,
{
    /// Create or advance the trace for `id`. See
    /// [`TraceRegistry::start_or_advance`](crate::TraceRegistry::start_or_advance)
    /// for the state machine.
    pub async fn start_or_advance(
        &self,
        id: I,
        max_calls: NonZeroU64,
        options: O,
    ) -> Result<StartOutcome<I, O>, TraceRegistryError> {
        let (respond_to, response) = oneshot::channel();
        let mut sender = self.sender.clone();
        sender
            .send(RegistryMessage::StartOrAdvance {
                id,
                max_calls,
                options,
                respond_to,
            })
            .await
            .map_err(|err| {
                TraceRegistryError::InternalFailure(format!(
                    "failed to send registry request: {err}"
                ))
            })?;
        response.await.map_err(|_| {
            TraceRegistryError::InternalFailure("registry worker dropped the reply".to_string())
        })?
    }

    /// Deactivate the trace for `id`. See
    /// [`TraceRegistry::stop`](crate::TraceRegistry::stop) for the reply
    /// semantics.
    pub async fn stop(&self, id: I) -> Result<StoppedTrace<I, O>, TraceRegistryError> {
        let (respond_to, response) = oneshot::channel();
        let mut sender = self.sender.clone();
        sender
            .send(RegistryMessage::Stop { id, respond_to })
            .await
            .map_err(|err| {
                TraceRegistryError::InternalFailure(format!(
                    "failed to send registry request: {err}"
                ))
            })?;
        response.await.map_err(|_| {
            TraceRegistryError::InternalFailure("registry worker dropped the reply".to_string())
        })?
    }

    /// Ask the worker to exit once all requests queued ahead of this message
    /// have been served.
    pub async fn shutdown(&self) -> Result<(), TraceRegistryError> {
        let mut sender = self.sender.clone();
        sender
            .send(RegistryMessage::Shutdown)
            .await
            .map_err(|err| {
                TraceRegistryError::InternalFailure(format!(
                    "failed to send shutdown message: {err}"
                ))
            })
    }
}
