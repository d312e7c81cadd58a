//
// bootstrap.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! The two-thread construction handshake.
//!
//! The host thread and the service thread build the kernel in a fixed order:
//! the stream layer first (on the service loop), then the engine (on the
//! engine's home thread). `BootstrapCoordinator` is the one place where the
//! pieces built on one thread are handed to the other. A single mutex guards
//! the state and everything published with it, and a single condition
//! variable is notified on every transition.

use std::sync::{Condvar, Mutex, MutexGuard};

use crate::engine::{Engine, EngineHandle};
use crate::error::BKError;

/// Bootstrap progress. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootstrapState {
    /// Nothing has been published yet
    Init,

    /// The stream multiplexers exist and are bound to the service loop
    StreamsReady,

    /// The engine exists and its handle has been published
    EngineReady,
}

struct Handoff<S> {
    state: BootstrapState,

    /// Published with `StreamsReady`; taken by whoever builds the engine
    streams: Option<S>,

    /// Published with `EngineReady`
    engine: Option<EngineHandle>,

    /// An engine built off the service thread, waiting to be run there
    pending: Option<Box<dyn Engine>>,

    /// Set when one side gives up; wakes every waiter
    abandoned: Option<String>,
}

/// Coordinates construction across the host thread and the service thread.
///
/// `S` is the bundle of stream multiplexers published at `StreamsReady`.
pub struct BootstrapCoordinator<S> {
    handoff: Mutex<Handoff<S>>,
    changed: Condvar,
}

impl<S> Default for BootstrapCoordinator<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> BootstrapCoordinator<S> {
    pub fn new() -> Self {
        Self {
            handoff: Mutex::new(Handoff {
                state: BootstrapState::Init,
                streams: None,
                engine: None,
                pending: None,
                abandoned: None,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Handoff<S>> {
        // Nothing under the lock panics between a transition's checks and its
        // updates, so a poisoned handoff is still consistent.
        match self.handoff.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The current state.
    pub fn state(&self) -> BootstrapState {
        self.lock().state
    }

    fn advance(handoff: &mut Handoff<S>, to: BootstrapState) -> Result<(), BKError> {
        let expected = match to {
            BootstrapState::Init => None,
            BootstrapState::StreamsReady => Some(BootstrapState::Init),
            BootstrapState::EngineReady => Some(BootstrapState::StreamsReady),
        };
        if expected != Some(handoff.state) {
            return Err(BKError::BootstrapOrder {
                from: handoff.state,
                to,
            });
        }
        log::debug!("Bootstrap state {:?} => {:?}", handoff.state, to);
        handoff.state = to;
        Ok(())
    }

    /// Publish the stream multiplexers: `Init => StreamsReady`.
    pub fn publish_streams(&self, streams: S) -> Result<(), BKError> {
        let mut handoff = self.lock();
        Self::advance(&mut handoff, BootstrapState::StreamsReady)?;
        handoff.streams = Some(streams);
        self.changed.notify_all();
        Ok(())
    }

    /// Publish the engine: `StreamsReady => EngineReady`.
    ///
    /// `pending` carries the engine itself when it was built on a thread
    /// other than the one that will run it.
    pub fn publish_engine(
        &self,
        handle: EngineHandle,
        pending: Option<Box<dyn Engine>>,
    ) -> Result<(), BKError> {
        let mut handoff = self.lock();
        Self::advance(&mut handoff, BootstrapState::EngineReady)?;
        handoff.engine = Some(handle);
        handoff.pending = pending;
        self.changed.notify_all();
        Ok(())
    }

    /// Give up on the bootstrap. Threads blocked in any of the waits wake
    /// with `BKError::BootstrapAbandoned`. The state itself is unchanged.
    pub fn abandon(&self, reason: &str) {
        let mut handoff = self.lock();
        if handoff.abandoned.is_none() {
            log::error!("Bootstrap abandoned in state {:?}: {}", handoff.state, reason);
            handoff.abandoned = Some(reason.to_string());
        }
        self.changed.notify_all();
    }

    /// Block until the state is at least `state`.
    fn wait_until(&self, state: BootstrapState) -> Result<MutexGuard<'_, Handoff<S>>, BKError> {
        let guard = self.lock();
        let guard = match self
            .changed
            .wait_while(guard, |h| h.state < state && h.abandoned.is_none())
        {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.state < state {
            let reason = guard.abandoned.clone().unwrap_or_default();
            return Err(BKError::BootstrapAbandoned(reason));
        }
        Ok(guard)
    }

    /// Block until the state is at least `state`, then return the state
    /// actually observed.
    pub fn wait_for(&self, state: BootstrapState) -> Result<BootstrapState, BKError> {
        Ok(self.wait_until(state)?.state)
    }

    /// Block until the streams are published, then take them. Only one
    /// party gets them.
    pub fn take_streams(&self) -> Result<S, BKError> {
        let mut handoff = self.wait_until(BootstrapState::StreamsReady)?;
        handoff.streams.take().ok_or(BKError::StreamsTaken)
    }

    /// Block until the engine is published and return its handle.
    pub fn wait_engine(&self) -> Result<EngineHandle, BKError> {
        let handoff = self.wait_until(BootstrapState::EngineReady)?;
        match handoff.engine {
            Some(ref handle) => Ok(handle.clone()),
            None => Err(BKError::BootstrapAbandoned(String::from(
                "engine published without a handle",
            ))),
        }
    }

    /// Block until the engine is published and take the engine built on
    /// another thread.
    pub fn take_pending_engine(&self) -> Result<Box<dyn Engine>, BKError> {
        let mut handoff = self.wait_until(BootstrapState::EngineReady)?;
        handoff.pending.take().ok_or_else(|| {
            BKError::BootstrapAbandoned(String::from("no engine was handed over"))
        })
    }
}
