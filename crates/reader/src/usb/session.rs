//! Device sessions
//!
//! A `Session` owns one open handle plus the record of what the claim
//! pipeline did to it. The `SessionStore` keeps at most one session per
//! device identity for the lifetime of the run, so repeated poll cycles
//! reuse the claimed handle instead of reopening the device.
//!
//! The store is owned by the USB worker thread and passed by `&mut` to
//! everything that needs a handle; single ownership is what guarantees a
//! device is never opened twice.

use crate::usb::backend::{SensorHandle, UsbBackend};
use crate::usb::lifecycle::{self, ClaimState};
use protocol::{DeviceIdentity, SensorError};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// One open, claimed device
pub struct Session<H: SensorHandle> {
    identity: DeviceIdentity,
    handle: H,
    claim: ClaimState,
    /// The initialisation command has been sent
    initialised: bool,
}

impl<H: SensorHandle> Session<H> {
    fn new(identity: DeviceIdentity, handle: H) -> Self {
        Self {
            identity,
            handle,
            claim: ClaimState::default(),
            initialised: false,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn claim_state(&self) -> &ClaimState {
        &self.claim
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    pub fn mark_initialised(&mut self) {
        self.initialised = true;
    }

    fn claim(&mut self) -> Result<(), SensorError> {
        lifecycle::claim(&mut self.handle, &mut self.claim)
    }

    fn teardown(&mut self) -> Result<(), SensorError> {
        lifecycle::release(&mut self.handle, &mut self.claim)
    }

    /// Release interfaces, restore kernel drivers and close the handle
    pub fn close(mut self) -> Result<(), SensorError> {
        let result = self.teardown();
        debug!("Closed session for {}", self.identity);
        result
    }
}

impl<H: SensorHandle> Drop for Session<H> {
    fn drop(&mut self) {
        if self.claim.needs_teardown() {
            warn!(
                "Session for {} dropped without release, tearing down",
                self.identity
            );
            if let Err(e) = self.teardown() {
                warn!("Teardown of {} failed: {}", self.identity, e);
            }
        }
    }
}

/// Cache of open sessions, keyed by device identity
pub struct SessionStore<H: SensorHandle> {
    sessions: HashMap<DeviceIdentity, Session<H>>,
}

impl<H: SensorHandle> SessionStore<H> {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Return the session for `identity`, opening and claiming it if needed
    ///
    /// A new session is only cached once the claim pipeline succeeded; on a
    /// failed claim whatever was already done is undone and the handle is
    /// closed.
    pub fn acquire<B>(
        &mut self,
        backend: &B,
        identity: &DeviceIdentity,
    ) -> Result<&mut Session<H>, SensorError>
    where
        B: UsbBackend<Handle = H>,
    {
        match self.sessions.entry(*identity) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let handle = backend
                    .open(identity)
                    .map_err(|error| SensorError::DeviceOpen {
                        device: *identity,
                        error,
                    })?;

                let mut session = Session::new(*identity, handle);
                if let Err(e) = session.claim() {
                    if let Err(teardown) = session.teardown() {
                        debug!("Best-effort teardown of {} failed: {}", identity, teardown);
                    }
                    return Err(e);
                }

                info!("Opened session for {}", identity);
                Ok(entry.insert(session))
            }
        }
    }

    /// Tear down and close the session for `identity`
    ///
    /// Returns None if no session was open.
    pub fn release(&mut self, identity: &DeviceIdentity) -> Option<Result<(), SensorError>> {
        let session = self.sessions.remove(identity)?;
        let result = session.close();
        info!("Released session for {}", identity);
        Some(result)
    }

    /// Release every session whose identity is not in `seen`
    ///
    /// Used after a poll cycle to drop sessions of unplugged devices.
    pub fn release_missing(&mut self, seen: &HashSet<DeviceIdentity>) {
        let missing: Vec<DeviceIdentity> = self
            .sessions
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();

        for identity in missing {
            debug!("{} no longer attached", identity);
            if let Some(Err(e)) = self.release(&identity) {
                debug!("Teardown of detached device {} failed: {}", identity, e);
            }
        }
    }

    /// Release every session; returns the teardown failures
    pub fn release_all(&mut self) -> Vec<(DeviceIdentity, SensorError)> {
        let identities: Vec<DeviceIdentity> = self.sessions.keys().copied().collect();

        identities
            .into_iter()
            .filter_map(|id| match self.release(&id) {
                Some(Err(e)) => Some((id, e)),
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.sessions.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<H: SensorHandle> Default for SessionStore<H> {
    fn default() -> Self {
        Self::new()
    }
}
