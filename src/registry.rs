//! Device registry: opens camera interfaces and owns their sessions.
//!
//! Sessions live in a slot arena. A [`SessionHandle`] is a slot index plus
//! the slot's generation at the time the session was opened, so a handle
//! kept after `close()` is detected instead of silently naming whatever
//! session later reuses the slot.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::Config;
use crate::error::{CamError, CamResult};
use crate::module::ModuleState;
use crate::session::Session;
use crate::transport::{DeviceAddress, DeviceTransport};

const INDEX_SHIFT: u32 = 32;

/// Opaque session identifier, packed as `index << 32 | generation`.
///
/// Generations start at 1, so a raw value of `0` never names a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    index: u32,
    generation: u32,
}

impl SessionHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self {
            index: (raw >> INDEX_SHIFT) as u32,
            generation: raw as u32,
        }
    }

    pub fn raw(&self) -> u64 {
        ((self.index as u64) << INDEX_SHIFT) | self.generation as u64
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl From<u64> for SessionHandle {
    fn from(raw: u64) -> Self {
        Self::from_raw(raw)
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.raw())
    }
}

#[derive(Debug)]
struct Slot {
    /// Generation of the most recent session placed in this slot
    generation: u32,
    /// Module epoch the session was opened in
    epoch: u64,
    session: Option<Arc<Session>>,
}

/// Opens devices and hands out session handles.
pub struct Registry {
    module: ModuleState,
    transport: Arc<dyn DeviceTransport>,
    config: Config,
    slots: Mutex<Vec<Slot>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("initialized", &self.module.is_initialized())
            .field("open_sessions", &self.open_sessions().len())
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new(module: ModuleState, transport: Arc<dyn DeviceTransport>) -> Self {
        Self::with_config(module, transport, Config::default())
    }

    pub fn with_config(
        module: ModuleState,
        transport: Arc<dyn DeviceTransport>,
        config: Config,
    ) -> Self {
        Self {
            module,
            transport,
            config,
            slots: Mutex::new(Vec::new()),
        }
    }

    pub fn module(&self) -> &ModuleState {
        &self.module
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bring the module to the Initialized state. Calling it again is a no-op.
    pub fn initialize_module(&self) {
        if self.module.initialize() {
            log::info!("Camera module initialized (epoch {})", self.module.epoch());
        } else {
            log::debug!("Camera module already initialized");
        }
    }

    /// Close every open session and return the module to Uninitialized.
    ///
    /// Sessions are detached and the module flag cleared under the slot
    /// lock, so an open racing with teardown either lands before it (and is
    /// closed here) or sees the module uninitialized.
    pub fn teardown_module(&self) {
        let (sessions, was_initialized) = {
            let mut slots = self.slots();
            let sessions: Vec<Arc<Session>> = slots
                .iter_mut()
                .filter_map(|slot| slot.session.take())
                .collect();
            (sessions, self.module.teardown())
        };

        for session in &sessions {
            session.close();
        }
        if was_initialized {
            log::info!("Camera module torn down, {} session(s) closed", sessions.len());
        }
    }

    /// Detect and open the camera at `address` (dotted IPv4).
    ///
    /// Every successful call yields a new handle, even for an address that
    /// already has an open session.
    ///
    /// # Errors
    /// * `NotInitialized` - `initialize_module()` has not been called
    /// * `DeviceUnreachable` - the address is malformed or no device answered
    pub fn open_by_address(&self, address: &str) -> CamResult<SessionHandle> {
        if !self.module.is_initialized() {
            return Err(CamError::NotInitialized {
                operation: "open_by_address",
            });
        }

        let parsed: DeviceAddress = address.parse().map_err(|e| CamError::DeviceUnreachable {
            address: address.to_string(),
            message: format!("not a valid IPv4 address: {}", e),
        })?;

        let epoch = self.module.epoch();
        let conn = self.transport.connect(&parsed).map_err(|e| {
            log::warn!("Failed to open device at {}: {}", parsed, e);
            CamError::DeviceUnreachable {
                address: parsed.to_string(),
                message: e.to_string(),
            }
        })?;

        // Device queries run without the slot lock so a slow device does not
        // stall lookups on other sessions.
        let mut session = Session::open(parsed, conn, &self.config).map_err(|e| {
            log::warn!("Device at {} answered but could not be queried: {}", parsed, e);
            e
        })?;

        let mut slots = self.slots();
        if !self.module.is_initialized() || self.module.epoch() != epoch {
            drop(slots);
            session.close();
            log::warn!("Module torn down while opening {}, connection released", parsed);
            return Err(CamError::NotInitialized {
                operation: "open_by_address",
            });
        }

        let (index, generation) = match slots.iter().position(|slot| slot.session.is_none()) {
            Some(index) => (index, next_generation(slots[index].generation)),
            None => {
                slots.push(Slot {
                    generation: 0,
                    epoch,
                    session: None,
                });
                (slots.len() - 1, 1)
            }
        };

        let handle = SessionHandle {
            index: index as u32,
            generation,
        };
        session.assign_handle(handle.raw());

        let slot = &mut slots[index];
        slot.generation = generation;
        slot.epoch = epoch;
        slot.session = Some(Arc::new(session));
        drop(slots);

        log::info!("Opened session {} for device at {}", handle, parsed);
        Ok(handle)
    }

    /// Release a session. Later calls with `handle` fail `InvalidHandle`.
    pub fn close(&self, handle: SessionHandle) -> CamResult<()> {
        let session = {
            let mut slots = self.slots();
            self.resolve(&slots, handle)?;
            slots[handle.index as usize].session.take()
        };
        if let Some(session) = session {
            session.close();
        }
        Ok(())
    }

    /// Look up a live session.
    ///
    /// # Errors
    /// * `Uninitialized` - module not initialized, or handle never issued
    /// * `InvalidHandle` - the session has been closed
    pub fn session(&self, handle: SessionHandle) -> CamResult<Arc<Session>> {
        let slots = self.slots();
        self.resolve(&slots, handle).map(Arc::clone)
    }

    fn resolve<'a>(&self, slots: &'a [Slot], handle: SessionHandle) -> CamResult<&'a Arc<Session>> {
        let raw = handle.raw();
        if !self.module.is_initialized() {
            return Err(CamError::Uninitialized { handle: raw });
        }

        let slot = match slots.get(handle.index as usize) {
            Some(slot) if handle.generation != 0 && handle.generation <= slot.generation => slot,
            _ => return Err(CamError::Uninitialized { handle: raw }),
        };

        match &slot.session {
            Some(session) if slot.generation == handle.generation && slot.epoch == self.module.epoch() => {
                Ok(session)
            }
            _ => {
                log::debug!("Rejected stale handle {}", handle);
                Err(CamError::InvalidHandle { handle: raw })
            }
        }
    }

    /// Handles of every open session, in slot order.
    pub fn open_sessions(&self) -> Vec<SessionHandle> {
        self.slots()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.session.is_some())
            .map(|(index, slot)| SessionHandle {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }
}

fn next_generation(generation: u32) -> u32 {
    match generation.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}
