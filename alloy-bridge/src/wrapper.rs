//! Reflective wrapper layer.
//!
//! The host's internal classes carry obfuscated names; wrappers provide a
//! stable façade mapping used by both bridge methods and mod code. This does
//! not attempt to mimic dynamic lookup with runtime proxies: each façade
//! operation is backed by a [`WrapperSlot`]
//! that performs the obfuscated-name lookup once, through a host-supplied
//! [`HostReflector`], and memoizes the result for the rest of the process.

use std::any::Any;
use std::sync::Arc;

use custom_error::custom_error;
use once_cell::sync::OnceCell;

custom_error! {pub BridgeError
    Unresolvable { facade_op: String, host_class: String, host_op: String } =
        "could not resolve host operation '{host_op}' on '{host_class}' for façade operation '{facade_op}'",
}

/// An opaque, resolved accessor for one host operation. What it actually
/// holds (a method handle, a field accessor, ...) is a matter between the
/// [`HostReflector`] implementation and the wrapper method that downcasts
/// it back; the bridge itself only moves it around and memoizes it.
#[derive(Clone)]
pub struct HostAccessor(Arc<dyn Any + Send + Sync>);

impl HostAccessor {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        HostAccessor(Arc::new(value))
    }

    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

/// The host-supplied contract the bridge consumes but does not implement. A
/// production embedding backs this with whatever reflective API the host
/// exposes.
pub trait HostReflector: Send + Sync {
    fn resolve(&self, host_class: &str, host_op: &str) -> Result<HostAccessor, BridgeError>;
}

/// One façade-operation → host-operation mapping. Resolution happens at
/// most once per process lifetime and is memoized; resolution failure is
/// only fatal the first time a mod actually exercises the operation.
pub struct WrapperSlot {
    host_class: &'static str,
    host_op: &'static str,
    cell: OnceCell<HostAccessor>,
}

impl WrapperSlot {
    pub const fn new(host_class: &'static str, host_op: &'static str) -> Self {
        WrapperSlot {
            host_class,
            host_op,
            cell: OnceCell::new(),
        }
    }

    pub fn resolve(
        &self,
        facade_op: &'static str,
        reflector: &dyn HostReflector,
    ) -> Result<&HostAccessor, BridgeError> {
        self.cell.get_or_try_init(|| {
            reflector
                .resolve(self.host_class, self.host_op)
                .map_err(|_| self.unresolvable(facade_op))
        })
    }

    /// Builds the `Unresolvable` error for `facade_op` against this slot's
    /// host class/operation. Shared by resolution failure and by downcast
    /// failure, since a resolved accessor of the wrong concrete type is the
    /// same "cannot actually be invoked" failure as a reflector miss.
    pub fn unresolvable(&self, facade_op: &'static str) -> BridgeError {
        BridgeError::Unresolvable {
            facade_op: facade_op.to_string(),
            host_class: self.host_class.to_string(),
            host_op: self.host_op.to_string(),
        }
    }
}

/// A stable identifier for a host entity (player, world, ...). Required to
/// be stable across dispatches, unlike the wrapper that produced it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostId(pub String);

/// A façade over a raw host player object. Created on demand when an event
/// fires, released when dispatch returns; only the [`HostId`] it reports is
/// meant to outlive that window.
pub struct PlayerWrapper<'a> {
    reflector: &'a dyn HostReflector,
    display_name_slot: &'static WrapperSlot,
    send_message_slot: &'static WrapperSlot,
    unique_id_slot: &'static WrapperSlot,
}

static PLAYER_DISPLAY_NAME: WrapperSlot = WrapperSlot::new("net.host.EntityPlayer", "func_a1b2");
static PLAYER_SEND_MESSAGE: WrapperSlot = WrapperSlot::new("net.host.EntityPlayer", "func_c3d4");
static PLAYER_UNIQUE_ID: WrapperSlot = WrapperSlot::new("net.host.EntityPlayer", "field_e5f6");

impl<'a> PlayerWrapper<'a> {
    pub fn new(reflector: &'a dyn HostReflector) -> Self {
        PlayerWrapper {
            reflector,
            display_name_slot: &PLAYER_DISPLAY_NAME,
            send_message_slot: &PLAYER_SEND_MESSAGE,
            unique_id_slot: &PLAYER_UNIQUE_ID,
        }
    }

    /// Test-only seam: the production slots are process-wide statics so that
    /// resolution really does happen at most once per facade operation, but
    /// that same memoization would let one test's successful resolution leak
    /// into another test's `PlayerWrapper` if they all shared it. Each test
    /// instead supplies its own slots, scoped to that test alone.
    #[cfg(test)]
    fn with_slots(
        reflector: &'a dyn HostReflector,
        display_name_slot: &'static WrapperSlot,
        send_message_slot: &'static WrapperSlot,
        unique_id_slot: &'static WrapperSlot,
    ) -> Self {
        PlayerWrapper {
            reflector,
            display_name_slot,
            send_message_slot,
            unique_id_slot,
        }
    }

    /// Read operation: no observable side effect on the host.
    pub fn display_name(&self) -> Result<String, BridgeError> {
        let accessor = self.display_name_slot.resolve("display_name", self.reflector)?;
        accessor
            .downcast_ref::<fn() -> String>()
            .map(|f| f())
            .ok_or_else(|| self.display_name_slot.unresolvable("display_name"))
    }

    /// Mutate operation: invokes a host method with an observable
    /// in-game side effect.
    pub fn send_message(&self, message: &str) -> Result<(), BridgeError> {
        let accessor = self.send_message_slot.resolve("send_message", self.reflector)?;
        let f = accessor
            .downcast_ref::<fn(&str)>()
            .ok_or_else(|| self.send_message_slot.unresolvable("send_message"))?;
        f(message);
        Ok(())
    }

    /// Identity operation: stable across dispatches for the same player.
    pub fn unique_id(&self) -> Result<HostId, BridgeError> {
        let accessor = self.unique_id_slot.resolve("unique_id", self.reflector)?;
        accessor
            .downcast_ref::<HostId>()
            .cloned()
            .ok_or_else(|| self.unique_id_slot.unresolvable("unique_id"))
    }
}

/// The server façade upgrades from a stub to a fully reflective wrapper on
/// the host's server-start completion, and reverts on server-stop (spec
/// §4.5.2 "Server lifecycle").
pub enum ServerFacade {
    Stub,
    Full(Arc<HostId>),
}

impl ServerFacade {
    pub fn is_full(&self) -> bool {
        matches!(self, ServerFacade::Full(_))
    }
}
