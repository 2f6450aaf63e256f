//! Runtime bridge (component C5): the bytecode class transformer and the
//! reflective wrapper layer it depends on to translate raw host objects
//! into stable façades.

mod bridge;
mod classfile;
pub mod events;
mod transformer;
mod wrapper;

pub use bridge::{
    Bridge, BridgeContext, CommandDescriptor, CommandDispatcherInstaller, CommandInstallError,
    MenuResync, TickDriver,
};
pub use classfile::{ClassFile, ClassFileError, Instruction, MethodBody};
pub use transformer::{CancellationPolicy, ClassTransformer, InjectionPoint, TransformError, TransformationSite};
pub use wrapper::{BridgeError, HostAccessor, HostId, HostReflector, PlayerWrapper, ServerFacade, WrapperSlot};
