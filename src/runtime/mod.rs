//! Runtime contracts consumed by emitted code: the NaN-boxed value
//! representation, object-layout byte offsets, the per-thread glue area
//! with its dense dispatch tables, and the call-signature registry.

pub mod layout;
pub mod signature;
pub mod thread;
pub mod value;

pub use signature::{CallConv, CallSignature, SignatureRegistry, TargetKind};
pub use thread::VmThread;
pub use value::TaggedValue;
