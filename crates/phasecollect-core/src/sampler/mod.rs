//! Hardware sequencing for a coherent capture
//!
//! - [`clock`]: share one reference oscillator between the two radios
//! - [`channel`]: RF front-end setup and read-back
//! - [`trigger`]: arm/fire/disarm protocol on the shared trigger line
//! - [`stream`]: block-buffered synchronous receive into owned buffers
//! - [`session`]: one capture end to end, with teardown on every exit path

pub mod channel;
pub mod clock;
pub mod session;
pub mod stream;
pub mod trigger;
