//! Bridge register protocol.
//!
//! Provides the register map shared with the device and the bounded polling
//! primitive every status wait goes through.

pub mod poll;
pub mod regs;

pub use poll::{PollOutcome, PollPolicy, poll_until};
pub use regs::{Command, Status};
