#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod parker;
mod relax;
mod spin;

pub use parker::Parker;
pub use relax::{LoopRelax, Relax, SpinRelax};
pub use spin::{Spin, SpinGuard};
