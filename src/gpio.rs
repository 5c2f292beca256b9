//! GPIO buzzer collaborator port. Out of scope for the core; present as a
//! trait with a null implementation so the core compiles and runs without
//! any physical GPIO library attached.

pub trait GpioPort: Send + Sync {
    fn pulse(&self, millis: u64);
}

#[derive(Debug, Default)]
pub struct NullGpioPort;

impl GpioPort for NullGpioPort {
    fn pulse(&self, _millis: u64) {}
}
