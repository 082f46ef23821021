pub mod virtual_machine;

// Re-export types
pub use virtual_machine::{VirtualMachine, VirtualMachineSpec};
