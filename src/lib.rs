pub mod class_file;
pub mod virtual_machine;

pub use virtual_machine::config::VmConfig;
pub use virtual_machine::value::Value;
pub use virtual_machine::Fault;
pub use virtual_machine::LoadError;
pub use virtual_machine::VMError;
pub use virtual_machine::VirtualMachine;
