//! Class files in two stages: `unvalidated` is what the bytes say, `validated` is what the
//! virtual machine is willing to run.

pub mod descriptor;
pub mod unvalidated;
pub mod validated;
