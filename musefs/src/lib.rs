// Library crate for musefs: catalog building, the virtual tree and the FUSE
// adapter, shared by the CLI binary and the integration tests.

pub mod catalog;
pub mod fuse;
pub mod vfs;
