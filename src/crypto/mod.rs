pub mod certinfo;
pub mod reader;
pub mod verify;

pub use certinfo::CertInfo;
pub use verify::{CertRole, VerifyPolicy};
