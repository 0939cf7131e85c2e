#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod context;
pub mod gate;
pub mod hooks;
pub mod provision;
pub mod saml;
pub mod session;
pub mod store;
pub mod tokens;

#[cfg(feature = "fs-backend")]
#[cfg_attr(docsrs, doc(cfg(feature = "fs-backend")))]
pub mod fs_backend;

#[cfg(feature = "fs-backend")]
mod base64_serde;

mod error;

pub use error::*;
