#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "tokens")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokens")))]
pub mod tokens;
