//! Log rotation decisions

pub mod policy;
