mod lifecycle;
mod mutations;
pub(crate) mod support;
mod transfers;
