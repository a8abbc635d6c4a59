pub mod catalog;
pub mod client;
pub mod console;
pub mod session;
pub mod tooling;

#[cfg(test)]
pub(crate) mod test_support;
