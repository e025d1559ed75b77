pub mod store;
pub mod token;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_server;
