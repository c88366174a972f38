pub mod capture;
pub mod engine;
pub mod volume_monitor;

#[cfg(test)]
pub(crate) mod test_support;
