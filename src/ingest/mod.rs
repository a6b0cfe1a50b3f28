pub mod wamis;

#[cfg(test)]
pub(crate) mod fixtures;
