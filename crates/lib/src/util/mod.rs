pub mod hash;
pub mod path;
pub mod shell;

#[cfg(test)]
pub mod testutil;
