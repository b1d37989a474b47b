pub mod errors;
pub mod fs;
