pub mod crisis;
pub mod system;
