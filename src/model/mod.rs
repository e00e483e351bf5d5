//! SAGAN generator and discriminator built on burn modules.

mod attention;
mod discriminator;
mod generator;
pub mod layers;

pub use attention::SelfAttention;
pub use discriminator::Discriminator;
pub use generator::Generator;
