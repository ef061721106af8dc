pub mod hydrate;

pub use hydrate::hydrate;
