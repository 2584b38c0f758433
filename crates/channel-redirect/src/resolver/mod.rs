//! Channel resolution: the mirror race and the redirect decision around it.

pub mod decision;
pub mod race;

pub use decision::{resolve, RedirectTarget, ResolveError, ResolvedBy};
pub use race::Prober;
