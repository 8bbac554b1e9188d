//! Page side: the observer tree for one document and the controller that
//! replaces it when the host asks for a reset.

mod aggregator;
mod controller;

pub use aggregator::{Control, PageAggregator, PageProperty};
pub use controller::PageController;
