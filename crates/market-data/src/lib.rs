//! Market data collaborators: the volatility indicator feeding adaptive
//! cadence, and the scanners feeding opportunity discovery.

pub mod scanner;
pub mod yahoo;

pub use scanner::{build_scanner, HttpScanner, WatchlistScanner};
pub use yahoo::{QuoteClient, QuoteIndicatorSource};
