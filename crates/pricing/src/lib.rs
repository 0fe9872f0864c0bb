//! Pure option pricing for defined-risk spreads.

pub mod black_scholes;
pub mod kernel;

pub use black_scholes::{normal_cdf, normal_pdf, price_option, probability_above, OptionQuote};
pub use kernel::BlackScholesKernel;
