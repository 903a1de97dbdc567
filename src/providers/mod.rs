pub mod caching;
pub mod util;
pub mod yahoo_finance;

pub use caching::CachingPriceLoader;
pub use yahoo_finance::YahooFinanceProvider;
