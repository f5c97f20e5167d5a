pub mod coindesk;
pub mod fetcher;
pub mod retry;
pub mod simulated;

pub use coindesk::CoinDeskSource;
pub use fetcher::{PriceFetcher, PriceSource};
pub use simulated::SimulatedSource;
