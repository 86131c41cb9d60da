pub mod cache;
pub mod registry;
pub mod symbols;
pub mod updater;

pub use cache::{PriceCache, PriceSnapshot};
pub use registry::ClientRegistry;
pub use symbols::ActiveSymbolResolver;
pub use updater::{HelloMessage, LivePricesMessage, PriceUpdater};
