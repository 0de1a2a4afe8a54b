pub mod eligibility;
pub mod picks;
pub mod results;
pub mod schedule_fetcher;
pub mod season;
pub mod standings;

pub use picks::*;
pub use results::*;
pub use schedule_fetcher::*;
pub use season::*;
pub use standings::*;
