pub mod api;
pub mod instrumented;

pub use api::{build_router, AppState};
pub use instrumented::InstrumentedAuthorizer;
