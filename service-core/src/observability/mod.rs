pub mod logging;

pub use logging::{init_tracing, json_layer};
