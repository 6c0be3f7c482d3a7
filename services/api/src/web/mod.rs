pub mod protocol;
pub mod rest;
pub mod state;
pub mod timers;

// Re-export the handlers and OpenAPI definition to make them easily
// accessible to the binary that will build the web server router.
pub use rest::ApiDoc;
pub use state::AppState;
