//! Service layer: the bet state machine, the session controller that owns
//! it, and the async loop that drives the controller.

pub mod bet_controller;
pub mod session_client;
pub mod session_controller;

pub use bet_controller::{BetController, RoundResolution, SessionSummary};
pub use session_client::{Intent, SessionClient, SessionHandle};
pub use session_controller::SessionController;
