//! # dice-session
//!
//! Client-side session controller for a server-authoritative odd/even dice
//! game played over a persistent WebSocket connection.
//!
//! The server owns randomness and the wallet. This crate authenticates,
//! synchronizes the wallet, places bets one at a time, reconciles confirmed
//! rolls into local state and captures every frame exchanged. Presentation
//! layers drive it through a [`service::SessionHandle`] and observe it
//! through [`domain::SessionEvent`]s.
//!
//! ## Architecture
//!
//! ```text
//! Presentation (console, UI)
//!     │  intents ▲ events
//!     ├── SessionHandle ──► SessionClient loop (service/)
//!     │
//!     ├── SessionController (service/)
//!     │     ├── BetController ── HistoryLog (domain/)
//!     │     └── SessionProtocol (ws/)
//!     │           ├── FrameLog (domain/)
//!     │           └── ConnectionManager (ws/)
//!     │
//!     └── Dice authority (WebSocket, JSON frames)
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;
