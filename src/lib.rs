//! bm-lastheard - A real-time monitor for the BrandMeister DMR last heard feed.
//!
//! This crate provides:
//! - A nom-based parser for Socket.IO frames and last heard session payloads
//! - Callsign / talkgroup / peer filtering
//! - Fixed-column rendering with names from the RadioID user database
//! - An async WebSocket client and a session controller with a runtime bound
//!
//! # Example
//!
//! ```rust,no_run
//! use bm_lastheard::{EventFormatter, FilterConfig, NoLookup, parse_call_event};
//! use chrono::Utc;
//!
//! let frame = r#"42["mqtt",{"topic":"LH","payload":"{\"Event\":\"Session-Stop\",\"SourceCall\":\"OH6ABC\",\"DestinationID\":244,\"Master\":2441}"}]"#;
//! let event = parse_call_event(frame, Utc::now()).expect("Failed to parse event");
//!
//! let filter = FilterConfig::default().with_talkgroup(244);
//! if filter.matches(&event) {
//!     println!("{}", EventFormatter::new(false).render(&event, &NoLookup));
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod format;
pub mod log_file;
pub mod lookup;
pub mod parser;
pub mod session;

pub use client::{Feed, FeedEvent, LastHeardClient, LastHeardClientConfig, Transport};
pub use config::Config;
pub use error::MonitorError;
pub use event::{CallEvent, EventKind, LinkInfo};
pub use filter::FilterConfig;
pub use format::{DisplayLine, EventFormatter};
pub use log_file::SessionLog;
pub use lookup::{NameLookup, NoLookup, RadioIdDatabase, Subscriber};
pub use parser::{ParseError, looks_like_event, parse_call_event, parse_frame};
pub use session::{SessionController, SessionSettings, ShutdownReason};
