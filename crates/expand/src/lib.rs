//! # guesstz-expand
//!
//! Turns a rule-based timezone definition into a concrete, time-windowed
//! sequence of UTC-offset changes ("observances").
//!
//! A zone definition is an unordered set of [`RuleComponent`]s, each carrying
//! a local start instant, the offset in effect before and after it, an
//! optional yearly repetition and optional explicit extra instants. The
//! expansion engine normalizes every instant to UTC, clips the result to a
//! half-open [`Window`], and synthesizes a *tombstone* observance at the
//! window start whenever the zone's true history begins before the window.
//!
//! ## Key properties
//! - **Ascending, unique onsets**: the returned sequence is sorted by onset
//!   and never contains two observances at the same instant.
//! - **Windowed**: with a closed window no onset is ever `>=` the window end.
//! - **Pure**: inputs are never mutated; expanding twice with identical
//!   arguments yields identical results.
//!
//! ## Example
//! ```rust
//! use guesstz_expand::{expand, RuleComponent, Window, ZoneDefinition};
//! use jiff::civil;
//!
//! let zone = ZoneDefinition {
//!     components: vec![RuleComponent {
//!         start: civil::datetime(1970, 1, 1, 0, 0, 0, 0),
//!         offset_from: 0,
//!         offset_to: 3600,
//!         daylight: false,
//!         repeat: None,
//!         extra_dates: vec![],
//!     }],
//! };
//! let window = Window::closed(
//!     "2000-01-01T00:00:00Z".parse().unwrap(),
//!     "2032-01-01T00:00:00Z".parse().unwrap(),
//! )
//! .unwrap();
//!
//! let expansion = expand(&zone, window).unwrap();
//! // The whole history predates the window, so it collapses to a single
//! // tombstone observance at the window start.
//! assert_eq!(expansion.observances.len(), 1);
//! assert_eq!(expansion.observances[0].offset, 3600);
//! ```

mod expand;
mod model;

pub use expand::{expand, ExpandError, Expansion};
pub use model::{
    ByDay, Observance, Repeat, RuleComponent, Tombstone, Weekday, Window, ZoneDefinition,
};
