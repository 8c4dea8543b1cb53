//! The recurrence expansion engine.
//!
//! `expand` walks every component of a zone definition and collects the
//! UTC-offset changes whose onset falls inside the requested window. Rule
//! starts, repeated instances, and explicit extra instants all go through the
//! same before/equal/after policy against the window start:
//!
//! - *before*: the instant becomes a tombstone candidate and the component is
//!   marked truncated;
//! - *equal*: an exact hit satisfies the window boundary, no tombstone is
//!   needed;
//! - *after*: the instant is emitted as an observance.
//!
//! When every instant of some component precedes the window, the latest
//! candidate's offset is re-emitted as a synthetic observance at exactly the
//! window start, so a sequence whose true history predates the window always
//! begins at the window start.

use std::cmp::Ordering;

use jiff::civil::DateTime;
use jiff::tz::TimeZone;
use jiff::Timestamp;
use thiserror::Error;

use crate::model::{Observance, Repeat, RuleComponent, Tombstone, Window, ZoneDefinition};

#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("invalid window: start {start} is not before end {end}")]
    InvalidWindow { start: Timestamp, end: Timestamp },
    #[error("instant outside the representable time range")]
    OutOfRange(#[from] jiff::Error),
}

/// The result of expanding one zone definition over a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Observances sorted ascending by onset, onsets unique.
    pub observances: Vec<Observance>,
    /// The synthesized pre-window observance, when one was required.
    pub tombstone: Option<Tombstone>,
}

/// Interprets a local wall-clock instant under the given prior offset and
/// returns the UTC onset.
fn to_utc(local: DateTime, offset_from: i32) -> Result<Timestamp, ExpandError> {
    let as_utc = TimeZone::UTC.to_timestamp(local)?;
    Ok(Timestamp::from_second(
        as_utc.as_second() - i64::from(offset_from),
    )?)
}

/// Shifts a UTC instant back to the local wall clock of `offset_from`.
fn to_local(utc: Timestamp, offset_from: i32) -> Result<DateTime, ExpandError> {
    let shifted = Timestamp::from_second(utc.as_second() + i64::from(offset_from))?;
    Ok(TimeZone::UTC.to_datetime(shifted))
}

fn utc_year(at: Timestamp) -> i32 {
    i32::from(TimeZone::UTC.to_datetime(at).year())
}

/// Shared accumulation across all components of one expansion run.
struct Acc {
    observances: Vec<Observance>,
    /// Latest pre-window instant seen so far; supplies the tombstone.
    candidate: Option<Tombstone>,
    /// Cleared as soon as any instant lands exactly on the window start.
    need_tombstone: bool,
}

impl Acc {
    fn emit(&mut self, onset: Timestamp, comp: &RuleComponent) {
        self.observances.push(Observance {
            onset,
            offset: comp.offset_to,
        });
    }

    /// Records a pre-window instant, keeping whichever candidate lies
    /// closest to the window start.
    fn offer_tombstone(&mut self, onset: Timestamp, comp: &RuleComponent) {
        let closer = match &self.candidate {
            Some(current) => onset > current.onset,
            None => true,
        };
        if closer {
            self.candidate = Some(Tombstone {
                onset,
                offset: comp.offset_to,
                daylight: comp.daylight,
            });
        }
    }
}

/// Transient per-component processing state. Truncation and the component's
/// effective start are tracked here instead of rewriting the input rule.
struct CompState<'a> {
    comp: &'a RuleComponent,
    /// Set while the component's start precedes the window and no in-window
    /// instant has replaced it yet.
    truncated: bool,
    /// UTC onset of the component's current effective start.
    effective_start: Timestamp,
    /// Pending explicit local instants, including ones a settled repetition
    /// leaves behind.
    extras: Vec<DateTime>,
}

/// Expands `zone` into its observance sequence over `window`.
pub fn expand(zone: &ZoneDefinition, window: Window) -> Result<Expansion, ExpandError> {
    let mut acc = Acc {
        observances: Vec::new(),
        candidate: None,
        need_tombstone: true,
    };

    for comp in &zone.components {
        expand_component(comp, window, &mut acc)?;
    }

    let tombstone = if acc.need_tombstone {
        acc.candidate.map(|candidate| {
            let tombstone = Tombstone {
                onset: window.start(),
                offset: candidate.offset,
                daylight: candidate.daylight,
            };
            acc.observances.push(Observance {
                onset: tombstone.onset,
                offset: tombstone.offset,
            });
            tombstone
        })
    } else {
        None
    };

    acc.observances.sort_by_key(|ob| ob.onset);
    acc.observances.dedup_by_key(|ob| ob.onset);

    Ok(Expansion {
        observances: acc.observances,
        tombstone,
    })
}

fn expand_component(
    comp: &RuleComponent,
    window: Window,
    acc: &mut Acc,
) -> Result<(), ExpandError> {
    let utc_start = to_utc(comp.start, comp.offset_from)?;

    // Every instant of this component lies on or after the window close.
    if let Some(end) = window.end() {
        if utc_start >= end {
            return Ok(());
        }
    }

    let mut state = CompState {
        comp,
        truncated: false,
        effective_start: utc_start,
        extras: comp.extra_dates.clone(),
    };

    match utc_start.cmp(&window.start()) {
        Ordering::Less => {
            acc.offer_tombstone(utc_start, comp);
            state.truncated = true;
        }
        Ordering::Equal => {
            acc.need_tombstone = false;
            if comp.repeat.is_none() {
                acc.emit(utc_start, comp);
            }
        }
        Ordering::Greater => {
            // A repeating component emits its start through the iteration.
            if comp.repeat.is_none() {
                acc.emit(utc_start, comp);
            }
        }
    }

    if let Some(repeat) = &comp.repeat {
        match repeat.until {
            Some(until) if until < window.start() => {
                // The whole repetition ends before the window opens; its end
                // is the best this component can do for the tombstone.
                acc.offer_tombstone(until, comp);
            }
            _ => iterate_repeat(&mut state, repeat, window, acc)?,
        }
    }

    process_extras(&mut state, window, acc)?;

    Ok(())
}

/// Walks the repetition's instances in chronological order, applying the
/// window policy to each.
fn iterate_repeat(
    state: &mut CompState<'_>,
    repeat: &Repeat,
    window: Window,
    acc: &mut Acc,
) -> Result<(), ExpandError> {
    let comp = state.comp;

    // The repetition outlives a closed window; its end can never be reached
    // inside it.
    let runs_past_end = match (window.end(), repeat.until) {
        (Some(end), Some(until)) => until >= end,
        (Some(_), None) => true,
        (None, _) => false,
    };

    // The iterator works in local wall time, so the UTC bound moves to the
    // component's local clock.
    let local_until = match repeat.until {
        Some(until) => Some(to_local(until, comp.offset_from)?),
        None => None,
    };

    let interval = repeat.interval_years();
    let mut year = i32::from(comp.start.year());
    if state.truncated {
        // Jump to the last phase-aligned year at or before the year ahead
        // of the window open; that instance may still be the latest
        // pre-window instant and must get its chance at the tombstone.
        let target = utc_year(window.start()) - 1;
        if target > year {
            let steps = (target - year) / interval;
            year += steps * interval;
        }
    }

    let mut prev: Option<Timestamp> = None;

    loop {
        if year > 9999 {
            break;
        }
        let local = match repeat.instance(year as i16, comp.start)? {
            Some(local) => local,
            None => {
                year += interval;
                continue;
            }
        };
        if let Some(bound) = local_until {
            if local > bound {
                break;
            }
        }

        let utc = to_utc(local, comp.offset_from)?;

        if runs_past_end {
            if let Some(end) = window.end() {
                if utc >= end {
                    // Settle the repetition at the last processed instance.
                    if let Some(prev) = prev {
                        let ydiff = utc_year(prev) - utc_year(state.effective_start);
                        if ydiff == 1 {
                            // The repetition collapses to one explicit date.
                            state.extras.push(to_local(prev, comp.offset_from)?);
                        }
                        // ydiff == 0 leaves just the start; anything longer
                        // would re-bound the repetition at `prev` instead.
                    }
                    break;
                }
            }
        }

        match utc.cmp(&window.start()) {
            Ordering::Less => acc.offer_tombstone(utc, comp),
            ordering => {
                if ordering == Ordering::Equal {
                    acc.need_tombstone = false;
                }

                let mut collapse = false;
                if state.truncated {
                    // First in-window instance replaces the truncated start.
                    state.effective_start = utc;
                    state.truncated = false;

                    if !runs_past_end {
                        if let Some(bound) = local_until {
                            let ydiff = i32::from(bound.year()) - year;
                            if (0..=1).contains(&ydiff) {
                                // At most one instance remains before the
                                // repetition's end; keep it as an explicit
                                // date and drop the repetition.
                                if ydiff == 1 {
                                    state.extras.push(bound);
                                }
                                collapse = true;
                            }
                        }
                    }
                }

                acc.emit(utc, comp);
                prev = Some(utc);

                if collapse {
                    break;
                }
                if window.end().is_none() && repeat.until.is_none() {
                    // An eternal rule against an open window: one accepted
                    // observance pins the sequence.
                    break;
                }
                year += interval;
                continue;
            }
        }

        prev = Some(utc);
        year += interval;
    }

    Ok(())
}

/// Applies the window policy to the component's explicit extra instants.
fn process_extras(
    state: &mut CompState<'_>,
    window: Window,
    acc: &mut Acc,
) -> Result<(), ExpandError> {
    let comp = state.comp;
    let mut extras = std::mem::take(&mut state.extras);
    extras.sort();

    for (i, local) in extras.into_iter().enumerate() {
        if i == 0 && local == comp.start {
            // A restatement of the start carries no information.
            continue;
        }

        let utc = to_utc(local, comp.offset_from)?;

        if let Some(end) = window.end() {
            if utc >= end {
                continue;
            }
        }

        match utc.cmp(&window.start()) {
            Ordering::Less => acc.offer_tombstone(utc, comp),
            ordering => {
                if ordering == Ordering::Equal {
                    acc.need_tombstone = false;
                }
                if state.truncated {
                    state.effective_start = utc;
                    state.truncated = false;
                }
                acc.emit(utc, comp);
            }
        }
    }

    Ok(())
}
