//! Merging of value-equivalent rows with touching or overlapping periods.

use crate::types::{Period, Value};
use std::iter::Peekable;

/// Lazily coalesces `(attributes, period)` pairs.
///
/// Input must be ordered by attributes, then by period start. Each output
/// item is a maximal run of equal attributes over a gap-free span, cut to
/// `clip` when one is given.
#[derive(Debug)]
pub struct Coalesce<I: Iterator<Item = (Vec<Value>, Period)>> {
    rows: Peekable<I>,
    clip: Option<Period>,
}

pub fn coalesce<I>(rows: I, clip: Option<Period>) -> Coalesce<I::IntoIter>
where
    I: IntoIterator<Item = (Vec<Value>, Period)>,
{
    Coalesce {
        rows: rows.into_iter().peekable(),
        clip,
    }
}

fn clipped(period: Period, clip: Option<Period>) -> Option<Period> {
    match clip {
        Some(clip) => period.intersect(&clip),
        None => Some(period),
    }
}

impl<I: Iterator<Item = (Vec<Value>, Period)>> Coalesce<I> {
    fn next_clipped(&mut self) -> Option<(Vec<Value>, Period)> {
        loop {
            let (attrs, period) = self.rows.next()?;
            if let Some(p) = clipped(period, self.clip) {
                return Some((attrs, p));
            }
        }
    }
}

impl<I: Iterator<Item = (Vec<Value>, Period)>> Iterator for Coalesce<I> {
    type Item = (Vec<Value>, Period);

    fn next(&mut self) -> Option<Self::Item> {
        let (attrs, mut span) = self.next_clipped()?;
        let clip = self.clip;
        while let Some((next_attrs, next_period)) = self.rows.peek() {
            if *next_attrs != attrs {
                break;
            }
            let Some(next) = clipped(*next_period, clip) else {
                self.rows.next();
                continue;
            };
            if next.from > span.to {
                break;
            }
            span.to = span.to.max(next.to);
            self.rows.next();
        }
        Some((attrs, span))
    }
}
