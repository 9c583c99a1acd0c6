//! Randomized bulk impairment.
//!
//! One `left` and one `right` interface are picked as the control pair and cleared, giving a
//! known-good path through the topology. Every other interface gets its own random loss and
//! delay.

use std::ops::RangeInclusive;

use rand::{seq::SliceRandom as _, Rng};

use crate::{
    iface::Side,
    tc::{CommandSequence, Impairment},
};

/// Loss range drawn for impaired interfaces, in percent.
pub const RANDOM_LOSS: RangeInclusive<u32> = 1..=50;
/// Delay range drawn for impaired interfaces, in milliseconds.
pub const RANDOM_DELAY: RangeInclusive<u32> = 1..=1_000;

/// No two distinct interfaces can form the control pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no control pair available ({left} left, {right} right candidates)")]
pub struct InsufficientTopology {
    /// Number of left candidates.
    pub left: usize,
    /// Number of right candidates.
    pub right: usize,
}

/// The interfaces left clean by a randomized plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPair {
    /// The chosen left candidate.
    pub left: String,
    /// The chosen right candidate, never the same interface as `left`.
    pub right: String,
}

impl ControlPair {
    /// Returns `true` if `name` is one of the pair.
    pub fn contains(&self, name: &str) -> bool {
        self.left == name || self.right == name
    }
}

/// A randomized plan, ready to be submitted as a single batch.
#[derive(Debug, Clone)]
pub struct Plan {
    /// The pair left clean.
    pub control: ControlPair,
    /// The batch applying the plan.
    pub commands: CommandSequence,
}

/// Plans a randomized impairment over `interfaces`.
///
/// Interfaces are emitted in input order. Control pair members get a delete-only clause, all
/// others a delete followed by a netem add with loss and delay drawn independently from
/// [`RANDOM_LOSS`] and [`RANDOM_DELAY`].
pub fn plan_randomized<S, R>(interfaces: &[S], rng: &mut R) -> Result<Plan, InsufficientTopology>
where
    S: AsRef<str>,
    R: Rng + ?Sized,
{
    let left = candidates(interfaces, Side::Left);
    let right = candidates(interfaces, Side::Right);
    let insufficient = || InsufficientTopology { left: left.len(), right: right.len() };

    // A dual-tagged interface may stand on either side, but not on both at once.
    let pairable: Vec<&str> = left.iter().copied().filter(|l| right.iter().any(|r| r != l)).collect();
    let l = *pairable.choose(rng).ok_or_else(insufficient)?;
    let others: Vec<&str> = right.iter().copied().filter(|r| *r != l).collect();
    let r = *others.choose(rng).ok_or_else(insufficient)?;

    let control = ControlPair { left: l.to_string(), right: r.to_string() };

    let mut commands = CommandSequence::new();
    for name in interfaces.iter().map(AsRef::as_ref) {
        if control.contains(name) {
            commands.push_clear(name);
        } else {
            let loss = rng.gen_range(RANDOM_LOSS);
            let delay = rng.gen_range(RANDOM_DELAY);
            commands.push_impair(name, Impairment::new_unchecked(loss, delay));
        }
    }

    Ok(Plan { control, commands })
}

fn candidates<S: AsRef<str>>(interfaces: &[S], side: Side) -> Vec<&str> {
    interfaces.iter().map(AsRef::as_ref).filter(|n| side.admits(n)).collect()
}
